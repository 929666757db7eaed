//! Database connection pool and migration utilities.

use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;

/// Create a SQLite connection pool.
///
/// In-memory databases are private to a connection, so callers using
/// `sqlite::memory:` must keep `max_connections` at 1. That connection is
/// never recycled, otherwise the data would vanish with it.
pub async fn create_pool(
    database_url: &str,
    max_connections: u32,
) -> Result<SqlitePool, sqlx::Error> {
    let options = SqlitePoolOptions::new().max_connections(max_connections);
    let options = if database_url.contains(":memory:") {
        options.idle_timeout(None).max_lifetime(None)
    } else {
        options
    };
    options.connect(database_url).await
}

/// Apply the embedded schema migrations.
pub async fn run_migrations(pool: &SqlitePool) -> Result<(), sqlx::migrate::MigrateError> {
    sqlx::migrate!("./migrations").run(pool).await
}
