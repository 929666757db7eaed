use std::net::SocketAddr;
use std::sync::Arc;

use adsecurecheck::config::AppConfig;
use adsecurecheck::services::directory::{BaselineEngine, TcpDirectoryProber};
use adsecurecheck::services::scan_runner;
use adsecurecheck::{db, routes, AppState};
use anyhow::Context;
use mimalloc::MiMalloc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

// mimalloc as the global allocator.
#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "adsecurecheck=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    let config = AppConfig::from_env().context("Failed to load configuration")?;

    let pool = db::create_pool(&config.database_url, config.database_max_connections)
        .await
        .context("Failed to connect to database")?;
    db::run_migrations(&pool)
        .await
        .context("Failed to run database migrations")?;

    let prober = TcpDirectoryProber::new(config.connect_timeout());
    let state = AppState {
        db: pool,
        config: config.clone(),
        prober: Arc::new(prober.clone()),
        engine: Arc::new(BaselineEngine::new(prober)),
    };

    scan_runner::spawn_stale_sweeper(state.clone());

    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .with_context(|| format!("Invalid listen address {}:{}", config.host, config.port))?;
    tracing::info!(host = %addr, "Starting ADSecureCheck API server");

    let app = routes::router(state);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
