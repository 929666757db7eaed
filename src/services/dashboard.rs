//! Scan statistics aggregation, computed on demand from the registry.

use serde::Serialize;
use sqlx::SqlitePool;

use crate::errors::AppError;

/// Aggregated statistics for the dashboard overview.
#[derive(Debug, Serialize, PartialEq)]
pub struct ScanStats {
    pub total_scans: i64,
    pub completed_scans: i64,
    pub total_vulnerabilities: i64,
    pub critical_count: i64,
    pub high_count: i64,
    pub medium_count: i64,
    pub low_count: i64,
    pub average_risk_score: i64,
}

/// Intermediate row for the conditional aggregation.
#[derive(Debug, sqlx::FromRow)]
struct StatsRow {
    total_scans: i64,
    completed_scans: i64,
    total_vulnerabilities: i64,
    critical_count: i64,
    high_count: i64,
    medium_count: i64,
    low_count: i64,
    risk_score_sum: i64,
}

/// Fetch registry-wide statistics in a single query.
///
/// Vulnerability sums and the average risk score only consider completed scans.
pub async fn get_stats(pool: &SqlitePool) -> Result<ScanStats, AppError> {
    let row = sqlx::query_as::<_, StatsRow>(
        r#"
        SELECT
            COUNT(*) AS total_scans,
            COALESCE(SUM(CASE WHEN status = 'completed' THEN 1 ELSE 0 END), 0) AS completed_scans,
            COALESCE(SUM(CASE WHEN status = 'completed' THEN total_vulnerabilities ELSE 0 END), 0) AS total_vulnerabilities,
            COALESCE(SUM(CASE WHEN status = 'completed' THEN critical_count ELSE 0 END), 0) AS critical_count,
            COALESCE(SUM(CASE WHEN status = 'completed' THEN high_count ELSE 0 END), 0) AS high_count,
            COALESCE(SUM(CASE WHEN status = 'completed' THEN medium_count ELSE 0 END), 0) AS medium_count,
            COALESCE(SUM(CASE WHEN status = 'completed' THEN low_count ELSE 0 END), 0) AS low_count,
            COALESCE(SUM(CASE WHEN status = 'completed' THEN COALESCE(risk_score, 0) ELSE 0 END), 0) AS risk_score_sum
        FROM scans
        "#,
    )
    .fetch_one(pool)
    .await?;

    Ok(ScanStats {
        total_scans: row.total_scans,
        completed_scans: row.completed_scans,
        total_vulnerabilities: row.total_vulnerabilities,
        critical_count: row.critical_count,
        high_count: row.high_count,
        medium_count: row.medium_count,
        low_count: row.low_count,
        average_risk_score: rounded_average(row.risk_score_sum, row.completed_scans),
    })
}

/// Average rounded half-up to the nearest integer; 0 for an empty set.
fn rounded_average(sum: i64, count: i64) -> i64 {
    if count <= 0 {
        return 0;
    }
    (2 * sum + count) / (2 * count)
}
