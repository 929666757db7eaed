//! Scan Registry: creation, guarded status transitions, report attachment,
//! listing and deletion.
//!
//! Every status write is a compare-and-set on the current status, so two
//! writers racing on the same scan cannot both succeed.

use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::SqlitePool;

use crate::errors::AppError;
use crate::models::scan::{Scan, ScanStatus, ScanSummary};
use crate::models::vulnerability::{
    RawFinding, ReportData, ReportStatistics, ScanInfo,
};
use crate::services::classifier;
use crate::services::lifecycle;
use crate::services::risk_score::{self, RiskWeights};

const SCAN_COLUMNS: &str = r#"
    id, ad_server, ad_domain, status, created_at, started_at, completed_at,
    total_vulnerabilities, critical_count, high_count, medium_count, low_count,
    risk_score, report_data, failure_reason
"#;

const SUMMARY_COLUMNS: &str = r#"
    id, ad_server, ad_domain, status, created_at, started_at, completed_at,
    total_vulnerabilities, critical_count, high_count, medium_count, low_count,
    risk_score, failure_reason
"#;

/// Create a new scan in `pending` and return its id.
pub async fn create(pool: &SqlitePool, server: &str, domain: &str) -> Result<i64, AppError> {
    let server = server.trim();
    let domain = domain.trim();
    if server.is_empty() {
        return Err(AppError::Validation("ad_server is required".to_string()));
    }
    if domain.is_empty() {
        return Err(AppError::Validation("ad_domain is required".to_string()));
    }

    let id = sqlx::query_scalar::<_, i64>(
        r#"
        INSERT INTO scans (ad_server, ad_domain, status, created_at)
        VALUES (?, ?, ?, ?)
        RETURNING id
        "#,
    )
    .bind(server)
    .bind(domain)
    .bind(ScanStatus::Pending)
    .bind(Utc::now())
    .fetch_one(pool)
    .await?;

    tracing::info!(scan_id = id, server = %server, domain = %domain, "Scan created");
    Ok(id)
}

/// Fetch a scan with its embedded report.
pub async fn get(pool: &SqlitePool, id: i64) -> Result<Scan, AppError> {
    sqlx::query_as::<_, Scan>(&format!("SELECT {SCAN_COLUMNS} FROM scans WHERE id = ?"))
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| not_found(id))
}

/// List all scans, newest first.
pub async fn list(pool: &SqlitePool) -> Result<Vec<ScanSummary>, AppError> {
    let scans = sqlx::query_as::<_, ScanSummary>(&format!(
        "SELECT {SUMMARY_COLUMNS} FROM scans ORDER BY created_at DESC, id DESC"
    ))
    .fetch_all(pool)
    .await?;
    Ok(scans)
}

/// Delete a scan and its embedded findings.
pub async fn delete(pool: &SqlitePool, id: i64) -> Result<(), AppError> {
    let result = sqlx::query("DELETE FROM scans WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(not_found(id));
    }

    tracing::info!(scan_id = id, "Scan deleted");
    Ok(())
}

/// Move a scan to `running` or `failed`.
///
/// `completed` is only reachable through [`attach_report`], which carries the findings.
pub async fn transition(pool: &SqlitePool, id: i64, to: ScanStatus) -> Result<(), AppError> {
    match to {
        ScanStatus::Running => start(pool, id).await,
        ScanStatus::Failed => mark_failed(pool, id, "Scan aborted").await,
        ScanStatus::Completed => {
            let current = current_status(pool, id).await?;
            lifecycle::validate_transition(id, current, to)?;
            Err(AppError::InvalidTransition(format!(
                "Scan {id} can only complete with a report attached"
            )))
        }
        ScanStatus::Pending => {
            let current = current_status(pool, id).await?;
            lifecycle::validate_transition(id, current, to)
        }
    }
}

/// `pending -> running`, recording the start time.
async fn start(pool: &SqlitePool, id: i64) -> Result<(), AppError> {
    let current = current_status(pool, id).await?;
    lifecycle::validate_transition(id, current, ScanStatus::Running)?;

    let result = sqlx::query(
        "UPDATE scans SET status = ?, started_at = ? WHERE id = ? AND status = ?",
    )
    .bind(ScanStatus::Running)
    .bind(Utc::now())
    .bind(id)
    .bind(current)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(lost_race(pool, id, ScanStatus::Running).await);
    }

    tracing::info!(scan_id = id, status = %ScanStatus::Running, "Scan status changed");
    Ok(())
}

/// Move a `pending` or `running` scan to `failed` with a user-facing reason.
pub async fn mark_failed(pool: &SqlitePool, id: i64, reason: &str) -> Result<(), AppError> {
    let current = current_status(pool, id).await?;
    lifecycle::validate_transition(id, current, ScanStatus::Failed)?;

    let result = sqlx::query(
        "UPDATE scans SET status = ?, completed_at = ?, failure_reason = ? WHERE id = ? AND status = ?",
    )
    .bind(ScanStatus::Failed)
    .bind(Utc::now())
    .bind(reason)
    .bind(id)
    .bind(current)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(lost_race(pool, id, ScanStatus::Failed).await);
    }

    tracing::warn!(scan_id = id, reason = %reason, "Scan failed");
    Ok(())
}

/// Attach engine findings to a `running` scan and complete it.
///
/// Findings are validated first; a malformed batch fails the scan instead of
/// being stored, and the ingestion error is returned.
pub async fn attach_report(
    pool: &SqlitePool,
    id: i64,
    findings: Vec<RawFinding>,
    weights: &RiskWeights,
) -> Result<Scan, AppError> {
    let scan = get(pool, id).await?;
    if scan.status != ScanStatus::Running {
        lifecycle::validate_transition(id, scan.status, ScanStatus::Completed)?;
    }

    let vulnerabilities = match classifier::ingest(findings) {
        Ok(v) => v,
        Err(e) => {
            tracing::warn!(scan_id = id, error = %e, "Rejected engine findings");
            mark_failed(pool, id, &format!("Scanner returned malformed findings: {e}")).await?;
            return Err(e);
        }
    };

    let counts = classifier::aggregate(&vulnerabilities);
    let risk_score = risk_score::compute(&counts, weights);
    let completed_at = Utc::now();

    let report = ReportData {
        scan_info: ScanInfo {
            server: scan.ad_server.clone(),
            domain: scan.ad_domain.clone(),
            scan_start: scan.started_at,
            scan_end: completed_at,
            scan_duration_secs: scan.started_at.map(|s| duration_secs(s, completed_at)),
        },
        statistics: ReportStatistics {
            total_vulnerabilities: counts.total(),
            critical_count: counts.critical,
            high_count: counts.high,
            medium_count: counts.medium,
            low_count: counts.low,
            risk_score,
        },
        vulnerabilities,
    };

    let result = sqlx::query(
        r#"
        UPDATE scans SET
            status = ?, completed_at = ?, total_vulnerabilities = ?,
            critical_count = ?, high_count = ?, medium_count = ?, low_count = ?,
            risk_score = ?, report_data = ?
        WHERE id = ? AND status = ?
        "#,
    )
    .bind(ScanStatus::Completed)
    .bind(completed_at)
    .bind(counts.total())
    .bind(counts.critical)
    .bind(counts.high)
    .bind(counts.medium)
    .bind(counts.low)
    .bind(risk_score)
    .bind(Json(&report))
    .bind(id)
    .bind(ScanStatus::Running)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(lost_race(pool, id, ScanStatus::Completed).await);
    }

    tracing::info!(
        scan_id = id,
        risk_score,
        total = counts.total(),
        critical = counts.critical,
        high = counts.high,
        medium = counts.medium,
        low = counts.low,
        "Scan completed"
    );

    get(pool, id).await
}

/// Fail every `pending`/`running` scan that has not progressed since `cutoff`.
///
/// Returns the ids that were expired.
pub async fn expire_stale(pool: &SqlitePool, cutoff: DateTime<Utc>) -> Result<Vec<i64>, AppError> {
    let ids = sqlx::query_scalar::<_, i64>(
        r#"
        UPDATE scans SET status = ?, completed_at = ?, failure_reason = ?
        WHERE status IN ('pending', 'running')
          AND COALESCE(started_at, created_at) < ?
        RETURNING id
        "#,
    )
    .bind(ScanStatus::Failed)
    .bind(Utc::now())
    .bind("Scan timed out")
    .bind(cutoff)
    .fetch_all(pool)
    .await?;

    for id in &ids {
        tracing::warn!(scan_id = *id, "Stale scan marked as failed");
    }
    Ok(ids)
}

async fn current_status(pool: &SqlitePool, id: i64) -> Result<ScanStatus, AppError> {
    sqlx::query_scalar::<_, ScanStatus>("SELECT status FROM scans WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| not_found(id))
}

/// Explain why a compare-and-set update matched no row.
async fn lost_race(pool: &SqlitePool, id: i64, to: ScanStatus) -> AppError {
    match current_status(pool, id).await {
        Ok(now) => AppError::InvalidTransition(format!(
            "Scan {id} changed to {now} before it could move to {to}"
        )),
        Err(e) => e,
    }
}

fn not_found(id: i64) -> AppError {
    AppError::NotFound(format!("Scan {id} not found"))
}

fn duration_secs(start: DateTime<Utc>, end: DateTime<Utc>) -> f64 {
    (end - start).num_milliseconds().max(0) as f64 / 1000.0
}
