//! Scan orchestration: request validation, pre-flight probe, background
//! engine runs and the stale-scan sweeper.

use chrono::Utc;
use sqlx::SqlitePool;
use std::time::Duration;
use tokio::task::JoinHandle;

use crate::errors::AppError;
use crate::models::connection::{
    ConnectionOutcome, ConnectionTarget, ConnectionTestRequest, Credentials, StartScanRequest,
};
use crate::models::scan::{Scan, ScanStatus};
use crate::services::{prober, scan};
use crate::AppState;

/// Validate the request, probe the target and register a new `pending` scan.
///
/// The engine runs in a background task; the returned scan is the `pending`
/// record as created. A failed probe creates no scan.
pub async fn start_scan(state: &AppState, request: StartScanRequest) -> Result<Scan, AppError> {
    let (target, credentials) = request.into_parts(state.config.ad_use_ssl)?;

    let credentials = match prober::preflight(
        state.prober.clone(),
        &target,
        credentials,
        state.config.connect_timeout(),
    )
    .await
    {
        Ok((_, credentials)) => credentials,
        Err(e) => {
            tracing::warn!(server = %target.server, error = %e, "Pre-flight probe failed, scan not created");
            return Err(AppError::ConnectionFailure(e.to_string()));
        }
    };

    let id = scan::create(&state.db, &target.server, &target.domain).await?;
    let created = scan::get(&state.db, id).await?;

    tokio::spawn(run_scan(state.clone(), id, target, credentials));
    Ok(created)
}

/// Background job: `pending -> running`, engine call, then report or failure.
///
/// Owns the credentials; they are dropped when this future completes.
pub async fn run_scan(
    state: AppState,
    id: i64,
    target: ConnectionTarget,
    credentials: Credentials,
) {
    if let Err(e) = scan::transition(&state.db, id, ScanStatus::Running).await {
        tracing::error!(scan_id = id, error = %e, "Could not start scan");
        return;
    }
    tracing::info!(scan_id = id, server = %target.server, "Scan running");

    let outcome = prober::run_engine(
        state.engine.clone(),
        target,
        credentials,
        state.config.scan_timeout(),
    )
    .await;

    let result = match outcome {
        Ok(findings) => {
            scan::attach_report(&state.db, id, findings, &state.config.risk_weights)
                .await
                .map(|_| ())
        }
        Err(e) => scan::mark_failed(&state.db, id, &e.to_string()).await,
    };

    if let Err(e) = result {
        tracing::error!(scan_id = id, error = %e, "Scan did not finish cleanly");
    }
}

/// Validate the request and run a bounded probe.
pub async fn test_connection(
    state: &AppState,
    request: ConnectionTestRequest,
) -> Result<ConnectionOutcome, AppError> {
    let (target, credentials) = request.into_parts(state.config.ad_use_ssl)?;
    Ok(prober::test_connection(
        state.prober.clone(),
        target,
        credentials,
        state.config.connect_timeout(),
    )
    .await)
}

/// Fail every scan that has been `pending`/`running` for longer than `timeout`.
pub async fn sweep_stale(pool: &SqlitePool, timeout: Duration) -> Result<Vec<i64>, AppError> {
    let age = chrono::Duration::from_std(timeout).unwrap_or_else(|_| chrono::Duration::weeks(52));
    scan::expire_stale(pool, Utc::now() - age).await
}

/// Periodically run [`sweep_stale`] until the runtime shuts down.
pub fn spawn_stale_sweeper(state: AppState) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(state.config.stale_sweep_interval());
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            match sweep_stale(&state.db, state.config.scan_timeout()).await {
                Ok(expired) if !expired.is_empty() => {
                    tracing::info!(count = expired.len(), "Expired stale scans");
                }
                Ok(_) => {}
                Err(e) => tracing::error!(error = %e, "Stale scan sweep failed"),
            }
        }
    })
}
