//! Capability interfaces for the directory prober and scanning engine, plus
//! the bounded call wrappers that own the credentials for each invocation.
//!
//! Every call runs in its own task under a timeout. The task owns the
//! [`Credentials`], so they are dropped (and wiped) when the task finishes,
//! panics or is aborted on timeout.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::task::JoinHandle;

use crate::models::connection::{ConnectionOutcome, ConnectionTarget, Credentials, DomainInfo};
use crate::models::vulnerability::RawFinding;

/// Failure reported by a prober or engine. Messages are shown to users and
/// must never contain credential material.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ProbeError {
    #[error("Directory server unreachable: {0}")]
    Unreachable(String),

    #[error("Authentication rejected: {0}")]
    AuthenticationRejected(String),

    #[error("Timed out after {0:?}")]
    Timeout(Duration),

    #[error("Scanner error: {0}")]
    Engine(String),
}

/// Validates connectivity and credentials against a directory server.
#[async_trait]
pub trait DirectoryProber: Send + Sync {
    async fn probe(
        &self,
        target: &ConnectionTarget,
        credentials: &Credentials,
    ) -> Result<DomainInfo, ProbeError>;
}

/// Runs the audit checks against a directory server and reports raw findings.
#[async_trait]
pub trait ScanEngine: Send + Sync {
    async fn scan(
        &self,
        target: &ConnectionTarget,
        credentials: &Credentials,
    ) -> Result<Vec<RawFinding>, ProbeError>;
}

/// Probe `target` within `limit`, handing the credentials back on success so
/// the caller can pass them on to the scan that follows.
///
/// On failure the credentials are dropped inside the probe task.
pub async fn preflight(
    prober: Arc<dyn DirectoryProber>,
    target: &ConnectionTarget,
    credentials: Credentials,
    limit: Duration,
) -> Result<(DomainInfo, Credentials), ProbeError> {
    let target = target.clone();
    let task = tokio::spawn(async move {
        let info = prober.probe(&target, &credentials).await?;
        Ok::<_, ProbeError>((info, credentials))
    });
    bounded(task, limit).await
}

/// Probe `target` within `limit`; every fault becomes `ConnectionOutcome::Failed`.
pub async fn test_connection(
    prober: Arc<dyn DirectoryProber>,
    target: ConnectionTarget,
    credentials: Credentials,
    limit: Duration,
) -> ConnectionOutcome {
    match preflight(prober, &target, credentials, limit).await {
        Ok((info, credentials)) => {
            drop(credentials);
            tracing::info!(server = %target.server, base_dn = %info.base_dn, "Directory probe succeeded");
            ConnectionOutcome::Connected(info)
        }
        Err(e) => {
            tracing::warn!(server = %target.server, error = %e, "Directory probe failed");
            ConnectionOutcome::Failed(e.to_string())
        }
    }
}

/// Run the engine against `target` within `limit`, consuming the credentials.
pub async fn run_engine(
    engine: Arc<dyn ScanEngine>,
    target: ConnectionTarget,
    credentials: Credentials,
    limit: Duration,
) -> Result<Vec<RawFinding>, ProbeError> {
    let task = tokio::spawn(async move {
        let result = engine.scan(&target, &credentials).await;
        drop(credentials);
        result
    });
    bounded(task, limit).await
}

/// Await a collaborator task, aborting it if `limit` elapses.
async fn bounded<T>(
    task: JoinHandle<Result<T, ProbeError>>,
    limit: Duration,
) -> Result<T, ProbeError> {
    let abort = task.abort_handle();
    match tokio::time::timeout(limit, task).await {
        Ok(Ok(result)) => result,
        Ok(Err(join_error)) if join_error.is_panic() => {
            Err(ProbeError::Engine("collaborator panicked".to_string()))
        }
        Ok(Err(_)) => Err(ProbeError::Engine("collaborator task was cancelled".to_string())),
        Err(_) => {
            abort.abort();
            Err(ProbeError::Timeout(limit))
        }
    }
}
