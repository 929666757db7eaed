//! Directory routes: connection testing against an Active Directory server.

use axum::{
    extract::{rejection::JsonRejection, State},
    Json,
};
use serde::Serialize;

use crate::errors::{ApiResponse, AppError};
use crate::models::connection::{ConnectionOutcome, ConnectionTestRequest, DomainInfo};
use crate::services::scan_runner;
use crate::AppState;

#[derive(Debug, Serialize)]
pub struct ConnectionTestResult {
    pub message: String,
    pub domain_info: DomainInfo,
}

/// POST /api/ad/test-connection: bounded probe with the supplied credentials.
///
/// Prober failures come back as `CONNECTION_FAILED`; the body never echoes
/// the credentials.
pub async fn test_connection(
    State(state): State<AppState>,
    payload: Result<Json<ConnectionTestRequest>, JsonRejection>,
) -> Result<Json<ApiResponse<ConnectionTestResult>>, AppError> {
    let Json(request) = payload.map_err(|e| AppError::Validation(e.body_text()))?;
    match scan_runner::test_connection(&state, request).await? {
        ConnectionOutcome::Connected(domain_info) => Ok(ApiResponse::success(ConnectionTestResult {
            message: "Connection successful".to_string(),
            domain_info,
        })),
        ConnectionOutcome::Failed(reason) => Err(AppError::ConnectionFailure(reason)),
    }
}
