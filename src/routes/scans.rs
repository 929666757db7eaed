//! Scan routes: listing, lookup, start, delete, statistics, findings and report downloads.

use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};

use crate::errors::{ApiResponse, AppError};
use crate::models::connection::StartScanRequest;
use crate::models::scan::{Scan, ScanSummary};
use crate::models::vulnerability::Vulnerability;
use crate::services::classifier::{self, SeverityFilter};
use crate::services::dashboard::{self, ScanStats};
use crate::services::export::{self, ReportFormat};
use crate::services::scan as scan_service;
use crate::services::scan_runner;
use crate::AppState;

#[derive(Debug, Serialize)]
pub struct ScanList {
    pub scans: Vec<ScanSummary>,
}

#[derive(Debug, Serialize)]
pub struct ScanDetail {
    pub scan: Scan,
}

#[derive(Debug, Serialize)]
pub struct StartedScan {
    pub message: String,
    pub scan: Scan,
}

#[derive(Debug, Serialize)]
pub struct StatsBody {
    pub stats: ScanStats,
}

/// Findings of one scan after severity filtering.
#[derive(Debug, Serialize)]
pub struct VulnerabilityList {
    pub severity: String,
    pub count: usize,
    pub vulnerabilities: Vec<Vulnerability>,
}

#[derive(Debug, Deserialize)]
pub struct VulnerabilityQuery {
    pub severity: Option<String>,
}

/// GET /api/scans: all scans, newest first.
pub async fn list(State(state): State<AppState>) -> Result<Json<ApiResponse<ScanList>>, AppError> {
    let scans = scan_service::list(&state.db).await?;
    Ok(ApiResponse::success(ScanList { scans }))
}

/// GET /api/scans/stats: registry-wide statistics.
pub async fn stats(State(state): State<AppState>) -> Result<Json<ApiResponse<StatsBody>>, AppError> {
    let stats = dashboard::get_stats(&state.db).await?;
    Ok(ApiResponse::success(StatsBody { stats }))
}

/// GET /api/scans/{id}: one scan with its embedded report.
pub async fn get_by_id(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<ApiResponse<ScanDetail>>, AppError> {
    let scan = scan_service::get(&state.db, id).await?;
    Ok(ApiResponse::success(ScanDetail { scan }))
}

/// POST /api/scans/start: probe the target and launch a background scan.
pub async fn start(
    State(state): State<AppState>,
    payload: Result<Json<StartScanRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<ApiResponse<StartedScan>>), AppError> {
    let Json(request) = payload.map_err(|e| AppError::Validation(e.body_text()))?;
    let scan = scan_runner::start_scan(&state, request).await?;
    Ok((
        StatusCode::CREATED,
        ApiResponse::success(StartedScan {
            message: "Scan created successfully".to_string(),
            scan,
        }),
    ))
}

/// DELETE /api/scans/{id}: remove a scan and its findings.
pub async fn delete(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<StatusCode, AppError> {
    scan_service::delete(&state.db, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /api/scans/{id}/vulnerabilities?severity=: findings in stored order.
pub async fn vulnerabilities(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Query(query): Query<VulnerabilityQuery>,
) -> Result<Json<ApiResponse<VulnerabilityList>>, AppError> {
    let filter = match query.severity.as_deref() {
        None | Some("") => SeverityFilter::All,
        Some(value) => value.parse()?,
    };

    let scan = scan_service::get(&state.db, id).await?;
    let report = scan.report().ok_or_else(|| {
        AppError::NotReady(format!("Scan {id} is {} and has no findings yet", scan.status))
    })?;

    let vulnerabilities: Vec<Vulnerability> = classifier::filter(&report.vulnerabilities, filter)
        .into_iter()
        .cloned()
        .collect();

    Ok(ApiResponse::success(VulnerabilityList {
        severity: filter.to_string(),
        count: vulnerabilities.len(),
        vulnerabilities,
    }))
}

/// GET /api/scans/{id}/download/{format}: rendered report as an attachment.
pub async fn download(
    State(state): State<AppState>,
    Path((id, format)): Path<(i64, String)>,
) -> Result<Response, AppError> {
    let format: ReportFormat = format.parse()?;
    let scan = scan_service::get(&state.db, id).await?;
    let payload = export::export(&scan, format)?;
    let etag = export::etag(&payload);

    tracing::info!(
        scan_id = id,
        format = format.extension(),
        bytes = payload.len(),
        "Report exported"
    );

    Ok((
        [
            (header::CONTENT_TYPE, format.content_type().to_string()),
            (header::CONTENT_DISPOSITION, format.content_disposition(id)),
            (header::ETAG, etag),
        ],
        payload,
    )
        .into_response())
}
