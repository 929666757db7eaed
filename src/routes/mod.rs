//! Route definitions for the ADSecureCheck API.

pub mod directory;
pub mod health;
pub mod scans;

use axum::http::{HeaderValue, Method};
use axum::routing::{get, post};
use axum::Router;
use tower::ServiceBuilder;
use tower_http::compression::CompressionLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;

use crate::AppState;

/// Request bodies are small JSON documents.
const MAX_BODY_BYTES: usize = 64 * 1024;

/// Build the full application router.
pub fn router(state: AppState) -> Router {
    let cors = cors_layer(&state.config.frontend_url);

    let scan_routes = Router::new()
        .route("/scans", get(scans::list))
        .route("/scans/stats", get(scans::stats))
        .route("/scans/start", post(scans::start))
        .route("/scans/{id}", get(scans::get_by_id).delete(scans::delete))
        .route("/scans/{id}/vulnerabilities", get(scans::vulnerabilities))
        .route("/scans/{id}/download/{format}", get(scans::download));

    let api_routes = Router::new()
        .route("/health", get(health::ready))
        .route("/ad/test-connection", post(directory::test_connection))
        .merge(scan_routes);

    Router::new()
        .route("/health/live", get(health::live))
        .route("/health/ready", get(health::ready))
        .nest("/api", api_routes)
        .layer(
            ServiceBuilder::new()
                // Outermost: Cors needs a `Default` inner body.
                .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
                .layer(TraceLayer::new_for_http())
                .layer(cors)
                .layer(CompressionLayer::new()),
        )
        .with_state(state)
}

fn cors_layer(frontend_url: &str) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers(Any)
        .expose_headers([
            axum::http::header::CONTENT_DISPOSITION,
            axum::http::header::ETAG,
        ]);

    match frontend_url.parse::<HeaderValue>() {
        Ok(origin) => layer.allow_origin(origin),
        Err(e) => {
            tracing::warn!(frontend_url = %frontend_url, error = %e, "Invalid FRONTEND_URL, allowing any origin");
            layer.allow_origin(Any)
        }
    }
}
