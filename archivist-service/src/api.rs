//! HTTP API for the archivist service.
//!
//! Endpoints for health, document upload, submission, and status inspection.

use axum::{
    Json, Router,
    extract::DefaultBodyLimit,
    routing::{get, post},
};
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tower_http::trace::TraceLayer;

use crate::service::ArchivistService;

pub mod documents;
use documents::{
    get_document_handler, list_documents_handler, submit_document_handler,
    upload_document_handler,
};

const MAX_UPLOAD_BYTES: usize = 50 * 1024 * 1024;

/// Application state
pub struct AppState {
    pub service: Arc<ArchivistService>,
    pub start_time: Instant,
}

/// Build the API router
pub fn router(service: Arc<ArchivistService>) -> Router {
    let state = Arc::new(AppState {
        service,
        start_time: Instant::now(),
    });

    let api_routes = Router::new()
        .route(
            "/documents",
            get(list_documents_handler)
                .post(upload_document_handler)
                .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES)),
        )
        .route("/documents/{id}", get(get_document_handler))
        .route("/documents/{id}/process", post(submit_document_handler));

    Router::new()
        .route("/health", get(health_handler))
        .nest("/api", api_routes)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    uptime_secs: u64,
}

async fn health_handler(
    axum::extract::State(state): axum::extract::State<Arc<AppState>>,
) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        uptime_secs: state.start_time.elapsed().as_secs(),
    })
}
