//! HTTP API for the Formsmith service.
//!
//! This module provides the REST API endpoints for:
//! - Health and metrics monitoring
//! - Form structure management and rendering
//! - PDF analysis job submission and polling

use axum::{
    Json, Router,
    extract::{DefaultBodyLimit, State},
    http::{StatusCode, header},
    response::IntoResponse,
    routing::{delete, get, post, put},
};
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::config::StaticConfig;
use crate::service::FormsmithService;

pub mod analysis;
pub mod forms;

use analysis::{
    cancel_analysis_handler, get_analysis_handler, save_analysis_handler, submit_analysis_handler,
    wait_analysis_handler,
};
use forms::{
    create_form_handler, delete_form_handler, get_form_handler, list_forms_handler,
    render_document_handler, render_interactive_handler, update_form_handler,
};

/// Application state
pub struct AppState {
    pub service: Arc<FormsmithService>,
    pub start_time: Instant,
}

/// Build the API router
pub fn router(service: Arc<FormsmithService>, config: &StaticConfig) -> Router {
    let state = Arc::new(AppState {
        service,
        start_time: Instant::now(),
    });

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Use the configured max upload size for analysis submissions
    let max_body_size = config.storage.max_upload_bytes as usize;

    let api_routes = Router::new()
        // Form endpoints
        .route("/forms", get(list_forms_handler))
        .route("/forms", post(create_form_handler))
        .route("/forms/{id}", get(get_form_handler))
        .route("/forms/{id}", put(update_form_handler))
        .route("/forms/{id}", delete(delete_form_handler))
        .route("/forms/{id}/render", post(render_interactive_handler))
        .route("/forms/{id}/document", post(render_document_handler))
        // Analysis endpoints - larger body limit for PDF uploads
        .route(
            "/analysis",
            post(submit_analysis_handler).layer(DefaultBodyLimit::max(max_body_size)),
        )
        .route("/analysis/{id}", get(get_analysis_handler))
        .route("/analysis/{id}", delete(cancel_analysis_handler))
        .route("/analysis/{id}/wait", get(wait_analysis_handler))
        .route("/analysis/{id}/save", post(save_analysis_handler));

    Router::new()
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .nest("/api", api_routes)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// === Health & Metrics ===

async fn health_handler(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let vision_available = state.service.vision.health_check().await;

    let status = if vision_available {
        "healthy".to_string()
    } else {
        "degraded: vision backend unavailable".to_string()
    };

    Json(HealthResponse {
        status,
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: state.start_time.elapsed().as_secs(),
        vision_available,
    })
}

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
    uptime_seconds: u64,
    vision_available: bool,
}

async fn metrics_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let body = state
        .service
        .metrics_handle()
        .map(|handle| handle.render())
        .unwrap_or_default();

    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        body,
    )
}
