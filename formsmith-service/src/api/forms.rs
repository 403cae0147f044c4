//! Form API endpoints.
//!
//! Handlers for form structure CRUD and the two render targets: the
//! interactive input tree and the print-ready PDF document.

use axum::{
    Json,
    extract::{Path, State},
    http::{StatusCode, header},
    response::IntoResponse,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

use crate::db::FormRecord;
use crate::error::ServiceError;
use crate::form::FormStructure;
use crate::render::interactive::{InteractiveForm, render_interactive};
use crate::render::{RenderInputs, document};

use super::AppState;

/// Request to create an empty form
#[derive(Deserialize)]
pub struct CreateFormRequest {
    pub title: String,
}

/// Response for delete operations
#[derive(Serialize)]
pub struct DeleteResponse {
    pub success: bool,
}

/// Body shared by both render endpoints: the external data bag and the
/// current user-entered values.
#[derive(Deserialize, Default)]
pub struct RenderRequest {
    #[serde(default)]
    pub data: Value,
    #[serde(default)]
    pub values: HashMap<String, Value>,
}

/// List all forms
pub async fn list_forms_handler(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<FormRecord>>, ServiceError> {
    let forms = state.service.db.list_forms()?;
    Ok(Json(forms))
}

/// Create a new empty form
pub async fn create_form_handler(
    State(state): State<Arc<AppState>>,
    Json(request): Json<CreateFormRequest>,
) -> Result<Json<FormRecord>, ServiceError> {
    if request.title.trim().is_empty() {
        return Err(ServiceError::InvalidRequest {
            message: "Form title must not be empty".to_string(),
        });
    }
    let record = state.service.create_form(request.title.trim())?;
    Ok(Json(record))
}

/// Get a form by ID
pub async fn get_form_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<FormRecord>, ServiceError> {
    let record = state
        .service
        .db
        .get_form(&id)?
        .ok_or(ServiceError::FormNotFound { form_id: id })?;
    Ok(Json(record))
}

/// Replace a form's structure
pub async fn update_form_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(structure): Json<FormStructure>,
) -> Result<Json<FormRecord>, ServiceError> {
    let record = state.service.update_form_structure(&id, &structure)?;
    Ok(Json(record))
}

/// Delete a form
pub async fn delete_form_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<DeleteResponse>, ServiceError> {
    if state.service.db.delete_form(&id)? {
        Ok(Json(DeleteResponse { success: true }))
    } else {
        Err(ServiceError::FormNotFound { form_id: id })
    }
}

/// Render the interactive input tree for the current values
pub async fn render_interactive_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(request): Json<RenderRequest>,
) -> Result<Json<InteractiveForm>, ServiceError> {
    let record = state
        .service
        .db
        .get_form(&id)?
        .ok_or(ServiceError::FormNotFound { form_id: id })?;

    let inputs = RenderInputs {
        data_bag: &request.data,
        values: &request.values,
    };
    Ok(Json(render_interactive(&record.structure, &inputs)))
}

/// Render the print-ready document and return the PDF bytes
pub async fn render_document_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(request): Json<RenderRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let record = state
        .service
        .db
        .get_form(&id)?
        .ok_or(ServiceError::FormNotFound { form_id: id })?;

    let inputs = RenderInputs {
        data_bag: &request.data,
        values: &request.values,
    };
    let layout = document::layout_document(&record.structure, &inputs);
    let bytes = document::render_pdf(&layout, &state.service.config.document)?;

    let filename = format!("{}.pdf", record.id);
    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, mime::APPLICATION_PDF.to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", filename),
            ),
        ],
        bytes,
    ))
}
