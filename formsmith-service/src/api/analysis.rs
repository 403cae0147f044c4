//! Analysis API endpoints.
//!
//! Submission answers 202 Accepted with the job id; status polling and a
//! bounded blocking wait read the job record the worker writes.

use axum::{
    Json,
    extract::{Multipart, Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Serialize;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::db::{AnalysisJob, JobStatus};
use crate::error::ServiceError;
use crate::mapping::TargetSchema;

use super::AppState;

/// 202 response body for a submitted analysis
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitResponse {
    pub job_id: String,
    pub status: JobStatus,
}

/// Response for cancellation requests
#[derive(Serialize)]
pub struct CancelResponse {
    pub cancelled: bool,
}

/// Submit a PDF for analysis. Multipart fields: `file` (required),
/// `schema` (optional JSON object of target fields).
pub async fn submit_analysis_handler(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, ServiceError> {
    let mut file_data: Option<(Vec<u8>, String)> = None;
    let mut target_schema: Option<TargetSchema> = None;

    while let Ok(Some(field)) = multipart.next_field().await {
        let name = field.name().unwrap_or("").to_string();

        match name.as_str() {
            "file" => {
                let filename = field.file_name().unwrap_or("document.pdf").to_string();
                let data = field
                    .bytes()
                    .await
                    .map_err(|e| ServiceError::InvalidRequest {
                        message: e.to_string(),
                    })?;
                file_data = Some((data.to_vec(), filename));
            }
            "schema" => {
                let schema_text =
                    field
                        .text()
                        .await
                        .map_err(|e| ServiceError::InvalidRequest {
                            message: e.to_string(),
                        })?;
                if !schema_text.trim().is_empty() {
                    target_schema = Some(serde_json::from_str(&schema_text).map_err(|e| {
                        ServiceError::InvalidRequest {
                            message: format!("Invalid target schema: {}", e),
                        }
                    })?);
                }
            }
            _ => {}
        }
    }

    let (data, filename) = file_data.ok_or_else(|| ServiceError::InvalidRequest {
        message: "No file provided".to_string(),
    })?;

    let job = state
        .service
        .submit_analysis(&data, &filename, target_schema)
        .await?;

    Ok((
        StatusCode::ACCEPTED,
        Json(SubmitResponse {
            job_id: job.id,
            status: job.status,
        }),
    ))
}

/// Poll a job's status; a terminal job carries results or an error.
pub async fn get_analysis_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<AnalysisJob>, ServiceError> {
    let job = state.service.get_job(&id)?;
    Ok(Json(job))
}

/// Block until the job is terminal, bounded by the configured poll
/// interval and attempt count. Past the bound the caller receives the
/// synthesized timeout failure.
pub async fn wait_analysis_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<AnalysisJob>, ServiceError> {
    let token = CancellationToken::new();
    let job = state.service.await_job(&id, &token).await?;
    Ok(Json(job))
}

/// Persist a completed analysis's draft structure as an editable form.
pub async fn save_analysis_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<crate::db::FormRecord>, ServiceError> {
    let job = state.service.get_job(&id)?;

    let results = match (job.status, job.results) {
        (JobStatus::Completed, Some(results)) => results,
        (JobStatus::Failed, _) => {
            return Err(ServiceError::InvalidRequest {
                message: "Analysis failed; there is no draft to save".to_string(),
            });
        }
        _ => {
            return Err(ServiceError::InvalidRequest {
                message: "Analysis is still running".to_string(),
            });
        }
    };

    let record = state.service.save_structure(&results.draft_structure)?;
    Ok(Json(record))
}

/// Best-effort cancel. A job the worker has not started is failed
/// immediately; an in-flight one stops being observed between stages.
pub async fn cancel_analysis_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<CancelResponse>, ServiceError> {
    let job = state.service.get_job(&id)?;

    let cancelled = match job.status {
        JobStatus::Pending => state.service.db.fail_job(&id, "Analysis cancelled")?,
        JobStatus::Processing => state.service.cancel_analysis(&id),
        // terminal jobs are immutable
        JobStatus::Completed | JobStatus::Failed => false,
    };

    Ok(Json(CancelResponse { cancelled }))
}
