use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

/// Main service error type
#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Form not found: {form_id}")]
    FormNotFound { form_id: String },

    #[error("Analysis job not found: {job_id}")]
    JobNotFound { job_id: String },

    #[error("{0}")]
    Extraction(#[from] ExtractionError),

    #[error("{0}")]
    Vision(#[from] VisionError),

    #[error("Database error")]
    Database(#[from] DatabaseError),

    #[error("{0}")]
    Job(#[from] JobError),

    #[error("Document rendering failed: {message}")]
    Render { message: String },

    #[error("Invalid request: {message}")]
    InvalidRequest { message: String },

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

/// Field extraction errors.
///
/// Only an unparseable byte stream is fatal; a field whose value cannot be
/// read is skipped, not an error.
#[derive(Error, Debug)]
pub enum ExtractionError {
    #[error("Not a parseable PDF document")]
    UnparseableDocument {
        #[source]
        source: lopdf::Error,
    },

    #[error("File too large: {size} bytes (max {max} bytes)")]
    FileTooLarge { size: u64, max: u64 },

    #[error("IO error")]
    Io(#[source] std::io::Error),
}

/// Vision fallback errors.
///
/// All variants are recoverable at the pipeline level: the analysis
/// degrades to normalized extracted names rather than failing.
#[derive(Error, Debug)]
pub enum VisionError {
    #[error("PDF rendering engine unavailable")]
    RenderUnavailable { message: String },

    #[error("Failed to rasterize page {page}")]
    Rasterize { page: u32, message: String },

    #[error("Connection failed to model backend at {url}")]
    Connection {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Model not found: {model}")]
    ModelNotFound { model: String },

    #[error("Generation failed (status {status}): {message}")]
    Generation { status: u16, message: String },

    #[error("Invalid response from model backend")]
    InvalidResponse {
        #[source]
        source: serde_json::Error,
    },
}

/// Database errors
#[derive(Error, Debug)]
pub enum DatabaseError {
    #[error("Database connection failed")]
    Connection(#[source] rusqlite::Error),

    #[error("Query failed")]
    Query(#[source] rusqlite::Error),

    #[error("Migration failed: {message}")]
    Migration { message: String },

    #[error("Serialization failed")]
    Serialization(#[source] serde_json::Error),
}

/// Analysis job errors
#[derive(Error, Debug)]
pub enum JobError {
    #[error("Analysis timed out after {attempts} poll attempts")]
    Timeout { attempts: u32 },

    #[error("Analysis cancelled")]
    Cancelled,

    #[error("No form fields found — use manual construction instead")]
    NoFieldsFound,
}

/// API error response body
#[derive(Serialize)]
pub struct ErrorResponse {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ServiceError {
    fn status_code(&self) -> StatusCode {
        match self {
            ServiceError::FormNotFound { .. } | ServiceError::JobNotFound { .. } => {
                StatusCode::NOT_FOUND
            }
            ServiceError::InvalidRequest { .. } => StatusCode::BAD_REQUEST,
            ServiceError::Extraction(ExtractionError::UnparseableDocument { .. }) => {
                StatusCode::UNSUPPORTED_MEDIA_TYPE
            }
            ServiceError::Extraction(ExtractionError::FileTooLarge { .. }) => {
                StatusCode::PAYLOAD_TOO_LARGE
            }
            ServiceError::Vision(VisionError::ModelNotFound { .. }) => StatusCode::NOT_FOUND,
            ServiceError::Job(JobError::Timeout { .. }) => StatusCode::GATEWAY_TIMEOUT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_code(&self) -> &'static str {
        match self {
            ServiceError::FormNotFound { .. } => "form_not_found",
            ServiceError::JobNotFound { .. } => "job_not_found",
            ServiceError::Extraction(ExtractionError::UnparseableDocument { .. }) => {
                "unparseable_document"
            }
            ServiceError::Extraction(ExtractionError::FileTooLarge { .. }) => "file_too_large",
            ServiceError::Extraction(ExtractionError::Io(_)) => "io_error",
            ServiceError::Vision(VisionError::RenderUnavailable { .. }) => "render_unavailable",
            ServiceError::Vision(VisionError::Rasterize { .. }) => "rasterize_error",
            ServiceError::Vision(VisionError::Connection { .. }) => "model_connection",
            ServiceError::Vision(VisionError::ModelNotFound { .. }) => "model_not_found",
            ServiceError::Vision(VisionError::Generation { .. }) => "model_generation",
            ServiceError::Vision(VisionError::InvalidResponse { .. }) => "model_invalid_response",
            ServiceError::Database(_) => "database_error",
            ServiceError::Job(JobError::Timeout { .. }) => "analysis_timeout",
            ServiceError::Job(JobError::Cancelled) => "analysis_cancelled",
            ServiceError::Job(JobError::NoFieldsFound) => "no_fields_found",
            ServiceError::Render { .. } => "render_error",
            ServiceError::InvalidRequest { .. } => "invalid_request",
            ServiceError::Config { .. } => "config_error",
            ServiceError::Internal { .. } => "internal_error",
        }
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let code = self.error_code().to_string();

        let response = ErrorResponse {
            message: self.to_string(),
            code: Some(code),
            details: None,
        };

        (status, Json(response)).into_response()
    }
}

/// Result type alias for service operations
pub type ServiceResult<T> = Result<T, ServiceError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_maps_to_404() {
        let err = ServiceError::FormNotFound {
            form_id: "abc".to_string(),
        };
        assert_eq!(err.status_code(), StatusCode::NOT_FOUND);
        assert_eq!(err.error_code(), "form_not_found");
    }

    #[test]
    fn test_timeout_maps_to_gateway_timeout() {
        let err = ServiceError::Job(JobError::Timeout { attempts: 60 });
        assert_eq!(err.status_code(), StatusCode::GATEWAY_TIMEOUT);
        assert_eq!(err.error_code(), "analysis_timeout");
    }

    #[test]
    fn test_unparseable_document_maps_to_unsupported_media() {
        let source = lopdf::Document::load_mem(b"not a pdf").unwrap_err();
        let err = ServiceError::Extraction(ExtractionError::UnparseableDocument { source });
        assert_eq!(err.status_code(), StatusCode::UNSUPPORTED_MEDIA_TYPE);
    }
}
