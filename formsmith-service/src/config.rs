//! Service configuration.
//!
//! Loaded once at startup from `config.*` files and `FORMSMITH__`-prefixed
//! environment variables. All settings are startup-static; there is no
//! runtime settings surface.

use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Top-level service configuration
#[derive(Debug, Clone, Deserialize)]
pub struct StaticConfig {
    #[serde(default = "default_server")]
    pub server: ServerConfig,

    #[serde(default = "default_storage")]
    pub storage: StorageConfig,

    #[serde(default = "default_vision")]
    pub vision: VisionConfig,

    #[serde(default = "default_mapping")]
    pub mapping: MappingConfig,

    #[serde(default = "default_jobs")]
    pub jobs: JobsConfig,

    #[serde(default = "default_document")]
    pub document: DocumentConfig,
}

/// HTTP server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,
}

/// Storage configuration
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Maximum accepted upload size in bytes
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: u64,
}

/// Which chat protocol a model backend speaks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    /// Ollama `/api/chat`
    Ollama,
    /// OpenAI-compatible `/v1/chat/completions`
    OpenaiCompatible,
}

/// A single generative-model backend
#[derive(Debug, Clone, Deserialize)]
pub struct ModelBackendConfig {
    #[serde(default = "default_backend_kind")]
    pub kind: BackendKind,

    #[serde(default = "default_backend_url")]
    pub base_url: String,

    #[serde(default = "default_vision_model")]
    pub model: String,

    /// Optional bearer token for OpenAI-compatible backends
    #[serde(default)]
    pub api_key: Option<String>,
}

/// Vision fallback configuration
#[derive(Debug, Clone, Deserialize)]
pub struct VisionConfig {
    /// Primary provider for page-image field inference
    #[serde(default = "default_primary_backend")]
    pub primary: ModelBackendConfig,

    /// Optional secondary provider tried when the primary fails
    #[serde(default)]
    pub fallback: Option<ModelBackendConfig>,

    /// Scale factor applied when rasterizing page 1 for legibility
    #[serde(default = "default_render_scale")]
    pub render_scale: f32,

    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

/// Mapping suggestion configuration
#[derive(Debug, Clone, Deserialize)]
pub struct MappingConfig {
    /// Run the generative-model pass on top of the rule pass
    #[serde(default = "default_ai_pass")]
    pub ai_pass: bool,

    /// Text model used for the AI mapping pass (primary vision backend's
    /// base URL is reused)
    #[serde(default = "default_mapping_model")]
    pub model: String,

    /// Suggestions below this confidence are flagged for human review
    #[serde(default = "default_review_threshold")]
    pub review_threshold: f64,
}

/// Analysis job coordinator configuration
#[derive(Debug, Clone, Deserialize)]
pub struct JobsConfig {
    /// Interval between poll reads of a job record, in seconds
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,

    /// Poll attempts before a timeout failure is synthesized
    #[serde(default = "default_max_poll_attempts")]
    pub max_poll_attempts: u32,

    /// Idle sleep of the background worker between queue checks, in seconds
    #[serde(default = "default_worker_idle_secs")]
    pub worker_idle_secs: u64,
}

/// Document renderer configuration
#[derive(Debug, Clone, Deserialize)]
pub struct DocumentConfig {
    /// Brand name printed in the header block of every page
    #[serde(default = "default_brand_name")]
    pub brand_name: String,

    /// Contact line printed in the footer block of every page
    #[serde(default = "default_contact_line")]
    pub contact_line: String,
}

impl JobsConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn worker_idle(&self) -> Duration {
        Duration::from_secs(self.worker_idle_secs)
    }
}

impl VisionConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

// ==================== Default Value Functions ====================

pub(crate) fn default_server() -> ServerConfig {
    ServerConfig {
        host: default_host(),
        port: default_port(),
    }
}

pub(crate) fn default_host() -> String {
    "0.0.0.0".to_string()
}

pub(crate) fn default_port() -> u16 {
    8080
}

pub(crate) fn default_storage() -> StorageConfig {
    StorageConfig {
        data_dir: default_data_dir(),
        max_upload_bytes: default_max_upload_bytes(),
    }
}

pub(crate) fn default_data_dir() -> PathBuf {
    PathBuf::from("./data")
}

pub(crate) fn default_max_upload_bytes() -> u64 {
    50 * 1024 * 1024
}

pub(crate) fn default_vision() -> VisionConfig {
    VisionConfig {
        primary: default_primary_backend(),
        fallback: None,
        render_scale: default_render_scale(),
        request_timeout_secs: default_request_timeout_secs(),
    }
}

pub(crate) fn default_primary_backend() -> ModelBackendConfig {
    ModelBackendConfig {
        kind: default_backend_kind(),
        base_url: default_backend_url(),
        model: default_vision_model(),
        api_key: None,
    }
}

pub(crate) fn default_backend_kind() -> BackendKind {
    BackendKind::Ollama
}

pub(crate) fn default_backend_url() -> String {
    "http://localhost:11434".to_string()
}

pub(crate) fn default_vision_model() -> String {
    "llama3.2-vision".to_string()
}

pub(crate) fn default_render_scale() -> f32 {
    2.0
}

pub(crate) fn default_request_timeout_secs() -> u64 {
    120
}

pub(crate) fn default_mapping() -> MappingConfig {
    MappingConfig {
        ai_pass: default_ai_pass(),
        model: default_mapping_model(),
        review_threshold: default_review_threshold(),
    }
}

pub(crate) fn default_ai_pass() -> bool {
    true
}

pub(crate) fn default_mapping_model() -> String {
    "llama3.2".to_string()
}

pub(crate) fn default_review_threshold() -> f64 {
    0.5
}

pub(crate) fn default_jobs() -> JobsConfig {
    JobsConfig {
        poll_interval_secs: default_poll_interval_secs(),
        max_poll_attempts: default_max_poll_attempts(),
        worker_idle_secs: default_worker_idle_secs(),
    }
}

pub(crate) fn default_poll_interval_secs() -> u64 {
    5
}

pub(crate) fn default_max_poll_attempts() -> u32 {
    60
}

pub(crate) fn default_worker_idle_secs() -> u64 {
    2
}

pub(crate) fn default_document() -> DocumentConfig {
    DocumentConfig {
        brand_name: default_brand_name(),
        contact_line: default_contact_line(),
    }
}

pub(crate) fn default_brand_name() -> String {
    "Formsmith".to_string()
}

pub(crate) fn default_contact_line() -> String {
    "support@formsmith.dev · (800) 555-0134".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_deserialize_from_empty() {
        let config: StaticConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.jobs.poll_interval_secs, 5);
        assert_eq!(config.jobs.max_poll_attempts, 60);
        assert!(config.vision.fallback.is_none());
        assert_eq!(config.vision.primary.kind, BackendKind::Ollama);
    }

    #[test]
    fn test_backend_kind_from_snake_case() {
        let backend: ModelBackendConfig = serde_json::from_str(
            r#"{"kind": "openai_compatible", "base_url": "http://localhost:8000", "model": "gpt-4o-mini"}"#,
        )
        .unwrap();
        assert_eq!(backend.kind, BackendKind::OpenaiCompatible);
    }
}
