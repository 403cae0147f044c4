mod analysis;
mod jobs;

use std::sync::Arc;

use chrono::Utc;
use dashmap::DashMap;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::StaticConfig;
use crate::db::{Database, FormRecord};
use crate::error::{ServiceError, ServiceResult};
use crate::form::FormStructure;
use crate::vision::VisionService;

/// Main service coordinator
pub struct FormsmithService {
    pub config: Arc<StaticConfig>,
    pub db: Arc<Database>,
    pub vision: Arc<VisionService>,
    /// Cancellation tokens for in-flight analyses, keyed by job id
    analysis_cancellation_tokens: DashMap<String, CancellationToken>,
    /// Prometheus render handle; `None` when another recorder is already
    /// installed (tests)
    metrics: Option<PrometheusHandle>,
}

impl FormsmithService {
    /// Create a new service instance
    pub async fn new(db: Arc<Database>, config: Arc<StaticConfig>) -> ServiceResult<Self> {
        info!("Initializing Formsmith service");

        let vision = Arc::new(VisionService::new(config.vision.clone())?);

        if vision.health_check().await {
            info!(url = %config.vision.primary.base_url, "Vision model backend is available");
        } else {
            warn!(
                url = %config.vision.primary.base_url,
                "Vision model backend is not available, analyses will degrade to extracted names"
            );
        }

        let metrics = PrometheusBuilder::new().install_recorder().ok();

        Ok(Self {
            config,
            db,
            vision,
            analysis_cancellation_tokens: DashMap::new(),
            metrics,
        })
    }

    pub fn metrics_handle(&self) -> Option<PrometheusHandle> {
        self.metrics.clone()
    }

    // ── Form CRUD ────────────────────────────────────────────────────

    /// Create and persist a new empty form.
    pub fn create_form(&self, title: &str) -> ServiceResult<FormRecord> {
        let id = format!("form_{}", &Uuid::new_v4().simple().to_string()[..12]);
        let now = Utc::now();
        let record = FormRecord {
            id: id.clone(),
            title: title.to_string(),
            structure: FormStructure::new(id, title),
            created_at: now,
            updated_at: now,
        };

        self.db.insert_form(&record)?;
        info!(form_id = %record.id, title = %title, "Form created");
        Ok(record)
    }

    /// Persist an analysis draft as an editable form.
    pub fn save_structure(&self, structure: &FormStructure) -> ServiceResult<FormRecord> {
        let now = Utc::now();
        let record = FormRecord {
            id: structure.id.clone(),
            title: structure.title.clone(),
            structure: structure.clone(),
            created_at: now,
            updated_at: now,
        };
        self.db.insert_form(&record)?;
        Ok(record)
    }

    /// Replace a form's structure after validating its invariants. The
    /// persisted id always comes from `form_id`, not the payload.
    pub fn update_form_structure(
        &self,
        form_id: &str,
        structure: &FormStructure,
    ) -> ServiceResult<FormRecord> {
        structure
            .validate()
            .map_err(|message| ServiceError::InvalidRequest { message })?;

        let mut structure = structure.clone();
        structure.id = form_id.to_string();

        if !self.db.update_form(form_id, &structure)? {
            return Err(ServiceError::FormNotFound {
                form_id: form_id.to_string(),
            });
        }

        self.db.get_form(form_id)?.ok_or(ServiceError::FormNotFound {
            form_id: form_id.to_string(),
        })
    }

    // ── Cancellation token bookkeeping ───────────────────────────────

    pub(crate) fn register_analysis_token(&self, job_id: &str) -> CancellationToken {
        let token = CancellationToken::new();
        self.analysis_cancellation_tokens
            .insert(job_id.to_string(), token.clone());
        token
    }

    pub(crate) fn unregister_analysis_token(&self, job_id: &str) {
        self.analysis_cancellation_tokens.remove(job_id);
    }

    /// Best-effort cancel of an in-flight analysis. Once the worker has
    /// started, this stops observation between pipeline stages; it cannot
    /// guarantee the stage itself stops.
    pub fn cancel_analysis(&self, job_id: &str) -> bool {
        if let Some((_, token)) = self.analysis_cancellation_tokens.remove(job_id) {
            token.cancel();
            info!(job_id = %job_id, "Analysis cancellation triggered");
            true
        } else {
            false
        }
    }
}
