//! Async job coordinator: submit, background worker, bounded poller.
//!
//! Submission persists a pending job and returns immediately; a single
//! background worker consumes the queue and is the only writer of status
//! transitions. Pollers read the job row on a fixed interval up to a
//! bounded attempt count and synthesize a timeout failure past the bound.

use std::sync::Arc;

use chrono::Utc;
use metrics::counter;
use sha2::{Digest, Sha256};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::db::{AnalysisJob, JobStatus};
use crate::error::{ExtractionError, JobError, ServiceError, ServiceResult};
use crate::mapping::TargetSchema;
use crate::service::FormsmithService;

impl FormsmithService {
    /// Persist the upload and enqueue an analysis job.
    ///
    /// Returns as soon as the pending row exists; the worker does the
    /// actual work. Clients poll `get_job` (or `await_job`) for the
    /// outcome.
    pub async fn submit_analysis(
        &self,
        content: &[u8],
        filename: &str,
        target_schema: Option<TargetSchema>,
    ) -> ServiceResult<AnalysisJob> {
        let max_size = self.config.storage.max_upload_bytes;
        if content.len() as u64 > max_size {
            return Err(ServiceError::Extraction(ExtractionError::FileTooLarge {
                size: content.len() as u64,
                max: max_size,
            }));
        }

        let file_hash = format!("{:x}", Sha256::digest(content));
        let job_id = format!("job_{}", Uuid::new_v4().simple());

        // Save the bytes under the data dir before the row exists; a
        // pending row must always point at a readable file.
        let uploads_dir = self.config.storage.data_dir.join("uploads");
        std::fs::create_dir_all(&uploads_dir)
            .map_err(|e| ServiceError::Extraction(ExtractionError::Io(e)))?;
        let input_path = uploads_dir.join(format!("{}_{}", job_id, sanitize_filename(filename)));
        std::fs::write(&input_path, content)
            .map_err(|e| ServiceError::Extraction(ExtractionError::Io(e)))?;

        let job = AnalysisJob {
            id: job_id.clone(),
            status: JobStatus::Pending,
            input_path: input_path.to_string_lossy().to_string(),
            original_filename: filename.to_string(),
            file_hash,
            target_schema,
            results: None,
            error: None,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
        };

        self.db.insert_job(&job)?;
        counter!("formsmith_analysis_jobs_submitted_total").increment(1);

        info!(job_id = %job_id, filename = %filename, "Analysis job queued");
        Ok(job)
    }

    /// Poll a job by id.
    pub fn get_job(&self, job_id: &str) -> ServiceResult<AnalysisJob> {
        self.db.get_job(job_id)?.ok_or(ServiceError::JobNotFound {
            job_id: job_id.to_string(),
        })
    }

    /// Start the analysis worker. Called once on server startup; resumes
    /// any jobs a previous run left behind.
    pub fn start_analysis_worker(service: Arc<FormsmithService>) {
        match service.db.requeue_stale_jobs() {
            Ok(count) if count > 0 => info!(count, "Re-queued stale analysis jobs"),
            Err(e) => warn!(error = %e, "Failed to re-queue stale jobs"),
            _ => {}
        }

        tokio::spawn(async move {
            info!("Analysis worker started");
            let idle = service.config.jobs.worker_idle();
            loop {
                match service.db.get_next_pending_job() {
                    Ok(Some(job)) => {
                        info!(job_id = %job.id, filename = %job.original_filename, "Processing queued analysis");
                        service.process_job(&job).await;
                    }
                    Ok(None) => {
                        tokio::time::sleep(idle).await;
                    }
                    Err(e) => {
                        error!(error = %e, "Failed to check for pending analysis jobs");
                        tokio::time::sleep(idle * 2).await;
                    }
                }
            }
        });
    }

    /// Run one job to a terminal state. The worker is the only caller.
    pub(crate) async fn process_job(&self, job: &AnalysisJob) {
        let cancel_token = self.register_analysis_token(&job.id);

        if !self.db.mark_job_processing(&job.id).unwrap_or(false) {
            // claimed or cancelled elsewhere
            self.unregister_analysis_token(&job.id);
            return;
        }

        let outcome = match std::fs::read(&job.input_path) {
            Ok(bytes) => {
                self.run_analysis_pipeline(&bytes, job.target_schema.clone(), &cancel_token)
                    .await
            }
            Err(e) => Err(ServiceError::Extraction(ExtractionError::Io(e))),
        };

        match outcome {
            Ok(results) => {
                if let Err(e) = self.db.complete_job(&job.id, &results) {
                    error!(job_id = %job.id, error = %e, "Failed to mark job completed");
                }
                counter!("formsmith_analysis_jobs_completed_total").increment(1);
                info!(
                    job_id = %job.id,
                    fields = results.fields.len(),
                    suggestions = results.suggestions.len(),
                    used_vision = results.used_vision,
                    "Analysis complete"
                );
            }
            Err(e) => {
                let message = e.to_string();
                if let Err(update_err) = self.db.fail_job(&job.id, &message) {
                    error!(
                        job_id = %job.id,
                        original_error = %message,
                        update_error = %update_err,
                        "Failed to mark job failed"
                    );
                }
                counter!("formsmith_analysis_jobs_failed_total").increment(1);
                warn!(job_id = %job.id, error = %message, "Analysis failed");
            }
        }

        self.unregister_analysis_token(&job.id);
    }

    /// Poll a job until it is terminal, on the configured interval, up to
    /// the configured attempt bound.
    ///
    /// Exceeding the bound synthesizes a timeout failure; the worker may
    /// still finish later, and that late result is safely discardable.
    /// Cancelling the token stops observation without leaking timers.
    pub async fn await_job(
        &self,
        job_id: &str,
        cancel_token: &CancellationToken,
    ) -> ServiceResult<AnalysisJob> {
        let mut interval = tokio::time::interval(self.config.jobs.poll_interval());
        // the first tick fires immediately; it does not count as waiting
        interval.tick().await;

        let max_attempts = self.config.jobs.max_poll_attempts;
        for _attempt in 0..max_attempts {
            tokio::select! {
                _ = cancel_token.cancelled() => {
                    return Err(JobError::Cancelled.into());
                }
                _ = interval.tick() => {}
            }

            let job = self.get_job(job_id)?;
            if job.status.is_terminal() {
                return Ok(job);
            }
        }

        warn!(job_id = %job_id, attempts = max_attempts, "Job polling exceeded attempt bound");
        Err(JobError::Timeout {
            attempts: max_attempts,
        }
        .into())
    }
}

fn sanitize_filename(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_whitespace() => '_',
            c => c,
        })
        .collect::<String>()
        .trim_matches('_')
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StaticConfig;
    use crate::db::Database;
    use std::sync::Arc;

    fn test_service(data_dir: &std::path::Path) -> FormsmithService {
        let mut config: StaticConfig = serde_json::from_str("{}").unwrap();
        config.storage.data_dir = data_dir.to_path_buf();
        // fast polling so the timeout test completes quickly
        config.jobs.poll_interval_secs = 1;
        config.jobs.max_poll_attempts = 2;

        FormsmithService {
            config: Arc::new(config),
            db: Arc::new(Database::open_in_memory().unwrap()),
            vision: Arc::new(
                crate::vision::VisionService::new(crate::config::default_vision()).unwrap(),
            ),
            analysis_cancellation_tokens: dashmap::DashMap::new(),
            metrics: None,
        }
    }

    #[test]
    fn test_sanitize_filename() {
        assert_eq!(sanitize_filename("my upload.pdf"), "my_upload.pdf");
        assert_eq!(sanitize_filename("a/b:c.pdf"), "a_b_c.pdf");
    }

    #[tokio::test]
    async fn test_submit_creates_pending_job() {
        let dir = tempfile::tempdir().unwrap();
        let service = test_service(dir.path());

        let job = service
            .submit_analysis(b"%PDF-1.5 fake", "form.pdf", None)
            .await
            .unwrap();

        assert_eq!(job.status, JobStatus::Pending);
        assert!(std::path::Path::new(&job.input_path).exists());

        let fetched = service.get_job(&job.id).unwrap();
        assert_eq!(fetched.status, JobStatus::Pending);
    }

    #[tokio::test]
    async fn test_submit_rejects_oversized_upload() {
        let dir = tempfile::tempdir().unwrap();
        let mut service = test_service(dir.path());
        let mut config = (*service.config).clone();
        config.storage.max_upload_bytes = 4;
        service.config = Arc::new(config);

        let result = service.submit_analysis(b"too big", "form.pdf", None).await;
        assert!(matches!(
            result,
            Err(ServiceError::Extraction(ExtractionError::FileTooLarge { .. }))
        ));
    }

    #[tokio::test]
    async fn test_poll_unknown_job_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let service = test_service(dir.path());

        assert!(matches!(
            service.get_job("missing"),
            Err(ServiceError::JobNotFound { .. })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_await_job_synthesizes_timeout() {
        let dir = tempfile::tempdir().unwrap();
        let service = test_service(dir.path());

        // a job that never reaches a terminal state
        let job = service
            .submit_analysis(b"%PDF-1.5 fake", "form.pdf", None)
            .await
            .unwrap();

        let token = CancellationToken::new();
        let result = service.await_job(&job.id, &token).await;

        assert!(matches!(
            result,
            Err(ServiceError::Job(JobError::Timeout { attempts: 2 }))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_await_job_cancellation_stops_polling() {
        let dir = tempfile::tempdir().unwrap();
        let service = test_service(dir.path());
        let job = service
            .submit_analysis(b"%PDF-1.5 fake", "form.pdf", None)
            .await
            .unwrap();

        let token = CancellationToken::new();
        token.cancel();
        let result = service.await_job(&job.id, &token).await;

        assert!(matches!(
            result,
            Err(ServiceError::Job(JobError::Cancelled))
        ));
    }

    #[tokio::test]
    async fn test_fieldless_pdf_degrades_to_no_fields_found() {
        // A valid PDF with no interactive fields and no title: extraction
        // succeeds empty, the vision fallback fails (no renderer or
        // backend in the test environment), and the job fails with the
        // no-fields message instead of crashing.
        let dir = tempfile::tempdir().unwrap();
        let service = test_service(dir.path());

        let job = service
            .submit_analysis(&fieldless_pdf(), "blank.pdf", None)
            .await
            .unwrap();
        service.process_job(&job).await;

        let finished = service.get_job(&job.id).unwrap();
        assert_eq!(finished.status, JobStatus::Failed);
        assert!(
            finished
                .error
                .as_deref()
                .unwrap_or("")
                .contains("No form fields found"),
            "unexpected error: {:?}",
            finished.error
        );
    }

    fn fieldless_pdf() -> Vec<u8> {
        use lopdf::{Document, Object, dictionary};

        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
        });
        let pages = dictionary! {
            "Type" => "Pages",
            "Kids" => vec![Object::Reference(page_id)],
            "Count" => 1,
        };
        doc.objects.insert(pages_id, Object::Dictionary(pages));
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);

        let mut bytes = Vec::new();
        doc.save_to(&mut bytes).expect("in-memory save");
        bytes
    }

    #[tokio::test]
    async fn test_process_job_fails_on_unparseable_pdf() {
        let dir = tempfile::tempdir().unwrap();
        let service = test_service(dir.path());

        let job = service
            .submit_analysis(b"definitely not a pdf", "junk.pdf", None)
            .await
            .unwrap();

        service.process_job(&job).await;

        let finished = service.get_job(&job.id).unwrap();
        assert_eq!(finished.status, JobStatus::Failed);
        assert!(finished.error.is_some());
        assert!(finished.completed_at.is_some());
    }
}
