//! Analysis job persistence.
//!
//! The background worker is the sole writer of status transitions; API
//! handlers and pollers only read. Terminal rows are immutable: the
//! transition queries refuse to touch a row that is already completed or
//! failed.

use chrono::Utc;
use rusqlite::{OptionalExtension, params};

use super::Database;
use super::models::{AnalysisJob, AnalysisResults, JobStatus};
use crate::error::{DatabaseError, ServiceResult};

const JOB_COLUMNS: &str =
    "id, status, input_path, original_filename, file_hash, target_schema, results, error, \
     created_at, started_at, completed_at";

impl Database {
    /// Insert a new pending job
    pub fn insert_job(&self, job: &AnalysisJob) -> ServiceResult<()> {
        let conn = self.conn.lock().unwrap();

        let results_json = job
            .results
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .map_err(DatabaseError::Serialization)?;
        let schema_json = job
            .target_schema
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .map_err(DatabaseError::Serialization)?;

        conn.execute(
            r#"
            INSERT INTO analysis_jobs
                (id, status, input_path, original_filename, file_hash, target_schema,
                 results, error, created_at, started_at, completed_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
            "#,
            params![
                job.id,
                job.status.as_str(),
                job.input_path,
                job.original_filename,
                job.file_hash,
                schema_json,
                results_json,
                job.error,
                job.created_at.to_rfc3339(),
                job.started_at.map(|t| t.to_rfc3339()),
                job.completed_at.map(|t| t.to_rfc3339()),
            ],
        )
        .map_err(DatabaseError::Query)?;

        Ok(())
    }

    /// Get a job by ID
    pub fn get_job(&self, id: &str) -> ServiceResult<Option<AnalysisJob>> {
        let conn = self.conn.lock().unwrap();

        conn.query_row(
            &format!("SELECT {} FROM analysis_jobs WHERE id = ?1", JOB_COLUMNS),
            params![id],
            AnalysisJob::from_row,
        )
        .optional()
        .map_err(DatabaseError::Query)
        .map_err(Into::into)
    }

    /// Oldest pending job, if any. Called by the background worker.
    pub fn get_next_pending_job(&self) -> ServiceResult<Option<AnalysisJob>> {
        let conn = self.conn.lock().unwrap();

        conn.query_row(
            &format!(
                "SELECT {} FROM analysis_jobs WHERE status = 'pending' \
                 ORDER BY created_at ASC LIMIT 1",
                JOB_COLUMNS
            ),
            [],
            AnalysisJob::from_row,
        )
        .optional()
        .map_err(DatabaseError::Query)
        .map_err(Into::into)
    }

    /// Transition a pending job to processing and stamp `started_at`.
    pub fn mark_job_processing(&self, id: &str) -> ServiceResult<bool> {
        let conn = self.conn.lock().unwrap();

        let rows = conn
            .execute(
                "UPDATE analysis_jobs SET status = 'processing', started_at = ?2 \
                 WHERE id = ?1 AND status = 'pending'",
                params![id, Utc::now().to_rfc3339()],
            )
            .map_err(DatabaseError::Query)?;

        Ok(rows > 0)
    }

    /// Terminal success transition.
    pub fn complete_job(&self, id: &str, results: &AnalysisResults) -> ServiceResult<bool> {
        let conn = self.conn.lock().unwrap();

        let results_json = serde_json::to_string(results).map_err(DatabaseError::Serialization)?;

        let rows = conn
            .execute(
                "UPDATE analysis_jobs SET status = 'completed', results = ?2, completed_at = ?3 \
                 WHERE id = ?1 AND status IN ('pending', 'processing')",
                params![id, results_json, Utc::now().to_rfc3339()],
            )
            .map_err(DatabaseError::Query)?;

        Ok(rows > 0)
    }

    /// Terminal failure transition.
    pub fn fail_job(&self, id: &str, error: &str) -> ServiceResult<bool> {
        let conn = self.conn.lock().unwrap();

        let rows = conn
            .execute(
                "UPDATE analysis_jobs SET status = 'failed', error = ?2, completed_at = ?3 \
                 WHERE id = ?1 AND status IN ('pending', 'processing')",
                params![id, error, Utc::now().to_rfc3339()],
            )
            .map_err(DatabaseError::Query)?;

        Ok(rows > 0)
    }

    /// Jobs left in `processing` by a previous run are re-queued on
    /// startup so the worker picks them up again.
    pub fn requeue_stale_jobs(&self) -> ServiceResult<usize> {
        let conn = self.conn.lock().unwrap();

        let rows = conn
            .execute(
                "UPDATE analysis_jobs SET status = 'pending', started_at = NULL \
                 WHERE status = 'processing'",
                [],
            )
            .map_err(DatabaseError::Query)?;

        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pending_job(id: &str) -> AnalysisJob {
        AnalysisJob {
            id: id.to_string(),
            status: JobStatus::Pending,
            input_path: format!("/tmp/{}.pdf", id),
            original_filename: "upload.pdf".to_string(),
            file_hash: "abc123".to_string(),
            target_schema: None,
            results: None,
            error: None,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
        }
    }

    fn empty_results() -> AnalysisResults {
        AnalysisResults {
            form_title: Some("T".to_string()),
            fields: vec![],
            suggestions: vec![],
            draft_structure: crate::form::FormStructure::new("f", "T"),
            used_vision: false,
        }
    }

    #[test]
    fn test_job_lifecycle() {
        let db = Database::open_in_memory().unwrap();
        db.insert_job(&pending_job("job_1")).unwrap();

        let job = db.get_job("job_1").unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Pending);
        assert!(job.started_at.is_none());

        assert!(db.mark_job_processing("job_1").unwrap());
        let job = db.get_job("job_1").unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Processing);
        assert!(job.started_at.is_some());

        assert!(db.complete_job("job_1", &empty_results()).unwrap());
        let job = db.get_job("job_1").unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Completed);
        assert!(job.results.is_some());
        assert!(job.completed_at.is_some());
    }

    #[test]
    fn test_terminal_jobs_are_immutable() {
        let db = Database::open_in_memory().unwrap();
        db.insert_job(&pending_job("job_1")).unwrap();
        db.mark_job_processing("job_1").unwrap();
        db.fail_job("job_1", "boom").unwrap();

        // no transition out of a terminal state
        assert!(!db.complete_job("job_1", &empty_results()).unwrap());
        assert!(!db.mark_job_processing("job_1").unwrap());
        assert!(!db.fail_job("job_1", "again").unwrap());

        let job = db.get_job("job_1").unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.error.as_deref(), Some("boom"));
    }

    #[test]
    fn test_next_pending_is_oldest() {
        let db = Database::open_in_memory().unwrap();

        let mut first = pending_job("job_a");
        first.created_at = Utc::now() - chrono::Duration::seconds(60);
        db.insert_job(&first).unwrap();
        db.insert_job(&pending_job("job_b")).unwrap();

        let next = db.get_next_pending_job().unwrap().unwrap();
        assert_eq!(next.id, "job_a");
    }

    #[test]
    fn test_requeue_stale_jobs() {
        let db = Database::open_in_memory().unwrap();
        db.insert_job(&pending_job("job_1")).unwrap();
        db.mark_job_processing("job_1").unwrap();

        assert_eq!(db.requeue_stale_jobs().unwrap(), 1);
        let job = db.get_job("job_1").unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Pending);
    }
}
