//! Database model structs.
//!
//! This module contains the data structures for database records.

use chrono::{DateTime, Utc};
use rusqlite::Row;
use serde::{Deserialize, Serialize};

use crate::extract::ExtractedField;
use crate::form::FormStructure;
use crate::mapping::MappingSuggestion;

/// Lifecycle status of an analysis job.
///
/// `Completed` and `Failed` are terminal; the record is never written
/// again once it reaches either.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Persisted, waiting for the worker
    Pending,
    /// The worker has started the pipeline
    Processing,
    /// Terminal, carries results
    Completed,
    /// Terminal, carries an error message
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s {
            "pending" => JobStatus::Pending,
            "processing" => JobStatus::Processing,
            "failed" => JobStatus::Failed,
            _ => JobStatus::Completed,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

/// What an analysis produced: the extracted fields, the mapping
/// suggestions and a draft structure ready for the builder.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisResults {
    #[serde(default)]
    pub form_title: Option<String>,
    pub fields: Vec<ExtractedField>,
    pub suggestions: Vec<MappingSuggestion>,
    pub draft_structure: FormStructure,
    /// True when the vision fallback contributed the field labels
    #[serde(default)]
    pub used_vision: bool,
}

/// Analysis job record
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisJob {
    pub id: String,
    pub status: JobStatus,
    /// Stored path of the uploaded PDF
    pub input_path: String,
    pub original_filename: String,
    pub file_hash: String,
    /// Caller-provided target schema; the built-in default is used when
    /// absent
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_schema: Option<crate::mapping::TargetSchema>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub results: Option<AnalysisResults>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl AnalysisJob {
    pub(crate) fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        let status_str: String = row.get(1)?;
        let target_schema_str: Option<String> = row.get(5)?;
        let results_str: Option<String> = row.get(6)?;
        let created_at_str: String = row.get(8)?;
        let started_at_str: Option<String> = row.get(9)?;
        let completed_at_str: Option<String> = row.get(10)?;

        Ok(Self {
            id: row.get(0)?,
            status: JobStatus::from_str(&status_str),
            input_path: row.get(2)?,
            original_filename: row.get(3)?,
            file_hash: row.get(4)?,
            target_schema: target_schema_str.and_then(|s| serde_json::from_str(&s).ok()),
            results: results_str.and_then(|s| serde_json::from_str(&s).ok()),
            error: row.get(7)?,
            created_at: parse_timestamp(&created_at_str),
            started_at: started_at_str.as_deref().map(parse_timestamp),
            completed_at: completed_at_str.as_deref().map(parse_timestamp),
        })
    }
}

/// Persisted form structure with bookkeeping columns
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FormRecord {
    pub id: String,
    pub title: String,
    pub structure: FormStructure,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl FormRecord {
    pub(crate) fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        let structure_str: String = row.get(2)?;
        let created_at_str: String = row.get(3)?;
        let updated_at_str: String = row.get(4)?;

        let id: String = row.get(0)?;
        let title: String = row.get(1)?;

        let structure = serde_json::from_str(&structure_str).unwrap_or_else(|_| {
            // a corrupt row still surfaces as an (empty) form
            FormStructure::new(id.clone(), title.clone())
        });

        Ok(Self {
            id,
            title,
            structure,
            created_at: parse_timestamp(&created_at_str),
            updated_at: parse_timestamp(&updated_at_str),
        })
    }
}

fn parse_timestamp(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}
