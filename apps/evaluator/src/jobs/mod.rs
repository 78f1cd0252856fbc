//! HTTP surface for submitting documents and evaluation jobs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::{Document, DocumentCategory, EvaluationJob, EvaluationResult, JobStatus};

pub mod handlers;
pub mod upload;

pub const MAX_JOB_TITLE_LEN: usize = 255;

#[derive(Debug, Deserialize)]
pub struct EvaluateRequest {
    pub job_title: String,
    pub cv_document_id: Uuid,
    pub project_document_id: Uuid,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct EvaluateResponse {
    pub id: Uuid,
    pub status: JobStatus,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DocumentResponse {
    pub id: Uuid,
    pub filename: String,
    pub file_type: DocumentCategory,
    pub file_size: i64,
    pub uploaded_at: DateTime<Utc>,
}

impl From<Document> for DocumentResponse {
    fn from(doc: Document) -> Self {
        Self {
            id: doc.id,
            filename: doc.filename,
            file_type: doc.category,
            file_size: doc.file_size,
            uploaded_at: doc.uploaded_at,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UploadResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cv_document: Option<DocumentResponse>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project_document: Option<DocumentResponse>,
    pub message: String,
}

/// `result` only on completed jobs, `error_message` only on failed ones.
#[derive(Debug, Serialize, Deserialize)]
pub struct ResultResponse {
    pub id: Uuid,
    pub job_title: String,
    pub status: JobStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<EvaluationResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl From<EvaluationJob> for ResultResponse {
    fn from(job: EvaluationJob) -> Self {
        let completed = job.status == JobStatus::Completed;
        let failed = job.status == JobStatus::Failed;
        Self {
            id: job.id,
            job_title: job.job_title,
            status: job.status,
            result: job.result.filter(|_| completed),
            error_message: job.error_message.filter(|_| failed),
            created_at: job.created_at,
            completed_at: job.completed_at,
        }
    }
}

/// Titles are 1 to 255 characters after trimming.
pub fn validate_job_title(title: &str) -> Result<&str, AppError> {
    let title = title.trim();
    if title.is_empty() {
        return Err(AppError::Validation("job_title must not be empty".to_string()));
    }
    if title.chars().count() > MAX_JOB_TITLE_LEN {
        return Err(AppError::Validation(format!(
            "job_title must be at most {MAX_JOB_TITLE_LEN} characters"
        )));
    }
    Ok(title)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_title_bounds() {
        assert_eq!(validate_job_title("  Backend Engineer ").unwrap(), "Backend Engineer");
        assert!(validate_job_title("   ").is_err());
        assert!(validate_job_title(&"x".repeat(255)).is_ok());
        assert!(validate_job_title(&"x".repeat(256)).is_err());
    }

    #[test]
    fn test_result_response_hides_fields_by_status() {
        let mut job = EvaluationJob::new("Backend Engineer", Uuid::new_v4(), Uuid::new_v4());
        job.status = JobStatus::Processing;
        job.error_message = Some("stale".to_string());

        let value = serde_json::to_value(ResultResponse::from(job)).unwrap();
        assert_eq!(value["status"], "processing");
        assert!(value.get("result").is_none());
        assert!(value.get("error_message").is_none());
        assert!(value.get("completed_at").is_none());
    }
}
