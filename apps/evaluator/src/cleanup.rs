//! Retention: drops old finished jobs and the uploads nothing points at anymore.

use std::io::ErrorKind;

use chrono::{Duration, Utc};
use serde::Serialize;
use tracing::{info, warn};

use crate::store::{DocumentStore, JobStore, StoreError};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CleanupReport {
    pub jobs_deleted: u64,
    pub documents_deleted: u64,
    pub files_deleted: u64,
}

/// Deletes `completed` and `failed` jobs older than `retention` (step logs go
/// with them), then every document older than `retention` that no remaining
/// job references, along with its file. Queued and processing jobs, and the
/// documents they use, are never touched.
pub async fn purge_expired(
    jobs: &dyn JobStore,
    documents: &dyn DocumentStore,
    retention: Duration,
) -> Result<CleanupReport, StoreError> {
    let cutoff = Utc::now() - retention;
    let mut report = CleanupReport {
        jobs_deleted: jobs.delete_terminal_before(cutoff).await?,
        ..CleanupReport::default()
    };

    for document in documents.unreferenced_before(cutoff).await? {
        match tokio::fs::remove_file(document.path()).await {
            Ok(()) => report.files_deleted += 1,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                warn!("Upload {} was already gone", document.file_path);
            }
            Err(e) => {
                // Keep the row so the next run tries the file again.
                warn!("Failed to delete upload {}: {e}", document.file_path);
                continue;
            }
        }
        if documents.delete_document(document.id).await? {
            report.documents_deleted += 1;
        }
    }

    info!(
        "Cleanup removed {} jobs, {} documents and {} files older than {} days",
        report.jobs_deleted,
        report.documents_deleted,
        report.files_deleted,
        retention.num_days()
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Document, DocumentCategory, EvaluationJob, JobStatus};
    use crate::store::{MemoryDocumentStore, MemoryJobStore};
    use uuid::Uuid;

    fn document(path: &str, age_days: i64) -> Document {
        Document {
            id: Uuid::new_v4(),
            filename: "cv.pdf".to_string(),
            category: DocumentCategory::Cv,
            file_path: path.to_string(),
            file_size: 10,
            mime_type: "application/pdf".to_string(),
            uploaded_at: Utc::now() - Duration::days(age_days),
        }
    }

    fn job(cv: Uuid, project: Uuid, status: JobStatus, age_days: i64) -> EvaluationJob {
        let mut job = EvaluationJob::new("Backend Engineer", cv, project);
        job.status = status;
        job.created_at = Utc::now() - Duration::days(age_days);
        job
    }

    #[tokio::test]
    async fn test_purges_old_terminal_jobs_and_their_uploads() {
        let dir = tempfile::tempdir().unwrap();
        let old_file = dir.path().join("old.pdf");
        std::fs::write(&old_file, b"%PDF-1.4").unwrap();

        let jobs = MemoryJobStore::new();
        let documents = MemoryDocumentStore::with_jobs(jobs.clone());

        let old_cv = document(old_file.to_str().unwrap(), 45);
        let old_report = document("/nonexistent/report.pdf", 45);
        documents.insert(old_cv.clone()).await;
        documents.insert(old_report.clone()).await;
        jobs.insert(job(old_cv.id, old_report.id, JobStatus::Completed, 40))
            .await;

        let report = purge_expired(&jobs, &documents, Duration::days(30))
            .await
            .unwrap();

        assert_eq!(report.jobs_deleted, 1);
        assert_eq!(report.documents_deleted, 2);
        assert_eq!(report.files_deleted, 1);
        assert!(!old_file.exists());
        assert!(!documents.exists(old_cv.id).await.unwrap());
    }

    #[tokio::test]
    async fn test_keeps_active_jobs_and_recent_uploads() {
        let jobs = MemoryJobStore::new();
        let documents = MemoryDocumentStore::with_jobs(jobs.clone());

        let in_use = document("/nonexistent/in_use.pdf", 60);
        let recent = document("/nonexistent/recent.pdf", 2);
        documents.insert(in_use.clone()).await;
        documents.insert(recent.clone()).await;
        let active = job(in_use.id, in_use.id, JobStatus::Processing, 60);
        let active_id = active.id;
        jobs.insert(active).await;

        let report = purge_expired(&jobs, &documents, Duration::days(30))
            .await
            .unwrap();

        assert_eq!(report, CleanupReport::default());
        assert!(jobs.get_job(active_id).await.unwrap().is_some());
        assert!(documents.exists(in_use.id).await.unwrap());
        assert!(documents.exists(recent.id).await.unwrap());
    }
}
