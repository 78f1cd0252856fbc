use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use uuid::Uuid;

use super::{check_transition, DocumentStore, JobStore, StoreError};
use crate::models::{
    Document, EvaluationJob, EvaluationResult, JobStatus, NewDocument, NewStepLog, StepLog,
};

#[derive(Default)]
struct JobTables {
    jobs: HashMap<Uuid, EvaluationJob>,
    logs: Vec<StepLog>,
}

/// Job store held in process memory. Clones share the same tables.
#[derive(Clone, Default)]
pub struct MemoryJobStore {
    inner: Arc<Mutex<JobTables>>,
}

impl MemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Referenced document ids, used by the paired document store for cleanup.
    pub async fn referenced_documents(&self) -> Vec<Uuid> {
        let tables = self.inner.lock().await;
        tables
            .jobs
            .values()
            .flat_map(|job| [job.cv_document_id, job.project_document_id])
            .collect()
    }

    #[cfg(test)]
    pub(crate) async fn insert(&self, job: EvaluationJob) {
        self.inner.lock().await.jobs.insert(job.id, job);
    }
}

#[async_trait]
impl JobStore for MemoryJobStore {
    async fn create_job(
        &self,
        job_title: &str,
        cv_document_id: Uuid,
        project_document_id: Uuid,
    ) -> Result<EvaluationJob, StoreError> {
        let job = EvaluationJob::new(job_title, cv_document_id, project_document_id);
        self.inner.lock().await.jobs.insert(job.id, job.clone());
        Ok(job)
    }

    async fn get_job(&self, id: Uuid) -> Result<Option<EvaluationJob>, StoreError> {
        Ok(self.inner.lock().await.jobs.get(&id).cloned())
    }

    async fn update_status(
        &self,
        id: Uuid,
        status: JobStatus,
        error_message: Option<&str>,
    ) -> Result<(), StoreError> {
        let mut tables = self.inner.lock().await;
        let job = tables.jobs.get_mut(&id).ok_or(StoreError::JobNotFound(id))?;
        check_transition(id, job.status, status)?;

        job.status = status;
        job.error_message = match status {
            JobStatus::Failed => error_message.map(str::to_string),
            _ => None,
        };
        Ok(())
    }

    async fn update_results(&self, id: Uuid, result: &EvaluationResult) -> Result<(), StoreError> {
        let mut tables = self.inner.lock().await;
        let job = tables.jobs.get_mut(&id).ok_or(StoreError::JobNotFound(id))?;

        job.status = JobStatus::Completed;
        job.result = Some(result.clone());
        job.error_message = None;
        job.completed_at = Some(Utc::now());
        Ok(())
    }

    async fn append_step_log(&self, entry: NewStepLog<'_>) -> Result<(), StoreError> {
        let mut tables = self.inner.lock().await;
        if !tables.jobs.contains_key(&entry.job_id) {
            return Err(StoreError::JobNotFound(entry.job_id));
        }
        tables.logs.push(StepLog::from_new(&entry));
        Ok(())
    }

    async fn step_logs(&self, job_id: Uuid) -> Result<Vec<StepLog>, StoreError> {
        let tables = self.inner.lock().await;
        Ok(tables
            .logs
            .iter()
            .filter(|log| log.evaluation_job_id == job_id)
            .cloned()
            .collect())
    }

    async fn delete_terminal_before(&self, cutoff: DateTime<Utc>) -> Result<u64, StoreError> {
        let mut tables = self.inner.lock().await;
        let expired: Vec<Uuid> = tables
            .jobs
            .values()
            .filter(|job| job.status.is_terminal() && job.created_at < cutoff)
            .map(|job| job.id)
            .collect();

        for id in &expired {
            tables.jobs.remove(id);
        }
        tables
            .logs
            .retain(|log| !expired.contains(&log.evaluation_job_id));
        Ok(expired.len() as u64)
    }
}

/// Document store held in process memory.
///
/// When built with [`MemoryDocumentStore::with_jobs`] it consults the job
/// store to decide which documents are still referenced.
#[derive(Clone, Default)]
pub struct MemoryDocumentStore {
    documents: Arc<Mutex<HashMap<Uuid, Document>>>,
    jobs: Option<MemoryJobStore>,
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_jobs(jobs: MemoryJobStore) -> Self {
        Self {
            documents: Arc::default(),
            jobs: Some(jobs),
        }
    }

    #[cfg(test)]
    pub(crate) async fn insert(&self, document: Document) {
        self.documents.lock().await.insert(document.id, document);
    }
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn create_document(&self, new: NewDocument) -> Result<Document, StoreError> {
        let document = new.into_document();
        self.documents
            .lock()
            .await
            .insert(document.id, document.clone());
        Ok(document)
    }

    async fn get_document(&self, id: Uuid) -> Result<Option<Document>, StoreError> {
        Ok(self.documents.lock().await.get(&id).cloned())
    }

    async fn exists(&self, id: Uuid) -> Result<bool, StoreError> {
        Ok(self.documents.lock().await.contains_key(&id))
    }

    async fn unreferenced_before(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<Document>, StoreError> {
        let referenced = match &self.jobs {
            Some(jobs) => jobs.referenced_documents().await,
            None => Vec::new(),
        };

        let documents = self.documents.lock().await;
        let mut expired: Vec<Document> = documents
            .values()
            .filter(|doc| doc.uploaded_at < cutoff && !referenced.contains(&doc.id))
            .cloned()
            .collect();
        expired.sort_by_key(|doc| doc.uploaded_at);
        Ok(expired)
    }

    async fn delete_document(&self, id: Uuid) -> Result<bool, StoreError> {
        Ok(self.documents.lock().await.remove(&id).is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::StepStatus;

    fn result() -> EvaluationResult {
        EvaluationResult {
            cv_match_rate: 0.6,
            cv_feedback: "Strong Python background".to_string(),
            project_score: 3.8,
            project_feedback: "Retries are well handled".to_string(),
            overall_summary: "Recommended for interview".to_string(),
        }
    }

    #[tokio::test]
    async fn test_failed_status_keeps_message_and_no_results() {
        let store = MemoryJobStore::new();
        let job = store
            .create_job("Backend Engineer", Uuid::new_v4(), Uuid::new_v4())
            .await
            .unwrap();

        store
            .update_status(job.id, JobStatus::Processing, None)
            .await
            .unwrap();
        store
            .update_status(job.id, JobStatus::Failed, Some("boom"))
            .await
            .unwrap();

        let job = store.get_job(job.id).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.error_message.as_deref(), Some("boom"));
        assert!(job.result.is_none());
    }

    #[tokio::test]
    async fn test_retry_clears_previous_error() {
        let store = MemoryJobStore::new();
        let job = store
            .create_job("Backend Engineer", Uuid::new_v4(), Uuid::new_v4())
            .await
            .unwrap();
        store
            .update_status(job.id, JobStatus::Failed, Some("first attempt"))
            .await
            .unwrap();
        store
            .update_status(job.id, JobStatus::Processing, Some("ignored"))
            .await
            .unwrap();

        let job = store.get_job(job.id).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Processing);
        assert!(job.error_message.is_none());
    }

    #[tokio::test]
    async fn test_results_complete_the_job_atomically() {
        let store = MemoryJobStore::new();
        let job = store
            .create_job("Backend Engineer", Uuid::new_v4(), Uuid::new_v4())
            .await
            .unwrap();
        store
            .update_status(job.id, JobStatus::Failed, Some("old"))
            .await
            .unwrap();
        store.update_results(job.id, &result()).await.unwrap();

        let job = store.get_job(job.id).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.result, Some(result()));
        assert!(job.error_message.is_none());
        assert!(job.completed_at.is_some());

        let err = store
            .update_status(job.id, JobStatus::Failed, Some("late"))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::InvalidTransition { .. }));
    }

    #[tokio::test]
    async fn test_step_logs_are_scoped_to_job() {
        let store = MemoryJobStore::new();
        let a = store
            .create_job("A", Uuid::new_v4(), Uuid::new_v4())
            .await
            .unwrap();
        let b = store
            .create_job("B", Uuid::new_v4(), Uuid::new_v4())
            .await
            .unwrap();

        for job_id in [a.id, a.id, b.id] {
            store
                .append_step_log(NewStepLog {
                    job_id,
                    step_name: "cv_parsing",
                    provider: "groq",
                    model: "llama",
                    prompt_tokens: 100,
                    completion_tokens: 20,
                    latency_ms: 5,
                    status: StepStatus::Success,
                    used_fallback: false,
                    error_message: None,
                })
                .await
                .unwrap();
        }

        let logs = store.step_logs(a.id).await.unwrap();
        assert_eq!(logs.len(), 2);
        assert_eq!(logs[0].total_tokens, 120);
    }

    #[tokio::test]
    async fn test_delete_terminal_before_skips_active_jobs() {
        let store = MemoryJobStore::new();
        let mut old_done = EvaluationJob::new("done", Uuid::new_v4(), Uuid::new_v4());
        old_done.status = JobStatus::Completed;
        old_done.created_at = Utc::now() - chrono::Duration::days(40);
        let mut old_running = EvaluationJob::new("running", Uuid::new_v4(), Uuid::new_v4());
        old_running.status = JobStatus::Processing;
        old_running.created_at = Utc::now() - chrono::Duration::days(40);
        let (done_id, running_id) = (old_done.id, old_running.id);
        store.insert(old_done).await;
        store.insert(old_running).await;

        let deleted = store
            .delete_terminal_before(Utc::now() - chrono::Duration::days(30))
            .await
            .unwrap();

        assert_eq!(deleted, 1);
        assert!(store.get_job(done_id).await.unwrap().is_none());
        assert!(store.get_job(running_id).await.unwrap().is_some());
    }
}
