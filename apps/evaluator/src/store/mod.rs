//! Durable records for documents, evaluation jobs and their step logs.
//!
//! The pipeline only talks to the [`JobStore`] and [`DocumentStore`] traits.
//! `postgres` is the production backing; `memory` backs tests and local runs.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

use crate::models::{
    Document, EvaluationJob, EvaluationResult, JobStatus, NewDocument, NewStepLog, StepLog,
};

pub mod memory;
pub mod postgres;

pub use memory::{MemoryDocumentStore, MemoryJobStore};
pub use postgres::{PgDocumentStore, PgJobStore};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Corrupt record: {0}")]
    Corrupt(String),

    #[error("Evaluation job {0} not found")]
    JobNotFound(Uuid),

    #[error("Evaluation job {id} cannot move from {from} to {to}")]
    InvalidTransition {
        id: Uuid,
        from: JobStatus,
        to: JobStatus,
    },
}

#[async_trait]
pub trait JobStore: Send + Sync {
    async fn create_job(
        &self,
        job_title: &str,
        cv_document_id: Uuid,
        project_document_id: Uuid,
    ) -> Result<EvaluationJob, StoreError>;

    async fn get_job(&self, id: Uuid) -> Result<Option<EvaluationJob>, StoreError>;

    /// Moves a job to `queued`, `processing` or `failed`.
    ///
    /// `failed` stores `error_message`; the other two clear it. Completed jobs
    /// are never moved, and `completed` itself is only reachable through
    /// [`JobStore::update_results`].
    async fn update_status(
        &self,
        id: Uuid,
        status: JobStatus,
        error_message: Option<&str>,
    ) -> Result<(), StoreError>;

    /// Writes all five result fields and `status = completed` in one update.
    async fn update_results(&self, id: Uuid, result: &EvaluationResult) -> Result<(), StoreError>;

    async fn append_step_log(&self, entry: NewStepLog<'_>) -> Result<(), StoreError>;

    async fn step_logs(&self, job_id: Uuid) -> Result<Vec<StepLog>, StoreError>;

    /// Deletes completed and failed jobs created before `cutoff`. Returns the count.
    async fn delete_terminal_before(&self, cutoff: DateTime<Utc>) -> Result<u64, StoreError>;
}

#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn create_document(&self, new: NewDocument) -> Result<Document, StoreError>;

    async fn get_document(&self, id: Uuid) -> Result<Option<Document>, StoreError>;

    async fn exists(&self, id: Uuid) -> Result<bool, StoreError>;

    /// Documents uploaded before `cutoff` that no remaining job points at.
    async fn unreferenced_before(&self, cutoff: DateTime<Utc>)
        -> Result<Vec<Document>, StoreError>;

    async fn delete_document(&self, id: Uuid) -> Result<bool, StoreError>;
}

/// Validates a status change requested through `update_status`.
pub(crate) fn check_transition(
    id: Uuid,
    from: JobStatus,
    to: JobStatus,
) -> Result<(), StoreError> {
    if from == JobStatus::Completed || to == JobStatus::Completed {
        return Err(StoreError::InvalidTransition { id, from, to });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_completed_is_sticky() {
        let id = Uuid::new_v4();
        assert!(check_transition(id, JobStatus::Completed, JobStatus::Failed).is_err());
        assert!(check_transition(id, JobStatus::Completed, JobStatus::Processing).is_err());
    }

    #[test]
    fn test_completed_requires_results() {
        let id = Uuid::new_v4();
        assert!(check_transition(id, JobStatus::Processing, JobStatus::Completed).is_err());
    }

    #[test]
    fn test_failed_job_can_be_retried() {
        let id = Uuid::new_v4();
        assert!(check_transition(id, JobStatus::Failed, JobStatus::Processing).is_ok());
        assert!(check_transition(id, JobStatus::Queued, JobStatus::Processing).is_ok());
        assert!(check_transition(id, JobStatus::Processing, JobStatus::Failed).is_ok());
    }
}
