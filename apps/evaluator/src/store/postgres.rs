use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use super::{check_transition, DocumentStore, JobStore, StoreError};
use crate::models::{
    Document, DocumentRow, EvaluationJob, EvaluationJobRow, EvaluationResult, JobStatus,
    NewDocument, NewStepLog, StepLog,
};

const JOB_COLUMNS: &str = "id, job_title, cv_document_id, project_document_id, status, \
     cv_match_rate, cv_feedback, project_score, project_feedback, overall_summary, \
     error_message, created_at, completed_at";

const DOCUMENT_COLUMNS: &str =
    "id, filename, file_type, file_path, file_size, mime_type, uploaded_at";

#[derive(Clone)]
pub struct PgJobStore {
    pool: PgPool,
}

impl PgJobStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn current_status(&self, id: Uuid) -> Result<JobStatus, StoreError> {
        let status: Option<String> =
            sqlx::query_scalar("SELECT status FROM evaluation_jobs WHERE id = $1")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
        status
            .ok_or(StoreError::JobNotFound(id))?
            .parse()
            .map_err(StoreError::Corrupt)
    }
}

#[async_trait]
impl JobStore for PgJobStore {
    async fn create_job(
        &self,
        job_title: &str,
        cv_document_id: Uuid,
        project_document_id: Uuid,
    ) -> Result<EvaluationJob, StoreError> {
        let job = EvaluationJob::new(job_title, cv_document_id, project_document_id);

        sqlx::query(
            r#"
            INSERT INTO evaluation_jobs
                (id, job_title, cv_document_id, project_document_id, status, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(job.id)
        .bind(&job.job_title)
        .bind(job.cv_document_id)
        .bind(job.project_document_id)
        .bind(job.status.as_str())
        .bind(job.created_at)
        .execute(&self.pool)
        .await?;

        Ok(job)
    }

    async fn get_job(&self, id: Uuid) -> Result<Option<EvaluationJob>, StoreError> {
        let row = sqlx::query_as::<_, EvaluationJobRow>(&format!(
            "SELECT {JOB_COLUMNS} FROM evaluation_jobs WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(EvaluationJob::try_from)
            .transpose()
            .map_err(StoreError::Corrupt)
    }

    async fn update_status(
        &self,
        id: Uuid,
        status: JobStatus,
        error_message: Option<&str>,
    ) -> Result<(), StoreError> {
        if status == JobStatus::Completed {
            let from = self.current_status(id).await?;
            check_transition(id, from, status)?;
        }
        let error_message = match status {
            JobStatus::Failed => error_message,
            _ => None,
        };

        // The status guard keeps a racing completion from being overwritten.
        let result = sqlx::query(
            r#"
            UPDATE evaluation_jobs
            SET status = $2, error_message = $3, updated_at = NOW()
            WHERE id = $1 AND status <> 'completed'
            "#,
        )
        .bind(id)
        .bind(status.as_str())
        .bind(error_message)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            let from = self.current_status(id).await?;
            return Err(StoreError::InvalidTransition { id, from, to: status });
        }
        Ok(())
    }

    async fn update_results(&self, id: Uuid, result: &EvaluationResult) -> Result<(), StoreError> {
        let updated = sqlx::query(
            r#"
            UPDATE evaluation_jobs
            SET cv_match_rate = $2,
                cv_feedback = $3,
                project_score = $4,
                project_feedback = $5,
                overall_summary = $6,
                status = 'completed',
                error_message = NULL,
                completed_at = NOW(),
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(result.cv_match_rate)
        .bind(&result.cv_feedback)
        .bind(result.project_score)
        .bind(&result.project_feedback)
        .bind(&result.overall_summary)
        .execute(&self.pool)
        .await?;

        if updated.rows_affected() == 0 {
            return Err(StoreError::JobNotFound(id));
        }
        Ok(())
    }

    async fn append_step_log(&self, entry: NewStepLog<'_>) -> Result<(), StoreError> {
        let log = StepLog::from_new(&entry);

        sqlx::query(
            r#"
            INSERT INTO evaluation_logs
                (id, evaluation_job_id, step_name, llm_provider, llm_model,
                 prompt_tokens, completion_tokens, total_tokens, response_time_ms,
                 status, used_fallback, error_message, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            "#,
        )
        .bind(log.id)
        .bind(log.evaluation_job_id)
        .bind(&log.step_name)
        .bind(&log.llm_provider)
        .bind(&log.llm_model)
        .bind(log.prompt_tokens)
        .bind(log.completion_tokens)
        .bind(log.total_tokens)
        .bind(log.response_time_ms)
        .bind(&log.status)
        .bind(log.used_fallback)
        .bind(&log.error_message)
        .bind(log.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn step_logs(&self, job_id: Uuid) -> Result<Vec<StepLog>, StoreError> {
        Ok(sqlx::query_as::<_, StepLog>(
            r#"
            SELECT id, evaluation_job_id, step_name, llm_provider, llm_model,
                   prompt_tokens, completion_tokens, total_tokens, response_time_ms,
                   status, used_fallback, error_message, created_at
            FROM evaluation_logs
            WHERE evaluation_job_id = $1
            ORDER BY created_at ASC
            "#,
        )
        .bind(job_id)
        .fetch_all(&self.pool)
        .await?)
    }

    async fn delete_terminal_before(&self, cutoff: DateTime<Utc>) -> Result<u64, StoreError> {
        let result = sqlx::query(
            r#"
            DELETE FROM evaluation_jobs
            WHERE created_at < $1
              AND status IN ('completed', 'failed')
            "#,
        )
        .bind(cutoff)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }
}

#[derive(Clone)]
pub struct PgDocumentStore {
    pool: PgPool,
}

impl PgDocumentStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn into_documents(rows: Vec<DocumentRow>) -> Result<Vec<Document>, StoreError> {
    rows.into_iter()
        .map(|row| Document::try_from(row).map_err(StoreError::Corrupt))
        .collect()
}

#[async_trait]
impl DocumentStore for PgDocumentStore {
    async fn create_document(&self, new: NewDocument) -> Result<Document, StoreError> {
        let document = new.into_document();

        sqlx::query(
            r#"
            INSERT INTO documents
                (id, filename, file_type, file_path, file_size, mime_type, uploaded_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(document.id)
        .bind(&document.filename)
        .bind(document.category.as_str())
        .bind(&document.file_path)
        .bind(document.file_size)
        .bind(&document.mime_type)
        .bind(document.uploaded_at)
        .execute(&self.pool)
        .await?;

        Ok(document)
    }

    async fn get_document(&self, id: Uuid) -> Result<Option<Document>, StoreError> {
        let row = sqlx::query_as::<_, DocumentRow>(&format!(
            "SELECT {DOCUMENT_COLUMNS} FROM documents WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Document::try_from)
            .transpose()
            .map_err(StoreError::Corrupt)
    }

    async fn exists(&self, id: Uuid) -> Result<bool, StoreError> {
        Ok(
            sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM documents WHERE id = $1)")
                .bind(id)
                .fetch_one(&self.pool)
                .await?,
        )
    }

    async fn unreferenced_before(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<Document>, StoreError> {
        let rows = sqlx::query_as::<_, DocumentRow>(&format!(
            r#"
            SELECT {DOCUMENT_COLUMNS} FROM documents d
            WHERE d.uploaded_at < $1
              AND NOT EXISTS (
                  SELECT 1 FROM evaluation_jobs j
                  WHERE j.cv_document_id = d.id OR j.project_document_id = d.id
              )
            ORDER BY d.uploaded_at ASC
            "#
        ))
        .bind(cutoff)
        .fetch_all(&self.pool)
        .await?;

        into_documents(rows)
    }

    async fn delete_document(&self, id: Uuid) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM documents WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
