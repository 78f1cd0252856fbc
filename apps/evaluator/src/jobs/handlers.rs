use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use tracing::{error, info};
use uuid::Uuid;

use super::{validate_job_title, EvaluateRequest, EvaluateResponse, ResultResponse};
use crate::errors::AppError;
use crate::models::{DocumentCategory, JobStatus};
use crate::queue::EvaluationTask;
use crate::state::AppState;

/// POST /api/v1/evaluate
pub async fn handle_evaluate(
    State(state): State<AppState>,
    Json(req): Json<EvaluateRequest>,
) -> Result<(StatusCode, Json<EvaluateResponse>), AppError> {
    let job_title = validate_job_title(&req.job_title)?;

    ensure_document(&state, req.cv_document_id, DocumentCategory::Cv).await?;
    ensure_document(&state, req.project_document_id, DocumentCategory::ProjectReport).await?;

    let job = state
        .jobs
        .create_job(job_title, req.cv_document_id, req.project_document_id)
        .await?;

    if let Err(e) = state.queue.enqueue(EvaluationTask::new(job.id)).await {
        error!("Failed to enqueue job {}: {e}", job.id);
        // Do not leave a queued job that no worker will ever pick up.
        state
            .jobs
            .update_status(job.id, JobStatus::Failed, Some("Failed to enqueue evaluation"))
            .await?;
        return Err(e.into());
    }

    info!("Queued evaluation job {} for '{job_title}'", job.id);
    Ok((
        StatusCode::ACCEPTED,
        Json(EvaluateResponse {
            id: job.id,
            status: job.status,
        }),
    ))
}

/// GET /api/v1/result/:id
pub async fn handle_get_result(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ResultResponse>, AppError> {
    let job = state
        .jobs
        .get_job(id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Evaluation job with ID {id} not found")))?;
    Ok(Json(job.into()))
}

async fn ensure_document(
    state: &AppState,
    id: Uuid,
    expected: DocumentCategory,
) -> Result<(), AppError> {
    let label = match expected {
        DocumentCategory::Cv => "CV",
        DocumentCategory::ProjectReport => "Project report",
    };
    let document = state
        .documents
        .get_document(id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("{label} document with ID {id} not found")))?;

    if document.category != expected {
        return Err(AppError::Validation(format!(
            "Document {id} is a {}, expected {expected}",
            document.category
        )));
    }
    Ok(())
}
