use std::future::Future;
use std::sync::Arc;

use serde::Serialize;
use tokio::time::Instant;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::config::PipelineConfig;
use crate::evaluation::{Evaluator, StepOutput};
use crate::extraction::TextExtractor;
use crate::models::{
    Document, EvaluationJob, EvaluationResult, JobStatus, NewStepLog, PipelineStep, StepStatus,
    PIPELINE_STEP,
};
use crate::retrieval::context::{cv_grading_context, project_grading_context};
use crate::retrieval::ReferenceIndex;
use crate::store::{DocumentStore, JobStore, StoreError};

use super::error::StageError;
use super::stage::StageTracker;

pub const SOFT_TIMEOUT_MESSAGE: &str = "Evaluation took too long and was terminated";

/// What one pipeline attempt ended with. The retry scheduler reads this; the
/// orchestrator never re-enqueues on its own.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PipelineOutcome {
    pub job_id: Uuid,
    pub status: JobStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// False when another attempt cannot change anything, e.g. the job is gone.
    #[serde(skip)]
    pub retryable: bool,
}

impl PipelineOutcome {
    fn completed(job_id: Uuid) -> Self {
        Self {
            job_id,
            status: JobStatus::Completed,
            error: None,
            retryable: false,
        }
    }

    fn failed(job_id: Uuid, error: String, retryable: bool) -> Self {
        Self {
            job_id,
            status: JobStatus::Failed,
            error: Some(error),
            retryable,
        }
    }
}

pub struct PipelineDeps {
    pub jobs: Arc<dyn JobStore>,
    pub documents: Arc<dyn DocumentStore>,
    pub extractor: Arc<dyn TextExtractor>,
    pub index: ReferenceIndex,
    pub evaluator: Evaluator,
}

/// Runs the five evaluation stages for one job, strictly in order.
pub struct Orchestrator {
    deps: PipelineDeps,
    config: PipelineConfig,
    top_k: usize,
}

impl Orchestrator {
    pub fn new(deps: PipelineDeps, config: PipelineConfig, top_k: usize) -> Self {
        Self { deps, config, top_k }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn jobs(&self) -> &Arc<dyn JobStore> {
        &self.deps.jobs
    }

    /// One attempt at evaluating `job_id`.
    ///
    /// A job that is already `completed` is returned as-is without touching
    /// the model. Every stage attempt leaves exactly one step log. Failures
    /// mark the job `failed` with a composed message and come back as a
    /// retryable outcome.
    pub async fn run_evaluation_pipeline(&self, job_id: Uuid) -> PipelineOutcome {
        self.run_tracked(job_id, &StageTracker::new()).await
    }

    /// Same as [`Self::run_evaluation_pipeline`], reporting the running stage
    /// through `tracker` so a caller that kills the attempt can log it.
    pub async fn run_tracked(&self, job_id: Uuid, tracker: &StageTracker) -> PipelineOutcome {
        let job = match self.deps.jobs.get_job(job_id).await {
            Ok(Some(job)) => job,
            Ok(None) => {
                warn!("Evaluation job {job_id} not found; nothing to run");
                return PipelineOutcome::failed(
                    job_id,
                    StoreError::JobNotFound(job_id).to_string(),
                    false,
                );
            }
            Err(e) => {
                error!("Failed to load evaluation job {job_id}: {e}");
                let err = StageError::store(PIPELINE_STEP, &e);
                return PipelineOutcome::failed(job_id, err.user_message(), true);
            }
        };

        if job.status == JobStatus::Completed {
            info!("Evaluation job {job_id} already completed; skipping");
            return PipelineOutcome::completed(job_id);
        }

        match self
            .deps
            .jobs
            .update_status(job_id, JobStatus::Processing, None)
            .await
        {
            Ok(()) => {}
            Err(StoreError::InvalidTransition { .. }) => {
                // Completed by another attempt between the read and this write.
                return PipelineOutcome::completed(job_id);
            }
            Err(e) => {
                let err = StageError::store(PIPELINE_STEP, &e);
                return self.fail(job_id, err.user_message()).await;
            }
        }

        info!("Starting evaluation pipeline for job {job_id} ({})", job.job_title);
        let attempt = tokio::time::timeout(
            self.config.soft_time_limit,
            self.run_stages(&job, tracker),
        )
        .await;

        match attempt {
            Ok(Ok(result)) => match self.deps.jobs.update_results(job_id, &result).await {
                Ok(()) => {
                    info!(
                        "Evaluation job {job_id} completed (match_rate={:.2}, project_score={:.2})",
                        result.cv_match_rate, result.project_score
                    );
                    PipelineOutcome::completed(job_id)
                }
                Err(e) => {
                    let err = StageError::store(PIPELINE_STEP, &e);
                    self.fail(job_id, err.user_message()).await
                }
            },
            Ok(Err(err)) => {
                warn!(
                    "Evaluation job {job_id} failed at {} ({:?}): {}",
                    err.step, err.kind, err.message
                );
                self.fail(job_id, err.user_message()).await
            }
            Err(_) => {
                self.log_interrupted_stage(job_id, tracker, SOFT_TIMEOUT_MESSAGE)
                    .await;
                warn!(
                    "Evaluation job {job_id} exceeded the soft time limit of {:?}",
                    self.config.soft_time_limit
                );
                self.fail(job_id, SOFT_TIMEOUT_MESSAGE.to_string()).await
            }
        }
    }

    async fn run_stages(
        &self,
        job: &EvaluationJob,
        tracker: &StageTracker,
    ) -> Result<EvaluationResult, StageError> {
        let evaluator = &self.deps.evaluator;

        // ── Stage 1: CV extraction and structuring ──────────────────────────
        let step = PipelineStep::CvParsing;
        let cv_profile = self
            .stage(job.id, step, tracker, async {
                let text = self.extract(job.cv_document_id, step).await?;
                evaluator
                    .structure_cv(&text)
                    .await
                    .map_err(|e| StageError::model(step, &e))
            })
            .await?;

        // ── Stage 2: CV scoring against job description and rubric ──────────
        let step = PipelineStep::CvEvaluation;
        let cv_evaluation = self
            .stage(job.id, step, tracker, async {
                let context = cv_grading_context(&self.deps.index, &job.job_title, self.top_k)
                    .await
                    .map_err(|e| StageError::retrieval(step, &e))?;
                if context.is_empty() {
                    warn!("No grading context found for '{}'", job.job_title);
                }
                evaluator
                    .score_cv(&cv_profile, &job.job_title, &context)
                    .await
                    .map_err(|e| StageError::model(step, &e))
            })
            .await?;

        // ── Stage 3: project report extraction and structuring ──────────────
        let step = PipelineStep::ProjectParsing;
        let project_profile = self
            .stage(job.id, step, tracker, async {
                let text = self.extract(job.project_document_id, step).await?;
                evaluator
                    .structure_project(&text)
                    .await
                    .map_err(|e| StageError::model(step, &e))
            })
            .await?;

        // ── Stage 4: project scoring against case study and rubric ──────────
        let step = PipelineStep::ProjectEvaluation;
        let project_evaluation = self
            .stage(job.id, step, tracker, async {
                let context = project_grading_context(&self.deps.index, self.top_k)
                    .await
                    .map_err(|e| StageError::retrieval(step, &e))?;
                evaluator
                    .score_project(&project_profile, &context)
                    .await
                    .map_err(|e| StageError::model(step, &e))
            })
            .await?;

        // ── Stage 5: overall summary ────────────────────────────────────────
        let step = PipelineStep::FinalAnalysis;
        let overall_summary = self
            .stage(job.id, step, tracker, async {
                evaluator
                    .synthesize_summary(&cv_evaluation, &project_evaluation, &job.job_title)
                    .await
                    .map_err(|e| StageError::model(step, &e))
            })
            .await?;

        Ok(EvaluationResult {
            cv_match_rate: cv_evaluation.match_rate,
            cv_feedback: cv_evaluation.feedback,
            project_score: project_evaluation.project_score,
            project_feedback: project_evaluation.feedback,
            overall_summary,
        })
    }

    /// Runs one stage and writes its step log, success or failure.
    async fn stage<T, F>(
        &self,
        job_id: Uuid,
        step: PipelineStep,
        tracker: &StageTracker,
        work: F,
    ) -> Result<T, StageError>
    where
        F: Future<Output = Result<StepOutput<T>, StageError>>,
    {
        tracker.enter(step);
        let started = Instant::now();
        let result = work.await;
        tracker.leave();

        match result {
            Ok(output) => {
                let usage = &output.usage;
                self.deps
                    .jobs
                    .append_step_log(NewStepLog {
                        job_id,
                        step_name: step.as_str(),
                        provider: &usage.provider,
                        model: &usage.model,
                        prompt_tokens: usage.prompt_tokens,
                        completion_tokens: usage.completion_tokens,
                        latency_ms: usage.latency_ms,
                        status: StepStatus::Success,
                        used_fallback: output.used_fallback,
                        error_message: None,
                    })
                    .await
                    .map_err(|e| StageError::store(step.as_str(), &e))?;
                info!("Job {job_id}: {step} done in {}ms", usage.latency_ms);
                Ok(output.value)
            }
            Err(err) => {
                let elapsed_ms = started.elapsed().as_millis() as u64;
                self.log_failure(job_id, step.as_str(), elapsed_ms, &err.message)
                    .await;
                Err(err)
            }
        }
    }

    async fn extract(&self, document_id: Uuid, step: PipelineStep) -> Result<String, StageError> {
        let document = self.document(document_id, step).await?;
        let text = self
            .deps
            .extractor
            .extract(&document.path())
            .await
            .map_err(|e| StageError::extraction(step, &e))?;
        info!(
            "Extracted {} words from {} for {step}",
            text.word_count, document.filename
        );
        Ok(text.cleaned_text)
    }

    async fn document(&self, id: Uuid, step: PipelineStep) -> Result<Document, StageError> {
        match self.deps.documents.get_document(id).await {
            Ok(Some(document)) => Ok(document),
            Ok(None) => Err(StageError::new(
                step.as_str(),
                super::StageErrorKind::Extraction,
                format!("Document {id} not found"),
            )),
            Err(e) => Err(StageError::store(step.as_str(), &e)),
        }
    }

    /// Writes the failed step log for a stage cut off mid-flight, if any.
    pub async fn log_interrupted_stage(&self, job_id: Uuid, tracker: &StageTracker, message: &str) {
        if let Some((step, elapsed_ms)) = tracker.in_flight() {
            tracker.leave();
            self.log_failure(job_id, step.as_str(), elapsed_ms, message)
                .await;
        }
    }

    async fn log_failure(&self, job_id: Uuid, step_name: &str, latency_ms: u64, message: &str) {
        let llm = self.deps.evaluator.llm();
        let entry = NewStepLog {
            job_id,
            step_name,
            provider: llm.provider(),
            model: llm.model(),
            prompt_tokens: 0,
            completion_tokens: 0,
            latency_ms,
            status: StepStatus::Failed,
            used_fallback: false,
            error_message: Some(message),
        };
        if let Err(e) = self.deps.jobs.append_step_log(entry).await {
            error!("Failed to record failed step {step_name} for job {job_id}: {e}");
        }
    }

    async fn fail(&self, job_id: Uuid, message: String) -> PipelineOutcome {
        if let Err(e) = self
            .deps
            .jobs
            .update_status(job_id, JobStatus::Failed, Some(&message))
            .await
        {
            error!("Failed to mark job {job_id} as failed: {e}");
        }
        PipelineOutcome::failed(job_id, message, true)
    }
}
