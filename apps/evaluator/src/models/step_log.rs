use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// The five fixed stages of an evaluation, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStep {
    CvParsing,
    CvEvaluation,
    ProjectParsing,
    ProjectEvaluation,
    FinalAnalysis,
}

impl PipelineStep {
    pub const ALL: [PipelineStep; 5] = [
        PipelineStep::CvParsing,
        PipelineStep::CvEvaluation,
        PipelineStep::ProjectParsing,
        PipelineStep::ProjectEvaluation,
        PipelineStep::FinalAnalysis,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PipelineStep::CvParsing => "cv_parsing",
            PipelineStep::CvEvaluation => "cv_evaluation",
            PipelineStep::ProjectParsing => "project_parsing",
            PipelineStep::ProjectEvaluation => "project_evaluation",
            PipelineStep::FinalAnalysis => "final_analysis",
        }
    }
}

impl std::fmt::Display for PipelineStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Step label for failures that happen outside any stage, such as loading the job.
pub const PIPELINE_STEP: &str = "evaluation_pipeline";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Success,
    Failed,
}

impl StepStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            StepStatus::Success => "success",
            StepStatus::Failed => "failed",
        }
    }
}

/// Parameters for appending one audit record for a pipeline stage attempt.
/// Total tokens are derived, never passed in.
#[derive(Debug, Clone)]
pub struct NewStepLog<'a> {
    pub job_id: Uuid,
    pub step_name: &'a str,
    pub provider: &'a str,
    pub model: &'a str,
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub latency_ms: u64,
    pub status: StepStatus,
    pub used_fallback: bool,
    pub error_message: Option<&'a str>,
}

impl NewStepLog<'_> {
    pub fn total_tokens(&self) -> u32 {
        self.prompt_tokens + self.completion_tokens
    }
}

/// Append-only audit record. Never updated after insertion.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct StepLog {
    pub id: Uuid,
    pub evaluation_job_id: Uuid,
    pub step_name: String,
    pub llm_provider: String,
    pub llm_model: String,
    pub prompt_tokens: i32,
    pub completion_tokens: i32,
    pub total_tokens: i32,
    pub response_time_ms: i64,
    pub status: String,
    pub used_fallback: bool,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl StepLog {
    pub fn from_new(entry: &NewStepLog<'_>) -> Self {
        Self {
            id: Uuid::new_v4(),
            evaluation_job_id: entry.job_id,
            step_name: entry.step_name.to_string(),
            llm_provider: entry.provider.to_string(),
            llm_model: entry.model.to_string(),
            prompt_tokens: entry.prompt_tokens as i32,
            completion_tokens: entry.completion_tokens as i32,
            total_tokens: entry.total_tokens() as i32,
            response_time_ms: entry.latency_ms as i64,
            status: entry.status.as_str().to_string(),
            used_fallback: entry.used_fallback,
            error_message: entry.error_message.map(str::to_string),
            created_at: Utc::now(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == StepStatus::Success.as_str()
    }
}
