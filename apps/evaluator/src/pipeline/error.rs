use serde::Serialize;
use thiserror::Error;

use crate::extraction::ExtractionError;
use crate::llm_client::ModelInvocationError;
use crate::models::PipelineStep;
use crate::retrieval::RetrievalError;
use crate::store::StoreError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StageErrorKind {
    Extraction,
    ModelInvocation,
    Retrieval,
    Unexpected,
}

/// A failed stage attempt. Every kind is retried the same way at the
/// pipeline level; the kind only feeds logs and diagnostics.
#[derive(Debug, Clone, Error)]
#[error("{kind:?} error at '{step}': {message}")]
pub struct StageError {
    pub step: String,
    pub kind: StageErrorKind,
    pub message: String,
    pub details: Option<String>,
}

impl StageError {
    pub fn new(step: impl Into<String>, kind: StageErrorKind, message: impl Into<String>) -> Self {
        Self {
            step: step.into(),
            kind,
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    pub fn extraction(step: PipelineStep, err: &ExtractionError) -> Self {
        Self::new(step.as_str(), StageErrorKind::Extraction, err.to_string())
    }

    pub fn model(step: PipelineStep, err: &ModelInvocationError) -> Self {
        Self::new(step.as_str(), StageErrorKind::ModelInvocation, err.to_string())
            .with_details(format!("model={} attempts={}", err.model, err.attempts))
    }

    pub fn retrieval(step: PipelineStep, err: &RetrievalError) -> Self {
        Self::new(step.as_str(), StageErrorKind::Retrieval, err.to_string())
    }

    pub fn unexpected(step: &str, message: impl Into<String>) -> Self {
        Self::new(step, StageErrorKind::Unexpected, message)
    }

    pub fn store(step: &str, err: &StoreError) -> Self {
        Self::unexpected(step, err.to_string())
    }

    /// The message stored on the failed job.
    pub fn user_message(&self) -> String {
        format!("Evaluation failed at step '{}': {}", self.step, self.message)
    }
}
