//! The five-stage evaluation pipeline and the policy that retries it.
//!
//! [`Orchestrator::run_evaluation_pipeline`] runs one attempt and reports a
//! [`PipelineOutcome`]. [`RetryScheduler`] decides from that outcome whether
//! the queue should run the job again.

pub mod error;
pub mod orchestrator;
pub mod retry;
pub mod stage;

pub use error::{StageError, StageErrorKind};
pub use orchestrator::{Orchestrator, PipelineDeps, PipelineOutcome, SOFT_TIMEOUT_MESSAGE};
pub use retry::{RetryDecision, RetryScheduler};
pub use stage::StageTracker;
