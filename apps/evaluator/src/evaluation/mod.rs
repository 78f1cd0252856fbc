//! Model-backed evaluation operations and the rubric math behind them.

pub mod evaluator;
pub mod profiles;
pub mod prompts;
pub mod scoring;

pub use evaluator::{CvEvaluation, Evaluator, ModelUsage, ProjectEvaluation, StepOutput};
pub use profiles::{CvProfile, ProjectProfile, Structured};
pub use scoring::{ScoreCard, FALLBACK_MATCH_RATE, FALLBACK_PROJECT_SCORE};
