pub mod document;
pub mod job;
pub mod reference;
pub mod step_log;

pub use document::{Document, DocumentCategory, DocumentRow, NewDocument};
pub use job::{EvaluationJob, EvaluationJobRow, EvaluationResult, JobStatus};
pub use reference::{ReferenceCategory, ReferenceDocument};
pub use step_log::{NewStepLog, PipelineStep, StepLog, StepStatus, PIPELINE_STEP};
