use std::time::Duration;

use crate::config::PipelineConfig;
use crate::models::JobStatus;

use super::PipelineOutcome;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Nothing more to do: the job completed or cannot be retried.
    Done,
    /// Run the whole pipeline again as `attempt` after `delay`.
    Retry { attempt: u32, delay: Duration },
    /// The retry budget is spent; the job stays failed.
    Exhausted,
}

/// Decides whether a failed pipeline attempt is re-enqueued. Kept apart from
/// the orchestrator so the pipeline itself never sleeps or re-schedules.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryScheduler {
    pub max_retries: u32,
    pub base_delay: Duration,
}

impl RetryScheduler {
    /// `attempt` is zero for the first run and counts retries after that.
    pub fn decide(&self, outcome: &PipelineOutcome, attempt: u32) -> RetryDecision {
        if outcome.status != JobStatus::Failed || !outcome.retryable {
            return RetryDecision::Done;
        }
        if attempt >= self.max_retries {
            return RetryDecision::Exhausted;
        }
        RetryDecision::Retry {
            attempt: attempt + 1,
            delay: self.delay_for(attempt),
        }
    }

    /// `base × 2^attempt`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay
            .saturating_mul(2u32.saturating_pow(attempt))
    }
}

impl From<&PipelineConfig> for RetryScheduler {
    fn from(config: &PipelineConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            base_delay: config.retry_base,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn failed(retryable: bool) -> PipelineOutcome {
        PipelineOutcome {
            job_id: Uuid::new_v4(),
            status: JobStatus::Failed,
            error: Some("Evaluation failed at step 'cv_parsing': boom".to_string()),
            retryable,
        }
    }

    fn scheduler() -> RetryScheduler {
        RetryScheduler::from(&PipelineConfig::default())
    }

    #[test]
    fn test_backoff_is_base_times_power_of_two() {
        let s = scheduler();
        assert_eq!(
            s.decide(&failed(true), 0),
            RetryDecision::Retry {
                attempt: 1,
                delay: Duration::from_secs(60)
            }
        );
        assert_eq!(
            s.decide(&failed(true), 2),
            RetryDecision::Retry {
                attempt: 3,
                delay: Duration::from_secs(240)
            }
        );
    }

    #[test]
    fn test_budget_is_exhausted_after_max_retries() {
        assert_eq!(scheduler().decide(&failed(true), 3), RetryDecision::Exhausted);
    }

    #[test]
    fn test_completed_and_non_retryable_outcomes_stop() {
        let s = scheduler();
        let mut done = failed(true);
        done.status = JobStatus::Completed;
        done.error = None;
        assert_eq!(s.decide(&done, 0), RetryDecision::Done);
        assert_eq!(s.decide(&failed(false), 0), RetryDecision::Done);
    }
}
