//! Task dispatch between the API and the evaluation workers.
//!
//! A task names a job and how many times it has been retried. Ready tasks
//! are consumed by the [`worker::WorkerPool`]; retries wait in a delayed set
//! until they are due. A per-job lease keeps two workers off the same job.
//!
//! Delivery is at-least-once: a dequeued task stays claimed until the worker
//! acknowledges it, and a claim whose window has passed while no lease is
//! held for its job goes back to the ready queue.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

pub mod memory;
pub mod redis;
pub mod worker;

pub use self::memory::MemoryTaskQueue;
pub use self::redis::RedisTaskQueue;
pub use self::worker::WorkerPool;

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("Redis error: {0}")]
    Redis(#[from] ::redis::RedisError),

    #[error("Malformed task payload: {0}")]
    Codec(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvaluationTask {
    pub job_id: Uuid,
    /// Zero on the first run, then the retry count.
    #[serde(default)]
    pub attempt: u32,
}

impl EvaluationTask {
    pub fn new(job_id: Uuid) -> Self {
        Self { job_id, attempt: 0 }
    }
}

#[async_trait]
pub trait TaskQueue: Send + Sync {
    /// Makes a task ready immediately.
    async fn enqueue(&self, task: EvaluationTask) -> Result<(), QueueError>;

    /// Holds a task back until `delay` has passed.
    async fn schedule(&self, task: EvaluationTask, delay: Duration) -> Result<(), QueueError>;

    /// Moves scheduled tasks that are due onto the ready queue. Returns how many moved.
    async fn promote_due(&self) -> Result<usize, QueueError>;

    /// Takes the oldest ready task, if any, and claims it for `claim`. Never blocks.
    async fn dequeue(&self, claim: Duration) -> Result<Option<EvaluationTask>, QueueError>;

    /// Drops a claimed task for good. Called once its outcome is recorded.
    async fn ack(&self, task: EvaluationTask) -> Result<(), QueueError>;

    /// Returns expired claims whose job holds no lease to the ready queue.
    async fn reclaim_expired(&self) -> Result<usize, QueueError>;

    /// Claims the job for `ttl`. False if another worker holds it.
    async fn try_acquire(&self, job_id: Uuid, ttl: Duration) -> Result<bool, QueueError>;

    async fn release(&self, job_id: Uuid) -> Result<(), QueueError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_payload_without_attempt_starts_at_zero() {
        let id = Uuid::new_v4();
        let task: EvaluationTask =
            serde_json::from_str(&format!(r#"{{"job_id": "{id}"}}"#)).unwrap();
        assert_eq!(task, EvaluationTask::new(id));
    }
}
