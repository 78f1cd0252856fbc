use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio::time::Instant;
use uuid::Uuid;

use super::{EvaluationTask, QueueError, TaskQueue};

#[derive(Default)]
struct QueueState {
    ready: VecDeque<EvaluationTask>,
    scheduled: Vec<(Instant, EvaluationTask)>,
    /// Claimed tasks and the end of their claim window.
    processing: Vec<(Instant, EvaluationTask)>,
    leases: HashMap<Uuid, Instant>,
}

/// Single-process queue for tests and local runs. Clones share state.
#[derive(Clone, Default)]
pub struct MemoryTaskQueue {
    state: Arc<Mutex<QueueState>>,
}

impl MemoryTaskQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ready, scheduled and claimed-but-unacknowledged tasks.
    pub async fn pending(&self) -> usize {
        let state = self.state.lock().await;
        state.ready.len() + state.scheduled.len() + state.processing.len()
    }
}

#[async_trait]
impl TaskQueue for MemoryTaskQueue {
    async fn enqueue(&self, task: EvaluationTask) -> Result<(), QueueError> {
        self.state.lock().await.ready.push_back(task);
        Ok(())
    }

    async fn schedule(&self, task: EvaluationTask, delay: Duration) -> Result<(), QueueError> {
        let due = Instant::now() + delay;
        self.state.lock().await.scheduled.push((due, task));
        Ok(())
    }

    async fn promote_due(&self) -> Result<usize, QueueError> {
        let now = Instant::now();
        let mut state = self.state.lock().await;

        let mut due: Vec<(Instant, EvaluationTask)> = Vec::new();
        state.scheduled.retain(|entry| {
            if entry.0 <= now {
                due.push(*entry);
                false
            } else {
                true
            }
        });
        due.sort_by_key(|(at, _)| *at);

        let moved = due.len();
        state.ready.extend(due.into_iter().map(|(_, task)| task));
        Ok(moved)
    }

    async fn dequeue(&self, claim: Duration) -> Result<Option<EvaluationTask>, QueueError> {
        let mut state = self.state.lock().await;
        let task = state.ready.pop_front();
        if let Some(task) = task {
            state.processing.push((Instant::now() + claim, task));
        }
        Ok(task)
    }

    async fn ack(&self, task: EvaluationTask) -> Result<(), QueueError> {
        let mut state = self.state.lock().await;
        if let Some(pos) = state.processing.iter().position(|(_, t)| *t == task) {
            state.processing.remove(pos);
        }
        Ok(())
    }

    async fn reclaim_expired(&self) -> Result<usize, QueueError> {
        let now = Instant::now();
        let mut state = self.state.lock().await;
        let QueueState {
            ready,
            processing,
            leases,
            ..
        } = &mut *state;

        let mut moved = 0;
        processing.retain(|(claimed_until, task)| {
            let leased = leases
                .get(&task.job_id)
                .is_some_and(|expires| *expires > now);
            if *claimed_until <= now && !leased {
                ready.push_back(*task);
                moved += 1;
                false
            } else {
                true
            }
        });
        Ok(moved)
    }

    async fn try_acquire(&self, job_id: Uuid, ttl: Duration) -> Result<bool, QueueError> {
        let now = Instant::now();
        let mut state = self.state.lock().await;
        match state.leases.get(&job_id) {
            Some(expires) if *expires > now => Ok(false),
            _ => {
                state.leases.insert(job_id, now + ttl);
                Ok(true)
            }
        }
    }

    async fn release(&self, job_id: Uuid) -> Result<(), QueueError> {
        self.state.lock().await.leases.remove(&job_id);
        Ok(())
    }
}
