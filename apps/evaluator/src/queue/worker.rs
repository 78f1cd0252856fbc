use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::WorkerConfig;
use crate::models::{JobStatus, PIPELINE_STEP};
use crate::pipeline::{
    Orchestrator, PipelineOutcome, RetryDecision, RetryScheduler, StageError, StageTracker,
};

use super::{EvaluationTask, TaskQueue};

pub const HARD_TIMEOUT_MESSAGE: &str =
    "Evaluation exceeded the hard time limit and was killed";

/// Extra lease time past the hard limit, so a lease never lapses mid-run.
const LEASE_MARGIN: Duration = Duration::from_secs(60);

/// A fixed number of async workers draining the task queue, plus one task
/// that promotes due retries and requeues tasks abandoned by dead workers.
pub struct WorkerPool {
    handles: Vec<JoinHandle<()>>,
    shutdown: watch::Sender<bool>,
}

#[derive(Clone)]
struct WorkerContext {
    orchestrator: Arc<Orchestrator>,
    queue: Arc<dyn TaskQueue>,
    scheduler: RetryScheduler,
    hard_time_limit: Duration,
    poll_interval: Duration,
}

impl WorkerPool {
    pub fn start(
        orchestrator: Arc<Orchestrator>,
        queue: Arc<dyn TaskQueue>,
        config: &WorkerConfig,
    ) -> Self {
        let concurrency = config.concurrency.max(1);
        let (shutdown, shutdown_rx) = watch::channel(false);

        let ctx = WorkerContext {
            scheduler: RetryScheduler::from(orchestrator.config()),
            hard_time_limit: orchestrator.config().hard_time_limit,
            poll_interval: config.poll_interval,
            orchestrator,
            queue,
        };

        let mut handles = Vec::with_capacity(concurrency + 1);
        handles.push(tokio::spawn(run_promoter(ctx.clone(), shutdown_rx.clone())));
        for worker_id in 0..concurrency {
            handles.push(tokio::spawn(run_worker(
                worker_id,
                ctx.clone(),
                shutdown_rx.clone(),
            )));
        }

        info!("Started {concurrency} evaluation workers");
        Self { handles, shutdown }
    }

    /// Asks every worker to stop after its current task.
    pub fn shutdown(&self) {
        info!("Shutting down worker pool...");
        let _ = self.shutdown.send(true);
    }

    pub async fn wait(self) {
        for (i, handle) in self.handles.into_iter().enumerate() {
            if let Err(e) = handle.await {
                error!("Worker task {i} ended abnormally: {e}");
            }
        }
        info!("All workers have stopped");
    }
}

async fn run_promoter(ctx: WorkerContext, mut shutdown: watch::Receiver<bool>) {
    loop {
        if *shutdown.borrow() {
            break;
        }
        if let Err(e) = ctx.queue.promote_due().await {
            error!("Failed to promote scheduled tasks: {e}");
        }
        if let Err(e) = ctx.queue.reclaim_expired().await {
            error!("Failed to reclaim abandoned tasks: {e}");
        }
        tokio::select! {
            _ = tokio::time::sleep(ctx.poll_interval) => {}
            _ = shutdown.changed() => {}
        }
    }
    debug!("Retry promoter stopped");
}

async fn run_worker(worker_id: usize, ctx: WorkerContext, mut shutdown: watch::Receiver<bool>) {
    debug!("Worker {worker_id} started");

    loop {
        if *shutdown.borrow() {
            debug!("Worker {worker_id} received shutdown signal");
            break;
        }

        match ctx.queue.dequeue(ctx.lease()).await {
            Ok(Some(task)) => {
                debug!(
                    "Worker {worker_id} picked up job {} (attempt {})",
                    task.job_id, task.attempt
                );
                process_task(&ctx, task).await;
            }
            Ok(None) => {
                tokio::select! {
                    _ = tokio::time::sleep(ctx.poll_interval) => {}
                    _ = shutdown.changed() => {}
                }
            }
            Err(e) => {
                error!("Worker {worker_id} failed to dequeue: {e}");
                tokio::time::sleep(ctx.poll_interval).await;
            }
        }
    }

    debug!("Worker {worker_id} stopped");
}

impl WorkerContext {
    fn lease(&self) -> Duration {
        self.hard_time_limit + LEASE_MARGIN
    }
}

/// The task stays claimed in the queue until its outcome is recorded, so a
/// worker that dies part way leaves it to be reclaimed.
async fn process_task(ctx: &WorkerContext, task: EvaluationTask) {
    match ctx.queue.try_acquire(task.job_id, ctx.lease()).await {
        Ok(true) => {}
        Ok(false) => {
            warn!("Job {} is already running elsewhere; dropping task", task.job_id);
            ack(ctx, task).await;
            return;
        }
        Err(e) => {
            error!("Could not lease job {}: {e}; requeueing", task.job_id);
            if let Err(e) = ctx.queue.schedule(task, ctx.poll_interval).await {
                error!("Failed to requeue job {}: {e}", task.job_id);
                return;
            }
            ack(ctx, task).await;
            return;
        }
    }

    let outcome = run_with_hard_limit(ctx, task.job_id).await;

    match ctx.scheduler.decide(&outcome, task.attempt) {
        RetryDecision::Done => {}
        RetryDecision::Retry { attempt, delay } => {
            info!(
                "Retrying job {} in {}s (retry {attempt}/{})",
                task.job_id,
                delay.as_secs(),
                ctx.scheduler.max_retries
            );
            let next = EvaluationTask {
                job_id: task.job_id,
                attempt,
            };
            if let Err(e) = ctx.queue.schedule(next, delay).await {
                // Left claimed; it is picked up again once the lease lapses.
                error!("Failed to schedule retry for job {}: {e}", task.job_id);
                release(ctx, task.job_id).await;
                return;
            }
        }
        RetryDecision::Exhausted => {
            warn!(
                "Job {} failed after {} retries: {}",
                task.job_id,
                ctx.scheduler.max_retries,
                outcome.error.as_deref().unwrap_or("unknown error")
            );
        }
    }

    ack(ctx, task).await;
    release(ctx, task.job_id).await;
}

async fn ack(ctx: &WorkerContext, task: EvaluationTask) {
    if let Err(e) = ctx.queue.ack(task).await {
        error!("Failed to acknowledge task for job {}: {e}", task.job_id);
    }
}

async fn release(ctx: &WorkerContext, job_id: Uuid) {
    if let Err(e) = ctx.queue.release(job_id).await {
        error!("Failed to release lease for job {job_id}: {e}");
    }
}

/// Aborts the attempt when dropped, so cancelling a worker cancels the
/// attempt it was driving.
struct AttemptHandle(JoinHandle<PipelineOutcome>);

impl Drop for AttemptHandle {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// Runs one attempt in its own task. Past the hard limit the task is aborted
/// and the job fails without a retry. A panic counts as an unexpected,
/// retryable failure. Either way the stage that was cut off gets its failed
/// step log.
async fn run_with_hard_limit(ctx: &WorkerContext, job_id: Uuid) -> PipelineOutcome {
    let tracker = Arc::new(StageTracker::new());
    let orchestrator = ctx.orchestrator.clone();
    let attempt_tracker = tracker.clone();
    let mut attempt = AttemptHandle(tokio::spawn(async move {
        orchestrator.run_tracked(job_id, &attempt_tracker).await
    }));

    let (message, retryable) =
        match tokio::time::timeout(ctx.hard_time_limit, &mut attempt.0).await {
            Ok(Ok(outcome)) => return outcome,
            Ok(Err(join_error)) => {
                error!("Evaluation task for job {job_id} panicked: {join_error}");
                let err = StageError::unexpected(PIPELINE_STEP, "evaluation task panicked");
                (err.user_message(), true)
            }
            Err(_) => {
                attempt.0.abort();
                // Wait for the abort so the attempt cannot write after us.
                let _ = (&mut attempt.0).await;
                error!(
                    "Evaluation for job {job_id} hit the hard time limit of {:?}",
                    ctx.hard_time_limit
                );
                (HARD_TIMEOUT_MESSAGE.to_string(), false)
            }
        };

    ctx.orchestrator
        .log_interrupted_stage(job_id, &tracker, &message)
        .await;

    if let Err(e) = ctx
        .orchestrator
        .jobs()
        .update_status(job_id, JobStatus::Failed, Some(&message))
        .await
    {
        error!("Failed to mark job {job_id} as failed: {e}");
    }

    PipelineOutcome {
        job_id,
        status: JobStatus::Failed,
        error: Some(message),
        retryable,
    }
}
