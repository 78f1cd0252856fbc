use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Script};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::{EvaluationTask, QueueError, TaskQueue};

const DEFAULT_PREFIX: &str = "evaluator";
const PROMOTE_BATCH: isize = 100;

/// Pops the oldest ready payload and records it as claimed until ARGV[1].
const DEQUEUE_SCRIPT: &str = r#"
local payload = redis.call('RPOP', KEYS[1])
if payload then
    redis.call('ZADD', KEYS[2], ARGV[1], payload)
end
return payload
"#;

/// Moves up to ARGV[2] members scored at or below ARGV[1] from the sorted
/// set KEYS[1] onto the ready list KEYS[2].
const PROMOTE_SCRIPT: &str = r#"
local due = redis.call('ZRANGEBYSCORE', KEYS[1], '-inf', ARGV[1], 'LIMIT', 0, ARGV[2])
for _, payload in ipairs(due) do
    redis.call('ZREM', KEYS[1], payload)
    redis.call('LPUSH', KEYS[2], payload)
end
return #due
"#;

/// Moves one member ARGV[1] from KEYS[1] onto KEYS[2] if it is still there.
const REQUEUE_SCRIPT: &str = r#"
if redis.call('ZREM', KEYS[1], ARGV[1]) == 1 then
    redis.call('LPUSH', KEYS[2], ARGV[1])
    return 1
end
return 0
"#;

/// Redis-backed queue shared by the API and every worker process.
///
/// Ready tasks live in a list, delayed retries in a sorted set scored by due
/// time in epoch milliseconds, claimed tasks in a sorted set scored by the end
/// of their claim window, and leases in `SET NX PX` keys. Every move between
/// those structures runs as one Lua script.
#[derive(Clone)]
pub struct RedisTaskQueue {
    conn: ConnectionManager,
    prefix: String,
}

impl RedisTaskQueue {
    pub async fn connect(client: redis::Client) -> Result<Self, QueueError> {
        let conn = ConnectionManager::new(client).await?;
        Ok(Self {
            conn,
            prefix: DEFAULT_PREFIX.to_string(),
        })
    }

    fn ready_key(&self) -> String {
        ready_key(&self.prefix)
    }

    fn scheduled_key(&self) -> String {
        format!("{}:queue:scheduled", self.prefix)
    }

    fn processing_key(&self) -> String {
        processing_key(&self.prefix)
    }

    fn lease_key(&self, job_id: Uuid) -> String {
        lease_key(&self.prefix, job_id)
    }
}

fn ready_key(prefix: &str) -> String {
    format!("{prefix}:queue:ready")
}

fn processing_key(prefix: &str) -> String {
    format!("{prefix}:queue:processing")
}

fn lease_key(prefix: &str, job_id: Uuid) -> String {
    format!("{prefix}:lease:{job_id}")
}

#[async_trait]
impl TaskQueue for RedisTaskQueue {
    async fn enqueue(&self, task: EvaluationTask) -> Result<(), QueueError> {
        let payload = serde_json::to_string(&task)?;
        let mut conn = self.conn.clone();
        conn.lpush::<_, _, ()>(self.ready_key(), payload).await?;
        Ok(())
    }

    async fn schedule(&self, task: EvaluationTask, delay: Duration) -> Result<(), QueueError> {
        let payload = serde_json::to_string(&task)?;
        let due = Utc::now().timestamp_millis() + delay.as_millis() as i64;
        let mut conn = self.conn.clone();
        conn.zadd::<_, _, _, ()>(self.scheduled_key(), payload, due)
            .await?;
        Ok(())
    }

    async fn promote_due(&self) -> Result<usize, QueueError> {
        let now = Utc::now().timestamp_millis();
        let mut conn = self.conn.clone();
        let moved: usize = Script::new(PROMOTE_SCRIPT)
            .key(self.scheduled_key())
            .key(self.ready_key())
            .arg(now)
            .arg(PROMOTE_BATCH)
            .invoke_async(&mut conn)
            .await?;
        if moved > 0 {
            debug!("Promoted {moved} scheduled evaluation task(s)");
        }
        Ok(moved)
    }

    async fn dequeue(&self, claim: Duration) -> Result<Option<EvaluationTask>, QueueError> {
        let claimed_until = Utc::now().timestamp_millis() + claim.as_millis() as i64;
        let mut conn = self.conn.clone();
        let payload: Option<String> = Script::new(DEQUEUE_SCRIPT)
            .key(self.ready_key())
            .key(self.processing_key())
            .arg(claimed_until)
            .invoke_async(&mut conn)
            .await?;
        match payload {
            Some(payload) => Ok(Some(serde_json::from_str(&payload)?)),
            None => Ok(None),
        }
    }

    async fn ack(&self, task: EvaluationTask) -> Result<(), QueueError> {
        let payload = serde_json::to_string(&task)?;
        let mut conn = self.conn.clone();
        conn.zrem::<_, _, ()>(self.processing_key(), payload).await?;
        Ok(())
    }

    async fn reclaim_expired(&self) -> Result<usize, QueueError> {
        let now = Utc::now().timestamp_millis();
        let mut conn = self.conn.clone();
        let expired: Vec<String> = conn
            .zrangebyscore_limit(self.processing_key(), "-inf", now, 0, PROMOTE_BATCH)
            .await?;

        let mut moved = 0;
        for payload in expired {
            let task: EvaluationTask = match serde_json::from_str(&payload) {
                Ok(task) => task,
                Err(e) => {
                    warn!("Discarding malformed claimed task {payload}: {e}");
                    conn.zrem::<_, _, ()>(self.processing_key(), &payload).await?;
                    continue;
                }
            };
            let leased: bool = conn.exists(self.lease_key(task.job_id)).await?;
            if leased {
                continue;
            }
            let requeued: i64 = Script::new(REQUEUE_SCRIPT)
                .key(self.processing_key())
                .key(self.ready_key())
                .arg(&payload)
                .invoke_async(&mut conn)
                .await?;
            if requeued == 1 {
                info!(
                    "Requeued job {} (attempt {}) abandoned by its worker",
                    task.job_id, task.attempt
                );
                moved += 1;
            }
        }
        Ok(moved)
    }

    async fn try_acquire(&self, job_id: Uuid, ttl: Duration) -> Result<bool, QueueError> {
        let mut conn = self.conn.clone();
        let reply: Option<String> = redis::cmd("SET")
            .arg(self.lease_key(job_id))
            .arg(1)
            .arg("NX")
            .arg("PX")
            .arg(ttl.as_millis() as u64)
            .query_async(&mut conn)
            .await?;
        Ok(reply.is_some())
    }

    async fn release(&self, job_id: Uuid) -> Result<(), QueueError> {
        let mut conn = self.conn.clone();
        conn.del::<_, ()>(self.lease_key(job_id)).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keys_are_namespaced() {
        let id = Uuid::nil();
        assert_eq!(ready_key("evaluator"), "evaluator:queue:ready");
        assert_eq!(processing_key("evaluator"), "evaluator:queue:processing");
        assert_eq!(
            lease_key("evaluator", id),
            "evaluator:lease:00000000-0000-0000-0000-000000000000"
        );
    }
}
