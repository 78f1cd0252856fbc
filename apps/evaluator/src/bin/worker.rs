use std::sync::Arc;

use anyhow::Result;
use tracing::{error, info};

use evaluator::bootstrap::{connect_queue, init_tracing, orchestrator};
use evaluator::cleanup::purge_expired;
use evaluator::config::Config;
use evaluator::db::{create_pool, run_migrations};
use evaluator::queue::WorkerPool;
use evaluator::store::{PgDocumentStore, PgJobStore};

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::from_env()?;
    init_tracing(&config.rust_log);

    info!("Starting evaluation worker v{}", env!("CARGO_PKG_VERSION"));

    let db = create_pool(&config.database_url).await?;
    run_migrations(&db).await?;

    let queue = Arc::new(connect_queue(&config).await?);
    let orchestrator = Arc::new(orchestrator(&db, &config)?);
    let pool = WorkerPool::start(orchestrator, queue, &config.worker);

    let retention = chrono::Duration::days(config.worker.retention_days);
    let mut cleanup_tick = tokio::time::interval(config.worker.cleanup_interval);
    let jobs = PgJobStore::new(db.clone());
    let documents = PgDocumentStore::new(db);

    loop {
        tokio::select! {
            _ = cleanup_tick.tick() => {
                if let Err(e) = purge_expired(&jobs, &documents, retention).await {
                    error!("Retention cleanup failed: {e}");
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Received Ctrl-C");
                break;
            }
        }
    }

    pool.shutdown();
    pool.wait().await;
    Ok(())
}
