use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;

use evaluator::bootstrap::{connect_queue, init_tracing};
use evaluator::config::Config;
use evaluator::db::{create_pool, run_migrations};
use evaluator::routes::build_router;
use evaluator::state::{AppState, UploadSettings};
use evaluator::store::{PgDocumentStore, PgJobStore};

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first (fails on missing required env vars)
    let config = Config::from_env()?;
    init_tracing(&config.rust_log);

    info!("Starting CV Evaluator API v{}", env!("CARGO_PKG_VERSION"));

    let db = create_pool(&config.database_url).await?;
    run_migrations(&db).await?;

    let queue = connect_queue(&config).await?;

    tokio::fs::create_dir_all(&config.upload_dir).await?;
    info!("Uploads stored in {}", config.upload_dir.display());

    let state = AppState {
        jobs: Arc::new(PgJobStore::new(db.clone())),
        documents: Arc::new(PgDocumentStore::new(db)),
        queue: Arc::new(queue),
        uploads: UploadSettings {
            dir: config.upload_dir.clone(),
            max_file_size: config.max_file_size,
        },
    };

    let app = build_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive()); // TODO: restrict origins once the frontend host is fixed

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    info!("Listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;

    Ok(())
}
