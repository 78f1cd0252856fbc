use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde_json::{Map, Value};
use tracing::{info, warn};
use uuid::Uuid;

use evaluator::bootstrap::{init_tracing, reference_index};
use evaluator::config::Config;
use evaluator::db::{create_pool, run_migrations};
use evaluator::ingest::{ingest_all, load_from_db, load_from_dir, ReferenceSource};
use evaluator::models::ReferenceCategory;

#[derive(Parser)]
#[command(name = "evaluator-ingest")]
#[command(about = "Load reference documents into the retrieval index")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Ingest every reference document
    Sync {
        /// Remove all indexed chunks first
        #[arg(long)]
        reset: bool,
        /// Read `<dir>/<category>/*.{txt,md}` instead of the reference_documents table
        #[arg(long)]
        from_dir: Option<PathBuf>,
    },

    /// Store one reference document and ingest it
    Add {
        /// job_description, cv_rubric, case_study_brief or project_rubric
        #[arg(long = "type")]
        category: ReferenceCategory,
        #[arg(long)]
        title: String,
        /// Text file with the document body
        #[arg(long)]
        file: PathBuf,
        /// JSON object stored alongside the document
        #[arg(long)]
        metadata: Option<String>,
    },

    /// Print index statistics
    Stats,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::from_env()?;
    init_tracing(&config.rust_log);

    let db = create_pool(&config.database_url).await?;
    run_migrations(&db).await?;
    let index = reference_index(&db, &config)?;

    match cli.command {
        Commands::Sync { reset, from_dir } => {
            if reset {
                // Evaluations running now may see an empty index.
                warn!("Resetting the reference index");
                index.reset().await?;
            }
            let sources = match from_dir {
                Some(dir) => load_from_dir(&dir).await?,
                None => load_from_db(&db).await?,
            };
            if sources.is_empty() {
                warn!("No reference documents found");
                return Ok(());
            }

            let total = sources.len();
            let summary = ingest_all(&index, sources).await;
            info!(
                "Ingestion complete: {}/{total} documents, {} chunks, {} failed",
                summary.documents, summary.chunks, summary.failed
            );
        }
        Commands::Add {
            category,
            title,
            file,
            metadata,
        } => {
            let content = tokio::fs::read_to_string(&file)
                .await
                .with_context(|| format!("reading {}", file.display()))?;
            let metadata: Option<Map<String, Value>> = metadata
                .map(|raw| serde_json::from_str(&raw))
                .transpose()
                .context("--metadata must be a JSON object")?;

            let id = Uuid::new_v4();
            sqlx::query(
                r#"
                INSERT INTO reference_documents (id, document_type, title, content, metadata)
                VALUES ($1, $2, $3, $4, $5)
                "#,
            )
            .bind(id)
            .bind(category.as_str())
            .bind(&title)
            .bind(&content)
            .bind(metadata.clone().map(Value::Object))
            .execute(&db)
            .await?;
            info!("Reference document inserted with ID: {id}");

            let summary = ingest_all(
                &index,
                vec![ReferenceSource {
                    id: id.to_string(),
                    category,
                    title,
                    content,
                    metadata,
                }],
            )
            .await;
            info!("Created {} chunks", summary.chunks);
        }
        Commands::Stats => {}
    }

    let stats = index.stats().await?;
    info!("Index holds {} chunks", stats.total_chunks);
    Ok(())
}
