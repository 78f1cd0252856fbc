//! Wiring shared by the three binaries.

use std::sync::Arc;

use anyhow::{Context, Result};
use sqlx::PgPool;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::{Config, EmbeddingBackend, RetrievalConfig};
use crate::evaluation::Evaluator;
use crate::extraction::PdfTextExtractor;
use crate::llm_client::LlmClient;
use crate::pipeline::{Orchestrator, PipelineDeps};
use crate::queue::RedisTaskQueue;
use crate::retrieval::{
    EmbeddingProvider, HashEmbeddingProvider, HttpEmbeddingProvider, PgChunkRepository,
    ReferenceIndex, Tokenizer, WordTokenizer,
};
use crate::store::{PgDocumentStore, PgJobStore};

/// Structured logging with `RUST_LOG`, falling back to `evaluator={rust_log}`.
pub fn init_tracing(rust_log: &str) {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("{}={}", env!("CARGO_PKG_NAME"), rust_log))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();
}

pub async fn connect_queue(config: &Config) -> Result<RedisTaskQueue> {
    let client = redis::Client::open(config.redis_url.clone())?;
    let queue = RedisTaskQueue::connect(client)
        .await
        .context("connecting to Redis")?;
    info!("Redis task queue connected");
    Ok(queue)
}

pub fn reference_index(pool: &PgPool, config: &Config) -> Result<ReferenceIndex> {
    let retrieval = &config.retrieval;
    let embedder: Arc<dyn EmbeddingProvider> = match retrieval.embedding_backend {
        EmbeddingBackend::Http => Arc::new(HttpEmbeddingProvider::new(
            &retrieval.embedding_api_base,
            &retrieval.embedding_api_key,
            &retrieval.embedding_model,
            config.llm.timeout,
        )?),
        EmbeddingBackend::Hash => Arc::new(HashEmbeddingProvider::new(retrieval.embedding_dim)),
    };
    info!("Embedding model: {}", embedder.model_name());

    Ok(ReferenceIndex::new(
        Arc::new(PgChunkRepository::new(pool.clone())),
        embedder,
        tokenizer(retrieval)?,
        retrieval,
    ))
}

#[cfg(feature = "hf-tokenizer")]
fn tokenizer(config: &RetrievalConfig) -> Result<Arc<dyn Tokenizer>> {
    match &config.tokenizer_path {
        Some(path) => {
            let tokenizer = crate::retrieval::chunking::HfTokenizer::from_file(path)?;
            info!("Chunking with tokenizer {}", path.display());
            Ok(Arc::new(tokenizer))
        }
        None => Ok(Arc::new(WordTokenizer)),
    }
}

#[cfg(not(feature = "hf-tokenizer"))]
fn tokenizer(config: &RetrievalConfig) -> Result<Arc<dyn Tokenizer>> {
    if config.tokenizer_path.is_some() {
        anyhow::bail!("TOKENIZER_PATH is set but the hf-tokenizer feature is not enabled");
    }
    Ok(Arc::new(WordTokenizer))
}

pub fn orchestrator(pool: &PgPool, config: &Config) -> Result<Orchestrator> {
    let llm = LlmClient::from_config(&config.llm)?;
    info!("LLM client initialized (provider: {}, model: {})", llm.provider(), llm.model());

    let deps = PipelineDeps {
        jobs: Arc::new(PgJobStore::new(pool.clone())),
        documents: Arc::new(PgDocumentStore::new(pool.clone())),
        extractor: Arc::new(PdfTextExtractor::new()),
        index: reference_index(pool, config)?,
        evaluator: Evaluator::new(llm),
    };

    Ok(Orchestrator::new(
        deps,
        config.pipeline.clone(),
        config.retrieval.top_k,
    ))
}
