//! Reference-document vector index: chunking, embedding, storage and
//! category-filtered nearest-neighbour queries.
//!
//! The index is shared by the ingest binary (writes) and every running
//! pipeline (reads). Writes and reads are not mutually exclusive; running
//! `reset` while evaluations are in flight is left to the operator.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::{info, warn};

use crate::config::RetrievalConfig;
use crate::models::ReferenceCategory;

pub mod chunking;
pub mod context;
pub mod embedding;
pub mod repository;

pub use chunking::{chunk_text, merge_chunks, TextChunk, Tokenizer, WordTokenizer};
pub use context::{cv_grading_context, project_grading_context, render_context};
pub use embedding::{EmbeddingProvider, HashEmbeddingProvider, HttpEmbeddingProvider};
pub use repository::{ChunkRepository, MemoryChunkRepository, PgChunkRepository, StoredChunk};

#[derive(Debug, Error)]
pub enum RetrievalError {
    #[error("Vector store error: {0}")]
    Store(#[from] sqlx::Error),

    #[error("Embedding failed: {0}")]
    Embedding(String),

    #[error("Tokenizer error: {0}")]
    Tokenizer(String),

    #[error("Invalid query: {0}")]
    InvalidQuery(String),
}

/// Metadata attached to every chunk. The fixed fields always take precedence
/// over caller-supplied extras with the same name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    pub document_id: String,
    pub document_type: ReferenceCategory,
    pub title: String,
    pub chunk_index: usize,
    pub total_chunks: usize,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

const RESERVED_KEYS: [&str; 5] = [
    "document_id",
    "document_type",
    "title",
    "chunk_index",
    "total_chunks",
];

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RetrievedChunk {
    pub text: String,
    pub metadata: ChunkMetadata,
    /// Cosine distance to the query; lower is closer.
    pub distance: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct IndexStats {
    pub total_chunks: u64,
}

#[derive(Clone)]
pub struct ReferenceIndex {
    repository: Arc<dyn ChunkRepository>,
    embedder: Arc<dyn EmbeddingProvider>,
    tokenizer: Arc<dyn Tokenizer>,
    chunk_size: usize,
    chunk_overlap: usize,
}

impl ReferenceIndex {
    pub fn new(
        repository: Arc<dyn ChunkRepository>,
        embedder: Arc<dyn EmbeddingProvider>,
        tokenizer: Arc<dyn Tokenizer>,
        config: &RetrievalConfig,
    ) -> Self {
        Self {
            repository,
            embedder,
            tokenizer,
            chunk_size: config.chunk_size.max(1),
            chunk_overlap: config.chunk_overlap.min(config.chunk_size.saturating_sub(1)),
        }
    }

    /// In-memory index with hash embeddings and word tokens.
    pub fn in_memory(config: &RetrievalConfig) -> Self {
        Self::new(
            Arc::new(MemoryChunkRepository::new()),
            Arc::new(HashEmbeddingProvider::new(config.embedding_dim)),
            Arc::new(WordTokenizer),
            config,
        )
    }

    /// Chunks, embeds and stores a reference document, replacing any chunks it
    /// had before. Returns the number of chunks written.
    pub async fn ingest(
        &self,
        document_id: &str,
        category: ReferenceCategory,
        title: &str,
        content: &str,
        metadata: Option<Map<String, Value>>,
    ) -> Result<usize, RetrievalError> {
        let windows = chunk_text(
            content,
            self.tokenizer.as_ref(),
            self.chunk_size,
            self.chunk_overlap,
        );
        let total_chunks = windows.len();

        let mut extra = metadata.unwrap_or_default();
        for key in RESERVED_KEYS {
            extra.remove(key);
        }

        let texts: Vec<String> = windows.iter().map(|w| w.text.clone()).collect();
        let embeddings = self.embedder.embed(&texts).await?;
        if embeddings.len() != windows.len() {
            return Err(RetrievalError::Embedding(format!(
                "expected {} vectors, got {}",
                windows.len(),
                embeddings.len()
            )));
        }

        let chunks = windows
            .into_iter()
            .zip(embeddings)
            .map(|(window, embedding)| StoredChunk {
                id: StoredChunk::chunk_id(document_id, window.index),
                metadata: ChunkMetadata {
                    document_id: document_id.to_string(),
                    document_type: category,
                    title: title.to_string(),
                    chunk_index: window.index,
                    total_chunks,
                    extra: extra.clone(),
                },
                text: window.text,
                embedding,
            })
            .collect();

        self.repository.replace_document(document_id, chunks).await?;
        info!("Ingested '{title}' ({category}) as {total_chunks} chunks");
        Ok(total_chunks)
    }

    /// Returns up to `top_k` chunks in `categories`, closest first. Ties keep
    /// chunk id order.
    pub async fn query(
        &self,
        text: &str,
        categories: &[ReferenceCategory],
        top_k: usize,
    ) -> Result<Vec<RetrievedChunk>, RetrievalError> {
        if text.trim().is_empty() {
            return Err(RetrievalError::InvalidQuery("query text is empty".to_string()));
        }
        if top_k == 0 {
            return Ok(Vec::new());
        }

        let candidates = self.repository.candidates(categories).await?;
        if candidates.is_empty() {
            warn!("Reference index has no chunks for categories {categories:?}");
            return Ok(Vec::new());
        }

        let query_embedding = self.embedder.embed_one(text).await?;
        let mut scored: Vec<RetrievedChunk> = candidates
            .into_iter()
            .map(|chunk| RetrievedChunk {
                distance: embedding::cosine_distance(&query_embedding, &chunk.embedding),
                text: chunk.text,
                metadata: chunk.metadata,
            })
            .collect();

        scored.sort_by(|a, b| a.distance.total_cmp(&b.distance));
        scored.truncate(top_k);
        Ok(scored)
    }

    /// Deletes every stored chunk. Irreversible.
    pub async fn reset(&self) -> Result<u64, RetrievalError> {
        let removed = self.repository.clear().await?;
        warn!("Reference index reset: removed {removed} chunks");
        Ok(removed)
    }

    pub async fn stats(&self) -> Result<IndexStats, RetrievalError> {
        Ok(IndexStats {
            total_chunks: self.repository.count().await?,
        })
    }
}
