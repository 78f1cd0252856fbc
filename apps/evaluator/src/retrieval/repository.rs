use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use sqlx::types::Json;
use sqlx::{FromRow, PgPool};
use tokio::sync::RwLock;

use super::{ChunkMetadata, RetrievalError};
use crate::models::ReferenceCategory;

/// One persisted window of a reference document.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredChunk {
    /// `{document_id}_chunk_{index}`.
    pub id: String,
    pub text: String,
    pub embedding: Vec<f32>,
    pub metadata: ChunkMetadata,
}

impl StoredChunk {
    pub fn chunk_id(document_id: &str, index: usize) -> String {
        format!("{document_id}_chunk_{index}")
    }
}

/// Storage behind the reference index. Scoring happens in the index, so a
/// repository only needs to filter by category.
#[async_trait]
pub trait ChunkRepository: Send + Sync {
    /// Replaces every chunk of `document_id` with `chunks`.
    async fn replace_document(
        &self,
        document_id: &str,
        chunks: Vec<StoredChunk>,
    ) -> Result<(), RetrievalError>;

    /// Chunks whose category is in `categories`, or every chunk when it is empty.
    async fn candidates(
        &self,
        categories: &[ReferenceCategory],
    ) -> Result<Vec<StoredChunk>, RetrievalError>;

    /// Deletes every chunk. Returns how many were removed.
    async fn clear(&self) -> Result<u64, RetrievalError>;

    async fn count(&self) -> Result<u64, RetrievalError>;
}

/// Chunks kept in process memory, ordered by chunk id.
#[derive(Clone, Default)]
pub struct MemoryChunkRepository {
    chunks: Arc<RwLock<BTreeMap<String, StoredChunk>>>,
}

impl MemoryChunkRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ChunkRepository for MemoryChunkRepository {
    async fn replace_document(
        &self,
        document_id: &str,
        chunks: Vec<StoredChunk>,
    ) -> Result<(), RetrievalError> {
        let mut stored = self.chunks.write().await;
        stored.retain(|_, chunk| chunk.metadata.document_id != document_id);
        for chunk in chunks {
            stored.insert(chunk.id.clone(), chunk);
        }
        Ok(())
    }

    async fn candidates(
        &self,
        categories: &[ReferenceCategory],
    ) -> Result<Vec<StoredChunk>, RetrievalError> {
        let stored = self.chunks.read().await;
        Ok(stored
            .values()
            .filter(|c| categories.is_empty() || categories.contains(&c.metadata.document_type))
            .cloned()
            .collect())
    }

    async fn clear(&self) -> Result<u64, RetrievalError> {
        let mut stored = self.chunks.write().await;
        let removed = stored.len() as u64;
        stored.clear();
        Ok(removed)
    }

    async fn count(&self) -> Result<u64, RetrievalError> {
        Ok(self.chunks.read().await.len() as u64)
    }
}

#[derive(FromRow)]
struct ChunkRow {
    id: String,
    content: String,
    embedding: Vec<f32>,
    metadata: Json<ChunkMetadata>,
}

impl From<ChunkRow> for StoredChunk {
    fn from(row: ChunkRow) -> Self {
        StoredChunk {
            id: row.id,
            text: row.content,
            embedding: row.embedding,
            metadata: row.metadata.0,
        }
    }
}

/// Chunks stored in the `reference_chunks` table with `REAL[]` embeddings.
#[derive(Clone)]
pub struct PgChunkRepository {
    pool: PgPool,
}

impl PgChunkRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ChunkRepository for PgChunkRepository {
    async fn replace_document(
        &self,
        document_id: &str,
        chunks: Vec<StoredChunk>,
    ) -> Result<(), RetrievalError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM reference_chunks WHERE document_id = $1")
            .bind(document_id)
            .execute(&mut *tx)
            .await?;

        for chunk in chunks {
            sqlx::query(
                r#"
                INSERT INTO reference_chunks
                    (id, document_id, category, chunk_index, content, embedding, metadata)
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                "#,
            )
            .bind(&chunk.id)
            .bind(&chunk.metadata.document_id)
            .bind(chunk.metadata.document_type.as_str())
            .bind(chunk.metadata.chunk_index as i32)
            .bind(&chunk.text)
            .bind(&chunk.embedding)
            .bind(Json(&chunk.metadata))
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn candidates(
        &self,
        categories: &[ReferenceCategory],
    ) -> Result<Vec<StoredChunk>, RetrievalError> {
        let rows = if categories.is_empty() {
            sqlx::query_as::<_, ChunkRow>(
                "SELECT id, content, embedding, metadata FROM reference_chunks ORDER BY id",
            )
            .fetch_all(&self.pool)
            .await?
        } else {
            let names: Vec<String> = categories.iter().map(|c| c.as_str().to_string()).collect();
            sqlx::query_as::<_, ChunkRow>(
                r#"
                SELECT id, content, embedding, metadata
                FROM reference_chunks
                WHERE category = ANY($1)
                ORDER BY id
                "#,
            )
            .bind(&names)
            .fetch_all(&self.pool)
            .await?
        };

        Ok(rows.into_iter().map(StoredChunk::from).collect())
    }

    async fn clear(&self) -> Result<u64, RetrievalError> {
        let result = sqlx::query("DELETE FROM reference_chunks")
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn count(&self) -> Result<u64, RetrievalError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM reference_chunks")
            .fetch_one(&self.pool)
            .await?;
        Ok(count as u64)
    }
}
