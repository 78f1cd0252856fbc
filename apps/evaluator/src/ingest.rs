//! Loading reference documents into the retrieval index.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use serde_json::{Map, Value};
use sqlx::PgPool;
use tracing::{error, info, warn};

use crate::models::{ReferenceCategory, ReferenceDocument};
use crate::retrieval::ReferenceIndex;

/// One document to be chunked into the index.
#[derive(Debug, Clone, PartialEq)]
pub struct ReferenceSource {
    pub id: String,
    pub category: ReferenceCategory,
    pub title: String,
    pub content: String,
    pub metadata: Option<Map<String, Value>>,
}

impl TryFrom<ReferenceDocument> for ReferenceSource {
    type Error = anyhow::Error;

    fn try_from(doc: ReferenceDocument) -> Result<Self> {
        let category = doc
            .document_type
            .parse()
            .map_err(|e: String| anyhow::anyhow!(e))?;
        let metadata = match doc.metadata {
            Some(Value::Object(map)) => Some(map),
            Some(Value::Null) | None => None,
            Some(other) => bail!("metadata of reference document {} is not an object: {other}", doc.id),
        };
        Ok(Self {
            id: doc.id.to_string(),
            category,
            title: doc.title,
            content: doc.content,
            metadata,
        })
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestSummary {
    pub documents: usize,
    pub chunks: usize,
    pub failed: usize,
}

pub async fn load_from_db(pool: &PgPool) -> Result<Vec<ReferenceSource>> {
    let rows = sqlx::query_as::<_, ReferenceDocument>(
        r#"
        SELECT id, document_type, title, content, metadata
        FROM reference_documents
        ORDER BY document_type, created_at
        "#,
    )
    .fetch_all(pool)
    .await
    .context("loading reference documents")?;

    rows.into_iter().map(ReferenceSource::try_from).collect()
}

/// Reads `<dir>/<category>/<name>.{txt,md}`. The file stem is the title and
/// `<category>/<stem>` the document id, so re-running replaces chunks.
pub async fn load_from_dir(dir: &Path) -> Result<Vec<ReferenceSource>> {
    let mut sources = Vec::new();

    for category in ReferenceCategory::ALL {
        let category_dir = dir.join(category.as_str());
        if !tokio::fs::try_exists(&category_dir).await.unwrap_or(false) {
            continue;
        }

        let mut paths: Vec<PathBuf> = Vec::new();
        let mut entries = tokio::fs::read_dir(&category_dir)
            .await
            .with_context(|| format!("reading {}", category_dir.display()))?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let is_text = matches!(
                path.extension().and_then(|e| e.to_str()),
                Some("txt") | Some("md")
            );
            if is_text {
                paths.push(path);
            }
        }
        paths.sort();

        for path in paths {
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            let content = tokio::fs::read_to_string(&path)
                .await
                .with_context(|| format!("reading {}", path.display()))?;
            sources.push(ReferenceSource {
                id: format!("{}/{stem}", category.as_str()),
                category,
                title: stem.replace(['_', '-'], " "),
                content,
                metadata: None,
            });
        }
    }

    Ok(sources)
}

/// Ingests every source. A failing document is logged and skipped.
pub async fn ingest_all(index: &ReferenceIndex, sources: Vec<ReferenceSource>) -> IngestSummary {
    let mut summary = IngestSummary::default();

    for source in sources {
        info!("Ingesting: {} - {}", source.category, source.title);
        if source.content.trim().is_empty() {
            warn!("Skipping {}: no content", source.id);
            summary.failed += 1;
            continue;
        }
        match index
            .ingest(
                &source.id,
                source.category,
                &source.title,
                &source.content,
                source.metadata,
            )
            .await
        {
            Ok(chunks) => {
                info!("  created {chunks} chunks");
                summary.documents += 1;
                summary.chunks += chunks;
            }
            Err(e) => {
                error!("  failed to ingest {}: {e}", source.id);
                summary.failed += 1;
            }
        }
    }

    summary
}
