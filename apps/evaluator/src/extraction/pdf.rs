use std::path::Path;

use async_trait::async_trait;
use tracing::{debug, warn};

use super::{ExtractedText, ExtractionError, TextExtractor};

const PDF_MAGIC: &[u8] = b"%PDF-";

/// Extracts text from PDF files with `pdf-extract`, page by page.
///
/// Pages that yield no text are skipped. A document where every page is empty
/// is an error, as is anything that does not parse as a PDF.
#[derive(Debug, Clone, Copy, Default)]
pub struct PdfTextExtractor;

impl PdfTextExtractor {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl TextExtractor for PdfTextExtractor {
    async fn extract(&self, path: &Path) -> Result<ExtractedText, ExtractionError> {
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|source| ExtractionError::Read {
                path: path.to_path_buf(),
                source,
            })?;

        if !bytes.starts_with(PDF_MAGIC) {
            return Err(ExtractionError::InvalidFormat {
                path: path.to_path_buf(),
                reason: if bytes.is_empty() {
                    "file is empty".to_string()
                } else {
                    "missing %PDF- header".to_string()
                },
            });
        }

        let owned_path = path.to_path_buf();
        let pages = tokio::task::spawn_blocking(move || extract_pages(&owned_path, &bytes))
            .await
            .map_err(|e| ExtractionError::Parse {
                path: path.to_path_buf(),
                message: format!("extraction task failed: {e}"),
            })??;

        let raw_text = join_pages(path, pages)?;
        debug!("Extracted {} chars from {}", raw_text.len(), path.display());
        Ok(ExtractedText::from_raw(raw_text))
    }
}

fn extract_pages(path: &Path, bytes: &[u8]) -> Result<Vec<String>, ExtractionError> {
    // pdf_extract panics on some malformed inputs
    let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
        pdf_extract::extract_text_from_mem_by_pages(bytes)
    }));

    match result {
        Ok(Ok(pages)) => Ok(pages),
        Ok(Err(e)) => Err(ExtractionError::Parse {
            path: path.to_path_buf(),
            message: e.to_string(),
        }),
        Err(_) => Err(ExtractionError::Parse {
            path: path.to_path_buf(),
            message: "PDF extraction panicked (malformed PDF)".to_string(),
        }),
    }
}

/// Joins non-empty pages with newlines. Fails when no page produced text.
fn join_pages(path: &Path, pages: Vec<String>) -> Result<String, ExtractionError> {
    let total = pages.len();
    let kept: Vec<String> = pages
        .into_iter()
        .filter(|page| !page.trim().is_empty())
        .collect();

    if kept.len() < total {
        warn!(
            "{}: skipped {} of {} pages with no text",
            path.display(),
            total - kept.len(),
            total
        );
    }
    if kept.is_empty() {
        return Err(ExtractionError::Empty {
            path: path.to_path_buf(),
        });
    }

    Ok(kept.join("\n").trim().to_string())
}
