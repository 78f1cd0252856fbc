//! Converts uploaded candidate documents into cleaned plain text.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

pub mod pdf;

pub use pdf::PdfTextExtractor;

#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{path} is not a valid PDF document: {reason}")]
    InvalidFormat { path: PathBuf, reason: String },

    #[error("Failed to extract text from {path}: {message}")]
    Parse { path: PathBuf, message: String },

    #[error("No extractable text found in {path}")]
    Empty { path: PathBuf },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExtractedText {
    pub raw_text: String,
    pub cleaned_text: String,
    pub char_count: usize,
    pub word_count: usize,
}

impl ExtractedText {
    pub fn from_raw(raw_text: String) -> Self {
        let cleaned_text = clean_text(&raw_text);
        Self {
            char_count: cleaned_text.chars().count(),
            word_count: cleaned_text.split_whitespace().count(),
            raw_text,
            cleaned_text,
        }
    }
}

#[async_trait]
pub trait TextExtractor: Send + Sync {
    async fn extract(&self, path: &Path) -> Result<ExtractedText, ExtractionError>;
}

/// Normalises extracted text: trims every line, collapses runs of spaces to one,
/// and collapses runs of blank lines to a single blank line.
pub fn clean_text(text: &str) -> String {
    let mut cleaned = String::with_capacity(text.len());
    let mut pending_blank = false;

    for line in text.lines() {
        let line = collapse_spaces(line.trim());
        if line.is_empty() {
            pending_blank = !cleaned.is_empty();
            continue;
        }
        if !cleaned.is_empty() {
            cleaned.push('\n');
            if pending_blank {
                cleaned.push('\n');
            }
        }
        cleaned.push_str(&line);
        pending_blank = false;
    }

    cleaned
}

fn collapse_spaces(line: &str) -> String {
    let mut out = String::with_capacity(line.len());
    let mut previous_space = false;
    for ch in line.chars() {
        if ch == ' ' {
            if !previous_space {
                out.push(ch);
            }
            previous_space = true;
        } else {
            out.push(ch);
            previous_space = false;
        }
    }
    out
}
