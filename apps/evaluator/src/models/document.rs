use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Declared category of an uploaded candidate document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentCategory {
    Cv,
    ProjectReport,
}

impl DocumentCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentCategory::Cv => "cv",
            DocumentCategory::ProjectReport => "project_report",
        }
    }
}

impl fmt::Display for DocumentCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DocumentCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "cv" => Ok(DocumentCategory::Cv),
            "project_report" => Ok(DocumentCategory::ProjectReport),
            other => Err(format!("unknown document category '{other}'")),
        }
    }
}

/// An uploaded file. Immutable after creation; the pipeline only reads it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub id: Uuid,
    pub filename: String,
    pub category: DocumentCategory,
    pub file_path: String,
    pub file_size: i64,
    pub mime_type: String,
    pub uploaded_at: DateTime<Utc>,
}

impl Document {
    pub fn path(&self) -> PathBuf {
        PathBuf::from(&self.file_path)
    }
}

/// Parameters for registering a stored upload.
#[derive(Debug, Clone)]
pub struct NewDocument {
    pub filename: String,
    pub category: DocumentCategory,
    pub file_path: String,
    pub file_size: i64,
    pub mime_type: String,
}

impl NewDocument {
    pub fn into_document(self) -> Document {
        Document {
            id: Uuid::new_v4(),
            filename: self.filename,
            category: self.category,
            file_path: self.file_path,
            file_size: self.file_size,
            mime_type: self.mime_type,
            uploaded_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct DocumentRow {
    pub id: Uuid,
    pub filename: String,
    pub file_type: String,
    pub file_path: String,
    pub file_size: i64,
    pub mime_type: String,
    pub uploaded_at: DateTime<Utc>,
}

impl TryFrom<DocumentRow> for Document {
    type Error = String;

    fn try_from(row: DocumentRow) -> Result<Self, Self::Error> {
        Ok(Document {
            id: row.id,
            filename: row.filename,
            category: row.file_type.parse()?,
            file_path: row.file_path,
            file_size: row.file_size,
            mime_type: row.mime_type,
            uploaded_at: row.uploaded_at,
        })
    }
}
