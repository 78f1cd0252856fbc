use std::path::Path;

use anyhow::Context;
use axum::{
    extract::{Multipart, State},
    Json,
};
use bytes::Bytes;
use tracing::info;
use uuid::Uuid;

use super::{DocumentResponse, UploadResponse};
use crate::errors::AppError;
use crate::models::{DocumentCategory, NewDocument};
use crate::state::AppState;

const PDF_MIME: &str = "application/pdf";

struct UploadedFile {
    category: DocumentCategory,
    filename: String,
    mime_type: String,
    content: Bytes,
}

/// POST /api/v1/upload
///
/// Multipart fields `cv` and `project_report`; at least one must be present.
/// Both files are validated before either is written.
pub async fn handle_upload(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, AppError> {
    let mut files: Vec<UploadedFile> = Vec::new();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::Validation(format!("Malformed multipart body: {e}")))?
    {
        let category = match field.name() {
            Some("cv") => DocumentCategory::Cv,
            Some("project_report") => DocumentCategory::ProjectReport,
            _ => continue,
        };
        let label = label(category);

        let filename = field
            .file_name()
            .and_then(|name| Path::new(name).file_name())
            .and_then(|name| name.to_str())
            .map(str::to_string)
            .ok_or_else(|| AppError::Validation(format!("{label} is missing a filename")))?;
        if !filename.to_ascii_lowercase().ends_with(".pdf") {
            return Err(AppError::Validation(format!("{label} must be a PDF file")));
        }
        let mime_type = field.content_type().unwrap_or(PDF_MIME).to_string();

        let content = field
            .bytes()
            .await
            .map_err(|e| AppError::Validation(format!("Failed to read {label}: {e}")))?;
        if content.len() > state.uploads.max_file_size {
            return Err(AppError::PayloadTooLarge(format!(
                "{label} file size exceeds maximum allowed size of {} bytes",
                state.uploads.max_file_size
            )));
        }
        if content.is_empty() {
            return Err(AppError::Validation(format!("{label} file is empty")));
        }

        files.retain(|f| f.category != category);
        files.push(UploadedFile {
            category,
            filename,
            mime_type,
            content,
        });
    }

    if files.is_empty() {
        return Err(AppError::Validation(
            "At least one file (CV or Project Report) must be provided".to_string(),
        ));
    }

    tokio::fs::create_dir_all(&state.uploads.dir)
        .await
        .with_context(|| format!("creating {}", state.uploads.dir.display()))?;

    let mut response = UploadResponse {
        cv_document: None,
        project_document: None,
        message: "Documents uploaded successfully".to_string(),
    };

    for file in files {
        let path = state
            .uploads
            .dir
            .join(format!("{}_{}", Uuid::new_v4(), file.filename));
        tokio::fs::write(&path, &file.content)
            .await
            .with_context(|| format!("writing {}", path.display()))?;

        let document = state
            .documents
            .create_document(NewDocument {
                filename: file.filename,
                category: file.category,
                file_path: path.to_string_lossy().into_owned(),
                file_size: file.content.len() as i64,
                mime_type: file.mime_type,
            })
            .await?;
        info!(
            "Stored {} upload {} ({} bytes)",
            document.category, document.id, document.file_size
        );

        match document.category {
            DocumentCategory::Cv => response.cv_document = Some(DocumentResponse::from(document)),
            DocumentCategory::ProjectReport => {
                response.project_document = Some(DocumentResponse::from(document))
            }
        }
    }

    Ok(Json(response))
}

fn label(category: DocumentCategory) -> &'static str {
    match category {
        DocumentCategory::Cv => "CV",
        DocumentCategory::ProjectReport => "Project Report",
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::body::{to_bytes, Body};
    use axum::http::{header, Request, StatusCode};
    use tower::ServiceExt;

    use super::*;
    use crate::queue::MemoryTaskQueue;
    use crate::routes::build_router;
    use crate::state::UploadSettings;
    use crate::store::{DocumentStore, MemoryDocumentStore, MemoryJobStore};

    const BOUNDARY: &str = "XBOUNDARYX";

    fn state(dir: &Path, documents: &MemoryDocumentStore) -> AppState {
        AppState {
            jobs: Arc::new(MemoryJobStore::new()),
            documents: Arc::new(documents.clone()),
            queue: Arc::new(MemoryTaskQueue::new()),
            uploads: UploadSettings {
                dir: dir.to_path_buf(),
                max_file_size: 64,
            },
        }
    }

    fn multipart(parts: &[(&str, &str, &str)]) -> Request<Body> {
        let mut body = String::new();
        for (field, filename, content) in parts {
            body.push_str(&format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{field}\"; \
                 filename=\"{filename}\"\r\nContent-Type: application/pdf\r\n\r\n{content}\r\n"
            ));
        }
        body.push_str(&format!("--{BOUNDARY}--\r\n"));

        Request::builder()
            .method("POST")
            .uri("/api/v1/upload")
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(body))
            .unwrap()
    }

    async fn send(state: AppState, request: Request<Body>) -> (StatusCode, serde_json::Value) {
        let response = build_router(state).oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_upload_stores_both_documents() {
        let dir = tempfile::tempdir().unwrap();
        let documents = MemoryDocumentStore::new();
        let (status, body) = send(
            state(dir.path(), &documents),
            multipart(&[
                ("cv", "cv.pdf", "%PDF-1.4 cv"),
                ("project_report", "report.PDF", "%PDF-1.4 report"),
            ]),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["cv_document"]["file_type"], "cv");
        assert_eq!(body["project_document"]["file_type"], "project_report");

        let id: Uuid = body["cv_document"]["id"].as_str().unwrap().parse().unwrap();
        let stored = documents.get_document(id).await.unwrap().unwrap();
        assert!(stored.file_path.ends_with("_cv.pdf"));
        assert_eq!(std::fs::read(stored.path()).unwrap(), b"%PDF-1.4 cv");
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 2);
    }

    #[tokio::test]
    async fn test_single_file_upload_is_allowed() {
        let dir = tempfile::tempdir().unwrap();
        let documents = MemoryDocumentStore::new();
        let (status, body) = send(
            state(dir.path(), &documents),
            multipart(&[("project_report", "report.pdf", "%PDF-1.4")]),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert!(body.get("cv_document").is_none());
        assert!(body["project_document"]["id"].is_string());
    }

    #[tokio::test]
    async fn test_rejects_non_pdf_and_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let documents = MemoryDocumentStore::new();
        let (status, body) = send(
            state(dir.path(), &documents),
            multipart(&[
                ("cv", "cv.pdf", "%PDF-1.4"),
                ("project_report", "report.docx", "not a pdf"),
            ]),
        )
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["message"], "Project Report must be a PDF file");
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_rejects_oversized_file() {
        let dir = tempfile::tempdir().unwrap();
        let documents = MemoryDocumentStore::new();
        let big = "x".repeat(65);
        let (status, body) = send(
            state(dir.path(), &documents),
            multipart(&[("cv", "cv.pdf", &big)]),
        )
        .await;

        assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(body["error"]["code"], "PAYLOAD_TOO_LARGE");
    }

    #[tokio::test]
    async fn test_requires_at_least_one_file() {
        let dir = tempfile::tempdir().unwrap();
        let documents = MemoryDocumentStore::new();
        let (status, _) = send(state(dir.path(), &documents), multipart(&[])).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }
}
