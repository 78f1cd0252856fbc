use std::path::PathBuf;
use std::sync::Arc;

use crate::queue::TaskQueue;
use crate::store::{DocumentStore, JobStore};

/// Shared application state injected into all route handlers via Axum extractors.
#[derive(Clone)]
pub struct AppState {
    pub jobs: Arc<dyn JobStore>,
    pub documents: Arc<dyn DocumentStore>,
    pub queue: Arc<dyn TaskQueue>,
    pub uploads: UploadSettings,
}

#[derive(Debug, Clone)]
pub struct UploadSettings {
    pub dir: PathBuf,
    pub max_file_size: usize,
}
