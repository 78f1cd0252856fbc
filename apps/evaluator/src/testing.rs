//! Shared fakes for unit tests.

use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use crate::config::{LlmConfig, PipelineConfig, RetrievalConfig};
use crate::evaluation::Evaluator;
use crate::extraction::{ExtractedText, ExtractionError, TextExtractor};
use crate::llm_client::{ChatCompletion, ChatRequest, ChatTransport, LlmClient, LlmError, ResponseFormat};
use crate::models::{Document, DocumentCategory, NewDocument, ReferenceCategory};
use crate::pipeline::{Orchestrator, PipelineDeps};
use crate::retrieval::ReferenceIndex;
use crate::store::{DocumentStore, MemoryDocumentStore, MemoryJobStore};

pub fn completion(content: &str) -> ChatCompletion {
    ChatCompletion {
        content: content.to_string(),
        model: "test-model".to_string(),
        prompt_tokens: 100,
        completion_tokens: 20,
        total_tokens: 120,
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RecordedRequest {
    pub system: String,
    pub user: String,
    pub temperature: f32,
    pub response_format: Option<ResponseFormat>,
}

type Responder = Box<dyn Fn(&ChatRequest<'_>) -> Result<ChatCompletion, LlmError> + Send + Sync>;

/// Chat transport that replays queued replies, then falls back to a responder.
pub struct ScriptedTransport {
    replies: Mutex<VecDeque<Result<ChatCompletion, LlmError>>>,
    delays: Mutex<VecDeque<Duration>>,
    responder: Option<Responder>,
    requests: Mutex<Vec<RecordedRequest>>,
    calls: AtomicUsize,
}

impl ScriptedTransport {
    pub fn new(replies: Vec<Result<ChatCompletion, LlmError>>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            delays: Mutex::new(VecDeque::new()),
            responder: None,
            requests: Mutex::new(Vec::new()),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn responding<F>(responder: F) -> Self
    where
        F: Fn(&ChatRequest<'_>) -> Result<ChatCompletion, LlmError> + Send + Sync + 'static,
    {
        Self {
            responder: Some(Box::new(responder)),
            ..Self::new(Vec::new())
        }
    }

    /// Per-call delays applied before replying, in call order.
    pub fn with_delays(self, delays: Vec<Duration>) -> Self {
        *self.delays.lock().unwrap() = delays.into();
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChatTransport for ScriptedTransport {
    async fn complete(&self, request: &ChatRequest<'_>) -> Result<ChatCompletion, LlmError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().unwrap().push(RecordedRequest {
            system: request.system().to_string(),
            user: request.user().to_string(),
            temperature: request.temperature,
            response_format: request.response_format,
        });

        let queued = self.replies.lock().unwrap().pop_front();
        let delay = self.delays.lock().unwrap().pop_front();
        if let Some(delay) = delay.filter(|d| !d.is_zero()) {
            tokio::time::sleep(delay).await;
        }

        match (queued, &self.responder) {
            (Some(reply), _) => reply,
            (None, Some(responder)) => responder(request),
            (None, None) => Err(LlmError::EmptyContent),
        }
    }
}

/// Canned, well-formed replies for every stage, keyed on the system prompt.
pub fn stage_reply(request: &ChatRequest<'_>) -> Result<ChatCompletion, LlmError> {
    let system = request.system();
    let content = if system.contains("CV parser") {
        r#"{"name": "Candidate", "technical_skills": ["Python", "AWS"],
            "experience": [{"company": "Acme", "role": "Lead", "duration": "5 years",
                            "responsibilities": ["led team of 4"]}]}"#
    } else if system.contains("technical recruiter") {
        r#"{"technical_skills_score": 4, "experience_level_score": 4,
            "achievements_score": 3, "cultural_fit_score": 3,
            "overall_feedback": "Strong Python and AWS background."}"#
    } else if system.contains("code reviewer") {
        r#"{"project_overview": "Evaluation pipeline", "technologies_used": ["Rust"]}"#
    } else if system.contains("technical evaluator") {
        r#"{"correctness_score": 4, "code_quality_score": 4, "resilience_score": 5,
            "documentation_score": 3, "creativity_score": 3,
            "overall_feedback": "Resilient design with good retries."}"#
    } else {
        "Strong candidate. Recommend moving to interview."
    };
    Ok(completion(content))
}

/// Extractor that serves fixed text per path, or an error for unknown paths.
#[derive(Default)]
pub struct FakeExtractor {
    texts: HashMap<PathBuf, String>,
    calls: AtomicUsize,
}

impl FakeExtractor {
    pub fn with(mut self, path: &str, text: &str) -> Self {
        self.texts.insert(PathBuf::from(path), text.to_string());
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TextExtractor for FakeExtractor {
    async fn extract(&self, path: &Path) -> Result<ExtractedText, ExtractionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.texts.get(path) {
            Some(text) => Ok(ExtractedText::from_raw(text.clone())),
            None => Err(ExtractionError::InvalidFormat {
                path: path.to_path_buf(),
                reason: "file is empty".to_string(),
            }),
        }
    }
}

pub async fn seed_document(
    documents: &MemoryDocumentStore,
    category: DocumentCategory,
    path: &str,
) -> Document {
    documents
        .create_document(NewDocument {
            filename: format!("{category}.pdf"),
            category,
            file_path: path.to_string(),
            file_size: 1024,
            mime_type: "application/pdf".to_string(),
        })
        .await
        .unwrap()
}

pub async fn seeded_index() -> ReferenceIndex {
    let index = ReferenceIndex::in_memory(&RetrievalConfig::default());
    for (id, category, title, content) in [
        (
            "jd",
            ReferenceCategory::JobDescription,
            "Backend Engineer",
            "Backend engineer with Python, AWS and PostgreSQL experience.",
        ),
        (
            "cv-rubric",
            ReferenceCategory::CvRubric,
            "CV Rubric",
            "Technical skills 40%, experience 25%, achievements 20%, cultural fit 15%.",
        ),
        (
            "brief",
            ReferenceCategory::CaseStudyBrief,
            "Case Study",
            "Build an evaluation pipeline with RAG, retries and error handling.",
        ),
        (
            "project-rubric",
            ReferenceCategory::ProjectRubric,
            "Project Rubric",
            "Correctness 30%, code quality 25%, resilience 20%, documentation 15%, creativity 10%.",
        ),
    ] {
        index
            .ingest(id, category, title, content, None)
            .await
            .unwrap();
    }
    index
}

/// Everything a pipeline test needs, wired with in-memory fakes.
pub struct Harness {
    pub jobs: MemoryJobStore,
    pub documents: MemoryDocumentStore,
    pub transport: Arc<ScriptedTransport>,
    pub extractor: Arc<FakeExtractor>,
    pub orchestrator: Arc<Orchestrator>,
}

impl Harness {
    pub async fn new(transport: ScriptedTransport, extractor: FakeExtractor) -> Self {
        Self::with_config(transport, extractor, PipelineConfig::default()).await
    }

    pub async fn with_config(
        transport: ScriptedTransport,
        extractor: FakeExtractor,
        config: PipelineConfig,
    ) -> Self {
        let jobs = MemoryJobStore::new();
        let documents = MemoryDocumentStore::with_jobs(jobs.clone());
        let transport = Arc::new(transport);
        let extractor = Arc::new(extractor);
        let llm = LlmClient::new(transport.clone(), &LlmConfig::default());

        let orchestrator = Arc::new(Orchestrator::new(
            PipelineDeps {
                jobs: Arc::new(jobs.clone()),
                documents: Arc::new(documents.clone()),
                extractor: extractor.clone(),
                index: seeded_index().await,
                evaluator: Evaluator::new(llm),
            },
            config,
            RetrievalConfig::default().top_k,
        ));

        Self {
            jobs,
            documents,
            transport,
            extractor,
            orchestrator,
        }
    }

    /// Creates two documents at the given paths and a queued job that uses them.
    pub async fn submit(&self, job_title: &str, cv_path: &str, project_path: &str) -> uuid::Uuid {
        use crate::store::JobStore;

        let cv = seed_document(&self.documents, DocumentCategory::Cv, cv_path).await;
        let project =
            seed_document(&self.documents, DocumentCategory::ProjectReport, project_path).await;
        self.jobs
            .create_job(job_title, cv.id, project.id)
            .await
            .unwrap()
            .id
    }
}
