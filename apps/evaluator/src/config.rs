use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};

/// Application configuration loaded from environment variables.
/// Startup fails if required variables are missing or malformed.
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub redis_url: String,
    pub port: u16,
    pub rust_log: String,
    pub upload_dir: PathBuf,
    pub max_file_size: usize,
    pub llm: LlmConfig,
    pub retrieval: RetrievalConfig,
    pub pipeline: PipelineConfig,
    pub worker: WorkerConfig,
}

/// Chat-completion endpoint and retry bounds for model calls.
#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub api_base: String,
    pub api_key: String,
    pub provider: String,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub timeout: Duration,
    pub max_attempts: u32,
    pub retry_min: Duration,
    pub retry_max: Duration,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_base: "https://api.groq.com/openai/v1".to_string(),
            api_key: String::new(),
            provider: "groq".to_string(),
            model: "llama-3.1-70b-versatile".to_string(),
            temperature: 0.3,
            max_tokens: 4000,
            timeout: Duration::from_secs(60),
            max_attempts: 3,
            retry_min: Duration::from_millis(2000),
            retry_max: Duration::from_millis(10_000),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmbeddingBackend {
    /// OpenAI-compatible `/embeddings` endpoint.
    Http,
    /// Local feature hashing. Deterministic, no network.
    Hash,
}

impl FromStr for EmbeddingBackend {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "http" => Ok(EmbeddingBackend::Http),
            "hash" => Ok(EmbeddingBackend::Hash),
            other => Err(format!("unknown embedding provider '{other}'")),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RetrievalConfig {
    pub embedding_backend: EmbeddingBackend,
    pub embedding_api_base: String,
    pub embedding_api_key: String,
    pub embedding_model: String,
    pub embedding_dim: usize,
    /// Window size in tokens.
    pub chunk_size: usize,
    /// Tokens shared between neighbouring windows. Must be below `chunk_size`.
    pub chunk_overlap: usize,
    pub top_k: usize,
    pub tokenizer_path: Option<PathBuf>,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            embedding_backend: EmbeddingBackend::Http,
            embedding_api_base: LlmConfig::default().api_base,
            embedding_api_key: String::new(),
            embedding_model: "all-MiniLM-L6-v2".to_string(),
            embedding_dim: 384,
            chunk_size: 500,
            chunk_overlap: 50,
            top_k: 5,
            tokenizer_path: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub max_retries: u32,
    pub retry_base: Duration,
    pub soft_time_limit: Duration,
    pub hard_time_limit: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            retry_base: Duration::from_secs(60),
            soft_time_limit: Duration::from_secs(1500),
            hard_time_limit: Duration::from_secs(1800),
        }
    }
}

impl PipelineConfig {
    /// The soft limit has to fire before the hard one.
    pub fn validate(&self) -> Result<()> {
        if self.soft_time_limit >= self.hard_time_limit {
            anyhow::bail!(
                "SOFT_TIME_LIMIT_SECS ({}) must be smaller than HARD_TIME_LIMIT_SECS ({})",
                self.soft_time_limit.as_secs(),
                self.hard_time_limit.as_secs()
            );
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub concurrency: usize,
    pub poll_interval: Duration,
    pub retention_days: i64,
    pub cleanup_interval: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            concurrency: 4,
            poll_interval: Duration::from_millis(500),
            retention_days: 30,
            cleanup_interval: Duration::from_secs(86_400),
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing

        let llm_defaults = LlmConfig::default();
        let llm = LlmConfig {
            api_base: env_or("LLM_API_BASE", llm_defaults.api_base),
            api_key: require_env("LLM_API_KEY")?,
            provider: env_or("LLM_PROVIDER", llm_defaults.provider),
            model: env_or("LLM_MODEL", llm_defaults.model),
            temperature: parse_env("LLM_TEMPERATURE", llm_defaults.temperature)?,
            max_tokens: parse_env("MAX_TOKENS", llm_defaults.max_tokens)?,
            timeout: Duration::from_secs(parse_env("LLM_TIMEOUT_SECS", 60)?),
            max_attempts: parse_env("LLM_MAX_ATTEMPTS", llm_defaults.max_attempts)?,
            retry_min: Duration::from_millis(parse_env("LLM_RETRY_MIN_MS", 2000)?),
            retry_max: Duration::from_millis(parse_env("LLM_RETRY_MAX_MS", 10_000)?),
        };

        let retrieval_defaults = RetrievalConfig::default();
        let embedding_backend = std::env::var("EMBEDDING_PROVIDER")
            .unwrap_or_else(|_| "http".to_string())
            .parse::<EmbeddingBackend>()
            .map_err(anyhow::Error::msg)
            .context("EMBEDDING_PROVIDER must be 'http' or 'hash'")?;
        let retrieval = RetrievalConfig {
            embedding_backend,
            embedding_api_base: env_or("EMBEDDING_API_BASE", llm.api_base.clone()),
            embedding_api_key: env_or("EMBEDDING_API_KEY", llm.api_key.clone()),
            embedding_model: env_or("EMBEDDING_MODEL", retrieval_defaults.embedding_model),
            embedding_dim: parse_env("EMBEDDING_DIM", retrieval_defaults.embedding_dim)?,
            chunk_size: parse_env("CHUNK_SIZE", retrieval_defaults.chunk_size)?,
            chunk_overlap: parse_env("CHUNK_OVERLAP", retrieval_defaults.chunk_overlap)?,
            top_k: parse_env("TOP_K_CHUNKS", retrieval_defaults.top_k)?,
            tokenizer_path: std::env::var("TOKENIZER_PATH").ok().map(PathBuf::from),
        };
        if retrieval.chunk_overlap >= retrieval.chunk_size {
            anyhow::bail!(
                "CHUNK_OVERLAP ({}) must be smaller than CHUNK_SIZE ({})",
                retrieval.chunk_overlap,
                retrieval.chunk_size
            );
        }

        let pipeline = PipelineConfig {
            max_retries: parse_env("PIPELINE_MAX_RETRIES", 3)?,
            retry_base: Duration::from_secs(parse_env("PIPELINE_RETRY_BASE_SECS", 60)?),
            soft_time_limit: Duration::from_secs(parse_env("SOFT_TIME_LIMIT_SECS", 1500)?),
            hard_time_limit: Duration::from_secs(parse_env("HARD_TIME_LIMIT_SECS", 1800)?),
        };
        pipeline.validate()?;

        let worker_defaults = WorkerConfig::default();
        let worker = WorkerConfig {
            concurrency: parse_env("WORKER_CONCURRENCY", worker_defaults.concurrency)?,
            poll_interval: Duration::from_millis(parse_env("WORKER_POLL_MS", 500)?),
            retention_days: parse_env("RETENTION_DAYS", worker_defaults.retention_days)?,
            cleanup_interval: Duration::from_secs(parse_env("CLEANUP_INTERVAL_SECS", 86_400)?),
        };

        Ok(Config {
            database_url: require_env("DATABASE_URL")?,
            redis_url: require_env("REDIS_URL")?,
            port: parse_env("PORT", 8080)?,
            rust_log: env_or("RUST_LOG", "info".to_string()),
            upload_dir: PathBuf::from(env_or("UPLOAD_DIR", "./uploads".to_string())),
            max_file_size: parse_env("MAX_FILE_SIZE", 10 * 1024 * 1024)?,
            llm,
            retrieval,
            pipeline,
            worker,
        })
    }
}

fn require_env(key: &str) -> Result<String> {
    std::env::var(key).with_context(|| format!("Required environment variable '{key}' is not set"))
}

fn env_or(key: &str, default: String) -> String {
    std::env::var(key).unwrap_or(default)
}

fn parse_env<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .with_context(|| format!("{key} has an invalid value '{raw}'")),
        Err(_) => Ok(default),
    }
}
