use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{bail, ensure, Context, Result};

use crate::extraction::ExtractionSettings;
use crate::taxonomy::canonicalize::CanonicalizeSettings;
use crate::taxonomy::dbscan::DbscanParams;

const BACKOFF_CAP: Duration = Duration::from_secs(30);

/// S3 / MinIO target for run artifacts. Present only when every variable is set.
#[derive(Debug, Clone)]
pub struct S3Config {
    pub bucket: String,
    pub endpoint: String,
    pub access_key_id: String,
    pub secret_access_key: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DocumentSourceConfig {
    Postgres,
    File(PathBuf),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmbeddingProvider {
    Hashing,
    Ollama,
}

#[derive(Debug, Clone)]
pub struct EmbeddingConfig {
    pub provider: EmbeddingProvider,
    pub ollama_url: String,
    pub model: String,
    pub dim: usize,
    pub concurrency: usize,
}

/// Application configuration loaded from environment variables.
/// Startup fails if a required variable is missing or any value is invalid.
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub anthropic_api_key: String,
    pub port: u16,
    pub rust_log: String,
    pub redis_url: Option<String>,
    pub s3: Option<S3Config>,
    pub document_source: DocumentSourceConfig,
    pub checkpoint_dir: PathBuf,
    pub extraction_concurrency: usize,
    pub extraction_batch_size: usize,
    pub extraction_max_attempts: u32,
    pub extraction_backoff_ms: u64,
    pub llm_timeout_secs: u64,
    pub min_mention_confidence: f32,
    pub cluster_eps: f32,
    pub cluster_min_samples: usize,
    pub semantic_match_threshold: f32,
    pub embedding: EmbeddingConfig,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let require = |key: &str| {
            var(key).with_context(|| format!("Required environment variable '{key}' is not set"))
        };

        let s3 = match (
            var("S3_BUCKET"),
            var("S3_ENDPOINT"),
            var("AWS_ACCESS_KEY_ID"),
            var("AWS_SECRET_ACCESS_KEY"),
        ) {
            (Some(bucket), Some(endpoint), Some(access_key_id), Some(secret_access_key)) => {
                Some(S3Config {
                    bucket,
                    endpoint,
                    access_key_id,
                    secret_access_key,
                })
            }
            _ => None,
        };

        let document_source = match var("DOCUMENT_SOURCE").as_deref() {
            None | Some("postgres") => DocumentSourceConfig::Postgres,
            Some(other) => match other.strip_prefix("file:") {
                Some(path) if !path.is_empty() => DocumentSourceConfig::File(PathBuf::from(path)),
                _ => bail!("DOCUMENT_SOURCE must be 'postgres' or 'file:<path>', got '{other}'"),
            },
        };

        let provider = match var("EMBEDDING_PROVIDER").as_deref() {
            None | Some("hashing") => EmbeddingProvider::Hashing,
            Some("ollama") => EmbeddingProvider::Ollama,
            Some(other) => bail!("EMBEDDING_PROVIDER must be 'hashing' or 'ollama', got '{other}'"),
        };
        let default_dim = match provider {
            EmbeddingProvider::Hashing => 256,
            EmbeddingProvider::Ollama => 768,
        };

        let config = Config {
            database_url: require("DATABASE_URL")?,
            anthropic_api_key: require("ANTHROPIC_API_KEY")?,
            port: parse_or(&var, "PORT", 8080)?,
            rust_log: var("RUST_LOG").unwrap_or_else(|| "info".to_string()),
            redis_url: var("REDIS_URL"),
            s3,
            document_source,
            checkpoint_dir: var("CHECKPOINT_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(".taxonomy-checkpoint")),
            extraction_concurrency: parse_or(&var, "EXTRACTION_CONCURRENCY", 8)?,
            extraction_batch_size: parse_or(&var, "EXTRACTION_BATCH_SIZE", 32)?,
            extraction_max_attempts: parse_or(&var, "EXTRACTION_MAX_ATTEMPTS", 4)?,
            extraction_backoff_ms: parse_or(&var, "EXTRACTION_BACKOFF_MS", 1000)?,
            llm_timeout_secs: parse_or(&var, "LLM_TIMEOUT_SECS", 60)?,
            min_mention_confidence: parse_or(&var, "MIN_MENTION_CONFIDENCE", 0.3)?,
            cluster_eps: parse_or(&var, "CLUSTER_EPS", 0.15)?,
            cluster_min_samples: parse_or(&var, "CLUSTER_MIN_SAMPLES", 2)?,
            semantic_match_threshold: parse_or(&var, "SEMANTIC_MATCH_THRESHOLD", 0.85)?,
            embedding: EmbeddingConfig {
                provider,
                ollama_url: var("OLLAMA_URL")
                    .unwrap_or_else(|| "http://localhost:11434".to_string()),
                model: var("EMBEDDING_MODEL").unwrap_or_else(|| "nomic-embed-text".to_string()),
                dim: parse_or(&var, "EMBEDDING_DIM", default_dim)?,
                concurrency: parse_or(&var, "EMBEDDING_CONCURRENCY", 4)?,
            },
        };
        config.validate()?;
        Ok(config)
    }

    #[cfg(test)]
    pub(crate) fn for_tests() -> Self {
        Self::from_lookup(|key| match key {
            "DATABASE_URL" => Some("postgres://localhost/unused".to_string()),
            "ANTHROPIC_API_KEY" => Some("sk-test".to_string()),
            _ => None,
        })
        .expect("test config")
    }

    fn validate(&self) -> Result<()> {
        ensure!(self.extraction_concurrency > 0, "EXTRACTION_CONCURRENCY must be at least 1");
        ensure!(self.extraction_batch_size > 0, "EXTRACTION_BATCH_SIZE must be at least 1");
        ensure!(self.extraction_max_attempts > 0, "EXTRACTION_MAX_ATTEMPTS must be at least 1");
        ensure!(self.llm_timeout_secs > 0, "LLM_TIMEOUT_SECS must be at least 1");
        ensure!(
            (0.0..=1.0).contains(&self.min_mention_confidence),
            "MIN_MENTION_CONFIDENCE must be within [0, 1]"
        );
        ensure!(
            self.cluster_eps > 0.0 && self.cluster_eps <= 2.0,
            "CLUSTER_EPS must be within (0, 2]"
        );
        ensure!(self.cluster_min_samples > 0, "CLUSTER_MIN_SAMPLES must be at least 1");
        ensure!(
            self.semantic_match_threshold > 0.0 && self.semantic_match_threshold <= 1.0,
            "SEMANTIC_MATCH_THRESHOLD must be within (0, 1]"
        );
        ensure!(self.embedding.dim > 0, "EMBEDDING_DIM must be at least 1");
        ensure!(self.embedding.concurrency > 0, "EMBEDDING_CONCURRENCY must be at least 1");
        Ok(())
    }

    pub fn llm_timeout(&self) -> Duration {
        Duration::from_secs(self.llm_timeout_secs)
    }

    pub fn extraction_settings(&self) -> ExtractionSettings {
        ExtractionSettings {
            concurrency_limit: self.extraction_concurrency,
            batch_size: self.extraction_batch_size,
            max_attempts: self.extraction_max_attempts,
            backoff_base: Duration::from_millis(self.extraction_backoff_ms),
            backoff_cap: BACKOFF_CAP,
            call_timeout: self.llm_timeout(),
        }
    }

    pub fn canonicalize_settings(&self) -> CanonicalizeSettings {
        CanonicalizeSettings {
            dbscan: DbscanParams {
                eps: self.cluster_eps,
                min_samples: self.cluster_min_samples,
            },
            embed_concurrency: self.embedding.concurrency,
        }
    }
}

fn parse_or<T>(var: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match var(key) {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .with_context(|| format!("{key} has invalid value '{raw}'")),
    }
}
