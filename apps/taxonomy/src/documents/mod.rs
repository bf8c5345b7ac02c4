//! Where raw postings come from.
//!
//! Sources only read; they never write back. An unreachable or unreadable
//! source aborts the run, since nothing downstream is meaningful without it.

use std::path::PathBuf;

use async_trait::async_trait;
use sqlx::PgPool;
use tracing::info;

use crate::errors::AppError;
use crate::models::Document;

#[async_trait]
pub trait DocumentSource: Send + Sync {
    fn describe(&self) -> String;
    async fn load(&self) -> Result<Vec<Document>, AppError>;
}

/// Reads the `job_postings` table populated by the ingestion side.
pub struct PgDocumentSource {
    pool: PgPool,
}

impl PgDocumentSource {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl DocumentSource for PgDocumentSource {
    fn describe(&self) -> String {
        "postgres:job_postings".to_string()
    }

    async fn load(&self) -> Result<Vec<Document>, AppError> {
        let documents = sqlx::query_as::<_, Document>(
            "SELECT id, title, description AS raw_text FROM job_postings ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::Source(format!("cannot read job_postings: {e}")))?;

        info!("Loaded {} documents from job_postings", documents.len());
        Ok(documents)
    }
}

/// Reads a JSON array of `{id, title, text}` objects.
pub struct JsonFileDocumentSource {
    path: PathBuf,
}

impl JsonFileDocumentSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl DocumentSource for JsonFileDocumentSource {
    fn describe(&self) -> String {
        format!("file:{}", self.path.display())
    }

    async fn load(&self) -> Result<Vec<Document>, AppError> {
        let raw = tokio::fs::read_to_string(&self.path).await.map_err(|e| {
            AppError::Source(format!("cannot read {}: {e}", self.path.display()))
        })?;
        let documents: Vec<Document> = serde_json::from_str(&raw).map_err(|e| {
            AppError::Source(format!("invalid document file {}: {e}", self.path.display()))
        })?;

        info!("Loaded {} documents from {}", documents.len(), self.path.display());
        Ok(documents)
    }
}

/// In-memory source for tests.
#[cfg(test)]
pub(crate) struct StaticDocumentSource(pub Vec<Document>);

#[cfg(test)]
#[async_trait]
impl DocumentSource for StaticDocumentSource {
    fn describe(&self) -> String {
        "static".to_string()
    }

    async fn load(&self) -> Result<Vec<Document>, AppError> {
        Ok(self.0.clone())
    }
}
