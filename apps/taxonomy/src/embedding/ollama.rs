use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::{Embedder, EmbeddingError};

#[derive(Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    input: &'a str,
}

/// Older servers answer with `embedding`, newer ones with `embeddings`.
#[derive(Deserialize)]
struct EmbedResponse {
    embedding: Option<Vec<f32>>,
    embeddings: Option<Vec<Vec<f32>>>,
}

/// Embeddings from an Ollama server via `POST {base}/api/embed`.
pub struct OllamaEmbedder {
    client: Client,
    base: String,
    model: String,
    dim: usize,
}

impl OllamaEmbedder {
    pub fn new(
        base: impl Into<String>,
        model: impl Into<String>,
        dim: usize,
        timeout: Duration,
    ) -> Result<Self, EmbeddingError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base: base.into().trim_end_matches('/').to_string(),
            model: model.into(),
            dim,
        })
    }
}

#[async_trait]
impl Embedder for OllamaEmbedder {
    fn dimension(&self) -> usize {
        self.dim
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let url = format!("{}/api/embed", self.base);
        let response = self
            .client
            .post(&url)
            .json(&EmbedRequest {
                model: &self.model,
                input: text,
            })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(EmbeddingError::Upstream {
                status: status.as_u16(),
                message,
            });
        }

        let body: EmbedResponse = response.json().await?;
        let vector = match (body.embedding, body.embeddings) {
            (Some(v), _) => v,
            (None, Some(vs)) => vs.into_iter().next().ok_or(EmbeddingError::Empty)?,
            (None, None) => return Err(EmbeddingError::Empty),
        };
        if vector.len() != self.dim {
            return Err(EmbeddingError::VectorSizeMismatch {
                got: vector.len(),
                want: self.dim,
            });
        }
        Ok(vector)
    }
}
