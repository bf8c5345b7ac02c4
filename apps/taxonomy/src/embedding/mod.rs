//! Text embeddings for skill names.
//!
//! Embedding a string is a pure function of (model, text), so `embed_all`
//! fans requests out with bounded concurrency and reassembles results in
//! input order.

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use thiserror::Error;
use tracing::{debug, info};

pub mod hashing;
pub mod ollama;

pub use hashing::HashingEmbedder;
pub use ollama::OllamaEmbedder;

#[derive(Debug, Error)]
pub enum EmbeddingError {
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("embedding backend returned status {status}: {message}")]
    Upstream { status: u16, message: String },

    #[error("embedding backend returned no vector")]
    Empty,

    #[error("vector size mismatch: got {got}, want {want}")]
    VectorSizeMismatch { got: usize, want: usize },
}

/// Provider interface for embedding generation.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Dimensionality every returned vector must have.
    fn dimension(&self) -> usize;

    /// Identifier of the underlying model, recorded with run artifacts.
    fn model_name(&self) -> &str;

    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError>;
}

/// Embeds every text, at most `concurrency` requests in flight.
///
/// Results are L2-normalized and returned in input order.
///
/// # Errors
/// The first provider failure or dimension mismatch aborts the whole batch.
pub async fn embed_all(
    embedder: &dyn Embedder,
    texts: &[String],
    concurrency: usize,
) -> Result<Vec<Vec<f32>>, EmbeddingError> {
    if texts.is_empty() {
        return Ok(Vec::new());
    }
    info!(
        "Embedding {} texts with {} (concurrency={})",
        texts.len(),
        embedder.model_name(),
        concurrency
    );

    let want = embedder.dimension();
    let mut results: Vec<(usize, Vec<f32>)> = stream::iter(texts.iter().cloned().enumerate())
        .map(|(i, text)| async move {
            let v = embedder.embed(&text).await?;
            Ok::<(usize, Vec<f32>), EmbeddingError>((i, v))
        })
        .buffer_unordered(concurrency.max(1))
        .collect::<Vec<_>>()
        .await
        .into_iter()
        .collect::<Result<Vec<_>, EmbeddingError>>()?;

    results.sort_by_key(|(i, _)| *i);
    let mut out = Vec::with_capacity(results.len());
    for (_, mut v) in results {
        if v.len() != want {
            return Err(EmbeddingError::VectorSizeMismatch { got: v.len(), want });
        }
        l2_normalize(&mut v);
        out.push(v);
    }

    debug!("embed_all: {} vectors ready", out.len());
    Ok(out)
}

/// Scales `v` to unit length in place. Zero vectors are left as they are.
pub fn l2_normalize(v: &mut [f32]) {
    let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        v.iter_mut().for_each(|x| *x /= norm);
    }
}

pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }

    let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let magnitude_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let magnitude_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if magnitude_a == 0.0 || magnitude_b == 0.0 {
        return 0.0;
    }

    dot_product / (magnitude_a * magnitude_b)
}

/// Unit-length mean of the given vectors. Empty input yields an empty vector.
pub fn centroid<'a>(vectors: impl IntoIterator<Item = &'a [f32]>) -> Vec<f32> {
    let mut sum: Vec<f32> = Vec::new();
    for v in vectors {
        if sum.is_empty() {
            sum = vec![0.0; v.len()];
        }
        for (s, x) in sum.iter_mut().zip(v) {
            *s += x;
        }
    }
    l2_normalize(&mut sum);
    sum
}
