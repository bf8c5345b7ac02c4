//! Immutable taxonomy view served to resolution queries.
//!
//! A pipeline run builds a fresh snapshot from persisted state and swaps it in
//! whole; readers holding the previous `Arc` finish against the old one.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use crate::embedding::cosine_similarity;
use crate::models::CanonicalSkill;
use crate::taxonomy::index::NameIndex;

#[derive(Debug, Clone)]
pub struct TaxonomySnapshot {
    skills: Vec<CanonicalSkill>,
    index: NameIndex,
    pub loaded_at: DateTime<Utc>,
}

impl TaxonomySnapshot {
    pub fn new(skills: Vec<CanonicalSkill>) -> Self {
        let index = NameIndex::build(&skills);
        Self {
            skills,
            index,
            loaded_at: Utc::now(),
        }
    }

    pub fn empty() -> Self {
        Self::new(Vec::new())
    }

    pub fn skills(&self) -> &[CanonicalSkill] {
        &self.skills
    }

    pub fn index(&self) -> &NameIndex {
        &self.index
    }

    pub fn is_empty(&self) -> bool {
        self.skills.is_empty()
    }

    /// Best-scoring skill by cosine similarity. Skills without an embedding
    /// are never candidates.
    pub fn nearest(&self, vector: &[f32]) -> Option<(&CanonicalSkill, f32)> {
        self.skills
            .iter()
            .filter(|s| s.embedding.len() == vector.len() && !vector.is_empty())
            .map(|s| (s, cosine_similarity(vector, &s.embedding)))
            .fold(None, |best, (skill, score)| match best {
                Some((_, best_score)) if best_score >= score => best,
                _ => Some((skill, score)),
            })
    }
}

/// Shared pointer to the current snapshot.
#[derive(Clone)]
pub struct SnapshotHandle {
    inner: Arc<RwLock<Arc<TaxonomySnapshot>>>,
}

impl SnapshotHandle {
    pub fn new(snapshot: TaxonomySnapshot) -> Self {
        Self {
            inner: Arc::new(RwLock::new(Arc::new(snapshot))),
        }
    }

    pub async fn current(&self) -> Arc<TaxonomySnapshot> {
        self.inner.read().await.clone()
    }

    pub async fn swap(&self, snapshot: TaxonomySnapshot) {
        *self.inner.write().await = Arc::new(snapshot);
    }
}
