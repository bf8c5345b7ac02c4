//! Persistence of the skill graph.
//!
//! Nodes are documents and canonical skills; edges are requirements
//! (document → skill) and hierarchy links (skill → skill). Every write is
//! keyed on natural identifiers so replaying a load converges to the same state.

use async_trait::async_trait;
use serde::Serialize;

use crate::embedding::cosine_similarity;
use crate::errors::AppError;
use crate::models::{CanonicalSkill, Document, HierarchyEdge, RequirementEdge};

#[cfg(test)]
pub mod memory;
pub mod postgres;

#[cfg(test)]
pub use memory::MemoryTaxonomyStore;
pub use postgres::PgTaxonomyStore;

/// Rows per multi-row INSERT.
pub(crate) const WRITE_CHUNK: usize = 500;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DocumentMatch {
    pub document_id: String,
    pub title: String,
    /// Queried skills this document satisfies, directly or through a descendant.
    pub matched_skills: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SkillAssociation {
    pub canonical_name: String,
    pub document_count: i64,
    /// Fraction of the title-matched documents requiring this skill.
    pub share: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SkillNeighbour {
    pub canonical_name: String,
    pub similarity: f32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DescendantSkill {
    pub canonical_name: String,
    pub depth: i32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TaxonomyCounts {
    pub documents: i64,
    pub canonical_skills: i64,
    pub aliases: i64,
    pub requirement_edges: i64,
    pub hierarchy_edges: i64,
}

#[async_trait]
pub trait TaxonomyStore: Send + Sync {
    async fn upsert_documents(&self, documents: &[Document]) -> Result<(), AppError>;

    /// Merges skills on their normalized name. Aliases accumulate; an alias
    /// seen again under a different skill moves to it.
    ///
    /// A stored skill whose name is now an alias of a written skill is folded
    /// into that skill (requirement edges move, the node goes), and no stored
    /// alias may shadow a written canonical name.
    async fn upsert_skills(&self, skills: &[CanonicalSkill]) -> Result<(), AppError>;

    /// Replaces the requirement edges of `document_ids` with `edges`.
    async fn replace_requirements(
        &self,
        document_ids: &[String],
        edges: &[RequirementEdge],
    ) -> Result<(), AppError>;

    /// Replaces the whole hierarchy edge set.
    async fn replace_hierarchy(&self, edges: &[HierarchyEdge]) -> Result<(), AppError>;

    async fn load_skills(&self) -> Result<Vec<CanonicalSkill>, AppError>;

    /// Documents requiring any (or with `require_all`, every) of the given
    /// canonical skills, optionally counting a requirement on any descendant.
    async fn documents_requiring(
        &self,
        skills: &[String],
        include_descendants: bool,
        require_all: bool,
    ) -> Result<Vec<DocumentMatch>, AppError>;

    /// Skills most often required by documents whose title contains `query`.
    async fn skills_for_title(
        &self,
        query: &str,
        limit: usize,
    ) -> Result<Vec<SkillAssociation>, AppError>;

    async fn nearest_skills(&self, vector: &[f32], k: usize)
        -> Result<Vec<SkillNeighbour>, AppError>;

    /// All transitive children, nearest first.
    async fn descendants(&self, canonical_name: &str) -> Result<Vec<DescendantSkill>, AppError>;

    async fn counts(&self) -> Result<TaxonomyCounts, AppError>;
}

/// Top-k skills by cosine similarity, ties broken by name.
pub(crate) fn rank_neighbours<'a>(
    vector: &[f32],
    candidates: impl IntoIterator<Item = (&'a str, &'a [f32])>,
    k: usize,
) -> Vec<SkillNeighbour> {
    let mut scored: Vec<SkillNeighbour> = candidates
        .into_iter()
        .filter(|(_, embedding)| embedding.len() == vector.len() && !vector.is_empty())
        .map(|(name, embedding)| SkillNeighbour {
            canonical_name: name.to_string(),
            similarity: cosine_similarity(vector, embedding),
        })
        .collect();
    scored.sort_by(|a, b| {
        b.similarity
            .total_cmp(&a.similarity)
            .then_with(|| a.canonical_name.cmp(&b.canonical_name))
    });
    scored.truncate(k);
    scored
}
