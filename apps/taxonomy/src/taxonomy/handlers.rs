use std::collections::{BTreeMap, BTreeSet};

use axum::{
    extract::{Path, Query, State},
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::AppError;
use crate::graph::{DescendantSkill, DocumentMatch, SkillAssociation, SkillNeighbour, TaxonomyCounts};
use crate::state::AppState;
use crate::taxonomy::normalize::normalize_skill_name;
use crate::taxonomy::resolution::ResolutionReport;

const MAX_RESOLVE_INPUTS: usize = 1000;
const MAX_LIMIT: usize = 100;

#[derive(Deserialize)]
pub struct ResolveRequest {
    pub skills: Vec<String>,
}

#[derive(Deserialize)]
pub struct DocumentSearchRequest {
    pub skills: Vec<String>,
    #[serde(default = "default_true")]
    pub include_descendants: bool,
    #[serde(default)]
    pub require_all: bool,
}

fn default_true() -> bool {
    true
}

#[derive(Serialize)]
pub struct DocumentSearchResponse {
    /// Input string → canonical skill it was searched as.
    pub resolved: BTreeMap<String, String>,
    pub unresolved: Vec<String>,
    pub documents: Vec<DocumentMatch>,
}

#[derive(Deserialize)]
pub struct AssociatedQuery {
    pub q: String,
    pub limit: Option<usize>,
}

#[derive(Deserialize)]
pub struct SimilarQuery {
    pub q: String,
    pub k: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct DescendantsResponse {
    pub skill: String,
    pub descendants: Vec<DescendantSkill>,
}

#[derive(Serialize)]
pub struct StatsResponse {
    #[serde(flatten)]
    pub counts: TaxonomyCounts,
    pub snapshot_skills: usize,
    pub snapshot_loaded_at: DateTime<Utc>,
}

fn require_query(q: &str) -> Result<&str, AppError> {
    let q = q.trim();
    if q.is_empty() {
        return Err(AppError::Validation("query parameter 'q' must not be empty".to_string()));
    }
    Ok(q)
}

/// POST /api/v1/skills/resolve
pub async fn handle_resolve(
    State(state): State<AppState>,
    Json(req): Json<ResolveRequest>,
) -> Result<Json<ResolutionReport>, AppError> {
    if req.skills.len() > MAX_RESOLVE_INPUTS {
        return Err(AppError::Validation(format!(
            "at most {MAX_RESOLVE_INPUTS} skills per request"
        )));
    }
    let snapshot = state.snapshot.current().await;
    Ok(Json(state.resolver.resolve(&snapshot, &req.skills).await))
}

/// POST /api/v1/documents/search
pub async fn handle_document_search(
    State(state): State<AppState>,
    Json(req): Json<DocumentSearchRequest>,
) -> Result<Json<DocumentSearchResponse>, AppError> {
    if req.skills.is_empty() {
        return Err(AppError::Validation("'skills' must not be empty".to_string()));
    }

    let snapshot = state.snapshot.current().await;
    let mut resolved = BTreeMap::new();
    let mut unresolved = Vec::new();
    for raw in &req.skills {
        match snapshot.index().resolve(raw) {
            Some(canonical) => {
                resolved.insert(raw.clone(), canonical.to_string());
            }
            None => unresolved.push(raw.clone()),
        }
    }

    // An unknown skill can never be satisfied, so require_all has no answer.
    let documents = if resolved.is_empty() || (req.require_all && !unresolved.is_empty()) {
        Vec::new()
    } else {
        let canonical: Vec<String> = resolved
            .values()
            .cloned()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        state
            .store
            .documents_requiring(&canonical, req.include_descendants, req.require_all)
            .await?
    };

    Ok(Json(DocumentSearchResponse {
        resolved,
        unresolved,
        documents,
    }))
}

/// GET /api/v1/skills/associated?q=&limit=
pub async fn handle_associated_skills(
    State(state): State<AppState>,
    Query(params): Query<AssociatedQuery>,
) -> Result<Json<Vec<SkillAssociation>>, AppError> {
    let q = require_query(&params.q)?;
    let limit = params.limit.unwrap_or(20).clamp(1, MAX_LIMIT);
    Ok(Json(state.store.skills_for_title(q, limit).await?))
}

/// GET /api/v1/skills/similar?q=&k=
pub async fn handle_similar_skills(
    State(state): State<AppState>,
    Query(params): Query<SimilarQuery>,
) -> Result<Json<Vec<SkillNeighbour>>, AppError> {
    let q = require_query(&params.q)?;
    let k = params.k.unwrap_or(10).clamp(1, MAX_LIMIT);
    let mut vector = state.embedder.embed(&normalize_skill_name(q)).await?;
    crate::embedding::l2_normalize(&mut vector);
    Ok(Json(state.store.nearest_skills(&vector, k).await?))
}

/// GET /api/v1/skills/:name/descendants
pub async fn handle_descendants(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<DescendantsResponse>, AppError> {
    let snapshot = state.snapshot.current().await;
    let skill = snapshot
        .index()
        .resolve(&name)
        .ok_or_else(|| AppError::NotFound(format!("skill '{name}'")))?
        .to_string();
    let descendants = state.store.descendants(&skill).await?;
    Ok(Json(DescendantsResponse { skill, descendants }))
}

/// GET /api/v1/taxonomy/stats
pub async fn handle_stats(State(state): State<AppState>) -> Result<Json<StatsResponse>, AppError> {
    let counts = state.store.counts().await?;
    let snapshot = state.snapshot.current().await;
    Ok(Json(StatsResponse {
        counts,
        snapshot_skills: snapshot.skills().len(),
        snapshot_loaded_at: snapshot.loaded_at,
    }))
}
