//! One end-to-end pipeline run and the registry that serialises runs.
//!
//! Stages: load documents → upsert documents → extract → canonicalize →
//! infer hierarchy → derive requirements → persist → export artifacts →
//! swap the resolution snapshot.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::documents::DocumentSource;
use crate::embedding::{embed_all, Embedder};
use crate::errors::AppError;
use crate::extraction::{ExtractOptions, ExtractionCoordinator, ExtractionSummary};
use crate::graph::TaxonomyStore;
use crate::models::CanonicalSkill;
use crate::pipeline::artifacts::ArtifactExporter;
use crate::taxonomy::canonicalize::Canonicalizer;
use crate::taxonomy::hierarchy::{infer_hierarchy, DroppedEdge, ImpliedSkill};
use crate::taxonomy::index::NameIndex;
use crate::taxonomy::normalize::normalize_skill_name;
use crate::taxonomy::requirements::derive_requirements;
use crate::taxonomy::snapshot::{SnapshotHandle, TaxonomySnapshot};

#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub document_source: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub extraction: ExtractionSummary,
    pub canonical_skills: usize,
    pub implied_skills: Vec<ImpliedSkill>,
    pub aliases: usize,
    pub requirement_edges: usize,
    pub hierarchy_edges: usize,
    pub dropped_edges: Vec<DroppedEdge>,
    /// S3 prefix the artifacts went to, when export is configured and succeeded.
    pub artifacts_prefix: Option<String>,
}

pub struct Pipeline {
    source: Arc<dyn DocumentSource>,
    store: Arc<dyn TaxonomyStore>,
    coordinator: ExtractionCoordinator,
    canonicalizer: Canonicalizer,
    embedder: Arc<dyn Embedder>,
    embed_concurrency: usize,
    snapshot: SnapshotHandle,
    artifacts: Option<ArtifactExporter>,
}

impl Pipeline {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        source: Arc<dyn DocumentSource>,
        store: Arc<dyn TaxonomyStore>,
        coordinator: ExtractionCoordinator,
        canonicalizer: Canonicalizer,
        embedder: Arc<dyn Embedder>,
        embed_concurrency: usize,
        snapshot: SnapshotHandle,
        artifacts: Option<ArtifactExporter>,
    ) -> Self {
        Self {
            source,
            store,
            coordinator,
            canonicalizer,
            embedder,
            embed_concurrency,
            snapshot,
            artifacts,
        }
    }

    pub async fn run(&self, run_id: Uuid, options: ExtractOptions) -> Result<RunSummary, AppError> {
        let started_at = Utc::now();
        info!("Pipeline run {run_id} started (source: {})", self.source.describe());

        let documents = self.source.load().await?;
        self.store.upsert_documents(&documents).await?;
        let document_ids: Vec<String> = documents.iter().map(|d| d.id.clone()).collect();

        let report = self.coordinator.extract(documents, options).await?;

        let mut skills = self.canonicalizer.canonicalize(&report.mentions).await?;
        let inference = infer_hierarchy(&skills);
        skills.extend(self.implied_skills(&inference.implied_skills).await?);
        skills.sort_by(|a, b| a.canonical_name.cmp(&b.canonical_name));

        let index = NameIndex::build(&skills);
        let requirements = derive_requirements(&report.mentions, &index);

        self.store.upsert_skills(&skills).await?;
        self.store
            .replace_requirements(&document_ids, &requirements)
            .await?;
        self.store.replace_hierarchy(&inference.edges).await?;

        let mut summary = RunSummary {
            run_id,
            document_source: self.source.describe(),
            started_at,
            finished_at: Utc::now(),
            extraction: report.summary,
            canonical_skills: skills.len(),
            implied_skills: inference.implied_skills.clone(),
            aliases: skills.iter().map(|s| s.aliases.len()).sum(),
            requirement_edges: requirements.len(),
            hierarchy_edges: inference.edges.len(),
            dropped_edges: inference.dropped.clone(),
            artifacts_prefix: None,
        };

        if let Some(exporter) = &self.artifacts {
            // Export is best-effort; the store already holds the run's result.
            let exported = async {
                exporter.put_json(run_id, "mentions.json", &report.mentions).await?;
                exporter.put_json(run_id, "canonical_skills.json", &skills).await?;
                exporter.put_json(run_id, "hierarchy.json", &inference).await?;
                summary.artifacts_prefix = Some(ArtifactExporter::run_prefix(run_id));
                exporter.put_json(run_id, "summary.json", &summary).await?;
                Ok::<(), AppError>(())
            }
            .await;
            if let Err(e) = exported {
                warn!("Artifact export for run {run_id} failed: {e}");
                summary.artifacts_prefix = None;
            }
        }

        let persisted = self.store.load_skills().await?;
        self.snapshot.swap(TaxonomySnapshot::new(persisted)).await;
        summary.finished_at = Utc::now();

        info!(
            "Pipeline run {run_id} finished: {} skills, {} requirement edges, {} hierarchy edges ({} dropped)",
            summary.canonical_skills,
            summary.requirement_edges,
            summary.hierarchy_edges,
            summary.dropped_edges.len()
        );
        Ok(summary)
    }

    async fn implied_skills(&self, implied: &[ImpliedSkill]) -> Result<Vec<CanonicalSkill>, AppError> {
        let names: Vec<String> = implied
            .iter()
            .map(|s| normalize_skill_name(&s.name))
            .collect();
        let vectors = embed_all(self.embedder.as_ref(), &names, self.embed_concurrency).await?;
        Ok(implied
            .iter()
            .zip(vectors)
            .map(|(skill, embedding)| CanonicalSkill {
                canonical_name: skill.name.clone(),
                category: skill.category,
                aliases: Default::default(),
                embedding,
            })
            .collect())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Running,
    Succeeded,
    Failed,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunStatus {
    pub run_id: Uuid,
    pub state: RunState,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub summary: Option<RunSummary>,
    pub error: Option<String>,
}

/// Admits one run at a time and remembers the latest one.
#[derive(Clone, Default)]
pub struct RunRegistry {
    lock: Arc<Mutex<()>>,
    latest: Arc<RwLock<Option<RunStatus>>>,
}

impl RunRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts tracking a new run, or fails with `Conflict` while one is active.
    /// The returned guard must be held for the whole run.
    pub async fn begin(&self) -> Result<(Uuid, OwnedMutexGuard<()>), AppError> {
        let guard = self
            .lock
            .clone()
            .try_lock_owned()
            .map_err(|_| AppError::Conflict("a pipeline run is already in progress".to_string()))?;
        let run_id = Uuid::new_v4();
        *self.latest.write().await = Some(RunStatus {
            run_id,
            state: RunState::Running,
            started_at: Utc::now(),
            finished_at: None,
            summary: None,
            error: None,
        });
        Ok((run_id, guard))
    }

    pub async fn finish(&self, run_id: Uuid, result: Result<RunSummary, AppError>) {
        let mut latest = self.latest.write().await;
        let Some(status) = latest.as_mut().filter(|s| s.run_id == run_id) else {
            return;
        };
        status.finished_at = Some(Utc::now());
        match result {
            Ok(summary) => {
                status.state = RunState::Succeeded;
                status.summary = Some(summary);
            }
            Err(e) => {
                error!("Pipeline run {run_id} failed: {e}");
                status.state = RunState::Failed;
                status.error = Some(e.to_string());
            }
        }
    }

    pub async fn latest(&self) -> Option<RunStatus> {
        self.latest.read().await.clone()
    }
}

/// Runs the pipeline in the background under the registry's single-run guard.
pub async fn spawn_run(
    pipeline: Arc<Pipeline>,
    registry: RunRegistry,
    options: ExtractOptions,
) -> Result<Uuid, AppError> {
    let (run_id, guard) = registry.begin().await?;
    tokio::spawn(async move {
        let result = pipeline.run(run_id, options).await;
        registry.finish(run_id, result).await;
        drop(guard);
    });
    Ok(run_id)
}
