use std::sync::Arc;

use sqlx::PgPool;

use crate::config::Config;
use crate::embedding::Embedder;
use crate::graph::TaxonomyStore;
use crate::pipeline::{Pipeline, RunRegistry};
use crate::taxonomy::resolution::Resolver;
use crate::taxonomy::snapshot::SnapshotHandle;

/// Shared application state injected into all route handlers via Axum extractors.
#[derive(Clone)]
pub struct AppState {
    pub db: PgPool,
    pub store: Arc<dyn TaxonomyStore>,
    pub embedder: Arc<dyn Embedder>,
    pub resolver: Arc<Resolver>,
    /// Current taxonomy as seen by resolution; replaced wholesale after each run.
    pub snapshot: SnapshotHandle,
    pub pipeline: Arc<Pipeline>,
    pub runs: RunRegistry,
    pub config: Config,
}
