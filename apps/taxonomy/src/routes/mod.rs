pub mod health;

use axum::{
    routing::{get, post},
    Router,
};

use crate::pipeline::handlers as pipeline;
use crate::state::AppState;
use crate::taxonomy::handlers as taxonomy;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_handler))
        // Query surface
        .route("/api/v1/skills/resolve", post(taxonomy::handle_resolve))
        .route(
            "/api/v1/skills/associated",
            get(taxonomy::handle_associated_skills),
        )
        .route("/api/v1/skills/similar", get(taxonomy::handle_similar_skills))
        .route(
            "/api/v1/skills/:name/descendants",
            get(taxonomy::handle_descendants),
        )
        .route(
            "/api/v1/documents/search",
            post(taxonomy::handle_document_search),
        )
        .route("/api/v1/taxonomy/stats", get(taxonomy::handle_stats))
        // Pipeline runs
        .route("/api/v1/pipeline/runs", post(pipeline::handle_start_run))
        .route(
            "/api/v1/pipeline/runs/latest",
            get(pipeline::handle_latest_run),
        )
        .with_state(state)
}
