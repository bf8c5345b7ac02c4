use axum::{extract::State, Json};
use serde_json::{json, Value};
use tracing::warn;

use crate::state::AppState;

/// GET /health
/// Reports service version, database reachability and the loaded taxonomy size.
pub async fn health_handler(State(state): State<AppState>) -> Json<Value> {
    let database = match sqlx::query("SELECT 1").execute(&state.db).await {
        Ok(_) => "ok",
        Err(e) => {
            warn!("Health check could not reach the database: {e}");
            "unavailable"
        }
    };
    let snapshot = state.snapshot.current().await;

    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "service": "taxonomy",
        "database": database,
        "canonical_skills": snapshot.skills().len(),
    }))
}
