use axum::{extract::State, http::StatusCode, Json};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::AppError;
use crate::extraction::ExtractOptions;
use crate::pipeline::run::{spawn_run, RunStatus};
use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct StartRunRequest {
    /// Discard the checkpoint and mention log before extracting.
    #[serde(default)]
    pub fresh: bool,
    /// Re-attempt documents whose extraction previously exhausted its retries.
    #[serde(default)]
    pub retry_failed: bool,
}

#[derive(Serialize)]
pub struct StartRunResponse {
    pub run_id: Uuid,
}

/// POST /api/v1/pipeline/runs
pub async fn handle_start_run(
    State(state): State<AppState>,
    Json(req): Json<StartRunRequest>,
) -> Result<(StatusCode, Json<StartRunResponse>), AppError> {
    let options = ExtractOptions {
        fresh: req.fresh,
        retry_failed: req.retry_failed,
    };
    let run_id = spawn_run(state.pipeline.clone(), state.runs.clone(), options).await?;
    Ok((StatusCode::ACCEPTED, Json(StartRunResponse { run_id })))
}

/// GET /api/v1/pipeline/runs/latest
pub async fn handle_latest_run(State(state): State<AppState>) -> Result<Json<RunStatus>, AppError> {
    state
        .runs
        .latest()
        .await
        .map(Json)
        .ok_or_else(|| AppError::NotFound("no pipeline run has been started".to_string()))
}
