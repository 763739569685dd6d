use axum::extract::State;
use axum::Json;
use serde::Serialize;

use super::state::AppState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: String,
    pub uptime_seconds: f64,
    pub github_api_reachable: bool,
}

/// Liveness endpoint. Always 200 while the process runs; the GitHub
/// reachability probe is best-effort and only flips the flag, it never
/// fails the check itself.
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let reachable = match state.probe.get(&state.api_base).send().await {
        Ok(response) => !response.status().is_server_error(),
        Err(e) => {
            tracing::debug!(error = %e, "github reachability probe failed");
            false
        }
    };

    Json(HealthResponse {
        status: "healthy",
        version: state.version.clone(),
        uptime_seconds: state.started_at.elapsed().as_secs_f64(),
        github_api_reachable: reachable,
    })
}
