//! Liveness probe with the backend in use and the open session count

use axum::{extract::State, routing::get, Json, Router};
use serde::Serialize;

use super::buildinfo::BuildInfo;
use crate::AppState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub module: &'static str,
    pub version: &'static str,
    pub git_hash: &'static str,
    /// `local` or `hosted`
    pub backend: &'static str,
    /// Annotation sessions held in memory
    pub sessions: usize,
}

/// GET /health (no authentication)
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let build = BuildInfo::current();
    let backend = state.config.read().await.backend.kind();
    Json(HealthResponse {
        status: "ok",
        module: build.module,
        version: build.version,
        git_hash: build.git_hash,
        backend,
        sessions: state.sessions.len().await,
    })
}

pub fn health_routes() -> Router<AppState> {
    Router::new().route("/health", get(health_check))
}
