//! Request handlers. Each one is a thin call into the orchestrator.

use crate::error::ApiError;
use crate::server::AppState;
use axum::{
    extract::{Path, State},
    Json,
};
use futures_util::FutureExt;
use saai_core::SaaiError;
use saai_orchestrator::SystemStatus;
use serde_json::{json, Value};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::error;

/// Name reported by the service banner.
pub const SERVICE_NAME: &str = "SAAI Agents";

/// `GET /`
pub async fn root() -> Json<Value> {
    Json(json!({
        "service": SERVICE_NAME,
        "version": env!("CARGO_PKG_VERSION"),
        "status": "operational",
        "description": "Supervised perception, memory, action and ethics workers",
    }))
}

/// `GET /health`
pub async fn health(State(state): State<Arc<AppState>>) -> Result<Json<SystemStatus>, ApiError> {
    let orchestrator = &state.orchestrator;
    if !orchestrator.is_initialized() {
        return Err(SaaiError::Unavailable.into());
    }
    match AssertUnwindSafe(orchestrator.status()).catch_unwind().await {
        Ok(status) => Ok(Json(status)),
        Err(_) => {
            error!("Health aggregation panicked");
            Err(ApiError::internal("health aggregation failed"))
        }
    }
}

/// `GET /agents`
pub async fn list_agents(State(state): State<Arc<AppState>>) -> Result<Json<Value>, ApiError> {
    if !state.orchestrator.is_initialized() {
        return Err(SaaiError::Unavailable.into());
    }
    let agents = state.orchestrator.workers();
    Ok(Json(json!({ "count": agents.len(), "agents": agents })))
}

/// `POST /agents/{name}/command`
pub async fn send_command(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
    Json(command): Json<Value>,
) -> Result<Json<Value>, ApiError> {
    let result = state.orchestrator.route(&name, command).await?;
    Ok(Json(json!({ "result": result })))
}
