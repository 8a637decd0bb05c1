//! Liveness and readiness probes.

use axum::{extract::State, Json};
use serde::Serialize;

use crate::errors::ApiResponse;
use crate::AppState;

#[derive(Debug, Serialize)]
pub struct HealthStatus {
    pub status: String,
    pub database: String,
    pub redis: String,
    pub multisite: bool,
    pub safe_mode: bool,
}

/// GET /health/live
pub async fn live() -> &'static str {
    "OK"
}

/// GET /health/ready: database and Redis connectivity.
pub async fn ready(State(state): State<AppState>) -> Json<ApiResponse<HealthStatus>> {
    let database = match sqlx::query("SELECT 1").execute(&state.db).await {
        Ok(_) => "connected".to_string(),
        Err(e) => {
            tracing::warn!(error = %e, "Database health check failed");
            format!("error: {e}")
        }
    };

    let redis = match state.cache.ping().await {
        None => "disabled".to_string(),
        Some(Ok(())) => "connected".to_string(),
        Some(Err(e)) => {
            tracing::warn!(error = %e, "Redis health check failed");
            format!("error: {e}")
        }
    };

    let status = if database == "connected" { "ok" } else { "degraded" };
    ApiResponse::success(HealthStatus {
        status: status.to_string(),
        database,
        redis,
        multisite: state.config.multisite,
        safe_mode: state.config.safe_mode,
    })
}
