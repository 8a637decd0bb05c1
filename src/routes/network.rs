//! Shared network snippet routes.

use axum::{
    extract::{Path, State},
    Json,
};
use serde::Deserialize;

use crate::errors::{ApiResponse, AppError};
use crate::middleware::auth::CurrentUser;
use crate::middleware::rbac::{RequireNetworkAdmin, RequireSiteAdmin};
use crate::services::snippet::{self as snippet_service, SharedSnippet};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct SharedListUpdate {
    pub ids: Vec<i64>,
}

fn require_multisite(state: &AppState) -> Result<(), AppError> {
    if !state.config.multisite {
        return Err(AppError::Validation("Shared network snippets require multisite".to_string()));
    }
    Ok(())
}

/// GET /api/v1/network/shared
pub async fn list_shared(
    State(state): State<AppState>,
    _user: CurrentUser,
) -> Result<Json<ApiResponse<Vec<SharedSnippet>>>, AppError> {
    require_multisite(&state)?;
    let shared = snippet_service::list_shared(&state.store).await?;
    Ok(ApiResponse::success(shared))
}

/// PUT /api/v1/network/shared (network admin)
pub async fn set_shared(
    State(state): State<AppState>,
    RequireNetworkAdmin(admin): RequireNetworkAdmin,
    Json(body): Json<SharedListUpdate>,
) -> Result<Json<ApiResponse<Vec<SharedSnippet>>>, AppError> {
    require_multisite(&state)?;
    tracing::info!(user = %admin.username, ids = ?body.ids, "Replacing shared network list");
    let shared = snippet_service::set_shared(&state.store, &state.cache, &body.ids).await?;
    Ok(ApiResponse::success(shared))
}

/// POST /api/v1/network/shared/{id}/activate
pub async fn activate_shared(
    State(state): State<AppState>,
    RequireSiteAdmin(_admin): RequireSiteAdmin,
    Path(id): Path<i64>,
) -> Result<Json<ApiResponse<SharedSnippet>>, AppError> {
    require_multisite(&state)?;
    let shared = snippet_service::set_shared_active(&state.store, &state.cache, id, true).await?;
    Ok(ApiResponse::success(shared))
}

/// POST /api/v1/network/shared/{id}/deactivate
pub async fn deactivate_shared(
    State(state): State<AppState>,
    RequireSiteAdmin(_admin): RequireSiteAdmin,
    Path(id): Path<i64>,
) -> Result<Json<ApiResponse<SharedSnippet>>, AppError> {
    require_multisite(&state)?;
    let shared = snippet_service::set_shared_active(&state.store, &state.cache, id, false).await?;
    Ok(ApiResponse::success(shared))
}
