//! Snippet routes: CRUD, activation, cloning, bulk actions and active-set lookup.

use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::Deserialize;

use crate::errors::{ApiResponse, AppError};
use crate::middleware::auth::CurrentUser;
use crate::models::pagination::{PagedResult, Pagination};
use crate::models::scope::Scope;
use crate::models::snippet::{Partition, Snippet, SnippetInput};
use crate::services::active;
use crate::services::resolver::{ActiveSet, ScopeSet};
use crate::services::snippet::{
    self as snippet_service, BulkAction, BulkResult, SavedSnippet, SnippetFilters,
};
use crate::AppState;

/// `?network=true` selects the network partition.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct PartitionQuery {
    pub network: Option<bool>,
}

impl PartitionQuery {
    pub fn partition(&self) -> Partition {
        Partition::from_flag(self.network)
    }
}

/// Reads of the network partition need multisite.
pub(crate) fn readable(partition: Partition, state: &AppState) -> Result<Partition, AppError> {
    if partition.is_network() && !state.config.multisite {
        return Err(AppError::Validation("Network snippets require multisite".to_string()));
    }
    Ok(partition)
}

/// GET /api/v1/snippets
pub async fn list(
    State(state): State<AppState>,
    _user: CurrentUser,
    Query(target): Query<PartitionQuery>,
    Query(pagination): Query<Pagination>,
    Query(filters): Query<SnippetFilters>,
) -> Result<Json<ApiResponse<PagedResult<Snippet>>>, AppError> {
    let partition = readable(target.partition(), &state)?;
    let result = snippet_service::list(&state.store, partition, &filters, &pagination).await?;
    Ok(ApiResponse::success(result))
}

/// POST /api/v1/snippets
pub async fn create(
    State(state): State<AppState>,
    user: CurrentUser,
    Query(target): Query<PartitionQuery>,
    Json(body): Json<SnippetInput>,
) -> Result<Json<ApiResponse<SavedSnippet>>, AppError> {
    let partition = target.partition();
    user.authorize_write(partition, state.config.multisite)?;
    let saved = snippet_service::create(&state.store, &state.cache, partition, &body).await?;
    Ok(ApiResponse::success(saved))
}

/// GET /api/v1/snippets/{id}
pub async fn get_by_id(
    State(state): State<AppState>,
    _user: CurrentUser,
    Path(id): Path<i64>,
    Query(target): Query<PartitionQuery>,
) -> Result<Json<ApiResponse<Snippet>>, AppError> {
    let partition = readable(target.partition(), &state)?;
    let snippet = snippet_service::find_by_id(&state.store, id, partition).await?;
    Ok(ApiResponse::success(snippet))
}

/// PUT /api/v1/snippets/{id}
pub async fn update(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<i64>,
    Query(target): Query<PartitionQuery>,
    Json(body): Json<SnippetInput>,
) -> Result<Json<ApiResponse<SavedSnippet>>, AppError> {
    let partition = target.partition();
    user.authorize_write(partition, state.config.multisite)?;
    let saved = snippet_service::update(&state.store, &state.cache, id, partition, &body).await?;
    Ok(ApiResponse::success(saved))
}

/// DELETE /api/v1/snippets/{id}
pub async fn delete(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<i64>,
    Query(target): Query<PartitionQuery>,
) -> Result<Json<ApiResponse<i64>>, AppError> {
    let partition = target.partition();
    user.authorize_write(partition, state.config.multisite)?;
    snippet_service::delete(&state.store, &state.cache, id, partition).await?;
    Ok(ApiResponse::success(id))
}

/// POST /api/v1/snippets/{id}/activate
pub async fn activate(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<i64>,
    Query(target): Query<PartitionQuery>,
) -> Result<Json<ApiResponse<Snippet>>, AppError> {
    set_active(state, user, id, target.partition(), true).await
}

/// POST /api/v1/snippets/{id}/deactivate
pub async fn deactivate(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<i64>,
    Query(target): Query<PartitionQuery>,
) -> Result<Json<ApiResponse<Snippet>>, AppError> {
    set_active(state, user, id, target.partition(), false).await
}

async fn set_active(
    state: AppState,
    user: CurrentUser,
    id: i64,
    partition: Partition,
    active: bool,
) -> Result<Json<ApiResponse<Snippet>>, AppError> {
    user.authorize_write(partition, state.config.multisite)?;
    let snippet =
        snippet_service::set_active(&state.store, &state.cache, id, partition, active).await?;
    Ok(ApiResponse::success(snippet))
}

/// POST /api/v1/snippets/{id}/clone
pub async fn clone_snippet(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<i64>,
    Query(target): Query<PartitionQuery>,
) -> Result<Json<ApiResponse<Snippet>>, AppError> {
    let partition = target.partition();
    user.authorize_write(partition, state.config.multisite)?;
    let copy = snippet_service::clone_snippet(&state.store, &state.cache, id, partition).await?;
    Ok(ApiResponse::success(copy))
}

/// POST /api/v1/snippets/bulk
pub async fn bulk(
    State(state): State<AppState>,
    user: CurrentUser,
    Query(target): Query<PartitionQuery>,
    Json(body): Json<BulkAction>,
) -> Result<Json<ApiResponse<BulkResult>>, AppError> {
    let partition = target.partition();
    user.authorize_write(partition, state.config.multisite)?;
    let result = snippet_service::bulk(&state.store, &state.cache, partition, &body).await?;
    Ok(ApiResponse::success(result))
}

#[derive(Debug, Deserialize)]
pub struct ActiveQuery {
    /// Comma-separated scope names.
    pub scopes: String,
}

/// Parse a comma-separated scope list. Unknown names are an error.
pub fn parse_scope_list(raw: &str) -> Result<ScopeSet, AppError> {
    let scopes = raw
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| s.parse::<Scope>().map_err(|e| AppError::Validation(e.to_string())))
        .collect::<Result<ScopeSet, AppError>>()?;
    if scopes.is_empty() {
        return Err(AppError::Validation("At least one scope is required".to_string()));
    }
    Ok(scopes)
}

/// GET /api/v1/snippets/active?scopes=global,admin
pub async fn active_set(
    State(state): State<AppState>,
    _user: CurrentUser,
    Query(query): Query<ActiveQuery>,
) -> Result<Json<ApiResponse<ActiveSet>>, AppError> {
    let scopes = parse_scope_list(&query.scopes)?;
    let set =
        active::fetch_active_snippets(&state.store, &state.cache, &scopes, state.config.multisite)
            .await?;
    Ok(ApiResponse::success(set))
}
