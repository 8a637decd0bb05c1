//! Import and export routes.

use axum::{
    extract::{Query, State},
    Json,
};
use serde::Deserialize;

use crate::errors::{ApiResponse, AppError};
use crate::middleware::auth::CurrentUser;
use crate::routes::snippets::{readable, PartitionQuery};
use crate::services::transfer::{self, ExportDocument, ImportRequest, ImportSummary};
use crate::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct ExportRequest {
    #[serde(default)]
    pub ids: Vec<i64>,
}

/// POST /api/v1/export
pub async fn export(
    State(state): State<AppState>,
    _user: CurrentUser,
    Query(target): Query<PartitionQuery>,
    Json(body): Json<ExportRequest>,
) -> Result<Json<ApiResponse<ExportDocument>>, AppError> {
    let partition = readable(target.partition(), &state)?;
    let document = transfer::export(&state.store, partition, &body.ids).await?;
    Ok(ApiResponse::success(document))
}

/// POST /api/v1/import
pub async fn import(
    State(state): State<AppState>,
    user: CurrentUser,
    Query(target): Query<PartitionQuery>,
    Json(body): Json<ImportRequest>,
) -> Result<Json<ApiResponse<ImportSummary>>, AppError> {
    let partition = target.partition();
    user.authorize_write(partition, state.config.multisite)?;
    let summary = transfer::import(&state.store, &state.cache, partition, &body).await?;
    Ok(ApiResponse::success(summary))
}
