//! Engine settings routes.

use axum::{
    extract::{Query, State},
    Json,
};

use crate::errors::{ApiResponse, AppError};
use crate::middleware::auth::CurrentUser;
use crate::models::settings::{EngineSettings, UpdateSettings, SETTINGS_OPTION};
use crate::routes::snippets::{readable, PartitionQuery};
use crate::services::options;
use crate::services::revision::{self, BumpTarget};
use crate::AppState;

/// GET /api/v1/settings. Without `network` this returns the effective settings.
pub async fn get_settings(
    State(state): State<AppState>,
    _user: CurrentUser,
    Query(target): Query<PartitionQuery>,
) -> Result<Json<ApiResponse<EngineSettings>>, AppError> {
    let settings = match target.network {
        Some(true) => {
            let partition = readable(target.partition(), &state)?;
            options::load(&state.store, partition, SETTINGS_OPTION).await?
        }
        _ => options::effective_settings(&state.store, state.config.multisite).await?,
    };
    Ok(ApiResponse::success(settings))
}

/// PUT /api/v1/settings
pub async fn update_settings(
    State(state): State<AppState>,
    user: CurrentUser,
    Query(target): Query<PartitionQuery>,
    Json(body): Json<UpdateSettings>,
) -> Result<Json<ApiResponse<EngineSettings>>, AppError> {
    let partition = target.partition();
    user.authorize_write(partition, state.config.multisite)?;

    let mut settings: EngineSettings =
        options::load(&state.store, partition, SETTINGS_OPTION).await?;
    let previous = settings.clone();
    settings.apply(&body);
    options::save(&state.store, partition, SETTINGS_OPTION, &settings).await?;

    // Minification changes every bundle body.
    if settings.minify_output != previous.minify_output {
        revision::bump(&state.store, BumpTarget::All, partition).await?;
    }

    tracing::info!(partition = partition.as_str(), minify = settings.minify_output, "Updated settings");
    Ok(ApiResponse::success(settings))
}
