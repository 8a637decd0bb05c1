//! css/js bundle routes.

use axum::{
    extract::{Path, Query, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::errors::{ApiResponse, AppError};
use crate::middleware::auth::CurrentUser;
use crate::models::scope::AssetBucket;
use crate::routes::snippets::PartitionQuery;
use crate::services::assets::{self, AssetLink};
use crate::services::revision::{self, BumpTarget, Revisions};
use crate::AppState;

/// GET /assets/{file}, e.g. `/assets/site-css.css?ver=3`. Public.
///
/// The `ver` query parameter only busts caches; the current bundle is
/// always served.
pub async fn bundle(
    State(state): State<AppState>,
    Path(file): Path<String>,
    headers: HeaderMap,
) -> Result<Response, AppError> {
    let bucket = AssetBucket::from_file_name(&file)
        .ok_or_else(|| AppError::NotFound(format!("No asset bundle named '{file}'")))?;

    let bundle =
        assets::build_bundle(&state.store, &state.cache, bucket, state.config.multisite).await?;
    let etag = bundle.etag();

    let not_modified = headers
        .get(header::IF_NONE_MATCH)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.split(',').any(|tag| tag.trim() == etag));

    let mut response = if not_modified {
        StatusCode::NOT_MODIFIED.into_response()
    } else {
        (StatusCode::OK, bundle.body.clone()).into_response()
    };

    let out = response.headers_mut();
    out.insert(header::CONTENT_TYPE, HeaderValue::from_static(bundle.content_type()));
    for (name, value) in [
        (header::CACHE_CONTROL, bundle.cache_control()),
        (header::EXPIRES, bundle.expires(Utc::now())),
        (header::ETAG, etag),
    ] {
        let value = HeaderValue::from_str(&value)
            .map_err(|e| AppError::Internal(format!("Invalid header value: {e}")))?;
        out.insert(name, value);
    }

    Ok(response)
}

/// GET /api/v1/assets: current bundle URLs.
pub async fn manifest(
    State(state): State<AppState>,
    _user: CurrentUser,
) -> Result<Json<ApiResponse<Vec<AssetLink>>>, AppError> {
    let links = assets::manifest(&state.store, state.config.multisite).await?;
    Ok(ApiResponse::success(links))
}

#[derive(Debug, Deserialize)]
pub struct BumpRequest {
    /// A bucket name or `all`.
    pub target: String,
}

#[derive(Debug, Serialize)]
pub struct BumpResponse {
    pub revisions: Revisions,
    pub links: Vec<AssetLink>,
}

/// POST /api/v1/assets/bump
pub async fn bump(
    State(state): State<AppState>,
    user: CurrentUser,
    Query(target): Query<PartitionQuery>,
    Json(body): Json<BumpRequest>,
) -> Result<Json<ApiResponse<BumpResponse>>, AppError> {
    let partition = target.partition();
    user.authorize_write(partition, state.config.multisite)?;

    let bump_target = body
        .target
        .parse::<BumpTarget>()
        .map_err(|e| AppError::Validation(e.to_string()))?;
    let revisions = revision::bump(&state.store, bump_target, partition).await?;
    let links = assets::manifest(&state.store, state.config.multisite).await?;

    Ok(ApiResponse::success(BumpResponse { revisions, links }))
}
