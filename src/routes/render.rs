//! Shortcode rendering routes.

use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};

use crate::errors::{ApiResponse, AppError};
use crate::middleware::auth::CurrentUser;
use crate::services::shortcode::{ContentAtts, ShortcodeRenderer, SourceAtts};
use crate::AppState;

#[derive(Debug, Serialize)]
pub struct Rendered {
    pub html: String,
}

#[derive(Debug, Deserialize)]
pub struct TextRequest {
    pub text: String,
}

/// POST /api/v1/render/content: one `[code_snippet]` occurrence.
pub async fn content(
    State(state): State<AppState>,
    _user: CurrentUser,
    Json(atts): Json<ContentAtts>,
) -> Result<Json<ApiResponse<Rendered>>, AppError> {
    let renderer = ShortcodeRenderer::new(&state.store, &state.evaluator, state.config.multisite);
    let html = renderer.render_content(&atts).await?;
    Ok(ApiResponse::success(Rendered { html }))
}

/// POST /api/v1/render/source: one `[code_snippet_source]` occurrence.
pub async fn source(
    State(state): State<AppState>,
    _user: CurrentUser,
    Json(atts): Json<SourceAtts>,
) -> Result<Json<ApiResponse<Rendered>>, AppError> {
    let renderer = ShortcodeRenderer::new(&state.store, &state.evaluator, state.config.multisite);
    let html = renderer.render_source(&atts).await?;
    Ok(ApiResponse::success(Rendered { html }))
}

/// POST /api/v1/render/text: expand every shortcode in a block of text.
pub async fn text(
    State(state): State<AppState>,
    _user: CurrentUser,
    Json(body): Json<TextRequest>,
) -> Result<Json<ApiResponse<Rendered>>, AppError> {
    let renderer = ShortcodeRenderer::new(&state.store, &state.evaluator, state.config.multisite);
    let html = renderer.expand(&body.text).await?;
    Ok(ApiResponse::success(Rendered { html }))
}
