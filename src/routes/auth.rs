//! Authentication routes: login, refresh, logout, user management, profile.

use axum::{extract::State, Json};
use serde::Deserialize;
use validator::Validate;

use crate::errors::{ApiResponse, AppError};
use crate::middleware::auth::CurrentUser;
use crate::middleware::rbac::RequireNetworkAdmin;
use crate::models::user::{CreateUser, UserResponse};
use crate::services::auth::{self as auth_service, JwtSettings, TokenPair};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

/// POST /api/v1/auth/login
pub async fn login(
    State(state): State<AppState>,
    Json(body): Json<LoginRequest>,
) -> Result<Json<ApiResponse<TokenPair>>, AppError> {
    let jwt = JwtSettings::from(&state.config);
    let tokens = auth_service::login(&state.db, &body.username, &body.password, &jwt).await?;
    Ok(ApiResponse::success(tokens))
}

/// POST /api/v1/auth/refresh
pub async fn refresh(
    State(state): State<AppState>,
    Json(body): Json<RefreshRequest>,
) -> Result<Json<ApiResponse<TokenPair>>, AppError> {
    let jwt = JwtSettings::from(&state.config);
    let tokens = auth_service::refresh_token(&state.db, &body.refresh_token, &jwt).await?;
    Ok(ApiResponse::success(tokens))
}

/// POST /api/v1/auth/logout. Tokens are stateless; the client discards them.
pub async fn logout() -> Json<ApiResponse<&'static str>> {
    ApiResponse::success("Logged out successfully")
}

/// POST /api/v1/auth/users (network admin)
pub async fn create_user(
    State(state): State<AppState>,
    RequireNetworkAdmin(_admin): RequireNetworkAdmin,
    Json(body): Json<CreateUser>,
) -> Result<Json<ApiResponse<UserResponse>>, AppError> {
    body.validate()?;
    let user = auth_service::create_user(&state.db, &body).await?;
    Ok(ApiResponse::success(UserResponse::from(user)))
}

/// GET /api/v1/auth/users (network admin)
pub async fn list_users(
    State(state): State<AppState>,
    RequireNetworkAdmin(_admin): RequireNetworkAdmin,
) -> Result<Json<ApiResponse<Vec<UserResponse>>>, AppError> {
    let users = auth_service::list_users(&state.db).await?;
    Ok(ApiResponse::success(users.into_iter().map(UserResponse::from).collect()))
}

/// GET /api/v1/auth/me
pub async fn me(
    State(state): State<AppState>,
    current_user: CurrentUser,
) -> Result<Json<ApiResponse<UserResponse>>, AppError> {
    let user = auth_service::find_user_by_id(&state.db, current_user.id).await?;
    Ok(ApiResponse::success(UserResponse::from(user)))
}
