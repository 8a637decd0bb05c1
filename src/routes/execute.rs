//! php snippet execution route.

use axum::{
    extract::{Path, State},
    Json,
};

use crate::errors::{ApiResponse, AppError};
use crate::middleware::rbac::RequireSiteAdmin;
use crate::services::executor::{self, ExecutionContext, ExecutionOptions, ExecutionReport};
use crate::AppState;

/// POST /api/v1/execute/{context}, where context is `frontend` or `admin`.
pub async fn run(
    State(state): State<AppState>,
    RequireSiteAdmin(user): RequireSiteAdmin,
    Path(context): Path<String>,
) -> Result<Json<ApiResponse<ExecutionReport>>, AppError> {
    let context: ExecutionContext = context.parse()?;
    let opts = ExecutionOptions {
        multisite: state.config.multisite,
        safe_mode: state.config.safe_mode,
    };

    tracing::info!(user = %user.username, ?context, "Executing active snippets");
    let report =
        executor::execute_active_snippets(&state.store, &state.cache, &state.evaluator, context, opts)
            .await?;
    Ok(ApiResponse::success(report))
}
