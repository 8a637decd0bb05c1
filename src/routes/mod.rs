//! HTTP routes for the snippet engine.

pub mod assets;
pub mod auth;
pub mod execute;
pub mod health;
pub mod network;
pub mod render;
pub mod settings;
pub mod snippets;
pub mod transfer;

use axum::routing::{get, post};
use axum::Router;

use crate::AppState;

/// Build the full application router.
pub fn router(state: AppState) -> Router {
    let auth_routes = Router::new()
        .route("/auth/login", post(auth::login))
        .route("/auth/refresh", post(auth::refresh))
        .route("/auth/logout", post(auth::logout))
        .route("/auth/users", get(auth::list_users).post(auth::create_user))
        .route("/auth/me", get(auth::me));

    let snippet_routes = Router::new()
        .route("/snippets", get(snippets::list).post(snippets::create))
        .route("/snippets/active", get(snippets::active_set))
        .route("/snippets/bulk", post(snippets::bulk))
        .route(
            "/snippets/{id}",
            get(snippets::get_by_id)
                .put(snippets::update)
                .delete(snippets::delete),
        )
        .route("/snippets/{id}/activate", post(snippets::activate))
        .route("/snippets/{id}/deactivate", post(snippets::deactivate))
        .route("/snippets/{id}/clone", post(snippets::clone_snippet));

    let network_routes = Router::new()
        .route(
            "/network/shared",
            get(network::list_shared).put(network::set_shared),
        )
        .route("/network/shared/{id}/activate", post(network::activate_shared))
        .route("/network/shared/{id}/deactivate", post(network::deactivate_shared));

    let engine_routes = Router::new()
        .route(
            "/settings",
            get(settings::get_settings).put(settings::update_settings),
        )
        .route("/import", post(transfer::import))
        .route("/export", post(transfer::export))
        .route("/assets", get(assets::manifest))
        .route("/assets/bump", post(assets::bump))
        .route("/render/content", post(render::content))
        .route("/render/source", post(render::source))
        .route("/render/text", post(render::text))
        .route("/execute/{context}", post(execute::run));

    Router::new()
        .route("/health/live", get(health::live))
        .route("/health/ready", get(health::ready))
        .route("/assets/{file}", get(assets::bundle))
        .nest(
            "/api/v1",
            auth_routes
                .merge(snippet_routes)
                .merge(network_routes)
                .merge(engine_routes),
        )
        .with_state(state)
}
