pub mod auth;
pub mod board;
pub mod challenges;
pub mod middleware;
pub mod protocol;
pub mod rest;
pub mod rules;
pub mod standards;
pub mod state;
pub mod ws_handler;

use axum::{
    middleware as axum_middleware,
    routing::{delete, get, patch, post, put},
    Router,
};
use std::sync::Arc;

// Re-export the entry points the binary needs to build the web server.
pub use middleware::require_auth;
pub use state::AppState;
pub use ws_handler::ws_handler;

/// Builds every API route. Everything except signup, login, logout and the project
/// config sits behind `require_auth`.
pub fn router(app_state: Arc<AppState>) -> Router {
    // Public routes (no auth required)
    let public_routes = Router::new()
        .route("/auth/signup", post(auth::signup_handler))
        .route("/auth/login", post(auth::login_handler))
        .route("/auth/logout", post(auth::logout_handler))
        .route("/config", get(rest::config_handler));

    // Protected routes (auth required)
    let protected_routes = Router::new()
        .route("/me", get(rest::get_me_handler).patch(rest::update_me_handler))
        .route("/roster", get(rest::roster_handler))
        .route("/profiles/{id}/role", put(rest::assign_role_handler))
        .route("/profiles/{id}/checkoffs/{standard_id}", put(rest::set_checkoff_handler))
        .route(
            "/profiles/{id}/checkoffs/{standard_id}/toggle",
            post(rest::toggle_checkoff_handler),
        )
        .route("/profiles/{id}/tiers", get(rest::list_tier_checkoffs_handler))
        .route("/profiles/{id}/tiers/{tier}", put(rest::set_tier_checkoff_handler))
        .route(
            "/standards",
            get(standards::list_standards_handler).post(standards::create_standard_handler),
        )
        .route("/standards/swap", post(standards::swap_standards_handler))
        .route("/standards/normalize", post(standards::normalize_standards_handler))
        .route("/standards/seed", post(standards::seed_standards_handler))
        .route(
            "/standards/{id}",
            patch(standards::update_standard_handler).delete(standards::delete_standard_handler),
        )
        .route(
            "/standards/{id}/record",
            get(standards::get_record_handler).put(standards::set_record_handler),
        )
        .route(
            "/challenges/{kind}",
            get(challenges::list_challenges_handler).post(challenges::create_challenge_handler),
        )
        .route("/challenges/{kind}/{id}/active", put(challenges::set_active_handler))
        .route("/weekly/{week_id}", get(challenges::weekly_board_handler))
        .route("/weekly/{week_id}/logs", post(challenges::log_weekly_handler))
        .route(
            "/weekly/{week_id}/logs/{id}",
            delete(challenges::delete_weekly_log_handler),
        )
        .route("/monthly/{month_id}", get(challenges::monthly_board_handler))
        .route("/monthly/{month_id}/entry", put(challenges::submit_monthly_handler))
        .route(
            "/monthly/{month_id}/entries/{profile_id}",
            delete(challenges::delete_monthly_handler),
        )
        .route("/hall-of-fame", get(challenges::hall_of_fame_handler))
        .route("/streak/{profile_id}", get(challenges::streak_handler))
        .route(
            "/messages",
            get(board::list_messages_handler).post(board::post_message_handler),
        )
        .route(
            "/messages/{id}",
            patch(board::edit_message_handler).delete(board::delete_message_handler),
        )
        .route("/messages/{id}/pinned", put(board::set_pinned_handler))
        .route(
            "/settings/{key}",
            get(board::get_settings_handler).put(board::put_settings_handler),
        )
        .route("/ws", get(ws_handler))
        .layer(axum_middleware::from_fn_with_state(
            app_state.clone(),
            require_auth,
        ));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .with_state(app_state)
}
