pub mod auth;
pub mod middleware;
pub mod rest;
pub mod state;

use axum::{
    extract::DefaultBodyLimit,
    middleware as axum_middleware,
    routing::{delete, get, post},
    Router,
};
use std::sync::Arc;

// Re-export the handlers so the binary can build the router from one place.
pub use auth::{
    list_profiles_handler, login_handler, logout_handler, me_handler, signup_handler,
    update_me_handler,
};
pub use middleware::require_auth;
pub use rest::{
    check_in_handler, check_out_handler, delete_record_handler, list_records_handler,
    today_handler,
};
use state::AppState;

/// Photos arrive inline as data URLs, so the body limit is generous.
const MAX_BODY_BYTES: usize = 10 * 1024 * 1024;

/// Builds every API route. CORS and Swagger UI are layered on by the binary.
pub fn router(app_state: Arc<AppState>) -> Router {
    // Public routes (no auth required)
    let public_routes = Router::new()
        .route("/auth/signup", post(signup_handler))
        .route("/auth/login", post(login_handler))
        .route("/auth/logout", post(logout_handler));

    // Protected routes (auth required)
    let protected_routes = Router::new()
        .route("/me", get(me_handler).patch(update_me_handler))
        .route("/profiles", get(list_profiles_handler))
        .route("/presensi", get(list_records_handler))
        .route("/presensi/today", get(today_handler))
        .route("/presensi/check-in", post(check_in_handler))
        .route("/presensi/check-out", post(check_out_handler))
        .route("/presensi/{id}", delete(delete_record_handler))
        .layer(axum_middleware::from_fn_with_state(
            app_state.clone(),
            require_auth,
        ));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .with_state(app_state)
}
