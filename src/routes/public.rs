use crate::{AppState, handlers};
use axum::{
    Router,
    routing::{get, post},
};

/// Public Router Module
///
/// Endpoints reachable by anonymous clients: health, sign-in/out for both
/// credential spaces, registration, and read-only listings.
pub fn public_routes() -> Router<AppState> {
    Router::new()
        // GET /health
        // Liveness check for load balancers.
        .route("/health", get(|| async { "ok" }))
        // --- User sessions ---
        .route("/api/users/register", post(handlers::register_user))
        .route("/api/users/login", post(handlers::login_user))
        // Logout only overwrites the cookie; it needs no valid session.
        .route("/api/users/logout", post(handlers::logout_user))
        // --- Profiles ---
        .route("/api/users", get(handlers::list_users))
        .route("/api/users/{id}", get(handlers::get_user))
        // --- Blogs ---
        // GET /api/blogs
        // Visible posts, plus the viewer's own hidden posts when signed in.
        .route("/api/blogs", get(handlers::list_blogs))
        // GET /api/blogs/{id}
        // Accepts an id or a slug. Hidden posts are owner-only.
        .route("/api/blogs/{id}", get(handlers::get_blog))
        // --- Admin sessions ---
        .route("/api/admin/login", post(handlers::admin_login))
        .route("/api/admin/logout", post(handlers::admin_logout))
}
