use crate::{AppState, handlers};
use axum::{
    Router,
    routing::{delete, get},
};

/// Admin Router Module
///
/// Routes for a signed-in admin. Wrapped in a layer that requires a valid
/// `admin_token`; a user session never satisfies it.
pub fn admin_routes() -> Router<AppState> {
    Router::new()
        // GET /api/admin/me
        .route("/api/admin/me", get(handlers::admin_me))
        // GET/POST /api/admin/users
        // Listing admins, and creating one. Granting `super_admin` is checked
        // against the caller's role in the handler.
        .route(
            "/api/admin/users",
            get(handlers::list_admins).post(handlers::create_admin),
        )
        // DELETE /api/admin/blogs/{id}
        // Moderation: soft-delete any post.
        .route("/api/admin/blogs/{id}", delete(handlers::admin_delete_blog))
}
