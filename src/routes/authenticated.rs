use crate::{AppState, handlers};
use axum::{
    Router,
    routing::{get, patch, post, put},
};

/// Authenticated Router Module
///
/// Routes for a signed-in user. The layer in `create_router` rejects requests
/// without a resolvable `user_token` before they reach these handlers; each
/// handler still takes `AuthUser` to learn who is acting.
///
/// Ownership: every `/api/blogs/{id}` mutation goes through
/// `authz::load_owned_blog`, so a non-owner gets 403 and a missing post 404.
pub fn authenticated_routes() -> Router<AppState> {
    Router::<AppState>::new()
        // GET /api/users/me
        .route("/api/users/me", get(handlers::get_me))
        // PUT /api/users/edit
        // Name and surname of the caller's own account.
        .route("/api/users/edit", put(handlers::edit_user))
        // POST /api/users/profile-image
        // Multipart `image`; replaces the previous profile image.
        .route(
            "/api/users/profile-image",
            post(handlers::upload_profile_image).layer(handlers::image_upload_body_limit()),
        )
        // POST /api/blogs
        // Multipart form with a required `image`.
        .route(
            "/api/blogs",
            post(handlers::create_blog).layer(handlers::image_upload_body_limit()),
        )
        // PATCH/DELETE /api/blogs/{id}
        .route(
            "/api/blogs/{id}",
            patch(handlers::update_blog).delete(handlers::delete_blog),
        )
        // POST /api/blogs/{id}/main-image
        .route(
            "/api/blogs/{id}/main-image",
            post(handlers::upload_blog_image).layer(handlers::image_upload_body_limit()),
        )
}
