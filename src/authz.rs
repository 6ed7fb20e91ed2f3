use uuid::Uuid;

use crate::{
    error::AppError,
    models::{AdminRole, Blog},
    repository::Repository,
};

/// TrustLevel
///
/// The minimum principal category a route requires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrustLevel {
    Anonymous,
    User,
    Admin,
}

/// Which owner field, if any, must match the acting principal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ownership {
    None,
    /// The acting user is the target record (profile edits).
    Self_,
    /// The acting user owns the targeted blog.
    BlogOwner,
    /// Only hidden blogs are owner-restricted; visible ones are public.
    HiddenBlogOwner,
}

/// RoutePolicy
///
/// One row of the declarative route table: method, path template, required
/// trust level and ownership rule.
#[derive(Debug, Clone, Copy)]
pub struct RoutePolicy {
    pub method: &'static str,
    pub path: &'static str,
    pub trust: TrustLevel,
    pub ownership: Ownership,
}

const fn policy(
    method: &'static str,
    path: &'static str,
    trust: TrustLevel,
    ownership: Ownership,
) -> RoutePolicy {
    RoutePolicy {
        method,
        path,
        trust,
        ownership,
    }
}

/// ROUTE_POLICIES
///
/// Every route the API serves. The routers in `routes::{public, authenticated, admin}`
/// are grouped by the `trust` column; ownership is enforced inside the handlers
/// via `ensure_owner` / `load_owned_blog`.
pub const ROUTE_POLICIES: &[RoutePolicy] = &[
    policy("GET", "/health", TrustLevel::Anonymous, Ownership::None),
    policy("POST", "/api/users/register", TrustLevel::Anonymous, Ownership::None),
    policy("POST", "/api/users/login", TrustLevel::Anonymous, Ownership::None),
    policy("POST", "/api/users/logout", TrustLevel::Anonymous, Ownership::None),
    policy("GET", "/api/users", TrustLevel::Anonymous, Ownership::None),
    policy("GET", "/api/users/{id}", TrustLevel::Anonymous, Ownership::None),
    policy("GET", "/api/blogs", TrustLevel::Anonymous, Ownership::None),
    policy("GET", "/api/blogs/{id}", TrustLevel::Anonymous, Ownership::HiddenBlogOwner),
    policy("POST", "/api/admin/login", TrustLevel::Anonymous, Ownership::None),
    policy("POST", "/api/admin/logout", TrustLevel::Anonymous, Ownership::None),
    policy("GET", "/api/users/me", TrustLevel::User, Ownership::None),
    policy("PUT", "/api/users/edit", TrustLevel::User, Ownership::Self_),
    policy("POST", "/api/users/profile-image", TrustLevel::User, Ownership::Self_),
    policy("POST", "/api/blogs", TrustLevel::User, Ownership::None),
    policy("PATCH", "/api/blogs/{id}", TrustLevel::User, Ownership::BlogOwner),
    policy("DELETE", "/api/blogs/{id}", TrustLevel::User, Ownership::BlogOwner),
    policy("POST", "/api/blogs/{id}/main-image", TrustLevel::User, Ownership::BlogOwner),
    policy("GET", "/api/admin/me", TrustLevel::Admin, Ownership::None),
    policy("GET", "/api/admin/users", TrustLevel::Admin, Ownership::None),
    policy("POST", "/api/admin/users", TrustLevel::Admin, Ownership::None),
    policy("DELETE", "/api/admin/blogs/{id}", TrustLevel::Admin, Ownership::None),
];

/// Looks up the policy row for a method and path template.
pub fn policy_for(method: &str, path: &str) -> Option<&'static RoutePolicy> {
    ROUTE_POLICIES
        .iter()
        .find(|p| p.method.eq_ignore_ascii_case(method) && p.path == path)
}

/// ensure_owner
///
/// Fails with `Forbidden` (never `NotFound`) when the acting principal is not
/// the owner of an existing resource.
pub fn ensure_owner(principal_id: Uuid, owner_id: Uuid) -> Result<(), AppError> {
    if principal_id != owner_id {
        tracing::warn!(%principal_id, %owner_id, "ownership check failed");
        return Err(AppError::Forbidden);
    }
    Ok(())
}

/// load_owned_blog
///
/// Fetches a live blog and requires `principal_id` to own it. A missing blog is
/// `NotFound`; an existing blog owned by someone else is `Forbidden`.
pub async fn load_owned_blog(
    repo: &dyn Repository,
    blog_id: Uuid,
    principal_id: Uuid,
) -> Result<Blog, AppError> {
    let blog = repo
        .get_blog(blog_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Blog not found".into()))?;

    ensure_owner(principal_id, blog.user_id)?;
    Ok(blog)
}

/// ensure_can_view_blog
///
/// Visible blogs are public. A hidden blog is readable only by its owner: an
/// anonymous viewer gets `Unauthenticated`, any other user `Forbidden`.
pub fn ensure_can_view_blog(blog: &Blog, viewer: Option<Uuid>) -> Result<(), AppError> {
    if blog.visibility {
        return Ok(());
    }
    match viewer {
        None => Err(AppError::Unauthenticated),
        Some(viewer_id) => ensure_owner(viewer_id, blog.user_id),
    }
}

/// ensure_can_grant
///
/// Any admin may create a plain `admin`; only a `super_admin` may create
/// another `super_admin`.
pub fn ensure_can_grant(actor: AdminRole, requested: AdminRole) -> Result<(), AppError> {
    match (actor, requested) {
        (AdminRole::SuperAdmin, _) | (_, AdminRole::Admin) => Ok(()),
        (AdminRole::Admin, AdminRole::SuperAdmin) => Err(AppError::Forbidden),
    }
}
