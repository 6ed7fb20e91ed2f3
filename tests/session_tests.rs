mod common;

use axum::{
    extract::FromRequestParts,
    http::{Request, header, request::Parts},
};
use axum_extra::extract::cookie::SameSite;
use blog_backend::{
    AppError, SessionManager,
    auth::{AuthAdmin, AuthUser, MaybeAuthUser, SessionScope},
    models::AdminRole,
};
use chrono::{Duration, Utc};
use common::TestContext;
use uuid::Uuid;

fn sessions() -> SessionManager {
    SessionManager::new("unit-test-secret", Duration::hours(24), true)
}

fn parts_with_cookie(cookie: Option<&str>) -> Parts {
    let mut builder = Request::builder().uri("/api/users/me");
    if let Some(cookie) = cookie {
        builder = builder.header(header::COOKIE, cookie);
    }
    builder.body(()).unwrap().into_parts().0
}

// --- Issue / validate ---

#[test]
fn test_issued_token_resolves_to_same_principal() {
    let sessions = sessions();
    let principal = Uuid::new_v4();

    let token = sessions.issue(principal, SessionScope::User).unwrap();
    let claims = sessions.validate(&token, SessionScope::User).unwrap();

    assert_eq!(claims.sub, principal);
    assert_eq!(claims.aud, "user");
    assert_eq!(claims.exp - claims.iat, 24 * 60 * 60);
}

#[test]
fn test_expired_token_is_rejected() {
    let sessions = sessions();
    let issued_at = Utc::now() - Duration::hours(25);

    let token = sessions
        .issue_at(Uuid::new_v4(), SessionScope::User, issued_at)
        .unwrap();

    assert_eq!(
        sessions.validate(&token, SessionScope::User),
        Err(AppError::Unauthenticated)
    );
}

#[test]
fn test_token_expiring_now_is_rejected() {
    let sessions = sessions();
    // exp == issue time + 24h == now: no leeway is granted.
    let token = sessions
        .issue_at(Uuid::new_v4(), SessionScope::Admin, Utc::now() - Duration::hours(24))
        .unwrap();

    assert!(sessions.validate(&token, SessionScope::Admin).is_err());
}

#[test]
fn test_user_and_admin_scopes_never_overlap() {
    let sessions = sessions();
    let id = Uuid::new_v4();

    let user_token = sessions.issue(id, SessionScope::User).unwrap();
    let admin_token = sessions.issue(id, SessionScope::Admin).unwrap();

    assert_eq!(
        sessions.validate(&user_token, SessionScope::Admin),
        Err(AppError::Unauthenticated)
    );
    assert_eq!(
        sessions.validate(&admin_token, SessionScope::User),
        Err(AppError::Unauthenticated)
    );
    assert!(sessions.validate(&admin_token, SessionScope::Admin).is_ok());
}

#[test]
fn test_foreign_signature_and_garbage_are_rejected() {
    let other = SessionManager::new("a-different-secret", Duration::hours(24), true);
    let forged = other.issue(Uuid::new_v4(), SessionScope::User).unwrap();

    assert!(sessions().validate(&forged, SessionScope::User).is_err());
    assert!(sessions().validate("not.a.jwt", SessionScope::User).is_err());
    assert!(sessions().validate("", SessionScope::User).is_err());
}

// --- Cookies ---

#[test]
fn test_session_cookie_attributes() {
    let sessions = sessions();
    let cookie = sessions.session_cookie(SessionScope::User, "tok".into());

    assert_eq!(cookie.name(), "user_token");
    assert_eq!(cookie.value(), "tok");
    assert_eq!(cookie.http_only(), Some(true));
    assert_eq!(cookie.secure(), Some(true));
    assert_eq!(cookie.path(), Some("/"));
    assert_eq!(cookie.same_site(), Some(SameSite::None));
    assert_eq!(cookie.max_age(), Some(time::Duration::hours(24)));
}

#[test]
fn test_expired_cookie_overwrites_session() {
    let cookie = sessions().expired_cookie(SessionScope::Admin);

    assert_eq!(cookie.name(), "admin_token");
    assert_eq!(cookie.value(), "");
    assert_eq!(cookie.max_age(), Some(time::Duration::ZERO));
    assert_eq!(cookie.path(), Some("/"));
}

#[test]
fn test_insecure_cookies_fall_back_to_lax() {
    let sessions = SessionManager::new("s", Duration::hours(1), false);
    let cookie = sessions.session_cookie(SessionScope::User, "tok".into());

    assert_eq!(cookie.secure(), Some(false));
    assert_eq!(cookie.same_site(), Some(SameSite::Lax));
}

// --- Extractors ---

#[tokio::test]
async fn test_auth_user_extracts_live_user() {
    let ctx = TestContext::new();
    let user = ctx.seed_user("alice", "secret123").await;
    let mut parts = parts_with_cookie(Some(&ctx.user_cookie(user.id)));

    let auth = AuthUser::from_request_parts(&mut parts, &ctx.state)
        .await
        .unwrap();

    assert_eq!(auth.id, user.id);
    assert_eq!(auth.user.username, "alice");
}

#[tokio::test]
async fn test_auth_user_without_cookie_is_unauthenticated() {
    let ctx = TestContext::new();
    let mut parts = parts_with_cookie(None);

    let result = AuthUser::from_request_parts(&mut parts, &ctx.state).await;
    assert_eq!(result.err(), Some(AppError::Unauthenticated));
}

#[tokio::test]
async fn test_deleted_account_invalidates_unexpired_token() {
    let ctx = TestContext::new();
    let user = ctx.seed_user("ghost", "secret123").await;
    let cookie = ctx.user_cookie(user.id);

    ctx.repo.soft_delete_user(user.id);

    let mut parts = parts_with_cookie(Some(&cookie));
    let result = AuthUser::from_request_parts(&mut parts, &ctx.state).await;
    assert_eq!(result.err(), Some(AppError::Unauthenticated));
}

#[tokio::test]
async fn test_user_token_in_admin_cookie_is_rejected() {
    let ctx = TestContext::new();
    let user = ctx.seed_user("sneaky", "secret123").await;
    let token = ctx.state.sessions.issue(user.id, SessionScope::User).unwrap();
    let mut parts = parts_with_cookie(Some(&format!("admin_token={token}")));

    let result = AuthAdmin::from_request_parts(&mut parts, &ctx.state).await;
    assert_eq!(result.err(), Some(AppError::Unauthenticated));
}

#[tokio::test]
async fn test_admin_token_resolves_role() {
    let ctx = TestContext::new();
    let admin = ctx.seed_admin("root", AdminRole::SuperAdmin, "secret123").await;
    let mut parts = parts_with_cookie(Some(&ctx.admin_cookie(admin.id)));

    let auth = AuthAdmin::from_request_parts(&mut parts, &ctx.state)
        .await
        .unwrap();

    assert_eq!(auth.id, admin.id);
    assert_eq!(auth.role, AdminRole::SuperAdmin);

    // The same admin has no standing as a user.
    let mut parts = parts_with_cookie(Some(&ctx.admin_cookie(admin.id)));
    assert!(AuthUser::from_request_parts(&mut parts, &ctx.state).await.is_err());
}

#[tokio::test]
async fn test_maybe_auth_user_degrades_to_anonymous() {
    let ctx = TestContext::new();
    let user = ctx.seed_user("bob", "secret123").await;

    let mut parts = parts_with_cookie(Some("user_token=garbage"));
    let MaybeAuthUser(viewer) = MaybeAuthUser::from_request_parts(&mut parts, &ctx.state)
        .await
        .unwrap();
    assert!(viewer.is_none());

    let mut parts = parts_with_cookie(Some(&ctx.user_cookie(user.id)));
    let viewer = MaybeAuthUser::from_request_parts(&mut parts, &ctx.state)
        .await
        .unwrap();
    assert_eq!(viewer.id(), Some(user.id));
}
