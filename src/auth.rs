use axum::{
    extract::{FromRef, FromRequestParts},
    http::request::Parts,
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{
    Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode, errors::ErrorKind,
};
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{
    config::AppConfig,
    error::AppError,
    models::{AdminRole, AdminUser, User},
    repository::RepositoryState,
};

/// Cookie carrying a user session.
pub const USER_COOKIE: &str = "user_token";
/// Cookie carrying an admin session. Never interchangeable with `USER_COOKIE`.
pub const ADMIN_COOKIE: &str = "admin_token";

/// SessionScope
///
/// The two credential spaces. Each has its own cookie, its own JWT audience
/// and its own principal collection; a token issued for one scope never
/// validates in the other.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionScope {
    User,
    Admin,
}

impl SessionScope {
    pub fn cookie_name(&self) -> &'static str {
        match self {
            SessionScope::User => USER_COOKIE,
            SessionScope::Admin => ADMIN_COOKIE,
        }
    }

    pub fn audience(&self) -> &'static str {
        match self {
            SessionScope::User => "user",
            SessionScope::Admin => "admin",
        }
    }
}

/// Claims
///
/// Payload of a session token: the principal id, the scope it was issued for,
/// and the absolute expiry. There is no server-side session record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Claims {
    /// Principal identifier (users.id or admin_users.id).
    pub sub: Uuid,
    /// Scope audience: "user" or "admin".
    pub aud: String,
    /// Issued at (unix seconds).
    pub iat: i64,
    /// Expiry (unix seconds). Checked with zero leeway.
    pub exp: i64,
}

/// SessionManager
///
/// Issues and validates HS256-signed session tokens and builds the cookies
/// that carry them. Stateless: validity is decided by signature and expiry
/// alone; the extractors below add the principal lookup.
#[derive(Clone)]
pub struct SessionManager {
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl: Duration,
    secure_cookies: bool,
}

impl SessionManager {
    pub fn new(secret: &str, ttl: Duration, secure_cookies: bool) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            ttl,
            secure_cookies,
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(
            &config.jwt_secret,
            Duration::hours(config.session_ttl_hours),
            config.cookie_secure,
        )
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Issues a token for `principal_id` in `scope`, valid for the configured window.
    pub fn issue(&self, principal_id: Uuid, scope: SessionScope) -> Result<String, AppError> {
        self.issue_at(principal_id, scope, Utc::now())
    }

    /// Same as `issue`, with an explicit issuance instant.
    pub fn issue_at(
        &self,
        principal_id: Uuid,
        scope: SessionScope,
        issued_at: DateTime<Utc>,
    ) -> Result<String, AppError> {
        let claims = Claims {
            sub: principal_id,
            aud: scope.audience().to_string(),
            iat: issued_at.timestamp(),
            exp: (issued_at + self.ttl).timestamp(),
        };

        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|e| AppError::Internal(format!("JWT sign error: {e}")))
    }

    /// validate
    ///
    /// Verifies signature, audience and expiry. Any failure is `Unauthenticated`;
    /// the precise reason is only logged.
    pub fn validate(&self, token: &str, scope: SessionScope) -> Result<Claims, AppError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = true;
        validation.leeway = 0;
        validation.set_audience(&[scope.audience()]);
        validation.set_required_spec_claims(&["exp", "aud", "sub"]);

        let data = decode::<Claims>(token, &self.decoding, &validation).map_err(|e| {
            match e.kind() {
                ErrorKind::ExpiredSignature => tracing::debug!("session token expired"),
                ErrorKind::InvalidAudience => {
                    tracing::debug!(scope = scope.audience(), "session token presented in the wrong scope")
                }
                other => tracing::debug!("session token rejected: {:?}", other),
            }
            AppError::Unauthenticated
        })?;

        // `exp == now` is already past: the window is half-open.
        if data.claims.exp <= Utc::now().timestamp() {
            return Err(AppError::Unauthenticated);
        }

        Ok(data.claims)
    }

    /// HTTP-only cookie scoped to the whole site, carrying `token`.
    pub fn session_cookie(&self, scope: SessionScope, token: String) -> Cookie<'static> {
        Cookie::build((scope.cookie_name(), token))
            .http_only(true)
            .secure(self.secure_cookies)
            .same_site(self.same_site())
            .path("/")
            .max_age(time::Duration::seconds(self.ttl.num_seconds()))
            .build()
    }

    /// Overwrite cookie that makes the client drop its session. The signed token
    /// itself stays valid until its own expiry if replayed.
    pub fn expired_cookie(&self, scope: SessionScope) -> Cookie<'static> {
        Cookie::build((scope.cookie_name(), ""))
            .http_only(true)
            .secure(self.secure_cookies)
            .same_site(self.same_site())
            .path("/")
            .max_age(time::Duration::ZERO)
            .expires(OffsetDateTime::UNIX_EPOCH)
            .build()
    }

    fn same_site(&self) -> SameSite {
        // Browsers drop SameSite=None cookies that are not Secure.
        if self.secure_cookies {
            SameSite::None
        } else {
            SameSite::Lax
        }
    }

    /// Validates a user-scope token and resolves it to a live user.
    pub async fn resolve_user(
        &self,
        repo: &RepositoryState,
        token: &str,
    ) -> Result<User, AppError> {
        let claims = self.validate(token, SessionScope::User)?;
        repo.get_user(claims.sub)
            .await?
            .ok_or(AppError::Unauthenticated)
    }

    /// Validates an admin-scope token and resolves it to a live admin.
    pub async fn resolve_admin(
        &self,
        repo: &RepositoryState,
        token: &str,
    ) -> Result<AdminUser, AppError> {
        let claims = self.validate(token, SessionScope::Admin)?;
        repo.get_admin(claims.sub)
            .await?
            .ok_or(AppError::Unauthenticated)
    }
}

fn cookie_token(parts: &Parts, scope: SessionScope) -> Option<String> {
    CookieJar::from_headers(&parts.headers)
        .get(scope.cookie_name())
        .map(|cookie| cookie.value().to_string())
        .filter(|value| !value.is_empty())
}

/// AuthUser
///
/// The resolved user behind a valid `user_token` cookie. Using it as a handler
/// argument makes the route require the user trust level.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub id: Uuid,
    pub user: User,
}

/// The extraction runs once per protected request:
/// 1. Reuse the user already resolved by `auth_middleware`, if any.
/// 2. Otherwise read `user_token` from the cookie jar.
/// 3. Verify signature, audience and expiry.
/// 4. Look the user up; a deleted account invalidates still-unexpired tokens.
///
/// Rejection: `AppError::Unauthenticated` (401).
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
    RepositoryState: FromRef<S>,
    SessionManager: FromRef<S>,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        if let Some(resolved) = parts.extensions.get::<AuthUser>() {
            return Ok(resolved.clone());
        }

        let repo = RepositoryState::from_ref(state);
        let sessions = SessionManager::from_ref(state);

        let token = cookie_token(parts, SessionScope::User).ok_or(AppError::Unauthenticated)?;
        let user = sessions.resolve_user(&repo, &token).await?;

        Ok(AuthUser { id: user.id, user })
    }
}

/// MaybeAuthUser
///
/// For anonymous routes that show more to a signed-in viewer. Anonymous
/// requests, and requests whose credential does not resolve, both extract as
/// `None` instead of being rejected.
#[derive(Debug, Clone)]
pub struct MaybeAuthUser(pub Option<AuthUser>);

impl MaybeAuthUser {
    pub fn id(&self) -> Option<Uuid> {
        self.0.as_ref().map(|auth| auth.id)
    }
}

impl<S> FromRequestParts<S> for MaybeAuthUser
where
    S: Send + Sync,
    RepositoryState: FromRef<S>,
    SessionManager: FromRef<S>,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        Ok(MaybeAuthUser(
            AuthUser::from_request_parts(parts, state).await.ok(),
        ))
    }
}

/// AuthAdmin
///
/// The resolved admin behind a valid `admin_token` cookie.
#[derive(Debug, Clone)]
pub struct AuthAdmin {
    pub id: Uuid,
    pub username: String,
    pub role: AdminRole,
}

impl<S> FromRequestParts<S> for AuthAdmin
where
    S: Send + Sync,
    RepositoryState: FromRef<S>,
    SessionManager: FromRef<S>,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        if let Some(resolved) = parts.extensions.get::<AuthAdmin>() {
            return Ok(resolved.clone());
        }

        let repo = RepositoryState::from_ref(state);
        let sessions = SessionManager::from_ref(state);

        let token = cookie_token(parts, SessionScope::Admin).ok_or(AppError::Unauthenticated)?;
        let admin = sessions.resolve_admin(&repo, &token).await?;

        Ok(AuthAdmin {
            id: admin.id,
            role: admin.role(),
            username: admin.username,
        })
    }
}
