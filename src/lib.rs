use axum::{
    Router,
    extract::{FromRef, Request},
    http::{HeaderName, HeaderValue, Method, header},
    middleware::{self, Next},
    response::Response,
};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use tower::ServiceBuilder;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::{DefaultOnResponse, TraceLayer},
};
use tracing::{Level, Span};

// --- Module Structure ---

// Core components.
pub mod auth;
pub mod authz;
pub mod config;
pub mod error;
pub mod extractors;
pub mod handlers;
pub mod media;
pub mod models;
pub mod password;
pub mod repository;
pub mod slug;

// Routers grouped by trust level (Public, Authenticated, Admin).
pub mod routes;
use auth::{AuthAdmin, AuthUser};
use routes::{admin, authenticated, public};

// --- Public Re-exports ---

pub use auth::SessionManager;
pub use config::AppConfig;
pub use error::AppError;
pub use media::{CloudinaryClient, MediaManager, MediaState, MockMediaHost};
pub use repository::{PostgresRepository, RepositoryState};

/// ApiDoc
///
/// OpenAPI document for every handler decorated with `#[utoipa::path]` and
/// every schema deriving `ToSchema`. Served at `/api-docs/openapi.json`.
#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::register_user, handlers::login_user, handlers::logout_user,
        handlers::list_users, handlers::get_user, handlers::get_me, handlers::edit_user,
        handlers::upload_profile_image, handlers::list_blogs, handlers::get_blog,
        handlers::create_blog, handlers::update_blog, handlers::delete_blog,
        handlers::upload_blog_image, handlers::admin_login, handlers::admin_logout,
        handlers::admin_me, handlers::list_admins, handlers::create_admin,
        handlers::admin_delete_blog
    ),
    components(
        schemas(
            models::RegisterRequest, models::LoginRequest, models::EditUserRequest,
            models::UpdateBlogRequest, models::CreateAdminRequest, models::UserResponse,
            models::AdminUserResponse, models::BlogResponse, models::SessionResponse,
            models::AdminSessionResponse, models::MessageResponse, models::AdminRole,
            error::ErrorBody,
        )
    ),
    tags(
        (name = "blog-backend", description = "Blog API")
    )
)]
pub struct ApiDoc;

/// AppState
///
/// Single shared container for the request-independent collaborators. Every
/// field is cheap to clone and safe for concurrent use.
#[derive(Clone)]
pub struct AppState {
    /// Persistence collaborator.
    pub repo: RepositoryState,
    /// Media lifecycle over the configured media host.
    pub media: MediaManager,
    /// Session credential issuing and validation.
    pub sessions: SessionManager,
    /// The loaded, immutable environment configuration.
    pub config: AppConfig,
}

impl AppState {
    /// Wires the collaborators together using the timeouts and secrets from `config`.
    pub fn new(repo: RepositoryState, media_host: MediaState, config: AppConfig) -> Self {
        let media = MediaManager::new(
            media_host,
            std::time::Duration::from_secs(config.upload_timeout_secs),
        );
        let sessions = SessionManager::from_config(&config);
        Self {
            repo,
            media,
            sessions,
            config,
        }
    }
}

// --- Axum FromRef Extractor Implementations ---

impl FromRef<AppState> for RepositoryState {
    fn from_ref(app_state: &AppState) -> RepositoryState {
        app_state.repo.clone()
    }
}

impl FromRef<AppState> for MediaManager {
    fn from_ref(app_state: &AppState) -> MediaManager {
        app_state.media.clone()
    }
}

impl FromRef<AppState> for SessionManager {
    fn from_ref(app_state: &AppState) -> SessionManager {
        app_state.sessions.clone()
    }
}

impl FromRef<AppState> for AppConfig {
    fn from_ref(app_state: &AppState) -> AppConfig {
        app_state.config.clone()
    }
}

/// auth_middleware
///
/// Gate for the user trust level. Extracting `AuthUser` validates the
/// `user_token` cookie and looks the user up; on failure the extractor
/// rejects with 401 before any handler runs. The resolved user is stored in
/// the request extensions so the handler's own `AuthUser` reuses it.
async fn auth_middleware(auth_user: AuthUser, mut request: Request, next: Next) -> Response {
    request.extensions_mut().insert(auth_user);
    next.run(request).await
}

/// admin_middleware
///
/// Gate for the admin trust level, on the separate `admin_token` cookie.
async fn admin_middleware(auth_admin: AuthAdmin, mut request: Request, next: Next) -> Response {
    request.extensions_mut().insert(auth_admin);
    next.run(request).await
}

/// cors_layer
///
/// Credentialed CORS for the configured frontend origins only. Requests from
/// any other origin get no `access-control-allow-origin` header, so browsers
/// refuse to expose the response.
fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .map(|origin| origin.trim())
        .filter(|origin| !origin.is_empty() && *origin != "*")
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(origin, "ignoring malformed CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::CONTENT_TYPE, header::ACCEPT])
        .allow_credentials(true)
}

/// create_router
///
/// Assembles all routers, applies the trust-level gates and the observability
/// layers, and registers the application state.
pub fn create_router(state: AppState) -> Router {
    let cors = cors_layer(&state.config.cors_allowed_origins);

    let x_request_id = HeaderName::from_static("x-request-id");

    let base_router = Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .merge(public::public_routes())
        .merge(
            authenticated::authenticated_routes().route_layer(middleware::from_fn_with_state(
                state.clone(),
                auth_middleware,
            )),
        )
        .merge(
            admin::admin_routes().route_layer(middleware::from_fn_with_state(
                state.clone(),
                admin_middleware,
            )),
        )
        .with_state(state);

    base_router
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::new(x_request_id.clone(), MakeRequestUuid))
                .layer(
                    TraceLayer::new_for_http()
                        .make_span_with(trace_span_logger)
                        .on_response(
                            DefaultOnResponse::new()
                                .level(Level::INFO)
                                .latency_unit(tower_http::LatencyUnit::Millis),
                        ),
                )
                .layer(PropagateRequestIdLayer::new(x_request_id)),
        )
        .layer(cors)
}

/// trace_span_logger
///
/// Span for `TraceLayer`, carrying method, URI and the `x-request-id` so every
/// log line of one request correlates.
fn trace_span_logger(request: &axum::http::Request<axum::body::Body>) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|value| value.to_str().ok())
        .unwrap_or("unknown");

    tracing::info_span!(
        "http_request",
        method = ?request.method(),
        uri = ?request.uri(),
        req_id = %request_id,
    )
}

/// bootstrap_super_admin
///
/// Seeds the configured super admin when no admin account exists yet, so a
/// fresh deployment has someone who can create the other admins. Returns the
/// created account, or `None` when admins already exist.
pub async fn bootstrap_super_admin(
    repo: &dyn repository::Repository,
    seed: &config::BootstrapAdmin,
) -> Result<Option<models::AdminUser>, AppError> {
    if repo.count_admins().await? > 0 {
        return Ok(None);
    }

    let admin = repo
        .create_admin(models::NewAdmin {
            username: seed.username.trim().to_string(),
            email: seed.email.trim().to_lowercase(),
            password_hash: password::hash_password(&seed.password)?,
            role: models::AdminRole::SuperAdmin,
        })
        .await?;

    tracing::info!(admin_id = %admin.id, username = %admin.username, "super admin bootstrapped");
    Ok(Some(admin))
}
