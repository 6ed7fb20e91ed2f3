use crate::{
    AppState,
    auth::{AuthAdmin, AuthUser, MaybeAuthUser, SessionScope},
    authz,
    error::{AppError, ErrorBody},
    extractors::{AppJson, AppMultipart, AppPath},
    media::{BLOG_FOLDER, BLOG_IMAGE_FOLDER, ImageUpload, PROFILE_IMAGE_FOLDER},
    models::{
        self, AdminSessionResponse, AdminUserResponse, BlogChanges, BlogForm, BlogResponse,
        CreateAdminRequest, EditUserRequest, LoginRequest, MessageResponse, NewAdmin, NewBlog,
        NewUser, ProfileChanges, RegisterRequest, SessionResponse, UpdateBlogRequest,
        UserResponse,
    },
    password, slug,
};
use axum::{
    Json,
    extract::{DefaultBodyLimit, Multipart, State, multipart::Field},
    http::StatusCode,
};
use axum_extra::extract::cookie::CookieJar;
use uuid::Uuid;

/// Body limit for routes accepting an image: the image itself plus room for
/// the accompanying text fields.
pub fn image_upload_body_limit() -> DefaultBodyLimit {
    DefaultBodyLimit::max(crate::media::MAX_IMAGE_BYTES + 1024 * 1024)
}

// --- Multipart helpers ---

async fn read_image(field: Field<'_>) -> Result<ImageUpload, AppError> {
    let file_name = field.file_name().map(str::to_string);
    let content_type = field
        .content_type()
        .map(str::to_string)
        .unwrap_or_default();
    let bytes = field
        .bytes()
        .await
        .map_err(|e| AppError::Validation(format!("Failed to read image: {e}")))?;

    Ok(ImageUpload {
        file_name,
        content_type,
        bytes,
    })
}

async fn read_text(field: Field<'_>, name: &str) -> Result<String, AppError> {
    field
        .text()
        .await
        .map_err(|e| AppError::Validation(format!("Failed to read {name}: {e}")))
}

/// Reads the single `image` field of an upload form.
async fn read_image_field(mut multipart: Multipart) -> Result<ImageUpload, AppError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::Validation(format!("Multipart error: {e}")))?
    {
        if field.name() == Some("image") {
            return read_image(field).await;
        }
    }
    Err(AppError::InvalidMedia("No image file provided".into()))
}

/// Reads the blog creation form: text fields plus an optional `image`.
async fn read_blog_form(
    mut multipart: Multipart,
) -> Result<(BlogForm, Option<ImageUpload>), AppError> {
    let mut form = BlogForm::default();
    let mut image = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::Validation(format!("Multipart error: {e}")))?
    {
        match field.name() {
            Some("title") => form.title = read_text(field, "title").await?,
            Some("content") => form.content = read_text(field, "content").await?,
            Some("slug") => form.slug = read_text(field, "slug").await?,
            Some("summary") => form.summary = read_text(field, "summary").await?,
            Some("category") => form.category = read_text(field, "category").await?,
            Some("visibility") => {
                form.visibility = models::parse_form_bool(&read_text(field, "visibility").await?)
            }
            Some("image") => image = Some(read_image(field).await?),
            _ => {} // Ignore unknown fields.
        }
    }

    Ok((form, image))
}

// --- User session handlers ---

/// register_user
///
/// [Public Route] Creates a user account and signs it in straight away by
/// setting the `user_token` cookie.
#[utoipa::path(
    post,
    path = "/api/users/register",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "User created", body = SessionResponse),
        (status = 400, description = "Validation error (VALIDATION_ERROR)", body = ErrorBody),
        (status = 409, description = "Username or email taken (CONFLICT)", body = ErrorBody),
    )
)]
pub async fn register_user(
    State(state): State<AppState>,
    jar: CookieJar,
    AppJson(payload): AppJson<RegisterRequest>,
) -> Result<(StatusCode, CookieJar, Json<SessionResponse>), AppError> {
    models::validate_register_request(&payload)?;

    let password_hash = password::hash_password(&payload.password)?;
    let user = state
        .repo
        .create_user(NewUser {
            name: payload.name.trim().to_string(),
            surname: payload.surname.trim().to_string(),
            username: payload.username.trim().to_string(),
            email: payload.email.trim().to_lowercase(),
            password_hash,
        })
        .await?;

    let token = state.sessions.issue(user.id, SessionScope::User)?;
    let jar = jar.add(state.sessions.session_cookie(SessionScope::User, token));

    tracing::info!(user_id = %user.id, "user registered");
    Ok((
        StatusCode::CREATED,
        jar,
        Json(SessionResponse {
            message: "User created successfully".into(),
            user: user.into(),
        }),
    ))
}

/// login_user
///
/// [Public Route] Signs a user in by username or email. Unknown identities and
/// wrong passwords are indistinguishable to the caller.
#[utoipa::path(
    post,
    path = "/api/users/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Signed in", body = SessionResponse),
        (status = 400, description = "Validation error (VALIDATION_ERROR)", body = ErrorBody),
        (status = 401, description = "Invalid credentials (INVALID_CREDENTIALS)", body = ErrorBody),
    )
)]
pub async fn login_user(
    State(state): State<AppState>,
    jar: CookieJar,
    AppJson(payload): AppJson<LoginRequest>,
) -> Result<(CookieJar, Json<SessionResponse>), AppError> {
    let identifier = models::validate_login_request(&payload)?;

    let user = state
        .repo
        .find_user_by_login(&identifier)
        .await?
        .ok_or(AppError::InvalidCredentials)?;

    if !password::verify_password(&payload.password, &user.password_hash) {
        tracing::debug!(user_id = %user.id, "wrong password");
        return Err(AppError::InvalidCredentials);
    }

    let token = state.sessions.issue(user.id, SessionScope::User)?;
    let jar = jar.add(state.sessions.session_cookie(SessionScope::User, token));

    Ok((
        jar,
        Json(SessionResponse {
            message: "Login successful".into(),
            user: user.into(),
        }),
    ))
}

/// logout_user
///
/// [Public Route] Overwrites `user_token` with an expired cookie.
#[utoipa::path(
    post,
    path = "/api/users/logout",
    responses((status = 200, description = "Signed out", body = MessageResponse))
)]
pub async fn logout_user(
    State(state): State<AppState>,
    jar: CookieJar,
) -> (CookieJar, Json<MessageResponse>) {
    let jar = jar.add(state.sessions.expired_cookie(SessionScope::User));
    (jar, Json(MessageResponse::new("Logged out successfully")))
}

// --- User profile handlers ---

/// list_users
///
/// [Public Route] Lists all live user accounts.
#[utoipa::path(
    get,
    path = "/api/users",
    responses((status = 200, description = "Users", body = [UserResponse]))
)]
pub async fn list_users(
    State(state): State<AppState>,
) -> Result<Json<Vec<UserResponse>>, AppError> {
    let users = state.repo.list_users().await?;
    Ok(Json(users.into_iter().map(UserResponse::from).collect()))
}

/// get_user
///
/// [Public Route] Retrieves one user by id.
#[utoipa::path(
    get,
    path = "/api/users/{id}",
    params(("id" = Uuid, Path, description = "User ID")),
    responses(
        (status = 200, description = "Found", body = UserResponse),
        (status = 404, description = "User not found (NOT_FOUND)", body = ErrorBody),
    )
)]
pub async fn get_user(
    State(state): State<AppState>,
    AppPath(id): AppPath<Uuid>,
) -> Result<Json<UserResponse>, AppError> {
    state
        .repo
        .get_user(id)
        .await?
        .map(|user| Json(user.into()))
        .ok_or_else(|| AppError::NotFound("User not found".into()))
}

/// get_me
///
/// [Authenticated Route] The signed-in user's own profile.
#[utoipa::path(
    get,
    path = "/api/users/me",
    responses(
        (status = 200, description = "Current user", body = UserResponse),
        (status = 401, description = "Not signed in (UNAUTHENTICATED)", body = ErrorBody),
    )
)]
pub async fn get_me(AuthUser { user, .. }: AuthUser) -> Json<UserResponse> {
    Json(user.into())
}

/// edit_user
///
/// [Authenticated Route] Updates the caller's name and/or surname. The target
/// is always the caller; there is no way to address another account here.
#[utoipa::path(
    put,
    path = "/api/users/edit",
    request_body = EditUserRequest,
    responses(
        (status = 200, description = "Updated", body = UserResponse),
        (status = 400, description = "Validation error (VALIDATION_ERROR)", body = ErrorBody),
        (status = 401, description = "Not signed in (UNAUTHENTICATED)", body = ErrorBody),
    )
)]
pub async fn edit_user(
    AuthUser { id, .. }: AuthUser,
    State(state): State<AppState>,
    AppJson(payload): AppJson<EditUserRequest>,
) -> Result<Json<UserResponse>, AppError> {
    models::validate_edit_user_request(&payload)?;

    let user = state
        .repo
        .update_user_profile(
            id,
            ProfileChanges {
                name: payload.name.map(|n| n.trim().to_string()),
                surname: payload.surname.map(|s| s.trim().to_string()),
            },
        )
        .await?;

    Ok(Json(user.into()))
}

/// upload_profile_image
///
/// [Authenticated Route] Sets or replaces the caller's profile image. The old
/// image is deleted from the media host only after the new URL is stored.
#[utoipa::path(
    post,
    path = "/api/users/profile-image",
    request_body(content_type = "multipart/form-data", description = "`image` file field"),
    responses(
        (status = 200, description = "Profile image updated", body = UserResponse),
        (status = 400, description = "Bad image (INVALID_MEDIA)", body = ErrorBody),
        (status = 401, description = "Not signed in (UNAUTHENTICATED)", body = ErrorBody),
        (status = 502, description = "Media host failure (UPLOAD_FAILED)", body = ErrorBody),
    )
)]
pub async fn upload_profile_image(
    AuthUser { id, user }: AuthUser,
    State(state): State<AppState>,
    AppMultipart(multipart): AppMultipart,
) -> Result<Json<UserResponse>, AppError> {
    let image = read_image_field(multipart).await?;
    let repo = state.repo.clone();

    let updated = state
        .media
        .replace(
            user.profile_image.as_deref(),
            &image,
            PROFILE_IMAGE_FOLDER,
            |url| async move { repo.set_profile_image(id, &url).await.map_err(AppError::from) },
        )
        .await?;

    Ok(Json(updated.into()))
}

// --- Blog handlers ---

/// list_blogs
///
/// [Public Route] Lists visible blogs. A signed-in viewer also sees their own
/// hidden posts.
#[utoipa::path(
    get,
    path = "/api/blogs",
    responses((status = 200, description = "Blogs", body = [BlogResponse]))
)]
pub async fn list_blogs(
    viewer: MaybeAuthUser,
    State(state): State<AppState>,
) -> Result<Json<Vec<BlogResponse>>, AppError> {
    let blogs = state.repo.list_blogs(viewer.id()).await?;
    Ok(Json(blogs.into_iter().map(BlogResponse::from).collect()))
}

/// get_blog
///
/// [Public Route] Retrieves a blog by id or by slug. Hidden posts are only
/// returned to their owner.
#[utoipa::path(
    get,
    path = "/api/blogs/{id}",
    params(("id" = String, Path, description = "Blog ID or slug")),
    responses(
        (status = 200, description = "Found", body = BlogResponse),
        (status = 401, description = "Hidden post, not signed in (UNAUTHENTICATED)", body = ErrorBody),
        (status = 403, description = "Hidden post of another user (FORBIDDEN)", body = ErrorBody),
        (status = 404, description = "Blog not found (NOT_FOUND)", body = ErrorBody),
    )
)]
pub async fn get_blog(
    viewer: MaybeAuthUser,
    State(state): State<AppState>,
    AppPath(id_or_slug): AppPath<String>,
) -> Result<Json<BlogResponse>, AppError> {
    let by_id = match Uuid::parse_str(&id_or_slug) {
        Ok(id) => state.repo.get_blog(id).await?,
        Err(_) => None,
    };
    let blog = match by_id {
        Some(blog) => blog,
        None => state
            .repo
            .get_blog_by_slug(&id_or_slug)
            .await?
            .ok_or_else(|| AppError::NotFound("Blog not found".into()))?,
    };

    authz::ensure_can_view_blog(&blog, viewer.id())?;
    Ok(Json(blog.into()))
}

/// create_blog
///
/// [Authenticated Route] Creates a blog from a multipart form. The `image`
/// field is required; the slug comes from `slug` or, when blank, the title,
/// and is made unique against live posts. If the insert fails the uploaded
/// image is removed again.
#[utoipa::path(
    post,
    path = "/api/blogs",
    request_body(
        content_type = "multipart/form-data",
        description = "`title`, `content`, `slug`, `summary`, `category`, `visibility`, `image`"
    ),
    responses(
        (status = 201, description = "Blog created", body = BlogResponse),
        (status = 400, description = "Validation error (VALIDATION_ERROR, INVALID_MEDIA)", body = ErrorBody),
        (status = 401, description = "Not signed in (UNAUTHENTICATED)", body = ErrorBody),
        (status = 409, description = "No free slug (CONFLICT)", body = ErrorBody),
        (status = 502, description = "Media host failure (UPLOAD_FAILED)", body = ErrorBody),
    )
)]
pub async fn create_blog(
    AuthUser { id: user_id, .. }: AuthUser,
    State(state): State<AppState>,
    AppMultipart(multipart): AppMultipart,
) -> Result<(StatusCode, Json<BlogResponse>), AppError> {
    let (form, image) = read_blog_form(multipart).await?;
    models::validate_blog_form(&form)?;
    let image = image.ok_or_else(|| AppError::InvalidMedia("Image is required".into()))?;

    let candidate = form.slug.clone();
    let draft = NewBlog {
        title: form.title.trim().to_string(),
        content: form.content,
        slug: String::new(),
        summary: form.summary.trim().to_string(),
        category: form.category.trim().to_string(),
        main_image: None,
        user_id,
        visibility: form.visibility,
    };
    let repo = state.repo.clone();

    let blog = state
        .media
        .replace(None, &image, BLOG_FOLDER, |url| async move {
            let draft = NewBlog {
                main_image: Some(url),
                ..draft
            };
            slug::create_blog_with_unique_slug(repo.as_ref(), &candidate, draft).await
        })
        .await?;

    tracing::info!(blog_id = %blog.id, slug = %blog.slug, %user_id, "blog created");
    Ok((StatusCode::CREATED, Json(blog.into())))
}

/// update_blog
///
/// [Authenticated Route] Edits the text fields and visibility of an owned blog.
/// The slug never changes after creation.
#[utoipa::path(
    patch,
    path = "/api/blogs/{id}",
    params(("id" = Uuid, Path, description = "Blog ID")),
    request_body = UpdateBlogRequest,
    responses(
        (status = 200, description = "Updated", body = BlogResponse),
        (status = 401, description = "Not signed in (UNAUTHENTICATED)", body = ErrorBody),
        (status = 403, description = "Not the owner (FORBIDDEN)", body = ErrorBody),
        (status = 404, description = "Blog not found (NOT_FOUND)", body = ErrorBody),
    )
)]
pub async fn update_blog(
    AuthUser { id: user_id, .. }: AuthUser,
    State(state): State<AppState>,
    AppPath(id): AppPath<Uuid>,
    AppJson(payload): AppJson<UpdateBlogRequest>,
) -> Result<Json<BlogResponse>, AppError> {
    models::validate_update_blog_request(&payload)?;
    authz::load_owned_blog(state.repo.as_ref(), id, user_id).await?;

    let blog = state
        .repo
        .update_blog(
            id,
            BlogChanges {
                title: payload.title.map(|t| t.trim().to_string()),
                content: payload.content,
                summary: payload.summary.map(|s| s.trim().to_string()),
                category: payload.category.map(|c| c.trim().to_string()),
                visibility: payload.visibility,
            },
        )
        .await?;

    Ok(Json(blog.into()))
}

/// delete_blog
///
/// [Authenticated Route] Soft-deletes an owned blog and decrements the owner's
/// blog count in the same transaction.
#[utoipa::path(
    delete,
    path = "/api/blogs/{id}",
    params(("id" = Uuid, Path, description = "Blog ID")),
    responses(
        (status = 200, description = "Deleted", body = MessageResponse),
        (status = 401, description = "Not signed in (UNAUTHENTICATED)", body = ErrorBody),
        (status = 403, description = "Not the owner (FORBIDDEN)", body = ErrorBody),
        (status = 404, description = "Blog not found (NOT_FOUND)", body = ErrorBody),
    )
)]
pub async fn delete_blog(
    AuthUser { id: user_id, .. }: AuthUser,
    State(state): State<AppState>,
    AppPath(id): AppPath<Uuid>,
) -> Result<Json<MessageResponse>, AppError> {
    authz::load_owned_blog(state.repo.as_ref(), id, user_id).await?;
    state.repo.delete_blog(id).await?;

    tracing::info!(blog_id = %id, %user_id, "blog deleted");
    Ok(Json(MessageResponse::new("Blog deleted successfully")))
}

/// upload_blog_image
///
/// [Authenticated Route] Replaces the main image of an owned blog.
#[utoipa::path(
    post,
    path = "/api/blogs/{id}/main-image",
    params(("id" = Uuid, Path, description = "Blog ID")),
    request_body(content_type = "multipart/form-data", description = "`image` file field"),
    responses(
        (status = 200, description = "Image replaced", body = BlogResponse),
        (status = 400, description = "Bad image (INVALID_MEDIA)", body = ErrorBody),
        (status = 401, description = "Not signed in (UNAUTHENTICATED)", body = ErrorBody),
        (status = 403, description = "Not the owner (FORBIDDEN)", body = ErrorBody),
        (status = 404, description = "Blog not found (NOT_FOUND)", body = ErrorBody),
        (status = 502, description = "Media host failure (UPLOAD_FAILED)", body = ErrorBody),
    )
)]
pub async fn upload_blog_image(
    AuthUser { id: user_id, .. }: AuthUser,
    State(state): State<AppState>,
    AppPath(id): AppPath<Uuid>,
    AppMultipart(multipart): AppMultipart,
) -> Result<Json<BlogResponse>, AppError> {
    let blog = authz::load_owned_blog(state.repo.as_ref(), id, user_id).await?;
    let image = read_image_field(multipart).await?;
    let repo = state.repo.clone();

    let updated = state
        .media
        .replace(
            blog.main_image.as_deref(),
            &image,
            BLOG_IMAGE_FOLDER,
            |url| async move { repo.set_blog_image(id, &url).await.map_err(AppError::from) },
        )
        .await?;

    Ok(Json(updated.into()))
}

// --- Admin handlers ---

/// admin_login
///
/// [Public Route] Signs an admin in on the separate `admin_token` cookie.
#[utoipa::path(
    post,
    path = "/api/admin/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Signed in", body = AdminSessionResponse),
        (status = 401, description = "Invalid credentials (INVALID_CREDENTIALS)", body = ErrorBody),
    )
)]
pub async fn admin_login(
    State(state): State<AppState>,
    jar: CookieJar,
    AppJson(payload): AppJson<LoginRequest>,
) -> Result<(CookieJar, Json<AdminSessionResponse>), AppError> {
    let identifier = models::validate_login_request(&payload)?;

    let admin = state
        .repo
        .find_admin_by_login(&identifier)
        .await?
        .ok_or(AppError::InvalidCredentials)?;

    if !password::verify_password(&payload.password, &admin.password_hash) {
        tracing::warn!(admin_id = %admin.id, "admin login with wrong password");
        return Err(AppError::InvalidCredentials);
    }

    let token = state.sessions.issue(admin.id, SessionScope::Admin)?;
    let jar = jar.add(state.sessions.session_cookie(SessionScope::Admin, token));

    Ok((
        jar,
        Json(AdminSessionResponse {
            message: "Login successful".into(),
            admin: admin.into(),
        }),
    ))
}

/// admin_logout
///
/// [Public Route] Overwrites `admin_token` with an expired cookie.
#[utoipa::path(
    post,
    path = "/api/admin/logout",
    responses((status = 200, description = "Signed out", body = MessageResponse))
)]
pub async fn admin_logout(
    State(state): State<AppState>,
    jar: CookieJar,
) -> (CookieJar, Json<MessageResponse>) {
    let jar = jar.add(state.sessions.expired_cookie(SessionScope::Admin));
    (jar, Json(MessageResponse::new("Logged out successfully")))
}

/// admin_me
///
/// [Admin Route] The signed-in admin's own account.
#[utoipa::path(
    get,
    path = "/api/admin/me",
    responses(
        (status = 200, description = "Current admin", body = AdminUserResponse),
        (status = 401, description = "Not signed in as admin (UNAUTHENTICATED)", body = ErrorBody),
    )
)]
pub async fn admin_me(
    AuthAdmin { id, .. }: AuthAdmin,
    State(state): State<AppState>,
) -> Result<Json<AdminUserResponse>, AppError> {
    state
        .repo
        .get_admin(id)
        .await?
        .map(|admin| Json(admin.into()))
        .ok_or(AppError::Unauthenticated)
}

/// list_admins
///
/// [Admin Route] Lists all admin accounts.
#[utoipa::path(
    get,
    path = "/api/admin/users",
    responses((status = 200, description = "Admins", body = [AdminUserResponse]))
)]
pub async fn list_admins(
    _admin: AuthAdmin,
    State(state): State<AppState>,
) -> Result<Json<Vec<AdminUserResponse>>, AppError> {
    let admins = state.repo.list_admins().await?;
    Ok(Json(admins.into_iter().map(AdminUserResponse::from).collect()))
}

/// create_admin
///
/// [Admin Route] Creates another admin account. Granting `super_admin`
/// requires the caller to be a `super_admin`.
#[utoipa::path(
    post,
    path = "/api/admin/users",
    request_body = CreateAdminRequest,
    responses(
        (status = 201, description = "Admin created", body = AdminUserResponse),
        (status = 400, description = "Validation error (VALIDATION_ERROR)", body = ErrorBody),
        (status = 403, description = "Role not grantable (FORBIDDEN)", body = ErrorBody),
        (status = 409, description = "Username or email taken (CONFLICT)", body = ErrorBody),
    )
)]
pub async fn create_admin(
    AuthAdmin { id: actor_id, role, .. }: AuthAdmin,
    State(state): State<AppState>,
    AppJson(payload): AppJson<CreateAdminRequest>,
) -> Result<(StatusCode, Json<AdminUserResponse>), AppError> {
    models::validate_create_admin_request(&payload)?;
    authz::ensure_can_grant(role, payload.role)?;

    let password_hash = password::hash_password(&payload.password)?;
    let admin = state
        .repo
        .create_admin(NewAdmin {
            username: payload.username.trim().to_string(),
            email: payload.email.trim().to_lowercase(),
            password_hash,
            role: payload.role,
        })
        .await?;

    tracing::info!(admin_id = %admin.id, %actor_id, role = %payload.role, "admin created");
    Ok((StatusCode::CREATED, Json(admin.into())))
}

/// admin_delete_blog
///
/// [Admin Route] Soft-deletes any blog regardless of owner.
#[utoipa::path(
    delete,
    path = "/api/admin/blogs/{id}",
    params(("id" = Uuid, Path, description = "Blog ID")),
    responses(
        (status = 200, description = "Deleted", body = MessageResponse),
        (status = 401, description = "Not signed in as admin (UNAUTHENTICATED)", body = ErrorBody),
        (status = 404, description = "Blog not found (NOT_FOUND)", body = ErrorBody),
    )
)]
pub async fn admin_delete_blog(
    AuthAdmin { id: admin_id, .. }: AuthAdmin,
    State(state): State<AppState>,
    AppPath(id): AppPath<Uuid>,
) -> Result<Json<MessageResponse>, AppError> {
    state
        .repo
        .get_blog(id)
        .await?
        .ok_or_else(|| AppError::NotFound("Blog not found".into()))?;
    state.repo.delete_blog(id).await?;

    tracing::warn!(blog_id = %id, %admin_id, "blog force-deleted by admin");
    Ok(Json(MessageResponse::new("Blog deleted successfully")))
}
