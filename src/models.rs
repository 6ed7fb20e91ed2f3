use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use ts_rs::TS;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::error::AppError;

// --- Persisted Records ---

/// User
///
/// A registered author, stored in the `users` table. Soft-deleted rows
/// (`deleted_at` set) are invisible to every repository lookup.
#[derive(Debug, Clone, FromRow, Default)]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub surname: String,
    pub username: String,
    pub email: String,
    // argon2 PHC string; never serialized.
    pub password_hash: String,
    // Current media reference (at most one).
    pub profile_image: Option<String>,
    // Number of live blogs owned by this user.
    pub blog_count: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

/// AdminUser
///
/// A back-office principal stored in `admin_users`. Admin credentials live in a
/// separate collection and cookie scope from `User` credentials.
#[derive(Debug, Clone, FromRow, Default)]
pub struct AdminUser {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub password_hash: String,
    // 'admin' or 'super_admin'; see `AdminRole`.
    pub role: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl AdminUser {
    /// Unknown role strings degrade to the least privileged role.
    pub fn role(&self) -> AdminRole {
        self.role.parse().unwrap_or(AdminRole::Admin)
    }
}

/// AdminRole
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export)]
pub enum AdminRole {
    Admin,
    SuperAdmin,
}

impl AdminRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            AdminRole::Admin => "admin",
            AdminRole::SuperAdmin => "super_admin",
        }
    }
}

impl fmt::Display for AdminRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AdminRole {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "admin" => Ok(AdminRole::Admin),
            "super_admin" => Ok(AdminRole::SuperAdmin),
            other => Err(AppError::Validation(format!(
                "Role must be 'admin' or 'super_admin', got '{other}'"
            ))),
        }
    }
}

/// Blog
///
/// A blog post from the `blogs` table. `slug` is assigned once at creation and
/// never changes afterwards; `main_image` is the post's single media reference.
#[derive(Debug, Clone, FromRow, Default)]
pub struct Blog {
    pub id: Uuid,
    pub title: String,
    pub content: String,
    pub slug: String,
    pub summary: String,
    pub category: String,
    pub main_image: Option<String>,
    // Owner (FK to users.id).
    pub user_id: Uuid,
    // Hidden posts are only served to their owner.
    pub visibility: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

// --- Insert / Update Inputs (Repository boundary) ---

#[derive(Debug, Clone)]
pub struct NewUser {
    pub name: String,
    pub surname: String,
    pub username: String,
    pub email: String,
    pub password_hash: String,
}

#[derive(Debug, Clone)]
pub struct NewAdmin {
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub role: AdminRole,
}

#[derive(Debug, Clone)]
pub struct NewBlog {
    pub title: String,
    pub content: String,
    pub slug: String,
    pub summary: String,
    pub category: String,
    pub main_image: Option<String>,
    pub user_id: Uuid,
    pub visibility: bool,
}

/// Partial update of a blog's mutable fields. There is deliberately no slug here.
#[derive(Debug, Clone, Default)]
pub struct BlogChanges {
    pub title: Option<String>,
    pub content: Option<String>,
    pub summary: Option<String>,
    pub category: Option<String>,
    pub visibility: Option<bool>,
}

#[derive(Debug, Clone, Default)]
pub struct ProfileChanges {
    pub name: Option<String>,
    pub surname: Option<String>,
}

// --- Request Payloads ---

/// RegisterRequest
///
/// Input payload for POST /api/users/register.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, TS)]
#[ts(export)]
pub struct RegisterRequest {
    #[schema(example = "Alice")]
    pub name: String,
    #[schema(example = "Liddell")]
    pub surname: String,
    #[schema(example = "alice")]
    pub username: String,
    #[schema(example = "alice@x.com")]
    pub email: String,
    pub password: String,
}

/// LoginRequest
///
/// Input payload for both login endpoints. Either `username` or `email`
/// identifies the account.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, TS, Default)]
#[ts(export)]
pub struct LoginRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    pub password: String,
}

/// EditUserRequest
///
/// Partial profile update for PUT /api/users/edit.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, TS, Default)]
#[ts(export)]
pub struct EditUserRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub surname: Option<String>,
}

/// UpdateBlogRequest
///
/// Partial update for PATCH /api/blogs/{id}. The slug is not editable.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, TS, Default)]
#[ts(export)]
pub struct UpdateBlogRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub visibility: Option<bool>,
}

/// CreateAdminRequest
///
/// Input payload for POST /api/admin/users.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, TS)]
#[ts(export)]
pub struct CreateAdminRequest {
    pub username: String,
    pub email: String,
    pub password: String,
    pub role: AdminRole,
}

/// Text fields of the multipart body accepted by POST /api/blogs.
#[derive(Debug, Clone, Default)]
pub struct BlogForm {
    pub title: String,
    pub content: String,
    pub slug: String,
    pub summary: String,
    pub category: String,
    pub visibility: bool,
}

// --- Response Views ---

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, TS)]
#[ts(export)]
pub struct UserResponse {
    pub id: Uuid,
    pub name: String,
    pub surname: String,
    pub username: String,
    pub email: String,
    pub profile_image: Option<String>,
    pub blog_count: i32,
    #[ts(type = "string")]
    pub created_at: DateTime<Utc>,
    #[ts(type = "string")]
    pub updated_at: DateTime<Utc>,
}

impl From<User> for UserResponse {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            name: user.name,
            surname: user.surname,
            username: user.username,
            email: user.email,
            profile_image: user.profile_image,
            blog_count: user.blog_count,
            created_at: user.created_at,
            updated_at: user.updated_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, TS)]
#[ts(export)]
pub struct AdminUserResponse {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub role: AdminRole,
    #[ts(type = "string")]
    pub created_at: DateTime<Utc>,
    #[ts(type = "string")]
    pub updated_at: DateTime<Utc>,
}

impl From<AdminUser> for AdminUserResponse {
    fn from(admin: AdminUser) -> Self {
        Self {
            id: admin.id,
            role: admin.role(),
            username: admin.username,
            email: admin.email,
            created_at: admin.created_at,
            updated_at: admin.updated_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, TS)]
#[ts(export)]
pub struct BlogResponse {
    pub id: Uuid,
    pub title: String,
    pub content: String,
    pub slug: String,
    pub summary: String,
    pub category: String,
    pub main_image: Option<String>,
    pub user_id: Uuid,
    pub visibility: bool,
    #[ts(type = "string")]
    pub created_at: DateTime<Utc>,
    #[ts(type = "string")]
    pub updated_at: DateTime<Utc>,
}

impl From<Blog> for BlogResponse {
    fn from(blog: Blog) -> Self {
        Self {
            id: blog.id,
            title: blog.title,
            content: blog.content,
            slug: blog.slug,
            summary: blog.summary,
            category: blog.category,
            main_image: blog.main_image,
            user_id: blog.user_id,
            visibility: blog.visibility,
            created_at: blog.created_at,
            updated_at: blog.updated_at,
        }
    }
}

/// Body returned by user register/login.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, TS)]
#[ts(export)]
pub struct SessionResponse {
    pub message: String,
    pub user: UserResponse,
}

/// Body returned by admin login.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, TS)]
#[ts(export)]
pub struct AdminSessionResponse {
    pub message: String,
    pub admin: AdminUserResponse,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, TS)]
#[ts(export)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

// --- Validation ---

const MAX_NAME_LEN: usize = 64;
const MAX_TITLE_LEN: usize = 200;
const MIN_PASSWORD_LEN: usize = 6;
const MAX_PASSWORD_LEN: usize = 128;

fn require_text(value: &str, field: &str, max: usize) -> Result<(), AppError> {
    let trimmed = value.trim();
    if trimmed.is_empty() || trimmed.chars().count() > max {
        return Err(AppError::Validation(format!(
            "{field} must be 1-{max} characters"
        )));
    }
    Ok(())
}

fn require_email(email: &str) -> Result<(), AppError> {
    let email = email.trim();
    match email.split_once('@') {
        Some((local, domain)) if !local.is_empty() && !domain.is_empty() && !email.contains(' ') => {
            Ok(())
        }
        _ => Err(AppError::Validation("Email address is malformed".into())),
    }
}

fn require_password(password: &str) -> Result<(), AppError> {
    if password.len() < MIN_PASSWORD_LEN || password.len() > MAX_PASSWORD_LEN {
        return Err(AppError::Validation(format!(
            "Password must be {MIN_PASSWORD_LEN}-{MAX_PASSWORD_LEN} characters"
        )));
    }
    Ok(())
}

fn require_username(username: &str) -> Result<(), AppError> {
    require_text(username, "Username", MAX_NAME_LEN)?;
    if !username
        .trim()
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.' || c == '-')
    {
        return Err(AppError::Validation(
            "Username may contain only letters, digits, '.', '-' and '_'".into(),
        ));
    }
    Ok(())
}

pub fn validate_register_request(payload: &RegisterRequest) -> Result<(), AppError> {
    require_text(&payload.name, "Name", MAX_NAME_LEN)?;
    require_text(&payload.surname, "Surname", MAX_NAME_LEN)?;
    require_username(&payload.username)?;
    require_email(&payload.email)?;
    require_password(&payload.password)
}

/// Returns the login identifier (username or email), preferring a non-empty username.
pub fn validate_login_request(payload: &LoginRequest) -> Result<String, AppError> {
    if payload.password.is_empty() {
        return Err(AppError::Validation("Password must not be empty".into()));
    }
    [payload.username.as_deref(), payload.email.as_deref()]
        .into_iter()
        .flatten()
        .map(str::trim)
        .find(|candidate| !candidate.is_empty())
        .map(str::to_string)
        .ok_or_else(|| AppError::Validation("Username or email is required".into()))
}

pub fn validate_edit_user_request(payload: &EditUserRequest) -> Result<(), AppError> {
    if let Some(name) = &payload.name {
        require_text(name, "Name", MAX_NAME_LEN)?;
    }
    if let Some(surname) = &payload.surname {
        require_text(surname, "Surname", MAX_NAME_LEN)?;
    }
    Ok(())
}

pub fn validate_create_admin_request(payload: &CreateAdminRequest) -> Result<(), AppError> {
    require_username(&payload.username)?;
    require_email(&payload.email)?;
    require_password(&payload.password)
}

pub fn validate_blog_form(form: &BlogForm) -> Result<(), AppError> {
    require_text(&form.title, "Title", MAX_TITLE_LEN)?;
    if form.content.trim().is_empty() {
        return Err(AppError::Validation("Content must not be empty".into()));
    }
    Ok(())
}

pub fn validate_update_blog_request(payload: &UpdateBlogRequest) -> Result<(), AppError> {
    if let Some(title) = &payload.title {
        require_text(title, "Title", MAX_TITLE_LEN)?;
    }
    if let Some(content) = &payload.content {
        if content.trim().is_empty() {
            return Err(AppError::Validation("Content must not be empty".into()));
        }
    }
    Ok(())
}

/// Form booleans arrive as text; "true" and "1" are the only truthy spellings.
pub fn parse_form_bool(raw: &str) -> bool {
    matches!(raw.trim(), "true" | "1")
}
