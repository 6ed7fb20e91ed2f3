use crate::models::{
    AdminUser, Blog, BlogChanges, NewAdmin, NewBlog, NewUser, ProfileChanges, User,
};
use async_trait::async_trait;
use sqlx::PgPool;
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

/// RepoError
///
/// Failures surfaced by the persistence collaborator. `Conflict` is the
/// distinguishable "already exists" signal raised by a uniqueness constraint
/// and carries the offending field (`email`, `username`, `slug`).
#[derive(Debug, Error, Clone, PartialEq)]
pub enum RepoError {
    #[error("record not found")]
    NotFound,
    #[error("{0} already exists")]
    Conflict(String),
    #[error("database error: {0}")]
    Database(String),
}

impl From<sqlx::Error> for RepoError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::RowNotFound => RepoError::NotFound,
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                RepoError::Conflict(conflicting_field(db.constraint()))
            }
            _ => RepoError::Database(err.to_string()),
        }
    }
}

/// Maps a unique index name from the migrations back to the field it guards.
fn conflicting_field(constraint: Option<&str>) -> String {
    let constraint = constraint.unwrap_or_default();
    ["email", "username", "slug"]
        .into_iter()
        .find(|field| constraint.contains(field))
        .unwrap_or("record")
        .to_string()
}

/// Repository Trait
///
/// The persistence collaborator. Every lookup excludes soft-deleted rows.
/// Uniqueness on email/username (per collection) and on the slug of live
/// blogs is enforced by the store itself and reported as `RepoError::Conflict`.
#[async_trait]
pub trait Repository: Send + Sync {
    // --- Users ---
    async fn create_user(&self, user: NewUser) -> Result<User, RepoError>;
    async fn get_user(&self, id: Uuid) -> Result<Option<User>, RepoError>;
    // Matches either the username or the email (case-insensitively).
    async fn find_user_by_login(&self, identifier: &str) -> Result<Option<User>, RepoError>;
    async fn list_users(&self) -> Result<Vec<User>, RepoError>;
    async fn update_user_profile(
        &self,
        id: Uuid,
        changes: ProfileChanges,
    ) -> Result<User, RepoError>;
    async fn set_profile_image(&self, id: Uuid, url: &str) -> Result<User, RepoError>;

    // --- Admin users ---
    async fn create_admin(&self, admin: NewAdmin) -> Result<AdminUser, RepoError>;
    async fn get_admin(&self, id: Uuid) -> Result<Option<AdminUser>, RepoError>;
    async fn find_admin_by_login(&self, identifier: &str)
    -> Result<Option<AdminUser>, RepoError>;
    async fn list_admins(&self) -> Result<Vec<AdminUser>, RepoError>;
    async fn count_admins(&self) -> Result<i64, RepoError>;

    // --- Blogs ---
    // Live slugs equal to `base` or of the form `base-<digits>`.
    async fn slugs_with_base(&self, base: &str) -> Result<Vec<String>, RepoError>;
    // Inserts the blog and increments the owner's blog_count atomically.
    async fn create_blog(&self, blog: NewBlog) -> Result<Blog, RepoError>;
    async fn get_blog(&self, id: Uuid) -> Result<Option<Blog>, RepoError>;
    async fn get_blog_by_slug(&self, slug: &str) -> Result<Option<Blog>, RepoError>;
    // Visible blogs, plus the hidden ones owned by `viewer`.
    async fn list_blogs(&self, viewer: Option<Uuid>) -> Result<Vec<Blog>, RepoError>;
    async fn update_blog(&self, id: Uuid, changes: BlogChanges) -> Result<Blog, RepoError>;
    async fn set_blog_image(&self, id: Uuid, url: &str) -> Result<Blog, RepoError>;
    // Soft-deletes the blog and decrements the owner's blog_count atomically.
    async fn delete_blog(&self, id: Uuid) -> Result<(), RepoError>;
}

/// RepositoryState
///
/// The concrete type used to share the persistence layer across the application state.
pub type RepositoryState = Arc<dyn Repository>;

const USER_COLUMNS: &str = "id, name, surname, username, email, password_hash, profile_image, \
     blog_count, created_at, updated_at, deleted_at";
const ADMIN_COLUMNS: &str =
    "id, username, email, password_hash, role, created_at, updated_at, deleted_at";
const BLOG_COLUMNS: &str = "id, title, content, slug, summary, category, main_image, user_id, \
     visibility, created_at, updated_at, deleted_at";

/// PostgresRepository
///
/// `Repository` backed by PostgreSQL through a shared `PgPool`.
pub struct PostgresRepository {
    pool: PgPool,
}

impl PostgresRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl Repository for PostgresRepository {
    async fn create_user(&self, user: NewUser) -> Result<User, RepoError> {
        let sql = format!(
            "INSERT INTO users (id, name, surname, username, email, password_hash) \
             VALUES ($1, $2, $3, $4, $5, $6) RETURNING {USER_COLUMNS}"
        );
        sqlx::query_as::<_, User>(&sql)
            .bind(Uuid::new_v4())
            .bind(user.name)
            .bind(user.surname)
            .bind(user.username)
            .bind(user.email)
            .bind(user.password_hash)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| {
                tracing::debug!("create_user rejected: {:?}", e);
                RepoError::from(e)
            })
    }

    async fn get_user(&self, id: Uuid) -> Result<Option<User>, RepoError> {
        let sql =
            format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1 AND deleted_at IS NULL");
        Ok(sqlx::query_as::<_, User>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn find_user_by_login(&self, identifier: &str) -> Result<Option<User>, RepoError> {
        let sql = format!(
            "SELECT {USER_COLUMNS} FROM users \
             WHERE (username = $1 OR lower(email) = lower($1)) AND deleted_at IS NULL LIMIT 1"
        );
        Ok(sqlx::query_as::<_, User>(&sql)
            .bind(identifier)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn list_users(&self) -> Result<Vec<User>, RepoError> {
        let sql = format!(
            "SELECT {USER_COLUMNS} FROM users WHERE deleted_at IS NULL ORDER BY created_at DESC"
        );
        Ok(sqlx::query_as::<_, User>(&sql).fetch_all(&self.pool).await?)
    }

    /// Uses `COALESCE` so only the provided fields are written.
    async fn update_user_profile(
        &self,
        id: Uuid,
        changes: ProfileChanges,
    ) -> Result<User, RepoError> {
        let sql = format!(
            "UPDATE users SET name = COALESCE($2, name), surname = COALESCE($3, surname), \
             updated_at = NOW() WHERE id = $1 AND deleted_at IS NULL RETURNING {USER_COLUMNS}"
        );
        sqlx::query_as::<_, User>(&sql)
            .bind(id)
            .bind(changes.name)
            .bind(changes.surname)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(RepoError::NotFound)
    }

    async fn set_profile_image(&self, id: Uuid, url: &str) -> Result<User, RepoError> {
        let sql = format!(
            "UPDATE users SET profile_image = $2, updated_at = NOW() \
             WHERE id = $1 AND deleted_at IS NULL RETURNING {USER_COLUMNS}"
        );
        sqlx::query_as::<_, User>(&sql)
            .bind(id)
            .bind(url)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(RepoError::NotFound)
    }

    async fn create_admin(&self, admin: NewAdmin) -> Result<AdminUser, RepoError> {
        let sql = format!(
            "INSERT INTO admin_users (id, username, email, password_hash, role) \
             VALUES ($1, $2, $3, $4, $5) RETURNING {ADMIN_COLUMNS}"
        );
        Ok(sqlx::query_as::<_, AdminUser>(&sql)
            .bind(Uuid::new_v4())
            .bind(admin.username)
            .bind(admin.email)
            .bind(admin.password_hash)
            .bind(admin.role.as_str())
            .fetch_one(&self.pool)
            .await?)
    }

    async fn get_admin(&self, id: Uuid) -> Result<Option<AdminUser>, RepoError> {
        let sql = format!(
            "SELECT {ADMIN_COLUMNS} FROM admin_users WHERE id = $1 AND deleted_at IS NULL"
        );
        Ok(sqlx::query_as::<_, AdminUser>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn find_admin_by_login(
        &self,
        identifier: &str,
    ) -> Result<Option<AdminUser>, RepoError> {
        let sql = format!(
            "SELECT {ADMIN_COLUMNS} FROM admin_users \
             WHERE (username = $1 OR lower(email) = lower($1)) AND deleted_at IS NULL LIMIT 1"
        );
        Ok(sqlx::query_as::<_, AdminUser>(&sql)
            .bind(identifier)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn list_admins(&self) -> Result<Vec<AdminUser>, RepoError> {
        let sql = format!(
            "SELECT {ADMIN_COLUMNS} FROM admin_users WHERE deleted_at IS NULL ORDER BY created_at"
        );
        Ok(sqlx::query_as::<_, AdminUser>(&sql)
            .fetch_all(&self.pool)
            .await?)
    }

    async fn count_admins(&self) -> Result<i64, RepoError> {
        Ok(
            sqlx::query_scalar::<_, i64>(
                "SELECT COUNT(*) FROM admin_users WHERE deleted_at IS NULL",
            )
            .fetch_one(&self.pool)
            .await?,
        )
    }

    async fn slugs_with_base(&self, base: &str) -> Result<Vec<String>, RepoError> {
        Ok(sqlx::query_scalar::<_, String>(
            "SELECT slug FROM blogs WHERE deleted_at IS NULL AND (slug = $1 OR \
             (left(slug, length($1) + 1) = ($1 || '-') AND substr(slug, length($1) + 2) ~ '^[0-9]+$'))",
        )
        .bind(base)
        .fetch_all(&self.pool)
        .await?)
    }

    /// Runs the insert and the owner's counter increment in one transaction, so a
    /// slug conflict on insert leaves the counter untouched.
    async fn create_blog(&self, blog: NewBlog) -> Result<Blog, RepoError> {
        let mut tx = self.pool.begin().await?;

        let sql = format!(
            "INSERT INTO blogs (id, title, content, slug, summary, category, main_image, user_id, visibility) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9) RETURNING {BLOG_COLUMNS}"
        );
        let created = sqlx::query_as::<_, Blog>(&sql)
            .bind(Uuid::new_v4())
            .bind(blog.title)
            .bind(blog.content)
            .bind(blog.slug)
            .bind(blog.summary)
            .bind(blog.category)
            .bind(blog.main_image)
            .bind(blog.user_id)
            .bind(blog.visibility)
            .fetch_one(&mut *tx)
            .await?;

        sqlx::query("UPDATE users SET blog_count = blog_count + 1 WHERE id = $1")
            .bind(created.user_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(created)
    }

    async fn get_blog(&self, id: Uuid) -> Result<Option<Blog>, RepoError> {
        let sql =
            format!("SELECT {BLOG_COLUMNS} FROM blogs WHERE id = $1 AND deleted_at IS NULL");
        Ok(sqlx::query_as::<_, Blog>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn get_blog_by_slug(&self, slug: &str) -> Result<Option<Blog>, RepoError> {
        let sql =
            format!("SELECT {BLOG_COLUMNS} FROM blogs WHERE slug = $1 AND deleted_at IS NULL");
        Ok(sqlx::query_as::<_, Blog>(&sql)
            .bind(slug)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn list_blogs(&self, viewer: Option<Uuid>) -> Result<Vec<Blog>, RepoError> {
        let sql = format!(
            "SELECT {BLOG_COLUMNS} FROM blogs \
             WHERE deleted_at IS NULL AND (visibility = true OR user_id = $1) \
             ORDER BY created_at DESC"
        );
        Ok(sqlx::query_as::<_, Blog>(&sql)
            .bind(viewer)
            .fetch_all(&self.pool)
            .await?)
    }

    async fn update_blog(&self, id: Uuid, changes: BlogChanges) -> Result<Blog, RepoError> {
        let sql = format!(
            "UPDATE blogs SET title = COALESCE($2, title), content = COALESCE($3, content), \
             summary = COALESCE($4, summary), category = COALESCE($5, category), \
             visibility = COALESCE($6, visibility), updated_at = NOW() \
             WHERE id = $1 AND deleted_at IS NULL RETURNING {BLOG_COLUMNS}"
        );
        sqlx::query_as::<_, Blog>(&sql)
            .bind(id)
            .bind(changes.title)
            .bind(changes.content)
            .bind(changes.summary)
            .bind(changes.category)
            .bind(changes.visibility)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(RepoError::NotFound)
    }

    async fn set_blog_image(&self, id: Uuid, url: &str) -> Result<Blog, RepoError> {
        let sql = format!(
            "UPDATE blogs SET main_image = $2, updated_at = NOW() \
             WHERE id = $1 AND deleted_at IS NULL RETURNING {BLOG_COLUMNS}"
        );
        sqlx::query_as::<_, Blog>(&sql)
            .bind(id)
            .bind(url)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(RepoError::NotFound)
    }

    async fn delete_blog(&self, id: Uuid) -> Result<(), RepoError> {
        let mut tx = self.pool.begin().await?;

        let owner = sqlx::query_scalar::<_, Uuid>(
            "UPDATE blogs SET deleted_at = NOW() WHERE id = $1 AND deleted_at IS NULL RETURNING user_id",
        )
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(RepoError::NotFound)?;

        sqlx::query("UPDATE users SET blog_count = GREATEST(blog_count - 1, 0) WHERE id = $1")
            .bind(owner)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }
}
