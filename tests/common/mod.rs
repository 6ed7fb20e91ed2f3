#![allow(dead_code)]

use async_trait::async_trait;
use axum::body::Bytes;
use blog_backend::{
    AppConfig, AppState, MediaState, MockMediaHost,
    auth::SessionScope,
    media::ImageUpload,
    models::{
        AdminRole, AdminUser, Blog, BlogChanges, NewAdmin, NewBlog, NewUser, ProfileChanges,
        User,
    },
    password,
    repository::{RepoError, Repository, RepositoryState},
};
use chrono::Utc;
use std::sync::{
    Arc, Mutex,
    atomic::{AtomicUsize, Ordering},
};
use uuid::Uuid;

// --- In-memory Repository ---

/// In-memory stand-in for Postgres with the same observable rules: soft-deleted
/// rows are invisible, and username/email/slug are unique among live rows.
#[derive(Default)]
pub struct MemoryRepository {
    users: Mutex<Vec<User>>,
    admins: Mutex<Vec<AdminUser>>,
    blogs: Mutex<Vec<Blog>>,
    /// Slugs a "concurrent writer" grabs right before our insert. Each entry
    /// fires once: a competing post is stored and our insert gets a slug conflict.
    slug_races: Mutex<Vec<String>>,
    user_lookups: AtomicUsize,
    admin_lookups: AtomicUsize,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn race_on_slug(&self, slug: &str) {
        self.slug_races.lock().unwrap().push(slug.to_string());
    }

    /// Number of `get_user` calls so far.
    pub fn user_lookups(&self) -> usize {
        self.user_lookups.load(Ordering::SeqCst)
    }

    /// Number of `get_admin` calls so far.
    pub fn admin_lookups(&self) -> usize {
        self.admin_lookups.load(Ordering::SeqCst)
    }

    pub fn soft_delete_user(&self, id: Uuid) {
        if let Some(user) = self.users.lock().unwrap().iter_mut().find(|u| u.id == id) {
            user.deleted_at = Some(Utc::now());
        }
    }

    pub fn live_slugs(&self) -> Vec<String> {
        self.blogs
            .lock()
            .unwrap()
            .iter()
            .filter(|b| b.deleted_at.is_none())
            .map(|b| b.slug.clone())
            .collect()
    }

    fn take_race(&self, slug: &str) -> bool {
        let mut races = self.slug_races.lock().unwrap();
        match races.iter().position(|s| s == slug) {
            Some(idx) => {
                races.remove(idx);
                true
            }
            None => false,
        }
    }
}

fn live<T, F>(rows: &[T], deleted: F) -> impl Iterator<Item = &T>
where
    F: Fn(&T) -> bool,
{
    rows.iter().filter(move |row| !deleted(row))
}

fn same_email(a: &str, b: &str) -> bool {
    a.to_lowercase() == b.to_lowercase()
}

#[async_trait]
impl Repository for MemoryRepository {
    async fn create_user(&self, user: NewUser) -> Result<User, RepoError> {
        let mut users = self.users.lock().unwrap();
        let alive: Vec<&User> = live(users.as_slice(), |u| u.deleted_at.is_some()).collect();
        if alive.iter().any(|u| u.username == user.username) {
            return Err(RepoError::Conflict("username".into()));
        }
        if alive.iter().any(|u| same_email(&u.email, &user.email)) {
            return Err(RepoError::Conflict("email".into()));
        }

        let now = Utc::now();
        let created = User {
            id: Uuid::new_v4(),
            name: user.name,
            surname: user.surname,
            username: user.username,
            email: user.email,
            password_hash: user.password_hash,
            profile_image: None,
            blog_count: 0,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        };
        users.push(created.clone());
        Ok(created)
    }

    async fn get_user(&self, id: Uuid) -> Result<Option<User>, RepoError> {
        self.user_lookups.fetch_add(1, Ordering::SeqCst);
        let users = self.users.lock().unwrap();
        Ok(live(users.as_slice(), |u| u.deleted_at.is_some())
            .find(|u| u.id == id)
            .cloned())
    }

    async fn find_user_by_login(&self, identifier: &str) -> Result<Option<User>, RepoError> {
        let users = self.users.lock().unwrap();
        Ok(live(users.as_slice(), |u| u.deleted_at.is_some())
            .find(|u| u.username == identifier || same_email(&u.email, identifier))
            .cloned())
    }

    async fn list_users(&self) -> Result<Vec<User>, RepoError> {
        let users = self.users.lock().unwrap();
        Ok(live(users.as_slice(), |u| u.deleted_at.is_some()).cloned().collect())
    }

    async fn update_user_profile(
        &self,
        id: Uuid,
        changes: ProfileChanges,
    ) -> Result<User, RepoError> {
        let mut users = self.users.lock().unwrap();
        let user = users
            .iter_mut()
            .find(|u| u.id == id && u.deleted_at.is_none())
            .ok_or(RepoError::NotFound)?;
        if let Some(name) = changes.name {
            user.name = name;
        }
        if let Some(surname) = changes.surname {
            user.surname = surname;
        }
        user.updated_at = Utc::now();
        Ok(user.clone())
    }

    async fn set_profile_image(&self, id: Uuid, url: &str) -> Result<User, RepoError> {
        let mut users = self.users.lock().unwrap();
        let user = users
            .iter_mut()
            .find(|u| u.id == id && u.deleted_at.is_none())
            .ok_or(RepoError::NotFound)?;
        user.profile_image = Some(url.to_string());
        user.updated_at = Utc::now();
        Ok(user.clone())
    }

    async fn create_admin(&self, admin: NewAdmin) -> Result<AdminUser, RepoError> {
        let mut admins = self.admins.lock().unwrap();
        let alive: Vec<&AdminUser> = live(admins.as_slice(), |a| a.deleted_at.is_some()).collect();
        if alive.iter().any(|a| a.username == admin.username) {
            return Err(RepoError::Conflict("username".into()));
        }
        if alive.iter().any(|a| same_email(&a.email, &admin.email)) {
            return Err(RepoError::Conflict("email".into()));
        }

        let now = Utc::now();
        let created = AdminUser {
            id: Uuid::new_v4(),
            username: admin.username,
            email: admin.email,
            password_hash: admin.password_hash,
            role: admin.role.as_str().to_string(),
            created_at: now,
            updated_at: now,
            deleted_at: None,
        };
        admins.push(created.clone());
        Ok(created)
    }

    async fn get_admin(&self, id: Uuid) -> Result<Option<AdminUser>, RepoError> {
        self.admin_lookups.fetch_add(1, Ordering::SeqCst);
        let admins = self.admins.lock().unwrap();
        Ok(live(admins.as_slice(), |a| a.deleted_at.is_some())
            .find(|a| a.id == id)
            .cloned())
    }

    async fn find_admin_by_login(
        &self,
        identifier: &str,
    ) -> Result<Option<AdminUser>, RepoError> {
        let admins = self.admins.lock().unwrap();
        Ok(live(admins.as_slice(), |a| a.deleted_at.is_some())
            .find(|a| a.username == identifier || same_email(&a.email, identifier))
            .cloned())
    }

    async fn list_admins(&self) -> Result<Vec<AdminUser>, RepoError> {
        let admins = self.admins.lock().unwrap();
        Ok(live(admins.as_slice(), |a| a.deleted_at.is_some()).cloned().collect())
    }

    async fn count_admins(&self) -> Result<i64, RepoError> {
        let admins = self.admins.lock().unwrap();
        Ok(live(admins.as_slice(), |a| a.deleted_at.is_some()).count() as i64)
    }

    async fn slugs_with_base(&self, base: &str) -> Result<Vec<String>, RepoError> {
        let prefix = format!("{base}-");
        let blogs = self.blogs.lock().unwrap();
        Ok(live(blogs.as_slice(), |b| b.deleted_at.is_some())
            .filter(|b| {
                b.slug == base
                    || b.slug.strip_prefix(&prefix).is_some_and(|suffix| {
                        !suffix.is_empty() && suffix.chars().all(|c| c.is_ascii_digit())
                    })
            })
            .map(|b| b.slug.clone())
            .collect())
    }

    async fn create_blog(&self, blog: NewBlog) -> Result<Blog, RepoError> {
        let now = Utc::now();
        let mut blogs = self.blogs.lock().unwrap();

        if self.take_race(&blog.slug) {
            blogs.push(Blog {
                id: Uuid::new_v4(),
                title: "competing post".into(),
                slug: blog.slug.clone(),
                user_id: Uuid::new_v4(),
                visibility: true,
                created_at: now,
                updated_at: now,
                ..Blog::default()
            });
            return Err(RepoError::Conflict("slug".into()));
        }

        if live(blogs.as_slice(), |b| b.deleted_at.is_some()).any(|b| b.slug == blog.slug) {
            return Err(RepoError::Conflict("slug".into()));
        }

        let created = Blog {
            id: Uuid::new_v4(),
            title: blog.title,
            content: blog.content,
            slug: blog.slug,
            summary: blog.summary,
            category: blog.category,
            main_image: blog.main_image,
            user_id: blog.user_id,
            visibility: blog.visibility,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        };
        blogs.push(created.clone());
        drop(blogs);

        if let Some(owner) = self
            .users
            .lock()
            .unwrap()
            .iter_mut()
            .find(|u| u.id == created.user_id)
        {
            owner.blog_count += 1;
        }
        Ok(created)
    }

    async fn get_blog(&self, id: Uuid) -> Result<Option<Blog>, RepoError> {
        let blogs = self.blogs.lock().unwrap();
        Ok(live(blogs.as_slice(), |b| b.deleted_at.is_some())
            .find(|b| b.id == id)
            .cloned())
    }

    async fn get_blog_by_slug(&self, slug: &str) -> Result<Option<Blog>, RepoError> {
        let blogs = self.blogs.lock().unwrap();
        Ok(live(blogs.as_slice(), |b| b.deleted_at.is_some())
            .find(|b| b.slug == slug)
            .cloned())
    }

    async fn list_blogs(&self, viewer: Option<Uuid>) -> Result<Vec<Blog>, RepoError> {
        let blogs = self.blogs.lock().unwrap();
        Ok(live(blogs.as_slice(), |b| b.deleted_at.is_some())
            .filter(|b| b.visibility || Some(b.user_id) == viewer)
            .cloned()
            .collect())
    }

    async fn update_blog(&self, id: Uuid, changes: BlogChanges) -> Result<Blog, RepoError> {
        let mut blogs = self.blogs.lock().unwrap();
        let blog = blogs
            .iter_mut()
            .find(|b| b.id == id && b.deleted_at.is_none())
            .ok_or(RepoError::NotFound)?;
        if let Some(title) = changes.title {
            blog.title = title;
        }
        if let Some(content) = changes.content {
            blog.content = content;
        }
        if let Some(summary) = changes.summary {
            blog.summary = summary;
        }
        if let Some(category) = changes.category {
            blog.category = category;
        }
        if let Some(visibility) = changes.visibility {
            blog.visibility = visibility;
        }
        blog.updated_at = Utc::now();
        Ok(blog.clone())
    }

    async fn set_blog_image(&self, id: Uuid, url: &str) -> Result<Blog, RepoError> {
        let mut blogs = self.blogs.lock().unwrap();
        let blog = blogs
            .iter_mut()
            .find(|b| b.id == id && b.deleted_at.is_none())
            .ok_or(RepoError::NotFound)?;
        blog.main_image = Some(url.to_string());
        blog.updated_at = Utc::now();
        Ok(blog.clone())
    }

    async fn delete_blog(&self, id: Uuid) -> Result<(), RepoError> {
        let mut blogs = self.blogs.lock().unwrap();
        let blog = blogs
            .iter_mut()
            .find(|b| b.id == id && b.deleted_at.is_none())
            .ok_or(RepoError::NotFound)?;
        blog.deleted_at = Some(Utc::now());
        let owner_id = blog.user_id;
        drop(blogs);

        if let Some(owner) = self
            .users
            .lock()
            .unwrap()
            .iter_mut()
            .find(|u| u.id == owner_id)
        {
            owner.blog_count = (owner.blog_count - 1).max(0);
        }
        Ok(())
    }
}

// --- State & fixtures ---

pub struct TestContext {
    pub repo: Arc<MemoryRepository>,
    pub media: Arc<MockMediaHost>,
    pub state: AppState,
}

impl TestContext {
    pub fn new() -> Self {
        Self::with_media(MockMediaHost::new())
    }

    pub fn with_media(media: MockMediaHost) -> Self {
        let repo = Arc::new(MemoryRepository::new());
        let media = Arc::new(media);
        let state = AppState::new(
            repo.clone() as RepositoryState,
            media.clone() as MediaState,
            AppConfig::default(),
        );
        Self { repo, media, state }
    }

    pub async fn seed_user(&self, username: &str, password: &str) -> User {
        self.repo
            .create_user(NewUser {
                name: "Test".into(),
                surname: "User".into(),
                username: username.into(),
                email: format!("{username}@x.com"),
                password_hash: password::hash_password(password).unwrap(),
            })
            .await
            .unwrap()
    }

    pub async fn seed_admin(&self, username: &str, role: AdminRole, password: &str) -> AdminUser {
        self.repo
            .create_admin(NewAdmin {
                username: username.into(),
                email: format!("{username}@admin.x.com"),
                password_hash: password::hash_password(password).unwrap(),
                role,
            })
            .await
            .unwrap()
    }

    pub async fn seed_blog(&self, owner: Uuid, title: &str, visibility: bool) -> Blog {
        blog_backend::slug::create_blog_with_unique_slug(
            self.repo.as_ref(),
            "",
            draft(owner, title, visibility),
        )
        .await
        .unwrap()
    }

    /// `Cookie` header value carrying a fresh user session.
    pub fn user_cookie(&self, user_id: Uuid) -> String {
        let token = self.state.sessions.issue(user_id, SessionScope::User).unwrap();
        format!("user_token={token}")
    }

    /// `Cookie` header value carrying a fresh admin session.
    pub fn admin_cookie(&self, admin_id: Uuid) -> String {
        let token = self.state.sessions.issue(admin_id, SessionScope::Admin).unwrap();
        format!("admin_token={token}")
    }
}

pub fn draft(owner: Uuid, title: &str, visibility: bool) -> NewBlog {
    NewBlog {
        title: title.into(),
        content: "Body text".into(),
        slug: String::new(),
        summary: "Summary".into(),
        category: "general".into(),
        main_image: Some("https://res.cloudinary.com/mock/image/upload/v1/blogs/seed.png".into()),
        user_id: owner,
        visibility,
    }
}

pub fn png(bytes: &'static [u8]) -> ImageUpload {
    ImageUpload {
        file_name: Some("photo.png".into()),
        content_type: "image/png".into(),
        bytes: Bytes::from_static(bytes),
    }
}

// --- Multipart ---

const BOUNDARY: &str = "blog-test-boundary-7MA4YWxkTrZu0gW";

/// Builds a `multipart/form-data` body with text `fields` and an optional
/// `image` part given as (content type, bytes). Returns (content type header, body).
pub fn multipart_body(fields: &[(&str, &str)], image: Option<(&str, &[u8])>) -> (String, Vec<u8>) {
    let mut body = Vec::new();
    for (name, value) in fields {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
            )
            .as_bytes(),
        );
    }
    if let Some((content_type, bytes)) = image {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"image\"; filename=\"upload.png\"\r\nContent-Type: {content_type}\r\n\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(bytes);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());

    (format!("multipart/form-data; boundary={BOUNDARY}"), body)
}
