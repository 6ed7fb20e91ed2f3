use std::collections::HashSet;

use deunicode::deunicode;

use crate::error::AppError;
use crate::models::{Blog, NewBlog};
use crate::repository::{RepoError, Repository};

const MAX_SLUG_LEN: usize = 80;

/// How many times an insert that lost a slug race is re-allocated and retried.
pub const MAX_INSERT_ATTEMPTS: u32 = 5;

/// Fallback base when neither the explicit slug nor the title has any usable characters.
const EMPTY_SLUG: &str = "post";

/// slugify
///
/// Transliterates to ASCII ("Günlüğü" becomes "Gunlugu", "Привет" becomes
/// "Privet"), lowercases alphanumerics and collapses every run of other
/// characters into a single `-`.
pub fn slugify(input: &str) -> String {
    let mut slug = String::new();
    let mut last_was_dash = false;

    for ch in deunicode(input).chars() {
        if ch.is_ascii_alphanumeric() {
            slug.push(ch.to_ascii_lowercase());
            last_was_dash = false;
        } else if !slug.is_empty() && !last_was_dash {
            slug.push('-');
            last_was_dash = true;
        }
    }

    if slug.len() > MAX_SLUG_LEN {
        slug.truncate(MAX_SLUG_LEN);
    }
    while slug.ends_with('-') {
        slug.pop();
    }

    slug
}

/// Normalizes the explicit slug input, or the title when that input is blank.
pub fn base_slug(candidate: &str, title: &str) -> String {
    let source = if candidate.trim().is_empty() {
        title
    } else {
        candidate
    };
    let slug = slugify(source);
    if slug.is_empty() {
        EMPTY_SLUG.to_string()
    } else {
        slug
    }
}

/// allocate_slug
///
/// Returns `base` when no live blog uses it, otherwise `base-N` for the
/// smallest free `N >= 1`. The taken suffixes are read in one query, so the
/// number of posts sharing a base is unbounded.
///
/// The check is not atomic with the later insert; see `create_blog_with_unique_slug`.
pub async fn allocate_slug(repo: &dyn Repository, base: &str) -> Result<String, AppError> {
    let taken: HashSet<String> = repo.slugs_with_base(base).await?.into_iter().collect();
    if !taken.contains(base) {
        return Ok(base.to_string());
    }

    // At most `taken.len()` suffixes can be in use, so one of these is free.
    (1..=taken.len() + 1)
        .map(|counter| format!("{base}-{counter}"))
        .find(|candidate| !taken.contains(candidate))
        .ok_or_else(|| {
            AppError::Internal(format!("no free suffix among {} slugs", taken.len()))
        })
}

/// create_blog_with_unique_slug
///
/// Allocates a slug from `candidate` (or `draft.title`) and inserts the blog.
/// A concurrent request may take the same slug between the existence check and
/// the insert; the store's uniqueness constraint then rejects our insert with a
/// slug conflict, which is retried here with a fresh allocation. Any other
/// conflict, or exhausting `MAX_INSERT_ATTEMPTS`, is surfaced as `Conflict`.
pub async fn create_blog_with_unique_slug(
    repo: &dyn Repository,
    candidate: &str,
    mut draft: NewBlog,
) -> Result<Blog, AppError> {
    let base = base_slug(candidate, &draft.title);

    for attempt in 1..=MAX_INSERT_ATTEMPTS {
        draft.slug = allocate_slug(repo, &base).await?;

        match repo.create_blog(draft.clone()).await {
            Ok(blog) => return Ok(blog),
            Err(RepoError::Conflict(field)) if field == "slug" => {
                tracing::debug!(slug = %draft.slug, attempt, "slug taken concurrently; re-allocating");
            }
            Err(other) => return Err(other.into()),
        }
    }

    Err(AppError::Conflict(format!(
        "Slug '{base}' kept colliding with concurrent posts"
    )))
}
