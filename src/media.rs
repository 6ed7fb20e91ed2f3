use async_trait::async_trait;
use axum::body::Bytes;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

use crate::error::AppError;

/// Largest accepted image body (5 MiB).
pub const MAX_IMAGE_BYTES: usize = 5 * 1024 * 1024;

/// Media host folders, one per kind of owning record.
pub const BLOG_FOLDER: &str = "blogs";
pub const BLOG_IMAGE_FOLDER: &str = "blog_images";
pub const PROFILE_IMAGE_FOLDER: &str = "profile_images";

#[derive(Debug, Error, Clone, PartialEq)]
pub enum MediaError {
    /// The file itself is unacceptable (empty, wrong type, too large).
    #[error("{0}")]
    Invalid(String),
    #[error("media host did not answer in time")]
    Timeout,
    #[error("media host unreachable: {0}")]
    Transport(String),
    #[error("media host rejected the request: {0}")]
    Remote(String),
}

/// An image received from a client, fully buffered.
#[derive(Debug, Clone)]
pub struct ImageUpload {
    pub file_name: Option<String>,
    pub content_type: String,
    pub bytes: Bytes,
}

/// What the media host hands back after a successful upload.
#[derive(Debug, Clone, PartialEq)]
pub struct UploadedMedia {
    pub url: String,
    pub public_id: String,
}

// 1. MediaHost Contract
/// MediaHost
///
/// The media-hosting collaborator. Swappable between the real Cloudinary client
/// and the in-process `MockMediaHost` used by tests.
#[async_trait]
pub trait MediaHost: Send + Sync {
    /// Stores the image under `folder` and returns its durable URL.
    async fn upload(&self, image: &ImageUpload, folder: &str)
    -> Result<UploadedMedia, MediaError>;

    /// Removes a previously uploaded object by its public identifier.
    async fn delete(&self, public_id: &str) -> Result<(), MediaError>;
}

/// MediaState
///
/// The concrete type used to share the media host across the application state.
pub type MediaState = Arc<dyn MediaHost>;

/// Rejects anything that is not a non-empty image within the size limit.
pub fn validate_image(image: &ImageUpload) -> Result<(), MediaError> {
    if image.bytes.is_empty() {
        return Err(MediaError::Invalid("Image file is empty".into()));
    }
    if !image.content_type.starts_with("image/") {
        return Err(MediaError::Invalid(format!(
            "Unsupported file type: {}",
            image.content_type
        )));
    }
    if image.bytes.len() > MAX_IMAGE_BYTES {
        return Err(MediaError::Invalid(format!(
            "Image too large: max size is {MAX_IMAGE_BYTES} bytes"
        )));
    }
    Ok(())
}

/// public_id_from_url
///
/// Derives the media host identifier from a stored URL: the last path segment
/// without its extension. Query strings and fragments are ignored. Malformed
/// input yields an empty string.
pub fn public_id_from_url(url: &str) -> String {
    let path = url.split(['?', '#']).next().unwrap_or_default();
    let file_name = path.rsplit('/').next().unwrap_or_default();
    let stem = match file_name.rsplit_once('.') {
        Some((stem, _ext)) => stem,
        None => file_name,
    };
    stem.trim().to_string()
}

/// MediaManager
///
/// Media lifecycle for records holding a single image reference: attach a new
/// file, commit it to the owning record, and only then drop the old object.
#[derive(Clone)]
pub struct MediaManager {
    host: MediaState,
    timeout: Duration,
}

impl MediaManager {
    pub fn new(host: MediaState, timeout: Duration) -> Self {
        Self { host, timeout }
    }

    /// attach
    ///
    /// Validates and uploads `image` into `folder`, returning the new URL.
    /// Nothing is written to any owning record here.
    pub async fn attach(&self, image: &ImageUpload, folder: &str) -> Result<String, AppError> {
        validate_image(image)?;

        let uploaded = tokio::time::timeout(self.timeout, self.host.upload(image, folder))
            .await
            .map_err(|_| MediaError::Timeout)??;

        if uploaded.url.is_empty() {
            return Err(AppError::UploadFailed("media host returned an empty URL".into()));
        }

        tracing::info!(folder, public_id = %uploaded.public_id, "image uploaded");
        Ok(uploaded.url)
    }

    /// replace
    ///
    /// Attaches `image`, then hands the new URL to `commit`, which durably stores
    /// it on the owning record. The previous object is deleted only after the
    /// commit succeeded; if the commit fails the freshly uploaded object is
    /// discarded instead and the record keeps `previous`. Cleanup failures are
    /// logged and never turn a committed replacement into an error.
    pub async fn replace<T, F, Fut>(
        &self,
        previous: Option<&str>,
        image: &ImageUpload,
        folder: &str,
        commit: F,
    ) -> Result<T, AppError>
    where
        F: FnOnce(String) -> Fut,
        Fut: Future<Output = Result<T, AppError>>,
    {
        let new_url = self.attach(image, folder).await?;

        match commit(new_url.clone()).await {
            Ok(committed) => {
                if let Some(old_url) = previous.filter(|url| !url.is_empty()) {
                    self.discard(old_url).await;
                }
                Ok(committed)
            }
            Err(err) => {
                self.discard(&new_url).await;
                Err(err)
            }
        }
    }

    /// Best-effort deletion of the object behind `url`.
    /// An empty identifier is a no-op.
    pub async fn discard(&self, url: &str) {
        let public_id = public_id_from_url(url);
        if public_id.is_empty() {
            tracing::debug!(url, "no media identifier derivable; skipping delete");
            return;
        }

        match tokio::time::timeout(self.timeout, self.host.delete(&public_id)).await {
            Ok(Ok(())) => tracing::info!(public_id = %public_id, "previous image deleted"),
            Ok(Err(e)) => tracing::warn!(public_id = %public_id, error = %e, "failed to delete image; leaking it"),
            Err(_) => tracing::warn!(public_id = %public_id, "timed out deleting image; leaking it"),
        }
    }
}

// 2. The Real Implementation (Cloudinary)
/// CloudinaryClient
///
/// Talks to the Cloudinary upload API over HTTPS with signed requests. Every
/// request carries the configured timeout.
#[derive(Clone)]
pub struct CloudinaryClient {
    http: reqwest::Client,
    cloud_name: String,
    api_key: String,
    api_secret: String,
}

#[derive(Deserialize)]
struct CloudinaryUploadResponse {
    secure_url: String,
    public_id: String,
}

#[derive(Deserialize)]
struct CloudinaryDestroyResponse {
    result: String,
}

#[derive(Deserialize)]
struct CloudinaryErrorResponse {
    error: CloudinaryErrorDetail,
}

#[derive(Deserialize)]
struct CloudinaryErrorDetail {
    message: String,
}

impl CloudinaryClient {
    pub fn new(
        cloud_name: &str,
        api_key: &str,
        api_secret: &str,
        timeout: Duration,
    ) -> Result<Self, MediaError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| MediaError::Transport(e.to_string()))?;

        Ok(Self {
            http,
            cloud_name: cloud_name.to_string(),
            api_key: api_key.to_string(),
            api_secret: api_secret.to_string(),
        })
    }

    fn endpoint(&self, action: &str) -> String {
        format!(
            "https://api.cloudinary.com/v1_1/{}/image/{}",
            self.cloud_name, action
        )
    }

    /// Signs the request parameters: sorted `key=value` pairs joined by `&`,
    /// followed by the API secret, hashed with SHA-256.
    fn sign(&self, params: &[(&str, String)]) -> String {
        let mut sorted: Vec<&(&str, String)> = params.iter().collect();
        sorted.sort_by(|a, b| a.0.cmp(b.0));
        let to_sign = sorted
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join("&");

        let mut hasher = Sha256::new();
        hasher.update(to_sign.as_bytes());
        hasher.update(self.api_secret.as_bytes());
        hex::encode(hasher.finalize())
    }

    async fn remote_error(response: reqwest::Response) -> MediaError {
        let status = response.status();
        match response.json::<CloudinaryErrorResponse>().await {
            Ok(body) => MediaError::Remote(body.error.message),
            Err(_) => MediaError::Remote(format!("HTTP {status}")),
        }
    }
}

fn transport_error(err: reqwest::Error) -> MediaError {
    if err.is_timeout() {
        MediaError::Timeout
    } else {
        MediaError::Transport(err.to_string())
    }
}

#[async_trait]
impl MediaHost for CloudinaryClient {
    /// Uploads with an explicit random `public_id` placed in `asset_folder`, so
    /// the last path segment of the returned URL is exactly the public id.
    async fn upload(
        &self,
        image: &ImageUpload,
        folder: &str,
    ) -> Result<UploadedMedia, MediaError> {
        let timestamp = chrono::Utc::now().timestamp().to_string();
        let public_id = Uuid::new_v4().simple().to_string();

        let signed = [
            ("asset_folder", folder.to_string()),
            ("public_id", public_id.clone()),
            ("timestamp", timestamp.clone()),
        ];
        let signature = self.sign(&signed);

        let file_part = reqwest::multipart::Part::bytes(image.bytes.to_vec())
            .file_name(image.file_name.clone().unwrap_or_else(|| public_id.clone()))
            .mime_str(&image.content_type)
            .map_err(|e| MediaError::Invalid(e.to_string()))?;

        let form = reqwest::multipart::Form::new()
            .part("file", file_part)
            .text("api_key", self.api_key.clone())
            .text("asset_folder", folder.to_string())
            .text("public_id", public_id)
            .text("timestamp", timestamp)
            .text("signature_algorithm", "sha256")
            .text("signature", signature);

        let response = self
            .http
            .post(self.endpoint("upload"))
            .multipart(form)
            .send()
            .await
            .map_err(transport_error)?;

        if !response.status().is_success() {
            return Err(Self::remote_error(response).await);
        }

        let body = response
            .json::<CloudinaryUploadResponse>()
            .await
            .map_err(transport_error)?;

        Ok(UploadedMedia {
            url: body.secure_url,
            public_id: body.public_id,
        })
    }

    async fn delete(&self, public_id: &str) -> Result<(), MediaError> {
        if public_id.is_empty() {
            return Ok(());
        }

        let timestamp = chrono::Utc::now().timestamp().to_string();
        let signed = [
            ("public_id", public_id.to_string()),
            ("timestamp", timestamp.clone()),
        ];
        let signature = self.sign(&signed);

        let params = [
            ("api_key", self.api_key.clone()),
            ("public_id", public_id.to_string()),
            ("timestamp", timestamp),
            ("signature_algorithm", "sha256".to_string()),
            ("signature", signature),
        ];

        let response = self
            .http
            .post(self.endpoint("destroy"))
            .form(&params)
            .send()
            .await
            .map_err(transport_error)?;

        if !response.status().is_success() {
            return Err(Self::remote_error(response).await);
        }

        let body = response
            .json::<CloudinaryDestroyResponse>()
            .await
            .map_err(transport_error)?;

        // "not found" means the object is already gone.
        match body.result.as_str() {
            "ok" | "not found" => Ok(()),
            other => Err(MediaError::Remote(format!("destroy returned '{other}'"))),
        }
    }
}

// 3. The Mock Implementation (For Tests)
/// MockMediaHost
///
/// In-process `MediaHost` recording every upload and delete, with switches to
/// simulate upload or delete failures.
#[derive(Default)]
pub struct MockMediaHost {
    /// When true, uploads fail with a remote error.
    pub fail_uploads: bool,
    /// When true, deletes fail with a remote error.
    pub fail_deletes: bool,
    uploads: Mutex<Vec<UploadedMedia>>,
    deletes: Mutex<Vec<String>>,
}

impl MockMediaHost {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn new_failing() -> Self {
        Self {
            fail_uploads: true,
            ..Self::default()
        }
    }

    pub fn new_failing_deletes() -> Self {
        Self {
            fail_deletes: true,
            ..Self::default()
        }
    }

    pub fn uploaded(&self) -> Vec<UploadedMedia> {
        self.uploads.lock().map(|u| u.clone()).unwrap_or_default()
    }

    pub fn deleted(&self) -> Vec<String> {
        self.deletes.lock().map(|d| d.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl MediaHost for MockMediaHost {
    async fn upload(
        &self,
        image: &ImageUpload,
        folder: &str,
    ) -> Result<UploadedMedia, MediaError> {
        if self.fail_uploads {
            return Err(MediaError::Remote("Mock Media Error: Simulation requested".into()));
        }

        let public_id = Uuid::new_v4().simple().to_string();
        let extension = image
            .content_type
            .strip_prefix("image/")
            .filter(|ext| !ext.is_empty())
            .unwrap_or("bin");
        let uploaded = UploadedMedia {
            url: format!("https://res.cloudinary.com/mock/image/upload/v1/{folder}/{public_id}.{extension}"),
            public_id,
        };

        if let Ok(mut uploads) = self.uploads.lock() {
            uploads.push(uploaded.clone());
        }
        Ok(uploaded)
    }

    async fn delete(&self, public_id: &str) -> Result<(), MediaError> {
        if let Ok(mut deletes) = self.deletes.lock() {
            deletes.push(public_id.to_string());
        }
        if self.fail_deletes {
            return Err(MediaError::Remote("Mock Media Error: delete refused".into()));
        }
        Ok(())
    }
}
