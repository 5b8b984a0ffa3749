//! Cloud media storage
//!
//! [`MediaStorage`] is the seam the content service uploads through.
//! [`CloudinaryStorage`] talks to the Cloudinary upload API with signed requests;
//! tests substitute their own implementations.

use crate::config::MediaConfig;
use crate::error::{Error, Result};
use crate::models::{MediaAsset, MediaFiles};
use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use sha2::{Digest, Sha256};
use tracing::{debug, error, info, instrument, warn};

pub const ORPHANED_UPLOADS_METRIC: &str = "streamhub_orphaned_uploads_total";

/// Storage resource class
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Video,
    Image,
}

impl MediaKind {
    pub fn resource_type(self) -> &'static str {
        match self {
            MediaKind::Video => "video",
            MediaKind::Image => "image",
        }
    }
}

/// A file received from a client, ready to store
#[derive(Debug, Clone)]
pub struct MediaUpload {
    pub kind: MediaKind,
    pub file_name: String,
    pub content_type: Option<String>,
    pub data: Bytes,
}

#[async_trait]
pub trait MediaStorage: Send + Sync {
    async fn upload(&self, upload: MediaUpload) -> Result<MediaAsset>;

    async fn delete(&self, public_id: &str, kind: MediaKind) -> Result<()>;
}

/// Upload the primary media and its thumbnail concurrently. If only one side
/// succeeds its artifact is deleted again before the error is returned, so no
/// caller ever sees a half-stored pair.
pub async fn upload_pair(
    storage: &dyn MediaStorage,
    primary: MediaUpload,
    thumbnail: MediaUpload,
) -> Result<MediaFiles> {
    let (primary_kind, thumbnail_kind) = (primary.kind, thumbnail.kind);
    let (primary, thumbnail) = tokio::join!(storage.upload(primary), storage.upload(thumbnail));

    match (primary, thumbnail) {
        (Ok(primary), Ok(thumbnail)) => Ok(MediaFiles { primary, thumbnail }),
        (Ok(stored), Err(e)) => {
            warn!(error = %e, "Thumbnail upload failed, discarding primary media");
            discard(storage, &stored.public_id, primary_kind).await;
            Err(e)
        }
        (Err(e), Ok(stored)) => {
            warn!(error = %e, "Primary media upload failed, discarding thumbnail");
            discard(storage, &stored.public_id, thumbnail_kind).await;
            Err(e)
        }
        (Err(e), Err(other)) => {
            warn!(error = %other, "Thumbnail upload failed as well");
            Err(e)
        }
    }
}

/// Best-effort delete. A failure leaves an orphaned artifact, which is logged
/// with its id and counted.
pub async fn discard(storage: &dyn MediaStorage, public_id: &str, kind: MediaKind) {
    if let Err(e) = storage.delete(public_id, kind).await {
        error!(public_id, error = %e, "Failed to delete stored media, artifact is orphaned");
        metrics::counter!(ORPHANED_UPLOADS_METRIC).increment(1);
    }
}

// ============================================================================
// Cloudinary
// ============================================================================

#[derive(Debug, Deserialize)]
struct UploadResponse {
    secure_url: String,
    public_id: String,
    format: Option<String>,
    duration: Option<f64>,
    bytes: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct DestroyResponse {
    result: String,
}

#[derive(Debug, Deserialize)]
struct ApiErrorResponse {
    error: ApiErrorMessage,
}

#[derive(Debug, Deserialize)]
struct ApiErrorMessage {
    message: String,
}

/// Cloudinary REST client
pub struct CloudinaryStorage {
    client: reqwest::Client,
    config: MediaConfig,
}

impl CloudinaryStorage {
    pub fn new(config: MediaConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| Error::Config {
                message: format!("Failed to build media HTTP client: {}", e).into(),
                source: Some(Box::new(e)),
            })?;

        info!(
            "✅ Media storage client ready (cloud: {}, folder: {})",
            config.cloud_name, config.folder
        );
        Ok(Self { client, config })
    }

    fn endpoint(&self, kind: MediaKind, action: &str) -> String {
        format!(
            "{}/v1_1/{}/{}/{}",
            self.config.base_url.trim_end_matches('/'),
            self.config.cloud_name,
            kind.resource_type(),
            action
        )
    }

    /// Parameters sorted by name, joined as `k=v&k=v`, followed by the secret
    fn sign(&self, params: &[(&str, String)]) -> String {
        sign_params(params, &self.config.api_secret)
    }

    async fn read_error(response: reqwest::Response) -> Error {
        let status = response.status();
        let message = match response.json::<ApiErrorResponse>().await {
            Ok(body) => body.error.message,
            Err(_) => status
                .canonical_reason()
                .unwrap_or("unknown error")
                .to_string(),
        };
        Error::storage(format!("media storage replied {}: {}", status.as_u16(), message))
    }
}

fn sign_params(params: &[(&str, String)], secret: &str) -> String {
    let mut sorted: Vec<&(&str, String)> = params.iter().collect();
    sorted.sort_by(|a, b| a.0.cmp(b.0));
    let joined = sorted
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join("&");

    let mut hasher = Sha256::new();
    hasher.update(joined.as_bytes());
    hasher.update(secret.as_bytes());
    hex::encode(hasher.finalize())
}

#[async_trait]
impl MediaStorage for CloudinaryStorage {
    #[instrument(skip(self, upload), fields(kind = ?upload.kind, file = %upload.file_name, size = upload.data.len()))]
    async fn upload(&self, upload: MediaUpload) -> Result<MediaAsset> {
        let timestamp = Utc::now().timestamp().to_string();
        let params = [
            ("folder", self.config.folder.clone()),
            ("timestamp", timestamp.clone()),
        ];
        let signature = self.sign(&params);

        let mut file = Part::bytes(upload.data.to_vec()).file_name(upload.file_name.clone());
        if let Some(content_type) = &upload.content_type {
            file = file.mime_str(content_type)?;
        }

        let form = Form::new()
            .part("file", file)
            .text("api_key", self.config.api_key.clone())
            .text("folder", self.config.folder.clone())
            .text("timestamp", timestamp)
            .text("signature", signature)
            .text("signature_algorithm", "sha256");

        let response = self
            .client
            .post(self.endpoint(upload.kind, "upload"))
            .multipart(form)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Self::read_error(response).await);
        }

        let body: UploadResponse = response.json().await?;
        debug!(public_id = %body.public_id, "Media stored");

        Ok(MediaAsset {
            url: body.secure_url,
            public_id: body.public_id,
            format: body.format,
            duration_secs: body.duration,
            bytes: body.bytes,
        })
    }

    #[instrument(skip(self))]
    async fn delete(&self, public_id: &str, kind: MediaKind) -> Result<()> {
        let timestamp = Utc::now().timestamp().to_string();
        let params = [
            ("public_id", public_id.to_string()),
            ("timestamp", timestamp.clone()),
        ];
        let signature = self.sign(&params);

        let form = [
            ("public_id", public_id.to_string()),
            ("timestamp", timestamp),
            ("api_key", self.config.api_key.clone()),
            ("signature", signature),
            ("signature_algorithm", "sha256".to_string()),
        ];

        let response = self
            .client
            .post(self.endpoint(kind, "destroy"))
            .form(&form)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Self::read_error(response).await);
        }

        let body: DestroyResponse = response.json().await?;
        match body.result.as_str() {
            // Already gone counts as deleted
            "ok" | "not found" => Ok(()),
            other => Err(Error::storage(format!(
                "media delete for '{}' returned '{}'",
                public_id, other
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signature_sorts_params() {
        let a = sign_params(
            &[("timestamp", "1700000000".into()), ("folder", "clips".into())],
            "secret",
        );
        let b = sign_params(
            &[("folder", "clips".into()), ("timestamp", "1700000000".into())],
            "secret",
        );
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);

        let mut hasher = Sha256::new();
        hasher.update(b"folder=clips&timestamp=1700000000secret");
        assert_eq!(a, hex::encode(hasher.finalize()));
    }

    #[test]
    fn test_resource_types() {
        assert_eq!(MediaKind::Video.resource_type(), "video");
        assert_eq!(MediaKind::Image.resource_type(), "image");
    }
}
