use std::path::{Path, PathBuf};

use agora_types::api::{Claims, UploadResponse};
use anyhow::Result;
use async_trait::async_trait;
use axum::{
    Extension, Json,
    extract::{Multipart, State},
};
use bytes::Bytes;
use sha2::{Digest, Sha256};
use tokio::fs;
use tracing::info;

use crate::auth::AppState;
use crate::error::ApiError;

/// External blob store: turns uploaded bytes into a retrievable URL.
#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn put(&self, data: Bytes, content_type: &str, file_name: Option<&str>) -> Result<String>;

    /// Directory to serve under `/files`, for stores that keep blobs locally.
    fn local_root(&self) -> Option<&Path> {
        None
    }
}

/// Stores each blob as a flat file named after its SHA-256, so identical
/// uploads share one file.
pub struct DiskBlobStore {
    dir: PathBuf,
    public_url: String,
}

impl DiskBlobStore {
    pub async fn new(dir: PathBuf, public_url: impl Into<String>) -> Result<Self> {
        fs::create_dir_all(&dir).await?;
        info!("Blob storage directory: {}", dir.display());
        Ok(Self {
            dir,
            public_url: public_url.into().trim_end_matches('/').to_string(),
        })
    }

    fn file_name(data: &[u8], original: Option<&str>) -> String {
        let mut hasher = Sha256::new();
        hasher.update(data);
        let digest = hex::encode(hasher.finalize());

        let ext = original
            .and_then(|n| Path::new(n).extension())
            .and_then(|e| e.to_str())
            .filter(|e| e.len() <= 8 && e.chars().all(|c| c.is_ascii_alphanumeric()))
            .map(str::to_ascii_lowercase);

        match ext {
            Some(ext) => format!("{digest}.{ext}"),
            None => digest,
        }
    }
}

#[async_trait]
impl BlobStore for DiskBlobStore {
    async fn put(&self, data: Bytes, _content_type: &str, file_name: Option<&str>) -> Result<String> {
        let name = Self::file_name(&data, file_name);
        let path = self.dir.join(&name);
        if fs::try_exists(&path).await? {
            return Ok(format!("{}/files/{}", self.public_url, name));
        }

        // Write then rename so a half-written file is never served
        let tmp = self.dir.join(format!(".{name}.part"));
        fs::write(&tmp, &data).await?;
        fs::rename(&tmp, &path).await?;

        info!("Stored blob {} ({} bytes)", name, data.len());
        Ok(format!("{}/files/{}", self.public_url, name))
    }

    fn local_root(&self) -> Option<&Path> {
        Some(&self.dir)
    }
}

/// Attachment kind shown to clients, derived from the MIME type.
pub fn attachment_kind(content_type: &str) -> &'static str {
    match content_type.split('/').next().unwrap_or_default() {
        "image" => "image",
        "video" => "video",
        "audio" => "audio",
        _ => "file",
    }
}

/// POST /channels/upload: multipart with a single `file` field.
pub async fn upload(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, ApiError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(format!("malformed multipart body: {e}")))?
    {
        if field.name() != Some("file") {
            continue;
        }

        let file_name = field.file_name().map(str::to_string);
        let content_type = field
            .content_type()
            .unwrap_or("application/octet-stream")
            .to_string();
        let data = field
            .bytes()
            .await
            .map_err(|e| ApiError::BadRequest(format!("failed to read upload: {e}")))?;
        if data.is_empty() {
            return Err(ApiError::BadRequest("uploaded file is empty".into()));
        }

        let url = state
            .blobs
            .put(data, &content_type, file_name.as_deref())
            .await?;
        info!("{} uploaded {}", claims.username, url);

        return Ok(Json(UploadResponse {
            url,
            kind: attachment_kind(&content_type).to_string(),
        }));
    }

    Err(ApiError::BadRequest("missing 'file' field".into()))
}
