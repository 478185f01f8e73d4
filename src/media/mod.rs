//! Image storage behind a provider-neutral interface.
//!
//! Handlers and services only see [`ImageStorage`]; the concrete backend is
//! chosen from `STORAGE_PROVIDER` at startup. Object keys are content
//! addressed within a site and month:
//! `sites/{site_id}/{folder}/{yyyy}/{mm}/{sha256[..16]}.{ext}`.

pub mod backend;

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Datelike, Utc};
use serde::Serialize;
use sha2::{Digest, Sha256};
use thiserror::Error;
use uuid::Uuid;

use crate::config::{StorageConfig, StorageProvider};

pub use backend::ObjectImageStorage;

pub const DEFAULT_FOLDER: &str = "images";

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Content type '{0}' is not allowed")]
    InvalidContentType(String),

    #[error("Upload of {size} bytes exceeds the {max} byte limit")]
    TooLarge { size: usize, max: usize },

    #[error("Upload is empty")]
    Empty,

    #[error("Provider '{0}' does not support presigned uploads")]
    PresignUnsupported(String),

    #[error("Object not found: {0}")]
    NotFound(String),

    #[error("Storage configuration error: {0}")]
    Config(String),

    #[error("Storage backend error: {0}")]
    Backend(String),
}

/// Result of a completed upload
#[derive(Debug, Clone, Serialize)]
pub struct StoredObject {
    pub key: String,
    pub url: String,
    pub content_type: String,
    pub size: usize,
}

/// Direct-to-bucket upload grant
#[derive(Debug, Clone, Serialize)]
pub struct PresignedUpload {
    pub key: String,
    pub method: &'static str,
    pub upload_url: String,
    pub public_url: String,
    pub content_type: String,
    pub expires_in: u64,
}

/// Object metadata returned by `head`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectInfo {
    pub size: usize,
}

#[async_trait]
pub trait ImageStorage: Send + Sync {
    fn provider(&self) -> StorageProvider;

    async fn upload(&self, key: &str, body: Bytes, content_type: &str) -> Result<StoredObject, StorageError>;

    async fn delete(&self, key: &str) -> Result<(), StorageError>;

    async fn presign_upload(
        &self,
        key: &str,
        content_type: &str,
        expires_in: Duration,
    ) -> Result<PresignedUpload, StorageError>;

    /// Metadata for an existing object, `None` when absent
    async fn head(&self, key: &str) -> Result<Option<ObjectInfo>, StorageError>;

    /// Read an object back with its content type when the backend records one
    async fn fetch(&self, key: &str) -> Result<(Bytes, Option<String>), StorageError>;

    fn public_url(&self, key: &str) -> String;
}

/// Strip parameters and lowercase a MIME type
pub fn normalize_content_type(content_type: &str) -> String {
    content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase()
}

pub fn validate_content_type(config: &StorageConfig, content_type: &str) -> Result<String, StorageError> {
    let normalized = normalize_content_type(content_type);
    if config.allowed_content_types.iter().any(|allowed| allowed.eq_ignore_ascii_case(&normalized)) {
        Ok(normalized)
    } else {
        Err(StorageError::InvalidContentType(normalized))
    }
}

/// Check size limits and MIME allow-list; returns the normalized content type
pub fn validate_upload(config: &StorageConfig, content_type: &str, size: usize) -> Result<String, StorageError> {
    if size == 0 {
        return Err(StorageError::Empty);
    }
    if size > config.max_upload_bytes {
        return Err(StorageError::TooLarge {
            size,
            max: config.max_upload_bytes,
        });
    }
    validate_content_type(config, content_type)
}

pub fn extension_for(content_type: &str) -> &'static str {
    match normalize_content_type(content_type).as_str() {
        "image/jpeg" | "image/jpg" => "jpg",
        "image/png" => "png",
        "image/webp" => "webp",
        "image/gif" => "gif",
        "image/svg+xml" => "svg",
        "image/avif" => "avif",
        "application/pdf" => "pdf",
        _ => "bin",
    }
}

/// Content type implied by a key's extension, for backends that do not record one
pub fn content_type_for_key(key: &str) -> &'static str {
    match key.rsplit_once('.').map(|(_, ext)| ext.to_ascii_lowercase()).as_deref() {
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("png") => "image/png",
        Some("webp") => "image/webp",
        Some("gif") => "image/gif",
        Some("svg") => "image/svg+xml",
        Some("avif") => "image/avif",
        Some("pdf") => "application/pdf",
        _ => "application/octet-stream",
    }
}

/// Folder names are restricted to `[a-z0-9_-]`; anything else collapses to the default
pub fn sanitize_folder(folder: Option<&str>) -> String {
    let cleaned: String = folder
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase()
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '-' || *c == '_')
        .take(64)
        .collect();
    if cleaned.is_empty() {
        DEFAULT_FOLDER.to_string()
    } else {
        cleaned
    }
}

/// Build the object key for `seed` (file content, or a unique token for presigned uploads)
pub fn object_key(site_id: Uuid, folder: &str, content_type: &str, seed: &[u8], now: DateTime<Utc>) -> String {
    let digest = Sha256::digest(seed);
    let hash = format!("{:x}", digest);
    format!(
        "sites/{}/{}/{:04}/{:02}/{}.{}",
        site_id,
        folder,
        now.year(),
        now.month(),
        &hash[..16],
        extension_for(content_type)
    )
}

/// Keys belong to the site whose id forms their first segment
pub fn key_belongs_to_site(key: &str, site_id: Uuid) -> bool {
    let prefix = format!("sites/{}/", site_id);
    key.starts_with(&prefix) && !key.contains("..") && !key.contains("//")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn storage_config() -> StorageConfig {
        crate::config::AppConfig::development().storage
    }

    #[test]
    fn key_layout_is_content_addressed() {
        let site = Uuid::nil();
        let now = Utc.with_ymd_and_hms(2024, 3, 9, 12, 0, 0).unwrap();
        let key = object_key(site, "products", "image/png", b"pixels", now);
        assert!(key.starts_with("sites/00000000-0000-0000-0000-000000000000/products/2024/03/"));
        assert!(key.ends_with(".png"));
        let hash = key.rsplit('/').next().unwrap().trim_end_matches(".png");
        assert_eq!(hash.len(), 16);
        assert_eq!(key, object_key(site, "products", "image/png", b"pixels", now));
        assert_ne!(key, object_key(site, "products", "image/png", b"other", now));
    }

    #[test]
    fn validates_uploads() {
        let config = storage_config();
        assert_eq!(validate_upload(&config, "Image/JPEG; charset=binary", 10).unwrap(), "image/jpeg");
        assert!(matches!(validate_upload(&config, "image/png", 0), Err(StorageError::Empty)));
        assert!(matches!(
            validate_upload(&config, "application/x-msdownload", 10),
            Err(StorageError::InvalidContentType(_))
        ));
        let too_big = config.max_upload_bytes + 1;
        assert!(matches!(
            validate_upload(&config, "image/png", too_big),
            Err(StorageError::TooLarge { .. })
        ));
    }

    #[test]
    fn folders_are_sanitized() {
        assert_eq!(sanitize_folder(None), "images");
        assert_eq!(sanitize_folder(Some("../../etc")), "etc");
        assert_eq!(sanitize_folder(Some("Banners_2024")), "banners_2024");
        assert_eq!(sanitize_folder(Some("///")), "images");
    }

    #[test]
    fn keys_are_scoped_to_site() {
        let site = Uuid::new_v4();
        let other = Uuid::new_v4();
        let key = object_key(site, "images", "image/webp", b"x", Utc::now());
        assert!(key_belongs_to_site(&key, site));
        assert!(!key_belongs_to_site(&key, other));
        assert!(!key_belongs_to_site(&format!("sites/{}/../x.png", site), site));
    }

    #[test]
    fn extensions_follow_content_type() {
        assert_eq!(extension_for("image/jpeg"), "jpg");
        assert_eq!(extension_for("image/svg+xml"), "svg");
        assert_eq!(extension_for("text/plain"), "bin");
    }

    #[test]
    fn key_extension_maps_back_to_content_type() {
        assert_eq!(content_type_for_key("sites/a/images/2024/01/ab.PNG"), "image/png");
        assert_eq!(content_type_for_key("sites/a/docs/2024/01/ab.pdf"), "application/pdf");
        assert_eq!(content_type_for_key("noext"), "application/octet-stream");
    }
}
