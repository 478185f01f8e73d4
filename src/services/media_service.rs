use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use chrono::Utc;
use serde::Deserialize;
use sqlx::PgPool;
use tracing::{error, info};
use uuid::Uuid;

use super::ServiceError;
use crate::config::{ListingConfig, StorageConfig};
use crate::database::listing::{Page, Paginated};
use crate::database::models::MediaAsset;
use crate::media::{
    key_belongs_to_site, object_key, sanitize_folder, validate_content_type, validate_upload, ImageStorage,
    PresignedUpload, StorageError, DEFAULT_FOLDER,
};

#[derive(Debug, Clone, Deserialize)]
pub struct PresignRequest {
    pub filename: Option<String>,
    pub content_type: String,
    pub folder: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RegisterMedia {
    pub key: String,
    pub content_type: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct MediaFilter {
    pub page: Option<u32>,
    pub page_size: Option<u32>,
    pub folder: Option<String>,
}

/// Folder segment of `sites/{site}/{folder}/...`
fn folder_from_key(key: &str) -> String {
    key.split('/')
        .nth(2)
        .filter(|segment| !segment.is_empty())
        .unwrap_or(DEFAULT_FOLDER)
        .to_string()
}

pub struct MediaService {
    pool: PgPool,
    storage: Arc<dyn ImageStorage>,
    config: StorageConfig,
}

impl MediaService {
    pub fn new(pool: PgPool, storage: Arc<dyn ImageStorage>, config: StorageConfig) -> Self {
        Self { pool, storage, config }
    }

    /// Store an uploaded file and record it; identical content maps to the existing record
    pub async fn upload(
        &self,
        site_id: Uuid,
        uploaded_by: Option<Uuid>,
        folder: Option<&str>,
        content_type: &str,
        body: Bytes,
    ) -> Result<MediaAsset, ServiceError> {
        let content_type = validate_upload(&self.config, content_type, body.len())?;
        let folder = sanitize_folder(folder);
        let key = object_key(site_id, &folder, &content_type, &body, Utc::now());

        let stored = self.storage.upload(&key, body, &content_type).await?;
        self.record(site_id, uploaded_by, &stored.key, &stored.url, &content_type, stored.size, &folder)
            .await
    }

    /// Grant a direct-to-bucket upload; the client registers the key afterwards
    pub async fn presign(&self, site_id: Uuid, input: PresignRequest) -> Result<PresignedUpload, ServiceError> {
        let content_type = validate_content_type(&self.config, &input.content_type)?;
        let folder = sanitize_folder(input.folder.as_deref());

        let mut seed = Uuid::new_v4().as_bytes().to_vec();
        if let Some(filename) = &input.filename {
            seed.extend_from_slice(filename.as_bytes());
        }
        let key = object_key(site_id, &folder, &content_type, &seed, Utc::now());

        let grant = self
            .storage
            .presign_upload(&key, &content_type, Duration::from_secs(self.config.presign_expiry_secs))
            .await?;
        info!(site_id = %site_id, provider = self.storage.provider().as_str(), "Presigned upload for {}", key);
        Ok(grant)
    }

    /// Record an object the client uploaded with a presigned URL
    pub async fn register(
        &self,
        site_id: Uuid,
        uploaded_by: Option<Uuid>,
        input: RegisterMedia,
    ) -> Result<MediaAsset, ServiceError> {
        let key = input.key.trim();
        if !key_belongs_to_site(key, site_id) {
            return Err(ServiceError::Forbidden("Key does not belong to this site".to_string()));
        }
        let content_type = validate_content_type(&self.config, &input.content_type)?;

        let info = self
            .storage
            .head(key)
            .await?
            .ok_or_else(|| ServiceError::field("key", "Object has not been uploaded"))?;
        if info.size > self.config.max_upload_bytes {
            return Err(StorageError::TooLarge {
                size: info.size,
                max: self.config.max_upload_bytes,
            }
            .into());
        }

        let url = self.storage.public_url(key);
        self.record(site_id, uploaded_by, key, &url, &content_type, info.size, &folder_from_key(key))
            .await
    }

    #[allow(clippy::too_many_arguments)]
    async fn record(
        &self,
        site_id: Uuid,
        uploaded_by: Option<Uuid>,
        key: &str,
        url: &str,
        content_type: &str,
        size: usize,
        folder: &str,
    ) -> Result<MediaAsset, ServiceError> {
        let asset = sqlx::query_as::<_, MediaAsset>(
            "INSERT INTO media_assets (site_id, storage_key, url, content_type, size_bytes, folder, uploaded_by)
             VALUES ($1, $2, $3, $4, $5, $6, $7)
             ON CONFLICT (storage_key) DO UPDATE SET url = EXCLUDED.url
             RETURNING *",
        )
        .bind(site_id)
        .bind(key)
        .bind(url)
        .bind(content_type)
        .bind(size as i64)
        .bind(folder)
        .bind(uploaded_by)
        .fetch_one(&self.pool)
        .await?;

        info!(site_id = %site_id, media_id = %asset.id, size, "Recorded media {}", asset.storage_key);
        Ok(asset)
    }

    pub async fn list(
        &self,
        site_id: Uuid,
        filter: &MediaFilter,
        listing: &ListingConfig,
    ) -> Result<Paginated<MediaAsset>, ServiceError> {
        let page = Page::new(filter.page, filter.page_size, listing);
        let folder = filter.folder.as_deref().map(|f| sanitize_folder(Some(f)));

        let (total,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM media_assets WHERE site_id = $1 AND ($2::text IS NULL OR folder = $2)",
        )
        .bind(site_id)
        .bind(&folder)
        .fetch_one(&self.pool)
        .await?;

        let items = sqlx::query_as::<_, MediaAsset>(
            "SELECT * FROM media_assets
             WHERE site_id = $1 AND ($2::text IS NULL OR folder = $2)
             ORDER BY created_at DESC, id
             LIMIT $3 OFFSET $4",
        )
        .bind(site_id)
        .bind(&folder)
        .bind(page.limit())
        .bind(page.offset())
        .fetch_all(&self.pool)
        .await?;

        Ok(Paginated::new(items, total, page))
    }

    /// Remove the record; a storage failure is logged and does not keep the row
    pub async fn delete(&self, site_id: Uuid, id: Uuid) -> Result<(), ServiceError> {
        let asset = sqlx::query_as::<_, MediaAsset>("SELECT * FROM media_assets WHERE site_id = $1 AND id = $2")
            .bind(site_id)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| ServiceError::not_found(format!("Media '{}' not found", id)))?;

        match self.storage.delete(&asset.storage_key).await {
            Ok(()) | Err(StorageError::NotFound(_)) => {}
            Err(e) => error!(site_id = %site_id, media_id = %id, "Failed to delete stored object {}: {}", asset.storage_key, e),
        }

        sqlx::query("DELETE FROM media_assets WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        info!(site_id = %site_id, media_id = %id, "Deleted media {}", asset.storage_key);
        Ok(())
    }

    /// Read an object back for backends without a public origin
    pub async fn fetch(&self, key: &str) -> Result<(Bytes, Option<String>), ServiceError> {
        Ok(self.storage.fetch(key).await?)
    }
}
