use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::http::Method;
use bytes::Bytes;
use object_store::aws::AmazonS3Builder;
use object_store::local::LocalFileSystem;
use object_store::memory::InMemory;
use object_store::path::Path as ObjectPath;
use object_store::signer::Signer;
use object_store::{Attribute, AttributeValue, Attributes, ObjectStore, PutOptions, PutPayload};
use tracing::{debug, info};

use super::{ImageStorage, ObjectInfo, PresignedUpload, StorageError, StoredObject};
use crate::config::{StorageConfig, StorageProvider};

/// `ImageStorage` over the `object_store` backends
pub struct ObjectImageStorage {
    provider: StorageProvider,
    store: Arc<dyn ObjectStore>,
    signer: Option<Arc<dyn Signer>>,
    public_base: String,
}

impl ObjectImageStorage {
    pub fn from_config(config: &StorageConfig) -> Result<Self, StorageError> {
        let storage = match config.provider {
            StorageProvider::S3 => Self::s3(config)?,
            StorageProvider::Oss => Self::oss(config)?,
            StorageProvider::Local => Self::local(config)?,
            StorageProvider::Memory => Self::in_memory(config.public_base_url.as_deref()),
        };
        info!(
            provider = storage.provider.as_str(),
            "Media storage ready, public base {}",
            storage.public_base
        );
        Ok(storage)
    }

    /// Volatile store for tests and throwaway runs
    pub fn in_memory(public_base_url: Option<&str>) -> Self {
        Self {
            provider: StorageProvider::Memory,
            store: Arc::new(InMemory::new()),
            signer: None,
            public_base: trim_base(public_base_url.unwrap_or("/media")),
        }
    }

    fn s3(config: &StorageConfig) -> Result<Self, StorageError> {
        require_bucket(config)?;
        let mut builder = credentials(
            AmazonS3Builder::new()
                .with_bucket_name(&config.bucket)
                .with_region(&config.region),
            config,
        );

        // Custom endpoint for MinIO and friends uses path-style requests
        if let Some(endpoint) = &config.endpoint {
            builder = builder
                .with_endpoint(endpoint)
                .with_virtual_hosted_style_request(false)
                .with_allow_http(endpoint.starts_with("http://"));
        }

        let s3 = Arc::new(
            builder
                .build()
                .map_err(|e| StorageError::Config(format!("Failed to create S3 store: {}", e)))?,
        );

        let public_base = match (&config.public_base_url, &config.endpoint) {
            (Some(base), _) => trim_base(base),
            (None, Some(endpoint)) => format!("{}/{}", trim_base(endpoint), config.bucket),
            (None, None) => format!("https://{}.s3.{}.amazonaws.com", config.bucket, config.region),
        };

        Ok(Self {
            provider: StorageProvider::S3,
            store: s3.clone(),
            signer: Some(s3),
            public_base,
        })
    }

    /// Aliyun OSS through its S3-compatible API. OSS only accepts
    /// virtual-hosted requests, so the bucket is folded into the endpoint.
    fn oss(config: &StorageConfig) -> Result<Self, StorageError> {
        require_bucket(config)?;
        let endpoint = config
            .endpoint
            .as_deref()
            .ok_or_else(|| StorageError::Config("STORAGE_ENDPOINT is required for OSS".to_string()))?;
        let bucket_endpoint = virtual_hosted_endpoint(endpoint, &config.bucket)?;

        let builder = credentials(
            AmazonS3Builder::new()
                .with_bucket_name(&config.bucket)
                .with_region(&config.region)
                .with_endpoint(&bucket_endpoint)
                .with_virtual_hosted_style_request(true),
            config,
        );

        let oss = Arc::new(
            builder
                .build()
                .map_err(|e| StorageError::Config(format!("Failed to create OSS store: {}", e)))?,
        );

        let public_base = config
            .public_base_url
            .as_deref()
            .map(trim_base)
            .unwrap_or(bucket_endpoint);

        Ok(Self {
            provider: StorageProvider::Oss,
            store: oss.clone(),
            signer: Some(oss),
            public_base,
        })
    }

    fn local(config: &StorageConfig) -> Result<Self, StorageError> {
        std::fs::create_dir_all(&config.local_root).map_err(|e| {
            StorageError::Config(format!(
                "Failed to create local storage directory '{}': {}",
                config.local_root, e
            ))
        })?;

        let store = LocalFileSystem::new_with_prefix(&config.local_root)
            .map_err(|e| StorageError::Config(format!("Failed to create local file store: {}", e)))?;

        Ok(Self {
            provider: StorageProvider::Local,
            store: Arc::new(store),
            signer: None,
            public_base: trim_base(config.public_base_url.as_deref().unwrap_or("/media")),
        })
    }

    fn object_path(key: &str) -> Result<ObjectPath, StorageError> {
        ObjectPath::parse(key).map_err(|e| StorageError::Backend(format!("Invalid object key '{}': {}", key, e)))
    }
}

#[async_trait]
impl ImageStorage for ObjectImageStorage {
    fn provider(&self) -> StorageProvider {
        self.provider
    }

    async fn upload(&self, key: &str, body: Bytes, content_type: &str) -> Result<StoredObject, StorageError> {
        let path = Self::object_path(key)?;
        let size = body.len();

        // The local filesystem backend cannot persist object attributes
        let mut opts = PutOptions::default();
        if self.provider != StorageProvider::Local {
            let mut attributes = Attributes::new();
            attributes.insert(Attribute::ContentType, AttributeValue::from(content_type.to_string()));
            opts.attributes = attributes;
        }

        self.store
            .put_opts(&path, PutPayload::from(body), opts)
            .await
            .map_err(|e| StorageError::Backend(format!("Failed to upload '{}': {}", key, e)))?;

        debug!(provider = self.provider.as_str(), size, "Stored object {}", key);

        Ok(StoredObject {
            key: key.to_string(),
            url: self.public_url(key),
            content_type: content_type.to_string(),
            size,
        })
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        let path = Self::object_path(key)?;
        match self.store.delete(&path).await {
            Ok(()) => Ok(()),
            Err(object_store::Error::NotFound { .. }) => Err(StorageError::NotFound(key.to_string())),
            Err(e) => Err(StorageError::Backend(format!("Failed to delete '{}': {}", key, e))),
        }
    }

    async fn presign_upload(
        &self,
        key: &str,
        content_type: &str,
        expires_in: Duration,
    ) -> Result<PresignedUpload, StorageError> {
        let signer = self
            .signer
            .as_ref()
            .ok_or_else(|| StorageError::PresignUnsupported(self.provider.as_str().to_string()))?;
        let path = Self::object_path(key)?;

        let url = signer
            .signed_url(Method::PUT, &path, expires_in)
            .await
            .map_err(|e| StorageError::Backend(format!("Failed to presign '{}': {}", key, e)))?;

        Ok(PresignedUpload {
            key: key.to_string(),
            method: "PUT",
            upload_url: url.to_string(),
            public_url: self.public_url(key),
            content_type: content_type.to_string(),
            expires_in: expires_in.as_secs(),
        })
    }

    async fn head(&self, key: &str) -> Result<Option<ObjectInfo>, StorageError> {
        let path = Self::object_path(key)?;
        match self.store.head(&path).await {
            Ok(meta) => Ok(Some(ObjectInfo { size: meta.size })),
            Err(object_store::Error::NotFound { .. }) => Ok(None),
            Err(e) => Err(StorageError::Backend(format!("Failed to stat '{}': {}", key, e))),
        }
    }

    async fn fetch(&self, key: &str) -> Result<(Bytes, Option<String>), StorageError> {
        let path = Self::object_path(key)?;
        let result = match self.store.get(&path).await {
            Ok(result) => result,
            Err(object_store::Error::NotFound { .. }) => return Err(StorageError::NotFound(key.to_string())),
            Err(e) => return Err(StorageError::Backend(format!("Failed to read '{}': {}", key, e))),
        };

        let content_type = result.attributes.get(&Attribute::ContentType).map(|v| v.to_string());
        let body = result
            .bytes()
            .await
            .map_err(|e| StorageError::Backend(format!("Failed to read '{}': {}", key, e)))?;
        Ok((body, content_type))
    }

    fn public_url(&self, key: &str) -> String {
        format!("{}/{}", self.public_base, key)
    }
}

fn credentials(mut builder: AmazonS3Builder, config: &StorageConfig) -> AmazonS3Builder {
    if let Some(key_id) = &config.access_key_id {
        builder = builder.with_access_key_id(key_id);
    }
    if let Some(secret) = &config.secret_access_key {
        builder = builder.with_secret_access_key(secret);
    }
    builder
}

fn require_bucket(config: &StorageConfig) -> Result<(), StorageError> {
    if config.bucket.trim().is_empty() {
        return Err(StorageError::Config("STORAGE_BUCKET is not set".to_string()));
    }
    Ok(())
}

fn trim_base(base: &str) -> String {
    base.trim().trim_end_matches('/').to_string()
}

/// `https://oss-cn-hangzhou.aliyuncs.com` + `media` -> `https://media.oss-cn-hangzhou.aliyuncs.com`
fn virtual_hosted_endpoint(endpoint: &str, bucket: &str) -> Result<String, StorageError> {
    let with_scheme = if endpoint.contains("://") {
        endpoint.to_string()
    } else {
        format!("https://{}", endpoint)
    };
    let url = url::Url::parse(&with_scheme)
        .map_err(|e| StorageError::Config(format!("Invalid storage endpoint '{}': {}", endpoint, e)))?;
    let host = url
        .host_str()
        .ok_or_else(|| StorageError::Config(format!("Storage endpoint '{}' has no host", endpoint)))?;

    let prefix = format!("{}.", bucket);
    let host = if host.starts_with(&prefix) {
        host.to_string()
    } else {
        format!("{}{}", prefix, host)
    };

    Ok(match url.port() {
        Some(port) => format!("{}://{}:{}", url.scheme(), host, port),
        None => format!("{}://{}", url.scheme(), host),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;

    #[tokio::test]
    async fn memory_backend_round_trip() {
        let storage = ObjectImageStorage::in_memory(Some("https://cdn.example.com/"));
        let key = "sites/abc/images/2024/01/0123456789abcdef.png";

        let stored = storage
            .upload(key, Bytes::from_static(b"\x89PNG"), "image/png")
            .await
            .unwrap();
        assert_eq!(stored.size, 4);
        assert_eq!(stored.url, format!("https://cdn.example.com/{}", key));

        assert_eq!(storage.head(key).await.unwrap(), Some(ObjectInfo { size: 4 }));
        let (body, content_type) = storage.fetch(key).await.unwrap();
        assert_eq!(&body[..], b"\x89PNG");
        assert_eq!(content_type.as_deref(), Some("image/png"));

        storage.delete(key).await.unwrap();
        assert_eq!(storage.head(key).await.unwrap(), None);
        assert!(matches!(storage.fetch(key).await, Err(StorageError::NotFound(_))));
    }

    #[tokio::test]
    async fn memory_backend_cannot_presign() {
        let storage = ObjectImageStorage::in_memory(None);
        let err = storage
            .presign_upload("sites/a/images/x.png", "image/png", Duration::from_secs(60))
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::PresignUnsupported(p) if p == "memory"));
    }

    #[tokio::test]
    async fn s3_presigns_put_urls() {
        let mut config = AppConfig::development().storage;
        config.provider = StorageProvider::S3;
        config.bucket = "catalog-media".to_string();
        config.region = "eu-west-1".to_string();
        config.public_base_url = None;
        config.access_key_id = Some("AKIDEXAMPLE".to_string());
        config.secret_access_key = Some("secret".to_string());

        let storage = ObjectImageStorage::from_config(&config).unwrap();
        assert_eq!(
            storage.public_url("sites/a/b.png"),
            "https://catalog-media.s3.eu-west-1.amazonaws.com/sites/a/b.png"
        );

        let grant = storage
            .presign_upload("sites/a/b.png", "image/png", Duration::from_secs(300))
            .await
            .unwrap();
        assert_eq!(grant.method, "PUT");
        assert!(grant.upload_url.contains("X-Amz-Signature="));
        assert!(grant.upload_url.contains("sites/a/b.png"));
        assert_eq!(grant.expires_in, 300);
    }

    #[test]
    fn oss_endpoint_is_virtual_hosted() {
        assert_eq!(
            virtual_hosted_endpoint("https://oss-cn-hangzhou.aliyuncs.com", "media").unwrap(),
            "https://media.oss-cn-hangzhou.aliyuncs.com"
        );
        assert_eq!(
            virtual_hosted_endpoint("oss-cn-shanghai.aliyuncs.com/", "media").unwrap(),
            "https://media.oss-cn-shanghai.aliyuncs.com"
        );
        assert_eq!(
            virtual_hosted_endpoint("https://media.oss-cn-beijing.aliyuncs.com", "media").unwrap(),
            "https://media.oss-cn-beijing.aliyuncs.com"
        );
    }

    #[test]
    fn oss_requires_endpoint() {
        let mut config = AppConfig::development().storage;
        config.provider = StorageProvider::Oss;
        config.endpoint = None;
        assert!(matches!(ObjectImageStorage::from_config(&config), Err(StorageError::Config(_))));
    }
}
