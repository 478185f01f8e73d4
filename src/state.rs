use std::sync::Arc;

use sqlx::PgPool;

use crate::config::AppConfig;
use crate::media::ImageStorage;
use crate::notify::Notifier;
use crate::services::{
    AuthService, CatalogService, DirectoryService, InquiryService, MediaService, SalesService, SiteCache, SiteService,
};

/// Shared handles for every request. Services are built per call from these.
#[derive(Clone)]
pub struct AppState {
    pub db: PgPool,
    pub storage: Arc<dyn ImageStorage>,
    pub notifier: Arc<Notifier>,
    pub site_cache: Arc<SiteCache>,
    pub config: Arc<AppConfig>,
}

impl AppState {
    pub fn new(db: PgPool, storage: Arc<dyn ImageStorage>, notifier: Arc<Notifier>, config: AppConfig) -> Self {
        let site_cache = Arc::new(SiteCache::new(std::time::Duration::from_secs(config.site.cache_ttl_secs)));
        Self {
            db,
            storage,
            notifier,
            site_cache,
            config: Arc::new(config),
        }
    }

    pub fn sites(&self) -> SiteService {
        SiteService::new(self.db.clone(), Arc::clone(&self.site_cache))
    }

    pub fn auth(&self) -> AuthService {
        AuthService::new(self.db.clone())
    }

    pub fn catalog(&self) -> CatalogService {
        CatalogService::new(self.db.clone())
    }

    pub fn directory(&self) -> DirectoryService {
        DirectoryService::new(self.db.clone())
    }

    pub fn sales(&self) -> SalesService {
        SalesService::new(self.db.clone())
    }

    pub fn inquiries(&self) -> InquiryService {
        InquiryService::new(
            self.db.clone(),
            Arc::clone(&self.notifier),
            self.config.inquiry.max_message_chars,
        )
    }

    pub fn media(&self) -> MediaService {
        MediaService::new(self.db.clone(), Arc::clone(&self.storage), self.config.storage.clone())
    }
}
