use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Deserialize;
use sqlx::PgPool;
use tokio::sync::RwLock;
use tracing::{debug, info};
use uuid::Uuid;

use super::{clean, is_valid_email, ServiceError};
use crate::database::models::Site;

/// Per-host TTL cache for resolved sites. Misses are never cached.
pub struct SiteCache {
    ttl: Duration,
    entries: RwLock<HashMap<String, (Instant, Site)>>,
}

impl SiteCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: RwLock::new(HashMap::new()),
        }
    }

    pub async fn get(&self, host: &str) -> Option<Site> {
        if self.ttl.is_zero() {
            return None;
        }
        let entries = self.entries.read().await;
        entries
            .get(host)
            .filter(|(stored_at, _)| stored_at.elapsed() < self.ttl)
            .map(|(_, site)| site.clone())
    }

    pub async fn insert(&self, host: &str, site: Site) {
        if self.ttl.is_zero() {
            return;
        }
        let mut entries = self.entries.write().await;
        entries.retain(|_, (stored_at, _)| stored_at.elapsed() < self.ttl);
        entries.insert(host.to_string(), (Instant::now(), site));
    }

    pub async fn clear(&self) {
        self.entries.write().await.clear();
    }
}

/// Normalize a Host / X-Forwarded-Host value.
///
/// Takes the first value of a comma list, lowercases, strips the port and a
/// trailing dot. Bracketed IPv6 literals keep their brackets.
pub fn normalize_host(raw: &str) -> Option<String> {
    let first = raw.split(',').next()?.trim().to_ascii_lowercase();
    if first.is_empty() {
        return None;
    }

    let host = if first.starts_with('[') {
        let end = first.find(']')?;
        let (literal, rest) = first.split_at(end + 1);
        if !rest.is_empty() && !is_port_suffix(rest) {
            return None;
        }
        if !literal[1..literal.len() - 1].chars().all(|c| c.is_ascii_hexdigit() || c == ':' || c == '.') {
            return None;
        }
        literal.to_string()
    } else {
        let host = match first.rsplit_once(':') {
            Some((name, port)) if is_port_suffix(&format!(":{}", port)) => name.to_string(),
            Some(_) => return None,
            None => first,
        };
        let host = host.trim_end_matches('.').to_string();
        if host.is_empty() || !host.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '.') {
            return None;
        }
        host
    };

    Some(host)
}

fn is_port_suffix(s: &str) -> bool {
    match s.strip_prefix(':') {
        Some(port) => !port.is_empty() && port.len() <= 5 && port.chars().all(|c| c.is_ascii_digit()),
        None => false,
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateSite {
    pub name: String,
    pub domain: String,
    #[serde(default)]
    pub aliases: Vec<String>,
    pub contact_email: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateSite {
    pub name: Option<String>,
    pub domain: Option<String>,
    pub aliases: Option<Vec<String>>,
    pub contact_email: Option<String>,
    pub is_active: Option<bool>,
}

pub struct SiteService {
    pool: PgPool,
    cache: Arc<SiteCache>,
}

impl SiteService {
    pub fn new(pool: PgPool, cache: Arc<SiteCache>) -> Self {
        Self { pool, cache }
    }

    /// Map an inbound host to its active site
    pub async fn resolve_host(&self, raw_host: &str, default_domain: Option<&str>) -> Result<Site, ServiceError> {
        let host = normalize_host(raw_host).ok_or_else(|| ServiceError::field("host", "Missing or invalid host"))?;

        if let Some(site) = self.cache.get(&host).await {
            return Ok(site);
        }

        let mut site = self.find_active_by_host(&host).await?;
        if site.is_none() {
            if let Some(bare) = host.strip_prefix("www.") {
                site = self.find_active_by_host(bare).await?;
            }
        }
        if site.is_none() {
            if let Some(fallback) = default_domain.and_then(normalize_host).filter(|d| *d != host) {
                debug!("No site for host '{}', falling back to '{}'", host, fallback);
                site = self.find_active_by_host(&fallback).await?;
            }
        }

        let site = site.ok_or_else(|| ServiceError::not_found(format!("No site is configured for host '{}'", host)))?;
        self.cache.insert(&host, site.clone()).await;
        Ok(site)
    }

    async fn find_active_by_host(&self, host: &str) -> Result<Option<Site>, ServiceError> {
        let site = sqlx::query_as::<_, Site>(
            "SELECT * FROM sites
             WHERE is_active AND (domain = $1 OR $1 = ANY(aliases))
             ORDER BY (domain = $1) DESC
             LIMIT 1",
        )
        .bind(host)
        .fetch_optional(&self.pool)
        .await?;
        Ok(site)
    }

    pub async fn get(&self, id: Uuid) -> Result<Site, ServiceError> {
        sqlx::query_as::<_, Site>("SELECT * FROM sites WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| ServiceError::not_found(format!("Site '{}' not found", id)))
    }

    pub async fn list(&self, include_inactive: bool) -> Result<Vec<Site>, ServiceError> {
        let sites = sqlx::query_as::<_, Site>("SELECT * FROM sites WHERE is_active OR $1 ORDER BY name, id")
            .bind(include_inactive)
            .fetch_all(&self.pool)
            .await?;
        Ok(sites)
    }

    pub async fn create(&self, input: CreateSite) -> Result<Site, ServiceError> {
        let name = input.name.trim().to_string();
        if name.is_empty() {
            return Err(ServiceError::field("name", "Name is required"));
        }
        let domain = normalize_domain("domain", &input.domain)?;
        let aliases = normalize_aliases(&input.aliases)?;
        let contact_email = validate_contact(input.contact_email)?;

        let site = sqlx::query_as::<_, Site>(
            "INSERT INTO sites (name, domain, aliases, contact_email)
             VALUES ($1, $2, $3, $4)
             RETURNING *",
        )
        .bind(&name)
        .bind(&domain)
        .bind(&aliases)
        .bind(&contact_email)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| conflict_on_unique(e, format!("Domain '{}' is already registered", domain)))?;

        info!(site_id = %site.id, "Created site '{}' for {}", site.name, site.domain);
        Ok(site)
    }

    pub async fn update(&self, id: Uuid, input: UpdateSite) -> Result<Site, ServiceError> {
        let name = clean(input.name);
        let domain = input.domain.as_deref().map(|d| normalize_domain("domain", d)).transpose()?;
        let aliases = input.aliases.as_deref().map(normalize_aliases).transpose()?;
        let contact_email = validate_contact(input.contact_email)?;

        let site = sqlx::query_as::<_, Site>(
            "UPDATE sites SET
                name = COALESCE($2, name),
                domain = COALESCE($3, domain),
                aliases = COALESCE($4, aliases),
                contact_email = COALESCE($5, contact_email),
                is_active = COALESCE($6, is_active),
                updated_at = now()
             WHERE id = $1
             RETURNING *",
        )
        .bind(id)
        .bind(&name)
        .bind(&domain)
        .bind(&aliases)
        .bind(&contact_email)
        .bind(input.is_active)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| conflict_on_unique(e, "Domain is already registered".to_string()))?
        .ok_or_else(|| ServiceError::not_found(format!("Site '{}' not found", id)))?;

        self.cache.clear().await;
        Ok(site)
    }

    pub async fn deactivate(&self, id: Uuid) -> Result<Site, ServiceError> {
        let site = self
            .update(
                id,
                UpdateSite {
                    is_active: Some(false),
                    ..Default::default()
                },
            )
            .await?;
        info!(site_id = %site.id, "Deactivated site {}", site.domain);
        Ok(site)
    }
}

fn normalize_domain(field: &str, raw: &str) -> Result<String, ServiceError> {
    match normalize_host(raw) {
        Some(host) if host == raw.trim().to_ascii_lowercase().trim_end_matches('.') => Ok(host),
        _ => Err(ServiceError::field(field, "Must be a bare hostname without port or scheme")),
    }
}

fn normalize_aliases(aliases: &[String]) -> Result<Vec<String>, ServiceError> {
    let mut out = Vec::with_capacity(aliases.len());
    for alias in aliases {
        let host = normalize_domain("aliases", alias)?;
        if !out.contains(&host) {
            out.push(host);
        }
    }
    Ok(out)
}

fn validate_contact(email: Option<String>) -> Result<Option<String>, ServiceError> {
    match clean(email) {
        Some(email) if !is_valid_email(&email) => Err(ServiceError::field("contact_email", "Invalid email format")),
        other => Ok(other),
    }
}

/// Unique violations become a domain-specific conflict message
pub(crate) fn conflict_on_unique(err: sqlx::Error, message: String) -> ServiceError {
    match ServiceError::from(err) {
        ServiceError::Database(crate::database::DatabaseError::Conflict(_)) => ServiceError::Conflict(message),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn site(domain: &str) -> Site {
        Site {
            id: Uuid::new_v4(),
            name: "Acme".to_string(),
            domain: domain.to_string(),
            aliases: vec![],
            contact_email: None,
            is_active: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn normalizes_hosts() {
        assert_eq!(normalize_host("Shop.Example.COM:8080").as_deref(), Some("shop.example.com"));
        assert_eq!(normalize_host("shop.example.com.").as_deref(), Some("shop.example.com"));
        assert_eq!(normalize_host(" a.example.com , proxy.internal").as_deref(), Some("a.example.com"));
        assert_eq!(normalize_host("[::1]:3000").as_deref(), Some("[::1]"));
        assert_eq!(normalize_host("[2001:db8::1]").as_deref(), Some("[2001:db8::1]"));
        assert_eq!(normalize_host("localhost").as_deref(), Some("localhost"));
    }

    #[test]
    fn rejects_malformed_hosts() {
        assert_eq!(normalize_host(""), None);
        assert_eq!(normalize_host("  ,x"), None);
        assert_eq!(normalize_host("example.com:http"), None);
        assert_eq!(normalize_host("exa mple.com"), None);
        assert_eq!(normalize_host("[::1]junk"), None);
        assert_eq!(normalize_host("evil.com/path"), None);
    }

    #[test]
    fn domains_must_be_bare() {
        assert_eq!(normalize_domain("domain", "Shop.Example.com").unwrap(), "shop.example.com");
        assert!(normalize_domain("domain", "shop.example.com:443").is_err());
        assert!(normalize_domain("domain", "https://shop.example.com").is_err());
    }

    #[test]
    fn aliases_are_deduplicated() {
        let aliases = normalize_aliases(&["WWW.acme.com".to_string(), "www.acme.com".to_string()]).unwrap();
        assert_eq!(aliases, vec!["www.acme.com".to_string()]);
    }

    #[tokio::test]
    async fn cache_hits_within_ttl() {
        let cache = SiteCache::new(Duration::from_secs(60));
        let stored = site("acme.com");
        cache.insert("acme.com", stored.clone()).await;
        assert_eq!(cache.get("acme.com").await.map(|s| s.id), Some(stored.id));
        assert!(cache.get("other.com").await.is_none());
        cache.clear().await;
        assert!(cache.get("acme.com").await.is_none());
    }

    #[tokio::test]
    async fn cache_entries_expire() {
        let cache = SiteCache::new(Duration::from_millis(20));
        cache.insert("acme.com", site("acme.com")).await;
        tokio::time::sleep(Duration::from_millis(40)).await;
        assert!(cache.get("acme.com").await.is_none());
    }

    #[tokio::test]
    async fn zero_ttl_disables_cache() {
        let cache = SiteCache::new(Duration::ZERO);
        cache.insert("acme.com", site("acme.com")).await;
        assert!(cache.get("acme.com").await.is_none());
    }
}
