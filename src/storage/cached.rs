use crate::analytics::filters::{LinkFilter, QrCodeFilter, Sort};
use crate::models::{
    ClickEvent, ClickTarget, Link, NewClickEvent, NewLink, NewQrCode, QrCode, RateLimitRecord, Tag,
};
use crate::ratelimit::RateLimitPolicy;
use crate::storage::{Store, StorageResult};
use anyhow::Result;
use async_trait::async_trait;
use moka::future::Cache;
use std::sync::Arc;
use std::time::Duration;

/// Store wrapper adding a read-through cache over the redirect hot path.
///
/// Only the by-code lookups are cached; list/count queries, event reads and
/// rate-limit state always hit the underlying store. Click recording goes
/// straight through so the append-and-increment stays a single atomic
/// update; cached aggregate counts may lag by one cache TTL, which is fine
/// for dashboard reads.
pub struct CachedStore {
    inner: Arc<dyn Store>,
    link_cache: Cache<String, Option<Link>>,
    qr_cache: Cache<String, Option<QrCode>>,
}

impl CachedStore {
    pub fn new(inner: Arc<dyn Store>, max_entries: u64, ttl_secs: u64) -> Self {
        let link_cache = Cache::builder()
            .max_capacity(max_entries)
            .time_to_live(Duration::from_secs(ttl_secs))
            .build();
        let qr_cache = Cache::builder()
            .max_capacity(max_entries)
            .time_to_live(Duration::from_secs(ttl_secs))
            .build();

        Self {
            inner,
            link_cache,
            qr_cache,
        }
    }
}

#[async_trait]
impl Store for CachedStore {
    async fn init(&self) -> Result<()> {
        self.inner.init().await
    }

    async fn create_link(&self, link: &NewLink) -> StorageResult<Link> {
        let created = self.inner.create_link(link).await?;

        // Drop any cached negative entry and prime the cache
        self.link_cache
            .insert(created.code.clone(), Some(created.clone()))
            .await;
        if let Some(qr_ref) = &created.qr_code_ref {
            self.qr_cache.invalidate(qr_ref).await;
        }

        Ok(created)
    }

    async fn create_qr_code(&self, qr: &NewQrCode) -> StorageResult<QrCode> {
        let created = self.inner.create_qr_code(qr).await?;

        self.qr_cache
            .insert(created.code.clone(), Some(created.clone()))
            .await;
        if let Some(link_code) = &created.attached_link_code {
            self.link_cache.invalidate(link_code).await;
        }

        Ok(created)
    }

    async fn get_link(&self, code: &str) -> Result<Option<Link>> {
        if let Some(cached) = self.link_cache.get(code).await {
            return Ok(cached);
        }

        let result = self.inner.get_link(code).await?;
        self.link_cache
            .insert(code.to_string(), result.clone())
            .await;

        Ok(result)
    }

    async fn get_qr_code(&self, code: &str) -> Result<Option<QrCode>> {
        if let Some(cached) = self.qr_cache.get(code).await {
            return Ok(cached);
        }

        let result = self.inner.get_qr_code(code).await?;
        self.qr_cache
            .insert(code.to_string(), result.clone())
            .await;

        Ok(result)
    }

    async fn delete_link(&self, code: &str) -> Result<bool> {
        let deleted = self.inner.delete_link(code).await?;

        if deleted {
            self.link_cache.invalidate(code).await;
            // The paired QR code lost its attached_link_code
            self.qr_cache.invalidate_all();
        }

        Ok(deleted)
    }

    async fn delete_qr_code(&self, code: &str) -> Result<bool> {
        let deleted = self.inner.delete_qr_code(code).await?;

        if deleted {
            self.qr_cache.invalidate(code).await;
            self.link_cache.invalidate_all();
        }

        Ok(deleted)
    }

    async fn create_tag(&self, owner_id: &str, name: &str) -> StorageResult<Tag> {
        self.inner.create_tag(owner_id, name).await
    }

    async fn record_click(&self, target: &ClickTarget, event: &NewClickEvent) -> Result<()> {
        self.inner.record_click(target, event).await
    }

    async fn click_events(&self, target: &ClickTarget, limit: i64) -> Result<Vec<ClickEvent>> {
        self.inner.click_events(target, limit).await
    }

    async fn list_links(
        &self,
        filter: &LinkFilter,
        sort: Sort,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Link>> {
        self.inner.list_links(filter, sort, limit, offset).await
    }

    async fn count_links(&self, filter: &LinkFilter) -> Result<i64> {
        self.inner.count_links(filter).await
    }

    async fn list_qr_codes(
        &self,
        filter: &QrCodeFilter,
        sort: Sort,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<QrCode>> {
        self.inner.list_qr_codes(filter, sort, limit, offset).await
    }

    async fn count_qr_codes(&self, filter: &QrCodeFilter) -> Result<i64> {
        self.inner.count_qr_codes(filter).await
    }

    async fn rate_limit_attempt(
        &self,
        identifier: &str,
        policy: &RateLimitPolicy,
        now: i64,
    ) -> Result<RateLimitRecord> {
        self.inner.rate_limit_attempt(identifier, policy, now).await
    }

    async fn reset_rate_limit(&self, identifier: &str) -> Result<()> {
        self.inner.reset_rate_limit(identifier).await
    }
}
