use crate::analytics::filters::{LinkFilter, QrCodeFilter, Sort};
use crate::models::{
    ClickEvent, ClickTarget, Link, NewClickEvent, NewLink, NewQrCode, QrCode, RateLimitRecord, Tag,
};
use crate::ratelimit::RateLimitPolicy;
use anyhow::Result;
use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("unique constraint violated")]
    Conflict,
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type StorageResult<T> = Result<T, StorageError>;

/// Persistent store shared by all components. Constructed explicitly and
/// injected; there is no process-global handle.
#[async_trait]
pub trait Store: Send + Sync {
    /// Initialize the storage (create schema, etc.)
    async fn init(&self) -> Result<()>;

    /// Create a link. Fails with [`StorageError::Conflict`] when the short
    /// code is already taken; never overwrites. When the link references a
    /// QR code, the reverse side of the pairing is set in the same
    /// transaction.
    async fn create_link(&self, link: &NewLink) -> StorageResult<Link>;

    /// Create a QR code; pairing handled symmetrically to [`Store::create_link`]
    async fn create_qr_code(&self, qr: &NewQrCode) -> StorageResult<QrCode>;

    /// Get a link by short code, with its tags
    async fn get_link(&self, code: &str) -> Result<Option<Link>>;

    /// Get a QR code by its own code, with its tags
    async fn get_qr_code(&self, code: &str) -> Result<Option<QrCode>>;

    /// Delete a link. Clears `attached_link_code` on any QR code that
    /// referenced it so the pairing never dangles. Returns false when the
    /// code did not exist.
    async fn delete_link(&self, code: &str) -> Result<bool>;

    /// Delete a QR code, clearing `qr_code_ref` on any paired link
    async fn delete_qr_code(&self, code: &str) -> Result<bool>;

    /// Create an owner-scoped tag; name is unique per owner
    async fn create_tag(&self, owner_id: &str, name: &str) -> StorageResult<Tag>;

    /// Append one event to the target entity and increment its aggregate,
    /// as a single atomic update against that entity
    async fn record_click(&self, target: &ClickTarget, event: &NewClickEvent) -> Result<()>;

    /// Stored events for one entity, newest first
    async fn click_events(&self, target: &ClickTarget, limit: i64) -> Result<Vec<ClickEvent>>;

    /// One page of links matching the filter
    async fn list_links(
        &self,
        filter: &LinkFilter,
        sort: Sort,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Link>>;

    /// Total links matching the filter (same predicate as [`Store::list_links`])
    async fn count_links(&self, filter: &LinkFilter) -> Result<i64>;

    /// One page of QR codes matching the filter
    async fn list_qr_codes(
        &self,
        filter: &QrCodeFilter,
        sort: Sort,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<QrCode>>;

    /// Total QR codes matching the filter
    async fn count_qr_codes(&self, filter: &QrCodeFilter) -> Result<i64>;

    /// Apply one rate-limit attempt for the identifier and return the
    /// post-transition record. The state transition (window reset,
    /// increment, block) happens atomically in the store so two concurrent
    /// attempts can never both consume the last slot.
    async fn rate_limit_attempt(
        &self,
        identifier: &str,
        policy: &RateLimitPolicy,
        now: i64,
    ) -> Result<RateLimitRecord>;

    /// Clear all rate-limit state for the identifier
    async fn reset_rate_limit(&self, identifier: &str) -> Result<()>;
}
