//! Filtered, paginated, sorted analytics views over accumulated events.
//!
//! Reads run concurrently with click recording; a query is not guaranteed
//! to reflect events recorded in the same instant, which is acceptable for
//! dashboards.

pub mod filters;

pub use filters::{
    DateRange, LinkFilter, Page, Pagination, QrCodeFilter, Sort, SortDir, SortKey,
};

use crate::models::{ClickEvent, ClickTarget, Link, QrCode};
use crate::storage::Store;
use anyhow::Result;
use std::sync::Arc;

/// Query engine over links and QR codes, with parallel filter shapes
pub struct AnalyticsQueries {
    store: Arc<dyn Store>,
}

impl AnalyticsQueries {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Page of links matching the filter plus the total for the same
    /// filter set. The page and the count use one predicate and are
    /// fetched concurrently, so they are logically consistent.
    pub async fn query_links(
        &self,
        filter: &LinkFilter,
        sort: Sort,
        pagination: Pagination,
    ) -> Result<Page<Link>> {
        let (items, total) = tokio::try_join!(
            self.store
                .list_links(filter, sort, pagination.limit(), pagination.offset()),
            self.store.count_links(filter),
        )?;

        Ok(Page { items, total })
    }

    /// Page of QR codes matching the filter plus the total
    pub async fn query_qr_codes(
        &self,
        filter: &QrCodeFilter,
        sort: Sort,
        pagination: Pagination,
    ) -> Result<Page<QrCode>> {
        let (items, total) = tokio::try_join!(
            self.store
                .list_qr_codes(filter, sort, pagination.limit(), pagination.offset()),
            self.store.count_qr_codes(filter),
        )?;

        Ok(Page { items, total })
    }

    /// Stored events for one entity, newest first
    pub async fn events(&self, target: &ClickTarget, limit: i64) -> Result<Vec<ClickEvent>> {
        self.store.click_events(target, limit).await
    }
}
