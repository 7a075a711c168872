//! Analytics query engine integration tests
//!
//! Filters combine with AND, free-text narrows before structured filters,
//! and a page and its total always come from the same predicate.

mod common;

use chrono::{Days, Utc};
use common::{create_test_store, new_link, new_qr};
use linklet::analytics::{
    AnalyticsQueries, DateRange, LinkFilter, Pagination, QrCodeFilter, Sort, SortDir, SortKey,
};
use linklet::models::{now_millis, ClickTarget, NewClickEvent, NewLink, NewQrCode, TagRef};
use linklet::storage::Store;
use std::collections::HashMap;
use std::sync::Arc;

fn owner_filter(owner: &str) -> LinkFilter {
    LinkFilter {
        owner_id: owner.to_string(),
        ..Default::default()
    }
}

fn sample_event() -> NewClickEvent {
    NewClickEvent {
        address: "203.0.113.7".to_string(),
        browser: None,
        os: None,
        device: None,
        referrer: None,
        language: None,
        timezone: None,
        country: None,
        region: None,
        city: None,
        path: None,
        query_params: HashMap::new(),
        created_at: now_millis(),
    }
}

async fn click_n(store: &Arc<dyn Store>, code: &str, n: usize) {
    let target = ClickTarget::Link(code.to_string());
    for _ in 0..n {
        store.record_click(&target, &sample_event()).await.unwrap();
    }
}

/// Seed: three links for owner-1 (one tagged, one custom+QR-attached), one
/// link for another owner that must never leak into owner-1 results
async fn seed(store: &Arc<dyn Store>) -> TagRef {
    let tag = store.create_tag("owner-1", "marketing").await.unwrap();
    let tag = TagRef {
        tag_id: tag.id,
        tag_name: tag.name,
    };

    store
        .create_link(&NewLink {
            title: "Launch post".to_string(),
            tags: vec![tag.clone()],
            ..new_link("owner-1", "launch", "https://blog.example.com/launch")
        })
        .await
        .unwrap();

    store
        .create_qr_code(&new_qr("owner-1", "qr-promo", "https://shop.example.com"))
        .await
        .unwrap();
    store
        .create_link(&NewLink {
            title: "Promo".to_string(),
            qr_code_ref: Some("qr-promo".to_string()),
            is_qr_hosting: true,
            ..new_link("owner-1", "promo", "https://shop.example.com")
        })
        .await
        .unwrap();

    store
        .create_link(&NewLink {
            custom_code: None,
            title: "Docs".to_string(),
            ..new_link("owner-1", "ignored", "https://docs.example.com")
        })
        .await
        .unwrap();

    store
        .create_link(&new_link("owner-2", "foreign", "https://blog.example.com/launch"))
        .await
        .unwrap();

    tag
}

#[tokio::test]
async fn test_owner_scope_is_always_applied() {
    let (store, _dir) = create_test_store().await;
    seed(&store).await;
    let queries = AnalyticsQueries::new(Arc::clone(&store));

    let page = queries
        .query_links(&owner_filter("owner-1"), Sort::default(), Pagination::default())
        .await
        .unwrap();

    assert_eq!(page.total, 3);
    assert!(page.items.iter().all(|l| l.owner_id == "owner-1"));
}

#[tokio::test]
async fn test_free_text_composes_with_structured_filters() {
    let (store, _dir) = create_test_store().await;
    seed(&store).await;
    let queries = AnalyticsQueries::new(Arc::clone(&store));

    // Free text alone: matches destination of "launch" and owner-1 only
    let filter = LinkFilter {
        search: Some("blog.example".to_string()),
        ..owner_filter("owner-1")
    };
    let page = queries
        .query_links(&filter, Sort::default(), Pagination::default())
        .await
        .unwrap();
    assert_eq!(page.total, 1);
    assert_eq!(page.items[0].code, "launch");

    // Free text AND a structured filter that excludes the free-text match
    let filter = LinkFilter {
        search: Some("blog.example".to_string()),
        attached_qr: Some(true),
        ..owner_filter("owner-1")
    };
    let page = queries
        .query_links(&filter, Sort::default(), Pagination::default())
        .await
        .unwrap();
    assert_eq!(page.total, 0);
}

#[tokio::test]
async fn test_free_text_matches_tag_names() {
    let (store, _dir) = create_test_store().await;
    seed(&store).await;
    let queries = AnalyticsQueries::new(Arc::clone(&store));

    let filter = LinkFilter {
        search: Some("marketing".to_string()),
        ..owner_filter("owner-1")
    };
    let page = queries
        .query_links(&filter, Sort::default(), Pagination::default())
        .await
        .unwrap();

    assert_eq!(page.total, 1);
    assert_eq!(page.items[0].code, "launch");
    assert_eq!(page.items[0].tags.len(), 1);
}

#[tokio::test]
async fn test_tag_membership_filter() {
    let (store, _dir) = create_test_store().await;
    let tag = seed(&store).await;
    let queries = AnalyticsQueries::new(Arc::clone(&store));

    let filter = LinkFilter {
        tag_ids: vec![tag.tag_id],
        ..owner_filter("owner-1")
    };
    let page = queries
        .query_links(&filter, Sort::default(), Pagination::default())
        .await
        .unwrap();
    assert_eq!(page.total, 1);
    assert_eq!(page.items[0].code, "launch");

    // Unknown tag id matches nothing
    let filter = LinkFilter {
        tag_ids: vec![9999],
        ..owner_filter("owner-1")
    };
    let page = queries
        .query_links(&filter, Sort::default(), Pagination::default())
        .await
        .unwrap();
    assert_eq!(page.total, 0);
}

#[tokio::test]
async fn test_tri_state_filters() {
    let (store, _dir) = create_test_store().await;
    seed(&store).await;
    let queries = AnalyticsQueries::new(Arc::clone(&store));

    let custom_only = LinkFilter {
        custom_code: Some(true),
        ..owner_filter("owner-1")
    };
    let page = queries
        .query_links(&custom_only, Sort::default(), Pagination::default())
        .await
        .unwrap();
    assert_eq!(page.total, 2);

    let generated_only = LinkFilter {
        custom_code: Some(false),
        ..owner_filter("owner-1")
    };
    let page = queries
        .query_links(&generated_only, Sort::default(), Pagination::default())
        .await
        .unwrap();
    assert_eq!(page.total, 1);
    assert_eq!(page.items[0].title, "Docs");

    let attached = LinkFilter {
        attached_qr: Some(true),
        ..owner_filter("owner-1")
    };
    let page = queries
        .query_links(&attached, Sort::default(), Pagination::default())
        .await
        .unwrap();
    assert_eq!(page.total, 1);
    assert_eq!(page.items[0].code, "promo");
}

#[tokio::test]
async fn test_date_range_inclusive_and_inverted() {
    let (store, _dir) = create_test_store().await;
    seed(&store).await;
    let queries = AnalyticsQueries::new(Arc::clone(&store));

    let today = Utc::now().date_naive();

    // A single-day range covering today includes everything seeded now
    let filter = LinkFilter {
        created: DateRange {
            start: Some(today),
            end: Some(today),
        },
        ..owner_filter("owner-1")
    };
    let page = queries
        .query_links(&filter, Sort::default(), Pagination::default())
        .await
        .unwrap();
    assert_eq!(page.total, 3);

    // Inverted range is applied as given and yields an empty result
    let filter = LinkFilter {
        created: DateRange {
            start: today.checked_add_days(Days::new(1)),
            end: today.checked_sub_days(Days::new(1)),
        },
        ..owner_filter("owner-1")
    };
    let page = queries
        .query_links(&filter, Sort::default(), Pagination::default())
        .await
        .unwrap();
    assert_eq!(page.total, 0);
}

#[tokio::test]
async fn test_sort_by_clicks_both_directions() {
    let (store, _dir) = create_test_store().await;
    seed(&store).await;
    let queries = AnalyticsQueries::new(Arc::clone(&store));

    click_n(&store, "launch", 5).await;
    click_n(&store, "promo", 2).await;

    let sort = Sort {
        key: SortKey::Clicks,
        dir: SortDir::Desc,
    };
    let page = queries
        .query_links(&owner_filter("owner-1"), sort, Pagination::default())
        .await
        .unwrap();
    let clicks: Vec<i64> = page.items.iter().map(|l| l.clicks).collect();
    assert_eq!(clicks, vec![5, 2, 0]);

    let sort = Sort {
        key: SortKey::Clicks,
        dir: SortDir::Asc,
    };
    let page = queries
        .query_links(&owner_filter("owner-1"), sort, Pagination::default())
        .await
        .unwrap();
    let clicks: Vec<i64> = page.items.iter().map(|l| l.clicks).collect();
    assert_eq!(clicks, vec![0, 2, 5]);
}

#[tokio::test]
async fn test_pagination_pages_and_stable_total() {
    let (store, _dir) = create_test_store().await;
    let queries = AnalyticsQueries::new(Arc::clone(&store));

    for i in 0..7 {
        store
            .create_link(&new_link("owner-1", &format!("code-{i}"), "https://example.com"))
            .await
            .unwrap();
    }

    let sort = Sort {
        key: SortKey::CreatedAt,
        dir: SortDir::Asc,
    };

    // total is identical for every page number, including out-of-range pages
    let mut seen = Vec::new();
    for page_no in 1..=4 {
        let page = queries
            .query_links(
                &owner_filter("owner-1"),
                sort,
                Pagination {
                    page: page_no,
                    per_page: 3,
                },
            )
            .await
            .unwrap();
        assert_eq!(page.total, 7);
        seen.extend(page.items.into_iter().map(|l| l.code));
    }

    // 3 + 3 + 1 + 0: no duplicates, no gaps
    assert_eq!(seen.len(), 7);
    let expected: Vec<String> = (0..7).map(|i| format!("code-{i}")).collect();
    assert_eq!(seen, expected);

    // page=1, size=total returns exactly total items
    let page = queries
        .query_links(
            &owner_filter("owner-1"),
            sort,
            Pagination {
                page: 1,
                per_page: 7,
            },
        )
        .await
        .unwrap();
    assert_eq!(page.items.len() as i64, page.total);
}

#[tokio::test]
async fn test_qr_code_queries_parallel_shape() {
    let (store, _dir) = create_test_store().await;
    seed(&store).await;
    let queries = AnalyticsQueries::new(Arc::clone(&store));

    store
        .create_qr_code(&NewQrCode {
            title: "Standalone".to_string(),
            ..new_qr("owner-1", "qr-alone", "https://example.com/alone")
        })
        .await
        .unwrap();

    let filter = QrCodeFilter {
        owner_id: "owner-1".to_string(),
        ..Default::default()
    };
    let page = queries
        .query_qr_codes(&filter, Sort::default(), Pagination::default())
        .await
        .unwrap();
    assert_eq!(page.total, 2);

    // qr-promo gained an attached link during seeding
    let filter = QrCodeFilter {
        owner_id: "owner-1".to_string(),
        attached_link: Some(true),
        ..Default::default()
    };
    let page = queries
        .query_qr_codes(&filter, Sort::default(), Pagination::default())
        .await
        .unwrap();
    assert_eq!(page.total, 1);
    assert_eq!(page.items[0].code, "qr-promo");
    assert_eq!(page.items[0].attached_link_code.as_deref(), Some("promo"));
}

#[tokio::test]
async fn test_events_newest_first_with_limit() {
    let (store, _dir) = create_test_store().await;
    store
        .create_link(&new_link("owner-1", "abc123", "https://example.com"))
        .await
        .unwrap();
    let queries = AnalyticsQueries::new(Arc::clone(&store));

    let target = ClickTarget::Link("abc123".to_string());
    for i in 0..5 {
        let mut event = sample_event();
        event.created_at = 1_000 + i;
        store.record_click(&target, &event).await.unwrap();
    }

    let events = queries.events(&target, 3).await.unwrap();
    assert_eq!(events.len(), 3);
    let stamps: Vec<i64> = events.iter().map(|e| e.created_at).collect();
    assert_eq!(stamps, vec![1_004, 1_003, 1_002]);
}
