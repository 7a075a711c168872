//! Shared helpers for integration tests
#![allow(dead_code)]

use linklet::models::{NewLink, NewQrCode};
use linklet::storage::{SqliteStore, Store};
use std::sync::Arc;
use tempfile::TempDir;

/// Create a file-backed test store. Pooled `sqlite::memory:` databases do
/// not share state across connections, so concurrency tests need a real
/// file. The TempDir must be kept alive for the duration of the test.
pub async fn create_test_store() -> (Arc<dyn Store>, TempDir) {
    let dir = tempfile::tempdir().expect("create temp dir");
    let url = format!("sqlite://{}", dir.path().join("test.db").display());
    let store = SqliteStore::new(&url, 5).await.expect("open test db");
    store.init().await.expect("init schema");
    (Arc::new(store), dir)
}

pub fn new_link(owner: &str, code: &str, destination: &str) -> NewLink {
    NewLink {
        owner_id: owner.to_string(),
        custom_code: Some(code.to_string()),
        destination: destination.to_string(),
        title: String::new(),
        qr_code_ref: None,
        is_qr_hosting: false,
        tags: Vec::new(),
    }
}

pub fn new_qr(owner: &str, code: &str, destination: &str) -> NewQrCode {
    NewQrCode {
        owner_id: owner.to_string(),
        custom_code: Some(code.to_string()),
        destination: destination.to_string(),
        title: String::new(),
        attached_link_code: None,
        styling: None,
        tags: Vec::new(),
    }
}
