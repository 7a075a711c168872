pub mod cached;
pub mod sqlite;
pub mod trait_def;

pub use cached::CachedStore;
pub use sqlite::SqliteStore;
pub use trait_def::{StorageError, StorageResult, Store};
