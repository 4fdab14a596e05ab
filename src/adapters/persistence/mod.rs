//! Entity store implementations and snapshot files.

pub mod memory_store;
pub mod snapshot_json;
pub mod sqlite_store;

pub use memory_store::MemoryStore;
pub use snapshot_json::SnapshotFile;
pub use sqlite_store::SqliteStore;
