//! Application configuration. Store backend, paths, paging, cache.

use crate::domain::pagination::{DEFAULT_ORPHANS, DEFAULT_PER_PAGE};
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Lifetime of a cached feed page when nothing is configured.
pub const DEFAULT_FEED_CACHE_TTL_SECS: u64 = 20;

/// Which EntityStore backs the application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreKind {
    #[default]
    Memory,
    Sqlite,
}

#[derive(Debug, Deserialize, Default)]
pub struct AppConfig {
    /// Directory for `yatube.db` and exported snapshots. Read from YATUBE_DATA_DIR.
    #[serde(default)]
    pub data_dir: Option<String>,

    /// `memory` or `sqlite`. Read from YATUBE_STORE.
    #[serde(default)]
    pub store: Option<StoreKind>,

    #[serde(default)]
    pub posts_per_page: Option<usize>,

    /// Largest trailing page folded into the previous one.
    #[serde(default)]
    pub page_orphans: Option<usize>,

    /// 0 disables the feed cache. Read from YATUBE_FEED_CACHE_TTL_SECS.
    #[serde(default)]
    pub feed_cache_ttl_secs: Option<u64>,

    /// JSON fixture imported at startup, replacing the store's contents.
    #[serde(default)]
    pub seed_path: Option<String>,

    /// Write `snapshot.json` into the data dir when the session ends.
    #[serde(default)]
    pub export_on_exit: Option<bool>,
}

impl AppConfig {
    /// Reads `.env`, then `YATUBE_*` variables, then the file named by YATUBE_CONFIG if set.
    pub fn load() -> Result<Self, config::ConfigError> {
        dotenv::dotenv().ok();
        let mut c = config::Config::builder();
        c = c.add_source(config::Environment::with_prefix("YATUBE").try_parsing(true));
        if let Ok(path) = std::env::var("YATUBE_CONFIG") {
            c = c.add_source(config::File::with_name(&path));
        }
        c.build()?.try_deserialize()
    }

    pub fn data_dir_or_default(&self) -> PathBuf {
        PathBuf::from(self.data_dir.as_deref().unwrap_or("./data"))
    }

    pub fn store_or_default(&self) -> StoreKind {
        self.store.unwrap_or_default()
    }

    pub fn posts_per_page_or_default(&self) -> usize {
        self.posts_per_page.unwrap_or(DEFAULT_PER_PAGE)
    }

    pub fn page_orphans_or_default(&self) -> usize {
        self.page_orphans.unwrap_or(DEFAULT_ORPHANS)
    }

    pub fn feed_cache_ttl_or_default(&self) -> Duration {
        Duration::from_secs(
            self.feed_cache_ttl_secs
                .unwrap_or(DEFAULT_FEED_CACHE_TTL_SECS),
        )
    }

    pub fn seed_path(&self) -> Option<PathBuf> {
        self.seed_path
            .as_deref()
            .filter(|p| !p.trim().is_empty())
            .map(PathBuf::from)
    }

    pub fn export_on_exit_or_default(&self) -> bool {
        self.export_on_exit.unwrap_or(false)
    }

    /// Where an exit snapshot is written.
    pub fn export_path(&self) -> PathBuf {
        self.data_dir_or_default().join("snapshot.json")
    }
}
