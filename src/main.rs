//! Wiring & DI. Entry point: bootstrap adapters, inject into services, run UI.
//! No business logic here.

use dotenv::dotenv;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};
use yatube::adapters::clock::SystemClock;
use yatube::adapters::persistence::{MemoryStore, SnapshotFile, SqliteStore};
use yatube::adapters::ui::tui::TuiInputPort;
use yatube::domain::Paginator;
use yatube::ports::{Clock, EntityStore, FeedQuery, InputPort};
use yatube::shared::config::{AppConfig, StoreKind};
use yatube::usecases::{
    AccessPolicy, AdminService, CachedFeedComposer, FeedCache, FeedComposer, MutationService,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
    let env_loaded = dotenv();
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    match &env_loaded {
        Ok(path) => info!(path = %path.display(), "loaded .env"),
        Err(_) => info!(cwd = %cwd.display(), "no .env found (check CWD)"),
    }

    yatube::adapters::ui::init_ui();

    let cfg = AppConfig::load().unwrap_or_else(|e| {
        warn!(error = %e, "config unreadable, using defaults");
        AppConfig::default()
    });
    let data_dir = cfg.data_dir_or_default();

    // --- Store ---
    let store: Arc<dyn EntityStore> = match cfg.store_or_default() {
        StoreKind::Memory => {
            info!("using in-memory store");
            Arc::new(MemoryStore::new())
        }
        StoreKind::Sqlite => {
            let sqlite = SqliteStore::connect(&data_dir)
                .await
                .map_err(|e| anyhow::anyhow!("SQLite connect failed: {}", e))?;
            info!(path = %data_dir.display(), "using libsql store");
            Arc::new(sqlite)
        }
    };

    if let Some(seed) = cfg.seed_path() {
        SnapshotFile::new(&seed)
            .import_into(store.as_ref())
            .await
            .map_err(|e| anyhow::anyhow!("{}", e))?;
    }

    // --- Services ---
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let paginator = Paginator::new(cfg.posts_per_page_or_default(), cfg.page_orphans_or_default());
    let policy = Arc::new(AccessPolicy::new(Arc::clone(&store)));
    let composer = Arc::new(FeedComposer::new(Arc::clone(&store), policy, paginator));

    let cache_ttl = cfg.feed_cache_ttl_or_default();
    let mut writes = MutationService::new(Arc::clone(&store), clock);
    let mut admin = AdminService::new(Arc::clone(&store));
    let feeds: Arc<dyn FeedQuery> = if cache_ttl.is_zero() {
        info!("feed cache disabled");
        composer.clone()
    } else {
        let cache = Arc::new(FeedCache::new(cache_ttl));
        writes = writes.with_cache(Arc::clone(&cache));
        admin = admin.with_cache(Arc::clone(&cache));
        info!(ttl_secs = cache_ttl.as_secs(), "feed cache enabled");
        Arc::new(CachedFeedComposer::new(composer.clone(), cache))
    };

    let input_port: Arc<dyn InputPort> = Arc::new(TuiInputPort::new(
        feeds,
        composer,
        Arc::new(writes),
        Arc::new(admin),
    ));

    // --- Run (menu loop until Quit) ---
    let outcome = input_port.run().await;

    if cfg.export_on_exit_or_default() {
        SnapshotFile::new(cfg.export_path())
            .export_from(store.as_ref())
            .await
            .map_err(|e| anyhow::anyhow!("{}", e))?;
    }

    outcome.map_err(|e| anyhow::anyhow!("{}", e))?;
    Ok(())
}
