//! Read-through cache over the feeds.
//!
//! Whole pages are cached per (feed, page number) for a short TTL. Writers call
//! `invalidate_all` after every successful change, so a reader never sees a page
//! older than the last write it could have observed.

use crate::domain::{Actor, DomainError, Page, Post};
use crate::ports::FeedQuery;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::debug;

/// Default entry lifetime.
pub const DEFAULT_FEED_TTL: Duration = Duration::from_secs(20);

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FeedKey {
    Global(i64),
    Group(String, i64),
    Author(String, i64),
    Following(String, i64),
}

pub struct FeedCache {
    ttl: Duration,
    /// Bumped by every invalidation. A page loaded under an older generation is never stored.
    generation: AtomicU64,
    entries: RwLock<HashMap<FeedKey, (Instant, Page<Post>)>>,
}

impl FeedCache {
    /// A zero `ttl` disables caching.
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            generation: AtomicU64::new(0),
            entries: RwLock::new(HashMap::new()),
        }
    }

    pub fn is_enabled(&self) -> bool {
        !self.ttl.is_zero()
    }

    pub async fn get(&self, key: &FeedKey) -> Option<Page<Post>> {
        if !self.is_enabled() {
            return None;
        }
        let entries = self.entries.read().await;
        match entries.get(key) {
            Some((stored_at, page)) if stored_at.elapsed() < self.ttl => Some(page.clone()),
            _ => None,
        }
    }

    /// Read before loading a page and hand it back to `put`.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    /// Stores `page` unless an invalidation happened since `loaded_at` was read.
    pub async fn put(&self, key: FeedKey, page: Page<Post>, loaded_at: u64) {
        if !self.is_enabled() {
            return;
        }
        let mut entries = self.entries.write().await;
        if self.generation() != loaded_at {
            debug!(?key, "feed page dropped, written after load");
            return;
        }
        entries.retain(|_, (stored_at, _)| stored_at.elapsed() < self.ttl);
        entries.insert(key, (Instant::now(), page));
    }

    pub async fn invalidate_all(&self) {
        let mut entries = self.entries.write().await;
        self.generation.fetch_add(1, Ordering::AcqRel);
        if !entries.is_empty() {
            debug!(dropped = entries.len(), "feed cache invalidated");
            entries.clear();
        }
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }
}

/// Wraps any feed source with a `FeedCache`.
pub struct CachedFeedComposer {
    inner: Arc<dyn FeedQuery>,
    cache: Arc<FeedCache>,
}

impl CachedFeedComposer {
    pub fn new(inner: Arc<dyn FeedQuery>, cache: Arc<FeedCache>) -> Self {
        Self { inner, cache }
    }

    pub fn cache(&self) -> &Arc<FeedCache> {
        &self.cache
    }

    async fn read_through<F>(&self, key: FeedKey, load: F) -> Result<Page<Post>, DomainError>
    where
        F: std::future::Future<Output = Result<Page<Post>, DomainError>> + Send,
    {
        if let Some(page) = self.cache.get(&key).await {
            debug!(?key, "feed cache hit");
            return Ok(page);
        }
        debug!(?key, "feed cache miss");
        let loaded_at = self.cache.generation();
        let page = load.await?;
        self.cache.put(key, page.clone(), loaded_at).await;
        Ok(page)
    }
}

#[async_trait::async_trait]
impl FeedQuery for CachedFeedComposer {
    async fn global_feed(&self, page: i64) -> Result<Page<Post>, DomainError> {
        self.read_through(FeedKey::Global(page), self.inner.global_feed(page))
            .await
    }

    async fn group_feed(&self, slug: &str, page: i64) -> Result<Page<Post>, DomainError> {
        self.read_through(
            FeedKey::Group(slug.to_string(), page),
            self.inner.group_feed(slug, page),
        )
        .await
    }

    async fn author_feed(&self, username: &str, page: i64) -> Result<Page<Post>, DomainError> {
        self.read_through(
            FeedKey::Author(username.to_string(), page),
            self.inner.author_feed(username, page),
        )
        .await
    }

    async fn following_feed(&self, actor: &Actor, page: i64) -> Result<Page<Post>, DomainError> {
        match actor.username() {
            Some(user) => {
                self.read_through(
                    FeedKey::Following(user.to_string(), page),
                    self.inner.following_feed(actor, page),
                )
                .await
            }
            None => self.inner.following_feed(actor, page).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::persistence::memory_store::MemoryStore;
    use crate::domain::{NewPost, Paginator, User};
    use crate::ports::EntityStore;
    use crate::usecases::{AccessPolicy, FeedComposer};
    use chrono::Utc;

    async fn setup(ttl: Duration) -> (Arc<MemoryStore>, CachedFeedComposer) {
        let store = Arc::new(MemoryStore::new());
        store.insert_user(User::new("leo")).await.unwrap();
        let policy = Arc::new(AccessPolicy::new(store.clone()));
        let composer = Arc::new(FeedComposer::new(
            store.clone(),
            policy,
            Paginator::default(),
        ));
        let cached = CachedFeedComposer::new(composer, Arc::new(FeedCache::new(ttl)));
        (store, cached)
    }

    async fn write_post(store: &MemoryStore, text: &str) {
        store
            .insert_post(NewPost {
                text: text.into(),
                author: "leo".into(),
                group_id: None,
                image: None,
                created_at: Utc::now(),
            })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_hit_serves_stale_until_invalidated() {
        let (store, feeds) = setup(DEFAULT_FEED_TTL).await;
        write_post(&store, "first").await;
        assert_eq!(feeds.global_feed(1).await.unwrap().len(), 1);

        // written behind the cache's back
        write_post(&store, "second").await;
        assert_eq!(feeds.global_feed(1).await.unwrap().len(), 1);

        feeds.cache().invalidate_all().await;
        assert_eq!(feeds.global_feed(1).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_zero_ttl_disables_cache() {
        let (store, feeds) = setup(Duration::ZERO).await;
        write_post(&store, "first").await;
        feeds.global_feed(1).await.unwrap();
        write_post(&store, "second").await;
        assert_eq!(feeds.global_feed(1).await.unwrap().len(), 2);
        assert_eq!(feeds.cache().len().await, 0);
    }

    #[tokio::test]
    async fn test_entries_expire() {
        let (store, feeds) = setup(Duration::from_millis(20)).await;
        write_post(&store, "first").await;
        feeds.global_feed(1).await.unwrap();
        write_post(&store, "second").await;
        tokio::time::sleep(Duration::from_millis(40)).await;
        assert_eq!(feeds.global_feed(1).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_errors_are_not_cached() {
        let (store, feeds) = setup(DEFAULT_FEED_TTL).await;
        assert!(feeds.author_feed("ann", 1).await.is_err());
        assert_eq!(feeds.cache().len().await, 0);

        store.insert_user(User::new("ann")).await.unwrap();
        assert!(feeds.author_feed("ann", 1).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_anonymous_following_feed_bypasses_cache() {
        let (_store, feeds) = setup(DEFAULT_FEED_TTL).await;
        assert!(feeds.following_feed(&Actor::Anonymous, 1).await.unwrap().is_empty());
        assert_eq!(feeds.cache().len().await, 0);
    }

    /// Loads the global feed, then parks once until released.
    struct ParkedFeeds {
        inner: FeedComposer,
        armed: std::sync::atomic::AtomicBool,
        loaded: tokio::sync::Notify,
        release: tokio::sync::Notify,
    }

    #[async_trait::async_trait]
    impl FeedQuery for ParkedFeeds {
        async fn global_feed(&self, page: i64) -> Result<Page<Post>, DomainError> {
            let loaded = self.inner.global_feed(page).await;
            if self.armed.swap(false, Ordering::SeqCst) {
                self.loaded.notify_one();
                self.release.notified().await;
            }
            loaded
        }

        async fn group_feed(&self, slug: &str, page: i64) -> Result<Page<Post>, DomainError> {
            self.inner.group_feed(slug, page).await
        }

        async fn author_feed(&self, username: &str, page: i64) -> Result<Page<Post>, DomainError> {
            self.inner.author_feed(username, page).await
        }

        async fn following_feed(
            &self,
            actor: &Actor,
            page: i64,
        ) -> Result<Page<Post>, DomainError> {
            self.inner.following_feed(actor, page).await
        }
    }

    #[tokio::test]
    async fn test_page_loaded_before_a_write_is_not_cached() {
        use crate::adapters::clock::SystemClock;
        use crate::usecases::{MutationService, PostForm};

        let store = Arc::new(MemoryStore::new());
        store.insert_user(User::new("leo")).await.unwrap();
        let policy = Arc::new(AccessPolicy::new(store.clone()));
        let parked = Arc::new(ParkedFeeds {
            inner: FeedComposer::new(store.clone(), policy, Paginator::default()),
            armed: std::sync::atomic::AtomicBool::new(true),
            loaded: tokio::sync::Notify::new(),
            release: tokio::sync::Notify::new(),
        });
        let cache = Arc::new(FeedCache::new(DEFAULT_FEED_TTL));
        let feeds = Arc::new(CachedFeedComposer::new(parked.clone(), cache.clone()));
        let writes = MutationService::new(store.clone(), Arc::new(SystemClock)).with_cache(cache);

        let reader = {
            let feeds = feeds.clone();
            tokio::spawn(async move { feeds.global_feed(1).await })
        };
        parked.loaded.notified().await;

        writes
            .create_post(
                &Actor::user("leo"),
                PostForm {
                    text: "landed mid-read".into(),
                    group_id: None,
                },
                None,
            )
            .await
            .unwrap();
        parked.release.notify_one();

        let before_write = reader.await.unwrap().unwrap();
        assert!(before_write.is_empty());
        assert_eq!(feeds.global_feed(1).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_put_with_outdated_generation_is_dropped() {
        let cache = FeedCache::new(DEFAULT_FEED_TTL);
        let loaded_at = cache.generation();
        cache.invalidate_all().await;
        let empty = Page::new(Vec::new(), Paginator::default().window(0, 1), 0);
        cache.put(FeedKey::Global(1), empty.clone(), loaded_at).await;
        assert_eq!(cache.len().await, 0);

        cache.put(FeedKey::Global(1), empty, cache.generation()).await;
        assert_eq!(cache.len().await, 1);
    }
}
