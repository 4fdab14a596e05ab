//! Read side: paginated feeds plus the profile and single-post views built on them.
//!
//! Every feed is newest first. Page numbers are forgiving: anything below 1
//! means the first page, anything past the end means the last.

use crate::domain::{Actor, Comment, DomainError, Group, Page, Paginator, Post, PostFilter, User};
use crate::ports::{EntityStore, FeedQuery};
use crate::usecases::AccessPolicy;
use serde::Serialize;
use std::sync::Arc;
use tracing::debug;

/// An author's page: their posts and follow counters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProfileView {
    pub author: User,
    pub page: Page<Post>,
    pub post_count: usize,
    pub follower_count: usize,
    pub following_count: usize,
    /// Whether the viewer follows this author.
    pub following: bool,
}

/// A single post with its discussion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PostView {
    pub post: Post,
    pub author: User,
    pub author_post_count: usize,
    /// Oldest first.
    pub comments: Vec<Comment>,
    pub following: bool,
}

pub struct FeedComposer {
    store: Arc<dyn EntityStore>,
    policy: Arc<AccessPolicy>,
    paginator: Paginator,
}

impl FeedComposer {
    pub fn new(
        store: Arc<dyn EntityStore>,
        policy: Arc<AccessPolicy>,
        paginator: Paginator,
    ) -> Self {
        Self {
            store,
            policy,
            paginator,
        }
    }

    pub fn paginator(&self) -> Paginator {
        self.paginator
    }

    async fn page(&self, filter: &PostFilter, requested: i64) -> Result<Page<Post>, DomainError> {
        let page = self
            .store
            .list_page(filter, self.paginator, requested)
            .await?;
        debug!(
            ?filter,
            page = page.number,
            num_pages = page.num_pages,
            total = page.total_count,
            "feed page composed"
        );
        Ok(page)
    }

    pub async fn global_feed(&self, page: i64) -> Result<Page<Post>, DomainError> {
        self.page(&PostFilter::All, page).await
    }

    /// `NotFound` when no group has this slug.
    pub async fn group_feed(&self, slug: &str, page: i64) -> Result<Page<Post>, DomainError> {
        let group = self.store.get_group_by_slug(slug).await?;
        self.page(&PostFilter::Group(group.id), page).await
    }

    /// `NotFound` when the user does not exist.
    pub async fn author_feed(&self, username: &str, page: i64) -> Result<Page<Post>, DomainError> {
        let author = self.store.get_user(username).await?;
        self.page(&PostFilter::Author(author.username), page).await
    }

    /// Posts by everyone `actor` follows. Anonymous actors follow nobody, so
    /// they get an empty page; sending them to a login screen is the caller's call.
    pub async fn following_feed(&self, actor: &Actor, page: i64) -> Result<Page<Post>, DomainError> {
        match actor.username() {
            Some(user) => self.page(&PostFilter::FollowedBy(user.to_string()), page).await,
            None => {
                let window = self.paginator.window(0, page);
                Ok(Page::new(Vec::new(), window, 0))
            }
        }
    }

    pub async fn profile(
        &self,
        viewer: &Actor,
        username: &str,
        page: i64,
    ) -> Result<ProfileView, DomainError> {
        let author = self.store.get_user(username).await?;
        let page = self
            .page(&PostFilter::Author(author.username.clone()), page)
            .await?;
        let follower_count = self.store.count_followers(&author.username).await?;
        let following_count = self.store.count_following(&author.username).await?;
        let following = self.policy.is_following(viewer, &author.username).await?;
        Ok(ProfileView {
            post_count: page.total_count,
            author,
            page,
            follower_count,
            following_count,
            following,
        })
    }

    /// `NotFound` unless the post exists and was written by `username`.
    pub async fn post_detail(
        &self,
        viewer: &Actor,
        username: &str,
        post_id: i64,
    ) -> Result<PostView, DomainError> {
        let post = self.store.get_post(post_id).await?;
        if post.author != username {
            return Err(DomainError::not_found(
                "post",
                format!("{username}/{post_id}"),
            ));
        }
        let author = self.store.get_user(&post.author).await?;
        let author_post_count = self
            .store
            .count_posts(&PostFilter::Author(author.username.clone()))
            .await?;
        let comments = self.store.list_comments(post.id).await?;
        let following = self.policy.is_following(viewer, &author.username).await?;
        Ok(PostView {
            post,
            author,
            author_post_count,
            comments,
            following,
        })
    }

    pub async fn groups(&self) -> Result<Vec<Group>, DomainError> {
        self.store.list_groups().await
    }
}

#[async_trait::async_trait]
impl FeedQuery for FeedComposer {
    async fn global_feed(&self, page: i64) -> Result<Page<Post>, DomainError> {
        FeedComposer::global_feed(self, page).await
    }

    async fn group_feed(&self, slug: &str, page: i64) -> Result<Page<Post>, DomainError> {
        FeedComposer::group_feed(self, slug, page).await
    }

    async fn author_feed(&self, username: &str, page: i64) -> Result<Page<Post>, DomainError> {
        FeedComposer::author_feed(self, username, page).await
    }

    async fn following_feed(&self, actor: &Actor, page: i64) -> Result<Page<Post>, DomainError> {
        FeedComposer::following_feed(self, actor, page).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::clock::ManualClock;
    use crate::adapters::persistence::memory_store::MemoryStore;
    use crate::domain::{NewComment, NewGroup, NewPost};
    use crate::ports::Clock;
    use chrono::{Duration, TimeZone, Utc};

    struct Fixture {
        store: Arc<MemoryStore>,
        clock: ManualClock,
        feeds: FeedComposer,
    }

    async fn fixture(users: &[&str]) -> Fixture {
        let store = Arc::new(MemoryStore::new());
        for name in users {
            store.insert_user(User::new(*name)).await.unwrap();
        }
        let policy = Arc::new(AccessPolicy::new(store.clone()));
        let feeds = FeedComposer::new(store.clone(), policy, Paginator::new(10, 3));
        let clock = ManualClock::new(
            Utc.with_ymd_and_hms(2021, 4, 6, 18, 0, 0).unwrap(),
            Duration::seconds(1),
        );
        Fixture {
            store,
            clock,
            feeds,
        }
    }

    impl Fixture {
        async fn post(&self, author: &str, text: &str, group_id: Option<i64>) -> Post {
            self.store
                .insert_post(NewPost {
                    text: text.into(),
                    author: author.into(),
                    group_id,
                    image: None,
                    created_at: self.clock.now(),
                })
                .await
                .unwrap()
        }
    }

    #[tokio::test]
    async fn test_fifteen_posts_paginate_ten_then_five() {
        let f = fixture(&["leo"]).await;
        for i in 0..15 {
            f.post("leo", &format!("post {i}"), None).await;
        }
        let first = f.feeds.global_feed(1).await.unwrap();
        assert_eq!(first.len(), 10);
        assert_eq!(first.items[0].text, "post 14");
        assert!(first.has_next());
        let second = f.feeds.global_feed(2).await.unwrap();
        assert_eq!(second.len(), 5);
        assert_eq!(second.items[4].text, "post 0");
        assert_eq!(f.feeds.author_feed("leo", 1).await.unwrap().len(), 10);
    }

    #[tokio::test]
    async fn test_thirteen_posts_fold_into_single_page() {
        let f = fixture(&["leo"]).await;
        for i in 0..13 {
            f.post("leo", &format!("post {i}"), None).await;
        }
        let only = f.feeds.global_feed(1).await.unwrap();
        assert_eq!(only.len(), 13);
        assert_eq!(only.num_pages, 1);
        assert!(!only.has_next());
        assert_eq!(f.feeds.global_feed(2).await.unwrap(), only);
    }

    #[tokio::test]
    async fn test_page_numbers_clamp() {
        let f = fixture(&["leo"]).await;
        for i in 0..25 {
            f.post("leo", &format!("post {i}"), None).await;
        }
        assert_eq!(f.feeds.global_feed(0).await.unwrap().number, 1);
        let last = f.feeds.global_feed(500).await.unwrap();
        assert_eq!(last.number, 3);
        assert_eq!(last.len(), 5);
    }

    #[tokio::test]
    async fn test_group_feed_and_missing_slug() {
        let f = fixture(&["ann"]).await;
        let news = f
            .store
            .insert_group(NewGroup {
                title: "News".into(),
                slug: "news".into(),
                description: String::new(),
            })
            .await
            .unwrap();
        let hello = f.post("ann", "hello", Some(news.id)).await;
        f.post("ann", "ungrouped", None).await;

        let page = f.feeds.group_feed("news", 1).await.unwrap();
        assert_eq!(page.items, vec![hello]);
        let err = f.feeds.group_feed("missing-slug", 1).await.unwrap_err();
        assert!(matches!(err, DomainError::NotFound { entity: "group", .. }));
    }

    #[tokio::test]
    async fn test_author_feed_unknown_user() {
        let f = fixture(&["ann"]).await;
        let err = f.feeds.author_feed("nobody", 1).await.unwrap_err();
        assert!(matches!(err, DomainError::NotFound { entity: "user", .. }));
    }

    #[tokio::test]
    async fn test_following_feed_contains_only_followed_authors() {
        let f = fixture(&["ann", "bob", "cat"]).await;
        f.store.insert_follow("ann", "bob").await.unwrap();
        let b1 = f.post("bob", "b1", None).await;
        f.post("cat", "c1", None).await;
        f.post("ann", "mine", None).await;
        let b2 = f.post("bob", "b2", None).await;

        let feed = f.feeds.following_feed(&Actor::user("ann"), 1).await.unwrap();
        assert_eq!(feed.items, vec![b2, b1]);

        let nobody = f.feeds.following_feed(&Actor::user("cat"), 1).await.unwrap();
        assert!(nobody.is_empty());
        assert_eq!(nobody.number, 1);

        let anonymous = f.feeds.following_feed(&Actor::Anonymous, 1).await.unwrap();
        assert!(anonymous.is_empty());
    }

    #[tokio::test]
    async fn test_profile_reports_following_and_counters() {
        let f = fixture(&["ann", "bob"]).await;
        f.post("bob", "one", None).await;
        f.post("bob", "two", None).await;
        f.store.insert_follow("ann", "bob").await.unwrap();

        let seen_by_ann = f.feeds.profile(&Actor::user("ann"), "bob", 1).await.unwrap();
        assert!(seen_by_ann.following);
        assert_eq!(seen_by_ann.post_count, 2);
        assert_eq!(seen_by_ann.follower_count, 1);
        assert_eq!(seen_by_ann.following_count, 0);

        let seen_by_bob = f.feeds.profile(&Actor::user("bob"), "bob", 1).await.unwrap();
        assert!(!seen_by_bob.following);
        let seen_anonymously = f.feeds.profile(&Actor::Anonymous, "bob", 1).await.unwrap();
        assert!(!seen_anonymously.following);
    }

    #[tokio::test]
    async fn test_post_detail_lists_comments_oldest_first() {
        let f = fixture(&["ann", "bob"]).await;
        let post = f.post("ann", "topic", None).await;
        for text in ["first", "second"] {
            f.store
                .insert_comment(NewComment {
                    post_id: post.id,
                    author: "bob".into(),
                    text: text.into(),
                    created_at: f.clock.now(),
                })
                .await
                .unwrap();
        }
        let view = f
            .feeds
            .post_detail(&Actor::user("bob"), "ann", post.id)
            .await
            .unwrap();
        let texts: Vec<&str> = view.comments.iter().map(|c| c.text.as_str()).collect();
        assert_eq!(texts, vec!["first", "second"]);
        assert_eq!(view.author, User::new("ann"));
        assert_eq!(view.author_post_count, 1);
        assert!(!view.following);
    }

    #[tokio::test]
    async fn test_post_detail_rejects_wrong_author_in_path() {
        let f = fixture(&["ann", "bob"]).await;
        let post = f.post("ann", "topic", None).await;
        let err = f
            .feeds
            .post_detail(&Actor::Anonymous, "bob", post.id)
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::NotFound { entity: "post", .. }));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_page_total_matches_items_under_concurrent_writes() {
        let f = Arc::new(fixture(&["leo"]).await);
        let writer = {
            let f = f.clone();
            tokio::spawn(async move {
                for i in 0..200 {
                    f.post("leo", &format!("post {i}"), None).await;
                }
            })
        };

        let paginator = f.feeds.paginator();
        for _ in 0..200 {
            let page = f.feeds.global_feed(2).await.unwrap();
            let window = paginator.window(page.total_count, 2);
            assert_eq!(page.number, window.number);
            assert_eq!(page.len(), window.limit, "total {}", page.total_count);
            tokio::task::yield_now().await;
        }
        writer.await.unwrap();
    }
}
