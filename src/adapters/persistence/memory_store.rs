//! Implements EntityStore in process memory.
//!
//! One `RwLock` guards all tables and their secondary indexes, so a reader
//! never sees a record without its index entries. Post indexes are ordered
//! sets keyed newest-first, which makes every feed scan a plain skip/take.

use crate::domain::{
    Comment, DomainError, Follow, Group, NewComment, NewGroup, NewPost, Page, Paginator, Post,
    PostFilter, StoreSnapshot, User,
};
use crate::ports::{EntityStore, PostGuard, PostMutation};
use chrono::{DateTime, Utc};
use std::borrow::Borrow;
use std::cmp::Reverse;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::hash::Hash;
use tokio::sync::RwLock;
use tracing::debug;

/// Sort key of a post in every index: `created_at` desc, then `id` desc.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct FeedKey(Reverse<DateTime<Utc>>, Reverse<i64>);

impl FeedKey {
    fn of(post: &Post) -> Self {
        FeedKey(Reverse(post.created_at), Reverse(post.id))
    }

    fn post_id(&self) -> i64 {
        (self.1).0
    }
}

/// Removes `value` from the set under `key` and drops the set once it is empty.
fn remove_indexed<K, Q, V, R>(index: &mut HashMap<K, BTreeSet<V>>, key: &Q, value: &R)
where
    K: Borrow<Q> + Hash + Eq,
    Q: Hash + Eq + ?Sized,
    V: Borrow<R> + Ord,
    R: Ord + ?Sized,
{
    if let Some(set) = index.get_mut(key) {
        set.remove(value);
        if set.is_empty() {
            index.remove(key);
        }
    }
}

#[derive(Debug, Default)]
struct Tables {
    users: BTreeMap<String, User>,
    groups: BTreeMap<i64, Group>,
    posts: BTreeMap<i64, Post>,
    comments: BTreeMap<i64, Comment>,
    follows: BTreeSet<Follow>,

    group_by_slug: HashMap<String, i64>,
    all_posts: BTreeSet<FeedKey>,
    posts_by_author: HashMap<String, BTreeSet<FeedKey>>,
    posts_by_group: HashMap<i64, BTreeSet<FeedKey>>,
    /// (created_at, id) ascending: chronological.
    comments_by_post: HashMap<i64, BTreeSet<(DateTime<Utc>, i64)>>,
    follow_edges_by_user: HashMap<String, BTreeSet<String>>,
    follow_edges_by_author: HashMap<String, BTreeSet<String>>,

    next_group_id: i64,
    next_post_id: i64,
    next_comment_id: i64,
}

impl Tables {
    fn new() -> Self {
        Self {
            next_group_id: 1,
            next_post_id: 1,
            next_comment_id: 1,
            ..Default::default()
        }
    }

    fn require_user(&self, username: &str) -> Result<(), DomainError> {
        if self.users.contains_key(username) {
            Ok(())
        } else {
            Err(DomainError::not_found("user", username))
        }
    }

    fn require_group(&self, id: Option<i64>) -> Result<(), DomainError> {
        match id {
            Some(id) if !self.groups.contains_key(&id) => Err(DomainError::not_found("group", id)),
            _ => Ok(()),
        }
    }

    fn index_post(&mut self, post: &Post) {
        let key = FeedKey::of(post);
        self.all_posts.insert(key);
        self.posts_by_author
            .entry(post.author.clone())
            .or_default()
            .insert(key);
        if let Some(group_id) = post.group_id {
            self.posts_by_group.entry(group_id).or_default().insert(key);
        }
    }

    fn unindex_post(&mut self, post: &Post) {
        let key = FeedKey::of(post);
        self.all_posts.remove(&key);
        remove_indexed(&mut self.posts_by_author, post.author.as_str(), &key);
        if let Some(group_id) = post.group_id {
            remove_indexed(&mut self.posts_by_group, &group_id, &key);
        }
    }

    fn index_comment(&mut self, comment: &Comment) {
        self.comments_by_post
            .entry(comment.post_id)
            .or_default()
            .insert((comment.created_at, comment.id));
    }

    fn index_follow(&mut self, edge: &Follow) {
        self.follow_edges_by_user
            .entry(edge.user.clone())
            .or_default()
            .insert(edge.author.clone());
        self.follow_edges_by_author
            .entry(edge.author.clone())
            .or_default()
            .insert(edge.user.clone());
    }

    /// Index keys for `filter`, newest first.
    fn feed_keys(&self, filter: &PostFilter) -> Vec<FeedKey> {
        match filter {
            PostFilter::All => self.all_posts.iter().copied().collect(),
            PostFilter::Group(id) => self
                .posts_by_group
                .get(id)
                .map(|keys| keys.iter().copied().collect())
                .unwrap_or_default(),
            PostFilter::Author(name) => self
                .posts_by_author
                .get(name)
                .map(|keys| keys.iter().copied().collect())
                .unwrap_or_default(),
            PostFilter::FollowedBy(user) => {
                let Some(authors) = self.follow_edges_by_user.get(user) else {
                    return Vec::new();
                };
                let merged: BTreeSet<FeedKey> = authors
                    .iter()
                    .filter_map(|a| self.posts_by_author.get(a))
                    .flat_map(|keys| keys.iter().copied())
                    .collect();
                merged.into_iter().collect()
            }
        }
    }

    fn count_feed(&self, filter: &PostFilter) -> usize {
        match filter {
            PostFilter::All => self.all_posts.len(),
            PostFilter::Group(id) => self.posts_by_group.get(id).map_or(0, BTreeSet::len),
            PostFilter::Author(name) => self.posts_by_author.get(name).map_or(0, BTreeSet::len),
            PostFilter::FollowedBy(_) => self.feed_keys(filter).len(),
        }
    }
}

/// In-memory entity store. Used by tests and by the terminal client when no
/// durable backend is configured.
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            tables: RwLock::new(Tables::new()),
        }
    }
}

#[async_trait::async_trait]
impl EntityStore for MemoryStore {
    async fn insert_user(&self, user: User) -> Result<User, DomainError> {
        let mut t = self.tables.write().await;
        if t.users.contains_key(&user.username) {
            return Err(DomainError::Conflict(format!(
                "username {} is taken",
                user.username
            )));
        }
        t.users.insert(user.username.clone(), user.clone());
        Ok(user)
    }

    async fn get_user(&self, username: &str) -> Result<User, DomainError> {
        let t = self.tables.read().await;
        t.users
            .get(username)
            .cloned()
            .ok_or_else(|| DomainError::not_found("user", username))
    }

    async fn insert_group(&self, group: NewGroup) -> Result<Group, DomainError> {
        let mut t = self.tables.write().await;
        if t.group_by_slug.contains_key(&group.slug) {
            return Err(DomainError::Conflict(format!(
                "group slug {} is taken",
                group.slug
            )));
        }
        let id = t.next_group_id;
        t.next_group_id += 1;
        let group = Group {
            id,
            title: group.title,
            slug: group.slug,
            description: group.description,
        };
        t.group_by_slug.insert(group.slug.clone(), id);
        t.groups.insert(id, group.clone());
        Ok(group)
    }

    async fn get_group(&self, id: i64) -> Result<Group, DomainError> {
        let t = self.tables.read().await;
        t.groups
            .get(&id)
            .cloned()
            .ok_or_else(|| DomainError::not_found("group", id))
    }

    async fn get_group_by_slug(&self, slug: &str) -> Result<Group, DomainError> {
        let t = self.tables.read().await;
        t.group_by_slug
            .get(slug)
            .and_then(|id| t.groups.get(id))
            .cloned()
            .ok_or_else(|| DomainError::not_found("group", slug))
    }

    async fn list_groups(&self) -> Result<Vec<Group>, DomainError> {
        let t = self.tables.read().await;
        let mut groups: Vec<Group> = t.groups.values().cloned().collect();
        groups.sort_by(|a, b| a.title.cmp(&b.title).then(a.id.cmp(&b.id)));
        Ok(groups)
    }

    async fn insert_post(&self, post: NewPost) -> Result<Post, DomainError> {
        let mut t = self.tables.write().await;
        t.require_user(&post.author)?;
        t.require_group(post.group_id)?;
        let id = t.next_post_id;
        t.next_post_id += 1;
        let post = Post {
            id,
            text: post.text,
            author: post.author,
            group_id: post.group_id,
            image: post.image,
            created_at: post.created_at,
        };
        t.index_post(&post);
        t.posts.insert(id, post.clone());
        Ok(post)
    }

    async fn get_post(&self, id: i64) -> Result<Post, DomainError> {
        let t = self.tables.read().await;
        t.posts
            .get(&id)
            .cloned()
            .ok_or_else(|| DomainError::not_found("post", id))
    }

    async fn modify_post(&self, id: i64, mutation: PostMutation) -> Result<Post, DomainError> {
        let mut t = self.tables.write().await;
        let current = t
            .posts
            .get(&id)
            .cloned()
            .ok_or_else(|| DomainError::not_found("post", id))?;
        let changed = mutation(&current)?;
        t.require_group(changed.group_id)?;
        let updated = Post {
            id: current.id,
            author: current.author.clone(),
            created_at: current.created_at,
            text: changed.text,
            group_id: changed.group_id,
            image: changed.image,
        };
        t.unindex_post(&current);
        t.index_post(&updated);
        t.posts.insert(id, updated.clone());
        debug!(post_id = id, "post modified in memory");
        Ok(updated)
    }

    async fn delete_post(&self, id: i64, guard: PostGuard) -> Result<Post, DomainError> {
        let mut t = self.tables.write().await;
        let current = t
            .posts
            .get(&id)
            .cloned()
            .ok_or_else(|| DomainError::not_found("post", id))?;
        guard(&current)?;
        t.unindex_post(&current);
        t.posts.remove(&id);
        if let Some(comment_keys) = t.comments_by_post.remove(&id) {
            for (_, comment_id) in comment_keys {
                t.comments.remove(&comment_id);
            }
        }
        Ok(current)
    }

    async fn list_posts(
        &self,
        filter: &PostFilter,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<Post>, DomainError> {
        let t = self.tables.read().await;
        let posts = t
            .feed_keys(filter)
            .into_iter()
            .skip(offset)
            .take(limit)
            .filter_map(|key| t.posts.get(&key.post_id()).cloned())
            .collect();
        Ok(posts)
    }

    async fn count_posts(&self, filter: &PostFilter) -> Result<usize, DomainError> {
        let t = self.tables.read().await;
        Ok(t.count_feed(filter))
    }

    async fn list_page(
        &self,
        filter: &PostFilter,
        paginator: Paginator,
        requested: i64,
    ) -> Result<Page<Post>, DomainError> {
        let t = self.tables.read().await;
        let keys = t.feed_keys(filter);
        let window = paginator.window(keys.len(), requested);
        let items = keys
            .iter()
            .skip(window.offset)
            .take(window.limit)
            .filter_map(|key| t.posts.get(&key.post_id()).cloned())
            .collect();
        Ok(Page::new(items, window, keys.len()))
    }

    async fn insert_comment(&self, comment: NewComment) -> Result<Comment, DomainError> {
        let mut t = self.tables.write().await;
        if !t.posts.contains_key(&comment.post_id) {
            return Err(DomainError::not_found("post", comment.post_id));
        }
        t.require_user(&comment.author)?;
        let id = t.next_comment_id;
        t.next_comment_id += 1;
        let comment = Comment {
            id,
            post_id: comment.post_id,
            author: comment.author,
            text: comment.text,
            created_at: comment.created_at,
        };
        t.index_comment(&comment);
        t.comments.insert(id, comment.clone());
        Ok(comment)
    }

    async fn list_comments(&self, post_id: i64) -> Result<Vec<Comment>, DomainError> {
        let t = self.tables.read().await;
        let comments = t
            .comments_by_post
            .get(&post_id)
            .map(|keys| {
                keys.iter()
                    .filter_map(|(_, id)| t.comments.get(id).cloned())
                    .collect()
            })
            .unwrap_or_default();
        Ok(comments)
    }

    async fn count_comments(&self, post_id: i64) -> Result<usize, DomainError> {
        let t = self.tables.read().await;
        Ok(t.comments_by_post.get(&post_id).map_or(0, BTreeSet::len))
    }

    async fn insert_follow(&self, user: &str, author: &str) -> Result<bool, DomainError> {
        let mut t = self.tables.write().await;
        t.require_user(user)?;
        t.require_user(author)?;
        if user == author {
            return Ok(false);
        }
        let edge = Follow {
            user: user.to_string(),
            author: author.to_string(),
        };
        if !t.follows.insert(edge.clone()) {
            return Ok(false);
        }
        t.index_follow(&edge);
        Ok(true)
    }

    async fn delete_follow(&self, user: &str, author: &str) -> Result<bool, DomainError> {
        let mut t = self.tables.write().await;
        let edge = Follow {
            user: user.to_string(),
            author: author.to_string(),
        };
        if !t.follows.remove(&edge) {
            return Ok(false);
        }
        remove_indexed(&mut t.follow_edges_by_user, user, author);
        remove_indexed(&mut t.follow_edges_by_author, author, user);
        Ok(true)
    }

    async fn follow_exists(&self, user: &str, author: &str) -> Result<bool, DomainError> {
        let t = self.tables.read().await;
        Ok(t
            .follow_edges_by_user
            .get(user)
            .is_some_and(|authors| authors.contains(author)))
    }

    async fn count_followers(&self, author: &str) -> Result<usize, DomainError> {
        let t = self.tables.read().await;
        Ok(t.follow_edges_by_author.get(author).map_or(0, BTreeSet::len))
    }

    async fn count_following(&self, user: &str) -> Result<usize, DomainError> {
        let t = self.tables.read().await;
        Ok(t.follow_edges_by_user.get(user).map_or(0, BTreeSet::len))
    }

    async fn snapshot(&self) -> Result<StoreSnapshot, DomainError> {
        let t = self.tables.read().await;
        Ok(StoreSnapshot {
            users: t.users.values().cloned().collect(),
            groups: t.groups.values().cloned().collect(),
            posts: t.posts.values().cloned().collect(),
            comments: t.comments.values().cloned().collect(),
            follows: t.follows.iter().cloned().collect(),
        })
    }

    async fn restore(&self, snapshot: StoreSnapshot) -> Result<(), DomainError> {
        snapshot.validate()?;
        let mut fresh = Tables::new();
        for user in snapshot.users {
            fresh.users.insert(user.username.clone(), user);
        }
        for group in snapshot.groups {
            fresh.next_group_id = fresh.next_group_id.max(group.id + 1);
            fresh.group_by_slug.insert(group.slug.clone(), group.id);
            fresh.groups.insert(group.id, group);
        }
        for post in snapshot.posts {
            fresh.next_post_id = fresh.next_post_id.max(post.id + 1);
            fresh.index_post(&post);
            fresh.posts.insert(post.id, post);
        }
        for comment in snapshot.comments {
            fresh.next_comment_id = fresh.next_comment_id.max(comment.id + 1);
            fresh.index_comment(&comment);
            fresh.comments.insert(comment.id, comment);
        }
        for edge in snapshot.follows {
            if fresh.follows.insert(edge.clone()) {
                fresh.index_follow(&edge);
            }
        }
        *self.tables.write().await = fresh;
        Ok(())
    }
}
