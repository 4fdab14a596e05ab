//! Outbound ports. Application calls into infrastructure.
//!
//! Implemented by adapters.

use crate::domain::{
    Comment, DomainError, Group, NewComment, NewGroup, NewPost, Page, Paginator, Post, PostFilter,
    StoreSnapshot, User,
};
use chrono::{DateTime, Utc};

/// Change applied to a post while the store holds it exclusively.
/// Returning an error aborts the write and leaves the record untouched.
pub type PostMutation = Box<dyn FnOnce(&Post) -> Result<Post, DomainError> + Send>;

/// Guard evaluated against a post under the store's write lock before it is deleted.
pub type PostGuard = Box<dyn FnOnce(&Post) -> Result<(), DomainError> + Send>;

/// Persistence contract for users, groups, posts, comments and follow edges.
///
/// Every method is atomic: secondary indexes change together with the primary
/// record, and compound methods (`modify_post`, `delete_post`, `insert_follow`)
/// run their check and write under one lock or transaction.
#[async_trait::async_trait]
pub trait EntityStore: Send + Sync {
    /// Fails with `Conflict` when the username is taken.
    async fn insert_user(&self, user: User) -> Result<User, DomainError>;

    async fn get_user(&self, username: &str) -> Result<User, DomainError>;

    /// Fails with `Conflict` when the slug is taken.
    async fn insert_group(&self, group: NewGroup) -> Result<Group, DomainError>;

    async fn get_group(&self, id: i64) -> Result<Group, DomainError>;

    async fn get_group_by_slug(&self, slug: &str) -> Result<Group, DomainError>;

    /// All groups ordered by title.
    async fn list_groups(&self) -> Result<Vec<Group>, DomainError>;

    /// Assigns the next id. Fails with `NotFound` for an unknown author or group.
    async fn insert_post(&self, post: NewPost) -> Result<Post, DomainError>;

    async fn get_post(&self, id: i64) -> Result<Post, DomainError>;

    /// Replaces the post with the result of `mutation`. `id`, `author` and
    /// `created_at` of the returned value are ignored; the stored ones win.
    async fn modify_post(&self, id: i64, mutation: PostMutation) -> Result<Post, DomainError>;

    /// Removes the post and its comments if `guard` passes.
    async fn delete_post(&self, id: i64, guard: PostGuard) -> Result<Post, DomainError>;

    /// Posts matching `filter`, newest first (`created_at` desc, then `id` desc).
    async fn list_posts(
        &self,
        filter: &PostFilter,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<Post>, DomainError>;

    async fn count_posts(&self, filter: &PostFilter) -> Result<usize, DomainError>;

    /// Page `requested` of `filter`. Counted and sliced under one lock, so
    /// `total_count` always describes the listing the items came from.
    async fn list_page(
        &self,
        filter: &PostFilter,
        paginator: Paginator,
        requested: i64,
    ) -> Result<Page<Post>, DomainError>;

    /// Fails with `NotFound` for an unknown post or author.
    async fn insert_comment(&self, comment: NewComment) -> Result<Comment, DomainError>;

    /// Comments under a post in the order they were written.
    async fn list_comments(&self, post_id: i64) -> Result<Vec<Comment>, DomainError>;

    async fn count_comments(&self, post_id: i64) -> Result<usize, DomainError>;

    /// Idempotent: returns `true` only when a new edge was stored.
    async fn insert_follow(&self, user: &str, author: &str) -> Result<bool, DomainError>;

    /// Idempotent: returns `true` only when an edge was removed.
    async fn delete_follow(&self, user: &str, author: &str) -> Result<bool, DomainError>;

    async fn follow_exists(&self, user: &str, author: &str) -> Result<bool, DomainError>;

    async fn count_followers(&self, author: &str) -> Result<usize, DomainError>;

    async fn count_following(&self, user: &str) -> Result<usize, DomainError>;

    /// Copy of every table, ordered by id (users by name, follows by pair).
    async fn snapshot(&self) -> Result<StoreSnapshot, DomainError>;

    /// Replaces all contents with `snapshot`. Ids are kept as given.
    async fn restore(&self, snapshot: StoreSnapshot) -> Result<(), DomainError>;
}

/// Time source for `created_at`.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}
