//! Inbound ports. UI (adapter) calls into the application.

use crate::domain::{Actor, DomainError, Page, Post};

/// Input port: a front end (terminal client, web layer) drives the use cases.
#[async_trait::async_trait]
pub trait InputPort: Send + Sync {
    /// Run the interactive session until the operator quits.
    async fn run(&self) -> Result<(), DomainError>;
}

/// The four paginated feeds. Implemented by the composer and by its caching wrapper,
/// so a front end does not care which one it holds.
#[async_trait::async_trait]
pub trait FeedQuery: Send + Sync {
    async fn global_feed(&self, page: i64) -> Result<Page<Post>, DomainError>;
    async fn group_feed(&self, slug: &str, page: i64) -> Result<Page<Post>, DomainError>;
    async fn author_feed(&self, username: &str, page: i64) -> Result<Page<Post>, DomainError>;
    async fn following_feed(&self, actor: &Actor, page: i64) -> Result<Page<Post>, DomainError>;
}
