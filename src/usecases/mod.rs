//! Application use cases. Orchestrate domain logic via ports.

pub mod access_policy;
pub mod admin_service;
pub mod feed_cache;
pub mod feed_composer;
pub mod mutation_service;

pub use access_policy::AccessPolicy;
pub use admin_service::AdminService;
pub use feed_cache::{CachedFeedComposer, FeedCache, FeedKey};
pub use feed_composer::{FeedComposer, PostView, ProfileView};
pub use mutation_service::{MutationService, PostForm};
