//! Who may do what. Decisions never fail for an anonymous actor; they just say no.

use crate::domain::{Actor, DomainError, Post};
use crate::ports::EntityStore;
use std::sync::Arc;

/// Access decisions over posts, comments and follow edges.
pub struct AccessPolicy {
    store: Arc<dyn EntityStore>,
}

impl AccessPolicy {
    pub fn new(store: Arc<dyn EntityStore>) -> Self {
        Self { store }
    }

    /// Only the author may edit (or delete) a post.
    pub fn can_edit_post(actor: &Actor, post: &Post) -> bool {
        actor.username() == Some(post.author.as_str())
    }

    pub fn can_comment(actor: &Actor) -> bool {
        actor.is_authenticated()
    }

    /// False for anonymous actors and for oneself; otherwise whether the edge exists.
    pub async fn is_following(&self, actor: &Actor, author: &str) -> Result<bool, DomainError> {
        match actor.username() {
            Some(user) if user != author => self.store.follow_exists(user, author).await,
            _ => Ok(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::persistence::memory_store::MemoryStore;
    use crate::domain::User;
    use chrono::Utc;

    fn post_by(author: &str) -> Post {
        Post {
            id: 1,
            text: "text".into(),
            author: author.into(),
            group_id: None,
            image: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_only_author_can_edit() {
        let post = post_by("ann");
        assert!(AccessPolicy::can_edit_post(&Actor::user("ann"), &post));
        assert!(!AccessPolicy::can_edit_post(&Actor::user("bob"), &post));
        assert!(!AccessPolicy::can_edit_post(&Actor::Anonymous, &post));
    }

    #[test]
    fn test_comment_requires_authentication() {
        assert!(AccessPolicy::can_comment(&Actor::user("ann")));
        assert!(!AccessPolicy::can_comment(&Actor::Anonymous));
    }

    #[tokio::test]
    async fn test_is_following() {
        let store = Arc::new(MemoryStore::new());
        for name in ["ann", "bob"] {
            store.insert_user(User::new(name)).await.unwrap();
        }
        store.insert_follow("ann", "bob").await.unwrap();
        let policy = AccessPolicy::new(store);

        assert!(policy.is_following(&Actor::user("ann"), "bob").await.unwrap());
        assert!(!policy.is_following(&Actor::user("bob"), "ann").await.unwrap());
        assert!(!policy.is_following(&Actor::user("ann"), "ann").await.unwrap());
        assert!(!policy.is_following(&Actor::Anonymous, "bob").await.unwrap());
    }
}
