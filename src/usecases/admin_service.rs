//! Account and group administration.

use crate::domain::validation::{clean_group_title, clean_slug, clean_username};
use crate::domain::{Actor, DomainError, Group, NewGroup, User};
use crate::ports::EntityStore;
use crate::usecases::FeedCache;
use std::sync::Arc;
use tracing::{info, warn};

pub struct AdminService {
    store: Arc<dyn EntityStore>,
    cache: Option<Arc<FeedCache>>,
}

impl AdminService {
    pub fn new(store: Arc<dyn EntityStore>) -> Self {
        Self { store, cache: None }
    }

    pub fn with_cache(mut self, cache: Arc<FeedCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    async fn written(&self) {
        if let Some(cache) = &self.cache {
            cache.invalidate_all().await;
        }
    }

    /// `Conflict` if the name is taken.
    pub async fn register_user(&self, username: &str) -> Result<User, DomainError> {
        let username = clean_username(username)?;
        let user = self.store.insert_user(User::new(username)).await?;
        info!(username = %user.username, "user registered");
        self.written().await;
        Ok(user)
    }

    /// Resolves a typed username to a signed-in actor. `NotFound` for unknown names.
    pub async fn sign_in(&self, username: &str) -> Result<Actor, DomainError> {
        let username = username.trim();
        match self.store.get_user(username).await {
            Ok(user) => {
                info!(username = %user.username, "signed in");
                Ok(Actor::user(user.username))
            }
            Err(e) => {
                warn!(username, error = %e, "sign in rejected");
                Err(e)
            }
        }
    }

    /// `Conflict` if the slug is taken.
    pub async fn create_group(
        &self,
        title: &str,
        slug: &str,
        description: &str,
    ) -> Result<Group, DomainError> {
        let group = self
            .store
            .insert_group(NewGroup {
                title: clean_group_title(title)?,
                slug: clean_slug(slug)?,
                description: description.trim().to_string(),
            })
            .await?;
        info!(group_id = group.id, slug = %group.slug, "group created");
        self.written().await;
        Ok(group)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::persistence::memory_store::MemoryStore;

    fn service() -> (Arc<MemoryStore>, AdminService) {
        let store = Arc::new(MemoryStore::new());
        (store.clone(), AdminService::new(store))
    }

    #[tokio::test]
    async fn test_register_user() {
        let (store, admin) = service();
        let user = admin.register_user(" leo ").await.unwrap();
        assert_eq!(user.username, "leo");
        assert_eq!(store.get_user("leo").await.unwrap(), user);

        let err = admin.register_user("leo").await.unwrap_err();
        assert!(matches!(err, DomainError::Conflict(_)));
        let err = admin.register_user("bad name").await.unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[tokio::test]
    async fn test_create_group() {
        let (store, admin) = service();
        let group = admin
            .create_group("Тестовая группа", "test-group", "Тестовое описание")
            .await
            .unwrap();
        assert_eq!(store.get_group_by_slug("test-group").await.unwrap(), group);

        let err = admin.create_group("Other", "test-group", "").await.unwrap_err();
        assert!(matches!(err, DomainError::Conflict(_)));
        let err = admin.create_group("", "empty-title", "").await.unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
        let err = admin.create_group("Slashes", "a/b", "").await.unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[tokio::test]
    async fn test_sign_in_requires_registered_user() {
        let (_store, admin) = service();
        let err = admin.sign_in("ghost").await.unwrap_err();
        assert!(matches!(err, DomainError::NotFound { entity: "user", .. }));

        admin.register_user("leo").await.unwrap();
        assert_eq!(admin.sign_in("  leo ").await.unwrap(), Actor::user("leo"));
    }
}
