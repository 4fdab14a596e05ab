//! Write side: posts, comments and follow edges.
//!
//! Each operation is all-or-nothing. Checks that depend on the stored post run
//! inside the store's `modify_post` / `delete_post` closure, so a concurrent
//! writer cannot slip between the check and the write.

use crate::domain::validation::clean_text;
use crate::domain::{Actor, Comment, DomainError, ImageUpdate, NewComment, NewPost, Post};
use crate::ports::{Clock, EntityStore};
use crate::usecases::{AccessPolicy, FeedCache};
use std::sync::Arc;
use tracing::{info, warn};

/// Fields a form submits when creating or editing a post.
#[derive(Debug, Clone, Default)]
pub struct PostForm {
    pub text: String,
    pub group_id: Option<i64>,
}

pub struct MutationService {
    store: Arc<dyn EntityStore>,
    clock: Arc<dyn Clock>,
    cache: Option<Arc<FeedCache>>,
}

impl MutationService {
    pub fn new(store: Arc<dyn EntityStore>, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            clock,
            cache: None,
        }
    }

    /// Attach a cache to be flushed after every successful write.
    pub fn with_cache(mut self, cache: Arc<FeedCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    async fn written(&self) {
        if let Some(cache) = &self.cache {
            cache.invalidate_all().await;
        }
    }

    fn require_user(actor: &Actor) -> Result<&str, DomainError> {
        actor.username().ok_or(DomainError::Unauthenticated)
    }

    pub async fn create_post(
        &self,
        actor: &Actor,
        form: PostForm,
        image: Option<String>,
    ) -> Result<Post, DomainError> {
        let author = Self::require_user(actor)?;
        let text = clean_text("text", &form.text)?;
        if let Some(group_id) = form.group_id {
            self.store.get_group(group_id).await?;
        }
        let post = self
            .store
            .insert_post(NewPost {
                text,
                author: author.to_string(),
                group_id: form.group_id,
                image,
                created_at: self.clock.now(),
            })
            .await?;
        info!(post_id = post.id, author = %post.author, group_id = ?post.group_id, "post created");
        self.written().await;
        Ok(post)
    }

    /// Rewrites text, group and image. The author and creation time never change.
    pub async fn edit_post(
        &self,
        actor: &Actor,
        post_id: i64,
        form: PostForm,
        image: ImageUpdate,
    ) -> Result<Post, DomainError> {
        // existence first: an unknown id is NotFound even for anonymous callers
        self.store.get_post(post_id).await?;
        Self::require_user(actor)?;
        // reported only after ownership and text have passed
        let missing_group = match form.group_id {
            Some(group_id) => match self.store.get_group(group_id).await {
                Ok(_) => None,
                Err(e @ DomainError::NotFound { .. }) => Some(e),
                Err(e) => return Err(e),
            },
            None => None,
        };

        let editor = actor.clone();
        let result = self
            .store
            .modify_post(
                post_id,
                Box::new(move |current: &Post| {
                    if !AccessPolicy::can_edit_post(&editor, current) {
                        return Err(DomainError::Forbidden(format!(
                            "{} may not edit post {}",
                            editor, current.id
                        )));
                    }
                    let text = clean_text("text", &form.text)?;
                    if let Some(e) = missing_group {
                        return Err(e);
                    }
                    Ok(Post {
                        text,
                        group_id: form.group_id,
                        image: image.apply(current.image.clone()),
                        ..current.clone()
                    })
                }),
            )
            .await;

        match result {
            Ok(post) => {
                info!(post_id, author = %post.author, "post edited");
                self.written().await;
                Ok(post)
            }
            Err(e) => {
                warn!(post_id, actor = %actor, error = %e, "post edit rejected");
                Err(e)
            }
        }
    }

    /// Removes the post and its comments. Author only.
    pub async fn delete_post(&self, actor: &Actor, post_id: i64) -> Result<Post, DomainError> {
        self.store.get_post(post_id).await?;
        Self::require_user(actor)?;
        let owner = actor.clone();
        let result = self
            .store
            .delete_post(
                post_id,
                Box::new(move |current: &Post| {
                    if AccessPolicy::can_edit_post(&owner, current) {
                        Ok(())
                    } else {
                        Err(DomainError::Forbidden(format!(
                            "{} may not delete post {}",
                            owner, current.id
                        )))
                    }
                }),
            )
            .await;

        match result {
            Ok(post) => {
                info!(post_id, author = %post.author, "post deleted");
                self.written().await;
                Ok(post)
            }
            Err(e) => {
                warn!(post_id, actor = %actor, error = %e, "post delete rejected");
                Err(e)
            }
        }
    }

    pub async fn add_comment(
        &self,
        actor: &Actor,
        post_id: i64,
        text: &str,
    ) -> Result<Comment, DomainError> {
        self.store.get_post(post_id).await?;
        if !AccessPolicy::can_comment(actor) {
            warn!(post_id, "anonymous comment rejected");
            return Err(DomainError::Unauthenticated);
        }
        let author = Self::require_user(actor)?;
        let text = clean_text("text", text)?;
        let comment = self
            .store
            .insert_comment(NewComment {
                post_id,
                author: author.to_string(),
                text,
                created_at: self.clock.now(),
            })
            .await?;
        info!(comment_id = comment.id, post_id, author = %comment.author, "comment added");
        self.written().await;
        Ok(comment)
    }

    /// Returns whether a new edge was created. Following oneself, or someone
    /// already followed, is a successful no-op.
    pub async fn follow(&self, actor: &Actor, target: &str) -> Result<bool, DomainError> {
        self.store.get_user(target).await?;
        let user = Self::require_user(actor)?;
        if user == target {
            return Ok(false);
        }
        let created = self.store.insert_follow(user, target).await?;
        if created {
            info!(user, author = target, "follow created");
            self.written().await;
        }
        Ok(created)
    }

    /// Returns whether an edge was removed.
    pub async fn unfollow(&self, actor: &Actor, target: &str) -> Result<bool, DomainError> {
        self.store.get_user(target).await?;
        let user = Self::require_user(actor)?;
        let removed = self.store.delete_follow(user, target).await?;
        if removed {
            info!(user, author = target, "follow removed");
            self.written().await;
        }
        Ok(removed)
    }
}
