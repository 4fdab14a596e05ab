//! Domain entities. Pure data structures for the core business.
//!
//! No storage or I/O types here. Adapters map rows and files into these.

use super::DomainError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

/// Number of characters shown when a post or comment is rendered as a short label.
pub const DISPLAY_TEXT_LEN: usize = 15;

fn short_text(text: &str) -> String {
    text.chars().take(DISPLAY_TEXT_LEN).collect()
}

/// A registered user. Identity is the username.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct User {
    pub username: String,
}

impl User {
    pub fn new(username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
        }
    }
}

impl fmt::Display for User {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.username)
    }
}

/// The caller of an operation: a signed-in user or an anonymous visitor.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Actor {
    Anonymous,
    User(String),
}

impl Actor {
    pub fn user(username: impl Into<String>) -> Self {
        Actor::User(username.into())
    }

    pub fn is_authenticated(&self) -> bool {
        matches!(self, Actor::User(_))
    }

    /// Username of an authenticated actor, `None` for anonymous.
    pub fn username(&self) -> Option<&str> {
        match self {
            Actor::User(name) => Some(name),
            Actor::Anonymous => None,
        }
    }
}

impl fmt::Display for Actor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Actor::Anonymous => f.write_str("<anonymous>"),
            Actor::User(name) => f.write_str(name),
        }
    }
}

/// A community posts can be filed under (e.g. "news").
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Group {
    pub id: i64,
    pub title: String,
    /// Unique URL key.
    pub slug: String,
    pub description: String,
}

impl fmt::Display for Group {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.title)
    }
}

/// Group fields before the store assigns an id.
#[derive(Debug, Clone)]
pub struct NewGroup {
    pub title: String,
    pub slug: String,
    pub description: String,
}

/// A blog entry. `author` and `created_at` never change after creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Post {
    pub id: i64,
    pub text: String,
    pub author: String,
    pub group_id: Option<i64>,
    /// Opaque reference into the blob store; bytes never pass through the core.
    pub image: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl fmt::Display for Post {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&short_text(&self.text))
    }
}

/// Post fields before the store assigns an id.
#[derive(Debug, Clone)]
pub struct NewPost {
    pub text: String,
    pub author: String,
    pub group_id: Option<i64>,
    pub image: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// How an edit treats the post's image. Editing without an upload keeps the old one.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ImageUpdate {
    #[default]
    Keep,
    Replace(String),
    Clear,
}

impl ImageUpdate {
    pub fn apply(self, current: Option<String>) -> Option<String> {
        match self {
            ImageUpdate::Keep => current,
            ImageUpdate::Replace(reference) => Some(reference),
            ImageUpdate::Clear => None,
        }
    }
}

/// A reply under a post. Append-only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Comment {
    pub id: i64,
    pub post_id: i64,
    pub author: String,
    pub text: String,
    pub created_at: DateTime<Utc>,
}

impl fmt::Display for Comment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&short_text(&self.text))
    }
}

/// Comment fields before the store assigns an id.
#[derive(Debug, Clone)]
pub struct NewComment {
    pub post_id: i64,
    pub author: String,
    pub text: String,
    pub created_at: DateTime<Utc>,
}

/// Directed edge: `user` receives `author`'s posts in their following feed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Follow {
    pub user: String,
    pub author: String,
}

/// Which posts a listing covers.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PostFilter {
    All,
    Group(i64),
    Author(String),
    /// Posts whose author is followed by this user.
    FollowedBy(String),
}

/// Full copy of every table. Used for fixtures and backups.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreSnapshot {
    pub users: Vec<User>,
    pub groups: Vec<Group>,
    pub posts: Vec<Post>,
    pub comments: Vec<Comment>,
    pub follows: Vec<Follow>,
}

/// Ids a snapshot may carry: positive, with room left for the next id.
fn storable_id(id: i64) -> bool {
    (1..i64::MAX).contains(&id)
}

impl StoreSnapshot {
    /// Checks ids, uniqueness and references before a store replaces its contents.
    pub fn validate(&self) -> Result<(), DomainError> {
        let bad = |msg: String| Err(DomainError::Snapshot(msg));

        let ids = self
            .groups
            .iter()
            .map(|g| ("group", g.id))
            .chain(self.posts.iter().map(|p| ("post", p.id)))
            .chain(self.comments.iter().map(|c| ("comment", c.id)));
        for (entity, id) in ids {
            if !storable_id(id) {
                return bad(format!("{entity} id {id} out of range"));
            }
        }

        let mut users = HashSet::new();
        for user in &self.users {
            if !users.insert(user.username.as_str()) {
                return bad(format!("duplicate user {}", user.username));
            }
        }
        let mut group_ids = HashSet::new();
        let mut slugs = HashSet::new();
        for group in &self.groups {
            if !group_ids.insert(group.id) {
                return bad(format!("duplicate group id {}", group.id));
            }
            if !slugs.insert(group.slug.as_str()) {
                return bad(format!("duplicate group slug {}", group.slug));
            }
        }
        let mut post_ids = HashSet::new();
        for post in &self.posts {
            if !post_ids.insert(post.id) {
                return bad(format!("duplicate post id {}", post.id));
            }
            if !users.contains(post.author.as_str()) {
                return bad(format!("post {} has unknown author {}", post.id, post.author));
            }
            if let Some(group_id) = post.group_id {
                if !group_ids.contains(&group_id) {
                    return bad(format!("post {} has unknown group {}", post.id, group_id));
                }
            }
        }
        let mut comment_ids = HashSet::new();
        for comment in &self.comments {
            if !comment_ids.insert(comment.id) {
                return bad(format!("duplicate comment id {}", comment.id));
            }
            if !post_ids.contains(&comment.post_id) {
                return bad(format!(
                    "comment {} references missing post {}",
                    comment.id, comment.post_id
                ));
            }
            if !users.contains(comment.author.as_str()) {
                return bad(format!(
                    "comment {} has unknown author {}",
                    comment.id, comment.author
                ));
            }
        }
        for edge in &self.follows {
            if edge.user == edge.author {
                return bad(format!("self-follow edge for {}", edge.user));
            }
            if !users.contains(edge.user.as_str()) || !users.contains(edge.author.as_str()) {
                return bad(format!(
                    "follow edge {} -> {} references unknown user",
                    edge.user, edge.author
                ));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_truncates_long_text() {
        let post = Post {
            id: 1,
            text: "Тестовый текст Тестовый текст".into(),
            author: "leo".into(),
            group_id: None,
            image: None,
            created_at: Utc::now(),
        };
        assert_eq!(post.to_string(), "Тестовый текст ");

        let comment = Comment {
            id: 1,
            post_id: 1,
            author: "leo".into(),
            text: "short".into(),
            created_at: Utc::now(),
        };
        assert_eq!(comment.to_string(), "short");
    }

    #[test]
    fn test_group_displays_title() {
        let group = Group {
            id: 7,
            title: "Тестовая группа".into(),
            slug: "test-group".into(),
            description: String::new(),
        };
        assert_eq!(group.to_string(), "Тестовая группа");
    }

    #[test]
    fn test_actor_identity() {
        assert!(!Actor::Anonymous.is_authenticated());
        assert_eq!(Actor::user("leo").username(), Some("leo"));
        assert_eq!(Actor::Anonymous.username(), None);
    }

    #[test]
    fn test_snapshot_validation_catches_dangling_references() {
        let mut snapshot = StoreSnapshot {
            users: vec![User::new("leo")],
            ..Default::default()
        };
        snapshot.follows.push(Follow {
            user: "leo".into(),
            author: "leo".into(),
        });
        assert!(matches!(snapshot.validate(), Err(DomainError::Snapshot(_))));

        snapshot.follows.clear();
        snapshot.comments.push(Comment {
            id: 1,
            post_id: 9,
            author: "leo".into(),
            text: "orphan".into(),
            created_at: Utc::now(),
        });
        assert!(snapshot.validate().is_err());

        snapshot.comments.clear();
        assert!(snapshot.validate().is_ok());
    }

    #[test]
    fn test_snapshot_validation_rejects_unusable_ids() {
        let post = |id: i64| Post {
            id,
            text: "edge".into(),
            author: "leo".into(),
            group_id: None,
            image: None,
            created_at: Utc::now(),
        };
        for id in [0, -5, i64::MAX] {
            let snapshot = StoreSnapshot {
                users: vec![User::new("leo")],
                posts: vec![post(id)],
                ..Default::default()
            };
            assert!(
                matches!(snapshot.validate(), Err(DomainError::Snapshot(_))),
                "id {id} accepted"
            );
        }

        let snapshot = StoreSnapshot {
            users: vec![User::new("leo")],
            groups: vec![Group {
                id: i64::MAX,
                title: "Last".into(),
                slug: "last".into(),
                description: String::new(),
            }],
            ..Default::default()
        };
        assert!(snapshot.validate().is_err());

        let snapshot = StoreSnapshot {
            users: vec![User::new("leo")],
            posts: vec![post(i64::MAX - 1)],
            ..Default::default()
        };
        assert!(snapshot.validate().is_ok());
    }

    #[test]
    fn test_image_update() {
        let current = Some("posts/a.png".to_string());
        assert_eq!(ImageUpdate::Keep.apply(current.clone()), current);
        assert_eq!(ImageUpdate::Clear.apply(current.clone()), None);
        assert_eq!(
            ImageUpdate::Replace("posts/b.png".into()).apply(current),
            Some("posts/b.png".into())
        );
    }
}
