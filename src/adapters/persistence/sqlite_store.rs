//! SQLite-backed entity store via libsql. Implements EntityStore durably.
//!
//! All tables live in one database file: data/yatube.db
//! One connection is shared behind a mutex, so every operation (check then
//! write) runs without interleaving; multi-statement writes also run inside a
//! transaction so a crash never leaves half of them applied.
//! Timestamps are stored as microseconds since the Unix epoch.

use crate::domain::{
    Comment, DomainError, Follow, Group, NewComment, NewGroup, NewPost, Page, Paginator, Post,
    PostFilter, StoreSnapshot, User,
};
use crate::ports::{EntityStore, PostGuard, PostMutation};
use chrono::{DateTime, Utc};
use libsql::{Connection, Database, Row, Rows, Value, params};
use std::path::Path;
use tokio::sync::Mutex;
use tracing::{debug, info};

const SCHEMA: &[&str] = &[
    r#"
CREATE TABLE IF NOT EXISTS users (
    username TEXT PRIMARY KEY
)"#,
    r#"
CREATE TABLE IF NOT EXISTS post_groups (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    title TEXT NOT NULL,
    slug TEXT NOT NULL UNIQUE,
    description TEXT NOT NULL DEFAULT ''
)"#,
    r#"
CREATE TABLE IF NOT EXISTS posts (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    text TEXT NOT NULL,
    author TEXT NOT NULL,
    group_id INTEGER,
    image TEXT,
    created_at INTEGER NOT NULL
)"#,
    "CREATE INDEX IF NOT EXISTS idx_posts_feed ON posts (created_at DESC, id DESC)",
    "CREATE INDEX IF NOT EXISTS idx_posts_author ON posts (author, created_at DESC, id DESC)",
    "CREATE INDEX IF NOT EXISTS idx_posts_group ON posts (group_id, created_at DESC, id DESC)",
    r#"
CREATE TABLE IF NOT EXISTS comments (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    post_id INTEGER NOT NULL,
    author TEXT NOT NULL,
    text TEXT NOT NULL,
    created_at INTEGER NOT NULL
)"#,
    "CREATE INDEX IF NOT EXISTS idx_comments_post ON comments (post_id, created_at, id)",
    r#"
CREATE TABLE IF NOT EXISTS follows (
    user_name TEXT NOT NULL,
    author TEXT NOT NULL,
    PRIMARY KEY (user_name, author),
    CHECK (user_name <> author)
)"#,
    "CREATE INDEX IF NOT EXISTS idx_follows_author ON follows (author)",
];

const POST_COLUMNS: &str = "SELECT id, text, author, group_id, image, created_at";
const COMMENT_COLUMNS: &str = "SELECT id, post_id, author, text, created_at";

fn repo_err(e: impl std::fmt::Display) -> DomainError {
    DomainError::Repo(e.to_string())
}

fn to_micros(ts: DateTime<Utc>) -> i64 {
    ts.timestamp_micros()
}

fn from_micros(micros: i64) -> Result<DateTime<Utc>, DomainError> {
    DateTime::from_timestamp_micros(micros)
        .ok_or_else(|| DomainError::Repo(format!("timestamp out of range: {micros}")))
}

/// The value a later read returns for `ts`.
fn stored(ts: DateTime<Utc>) -> Result<DateTime<Utc>, DomainError> {
    from_micros(to_micros(ts))
}

fn opt_i64(row: &Row, idx: i32) -> Result<Option<i64>, DomainError> {
    match row.get_value(idx).map_err(repo_err)? {
        Value::Null => Ok(None),
        Value::Integer(v) => Ok(Some(v)),
        other => Err(DomainError::Repo(format!(
            "column {idx}: expected integer, got {other:?}"
        ))),
    }
}

fn opt_text(row: &Row, idx: i32) -> Result<Option<String>, DomainError> {
    match row.get_value(idx).map_err(repo_err)? {
        Value::Null => Ok(None),
        Value::Text(s) => Ok(Some(s)),
        other => Err(DomainError::Repo(format!(
            "column {idx}: expected text, got {other:?}"
        ))),
    }
}

fn post_from_row(row: &Row) -> Result<Post, DomainError> {
    Ok(Post {
        id: row.get::<i64>(0).map_err(repo_err)?,
        text: row.get::<String>(1).map_err(repo_err)?,
        author: row.get::<String>(2).map_err(repo_err)?,
        group_id: opt_i64(row, 3)?,
        image: opt_text(row, 4)?,
        created_at: from_micros(row.get::<i64>(5).map_err(repo_err)?)?,
    })
}

fn comment_from_row(row: &Row) -> Result<Comment, DomainError> {
    Ok(Comment {
        id: row.get::<i64>(0).map_err(repo_err)?,
        post_id: row.get::<i64>(1).map_err(repo_err)?,
        author: row.get::<String>(2).map_err(repo_err)?,
        text: row.get::<String>(3).map_err(repo_err)?,
        created_at: from_micros(row.get::<i64>(4).map_err(repo_err)?)?,
    })
}

fn group_from_row(row: &Row) -> Result<Group, DomainError> {
    Ok(Group {
        id: row.get::<i64>(0).map_err(repo_err)?,
        title: row.get::<String>(1).map_err(repo_err)?,
        slug: row.get::<String>(2).map_err(repo_err)?,
        description: row.get::<String>(3).map_err(repo_err)?,
    })
}

async fn collect_rows<T>(
    mut rows: Rows,
    map: impl Fn(&Row) -> Result<T, DomainError>,
) -> Result<Vec<T>, DomainError> {
    let mut out = Vec::new();
    while let Some(row) = rows.next().await.map_err(repo_err)? {
        out.push(map(&row)?);
    }
    Ok(out)
}

async fn first_row<T>(
    mut rows: Rows,
    map: impl Fn(&Row) -> Result<T, DomainError>,
) -> Result<Option<T>, DomainError> {
    match rows.next().await.map_err(repo_err)? {
        Some(row) => Ok(Some(map(&row)?)),
        None => Ok(None),
    }
}

async fn count_query(conn: &Connection, sql: &str, args: Vec<Value>) -> Result<usize, DomainError> {
    let rows = conn.query(sql, args).await.map_err(repo_err)?;
    let n = first_row(rows, |r| r.get::<i64>(0).map_err(repo_err))
        .await?
        .unwrap_or(0);
    Ok(usize::try_from(n).unwrap_or(0))
}

async fn exists(conn: &Connection, sql: &str, args: Vec<Value>) -> Result<bool, DomainError> {
    Ok(count_query(conn, sql, args).await? > 0)
}

async fn require_user(conn: &Connection, username: &str) -> Result<(), DomainError> {
    let sql = "SELECT COUNT(*) FROM users WHERE username = ?1";
    if exists(conn, sql, vec![Value::from(username.to_string())]).await? {
        Ok(())
    } else {
        Err(DomainError::not_found("user", username))
    }
}

async fn require_group(conn: &Connection, id: Option<i64>) -> Result<(), DomainError> {
    let Some(id) = id else { return Ok(()) };
    let sql = "SELECT COUNT(*) FROM post_groups WHERE id = ?1";
    if exists(conn, sql, vec![Value::Integer(id)]).await? {
        Ok(())
    } else {
        Err(DomainError::not_found("group", id))
    }
}

async fn fetch_post(conn: &Connection, id: i64) -> Result<Post, DomainError> {
    let rows = conn
        .query(&format!("{POST_COLUMNS} FROM posts WHERE id = ?1"), params![id])
        .await
        .map_err(repo_err)?;
    first_row(rows, post_from_row)
        .await?
        .ok_or_else(|| DomainError::not_found("post", id))
}

/// `WHERE` clause and bound arguments for a post listing.
fn filter_clause(filter: &PostFilter) -> (&'static str, Vec<Value>) {
    match filter {
        PostFilter::All => ("", Vec::new()),
        PostFilter::Group(id) => ("WHERE group_id = ?1", vec![Value::Integer(*id)]),
        PostFilter::Author(name) => ("WHERE author = ?1", vec![Value::Text(name.clone())]),
        PostFilter::FollowedBy(user) => (
            "WHERE author IN (SELECT author FROM follows WHERE user_name = ?1)",
            vec![Value::Text(user.clone())],
        ),
    }
}

async fn count_posts_in(conn: &Connection, filter: &PostFilter) -> Result<usize, DomainError> {
    let (clause, args) = filter_clause(filter);
    count_query(conn, &format!("SELECT COUNT(*) FROM posts {clause}"), args).await
}

/// Newest first, `created_at` then `id`.
async fn select_posts(
    conn: &Connection,
    filter: &PostFilter,
    offset: usize,
    limit: usize,
) -> Result<Vec<Post>, DomainError> {
    let (clause, mut args) = filter_clause(filter);
    let n = args.len();
    let sql = format!(
        "{POST_COLUMNS} FROM posts {clause} ORDER BY created_at DESC, id DESC LIMIT ?{} OFFSET ?{}",
        n + 1,
        n + 2
    );
    args.push(Value::Integer(i64::try_from(limit).unwrap_or(i64::MAX)));
    args.push(Value::Integer(i64::try_from(offset).unwrap_or(i64::MAX)));
    let rows = conn.query(&sql, args).await.map_err(repo_err)?;
    collect_rows(rows, post_from_row).await
}

/// SQLite repository. One database file (yatube.db) in the given base directory.
pub struct SqliteStore {
    _db: Database,
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Connect to (or create) `yatube.db` under `base_dir` and ensure the schema exists.
    /// Sets WAL mode and synchronous=NORMAL.
    pub async fn connect(base_dir: impl AsRef<Path>) -> Result<Self, DomainError> {
        let base = base_dir.as_ref();
        std::fs::create_dir_all(base).map_err(repo_err)?;
        let db_path = base.join("yatube.db");
        let store = Self::open(&db_path.to_string_lossy()).await?;
        info!(path = %db_path.display(), "SQLite store connected with WAL mode");
        Ok(store)
    }

    /// Private database that lives as long as the store. Used by tests and throwaway sessions.
    pub async fn in_memory() -> Result<Self, DomainError> {
        Self::open(":memory:").await
    }

    async fn open(path: &str) -> Result<Self, DomainError> {
        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(repo_err)?;
        let conn = db.connect().map_err(repo_err)?;

        // PRAGMA returns a row (the new value); consume it rather than using execute.
        for pragma in ["PRAGMA journal_mode=WAL", "PRAGMA synchronous=NORMAL"] {
            let mut rows = conn
                .query(pragma, ())
                .await
                .map_err(|e| DomainError::Repo(format!("{pragma} failed: {e}")))?;
            while rows.next().await.map_err(repo_err)?.is_some() {}
        }
        for ddl in SCHEMA {
            conn.execute(ddl, ()).await.map_err(repo_err)?;
        }

        Ok(Self {
            _db: db,
            conn: Mutex::new(conn),
        })
    }

    async fn modify_in_tx(
        conn: &Connection,
        id: i64,
        mutation: PostMutation,
    ) -> Result<Post, DomainError> {
        let current = fetch_post(conn, id).await?;
        let changed = mutation(&current)?;
        require_group(conn, changed.group_id).await?;
        conn.execute(
            "UPDATE posts SET text = ?1, group_id = ?2, image = ?3 WHERE id = ?4",
            params![changed.text.as_str(), changed.group_id, changed.image.clone(), id],
        )
        .await
        .map_err(repo_err)?;
        Ok(Post {
            text: changed.text,
            group_id: changed.group_id,
            image: changed.image,
            ..current
        })
    }

    async fn delete_in_tx(
        conn: &Connection,
        id: i64,
        guard: PostGuard,
    ) -> Result<Post, DomainError> {
        let current = fetch_post(conn, id).await?;
        guard(&current)?;
        conn.execute("DELETE FROM comments WHERE post_id = ?1", params![id])
            .await
            .map_err(repo_err)?;
        conn.execute("DELETE FROM posts WHERE id = ?1", params![id])
            .await
            .map_err(repo_err)?;
        Ok(current)
    }

    async fn restore_in_tx(conn: &Connection, snapshot: StoreSnapshot) -> Result<(), DomainError> {
        for table in ["follows", "comments", "posts", "post_groups", "users"] {
            conn.execute(&format!("DELETE FROM {table}"), ())
                .await
                .map_err(repo_err)?;
        }
        for user in &snapshot.users {
            conn.execute(
                "INSERT INTO users (username) VALUES (?1)",
                params![user.username.as_str()],
            )
            .await
            .map_err(repo_err)?;
        }
        for g in &snapshot.groups {
            conn.execute(
                "INSERT INTO post_groups (id, title, slug, description) VALUES (?1, ?2, ?3, ?4)",
                params![g.id, g.title.as_str(), g.slug.as_str(), g.description.as_str()],
            )
            .await
            .map_err(repo_err)?;
        }
        for p in &snapshot.posts {
            conn.execute(
                "INSERT INTO posts (id, text, author, group_id, image, created_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    p.id,
                    p.text.as_str(),
                    p.author.as_str(),
                    p.group_id,
                    p.image.clone(),
                    to_micros(p.created_at)
                ],
            )
            .await
            .map_err(repo_err)?;
        }
        for c in &snapshot.comments {
            conn.execute(
                "INSERT INTO comments (id, post_id, author, text, created_at) VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    c.id,
                    c.post_id,
                    c.author.as_str(),
                    c.text.as_str(),
                    to_micros(c.created_at)
                ],
            )
            .await
            .map_err(repo_err)?;
        }
        for f in &snapshot.follows {
            conn.execute(
                "INSERT INTO follows (user_name, author) VALUES (?1, ?2) ON CONFLICT DO NOTHING",
                params![f.user.as_str(), f.author.as_str()],
            )
            .await
            .map_err(repo_err)?;
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl EntityStore for SqliteStore {
    async fn insert_user(&self, user: User) -> Result<User, DomainError> {
        let conn = self.conn.lock().await;
        let inserted = conn
            .execute(
                "INSERT INTO users (username) VALUES (?1) ON CONFLICT (username) DO NOTHING",
                params![user.username.as_str()],
            )
            .await
            .map_err(repo_err)?;
        if inserted == 0 {
            return Err(DomainError::Conflict(format!(
                "username {} is taken",
                user.username
            )));
        }
        Ok(user)
    }

    async fn get_user(&self, username: &str) -> Result<User, DomainError> {
        let conn = self.conn.lock().await;
        require_user(&conn, username).await?;
        Ok(User::new(username))
    }

    async fn insert_group(&self, group: NewGroup) -> Result<Group, DomainError> {
        let conn = self.conn.lock().await;
        let rows = conn
            .query(
                r#"
                INSERT INTO post_groups (title, slug, description) VALUES (?1, ?2, ?3)
                ON CONFLICT (slug) DO NOTHING
                RETURNING id
                "#,
                params![
                    group.title.as_str(),
                    group.slug.as_str(),
                    group.description.as_str()
                ],
            )
            .await
            .map_err(repo_err)?;
        let Some(id) = first_row(rows, |r| r.get::<i64>(0).map_err(repo_err)).await? else {
            return Err(DomainError::Conflict(format!(
                "group slug {} is taken",
                group.slug
            )));
        };
        Ok(Group {
            id,
            title: group.title,
            slug: group.slug,
            description: group.description,
        })
    }

    async fn get_group(&self, id: i64) -> Result<Group, DomainError> {
        let conn = self.conn.lock().await;
        let rows = conn
            .query(
                "SELECT id, title, slug, description FROM post_groups WHERE id = ?1",
                params![id],
            )
            .await
            .map_err(repo_err)?;
        first_row(rows, group_from_row)
            .await?
            .ok_or_else(|| DomainError::not_found("group", id))
    }

    async fn get_group_by_slug(&self, slug: &str) -> Result<Group, DomainError> {
        let conn = self.conn.lock().await;
        let rows = conn
            .query(
                "SELECT id, title, slug, description FROM post_groups WHERE slug = ?1",
                params![slug],
            )
            .await
            .map_err(repo_err)?;
        first_row(rows, group_from_row)
            .await?
            .ok_or_else(|| DomainError::not_found("group", slug))
    }

    async fn list_groups(&self) -> Result<Vec<Group>, DomainError> {
        let conn = self.conn.lock().await;
        let rows = conn
            .query(
                "SELECT id, title, slug, description FROM post_groups ORDER BY title, id",
                (),
            )
            .await
            .map_err(repo_err)?;
        collect_rows(rows, group_from_row).await
    }

    async fn insert_post(&self, post: NewPost) -> Result<Post, DomainError> {
        let conn = self.conn.lock().await;
        require_user(&conn, &post.author).await?;
        require_group(&conn, post.group_id).await?;
        let rows = conn
            .query(
                r#"
                INSERT INTO posts (text, author, group_id, image, created_at)
                VALUES (?1, ?2, ?3, ?4, ?5)
                RETURNING id
                "#,
                params![
                    post.text.as_str(),
                    post.author.as_str(),
                    post.group_id,
                    post.image.clone(),
                    to_micros(post.created_at)
                ],
            )
            .await
            .map_err(repo_err)?;
        let id = first_row(rows, |r| r.get::<i64>(0).map_err(repo_err))
            .await?
            .ok_or_else(|| DomainError::Repo("insert returned no id".into()))?;
        debug!(post_id = id, "post row inserted");
        Ok(Post {
            id,
            text: post.text,
            author: post.author,
            group_id: post.group_id,
            image: post.image,
            created_at: stored(post.created_at)?,
        })
    }

    async fn get_post(&self, id: i64) -> Result<Post, DomainError> {
        let conn = self.conn.lock().await;
        fetch_post(&conn, id).await
    }

    async fn modify_post(&self, id: i64, mutation: PostMutation) -> Result<Post, DomainError> {
        let conn = self.conn.lock().await;
        let tx = conn.transaction().await.map_err(repo_err)?;
        match Self::modify_in_tx(&tx, id, mutation).await {
            Ok(post) => {
                tx.commit().await.map_err(repo_err)?;
                Ok(post)
            }
            Err(e) => {
                tx.rollback().await.map_err(repo_err)?;
                Err(e)
            }
        }
    }

    async fn delete_post(&self, id: i64, guard: PostGuard) -> Result<Post, DomainError> {
        let conn = self.conn.lock().await;
        let tx = conn.transaction().await.map_err(repo_err)?;
        match Self::delete_in_tx(&tx, id, guard).await {
            Ok(post) => {
                tx.commit().await.map_err(repo_err)?;
                Ok(post)
            }
            Err(e) => {
                tx.rollback().await.map_err(repo_err)?;
                Err(e)
            }
        }
    }

    async fn list_posts(
        &self,
        filter: &PostFilter,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<Post>, DomainError> {
        let conn = self.conn.lock().await;
        select_posts(&conn, filter, offset, limit).await
    }

    async fn count_posts(&self, filter: &PostFilter) -> Result<usize, DomainError> {
        let conn = self.conn.lock().await;
        count_posts_in(&conn, filter).await
    }

    async fn list_page(
        &self,
        filter: &PostFilter,
        paginator: Paginator,
        requested: i64,
    ) -> Result<Page<Post>, DomainError> {
        let conn = self.conn.lock().await;
        let total = count_posts_in(&conn, filter).await?;
        let window = paginator.window(total, requested);
        let items = select_posts(&conn, filter, window.offset, window.limit).await?;
        Ok(Page::new(items, window, total))
    }

    async fn insert_comment(&self, comment: NewComment) -> Result<Comment, DomainError> {
        let conn = self.conn.lock().await;
        fetch_post(&conn, comment.post_id).await?;
        require_user(&conn, &comment.author).await?;
        let rows = conn
            .query(
                r#"
                INSERT INTO comments (post_id, author, text, created_at)
                VALUES (?1, ?2, ?3, ?4)
                RETURNING id
                "#,
                params![
                    comment.post_id,
                    comment.author.as_str(),
                    comment.text.as_str(),
                    to_micros(comment.created_at)
                ],
            )
            .await
            .map_err(repo_err)?;
        let id = first_row(rows, |r| r.get::<i64>(0).map_err(repo_err))
            .await?
            .ok_or_else(|| DomainError::Repo("insert returned no id".into()))?;
        Ok(Comment {
            id,
            post_id: comment.post_id,
            author: comment.author,
            text: comment.text,
            created_at: stored(comment.created_at)?,
        })
    }

    async fn list_comments(&self, post_id: i64) -> Result<Vec<Comment>, DomainError> {
        let conn = self.conn.lock().await;
        let rows = conn
            .query(
                &format!(
                    "{COMMENT_COLUMNS} FROM comments WHERE post_id = ?1 ORDER BY created_at, id"
                ),
                params![post_id],
            )
            .await
            .map_err(repo_err)?;
        collect_rows(rows, comment_from_row).await
    }

    async fn count_comments(&self, post_id: i64) -> Result<usize, DomainError> {
        let conn = self.conn.lock().await;
        count_query(
            &conn,
            "SELECT COUNT(*) FROM comments WHERE post_id = ?1",
            vec![Value::Integer(post_id)],
        )
        .await
    }

    async fn insert_follow(&self, user: &str, author: &str) -> Result<bool, DomainError> {
        let conn = self.conn.lock().await;
        require_user(&conn, user).await?;
        require_user(&conn, author).await?;
        if user == author {
            return Ok(false);
        }
        let inserted = conn
            .execute(
                r#"
                INSERT INTO follows (user_name, author) VALUES (?1, ?2)
                ON CONFLICT (user_name, author) DO NOTHING
                "#,
                params![user, author],
            )
            .await
            .map_err(repo_err)?;
        Ok(inserted > 0)
    }

    async fn delete_follow(&self, user: &str, author: &str) -> Result<bool, DomainError> {
        let conn = self.conn.lock().await;
        let removed = conn
            .execute(
                "DELETE FROM follows WHERE user_name = ?1 AND author = ?2",
                params![user, author],
            )
            .await
            .map_err(repo_err)?;
        Ok(removed > 0)
    }

    async fn follow_exists(&self, user: &str, author: &str) -> Result<bool, DomainError> {
        let conn = self.conn.lock().await;
        exists(
            &conn,
            "SELECT COUNT(*) FROM follows WHERE user_name = ?1 AND author = ?2",
            vec![Value::from(user.to_string()), Value::from(author.to_string())],
        )
        .await
    }

    async fn count_followers(&self, author: &str) -> Result<usize, DomainError> {
        let conn = self.conn.lock().await;
        count_query(
            &conn,
            "SELECT COUNT(*) FROM follows WHERE author = ?1",
            vec![Value::from(author.to_string())],
        )
        .await
    }

    async fn count_following(&self, user: &str) -> Result<usize, DomainError> {
        let conn = self.conn.lock().await;
        count_query(
            &conn,
            "SELECT COUNT(*) FROM follows WHERE user_name = ?1",
            vec![Value::from(user.to_string())],
        )
        .await
    }

    async fn snapshot(&self) -> Result<StoreSnapshot, DomainError> {
        let conn = self.conn.lock().await;
        let users = collect_rows(
            conn.query("SELECT username FROM users ORDER BY username", ())
                .await
                .map_err(repo_err)?,
            |r| Ok(User::new(r.get::<String>(0).map_err(repo_err)?)),
        )
        .await?;
        let groups = collect_rows(
            conn.query(
                "SELECT id, title, slug, description FROM post_groups ORDER BY id",
                (),
            )
            .await
            .map_err(repo_err)?,
            group_from_row,
        )
        .await?;
        let posts = collect_rows(
            conn.query(&format!("{POST_COLUMNS} FROM posts ORDER BY id"), ())
                .await
                .map_err(repo_err)?,
            post_from_row,
        )
        .await?;
        let comments = collect_rows(
            conn.query(&format!("{COMMENT_COLUMNS} FROM comments ORDER BY id"), ())
                .await
                .map_err(repo_err)?,
            comment_from_row,
        )
        .await?;
        let follows = collect_rows(
            conn.query(
                "SELECT user_name, author FROM follows ORDER BY user_name, author",
                (),
            )
            .await
            .map_err(repo_err)?,
            |r| {
                Ok(Follow {
                    user: r.get::<String>(0).map_err(repo_err)?,
                    author: r.get::<String>(1).map_err(repo_err)?,
                })
            },
        )
        .await?;
        Ok(StoreSnapshot {
            users,
            groups,
            posts,
            comments,
            follows,
        })
    }

    async fn restore(&self, snapshot: StoreSnapshot) -> Result<(), DomainError> {
        snapshot.validate()?;
        let conn = self.conn.lock().await;
        let tx = conn.transaction().await.map_err(repo_err)?;
        match Self::restore_in_tx(&tx, snapshot).await {
            Ok(()) => tx.commit().await.map_err(repo_err),
            Err(e) => {
                tx.rollback().await.map_err(repo_err)?;
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    async fn seeded() -> SqliteStore {
        let store = SqliteStore::in_memory().await.unwrap();
        for name in ["ann", "bob"] {
            store.insert_user(User::new(name)).await.unwrap();
        }
        store
    }

    fn new_post(author: &str, text: &str, secs: i64) -> NewPost {
        NewPost {
            text: text.into(),
            author: author.into(),
            group_id: None,
            image: None,
            created_at: at(secs),
        }
    }

    #[tokio::test]
    async fn test_inserted_rows_match_reads_at_microsecond_precision() {
        let store = seeded().await;
        let precise = at(5) + chrono::Duration::nanoseconds(123_456_789);
        let mut draft = new_post("ann", "precise", 0);
        draft.created_at = precise;

        let post = store.insert_post(draft).await.unwrap();
        assert_eq!(post.created_at.timestamp_subsec_nanos(), 123_456_000);
        assert_eq!(store.get_post(post.id).await.unwrap(), post);

        let comment = store
            .insert_comment(NewComment {
                post_id: post.id,
                author: "bob".into(),
                text: "same instant".into(),
                created_at: precise,
            })
            .await
            .unwrap();
        assert_eq!(store.list_comments(post.id).await.unwrap(), vec![comment]);
    }

    #[tokio::test]
    async fn test_post_roundtrip_and_ordering() {
        let store = seeded().await;
        let news = store
            .insert_group(NewGroup {
                title: "News".into(),
                slug: "news".into(),
                description: "daily".into(),
            })
            .await
            .unwrap();
        let mut first = new_post("ann", "first", 1);
        first.group_id = Some(news.id);
        first.image = Some("posts/one.png".into());
        let first = store.insert_post(first).await.unwrap();
        let second = store.insert_post(new_post("ann", "second", 2)).await.unwrap();

        assert_eq!(store.get_post(first.id).await.unwrap(), first);
        let listed = store.list_posts(&PostFilter::All, 0, 10).await.unwrap();
        assert_eq!(listed, vec![second, first.clone()]);
        assert_eq!(
            store
                .list_posts(&PostFilter::Group(news.id), 0, 10)
                .await
                .unwrap(),
            vec![first]
        );
        assert_eq!(store.get_group_by_slug("news").await.unwrap(), news);
    }

    #[tokio::test]
    async fn test_unknown_references_are_not_found() {
        let store = seeded().await;
        assert!(matches!(
            store.insert_post(new_post("ghost", "x", 1)).await,
            Err(DomainError::NotFound { entity: "user", .. })
        ));
        assert!(matches!(
            store.get_group_by_slug("missing").await,
            Err(DomainError::NotFound { entity: "group", .. })
        ));
        assert!(matches!(
            store.get_post(99).await,
            Err(DomainError::NotFound { entity: "post", .. })
        ));
    }

    #[tokio::test]
    async fn test_rejected_mutation_rolls_back() {
        let store = seeded().await;
        let post = store.insert_post(new_post("ann", "keep", 1)).await.unwrap();
        let err = store
            .modify_post(
                post.id,
                Box::new(|_: &Post| Err(DomainError::Forbidden("not yours".into()))),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::Forbidden(_)));
        assert_eq!(store.get_post(post.id).await.unwrap(), post);

        let edited = store
            .modify_post(
                post.id,
                Box::new(|p: &Post| {
                    Ok(Post {
                        text: "changed".into(),
                        ..p.clone()
                    })
                }),
            )
            .await
            .unwrap();
        assert_eq!(edited.text, "changed");
        assert_eq!(store.get_post(post.id).await.unwrap(), edited);
    }

    #[tokio::test]
    async fn test_follow_feed_and_counters() {
        let store = seeded().await;
        assert!(store.insert_follow("ann", "bob").await.unwrap());
        assert!(!store.insert_follow("ann", "bob").await.unwrap());
        assert!(!store.insert_follow("bob", "bob").await.unwrap());
        store.insert_post(new_post("bob", "from bob", 1)).await.unwrap();
        store.insert_post(new_post("ann", "from ann", 2)).await.unwrap();

        let feed = PostFilter::FollowedBy("ann".into());
        let posts = store.list_posts(&feed, 0, 10).await.unwrap();
        assert_eq!(posts.len(), 1);
        assert_eq!(posts[0].author, "bob");
        assert_eq!(store.count_posts(&feed).await.unwrap(), 1);
        assert_eq!(store.count_followers("bob").await.unwrap(), 1);
        assert_eq!(store.count_following("bob").await.unwrap(), 0);

        assert!(store.delete_follow("ann", "bob").await.unwrap());
        assert!(!store.delete_follow("ann", "bob").await.unwrap());
        assert_eq!(store.count_posts(&feed).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_snapshot_restore_matches_source() {
        let store = seeded().await;
        store.insert_follow("bob", "ann").await.unwrap();
        let post = store.insert_post(new_post("ann", "p", 1)).await.unwrap();
        store
            .insert_comment(NewComment {
                post_id: post.id,
                author: "bob".into(),
                text: "nice".into(),
                created_at: at(2),
            })
            .await
            .unwrap();
        let snapshot = store.snapshot().await.unwrap();

        let copy = SqliteStore::in_memory().await.unwrap();
        copy.restore(snapshot.clone()).await.unwrap();
        assert_eq!(copy.snapshot().await.unwrap(), snapshot);
        assert_eq!(copy.list_comments(post.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_list_page_matches_count_and_listing() {
        let store = seeded().await;
        for i in 0..15 {
            store
                .insert_post(new_post("ann", &format!("post {i}"), i))
                .await
                .unwrap();
        }
        let paginator = Paginator::new(10, 3);
        let second = store
            .list_page(&PostFilter::Author("ann".into()), paginator, 2)
            .await
            .unwrap();
        assert_eq!(second.total_count, 15);
        assert_eq!(second.num_pages, 2);
        assert_eq!(
            second.items,
            store.list_posts(&PostFilter::All, 10, 10).await.unwrap()
        );

        let past_end = store.list_page(&PostFilter::All, paginator, 99).await.unwrap();
        assert_eq!(past_end, second);
    }
}
