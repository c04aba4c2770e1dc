//! SQLite-backed entity store.
//!
//! Documents are stored as JSON next to the indexed columns the filters need.
//! A single connection behind a mutex serialises writers; updates run inside
//! a transaction so a failed [`Mutation`] rolls back.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};
use rusqlite::{Connection, OptionalExtension, params, params_from_iter};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{info, trace};

use super::{CommentFilter, EntityStore, Mutation, PostFilter};
use crate::error::{BoardResult, StoreError};
use crate::types::{Comment, EntityId, Likes, NewComment, NewPost, Post};

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS posts (
        id TEXT PRIMARY KEY,
        created_by TEXT NOT NULL,
        created_at TEXT NOT NULL,
        doc TEXT NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_posts_created_by ON posts(created_by);
    CREATE INDEX IF NOT EXISTS idx_posts_created_at ON posts(created_at);

    CREATE TABLE IF NOT EXISTS comments (
        id TEXT PRIMARY KEY,
        post_id TEXT NOT NULL,
        parent_id TEXT,
        created_at TEXT NOT NULL,
        doc TEXT NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_comments_post ON comments(post_id, parent_id);
    CREATE INDEX IF NOT EXISTS idx_comments_parent ON comments(parent_id);
";

/// SQLite-backed post and comment storage.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

/// A SQL `WHERE` clause with its positional parameters.
struct Clause {
    sql: String,
    params: Vec<String>,
}

impl Clause {
    fn new(sql: impl Into<String>, params: Vec<String>) -> Self {
        Self {
            sql: sql.into(),
            params,
        }
    }
}

impl From<&PostFilter> for Clause {
    fn from(filter: &PostFilter) -> Self {
        match filter {
            PostFilter::All => Clause::new("1", vec![]),
            PostFilter::CreatedBy(identity) => Clause::new("created_by = ?", vec![identity.clone()]),
        }
    }
}

impl From<&CommentFilter> for Clause {
    fn from(filter: &CommentFilter) -> Self {
        match filter {
            CommentFilter::All => Clause::new("1", vec![]),
            CommentFilter::OnPost(post_id) => Clause::new("post_id = ?", vec![post_id.0.clone()]),
            CommentFilter::TopLevel(post_id) => {
                Clause::new("post_id = ? AND parent_id IS NULL", vec![post_id.0.clone()])
            }
            CommentFilter::RepliesTo(parent_id) => {
                Clause::new("parent_id = ?", vec![parent_id.0.clone()])
            }
            CommentFilter::SelfAndReplies(id) => {
                Clause::new("(id = ? OR parent_id = ?)", vec![id.0.clone(), id.0.clone()])
            }
            CommentFilter::Ids(ids) if ids.is_empty() => Clause::new("0", vec![]),
            CommentFilter::Ids(ids) => {
                let placeholders = vec!["?"; ids.len()].join(", ");
                Clause::new(
                    format!("id IN ({})", placeholders),
                    ids.iter().map(|id| id.0.clone()).collect(),
                )
            }
        }
    }
}

/// Creation time with the precision the `created_at` column keeps, so that
/// text order of the column equals time order.
fn creation_time() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

fn timestamp_column(at: &DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

impl SqliteStore {
    /// Open or create the SQLite database.
    pub fn open(path: impl AsRef<Path>) -> BoardResult<Self> {
        let path = path.as_ref();
        let conn = Connection::open(path)?;

        // Enable WAL mode for concurrent reads
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;
        conn.execute_batch(SCHEMA)?;

        info!(path = %path.display(), "board database initialized");

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Open a private in-memory database.
    pub fn open_in_memory() -> BoardResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> BoardResult<MutexGuard<'_, Connection>> {
        Ok(self.conn.lock().map_err(|_| StoreError::Poisoned)?)
    }

    fn find_one<T: DeserializeOwned>(&self, table: &str, id: &EntityId) -> BoardResult<Option<T>> {
        let conn = self.lock()?;
        let doc: Option<String> = conn
            .query_row(
                &format!("SELECT doc FROM {} WHERE id = ?1", table),
                params![id.0],
                |row| row.get(0),
            )
            .optional()?;
        Ok(doc.map(|d| serde_json::from_str(&d)).transpose()?)
    }

    fn find_where<T: DeserializeOwned>(&self, table: &str, clause: Clause) -> BoardResult<Vec<T>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT doc FROM {} WHERE {} ORDER BY created_at DESC, id DESC",
            table, clause.sql
        ))?;
        let docs = stmt
            .query_map(params_from_iter(clause.params.iter()), |row| {
                row.get::<_, String>(0)
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let mut items = Vec::with_capacity(docs.len());
        for doc in docs {
            items.push(serde_json::from_str(&doc)?);
        }
        Ok(items)
    }

    fn count_where(&self, table: &str, clause: Clause) -> BoardResult<usize> {
        let conn = self.lock()?;
        let count: i64 = conn.query_row(
            &format!("SELECT COUNT(*) FROM {} WHERE {}", table, clause.sql),
            params_from_iter(clause.params.iter()),
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    fn update_one<T: Serialize + DeserializeOwned>(
        &self,
        table: &str,
        id: &EntityId,
        mutation: Mutation<T>,
    ) -> BoardResult<Option<T>> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;

        let doc: Option<String> = tx
            .query_row(
                &format!("SELECT doc FROM {} WHERE id = ?1", table),
                params![id.0],
                |row| row.get(0),
            )
            .optional()?;
        let Some(doc) = doc else {
            return Ok(None);
        };

        let mut item: T = serde_json::from_str(&doc)?;
        // Dropping `tx` on the error path rolls back
        mutation(&mut item)?;

        tx.execute(
            &format!("UPDATE {} SET doc = ?2 WHERE id = ?1", table),
            params![id.0, serde_json::to_string(&item)?],
        )?;
        tx.commit()?;

        trace!(table, id = %id, "store: document updated");
        Ok(Some(item))
    }

    fn delete_one<T: DeserializeOwned>(&self, table: &str, id: &EntityId) -> BoardResult<Option<T>> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;

        let doc: Option<String> = tx
            .query_row(
                &format!("SELECT doc FROM {} WHERE id = ?1", table),
                params![id.0],
                |row| row.get(0),
            )
            .optional()?;
        let Some(doc) = doc else {
            return Ok(None);
        };

        tx.execute(&format!("DELETE FROM {} WHERE id = ?1", table), params![id.0])?;
        tx.commit()?;

        trace!(table, id = %id, "store: document deleted");
        Ok(Some(serde_json::from_str(&doc)?))
    }
}

#[async_trait]
impl EntityStore for SqliteStore {
    async fn create_post(&self, fields: NewPost) -> BoardResult<Post> {
        let post = Post {
            id: EntityId::generate(),
            title: fields.title,
            text: fields.text,
            image: fields.image,
            likes: Likes::default(),
            created_by: fields.created_by,
            created_at: creation_time(),
        };

        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO posts (id, created_by, created_at, doc) VALUES (?1, ?2, ?3, ?4)",
            params![
                post.id.0,
                post.created_by,
                timestamp_column(&post.created_at),
                serde_json::to_string(&post)?,
            ],
        )?;

        trace!(id = %post.id, "store: post created");
        Ok(post)
    }

    async fn find_post(&self, id: &EntityId) -> BoardResult<Option<Post>> {
        self.find_one("posts", id)
    }

    async fn find_posts(&self, filter: &PostFilter) -> BoardResult<Vec<Post>> {
        self.find_where("posts", filter.into())
    }

    async fn update_post(
        &self,
        id: &EntityId,
        mutation: Mutation<Post>,
    ) -> BoardResult<Option<Post>> {
        self.update_one("posts", id, mutation)
    }

    async fn delete_post(&self, id: &EntityId) -> BoardResult<Option<Post>> {
        self.delete_one("posts", id)
    }

    async fn count_posts(&self, filter: &PostFilter) -> BoardResult<usize> {
        self.count_where("posts", filter.into())
    }

    async fn create_comment(&self, fields: NewComment) -> BoardResult<Comment> {
        let comment = Comment {
            id: EntityId::generate(),
            post_id: fields.post_id,
            parent_id: fields.parent_id,
            text: fields.text,
            created_by: fields.created_by,
            created_at: creation_time(),
            likes: Likes::default(),
            depth: fields.depth,
        };

        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO comments (id, post_id, parent_id, created_at, doc)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                comment.id.0,
                comment.post_id.0,
                comment.parent_id.as_ref().map(|p| p.0.as_str()),
                timestamp_column(&comment.created_at),
                serde_json::to_string(&comment)?,
            ],
        )?;

        trace!(id = %comment.id, post_id = %comment.post_id, "store: comment created");
        Ok(comment)
    }

    async fn find_comment(&self, id: &EntityId) -> BoardResult<Option<Comment>> {
        self.find_one("comments", id)
    }

    async fn find_comments(&self, filter: &CommentFilter) -> BoardResult<Vec<Comment>> {
        self.find_where("comments", filter.into())
    }

    async fn update_comment(
        &self,
        id: &EntityId,
        mutation: Mutation<Comment>,
    ) -> BoardResult<Option<Comment>> {
        self.update_one("comments", id, mutation)
    }

    async fn delete_comment(&self, id: &EntityId) -> BoardResult<Option<Comment>> {
        self.delete_one("comments", id)
    }

    async fn delete_comments(&self, filter: &CommentFilter) -> BoardResult<usize> {
        let clause = Clause::from(filter);
        let conn = self.lock()?;
        let removed = conn.execute(
            &format!("DELETE FROM comments WHERE {}", clause.sql),
            params_from_iter(clause.params.iter()),
        )?;
        trace!(removed, ?filter, "store: comments deleted");
        Ok(removed)
    }

    async fn count_comments(&self, filter: &CommentFilter) -> BoardResult<usize> {
        self.count_where("comments", filter.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BoardError;
    use crate::likes::TargetKind;
    use pretty_assertions::assert_eq;

    fn new_post(by: &str) -> NewPost {
        NewPost {
            title: Some("t".to_string()),
            text: Some("b".to_string()),
            image: Some(String::new()),
            created_by: by.to_string(),
        }
    }

    fn reply_to(parent: &Comment) -> NewComment {
        NewComment {
            post_id: parent.post_id.clone(),
            parent_id: Some(parent.id.clone()),
            text: "reply".to_string(),
            created_by: "a".to_string(),
            depth: parent.depth + 1,
        }
    }

    #[tokio::test]
    async fn test_post_roundtrip() {
        let store = SqliteStore::open_in_memory().unwrap();
        let post = store.create_post(new_post("1.1.1.1")).await.unwrap();

        let found = store.find_post(&post.id).await.unwrap().unwrap();
        assert_eq!(found, post);

        let updated = store
            .update_post(
                &post.id,
                Box::new(|p: &mut Post| p.likes.add("2.2.2.2", TargetKind::Post)),
            )
            .await
            .unwrap()
            .unwrap();
        assert_eq!(updated.likes.count(), 1);
        assert_eq!(
            store.find_post(&post.id).await.unwrap().unwrap().likes,
            updated.likes
        );
    }

    #[tokio::test]
    async fn test_failed_mutation_rolls_back() {
        let store = SqliteStore::open_in_memory().unwrap();
        let post = store.create_post(new_post("a")).await.unwrap();
        store
            .update_post(&post.id, Box::new(|p: &mut Post| p.likes.add("x", TargetKind::Post)))
            .await
            .unwrap();

        let err = store
            .update_post(&post.id, Box::new(|p: &mut Post| p.likes.add("x", TargetKind::Post)))
            .await
            .unwrap_err();
        assert!(matches!(err, BoardError::AlreadyLiked { .. }));

        let stored = store.find_post(&post.id).await.unwrap().unwrap();
        assert_eq!(stored.likes.count(), 1);
    }

    #[tokio::test]
    async fn test_filters_and_ordering() {
        let store = SqliteStore::open_in_memory().unwrap();
        let first = store.create_post(new_post("a")).await.unwrap();
        let second = store.create_post(new_post("b")).await.unwrap();

        let all = store.find_posts(&PostFilter::All).await.unwrap();
        let ids: Vec<_> = all.into_iter().map(|p| p.id).collect();
        assert_eq!(ids, vec![second.id.clone(), first.id.clone()]);
        assert_eq!(
            store
                .count_posts(&PostFilter::CreatedBy("b".to_string()))
                .await
                .unwrap(),
            1
        );

        let root = store
            .create_comment(NewComment {
                post_id: first.id.clone(),
                parent_id: None,
                text: "root".to_string(),
                created_by: "a".to_string(),
                depth: 0,
            })
            .await
            .unwrap();
        let child = store.create_comment(reply_to(&root)).await.unwrap();
        let grandchild = store.create_comment(reply_to(&child)).await.unwrap();

        let top = store
            .find_comments(&CommentFilter::TopLevel(first.id.clone()))
            .await
            .unwrap();
        assert_eq!(top.len(), 1);
        assert_eq!(top[0].parent_id, None);

        assert_eq!(
            store
                .count_comments(&CommentFilter::OnPost(first.id.clone()))
                .await
                .unwrap(),
            3
        );

        let removed = store
            .delete_comments(&CommentFilter::SelfAndReplies(root.id.clone()))
            .await
            .unwrap();
        assert_eq!(removed, 2);
        assert!(store.find_comment(&grandchild.id).await.unwrap().is_some());

        let removed = store
            .delete_comments(&CommentFilter::Ids(vec![]))
            .await
            .unwrap();
        assert_eq!(removed, 0);
    }

    #[tokio::test]
    async fn test_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("board.db");

        let post_id = {
            let store = SqliteStore::open(&path).unwrap();
            let post = store.create_post(new_post("a")).await.unwrap();
            store
                .update_post(&post.id, Box::new(|p: &mut Post| p.likes.add("b", TargetKind::Post)))
                .await
                .unwrap();
            post.id
        };

        let store = SqliteStore::open(&path).unwrap();
        let post = store.find_post(&post_id).await.unwrap().unwrap();
        assert_eq!(post.likes.liked_by(), ["b".to_string()]);
    }
}
