//! In-memory entity store.
//!
//! Thread-safe and designed for concurrent access from multiple tasks. Each
//! document lives in a sharded map entry; holding that entry's write guard is
//! what makes a [`Mutation`] atomic.

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use tracing::trace;

use super::{CommentFilter, EntityStore, Mutation, PostFilter, newest_first};
use crate::error::BoardResult;
use crate::types::{Comment, EntityId, Likes, NewComment, NewPost, Post};

/// Posts and comments held in process memory.
#[derive(Debug, Default)]
pub struct MemoryStore {
    /// Posts by id.
    posts: DashMap<EntityId, Post>,
    /// Comments by id.
    comments: DashMap<EntityId, Comment>,
}

impl MemoryStore {
    /// Create a new empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored posts.
    pub fn post_count(&self) -> usize {
        self.posts.len()
    }

    /// Number of stored comments.
    pub fn comment_count(&self) -> usize {
        self.comments.len()
    }

    /// Remove everything.
    pub fn clear(&self) {
        self.posts.clear();
        self.comments.clear();
    }
}

#[async_trait]
impl EntityStore for MemoryStore {
    async fn create_post(&self, fields: NewPost) -> BoardResult<Post> {
        let post = Post {
            id: EntityId::generate(),
            title: fields.title,
            text: fields.text,
            image: fields.image,
            likes: Likes::default(),
            created_by: fields.created_by,
            created_at: Utc::now(),
        };
        self.posts.insert(post.id.clone(), post.clone());
        trace!(id = %post.id, "store: post created");
        Ok(post)
    }

    async fn find_post(&self, id: &EntityId) -> BoardResult<Option<Post>> {
        Ok(self.posts.get(id).map(|r| r.value().clone()))
    }

    async fn find_posts(&self, filter: &PostFilter) -> BoardResult<Vec<Post>> {
        let mut posts: Vec<Post> = self
            .posts
            .iter()
            .filter(|r| filter.matches(r.value()))
            .map(|r| r.value().clone())
            .collect();
        newest_first(&mut posts, |p| (&p.created_at, &p.id));
        Ok(posts)
    }

    async fn update_post(
        &self,
        id: &EntityId,
        mutation: Mutation<Post>,
    ) -> BoardResult<Option<Post>> {
        let Some(mut entry) = self.posts.get_mut(id) else {
            return Ok(None);
        };

        // Mutate a copy so a failed mutation leaves the stored document intact
        let mut updated = entry.value().clone();
        mutation(&mut updated)?;
        *entry.value_mut() = updated.clone();

        trace!(id = %id, "store: post updated");
        Ok(Some(updated))
    }

    async fn delete_post(&self, id: &EntityId) -> BoardResult<Option<Post>> {
        let removed = self.posts.remove(id).map(|(_, post)| post);
        if removed.is_some() {
            trace!(id = %id, "store: post deleted");
        }
        Ok(removed)
    }

    async fn count_posts(&self, filter: &PostFilter) -> BoardResult<usize> {
        Ok(self.posts.iter().filter(|r| filter.matches(r.value())).count())
    }

    async fn create_comment(&self, fields: NewComment) -> BoardResult<Comment> {
        let comment = Comment {
            id: EntityId::generate(),
            post_id: fields.post_id,
            parent_id: fields.parent_id,
            text: fields.text,
            created_by: fields.created_by,
            created_at: Utc::now(),
            likes: Likes::default(),
            depth: fields.depth,
        };
        self.comments.insert(comment.id.clone(), comment.clone());
        trace!(id = %comment.id, post_id = %comment.post_id, depth = comment.depth, "store: comment created");
        Ok(comment)
    }

    async fn find_comment(&self, id: &EntityId) -> BoardResult<Option<Comment>> {
        Ok(self.comments.get(id).map(|r| r.value().clone()))
    }

    async fn find_comments(&self, filter: &CommentFilter) -> BoardResult<Vec<Comment>> {
        let mut comments: Vec<Comment> = self
            .comments
            .iter()
            .filter(|r| filter.matches(r.value()))
            .map(|r| r.value().clone())
            .collect();
        newest_first(&mut comments, |c| (&c.created_at, &c.id));
        Ok(comments)
    }

    async fn update_comment(
        &self,
        id: &EntityId,
        mutation: Mutation<Comment>,
    ) -> BoardResult<Option<Comment>> {
        let Some(mut entry) = self.comments.get_mut(id) else {
            return Ok(None);
        };

        let mut updated = entry.value().clone();
        mutation(&mut updated)?;
        *entry.value_mut() = updated.clone();

        trace!(id = %id, "store: comment updated");
        Ok(Some(updated))
    }

    async fn delete_comment(&self, id: &EntityId) -> BoardResult<Option<Comment>> {
        let removed = self.comments.remove(id).map(|(_, comment)| comment);
        if removed.is_some() {
            trace!(id = %id, "store: comment deleted");
        }
        Ok(removed)
    }

    async fn delete_comments(&self, filter: &CommentFilter) -> BoardResult<usize> {
        let before = self.comments.len();
        self.comments.retain(|_, comment| !filter.matches(comment));
        let removed = before.saturating_sub(self.comments.len());
        trace!(removed, ?filter, "store: comments deleted");
        Ok(removed)
    }

    async fn count_comments(&self, filter: &CommentFilter) -> BoardResult<usize> {
        Ok(self
            .comments
            .iter()
            .filter(|r| filter.matches(r.value()))
            .count())
    }
}
