//! Entity store contract for posts and comments.
//!
//! Every operation is atomic for a single document. Nothing here spans
//! documents transactionally: the board composes single-document calls.
//! Listings are always most-recent-first.

mod memory;
mod sqlite;

use async_trait::async_trait;

use crate::error::BoardResult;
use crate::types::{Comment, EntityId, NewComment, NewPost, Post};

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

/// Change applied to one document while the store holds it exclusively.
///
/// Returning an error aborts the update and leaves the document untouched.
pub type Mutation<T> = Box<dyn FnOnce(&mut T) -> BoardResult<()> + Send>;

/// Selects posts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PostFilter {
    All,
    CreatedBy(String),
}

impl PostFilter {
    pub fn matches(&self, post: &Post) -> bool {
        match self {
            PostFilter::All => true,
            PostFilter::CreatedBy(identity) => &post.created_by == identity,
        }
    }
}

/// Selects comments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommentFilter {
    All,
    /// Every comment on a post, at any depth.
    OnPost(EntityId),
    /// Comments on a post without a parent.
    TopLevel(EntityId),
    /// Direct replies to a comment.
    RepliesTo(EntityId),
    /// A comment together with its direct replies.
    SelfAndReplies(EntityId),
    /// An explicit set of comments.
    Ids(Vec<EntityId>),
}

impl CommentFilter {
    pub fn matches(&self, comment: &Comment) -> bool {
        match self {
            CommentFilter::All => true,
            CommentFilter::OnPost(post_id) => &comment.post_id == post_id,
            CommentFilter::TopLevel(post_id) => {
                &comment.post_id == post_id && comment.parent_id.is_none()
            }
            CommentFilter::RepliesTo(parent_id) => comment.parent_id.as_ref() == Some(parent_id),
            CommentFilter::SelfAndReplies(id) => {
                &comment.id == id || comment.parent_id.as_ref() == Some(id)
            }
            CommentFilter::Ids(ids) => ids.contains(&comment.id),
        }
    }
}

/// Storage for posts and comments.
#[async_trait]
pub trait EntityStore: Send + Sync {
    /// Persist a new post, assigning its id and creation time.
    async fn create_post(&self, fields: NewPost) -> BoardResult<Post>;

    async fn find_post(&self, id: &EntityId) -> BoardResult<Option<Post>>;

    async fn find_posts(&self, filter: &PostFilter) -> BoardResult<Vec<Post>>;

    /// Apply `mutation` atomically. Returns `None` when the post is absent.
    async fn update_post(
        &self,
        id: &EntityId,
        mutation: Mutation<Post>,
    ) -> BoardResult<Option<Post>>;

    async fn delete_post(&self, id: &EntityId) -> BoardResult<Option<Post>>;

    async fn count_posts(&self, filter: &PostFilter) -> BoardResult<usize>;

    /// Persist a new comment, assigning its id and creation time.
    async fn create_comment(&self, fields: NewComment) -> BoardResult<Comment>;

    async fn find_comment(&self, id: &EntityId) -> BoardResult<Option<Comment>>;

    async fn find_comments(&self, filter: &CommentFilter) -> BoardResult<Vec<Comment>>;

    /// Apply `mutation` atomically. Returns `None` when the comment is absent.
    async fn update_comment(
        &self,
        id: &EntityId,
        mutation: Mutation<Comment>,
    ) -> BoardResult<Option<Comment>>;

    async fn delete_comment(&self, id: &EntityId) -> BoardResult<Option<Comment>>;

    /// Delete every matching comment, returning how many were removed.
    async fn delete_comments(&self, filter: &CommentFilter) -> BoardResult<usize>;

    async fn count_comments(&self, filter: &CommentFilter) -> BoardResult<usize>;
}

/// Most-recent-first ordering shared by the store implementations.
pub(crate) fn newest_first<T>(
    items: &mut [T],
    key: impl Fn(&T) -> (&chrono::DateTime<chrono::Utc>, &EntityId),
) {
    items.sort_by(|a, b| key(b).cmp(&key(a)));
}
