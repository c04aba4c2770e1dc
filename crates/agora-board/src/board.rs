//! Composition root and read-side views.

use std::path::Path;
use std::sync::Arc;

use serde::Serialize;
use tracing::info;

use crate::comments::CommentTree;
use crate::config::BoardConfig;
use crate::error::BoardResult;
use crate::events::EventBus;
use crate::identity::Identity;
use crate::likes::LikeEngine;
use crate::posts::PostManager;
use crate::store::{CommentFilter, EntityStore, MemoryStore, PostFilter, SqliteStore};
use crate::types::{Comment, EntityId, Post};

/// A post as callers see it.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PostView {
    #[serde(flatten)]
    pub post: Post,
    /// Top-level comments only.
    pub replies: Vec<Comment>,
    /// Comments at every depth.
    pub comment_count: usize,
}

/// A comment together with its direct replies.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentView {
    #[serde(flatten)]
    pub comment: Comment,
    pub replies: Vec<Comment>,
}

/// Entity totals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BoardStats {
    pub posts: usize,
    pub comments: usize,
}

/// Owns the store and the event bus and hands both to every manager.
#[derive(Clone)]
pub struct Board {
    store: Arc<dyn EntityStore>,
    bus: Arc<EventBus>,
    posts: PostManager,
    comments: CommentTree,
    likes: LikeEngine,
}

impl Board {
    pub fn new(store: Arc<dyn EntityStore>, config: BoardConfig) -> Self {
        let bus = Arc::new(EventBus::new());
        info!(cascade = ?config.cascade, "board initialized");

        Self {
            posts: PostManager::new(store.clone(), bus.clone(), config.cascade),
            comments: CommentTree::new(store.clone(), bus.clone(), config.cascade),
            likes: LikeEngine::new(store.clone(), bus.clone()),
            store,
            bus,
        }
    }

    /// Board backed by a fresh [`MemoryStore`].
    pub fn in_memory(config: BoardConfig) -> Self {
        Self::new(Arc::new(MemoryStore::new()), config)
    }

    /// Board backed by the SQLite database at `path`.
    pub fn open(path: impl AsRef<Path>, config: BoardConfig) -> BoardResult<Self> {
        let store = SqliteStore::open(path)?;
        Ok(Self::new(Arc::new(store), config))
    }

    pub fn store(&self) -> &Arc<dyn EntityStore> {
        &self.store
    }

    pub fn bus(&self) -> &Arc<EventBus> {
        &self.bus
    }

    pub fn post_manager(&self) -> &PostManager {
        &self.posts
    }

    pub fn comment_tree(&self) -> &CommentTree {
        &self.comments
    }

    pub fn like_engine(&self) -> &LikeEngine {
        &self.likes
    }

    /// Every post, most recent first.
    pub async fn posts(&self) -> BoardResult<Vec<PostView>> {
        let posts = self.posts.list_posts().await?;
        self.post_views(posts).await
    }

    /// Posts created by `identity`, most recent first.
    pub async fn my_posts(&self, identity: &Identity) -> BoardResult<Vec<PostView>> {
        let posts = self.posts.list_posts_by(identity).await?;
        self.post_views(posts).await
    }

    pub async fn post(&self, id: &EntityId) -> BoardResult<PostView> {
        let post = self.posts.find_post(id).await?;
        self.post_view(post).await
    }

    /// Top-level comments of a post, each with its direct replies.
    pub async fn comments(&self, post_id: &EntityId) -> BoardResult<Vec<CommentView>> {
        let comments = self.comments.list_top_level(post_id).await?;
        self.comment_views(comments).await
    }

    /// Direct replies to a comment, each with its own direct replies.
    pub async fn replies(&self, comment_id: &EntityId) -> BoardResult<Vec<CommentView>> {
        let replies = self.comments.list_replies(comment_id).await?;
        self.comment_views(replies).await
    }

    pub async fn stats(&self) -> BoardResult<BoardStats> {
        Ok(BoardStats {
            posts: self.store.count_posts(&PostFilter::All).await?,
            comments: self.store.count_comments(&CommentFilter::All).await?,
        })
    }

    async fn post_view(&self, post: Post) -> BoardResult<PostView> {
        Ok(PostView {
            replies: self.comments.list_top_level(&post.id).await?,
            comment_count: self.comments.count_all(&post.id).await?,
            post,
        })
    }

    async fn post_views(&self, posts: Vec<Post>) -> BoardResult<Vec<PostView>> {
        let mut views = Vec::with_capacity(posts.len());
        for post in posts {
            views.push(self.post_view(post).await?);
        }
        Ok(views)
    }

    async fn comment_views(&self, comments: Vec<Comment>) -> BoardResult<Vec<CommentView>> {
        let mut views = Vec::with_capacity(comments.len());
        for comment in comments {
            views.push(CommentView {
                replies: self.comments.list_replies(&comment.id).await?,
                comment,
            });
        }
        Ok(views)
    }
}
