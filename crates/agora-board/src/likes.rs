//! Like and unlike for posts and comments.
//!
//! One identity holds at most one like per target. The counter and the
//! liked-by set change together inside a single store mutation, so concurrent
//! likes from different identities are never lost.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{BoardError, BoardResult};
use crate::events::{BoardEvent, EventBus};
use crate::identity::Identity;
use crate::store::{EntityStore, Mutation};
use crate::types::{Comment, EntityId, Likes, Post};

/// Which entity collection a like applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetKind {
    Post,
    Comment,
}

impl std::fmt::Display for TargetKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TargetKind::Post => write!(f, "post"),
            TargetKind::Comment => write!(f, "comment"),
        }
    }
}

/// An entity that carries likes.
#[async_trait]
pub trait LikeTarget: Clone + Send + Sync + 'static {
    const KIND: TargetKind;

    fn likes(&self) -> &Likes;

    fn likes_mut(&mut self) -> &mut Likes;

    /// Wrap the updated entity in its `<Kind>Liked` event.
    fn into_liked_event(self) -> BoardEvent;

    /// Run `mutation` against the stored entity `id`.
    async fn update_in(
        store: &dyn EntityStore,
        id: &EntityId,
        mutation: Mutation<Self>,
    ) -> BoardResult<Option<Self>>;

    fn not_found(id: &EntityId) -> BoardError;
}

#[async_trait]
impl LikeTarget for Post {
    const KIND: TargetKind = TargetKind::Post;

    fn likes(&self) -> &Likes {
        &self.likes
    }

    fn likes_mut(&mut self) -> &mut Likes {
        &mut self.likes
    }

    fn into_liked_event(self) -> BoardEvent {
        BoardEvent::PostLiked(self)
    }

    async fn update_in(
        store: &dyn EntityStore,
        id: &EntityId,
        mutation: Mutation<Self>,
    ) -> BoardResult<Option<Self>> {
        store.update_post(id, mutation).await
    }

    fn not_found(id: &EntityId) -> BoardError {
        BoardError::post_not_found(id)
    }
}

#[async_trait]
impl LikeTarget for Comment {
    const KIND: TargetKind = TargetKind::Comment;

    fn likes(&self) -> &Likes {
        &self.likes
    }

    fn likes_mut(&mut self) -> &mut Likes {
        &mut self.likes
    }

    fn into_liked_event(self) -> BoardEvent {
        BoardEvent::CommentLiked(self)
    }

    async fn update_in(
        store: &dyn EntityStore,
        id: &EntityId,
        mutation: Mutation<Self>,
    ) -> BoardResult<Option<Self>> {
        store.update_comment(id, mutation).await
    }

    fn not_found(id: &EntityId) -> BoardError {
        BoardError::comment_not_found(id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Toggle {
    Like,
    Unlike,
}

/// Applies likes and unlikes and announces them on the bus.
#[derive(Clone)]
pub struct LikeEngine {
    store: Arc<dyn EntityStore>,
    bus: Arc<EventBus>,
}

impl LikeEngine {
    pub fn new(store: Arc<dyn EntityStore>, bus: Arc<EventBus>) -> Self {
        Self { store, bus }
    }

    /// Record a like from `identity` on target `id`.
    pub async fn like<T: LikeTarget>(&self, id: &EntityId, identity: &Identity) -> BoardResult<T> {
        self.toggle(id, identity, Toggle::Like).await
    }

    /// Withdraw the like from `identity` on target `id`.
    ///
    /// Publishes the same `<Kind>Liked` event as [`LikeEngine::like`].
    pub async fn unlike<T: LikeTarget>(
        &self,
        id: &EntityId,
        identity: &Identity,
    ) -> BoardResult<T> {
        self.toggle(id, identity, Toggle::Unlike).await
    }

    pub async fn like_post(&self, id: &EntityId, identity: &Identity) -> BoardResult<Post> {
        self.like(id, identity).await
    }

    pub async fn unlike_post(&self, id: &EntityId, identity: &Identity) -> BoardResult<Post> {
        self.unlike(id, identity).await
    }

    pub async fn like_comment(&self, id: &EntityId, identity: &Identity) -> BoardResult<Comment> {
        self.like(id, identity).await
    }

    pub async fn unlike_comment(
        &self,
        id: &EntityId,
        identity: &Identity,
    ) -> BoardResult<Comment> {
        self.unlike(id, identity).await
    }

    async fn toggle<T: LikeTarget>(
        &self,
        id: &EntityId,
        identity: &Identity,
        toggle: Toggle,
    ) -> BoardResult<T> {
        let who = identity.as_str().to_string();
        let mutation: Mutation<T> = Box::new(move |target: &mut T| match toggle {
            Toggle::Like => target.likes_mut().add(&who, T::KIND),
            Toggle::Unlike => target.likes_mut().remove(&who, T::KIND),
        });

        let updated = T::update_in(self.store.as_ref(), id, mutation)
            .await?
            .ok_or_else(|| T::not_found(id))?;

        debug!(
            target_kind = %T::KIND,
            id = %id,
            identity = %identity,
            ?toggle,
            likes = updated.likes().count(),
            "like toggled"
        );

        self.bus.publish(updated.clone().into_liked_event());
        Ok(updated)
    }
}
