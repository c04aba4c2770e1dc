//! Post lifecycle: create, patch, delete and list.

use std::sync::Arc;

use tracing::{debug, info};

use crate::config::CascadePolicy;
use crate::error::{BoardError, BoardResult, ensure_owner};
use crate::events::{BoardEvent, EventBus};
use crate::identity::Identity;
use crate::store::{CommentFilter, EntityStore, PostFilter};
use crate::types::{EntityId, NewPost, Post, PostPatch};

/// Creates, edits, deletes and lists posts.
#[derive(Clone)]
pub struct PostManager {
    store: Arc<dyn EntityStore>,
    bus: Arc<EventBus>,
    cascade: CascadePolicy,
}

impl PostManager {
    pub fn new(store: Arc<dyn EntityStore>, bus: Arc<EventBus>, cascade: CascadePolicy) -> Self {
        Self {
            store,
            bus,
            cascade,
        }
    }

    /// Publish a new post with no likes.
    pub async fn create_post(
        &self,
        title: Option<String>,
        text: Option<String>,
        image: Option<String>,
        identity: &Identity,
    ) -> BoardResult<Post> {
        let created_by = match identity.as_str() {
            "" => Identity::UNKNOWN.to_string(),
            id => id.to_string(),
        };

        let post = self
            .store
            .create_post(NewPost {
                title,
                text,
                image,
                created_by,
            })
            .await?;

        debug!(id = %post.id, created_by = %post.created_by, "post created");
        self.bus.publish(BoardEvent::PostCreated(post.clone()));
        Ok(post)
    }

    /// Apply `patch` to a post owned by `identity`.
    pub async fn update_post(
        &self,
        id: &EntityId,
        patch: PostPatch,
        identity: &Identity,
    ) -> BoardResult<Post> {
        let owner = identity.to_string();

        let updated = self
            .store
            .update_post(
                id,
                Box::new(move |post: &mut Post| {
                    ensure_owner(&post.created_by, &owner, "update", "post")?;
                    patch.apply(post);
                    Ok(())
                }),
            )
            .await?
            .ok_or_else(|| BoardError::post_not_found(id))?;

        debug!(id = %id, "post updated");
        self.bus.publish(BoardEvent::PostUpdated(updated.clone()));
        Ok(updated)
    }

    /// Delete a post owned by `identity`, returning it as it was.
    ///
    /// Comments on the post are removed only under [`CascadePolicy::Subtree`].
    pub async fn delete_post(&self, id: &EntityId, identity: &Identity) -> BoardResult<Post> {
        let post = self
            .store
            .find_post(id)
            .await?
            .ok_or_else(|| BoardError::post_not_found(id))?;
        ensure_owner(&post.created_by, identity.as_str(), "delete", "post")?;

        // A concurrent delete may have won; report it the same way.
        let removed = self
            .store
            .delete_post(id)
            .await?
            .ok_or_else(|| BoardError::post_not_found(id))?;

        let comments_removed = match self.cascade {
            CascadePolicy::DirectReplies => 0,
            CascadePolicy::Subtree => {
                self.store
                    .delete_comments(&CommentFilter::OnPost(id.clone()))
                    .await?
            }
        };

        info!(id = %id, comments_removed, "post deleted");
        self.bus.publish(BoardEvent::PostDeleted(removed.clone()));
        Ok(removed)
    }

    pub async fn find_post(&self, id: &EntityId) -> BoardResult<Post> {
        self.store
            .find_post(id)
            .await?
            .ok_or_else(|| BoardError::post_not_found(id))
    }

    /// Every post, most recent first.
    pub async fn list_posts(&self) -> BoardResult<Vec<Post>> {
        self.store.find_posts(&PostFilter::All).await
    }

    /// Posts created by `identity`, most recent first.
    pub async fn list_posts_by(&self, identity: &Identity) -> BoardResult<Vec<Post>> {
        self.store
            .find_posts(&PostFilter::CreatedBy(identity.to_string()))
            .await
    }
}
