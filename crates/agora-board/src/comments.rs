//! Nested comments on posts.
//!
//! Comments form a forest per post. A top-level comment has depth 0 and a
//! reply sits one level below its parent, up to [`MAX_COMMENT_DEPTH`].

use std::collections::VecDeque;
use std::sync::Arc;

use tracing::{debug, info};

use crate::config::CascadePolicy;
use crate::error::{BoardError, BoardResult, ensure_owner};
use crate::events::{BoardEvent, EventBus};
use crate::identity::Identity;
use crate::store::{CommentFilter, EntityStore};
use crate::types::{Comment, EntityId, NewComment};

/// Deepest nesting level a comment may have.
pub const MAX_COMMENT_DEPTH: u32 = 5;

/// Creates, edits, deletes and lists comments.
#[derive(Clone)]
pub struct CommentTree {
    store: Arc<dyn EntityStore>,
    bus: Arc<EventBus>,
    cascade: CascadePolicy,
}

impl CommentTree {
    pub fn new(store: Arc<dyn EntityStore>, bus: Arc<EventBus>, cascade: CascadePolicy) -> Self {
        Self {
            store,
            bus,
            cascade,
        }
    }

    /// Add a comment to `post_id`, optionally as a reply to `parent_id`.
    ///
    /// The post itself is not checked for existence.
    pub async fn create_comment(
        &self,
        post_id: &EntityId,
        text: &str,
        parent_id: Option<&EntityId>,
        identity: &Identity,
    ) -> BoardResult<Comment> {
        let text = non_empty(text)?;

        let depth = match parent_id {
            Some(parent_id) => {
                let parent =
                    self.store
                        .find_comment(parent_id)
                        .await?
                        .ok_or_else(|| BoardError::NotFound {
                            what: "parent comment",
                            id: parent_id.clone(),
                        })?;
                let depth = parent.depth + 1;
                if depth > MAX_COMMENT_DEPTH {
                    return Err(BoardError::DepthLimitExceeded {
                        max: MAX_COMMENT_DEPTH,
                    });
                }
                depth
            }
            None => 0,
        };

        let comment = self
            .store
            .create_comment(NewComment {
                post_id: post_id.clone(),
                parent_id: parent_id.cloned(),
                text,
                created_by: identity.to_string(),
                depth,
            })
            .await?;

        debug!(id = %comment.id, post_id = %post_id, depth, "comment created");
        self.bus.publish(BoardEvent::CommentCreated(comment.clone()));
        Ok(comment)
    }

    /// Replace the text of a comment owned by `identity`.
    pub async fn update_comment(
        &self,
        id: &EntityId,
        text: &str,
        identity: &Identity,
    ) -> BoardResult<Comment> {
        let owner = identity.to_string();
        let text = text.to_string();

        let updated = self
            .store
            .update_comment(
                id,
                Box::new(move |comment: &mut Comment| {
                    ensure_owner(&comment.created_by, &owner, "update", "comment")?;
                    comment.text = non_empty(&text)?;
                    Ok(())
                }),
            )
            .await?
            .ok_or_else(|| BoardError::comment_not_found(id))?;

        debug!(id = %id, "comment updated");
        self.bus.publish(BoardEvent::CommentUpdated(updated.clone()));
        Ok(updated)
    }

    /// Delete a comment owned by `identity` together with its replies.
    ///
    /// Which replies go with it depends on the cascade policy. Returns the
    /// comment as it was before removal.
    pub async fn delete_comment(&self, id: &EntityId, identity: &Identity) -> BoardResult<Comment> {
        let comment = self
            .store
            .find_comment(id)
            .await?
            .ok_or_else(|| BoardError::comment_not_found(id))?;
        ensure_owner(&comment.created_by, identity.as_str(), "delete", "comment")?;

        let filter = match self.cascade {
            CascadePolicy::DirectReplies => CommentFilter::SelfAndReplies(id.clone()),
            CascadePolicy::Subtree => CommentFilter::Ids(self.subtree_ids(id).await?),
        };
        let removed = self.store.delete_comments(&filter).await?;

        info!(id = %id, removed, cascade = ?self.cascade, "comment deleted");
        self.bus.publish(BoardEvent::CommentDeleted(comment.clone()));
        Ok(comment)
    }

    /// Top-level comments of a post, most recent first.
    pub async fn list_top_level(&self, post_id: &EntityId) -> BoardResult<Vec<Comment>> {
        self.store
            .find_comments(&CommentFilter::TopLevel(post_id.clone()))
            .await
    }

    /// Direct replies to a comment, most recent first.
    pub async fn list_replies(&self, parent_id: &EntityId) -> BoardResult<Vec<Comment>> {
        self.store
            .find_comments(&CommentFilter::RepliesTo(parent_id.clone()))
            .await
    }

    /// Number of comments on a post at any depth.
    pub async fn count_all(&self, post_id: &EntityId) -> BoardResult<usize> {
        self.store
            .count_comments(&CommentFilter::OnPost(post_id.clone()))
            .await
    }

    /// `root` and every comment below it, breadth first.
    async fn subtree_ids(&self, root: &EntityId) -> BoardResult<Vec<EntityId>> {
        let mut ids = vec![root.clone()];
        let mut queue = VecDeque::from([root.clone()]);

        while let Some(parent) = queue.pop_front() {
            for reply in self.list_replies(&parent).await? {
                queue.push_back(reply.id.clone());
                ids.push(reply.id);
            }
        }
        Ok(ids)
    }
}

fn non_empty(text: &str) -> BoardResult<String> {
    if text.trim().is_empty() {
        return Err(BoardError::InvalidInput(
            "comment text must not be empty".to_string(),
        ));
    }
    Ok(text.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventKind;
    use crate::store::MemoryStore;
    use pretty_assertions::assert_eq;

    fn tree(cascade: CascadePolicy) -> (Arc<MemoryStore>, Arc<EventBus>, CommentTree) {
        let store = Arc::new(MemoryStore::new());
        let bus = Arc::new(EventBus::new());
        let tree = CommentTree::new(store.clone(), bus.clone(), cascade);
        (store, bus, tree)
    }

    fn alice() -> Identity {
        Identity::from("1.1.1.1")
    }

    /// Build a chain of `len` comments, each replying to the previous one.
    async fn chain(tree: &CommentTree, post: &EntityId, len: usize) -> Vec<Comment> {
        let mut comments: Vec<Comment> = Vec::new();
        for i in 0..len {
            let parent = comments.last().map(|c| c.id.clone());
            let comment = tree
                .create_comment(post, &format!("level {}", i), parent.as_ref(), &alice())
                .await
                .unwrap();
            comments.push(comment);
        }
        comments
    }

    #[tokio::test]
    async fn test_create_top_level_and_reply() {
        let (_store, bus, tree) = tree(CascadePolicy::default());
        let mut created = bus.subscribe(EventKind::CommentCreated);
        let post = EntityId::generate();

        let root = tree
            .create_comment(&post, "first", None, &alice())
            .await
            .unwrap();
        assert_eq!(root.depth, 0);
        assert!(root.parent_id.is_none());

        let reply = tree
            .create_comment(&post, "second", Some(&root.id), &alice())
            .await
            .unwrap();
        assert_eq!(reply.depth, 1);
        assert_eq!(reply.parent_id, Some(root.id.clone()));
        assert_eq!(reply.created_by, "1.1.1.1");

        assert_eq!(created.try_recv().unwrap().comment().unwrap().id, root.id);
        assert_eq!(created.try_recv().unwrap().comment().unwrap().id, reply.id);
    }

    #[tokio::test]
    async fn test_depth_limit() {
        let (_store, _bus, tree) = tree(CascadePolicy::default());
        let post = EntityId::generate();

        // Depths 0 through 5 are all allowed
        let comments = chain(&tree, &post, 6).await;
        assert_eq!(comments[4].depth, 4);
        assert_eq!(comments[5].depth, MAX_COMMENT_DEPTH);

        let err = tree
            .create_comment(&post, "too deep", Some(&comments[5].id), &alice())
            .await
            .unwrap_err();
        assert!(matches!(err, BoardError::DepthLimitExceeded { max: 5 }));
        assert_eq!(tree.count_all(&post).await.unwrap(), 6);
    }

    #[tokio::test]
    async fn test_missing_parent() {
        let (_store, _bus, tree) = tree(CascadePolicy::default());
        let err = tree
            .create_comment(
                &EntityId::generate(),
                "orphan",
                Some(&EntityId::from("gone")),
                &alice(),
            )
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "parent comment not found: gone");
    }

    #[tokio::test]
    async fn test_empty_text_rejected() {
        let (store, _bus, tree) = tree(CascadePolicy::default());
        let post = EntityId::generate();

        let err = tree
            .create_comment(&post, "   ", None, &alice())
            .await
            .unwrap_err();
        assert!(matches!(err, BoardError::InvalidInput(_)));
        assert_eq!(store.comment_count(), 0);

        let comment = tree
            .create_comment(&post, "ok", None, &alice())
            .await
            .unwrap();
        let err = tree
            .update_comment(&comment.id, "", &alice())
            .await
            .unwrap_err();
        assert!(matches!(err, BoardError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn test_update_by_owner_and_stranger() {
        let (store, bus, tree) = tree(CascadePolicy::default());
        let mut updated = bus.subscribe(EventKind::CommentUpdated);
        let post = EntityId::generate();
        let comment = tree
            .create_comment(&post, "draft", None, &alice())
            .await
            .unwrap();

        let err = tree
            .update_comment(&comment.id, "hijacked", &Identity::from("6.6.6.6"))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "you can only update your own comments");
        let stored = store.find_comment(&comment.id).await.unwrap().unwrap();
        assert_eq!(stored.text, "draft");
        assert!(updated.try_recv().is_none());

        let edited = tree
            .update_comment(&comment.id, "final", &alice())
            .await
            .unwrap();
        assert_eq!(edited.text, "final");
        assert_eq!(edited.depth, comment.depth);
        assert_eq!(updated.try_recv().unwrap().comment().unwrap().text, "final");
    }

    #[tokio::test]
    async fn test_update_missing() {
        let (_store, _bus, tree) = tree(CascadePolicy::default());
        let err = tree
            .update_comment(&EntityId::from("x"), "text", &alice())
            .await
            .unwrap_err();
        assert!(matches!(err, BoardError::NotFound { what: "comment", .. }));
    }

    #[tokio::test]
    async fn test_delete_cascades_one_level() {
        let (store, bus, tree) = tree(CascadePolicy::DirectReplies);
        let mut deleted = bus.subscribe(EventKind::CommentDeleted);
        let post = EntityId::generate();
        let comments = chain(&tree, &post, 3).await;
        let (a, b, c) = (&comments[0], &comments[1], &comments[2]);

        let removed = tree.delete_comment(&a.id, &alice()).await.unwrap();
        assert_eq!(removed, *a);

        assert!(store.find_comment(&a.id).await.unwrap().is_none());
        assert!(store.find_comment(&b.id).await.unwrap().is_none());
        // Grandchild is left in place, still pointing at the removed reply
        let orphan = store.find_comment(&c.id).await.unwrap().unwrap();
        assert_eq!(orphan.parent_id, Some(b.id.clone()));

        let event = deleted.try_recv().unwrap();
        assert_eq!(event.comment().unwrap().id, a.id);
        assert!(deleted.try_recv().is_none());
    }

    #[tokio::test]
    async fn test_delete_subtree() {
        let (store, _bus, tree) = tree(CascadePolicy::Subtree);
        let post = EntityId::generate();
        let comments = chain(&tree, &post, 4).await;
        let sibling = tree
            .create_comment(&post, "sibling", Some(&comments[0].id), &alice())
            .await
            .unwrap();
        let unrelated = tree
            .create_comment(&post, "elsewhere", None, &alice())
            .await
            .unwrap();

        tree.delete_comment(&comments[0].id, &alice()).await.unwrap();

        for comment in comments.iter().chain([&sibling]) {
            assert!(store.find_comment(&comment.id).await.unwrap().is_none());
        }
        assert!(store.find_comment(&unrelated.id).await.unwrap().is_some());
        assert_eq!(store.comment_count(), 1);
    }

    #[tokio::test]
    async fn test_delete_forbidden_leaves_state() {
        let (store, bus, tree) = tree(CascadePolicy::default());
        let mut deleted = bus.subscribe(EventKind::CommentDeleted);
        let post = EntityId::generate();
        let comments = chain(&tree, &post, 2).await;

        let err = tree
            .delete_comment(&comments[0].id, &Identity::from("9.9.9.9"))
            .await
            .unwrap_err();
        assert!(matches!(err, BoardError::Forbidden { action: "delete", .. }));
        assert_eq!(store.comment_count(), 2);
        assert!(deleted.try_recv().is_none());
    }

    #[tokio::test]
    async fn test_listing_order() {
        let (_store, _bus, tree) = tree(CascadePolicy::default());
        let post = EntityId::generate();
        let root = tree
            .create_comment(&post, "root", None, &alice())
            .await
            .unwrap();
        let first = tree
            .create_comment(&post, "r1", Some(&root.id), &alice())
            .await
            .unwrap();
        let second = tree
            .create_comment(&post, "r2", Some(&root.id), &alice())
            .await
            .unwrap();
        let newer_root = tree
            .create_comment(&post, "root 2", None, &alice())
            .await
            .unwrap();

        let top: Vec<_> = tree
            .list_top_level(&post)
            .await
            .unwrap()
            .into_iter()
            .map(|c| c.id)
            .collect();
        assert_eq!(top, vec![newer_root.id, root.id.clone()]);

        let replies: Vec<_> = tree
            .list_replies(&root.id)
            .await
            .unwrap()
            .into_iter()
            .map(|c| c.id)
            .collect();
        assert_eq!(replies, vec![second.id, first.id]);
        assert_eq!(tree.count_all(&post).await.unwrap(), 4);
    }
}
