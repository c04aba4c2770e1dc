//! Server-Sent Events for live board updates.

use std::convert::Infallible;

use axum::response::sse::{Event, KeepAlive, Sse};
use serde::Deserialize;
use tokio_stream::StreamExt;
use tracing::warn;

use agora_board::{BoardEvent, EntityId, Subscription};

/// Optional narrowing of an event stream to one post or comment.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionScope {
    pub post_id: Option<EntityId>,
    pub comment_id: Option<EntityId>,
}

impl SubscriptionScope {
    pub fn is_unscoped(&self) -> bool {
        self.post_id.is_none() && self.comment_id.is_none()
    }

    /// Whether `event` concerns the scoped post or comment.
    ///
    /// A comment scope matches the comment itself and its direct replies.
    pub fn matches(&self, event: &BoardEvent) -> bool {
        let post_matches = self.post_id.as_ref().is_none_or(|id| {
            match (event.post(), event.comment()) {
                (Some(post), _) => &post.id == id,
                (_, Some(comment)) => &comment.post_id == id,
                (None, None) => false,
            }
        });
        let comment_matches = self.comment_id.as_ref().is_none_or(|id| {
            event
                .comment()
                .is_some_and(|c| &c.id == id || c.parent_id.as_ref() == Some(id))
        });
        post_matches && comment_matches
    }
}

/// Create an SSE stream from a bus subscription.
///
/// Each frame is named after the event kind and carries the entity as JSON.
pub fn create_sse_stream(
    subscription: Subscription,
    scope: SubscriptionScope,
) -> Sse<impl tokio_stream::Stream<Item = Result<Event, Infallible>>> {
    let kind = subscription.kind();

    let stream = subscription
        .filter(move |event| scope.matches(event))
        .filter_map(move |event| match event.payload() {
            Ok(data) => Some(Ok(Event::default().event(kind.as_str()).data(data))),
            Err(e) => {
                warn!(%kind, error = %e, "dropping event that failed to serialize");
                None
            }
        });

    Sse::new(stream).keep_alive(KeepAlive::default())
}

#[cfg(test)]
mod tests {
    use super::*;
    use agora_board::{Comment, Likes, Post};
    use chrono::Utc;

    fn post(id: &str) -> Post {
        Post {
            id: EntityId::from(id),
            title: None,
            text: None,
            image: None,
            likes: Likes::default(),
            created_by: "a".to_string(),
            created_at: Utc::now(),
        }
    }

    fn comment(id: &str, post_id: &str, parent: Option<&str>) -> Comment {
        Comment {
            id: EntityId::from(id),
            post_id: EntityId::from(post_id),
            parent_id: parent.map(EntityId::from),
            text: "t".to_string(),
            created_by: "a".to_string(),
            created_at: Utc::now(),
            likes: Likes::default(),
            depth: u32::from(parent.is_some()),
        }
    }

    #[test]
    fn test_unscoped_matches_everything() {
        let scope = SubscriptionScope::default();
        assert!(scope.is_unscoped());
        assert!(scope.matches(&BoardEvent::PostCreated(post("p1"))));
        assert!(scope.matches(&BoardEvent::CommentLiked(comment("c1", "p1", None))));
    }

    #[test]
    fn test_post_scope() {
        let scope = SubscriptionScope {
            post_id: Some(EntityId::from("p1")),
            comment_id: None,
        };
        assert!(scope.matches(&BoardEvent::PostLiked(post("p1"))));
        assert!(!scope.matches(&BoardEvent::PostLiked(post("p2"))));
        assert!(scope.matches(&BoardEvent::CommentCreated(comment("c1", "p1", None))));
        assert!(!scope.matches(&BoardEvent::CommentCreated(comment("c2", "p2", None))));
    }

    #[test]
    fn test_comment_scope() {
        let scope = SubscriptionScope {
            post_id: None,
            comment_id: Some(EntityId::from("c1")),
        };
        assert!(scope.matches(&BoardEvent::CommentUpdated(comment("c1", "p1", None))));
        assert!(scope.matches(&BoardEvent::CommentCreated(comment("c2", "p1", Some("c1")))));
        assert!(!scope.matches(&BoardEvent::CommentCreated(comment("c3", "p1", Some("c2")))));
        assert!(!scope.matches(&BoardEvent::PostUpdated(post("p1"))));
    }

    #[test]
    fn test_scope_from_query() {
        let scope: SubscriptionScope =
            serde_json::from_value(serde_json::json!({ "postId": "p9" })).unwrap();
        assert_eq!(scope.post_id, Some(EntityId::from("p9")));
        assert!(scope.comment_id.is_none());
    }
}
