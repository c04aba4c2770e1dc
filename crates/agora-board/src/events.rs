//! In-process publish/subscribe for board change events.
//!
//! Subscribers register for one [`EventKind`] and receive every event of that
//! kind published while their [`Subscription`] is alive, in publish order.
//! Delivery is a broadcast: nothing is filtered by post or comment id here.
//! Dropped subscriptions are pruned on the next publish of their kind; there is
//! no buffering for absent subscribers and no replay.

use std::pin::Pin;
use std::str::FromStr;
use std::task::{Context, Poll};

use dashmap::DashMap;
use futures_util::Stream;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, trace};

use crate::types::{Comment, Post};

/// Kind of change an event describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EventKind {
    PostCreated,
    PostUpdated,
    PostDeleted,
    PostLiked,
    CommentCreated,
    CommentUpdated,
    CommentDeleted,
    CommentLiked,
}

impl EventKind {
    pub const ALL: [EventKind; 8] = [
        EventKind::PostCreated,
        EventKind::PostUpdated,
        EventKind::PostDeleted,
        EventKind::PostLiked,
        EventKind::CommentCreated,
        EventKind::CommentUpdated,
        EventKind::CommentDeleted,
        EventKind::CommentLiked,
    ];

    /// Stable kebab-case name, as used on the wire.
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::PostCreated => "post-created",
            EventKind::PostUpdated => "post-updated",
            EventKind::PostDeleted => "post-deleted",
            EventKind::PostLiked => "post-liked",
            EventKind::CommentCreated => "comment-created",
            EventKind::CommentUpdated => "comment-updated",
            EventKind::CommentDeleted => "comment-deleted",
            EventKind::CommentLiked => "comment-liked",
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EventKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| format!("unknown event kind '{}'", s))
    }
}

/// A change event with the entity state it carries.
///
/// Liked events are emitted for unlikes as well and carry the updated entity.
/// Deleted events carry the state the entity had before removal.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", content = "payload", rename_all = "kebab-case")]
pub enum BoardEvent {
    PostCreated(Post),
    PostUpdated(Post),
    PostDeleted(Post),
    PostLiked(Post),
    CommentCreated(Comment),
    CommentUpdated(Comment),
    CommentDeleted(Comment),
    CommentLiked(Comment),
}

impl BoardEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            BoardEvent::PostCreated(_) => EventKind::PostCreated,
            BoardEvent::PostUpdated(_) => EventKind::PostUpdated,
            BoardEvent::PostDeleted(_) => EventKind::PostDeleted,
            BoardEvent::PostLiked(_) => EventKind::PostLiked,
            BoardEvent::CommentCreated(_) => EventKind::CommentCreated,
            BoardEvent::CommentUpdated(_) => EventKind::CommentUpdated,
            BoardEvent::CommentDeleted(_) => EventKind::CommentDeleted,
            BoardEvent::CommentLiked(_) => EventKind::CommentLiked,
        }
    }

    pub fn post(&self) -> Option<&Post> {
        match self {
            BoardEvent::PostCreated(p)
            | BoardEvent::PostUpdated(p)
            | BoardEvent::PostDeleted(p)
            | BoardEvent::PostLiked(p) => Some(p),
            _ => None,
        }
    }

    pub fn comment(&self) -> Option<&Comment> {
        match self {
            BoardEvent::CommentCreated(c)
            | BoardEvent::CommentUpdated(c)
            | BoardEvent::CommentDeleted(c)
            | BoardEvent::CommentLiked(c) => Some(c),
            _ => None,
        }
    }

    /// The entity itself, as JSON, without the kind tag.
    pub fn payload(&self) -> serde_json::Result<String> {
        match (self.post(), self.comment()) {
            (Some(post), _) => serde_json::to_string(post),
            (_, Some(comment)) => serde_json::to_string(comment),
            (None, None) => Ok("null".to_string()),
        }
    }
}

/// Process-wide event broker.
///
/// Owned by the composition root and shared by reference with every mutation
/// path and the subscription delivery layer.
#[derive(Debug, Default)]
pub struct EventBus {
    /// Live subscriber channels by event kind.
    subscribers: DashMap<EventKind, Vec<mpsc::UnboundedSender<BoardEvent>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register for every event of `kind` published from now on.
    pub fn subscribe(&self, kind: EventKind) -> Subscription {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers.entry(kind).or_default().push(tx);
        debug!(%kind, "event subscriber registered");
        Subscription { kind, rx }
    }

    /// Deliver `event` to every live subscriber of its kind.
    ///
    /// Returns the number of subscribers that received it.
    pub fn publish(&self, event: BoardEvent) -> usize {
        let kind = event.kind();

        // The entry guard is held for the whole fan-out so concurrent
        // publishers of one kind reach each subscriber in the same order.
        let Some(mut senders) = self.subscribers.get_mut(&kind) else {
            trace!(%kind, "no subscribers for event");
            return 0;
        };

        let before = senders.len();
        senders.retain(|tx| tx.send(event.clone()).is_ok());
        let delivered = senders.len();

        if delivered < before {
            debug!(%kind, pruned = before - delivered, "dropped closed subscribers");
        }
        if delivered == 0 {
            trace!(%kind, "no subscribers for event");
        }
        delivered
    }

    /// Number of live subscribers for `kind`.
    pub fn subscriber_count(&self, kind: EventKind) -> usize {
        self.subscribers
            .get(&kind)
            .map(|senders| senders.iter().filter(|tx| !tx.is_closed()).count())
            .unwrap_or(0)
    }
}

/// Lazy, unbounded stream of events of one kind.
///
/// Dropping the subscription unregisters it.
#[derive(Debug)]
pub struct Subscription {
    kind: EventKind,
    rx: mpsc::UnboundedReceiver<BoardEvent>,
}

impl Subscription {
    pub fn kind(&self) -> EventKind {
        self.kind
    }

    /// Wait for the next event.
    pub async fn recv(&mut self) -> Option<BoardEvent> {
        self.rx.recv().await
    }

    /// Take the next event if one is already queued.
    pub fn try_recv(&mut self) -> Option<BoardEvent> {
        self.rx.try_recv().ok()
    }
}

impl Stream for Subscription {
    type Item = BoardEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}
