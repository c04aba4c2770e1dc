//! Discussion board core for Agora.
//!
//! This crate keeps the comment tree consistent under concurrent mutation,
//! enforces one like per identity on posts and comments, and fans change
//! events out to live subscribers.
//!
//! ## Features
//!
//! - **Identity**: opaque caller tokens derived from connection metadata
//! - **Store**: async entity store contract with in-memory and SQLite backends
//! - **Comments**: parent linkage, depth limit and cascading deletes
//! - **Likes**: atomic like/unlike toggling for posts and comments
//! - **Events**: in-process publish/subscribe keyed by event kind
//! - **Board**: composition root wiring the above together

mod board;
pub mod comments;
mod config;
mod error;
pub mod events;
pub mod identity;
pub mod likes;
pub mod posts;
pub mod store;
mod types;

pub use board::{Board, BoardStats, CommentView, PostView};
pub use comments::{CommentTree, MAX_COMMENT_DEPTH};
pub use config::{BoardConfig, CascadePolicy};
pub use error::{BoardError, BoardResult, StoreError};
pub use events::{BoardEvent, EventBus, EventKind, Subscription};
pub use identity::{ConnectionMeta, Identity, IdentityResolver};
pub use likes::{LikeEngine, LikeTarget, TargetKind};
pub use posts::PostManager;
pub use store::{CommentFilter, EntityStore, MemoryStore, Mutation, PostFilter, SqliteStore};
pub use types::*;
