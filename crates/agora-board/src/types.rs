//! Core types for board entities.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::{BoardError, BoardResult};
use crate::likes::TargetKind;

/// Global counter for the id clock identifier to ensure uniqueness within a process.
static ID_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Store-generated identifier for posts and comments.
///
/// Ids are 13 characters of base32-sortable encoding containing:
/// - 53 bits of microsecond timestamp
/// - 10 bits of clock identifier (for collision prevention)
///
/// Lexicographic order of ids therefore follows creation order.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(pub String);

impl EntityId {
    /// Generate a new id based on current time with a unique clock identifier.
    pub fn generate() -> Self {
        use std::time::{SystemTime, UNIX_EPOCH};

        let micros = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_micros() as u64;

        // Counter wraps at 1024 (10 bits), which handles up to 1024 ids per microsecond.
        let clock_id = ID_COUNTER.fetch_add(1, Ordering::Relaxed) & 0x3FF;

        Self::from_u64((micros << 10) | clock_id)
    }

    /// Create an id from a raw 63-bit value.
    fn from_u64(val: u64) -> Self {
        const CHARSET: &[u8] = b"234567abcdefghijklmnopqrstuvwxyz";
        let mut id = String::with_capacity(13);

        let mut v = val;
        for _ in 0..13 {
            id.push(CHARSET[(v & 0x1f) as usize] as char);
            v >>= 5;
        }

        Self(id.chars().rev().collect())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for EntityId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for EntityId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for EntityId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Like counter paired with the identities that produced it.
///
/// `count` always equals `liked_by.len()`; the only way to change either is
/// through [`Likes::add`] and [`Likes::remove`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Likes {
    #[serde(rename = "likes")]
    count: u64,
    liked_by: Vec<String>,
}

impl Likes {
    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn liked_by(&self) -> &[String] {
        &self.liked_by
    }

    pub fn contains(&self, identity: &str) -> bool {
        self.liked_by.iter().any(|id| id == identity)
    }

    /// Record a like from `identity`.
    pub fn add(&mut self, identity: &str, target: TargetKind) -> BoardResult<()> {
        if self.contains(identity) {
            return Err(BoardError::AlreadyLiked { target });
        }
        self.count += 1;
        self.liked_by.push(identity.to_string());
        Ok(())
    }

    /// Withdraw the like from `identity`.
    pub fn remove(&mut self, identity: &str, target: TargetKind) -> BoardResult<()> {
        if !self.contains(identity) {
            return Err(BoardError::NotLiked { target });
        }
        self.count -= 1;
        self.liked_by.retain(|id| id != identity);
        Ok(())
    }

    /// Whether the counter agrees with the membership set.
    pub fn is_consistent(&self) -> bool {
        self.count as usize == self.liked_by.len()
    }
}

/// A board post.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Post {
    pub id: EntityId,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub image: Option<String>,
    #[serde(flatten)]
    pub likes: Likes,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
}

/// Fields supplied when creating a post.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NewPost {
    pub title: Option<String>,
    pub text: Option<String>,
    pub image: Option<String>,
    /// Creator identity; `"unknown"` when unresolved.
    pub created_by: String,
}

/// Partial update for a post. `None` fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostPatch {
    pub title: Option<String>,
    pub text: Option<String>,
    pub image: Option<String>,
}

impl PostPatch {
    pub fn apply(self, post: &mut Post) {
        if let Some(title) = self.title {
            post.title = Some(title);
        }
        if let Some(text) = self.text {
            post.text = Some(text);
        }
        if let Some(image) = self.image {
            post.image = Some(image);
        }
    }
}

/// A comment attached to a post, optionally nested under another comment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    pub id: EntityId,
    pub post_id: EntityId,
    #[serde(default)]
    pub parent_id: Option<EntityId>,
    pub text: String,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    #[serde(flatten)]
    pub likes: Likes,
    pub depth: u32,
}

/// Fields supplied when creating a comment. Depth is computed by the comment tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewComment {
    pub post_id: EntityId,
    pub parent_id: Option<EntityId>,
    pub text: String,
    pub created_by: String,
    pub depth: u32,
}
