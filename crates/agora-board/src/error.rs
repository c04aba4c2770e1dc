//! Error types for board operations.

use thiserror::Error;

use crate::likes::TargetKind;
use crate::types::EntityId;

/// Errors raised by board mutations and queries.
#[derive(Debug, Error)]
pub enum BoardError {
    /// Target post, comment or parent comment is absent.
    #[error("{what} not found: {id}")]
    NotFound { what: &'static str, id: EntityId },

    /// Caller identity does not own the entity.
    #[error("you can only {action} your own {what}s")]
    Forbidden {
        action: &'static str,
        what: &'static str,
    },

    /// Identity already present in the liked-by set.
    #[error("user has already liked this {target}")]
    AlreadyLiked { target: TargetKind },

    /// Identity absent from the liked-by set.
    #[error("user has not liked this {target}")]
    NotLiked { target: TargetKind },

    /// Comment nesting would go past the maximum depth.
    #[error("maximum nesting depth of {max} reached")]
    DepthLimitExceeded { max: u32 },

    /// Request carried unusable input.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Backing store failed.
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

impl BoardError {
    pub(crate) fn post_not_found(id: &EntityId) -> Self {
        Self::NotFound {
            what: "post",
            id: id.clone(),
        }
    }

    pub(crate) fn comment_not_found(id: &EntityId) -> Self {
        Self::NotFound {
            what: "comment",
            id: id.clone(),
        }
    }
}

/// Errors from the backing entity store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// SQLite error.
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Stored document could not be encoded or decoded.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Connection lock was poisoned by a panicking writer.
    #[error("store lock poisoned")]
    Poisoned,
}

impl From<rusqlite::Error> for BoardError {
    fn from(e: rusqlite::Error) -> Self {
        Self::Store(StoreError::Sqlite(e))
    }
}

impl From<serde_json::Error> for BoardError {
    fn from(e: serde_json::Error) -> Self {
        Self::Store(StoreError::Json(e))
    }
}

pub type BoardResult<T> = Result<T, BoardError>;

/// Fail with [`BoardError::Forbidden`] unless `identity` created the entity.
pub(crate) fn ensure_owner(
    created_by: &str,
    identity: &str,
    action: &'static str,
    what: &'static str,
) -> BoardResult<()> {
    if created_by != identity {
        return Err(BoardError::Forbidden { action, what });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_are_human_readable() {
        let id = EntityId::from("3abc4def5ghi6");
        assert_eq!(
            BoardError::post_not_found(&id).to_string(),
            "post not found: 3abc4def5ghi6"
        );
        assert_eq!(
            BoardError::Forbidden {
                action: "delete",
                what: "comment"
            }
            .to_string(),
            "you can only delete your own comments"
        );
        assert_eq!(
            BoardError::AlreadyLiked {
                target: TargetKind::Post
            }
            .to_string(),
            "user has already liked this post"
        );
        assert_eq!(
            BoardError::DepthLimitExceeded { max: 5 }.to_string(),
            "maximum nesting depth of 5 reached"
        );
    }
}
