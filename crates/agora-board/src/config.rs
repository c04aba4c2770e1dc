//! Board behaviour configuration.

use serde::{Deserialize, Serialize};

/// How far deletes reach into dependent comments.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CascadePolicy {
    /// Deleting a comment removes its direct replies only; deleting a post
    /// leaves its comments in place.
    #[default]
    DirectReplies,
    /// Deleting a comment removes its whole subtree; deleting a post removes
    /// every comment on it.
    Subtree,
}

/// Configuration for a [`crate::Board`].
#[derive(Debug, Clone, Default)]
pub struct BoardConfig {
    pub cascade: CascadePolicy,
}

impl BoardConfig {
    pub fn with_cascade(mut self, cascade: CascadePolicy) -> Self {
        self.cascade = cascade;
        self
    }
}
