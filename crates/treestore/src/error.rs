use thiserror::Error;

use crate::key::TreeKey;

/// Errors from the content store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("no entry at {path}")]
    MissingEntry { path: String },

    #[error("tree {key} is not available")]
    MissingTree { key: TreeKey },

    #[error("tree handle is closed")]
    Closed,

    #[error("store I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl StoreError {
    /// Missing entries and missing trees both surface to clients as not-found.
    pub fn is_missing(&self) -> bool {
        matches!(self, Self::MissingEntry { .. } | Self::MissingTree { .. })
    }

    /// True only for a missing entry inside an existing tree.
    pub fn is_missing_entry(&self) -> bool {
        matches!(self, Self::MissingEntry { .. })
    }
}

/// Errors from the swarm membership collaborator.
#[derive(Debug, Error)]
pub enum SwarmError {
    #[error("swarm configure failed: {0}")]
    Configure(String),
}
