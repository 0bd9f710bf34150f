//! Gateway error taxonomy.

use thiserror::Error;
use treestore::{StoreError, SwarmError};

/// Failures while resolving a request to file content.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// Missing entry or missing tree.
    #[error("not found: {0}")]
    NotFound(String),

    /// I/O or protocol failure in the content store.
    #[error("store error: {0}")]
    Store(StoreError),

    /// Joining the swarm failed while opening a tree.
    #[error("swarm error: {0}")]
    Swarm(#[from] SwarmError),
}

impl From<StoreError> for GatewayError {
    fn from(err: StoreError) -> Self {
        if err.is_missing() {
            Self::NotFound(err.to_string())
        } else {
            Self::Store(err)
        }
    }
}

impl GatewayError {
    /// Errors caused by the client rather than the gateway.
    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

/// Failures while releasing an evicted tree. Only ever logged.
#[derive(Debug, Error)]
pub enum TeardownError {
    #[error("leaving swarm topic failed: {0}")]
    Forget(#[from] SwarmError),

    #[error("closing tree failed: {0}")]
    Close(#[from] StoreError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_store_errors_become_not_found() {
        let err: GatewayError = StoreError::MissingEntry {
            path: "/x".to_string(),
        }
        .into();
        assert!(matches!(err, GatewayError::NotFound(_)));
        assert!(err.is_client_error());

        let err: GatewayError = StoreError::Closed.into();
        assert!(matches!(err, GatewayError::Store(_)));
        assert!(!err.is_client_error());
    }
}
