//! Tree store configuration.
//!
//! Default path: `~/.drawbridge/store`. The gateway binary takes its path
//! from the `[paths]` section of its own config instead.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Configuration for the local tree store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Base path. Trees live in `{base_path}/trees/`.
    pub base_path: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            base_path: default_store_path(),
        }
    }
}

fn default_store_path() -> PathBuf {
    directories::BaseDirs::new()
        .map(|dirs| dirs.home_dir().join(".drawbridge").join("store"))
        .unwrap_or_else(|| PathBuf::from(".drawbridge/store"))
}

impl StoreConfig {
    pub fn with_base_path(path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: path.into(),
        }
    }

    pub fn trees_dir(&self) -> PathBuf {
        self.base_path.join("trees")
    }
}
