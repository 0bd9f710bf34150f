//! Content tree store: the read-only boundary the gateway fetches from.
//!
//! `TreeStore` opens trees by key; a `ContentTree` is an open handle that
//! can stat and stream its entries. `DirStore` is the local filesystem
//! implementation, with trees sharded by key prefix:
//!
//! ```text
//! {base_path}/
//! └── trees/
//!     ├── 34/
//!     │   └── f4c3f0bc...   # tree root (remaining 62 hex chars)
//!     │       ├── index.html
//!     │       └── js/app.js
//!     └── a1/
//!         └── ...
//! ```

use std::io;
use std::path::{Component, Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use futures::StreamExt;
use tokio_util::io::ReaderStream;
use tracing::debug;

use crate::config::StoreConfig;
use crate::error::StoreError;
use crate::key::{DiscoveryKey, TreeKey};

/// Streamed file content.
pub type ByteStream = BoxStream<'static, io::Result<Bytes>>;

/// Result of a successful stat.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntryStat {
    pub size: u64,
}

/// Opens content trees by key.
#[async_trait]
pub trait TreeStore: Send + Sync {
    /// Open a handle. The tree may not be usable until `ready()` resolves.
    async fn open(&self, key: &TreeKey) -> Result<Arc<dyn ContentTree>, StoreError>;
}

/// An open content tree.
#[async_trait]
pub trait ContentTree: Send + Sync {
    fn key(&self) -> &TreeKey;

    fn discovery_key(&self) -> DiscoveryKey {
        self.key().discovery_key()
    }

    /// Wait until tree metadata is available.
    async fn ready(&self) -> Result<(), StoreError>;

    /// Stat a file. Fails with `MissingEntry` when absent.
    async fn stat(&self, path: &str) -> Result<EntryStat, StoreError>;

    /// Stream a file's bytes.
    async fn read_stream(&self, path: &str) -> Result<ByteStream, StoreError>;

    /// Release the handle.
    async fn close(&self) -> Result<(), StoreError>;
}

/// Filesystem-backed tree store.
#[derive(Debug, Clone)]
pub struct DirStore {
    config: StoreConfig,
}

impl DirStore {
    pub fn new(config: StoreConfig) -> Self {
        Self { config }
    }

    pub fn at_path(path: impl Into<PathBuf>) -> Self {
        Self::new(StoreConfig::with_base_path(path))
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Directory a tree's files live under.
    pub fn tree_path(&self, key: &TreeKey) -> PathBuf {
        let wire = key.to_wire();
        self.config.trees_dir().join(&wire[..2]).join(&wire[2..])
    }
}

#[async_trait]
impl TreeStore for DirStore {
    async fn open(&self, key: &TreeKey) -> Result<Arc<dyn ContentTree>, StoreError> {
        Ok(Arc::new(DirTree {
            key: *key,
            root: self.tree_path(key),
            closed: AtomicBool::new(false),
        }))
    }
}

/// A tree rooted at a local directory.
#[derive(Debug)]
pub struct DirTree {
    key: TreeKey,
    root: PathBuf,
    closed: AtomicBool,
}

impl DirTree {
    fn check_open(&self) -> Result<(), StoreError> {
        if self.closed.load(Ordering::Acquire) {
            Err(StoreError::Closed)
        } else {
            Ok(())
        }
    }

    /// Map a tree path onto the filesystem, refusing anything that could
    /// step outside the root.
    fn entry_path(&self, path: &str) -> Result<PathBuf, StoreError> {
        let mut resolved = self.root.clone();
        for component in Path::new(path).components() {
            match component {
                Component::Normal(part) => resolved.push(part),
                Component::RootDir | Component::CurDir => {}
                Component::ParentDir | Component::Prefix(_) => {
                    return Err(missing(path));
                }
            }
        }
        Ok(resolved)
    }
}

#[async_trait]
impl ContentTree for DirTree {
    fn key(&self) -> &TreeKey {
        &self.key
    }

    async fn ready(&self) -> Result<(), StoreError> {
        self.check_open()?;
        match tokio::fs::metadata(&self.root).await {
            Ok(meta) if meta.is_dir() => Ok(()),
            Ok(_) => Err(StoreError::MissingTree { key: self.key }),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                Err(StoreError::MissingTree { key: self.key })
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn stat(&self, path: &str) -> Result<EntryStat, StoreError> {
        self.check_open()?;
        let full = self.entry_path(path)?;
        match tokio::fs::metadata(&full).await {
            Ok(meta) if meta.is_file() => Ok(EntryStat { size: meta.len() }),
            Ok(_) => Err(missing(path)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Err(missing(path)),
            Err(e) => Err(e.into()),
        }
    }

    async fn read_stream(&self, path: &str) -> Result<ByteStream, StoreError> {
        self.check_open()?;
        let full = self.entry_path(path)?;
        let file = match tokio::fs::File::open(&full).await {
            Ok(f) => f,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Err(missing(path)),
            Err(e) => return Err(e.into()),
        };
        Ok(ReaderStream::new(file).boxed())
    }

    async fn close(&self) -> Result<(), StoreError> {
        if !self.closed.swap(true, Ordering::AcqRel) {
            debug!(key = %self.key, "closed tree");
        }
        Ok(())
    }
}

fn missing(path: &str) -> StoreError {
    StoreError::MissingEntry {
        path: path.to_string(),
    }
}
