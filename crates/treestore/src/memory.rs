//! In-memory tree store.
//!
//! Trees are registered up front with [`MemoryStore::insert_tree`]. Opens
//! and closes are counted so callers can check handle lifecycles.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use futures::stream::{self, StreamExt};

use crate::error::StoreError;
use crate::key::TreeKey;
use crate::store::{ByteStream, ContentTree, EntryStat, TreeStore};

type Files = Arc<BTreeMap<String, Bytes>>;

#[derive(Debug, Default)]
struct Counters {
    opens: AtomicUsize,
    closes: AtomicUsize,
}

#[derive(Debug)]
pub struct MemoryStore {
    trees: DashMap<TreeKey, Files>,
    counters: Arc<Counters>,
    chunk_size: usize,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self {
            trees: DashMap::new(),
            counters: Arc::default(),
            chunk_size: 64 * 1024,
        }
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Split reads into chunks of at most `size` bytes.
    pub fn with_chunk_size(mut self, size: usize) -> Self {
        self.chunk_size = size.max(1);
        self
    }

    /// Register a tree. Paths are stored with a leading `/`.
    pub fn insert_tree<I, P, B>(&self, key: TreeKey, files: I)
    where
        I: IntoIterator<Item = (P, B)>,
        P: AsRef<str>,
        B: Into<Bytes>,
    {
        let files = files
            .into_iter()
            .map(|(path, body)| (normalize(path.as_ref()), body.into()))
            .collect();
        self.trees.insert(key, Arc::new(files));
    }

    pub fn opens(&self) -> usize {
        self.counters.opens.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> usize {
        self.counters.closes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TreeStore for MemoryStore {
    async fn open(&self, key: &TreeKey) -> Result<Arc<dyn ContentTree>, StoreError> {
        self.counters.opens.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(MemoryTree {
            key: *key,
            files: self.trees.get(key).map(|f| Arc::clone(&f)),
            counters: Arc::clone(&self.counters),
            chunk_size: self.chunk_size,
            closed: AtomicBool::new(false),
        }))
    }
}

#[derive(Debug)]
pub struct MemoryTree {
    key: TreeKey,
    files: Option<Files>,
    counters: Arc<Counters>,
    chunk_size: usize,
    closed: AtomicBool,
}

impl MemoryTree {
    fn files(&self) -> Result<&Files, StoreError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(StoreError::Closed);
        }
        self.files
            .as_ref()
            .ok_or(StoreError::MissingTree { key: self.key })
    }

    fn entry(&self, path: &str) -> Result<Bytes, StoreError> {
        let path = normalize(path);
        self.files()?
            .get(&path)
            .cloned()
            .ok_or(StoreError::MissingEntry { path })
    }
}

#[async_trait]
impl ContentTree for MemoryTree {
    fn key(&self) -> &TreeKey {
        &self.key
    }

    async fn ready(&self) -> Result<(), StoreError> {
        self.files().map(|_| ())
    }

    async fn stat(&self, path: &str) -> Result<EntryStat, StoreError> {
        let body = self.entry(path)?;
        Ok(EntryStat {
            size: body.len() as u64,
        })
    }

    async fn read_stream(&self, path: &str) -> Result<ByteStream, StoreError> {
        let body = self.entry(path)?;
        let chunks: Vec<_> = (0..body.len())
            .step_by(self.chunk_size)
            .map(|start| Ok(body.slice(start..(start + self.chunk_size).min(body.len()))))
            .collect();
        Ok(stream::iter(chunks).boxed())
    }

    async fn close(&self) -> Result<(), StoreError> {
        if !self.closed.swap(true, Ordering::AcqRel) {
            self.counters.closes.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }
}

fn normalize(path: &str) -> String {
    format!("/{}", path.trim_start_matches('/'))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key() -> TreeKey {
        TreeKey::from_bytes([7; 32])
    }

    async fn read_all(tree: &dyn ContentTree, path: &str) -> Vec<Bytes> {
        tree.read_stream(path)
            .await
            .unwrap()
            .map(|c| c.unwrap())
            .collect()
            .await
    }

    #[tokio::test]
    async fn test_stat_and_read_in_chunks() {
        let store = MemoryStore::new().with_chunk_size(4);
        store.insert_tree(key(), [("index.html", "0123456789")]);

        let tree = store.open(&key()).await.unwrap();
        tree.ready().await.unwrap();
        assert_eq!(tree.stat("/index.html").await.unwrap().size, 10);

        let chunks = read_all(tree.as_ref(), "/index.html").await;
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks.concat(), b"0123456789");
    }

    #[tokio::test]
    async fn test_unknown_tree_is_missing() {
        let store = MemoryStore::new();
        let tree = store.open(&key()).await.unwrap();
        assert!(matches!(tree.ready().await, Err(StoreError::MissingTree { .. })));
    }

    #[tokio::test]
    async fn test_counts_opens_and_closes_once() {
        let store = MemoryStore::new();
        store.insert_tree(key(), [("/a.txt", "a")]);

        let tree = store.open(&key()).await.unwrap();
        tree.close().await.unwrap();
        tree.close().await.unwrap();

        assert_eq!(store.opens(), 1);
        assert_eq!(store.closes(), 1);
        assert!(matches!(tree.stat("/a.txt").await, Err(StoreError::Closed)));
    }

    #[tokio::test]
    async fn test_empty_file_reads_nothing() {
        let store = MemoryStore::new();
        store.insert_tree(key(), [("/empty", "")]);
        let tree = store.open(&key()).await.unwrap();
        assert!(read_all(tree.as_ref(), "/empty").await.is_empty());
    }
}
