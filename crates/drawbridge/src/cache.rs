//! Bounded LRU cache of open, swarm-joined content trees.
//!
//! Each key maps to a slot holding a `OnceCell`, so concurrent requests
//! for a tree that is still opening wait on the same open. Evicted slots
//! are torn down on background tasks tracked by a `TaskTracker`; the
//! request that caused the eviction never waits.
//!
//! [`TreeCache::acquire`] hands out a [`TreeLease`]. Teardown leaves the
//! swarm topic right away but only closes the tree once every lease on it
//! has been dropped, so a request that got a handle keeps a usable one
//! until its response body is finished.

use std::fmt;
use std::num::NonZeroUsize;
use std::ops::Deref;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures::future::join_all;
use lru::LruCache;
use tokio::sync::{OnceCell, OwnedRwLockReadGuard, RwLock};
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};
use treestore::{ContentTree, Membership, StoreError, Swarm, TreeKey, TreeStore};

use crate::error::{GatewayError, TeardownError};

pub type OpenTree = Arc<dyn ContentTree>;

/// Default number of open trees.
pub const DEFAULT_CAPACITY: usize = 500;

#[derive(Default)]
struct Slot {
    tree: OnceCell<OpenTree>,
    /// Set once the slot has left the cache. A retired slot never opens.
    retired: AtomicBool,
    /// Leases hold read guards; teardown takes the write side before close.
    leases: Arc<RwLock<()>>,
    /// Set by teardown, under the write guard, once the tree is closed.
    closed: AtomicBool,
}

impl Slot {
    fn retire(&self) {
        self.retired.store(true, Ordering::Release);
    }

    fn is_retired(&self) -> bool {
        self.retired.load(Ordering::Acquire)
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

/// A borrowed tree handle. The tree stays open while any lease on it is
/// alive, even if the cache has already evicted it.
pub struct TreeLease {
    key: TreeKey,
    tree: OpenTree,
    _held: OwnedRwLockReadGuard<()>,
}

impl TreeLease {
    pub fn key(&self) -> &TreeKey {
        &self.key
    }

    pub fn tree(&self) -> &OpenTree {
        &self.tree
    }
}

impl Deref for TreeLease {
    type Target = dyn ContentTree;

    fn deref(&self) -> &Self::Target {
        self.tree.as_ref()
    }
}

impl fmt::Debug for TreeLease {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TreeLease").field("key", &self.key).finish()
    }
}

enum OpenFailure {
    /// The slot was evicted before this caller could open it; try again.
    Retired,
    Failed(GatewayError),
}

impl From<StoreError> for OpenFailure {
    fn from(err: StoreError) -> Self {
        Self::Failed(err.into())
    }
}

pub struct TreeCache {
    store: Arc<dyn TreeStore>,
    swarm: Arc<dyn Swarm>,
    entries: Mutex<LruCache<TreeKey, Arc<Slot>>>,
    teardowns: TaskTracker,
}

impl TreeCache {
    /// A capacity of zero is treated as one.
    pub fn new(store: Arc<dyn TreeStore>, swarm: Arc<dyn Swarm>, capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            store,
            swarm,
            entries: Mutex::new(LruCache::new(capacity)),
            teardowns: TaskTracker::new(),
        }
    }

    /// Lease a ready, swarm-joined handle for `key`, opening it if needed.
    ///
    /// Hits refresh recency. Failed opens are not cached.
    pub async fn acquire(&self, key: &TreeKey) -> Result<TreeLease, GatewayError> {
        loop {
            let slot = self.slot_for(key);
            let held = Arc::clone(&slot.leases).read_owned().await;
            // Evicted and torn down between lookup and lease.
            if slot.is_closed() {
                continue;
            }
            match slot.tree.get_or_try_init(|| self.open(key, &slot)).await {
                Ok(tree) => {
                    return Ok(TreeLease {
                        key: *key,
                        tree: Arc::clone(tree),
                        _held: held,
                    })
                }
                Err(OpenFailure::Retired) => {
                    debug!(%key, "slot retired before open, retrying");
                }
                Err(OpenFailure::Failed(err)) => {
                    self.discard(key, &slot);
                    return Err(err);
                }
            }
        }
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.lock().cap().get()
    }

    /// True if `key` has a slot. Does not touch recency.
    pub fn contains(&self, key: &TreeKey) -> bool {
        self.lock().contains(key)
    }

    /// Background teardowns not yet finished.
    pub fn pending_teardowns(&self) -> usize {
        self.teardowns.len()
    }

    /// Wait for every teardown spawned so far. Teardowns wait for leases,
    /// so this does not return while a lease on an evicted tree is alive.
    pub async fn wait_for_teardowns(&self) {
        self.teardowns.close();
        self.teardowns.wait().await;
        self.teardowns.reopen();
    }

    /// Tear down every cached tree and wait for all teardowns, including
    /// those already running in the background. Outstanding leases delay
    /// the close of their tree until they are dropped.
    pub async fn shutdown_all(&self) -> usize {
        let drained: Vec<(TreeKey, Arc<Slot>)> = {
            let mut entries = self.lock();
            std::iter::from_fn(|| entries.pop_lru()).collect()
        };
        for (_, slot) in &drained {
            slot.retire();
        }

        let results = join_all(drained.iter().map(|(key, slot)| async move {
            (key, teardown(self.swarm.as_ref(), slot).await)
        }))
        .await;

        let mut released = 0;
        for (key, result) in results {
            match result {
                Ok(true) => released += 1,
                Ok(false) => {}
                Err(err) => warn!(%key, error = %err, "teardown failed during shutdown"),
            }
        }

        self.teardowns.close();
        self.teardowns.wait().await;
        info!(released, "tree cache shut down");
        released
    }

    fn lock(&self) -> MutexGuard<'_, LruCache<TreeKey, Arc<Slot>>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn slot_for(&self, key: &TreeKey) -> Arc<Slot> {
        let (slot, evicted) = {
            let mut entries = self.lock();
            if let Some(slot) = entries.get(key) {
                return Arc::clone(slot);
            }
            let slot = Arc::new(Slot::default());
            let evicted = entries.push(*key, Arc::clone(&slot));
            (slot, evicted)
        };

        if let Some((old_key, old_slot)) = evicted {
            debug!(evicted = %old_key, admitted = %key, "evicting least recently used tree");
            self.retire_in_background(old_key, old_slot);
        }
        slot
    }

    /// Drop a slot whose open failed, if it is still the cached one.
    fn discard(&self, key: &TreeKey, slot: &Arc<Slot>) {
        slot.retire();
        let mut entries = self.lock();
        if entries.peek(key).is_some_and(|cached| Arc::ptr_eq(cached, slot)) {
            entries.pop(key);
        }
    }

    fn retire_in_background(&self, key: TreeKey, slot: Arc<Slot>) {
        slot.retire();
        let swarm = Arc::clone(&self.swarm);
        self.teardowns.spawn(async move {
            match teardown(swarm.as_ref(), &slot).await {
                Ok(true) => debug!(%key, "evicted tree released"),
                Ok(false) => debug!(%key, "evicted slot was never opened"),
                Err(err) => warn!(%key, error = %err, "teardown of evicted tree failed"),
            }
        });
    }

    async fn open(&self, key: &TreeKey, slot: &Slot) -> Result<OpenTree, OpenFailure> {
        if slot.is_retired() {
            return Err(OpenFailure::Retired);
        }

        let tree = self.store.open(key).await?;
        if let Err(err) = self.join(&tree).await {
            if let Err(close_err) = tree.close().await {
                debug!(%key, error = %close_err, "close after failed open");
            }
            return Err(OpenFailure::Failed(err));
        }

        info!(%key, discovery = %tree.discovery_key(), "opened tree");
        Ok(tree)
    }

    async fn join(&self, tree: &OpenTree) -> Result<(), GatewayError> {
        tree.ready().await?;
        self.swarm
            .configure(&tree.discovery_key(), Membership::LOOKUP)
            .await?;
        Ok(())
    }
}

/// Forget the slot's tree, then close it once the last lease is dropped.
/// Waits out an open still in flight; returns `false` when there was
/// nothing to release.
async fn teardown(swarm: &dyn Swarm, slot: &Slot) -> Result<bool, TeardownError> {
    let tree = match slot.tree.get_or_try_init(|| async { Err(()) }).await {
        Ok(tree) => Arc::clone(tree),
        Err(()) => return Ok(false),
    };

    let forgot = swarm
        .configure(&tree.discovery_key(), Membership::FORGET)
        .await;

    let drained = slot.leases.write().await;
    let closed = tree.close().await;
    slot.closed.store(true, Ordering::Release);
    drop(drained);

    forgot?;
    closed?;
    Ok(true)
}
