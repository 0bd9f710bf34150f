//! Swarm membership: joining and leaving the peer topic for a tree.

use async_trait::async_trait;
use dashmap::DashMap;
use tracing::{debug, info};

use crate::error::SwarmError;
use crate::key::DiscoveryKey;

/// How this node participates in a tree's topic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Membership {
    /// Advertise ourselves as a host for the tree.
    pub announce: bool,
    /// Look up peers that host the tree.
    pub lookup: bool,
}

impl Membership {
    /// Fetch-only: find peers without advertising.
    pub const LOOKUP: Self = Self {
        announce: false,
        lookup: true,
    };

    /// Leave the topic entirely.
    pub const FORGET: Self = Self {
        announce: false,
        lookup: false,
    };

    pub fn is_member(&self) -> bool {
        self.announce || self.lookup
    }
}

/// Network collaborator. `configure` must be idempotent.
#[async_trait]
pub trait Swarm: Send + Sync {
    async fn configure(
        &self,
        discovery_key: &DiscoveryKey,
        membership: Membership,
    ) -> Result<(), SwarmError>;
}

/// In-process membership registry.
///
/// Tracks which topics this node has joined; used when the gateway serves
/// trees from local storage and by tests.
#[derive(Debug, Default)]
pub struct LocalSwarm {
    topics: DashMap<DiscoveryKey, Membership>,
}

impl LocalSwarm {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_joined(&self, discovery_key: &DiscoveryKey) -> bool {
        self.topics.contains_key(discovery_key)
    }

    pub fn membership(&self, discovery_key: &DiscoveryKey) -> Option<Membership> {
        self.topics.get(discovery_key).map(|m| *m)
    }

    pub fn joined_count(&self) -> usize {
        self.topics.len()
    }
}

#[async_trait]
impl Swarm for LocalSwarm {
    async fn configure(
        &self,
        discovery_key: &DiscoveryKey,
        membership: Membership,
    ) -> Result<(), SwarmError> {
        if membership.is_member() {
            let previous = self.topics.insert(*discovery_key, membership);
            if previous.is_none() {
                info!(topic = %discovery_key, ?membership, "joined swarm topic");
            }
        } else if self.topics.remove(discovery_key).is_some() {
            info!(topic = %discovery_key, "left swarm topic");
        } else {
            debug!(topic = %discovery_key, "forget for unknown topic");
        }
        Ok(())
    }
}
