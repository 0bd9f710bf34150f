//! Content tree storage and swarm membership for drawbridge.
//!
//! This crate is the boundary between the gateway and the peer-to-peer
//! content store:
//! - **key**: `TreeKey` and its wire (hex) and host (base-32) encodings
//! - **store**: `TreeStore` / `ContentTree` traits, plus `DirStore` for local trees
//! - **swarm**: `Swarm` membership trait, plus the in-process `LocalSwarm`
//! - **memory**: `MemoryStore`, trees held in memory with lifecycle counters
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use treestore::{DirStore, TreeKey, TreeStore};
//!
//! # async fn demo() -> anyhow::Result<()> {
//! let store = DirStore::at_path("/srv/drawbridge/store");
//! let key: TreeKey = "34f4c3f0bcf6bf5c39d7814d373946d8f04da5b4a525d940c98309cafb111d93".parse()?;
//! println!("serve at https://{}.example.com/", key.to_host());
//!
//! let tree = store.open(&key).await?;
//! tree.ready().await?;
//! let stat = tree.stat("/index.html").await?;
//! println!("{} bytes", stat.size);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod key;
pub mod memory;
pub mod store;
pub mod swarm;

pub use config::StoreConfig;
pub use error::{StoreError, SwarmError};
pub use key::{
    decode_host, encode_host, is_valid_host_key, is_valid_wire_key, DiscoveryKey, KeyError,
    TreeKey, HOST_KEY_LEN, KEY_BYTES, WIRE_KEY_LEN,
};
pub use memory::{MemoryStore, MemoryTree};
pub use store::{ByteStream, ContentTree, DirStore, DirTree, EntryStat, TreeStore};
pub use swarm::{LocalSwarm, Membership, Swarm};
