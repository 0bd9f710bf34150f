//! TreeKey: the 32-byte address of a content tree, and its two text forms.
//!
//! - **wire** form: 64 lowercase hex chars, used in `hyper://` links and in
//!   legacy `/hyper/<key>/...` paths.
//! - **host** form: 52 Crockford base-32 chars, used as a DNS label
//!   (`<host-key>.example.com`). Emitted lowercase, accepted in any case.
//!
//! Both forms are exact-length; anything shorter, longer, or outside the
//! alphabet is rejected. The host form is additionally required to be
//! canonical (the 4 unused trailing bits must be zero) so that the two
//! encodings are a bijection.

use std::fmt;
use std::str::FromStr;

use base32::Alphabet;
use thiserror::Error;

/// Length of a tree key in bytes.
pub const KEY_BYTES: usize = 32;

/// Length of the wire (hex) encoding.
pub const WIRE_KEY_LEN: usize = KEY_BYTES * 2;

/// Length of the host (base-32) encoding: ceil(256 / 5).
pub const HOST_KEY_LEN: usize = 52;

/// Crockford base-32 digits, in value order.
const CROCKFORD_DIGITS: &[u8; 32] = b"0123456789ABCDEFGHJKMNPQRSTVWXYZ";

/// Message hashed under the tree key to derive its discovery key.
const DISCOVERY_NAMESPACE: &[u8] = b"hypercore";

/// Errors produced when parsing either key encoding.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum KeyError {
    #[error("invalid key length: expected {expected} chars, got {actual}")]
    InvalidLength { expected: usize, actual: usize },

    #[error("invalid character in key")]
    InvalidCharacter,

    #[error("host key is not in canonical form")]
    NonCanonical,
}

/// Address of a content tree.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TreeKey([u8; KEY_BYTES]);

impl TreeKey {
    pub fn from_bytes(bytes: [u8; KEY_BYTES]) -> Self {
        Self(bytes)
    }

    /// Parse the 64-char hex form. Either case is accepted.
    pub fn from_wire(s: &str) -> Result<Self, KeyError> {
        if s.len() != WIRE_KEY_LEN {
            return Err(KeyError::InvalidLength {
                expected: WIRE_KEY_LEN,
                actual: s.len(),
            });
        }
        let mut bytes = [0u8; KEY_BYTES];
        hex::decode_to_slice(s, &mut bytes).map_err(|_| KeyError::InvalidCharacter)?;
        Ok(Self(bytes))
    }

    /// Parse the 52-char host form. Case-insensitive.
    pub fn from_host(s: &str) -> Result<Self, KeyError> {
        decode_host(s).map(Self)
    }

    pub fn as_bytes(&self) -> &[u8; KEY_BYTES] {
        &self.0
    }

    /// Lowercase hex form.
    pub fn to_wire(&self) -> String {
        hex::encode(self.0)
    }

    /// Lowercase Crockford base-32 form, safe to use as a DNS label.
    pub fn to_host(&self) -> String {
        base32::encode(Alphabet::Crockford, &self.0).to_ascii_lowercase()
    }

    /// Identifier used for swarm membership. Never reveals the key itself.
    pub fn discovery_key(&self) -> DiscoveryKey {
        DiscoveryKey(*blake3::keyed_hash(&self.0, DISCOVERY_NAMESPACE).as_bytes())
    }
}

impl fmt::Display for TreeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_wire())
    }
}

impl fmt::Debug for TreeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TreeKey({})", self.to_wire())
    }
}

impl FromStr for TreeKey {
    type Err = KeyError;

    /// Accepts either encoding, dispatching on length.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.len() {
            WIRE_KEY_LEN => Self::from_wire(s),
            HOST_KEY_LEN => Self::from_host(s),
            actual => Err(KeyError::InvalidLength {
                expected: WIRE_KEY_LEN,
                actual,
            }),
        }
    }
}

/// Derived swarm topic for a tree.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct DiscoveryKey([u8; KEY_BYTES]);

impl DiscoveryKey {
    pub fn as_bytes(&self) -> &[u8; KEY_BYTES] {
        &self.0
    }
}

impl fmt::Display for DiscoveryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl fmt::Debug for DiscoveryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DiscoveryKey({})", self)
    }
}

/// Convert a wire key to its host form.
pub fn encode_host(wire: &str) -> Result<String, KeyError> {
    TreeKey::from_wire(wire).map(|key| key.to_host())
}

/// Convert a host key back to the raw key bytes.
pub fn decode_host(host: &str) -> Result<[u8; KEY_BYTES], KeyError> {
    if host.len() != HOST_KEY_LEN {
        return Err(KeyError::InvalidLength {
            expected: HOST_KEY_LEN,
            actual: host.len(),
        });
    }

    let mut last = 0u8;
    for b in host.bytes() {
        last = crockford_value(b).ok_or(KeyError::InvalidCharacter)?;
    }
    // 52 * 5 = 260 bits; the final digit only carries one data bit.
    if last & 0x0f != 0 {
        return Err(KeyError::NonCanonical);
    }

    let bytes = base32::decode(Alphabet::Crockford, &host.to_ascii_uppercase())
        .ok_or(KeyError::InvalidCharacter)?;
    bytes.try_into().map_err(|v: Vec<u8>| KeyError::InvalidLength {
        expected: KEY_BYTES,
        actual: v.len(),
    })
}

/// Cheap syntactic check used on the routing hot path. Never allocates.
pub fn is_valid_host_key(s: &str) -> bool {
    if s.len() != HOST_KEY_LEN {
        return false;
    }
    let mut last = 0u8;
    for b in s.bytes() {
        match crockford_value(b) {
            Some(v) => last = v,
            None => return false,
        }
    }
    last & 0x0f == 0
}

/// True for exactly 64 hex chars.
pub fn is_valid_wire_key(s: &str) -> bool {
    s.len() == WIRE_KEY_LEN && s.bytes().all(|b| b.is_ascii_hexdigit())
}

/// Strict Crockford digit lookup: the decoding aliases (I, L, O) and U are rejected.
fn crockford_value(b: u8) -> Option<u8> {
    let upper = b.to_ascii_uppercase();
    CROCKFORD_DIGITS
        .iter()
        .position(|&d| d == upper)
        .map(|v| v as u8)
}
