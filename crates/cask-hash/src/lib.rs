//! # cask-hash
//!
//! Content-hash value type for the cask chunk store.
//!
//! Every durable object in the store is named by the BLAKE3 hash of its
//! contents: chunks, table files, and the database root itself. [`Hash`]
//! is that name. It is 32 raw bytes in memory and 64 lowercase hex
//! characters anywhere the store writes text.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

/// Number of raw bytes in a hash.
pub const HASH_LEN: usize = 32;

/// Number of characters in the fixed-width hex rendering of a hash.
pub const HASH_HEX_LEN: usize = 2 * HASH_LEN;

/// Errors that can occur parsing the textual form of a hash
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParseHashError {
    #[error("expected {HASH_HEX_LEN} hex characters, got {0}")]
    BadLength(usize),

    #[error("uppercase hex character {0:?}")]
    UppercaseHex(char),

    #[error("invalid hex: {0}")]
    BadHex(#[from] hex::FromHexError),
}

/// A BLAKE3 content hash.
///
/// The all-zero value is reserved: it never names real content and the
/// store uses it to mean "nothing committed yet".
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Hash([u8; HASH_LEN]);

impl Hash {
    /// The reserved all-zero hash.
    pub const EMPTY: Hash = Hash([0; HASH_LEN]);

    /// Hash the given bytes.
    pub fn of(data: &[u8]) -> Self {
        Hash(*blake3::hash(data).as_bytes())
    }

    /// Wrap an already-computed digest.
    pub const fn from_bytes(bytes: [u8; HASH_LEN]) -> Self {
        Hash(bytes)
    }

    /// The raw digest bytes.
    pub fn as_bytes(&self) -> &[u8; HASH_LEN] {
        &self.0
    }

    /// True for [`Hash::EMPTY`].
    pub fn is_empty(&self) -> bool {
        *self == Self::EMPTY
    }

    /// Fixed-width lowercase hex rendering.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parse the fixed-width hex rendering produced by [`Hash::to_hex`].
    pub fn from_hex(s: &str) -> Result<Self, ParseHashError> {
        if s.len() != HASH_HEX_LEN {
            return Err(ParseHashError::BadLength(s.len()));
        }
        // decode_to_slice accepts either case, but to_hex writes
        // lowercase only; a second spelling of the same hash must not
        // decode.
        if let Some(c) = s.chars().find(|c| c.is_ascii_uppercase()) {
            return Err(ParseHashError::UppercaseHex(c));
        }
        let mut bytes = [0u8; HASH_LEN];
        hex::decode_to_slice(s, &mut bytes)?;
        Ok(Hash(bytes))
    }
}

impl FromStr for Hash {
    type Err = ParseHashError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

impl fmt::Display for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Hash({})", self.to_hex())
    }
}
