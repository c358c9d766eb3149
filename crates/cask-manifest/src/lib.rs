//! # cask-manifest
//!
//! The manifest subsystem of the cask chunk store: the single durable
//! record of which database root is current and which immutable table
//! files back it.
//!
//! Table files are content-addressed and never modified once written, so
//! they need no coordination. The manifest is the one mutable point in a
//! storage directory, and everything here exists to move it safely:
//!
//! - [`FileManifest::parse_if_exists`] reads the current record without
//!   taking any lock; replacement is atomic, so readers see a complete
//!   record or none.
//! - [`FileManifest::update`] advances the record with a compare-and-swap
//!   keyed on the root hash, serialized across processes by an advisory
//!   file lock on the directory.
//!
//! Losing the swap to another writer is ordinary contention. The caller
//! gets the winning contents back, reconciles, and decides whether to
//! retry.

pub mod codec;

mod file_manifest;
mod mem;

pub use codec::STORAGE_VERSION;
pub use file_manifest::FileManifest;
pub use mem::MemManifest;

use std::io;

use thiserror::Error;

use cask_hash::Hash;

/// Name of the manifest file inside a storage directory.
pub const MANIFEST_FILE_NAME: &str = "manifest";

/// Name of the lock file guarding manifest replacement.
pub const LOCK_FILE_NAME: &str = "LOCK";

/// Errors that can occur reading or advancing a manifest
#[derive(Error, Debug)]
pub enum ManifestError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("lock error: {0}")]
    Lock(#[from] cask_lock::LockError),

    #[error("corrupt manifest: {0}")]
    Corrupt(String),

    #[error("manifest was written by storage version {actual}, this build reads {expected}")]
    StorageVersionMismatch { expected: String, actual: String },

    #[error("manifest holds data version {actual}, this store writes {expected}")]
    DataVersionMismatch { expected: String, actual: String },

    #[error("invalid data version {0:?}: must be non-empty and contain no ':'")]
    InvalidDataVersion(String),
}

pub type Result<T> = std::result::Result<T, ManifestError>;

/// One immutable table file backing the current root: the content hash
/// that names the file and the number of chunks it holds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSpec {
    pub name: Hash,
    pub chunk_count: u32,
}

impl TableSpec {
    pub fn new(name: Hash, chunk_count: u32) -> Self {
        TableSpec { name, chunk_count }
    }
}

/// The decoded state of a storage directory's manifest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestContents {
    /// Version of the domain data encoding in effect when `root` was
    /// committed. Opaque here; callers compare it against their own.
    pub data_version: String,

    /// Content hash of the current database root, or [`Hash::EMPTY`] if
    /// nothing has been committed.
    pub root: Hash,

    /// The table files backing `root`. Order is meaningful and survives
    /// the round trip through disk: it is the order tables are consulted
    /// when resolving a chunk.
    pub table_specs: Vec<TableSpec>,
}

impl ManifestContents {
    /// The state of a store nothing has ever been committed to.
    pub fn empty(data_version: impl Into<String>) -> Self {
        ManifestContents {
            data_version: data_version.into(),
            root: Hash::EMPTY,
            table_specs: Vec::new(),
        }
    }
}

/// The manifest protocol: read the current root and table set, and
/// advance them optimistically.
///
/// [`FileManifest`] is the durable implementation. [`MemManifest`] backs
/// ephemeral stores and tests.
pub trait Manifest {
    /// The current contents, or `None` if nothing has ever been
    /// committed. Absence is the normal state of a fresh store, not an
    /// error.
    fn parse_if_exists(&self) -> Result<Option<ManifestContents>>;

    /// Install `new_root` backed by `table_specs` if the current root
    /// still equals `last_root`, otherwise change nothing.
    ///
    /// Returns the contents in effect after the call either way. A caller
    /// that finds `returned.root != new_root` lost the race to another
    /// writer; it reconciles against the returned state and decides for
    /// itself whether to retry. No retry happens internally.
    fn update(
        &self,
        table_specs: &[TableSpec],
        last_root: Hash,
        new_root: Hash,
    ) -> Result<ManifestContents>;
}
