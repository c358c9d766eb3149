//! # cask-lock
//!
//! Advisory file locking for cask storage directories.
//!
//! Writers that replace a storage directory's manifest must not race each
//! other, and those writers may live in different processes, so mutual
//! exclusion is delegated to the OS: an exclusive `flock` on a well-known
//! file inside the directory. The lock is advisory. It coordinates
//! cooperating cask processes and is no defense against one that ignores
//! it.
//!
//! The OS ties the lock to the open file handle, not to the process, so
//! two independently opened handles within one process contend the same
//! way two processes do.

use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};

use fs2::FileExt;
use thiserror::Error;
use tracing::{debug, warn};

/// Errors that can occur acquiring or releasing a lock
#[derive(Error, Debug)]
pub enum LockError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

pub type Result<T> = std::result::Result<T, LockError>;

/// An exclusive advisory lock on one file path.
///
/// The lock is held from acquisition until [`FileLock::release`] or drop.
/// Holding the guard is the only way to hold the lock, so releasing a
/// lock that was never acquired cannot be expressed.
#[derive(Debug)]
pub struct FileLock {
    file: Option<File>,
    path: PathBuf,
}

impl FileLock {
    /// Acquire the lock, blocking until any current holder releases it.
    ///
    /// The lock file is created if absent. Its contents are never
    /// meaningful and it is never deleted; deleting it would let a later
    /// acquirer lock a fresh file while an existing holder still holds
    /// the old one.
    pub fn acquire(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::create(&path)?;
        file.lock_exclusive()?;
        debug!(path = %path.display(), "lock acquired");
        Ok(FileLock {
            file: Some(file),
            path,
        })
    }

    /// Try to acquire the lock without blocking.
    ///
    /// Returns `Ok(None)` if another holder currently has it. Contention
    /// is an expected outcome here, not an error.
    pub fn try_acquire(path: impl AsRef<Path>) -> Result<Option<Self>> {
        let path = path.as_ref().to_path_buf();
        let file = File::create(&path)?;
        match file.try_lock_exclusive() {
            Ok(()) => {
                debug!(path = %path.display(), "lock acquired");
                Ok(Some(FileLock {
                    file: Some(file),
                    path,
                }))
            }
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                debug!(path = %path.display(), "lock contended");
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// The path this lock is bound to.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Release the lock, surfacing any failure to do so.
    ///
    /// Dropping the guard also releases but can only log a failure.
    /// Deliberate unlock paths should call this instead.
    pub fn release(mut self) -> Result<()> {
        if let Some(file) = self.file.take() {
            file.unlock()?;
            debug!(path = %self.path.display(), "lock released");
        }
        Ok(())
    }
}

impl Drop for FileLock {
    fn drop(&mut self) {
        if let Some(file) = self.file.take() {
            if let Err(e) = file.unlock() {
                warn!(path = %self.path.display(), error = %e, "failed to release lock");
            }
        }
    }
}
