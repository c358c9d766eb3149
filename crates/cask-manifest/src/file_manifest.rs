//! Durable manifest access for one storage directory.

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::debug;

use cask_hash::Hash;
use cask_lock::FileLock;

use crate::codec;
use crate::{
    Manifest, ManifestContents, ManifestError, Result, TableSpec, LOCK_FILE_NAME,
    MANIFEST_FILE_NAME,
};

/// Manifest accessor bound to one storage directory.
///
/// Holds no open files and no state beyond its configuration, so clones
/// are cheap and an accessor can be shared freely across threads. All
/// coordination happens on disk, under the directory's lock file.
#[derive(Debug, Clone)]
pub struct FileManifest {
    dir: PathBuf,
    data_version: String,
}

impl FileManifest {
    /// Bind an accessor to `dir`, creating the directory if needed.
    ///
    /// `data_version` tags every record this accessor writes with the
    /// version of the domain data encoding the caller produces. It is
    /// opaque to the manifest but lands in the record verbatim, so it
    /// must be non-empty and must not contain the field delimiter `:`.
    pub fn new(dir: impl Into<PathBuf>, data_version: impl Into<String>) -> Result<Self> {
        let data_version = data_version.into();
        if data_version.is_empty() || data_version.contains(':') {
            return Err(ManifestError::InvalidDataVersion(data_version));
        }
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(FileManifest { dir, data_version })
    }

    /// The storage directory this accessor is bound to.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the manifest file.
    pub fn manifest_path(&self) -> PathBuf {
        self.dir.join(MANIFEST_FILE_NAME)
    }

    /// Path of the lock file guarding manifest replacement.
    pub fn lock_path(&self) -> PathBuf {
        self.dir.join(LOCK_FILE_NAME)
    }

    /// Read the current manifest.
    ///
    /// Takes no lock: replacement is atomic, so a read observes the
    /// record before or after any concurrent update, never in between.
    /// `Ok(None)` means nothing has ever been committed here, the normal
    /// state of a fresh store. A record that exists but does not decode
    /// is corruption and surfaces as an error.
    pub fn parse_if_exists(&self) -> Result<Option<ManifestContents>> {
        self.parse_if_exists_with_hook(|| {})
    }

    /// [`FileManifest::parse_if_exists`] with a hook run after the
    /// manifest is known to exist and before its bytes are read.
    ///
    /// The hook lets tests interleave a concurrent writer at the
    /// narrowest window of the read path; production callers use
    /// [`FileManifest::parse_if_exists`].
    pub fn parse_if_exists_with_hook(
        &self,
        read_hook: impl FnOnce(),
    ) -> Result<Option<ManifestContents>> {
        let path = self.manifest_path();
        if !path.exists() {
            debug!(dir = %self.dir.display(), "no manifest");
            return Ok(None);
        }
        read_hook();
        let contents = codec::decode(&self.read_record(&path)?)?;
        Ok(Some(contents))
    }

    /// Optimistically advance the manifest.
    ///
    /// Installs `new_root` backed by `table_specs` if and only if the
    /// on-disk root still equals `last_root`. Both roots being
    /// [`Hash::EMPTY`] commits the first record into an empty store.
    ///
    /// Returns the contents in effect after the call. If another writer
    /// got there first nothing is written, the winning contents come
    /// back, and `returned.root != new_root` tells the caller it lost.
    /// Losing is expected contention, not an error, and the decision to
    /// retry stays with the caller.
    ///
    /// A store whose record carries a different data version cannot be
    /// advanced by this accessor and yields
    /// [`ManifestError::DataVersionMismatch`].
    pub fn update(
        &self,
        table_specs: &[TableSpec],
        last_root: Hash,
        new_root: Hash,
    ) -> Result<ManifestContents> {
        self.update_with_hook(table_specs, last_root, new_root, || {})
    }

    /// [`FileManifest::update`] with a hook run while the exclusive lock
    /// is held, before the on-disk state is re-read and compared.
    ///
    /// The hook exists so tests can prove the lock excludes concurrent
    /// writers: a non-blocking write attempt made inside it must observe
    /// contention and decline. Production callers use
    /// [`FileManifest::update`].
    pub fn update_with_hook(
        &self,
        table_specs: &[TableSpec],
        last_root: Hash,
        new_root: Hash,
        write_hook: impl FnOnce(),
    ) -> Result<ManifestContents> {
        // Held to the end of the function on every path: success, lost
        // race, and decode failure alike. Drop releases it even if the
        // hook panics.
        let _lock = FileLock::acquire(self.lock_path())?;

        write_hook();

        let upstream = self.read_upstream()?;
        if upstream.root != last_root {
            debug!(
                dir = %self.dir.display(),
                upstream = %upstream.root,
                proposed = %new_root,
                "manifest update lost to concurrent writer"
            );
            return Ok(upstream);
        }

        let contents = ManifestContents {
            data_version: self.data_version.clone(),
            root: new_root,
            table_specs: table_specs.to_vec(),
        };
        self.write_record(&contents)?;
        debug!(dir = %self.dir.display(), root = %new_root, "manifest updated");
        Ok(contents)
    }

    /// Read the record under the lock. An absent manifest reads as the
    /// empty state at this accessor's own data version; a record written
    /// at a different data version cannot be advanced and is fatal.
    fn read_upstream(&self) -> Result<ManifestContents> {
        let path = self.manifest_path();
        if !path.exists() {
            return Ok(ManifestContents::empty(self.data_version.clone()));
        }
        let upstream = codec::decode(&self.read_record(&path)?)?;
        if upstream.data_version != self.data_version {
            return Err(ManifestError::DataVersionMismatch {
                expected: self.data_version.clone(),
                actual: upstream.data_version,
            });
        }
        Ok(upstream)
    }

    fn read_record(&self, path: &Path) -> Result<String> {
        let bytes = fs::read(path)?;
        String::from_utf8(bytes)
            .map_err(|_| ManifestError::Corrupt("record is not UTF-8".to_string()))
    }

    /// Replace the manifest atomically: full record to a temp file in
    /// the same directory, fsync, rename over the live name. Readers see
    /// the old record or the new one, nothing in between. A temp file
    /// left by a writer that crashed before its rename is never read; it
    /// sits harmlessly until the next update recreates and renames it.
    fn write_record(&self, contents: &ManifestContents) -> Result<()> {
        let manifest_path = self.manifest_path();
        let temp_path = manifest_path.with_extension("tmp");

        let mut temp = File::create(&temp_path)?;
        temp.write_all(codec::encode(contents).as_bytes())?;
        temp.sync_all()?;
        fs::rename(&temp_path, &manifest_path)?;
        Ok(())
    }
}

impl Manifest for FileManifest {
    fn parse_if_exists(&self) -> Result<Option<ManifestContents>> {
        FileManifest::parse_if_exists(self)
    }

    fn update(
        &self,
        table_specs: &[TableSpec],
        last_root: Hash,
        new_root: Hash,
    ) -> Result<ManifestContents> {
        FileManifest::update(self, table_specs, last_root, new_root)
    }
}
