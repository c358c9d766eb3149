//! In-memory manifest for ephemeral stores and tests.

use std::sync::Mutex;

use cask_hash::Hash;

use crate::{Manifest, ManifestContents, Result, TableSpec};

/// A [`Manifest`] with no durability: the record lives behind a mutex
/// and dies with the process.
///
/// Same winner and loser contract as [`FileManifest`], with the mutex
/// standing in for the directory lock. There is no storage version and
/// no foreign writer to disagree with, so the version checks the durable
/// path performs have nothing to check here.
///
/// [`FileManifest`]: crate::FileManifest
#[derive(Debug)]
pub struct MemManifest {
    data_version: String,
    contents: Mutex<Option<ManifestContents>>,
}

impl MemManifest {
    pub fn new(data_version: impl Into<String>) -> Self {
        MemManifest {
            data_version: data_version.into(),
            contents: Mutex::new(None),
        }
    }
}

impl Manifest for MemManifest {
    fn parse_if_exists(&self) -> Result<Option<ManifestContents>> {
        Ok(self.contents.lock().unwrap().clone())
    }

    fn update(
        &self,
        table_specs: &[TableSpec],
        last_root: Hash,
        new_root: Hash,
    ) -> Result<ManifestContents> {
        let mut guard = self.contents.lock().unwrap();
        let upstream = guard
            .clone()
            .unwrap_or_else(|| ManifestContents::empty(self.data_version.clone()));
        if upstream.root != last_root {
            return Ok(upstream);
        }

        let contents = ManifestContents {
            data_version: self.data_version.clone(),
            root: new_root,
            table_specs: table_specs.to_vec(),
        };
        *guard = Some(contents.clone());
        Ok(contents)
    }
}
