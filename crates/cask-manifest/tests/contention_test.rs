//! Cross-handle contention tests for the manifest protocol.
//!
//! flock binds a lock to an open file handle, not to a process, so a
//! second independently opened handle on the lock file contends exactly
//! like a second process would. The clobber helpers below play the part
//! of that other process: they take (or probe) the lock through their own
//! handle and their own fs2 calls, then rewrite the manifest directly.

use std::fs;

use fs2::FileExt;
use tempfile::TempDir;

use cask_hash::Hash;
use cask_manifest::{
    codec, FileManifest, ManifestContents, ManifestError, TableSpec, LOCK_FILE_NAME,
    MANIFEST_FILE_NAME,
};

const DATA_VERSION: &str = "7";

fn manifest_in(dir: &TempDir) -> FileManifest {
    FileManifest::new(dir.path(), DATA_VERSION).unwrap()
}

fn record(data_version: &str, root: Hash, table_specs: &[TableSpec]) -> String {
    codec::encode(&ManifestContents {
        data_version: data_version.to_string(),
        root,
        table_specs: table_specs.to_vec(),
    })
}

/// Rewrite the manifest the way another process would: take the directory
/// lock through an independent handle, replace the file, release.
fn clobber_manifest(dir: &TempDir, line: &str) {
    let lock_file = fs::File::create(dir.path().join(LOCK_FILE_NAME)).unwrap();
    lock_file.lock_exclusive().unwrap();
    fs::write(dir.path().join(MANIFEST_FILE_NAME), line).unwrap();
    lock_file.unlock().unwrap();
}

/// Like [`clobber_manifest`] but non-blocking: if the lock is contended,
/// decline to write and report that back.
fn try_clobber_manifest(dir: &TempDir, line: &str) -> bool {
    let lock_file = fs::File::create(dir.path().join(LOCK_FILE_NAME)).unwrap();
    match lock_file.try_lock_exclusive() {
        Ok(()) => {
            fs::write(dir.path().join(MANIFEST_FILE_NAME), line).unwrap();
            lock_file.unlock().unwrap();
            true
        }
        Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => false,
        Err(e) => panic!("unexpected lock failure: {e}"),
    }
}

#[test]
fn test_parse_reflects_foreign_writer() {
    let dir = TempDir::new().unwrap();
    let fm = manifest_in(&dir);
    assert!(fm.parse_if_exists().unwrap().is_none());

    // Another process committed, and at an older data version. The read
    // path reports what it found; judging the version is the caller's or
    // the update path's business.
    let root = Hash::of(b"new root");
    let table = TableSpec::new(Hash::of(b"table1"), 0);
    clobber_manifest(
        &dir,
        &record("0", root, std::slice::from_ref(&table)),
    );

    let contents = fm.parse_if_exists().unwrap().unwrap();
    assert_eq!(contents.data_version, "0");
    assert_eq!(contents.root, root);
    assert_eq!(contents.table_specs, vec![table]);
}

#[test]
fn test_read_is_not_torn_by_concurrent_writer() {
    let dir = TempDir::new().unwrap();
    let fm = manifest_in(&dir);

    let table = Hash::of(b"table1");
    let first_root = Hash::of(b"new root");
    clobber_manifest(
        &dir,
        &record(DATA_VERSION, first_root, &[TableSpec::new(table, 0)]),
    );

    // A full locked rewrite lands inside the narrowest window of the
    // read, after the existence check and before the bytes are read. The
    // reader holds no lock, so the writer goes through, and the reader
    // must come back with the complete new record, never a blend.
    let second_root = Hash::of(b"second root");
    let contents = fm
        .parse_if_exists_with_hook(|| {
            clobber_manifest(
                &dir,
                &record(DATA_VERSION, second_root, &[TableSpec::new(table, 9)]),
            );
        })
        .unwrap()
        .unwrap();

    assert_eq!(contents.root, second_root);
    assert_eq!(contents.table_specs, vec![TableSpec::new(table, 9)]);
}

#[test]
fn test_update_excludes_concurrent_writer() {
    let dir = TempDir::new().unwrap();
    let fm = manifest_in(&dir);

    // While update holds the lock, a non-blocking writer must observe
    // contention, decline, and leave the manifest alone.
    let proposed = Hash::of(b"new root 2");
    let contents = fm
        .update_with_hook(&[], Hash::EMPTY, proposed, || {
            let intruder = Hash::of(b"new root");
            assert!(!try_clobber_manifest(
                &dir,
                &record(DATA_VERSION, intruder, &[])
            ));
        })
        .unwrap();

    assert_eq!(contents.root, proposed);
    assert!(contents.table_specs.is_empty());

    // Only the lock holder's write landed.
    let on_disk = fm.parse_if_exists().unwrap().unwrap();
    assert_eq!(on_disk.root, proposed);
}

#[test]
fn test_lost_race_against_foreign_writer() {
    let dir = TempDir::new().unwrap();
    let fm = manifest_in(&dir);

    // The store advanced underneath this caller.
    let table = TableSpec::new(Hash::of(b"table1"), 3);
    let upstream_root = Hash::of(b"new root");
    assert!(try_clobber_manifest(
        &dir,
        &record(DATA_VERSION, upstream_root, std::slice::from_ref(&table)),
    ));

    let proposed = Hash::of(b"new root 2");
    let actual = fm.update(&[], Hash::EMPTY, proposed).unwrap();
    assert_eq!(actual.root, upstream_root);
    assert_eq!(actual.table_specs, vec![table]);

    // Reconciling against the returned state lets the retry through.
    let won = fm.update(&[], actual.root, proposed).unwrap();
    assert_eq!(won.root, proposed);
}

#[test]
fn test_update_against_foreign_data_version_is_fatal() {
    let dir = TempDir::new().unwrap();
    let fm = manifest_in(&dir);

    // The directory holds data committed by an incompatible build.
    clobber_manifest(&dir, &record("0", Hash::EMPTY, &[]));

    let err = fm.update(&[], Hash::EMPTY, Hash::EMPTY).unwrap_err();
    assert!(matches!(err, ManifestError::DataVersionMismatch { .. }));
}

#[test]
fn test_lock_is_released_after_failed_update() {
    let dir = TempDir::new().unwrap();
    let fm = manifest_in(&dir);

    // Two fields, not a valid record.
    clobber_manifest(&dir, "1:junk");
    assert!(fm.update(&[], Hash::EMPTY, Hash::of(b"r")).is_err());

    // The failure path let go of the lock, so a probe can take it.
    assert!(try_clobber_manifest(
        &dir,
        &record(DATA_VERSION, Hash::EMPTY, &[])
    ));
}
