//! Textual codec for the manifest record.
//!
//! A manifest is a single line of colon-separated fields:
//!
//! ```text
//! storageVersion:dataVersion:rootHash[:tableName:chunkCount]*
//! ```
//!
//! Three fixed fields, then zero or more two-field table specs, so a
//! valid record always has `3 + 2n` fields. Hashes are fixed-width
//! lowercase hex and chunk counts are decimal. Decoding is strict: the
//! manifest is the root of trust for the whole store, so a record that
//! does not parse exactly is corruption to surface, never something to
//! repair in place.

use cask_hash::Hash;

use crate::{ManifestContents, ManifestError, Result, TableSpec};

/// Version tag of the record format itself, distinct from the data
/// version the record carries. Bumped only when the format changes
/// shape; a mismatch means the directory belongs to an incompatible
/// build.
pub const STORAGE_VERSION: &str = "1";

/// Render `contents` as a single-line record.
///
/// Infallible by construction: hex hashes and decimal counts cannot
/// contain the delimiter, and [`FileManifest::new`] rejects data
/// versions that do.
///
/// [`FileManifest::new`]: crate::FileManifest::new
pub fn encode(contents: &ManifestContents) -> String {
    let mut fields = Vec::with_capacity(3 + 2 * contents.table_specs.len());
    fields.push(STORAGE_VERSION.to_string());
    fields.push(contents.data_version.clone());
    fields.push(contents.root.to_hex());
    for spec in &contents.table_specs {
        fields.push(spec.name.to_hex());
        fields.push(spec.chunk_count.to_string());
    }
    fields.join(":")
}

/// Parse a record produced by [`encode`].
pub fn decode(line: &str) -> Result<ManifestContents> {
    let fields: Vec<&str> = line.split(':').collect();
    if fields.len() < 3 || fields.len() % 2 == 0 {
        return Err(ManifestError::Corrupt(format!(
            "record has {} fields",
            fields.len()
        )));
    }
    if fields[0] != STORAGE_VERSION {
        return Err(ManifestError::StorageVersionMismatch {
            expected: STORAGE_VERSION.to_string(),
            actual: fields[0].to_string(),
        });
    }

    let data_version = fields[1].to_string();
    let root = parse_hash(fields[2], "root hash")?;

    let mut table_specs = Vec::with_capacity((fields.len() - 3) / 2);
    for pair in fields[3..].chunks(2) {
        table_specs.push(TableSpec {
            name: parse_hash(pair[0], "table name")?,
            chunk_count: parse_chunk_count(pair[1])?,
        });
    }

    Ok(ManifestContents {
        data_version,
        root,
        table_specs,
    })
}

fn parse_hash(field: &str, what: &str) -> Result<Hash> {
    Hash::from_hex(field)
        .map_err(|e| ManifestError::Corrupt(format!("bad {what} {field:?}: {e}")))
}

fn parse_chunk_count(field: &str) -> Result<u32> {
    // u32::from_str would also admit a leading '+'; the record grammar
    // is plain decimal digits only.
    if field.is_empty() || !field.bytes().all(|b| b.is_ascii_digit()) {
        return Err(ManifestError::Corrupt(format!("bad chunk count {field:?}")));
    }
    field
        .parse()
        .map_err(|_| ManifestError::Corrupt(format!("chunk count {field:?} out of range")))
}
