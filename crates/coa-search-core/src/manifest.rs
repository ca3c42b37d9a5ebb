//! Manifest file formats and shard integrity.
//!
//! A build emits three kinds of JSON file into one directory:
//!
//! ```text
//! manifest.json               ManifestIndex  { generatedAt, total, shards: [...] }
//! manifest-<year>-<tag>.json  ShardFile      { items: [DocumentRecord, ...] }
//! manifest-errors.json        FailureLedger  { errors: [{ file, reason }, ...] }
//! ```
//!
//! Shard names carry the first [`SHARD_TAG_PREFIX_LEN`] hex digits of the
//! shard's integrity tag, so a build never overwrites a shard the live
//! index still references. Replacing `manifest.json` is the commit point.
//!
//! Shards partition the records by the UTC calendar year of
//! `modifiedTime`. Each shard descriptor carries an `integrityTag`:
//! SHA-256 over the comma-joined member digests, in shard order. A
//! member digest is the record's content fingerprint, or a surrogate
//! derived from its locator, timestamp and size when the source could
//! not supply bytes.

use chrono::{DateTime, Datelike, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

use crate::models::{ClassificationFailure, DocumentRecord};

pub const INDEX_FILE_NAME: &str = "manifest.json";
pub const FAILURE_LEDGER_FILE_NAME: &str = "manifest-errors.json";

pub const SHARD_TAG_PREFIX_LEN: usize = 12;

pub fn shard_file_name(year: i32, integrity_tag: &str) -> String {
    let prefix = integrity_tag.get(..SHARD_TAG_PREFIX_LEN).unwrap_or(integrity_tag);
    format!("manifest-{}-{}.json", year, prefix)
}

/// Parse the year back out of a shard file name, if it is one. Accepts
/// `manifest-<year>-<tag>.json` and the older `manifest-<year>.json`.
/// Anything else, including names with path separators, is `None`.
pub fn parse_shard_file_name(name: &str) -> Option<i32> {
    let stem = name.strip_prefix("manifest-")?.strip_suffix(".json")?;
    let (year, tag) = match stem.split_once('-') {
        Some((year, tag)) => (year, Some(tag)),
        None => (stem, None),
    };
    if year.is_empty() || !year.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    if let Some(tag) = tag {
        if tag.len() != SHARD_TAG_PREFIX_LEN
            || !tag.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
        {
            return None;
        }
    }
    year.parse().ok()
}

/// Top-level index file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestIndex {
    pub generated_at: String,
    pub total: usize,
    /// Ascending by year.
    pub shards: Vec<ShardDescriptor>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShardDescriptor {
    pub year: i32,
    pub shard_file_name: String,
    pub item_count: usize,
    pub integrity_tag: String,
}

/// Contents of one shard file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShardFile {
    pub items: Vec<DocumentRecord>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureEntry {
    pub file: String,
    pub reason: String,
}

/// Contents of `manifest-errors.json`. Written on every build, even
/// when empty.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureLedger {
    pub errors: Vec<FailureEntry>,
}

impl FailureLedger {
    /// Record a failure under the document's source-relative path.
    pub fn push(&mut self, path: &str, failure: &ClassificationFailure) {
        self.errors.push(FailureEntry {
            file: path.to_string(),
            reason: failure.reason.clone(),
        });
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }
}

/// A year's worth of records, in global display order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestShard {
    pub year: i32,
    pub records: Vec<DocumentRecord>,
}

impl ManifestShard {
    pub fn file_name(&self) -> String {
        shard_file_name(self.year, &self.integrity_tag())
    }

    pub fn integrity_tag(&self) -> String {
        integrity_tag(&self.records)
    }

    pub fn descriptor(&self) -> ShardDescriptor {
        let integrity_tag = self.integrity_tag();
        ShardDescriptor {
            year: self.year,
            shard_file_name: shard_file_name(self.year, &integrity_tag),
            item_count: self.records.len(),
            integrity_tag,
        }
    }

    pub fn to_file(&self) -> ShardFile {
        ShardFile {
            items: self.records.clone(),
        }
    }
}

/// Lowercase hex SHA-256 of `data`.
pub fn sha256_hex(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// The value a record contributes to its shard's integrity tag.
pub fn record_digest(record: &DocumentRecord) -> String {
    match &record.content_fingerprint {
        Some(fp) => fp.clone(),
        None => {
            let mut hasher = Sha256::new();
            hasher.update(record.source_url.as_bytes());
            hasher.update(b"\n");
            hasher.update(record.modified_time.as_bytes());
            hasher.update(b"\n");
            hasher.update(record.size_bytes.to_le_bytes());
            hex::encode(hasher.finalize())
        }
    }
}

/// Integrity tag over an ordered slice of records.
pub fn integrity_tag(records: &[DocumentRecord]) -> String {
    let joined = records
        .iter()
        .map(record_digest)
        .collect::<Vec<_>>()
        .join(",");
    sha256_hex(joined.as_bytes())
}

/// Calendar year a record is filed under. Records without a parseable
/// timestamp go to the year of `now`.
pub fn shard_year(modified_time: &str, now: &DateTime<Utc>) -> i32 {
    DateTime::parse_from_rfc3339(modified_time)
        .map(|dt| dt.with_timezone(&Utc).year())
        .unwrap_or_else(|_| now.year())
}

/// Stable sort, newest first. Equal timestamps keep their input order.
pub fn sort_newest_first(records: &mut [DocumentRecord]) {
    records.sort_by(|a, b| b.modified_time.cmp(&a.modified_time));
}

/// Split records into shards by year, ascending. Order inside each shard
/// follows the input order.
pub fn partition_by_year(records: Vec<DocumentRecord>, now: &DateTime<Utc>) -> Vec<ManifestShard> {
    let mut by_year: BTreeMap<i32, Vec<DocumentRecord>> = BTreeMap::new();
    for record in records {
        let year = shard_year(&record.modified_time, now);
        by_year.entry(year).or_default().push(record);
    }
    by_year
        .into_iter()
        .map(|(year, records)| ManifestShard { year, records })
        .collect()
}

/// Build the index for a set of shards.
pub fn build_index(shards: &[ManifestShard], generated_at: String) -> ManifestIndex {
    ManifestIndex {
        generated_at,
        total: shards.iter().map(|s| s.records.len()).sum(),
        shards: shards.iter().map(ManifestShard::descriptor).collect(),
    }
}

/// Why a loaded shard does not agree with its descriptor.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ShardMismatch {
    #[error("shard {file} lists {expected} items but contains {actual}")]
    ItemCount {
        file: String,
        expected: usize,
        actual: usize,
    },
    #[error("shard {file} integrity tag mismatch")]
    IntegrityTag { file: String },
}

impl ShardDescriptor {
    /// Check a fetched shard against this descriptor.
    pub fn verify(&self, shard: &ShardFile) -> Result<(), ShardMismatch> {
        if shard.items.len() != self.item_count {
            return Err(ShardMismatch::ItemCount {
                file: self.shard_file_name.clone(),
                expected: self.item_count,
                actual: shard.items.len(),
            });
        }
        if integrity_tag(&shard.items) != self.integrity_tag {
            return Err(ShardMismatch::IntegrityTag {
                file: self.shard_file_name.clone(),
            });
        }
        Ok(())
    }
}
