//! Core data models shared by the manifest builder and the query matcher.

use serde::{Deserialize, Serialize};

/// Reason recorded for a filename that no grammar accepts.
pub const UNRECOGNIZED_PATTERN: &str = "unrecognized filename pattern";

/// Physical packaging component a certificate describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PackagingVariant {
    Cap,
    Tube,
    /// Only produced for legacy-only identities.
    Unknown,
}

impl PackagingVariant {
    pub fn as_str(self) -> &'static str {
        match self {
            PackagingVariant::Cap => "cap",
            PackagingVariant::Tube => "tube",
            PackagingVariant::Unknown => "unknown",
        }
    }

    /// Position inside a lot group when results are displayed: tube
    /// documents first, cap documents last.
    pub fn display_rank(self) -> u8 {
        match self {
            PackagingVariant::Tube => 0,
            PackagingVariant::Unknown => 1,
            PackagingVariant::Cap => 2,
        }
    }
}

impl std::fmt::Display for PackagingVariant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structured identity extracted from a filename.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentIdentity {
    /// Canonical product code (e.g. `"MB-X7"`), empty when unresolved.
    #[serde(default)]
    pub product: String,
    pub packaging_variant: PackagingVariant,
    /// Lot code, empty when unresolved.
    #[serde(default)]
    pub lot: String,
    /// Canonical `NNNNNN-NNNNNN` legacy key, empty when absent.
    #[serde(default)]
    pub legacy_key: String,
}

impl DocumentIdentity {
    /// Identity for a bare legacy filename.
    pub fn legacy_only(legacy_key: String) -> Self {
        Self {
            product: String::new(),
            packaging_variant: PackagingVariant::Unknown,
            lot: String::new(),
            legacy_key,
        }
    }

    pub fn has_product_lot(&self) -> bool {
        !self.product.is_empty() && !self.lot.is_empty()
    }

    pub fn has_legacy_key(&self) -> bool {
        !self.legacy_key.is_empty()
    }

    /// An identity is only a record if it can be looked up by either
    /// naming convention.
    pub fn is_resolved(&self) -> bool {
        self.has_product_lot() || self.has_legacy_key()
    }
}

/// A filename that no grammar accepted. Collected into the failure
/// ledger; never aborts a build.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{file_name}: {reason}")]
pub struct ClassificationFailure {
    pub file_name: String,
    pub reason: String,
}

impl ClassificationFailure {
    pub fn unrecognized(file_name: &str) -> Self {
        Self {
            file_name: file_name.to_string(),
            reason: UNRECOGNIZED_PATTERN.to_string(),
        }
    }
}

/// One entry of a manifest shard.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentRecord {
    pub file_name: String,
    /// Resolvable locator; relative to the site root for local sources.
    #[serde(rename = "url")]
    pub source_url: String,
    #[serde(flatten)]
    pub identity: DocumentIdentity,
    /// Fixed-width UTC ISO-8601 timestamp, empty when the source had none.
    #[serde(default)]
    pub modified_time: String,
    #[serde(default)]
    pub size_bytes: u64,
    /// Hex SHA-256 of the file bytes, absent when bytes were unavailable.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_fingerprint: Option<String>,
}

/// Format a timestamp the way records store it: millisecond precision,
/// `Z` suffix, so string order matches time order.
pub fn format_timestamp(ts: &chrono::DateTime<chrono::Utc>) -> String {
    ts.to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}
