//! Error types for the build and query sides.
//!
//! Classification failures are not errors here: they are data collected
//! into the failure ledger (see [`coa_search_core::manifest::FailureLedger`]).

use std::path::PathBuf;

/// Fatal build errors. Any of these stops the build. Until
/// `manifest.json` is replaced the previous index and its shards still
/// load; new shard files written before the failure are unreferenced.
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("source '{source_name}' is unavailable: {reason}")]
    SourceUnavailable { source_name: String, reason: String },

    #[error("failed to serialize {what}: {source}")]
    Serialize {
        what: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to write {}: {source}", path.display())]
    Persist {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Query-side failures while loading the published index. A failed load
/// exposes no records at all.
#[derive(Debug, Clone, thiserror::Error)]
pub enum IndexError {
    #[error("index unreachable at {location}: {reason}")]
    Unreachable { location: String, reason: String },

    #[error("malformed index file {location}: {reason}")]
    Malformed { location: String, reason: String },
}

impl IndexError {
    pub fn code(&self) -> &'static str {
        match self {
            IndexError::Unreachable { .. } => "index_unavailable",
            IndexError::Malformed { .. } => "malformed_index",
        }
    }
}
