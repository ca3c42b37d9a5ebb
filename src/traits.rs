//! The document source capability.
//!
//! The manifest builder never touches a filesystem or a remote API
//! directly. It asks a [`DocumentSource`] to enumerate documents and,
//! per document, for a content fingerprint.
//!
//! ```text
//! ┌──────────────────┐   ┌──────────────────┐   ┌──────────────┐
//! │ FilesystemSource │   │   DriveSource    │   │ custom (Rust)│
//! │  walkdir + globs │   │ paginated listing│   │              │
//! └────────┬─────────┘   └────────┬─────────┘   └──────┬───────┘
//!          └──────────────────────┼────────────────────┘
//!                                 ▼
//!                      builder::assemble_manifest()
//! ```
//!
//! # Example
//!
//! ```rust
//! use async_trait::async_trait;
//! use anyhow::Result;
//! use coa_search::traits::{DocumentSource, SourceDocument};
//!
//! struct Fixed(Vec<SourceDocument>);
//!
//! #[async_trait]
//! impl DocumentSource for Fixed {
//!     fn name(&self) -> &str { "fixed" }
//!
//!     async fn enumerate(&self) -> Result<Vec<SourceDocument>> {
//!         Ok(self.0.clone())
//!     }
//!
//!     async fn content_fingerprint(&self, _doc: &SourceDocument) -> Result<Option<String>> {
//!         Ok(None)
//!     }
//! }
//! ```

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::path::PathBuf;

/// How the source can get at a document's bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContentHandle {
    /// A local file.
    Local(PathBuf),
    /// A remote file id understood by the source that produced it.
    Remote(String),
    /// Metadata only.
    Unavailable,
}

/// One PDF as reported by a source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceDocument {
    /// Base file name, the input to the classifier.
    pub name: String,
    /// Source-relative path, used in the failure ledger.
    pub path: String,
    /// Resolvable locator written to the record's `url`.
    pub locator: String,
    pub modified_time: Option<DateTime<Utc>>,
    /// 0 when unknown.
    pub size_bytes: u64,
    pub content: ContentHandle,
}

/// A place certificates are catalogued from.
#[async_trait]
pub trait DocumentSource: Send + Sync {
    /// Instance name used in logs and progress output.
    fn name(&self) -> &str;

    /// Source type (`"filesystem"`, `"drive"`, `"custom"`).
    fn kind(&self) -> &str {
        "custom"
    }

    /// List every PDF reachable from this source, in a deterministic
    /// order. An error here aborts the build before anything is written.
    async fn enumerate(&self) -> Result<Vec<SourceDocument>>;

    /// Hex SHA-256 of the document's bytes.
    ///
    /// `Ok(None)` means the source only has metadata for this document;
    /// `Err` means the bytes exist but could not be read. Neither is fatal.
    async fn content_fingerprint(&self, doc: &SourceDocument) -> Result<Option<String>>;
}
