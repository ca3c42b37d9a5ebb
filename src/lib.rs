//! # COA Search
//!
//! Builds and queries a searchable manifest of Certificate of Analysis PDFs.
//!
//! A build lists every PDF in a document source, derives a product, lot,
//! packaging variant and legacy key from each file name, and publishes the
//! results as JSON shards keyed by year. The query side loads the shards
//! and answers free-text lookups from the CLI or an HTTP API.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ┌─────────────┐   ┌────────────────────────────┐
//! │   Sources    │──▶│   Builder   │──▶│ manifest.json              │
//! │ FS / Drive   │   │ classify +  │   │ manifest-<year>-<tag>.json │
//! └──────────────┘   │ fingerprint │   │ manifest-errors.json       │
//!                    └─────────────┘   └──────────┬─────────────────┘
//!                                                 │
//!                                          ┌──────┴──────┐
//!                                          │ IndexCache  │
//!                                          └──────┬──────┘
//!                                    ┌────────────┴───────────┐
//!                                    ▼                        ▼
//!                              ┌──────────┐             ┌──────────┐
//!                              │   CLI    │             │   HTTP   │
//!                              │  (coa)   │             │  /search │
//!                              └──────────┘             └──────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! coa build                      # docs/files -> docs/manifest
//! coa search "A100"
//! coa search "240115-550021" --json
//! coa classify MB-X7CAP-Lot-A100.pdf
//! coa serve
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration and environment overrides |
//! | [`traits`] | The [`traits::DocumentSource`] seam |
//! | [`connector_fs`] | Local directory source |
//! | [`connector_drive`] | Remote folder source |
//! | [`builder`] | Enumerate, classify, shard |
//! | [`export`] | Atomic manifest writes |
//! | [`index_cache`] | Load and hold the published index |
//! | [`search`] | `coa search` |
//! | [`server`] | Search HTTP API |
//!
//! The pure pieces (classifier, manifest layout, matcher) live in
//! [`coa_search_core`].

pub mod builder;
pub mod classify;
pub mod config;
pub mod connector_drive;
pub mod connector_fs;
pub mod error;
pub mod export;
pub mod index_cache;
pub mod progress;
pub mod search;
pub mod server;
pub mod sources;
pub mod traits;
