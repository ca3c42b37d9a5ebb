//! # COA Search Core
//!
//! Shared, I/O-free logic for COA Search: the document identity model,
//! the filename classifier, manifest data types with integrity tagging,
//! and the query matcher.
//!
//! This crate contains no tokio, HTTP, or filesystem access. The build
//! side (`coa build`) and the query side (`coa search`, `coa serve`) both
//! depend on it, so the two agree on one set of normalization rules.

pub mod identity;
pub mod manifest;
pub mod models;
pub mod search;
