//! Query matcher.
//!
//! A query is normalized, classified into a [`QueryIntent`], and used as a
//! boolean filter over the loaded records. There is no scoring: results
//! come back in a fixed display order (see [`order_results`]).
//!
//! # Intent precedence
//!
//! 1. Empty query: every record matches.
//! 2. Two six-digit groups: exact legacy-key match, separator-insensitive.
//! 3. Only `[a-z0-9-]`: lot substring, falling back to filename substring.
//! 4. Anything else: filename substring.

use std::collections::HashMap;

use crate::identity::canonical_legacy_key;
use crate::models::DocumentRecord;

/// Collapse whitespace runs (including U+3000) to one space, trim, and
/// lowercase. Idempotent.
pub fn normalize(s: &str) -> String {
    s.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Key used to compare legacy codes: canonical `NNNNNN-NNNNNN` when the
/// value has that shape, otherwise lowercase with separator runs folded
/// into one dash.
pub fn legacy_match_key(s: &str) -> String {
    let trimmed = s.trim();
    if let Some(key) = canonical_legacy_key(trimmed) {
        return key;
    }
    let mut out = String::with_capacity(trimmed.len());
    let mut in_separator = false;
    for c in trimmed.chars() {
        if c == '_' || c.is_whitespace() {
            if !in_separator {
                out.push('-');
            }
            in_separator = true;
        } else {
            out.extend(c.to_lowercase());
            in_separator = false;
        }
    }
    out
}

/// A free-text search with an optional exact product filter.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Query {
    pub text: String,
    pub product: Option<String>,
}

impl Query {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            product: None,
        }
    }

    pub fn with_product(mut self, product: impl Into<String>) -> Self {
        self.product = Some(product.into());
        self
    }
}

/// Matching mode chosen for a normalized query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryIntent {
    MatchAll,
    /// Canonical legacy key to compare for equality.
    LegacyKey(String),
    /// Lot substring, or filename substring when the lot does not match.
    LotOrFileName(String),
    FileName(String),
}

impl QueryIntent {
    /// Classify already-normalized query text.
    pub fn classify(normalized: &str) -> Self {
        if normalized.is_empty() {
            return QueryIntent::MatchAll;
        }
        if let Some(key) = canonical_legacy_key(normalized) {
            return QueryIntent::LegacyKey(key);
        }
        let lot_shaped = normalized
            .bytes()
            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'-');
        if lot_shaped {
            QueryIntent::LotOrFileName(normalized.to_string())
        } else {
            QueryIntent::FileName(normalized.to_string())
        }
    }

    pub fn matches(&self, record: &DocumentRecord) -> bool {
        match self {
            QueryIntent::MatchAll => true,
            QueryIntent::LegacyKey(key) => {
                !record.identity.legacy_key.is_empty()
                    && legacy_match_key(&record.identity.legacy_key) == *key
            }
            QueryIntent::LotOrFileName(needle) => {
                normalize(&record.identity.lot).contains(needle.as_str())
                    || normalize(&record.file_name).contains(needle.as_str())
            }
            QueryIntent::FileName(needle) => normalize(&record.file_name).contains(needle.as_str()),
        }
    }
}

/// Filter `records` by `query` and return the hits in display order.
pub fn search<'a>(records: &'a [DocumentRecord], query: &Query) -> Vec<&'a DocumentRecord> {
    let product = query
        .product
        .as_deref()
        .map(normalize)
        .filter(|p| !p.is_empty());
    let intent = QueryIntent::classify(&normalize(&query.text));

    let mut hits: Vec<&'a DocumentRecord> = records
        .iter()
        .filter(|r| match &product {
            Some(p) => normalize(&r.identity.product) == *p,
            None => true,
        })
        .filter(|r| intent.matches(r))
        .collect();
    order_results(&mut hits);
    hits
}

/// Put hits in display order: newest first overall, but inside a lot the
/// tube documents come before the cap documents regardless of age.
///
/// Records are first sorted by `modifiedTime` descending (stable). Then
/// the positions held by each lot are refilled with that lot's records
/// reordered by packaging variant, so the interleaving of different lots
/// is untouched.
pub fn order_results<'a>(hits: &mut [&'a DocumentRecord]) {
    hits.sort_by(|a, b| b.modified_time.cmp(&a.modified_time));

    let mut slots: HashMap<&'a str, Vec<usize>> = HashMap::new();
    for (i, record) in hits.iter().copied().enumerate() {
        slots
            .entry(record.identity.lot.as_str())
            .or_default()
            .push(i);
    }

    for positions in slots.into_values().filter(|p| p.len() > 1) {
        let mut members: Vec<&'a DocumentRecord> = positions.iter().map(|&i| hits[i]).collect();
        members.sort_by_key(|r| r.identity.packaging_variant.display_rank());
        for (&i, record) in positions.iter().zip(members) {
            hits[i] = record;
        }
    }
}
