//! `coa search`: query a published manifest from the command line.
//!
//! Loads the index through [`IndexCache`] (directory or URL), runs the
//! matcher and prints either a table or a JSON object shaped like the
//! HTTP API response.

use anyhow::Result;
use serde::Serialize;

use coa_search_core::models::DocumentRecord;
use coa_search_core::search::Query;

use crate::config::Config;
use crate::index_cache::{fetcher_for, IndexCache};

/// JSON output of `coa search --json` and `GET /search`.
#[derive(Debug, Serialize)]
pub struct SearchResponse {
    pub total: usize,
    pub items: Vec<DocumentRecord>,
}

impl SearchResponse {
    /// `total` counts every hit; `items` is cut to `limit`.
    pub fn new(mut hits: Vec<DocumentRecord>, limit: Option<usize>) -> Self {
        let total = hits.len();
        if let Some(limit) = limit {
            hits.truncate(limit);
        }
        Self { total, items: hits }
    }
}

pub struct SearchArgs<'a> {
    pub text: &'a str,
    pub product: Option<&'a str>,
    pub limit: Option<usize>,
    pub json: bool,
    pub index: Option<&'a str>,
}

pub async fn run_search(config: &Config, args: SearchArgs<'_>) -> Result<()> {
    let location = args
        .index
        .map(str::to_string)
        .unwrap_or_else(|| config.index_location());
    let cache = IndexCache::new(fetcher_for(&location));

    let mut query = Query::new(args.text);
    if let Some(product) = args.product {
        query = query.with_product(product);
    }

    let hits = cache.search(&query).await?;
    let response = SearchResponse::new(hits, args.limit.or(config.query.default_limit));

    if args.json {
        println!("{}", serde_json::to_string_pretty(&response)?);
        return Ok(());
    }

    if response.items.is_empty() {
        println!("No results.");
        return Ok(());
    }

    for (i, record) in response.items.iter().enumerate() {
        print_record(i + 1, record);
    }
    if response.total > response.items.len() {
        println!("({} of {} results shown)", response.items.len(), response.total);
    }
    Ok(())
}

fn print_record(rank: usize, record: &DocumentRecord) {
    let id = &record.identity;
    println!("{}. {}", rank, record.file_name);
    if id.has_product_lot() {
        println!(
            "    product: {}  lot: {}  variant: {}",
            id.product, id.lot, id.packaging_variant
        );
    }
    if id.has_legacy_key() {
        println!("    legacy: {}", id.legacy_key);
    }
    let date = record.modified_time.get(..10).unwrap_or(&record.modified_time);
    println!("    modified: {}  size: {}", date, fmt_bytes(record.size_bytes));
    println!("    url: {}", record.source_url);
    println!();
}

fn fmt_bytes(n: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];
    let mut value = n as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} B", n)
    } else {
        format!("{:.1} {}", value, UNITS[unit])
    }
}
