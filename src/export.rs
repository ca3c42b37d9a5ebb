//! Write a built manifest to disk.
//!
//! Every payload is serialized before the first file is touched. Each file
//! is then written to a temporary file in the output directory and renamed
//! into place: shards first, then `manifest.json`, then the failure ledger.
//!
//! Shard names are content-addressed, so a shard rename never replaces a
//! file the live index references with different bytes. Renaming
//! `manifest.json` is the commit point: a failure before it leaves the
//! previous index and all of its shards intact. Shard files the new index
//! no longer references are removed only after the commit.

use serde::Serialize;
use std::collections::HashSet;
use std::io::Write;
use std::path::Path;

use coa_search_core::manifest::{
    parse_shard_file_name, FAILURE_LEDGER_FILE_NAME, INDEX_FILE_NAME,
};

use crate::builder::Manifest;
use crate::error::BuildError;

fn to_json<T: Serialize>(value: &T, what: &str, pretty: bool) -> Result<Vec<u8>, BuildError> {
    let result = if pretty {
        serde_json::to_vec_pretty(value)
    } else {
        serde_json::to_vec(value)
    };
    result.map_err(|source| BuildError::Serialize {
        what: what.to_string(),
        source,
    })
}

/// Persist `manifest` into `out_dir`.
pub fn write_manifest(manifest: &Manifest, out_dir: &Path, pretty: bool) -> Result<(), BuildError> {
    let mut payloads: Vec<(String, Vec<u8>)> = Vec::with_capacity(manifest.shards.len() + 2);
    for shard in &manifest.shards {
        let name = shard.file_name();
        let bytes = to_json(&shard.to_file(), &name, pretty)?;
        payloads.push((name, bytes));
    }
    payloads.push((
        INDEX_FILE_NAME.to_string(),
        to_json(&manifest.index, INDEX_FILE_NAME, pretty)?,
    ));
    payloads.push((
        FAILURE_LEDGER_FILE_NAME.to_string(),
        to_json(&manifest.failures, FAILURE_LEDGER_FILE_NAME, pretty)?,
    ));

    std::fs::create_dir_all(out_dir).map_err(|source| BuildError::Persist {
        path: out_dir.to_path_buf(),
        source,
    })?;

    for (name, bytes) in &payloads {
        write_atomic(out_dir, name, bytes)?;
        tracing::debug!(file = %name, bytes = bytes.len(), "wrote manifest file");
    }

    let live: HashSet<&str> = manifest
        .index
        .shards
        .iter()
        .map(|s| s.shard_file_name.as_str())
        .collect();
    remove_stale_shards(out_dir, &live);

    Ok(())
}

fn write_atomic(dir: &Path, name: &str, bytes: &[u8]) -> Result<(), BuildError> {
    let target = dir.join(name);
    let persist_err = |source: std::io::Error| BuildError::Persist {
        path: target.clone(),
        source,
    };

    let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(persist_err)?;
    tmp.write_all(bytes).map_err(persist_err)?;
    tmp.as_file().sync_all().map_err(persist_err)?;
    tmp.persist(&target).map_err(|e| persist_err(e.error))?;
    Ok(())
}

fn remove_stale_shards(dir: &Path, live: &HashSet<&str>) {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            tracing::warn!(dir = %dir.display(), error = %e, "could not list output directory");
            return;
        }
    };

    for entry in entries.flatten() {
        let name = entry.file_name().to_string_lossy().to_string();
        if parse_shard_file_name(&name).is_none() || live.contains(name.as_str()) {
            continue;
        }
        match std::fs::remove_file(entry.path()) {
            Ok(()) => tracing::info!(file = %name, "removed stale shard"),
            Err(e) => tracing::warn!(file = %name, error = %e, "could not remove stale shard"),
        }
    }
}
