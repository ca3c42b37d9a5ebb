//! Manifest builder.
//!
//! Turns a [`DocumentSource`] into a sharded manifest:
//!
//! 1. Enumerate documents (failure aborts the build).
//! 2. Classify each base name; failures go to the ledger.
//! 3. Fingerprint content where the source can supply bytes.
//! 4. Sort newest first (stable), shard by year, tag each shard.
//! 5. Write shards, index, ledger (see [`crate::export`]).
//!
//! Every build is a full rebuild. Nothing is written until the whole pass
//! has succeeded.

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::Path;

use coa_search_core::identity::classify;
use coa_search_core::manifest::{
    build_index, partition_by_year, sort_newest_first, FailureLedger, ManifestIndex,
    ManifestShard,
};
use coa_search_core::models::{format_timestamp, DocumentRecord};

use crate::config::Config;
use crate::connector_drive::DriveSource;
use crate::connector_fs::FilesystemSource;
use crate::error::BuildError;
use crate::export;
use crate::progress::{BuildProgressEvent, BuildProgressReporter, ProgressMode};
use crate::traits::{DocumentSource, SourceDocument};

/// Summary of one build run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildReport {
    pub record_count: usize,
    pub shard_count: usize,
    pub failure_count: usize,
    /// Records emitted without a content fingerprint.
    pub unhashed_count: usize,
}

/// A fully assembled, not yet written manifest.
#[derive(Debug, Clone)]
pub struct Manifest {
    pub index: ManifestIndex,
    pub shards: Vec<ManifestShard>,
    pub failures: FailureLedger,
    pub unhashed_count: usize,
}

impl Manifest {
    pub fn report(&self) -> BuildReport {
        BuildReport {
            record_count: self.index.total,
            shard_count: self.shards.len(),
            failure_count: self.failures.len(),
            unhashed_count: self.unhashed_count,
        }
    }
}

/// Run steps 1-4 against `source`. `now` stamps `generatedAt` and files
/// undated records.
pub async fn assemble_manifest(
    source: &dyn DocumentSource,
    progress: &dyn BuildProgressReporter,
    now: DateTime<Utc>,
) -> Result<Manifest, BuildError> {
    progress.report(BuildProgressEvent::Enumerating {
        source: source.name().to_string(),
    });

    let docs = source
        .enumerate()
        .await
        .map_err(|e| BuildError::SourceUnavailable {
            source_name: source.name().to_string(),
            reason: format!("{:#}", e),
        })?;

    tracing::info!(source = %source.name(), kind = %source.kind(), documents = docs.len(), "enumerated source");

    let total = docs.len() as u64;
    let mut records = Vec::with_capacity(docs.len());
    let mut failures = FailureLedger::default();
    let mut unhashed_count = 0usize;

    for (i, doc) in docs.iter().enumerate() {
        match classify(&doc.name) {
            Ok(identity) => {
                let content_fingerprint = fingerprint(source, doc).await;
                if content_fingerprint.is_none() {
                    unhashed_count += 1;
                }
                records.push(DocumentRecord {
                    file_name: doc.name.clone(),
                    source_url: doc.locator.clone(),
                    identity,
                    modified_time: doc
                        .modified_time
                        .as_ref()
                        .map(format_timestamp)
                        .unwrap_or_default(),
                    size_bytes: doc.size_bytes,
                    content_fingerprint,
                });
            }
            Err(failure) => {
                tracing::warn!(file = %doc.path, reason = %failure.reason, "skipping document");
                failures.push(&doc.path, &failure);
            }
        }

        let n = i as u64 + 1;
        if n % 100 == 0 || n == total {
            progress.report(BuildProgressEvent::Classifying {
                source: source.name().to_string(),
                n,
                total,
            });
        }
    }

    sort_newest_first(&mut records);
    let shards = partition_by_year(records, &now);
    let index = build_index(&shards, format_timestamp(&now));

    Ok(Manifest {
        index,
        shards,
        failures,
        unhashed_count,
    })
}

async fn fingerprint(source: &dyn DocumentSource, doc: &SourceDocument) -> Option<String> {
    match source.content_fingerprint(doc).await {
        Ok(fp) => fp,
        Err(e) => {
            tracing::warn!(file = %doc.path, error = %format!("{:#}", e), "content unavailable, record kept without fingerprint");
            None
        }
    }
}

/// Build the manifest from `source` and write it into `out_dir`.
pub async fn build(
    source: &dyn DocumentSource,
    out_dir: &Path,
    pretty: bool,
    progress: &dyn BuildProgressReporter,
) -> Result<BuildReport, BuildError> {
    let manifest = assemble_manifest(source, progress, Utc::now()).await?;

    progress.report(BuildProgressEvent::Writing {
        source: source.name().to_string(),
        shards: manifest.shards.len() as u64,
    });
    export::write_manifest(&manifest, out_dir, pretty)?;

    let report = manifest.report();
    tracing::info!(
        records = report.record_count,
        shards = report.shard_count,
        failures = report.failure_count,
        out_dir = %out_dir.display(),
        "manifest written"
    );
    Ok(report)
}

/// Instantiate the named source (or the configured default).
pub fn resolve_source(config: &Config, name: Option<&str>) -> Result<Box<dyn DocumentSource>> {
    let name = name.unwrap_or(config.sources.default.as_str());
    match name {
        "filesystem" => {
            let fs = config
                .sources
                .filesystem
                .clone()
                .ok_or_else(|| anyhow::anyhow!("Filesystem source not configured"))?;
            Ok(Box::new(FilesystemSource::new("filesystem", fs)))
        }
        "drive" => {
            let drive = config
                .sources
                .drive
                .clone()
                .ok_or_else(|| anyhow::anyhow!("Drive source not configured"))?;
            Ok(Box::new(DriveSource::from_env("drive", drive)?))
        }
        other => anyhow::bail!("Unknown source: '{}'. Available: filesystem, drive", other),
    }
}

/// CLI entry point for `coa build`.
pub async fn run_build(
    config: &Config,
    source: Option<&str>,
    dry_run: bool,
    progress: ProgressMode,
) -> Result<()> {
    let source = resolve_source(config, source)?;
    let reporter = progress.reporter();

    let report = if dry_run {
        let manifest = assemble_manifest(source.as_ref(), reporter.as_ref(), Utc::now()).await?;
        println!("build {} (dry-run)", source.name());
        manifest.report()
    } else {
        let report = build(
            source.as_ref(),
            &config.output.dir,
            config.output.pretty,
            reporter.as_ref(),
        )
        .await?;
        println!("build {}", source.name());
        report
    };

    println!("  records: {}", report.record_count);
    println!("  shards: {}", report.shard_count);
    println!("  failures: {}", report.failure_count);
    println!("  unhashed: {}", report.unhashed_count);
    if !dry_run {
        println!("  output: {}", config.output.dir.display());
    }
    println!("ok");

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::NoProgress;
    use crate::traits::ContentHandle;
    use async_trait::async_trait;
    use chrono::TimeZone;
    use coa_search_core::models::PackagingVariant;

    struct ListSource {
        docs: Vec<SourceDocument>,
        fail: bool,
    }

    #[async_trait]
    impl DocumentSource for ListSource {
        fn name(&self) -> &str {
            "list"
        }

        async fn enumerate(&self) -> Result<Vec<SourceDocument>> {
            if self.fail {
                anyhow::bail!("listing interrupted");
            }
            Ok(self.docs.clone())
        }

        async fn content_fingerprint(&self, doc: &SourceDocument) -> Result<Option<String>> {
            match &doc.content {
                ContentHandle::Local(_) => Ok(Some(coa_search_core::manifest::sha256_hex(
                    doc.name.as_bytes(),
                ))),
                ContentHandle::Remote(_) => anyhow::bail!("connection reset"),
                ContentHandle::Unavailable => Ok(None),
            }
        }
    }

    fn doc(name: &str, ymd: (i32, u32, u32), content: ContentHandle) -> SourceDocument {
        SourceDocument {
            name: name.to_string(),
            path: format!("files/{}", name),
            locator: format!("files/{}", name),
            modified_time: Some(Utc.with_ymd_and_hms(ymd.0, ymd.1, ymd.2, 8, 0, 0).unwrap()),
            size_bytes: 100,
            content,
        }
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 1, 0, 0, 0).unwrap()
    }

    #[tokio::test]
    async fn assembles_sorted_sharded_manifest() {
        let local = || ContentHandle::Local("x".into());
        let source = ListSource {
            docs: vec![
                doc("MB-X7CAP-Lot-A100.pdf", (2024, 2, 1), local()),
                doc("240115-550021.pdf", (2023, 5, 1), ContentHandle::Unavailable),
                doc("readme.pdf", (2024, 1, 1), local()),
                doc("MB-X7-Lot-A100.pdf", (2024, 6, 1), ContentHandle::Remote("r".into())),
            ],
            fail: false,
        };

        let manifest = assemble_manifest(&source, &NoProgress, now()).await.unwrap();
        assert_eq!(
            manifest.report(),
            BuildReport {
                record_count: 3,
                shard_count: 2,
                failure_count: 1,
                unhashed_count: 2,
            }
        );

        assert_eq!(manifest.failures.errors[0].file, "files/readme.pdf");
        assert_eq!(
            manifest.failures.errors[0].reason,
            "unrecognized filename pattern"
        );

        let years: Vec<i32> = manifest.index.shards.iter().map(|s| s.year).collect();
        assert_eq!(years, vec![2023, 2024]);

        let y2024 = &manifest.shards[1];
        assert_eq!(y2024.records[0].file_name, "MB-X7-Lot-A100.pdf");
        assert_eq!(
            y2024.records[0].identity.packaging_variant,
            PackagingVariant::Tube
        );
        assert!(y2024.records[0].content_fingerprint.is_none());
        assert_eq!(y2024.records[1].file_name, "MB-X7CAP-Lot-A100.pdf");
        assert!(y2024.records[1].content_fingerprint.is_some());
        assert_eq!(y2024.records[1].modified_time, "2024-02-01T08:00:00.000Z");

        assert_eq!(manifest.index.generated_at, "2025-03-01T00:00:00.000Z");
    }

    #[tokio::test]
    async fn enumeration_failure_is_source_unavailable() {
        let source = ListSource {
            docs: vec![],
            fail: true,
        };
        let err = assemble_manifest(&source, &NoProgress, now())
            .await
            .unwrap_err();
        match err {
            BuildError::SourceUnavailable {
                source_name,
                reason,
            } => {
                assert_eq!(source_name, "list");
                assert!(reason.contains("listing interrupted"));
            }
            other => panic!("unexpected error: {}", other),
        }
    }

    #[tokio::test]
    async fn undated_documents_file_under_build_year() {
        let mut undated = doc("240115-550021.pdf", (2020, 1, 1), ContentHandle::Unavailable);
        undated.modified_time = None;
        let source = ListSource {
            docs: vec![undated],
            fail: false,
        };
        let manifest = assemble_manifest(&source, &NoProgress, now()).await.unwrap();
        assert_eq!(manifest.shards[0].year, 2025);
        assert_eq!(manifest.shards[0].records[0].modified_time, "");
    }

    #[tokio::test]
    async fn two_builds_agree_except_generated_at() {
        let source = ListSource {
            docs: vec![
                doc("MB-A-Lot-1.pdf", (2024, 1, 1), ContentHandle::Local("a".into())),
                doc("MB-B-Lot-2.pdf", (2024, 1, 1), ContentHandle::Local("b".into())),
                doc("111111-222222.pdf", (2022, 1, 1), ContentHandle::Unavailable),
            ],
            fail: false,
        };
        let first = assemble_manifest(&source, &NoProgress, now()).await.unwrap();
        let later = Utc.with_ymd_and_hms(2025, 4, 1, 0, 0, 0).unwrap();
        let second = assemble_manifest(&source, &NoProgress, later).await.unwrap();

        assert_ne!(first.index.generated_at, second.index.generated_at);
        assert_eq!(first.index.total, second.index.total);
        assert_eq!(first.index.shards, second.index.shards);
        assert_eq!(first.shards, second.shards);
    }
}
