//! Filesystem document source.
//!
//! Walks `root` recursively, keeps files matching the include globs
//! (default `**/*.pdf`, case-insensitive) and not matching the exclude
//! globs, and reports them sorted by relative path so two builds over the
//! same tree enumerate identically.
//!
//! Locators are paths relative to the site root with `/` separators, so
//! the published index links work from a static site whose document root
//! is `site_root`. Files outside the site root fall back to `file://`.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use globset::{GlobBuilder, GlobSet, GlobSetBuilder};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use tokio::io::AsyncReadExt;
use walkdir::WalkDir;

use crate::config::FilesystemSourceConfig;
use crate::traits::{ContentHandle, DocumentSource, SourceDocument};

pub struct FilesystemSource {
    name: String,
    config: FilesystemSourceConfig,
}

impl FilesystemSource {
    pub fn new(name: impl Into<String>, config: FilesystemSourceConfig) -> Self {
        Self {
            name: name.into(),
            config,
        }
    }
}

#[async_trait]
impl DocumentSource for FilesystemSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> &str {
        "filesystem"
    }

    async fn enumerate(&self) -> Result<Vec<SourceDocument>> {
        let config = self.config.clone();
        tokio::task::spawn_blocking(move || scan_filesystem(&config)).await?
    }

    async fn content_fingerprint(&self, doc: &SourceDocument) -> Result<Option<String>> {
        match &doc.content {
            ContentHandle::Local(path) => hash_file(path).await.map(Some),
            _ => Ok(None),
        }
    }
}

/// Walk the configured root and return every matching document.
pub fn scan_filesystem(config: &FilesystemSourceConfig) -> Result<Vec<SourceDocument>> {
    let root = &config.root;
    if !root.is_dir() {
        bail!(
            "Filesystem source root does not exist or is not a directory: {}",
            root.display()
        );
    }

    let include_set = build_globset(&config.include_globs)?;

    let mut default_excludes = vec!["**/.git/**".to_string(), "**/node_modules/**".to_string()];
    default_excludes.extend(config.exclude_globs.clone());
    let exclude_set = build_globset(&default_excludes)?;

    let site_root = absolutize(&config.effective_site_root());
    let abs_root = absolutize(root);

    let mut docs = Vec::new();

    let walker = WalkDir::new(root).follow_links(config.follow_symlinks);
    for entry in walker {
        let entry = entry.with_context(|| format!("Failed to walk {}", root.display()))?;
        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        let relative = path.strip_prefix(root).unwrap_or(path);
        let rel_str = to_slash(relative);

        if exclude_set.is_match(&rel_str) {
            continue;
        }
        if !include_set.is_match(&rel_str) {
            continue;
        }

        let abs_path = abs_root.join(relative);
        docs.push(file_to_document(&abs_path, &site_root)?);
    }

    docs.sort_by(|a, b| a.path.cmp(&b.path));

    Ok(docs)
}

fn file_to_document(path: &Path, site_root: &Path) -> Result<SourceDocument> {
    let metadata =
        std::fs::metadata(path).with_context(|| format!("Failed to stat {}", path.display()))?;
    let modified_time = metadata.modified().ok().map(DateTime::<Utc>::from);

    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();

    let site_relative = path.strip_prefix(site_root).ok().map(to_slash);
    let locator = match &site_relative {
        Some(rel) => rel.clone(),
        None => format!("file://{}", to_slash(path)),
    };

    Ok(SourceDocument {
        name,
        path: site_relative.unwrap_or_else(|| to_slash(path)),
        locator,
        modified_time,
        size_bytes: metadata.len(),
        content: ContentHandle::Local(path.to_path_buf()),
    })
}

/// Stream a file through SHA-256.
async fn hash_file(path: &Path) -> Result<String> {
    let mut file = tokio::fs::File::open(path)
        .await
        .with_context(|| format!("Failed to open {}", path.display()))?;
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; 64 * 1024];
    loop {
        let n = file.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}

fn absolutize(path: &Path) -> PathBuf {
    std::fs::canonicalize(path).unwrap_or_else(|_| {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            std::env::current_dir()
                .map(|cwd| cwd.join(path))
                .unwrap_or_else(|_| path.to_path_buf())
        }
    })
}

fn to_slash(path: &Path) -> String {
    path.components()
        .filter_map(|c| match c {
            std::path::Component::Normal(s) => Some(s.to_string_lossy().to_string()),
            std::path::Component::RootDir => Some(String::new()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob = GlobBuilder::new(pattern)
            .case_insensitive(true)
            .build()
            .with_context(|| format!("Invalid glob pattern: {}", pattern))?;
        builder.add(glob);
    }
    Ok(builder.build()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn setup() -> (TempDir, FilesystemSourceConfig) {
        let tmp = TempDir::new().unwrap();
        let files = tmp.path().join("files");
        fs::create_dir_all(files.join("2024/q1")).unwrap();
        fs::create_dir_all(files.join("node_modules")).unwrap();
        fs::write(files.join("MB-X7CAP-Lot-A100.pdf"), b"cap").unwrap();
        fs::write(files.join("2024/q1/240115-550021.PDF"), b"legacy").unwrap();
        fs::write(files.join("2024/notes.txt"), b"not a pdf").unwrap();
        fs::write(files.join("node_modules/ignored.pdf"), b"x").unwrap();
        let config = FilesystemSourceConfig::new(files);
        (tmp, config)
    }

    #[test]
    fn scan_finds_pdfs_case_insensitively() {
        let (_tmp, config) = setup();
        let docs = scan_filesystem(&config).unwrap();
        let paths: Vec<&str> = docs.iter().map(|d| d.path.as_str()).collect();
        assert_eq!(
            paths,
            vec![
                "files/2024/q1/240115-550021.PDF",
                "files/MB-X7CAP-Lot-A100.pdf"
            ]
        );
        assert_eq!(docs[1].name, "MB-X7CAP-Lot-A100.pdf");
        assert_eq!(docs[1].locator, "files/MB-X7CAP-Lot-A100.pdf");
        assert_eq!(docs[1].size_bytes, 3);
        assert!(docs[1].modified_time.is_some());
    }

    #[test]
    fn exclude_globs_apply() {
        let (_tmp, mut config) = setup();
        config.exclude_globs = vec!["2024/**".to_string()];
        let docs = scan_filesystem(&config).unwrap();
        assert_eq!(docs.len(), 1);
    }

    #[test]
    fn files_outside_site_root_use_file_urls() {
        let (tmp, mut config) = setup();
        let elsewhere = tmp.path().join("elsewhere");
        fs::create_dir_all(&elsewhere).unwrap();
        config.site_root = Some(elsewhere);
        let docs = scan_filesystem(&config).unwrap();
        assert!(docs.iter().all(|d| d.locator.starts_with("file:///")));
    }

    #[test]
    fn missing_root_is_an_error() {
        let config = FilesystemSourceConfig::new(PathBuf::from("/definitely/not/here"));
        assert!(scan_filesystem(&config).is_err());
    }

    #[tokio::test]
    async fn fingerprint_is_sha256_of_bytes() {
        let (_tmp, config) = setup();
        let source = FilesystemSource::new("docs", config);
        let docs = source.enumerate().await.unwrap();
        let cap = docs.iter().find(|d| d.name.starts_with("MB-")).unwrap();
        let fp = source.content_fingerprint(cap).await.unwrap().unwrap();
        assert_eq!(fp, coa_search_core::manifest::sha256_hex(b"cap"));
    }
}
