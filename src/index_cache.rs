//! Query-side index cache.
//!
//! Loads the published manifest (index first, then every shard it lists)
//! and holds the records in memory for the matcher. The cache is an
//! explicit object with three states:
//!
//! ```text
//! Empty ──ensure_loaded()──▶ Loading ──ok──▶ Ready(records)
//!   ▲                           │               │
//!   └──────────err──────────────┘          reload()
//! ```
//!
//! `ensure_loaded` is idempotent and safe to call from several tasks at
//! once: one load runs, the others wait for it. `reload` always fetches
//! again; the previous snapshot stays readable while it runs and is kept
//! if the reload fails. A load either yields every shard or nothing.

use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::{Arc, PoisonError, RwLock};

use coa_search_core::manifest::{
    parse_shard_file_name, sort_newest_first, ManifestIndex, ShardFile, INDEX_FILE_NAME,
};
use coa_search_core::models::DocumentRecord;
use coa_search_core::search::{search, Query};

use crate::error::IndexError;

/// Fetches manifest files by name from wherever the index is published.
#[async_trait]
pub trait IndexFetcher: Send + Sync {
    /// Human-readable location of `file_name`, used in error messages.
    fn location(&self, file_name: &str) -> String;

    async fn fetch(&self, file_name: &str) -> Result<Vec<u8>, IndexError>;
}

/// Reads manifest files from a local directory.
pub struct DirectoryFetcher {
    dir: PathBuf,
}

impl DirectoryFetcher {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

#[async_trait]
impl IndexFetcher for DirectoryFetcher {
    fn location(&self, file_name: &str) -> String {
        self.dir.join(file_name).display().to_string()
    }

    async fn fetch(&self, file_name: &str) -> Result<Vec<u8>, IndexError> {
        let path = self.dir.join(file_name);
        tokio::fs::read(&path)
            .await
            .map_err(|e| IndexError::Unreachable {
                location: path.display().to_string(),
                reason: e.to_string(),
            })
    }
}

/// Fetches manifest files over HTTP with caching disabled.
pub struct HttpFetcher {
    base_url: String,
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new(base_url: impl Into<String>) -> Self {
        let mut base_url = base_url.into();
        if !base_url.ends_with('/') {
            base_url.push('/');
        }
        Self {
            base_url,
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl IndexFetcher for HttpFetcher {
    fn location(&self, file_name: &str) -> String {
        format!("{}{}", self.base_url, file_name)
    }

    async fn fetch(&self, file_name: &str) -> Result<Vec<u8>, IndexError> {
        let url = self.location(file_name);
        let unreachable = |reason: String| IndexError::Unreachable {
            location: url.clone(),
            reason,
        };

        let resp = self
            .client
            .get(&url)
            .header(reqwest::header::CACHE_CONTROL, "no-cache")
            .header(reqwest::header::PRAGMA, "no-cache")
            .send()
            .await
            .map_err(|e| unreachable(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(unreachable(format!("HTTP {}", resp.status())));
        }

        let bytes = resp.bytes().await.map_err(|e| unreachable(e.to_string()))?;
        Ok(bytes.to_vec())
    }
}

/// Pick a fetcher for a directory path or an `http(s)://` base URL.
pub fn fetcher_for(location: &str) -> Box<dyn IndexFetcher> {
    if location.starts_with("http://") || location.starts_with("https://") {
        Box::new(HttpFetcher::new(location))
    } else {
        Box::new(DirectoryFetcher::new(location))
    }
}

/// A fully loaded manifest, records sorted newest first.
#[derive(Debug, Clone)]
pub struct LoadedIndex {
    pub index: ManifestIndex,
    pub records: Vec<DocumentRecord>,
}

impl LoadedIndex {
    pub fn search(&self, query: &Query) -> Vec<&DocumentRecord> {
        search(&self.records, query)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheStatus {
    Empty,
    Loading,
    Ready,
}

enum CacheState {
    Empty,
    Loading { previous: Option<Arc<LoadedIndex>> },
    Ready(Arc<LoadedIndex>),
}

pub struct IndexCache {
    fetcher: Box<dyn IndexFetcher>,
    state: RwLock<CacheState>,
    load_gate: tokio::sync::Mutex<()>,
}

impl IndexCache {
    pub fn new(fetcher: Box<dyn IndexFetcher>) -> Self {
        Self {
            fetcher,
            state: RwLock::new(CacheState::Empty),
            load_gate: tokio::sync::Mutex::new(()),
        }
    }

    pub fn status(&self) -> CacheStatus {
        match &*self.state.read().unwrap_or_else(PoisonError::into_inner) {
            CacheState::Empty => CacheStatus::Empty,
            CacheState::Loading { .. } => CacheStatus::Loading,
            CacheState::Ready(_) => CacheStatus::Ready,
        }
    }

    /// The last successfully loaded index, if any. Never blocks on a load.
    pub fn snapshot(&self) -> Option<Arc<LoadedIndex>> {
        match &*self.state.read().unwrap_or_else(PoisonError::into_inner) {
            CacheState::Ready(loaded) => Some(loaded.clone()),
            CacheState::Loading { previous } => previous.clone(),
            CacheState::Empty => None,
        }
    }

    /// Load the index unless it is already loaded.
    pub async fn ensure_loaded(&self) -> Result<Arc<LoadedIndex>, IndexError> {
        if let Some(loaded) = self.ready() {
            return Ok(loaded);
        }
        let _gate = self.load_gate.lock().await;
        if let Some(loaded) = self.ready() {
            return Ok(loaded);
        }
        self.load_locked().await
    }

    /// Fetch the index again, replacing the current snapshot on success.
    pub async fn reload(&self) -> Result<Arc<LoadedIndex>, IndexError> {
        let _gate = self.load_gate.lock().await;
        self.load_locked().await
    }

    /// Load if needed, then run `query` and return owned hits.
    pub async fn search(&self, query: &Query) -> Result<Vec<DocumentRecord>, IndexError> {
        let loaded = self.ensure_loaded().await?;
        Ok(loaded.search(query).into_iter().cloned().collect())
    }

    fn ready(&self) -> Option<Arc<LoadedIndex>> {
        match &*self.state.read().unwrap_or_else(PoisonError::into_inner) {
            CacheState::Ready(loaded) => Some(loaded.clone()),
            _ => None,
        }
    }

    fn set_state(&self, next: CacheState) {
        *self.state.write().unwrap_or_else(PoisonError::into_inner) = next;
    }

    /// Caller holds `load_gate`.
    async fn load_locked(&self) -> Result<Arc<LoadedIndex>, IndexError> {
        let previous = self.snapshot();
        self.set_state(CacheState::Loading {
            previous: previous.clone(),
        });

        match load_index(self.fetcher.as_ref()).await {
            Ok(loaded) => {
                let loaded = Arc::new(loaded);
                tracing::debug!(records = loaded.records.len(), shards = loaded.index.shards.len(), "index loaded");
                self.set_state(CacheState::Ready(loaded.clone()));
                Ok(loaded)
            }
            Err(e) => {
                self.set_state(match previous {
                    Some(p) => CacheState::Ready(p),
                    None => CacheState::Empty,
                });
                Err(e)
            }
        }
    }
}

fn parse<T: serde::de::DeserializeOwned>(bytes: &[u8], location: String) -> Result<T, IndexError> {
    serde_json::from_slice(bytes).map_err(|e| IndexError::Malformed {
        location,
        reason: e.to_string(),
    })
}

/// Fetch and verify the index and all of its shards.
pub async fn load_index(fetcher: &dyn IndexFetcher) -> Result<LoadedIndex, IndexError> {
    let index_bytes = fetcher.fetch(INDEX_FILE_NAME).await?;
    let index: ManifestIndex = parse(&index_bytes, fetcher.location(INDEX_FILE_NAME))?;

    // Shard names come from fetched data and are joined onto a path or URL.
    if let Some(bad) = index
        .shards
        .iter()
        .find(|d| parse_shard_file_name(&d.shard_file_name) != Some(d.year))
    {
        return Err(IndexError::Malformed {
            location: fetcher.location(INDEX_FILE_NAME),
            reason: format!(
                "invalid shard file name {:?} for year {}",
                bad.shard_file_name, bad.year
            ),
        });
    }

    let mut records = Vec::with_capacity(index.total);
    for desc in &index.shards {
        let bytes = fetcher.fetch(&desc.shard_file_name).await?;
        let shard: ShardFile = parse(&bytes, fetcher.location(&desc.shard_file_name))?;
        desc.verify(&shard).map_err(|e| IndexError::Malformed {
            location: fetcher.location(&desc.shard_file_name),
            reason: e.to_string(),
        })?;
        records.extend(shard.items);
    }

    if records.len() != index.total {
        return Err(IndexError::Malformed {
            location: fetcher.location(INDEX_FILE_NAME),
            reason: format!(
                "index total is {} but shards hold {} records",
                index.total,
                records.len()
            ),
        });
    }

    sort_newest_first(&mut records);
    Ok(LoadedIndex { index, records })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use coa_search_core::manifest::{build_index, ManifestShard};
    use coa_search_core::models::{DocumentIdentity, PackagingVariant};

    struct MemoryFetcher {
        files: Mutex<HashMap<String, Vec<u8>>>,
        fetches: AtomicUsize,
    }

    impl MemoryFetcher {
        fn new(files: HashMap<String, Vec<u8>>) -> Self {
            Self {
                files: Mutex::new(files),
                fetches: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl IndexFetcher for MemoryFetcher {
        fn location(&self, file_name: &str) -> String {
            format!("mem://{}", file_name)
        }

        async fn fetch(&self, file_name: &str) -> Result<Vec<u8>, IndexError> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            self.files
                .lock()
                .unwrap()
                .get(file_name)
                .cloned()
                .ok_or_else(|| IndexError::Unreachable {
                    location: self.location(file_name),
                    reason: "not found".to_string(),
                })
        }
    }

    struct Shared(Arc<MemoryFetcher>);

    #[async_trait]
    impl IndexFetcher for Shared {
        fn location(&self, file_name: &str) -> String {
            self.0.location(file_name)
        }

        async fn fetch(&self, file_name: &str) -> Result<Vec<u8>, IndexError> {
            self.0.fetch(file_name).await
        }
    }

    fn record(name: &str, lot: &str, variant: PackagingVariant, mtime: &str) -> DocumentRecord {
        DocumentRecord {
            file_name: name.to_string(),
            source_url: format!("files/{}", name),
            identity: DocumentIdentity {
                product: "MB-X7".to_string(),
                packaging_variant: variant,
                lot: lot.to_string(),
                legacy_key: String::new(),
            },
            modified_time: mtime.to_string(),
            size_bytes: 1,
            content_fingerprint: Some(coa_search_core::manifest::sha256_hex(name.as_bytes())),
        }
    }

    fn published() -> HashMap<String, Vec<u8>> {
        publish(vec![
            ManifestShard {
                year: 2023,
                records: vec![record("MB-X7-Lot-B1.pdf", "B1", PackagingVariant::Tube, "2023-04-01T00:00:00.000Z")],
            },
            ManifestShard {
                year: 2024,
                records: vec![
                    record("MB-X7CAP-Lot-A1.pdf", "A1", PackagingVariant::Cap, "2024-02-01T00:00:00.000Z"),
                    record("MB-X7-Lot-A1.pdf", "A1", PackagingVariant::Tube, "2024-01-01T00:00:00.000Z"),
                ],
            },
        ])
    }

    fn publish(shards: Vec<ManifestShard>) -> HashMap<String, Vec<u8>> {
        let index = build_index(&shards, "2024-06-01T00:00:00.000Z".to_string());
        let mut files = HashMap::new();
        files.insert(
            INDEX_FILE_NAME.to_string(),
            serde_json::to_vec(&index).unwrap(),
        );
        for shard in &shards {
            files.insert(
                shard.file_name(),
                serde_json::to_vec(&shard.to_file()).unwrap(),
            );
        }
        files
    }

    fn shard_name(files: &HashMap<String, Vec<u8>>, year: i32) -> String {
        let index: ManifestIndex = serde_json::from_slice(&files[INDEX_FILE_NAME]).unwrap();
        index
            .shards
            .into_iter()
            .find(|d| d.year == year)
            .unwrap()
            .shard_file_name
    }

    /// Serves from memory, but every fetch waits for a `release` permit.
    struct GatedFetcher {
        inner: MemoryFetcher,
        release: tokio::sync::Semaphore,
    }

    #[async_trait]
    impl IndexFetcher for GatedFetcher {
        fn location(&self, file_name: &str) -> String {
            self.inner.location(file_name)
        }

        async fn fetch(&self, file_name: &str) -> Result<Vec<u8>, IndexError> {
            self.release.acquire().await.unwrap().forget();
            self.inner.fetch(file_name).await
        }
    }

    struct SharedGated(Arc<GatedFetcher>);

    #[async_trait]
    impl IndexFetcher for SharedGated {
        fn location(&self, file_name: &str) -> String {
            self.0.location(file_name)
        }

        async fn fetch(&self, file_name: &str) -> Result<Vec<u8>, IndexError> {
            self.0.fetch(file_name).await
        }
    }

    fn gated(files: HashMap<String, Vec<u8>>) -> Arc<GatedFetcher> {
        Arc::new(GatedFetcher {
            inner: MemoryFetcher::new(files),
            release: tokio::sync::Semaphore::new(0),
        })
    }

    async fn wait_until_loading(cache: &IndexCache) {
        while cache.status() != CacheStatus::Loading {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn loads_once_and_searches() {
        let fetcher = Arc::new(MemoryFetcher::new(published()));
        let cache = IndexCache::new(Box::new(Shared(fetcher.clone())));
        assert_eq!(cache.status(), CacheStatus::Empty);
        assert!(cache.snapshot().is_none());

        let loaded = cache.ensure_loaded().await.unwrap();
        assert_eq!(loaded.records.len(), 3);
        assert_eq!(loaded.records[0].file_name, "MB-X7CAP-Lot-A1.pdf");
        assert_eq!(cache.status(), CacheStatus::Ready);

        cache.ensure_loaded().await.unwrap();
        assert_eq!(fetcher.fetches.load(Ordering::SeqCst), 3, "second call must not refetch");

        let hits = cache.search(&Query::new("a1")).await.unwrap();
        let names: Vec<&str> = hits.iter().map(|r| r.file_name.as_str()).collect();
        assert_eq!(names, vec!["MB-X7-Lot-A1.pdf", "MB-X7CAP-Lot-A1.pdf"]);
    }

    #[tokio::test]
    async fn malformed_shard_exposes_nothing() {
        let mut files = published();
        files.insert(shard_name(&files, 2024), b"{ not json".to_vec());
        let cache = IndexCache::new(Box::new(MemoryFetcher::new(files)));

        let err = cache.ensure_loaded().await.unwrap_err();
        assert!(matches!(err, IndexError::Malformed { .. }));
        assert_eq!(err.code(), "malformed_index");
        assert_eq!(cache.status(), CacheStatus::Empty);
        assert!(cache.snapshot().is_none());
    }

    #[tokio::test]
    async fn tampered_shard_fails_integrity_check() {
        let mut files = published();
        let name = shard_name(&files, 2023);
        let mut shard: ShardFile = serde_json::from_slice(&files[&name]).unwrap();
        shard.items[0].content_fingerprint = Some("0".repeat(64));
        files.insert(name, serde_json::to_vec(&shard).unwrap());
        let cache = IndexCache::new(Box::new(MemoryFetcher::new(files)));
        let err = cache.ensure_loaded().await.unwrap_err();
        assert!(err.to_string().contains("integrity"));
    }

    #[tokio::test]
    async fn failed_reload_keeps_previous_snapshot() {
        let fetcher = Arc::new(MemoryFetcher::new(published()));
        let cache = IndexCache::new(Box::new(Shared(fetcher.clone())));
        cache.ensure_loaded().await.unwrap();

        fetcher
            .files
            .lock()
            .unwrap()
            .insert(INDEX_FILE_NAME.to_string(), b"[]".to_vec());
        assert!(cache.reload().await.is_err());
        assert_eq!(cache.status(), CacheStatus::Ready);
        assert_eq!(cache.snapshot().unwrap().records.len(), 3);
    }

    #[tokio::test]
    async fn concurrent_first_loads_fetch_once() {
        let fetcher = gated(published());
        let cache = IndexCache::new(Box::new(SharedGated(fetcher.clone())));

        let release = async {
            wait_until_loading(&cache).await;
            fetcher.release.add_permits(16);
        };
        let (a, b, ()) = tokio::join!(cache.ensure_loaded(), cache.ensure_loaded(), release);

        let (a, b) = (a.unwrap(), b.unwrap());
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(fetcher.inner.fetches.load(Ordering::SeqCst), 3, "index + 2 shards, once");
        assert_eq!(cache.status(), CacheStatus::Ready);
    }

    #[tokio::test]
    async fn snapshot_stays_readable_during_reload() {
        let fetcher = gated(published());
        let cache = Arc::new(IndexCache::new(Box::new(SharedGated(fetcher.clone()))));
        fetcher.release.add_permits(3);
        cache.ensure_loaded().await.unwrap();

        let next = publish(vec![ManifestShard {
            year: 2024,
            records: vec![record("MB-X7-Lot-C1.pdf", "C1", PackagingVariant::Tube, "2024-03-01T00:00:00.000Z")],
        }]);
        *fetcher.inner.files.lock().unwrap() = next;

        let task = tokio::spawn({
            let cache = cache.clone();
            async move { cache.reload().await }
        });
        wait_until_loading(&cache).await;

        assert_eq!(cache.status(), CacheStatus::Loading);
        let during = cache.snapshot().unwrap();
        assert_eq!(during.records.len(), 3);
        assert_eq!(during.records[0].file_name, "MB-X7CAP-Lot-A1.pdf");

        fetcher.release.add_permits(2);
        let reloaded = task.await.unwrap().unwrap();
        assert_eq!(reloaded.records.len(), 1);
        assert_eq!(cache.status(), CacheStatus::Ready);
        assert_eq!(cache.snapshot().unwrap().records[0].file_name, "MB-X7-Lot-C1.pdf");
    }

    #[tokio::test]
    async fn shard_name_outside_manifest_dir_is_rejected() {
        let mut files = published();
        let mut index: ManifestIndex = serde_json::from_slice(&files[INDEX_FILE_NAME]).unwrap();
        index.shards[0].shard_file_name = "../../secrets.json".to_string();
        files.insert(INDEX_FILE_NAME.to_string(), serde_json::to_vec(&index).unwrap());
        let fetcher = Arc::new(MemoryFetcher::new(files));
        let cache = IndexCache::new(Box::new(Shared(fetcher.clone())));

        let err = cache.ensure_loaded().await.unwrap_err();
        assert_eq!(err.code(), "malformed_index");
        assert!(err.to_string().contains("invalid shard file name"));
        assert_eq!(fetcher.fetches.load(Ordering::SeqCst), 1, "no shard fetched");
    }

    #[tokio::test]
    async fn missing_index_is_unreachable() {
        let cache = IndexCache::new(Box::new(MemoryFetcher::new(HashMap::new())));
        let err = cache.search(&Query::new("")).await.unwrap_err();
        assert_eq!(err.code(), "index_unavailable");
    }

    #[test]
    fn fetcher_for_picks_by_scheme() {
        assert_eq!(
            fetcher_for("https://example.org/manifest").location("manifest.json"),
            "https://example.org/manifest/manifest.json"
        );
        assert!(fetcher_for("docs/manifest")
            .location("manifest.json")
            .ends_with("manifest.json"));
    }
}
