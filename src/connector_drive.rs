//! Remote folder document source (Google Drive v3 listing API).
//!
//! Lists the configured root folder and every folder beneath it, page by
//! page, following `nextPageToken` until the listing is exhausted. Only
//! PDF entries (`application/pdf` or a `.pdf` name) become documents.
//!
//! # Configuration
//!
//! ```toml
//! [sources.drive]
//! root_folder_id = "1AbCdEfGh"
//! credential_env = "COA_DRIVE_CREDENTIAL"   # env var holding the credential
//! auth = "api_key"                          # or "bearer_token"
//! download_content = false
//! ```
//!
//! # Fingerprints
//!
//! Listings carry metadata only. With `download_content = false` (the
//! default) records from this source have no content fingerprint and
//! their shard integrity tags use the metadata surrogate. With
//! `download_content = true` each PDF is streamed once through SHA-256.
//!
//! # Retries
//!
//! Each page request is retried on its own with exponential backoff for
//! HTTP 429, 5xx and network errors. Other 4xx responses fail at once.
//! A listing that still fails aborts enumeration.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use sha2::{Digest, Sha256};
use std::time::Duration;

use crate::config::{DriveAuth, DriveSourceConfig};
use crate::traits::{ContentHandle, DocumentSource, SourceDocument};

const FOLDER_MIME: &str = "application/vnd.google-apps.folder";
const PDF_MIME: &str = "application/pdf";
const LIST_FIELDS: &str = "nextPageToken,files(id,name,mimeType,modifiedTime,size,webViewLink)";

pub struct DriveSource {
    name: String,
    config: DriveSourceConfig,
    credential: String,
    client: reqwest::Client,
}

impl DriveSource {
    /// Create a source, reading the credential from the environment
    /// variable named by `config.credential_env`.
    pub fn from_env(name: impl Into<String>, config: DriveSourceConfig) -> Result<Self> {
        let credential = std::env::var(&config.credential_env).with_context(|| {
            format!(
                "{} environment variable not set (drive credential)",
                config.credential_env
            )
        })?;
        Self::new(name, config, credential)
    }

    pub fn new(
        name: impl Into<String>,
        config: DriveSourceConfig,
        credential: String,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            name: name.into(),
            config,
            credential,
            client,
        })
    }

    fn authorize(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match self.config.auth {
            DriveAuth::ApiKey => req.query(&[("key", self.credential.as_str())]),
            DriveAuth::BearerToken => req.bearer_auth(&self.credential),
        }
    }

    fn api_url(&self, path: &str) -> String {
        format!("{}/{}", self.config.api_base.trim_end_matches('/'), path)
    }

    /// Fetch one listing page, retrying transient failures.
    async fn fetch_page(&self, folder_id: &str, page_token: Option<&str>) -> Result<ListPage> {
        let q = format!(
            "'{}' in parents and trashed = false",
            escape_query_literal(folder_id)
        );
        let page_size = self.config.page_size.to_string();

        let mut last_err = None;

        for attempt in 0..=self.config.max_retries {
            if attempt > 0 {
                let delay = Duration::from_millis(250 << (attempt - 1).min(5));
                tokio::time::sleep(delay).await;
            }

            let mut params: Vec<(&str, &str)> = vec![
                ("q", q.as_str()),
                ("pageSize", page_size.as_str()),
                ("fields", LIST_FIELDS),
                ("orderBy", "name"),
                ("supportsAllDrives", "true"),
                ("includeItemsFromAllDrives", "true"),
            ];
            if let Some(token) = page_token {
                params.push(("pageToken", token));
            }

            let req = self.authorize(self.client.get(self.api_url("files")).query(&params));

            match req.send().await {
                Ok(resp) => {
                    let status = resp.status();
                    if status.is_success() {
                        let body = resp.text().await?;
                        return parse_list_page(&body);
                    }
                    let body = resp.text().await.unwrap_or_default();
                    let snippet = body.chars().take(300).collect::<String>();
                    if status.as_u16() == 429 || status.is_server_error() {
                        last_err = Some(anyhow::anyhow!(
                            "Drive listing failed (HTTP {}): {}",
                            status,
                            snippet
                        ));
                        continue;
                    }
                    bail!("Drive listing failed (HTTP {}): {}", status, snippet);
                }
                Err(e) => {
                    last_err = Some(anyhow::anyhow!("Drive listing request failed: {}", e));
                    continue;
                }
            }
        }

        Err(last_err.unwrap_or_else(|| anyhow::anyhow!("Drive listing failed after retries")))
    }
}

#[async_trait]
impl DocumentSource for DriveSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> &str {
        "drive"
    }

    async fn enumerate(&self) -> Result<Vec<SourceDocument>> {
        let mut docs = Vec::new();
        // (folder id, path prefix); folders are visited in discovery order.
        let mut pending = vec![(self.config.root_folder_id.clone(), String::new())];
        let mut pages = 0usize;

        while let Some((folder_id, prefix)) = pending.pop() {
            let mut token: Option<String> = None;
            let mut subfolders = Vec::new();

            loop {
                let page = self.fetch_page(&folder_id, token.as_deref()).await?;
                pages += 1;

                for entry in page.files {
                    let path = format!("{}{}", prefix, entry.name);
                    if entry.mime_type == FOLDER_MIME {
                        subfolders.push((entry.id, format!("{}/", path)));
                    } else if entry.is_pdf() {
                        docs.push(entry.into_document(path, self.config.download_content));
                    }
                }

                match page.next_page_token {
                    Some(next) if !next.is_empty() => token = Some(next),
                    _ => break,
                }
            }

            // Reverse so the stack pops subfolders in listing order.
            pending.extend(subfolders.into_iter().rev());
        }

        docs.sort_by(|a, b| a.path.cmp(&b.path));
        tracing::debug!(source = %self.name, pages, documents = docs.len(), "drive listing complete");
        Ok(docs)
    }

    async fn content_fingerprint(&self, doc: &SourceDocument) -> Result<Option<String>> {
        let file_id = match &doc.content {
            ContentHandle::Remote(id) => id,
            _ => return Ok(None),
        };

        let url = self.api_url(&format!("files/{}", file_id));
        let req = self.authorize(
            self.client
                .get(url)
                .query(&[("alt", "media"), ("supportsAllDrives", "true")]),
        );
        let mut resp = req
            .send()
            .await
            .with_context(|| format!("Failed to download {}", doc.path))?;

        if !resp.status().is_success() {
            bail!(
                "Drive download failed (HTTP {}) for '{}'",
                resp.status(),
                doc.path
            );
        }

        let mut hasher = Sha256::new();
        while let Some(chunk) = resp.chunk().await? {
            hasher.update(&chunk);
        }
        Ok(Some(hex::encode(hasher.finalize())))
    }
}

/// One page of a `files.list` response.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListPage {
    #[serde(default)]
    next_page_token: Option<String>,
    #[serde(default)]
    files: Vec<DriveFile>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DriveFile {
    id: String,
    name: String,
    #[serde(default)]
    mime_type: String,
    #[serde(default)]
    modified_time: Option<String>,
    /// Drive reports sizes as decimal strings.
    #[serde(default)]
    size: Option<String>,
    #[serde(default)]
    web_view_link: Option<String>,
}

impl DriveFile {
    fn is_pdf(&self) -> bool {
        self.mime_type == PDF_MIME || self.name.to_ascii_lowercase().ends_with(".pdf")
    }

    fn into_document(self, path: String, download: bool) -> SourceDocument {
        let modified_time = self
            .modified_time
            .as_deref()
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|dt| dt.with_timezone(&Utc));
        let size_bytes = self
            .size
            .as_deref()
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(0);
        let locator = self
            .web_view_link
            .clone()
            .unwrap_or_else(|| format!("https://drive.google.com/file/d/{}/view", self.id));
        let content = if download {
            ContentHandle::Remote(self.id)
        } else {
            ContentHandle::Unavailable
        };

        SourceDocument {
            name: self.name,
            path,
            locator,
            modified_time,
            size_bytes,
            content,
        }
    }
}

fn parse_list_page(body: &str) -> Result<ListPage> {
    serde_json::from_str(body).with_context(|| "Failed to parse Drive listing response")
}

/// Escape a value for a single-quoted string in a listing query.
fn escape_query_literal(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        if c == '\\' || c == '\'' {
            out.push('\\');
        }
        out.push(c);
    }
    out
}
