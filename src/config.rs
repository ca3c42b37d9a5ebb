//! Configuration loading.
//!
//! Settings come from a TOML file (default `./coa.toml`). The file is
//! optional: without it the built-in defaults catalog `docs/files` into
//! `docs/manifest`, matching a static site served from `docs/`.
//! A few environment variables override the file so CI jobs can point the
//! builder elsewhere without writing a config:
//!
//! | Variable | Overrides |
//! |----------|-----------|
//! | `FILES_DIR` | `sources.filesystem.root` |
//! | `MANIFEST_DIR` | `output.dir` |
//! | `DRIVE_FOLDER_ID` | `sources.drive.root_folder_id` |
//!
//! ```toml
//! [output]
//! dir = "docs/manifest"
//!
//! [sources]
//! default = "filesystem"
//!
//! [sources.filesystem]
//! root = "docs/files"
//! site_root = "docs"
//!
//! [sources.drive]
//! root_folder_id = "1AbCdEf"
//! credential_env = "COA_DRIVE_CREDENTIAL"
//!
//! [server]
//! bind = "127.0.0.1:7340"
//! ```

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default)]
    pub sources: SourcesConfig,
    #[serde(default)]
    pub query: QueryConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct OutputConfig {
    #[serde(default = "default_output_dir")]
    pub dir: PathBuf,
    /// Pretty-print the JSON files.
    #[serde(default = "default_true")]
    pub pretty: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: default_output_dir(),
            pretty: true,
        }
    }
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("docs/manifest")
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize, Clone)]
pub struct SourcesConfig {
    /// Source used by `coa build` when none is named.
    #[serde(default = "default_source")]
    pub default: String,
    #[serde(default = "default_filesystem")]
    pub filesystem: Option<FilesystemSourceConfig>,
    #[serde(default)]
    pub drive: Option<DriveSourceConfig>,
}

impl Default for SourcesConfig {
    fn default() -> Self {
        Self {
            default: default_source(),
            filesystem: default_filesystem(),
            drive: None,
        }
    }
}

fn default_source() -> String {
    "filesystem".to_string()
}

fn default_filesystem() -> Option<FilesystemSourceConfig> {
    Some(FilesystemSourceConfig::new(PathBuf::from("docs/files")))
}

#[derive(Debug, Deserialize, Clone)]
pub struct FilesystemSourceConfig {
    pub root: PathBuf,
    /// Directory the site is served from; locators are relative to it.
    /// Defaults to the parent of `root`.
    #[serde(default)]
    pub site_root: Option<PathBuf>,
    #[serde(default = "default_include_globs")]
    pub include_globs: Vec<String>,
    #[serde(default)]
    pub exclude_globs: Vec<String>,
    #[serde(default)]
    pub follow_symlinks: bool,
}

impl FilesystemSourceConfig {
    pub fn new(root: PathBuf) -> Self {
        Self {
            root,
            site_root: None,
            include_globs: default_include_globs(),
            exclude_globs: Vec::new(),
            follow_symlinks: false,
        }
    }

    pub fn effective_site_root(&self) -> PathBuf {
        match &self.site_root {
            Some(p) => p.clone(),
            None => self
                .root
                .parent()
                .map(Path::to_path_buf)
                .unwrap_or_else(|| self.root.clone()),
        }
    }
}

fn default_include_globs() -> Vec<String> {
    vec!["**/*.pdf".to_string()]
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum DriveAuth {
    /// Credential is sent as the `key` query parameter.
    #[default]
    ApiKey,
    /// Credential is sent as an `Authorization: Bearer` header.
    BearerToken,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DriveSourceConfig {
    pub root_folder_id: String,
    #[serde(default = "default_credential_env")]
    pub credential_env: String,
    #[serde(default)]
    pub auth: DriveAuth,
    #[serde(default = "default_api_base")]
    pub api_base: String,
    #[serde(default = "default_page_size")]
    pub page_size: u32,
    /// Download each PDF to fingerprint it. Off by default: listings are
    /// metadata-only and records carry no fingerprint.
    #[serde(default)]
    pub download_content: bool,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_credential_env() -> String {
    "COA_DRIVE_CREDENTIAL".to_string()
}
fn default_api_base() -> String {
    "https://www.googleapis.com/drive/v3".to_string()
}
fn default_page_size() -> u32 {
    1000
}
fn default_max_retries() -> u32 {
    3
}
fn default_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct QueryConfig {
    /// Directory or `http(s)://` base URL holding `manifest.json`.
    /// Defaults to `output.dir`.
    #[serde(default)]
    pub index_location: Option<String>,
    #[serde(default)]
    pub default_limit: Option<usize>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:7340".to_string()
}

impl Config {
    /// Built-in defaults, used when no config file exists.
    pub fn minimal() -> Self {
        Self::default()
    }

    /// Where the query side reads the index from.
    pub fn index_location(&self) -> String {
        self.query
            .index_location
            .clone()
            .unwrap_or_else(|| self.output.dir.display().to_string())
    }

    /// Apply `FILES_DIR`, `MANIFEST_DIR` and `DRIVE_FOLDER_ID`.
    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(dir) = lookup("FILES_DIR").filter(|v| !v.is_empty()) {
            match self.sources.filesystem.as_mut() {
                Some(fs) => fs.root = PathBuf::from(dir),
                None => {
                    self.sources.filesystem = Some(FilesystemSourceConfig::new(PathBuf::from(dir)))
                }
            }
        }
        if let Some(dir) = lookup("MANIFEST_DIR").filter(|v| !v.is_empty()) {
            self.output.dir = PathBuf::from(dir);
        }
        if let Some(id) = lookup("DRIVE_FOLDER_ID").filter(|v| !v.is_empty()) {
            match self.sources.drive.as_mut() {
                Some(drive) => drive.root_folder_id = id,
                None => {
                    self.sources.drive = Some(DriveSourceConfig {
                        root_folder_id: id,
                        credential_env: default_credential_env(),
                        auth: DriveAuth::default(),
                        api_base: default_api_base(),
                        page_size: default_page_size(),
                        download_content: false,
                        max_retries: default_max_retries(),
                        timeout_secs: default_timeout_secs(),
                    })
                }
            }
        }
    }

    pub fn validate(&self) -> Result<()> {
        match self.sources.default.as_str() {
            "filesystem" | "drive" => {}
            other => bail!(
                "Unknown default source: '{}'. Must be filesystem or drive.",
                other
            ),
        }

        if let Some(fs) = &self.sources.filesystem {
            if fs.include_globs.is_empty() {
                bail!("sources.filesystem.include_globs must not be empty");
            }
        }

        if let Some(drive) = &self.sources.drive {
            if drive.root_folder_id.trim().is_empty() {
                bail!("sources.drive.root_folder_id must not be empty");
            }
            if !(1..=1000).contains(&drive.page_size) {
                bail!("sources.drive.page_size must be in [1, 1000]");
            }
        }

        Ok(())
    }
}

/// Load configuration from `path`, falling back to [`Config::minimal`]
/// when the file is absent and `required` is false. Environment
/// overrides are applied last.
pub fn load_config(path: &Path, required: bool) -> Result<Config> {
    let mut config = if path.exists() || required {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        parse_config(&content)?
    } else {
        Config::minimal()
    };

    config.apply_env_overrides(|key| std::env::var(key).ok());
    config.validate()?;
    Ok(config)
}

pub fn parse_config(content: &str) -> Result<Config> {
    toml::from_str(content).with_context(|| "Failed to parse config file")
}
