//! `coa sources`: configured sources and their health.

use anyhow::Result;

use crate::config::Config;

/// One row of `coa sources`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceStatus {
    pub name: &'static str,
    pub status: String,
    pub healthy: bool,
}

/// Health of each source kind. `lookup` reads environment variables.
pub fn source_statuses<F>(config: &Config, lookup: F) -> Vec<SourceStatus>
where
    F: Fn(&str) -> Option<String>,
{
    let filesystem = match &config.sources.filesystem {
        Some(fs) if fs.root.is_dir() => ("OK".to_string(), true),
        Some(_) => ("NOT CONFIGURED (root does not exist)".to_string(), false),
        None => ("NOT CONFIGURED".to_string(), false),
    };

    let drive = match &config.sources.drive {
        Some(drive) if lookup(&drive.credential_env).is_some_and(|v| !v.is_empty()) => {
            ("OK".to_string(), true)
        }
        Some(drive) => (
            format!("NOT CONFIGURED ({} not set)", drive.credential_env),
            false,
        ),
        None => ("NOT CONFIGURED".to_string(), false),
    };

    vec![
        SourceStatus {
            name: "filesystem",
            status: filesystem.0,
            healthy: filesystem.1,
        },
        SourceStatus {
            name: "drive",
            status: drive.0,
            healthy: drive.1,
        },
    ]
}

pub fn list_sources(config: &Config) -> Result<()> {
    println!("{:<12} {:<40} HEALTHY", "SOURCE", "STATUS");
    for s in source_statuses(config, |key| std::env::var(key).ok()) {
        let marker = if s.name == config.sources.default { "*" } else { "" };
        println!(
            "{:<12} {:<40} {}",
            format!("{}{}", s.name, marker),
            s.status,
            s.healthy
        );
    }
    Ok(())
}
