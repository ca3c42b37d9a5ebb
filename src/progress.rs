//! Build progress reporting.
//!
//! Reports what `coa build` is doing so users can follow long runs over
//! large archives. Progress goes to **stderr** so stdout stays parseable.

use std::io::Write;

/// A single progress event for a build.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BuildProgressEvent {
    /// Source is listing documents. Total unknown.
    Enumerating { source: String },
    /// n documents classified and fingerprinted out of total.
    Classifying { source: String, n: u64, total: u64 },
    /// Manifest files are being written.
    Writing { source: String, shards: u64 },
}

/// Reports build progress. Implementations write to stderr (human or JSON).
pub trait BuildProgressReporter: Send + Sync {
    fn report(&self, event: BuildProgressEvent);
}

/// Human-friendly progress on stderr: "build filesystem  classifying  1,234 / 5,000 documents".
pub struct StderrProgress;

impl BuildProgressReporter for StderrProgress {
    fn report(&self, event: BuildProgressEvent) {
        let line = match &event {
            BuildProgressEvent::Enumerating { source } => {
                format!("build {}  enumerating...\n", source)
            }
            BuildProgressEvent::Classifying { source, n, total } => format!(
                "build {}  classifying  {} / {} documents\n",
                source,
                format_number(*n),
                format_number(*total)
            ),
            BuildProgressEvent::Writing { source, shards } => {
                format!("build {}  writing  {} shards\n", source, format_number(*shards))
            }
        };
        let _ = std::io::stderr().lock().write_all(line.as_bytes());
        let _ = std::io::stderr().lock().flush();
    }
}

/// Machine-readable progress: one JSON object per line on stderr.
pub struct JsonProgress;

impl BuildProgressReporter for JsonProgress {
    fn report(&self, event: BuildProgressEvent) {
        let obj = match &event {
            BuildProgressEvent::Enumerating { source } => serde_json::json!({
                "event": "progress",
                "source": source,
                "phase": "enumerating"
            }),
            BuildProgressEvent::Classifying { source, n, total } => serde_json::json!({
                "event": "progress",
                "source": source,
                "phase": "classifying",
                "n": n,
                "total": total
            }),
            BuildProgressEvent::Writing { source, shards } => serde_json::json!({
                "event": "progress",
                "source": source,
                "phase": "writing",
                "shards": shards
            }),
        };
        if let Ok(line) = serde_json::to_string(&obj) {
            let _ = writeln!(std::io::stderr().lock(), "{}", line);
            let _ = std::io::stderr().lock().flush();
        }
    }
}

pub struct NoProgress;

impl BuildProgressReporter for NoProgress {
    fn report(&self, _event: BuildProgressEvent) {}
}

fn format_number(n: u64) -> String {
    let s = n.to_string();
    let mut result = String::with_capacity(s.len() + (s.len() - 1) / 3);
    let chars: Vec<char> = s.chars().rev().collect();
    for (i, c) in chars.iter().enumerate() {
        if i > 0 && i % 3 == 0 {
            result.push(',');
        }
        result.push(*c);
    }
    result.chars().rev().collect()
}

/// Progress mode for the CLI: off, human (stderr), or JSON (stderr).
#[derive(Clone, Copy, Debug, Eq, PartialEq, clap::ValueEnum)]
pub enum ProgressMode {
    Off,
    Human,
    Json,
}

impl ProgressMode {
    /// Human progress when stderr is a TTY, otherwise off.
    pub fn default_for_tty() -> Self {
        if atty::is(atty::Stream::Stderr) {
            ProgressMode::Human
        } else {
            ProgressMode::Off
        }
    }

    pub fn reporter(&self) -> Box<dyn BuildProgressReporter> {
        match self {
            ProgressMode::Off => Box::new(NoProgress),
            ProgressMode::Human => Box::new(StderrProgress),
            ProgressMode::Json => Box::new(JsonProgress),
        }
    }
}
