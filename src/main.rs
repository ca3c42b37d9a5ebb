//! # COA Search CLI (`coa`)
//!
//! ## Usage
//!
//! ```bash
//! coa --config ./coa.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `coa build [source]` | Rebuild the manifest from a source (filesystem, drive) |
//! | `coa search "<text>"` | Query the published manifest |
//! | `coa classify <name>...` | Show how file names are parsed |
//! | `coa sources` | List sources and their health |
//! | `coa serve` | Start the search HTTP API |
//!
//! ## Examples
//!
//! ```bash
//! # Build from docs/files into docs/manifest (no config file needed)
//! coa build
//!
//! # Build from the remote folder
//! COA_DRIVE_CREDENTIAL=... DRIVE_FOLDER_ID=1AbC coa build drive
//!
//! # Search a published site
//! coa search "A100" --product MB-X7 --index https://example.org/manifest
//! ```

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use coa_search::progress::ProgressMode;
use coa_search::search::SearchArgs;
use coa_search::{builder, classify, config, search, server, sources};

const DEFAULT_CONFIG: &str = "./coa.toml";

#[derive(Parser)]
#[command(
    name = "coa",
    about = "Build and search a manifest of Certificate of Analysis PDFs",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Defaults to `./coa.toml`; built-in defaults apply when that file
    /// does not exist. A path given explicitly must exist.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// More log output (-v debug, -vv trace). `COA_LOG` overrides.
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Only log warnings and errors.
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Rebuild the manifest from a document source.
    ///
    /// Lists every PDF, classifies its file name, and writes year shards,
    /// the index and the failure ledger into `[output].dir`. Every build is
    /// a full rebuild; nothing is written if the source cannot be listed.
    Build {
        /// Source name (`filesystem` or `drive`). Defaults to `[sources].default`.
        source: Option<String>,

        /// Assemble the manifest and print counts without writing files.
        #[arg(long)]
        dry_run: bool,

        /// Progress output on stderr. Defaults to human when stderr is a TTY.
        #[arg(long, value_enum)]
        progress: Option<ProgressMode>,
    },

    /// Search the published manifest.
    Search {
        /// Lot, legacy key (`NNNNNN-NNNNNN`) or file name fragment. Empty matches all.
        #[arg(default_value = "")]
        query: String,

        /// Only return records of this product.
        #[arg(long)]
        product: Option<String>,

        /// Maximum number of results to print.
        #[arg(long)]
        limit: Option<usize>,

        /// Print `{total, items}` as JSON.
        #[arg(long)]
        json: bool,

        /// Manifest directory or base URL. Defaults to `[query].index_location`.
        #[arg(long)]
        index: Option<String>,
    },

    /// Classify file names without building.
    Classify {
        #[arg(required = true)]
        names: Vec<String>,

        #[arg(long)]
        json: bool,
    },

    /// List configured sources and their health.
    Sources,

    /// Start the search HTTP API on `[server].bind`.
    Serve,
}

fn init_tracing(verbose: u8, quiet: bool) {
    let filter = if let Ok(env) = std::env::var("COA_LOG") {
        EnvFilter::new(env)
    } else if quiet {
        EnvFilter::new("warn")
    } else {
        match verbose {
            0 => EnvFilter::new("info"),
            1 => EnvFilter::new("debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .without_time()
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.quiet);

    // Classification needs no configuration.
    if let Commands::Classify { names, json } = &cli.command {
        return classify::run_classify(names, *json);
    }

    let cfg = match &cli.config {
        Some(path) => config::load_config(path, true)?,
        None => config::load_config(&PathBuf::from(DEFAULT_CONFIG), false)?,
    };

    match cli.command {
        Commands::Build {
            source,
            dry_run,
            progress,
        } => {
            let progress = progress.unwrap_or_else(ProgressMode::default_for_tty);
            builder::run_build(&cfg, source.as_deref(), dry_run, progress).await?;
        }
        Commands::Search {
            query,
            product,
            limit,
            json,
            index,
        } => {
            search::run_search(
                &cfg,
                SearchArgs {
                    text: &query,
                    product: product.as_deref(),
                    limit,
                    json,
                    index: index.as_deref(),
                },
            )
            .await?;
        }
        Commands::Sources => {
            sources::list_sources(&cfg)?;
        }
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
        Commands::Classify { .. } => unreachable!("handled before config loading"),
    }

    Ok(())
}
