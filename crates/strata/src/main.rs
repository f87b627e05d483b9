//! `strata` — version datasets in blob storage through a colocated manifest.
//!
//! # Usage
//!
//! ```text
//! strata init -d sales-2026                # create dataset + default manifest
//! strata init -d sales-2026 -f MANIFEST.yaml
//! strata new -d sales-2026                 # mint a version identifier
//! strata add -d sales-2026 -l ./data       # upload under the latest version
//! strata versions -d sales-2026            # all identifiers, newest first
//! strata latest -d sales-2026
//! strata overwrite -d sales-2026 -v 1700000000 -l ./data
//! strata delete -d sales-2026 -v 1700000000
//! ```

mod config;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use strata_engine::{EngineError, ErrorClass, InitOutcome, VersioningEngine};
use tracing::info;

use config::CliConfig;

/// Unexpected failures (config loading, backend construction).
const EXIT_UNEXPECTED: u8 = 1;
/// Bad input: malformed manifest, dataset already initialized, missing paths.
const EXIT_VALIDATION: u8 = 2;
/// Commands that do not apply to the dataset's current state.
const EXIT_LOGIC: u8 = 3;
/// Backend failures: unreachable store, exhausted write conflicts.
const EXIT_BACKEND: u8 = 4;

#[derive(Parser)]
#[command(name = "strata", version, about = "Dataset versioning over blob storage")]
struct Cli {
    /// Path to TOML config file (default: ~/.strata.toml when present).
    #[arg(short, long, global = true, env = "STRATA_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a dataset root and its initial manifest.
    Init {
        /// Dataset root in the backend.
        #[arg(short = 'd', long = "dest")]
        destination: String,

        /// Local manifest to validate and upload instead of the default.
        #[arg(short = 'f', long = "manifest")]
        manifest: Option<PathBuf>,
    },

    /// Mint a new version identifier under the dataset.
    New {
        /// Dataset root in the backend.
        #[arg(short = 'd', long = "dest")]
        destination: String,
    },

    /// Upload a local file or directory under the latest version.
    Add {
        /// Dataset root in the backend.
        #[arg(short = 'd', long = "dest")]
        destination: String,

        /// Local file or directory to upload.
        #[arg(short = 'l', long = "local")]
        local: PathBuf,
    },

    /// Print all version identifiers, newest first.
    Versions {
        /// Dataset root in the backend.
        #[arg(short = 'd', long = "dest")]
        destination: String,
    },

    /// Print the newest version identifier.
    Latest {
        /// Dataset root in the backend.
        #[arg(short = 'd', long = "dest")]
        destination: String,
    },

    /// Replace a version's contents wholesale.
    Overwrite {
        /// Dataset root in the backend.
        #[arg(short = 'd', long = "dest")]
        destination: String,

        /// Version identifier to overwrite.
        #[arg(short = 'v', long)]
        version: String,

        /// Local file or directory to upload.
        #[arg(short = 'l', long = "local")]
        local: PathBuf,
    },

    /// Remove a version's objects and its manifest entry.
    Delete {
        /// Dataset root in the backend.
        #[arg(short = 'd', long = "dest")]
        destination: String,

        /// Version identifier to delete.
        #[arg(short = 'v', long)]
        version: String,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match CliConfig::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("Error: {err:#}");
            return ExitCode::from(EXIT_UNEXPECTED);
        }
    };
    setup_tracing(&config.log.level);

    let backend = match config.build_backend() {
        Ok(backend) => backend,
        Err(err) => {
            eprintln!("Error: {err:#}");
            return ExitCode::from(EXIT_VALIDATION);
        }
    };
    let engine = VersioningEngine::new(backend, config.manifest_filename());

    match run(&engine, cli.command).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("Error: {err}");
            ExitCode::from(match err.class() {
                ErrorClass::Validation => EXIT_VALIDATION,
                ErrorClass::Logic => EXIT_LOGIC,
                ErrorClass::Backend => EXIT_BACKEND,
            })
        }
    }
}

async fn run(engine: &VersioningEngine, command: Commands) -> Result<(), EngineError> {
    match command {
        Commands::Init {
            destination,
            manifest,
        } => {
            match engine.init(&destination, manifest.as_deref()).await? {
                InitOutcome::Created { manifest } => {
                    // Leave a local copy next to the caller for editing
                    // before the first add.
                    let local = PathBuf::from(engine.manifest_filename());
                    let yaml = manifest.to_yaml()?;
                    std::fs::write(&local, &yaml)?;
                    info!(path = %local.display(), "saved local manifest copy");
                    println!("Initialized {destination} as {}", manifest.name);
                    println!("---\n{yaml}");
                }
                InitOutcome::Uploaded { name } => {
                    println!("Initialized {destination} as {name}");
                }
            }
            Ok(())
        }
        Commands::New { destination } => {
            let version = engine.new_version(&destination).await?;
            println!("{version}");
            Ok(())
        }
        Commands::Add { destination, local } => {
            let report = engine.add(&destination, &local).await?;
            println!("{} {}", report.basename, report.hash);
            Ok(())
        }
        Commands::Versions { destination } => {
            let versions = engine.versions(&destination).await?;
            if versions.is_empty() {
                println!("No versions found at {destination}");
            } else {
                for version in versions {
                    println!("{version}");
                }
            }
            Ok(())
        }
        Commands::Latest { destination } => {
            let version = engine.latest(&destination).await?;
            println!("{version}");
            Ok(())
        }
        Commands::Overwrite {
            destination,
            version,
            local,
        } => {
            let report = engine.overwrite(&destination, &version, &local).await?;
            println!("{} {}", report.basename, report.hash);
            Ok(())
        }
        Commands::Delete {
            destination,
            version,
        } => {
            engine.delete(&destination, &version).await?;
            println!("Deleted version {version} from {destination}");
            Ok(())
        }
    }
}

/// Initialize the `tracing` subscriber with the given level filter.
///
/// Respects `RUST_LOG` if set, otherwise uses the config value.
fn setup_tracing(level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}
