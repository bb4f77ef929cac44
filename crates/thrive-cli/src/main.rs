//! Command-line entry point for building and inspecting Thriving Index runs.

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use thrive_config::{Config, Credentials, DEFAULT_CONFIG_PATH};
use thrive_engine::{PipelineRunner, RunEvent};
use thrive_sources::SourceClient;

#[derive(Parser)]
#[command(name = "thrive", version, about = "Build county-statistics indices for multi-county regions")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch, standardize, and score every configured measure for one year
    Run {
        /// Data year to build
        #[arg(short, long)]
        year: i32,

        /// Path to the run configuration file
        #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
        config: PathBuf,

        /// Use the deterministic offline generator regardless of config
        #[arg(long)]
        offline: bool,

        /// Override the configured artifact directory
        #[arg(short, long)]
        out_dir: Option<PathBuf>,
    },

    /// Check a configuration file without fetching anything
    Validate {
        /// Path to the run configuration file
        #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
        config: PathBuf,
    },

    /// List the configured measures and where they come from
    Measures {
        /// Path to the run configuration file
        #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
        config: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match cli.command {
        Commands::Run {
            year,
            config,
            offline,
            out_dir,
        } => {
            cmd_run(year, &config, offline, out_dir).await?;
        }
        Commands::Validate { config } => {
            cmd_validate(&config)?;
        }
        Commands::Measures { config } => {
            cmd_measures(&config)?;
        }
    }

    Ok(())
}

// ---------------------------------------------------------------------------
// Command: run
// ---------------------------------------------------------------------------

async fn cmd_run(
    year: i32,
    config_path: &Path,
    offline: bool,
    out_dir: Option<PathBuf>,
) -> anyhow::Result<()> {
    let mut config = Config::load(config_path)?;
    if offline {
        config.settings.offline = true;
    }
    if let Some(dir) = out_dir {
        config.settings.output_dir = dir;
    }

    let credentials = if config.settings.offline {
        Credentials::default()
    } else {
        Credentials::from_env()
    };
    let client = SourceClient::from_config(&config, credentials)?;

    println!("Building Thriving Index for {year}");
    println!("Config: {}", config_path.display());
    println!("Output: {}", config.settings.output_dir.display());
    if config.settings.offline {
        println!("(offline mode -- deterministic synthetic data)");
    }
    println!();

    let runner = PipelineRunner::new(config, client);

    // Stream progress while the run is in flight.
    let mut events = runner.emitter().subscribe();
    let progress = tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            match event {
                RunEvent::FetchCompleted { measure, rows } => {
                    println!("  fetched {measure}: {rows} rows");
                }
                RunEvent::RowsUnmatched { measure, count } => {
                    println!("  {measure}: {count} rows matched no configured county");
                }
                RunEvent::FetchFailed { measure, error } => {
                    println!("  FAILED {measure}: {error}");
                }
                _ => {}
            }
        }
    });

    let result = runner.run(year).await;

    // Dropping the runner closes the event channel so the progress task drains
    // the remaining events and exits on its own.
    drop(runner);
    let _ = progress.await;

    match result {
        Ok(report) => {
            println!();
            println!("Run {} finished in {}ms", report.run_id, report.duration_ms);
            println!("Regions scored: {}", report.regions);
            println!("Measures fetched: {}", report.measures_fetched);
            for (measure, count) in &report.unmatched {
                println!("  unmatched rows for {measure}: {count}");
            }
            for warning in &report.warnings {
                println!("  warning: {warning}");
            }
            println!("Artifacts:");
            for path in &report.artifacts {
                println!("  {}", path.display());
            }
            Ok(())
        }
        Err(e) => {
            eprintln!("Run failed: {e}");
            std::process::exit(1);
        }
    }
}

// ---------------------------------------------------------------------------
// Command: validate
// ---------------------------------------------------------------------------

fn cmd_validate(config_path: &Path) -> anyhow::Result<()> {
    match Config::load(config_path) {
        Ok(config) => {
            println!("Configuration is valid: {}", config_path.display());
            println!("  regions: {}", config.regions.len());
            println!("  counties: {}", config.county_roster().len());
            println!("  measures: {}", config.measures.len());
            if !config.peers.is_empty() {
                println!("  peer groups: explicit table with {} entries", config.peers.len());
            }
            Ok(())
        }
        Err(e) => {
            eprintln!("Configuration invalid: {e}");
            std::process::exit(1);
        }
    }
}

// ---------------------------------------------------------------------------
// Command: measures
// ---------------------------------------------------------------------------

fn cmd_measures(config_path: &Path) -> anyhow::Result<()> {
    let config = Config::load(config_path)?;
    println!("{} measures configured:", config.measures.len());
    for measure in &config.measures {
        println!(
            "  {} [{}] source={} mode={:?} geo={:?}",
            measure.id,
            measure.component,
            measure.source.as_str(),
            measure.mode,
            measure.geo_key
        );
    }
    Ok(())
}
