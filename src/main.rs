use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

use wildfire::cli::commands::{self, parse_position, SimulateOptions};
use wildfire::config::simulation::SimulationConfig;
use wildfire::grid::GridPosition;

#[derive(Parser)]
#[command(name = "wildfire")]
#[command(about = "A cellular-automaton wildfire spread simulator driven by terrain, fuel and weather")]
#[command(version)]
struct Cli {
    /// Path to the configuration file (defaults apply if it does not exist)
    #[arg(short, long, default_value = "config.toml")]
    config: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build a grid, ignite it and run the fire to completion
    Simulate {
        /// Path to the terrain description
        #[arg(short, long, default_value = "terrain.toml")]
        terrain: String,

        /// Ignition point as ROW,COL (repeatable; overrides the terrain file)
        #[arg(long, value_parser = parse_position)]
        ignite: Vec<GridPosition>,

        /// Override the configured iteration cap
        #[arg(long)]
        max_iterations: Option<u64>,

        /// Write one JSON line per tick to this file
        #[arg(long)]
        trace: Option<String>,

        /// Do not save a run snapshot
        #[arg(long)]
        no_snapshot: bool,
    },

    /// Inspect a cell or the burn map of a stored run
    Inspect {
        /// Snapshot file (defaults to the latest valid one)
        #[arg(short, long)]
        snapshot: Option<String>,

        /// Cell to inspect as ROW,COL
        #[arg(long, value_parser = parse_position, conflicts_with = "map")]
        cell: Option<GridPosition>,

        /// Print the burn map
        #[arg(long)]
        map: bool,
    },

    /// Manage run snapshots
    Snapshots {
        #[command(subcommand)]
        action: SnapshotAction,
    },
}

#[derive(Subcommand)]
enum SnapshotAction {
    /// List available snapshots
    List {
        /// Snapshot directory (defaults to the configured one)
        #[arg(short, long)]
        dir: Option<String>,
    },
}

fn init_tracing(config: &SimulationConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log_level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    let _ = if config.log_format == "json" {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
}

fn main() {
    let cli = Cli::parse();

    let config = match SimulationConfig::from_file_or_default(Path::new(&cli.config)) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error loading config: {}", e);
            std::process::exit(1);
        }
    };
    init_tracing(&config);

    let result = match cli.command {
        Commands::Simulate {
            terrain,
            ignite,
            max_iterations,
            trace,
            no_snapshot,
        } => {
            let options = SimulateOptions {
                terrain: PathBuf::from(terrain),
                ignite,
                max_iterations,
                trace: trace.map(PathBuf::from),
                no_snapshot,
            };
            commands::simulate(&config, &options)
        }

        Commands::Inspect {
            snapshot,
            cell,
            map,
        } => commands::inspect(&config, snapshot.as_deref().map(Path::new), cell, map),

        Commands::Snapshots { action } => match action {
            SnapshotAction::List { dir } => {
                let dir = dir.unwrap_or_else(|| config.snapshot_directory.clone());
                commands::list_snapshots(Path::new(&dir))
            }
        },
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
