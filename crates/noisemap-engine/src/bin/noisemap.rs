//! Noise map CLI
//!
//! # Commands
//!
//! - `run`: fuse attenuation and emission into the output table
//! - `check`: validate configuration and input datasets without writing
//! - `genconf`: write an example configuration file
//!
//! Exit code 1 on any error.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};

use noisemap_core::observe::init_logging;
use noisemap_core::{NoiseMapConfig, NoiseMapError, NoiseMapResult};
use noisemap_engine::{FusionEngine, FusionIndex, InputStore, SqliteStore};

/// Noise map fusion from an attenuation matrix and time-varying emission
#[derive(Parser)]
#[command(name = "noisemap")]
#[command(version)]
#[command(about = "Receiver x time-bin noise levels from attenuation and emission tables")]
#[command(propagate_version = true)]
struct Cli {
    /// Verbosity level (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compute the noise map and replace the output table
    Run {
        #[command(flatten)]
        overrides: Overrides,

        /// Whole run in one output transaction
        #[arg(long)]
        atomic: bool,

        /// Print the run summary as JSON
        #[arg(long)]
        json: bool,
    },
    /// Validate configuration and inputs without writing output
    Check {
        #[command(flatten)]
        overrides: Overrides,
    },
    /// Write an example configuration file
    Genconf {
        /// Destination path; must not exist
        path: PathBuf,
    },
}

#[derive(Args)]
struct Overrides {
    /// Configuration file (default: search path)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// SQLite database holding every dataset
    #[arg(long)]
    database: Option<PathBuf>,

    /// Time bin size in seconds
    #[arg(long)]
    bin_size: Option<i64>,

    /// First time bin in seconds
    #[arg(long)]
    bin_min: Option<i64>,

    /// End of the time range in seconds, exclusive
    #[arg(long)]
    bin_max: Option<i64>,

    /// Worker threads (0 = one per core, 1 = sequential)
    #[arg(short, long)]
    threads: Option<usize>,
}

impl Overrides {
    fn load(&self) -> NoiseMapResult<NoiseMapConfig> {
        let mut config = match &self.config {
            Some(path) => NoiseMapConfig::load_from(path)?,
            None => NoiseMapConfig::load()?,
        };

        if let Some(database) = &self.database {
            config.datasets.database = database.clone();
        }
        if let Some(bin_size) = self.bin_size {
            config.grid.bin_size = bin_size;
        }
        if let Some(bin_min) = self.bin_min {
            config.grid.bin_min = bin_min;
        }
        if let Some(bin_max) = self.bin_max {
            config.grid.bin_max = bin_max;
        }
        if let Some(threads) = self.threads {
            config.engine.threads = threads;
        }

        config.validate()?;
        Ok(config)
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Run {
            overrides,
            atomic,
            json,
        } => overrides.load().and_then(|mut config| {
            config.engine.atomic_output |= atomic;
            start_logging(&config, cli.verbose);
            run(&config, json)
        }),
        Commands::Check { overrides } => overrides.load().and_then(|config| {
            start_logging(&config, cli.verbose);
            check(&config)
        }),
        Commands::Genconf { path } => genconf(&path),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "noisemap failed");
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn start_logging(config: &NoiseMapConfig, verbose: u8) {
    let mut logging = config.logging.clone();
    logging.level = logging.level.raised_by(verbose);
    init_logging(&logging);
}

fn run(config: &NoiseMapConfig, json: bool) -> NoiseMapResult<()> {
    let engine = FusionEngine::from_config(config)?;
    let store = SqliteStore::open(&config.datasets)?;
    store.check_inputs()?;
    store.ensure_indexes()?;

    let mut sink = store.sink(config.engine.atomic_output)?;
    let summary = engine.run(&store, &mut sink)?;

    if json {
        let out = serde_json::to_string_pretty(&summary)
            .map_err(|e| NoiseMapError::Store(format!("summary serialization: {}", e)))?;
        println!("{}", out);
    } else {
        println!(
            "{} receivers, {} rows ({} bins each) written to {} in {:.2}s",
            summary.receivers,
            summary.rows,
            summary.bins_per_receiver,
            config.datasets.output,
            summary.elapsed.as_secs_f64()
        );
        if summary.stats.silent_receivers > 0 {
            println!(
                "{} receivers without attenuation records (silence)",
                summary.stats.silent_receivers
            );
        }
    }
    Ok(())
}

fn check(config: &NoiseMapConfig) -> NoiseMapResult<()> {
    let grid = config.time_grid()?;
    let store = SqliteStore::open(&config.datasets)?;
    store.check_inputs()?;

    let receivers = store.receivers()?;
    let index = FusionIndex::build(&store, &grid)?;
    println!(
        "{} receivers, {} attenuation records, {} emitting sources, {} bins of {}s",
        receivers.len(),
        index.attenuation.record_count(),
        index.emission.source_count(),
        grid.len(),
        grid.bin_size()
    );
    if index.emission.off_grid_rows() > 0 {
        println!(
            "{} emission rows outside the time grid will be ignored",
            index.emission.off_grid_rows()
        );
    }
    Ok(())
}

fn genconf(path: &Path) -> NoiseMapResult<()> {
    if path.exists() {
        return Err(NoiseMapError::Io(std::io::Error::new(
            std::io::ErrorKind::AlreadyExists,
            format!("{} already exists", path.display()),
        )));
    }
    std::fs::write(path, NoiseMapConfig::example_yaml())?;
    println!("Example configuration written to {}", path.display());
    Ok(())
}
