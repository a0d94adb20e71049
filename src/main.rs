//! cellgp CLI - stress-test and inspect the genetic programming engine.

// Allow print in the CLI binary
#![allow(clippy::print_stdout, clippy::print_stderr)]

mod cli;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

/// cellgp - typed genetic programming with architecture-altering modules
#[derive(Parser, Debug)]
#[command(name = "cellgp")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Operator configuration file (JSON); defaults apply to missing fields
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log debug output unless RUST_LOG says otherwise
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Available commands
#[derive(Subcommand, Debug)]
enum Commands {
    /// Breed random genomes in parallel and check every invariant
    Stress {
        /// Independent breeding lanes
        #[arg(short, long, default_value = "32")]
        lanes: u64,

        /// Breedings per lane
        #[arg(short, long, default_value = "50")]
        generations: usize,

        /// Arguments of the main program
        #[arg(short, long, default_value = "1")]
        arity: usize,

        /// Random seed (default: random)
        #[arg(short, long)]
        seed: Option<u64>,

        /// Worker threads (default: all cores)
        #[arg(short = 'j', long)]
        threads: Option<usize>,

        /// Output format: text or json
        #[arg(short, long, default_value = "text")]
        format: cli::OutputFormat,

        /// Show a progress bar
        #[arg(short, long)]
        progress: bool,
    },

    /// Print a random genome and run its main program
    Inspect {
        /// Random seed (default: random)
        #[arg(short, long)]
        seed: Option<u64>,

        /// Inputs of the main program, one per argument
        #[arg(num_args = 0.., allow_negative_numbers = true)]
        inputs: Vec<f64>,
    },
}

fn main() -> ExitCode {
    let args = Args::parse();
    init_tracing(args.verbose);

    let result = cli::load_config(args.config.as_deref()).and_then(|config| match args.command {
        Commands::Stress {
            lanes,
            generations,
            arity,
            seed,
            threads,
            format,
            progress,
        } => cli::stress::execute(
            config,
            &cli::stress::StressOptions {
                lanes,
                generations,
                arity,
                seed,
                threads,
                format,
                progress,
            },
        ),
        Commands::Inspect { seed, inputs } => cli::inspect::execute(config, seed, &inputs),
    });

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "cellgp=debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
