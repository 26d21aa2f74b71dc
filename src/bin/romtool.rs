//! romtool - split and merge byte-interleaved ROM images
//!
//! A 16-bit bus built from 8-bit parts stores even bytes in one chip and odd
//! bytes in the other. `split` distributes a dump across the chip images,
//! `merge` rebuilds the dump from them.

use clap::{Parser, Subcommand};
use fwdump_core::cli::{init_logging, CliResult};
use fwdump_core::utils::interleave::{merge_files, split_file};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::info;

/// ROM interleave tool
#[derive(Parser, Debug)]
#[command(name = "romtool", version, about, long_about = None)]
struct Cli {
    /// More log output
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Split INPUT into one output per part, byte by byte
    Split {
        /// Interleaved image
        input: PathBuf,
        /// Part images, in byte order
        #[arg(required = true)]
        outputs: Vec<PathBuf>,
    },

    /// Interleave equal-length INPUTS into OUTPUT
    Merge {
        /// Interleaved image to write
        output: PathBuf,
        /// Part images, in byte order
        #[arg(required = true)]
        inputs: Vec<PathBuf>,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose, false);

    CliResult::from(run(cli.command)).report()
}

fn run(command: Commands) -> anyhow::Result<()> {
    match command {
        Commands::Split { input, outputs } => {
            split_file(&input, &outputs)?;
            info!("Split {} into {} parts", input.display(), outputs.len());
        }
        Commands::Merge { output, inputs } => {
            merge_files(&output, &inputs)?;
            info!("Merged {} parts into {}", inputs.len(), output.display());
        }
    }
    Ok(())
}
