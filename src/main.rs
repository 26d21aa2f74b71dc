//! fwdump - firmware extraction for the diagnostic serial console
//!
//! Connects to the instrument on the given serial device, dumps every module
//! slot and every ROM range of the dump plan, and writes the images below the
//! output directory.

use anyhow::Context;
use clap::Parser;
use fwdump_core::cli::{init_logging, CliResult};
use fwdump_core::core::transport::list_ports;
use fwdump_core::{AppConfig, DumpOutcome, ModuleOutcome, Runner, SerialConfig, SerialTransport, TransportTrait};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::info;

/// Dump module and ROM images from the instrument
#[derive(Parser, Debug)]
#[command(name = "fwdump", version, about, long_about = None)]
struct Cli {
    /// Serial device (e.g. /dev/ttyUSB0, COM3)
    #[arg(required_unless_present_any = ["list_ports", "write_config"])]
    device: Option<String>,

    /// Config file (default: per-user config.toml if present)
    #[arg(short, long, env = "FWDUMP_CONFIG")]
    config: Option<PathBuf>,

    /// Directory the dump directories are created in
    #[arg(short, long)]
    output_dir: Option<PathBuf>,

    /// Keep staging files after a complete dump
    #[arg(long)]
    keep_staging: bool,

    /// Do not dump module slots
    #[arg(long)]
    skip_modules: bool,

    /// Do not dump ROM ranges
    #[arg(long)]
    skip_roms: bool,

    /// List available serial ports and exit
    #[arg(long)]
    list_ports: bool,

    /// Save the effective settings as the per-user config file and exit
    #[arg(long)]
    write_config: bool,

    /// More log output (repeat for trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Warnings and errors only
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.quiet);

    CliResult::from(run(cli)).report()
}

fn run(cli: Cli) -> anyhow::Result<()> {
    if cli.list_ports {
        for port in list_ports()? {
            println!("{}", port.port_name);
        }
        return Ok(());
    }

    let mut config = AppConfig::load(cli.config.as_deref()).context("loading config")?;
    if let Some(dir) = cli.output_dir {
        config.output.root = dir;
    }
    if cli.keep_staging {
        config.output.keep_staging = true;
    }
    if cli.skip_modules {
        config.modules.slots.clear();
    }
    if cli.skip_roms {
        config.roms.clear();
    }

    if cli.write_config {
        let path = config.save().context("saving config")?;
        println!("{}", path.display());
        return Ok(());
    }

    let device = cli.device.context("no serial device given")?;
    let baud = config.serial.main_baud_rates.first().copied().unwrap_or(9600);
    let transport = SerialTransport::open(SerialConfig::new(&device, baud))
        .with_context(|| format!("opening {}", device))?;

    info!("fwdump v{} on {}", fwdump_core::VERSION, transport.connection_info());
    let mut runner = Runner::new(transport, config)?;
    let summary = runner.run()?;

    for (unit, outcome) in &summary.modules {
        match outcome {
            ModuleOutcome::Empty => info!("Slot {}: empty", unit),
            ModuleOutcome::Saved(path) => info!("Slot {}: {}", unit, path.display()),
        }
    }
    for (name, outcome) in &summary.roms {
        match outcome {
            DumpOutcome::Skipped => info!("{}: already present", name),
            DumpOutcome::Complete { bytes } => info!("{}: {:#x} bytes", name, bytes),
            DumpOutcome::Incomplete { have, want } => {
                info!("{}: {:#x} of {:#x} bytes, rerun to resume", name, have, want)
            }
        }
    }

    if !summary.is_complete() {
        anyhow::bail!("some ROM ranges are incomplete; rerun to resume");
    }
    Ok(())
}
