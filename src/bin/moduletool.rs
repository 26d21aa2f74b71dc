//! moduletool - inspect and repair 128-byte module images
//!
//! Reads an image in big endian, little endian or text form, checks or
//! rewrites its checksum, optionally replaces the serial number, and writes
//! it back out in any of the three forms.

use anyhow::Context;
use clap::Parser;
use fwdump_core::cli::{init_logging, CliResult};
use fwdump_core::core::codec::hexdump;
use fwdump_core::{create_codec, ModuleFormat};
use std::fs;
use std::io::{self, Read, Write};
use std::process::ExitCode;
use tracing::info;

/// Module image converter
#[derive(Parser, Debug)]
#[command(name = "moduletool", version, about, long_about = None)]
struct Cli {
    /// Input format: big (default), little, text
    #[arg(short = 'I', long, value_name = "FMT")]
    input_format: Option<String>,

    /// Read input from FILE ("-" for stdin)
    #[arg(short = 'i', long, value_name = "FILE")]
    input: Option<String>,

    /// Output format: big (default), little, text
    #[arg(short = 'O', long, value_name = "FMT")]
    output_format: Option<String>,

    /// Write output to FILE ("-" for stdout)
    #[arg(short = 'o', long, value_name = "FILE")]
    output: Option<String>,

    /// Change the serial number to SERIAL (7 characters)
    #[arg(short, long)]
    serial: Option<String>,

    /// Calculate a new checksum
    #[arg(short, long)]
    checksum: bool,

    /// Print a hexdump of the image to stderr
    #[arg(short = 'x', long)]
    hexdump: bool,

    /// More log output
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose, false);

    CliResult::from(run(cli)).report()
}

fn parse_format(name: Option<&str>) -> anyhow::Result<ModuleFormat> {
    Ok(name.map(str::parse).transpose()?.unwrap_or_default())
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let input_format = parse_format(cli.input_format.as_deref())?;
    let output_format = parse_format(cli.output_format.as_deref())?;

    let input = cli.input.as_deref().unwrap_or("-");
    let data = if input == "-" {
        let mut data = Vec::new();
        io::stdin().read_to_end(&mut data).context("reading stdin")?;
        data
    } else {
        fs::read(input).with_context(|| format!("reading {}", input))?
    };

    info!("Reading {} data from {}", input_format, describe(input));
    let mut image = create_codec(input_format).decode(&data)?;
    info!("Model {:?}, serial {:?}", image.model(), image.serial());

    if let Some(serial) = cli.serial.as_deref() {
        info!("Setting serial number to {:?}", serial);
        image.set_serial(serial)?;
        info!("Setting checksum to {:#06x}", image.stored_checksum());
    } else if cli.checksum {
        let checksum = image.update_checksum();
        info!("Setting checksum to {:#06x}", checksum);
    } else {
        image.validate()?;
    }

    if cli.hexdump {
        eprint!("{}", hexdump(image.as_bytes(), 16));
    }

    let output = match (cli.output.as_deref(), cli.output_format.is_some()) {
        (Some(output), _) => output,
        (None, true) => "-",
        (None, false) => return Ok(()),
    };

    info!("Writing {} data to {}", output_format, describe(output));
    let encoded = create_codec(output_format).encode(&image);
    if output == "-" {
        let mut stdout = io::stdout().lock();
        stdout.write_all(&encoded)?;
        stdout.flush()?;
    } else {
        fs::write(output, &encoded).with_context(|| format!("writing {}", output))?;
    }

    Ok(())
}

fn describe(path: &str) -> String {
    match path {
        "-" => "stdio".to_string(),
        other => format!("{:?}", other),
    }
}
