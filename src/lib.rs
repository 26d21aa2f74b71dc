//! # fwdump Core Library
//!
//! Drives the text-based diagnostic menus of a legacy test instrument over a
//! serial link and extracts its firmware:
//! - Baud rate negotiation and identity queries
//! - Menu navigation over a live terminal stream
//! - Resumable memory dumps through the hardware debugger screen
//! - Per-slot module image dumps
//!
//! ## Features
//!
//! - Transcript log of every screen line received
//! - Scripted instrument simulator for offline runs
//! - Module image codec (big/little endian and text forms)
//! - Byte interleave split/merge for ROM pairs
//!
//! ## Example
//!
//! ```rust,no_run
//! use fwdump_core::{AppConfig, Runner, SerialConfig, SerialTransport};
//!
//! fn main() -> anyhow::Result<()> {
//!     let config = AppConfig::default();
//!     let transport = SerialTransport::open(SerialConfig::new("/dev/ttyUSB0", 9600))?;
//!     let mut runner = Runner::new(transport, config)?;
//!     runner.run()?;
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions)]

pub mod cli;
pub mod config;
pub mod core;
pub mod utils;

// Re-exports for convenience
pub use crate::cli::{CliResult, ExitCodes};
pub use crate::config::{
    AppConfig, ConfigError, LineEnding, ModuleSettings, OutputSettings, RomImage, SerialSettings, TimingSettings,
};
pub use crate::core::codec::{create_codec, ByteOrder, CodecError, ImageCodec, ModuleFormat, ModuleImage};
pub use crate::core::dump::{DumpOutcome, MemoryDump, MemoryDumper, ModuleDumper, ModuleOutcome, ModuleSlot};
pub use crate::core::error::{InstrumentError, Result};
pub use crate::core::matcher::{MatchCursor, Matcher};
pub use crate::core::navigator::{Navigator, Pacing, Screen, Step, Transition};
pub use crate::core::runner::{RunSummary, Runner};
pub use crate::core::session::{ConnectionManager, DeviceSession};
pub use crate::core::simulator::{MatchCondition, ResponseRule, VirtualInstrument};
pub use crate::core::transcript::Transcript;
pub use crate::core::transport::{SerialConfig, SerialTransport, TransportError, TransportTrait};
pub use crate::utils::interleave::{merge, split, InterleaveError};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
