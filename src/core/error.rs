//! Error types for the instrument automation

use super::codec::CodecError;
use super::navigator::Screen;
use super::transport::TransportError;
use crate::utils::interleave::InterleaveError;
use std::time::Duration;
use thiserror::Error;

/// Result alias used throughout the core
pub type Result<T> = std::result::Result<T, InstrumentError>;

/// Instrument automation errors
#[derive(Error, Debug)]
pub enum InstrumentError {
    /// No baud candidate answered, even after hard-exit recovery
    #[error("Failed to connect after {attempts} recovery attempts")]
    ConnectionFailure {
        /// Recovery rounds tried
        attempts: u32,
    },

    /// Expected screen text did not appear in time
    #[error("Timed out after {after:?} waiting for {expected}")]
    Timeout {
        /// Patterns that were being waited for
        expected: String,
        /// Wait budget that elapsed
        after: Duration,
    },

    /// A streamed block skipped ahead of the expected address
    #[error("Lost address sync: expected block at {expected:#010x}, got {actual:#010x}")]
    AddressSync {
        /// Next address the staging file needs
        expected: u32,
        /// Address reported by the instrument
        actual: u32,
    },

    /// Streamed memory block could not be parsed
    #[error("Malformed memory block: {0}")]
    MalformedBlock(String),

    /// Identity reply did not have the expected shape
    #[error("Malformed identity reply: {0}")]
    MalformedIdentity(String),

    /// Module data could not be assembled into an image
    #[error("Malformed module data: {0}")]
    MalformedModule(String),

    /// Module unit outside the physical slots
    #[error("Invalid module unit {0}, expected 1..=4")]
    InvalidUnit(u8),

    /// Dump request that cannot be honoured
    #[error("Invalid dump request: {0}")]
    InvalidDump(String),

    /// No table entry for a screen change
    #[error("No transition from {from:?} to {to:?}")]
    NoTransition {
        /// Screen the instrument is on
        from: Screen,
        /// Screen that was requested
        to: Screen,
    },

    /// Anchor pattern failed to compile
    #[error("Invalid pattern: {0}")]
    Pattern(#[from] regex::Error),

    /// Transport failure
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Module image codec failure
    #[error(transparent)]
    Codec(#[from] CodecError),

    /// Output split failure
    #[error("Split failed: {0}")]
    Interleave(#[from] InterleaveError),

    /// Filesystem failure
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl InstrumentError {
    /// Whether this error is a plain wait timeout
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}
