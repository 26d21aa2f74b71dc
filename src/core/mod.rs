//! Core module containing the instrument automation
//!
//! This module provides:
//! - Transport layer (serial port and scripted simulator)
//! - Transcript logging of the terminal stream
//! - Pattern matcher with bounded waits
//! - Connection manager (baud negotiation, identity)
//! - Menu navigator over the diagnostic screens
//! - Memory and module dump engines
//! - Module image codec
//! - End-to-end runner

pub mod codec;
pub mod dump;
pub mod error;
pub mod matcher;
pub mod navigator;
pub mod runner;
pub mod session;
pub mod simulator;
pub mod transcript;
pub mod transport;
