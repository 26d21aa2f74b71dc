//! Dump engines
//!
//! - [`MemoryDumper`]: streams a memory range through a subsystem's hardware
//!   debugger into a resumable staging file
//! - [`ModuleDumper`]: reads the 128-byte image of one module slot

mod memory;
mod module;

pub use memory::{parse_block, Block, DumpOutcome, MemoryDump, MemoryDumper};
pub use module::{ModuleDumper, ModuleOutcome, ModuleSlot};
