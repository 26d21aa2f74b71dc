//! Memory dump through the hardware debugger
//!
//! The debugger's continuous read prints one `RM <address> <word>...` line per
//! block. Blocks are appended to a staging file named after the subsystem and
//! start address. The staging file's length is the resume point, so an
//! interrupted dump picks up where it stopped on the next run.

use crate::core::codec::ByteOrder;
use crate::core::error::{InstrumentError, Result};
use crate::core::matcher::{pause, Matcher, HOME_PATTERN};
use crate::core::navigator::{Navigator, Screen, Step, Transition};
use crate::core::transport::TransportTrait;
use crate::utils::interleave::split_file;
use regex::Regex;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

const BLOCK_LINE: &str = "RM +[0-9A-F]+( +[0-9A-F]+)+ +.*\x1b";
const BLOCK_FIELDS: &str = "RM +([0-9A-F]+)((?: +[0-9A-F]+)+)";
const ADDRESS_SPACE: u64 = 1 << 32;

/// A memory range to read and the files it ends up in
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryDump {
    /// Subsystem debugger key
    pub subsystem: char,
    /// First byte address
    pub start: u32,
    /// Bytes to read
    pub count: u32,
    /// Order words are stored in
    pub byte_order: ByteOrder,
    /// Output files; several files receive an interleaved split
    pub filenames: Vec<String>,
}

impl MemoryDump {
    /// Range with little-endian words and no output files
    pub fn new(subsystem: char, start: u32, count: u32) -> Self {
        Self {
            subsystem,
            start,
            count,
            byte_order: ByteOrder::Little,
            filenames: Vec::new(),
        }
    }

    /// Set the word byte order
    #[must_use]
    pub fn with_byte_order(mut self, byte_order: ByteOrder) -> Self {
        self.byte_order = byte_order;
        self
    }

    /// Set the output files
    #[must_use]
    pub fn with_files<S: Into<String>>(mut self, filenames: impl IntoIterator<Item = S>) -> Self {
        self.filenames = filenames.into_iter().map(Into::into).collect();
        self
    }

    /// Staging file name
    pub fn staging_name(&self) -> String {
        format!("mem-{}-{:08x}.bin", self.subsystem, self.start)
    }

    fn validate(&self) -> Result<()> {
        if self.count == 0 {
            return Err(InstrumentError::InvalidDump("empty range".to_string()));
        }
        if self.start % 2 != 0 || self.count % 2 != 0 {
            return Err(InstrumentError::InvalidDump(format!(
                "range {:#x}+{:#x} is not word aligned",
                self.start, self.count
            )));
        }
        if u64::from(self.start) + u64::from(self.count) > ADDRESS_SPACE {
            return Err(InstrumentError::InvalidDump(format!(
                "range {:#x}+{:#x} runs past the address space",
                self.start, self.count
            )));
        }
        Ok(())
    }
}

/// Result of a memory dump
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DumpOutcome {
    /// Output files were already complete
    Skipped,
    /// Every byte captured and split into the output files
    Complete {
        /// Bytes in the range
        bytes: u64,
    },
    /// The stream ended early; the staging file is kept for resume
    Incomplete {
        /// Bytes captured so far
        have: u64,
        /// Bytes in the range
        want: u64,
    },
}

/// One parsed `RM` line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    /// Address of the first word
    pub address: u32,
    /// Words in display order
    pub words: Vec<u16>,
}

/// Parse the address and words of an `RM` line
pub fn parse_block(text: &str) -> Result<Block> {
    BlockParser::new()?.parse(text)
}

struct BlockParser {
    fields: Regex,
}

impl BlockParser {
    fn new() -> Result<Self> {
        Ok(Self {
            fields: Regex::new(BLOCK_FIELDS)?,
        })
    }

    fn parse(&self, text: &str) -> Result<Block> {
        let malformed = || InstrumentError::MalformedBlock(text.escape_debug().to_string());

        let caps = self.fields.captures(text).ok_or_else(malformed)?;
        let address = u32::from_str_radix(&caps[1], 16).map_err(|_| malformed())?;
        let words = caps[2]
            .split_whitespace()
            .map(|w| u16::from_str_radix(w, 16))
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|_| malformed())?;

        Ok(Block { address, words })
    }
}

/// Runs [`MemoryDump`]s into a ROM directory
pub struct MemoryDumper {
    navigator: Navigator,
    rom_dir: PathBuf,
    keep_staging: bool,
    parser: BlockParser,
}

impl MemoryDumper {
    /// Create a dumper writing into `rom_dir`
    pub fn new(navigator: Navigator, rom_dir: impl Into<PathBuf>) -> Result<Self> {
        Ok(Self {
            navigator,
            rom_dir: rom_dir.into(),
            keep_staging: false,
            parser: BlockParser::new()?,
        })
    }

    /// Keep staging files after a complete dump
    #[must_use]
    pub fn keep_staging(mut self, keep: bool) -> Self {
        self.keep_staging = keep;
        self
    }

    /// Directory outputs are written to
    pub fn rom_dir(&self) -> &Path {
        &self.rom_dir
    }

    /// Dump one range, resuming any earlier partial run
    pub fn dump<T: TransportTrait>(&self, matcher: &mut Matcher<T>, job: &MemoryDump) -> Result<DumpOutcome> {
        job.validate()?;
        fs::create_dir_all(&self.rom_dir)?;

        let want = u64::from(job.count);
        if self.outputs_complete(job) {
            info!("{}: files exist, skipping dump", job.staging_name());
            return Ok(DumpOutcome::Skipped);
        }

        let staging = self.rom_dir.join(job.staging_name());
        let have = resume_point(&staging, want)?;
        if have > 0 {
            info!("Resuming {} at {:#x} bytes", staging.display(), have);
        }

        if have < want {
            let mut file = OpenOptions::new().create(true).append(true).open(&staging)?;
            // `have` is even and below `count`, so these fit in u32
            let start = job.start + have as u32;
            let count = job.count - have as u32;
            self.capture(matcher, &mut file, job, start, count)?;
        }

        let have = fs::metadata(&staging)?.len();
        if have < want {
            warn!("{}: captured {:#x} of {:#x} bytes", staging.display(), have, want);
            return Ok(DumpOutcome::Incomplete { have, want });
        }

        if !job.filenames.is_empty() {
            let outputs: Vec<PathBuf> = job.filenames.iter().map(|f| self.rom_dir.join(f)).collect();
            split_file(&staging, &outputs)?;
            info!("Wrote {}", job.filenames.join(", "));

            if !self.keep_staging {
                fs::remove_file(&staging)?;
            }
        }

        Ok(DumpOutcome::Complete { bytes: want })
    }

    fn outputs_complete(&self, job: &MemoryDump) -> bool {
        if job.filenames.is_empty() {
            return false;
        }
        let want = u64::from(job.count);
        job.filenames.iter().all(|name| {
            fs::metadata(self.rom_dir.join(name))
                .map(|m| m.len() >= want)
                .unwrap_or(false)
        })
    }

    fn capture<T: TransportTrait>(
        &self,
        matcher: &mut Matcher<T>,
        file: &mut File,
        job: &MemoryDump,
        start: u32,
        count: u32,
    ) -> Result<()> {
        let debugger = Screen::HardwareDebugger(job.subsystem);
        let streamed = self.stream(matcher, file, job, start, count);

        // Leave the debugger whatever happened
        let left = Transition::between(debugger, Screen::ExtendedDiagnostics)
            .and_then(|exit| self.navigator.execute(matcher, &exit));

        streamed?;
        left.map(|_| ())
    }

    fn stream<T: TransportTrait>(
        &self,
        matcher: &mut Matcher<T>,
        file: &mut File,
        job: &MemoryDump,
        start: u32,
        count: u32,
    ) -> Result<()> {
        let pacing = *self.navigator.pacing();
        let debugger = Screen::HardwareDebugger(job.subsystem);
        self.navigator
            .execute(matcher, &Transition::between(Screen::ExtendedDiagnostics, debugger)?)?;

        let narrow = format!(" 8/16 .* 8 .*{}", HOME_PATTERN);
        let wide = format!(" 8/16 .* 16 .*{}", HOME_PATTERN);
        let width = matcher.wait(&[narrow.as_str(), wide.as_str()], pacing.timeout)?;
        if width.index == 0 {
            debug!("Switching debugger to 16-bit access");
            matcher.send("x")?;
            let switched = format!(" 16 .*{}", HOME_PATTERN);
            matcher.wait(&[switched.as_str()], pacing.timeout)?;
        }

        self.navigator.run(
            matcher,
            &[
                Step::Send("s".into()),
                Step::Pause,
                Step::SendPaced(format!("{:x}", start)),
                Step::Pause,
                Step::Send("\r".into()),
                Step::Send("l".into()),
                Step::Pause,
                Step::SendPaced(format!("{:x}", count / 2)),
                Step::Pause,
                Step::Send("\r".into()),
            ],
        )?;
        matcher.drain(pacing.timeout)?;

        pause(pacing.settle);
        info!("Reading {:#x} bytes at {:#x} from subsystem {}", count, start, job.subsystem);
        matcher.send("T")?;

        let mut next = u64::from(start);
        let mut left = count;
        while left > 0 {
            let Some(found) = matcher.poll(&[BLOCK_LINE], pacing.timeout)? else {
                warn!("Stream ended at {:#x} with {:#x} bytes left", next, left);
                break;
            };

            let block = self.parser.parse(found.cursor.as_str())?;
            let address = u64::from(block.address);
            if address == next {
                let mut data = job.byte_order.pack_words(&block.words);
                data.truncate(left as usize);
                file.write_all(&data)?;
                file.flush()?;

                // Never more than `left` after the truncate
                let n = data.len() as u32;
                next += u64::from(n);
                left -= n;
                debug!("Block {:#010x}, {:#x} bytes left", block.address, left);
            } else if address > next {
                return Err(InstrumentError::AddressSync {
                    // Below `start + count`, which validation keeps within the address space
                    expected: next as u32,
                    actual: block.address,
                });
            } else {
                warn!("Ignoring stale block at {:#x}, expected {:#x}", block.address, next);
            }
        }

        Ok(())
    }
}

/// Length of a usable staging prefix, dropping any odd trailing byte
fn resume_point(staging: &Path, want: u64) -> Result<u64> {
    let len = match fs::metadata(staging) {
        Ok(meta) => meta.len(),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
        Err(e) => return Err(e.into()),
    };

    let usable = (len & !1).min(want);
    if usable != len {
        warn!("Truncating {} from {} to {} bytes", staging.display(), len, usable);
        OpenOptions::new().write(true).open(staging)?.set_len(usable)?;
    }
    Ok(usable)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_block() {
        let block = parse_block("RM 00008000 1234 ABCD 0001 \x1b").unwrap();
        assert_eq!(block.address, 0x8000);
        assert_eq!(block.words, vec![0x1234, 0xabcd, 0x0001]);
    }

    #[test]
    fn test_parse_malformed_block() {
        assert!(matches!(
            parse_block("RM 8000"),
            Err(InstrumentError::MalformedBlock(_))
        ));
        assert!(matches!(
            parse_block("RM 8000 123456"),
            Err(InstrumentError::MalformedBlock(_))
        ));
    }

    #[test]
    fn test_staging_name() {
        let job = MemoryDump::new('d', 0x8000, 0x8000);
        assert_eq!(job.staging_name(), "mem-d-00008000.bin");
    }

    #[test]
    fn test_rejects_unaligned_ranges() {
        assert!(MemoryDump::new('a', 1, 2).validate().is_err());
        assert!(MemoryDump::new('a', 0, 3).validate().is_err());
        assert!(MemoryDump::new('a', 0, 0).validate().is_err());
        assert!(MemoryDump::new('a', 0, 2).validate().is_ok());
    }

    #[test]
    fn test_rejects_ranges_past_address_space() {
        assert!(MemoryDump::new('a', 0xffff_ffe0, 0x20).validate().is_ok());
        assert!(matches!(
            MemoryDump::new('a', 0xffff_ffe0, 0x22).validate(),
            Err(InstrumentError::InvalidDump(_))
        ));
        assert!(MemoryDump::new('a', 0xffff_fffe, 0xffff_fffe).validate().is_err());
    }

    #[test]
    fn test_resume_point_truncates_odd_byte() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mem-a-00000000.bin");
        assert_eq!(resume_point(&path, 16).unwrap(), 0);

        fs::write(&path, [1, 2, 3, 4, 5]).unwrap();
        assert_eq!(resume_point(&path, 16).unwrap(), 4);
        assert_eq!(fs::read(&path).unwrap(), vec![1, 2, 3, 4]);
    }
}
