//! Pattern matcher over the instrument stream
//!
//! Provides a pull-based "wait until one of N patterns appears" primitive
//! over any [`TransportTrait`]. Every byte read is fed to the [`Transcript`].
//! A successful wait consumes the stream up to the end of the match and
//! returns the matched text as the new [`MatchCursor`].

use super::error::{InstrumentError, Result};
use super::transcript::Transcript;
use super::transport::TransportTrait;
use regex::Regex;
use std::collections::HashMap;
use std::fmt;
use std::time::{Duration, Instant};
use tracing::{info, trace};

/// Regex for the clear-line escape closing each screen redraw
pub const HOME_PATTERN: &str = "\x1b\\[2K";

/// Unmatched input kept once the buffer grows past [`MAX_BUFFER`]
const KEEP_BUFFER: usize = 16 * 1024;
const MAX_BUFFER: usize = 64 * 1024;

/// The most recently matched terminal text
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MatchCursor(String);

impl MatchCursor {
    /// Wrap matched text
    pub fn new(text: impl Into<String>) -> Self {
        Self(text.into())
    }

    /// Cursor that shows no screen
    pub fn empty() -> Self {
        Self::default()
    }

    /// Matched text
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether `marker` appears in the matched text
    pub fn shows(&self, marker: &str) -> bool {
        self.0.contains(marker)
    }
}

impl fmt::Display for MatchCursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.escape_debug())
    }
}

/// Result of a successful wait
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Match {
    /// Index of the pattern that matched
    pub index: usize,
    /// Matched text
    pub cursor: MatchCursor,
}

/// Pattern matcher owning the transport and transcript
pub struct Matcher<T: TransportTrait> {
    transport: T,
    transcript: Transcript,
    buffer: String,
    last: MatchCursor,
    patterns: HashMap<String, Regex>,
    line_ending: String,
    default_timeout: Duration,
}

impl<T: TransportTrait> Matcher<T> {
    /// Create a matcher
    pub fn new(transport: T, transcript: Transcript) -> Self {
        Self {
            transport,
            transcript,
            buffer: String::new(),
            last: MatchCursor::empty(),
            patterns: HashMap::new(),
            line_ending: "\n".to_string(),
            default_timeout: Duration::from_secs(5),
        }
    }

    /// Set the terminator appended by [`send_line`](Self::send_line)
    #[must_use]
    pub fn with_line_ending(mut self, ending: &str) -> Self {
        self.line_ending = ending.to_string();
        self
    }

    /// Set the timeout used by [`expect`](Self::expect)
    #[must_use]
    pub fn with_default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = timeout;
        self
    }

    /// Borrow the transport
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Borrow the transcript
    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    /// Mutably borrow the transcript
    pub fn transcript_mut(&mut self) -> &mut Transcript {
        &mut self.transcript
    }

    /// Text of the most recent match
    pub fn last_match(&self) -> &MatchCursor {
        &self.last
    }

    /// Send keystrokes as one write
    pub fn send(&mut self, keys: &str) -> Result<()> {
        trace!("TX {:?}", keys);
        self.transport.send(keys.as_bytes())?;
        Ok(())
    }

    /// Send a line followed by the configured terminator
    pub fn send_line(&mut self, line: &str) -> Result<()> {
        let data = format!("{}{}", line, self.line_ending);
        self.send(&data)
    }

    /// Send keystrokes one at a time with `delay` after each
    pub fn send_paced(&mut self, keys: &str, delay: Duration) -> Result<()> {
        let mut buf = [0u8; 4];
        for c in keys.chars() {
            self.send(c.encode_utf8(&mut buf))?;
            pause(delay);
        }
        Ok(())
    }

    /// Switch the line rate
    pub fn set_baud_rate(&mut self, baud_rate: u32) -> Result<()> {
        info!("Baudrate {} bps", baud_rate);
        self.transport.set_baud_rate(baud_rate)?;
        Ok(())
    }

    /// Drop unread input, both in the driver and in the match buffer
    pub fn clear_input(&mut self) -> Result<()> {
        self.transport.clear_input()?;
        self.buffer.clear();
        Ok(())
    }

    /// Wait up to `timeout` for any of `patterns`.
    ///
    /// The earliest match in the stream wins; ties go to the lower pattern
    /// index. Returns `None` on timeout. An empty pattern list reads until the
    /// timeout elapses.
    pub fn poll(&mut self, patterns: &[&str], timeout: Duration) -> Result<Option<Match>> {
        let deadline = Instant::now() + timeout;

        loop {
            if let Some(found) = self.take_match(patterns)? {
                return Ok(Some(found));
            }

            let now = Instant::now();
            if now >= deadline {
                return Ok(None);
            }

            let chunk = self.transport.receive(deadline - now)?;
            if chunk.is_empty() {
                return Ok(None);
            }

            self.ingest(&chunk);
        }
    }

    /// Like [`poll`](Self::poll) but a timeout is an error
    pub fn wait(&mut self, patterns: &[&str], timeout: Duration) -> Result<Match> {
        self.poll(patterns, timeout)?
            .ok_or_else(|| InstrumentError::Timeout {
                expected: patterns
                    .iter()
                    .map(|p| format!("{:?}", p))
                    .collect::<Vec<_>>()
                    .join(" | "),
                after: timeout,
            })
    }

    /// Wait for one pattern with the default timeout
    pub fn expect(&mut self, pattern: &str) -> Result<MatchCursor> {
        let timeout = self.default_timeout;
        Ok(self.wait(&[pattern], timeout)?.cursor)
    }

    /// Read and discard until no input arrives for `quiet`.
    ///
    /// Every chunk received restarts the quiet period.
    pub fn drain(&mut self, quiet: Duration) -> Result<()> {
        loop {
            let chunk = self.transport.receive(quiet)?;
            if chunk.is_empty() {
                break;
            }
            self.ingest(&chunk);
        }
        self.buffer.clear();
        Ok(())
    }

    /// Run `f` with console echo suppressed, restoring the level afterwards
    pub fn with_echo_suppressed<R>(&mut self, f: impl FnOnce(&mut Self) -> R) -> R {
        let previous = self.transcript.set_level(super::transcript::LEVEL_SILENT);
        let result = f(self);
        self.transcript.set_level(previous);
        result
    }

    fn take_match(&mut self, patterns: &[&str]) -> Result<Option<Match>> {
        let cache = &mut self.patterns;
        let buffer = &self.buffer;

        let mut best: Option<(usize, usize, usize)> = None;
        for (index, pattern) in patterns.iter().enumerate() {
            if !cache.contains_key(*pattern) {
                cache.insert((*pattern).to_string(), Regex::new(pattern)?);
            }
            let Some(re) = cache.get(*pattern) else {
                continue;
            };
            if let Some(m) = re.find(buffer) {
                if best.map_or(true, |(start, _, _)| m.start() < start) {
                    best = Some((m.start(), m.end(), index));
                }
            }
        }

        let Some((start, end, index)) = best else {
            return Ok(None);
        };

        let cursor = MatchCursor::new(&self.buffer[start..end]);
        self.buffer.replace_range(..end, "");
        self.last = cursor.clone();
        trace!("Matched pattern {}: {}", index, cursor);

        Ok(Some(Match { index, cursor }))
    }

    fn ingest(&mut self, chunk: &[u8]) {
        let text = String::from_utf8_lossy(chunk);
        self.transcript.record(&text);
        self.buffer.push_str(&text);
        self.trim_buffer();
    }

    fn trim_buffer(&mut self) {
        if self.buffer.len() <= MAX_BUFFER {
            return;
        }
        let mut cut = self.buffer.len() - KEEP_BUFFER;
        while !self.buffer.is_char_boundary(cut) {
            cut += 1;
        }
        self.buffer.replace_range(..cut, "");
    }
}

/// Sleep unless `delay` is zero
pub fn pause(delay: Duration) {
    if !delay.is_zero() {
        std::thread::sleep(delay);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::simulator::{ResponseRule, VirtualInstrument};

    fn matcher_with(output: &str) -> Matcher<VirtualInstrument> {
        let mut device = VirtualInstrument::new("fixture");
        device.preload(output.as_bytes());
        Matcher::new(device, Transcript::new())
    }

    #[test]
    fn test_earliest_match_wins() {
        let mut m = matcher_with("xx Registers yy Exercisers zz");
        let found = m
            .wait(&["Exercisers", "Registers"], Duration::from_millis(10))
            .unwrap();
        assert_eq!(found.index, 1);
        assert_eq!(found.cursor.as_str(), "Registers");

        let next = m.wait(&["Exercisers"], Duration::from_millis(10)).unwrap();
        assert_eq!(next.index, 0);
        assert_eq!(m.last_match().as_str(), "Exercisers");
    }

    #[test]
    fn test_match_consumes_buffer() {
        let mut m = matcher_with("Stopped\x1b[2K");
        m.wait(&["Stopped"], Duration::from_millis(10)).unwrap();
        assert!(m.poll(&["Stopped"], Duration::ZERO).unwrap().is_none());
    }

    #[test]
    fn test_timeout_is_error() {
        let mut m = matcher_with("nothing useful");
        let err = m.wait(&["SUBSYSTEM"], Duration::from_millis(5)).unwrap_err();
        assert!(err.is_timeout());
        assert!(m.last_match().as_str().is_empty());
    }

    #[test]
    fn test_anchor_with_home_marker() {
        let mut m = matcher_with("\x1b[H Main Acq   menu text\x1b[2K");
        let pattern = format!(" Main Acq .*{}", HOME_PATTERN);
        let cursor = m.expect(&pattern).unwrap();
        assert!(cursor.shows(" Main Acq "));
    }

    #[test]
    fn test_transcript_receives_everything() {
        let mut m = matcher_with("ID SD-24,v1.0\r\nrest");
        m.wait(&["ID .*\r\n"], Duration::from_millis(10)).unwrap();
        assert_eq!(m.transcript().lines(), ["ID SD-24,v1.0"]);
    }

    #[test]
    fn test_clear_input_drops_buffer() {
        let mut m = matcher_with("stale ID old\r\n");
        m.poll(&["never"], Duration::from_millis(5)).unwrap();
        m.clear_input().unwrap();
        assert!(m.poll(&["ID .*\r\n"], Duration::ZERO).unwrap().is_none());
    }

    #[test]
    fn test_drain_reads_until_quiet() {
        let mut device = VirtualInstrument::new("fixture");
        device.set_chunk_size(8);
        device.preload("RM 00000000 FFFF \x1b[K\r\n".repeat(64).as_bytes());
        let mut m = Matcher::new(device, Transcript::new());
        m.drain(Duration::from_millis(5)).unwrap();
        assert!(m.poll(&["RM"], Duration::ZERO).unwrap().is_none());
        assert_eq!(m.transcript().lines().len(), 64);
    }

    #[test]
    fn test_echo_suppression_restores_level() {
        let mut device = VirtualInstrument::new("fixture");
        device.add_rule(ResponseRule::reply("exit", "XEE", b""));
        let mut m = Matcher::new(device, Transcript::new());
        let before = m.transcript().level();
        let seen = m.with_echo_suppressed(|m| m.transcript().level());
        assert!(seen >= crate::core::transcript::LEVEL_SILENT);
        assert_eq!(m.transcript().level(), before);
    }
}
