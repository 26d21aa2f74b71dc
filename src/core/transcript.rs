//! Terminal transcript
//!
//! Mirrors the raw instrument stream to an operator console and keeps a
//! canonical line log. The stream is cut into records at every `\r\n` and at
//! every clear-line escape the instrument emits after a redraw.

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::Path;

/// Clear-line escape that terminates each screen redraw
pub const HOME: &str = "\x1b[2K";

/// Echo level used for normal operation
pub const LEVEL_NORMAL: u32 = 2;

/// Echo is suppressed at or above this level
pub const LEVEL_SILENT: u32 = 1000;

const CRLF: &str = "\r\n";

/// Records kept in memory
const MAX_BUFFER: usize = 1000;

/// Transcript of the instrument stream
pub struct Transcript {
    /// Output file
    file: Option<BufWriter<File>>,
    /// Operator console
    console: Option<Box<dyn Write + Send>>,
    /// Current echo level
    level: u32,
    /// Text after the last separator
    pending: String,
    /// Recent records kept in memory
    buffer: Vec<String>,
}

impl Default for Transcript {
    fn default() -> Self {
        Self::new()
    }
}

impl Transcript {
    /// Create a transcript with no file and no console
    pub fn new() -> Self {
        Self {
            file: None,
            console: None,
            level: LEVEL_NORMAL,
            pending: String::new(),
            buffer: Vec::new(),
        }
    }

    /// Start writing records to `path`, truncating any previous run
    pub fn open(&mut self, path: &Path) -> std::io::Result<()> {
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(path)?;

        self.file = Some(BufWriter::new(file));
        Ok(())
    }

    /// Mirror raw text to `console`
    #[must_use]
    pub fn with_console(mut self, console: Box<dyn Write + Send>) -> Self {
        self.console = Some(console);
        self
    }

    /// Set echo level, returning the previous one
    pub fn set_level(&mut self, level: u32) -> u32 {
        std::mem::replace(&mut self.level, level)
    }

    /// Current echo level
    pub fn level(&self) -> u32 {
        self.level
    }

    /// Whether raw text currently reaches the console
    pub fn is_echoing(&self) -> bool {
        self.console.is_some() && self.level < LEVEL_SILENT
    }

    /// Feed newly received text
    pub fn record(&mut self, text: &str) {
        if self.is_echoing() {
            if let Some(ref mut console) = self.console {
                let _ = console.write_all(text.as_bytes());
                let _ = console.flush();
            }
        }

        self.pending.push_str(text);
        let (records, consumed) = split_records(&self.pending);
        let records: Vec<String> = records.into_iter().map(String::from).collect();
        self.pending.replace_range(..consumed, "");

        for record in records {
            self.push_record(record);
        }

        if let Some(ref mut file) = self.file {
            let _ = file.flush();
        }
    }

    /// Write raw text to the console regardless of the transcript log
    pub fn console_write(&mut self, text: &str) {
        if let Some(ref mut console) = self.console {
            let _ = console.write_all(text.as_bytes());
            let _ = console.flush();
        }
    }

    /// Recent records
    pub fn lines(&self) -> &[String] {
        &self.buffer
    }

    /// Text not yet terminated by a separator
    pub fn pending(&self) -> &str {
        &self.pending
    }

    /// Flush any partial record and the log file
    pub fn finish(&mut self) {
        if !self.pending.is_empty() {
            let record = std::mem::take(&mut self.pending);
            self.push_record(record);
        }
        if let Some(ref mut file) = self.file {
            let _ = file.flush();
        }
    }

    fn push_record(&mut self, record: String) {
        if let Some(ref mut file) = self.file {
            let _ = writeln!(file, "{}", record);
        }

        self.buffer.push(record);
        if self.buffer.len() > MAX_BUFFER {
            self.buffer.remove(0);
        }
    }
}

impl Drop for Transcript {
    fn drop(&mut self) {
        self.finish();
    }
}

/// Cut `text` at every separator.
///
/// Returns the complete records and the number of bytes they (and their
/// separators) occupy; the remainder is an unterminated record.
pub fn split_records(text: &str) -> (Vec<&str>, usize) {
    let mut records = Vec::new();
    let mut start = 0;

    loop {
        let rest = &text[start..];
        let next = [CRLF, HOME]
            .iter()
            .filter_map(|sep| rest.find(sep).map(|pos| (pos, sep.len())))
            .min_by_key(|&(pos, _)| pos);

        match next {
            Some((pos, len)) => {
                records.push(&rest[..pos]);
                start += pos + len;
            }
            None => break,
        }
    }

    (records, start)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct SharedConsole(Arc<Mutex<Vec<u8>>>);

    impl Write for SharedConsole {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_split_on_both_separators() {
        let (records, consumed) = split_records("ab\r\ncd\x1b[2Kef");
        assert_eq!(records, vec!["ab", "cd"]);
        assert_eq!(consumed, "ab\r\ncd\x1b[2K".len());
    }

    #[test]
    fn test_partial_records_are_held() {
        let mut transcript = Transcript::new();
        transcript.record("ID SD-2");
        assert!(transcript.lines().is_empty());
        transcript.record("4,v1.0\r");
        assert!(transcript.lines().is_empty());
        transcript.record("\nnext");
        assert_eq!(transcript.lines(), ["ID SD-24,v1.0"]);
        assert_eq!(transcript.pending(), "next");

        transcript.finish();
        assert_eq!(transcript.lines(), ["ID SD-24,v1.0", "next"]);
    }

    #[test]
    fn test_bare_newline_is_not_a_separator() {
        let (records, consumed) = split_records("a\nb\r");
        assert!(records.is_empty());
        assert_eq!(consumed, 0);
    }

    #[test]
    fn test_log_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("transcript.log");
        {
            let mut transcript = Transcript::new();
            transcript.open(&path).unwrap();
            transcript.record(" Main Acq \x1b[2K Acq 1 \r\n");
        }
        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text, " Main Acq \n Acq 1 \n");
    }

    #[test]
    fn test_echo_levels() {
        let console = SharedConsole::default();
        let mut transcript = Transcript::new().with_console(Box::new(console.clone()));

        transcript.record("shown");
        let previous = transcript.set_level(LEVEL_SILENT);
        assert_eq!(previous, LEVEL_NORMAL);
        transcript.record("hidden");
        transcript.set_level(previous);
        transcript.record("again");

        let echoed = String::from_utf8(console.0.lock().unwrap().clone()).unwrap();
        assert_eq!(echoed, "shownagain");
        assert_eq!(transcript.pending(), "shownhiddenagain");
    }
}
