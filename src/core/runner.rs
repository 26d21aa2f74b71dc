//! End-to-end dump run
//!
//! Connects, enters test mode, switches to the fast test rate, enables the
//! debugger, dumps every configured module slot and ROM range, then leaves
//! test mode again.

use super::dump::{DumpOutcome, MemoryDumper, ModuleDumper, ModuleOutcome};
use super::error::{InstrumentError, Result};
use super::matcher::{pause, MatchCursor, Matcher, HOME_PATTERN};
use super::navigator::Navigator;
use super::session::DeviceSession;
use super::transcript::{Transcript, LEVEL_NORMAL};
use super::transport::TransportTrait;
use crate::config::AppConfig;
use chrono::Local;
use regex::Regex;
use std::fs;
use tracing::{debug, info};

const DEBUGGER_BANNER: &str = "\x1b\\[0;4;7m.* Debugger .*\x1b\\[0m";
const RESTORE_CONSOLE: &str = "\x1b[0m\x1b[24;0H\n";

/// What a run produced
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Outcome per module slot
    pub modules: Vec<(u8, ModuleOutcome)>,
    /// Outcome per ROM staging name
    pub roms: Vec<(String, DumpOutcome)>,
}

impl RunSummary {
    /// Whether every ROM range was fully captured
    pub fn is_complete(&self) -> bool {
        self.roms
            .iter()
            .all(|(_, outcome)| !matches!(outcome, DumpOutcome::Incomplete { .. }))
    }
}

/// Drives a whole dump session
pub struct Runner<T: TransportTrait> {
    matcher: Matcher<T>,
    config: AppConfig,
    session: Option<DeviceSession>,
    screen_dirty: bool,
}

impl<T: TransportTrait> Runner<T> {
    /// Create a runner logging to the configured transcript file and stdout
    pub fn new(transport: T, config: AppConfig) -> Result<Self> {
        fs::create_dir_all(&config.output.root)?;
        let path = config.output.root.join(&config.output.transcript);

        let mut transcript = Transcript::new().with_console(Box::new(std::io::stdout()));
        transcript.open(&path)?;
        info!("Transcript: {}", path.display());

        Ok(Self::with_transcript(transport, config, transcript))
    }

    /// Create a runner with a caller-supplied transcript
    pub fn with_transcript(transport: T, config: AppConfig, transcript: Transcript) -> Self {
        let matcher = Matcher::new(transport, transcript)
            .with_line_ending(config.serial.line_ending.as_str())
            .with_default_timeout(config.timing.response_timeout());

        Self {
            matcher,
            config,
            session: None,
            screen_dirty: false,
        }
    }

    /// Identity of the connected instrument, once known
    pub fn session(&self) -> Option<&DeviceSession> {
        self.session.as_ref()
    }

    /// Borrow the matcher
    pub fn matcher(&self) -> &Matcher<T> {
        &self.matcher
    }

    /// Take the runner apart
    pub fn into_matcher(self) -> Matcher<T> {
        self.matcher
    }

    /// Run the whole sequence
    pub fn run(&mut self) -> Result<RunSummary> {
        let mut session = self.config.connection_manager().connect(&mut self.matcher)?;

        self.matcher.send_line("TEST MAN")?;
        self.matcher.transcript_mut().set_level(LEVEL_NORMAL);

        let result = self.test_mode(&mut session);
        self.session = Some(session);

        pause(self.config.timing.settle());
        let exited = self.matcher.send("XEE");
        self.restore_console();

        let transport = self.matcher.transport();
        let stats = transport.stats();
        info!(
            "{}: {} bytes sent, {} bytes received, {} rate changes",
            transport.connection_info(),
            stats.bytes_sent,
            stats.bytes_received,
            stats.baud_changes
        );

        let summary = result?;
        exited?;
        info!("Success");
        Ok(summary)
    }

    fn test_mode(&mut self, session: &mut DeviceSession) -> Result<RunSummary> {
        let timing = self.config.timing.clone();
        pause(timing.warmup());

        let test_baud = self.enter_test_mode()?;
        session.test_baud = Some(test_baud);
        self.screen_dirty = true;

        let mut cursor = self.matcher.expect("EXTENDED DIAGNOSTICS")?;
        self.matcher.expect(HOME_PATTERN)?;
        info!("Baudrate {} bps", test_baud);

        let fast = self.config.serial.fast_baud_rate;
        if test_baud != fast {
            info!("Switching to {} bps", fast);
            self.matcher.send_line(&format!("B{}", fast))?;
            pause(timing.baud_switch());
            self.matcher.set_baud_rate(fast)?;
            self.matcher.send("TT")?;
            cursor = self.matcher.expect("EXTENDED DIAGNOSTICS")?;
            session.test_baud = Some(fast);
        }

        self.enable_debugger(&cursor)?;

        let mut summary = RunSummary::default();
        let navigator = Navigator::new(self.config.pacing());

        if !self.config.modules.slots.is_empty() {
            let dir = self
                .config
                .output
                .root
                .join(DeviceSession::module_dir_name(Local::now().naive_local()));
            let modules = ModuleDumper::new(navigator.clone(), dir);

            for &unit in &self.config.modules.slots {
                let (outcome, next) = modules.dump(&mut self.matcher, &cursor, unit)?;
                summary.modules.push((unit, outcome));
                cursor = next;
            }
        }

        if !self.config.roms.is_empty() {
            let rom_dir = self.config.output.root.join(session.rom_dir_name());
            let dumper = MemoryDumper::new(navigator, rom_dir)?.keep_staging(self.config.output.keep_staging);

            for image in &self.config.roms {
                let version = session.subsystem_version(&image.version_keys);
                let job = image.to_dump(&version);
                let outcome = dumper.dump(&mut self.matcher, &job)?;
                summary.roms.push((job.staging_name(), outcome));
            }
        }

        Ok(summary)
    }

    fn enter_test_mode(&mut self) -> Result<u32> {
        let timeout = self.config.timing.response_timeout();
        let rates = self.config.serial.test_baud_rates.clone();

        for &baud in &rates {
            info!("Trying test mode {} bps", baud);
            self.matcher.set_baud_rate(baud)?;
            self.matcher.send("T")?;
            if self.matcher.poll(&["SUBSYSTEM"], timeout)?.is_some() {
                debug!("Seen \"SUBSYSTEM\"");
                return Ok(baud);
            }
        }

        Err(InstrumentError::ConnectionFailure {
            attempts: rates.len() as u32,
        })
    }

    fn enable_debugger(&mut self, cursor: &MatchCursor) -> Result<()> {
        if Regex::new(DEBUGGER_BANNER)?.is_match(cursor.as_str()) {
            return Ok(());
        }

        info!("Enabling debugger");
        self.matcher.send("WWWWWO")?;
        let enabled = format!("{}.*{}", DEBUGGER_BANNER, HOME_PATTERN);
        self.matcher
            .wait(&[enabled.as_str()], self.config.timing.debugger_timeout())?;
        Ok(())
    }

    fn restore_console(&mut self) {
        if self.screen_dirty {
            self.matcher.transcript_mut().console_write(RESTORE_CONSOLE);
            self.screen_dirty = false;
        }
    }
}
