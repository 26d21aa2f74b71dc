//! Connection manager and device session
//!
//! Finds the main console baud rate, recovers an instrument left in test mode
//! and turns the identity replies into a [`DeviceSession`].

use super::error::{InstrumentError, Result};
use super::matcher::{pause, Matcher};
use super::transport::TransportTrait;
use crate::utils::sanitize_filename;
use chrono::NaiveDateTime;
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{debug, info, warn};

const ID_PATTERN: &str = "ID .*\r\n";
const UID_PATTERN: &str = "UID .*\r\n";
const EXIT_TEST_MODE: &str = "XEE";

/// Identity of the connected instrument
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceSession {
    /// Raw identity reply
    pub identity: String,
    /// Model field
    pub model: String,
    /// Firmware version field
    pub version: String,
    /// Model and version, with the UID main serial appended when known
    pub name: String,
    /// Subsystem versions keyed by subsystem name
    pub subsystems: BTreeMap<String, String>,
    /// Main console line rate
    pub main_baud: Option<u32>,
    /// Test mode line rate
    pub test_baud: Option<u32>,
}

impl DeviceSession {
    /// Parse an identity reply such as `SD-24,v1.0,ACQM1/2.3`
    pub fn from_identity(reply: &str) -> Result<Self> {
        let reply = reply.trim();
        let mut fields = reply.split(',');

        let model = fields.next().unwrap_or_default().trim();
        if model.is_empty() {
            return Err(InstrumentError::MalformedIdentity(reply.to_string()));
        }
        let version = fields
            .next()
            .map(str::trim)
            .ok_or_else(|| InstrumentError::MalformedIdentity(reply.to_string()))?;

        let mut subsystems = BTreeMap::new();
        for field in fields {
            match field.split_once('/') {
                Some((key, value)) => {
                    subsystems.insert(key.trim().to_string(), value.trim().to_string());
                }
                None => warn!("Ignoring identity field without version: {:?}", field),
            }
        }

        Ok(Self {
            identity: reply.to_string(),
            model: model.to_string(),
            version: version.to_string(),
            name: format!("{} {}", model.replace('/', "-"), version),
            subsystems,
            main_baud: None,
            test_baud: None,
        })
    }

    /// Append the main serial from a UID reply, if it carries one
    pub fn apply_uid(&mut self, uid: &str) -> bool {
        let main = uid
            .split(',')
            .map(str::trim)
            .find_map(|field| field.strip_prefix("MAIN:\"")?.strip_suffix('"'));

        match main {
            Some(serial) => {
                self.name = format!("{}-{}", self.name, serial);
                true
            }
            None => false,
        }
    }

    /// Directory name for ROM dumps
    pub fn rom_dir_name(&self) -> String {
        sanitize_filename(&self.name)
    }

    /// Directory name for module dumps taken at `at`
    pub fn module_dir_name(at: NaiveDateTime) -> String {
        format!("MODULES-{}", at.format("%Y%m%d-%H%M"))
    }

    /// Sanitized version of the first listed subsystem present
    pub fn subsystem_version<S: AsRef<str>>(&self, keys: &[S]) -> String {
        keys.iter()
            .find_map(|key| self.subsystems.get(key.as_ref()))
            .map(|version| sanitize_filename(version))
            .unwrap_or_else(|| "unknown".to_string())
    }
}

/// Baud negotiation and identity queries
#[derive(Debug, Clone)]
pub struct ConnectionManager {
    /// Main console rates, tried in order
    pub main_baud_rates: Vec<u32>,
    /// Test mode rates, used to send the exit command
    pub test_baud_rates: Vec<u32>,
    /// Hard-exit recovery rounds
    pub retries: u32,
    /// Wait for each identity reply
    pub identity_timeout: Duration,
    /// Pause after the wake-up line
    pub wake_pause: Duration,
    /// Pause after each exit command
    pub exit_pause: Duration,
    /// Pause after a recovery round
    pub recovery_pause: Duration,
}

impl Default for ConnectionManager {
    fn default() -> Self {
        Self {
            main_baud_rates: vec![9600],
            test_baud_rates: vec![9600, 38400],
            retries: 10,
            identity_timeout: Duration::from_secs(1),
            wake_pause: Duration::from_millis(100),
            exit_pause: Duration::from_millis(500),
            recovery_pause: Duration::from_secs(1),
        }
    }
}

impl ConnectionManager {
    /// Drop every pause, for scripted instruments
    #[must_use]
    pub fn without_pauses(mut self) -> Self {
        self.wake_pause = Duration::ZERO;
        self.exit_pause = Duration::ZERO;
        self.recovery_pause = Duration::ZERO;
        self
    }

    /// Try each main console rate once, returning the rate and identity reply
    pub fn try_connect<T: TransportTrait>(
        &self,
        matcher: &mut Matcher<T>,
    ) -> Result<Option<(u32, String)>> {
        for &baud in &self.main_baud_rates {
            info!("Trying to connect at {} bps", baud);
            matcher.set_baud_rate(baud)?;
            matcher.send_line("")?;
            pause(self.wake_pause);
            matcher.clear_input()?;

            if let Some(identity) = self.query_identity(matcher)? {
                return Ok(Some((baud, identity)));
            }
        }
        Ok(None)
    }

    /// Send the exit command at every test mode rate with echo suppressed
    pub fn hard_exit<T: TransportTrait>(&self, matcher: &mut Matcher<T>) -> Result<()> {
        info!("Trying to exit test modes");
        matcher.with_echo_suppressed(|m| -> Result<()> {
            for &baud in &self.test_baud_rates {
                m.set_baud_rate(baud)?;
                m.send(EXIT_TEST_MODE)?;
                pause(self.exit_pause);
            }
            Ok(())
        })
    }

    /// Connect, recovering from test mode if needed, and identify the device
    pub fn connect<T: TransportTrait>(&self, matcher: &mut Matcher<T>) -> Result<DeviceSession> {
        let mut found = self.try_connect(matcher)?;

        let mut round = 0;
        while found.is_none() && round < self.retries {
            round += 1;
            debug!("Recovery round {}/{}", round, self.retries);
            self.hard_exit(matcher)?;
            pause(self.recovery_pause);
            matcher.clear_input()?;
            found = self.try_connect(matcher)?;
        }

        let (baud, identity) = found.ok_or(InstrumentError::ConnectionFailure {
            attempts: self.retries,
        })?;
        info!("Connected to {:?}", identity);

        let mut session = DeviceSession::from_identity(&identity)?;
        session.main_baud = Some(baud);

        match self.query_uid(matcher)? {
            Some(uid) => {
                info!("UID {}", uid);
                session.apply_uid(&uid);
            }
            None => warn!("No UID reply"),
        }

        Ok(session)
    }

    /// Ask for the identity string
    pub fn query_identity<T: TransportTrait>(&self, matcher: &mut Matcher<T>) -> Result<Option<String>> {
        self.query(matcher, "ID?", ID_PATTERN, "ID ")
    }

    /// Ask for the unique id string
    pub fn query_uid<T: TransportTrait>(&self, matcher: &mut Matcher<T>) -> Result<Option<String>> {
        self.query(matcher, "UID?", UID_PATTERN, "UID ")
    }

    fn query<T: TransportTrait>(
        &self,
        matcher: &mut Matcher<T>,
        command: &str,
        pattern: &str,
        prefix: &str,
    ) -> Result<Option<String>> {
        matcher.send_line(command)?;
        let reply = matcher.poll(&[pattern], self.identity_timeout)?;
        Ok(reply.map(|m| {
            let text = m.cursor.as_str();
            text.strip_prefix(prefix).unwrap_or(text).trim().to_string()
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::simulator::{ResponseRule, VirtualInstrument};
    use crate::core::transcript::Transcript;
    use chrono::NaiveDate;

    fn manager() -> ConnectionManager {
        ConnectionManager {
            retries: 3,
            ..ConnectionManager::default()
        }
        .without_pauses()
    }

    #[test]
    fn test_parse_identity() {
        let session = DeviceSession::from_identity("SD-24,v1.0,ACQM1/2.3").unwrap();
        assert_eq!(session.model, "SD-24");
        assert_eq!(session.version, "v1.0");
        assert_eq!(session.name, "SD-24 v1.0");
        assert_eq!(session.subsystems.get("ACQM1").map(String::as_str), Some("2.3"));
        assert_eq!(session.rom_dir_name(), "SD-24-v1-0");
    }

    #[test]
    fn test_identity_model_slash() {
        let session = DeviceSession::from_identity("11801B/SD,CF:91.1ct,bogus,DSY/1.4").unwrap();
        assert_eq!(session.name, "11801B-SD CF:91.1ct");
        assert_eq!(session.subsystems.len(), 1);
    }

    #[test]
    fn test_identity_without_version() {
        assert!(matches!(
            DeviceSession::from_identity("SD-24"),
            Err(InstrumentError::MalformedIdentity(_))
        ));
        assert!(matches!(
            DeviceSession::from_identity(""),
            Err(InstrumentError::MalformedIdentity(_))
        ));
    }

    #[test]
    fn test_apply_uid() {
        let mut session = DeviceSession::from_identity("SD-24,v1.0").unwrap();
        assert!(!session.apply_uid("ACQ:\"B010101\""));
        assert!(session.apply_uid("ACQ:\"B010101\",MAIN:\"B020202\""));
        assert_eq!(session.name, "SD-24 v1.0-B020202");
        assert_eq!(session.rom_dir_name(), "SD-24-v1-0-B020202");
    }

    #[test]
    fn test_subsystem_version() {
        let session = DeviceSession::from_identity("X,v1,ACQM2/1.2.3,DSY/4 5").unwrap();
        assert_eq!(session.subsystem_version(&["ACQM1", "ACQM2"]), "1-2-3");
        assert_eq!(session.subsystem_version(&["DSY"]), "4-5");
        assert_eq!(session.subsystem_version(&["TBC"]), "unknown");
    }

    #[test]
    fn test_module_dir_name() {
        let at = NaiveDate::from_ymd_opt(2024, 3, 7)
            .and_then(|d| d.and_hms_opt(9, 5, 0))
            .unwrap();
        assert_eq!(DeviceSession::module_dir_name(at), "MODULES-20240307-0905");
    }

    #[test]
    fn test_connect() {
        let device = VirtualInstrument::main_console("SD-24,v1.0,ACQM1/2.3", Some("MAIN:\"B0\""));
        let mut matcher = Matcher::new(device, Transcript::new());

        let session = manager().connect(&mut matcher).unwrap();
        assert_eq!(session.main_baud, Some(9600));
        assert_eq!(session.name, "SD-24 v1.0-B0");
        assert_eq!(matcher.transport().keystrokes(), "\nID?\nUID?\n");
    }

    #[test]
    fn test_connect_after_hard_exit() {
        let mut device = VirtualInstrument::main_console("SD-24,v1.0", None)
            .with_rule(ResponseRule::reply("exit", "XEE", b"").then_listen_at(9600));
        device.listen_at(38400);
        let mut matcher = Matcher::new(device, Transcript::new());

        let session = manager().connect(&mut matcher).unwrap();
        assert_eq!(session.name, "SD-24 v1.0");
        assert_eq!(matcher.transport().rule("exit").map(|r| r.match_count), Some(1));
    }

    #[test]
    fn test_connection_failure() {
        let device = VirtualInstrument::new("silent");
        let mut matcher = Matcher::new(device, Transcript::new());

        let err = manager().connect(&mut matcher).unwrap_err();
        assert!(matches!(err, InstrumentError::ConnectionFailure { attempts: 3 }));
        assert_eq!(matcher.transport().keystrokes().matches("ID?").count(), 4);
        assert_eq!(matcher.transport().keystrokes().matches("XEE").count(), 6);
    }
}
