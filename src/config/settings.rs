//! Application settings and the ROM dump plan

use crate::core::codec::ByteOrder;
use crate::core::dump::MemoryDump;
use crate::core::navigator::Pacing;
use crate::core::session::ConnectionManager;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Config file could not be read or written
    #[error("Config I/O error on {}: {source}", path.display())]
    Io {
        /// File involved
        path: PathBuf,
        /// Underlying error
        source: std::io::Error,
    },

    /// Config file is not valid TOML for [`AppConfig`]
    #[error("Invalid config: {0}")]
    Parse(#[from] toml::de::Error),

    /// Config could not be rendered
    #[error("Could not serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    /// No per-user config directory on this platform
    #[error("Could not determine config directory")]
    NoConfigDir,
}

/// Application configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Serial link settings
    pub serial: SerialSettings,
    /// Timeouts and pacing
    pub timing: TimingSettings,
    /// Output locations
    pub output: OutputSettings,
    /// Module slots to dump
    pub modules: ModuleSettings,
    /// ROM dump plan
    pub roms: Vec<RomImage>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            serial: SerialSettings::default(),
            timing: TimingSettings::default(),
            output: OutputSettings::default(),
            modules: ModuleSettings::default(),
            roms: default_rom_plan(),
        }
    }
}

impl AppConfig {
    /// Load from `path`, else the per-user config file, else defaults
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = path {
            return Self::load_from(path);
        }

        match super::config_file() {
            Some(default_path) if default_path.exists() => Self::load_from(&default_path),
            _ => Ok(Self::default()),
        }
    }

    /// Load from a specific file
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(toml::from_str(&content)?)
    }

    /// Save to the per-user config file
    pub fn save(&self) -> Result<PathBuf, ConfigError> {
        let path = super::config_file().ok_or(ConfigError::NoConfigDir)?;
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir).map_err(|source| ConfigError::Io {
                path: dir.to_path_buf(),
                source,
            })?;
        }
        self.save_to(&path)?;
        Ok(path)
    }

    /// Save to a specific file
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Navigation pacing
    pub fn pacing(&self) -> Pacing {
        Pacing {
            settle: self.timing.settle(),
            key_delay: self.timing.key_delay(),
            timeout: self.timing.response_timeout(),
        }
    }

    /// Connection manager for these settings
    pub fn connection_manager(&self) -> ConnectionManager {
        ConnectionManager {
            main_baud_rates: self.serial.main_baud_rates.clone(),
            test_baud_rates: self.serial.test_baud_rates.clone(),
            retries: self.timing.connect_retries,
            identity_timeout: ms(self.timing.identity_timeout_ms),
            wake_pause: ms(self.timing.wake_pause_ms),
            exit_pause: ms(self.timing.exit_pause_ms),
            recovery_pause: ms(self.timing.recovery_pause_ms),
        }
    }
}

/// Serial link settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SerialSettings {
    /// Main console rates, tried in order
    pub main_baud_rates: Vec<u32>,
    /// Test mode rates, tried in order
    pub test_baud_rates: Vec<u32>,
    /// Rate test mode is switched to for dumping
    pub fast_baud_rate: u32,
    /// Terminator for line commands
    pub line_ending: LineEnding,
}

impl Default for SerialSettings {
    fn default() -> Self {
        Self {
            main_baud_rates: vec![9600],
            test_baud_rates: vec![9600, 38400],
            fast_baud_rate: 38400,
            line_ending: LineEnding::Lf,
        }
    }
}

/// Line ending type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LineEnding {
    /// Carriage Return only
    Cr,
    /// Line Feed only
    #[default]
    Lf,
    /// Both CR and LF
    CrLf,
}

impl LineEnding {
    /// Terminator text
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Cr => "\r",
            Self::Lf => "\n",
            Self::CrLf => "\r\n",
        }
    }
}

/// Timeouts and pacing, in milliseconds
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingSettings {
    /// Wait for a screen anchor or data line
    pub response_timeout_ms: u64,
    /// Wait for an identity reply
    pub identity_timeout_ms: u64,
    /// Pause between menu actions
    pub settle_ms: u64,
    /// Delay after each paced keystroke
    pub key_delay_ms: u64,
    /// Pause after the wake-up line
    pub wake_pause_ms: u64,
    /// Pause after each exit command during recovery
    pub exit_pause_ms: u64,
    /// Pause after a recovery round
    pub recovery_pause_ms: u64,
    /// Pause before switching to the fast rate
    pub baud_switch_ms: u64,
    /// Test mode warm-up
    pub warmup_ms: u64,
    /// Wait for the debugger banner after enabling it
    pub debugger_timeout_ms: u64,
    /// Hard-exit recovery rounds
    pub connect_retries: u32,
}

impl Default for TimingSettings {
    fn default() -> Self {
        Self {
            response_timeout_ms: 5000,
            identity_timeout_ms: 1000,
            settle_ms: 1000,
            key_delay_ms: 100,
            wake_pause_ms: 100,
            exit_pause_ms: 500,
            recovery_pause_ms: 1000,
            baud_switch_ms: 100,
            warmup_ms: 5000,
            debugger_timeout_ms: 10000,
            connect_retries: 10,
        }
    }
}

impl TimingSettings {
    /// No pauses and short waits, for scripted instruments
    pub fn immediate() -> Self {
        Self {
            response_timeout_ms: 50,
            identity_timeout_ms: 50,
            settle_ms: 0,
            key_delay_ms: 0,
            wake_pause_ms: 0,
            exit_pause_ms: 0,
            recovery_pause_ms: 0,
            baud_switch_ms: 0,
            warmup_ms: 0,
            debugger_timeout_ms: 50,
            connect_retries: 2,
        }
    }

    /// Anchor wait
    pub fn response_timeout(&self) -> Duration {
        ms(self.response_timeout_ms)
    }

    /// Menu settle pause
    pub fn settle(&self) -> Duration {
        ms(self.settle_ms)
    }

    /// Paced keystroke delay
    pub fn key_delay(&self) -> Duration {
        ms(self.key_delay_ms)
    }

    /// Pause before the fast rate switch
    pub fn baud_switch(&self) -> Duration {
        ms(self.baud_switch_ms)
    }

    /// Test mode warm-up
    pub fn warmup(&self) -> Duration {
        ms(self.warmup_ms)
    }

    /// Debugger enable wait
    pub fn debugger_timeout(&self) -> Duration {
        ms(self.debugger_timeout_ms)
    }
}

/// Output locations
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputSettings {
    /// Directory ROM and module directories are created in
    pub root: PathBuf,
    /// Keep staging files after a complete dump
    pub keep_staging: bool,
    /// Transcript file name, relative to the root
    pub transcript: String,
}

impl Default for OutputSettings {
    fn default() -> Self {
        Self {
            root: PathBuf::from("."),
            keep_staging: false,
            transcript: "transcript.log".to_string(),
        }
    }
}

/// Module slots to dump
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModuleSettings {
    /// Slot numbers, 1..=4
    pub slots: Vec<u8>,
}

impl Default for ModuleSettings {
    fn default() -> Self {
        Self {
            slots: vec![1, 2, 3, 4],
        }
    }
}

/// One entry of the ROM dump plan
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RomImage {
    /// Subsystem debugger key
    pub subsystem: char,
    /// First byte address
    pub start: u32,
    /// Bytes to read
    pub count: u32,
    /// Word byte order
    #[serde(default)]
    pub byte_order: ByteOrder,
    /// Identity subsystems whose version names the files, first present wins
    #[serde(default)]
    pub version_keys: Vec<String>,
    /// Output files; `{version}` is replaced by the subsystem version
    #[serde(default)]
    pub files: Vec<String>,
}

impl RomImage {
    /// Little-endian entry
    pub fn new(subsystem: char, start: u32, count: u32, keys: &[&str], files: &[&str]) -> Self {
        Self {
            subsystem,
            start,
            count,
            byte_order: ByteOrder::Little,
            version_keys: keys.iter().map(|k| k.to_string()).collect(),
            files: files.iter().map(|f| f.to_string()).collect(),
        }
    }

    /// Dump job with `{version}` filled in
    pub fn to_dump(&self, version: &str) -> MemoryDump {
        MemoryDump::new(self.subsystem, self.start, self.count)
            .with_byte_order(self.byte_order)
            .with_files(self.files.iter().map(|f| f.replace("{version}", version)))
    }
}

/// The instrument's ROM map
pub fn default_rom_plan() -> Vec<RomImage> {
    const ACQ: &[&str] = &["ACQM1", "ACQM2"];
    const DSY: &[&str] = &["DSY"];
    const TBC: &[&str] = &["TBC"];
    const EXP: &[&str] = &["EXP"];

    vec![
        RomImage {
            byte_order: ByteOrder::Big,
            ..RomImage::new('d', 0x8000, 0x8000, ACQ, &["A28_U611_ACQ_{version}_UPPER.bin"])
        },
        RomImage::new('b', 0xe0000, 0x20000, DSY, &["A15_U140_DSY_{version}.bin", "A15_U150_DSY_{version}.bin"]),
        RomImage::new('c', 0xc0000, 0x20000, TBC, &["A5_U300_TBC_{version}.bin", "A5_U400_TBC_{version}.bin"]),
        RomImage::new('c', 0xe0000, 0x20000, TBC, &["A5_U310_TBC_{version}.bin", "A5_U410_TBC_{version}.bin"]),
        RomImage::new('c', 0x10000, 0x10000, TBC, &["A5_U500_TBC_{version}.bin", "A5_U511_TBC_{version}.bin"]),
        RomImage::new('a', 0xfc0000, 0x40000, EXP, &["A18_U800_EXP_{version}.bin", "A18_U900_EXP_{version}.bin"]),
        RomImage::new('a', 0xf80000, 0x40000, EXP, &["A18_U810_EXP_{version}.bin", "A18_U910_EXP_{version}.bin"]),
        RomImage::new('a', 0xf40000, 0x40000, EXP, &["A18_U820_EXP_{version}.bin", "A18_U920_EXP_{version}.bin"]),
        RomImage::new('a', 0xf00000, 0x40000, EXP, &["A18_U830_EXP_{version}.bin", "A18_U930_EXP_{version}.bin"]),
        RomImage::new('a', 0x3e0000, 0x20000, EXP, &["A18_NVRAM_EXP_{version}.bin"]),
    ]
}

fn ms(millis: u64) -> Duration {
    Duration::from_millis(millis)
}
