//! Configuration module
//!
//! Handles application settings and the ROM dump plan

mod settings;

pub use settings::{
    default_rom_plan, AppConfig, ConfigError, LineEnding, ModuleSettings, OutputSettings, RomImage,
    SerialSettings, TimingSettings,
};

use directories::ProjectDirs;
use std::path::PathBuf;

/// Get the application configuration directory
pub fn config_dir() -> Option<PathBuf> {
    ProjectDirs::from("org", "fwdump", "fwdump").map(|dirs| dirs.config_dir().to_path_buf())
}

/// Default config file location
pub fn config_file() -> Option<PathBuf> {
    config_dir().map(|d| d.join("config.toml"))
}
