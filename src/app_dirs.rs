//! Application directory paths.
//!
//! Uses the [`dirs`] crate for platform-appropriate resolution.
//!
//! # Environment Overrides
//!
//! - `BEACON_CONFIG_DIR` overrides [`config_dir`]
//! - `BEACON_DATA_DIR` overrides [`data_dir`]

use std::path::PathBuf;

/// Application config directory, `dirs::config_dir()/beacon/` by default.
#[must_use]
pub fn config_dir() -> PathBuf {
    if let Some(override_dir) = std::env::var_os("BEACON_CONFIG_DIR") {
        return PathBuf::from(override_dir);
    }
    dirs::config_dir()
        .map(|d| d.join("beacon"))
        .unwrap_or_else(|| PathBuf::from("/tmp/beacon-config"))
}

/// Application data directory, `dirs::data_dir()/beacon/` by default.
///
/// Holds rotated host logs.
#[must_use]
pub fn data_dir() -> PathBuf {
    if let Some(override_dir) = std::env::var_os("BEACON_DATA_DIR") {
        return PathBuf::from(override_dir);
    }
    dirs::data_dir()
        .map(|d| d.join("beacon"))
        .unwrap_or_else(|| PathBuf::from("/tmp/beacon-data"))
}

/// Path of `config.toml` inside [`config_dir`].
#[must_use]
pub fn config_file() -> PathBuf {
    config_dir().join("config.toml")
}

/// Default directory for rotated log files.
#[must_use]
pub fn logs_dir() -> PathBuf {
    data_dir().join("logs")
}
