//! Configuration types for the reminder engine.

use crate::app_dirs;
use crate::scheduler::tiers::Tier;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Duration;

/// Top-level configuration for the reminder engine.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Lead-time tiers evaluated against each item's due instant.
    pub tiers: TiersConfig,
    /// Catch-up sweep settings.
    pub catch_up: CatchUpConfig,
    /// Change feed reconnection settings.
    pub feed: FeedConfig,
    /// Notification dispatch settings.
    pub dispatch: DispatchConfig,
    /// Primary notification surface settings (host binary).
    pub surface: SurfaceConfig,
    /// Log output settings (host binary).
    pub logging: LoggingConfig,
}

/// Ordered list of lead-time tiers.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TiersConfig {
    /// One entry per tier.
    pub entries: Vec<TierConfig>,
}

impl Default for TiersConfig {
    fn default() -> Self {
        Self {
            entries: vec![
                TierConfig::new("5-min", 5 * 60),
                TierConfig::new("1-min", 60),
                TierConfig::new("due-now", 0),
            ],
        }
    }
}

/// A single lead-time tier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierConfig {
    /// Label used as the notification tag (e.g. `"5-min"`).
    pub label: String,
    /// Seconds before the due instant at which the tier fires.
    pub lead_secs: u64,
}

impl TierConfig {
    /// Build a tier entry.
    pub fn new(label: impl Into<String>, lead_secs: u64) -> Self {
        Self {
            label: label.into(),
            lead_secs,
        }
    }
}

/// Catch-up sweep configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CatchUpConfig {
    /// How far in the past a due-now trigger may be and still fire once.
    pub grace_secs: u64,
}

impl Default for CatchUpConfig {
    fn default() -> Self {
        Self { grace_secs: 60 }
    }
}

impl CatchUpConfig {
    /// Grace window as a duration.
    pub fn grace(&self) -> Duration {
        Duration::from_secs(self.grace_secs)
    }
}

/// Change feed reconnection policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FeedConfig {
    /// First delay after the feed drops.
    pub initial_backoff_ms: u64,
    /// Upper bound for the doubling backoff.
    pub max_backoff_ms: u64,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            initial_backoff_ms: 500,
            max_backoff_ms: 30_000,
        }
    }
}

/// Notification dispatch configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    /// Number of dispatch records kept in memory.
    pub history_limit: usize,
    /// Buffer size of the fallback broadcast channel.
    pub fallback_capacity: usize,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            history_limit: 400,
            fallback_capacity: 64,
        }
    }
}

/// Primary surface configuration for the host binary.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SurfaceConfig {
    /// When `false` the host's primary surface reports permission denied.
    pub primary_enabled: bool,
}

impl Default for SurfaceConfig {
    fn default() -> Self {
        Self {
            primary_enabled: true,
        }
    }
}

/// Log output configuration for the host binary.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `EnvFilter` directive used when `RUST_LOG` is unset.
    pub filter: String,
    /// Also write daily-rotated log files.
    pub file: bool,
    /// Directory for log files; [`app_dirs::logs_dir`] when unset.
    ///
    /// Setting it turns file logging on.
    pub file_dir: Option<PathBuf>,
}

impl LoggingConfig {
    /// Directory to write log files to, or `None` for stderr only.
    pub fn file_directory(&self) -> Option<PathBuf> {
        match &self.file_dir {
            Some(dir) => Some(dir.clone()),
            None if self.file => Some(app_dirs::logs_dir()),
            None => None,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "beacon=info".to_owned(),
            file: false,
            file_dir: None,
        }
    }
}

impl EngineConfig {
    /// Load configuration from a TOML file, falling back to defaults for missing fields.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &std::path::Path) -> crate::error::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| crate::error::ReminderError::Config(e.to_string()))
    }

    /// Save configuration to a TOML file, creating parent directories as needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written or the config cannot be serialized.
    pub fn save_to_file(&self, path: &std::path::Path) -> crate::error::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| crate::error::ReminderError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Returns the default config file path: `<config dir>/beacon/config.toml`.
    pub fn default_config_path() -> PathBuf {
        crate::app_dirs::config_file()
    }

    /// Validate the tier list and return it ordered by descending lead time.
    ///
    /// # Errors
    ///
    /// Returns [`ReminderError::Config`](crate::ReminderError::Config) for an
    /// empty tier list, an empty label, or a duplicated label.
    pub fn tiers(&self) -> crate::error::Result<Vec<Tier>> {
        if self.tiers.entries.is_empty() {
            return Err(crate::error::ReminderError::Config(
                "at least one reminder tier is required".to_owned(),
            ));
        }

        let mut seen = HashSet::new();
        let mut tiers = Vec::with_capacity(self.tiers.entries.len());
        for entry in &self.tiers.entries {
            let label = entry.label.trim();
            if label.is_empty() {
                return Err(crate::error::ReminderError::Config(
                    "reminder tier label must not be empty".to_owned(),
                ));
            }
            if !seen.insert(label.to_owned()) {
                return Err(crate::error::ReminderError::Config(format!(
                    "duplicate reminder tier label '{label}'"
                )));
            }
            tiers.push(Tier::new(label, Duration::from_secs(entry.lead_secs)));
        }

        tiers.sort_by(|a, b| b.lead().cmp(&a.lead()));
        Ok(tiers)
    }

    /// Validate every section.
    ///
    /// # Errors
    ///
    /// Returns the first configuration problem found.
    pub fn validate(&self) -> crate::error::Result<()> {
        self.tiers()?;
        if self.feed.initial_backoff_ms == 0 || self.feed.max_backoff_ms < self.feed.initial_backoff_ms
        {
            return Err(crate::error::ReminderError::Config(format!(
                "feed backoff must satisfy 0 < initial ({}) <= max ({})",
                self.feed.initial_backoff_ms, self.feed.max_backoff_ms
            )));
        }
        if self.dispatch.fallback_capacity == 0 {
            return Err(crate::error::ReminderError::Config(
                "fallback_capacity must be at least 1".to_owned(),
            ));
        }
        Ok(())
    }
}
