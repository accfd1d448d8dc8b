//! Configuration for the switch controller and the menu layer.
//!
//! # Module Structure
//!
//! - `SwitchConfig`: controller settings fixed at process start (status file,
//!   poll interval, restart baseline). Read from the environment once.
//! - `AppSettings`: the two user preferences the menu layer reads
//!   (`auto_logout`, `logout_delay_ms`), loaded from
//!   `~/.config/prime-switch/settings.json`.
//!
//! # Restart baseline
//!
//! The baseline is the profile seen when the session started. It is passed to
//! the controller explicitly. The binary reads `PRIME_SWITCH_BASELINE` once at
//! start and, after the controller has settled on a baseline, exports it again
//! so child processes of the same session agree.

use crate::error::ConfigError;
use crate::models::GpuProfile;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Status file rewritten by `prime-select` on every profile change.
pub const DEFAULT_STATUS_FILE: &str = "/etc/prime-discrete";

/// Environment variable carrying the session's restart baseline.
pub const BASELINE_ENV: &str = "PRIME_SWITCH_BASELINE";

/// Environment variable overriding the status file path.
pub const STATUS_FILE_ENV: &str = "PRIME_SWITCH_STATUS_FILE";

const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(1000);

/// Upper bound accepted for `logout_delay_ms`.
const MAX_LOGOUT_DELAY_MS: u64 = 60_000;

/// Controller configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwitchConfig {
    pub status_file: PathBuf,
    pub poll_interval: Duration,
    /// Restart baseline. `None` lets the controller record its first query.
    pub baseline: Option<GpuProfile>,
}

impl Default for SwitchConfig {
    fn default() -> Self {
        SwitchConfig {
            status_file: PathBuf::from(DEFAULT_STATUS_FILE),
            poll_interval: DEFAULT_POLL_INTERVAL,
            baseline: None,
        }
    }
}

impl SwitchConfig {
    /// Read overrides from the process environment.
    ///
    /// An unparsable or `unknown` baseline is ignored so the controller
    /// detects a fresh one.
    pub fn from_env() -> Self {
        let mut config = SwitchConfig::default();

        if let Ok(path) = std::env::var(STATUS_FILE_ENV) {
            if !path.trim().is_empty() {
                config.status_file = PathBuf::from(path.trim());
            }
        }

        if let Ok(value) = std::env::var(BASELINE_ENV) {
            match value.parse::<GpuProfile>() {
                Ok(profile) if profile.is_switchable() => config.baseline = Some(profile),
                Ok(_) => {}
                Err(e) => log::warn!("[Config] ignoring {}: {}", BASELINE_ENV, e),
            }
        }

        config
    }

    pub fn with_baseline(mut self, baseline: GpuProfile) -> Self {
        self.baseline = Some(baseline);
        self
    }

    pub fn with_status_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.status_file = path.into();
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }
}

/// Export the baseline for child processes of this session.
pub fn export_baseline(profile: GpuProfile) {
    if profile.is_switchable() {
        std::env::set_var(BASELINE_ENV, profile.as_str());
    }
}

/// User preferences read by the menu layer.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct AppSettings {
    /// Log out automatically after a successful switch that needs a restart.
    pub auto_logout: bool,
    /// Delay between showing "Logging out..." and requesting the logout.
    pub logout_delay_ms: u64,
}

impl Default for AppSettings {
    fn default() -> Self {
        AppSettings {
            auto_logout: false,
            logout_delay_ms: 1000,
        }
    }
}

impl AppSettings {
    pub fn logout_delay(&self) -> Duration {
        Duration::from_millis(self.logout_delay_ms)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.logout_delay_ms > MAX_LOGOUT_DELAY_MS {
            return Err(ConfigError::ValidationFailed(format!(
                "logout_delay_ms must be at most {}, got {}",
                MAX_LOGOUT_DELAY_MS, self.logout_delay_ms
            )));
        }
        Ok(())
    }
}

/// Get the global settings path: ~/.config/prime-switch/settings.json
pub fn get_global_settings_path() -> Result<PathBuf, ConfigError> {
    let home = dirs::home_dir().ok_or_else(|| {
        ConfigError::ValidationFailed("Cannot determine home directory".to_string())
    })?;

    Ok(home.join(".config/prime-switch/settings.json"))
}

/// Read-only access to `AppSettings`.
pub struct SettingsManager;

impl SettingsManager {
    /// Load settings from the global path, falling back to defaults.
    pub fn load() -> AppSettings {
        match get_global_settings_path().and_then(|path| Self::load_from(&path)) {
            Ok(settings) => settings,
            Err(e) => {
                log::warn!("[Config] {}, using default settings", e);
                AppSettings::default()
            }
        }
    }

    /// Load settings from `path`.
    ///
    /// A missing file yields defaults. Malformed JSON is logged and yields
    /// defaults. Out-of-range values and I/O failures are errors.
    pub fn load_from(path: &Path) -> Result<AppSettings, ConfigError> {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                log::debug!("[Config] no settings at {}, using defaults", path.display());
                return Ok(AppSettings::default());
            }
            Err(e) => return Err(ConfigError::IoError(e)),
        };

        let settings = match serde_json::from_str::<AppSettings>(&content) {
            Ok(settings) => settings,
            Err(e) => {
                log::warn!(
                    "[Config] failed to parse {}, falling back to defaults: {}",
                    path.display(),
                    ConfigError::InvalidJson(e)
                );
                return Ok(AppSettings::default());
            }
        };

        settings.validate()?;
        Ok(settings)
    }
}
