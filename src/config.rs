//! Runtime configuration read from the process environment.
//!
//! | Variable                          | Default                                          |
//! |-----------------------------------|--------------------------------------------------|
//! | `COASTER_DB_PATH`                 | `<data dir>/coastercompanion/coastercompanion.db` |
//! | `COASTER_SOUND_FILE`              | `<data dir>/coastercompanion/sounds/alarm.mp3`    |
//! | `COASTER_DEVICE_PATH`             | unset (no device link)                            |
//! | `COASTER_VOLUME`                  | `0.7`                                             |
//! | `COASTER_WAKE_LOCK_TIMEOUT_SECS`  | `60`                                              |
//! | `COASTER_EXACT_ALARMS`            | `true`                                            |

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use log::info;

use crate::audio::DEFAULT_VOLUME;
use crate::error::{AppError, AppResult};
use crate::wake::DEFAULT_WAKE_LOCK_TIMEOUT;

const APP_DIR: &str = "coastercompanion";

#[derive(Debug, Clone, PartialEq)]
pub struct AppConfig {
    pub db_path: PathBuf,
    pub sound_file: Option<PathBuf>,
    pub device_path: Option<PathBuf>,
    pub volume: f32,
    pub wake_lock_timeout: Duration,
    /// Whether exact alarm-clock registrations are permitted.
    pub exact_alarms: bool,
}

fn app_data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR)
}

impl Default for AppConfig {
    fn default() -> Self {
        let data_dir = app_data_dir();
        Self {
            db_path: data_dir.join("coastercompanion.db"),
            sound_file: Some(data_dir.join("sounds").join("alarm.mp3")),
            device_path: None,
            volume: DEFAULT_VOLUME,
            wake_lock_timeout: DEFAULT_WAKE_LOCK_TIMEOUT,
            exact_alarms: true,
        }
    }
}

impl AppConfig {
    pub fn from_env() -> AppResult<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build a config from an arbitrary key lookup. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> AppResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let mut config = Self::default();

        if let Some(path) = get("COASTER_DB_PATH") {
            config.db_path = PathBuf::from(path);
        }
        if let Some(path) = get("COASTER_SOUND_FILE") {
            config.sound_file = Some(PathBuf::from(path));
        }
        config.device_path = get("COASTER_DEVICE_PATH").map(PathBuf::from);

        if let Some(raw) = get("COASTER_VOLUME") {
            config.volume = raw
                .parse()
                .map_err(|_| AppError::config(format!("COASTER_VOLUME is not a number: {}", raw)))?;
        }
        if let Some(raw) = get("COASTER_WAKE_LOCK_TIMEOUT_SECS") {
            let secs: u64 = raw.parse().map_err(|_| {
                AppError::config(format!("COASTER_WAKE_LOCK_TIMEOUT_SECS is not a whole number: {}", raw))
            })?;
            config.wake_lock_timeout = Duration::from_secs(secs);
        }
        if let Some(raw) = get("COASTER_EXACT_ALARMS") {
            config.exact_alarms = parse_flag(&raw)
                .ok_or_else(|| AppError::config(format!("COASTER_EXACT_ALARMS is not a boolean: {}", raw)))?;
        }

        validate_config(&config)?;
        Ok(config)
    }
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Reject values the rest of the app cannot work with.
pub fn validate_config(config: &AppConfig) -> AppResult<()> {
    if !(0.0..=1.0).contains(&config.volume) {
        return Err(AppError::config(format!(
            "volume must be between 0.0 and 1.0, got {}",
            config.volume
        )));
    }
    if config.wake_lock_timeout.is_zero() {
        return Err(AppError::config("wake lock timeout must be positive"));
    }
    if config.db_path.as_os_str().is_empty() {
        return Err(AppError::config("database path is empty"));
    }

    info!(
        "Configuration: db={:?} device={:?} volume={:.2} exact_alarms={}",
        config.db_path, config.device_path, config.volume, config.exact_alarms
    );
    Ok(())
}
