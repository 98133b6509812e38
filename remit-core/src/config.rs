//! Configuration management
//!
//! Settings live in `settings.json` inside the remit directory:
//! ```json
//! {
//!   "transfer": { "maxAttempts": 5, "baseDelayMs": 100, "timeoutMs": null },
//!   "logging": { "level": "info" }
//! }
//! ```
//!
//! Keys this crate doesn't manage are preserved when saving.

use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{anyhow, bail, Result};
use serde::{Deserialize, Serialize};

use crate::domain::{RetryPolicy, DEFAULT_BASE_DELAY_MS, DEFAULT_MAX_ATTEMPTS};

pub const SETTINGS_FILE: &str = "settings.json";

const DEFAULT_LOG_LEVEL: &str = "info";
const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error", "off"];

/// Keys accepted by [`Config::set`]
pub const CONFIG_KEYS: &[&str] = &[
    "transfer.maxAttempts",
    "transfer.baseDelayMs",
    "transfer.timeoutMs",
    "logging.level",
];

/// Raw settings.json structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SettingsFile {
    #[serde(default)]
    transfer: TransferSettings,
    #[serde(default)]
    logging: LoggingSettings,
    #[serde(flatten)]
    other: HashMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TransferSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    max_attempts: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    base_delay_ms: Option<u64>,
    #[serde(default)]
    timeout_ms: Option<u64>,
    #[serde(flatten)]
    other: HashMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LoggingSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    level: Option<String>,
    #[serde(flatten)]
    other: HashMap<String, serde_json::Value>,
}

/// Remit configuration (simplified view of settings)
#[derive(Debug, Clone)]
pub struct Config {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    /// Overall budget for one transfer; `None` means unbounded
    pub timeout_ms: Option<u64>,
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay_ms: DEFAULT_BASE_DELAY_MS,
            timeout_ms: None,
            log_level: DEFAULT_LOG_LEVEL.to_string(),
        }
    }
}

impl Config {
    /// Load config from the remit directory
    ///
    /// Environment variables take precedence over the file:
    /// `REMIT_MAX_ATTEMPTS`, `REMIT_BASE_DELAY_MS`, `REMIT_TIMEOUT_MS`
    /// (`0` disables the timeout) and `REMIT_LOG_LEVEL`.
    pub fn load(remit_dir: &Path) -> Result<Self> {
        Self::load_with_env(remit_dir, |name| std::env::var(name).ok())
    }

    /// Like [`load`](Self::load) with a custom environment lookup
    pub fn load_with_env(remit_dir: &Path, env: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let raw = read_settings(remit_dir)?;
        let defaults = Self::default();

        let mut config = Self {
            max_attempts: raw.transfer.max_attempts.unwrap_or(defaults.max_attempts),
            base_delay_ms: raw.transfer.base_delay_ms.unwrap_or(defaults.base_delay_ms),
            timeout_ms: raw.transfer.timeout_ms.filter(|ms| *ms > 0),
            log_level: raw.logging.level.unwrap_or(defaults.log_level),
        };

        if let Some(v) = parse_env::<u32>(&env, "REMIT_MAX_ATTEMPTS") {
            config.max_attempts = v;
        }
        if let Some(v) = parse_env::<u64>(&env, "REMIT_BASE_DELAY_MS") {
            config.base_delay_ms = v;
        }
        if let Some(v) = parse_env::<u64>(&env, "REMIT_TIMEOUT_MS") {
            config.timeout_ms = Some(v).filter(|ms| *ms > 0);
        }
        if let Some(v) = env("REMIT_LOG_LEVEL") {
            let level = v.trim().to_lowercase();
            if LOG_LEVELS.contains(&level.as_str()) {
                config.log_level = level;
            } else {
                tracing::warn!(value = %v, "ignoring invalid REMIT_LOG_LEVEL");
            }
        }

        config.max_attempts = config.max_attempts.max(1);
        Ok(config)
    }

    /// Save config to the remit directory, preserving unmanaged keys
    pub fn save(&self, remit_dir: &Path) -> Result<()> {
        let mut settings = read_settings(remit_dir)?;

        settings.transfer.max_attempts = Some(self.max_attempts);
        settings.transfer.base_delay_ms = Some(self.base_delay_ms);
        settings.transfer.timeout_ms = self.timeout_ms;
        settings.logging.level = Some(self.log_level.clone());

        std::fs::create_dir_all(remit_dir)?;
        let content = serde_json::to_string_pretty(&settings)?;
        std::fs::write(remit_dir.join(SETTINGS_FILE), content)?;
        Ok(())
    }

    /// Update a single setting by its dotted key (see [`CONFIG_KEYS`])
    pub fn set(&mut self, key: &str, value: &str) -> Result<()> {
        let value = value.trim();
        match key {
            "transfer.maxAttempts" => {
                let attempts: u32 = parse_value(key, value)?;
                if attempts == 0 {
                    bail!("transfer.maxAttempts must be at least 1");
                }
                self.max_attempts = attempts;
            }
            "transfer.baseDelayMs" => self.base_delay_ms = parse_value(key, value)?,
            "transfer.timeoutMs" => {
                self.timeout_ms = if value.eq_ignore_ascii_case("none") {
                    None
                } else {
                    Some(parse_value::<u64>(key, value)?).filter(|ms| *ms > 0)
                };
            }
            "logging.level" => {
                let level = value.to_lowercase();
                if !LOG_LEVELS.contains(&level.as_str()) {
                    bail!(
                        "Invalid log level '{}'. Expected one of: {}",
                        value,
                        LOG_LEVELS.join(", ")
                    );
                }
                self.log_level = level;
            }
            _ => bail!(
                "Unknown config key '{}'. Expected one of: {}",
                key,
                CONFIG_KEYS.join(", ")
            ),
        }
        Ok(())
    }

    /// Retry policy for the transfer engine
    pub fn retry_policy(&self) -> RetryPolicy {
        let policy = RetryPolicy::new(self.max_attempts, Duration::from_millis(self.base_delay_ms));
        match self.timeout_ms {
            Some(ms) => policy.with_timeout(Duration::from_millis(ms)),
            None => policy,
        }
    }
}

fn read_settings(remit_dir: &Path) -> Result<SettingsFile> {
    let settings_path = remit_dir.join(SETTINGS_FILE);
    if !settings_path.exists() {
        return Ok(SettingsFile::default());
    }

    let content = std::fs::read_to_string(&settings_path)?;
    match serde_json::from_str(&content) {
        Ok(settings) => Ok(settings),
        Err(e) => {
            tracing::warn!(path = %settings_path.display(), error = %e, "unreadable settings, using defaults");
            Ok(SettingsFile::default())
        }
    }
}

fn parse_env<T: FromStr>(env: &impl Fn(&str) -> Option<String>, name: &str) -> Option<T> {
    let raw = env(name)?;
    match raw.trim().parse() {
        Ok(v) => Some(v),
        Err(_) => {
            tracing::warn!(variable = name, value = %raw, "ignoring invalid environment override");
            None
        }
    }
}

fn parse_value<T: FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .parse()
        .map_err(|_| anyhow!("Invalid value '{}' for {}", value, key))
}
