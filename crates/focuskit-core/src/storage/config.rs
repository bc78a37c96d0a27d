//! TOML-based timer configuration.
//!
//! Stores user preferences including:
//! - Focus and break durations, and the long-break interval
//! - Break and continuation behavior
//! - Notification and sound preferences
//! - Distraction blocking
//!
//! Configuration is stored at `~/.config/focuskit/config.toml`.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::data_dir;
use crate::error::ConfigError;
use crate::timer::MAX_COUNTDOWN_MINUTES;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DurationsConfig {
    #[serde(default = "default_focus_minutes")]
    pub focus_minutes: u32,
    #[serde(default = "default_short_break")]
    pub short_break_minutes: u32,
    #[serde(default = "default_long_break")]
    pub long_break_minutes: u32,
    /// Every Nth completed focus unit earns a long break.
    #[serde(default = "default_long_break_interval")]
    pub long_break_interval: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BehaviorConfig {
    /// Enter the break countdown as soon as a focus session completes.
    #[serde(default = "default_true")]
    pub auto_start_breaks: bool,
    /// Start the next focus session when a break completes.
    #[serde(default)]
    pub auto_continue: bool,
    /// Saved sessions older than this are discarded at startup.
    #[serde(default = "default_stale_after_hours")]
    pub stale_after_hours: u32,
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationsConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_true")]
    pub sound_enabled: bool,
    #[serde(default = "default_completion_sound")]
    pub completion_sound: String,
    #[serde(default = "default_break_end_sound")]
    pub break_end_sound: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockingConfig {
    #[serde(default)]
    pub enabled: bool,
}

/// Timer configuration.
///
/// Serialized to/from TOML at `~/.config/focuskit/config.toml`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimerConfig {
    #[serde(default)]
    pub durations: DurationsConfig,
    #[serde(default)]
    pub behavior: BehaviorConfig,
    #[serde(default)]
    pub notifications: NotificationsConfig,
    #[serde(default)]
    pub blocking: BlockingConfig,
}

fn default_focus_minutes() -> u32 {
    25
}
fn default_short_break() -> u32 {
    5
}
fn default_long_break() -> u32 {
    15
}
fn default_long_break_interval() -> u32 {
    4
}
fn default_true() -> bool {
    true
}
fn default_stale_after_hours() -> u32 {
    24
}
fn default_tick_interval_ms() -> u64 {
    1000
}
fn default_completion_sound() -> String {
    "bell".into()
}
fn default_break_end_sound() -> String {
    "chime".into()
}

impl Default for DurationsConfig {
    fn default() -> Self {
        Self {
            focus_minutes: default_focus_minutes(),
            short_break_minutes: default_short_break(),
            long_break_minutes: default_long_break(),
            long_break_interval: default_long_break_interval(),
        }
    }
}

impl Default for BehaviorConfig {
    fn default() -> Self {
        Self {
            auto_start_breaks: true,
            auto_continue: false,
            stale_after_hours: default_stale_after_hours(),
            tick_interval_ms: default_tick_interval_ms(),
        }
    }
}

/// Ticks a running owner may miss before another surface takes the session
/// over.
pub const OWNER_SILENCE_TICKS: u64 = 5;

impl BehaviorConfig {
    /// How long a running session may go without a snapshot write before its
    /// owner is considered gone.
    pub fn owner_silence(&self) -> chrono::Duration {
        let millis = self.tick_interval_ms.max(1).saturating_mul(OWNER_SILENCE_TICKS);
        chrono::Duration::milliseconds(i64::try_from(millis).unwrap_or(i64::MAX))
    }
}

impl Default for NotificationsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            sound_enabled: true,
            completion_sound: default_completion_sound(),
            break_end_sound: default_break_end_sound(),
        }
    }
}

impl TimerConfig {
    fn get_json_value_by_path<'a>(
        root: &'a serde_json::Value,
        key: &str,
    ) -> Option<&'a serde_json::Value> {
        if key.is_empty() {
            return None;
        }

        let mut current = root;
        for part in key.split('.') {
            current = current.get(part)?;
        }
        Some(current)
    }

    fn set_json_value_by_path(
        root: &mut serde_json::Value,
        key: &str,
        value: &str,
    ) -> Result<(), ConfigError> {
        let unknown = || ConfigError::UnknownKey(key.to_string());
        let invalid = |message: String| ConfigError::InvalidValue {
            key: key.to_string(),
            message,
        };

        let (parent_path, leaf) = match key.rsplit_once('.') {
            Some((parent, leaf)) => (Some(parent), leaf),
            None => (None, key),
        };
        if leaf.is_empty() {
            return Err(unknown());
        }

        let mut current = root;
        if let Some(parent_path) = parent_path {
            for part in parent_path.split('.') {
                current = current.get_mut(part).ok_or_else(unknown)?;
            }
        }
        let obj = current.as_object_mut().ok_or_else(unknown)?;
        let existing = obj.get(leaf).ok_or_else(unknown)?;

        let new_value = match existing {
            serde_json::Value::Bool(_) => serde_json::Value::Bool(
                value
                    .parse::<bool>()
                    .map_err(|e| invalid(e.to_string()))?,
            ),
            serde_json::Value::Number(_) => {
                let n = value
                    .parse::<u64>()
                    .map_err(|_| invalid(format!("cannot parse '{value}' as a whole number")))?;
                serde_json::Value::Number(n.into())
            }
            serde_json::Value::Object(_) | serde_json::Value::Array(_) => {
                return Err(invalid("cannot set a whole section".into()));
            }
            _ => serde_json::Value::String(value.into()),
        };

        obj.insert(leaf.to_string(), new_value);
        Ok(())
    }

    /// Location of the config file, `~/.config/focuskit/config.toml`.
    pub fn path() -> Result<PathBuf, ConfigError> {
        let dir = data_dir().map_err(|e| ConfigError::LoadFailed {
            path: PathBuf::from("~/.config/focuskit"),
            message: e.to_string(),
        })?;
        Ok(dir.join("config.toml"))
    }

    /// Load from disk, writing defaults when no file exists yet.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file exists but cannot be parsed,
    /// or if the default config cannot be written to disk.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&Self::path()?)
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(path) {
            Ok(content) => {
                let cfg: Self = toml::from_str(&content).map_err(|e| ConfigError::LoadFailed {
                    path: path.to_path_buf(),
                    message: e.to_string(),
                })?;
                cfg.validate()?;
                Ok(cfg)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                let cfg = Self::default();
                cfg.save_to(path)?;
                Ok(cfg)
            }
            Err(e) => Err(ConfigError::LoadFailed {
                path: path.to_path_buf(),
                message: e.to_string(),
            }),
        }
    }

    /// Persist to disk.
    ///
    /// # Errors
    ///
    /// Returns an error if the config cannot be serialized or written to disk.
    pub fn save(&self) -> Result<(), ConfigError> {
        self.save_to(&Self::path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        let save_failed = |message: String| ConfigError::SaveFailed {
            path: path.to_path_buf(),
            message,
        };
        let content = self.to_toml().map_err(save_failed)?;
        std::fs::write(path, content).map_err(|e| save_failed(e.to_string()))
    }

    /// The config as it is written to disk, one table per section.
    pub fn to_toml(&self) -> Result<String, String> {
        toml::to_string_pretty(self).map_err(|e| e.to_string())
    }

    /// Every settable key with its current value, in `section.key` form.
    pub fn entries(&self) -> Vec<(String, String)> {
        let Ok(serde_json::Value::Object(sections)) = serde_json::to_value(self) else {
            return Vec::new();
        };
        let mut entries = Vec::new();
        for (section, fields) in sections {
            let serde_json::Value::Object(fields) = fields else {
                continue;
            };
            for (key, value) in fields {
                let value = match value {
                    serde_json::Value::String(s) => s,
                    other => other.to_string(),
                };
                entries.push((format!("{section}.{key}"), value));
            }
        }
        entries
    }

    /// Load from disk, returning default on error.
    pub fn load_or_default() -> Self {
        Self::load().unwrap_or_else(|e| {
            tracing::warn!(error = %e, "falling back to default config");
            Self::default()
        })
    }

    /// Get a config value as string by dot-separated key.
    pub fn get(&self, key: &str) -> Option<String> {
        let json = serde_json::to_value(self).ok()?;
        let val = Self::get_json_value_by_path(&json, key)?;
        match val {
            serde_json::Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }

    /// Set a config value by dot-separated key, in memory only.
    ///
    /// # Errors
    ///
    /// Returns an error if the key is unknown or the value does not parse as
    /// the key's type.
    pub fn set(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        let mut json = serde_json::to_value(&*self).map_err(|e| ConfigError::InvalidValue {
            key: key.to_string(),
            message: e.to_string(),
        })?;
        Self::set_json_value_by_path(&mut json, key, value)?;
        let updated: Self = serde_json::from_value(json).map_err(|e| ConfigError::InvalidValue {
            key: key.to_string(),
            message: e.to_string(),
        })?;
        updated.validate()?;
        *self = updated;
        Ok(())
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let check = |ok: bool, key: &str, message: &str| {
            if ok {
                Ok(())
            } else {
                Err(ConfigError::InvalidValue {
                    key: key.into(),
                    message: message.into(),
                })
            }
        };
        let minutes_ok = |minutes: u32| (1..=MAX_COUNTDOWN_MINUTES).contains(&minutes);
        let minutes_range = format!("must be between 1 and {MAX_COUNTDOWN_MINUTES}");
        check(
            minutes_ok(self.durations.focus_minutes),
            "durations.focus_minutes",
            &minutes_range,
        )?;
        check(
            minutes_ok(self.durations.short_break_minutes),
            "durations.short_break_minutes",
            &minutes_range,
        )?;
        check(
            minutes_ok(self.durations.long_break_minutes),
            "durations.long_break_minutes",
            &minutes_range,
        )?;
        check(
            self.durations.long_break_interval > 0,
            "durations.long_break_interval",
            "must be at least 1",
        )?;
        check(
            self.behavior.tick_interval_ms > 0,
            "behavior.tick_interval_ms",
            "must be at least 1",
        )
    }
}
