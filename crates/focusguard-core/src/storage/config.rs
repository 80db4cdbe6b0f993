//! TOML-based engine configuration.
//!
//! Stores:
//! - Soft shield thresholds and tick cadence
//! - The allowed session durations and clock cadence
//!
//! Configuration is stored at `~/.config/focusguard/config.toml`.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use super::data_dir;
use crate::error::ConfigError;
use crate::shield::ShieldConfig;

/// Slowest tick cadence the runtime accepts.
const MAX_TICK_INTERVAL_MS: u64 = 60_000;

/// Session-specific configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Durations (minutes) a session may be started with.
    #[serde(default = "default_allowed_durations")]
    pub allowed_durations_min: Vec<u32>,
    #[serde(default = "default_clock_tick_interval_ms")]
    pub clock_tick_interval_ms: u64,
}

fn default_allowed_durations() -> Vec<u32> {
    vec![15, 25, 45, 60, 90, 120]
}
fn default_clock_tick_interval_ms() -> u64 {
    1000
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            allowed_durations_min: default_allowed_durations(),
            clock_tick_interval_ms: default_clock_tick_interval_ms(),
        }
    }
}

impl SessionConfig {
    pub fn is_allowed(&self, minutes: u32) -> bool {
        self.allowed_durations_min.contains(&minutes)
    }
}

/// Engine configuration.
///
/// Serialized to/from TOML at `~/.config/focusguard/config.toml`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub shield: ShieldConfig,
    #[serde(default)]
    pub session: SessionConfig,
}

impl Config {
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
            serde_json::Value::Number(_) => value
                .parse::<u64>()
                .map(|n| serde_json::Value::Number(n.into()))
                .map_err(|_| invalid(format!("cannot parse '{value}' as a whole number")))?,
            serde_json::Value::Array(_) | serde_json::Value::Object(_) => {
                serde_json::from_str(value).map_err(|e| invalid(e.to_string()))?
            }
            _ => serde_json::Value::String(value.into()),
        };

        obj.insert(leaf.to_string(), new_value);
        Ok(())
    }

    /// Default config file location.
    ///
    /// # Errors
    /// Returns an error if the data directory cannot be created.
    pub fn path() -> Result<PathBuf, ConfigError> {
        Ok(data_dir()?.join("config.toml"))
    }

    /// Load from the default location, writing defaults if the file is missing.
    ///
    /// # Errors
    /// Returns an error if the file exists but cannot be parsed or is invalid,
    /// or if the default config cannot be written.
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::path()?;
        if path.exists() {
            Self::load_from(&path)
        } else {
            let cfg = Self::default();
            cfg.save_to(&path)?;
            Ok(cfg)
        }
    }

    /// Load and validate a config file.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read, parsed, or validated.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let load_failed = |message: String| ConfigError::LoadFailed {
            path: path.to_path_buf(),
            message,
        };
        let content = std::fs::read_to_string(path).map_err(|e| load_failed(e.to_string()))?;
        let cfg: Config = toml::from_str(&content).map_err(|e| load_failed(e.to_string()))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Persist to the default location.
    ///
    /// # Errors
    /// Returns an error if the config cannot be serialized or written.
    pub fn save(&self) -> Result<(), ConfigError> {
        self.save_to(&Self::path()?)
    }

    /// Persist to `path`.
    ///
    /// # Errors
    /// Returns an error if the config cannot be serialized or written.
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        let save_failed = |message: String| ConfigError::SaveFailed {
            path: path.to_path_buf(),
            message,
        };
        let content = toml::to_string_pretty(self).map_err(|e| save_failed(e.to_string()))?;
        std::fs::write(path, content).map_err(|e| save_failed(e.to_string()))?;
        Ok(())
    }

    /// Load from disk, returning default on error.
    pub fn load_or_default() -> Self {
        match Self::load() {
            Ok(cfg) => cfg,
            Err(err) => {
                tracing::warn!(error = %err, "falling back to default config");
                Self::default()
            }
        }
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

    /// Set a config value by dot-separated key. The result must still validate;
    /// on any error `self` is left unchanged.
    ///
    /// # Errors
    /// Returns an error if the key is unknown or the value does not parse or validate.
    pub fn set(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        let mut json = serde_json::to_value(&*self).map_err(|e| ConfigError::InvalidValue {
            key: key.to_string(),
            message: e.to_string(),
        })?;
        Self::set_json_value_by_path(&mut json, key, value)?;
        let updated: Config =
            serde_json::from_value(json).map_err(|e| ConfigError::InvalidValue {
                key: key.to_string(),
                message: e.to_string(),
            })?;
        updated.validate()?;
        *self = updated;
        Ok(())
    }

    /// Reject configurations the engine cannot run with.
    ///
    /// # Errors
    /// Returns [`ConfigError::InvalidValue`] naming the offending key.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |key: &str, message: &str| {
            Err(ConfigError::InvalidValue {
                key: key.to_string(),
                message: message.to_string(),
            })
        };

        if self.shield.away_threshold_secs == 0 {
            return invalid("shield.away_threshold_secs", "must be greater than zero");
        }
        if self.shield.away_threshold_secs.checked_mul(1000).is_none() {
            return invalid(
                "shield.away_threshold_secs",
                "too large to express in milliseconds",
            );
        }
        if self.shield.warning_threshold_secs == 0 {
            return invalid("shield.warning_threshold_secs", "must be greater than zero");
        }
        if self.shield.warning_threshold_secs >= self.shield.away_threshold_secs {
            return invalid(
                "shield.warning_threshold_secs",
                "must be below shield.away_threshold_secs",
            );
        }
        if !(1..=MAX_TICK_INTERVAL_MS).contains(&self.shield.tick_interval_ms) {
            return invalid("shield.tick_interval_ms", "must be between 1 and 60000");
        }
        if !(1..=MAX_TICK_INTERVAL_MS).contains(&self.session.clock_tick_interval_ms) {
            return invalid("session.clock_tick_interval_ms", "must be between 1 and 60000");
        }
        if self.session.allowed_durations_min.is_empty() {
            return invalid("session.allowed_durations_min", "must not be empty");
        }
        if self.session.allowed_durations_min.contains(&0) {
            return invalid("session.allowed_durations_min", "durations must be positive");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_roundtrip() {
        let cfg = Config::default();
        let toml_str = toml::to_string_pretty(&cfg).unwrap();
        let parsed: Config = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed, cfg);
    }

    #[test]
    fn config_default_values() {
        let cfg = Config::default();
        assert_eq!(cfg.shield.away_threshold_secs, 15);
        assert_eq!(cfg.shield.warning_threshold_secs, 10);
        assert_eq!(cfg.shield.tick_interval_ms, 1000);
        assert_eq!(cfg.session.clock_tick_interval_ms, 1000);
        assert!(cfg.session.is_allowed(25));
        assert!(!cfg.session.is_allowed(26));
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn partial_file_fills_defaults() {
        let cfg: Config = toml::from_str("[shield]\naway_threshold_secs = 30\n").unwrap();
        assert_eq!(cfg.shield.away_threshold_secs, 30);
        assert_eq!(cfg.shield.warning_threshold_secs, 10);
        assert_eq!(cfg.session, SessionConfig::default());
    }

    #[test]
    fn get_supports_dot_path_keys() {
        let cfg = Config::default();
        assert_eq!(cfg.get("shield.away_threshold_secs").as_deref(), Some("15"));
        assert_eq!(
            cfg.get("session.allowed_durations_min").as_deref(),
            Some("[15,25,45,60,90,120]")
        );
        assert!(cfg.get("shield.missing_key").is_none());
        assert!(cfg.get("").is_none());
    }

    #[test]
    fn set_updates_nested_number() {
        let mut cfg = Config::default();
        cfg.set("shield.away_threshold_secs", "20").unwrap();
        assert_eq!(cfg.shield.away_threshold_secs, 20);
    }

    #[test]
    fn set_updates_array() {
        let mut cfg = Config::default();
        cfg.set("session.allowed_durations_min", "[10, 20]").unwrap();
        assert_eq!(cfg.session.allowed_durations_min, vec![10, 20]);
    }

    #[test]
    fn set_rejects_unknown_key() {
        let mut cfg = Config::default();
        assert!(matches!(
            cfg.set("shield.nonexistent", "1"),
            Err(ConfigError::UnknownKey(_))
        ));
        assert!(matches!(cfg.set("nope", "1"), Err(ConfigError::UnknownKey(_))));
    }

    #[test]
    fn set_rejects_invalid_type() {
        let mut cfg = Config::default();
        assert!(matches!(
            cfg.set("shield.fail_delay_ms", "soon"),
            Err(ConfigError::InvalidValue { .. })
        ));
    }

    #[test]
    fn set_rejects_values_that_break_validation() {
        let mut cfg = Config::default();
        let result = cfg.set("shield.warning_threshold_secs", "15");
        assert!(matches!(result, Err(ConfigError::InvalidValue { .. })));
        assert_eq!(cfg, Config::default());
    }

    #[test]
    fn validate_rejects_zero_values() {
        let mut cfg = Config::default();
        cfg.shield.tick_interval_ms = 0;
        assert!(cfg.validate().is_err());

        let mut cfg = Config::default();
        cfg.session.allowed_durations_min.clear();
        assert!(cfg.validate().is_err());

        let mut cfg = Config::default();
        cfg.session.allowed_durations_min.push(0);
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn save_and_load_from_explicit_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let mut cfg = Config::default();
        cfg.shield.fail_delay_ms = 250;
        cfg.save_to(&path).unwrap();

        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded, cfg);
    }

    #[test]
    fn load_from_reports_parse_errors() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "shield = 3").unwrap();
        assert!(matches!(
            Config::load_from(&path),
            Err(ConfigError::LoadFailed { .. })
        ));
    }

    #[test]
    fn set_rejects_thresholds_that_overflow_milliseconds() {
        let mut cfg = Config::default();
        let err = cfg
            .set("shield.away_threshold_secs", &u64::MAX.to_string())
            .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidValue { ref key, .. } if key == "shield.away_threshold_secs"
        ));
        assert_eq!(cfg, Config::default());

        let largest = (u64::MAX / 1000).to_string();
        cfg.set("shield.away_threshold_secs", &largest).unwrap();
        assert_eq!(cfg.shield.away_threshold_secs, u64::MAX / 1000);
    }

    #[test]
    fn validate_bounds_tick_intervals() {
        let mut cfg = Config::default();
        cfg.session.clock_tick_interval_ms = 60_001;
        assert!(cfg.validate().is_err());
        cfg.session.clock_tick_interval_ms = 60_000;
        assert!(cfg.validate().is_ok());
    }
}
