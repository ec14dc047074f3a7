//! Settings loading with deep merge and environment variable overrides.
//!
//! Loading flow:
//! 1. Start with compiled [`Settings::default()`]
//! 2. If `~/.pulse/settings.json` exists, deep-merge user values over defaults
//! 3. Apply `PULSE_*` environment variable overrides (highest priority)

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("parse error: {0}")]
    Parse(#[from] serde_json::Error),
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub api: ApiSettings,
    pub channel: ChannelSettings,
    pub storage: StorageSettings,
    pub log: LogSettings,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiSettings {
    pub base_url: String,
}

impl Default for ApiSettings {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:4000".into(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelSettings {
    pub url: String,
    pub heartbeat_secs: u64,
    pub outbound_queue: usize,
}

impl Default for ChannelSettings {
    fn default() -> Self {
        Self {
            url: "ws://127.0.0.1:4000/ws".into(),
            heartbeat_secs: 30,
            outbound_queue: 64,
        }
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageSettings {
    /// Overrides the default data directory (`~/.pulse`).
    pub data_dir: Option<String>,
}

impl StorageSettings {
    pub fn resolve_dir(&self) -> PathBuf {
        match &self.data_dir {
            Some(dir) => PathBuf::from(dir),
            None => home_dir().join(".pulse"),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct LogSettings {
    pub level: String,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self { level: "info".into() }
    }
}

fn home_dir() -> PathBuf {
    std::env::var("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("/tmp"))
}

/// Resolve the path to the settings file (`~/.pulse/settings.json`).
pub fn settings_path() -> PathBuf {
    home_dir().join(".pulse").join("settings.json")
}

/// Load settings from the default path with env var overrides.
pub fn load_settings() -> Result<Settings, SettingsError> {
    load_settings_from_path(&settings_path())
}

/// Load settings from a specific path with env var overrides.
///
/// A missing file falls back to defaults; invalid JSON is an error.
pub fn load_settings_from_path(path: &Path) -> Result<Settings, SettingsError> {
    let defaults = serde_json::to_value(Settings::default())?;

    let merged = if path.exists() {
        debug!(?path, "loading settings from file");
        let content = std::fs::read_to_string(path)?;
        let user: Value = serde_json::from_str(&content)?;
        deep_merge(defaults, user)
    } else {
        debug!(?path, "settings file not found, using defaults");
        defaults
    };

    let mut settings: Settings = serde_json::from_value(merged)?;
    apply_env_overrides(&mut settings);
    Ok(settings)
}

/// Recursive deep merge of two JSON values.
///
/// - Objects are merged recursively (source overrides target per-key)
/// - Arrays and primitives are replaced entirely by source
/// - Null values in source are skipped (preserving target)
pub fn deep_merge(target: Value, source: Value) -> Value {
    match (target, source) {
        (Value::Object(mut target_map), Value::Object(source_map)) => {
            for (key, source_val) in source_map {
                if source_val.is_null() {
                    continue;
                }
                let merged = if let Some(target_val) = target_map.remove(&key) {
                    deep_merge(target_val, source_val)
                } else {
                    source_val
                };
                let _ = target_map.insert(key, merged);
            }
            Value::Object(target_map)
        }
        (_, source) => source,
    }
}

/// Apply environment variable overrides. Invalid values are silently
/// ignored (fall back to file/default).
pub fn apply_env_overrides(settings: &mut Settings) {
    if let Ok(v) = std::env::var("PULSE_API_URL") {
        if !v.is_empty() {
            settings.api.base_url = v;
        }
    }
    if let Ok(v) = std::env::var("PULSE_WS_URL") {
        if !v.is_empty() {
            settings.channel.url = v;
        }
    }
    if let Ok(v) = std::env::var("PULSE_DATA_DIR") {
        if !v.is_empty() {
            settings.storage.data_dir = Some(v);
        }
    }
    if let Ok(v) = std::env::var("PULSE_LOG_LEVEL") {
        if v.parse::<tracing::Level>().is_ok() {
            settings.log.level = v;
        }
    }
    if let Some(v) = read_env_u64("PULSE_HEARTBEAT_SECS", 1, 600) {
        settings.channel.heartbeat_secs = v;
    }
}

fn read_env_u64(name: &str, min: u64, max: u64) -> Option<u64> {
    let raw = std::env::var(name).ok()?;
    let parsed: u64 = raw.parse().ok()?;
    (min..=max).contains(&parsed).then_some(parsed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn defaults_are_complete() {
        let settings = Settings::default();
        assert_eq!(settings.api.base_url, "http://127.0.0.1:4000");
        assert_eq!(settings.channel.heartbeat_secs, 30);
        assert_eq!(settings.log.level, "info");
        assert!(settings.storage.data_dir.is_none());
    }

    #[test]
    fn deep_merge_overrides_per_key() {
        let target = json!({ "api": { "base_url": "a" }, "log": { "level": "info" } });
        let source = json!({ "api": { "base_url": "b" } });
        let merged = deep_merge(target, source);
        assert_eq!(merged["api"]["base_url"], "b");
        assert_eq!(merged["log"]["level"], "info");
    }

    #[test]
    fn deep_merge_skips_nulls() {
        let target = json!({ "log": { "level": "debug" } });
        let source = json!({ "log": { "level": null } });
        let merged = deep_merge(target, source);
        assert_eq!(merged["log"]["level"], "debug");
    }

    #[test]
    fn missing_file_yields_defaults() {
        let settings =
            load_settings_from_path(Path::new("/definitely/not/here.json")).unwrap();
        assert_eq!(settings.api.base_url, "http://127.0.0.1:4000");
    }

    #[test]
    fn file_values_merge_over_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{ "channel": { "url": "ws://other:9000/ws" } }"#).unwrap();

        let settings = load_settings_from_path(&path).unwrap();
        assert_eq!(settings.channel.url, "ws://other:9000/ws");
        // Untouched keys keep defaults
        assert_eq!(settings.channel.heartbeat_secs, 30);
    }

    #[test]
    fn invalid_json_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, "{nope").unwrap();
        assert!(load_settings_from_path(&path).is_err());
    }

    #[test]
    fn env_u64_rejects_out_of_range() {
        std::env::set_var("PULSE_TEST_HEARTBEAT", "0");
        assert_eq!(read_env_u64("PULSE_TEST_HEARTBEAT", 1, 600), None);
        std::env::set_var("PULSE_TEST_HEARTBEAT", "120");
        assert_eq!(read_env_u64("PULSE_TEST_HEARTBEAT", 1, 600), Some(120));
        std::env::set_var("PULSE_TEST_HEARTBEAT", "abc");
        assert_eq!(read_env_u64("PULSE_TEST_HEARTBEAT", 1, 600), None);
        std::env::remove_var("PULSE_TEST_HEARTBEAT");
    }

    #[test]
    fn invalid_log_level_env_is_ignored() {
        let mut settings = Settings::default();
        std::env::set_var("PULSE_LOG_LEVEL", "shouting");
        apply_env_overrides(&mut settings);
        assert_eq!(settings.log.level, "info");
        std::env::remove_var("PULSE_LOG_LEVEL");
    }

    #[test]
    fn data_dir_resolution() {
        let storage = StorageSettings {
            data_dir: Some("/var/lib/pulse".into()),
        };
        assert_eq!(storage.resolve_dir(), PathBuf::from("/var/lib/pulse"));

        let default = StorageSettings::default();
        assert!(default.resolve_dir().ends_with(".pulse"));
    }
}
