//! TOML-based application configuration.
//!
//! Stores user preferences including:
//! - Location used for prayer times
//! - Calculation method, juristic overrides and manual adjustments
//! - Blocking mode, emergency unlock allowance and strict mode
//!
//! Configuration is stored at `~/.config/tarkiz/config.toml`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use super::data_dir;
use crate::error::{ConfigError, CoreError, Result};
use crate::prayer::{
    AsrJuristic, CalculationMethod, City, GeoCoordinate, HighLatitudeRule, MethodOverrides,
    MethodRegistry, PrayerName, TimeAdjustments,
};
use crate::session::{EmergencyQuota, PrayerMode, QuotaPeriod, DEFAULT_EMERGENCY_UNLOCKS};

/// Location configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationConfig {
    /// Display name; cleared when coordinates are set by hand.
    #[serde(default)]
    pub city: Option<String>,
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default)]
    pub elevation_m: f64,
    pub timezone_offset_minutes: i32,
}

/// Prayer calculation configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrayerConfig {
    #[serde(default = "default_method")]
    pub method: String,
    /// Overrides the method's Asr convention.
    #[serde(default)]
    pub asr: Option<AsrJuristic>,
    /// Overrides the method's high-latitude rule.
    #[serde(default)]
    pub high_latitude_rule: Option<HighLatitudeRule>,
    #[serde(default)]
    pub adjustments: TimeAdjustments,
}

/// Blocking session configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionConfig {
    #[serde(default = "default_mode")]
    pub mode: String,
    /// Overrides the mode's window length.
    #[serde(default)]
    pub window_minutes: Option<u32>,
    #[serde(default = "default_emergency_unlocks")]
    pub emergency_unlocks: u32,
    #[serde(default)]
    pub quota_period: QuotaPeriod,
    #[serde(default)]
    pub strict_mode: bool,
}

/// Application configuration.
///
/// Serialized to/from TOML at `~/.config/tarkiz/config.toml`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub location: LocationConfig,
    #[serde(default)]
    pub prayer: PrayerConfig,
    #[serde(default)]
    pub session: SessionConfig,
}

fn default_method() -> String {
    MethodRegistry::DEFAULT_ID.into()
}
fn default_mode() -> String {
    PrayerMode::DEFAULT_ID.into()
}
fn default_emergency_unlocks() -> u32 {
    DEFAULT_EMERGENCY_UNLOCKS
}

impl Default for LocationConfig {
    fn default() -> Self {
        Self {
            city: Some("New York".into()),
            latitude: 40.7128,
            longitude: -74.0060,
            elevation_m: 10.0,
            timezone_offset_minutes: -300,
        }
    }
}

impl Default for PrayerConfig {
    fn default() -> Self {
        Self {
            method: default_method(),
            asr: None,
            high_latitude_rule: None,
            adjustments: TimeAdjustments::default(),
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            mode: default_mode(),
            window_minutes: None,
            emergency_unlocks: DEFAULT_EMERGENCY_UNLOCKS,
            quota_period: QuotaPeriod::Daily,
            strict_mode: false,
        }
    }
}

/// Map keys that may be created by `set` even when absent.
const OPEN_MAPS: [&str; 1] = ["prayer.adjustments"];

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

    fn parse_number(key: &str, value: &str) -> Result<serde_json::Value, ConfigError> {
        let invalid = || ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("cannot parse '{value}' as number"),
        };
        if let Ok(n) = value.parse::<i64>() {
            Ok(serde_json::Value::Number(n.into()))
        } else if let Ok(n) = value.parse::<f64>() {
            serde_json::Number::from_f64(n)
                .map(serde_json::Value::Number)
                .ok_or_else(invalid)
        } else {
            Err(invalid())
        }
    }

    fn set_json_value_by_path(
        root: &mut serde_json::Value,
        key: &str,
        value: &str,
    ) -> Result<(), ConfigError> {
        let unknown = || ConfigError::UnknownKey(key.to_string());
        let mut parts = key.split('.').peekable();
        if parts.peek().is_none() || key.is_empty() {
            return Err(unknown());
        }

        let parent = key.rsplit_once('.').map(|(p, _)| p).unwrap_or("");
        let open_map = OPEN_MAPS.contains(&parent);

        let mut current = root;
        while let Some(part) = parts.next() {
            let is_leaf = parts.peek().is_none();
            if is_leaf {
                let obj = current.as_object_mut().ok_or_else(unknown)?;
                let new_value = match obj.get(part) {
                    Some(serde_json::Value::Bool(_)) => {
                        serde_json::Value::Bool(value.parse::<bool>().map_err(|e| {
                            ConfigError::InvalidValue {
                                key: key.to_string(),
                                message: e.to_string(),
                            }
                        })?)
                    }
                    Some(serde_json::Value::Number(_)) => Self::parse_number(key, value)?,
                    Some(serde_json::Value::Object(_)) | Some(serde_json::Value::Array(_)) => {
                        serde_json::from_str(value).map_err(|e| ConfigError::InvalidValue {
                            key: key.to_string(),
                            message: e.to_string(),
                        })?
                    }
                    // Unset optional: take numbers and booleans as such, "none" clears.
                    Some(serde_json::Value::Null) => match value.trim() {
                        "" | "none" | "null" => serde_json::Value::Null,
                        v => serde_json::from_str(v)
                            .unwrap_or_else(|_| serde_json::Value::String(v.into())),
                    },
                    Some(serde_json::Value::String(_)) => {
                        if value.trim().eq_ignore_ascii_case("none") && Self::is_optional(key) {
                            serde_json::Value::Null
                        } else {
                            serde_json::Value::String(value.into())
                        }
                    }
                    None if open_map => Self::parse_number(key, value)?,
                    None => return Err(unknown()),
                };

                obj.insert(part.to_string(), new_value);
                return Ok(());
            }

            current = current.get_mut(part).ok_or_else(unknown)?;
        }

        Err(unknown())
    }

    fn is_optional(key: &str) -> bool {
        matches!(
            key,
            "location.city" | "prayer.asr" | "prayer.high_latitude_rule" | "session.window_minutes"
        )
    }

    fn path() -> Result<PathBuf> {
        Ok(data_dir()?.join("config.toml"))
    }

    /// Load from disk or return default.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file exists but cannot be parsed,
    /// or if the default config cannot be written to disk.
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::path()?)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        match std::fs::read_to_string(path) {
            Ok(content) => {
                let cfg: Config = toml::from_str(&content).map_err(|e| ConfigError::LoadFailed {
                    path: path.to_path_buf(),
                    message: e.to_string(),
                })?;
                cfg.validate()?;
                Ok(cfg)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                let cfg = Self::default();
                cfg.save_to(path)?;
                tracing::info!(path = %path.display(), "wrote default configuration");
                Ok(cfg)
            }
            Err(e) => Err(ConfigError::LoadFailed {
                path: path.to_path_buf(),
                message: e.to_string(),
            }
            .into()),
        }
    }

    /// Persist to disk.
    ///
    /// # Errors
    ///
    /// Returns an error if the config cannot be serialized or written to disk.
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        let save_failed = |message: String| ConfigError::SaveFailed {
            path: path.to_path_buf(),
            message,
        };
        let content = toml::to_string_pretty(self).map_err(|e| save_failed(e.to_string()))?;
        std::fs::write(path, content).map_err(|e| save_failed(e.to_string()))?;
        Ok(())
    }

    /// Load from disk, returning default on error.
    /// This is a convenience method that never fails.
    pub fn load_or_default() -> Self {
        Self::load().unwrap_or_else(|e| {
            tracing::warn!(error = %e, "falling back to default configuration");
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

    /// Flattened `key = value` pairs, for listing.
    pub fn entries(&self) -> Vec<(String, String)> {
        fn walk(prefix: &str, value: &serde_json::Value, out: &mut Vec<(String, String)>) {
            match value {
                serde_json::Value::Object(map)
                    if !OPEN_MAPS.contains(&prefix) || map.is_empty() =>
                {
                    if map.is_empty() && !prefix.is_empty() {
                        out.push((prefix.to_string(), "{}".into()));
                    }
                    for (k, v) in map {
                        let key = if prefix.is_empty() {
                            k.clone()
                        } else {
                            format!("{prefix}.{k}")
                        };
                        walk(&key, v, out);
                    }
                }
                serde_json::Value::Object(map) => {
                    for (k, v) in map {
                        out.push((format!("{prefix}.{k}"), v.to_string()));
                    }
                }
                serde_json::Value::String(s) => out.push((prefix.to_string(), s.clone())),
                other => out.push((prefix.to_string(), other.to_string())),
            }
        }
        let mut out = Vec::new();
        if let Ok(json) = serde_json::to_value(self) {
            walk("", &json, &mut out);
        }
        out
    }

    /// Set a value in memory by dot-separated key, validating the result.
    ///
    /// # Errors
    ///
    /// Returns an error if the key is unknown or the value cannot be parsed
    /// or fails validation. `self` is unchanged on error.
    pub fn set_value(&mut self, key: &str, value: &str) -> Result<()> {
        let mut json = serde_json::to_value(&*self)?;
        Self::set_json_value_by_path(&mut json, key, value)?;
        let updated: Config = serde_json::from_value(json).map_err(|e| ConfigError::InvalidValue {
            key: key.to_string(),
            message: e.to_string(),
        })?;
        updated.validate().map_err(|e| match e {
            e @ (CoreError::InputValidation { .. } | CoreError::NotFound { .. }) => {
                CoreError::Config(ConfigError::InvalidValue {
                    key: key.to_string(),
                    message: e.to_string(),
                })
            }
            other => other,
        })?;
        if key.starts_with("location.") && key != "location.city" {
            // Hand-edited coordinates no longer name a preset city.
            let mut updated = updated;
            updated.location.city = None;
            *self = updated;
        } else {
            *self = updated;
        }
        tracing::debug!(key, value, "configuration updated");
        Ok(())
    }

    /// Set a config value by key and persist. Returns error if key is unknown.
    ///
    /// # Errors
    ///
    /// Returns an error if the key is unknown, the value cannot be parsed,
    /// or the config cannot be saved.
    pub fn set(&mut self, key: &str, value: &str) -> Result<()> {
        self.set_value(key, value)?;
        self.save()
    }

    /// Check every section against the domain rules.
    pub fn validate(&self) -> Result<()> {
        self.coordinate()?;
        self.prayer.adjustments.validate()?;
        self.method(&MethodRegistry::new())?;
        self.mode()?;
        Ok(())
    }

    // ── Derived values ───────────────────────────────────────────────

    pub fn coordinate(&self) -> Result<GeoCoordinate> {
        GeoCoordinate::new(
            self.location.latitude,
            self.location.longitude,
            self.location.elevation_m,
            self.location.timezone_offset_minutes,
        )
    }

    pub fn use_city(&mut self, city: &City) {
        self.location = LocationConfig {
            city: Some(city.name.to_string()),
            latitude: city.latitude,
            longitude: city.longitude,
            elevation_m: city.elevation_m,
            timezone_offset_minutes: city.timezone_offset_minutes,
        };
    }

    /// The configured preset, with Asr and high-latitude overrides applied.
    pub fn method(&self, registry: &MethodRegistry) -> Result<CalculationMethod> {
        let overrides = MethodOverrides {
            asr: self.prayer.asr,
            high_latitude_rule: self.prayer.high_latitude_rule,
            ..Default::default()
        };
        if overrides.is_empty() {
            Ok(registry.get(&self.prayer.method)?.clone())
        } else {
            registry.custom(&self.prayer.method, &overrides)
        }
    }

    pub fn adjustments(&self) -> &TimeAdjustments {
        &self.prayer.adjustments
    }

    pub fn set_adjustment(&mut self, prayer: PrayerName, minutes: i32) -> Result<()> {
        self.prayer.adjustments.set(prayer, minutes)
    }

    pub fn mode(&self) -> Result<PrayerMode> {
        let mode = PrayerMode::find(&self.session.mode)?;
        match self.session.window_minutes {
            Some(minutes) => mode.with_window_minutes(minutes),
            None => Ok(mode),
        }
    }

    pub fn quota(&self, now: DateTime<Utc>) -> EmergencyQuota {
        EmergencyQuota::new(
            self.session.emergency_unlocks,
            self.session.quota_period,
            self.location.timezone_offset_minutes,
            now,
        )
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
        assert_eq!(parsed.prayer.method, "mwl");
        assert_eq!(parsed.session.emergency_unlocks, 5);
    }

    #[test]
    fn partial_file_fills_defaults() {
        let parsed: Config = toml::from_str(
            "[prayer]\nmethod = \"isna\"\n\n[prayer.adjustments]\nfajr = 2\n",
        )
        .unwrap();
        assert_eq!(parsed.prayer.method, "isna");
        assert_eq!(parsed.prayer.adjustments.get(PrayerName::Fajr), 2);
        assert_eq!(parsed.location, LocationConfig::default());
        assert_eq!(parsed.session.mode, "salah");
    }

    #[test]
    fn get_supports_dot_path_keys() {
        let cfg = Config::default();
        assert_eq!(cfg.get("prayer.method").as_deref(), Some("mwl"));
        assert_eq!(cfg.get("location.timezone_offset_minutes").as_deref(), Some("-300"));
        assert_eq!(cfg.get("session.strict_mode").as_deref(), Some("false"));
        assert!(cfg.get("prayer.missing_key").is_none());
    }

    #[test]
    fn set_value_updates_and_validates() {
        let mut cfg = Config::default();
        cfg.set_value("session.strict_mode", "true").unwrap();
        assert!(cfg.session.strict_mode);

        cfg.set_value("location.timezone_offset_minutes", "-240").unwrap();
        assert_eq!(cfg.location.timezone_offset_minutes, -240);
        assert_eq!(cfg.location.city, None);

        cfg.set_value("prayer.asr", "hanafi").unwrap();
        assert_eq!(cfg.prayer.asr, Some(AsrJuristic::Hanafi));
        assert!(cfg.method(&MethodRegistry::new()).unwrap().is_custom());
        cfg.set_value("prayer.asr", "none").unwrap();
        assert_eq!(cfg.prayer.asr, None);

        cfg.set_value("session.window_minutes", "45").unwrap();
        assert_eq!(cfg.mode().unwrap().window_minutes, 45);
    }

    #[test]
    fn set_value_rejects_bad_input_and_keeps_state() {
        let mut cfg = Config::default();
        let before = cfg.clone();
        assert!(matches!(
            cfg.set_value("prayer.nope", "1"),
            Err(CoreError::Config(ConfigError::UnknownKey(_)))
        ));
        assert!(cfg.set_value("location.latitude", "95").is_err());
        assert!(cfg.set_value("prayer.method", "atlantis").is_err());
        assert!(cfg.set_value("session.emergency_unlocks", "many").is_err());
        assert_eq!(cfg, before);
    }

    #[test]
    fn adjustments_can_be_added_by_key() {
        let mut cfg = Config::default();
        cfg.set_value("prayer.adjustments.isha", "-3").unwrap();
        assert_eq!(cfg.adjustments().get(PrayerName::Isha), -3);
        assert!(cfg.set_value("prayer.adjustments.isha", "45").is_err());
        assert!(cfg.set_value("prayer.adjustments.witr", "2").is_err());
    }

    #[test]
    fn load_from_writes_default_when_missing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let cfg = Config::load_from(&path).unwrap();
        assert_eq!(cfg, Config::default());
        assert!(path.exists());

        let mut changed = cfg;
        changed.use_city(crate::prayer::find_city("Cairo").unwrap());
        changed.save_to(&path).unwrap();
        assert_eq!(Config::load_from(&path).unwrap().location.city.as_deref(), Some("Cairo"));
    }

    #[test]
    fn entries_list_every_leaf() {
        let mut cfg = Config::default();
        cfg.set_adjustment(PrayerName::Fajr, 2).unwrap();
        let entries = cfg.entries();
        assert!(entries.iter().any(|(k, v)| k == "prayer.method" && v == "mwl"));
        assert!(entries.iter().any(|(k, v)| k == "prayer.adjustments.fajr" && v == "2"));
        assert!(entries.iter().any(|(k, _)| k == "session.quota_period"));
    }
}
