//! Calculation method presets and user-derived variants.
//!
//! Presets are immutable. [`MethodRegistry::custom`] returns a new method
//! that remembers which preset it came from.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};

/// How Isha is placed: by twilight angle, or a fixed interval after Maghrib.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IshaRule {
    /// Sun depression below the horizon, in degrees.
    Angle(f64),
    /// Minutes after Maghrib.
    Interval(i64),
}

impl fmt::Display for IshaRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IshaRule::Angle(a) => write!(f, "{a}°"),
            IshaRule::Interval(m) => write!(f, "{m}min"),
        }
    }
}

/// Asr shadow-length factor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AsrJuristic {
    /// Shafi'i, Maliki, Hanbali: shadow equals object length.
    #[default]
    Standard,
    /// Shadow equals twice the object length.
    Hanafi,
}

impl AsrJuristic {
    pub fn factor(self) -> f64 {
        match self {
            AsrJuristic::Standard => 1.0,
            AsrJuristic::Hanafi => 2.0,
        }
    }
}

impl FromStr for AsrJuristic {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "standard" | "shafi'i" | "shafii" => Ok(AsrJuristic::Standard),
            "hanafi" => Ok(AsrJuristic::Hanafi),
            other => Err(CoreError::invalid("asr", format!("unknown juristic method '{other}'"))),
        }
    }
}

/// Fallback for Fajr/Isha when the sun never reaches the method's angle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HighLatitudeRule {
    None,
    #[default]
    AngleBased,
    OneSeventh,
    MiddleOfNight,
}

impl HighLatitudeRule {
    /// Fraction of the night allotted to Fajr/Isha twilight.
    pub(crate) fn night_portion(self, angle: f64) -> Option<f64> {
        match self {
            HighLatitudeRule::None => None,
            HighLatitudeRule::AngleBased => Some(angle / 60.0),
            HighLatitudeRule::OneSeventh => Some(1.0 / 7.0),
            HighLatitudeRule::MiddleOfNight => Some(0.5),
        }
    }
}

impl FromStr for HighLatitudeRule {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "none" => Ok(HighLatitudeRule::None),
            "angle_based" => Ok(HighLatitudeRule::AngleBased),
            "one_seventh" => Ok(HighLatitudeRule::OneSeventh),
            "middle_of_night" => Ok(HighLatitudeRule::MiddleOfNight),
            other => Err(CoreError::invalid(
                "high_latitude_rule",
                format!("unknown rule '{other}'"),
            )),
        }
    }
}

/// A named set of twilight angles and juristic choices.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalculationMethod {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub region: String,
    pub fajr_angle: f64,
    pub isha: IshaRule,
    #[serde(default)]
    pub asr: AsrJuristic,
    #[serde(default)]
    pub high_latitude_rule: HighLatitudeRule,
    #[serde(default = "default_dhuhr_margin")]
    pub dhuhr_margin_minutes: i64,
    /// Preset this method was derived from, for display.
    #[serde(default)]
    pub base_id: Option<String>,
}

fn default_dhuhr_margin() -> i64 {
    1
}

impl CalculationMethod {
    fn preset(id: &str, name: &str, region: &str, fajr_angle: f64, isha: IshaRule) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            region: region.to_string(),
            fajr_angle,
            isha,
            asr: AsrJuristic::Standard,
            high_latitude_rule: HighLatitudeRule::AngleBased,
            dhuhr_margin_minutes: default_dhuhr_margin(),
            base_id: None,
        }
    }

    pub fn is_custom(&self) -> bool {
        self.base_id.is_some()
    }

    /// One-line summary as shown on the method picker.
    pub fn description(&self) -> String {
        format!("Fajr: {}°, Isha: {}", self.fajr_angle, self.isha)
    }

    pub fn validate(&self) -> Result<()> {
        check_angle("fajr_angle", self.fajr_angle)?;
        match self.isha {
            IshaRule::Angle(a) => check_angle("isha_angle", a)?,
            IshaRule::Interval(m) if !(0..=180).contains(&m) => {
                return Err(CoreError::invalid(
                    "isha_interval",
                    format!("{m} min is outside [0, 180]"),
                ));
            }
            IshaRule::Interval(_) => {}
        }
        if !(0..=10).contains(&self.dhuhr_margin_minutes) {
            return Err(CoreError::invalid(
                "dhuhr_margin_minutes",
                format!("{} is outside [0, 10]", self.dhuhr_margin_minutes),
            ));
        }
        Ok(())
    }
}

fn check_angle(field: &str, angle: f64) -> Result<()> {
    if !angle.is_finite() || angle <= 0.0 || angle > 30.0 {
        return Err(CoreError::invalid(field, format!("{angle}° is outside (0, 30]")));
    }
    Ok(())
}

/// Fields a user may fine-tune on top of a preset.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MethodOverrides {
    #[serde(default)]
    pub fajr_angle: Option<f64>,
    #[serde(default)]
    pub isha: Option<IshaRule>,
    #[serde(default)]
    pub asr: Option<AsrJuristic>,
    #[serde(default)]
    pub high_latitude_rule: Option<HighLatitudeRule>,
    #[serde(default)]
    pub dhuhr_margin_minutes: Option<i64>,
}

impl MethodOverrides {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// Fixed set of built-in methods.
#[derive(Debug, Clone)]
pub struct MethodRegistry {
    methods: Vec<CalculationMethod>,
}

impl Default for MethodRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl MethodRegistry {
    pub const DEFAULT_ID: &'static str = "mwl";

    pub fn new() -> Self {
        Self {
            methods: vec![
                CalculationMethod::preset(
                    "mwl",
                    "Muslim World League",
                    "Europe, Far East",
                    18.0,
                    IshaRule::Angle(17.0),
                ),
                CalculationMethod::preset(
                    "isna",
                    "ISNA",
                    "North America",
                    15.0,
                    IshaRule::Angle(15.0),
                ),
                CalculationMethod::preset(
                    "egypt",
                    "Egyptian General Authority",
                    "Africa, Middle East",
                    19.5,
                    IshaRule::Angle(17.5),
                ),
                CalculationMethod::preset(
                    "makkah",
                    "Umm al-Qura",
                    "Arabian Peninsula",
                    18.5,
                    IshaRule::Interval(90),
                ),
                CalculationMethod::preset(
                    "karachi",
                    "University of Karachi",
                    "Pakistan, South Asia",
                    18.0,
                    IshaRule::Angle(18.0),
                ),
            ],
        }
    }

    pub fn list(&self) -> &[CalculationMethod] {
        &self.methods
    }

    /// Look up a preset by id, or by display name ignoring case.
    pub fn get(&self, id: &str) -> Result<&CalculationMethod> {
        let key = id.trim();
        self.methods
            .iter()
            .find(|m| m.id == key || m.name.eq_ignore_ascii_case(key))
            .ok_or_else(|| CoreError::not_found("calculation method", id))
    }

    /// Derive a method from a preset. The preset itself is untouched.
    pub fn custom(&self, base_id: &str, overrides: &MethodOverrides) -> Result<CalculationMethod> {
        let base = self.get(base_id)?;
        let mut method = base.clone();
        method.id = format!("{}:custom", base.id);
        method.base_id = Some(base.id.clone());
        if let Some(angle) = overrides.fajr_angle {
            method.fajr_angle = angle;
        }
        if let Some(isha) = overrides.isha {
            method.isha = isha;
        }
        if let Some(asr) = overrides.asr {
            method.asr = asr;
        }
        if let Some(rule) = overrides.high_latitude_rule {
            method.high_latitude_rule = rule;
        }
        if let Some(margin) = overrides.dhuhr_margin_minutes {
            method.dhuhr_margin_minutes = margin;
        }
        method.validate()?;
        tracing::debug!(base = %base.id, id = %method.id, "derived custom calculation method");
        Ok(method)
    }
}
