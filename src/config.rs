/// Runtime configuration.
///
/// Loaded from an optional TOML file; every field has a default, and a few
/// can be overridden from the environment.

use crate::time::parse_locale;
use chrono::{Locale, NaiveTime};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const ENV_LOCALE: &str = "VETCAL_LOCALE";
pub const ENV_LOG: &str = "VETCAL_LOG";

/// Longest slot length accepted anywhere: one day.
pub const MAX_SLOT_MINUTES: i64 = 24 * 60;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("cannot read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Visible part of the week grid.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct CalendarConfig {
    pub slot_min: String,
    pub slot_max: String,
    pub slot_duration_minutes: i64,
}

impl Default for CalendarConfig {
    fn default() -> Self {
        CalendarConfig {
            slot_min: "08:00".to_string(),
            slot_max: "20:00".to_string(),
            slot_duration_minutes: 30,
        }
    }
}

impl CalendarConfig {
    /// First and last visible wall-clock times.
    pub fn visible_hours(&self) -> Result<(NaiveTime, NaiveTime), ConfigError> {
        let parse = |value: &str| {
            NaiveTime::parse_from_str(value.trim(), "%H:%M")
                .map_err(|_| ConfigError::Invalid(format!("'{}' is not an HH:MM time", value)))
        };
        Ok((parse(&self.slot_min)?, parse(&self.slot_max)?))
    }
}

fn check_minutes(name: &str, value: i64) -> Result<(), ConfigError> {
    if value <= 0 || value > MAX_SLOT_MINUTES {
        return Err(ConfigError::Invalid(format!(
            "{} must be between 1 and {}, got {}",
            name, MAX_SLOT_MINUTES, value
        )));
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    pub locale: String,
    /// Length of the draft created by clicking a free slot.
    pub default_slot_minutes: i64,
    pub default_reason: String,
    pub client_fallback_label: String,
    pub log_filter: String,
    pub calendar: CalendarConfig,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        SchedulerConfig {
            locale: "en_US".to_string(),
            default_slot_minutes: 30,
            default_reason: "Consultation".to_string(),
            client_fallback_label: "(Client)".to_string(),
            log_filter: "vetcal=info".to_string(),
            calendar: CalendarConfig::default(),
        }
    }
}

impl SchedulerConfig {
    /// Read the file at `path` (defaults when `None`), apply environment
    /// overrides and validate.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => {
                let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
                    path: path.to_path_buf(),
                    source,
                })?;
                Self::from_toml(&text)?
            }
            None => Self::default(),
        };
        config.apply_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(locale) = lookup(ENV_LOCALE).filter(|v| !v.trim().is_empty()) {
            self.locale = locale;
        }
        if let Some(filter) = lookup(ENV_LOG).filter(|v| !v.trim().is_empty()) {
            self.log_filter = filter;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        check_minutes("default_slot_minutes", self.default_slot_minutes)?;
        check_minutes(
            "calendar.slot_duration_minutes",
            self.calendar.slot_duration_minutes,
        )?;
        let (first, last) = self.calendar.visible_hours()?;
        if first >= last {
            return Err(ConfigError::Invalid(format!(
                "calendar.slot_min ({}) must be before calendar.slot_max ({})",
                self.calendar.slot_min, self.calendar.slot_max
            )));
        }
        Ok(())
    }

    pub fn locale(&self) -> Locale {
        parse_locale(&self.locale)
    }
}
