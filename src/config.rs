use chrono::Weekday;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const DEFAULT_COUNTRY: &str = "JP";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config '{path}': {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Tunables for the schedule engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Holiday calendar used when the caller does not name one.
    pub default_country: String,
    pub non_working_days: Vec<Weekday>,
    /// Dates before January 1st of this year are treated as unset.
    pub epoch_floor_year: i32,
    /// Lower bound of the goal-relative base date used when a predecessor
    /// has no schedule.
    pub fallback_min_business_days: i64,
    /// Extra calendar days added to every holiday fetch window.
    pub window_padding_days: i64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_country: DEFAULT_COUNTRY.to_string(),
            non_working_days: vec![Weekday::Sat, Weekday::Sun],
            epoch_floor_year: 2000,
            fallback_min_business_days: 30,
            window_padding_days: 14,
        }
    }
}

impl EngineConfig {
    pub fn from_json_str(input: &str) -> Result<Self, ConfigError> {
        let config: EngineConfig = serde_json::from_str(input)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&raw)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.default_country.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "default_country must not be empty".into(),
            ));
        }
        let mut distinct = self.non_working_days.clone();
        distinct.sort_by_key(|wd| wd.num_days_from_monday());
        distinct.dedup();
        if distinct.len() >= 7 {
            return Err(ConfigError::Invalid(
                "at least one working day is required".into(),
            ));
        }
        if self.fallback_min_business_days < 0 {
            return Err(ConfigError::Invalid(format!(
                "fallback_min_business_days must be non-negative (got {})",
                self.fallback_min_business_days
            )));
        }
        if self.window_padding_days < 0 {
            return Err(ConfigError::Invalid(format!(
                "window_padding_days must be non-negative (got {})",
                self.window_padding_days
            )));
        }
        Ok(())
    }

    /// Resolve the caller's country code, falling back to the default.
    pub fn country_or_default<'a>(&'a self, country: Option<&'a str>) -> &'a str {
        match country.map(str::trim) {
            Some(code) if !code.is_empty() => code,
            _ => &self.default_country,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn partial_json_keeps_defaults() {
        let config = EngineConfig::from_json_str(r#"{"default_country": "US"}"#).unwrap();
        assert_eq!(config.default_country, "US");
        assert_eq!(config.epoch_floor_year, 2000);
        assert_eq!(config.non_working_days, vec![Weekday::Sat, Weekday::Sun]);
    }

    #[test]
    fn rejects_week_without_working_days() {
        let json = r#"{"non_working_days": ["Mon","Tue","Wed","Thu","Fri","Sat","Sun"]}"#;
        match EngineConfig::from_json_str(json) {
            Err(ConfigError::Invalid(msg)) => assert!(msg.contains("working day")),
            other => panic!("expected invalid config, got {other:?}"),
        }
    }

    #[test]
    fn loads_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"fallback_min_business_days": 45}}"#).unwrap();
        let config = EngineConfig::from_json_file(file.path()).unwrap();
        assert_eq!(config.fallback_min_business_days, 45);
        assert_eq!(config.default_country, DEFAULT_COUNTRY);
    }

    #[test]
    fn blank_country_falls_back_to_default() {
        let config = EngineConfig::default();
        assert_eq!(config.country_or_default(None), "JP");
        assert_eq!(config.country_or_default(Some("  ")), "JP");
        assert_eq!(config.country_or_default(Some("US")), "US");
    }
}
