//! Engine configuration.
//!
//! Defaults live in `config/engine.toml`, embedded at compile time. A user
//! file only needs the keys it changes: it is merged over the defaults
//! table by table before being deserialized.

use std::path::{Path, PathBuf};

use mobility_safety_geography_models::AffineTransform;
use serde::{Deserialize, Serialize};

use crate::AnalyticsError;
use crate::color::ColorGradient;

/// Embedded default configuration.
pub const DEFAULT_CONFIG: &str = include_str!("../config/engine.toml");

/// Environment variable naming an override file.
pub const CONFIG_ENV_VAR: &str = "MOBILITY_SAFETY_CONFIG";

/// Same-day proximity defaults.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProximityConfig {
    /// Search radius in metres.
    pub radius_meters: f64,
    /// Collisions returned by default.
    pub limit: usize,
}

/// Outlier detection defaults.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OutlierConfig {
    /// Tukey fence multiplier.
    pub iqr_k: f64,
    /// Percentile used by the tip report when no method is given.
    pub tip_percentile: f64,
    /// Rows returned by default.
    pub limit: usize,
}

/// Hotspot thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HotspotConfig {
    /// Collisions must exceed this.
    pub min_collisions: u64,
    /// Pickups must be below this.
    pub max_pickups: u64,
}

/// Complete engine configuration.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Raw-to-geographic coordinate transform for stored zone geometry.
    pub transform: AffineTransform,
    /// Proximity defaults.
    pub proximity: ProximityConfig,
    /// Outlier defaults.
    pub outliers: OutlierConfig,
    /// Hotspot thresholds.
    pub hotspots: HotspotConfig,
    /// Choropleth colours.
    pub choropleth: ColorGradient,
}

fn config_error(message: impl std::fmt::Display) -> AnalyticsError {
    AnalyticsError::Config {
        message: message.to_string(),
    }
}

fn parse_table(text: &str) -> Result<toml::Table, AnalyticsError> {
    toml::from_str(text).map_err(config_error)
}

/// Recursively overlays `overrides` onto `base`. Nested tables merge;
/// any other value replaces the base value.
fn merge(base: &mut toml::Table, overrides: toml::Table) {
    for (key, value) in overrides {
        match (base.get_mut(&key), value) {
            (Some(toml::Value::Table(existing)), toml::Value::Table(nested)) => {
                merge(existing, nested);
            }
            (_, value) => {
                base.insert(key, value);
            }
        }
    }
}

impl EngineConfig {
    /// Parses the embedded defaults.
    ///
    /// # Errors
    ///
    /// Returns [`AnalyticsError::Config`] if the embedded file is invalid.
    pub fn embedded() -> Result<Self, AnalyticsError> {
        Self::from_overrides("")
    }

    /// Parses `overrides` as TOML and merges it over the embedded
    /// defaults.
    ///
    /// # Errors
    ///
    /// Returns [`AnalyticsError::Config`] if either document is not valid
    /// TOML, the merged document does not describe a configuration, or a
    /// value is out of range.
    pub fn from_overrides(overrides: &str) -> Result<Self, AnalyticsError> {
        let mut table = parse_table(DEFAULT_CONFIG)?;
        merge(&mut table, parse_table(overrides)?);

        let config: Self = toml::Value::Table(table)
            .try_into()
            .map_err(config_error)?;
        config.validate()?;
        Ok(config)
    }

    /// Loads the configuration from `path`, or from the file named by
    /// [`CONFIG_ENV_VAR`], falling back to the embedded defaults.
    ///
    /// # Errors
    ///
    /// Returns [`AnalyticsError::Config`] if the file cannot be read or is
    /// invalid.
    pub fn load(path: Option<&Path>) -> Result<Self, AnalyticsError> {
        let path = path
            .map(Path::to_path_buf)
            .or_else(|| std::env::var_os(CONFIG_ENV_VAR).map(PathBuf::from));

        let Some(path) = path else {
            return Self::embedded();
        };

        log::info!("Loading engine configuration from {}", path.display());
        let text = std::fs::read_to_string(&path)
            .map_err(|e| config_error(format!("{}: {e}", path.display())))?;
        Self::from_overrides(&text)
    }

    /// Checks that every value is in range.
    ///
    /// # Errors
    ///
    /// Returns [`AnalyticsError::Config`] naming the first bad value.
    pub fn validate(&self) -> Result<(), AnalyticsError> {
        let t = &self.transform;
        if ![t.scale_x, t.scale_y, t.offset_x, t.offset_y]
            .iter()
            .all(|v| v.is_finite())
        {
            return Err(config_error("transform values must be finite"));
        }
        let radius = self.proximity.radius_meters;
        if !radius.is_finite() || radius < 0.0 {
            return Err(config_error(format!(
                "proximity.radius_meters must be a non-negative number, got {radius}"
            )));
        }
        let k = self.outliers.iqr_k;
        if !k.is_finite() || k < 0.0 {
            return Err(config_error(format!(
                "outliers.iqr_k must be a non-negative number, got {k}"
            )));
        }
        let p = self.outliers.tip_percentile;
        if !(0.0..=1.0).contains(&p) {
            return Err(config_error(format!(
                "outliers.tip_percentile must be within [0, 1], got {p}"
            )));
        }
        Ok(())
    }

    /// The choropleth ramp.
    #[must_use]
    pub const fn gradient(&self) -> ColorGradient {
        self.choropleth
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::color::Rgb;

    #[test]
    fn embedded_defaults_parse() {
        let config = EngineConfig::embedded().unwrap();
        assert_eq!(config.transform, AffineTransform::NYC_TAXI_ZONES);
        assert!((config.proximity.radius_meters - 1524.0).abs() < f64::EPSILON);
        assert_eq!(config.proximity.limit, 10);
        assert!((config.outliers.iqr_k - 1.5).abs() < f64::EPSILON);
        assert!((config.outliers.tip_percentile - 0.95).abs() < f64::EPSILON);
        assert_eq!(config.hotspots.min_collisions, 10);
        assert_eq!(config.gradient(), ColorGradient::default());
    }

    #[test]
    fn overrides_merge_key_by_key() {
        let config = EngineConfig::from_overrides(
            "[proximity]\nradius_meters = 500.0\n\n[choropleth]\nhigh = \"#2c7bb6\"\n",
        )
        .unwrap();
        assert!((config.proximity.radius_meters - 500.0).abs() < f64::EPSILON);
        assert_eq!(config.proximity.limit, 10);
        assert_eq!(config.choropleth.high, Rgb::new(0x2c, 0x7b, 0xb6));
        assert_eq!(config.choropleth.low, ColorGradient::default().low);
    }

    #[test]
    fn rejects_out_of_range_values() {
        let err = EngineConfig::from_overrides("[outliers]\ntip_percentile = 2.0\n").unwrap_err();
        assert!(matches!(err, AnalyticsError::Config { .. }));

        let err = EngineConfig::from_overrides("[proximity]\nradius_meters = -1.0\n").unwrap_err();
        assert!(err.to_string().contains("radius_meters"));
    }

    #[test]
    fn rejects_bad_colour_and_bad_toml() {
        assert!(EngineConfig::from_overrides("[choropleth]\nlow = \"blue\"\n").is_err());
        assert!(EngineConfig::from_overrides("[proximity\n").is_err());
    }
}
