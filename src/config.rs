use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;

use crate::data::types::OperationalImpact;

/// Configuration errors are the one class rejected before a run starts.
/// Everything downstream degrades instead of failing.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("top_k must be at least 1")]
    InvalidTopK,

    #[error("min_margin_percent must be a finite number >= 0, got {0}")]
    InvalidMinMargin(f64),

    #[error("impact multiplier '{0}' must be a finite number > 0, got {1}")]
    InvalidMultiplier(&'static str, f64),

    #[error("fetch_timeout_secs must be > 0")]
    InvalidTimeout,

    #[error("cache_ttl_secs must be > 0")]
    InvalidCacheTtl,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub engine: EngineConfig,
    pub sources: SourcesConfig,
    #[serde(default)]
    pub monitoring: MonitoringConfig,
}

/// Everything the pure pipeline needs. Passed in explicitly so a run is a
/// function of its input batches plus this value, never ambient state.
#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
    /// Pairs with |raw margin| below this are noise, not candidate trades.
    #[serde(default = "default_min_margin")]
    pub min_margin_percent: f64,
    /// Headline size; the full ranked set is always retained.
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    #[serde(default)]
    pub impact_multipliers: ImpactMultipliers,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ImpactMultipliers {
    #[serde(default = "default_impact_low")]
    pub low: f64,
    #[serde(default = "default_impact_medium")]
    pub medium: f64,
    #[serde(default = "default_impact_high")]
    pub high: f64,
}

impl ImpactMultipliers {
    pub fn for_impact(&self, impact: OperationalImpact) -> f64 {
        match impact {
            OperationalImpact::Low => self.low,
            OperationalImpact::Medium => self.medium,
            OperationalImpact::High => self.high,
        }
    }
}

impl Default for ImpactMultipliers {
    fn default() -> Self {
        Self {
            low: default_impact_low(),
            medium: default_impact_medium(),
            high: default_impact_high(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SourcesConfig {
    pub climate_path: String,
    pub market_path: String,
    pub price_series_path: String,
    #[serde(default = "default_fetch_timeout")]
    pub fetch_timeout_secs: u64,
    #[serde(default = "default_cache_ttl")]
    pub cache_ttl_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct MonitoringConfig {
    #[serde(default)]
    pub csv_logging: bool,
    #[serde(default = "default_csv_path")]
    pub csv_log_path: String,
}

fn default_min_margin() -> f64 { 1.0 }
fn default_top_k() -> usize { 3 }
fn default_impact_low() -> f64 { 0.3 }
fn default_impact_medium() -> f64 { 0.6 }
fn default_impact_high() -> f64 { 1.0 }
fn default_fetch_timeout() -> u64 { 30 }
fn default_cache_ttl() -> u64 { 3600 }
fn default_csv_path() -> String { "opportunities.csv".to_string() }

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            min_margin_percent: default_min_margin(),
            top_k: default_top_k(),
            impact_multipliers: ImpactMultipliers::default(),
        }
    }
}

impl Config {
    pub fn load(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path))?;

        let config: Config = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path))?;

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.engine.validate()?;
        if self.sources.fetch_timeout_secs == 0 {
            return Err(ConfigError::InvalidTimeout);
        }
        if self.sources.cache_ttl_secs == 0 {
            return Err(ConfigError::InvalidCacheTtl);
        }
        Ok(())
    }
}

impl EngineConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.top_k == 0 {
            return Err(ConfigError::InvalidTopK);
        }
        if !self.min_margin_percent.is_finite() || self.min_margin_percent < 0.0 {
            return Err(ConfigError::InvalidMinMargin(self.min_margin_percent));
        }
        let m = &self.impact_multipliers;
        for (name, value) in [("low", m.low), ("medium", m.medium), ("high", m.high)] {
            if !value.is_finite() || value <= 0.0 {
                return Err(ConfigError::InvalidMultiplier(name, value));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = EngineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.min_margin_percent, 1.0);
        assert_eq!(config.top_k, 3);
        assert_eq!(config.impact_multipliers.high, 1.0);
    }

    #[test]
    fn test_zero_top_k_rejected() {
        let config = EngineConfig {
            top_k: 0,
            ..EngineConfig::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::InvalidTopK)));
    }

    #[test]
    fn test_negative_min_margin_rejected() {
        let config = EngineConfig {
            min_margin_percent: -0.5,
            ..EngineConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidMinMargin(_))
        ));
    }

    #[test]
    fn test_non_positive_multiplier_rejected() {
        let mut config = EngineConfig::default();
        config.impact_multipliers.medium = 0.0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidMultiplier("medium", _))
        ));
    }

    #[test]
    fn test_parse_full_config() {
        let raw = r#"
            [engine]
            min_margin_percent = 2.0
            top_k = 5

            [engine.impact_multipliers]
            low = 0.2
            medium = 0.5
            high = 0.9

            [sources]
            climate_path = "inputs/climate.json"
            market_path = "inputs/market.json"
            price_series_path = "inputs/series.json"
            fetch_timeout_secs = 10

            [monitoring]
            csv_logging = true
            csv_log_path = "out.csv"
        "#;
        let config: Config = toml::from_str(raw).unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(config.engine.top_k, 5);
        assert_eq!(config.engine.impact_multipliers.medium, 0.5);
        assert_eq!(config.sources.fetch_timeout_secs, 10);
        assert_eq!(config.sources.cache_ttl_secs, 3600);
        assert!(config.monitoring.csv_logging);
    }

    #[test]
    fn test_minimal_config_uses_defaults() {
        let raw = r#"
            [engine]

            [sources]
            climate_path = "a.json"
            market_path = "b.json"
            price_series_path = "c.json"
        "#;
        let config: Config = toml::from_str(raw).unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(config.engine.min_margin_percent, 1.0);
        assert!(!config.monitoring.csv_logging);
    }

    #[test]
    fn test_multiplier_lookup() {
        let m = ImpactMultipliers::default();
        assert_eq!(m.for_impact(OperationalImpact::Low), 0.3);
        assert_eq!(m.for_impact(OperationalImpact::Medium), 0.6);
        assert_eq!(m.for_impact(OperationalImpact::High), 1.0);
    }
}
