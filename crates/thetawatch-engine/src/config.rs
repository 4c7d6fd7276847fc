//! Application configuration.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thetawatch_position::{AggregatorConfig, ExitConfig, HealthConfig};
use thetawatch_risk::{CorrelationConfig, ThresholdConfig};
use thetawatch_theta::ThetaConfig;
use tracing::warn;

use crate::error::{EngineError, EngineResult};

/// Environment variable consulted when no `--config` is given.
pub const CONFIG_ENV_VAR: &str = "THETAWATCH_CONFIG";

/// Fallback config path.
pub const DEFAULT_CONFIG_PATH: &str = "config/default.toml";

/// Engine scheduling configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Threshold evaluation interval (ms). Default: 5,000.
    #[serde(default = "default_evaluation_interval_ms")]
    pub evaluation_interval_ms: u64,
    /// Telemetry and stale refresh interval (ms). Default: 1,000.
    #[serde(default = "default_telemetry_interval_ms")]
    pub telemetry_interval_ms: u64,
    /// Feed event channel capacity.
    #[serde(default = "default_feed_channel_capacity")]
    pub feed_channel_capacity: usize,
    /// Account phase used for correlation limits.
    #[serde(default = "default_account_phase")]
    pub account_phase: u8,
}

fn default_evaluation_interval_ms() -> u64 {
    5_000
}

fn default_telemetry_interval_ms() -> u64 {
    1_000
}

fn default_feed_channel_capacity() -> usize {
    1024
}

fn default_account_phase() -> u8 {
    1
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            evaluation_interval_ms: default_evaluation_interval_ms(),
            telemetry_interval_ms: default_telemetry_interval_ms(),
            feed_channel_capacity: default_feed_channel_capacity(),
            account_phase: default_account_phase(),
        }
    }
}

impl EngineConfig {
    #[must_use]
    pub fn evaluation_interval(&self) -> Duration {
        Duration::from_millis(self.evaluation_interval_ms)
    }

    #[must_use]
    pub fn telemetry_interval(&self) -> Duration {
        Duration::from_millis(self.telemetry_interval_ms)
    }
}

/// Application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub aggregator: AggregatorConfig,
    #[serde(default)]
    pub thresholds: ThresholdConfig,
    #[serde(default)]
    pub correlation: CorrelationConfig,
    #[serde(default)]
    pub health: HealthConfig,
    #[serde(default)]
    pub exit: ExitConfig,
    #[serde(default)]
    pub theta: ThetaConfig,
}

impl AppConfig {
    /// Load configuration from a TOML file.
    pub fn from_file(path: &str) -> EngineResult<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| EngineError::Config(format!("Failed to read config: {e}")))?;

        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> EngineResult<Self> {
        toml::from_str(content)
            .map_err(|e| EngineError::Config(format!("Failed to parse config: {e}")))
    }

    /// Load from `path`, falling back to defaults when the file is missing.
    pub fn load(path: &str) -> EngineResult<Self> {
        let config = if Path::new(path).exists() {
            Self::from_file(path)?
        } else {
            warn!(config_path = %path, "Config file not found, using defaults");
            Self::default()
        };
        config.validate()?;
        Ok(config)
    }

    /// Resolve the config path: explicit argument, then env var, then default.
    #[must_use]
    pub fn resolve_path(explicit: Option<String>) -> String {
        explicit
            .or_else(|| std::env::var(CONFIG_ENV_VAR).ok())
            .unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string())
    }

    pub fn validate(&self) -> EngineResult<()> {
        if self.engine.evaluation_interval_ms == 0 || self.engine.telemetry_interval_ms == 0 {
            return Err(EngineError::Config("intervals must be positive".to_string()));
        }
        if self.engine.feed_channel_capacity == 0 {
            return Err(EngineError::Config(
                "feed_channel_capacity must be positive".to_string(),
            ));
        }
        self.aggregator.validate()?;
        self.thresholds.validate()?;
        self.correlation.validate()?;
        self.theta.validate()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.engine.evaluation_interval(), Duration::from_secs(5));
        assert_eq!(config.engine.telemetry_interval(), Duration::from_secs(1));
        assert_eq!(config.aggregator.cache_ttl_ms, 500);
    }

    #[test]
    fn test_partial_toml() {
        let config = AppConfig::from_toml(
            r#"
[engine]
account_phase = 3

[aggregator]
cache_ttl_ms = 250

[thresholds.risk_score]
warning = 60.0
critical = 40.0
"#,
        )
        .unwrap();

        assert_eq!(config.engine.account_phase, 3);
        assert_eq!(config.engine.evaluation_interval_ms, 5_000);
        assert_eq!(config.aggregator.cache_ttl_ms, 250);
        assert_eq!(config.thresholds.risk_score.critical, 40.0);
        assert_eq!(config.theta.material_gap, 10.0);
    }

    #[test]
    fn test_parse_error_is_config_error() {
        let result = AppConfig::from_toml("engine = 5");
        assert!(matches!(result, Err(EngineError::Config(_))));
    }

    #[test]
    fn test_missing_file_falls_back_to_defaults() {
        let config = AppConfig::load("/nonexistent/thetawatch.toml").unwrap();
        assert_eq!(config.engine.account_phase, 1);
    }

    #[test]
    fn test_load_rejects_invalid_values() {
        let path = std::env::temp_dir().join(format!(
            "thetawatch-config-{}.toml",
            std::process::id()
        ));
        std::fs::write(&path, "[engine]\nevaluation_interval_ms = 0\n").unwrap();

        let result = AppConfig::load(path.to_str().unwrap());
        let _ = std::fs::remove_file(&path);
        assert!(matches!(result, Err(EngineError::Config(_))));
    }

    #[test]
    fn test_resolve_path_prefers_explicit() {
        assert_eq!(
            AppConfig::resolve_path(Some("custom.toml".to_string())),
            "custom.toml"
        );
    }
}
