//! Configuration module
//!
//! Run configuration layered from defaults, a config file, environment
//! variables and finally command-line flags.

mod env;
mod file;

pub use env::{print_env_help, EnvBuilder, EnvConfig};
pub use file::ConfigFile;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Options that shape one run
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// Default per-test timeout in milliseconds (0 disables)
    pub timeout_ms: u64,

    /// Slow threshold in milliseconds (reporting only)
    pub slow_ms: u64,

    /// Run suites and tests concurrently
    pub parallel: bool,

    /// Maximum concurrently running top-level suites
    /// (defaults to the number of top-level suites)
    pub concurrency: Option<usize>,

    /// Output format (spec, json, json-pretty, csv, summary)
    pub format: String,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 2000,
            slow_ms: 75,
            parallel: true,
            concurrency: None,
            format: "spec".to_string(),
        }
    }
}

impl RunConfig {
    pub fn serial() -> Self {
        Self {
            parallel: false,
            ..Self::default()
        }
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    pub fn with_slow_ms(mut self, slow_ms: u64) -> Self {
        self.slow_ms = slow_ms;
        self
    }

    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = Some(concurrency);
        self
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn slow(&self) -> Duration {
        Duration::from_millis(self.slow_ms)
    }

    /// Dispatch width for `top_level` suites
    pub fn width(&self, top_level: usize) -> usize {
        if !self.parallel {
            return 1;
        }
        self.concurrency.unwrap_or(top_level).max(1)
    }

    /// Reject settings the scheduler cannot honour
    pub fn validate(&self) -> Result<()> {
        if self.concurrency == Some(0) {
            anyhow::bail!("concurrency must be at least 1");
        }
        if crate::output::OutputFormat::from_str(&self.format).is_none() {
            anyhow::bail!(
                "Unknown output format '{}'. Valid: spec, json, json-pretty, csv, summary",
                self.format
            );
        }
        Ok(())
    }

    /// Overlay environment variables
    pub fn apply_env(&mut self, env: &EnvConfig) {
        if let Some(timeout) = env.timeout {
            self.timeout_ms = timeout;
        }
        if let Some(slow) = env.slow {
            self.slow_ms = slow;
        }
        if let Some(parallel) = env.parallel {
            self.parallel = parallel;
        }
        if let Some(concurrency) = env.concurrency {
            self.concurrency = Some(concurrency);
        }
        if let Some(format) = &env.format {
            self.format = format.clone();
        }
    }

    /// Load configuration from a YAML or JSON file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content =
            std::fs::read_to_string(path.as_ref()).context("Failed to read config file")?;

        let config: Self = if file::is_yaml_file(path.as_ref()) {
            serde_yaml::from_str(&content).context("Failed to parse YAML config")?
        } else {
            serde_json::from_str(&content).context("Failed to parse JSON config")?
        };

        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = RunConfig::default();
        assert_eq!(config.timeout(), Duration::from_millis(2000));
        assert!(config.parallel);
        assert_eq!(config.width(3), 3);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_serial_width() {
        let config = RunConfig::serial().with_concurrency(8);
        assert_eq!(config.width(5), 1);
        assert_eq!(RunConfig::default().with_concurrency(2).width(5), 2);
        assert_eq!(RunConfig::default().width(0), 1);
    }

    #[test]
    fn test_validate_rejects_zero_concurrency() {
        let config = RunConfig::default().with_concurrency(0);
        assert!(config.validate().is_err());

        let config = RunConfig {
            format: "xml".to_string(),
            ..RunConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_apply_env() {
        let mut config = RunConfig::default();
        config.apply_env(&EnvConfig {
            timeout: Some(100),
            parallel: Some(false),
            ..Default::default()
        });
        assert_eq!(config.timeout_ms, 100);
        assert!(!config.parallel);
        assert_eq!(config.slow_ms, 75);
    }

    #[test]
    fn test_partial_yaml_uses_defaults() {
        let config: RunConfig = serde_yaml::from_str("timeout_ms: 500\n").unwrap();
        assert_eq!(config.timeout_ms, 500);
        assert_eq!(config.slow_ms, 75);
        assert!(config.parallel);
    }
}
