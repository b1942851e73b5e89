//! Environment variable configuration
//!
//! Provides environment variable overrides for configuration.

use std::env;

/// Environment variable prefix
const ENV_PREFIX: &str = "PARALLEL_SUITES";

/// Overrides read from environment variables
#[derive(Clone, Debug, Default)]
pub struct EnvConfig {
    /// Default timeout (ms) from PARALLEL_SUITES_TIMEOUT
    pub timeout: Option<u64>,
    /// Slow threshold (ms) from PARALLEL_SUITES_SLOW
    pub slow: Option<u64>,
    /// Parallel from PARALLEL_SUITES_PARALLEL
    pub parallel: Option<bool>,
    /// Concurrency width from PARALLEL_SUITES_CONCURRENCY
    pub concurrency: Option<usize>,
    /// Output format from PARALLEL_SUITES_FORMAT
    pub format: Option<String>,
    /// Config file from PARALLEL_SUITES_CONFIG
    pub config_file: Option<String>,
}

impl EnvConfig {
    /// Load configuration from environment variables
    pub fn load() -> Self {
        Self {
            timeout: get_env_parse("TIMEOUT"),
            slow: get_env_parse("SLOW"),
            parallel: get_env_bool("PARALLEL"),
            concurrency: get_env_parse("CONCURRENCY"),
            format: get_env("FORMAT"),
            config_file: get_env("CONFIG"),
        }
    }

    /// Check if any environment variables are set
    pub fn has_any(&self) -> bool {
        self.timeout.is_some()
            || self.slow.is_some()
            || self.parallel.is_some()
            || self.concurrency.is_some()
            || self.format.is_some()
            || self.config_file.is_some()
    }

    /// Print the overrides currently set
    pub fn print_summary(&self) {
        println!("Environment Configuration:");
        println!("  {ENV_PREFIX}_TIMEOUT:      {:?}", self.timeout);
        println!("  {ENV_PREFIX}_SLOW:         {:?}", self.slow);
        println!("  {ENV_PREFIX}_PARALLEL:     {:?}", self.parallel);
        println!("  {ENV_PREFIX}_CONCURRENCY:  {:?}", self.concurrency);
        println!("  {ENV_PREFIX}_FORMAT:       {:?}", self.format);
        println!("  {ENV_PREFIX}_CONFIG:       {:?}", self.config_file);
    }
}

/// Get environment variable with prefix
fn get_env(name: &str) -> Option<String> {
    env::var(format!("{ENV_PREFIX}_{name}")).ok()
}

/// Get environment variable and parse to type
fn get_env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    get_env(name).and_then(|v| v.parse().ok())
}

/// Get environment variable as boolean
fn get_env_bool(name: &str) -> Option<bool> {
    get_env(name).map(|v| {
        matches!(
            v.to_lowercase().as_str(),
            "1" | "true" | "yes" | "on" | "enabled"
        )
    })
}

/// Builder for setting environment variables (useful for testing)
pub struct EnvBuilder {
    vars: Vec<(String, String)>,
}

impl EnvBuilder {
    pub fn new() -> Self {
        Self { vars: Vec::new() }
    }

    pub fn timeout(mut self, timeout: u64) -> Self {
        self.vars
            .push((format!("{ENV_PREFIX}_TIMEOUT"), timeout.to_string()));
        self
    }

    pub fn parallel(mut self, parallel: bool) -> Self {
        self.vars
            .push((format!("{ENV_PREFIX}_PARALLEL"), parallel.to_string()));
        self
    }

    pub fn concurrency(mut self, concurrency: usize) -> Self {
        self.vars
            .push((format!("{ENV_PREFIX}_CONCURRENCY"), concurrency.to_string()));
        self
    }

    /// Apply environment variables
    pub fn apply(self) {
        for (key, value) in self.vars {
            env::set_var(key, value);
        }
    }

    /// Apply and return guard that restores on drop
    pub fn apply_scoped(self) -> EnvGuard {
        let previous: Vec<_> = self
            .vars
            .iter()
            .map(|(k, _)| (k.clone(), env::var(k).ok()))
            .collect();

        self.apply();

        EnvGuard { previous }
    }
}

impl Default for EnvBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Guard that restores environment variables on drop
pub struct EnvGuard {
    previous: Vec<(String, Option<String>)>,
}

impl Drop for EnvGuard {
    fn drop(&mut self) {
        for (key, value) in &self.previous {
            match value {
                Some(v) => env::set_var(key, v),
                None => env::remove_var(key),
            }
        }
    }
}

/// Print all PARALLEL_SUITES environment variables
pub fn print_env_help() {
    println!("Environment Variables:");
    println!();
    println!("  {ENV_PREFIX}_TIMEOUT       Default test timeout in milliseconds");
    println!("  {ENV_PREFIX}_SLOW          Slow threshold in milliseconds");
    println!("  {ENV_PREFIX}_PARALLEL      Run suites concurrently (true/false)");
    println!("  {ENV_PREFIX}_CONCURRENCY   Maximum concurrently running suites");
    println!("  {ENV_PREFIX}_FORMAT        Output format (spec, json, csv, summary)");
    println!("  {ENV_PREFIX}_CONFIG        Path to configuration file");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_env_config_default() {
        let config = EnvConfig::default();
        assert!(config.timeout.is_none());
        assert!(!config.has_any());
    }

    #[test]
    fn test_env_builder() {
        let _guard = EnvBuilder::new()
            .timeout(100)
            .parallel(false)
            .concurrency(3)
            .apply_scoped();

        let config = EnvConfig::load();
        assert_eq!(config.timeout, Some(100));
        assert_eq!(config.parallel, Some(false));
        assert_eq!(config.concurrency, Some(3));
        assert!(config.has_any());
    }
}
