//! Bridge configuration.
//!
//! Precedence, highest first: environment variables, the file named by
//! `MEXPIPE_CONFIG` (YAML or JSON), built-in defaults.

use crate::host::ApiFlavour;
use anyhow::{Context, Result};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::Path;

pub const CONFIG_ENV: &str = "MEXPIPE_CONFIG";
pub const API_ENV: &str = "MEXPIPE_API";
pub const FORWARD_LOGS_ENV: &str = "MEXPIPE_FORWARD_LOGS";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BridgeConfig {
    /// Host API generation to bind
    #[serde(default)]
    pub api: ApiFlavour,
    #[serde(default)]
    pub hooks: HooksConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Names of the setters the pipeline runtime exports for its sinks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HooksConfig {
    #[serde(default = "default_print_setter")]
    pub print_setter: String,
    #[serde(default = "default_error_setter")]
    pub error_setter: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Filter directive, e.g. `warn` or `mexpipe=trace`
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Also print log records through the host's output channel
    #[serde(default)]
    pub forward_to_host: bool,
}

fn default_print_setter() -> String {
    "halide_set_custom_print".to_string()
}

fn default_error_setter() -> String {
    "halide_set_error_handler".to_string()
}

fn default_log_level() -> String {
    "warn".to_string()
}

impl Default for HooksConfig {
    fn default() -> Self {
        Self {
            print_setter: default_print_setter(),
            error_setter: default_error_setter(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            forward_to_host: false,
        }
    }
}

impl BridgeConfig {
    /// Load from the process environment.
    pub fn load() -> Result<Self> {
        let mut config = match env::var(CONFIG_ENV) {
            Ok(path) if !path.trim().is_empty() => {
                info!("Loading configuration from: {path}");
                Self::from_file(Path::new(&path))?
            }
            _ => {
                debug!("No configuration file set, using defaults");
                Self::default()
            }
        };
        config.apply_overrides(|key| env::var(key).ok());
        Ok(config)
    }

    /// Load a YAML or JSON file; other extensions are tried as both.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config = match path.extension().and_then(|ext| ext.to_str()) {
            Some("yaml") | Some("yml") => serde_yaml::from_str(&content)
                .with_context(|| format!("Failed to parse YAML config: {}", path.display()))?,
            Some("json") => serde_json::from_str(&content)
                .with_context(|| format!("Failed to parse JSON config: {}", path.display()))?,
            _ => {
                if let Ok(config) = serde_yaml::from_str(&content) {
                    config
                } else if let Ok(config) = serde_json::from_str(&content) {
                    config
                } else {
                    return Err(anyhow::anyhow!(
                        "Could not parse config file {} (tried YAML, JSON)",
                        path.display()
                    ));
                }
            }
        };
        Ok(config)
    }

    /// Apply environment-style overrides. Unparseable values are ignored.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(api) = lookup(API_ENV).and_then(|v| ApiFlavour::from_str(&v)) {
            self.api = api;
        }
        if let Some(level) = lookup(mexpipe_logging::LOG_ENV) {
            if !level.trim().is_empty() {
                self.logging.level = level;
            }
        }
        if let Some(flag) = lookup(FORWARD_LOGS_ENV).and_then(|v| parse_bool(&v)) {
            self.logging.forward_to_host = flag;
        }
    }
}

fn parse_bool(s: &str) -> Option<bool> {
    match s.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" | "" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn defaults() {
        let config = BridgeConfig::default();
        assert_eq!(config.logging.level, "warn");
        assert!(!config.logging.forward_to_host);
        assert_eq!(config.hooks.print_setter, "halide_set_custom_print");
        assert_eq!(config.hooks.error_setter, "halide_set_error_handler");
    }

    #[test]
    fn partial_yaml_keeps_defaults() {
        let config: BridgeConfig = serde_yaml::from_str("api: compat\nlogging:\n  level: debug\n").unwrap();
        assert_eq!(config.api, ApiFlavour::Compat);
        assert_eq!(config.logging.level, "debug");
        assert!(!config.logging.forward_to_host);
        assert_eq!(config.hooks, HooksConfig::default());
    }

    #[test]
    fn json_round_trip() {
        let mut config = BridgeConfig::default();
        config.hooks.print_setter = "custom_print".to_string();
        let json = serde_json::to_string_pretty(&config).unwrap();
        let parsed: BridgeConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn overrides_win_over_file_values() {
        let mut config = BridgeConfig {
            api: ApiFlavour::Large,
            ..BridgeConfig::default()
        };
        config.apply_overrides(lookup(&[
            ("MEXPIPE_API", "700"),
            ("MEXPIPE_LOG", "mexpipe=trace"),
            ("MEXPIPE_FORWARD_LOGS", "yes"),
        ]));
        assert_eq!(config.api, ApiFlavour::Compat);
        assert_eq!(config.logging.level, "mexpipe=trace");
        assert!(config.logging.forward_to_host);
    }

    #[test]
    fn bad_overrides_are_ignored() {
        let mut config = BridgeConfig::default();
        config.apply_overrides(lookup(&[
            ("MEXPIPE_API", "huge"),
            ("MEXPIPE_LOG", "  "),
            ("MEXPIPE_FORWARD_LOGS", "maybe"),
        ]));
        assert_eq!(config, BridgeConfig::default());
    }
}
