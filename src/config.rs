//! Runtime Configuration
//!
//! TOML-backed configuration for the plugin runtime with section/key lookup
//! and typed getters, plus the `RuntimeConfig` struct carrying the tunables
//! the core components consume.

use crate::plugin::traits::PluginPermissions;
use anyhow::{Context, Result};
use log::{debug, info};
use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;
use toml::Value;

/// Configuration storage - section_name -> key -> value
pub type Configuration = HashMap<String, HashMap<String, String>>;

/// Configuration manager
pub struct ConfigManager {
    config: Configuration,
    _config_file_path: Option<PathBuf>,
}

impl ConfigManager {
    /// Create a new ConfigManager from a Configuration (primarily for testing)
    pub fn from_config(config: Configuration) -> Self {
        Self {
            config,
            _config_file_path: None,
        }
    }

    /// Create an empty configuration
    pub fn empty() -> Self {
        Self::from_config(Configuration::new())
    }

    /// Load configuration from explicit file path
    pub fn load_from_file(path: PathBuf) -> Result<Self> {
        debug!("Loading configuration from file: {}", path.display());

        let content = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config = parse_toml_config(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        info!("Successfully loaded configuration from: {}", path.display());
        Ok(Self {
            config,
            _config_file_path: Some(path),
        })
    }

    /// Get value from configuration with base-section fallback
    pub fn get_value(&self, section: &str, key: &str) -> Option<&String> {
        if let Some(value) = self.config.get(section).and_then(|s| s.get(key)) {
            return Some(value);
        }

        self.config.get("base").and_then(|s| s.get(key))
    }

    /// Get boolean value with type conversion
    pub fn get_bool(&self, section: &str, key: &str) -> Result<Option<bool>> {
        match self.get_value(section, key) {
            Some(value) => match value.to_lowercase().as_str() {
                "true" => Ok(Some(true)),
                "false" => Ok(Some(false)),
                _ => Err(anyhow::anyhow!("Invalid boolean value for {}.{}: {}", section, key, value)),
            },
            None => Ok(None),
        }
    }

    /// Get unsigned integer value with type conversion
    pub fn get_u64(&self, section: &str, key: &str) -> Result<Option<u64>> {
        match self.get_value(section, key) {
            Some(value) => {
                let parsed = value.parse::<u64>()
                    .with_context(|| format!("Invalid integer value for {}.{}: {}", section, key, value))?;
                Ok(Some(parsed))
            }
            None => Ok(None),
        }
    }

    /// Get log level value with type conversion
    pub fn get_log_level(&self, section: &str, key: &str) -> Result<Option<log::LevelFilter>> {
        match self.get_value(section, key) {
            Some(value) => Ok(Some(crate::logging::parse_log_level(value)?)),
            None => Ok(None),
        }
    }

    /// Get path value with type conversion
    pub fn get_path(&self, section: &str, key: &str) -> Option<PathBuf> {
        self.get_value(section, key).map(PathBuf::from)
    }

    /// Build the runtime configuration from the `[runtime]` section
    pub fn get_runtime_config(&self) -> Result<RuntimeConfig> {
        let mut config = RuntimeConfig::default();

        if let Some(ms) = self.get_u64("runtime", "load-timeout-ms")? {
            config.default_load_timeout = Duration::from_millis(ms);
        }

        if let Some(ms) = self.get_u64("runtime", "message-timeout-ms")? {
            config.default_message_timeout = Duration::from_millis(ms);
        }

        if let Some(ms) = self.get_u64("runtime", "event-wait-timeout-ms")? {
            config.event_wait_timeout = Duration::from_millis(ms);
        }

        if let Some(names) = self.get_value("runtime", "granted-permissions") {
            config.granted_permissions = PluginPermissions::parse_list(names)
                .with_context(|| format!("Invalid granted-permissions value: {}", names))?;
        }

        Ok(config)
    }
}

/// Parse TOML content into the flat section/key/value configuration.
///
/// Top-level tables become sections; top-level scalars land in "base".
fn parse_toml_config(content: &str) -> Result<Configuration> {
    let parsed: Value = content.parse()
        .context("Invalid TOML syntax")?;

    let table = parsed.as_table()
        .context("Configuration root must be a table")?;

    let mut config = Configuration::new();

    for (key, value) in table {
        match value {
            Value::Table(section_table) => {
                let section = config.entry(key.clone()).or_default();
                for (section_key, section_value) in section_table {
                    section.insert(section_key.clone(), toml_value_to_string(section_value));
                }
            }
            other => {
                config
                    .entry("base".to_string())
                    .or_default()
                    .insert(key.clone(), toml_value_to_string(other));
            }
        }
    }

    Ok(config)
}

fn toml_value_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Tunables consumed by the runtime components.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// Bound on each lifecycle call during load/unload
    pub default_load_timeout: Duration,

    /// Bound on a request/response round trip when the sender gives none
    pub default_message_timeout: Duration,

    /// Bound on `EventBus::wait_for` when the caller gives none
    pub event_wait_timeout: Duration,

    /// Capabilities the host grants to plugins; a plugin requiring more
    /// fails to load
    pub granted_permissions: PluginPermissions,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            default_load_timeout: Duration::from_secs(10),
            default_message_timeout: Duration::from_secs(5),
            event_wait_timeout: Duration::from_secs(5),
            granted_permissions: PluginPermissions::all(),
        }
    }
}
