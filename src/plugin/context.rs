//! Plugin Context
//!
//! The environment handed to plugins during initialization.

use crate::config::RuntimeConfig;
use crate::plugin::traits::{Platform, PluginPermissions};
use std::collections::HashMap;

/// Context provided to plugins when they initialize
#[derive(Debug, Clone)]
pub struct PluginContext {
    /// Host API version
    pub api_version: i64,

    /// Platform the host is running on
    pub platform: Platform,

    /// Capabilities the host grants
    pub granted_permissions: PluginPermissions,

    /// Plugin-specific configuration data
    pub plugin_config: HashMap<String, serde_json::Value>,
}

impl PluginContext {
    /// Build a context from the runtime configuration
    pub fn new(config: &RuntimeConfig) -> Self {
        Self {
            api_version: crate::plugin::version::get_api_version(),
            platform: Platform::current(),
            granted_permissions: config.granted_permissions,
            plugin_config: HashMap::new(),
        }
    }

    /// Attach plugin-specific configuration
    pub fn with_config(mut self, plugin_config: HashMap<String, serde_json::Value>) -> Self {
        self.plugin_config = plugin_config;
        self
    }
}
