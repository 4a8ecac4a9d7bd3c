//! Core Plugin Traits
//!
//! Defines the plugin interface, its metadata types, and the lifecycle state
//! machine shared by the runtime components.

use crate::plugin::context::PluginContext;
use crate::plugin::error::{PluginError, PluginResult};
use async_trait::async_trait;
use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// Core plugin interface that all plugins must implement.
///
/// Lifecycle methods are invoked exclusively by the `PluginLoader`; other
/// components look plugins up in the registry by id and use the message
/// handler and metadata accessors only.
#[async_trait]
pub trait Plugin: Send + Sync {
    /// Get plugin metadata information
    fn info(&self) -> &PluginInfo;

    /// Prepare the plugin for use; called once per load before `start`
    async fn initialize(&mut self, context: &PluginContext) -> PluginResult<()>;

    /// Begin active operation
    async fn start(&mut self) -> PluginResult<()>;

    /// Suspend active operation; only called from the started state
    async fn pause(&mut self) -> PluginResult<()> {
        Ok(())
    }

    /// Resume from a paused state
    async fn resume(&mut self) -> PluginResult<()> {
        Ok(())
    }

    /// End active operation
    async fn stop(&mut self) -> PluginResult<()>;

    /// Release all resources; the instance is dropped afterwards
    async fn dispose(&mut self) -> PluginResult<()>;

    /// Generic message handler consulted when no typed handler is registered
    /// for the action
    async fn handle_message(&self, action: &str, payload: serde_json::Value) -> PluginResult<serde_json::Value>;

    /// Current runtime configuration, captured into hot-reload snapshots
    fn config(&self) -> HashMap<String, serde_json::Value> {
        HashMap::new()
    }

    /// Re-apply a configuration captured by `config()`
    async fn restore_config(&mut self, _config: HashMap<String, serde_json::Value>) -> PluginResult<()> {
        Ok(())
    }

    /// Opaque UI-surface descriptor for the settings screen; never inspected
    /// by the runtime
    fn config_widget(&self) -> Option<serde_json::Value> {
        None
    }

    /// Opaque UI-surface descriptor for the main surface; never inspected by
    /// the runtime
    fn main_widget(&self) -> Option<serde_json::Value> {
        None
    }
}

/// Plugin metadata and information
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginInfo {
    /// Plugin id (unique, immutable)
    pub id: String,

    /// Plugin version (semver)
    pub version: String,

    /// API version this plugin targets
    pub api_version: i64,

    /// Human-readable description
    pub description: String,

    /// Plugin author
    pub author: String,

    /// Plugin category
    pub category: PluginCategory,

    /// Capabilities the plugin requires from the host
    pub required_permissions: PluginPermissions,

    /// Plugin dependencies, in declaration order
    pub dependencies: Vec<PluginDependency>,

    /// Platforms the plugin supports; empty means all
    pub supported_platforms: HashSet<Platform>,
}

impl PluginInfo {
    /// Create a new PluginInfo targeting the current API version
    pub fn new<S: Into<String>>(id: S, version: S, category: PluginCategory) -> Self {
        Self {
            id: id.into(),
            version: version.into(),
            api_version: crate::plugin::version::get_api_version(),
            description: String::new(),
            author: String::new(),
            category,
            required_permissions: PluginPermissions::empty(),
            dependencies: Vec::new(),
            supported_platforms: HashSet::new(),
        }
    }

    /// Add a dependency
    pub fn with_dependency<S: Into<String>>(mut self, plugin_id: S, version_requirement: S, optional: bool) -> Self {
        self.dependencies.push(PluginDependency {
            plugin_id: plugin_id.into(),
            version_requirement: version_requirement.into(),
            optional,
        });
        self
    }

    /// Set the required permissions
    pub fn with_permissions(mut self, permissions: PluginPermissions) -> Self {
        self.required_permissions = permissions;
        self
    }

    /// Add a supported platform
    pub fn with_platform(mut self, platform: Platform) -> Self {
        self.supported_platforms.insert(platform);
        self
    }

    /// Set the description
    pub fn with_description<S: Into<String>>(mut self, description: S) -> Self {
        self.description = description.into();
        self
    }

    /// Set the author
    pub fn with_author<S: Into<String>>(mut self, author: S) -> Self {
        self.author = author.into();
        self
    }

    /// Override the targeted API version
    pub fn with_api_version(mut self, api_version: i64) -> Self {
        self.api_version = api_version;
        self
    }

    /// Check whether the plugin declares support for the given platform
    pub fn supports_platform(&self, platform: Platform) -> bool {
        self.supported_platforms.is_empty() || self.supported_platforms.contains(&platform)
    }
}

/// Plugin dependency specification
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginDependency {
    /// Id of the plugin depended upon
    pub plugin_id: String,

    /// Version requirement (semver)
    pub version_requirement: String,

    /// Whether dependency is optional
    pub optional: bool,
}

/// Plugin category classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PluginCategory {
    /// Host-integration plugins
    System,

    /// Plugins contributing UI surfaces
    Ui,

    /// Utility plugins
    Tool,

    /// Game plugins
    Game,

    /// Visual theme plugins
    Theme,

    /// Dashboard widget plugins
    Widget,

    /// Headless background services
    Service,
}

bitflags! {
    /// Capability flags a plugin may require from the host
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
    pub struct PluginPermissions: u32 {
        const FILE_SYSTEM   = 1 << 0;
        const NETWORK       = 1 << 1;
        const NOTIFICATIONS = 1 << 2;
        const CLIPBOARD     = 1 << 3;
        const SETTINGS      = 1 << 4;
        const CANVAS        = 1 << 5;
    }
}

impl PluginPermissions {
    /// Parse a comma-separated permission list, e.g. "notifications,canvas"
    pub fn parse_list(names: &str) -> PluginResult<Self> {
        let mut permissions = PluginPermissions::empty();
        for name in names.split(',') {
            let name = name.trim();
            if name.is_empty() {
                continue;
            }
            let flag = match name.to_lowercase().as_str() {
                "file_system" | "file-system" => PluginPermissions::FILE_SYSTEM,
                "network" => PluginPermissions::NETWORK,
                "notifications" => PluginPermissions::NOTIFICATIONS,
                "clipboard" => PluginPermissions::CLIPBOARD,
                "settings" => PluginPermissions::SETTINGS,
                "canvas" => PluginPermissions::CANVAS,
                other => {
                    return Err(PluginError::configuration_error(format!(
                        "Unknown permission: {}", other
                    )));
                }
            };
            permissions |= flag;
        }
        Ok(permissions)
    }
}

/// Host platform identifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Linux,
    MacOs,
    Windows,
    Android,
    Ios,
    Other,
}

impl Platform {
    /// The platform this process is running on
    pub fn current() -> Self {
        match std::env::consts::OS {
            "linux" => Platform::Linux,
            "macos" => Platform::MacOs,
            "windows" => Platform::Windows,
            "android" => Platform::Android,
            "ios" => Platform::Ios,
            _ => Platform::Other,
        }
    }
}

/// Plugin lifecycle state machine.
///
/// `Unloaded → Loaded → Initialized → Started ⇄ Paused → Stopped`, with
/// `Error` reachable from any non-terminal state. `Unloaded` is implicit for
/// unregistered ids; `Stopped` and `Error` are terminal until a reload
/// re-enters `Loaded`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PluginState {
    /// Plugin is not registered
    Unloaded,

    /// Plugin is registered but not initialized
    Loaded,

    /// Plugin is initialized and ready to start
    Initialized,

    /// Plugin is running; messages and events are deliverable
    Started,

    /// Plugin is suspended
    Paused,

    /// Plugin has been stopped
    Stopped,

    /// Plugin failed; the payload is a human-readable reason
    Error(String),
}

impl PluginState {
    /// States that only an explicit reload can leave
    pub fn is_terminal(&self) -> bool {
        matches!(self, PluginState::Stopped | PluginState::Error(_))
    }

    /// Whether messages and events may be delivered in this state
    pub fn is_active(&self) -> bool {
        matches!(self, PluginState::Started)
    }
}

impl std::fmt::Display for PluginState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PluginState::Unloaded => write!(f, "unloaded"),
            PluginState::Loaded => write!(f, "loaded"),
            PluginState::Initialized => write!(f, "initialized"),
            PluginState::Started => write!(f, "started"),
            PluginState::Paused => write!(f, "paused"),
            PluginState::Stopped => write!(f, "stopped"),
            PluginState::Error(reason) => write!(f, "error: {}", reason),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plugin_info_builder() {
        let info = PluginInfo::new("sketch-canvas", "1.2.0", PluginCategory::Tool)
            .with_description("Freehand drawing surface")
            .with_dependency("color-palette", "^1.0.0", false)
            .with_dependency("brush-pack", "*", true)
            .with_permissions(PluginPermissions::CANVAS | PluginPermissions::FILE_SYSTEM);

        assert_eq!(info.id, "sketch-canvas");
        assert_eq!(info.dependencies.len(), 2);
        assert!(info.dependencies[1].optional);
        assert!(info.required_permissions.contains(PluginPermissions::CANVAS));
        // No platform declared means every platform is supported
        assert!(info.supports_platform(Platform::current()));
    }

    #[test]
    fn test_platform_restriction() {
        let info = PluginInfo::new("mac-dock-pet", "0.1.0", PluginCategory::Game)
            .with_platform(Platform::MacOs);

        assert!(info.supports_platform(Platform::MacOs));
        assert!(!info.supports_platform(Platform::Linux));
    }

    #[test]
    fn test_permission_parsing() {
        let permissions = PluginPermissions::parse_list("notifications, canvas").unwrap();
        assert!(permissions.contains(PluginPermissions::NOTIFICATIONS));
        assert!(permissions.contains(PluginPermissions::CANVAS));
        assert!(!permissions.contains(PluginPermissions::FILE_SYSTEM));

        assert!(PluginPermissions::parse_list("telepathy").is_err());
    }

    #[test]
    fn test_state_classification() {
        assert!(PluginState::Stopped.is_terminal());
        assert!(PluginState::Error("init failed".to_string()).is_terminal());
        assert!(!PluginState::Paused.is_terminal());

        assert!(PluginState::Started.is_active());
        assert!(!PluginState::Paused.is_active());
    }
}
