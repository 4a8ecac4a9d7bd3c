//! Plugin Runtime Module
//!
//! Registry, dependency resolution, lifecycle loading, messaging, and hot
//! reload for the plugin system. Components are constructed once at process
//! start and passed by reference: the `SharedPluginRegistry` first, then a
//! `DependencyManager`, a `PluginLoader`, a `PluginMessenger`, and a
//! `HotReloadManager` on top.

pub mod compatibility;
pub mod context;
pub mod dependency;
pub mod error;
pub mod hot_reload;
pub mod loader;
pub mod messenger;
pub mod registry;
pub mod traits;
pub mod version;

#[cfg(test)]
pub mod tests;

// Re-export core types for easier access
pub use traits::{
    Platform, Plugin, PluginCategory, PluginDependency, PluginInfo, PluginPermissions, PluginState,
};
pub use error::{PluginError, PluginResult};
pub use context::PluginContext;

// Registry and management
pub use registry::{PluginRegistry, SharedPluginRegistry};
pub use compatibility::VersionCompatibilityChecker;
pub use dependency::{DependencyConflict, DependencyManager, ResolutionResult};
pub use loader::PluginLoader;
pub use messenger::{Message, MessagePriority, MessageType, PluginMessenger};
pub use hot_reload::{HotReloadManager, HotReloadState, ReloadOptions, ReloadOutcome, StateSnapshot};
