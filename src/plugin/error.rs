//! Plugin Error Types
//!
//! Error handling for plugin runtime operations with context-aware error types.

use thiserror::Error;

/// Result type for plugin operations
pub type PluginResult<T> = Result<T, PluginError>;

/// Error types for plugin runtime operations
#[derive(Error, Debug, Clone)]
pub enum PluginError {
    /// Plugin not found
    #[error("Plugin not found: {plugin_id}")]
    PluginNotFound { plugin_id: String },

    /// Plugin already registered
    #[error("Plugin already registered: {plugin_id}")]
    PluginAlreadyRegistered { plugin_id: String },

    /// Plugin dependency error
    #[error("Plugin dependency error: {message}")]
    DependencyError { message: String },

    /// Circular dependency detected
    #[error("Circular dependency: {message}")]
    CircularDependency { message: String },

    /// Version compatibility error
    #[error("Version compatibility error: {message}")]
    VersionIncompatible { message: String },

    /// Missing required capability
    #[error("Permission denied: {message}")]
    PermissionDenied { message: String },

    /// Operation invalid for current lifecycle state
    #[error("Invalid plugin state: {message}")]
    InvalidState { message: String },

    /// Plugin loading error
    #[error("Plugin loading error: {message}")]
    LoadingFailed { message: String },

    /// Plugin unloading error
    #[error("Plugin unloading error: {message}")]
    UnloadFailed { message: String },

    /// Timeout error
    #[error("Plugin operation timed out: {message}")]
    Timeout { message: String },

    /// Message delivery error
    #[error("Plugin communication error: {message}")]
    Communication { message: String },

    /// Configuration error
    #[error("Plugin configuration error: {message}")]
    ConfigurationError { message: String },

    /// Generic plugin error
    #[error("Plugin error: {message}")]
    Generic { message: String },
}

impl PluginError {
    /// Create a plugin not found error
    pub fn plugin_not_found<S: Into<String>>(plugin_id: S) -> Self {
        Self::PluginNotFound { plugin_id: plugin_id.into() }
    }

    /// Create a plugin already registered error
    pub fn plugin_already_registered<S: Into<String>>(plugin_id: S) -> Self {
        Self::PluginAlreadyRegistered { plugin_id: plugin_id.into() }
    }

    /// Create a dependency error
    pub fn dependency_error<S: Into<String>>(message: S) -> Self {
        Self::DependencyError { message: message.into() }
    }

    /// Create a circular dependency error
    pub fn circular_dependency<S: Into<String>>(message: S) -> Self {
        Self::CircularDependency { message: message.into() }
    }

    /// Create a version incompatible error
    pub fn version_incompatible<S: Into<String>>(message: S) -> Self {
        Self::VersionIncompatible { message: message.into() }
    }

    /// Create a permission denied error
    pub fn permission_denied<S: Into<String>>(message: S) -> Self {
        Self::PermissionDenied { message: message.into() }
    }

    /// Create an invalid state error
    pub fn invalid_state<S: Into<String>>(message: S) -> Self {
        Self::InvalidState { message: message.into() }
    }

    /// Create a loading failed error
    pub fn loading_failed<S: Into<String>>(message: S) -> Self {
        Self::LoadingFailed { message: message.into() }
    }

    /// Create an unload failed error
    pub fn unload_failed<S: Into<String>>(message: S) -> Self {
        Self::UnloadFailed { message: message.into() }
    }

    /// Create a timeout error
    pub fn timeout<S: Into<String>>(message: S) -> Self {
        Self::Timeout { message: message.into() }
    }

    /// Create a communication error
    pub fn communication<S: Into<String>>(message: S) -> Self {
        Self::Communication { message: message.into() }
    }

    /// Create a configuration error
    pub fn configuration_error<S: Into<String>>(message: S) -> Self {
        Self::ConfigurationError { message: message.into() }
    }

    /// Create a generic error
    pub fn generic<S: Into<String>>(message: S) -> Self {
        Self::Generic { message: message.into() }
    }

    /// Check if error is recoverable without a reload
    pub fn is_recoverable(&self) -> bool {
        matches!(self,
            PluginError::Communication { .. } |
            PluginError::Timeout { .. } |
            PluginError::Generic { .. }
        )
    }

    /// Check if error is a configuration/declaration issue
    pub fn is_configuration_error(&self) -> bool {
        matches!(self,
            PluginError::ConfigurationError { .. } |
            PluginError::VersionIncompatible { .. } |
            PluginError::DependencyError { .. } |
            PluginError::CircularDependency { .. } |
            PluginError::PermissionDenied { .. }
        )
    }

    /// Check if error is related to plugin lifecycle
    pub fn is_lifecycle_error(&self) -> bool {
        matches!(self,
            PluginError::PluginNotFound { .. } |
            PluginError::PluginAlreadyRegistered { .. } |
            PluginError::InvalidState { .. } |
            PluginError::LoadingFailed { .. } |
            PluginError::UnloadFailed { .. }
        )
    }
}

// Allow conversion from common error types
impl From<std::io::Error> for PluginError {
    fn from(err: std::io::Error) -> Self {
        PluginError::generic(format!("IO error: {}", err))
    }
}

impl From<serde_json::Error> for PluginError {
    fn from(err: serde_json::Error) -> Self {
        PluginError::configuration_error(format!("JSON error: {}", err))
    }
}

impl From<tokio::task::JoinError> for PluginError {
    fn from(err: tokio::task::JoinError) -> Self {
        PluginError::generic(format!("Task join error: {}", err))
    }
}
