//! Plugin Registry
//!
//! The single source of truth for which plugins exist, their current
//! lifecycle state, and their metadata. The registry is intentionally a dumb
//! store: transition legality lives in the loader, which keeps the registry
//! trivially testable and lets the loader's rules evolve independently.

use crate::plugin::error::{PluginError, PluginResult};
use crate::plugin::traits::{Plugin, PluginCategory, PluginState};
use log::debug;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};
use tokio_stream::wrappers::BroadcastStream;

/// Capacity of each per-plugin state-change channel. Slow subscribers that
/// lag behind lose intermediate states, not the stream itself.
const STATE_CHANNEL_CAPACITY: usize = 16;

/// Registry of plugin instances and their lifecycle state
pub struct PluginRegistry {
    /// Registered plugins by id
    plugins: HashMap<String, Box<dyn Plugin>>,

    /// Current lifecycle state by id
    states: HashMap<String, PluginState>,

    /// Per-plugin state-change channels (broadcast, replay-none)
    state_channels: HashMap<String, broadcast::Sender<PluginState>>,
}

impl PluginRegistry {
    /// Create a new plugin registry
    pub fn new() -> Self {
        Self {
            plugins: HashMap::new(),
            states: HashMap::new(),
            state_channels: HashMap::new(),
        }
    }

    /// Register a plugin, initializing its state to `Loaded`
    pub fn register_plugin(&mut self, plugin: Box<dyn Plugin>) -> PluginResult<()> {
        let id = plugin.info().id.clone();

        if self.plugins.contains_key(&id) {
            return Err(PluginError::plugin_already_registered(&id));
        }

        let (tx, _) = broadcast::channel(STATE_CHANNEL_CAPACITY);
        self.plugins.insert(id.clone(), plugin);
        self.states.insert(id.clone(), PluginState::Loaded);
        let _ = tx.send(PluginState::Loaded);
        self.state_channels.insert(id.clone(), tx);

        debug!("Registered plugin '{}'", id);
        Ok(())
    }

    /// Unregister a plugin, returning the instance to the caller.
    ///
    /// Dropping the state channel closes the plugin's state stream.
    pub fn unregister_plugin(&mut self, id: &str) -> PluginResult<Box<dyn Plugin>> {
        let plugin = self.plugins.remove(id)
            .ok_or_else(|| PluginError::plugin_not_found(id))?;

        self.states.remove(id);
        self.state_channels.remove(id);

        debug!("Unregistered plugin '{}'", id);
        Ok(plugin)
    }

    /// Get a plugin by id (immutable)
    pub fn get_plugin(&self, id: &str) -> Option<&dyn Plugin> {
        self.plugins.get(id).map(|p| p.as_ref())
    }

    /// Get a plugin by id (mutable)
    pub fn get_plugin_mut(&mut self, id: &str) -> Option<&mut Box<dyn Plugin>> {
        self.plugins.get_mut(id)
    }

    /// Check whether a plugin id is registered
    pub fn contains(&self, id: &str) -> bool {
        self.plugins.contains_key(id)
    }

    /// List all registered plugin ids
    pub fn list_plugins(&self) -> Vec<String> {
        self.plugins.keys().cloned().collect()
    }

    /// Get ids of plugins in a category
    pub fn get_plugins_by_category(&self, category: PluginCategory) -> Vec<String> {
        self.plugins
            .iter()
            .filter(|(_, plugin)| plugin.info().category == category)
            .map(|(id, _)| id.clone())
            .collect()
    }

    /// Get ids of plugins in a given lifecycle state
    pub fn get_plugins_by_state(&self, state: &PluginState) -> Vec<String> {
        self.states
            .iter()
            .filter(|(_, s)| *s == state)
            .map(|(id, _)| id.clone())
            .collect()
    }

    /// Get ids of started plugins
    pub fn active_plugins(&self) -> Vec<String> {
        self.states
            .iter()
            .filter(|(_, s)| s.is_active())
            .map(|(id, _)| id.clone())
            .collect()
    }

    /// Current state of a plugin, or `None` for unregistered ids
    pub fn plugin_state(&self, id: &str) -> Option<PluginState> {
        self.states.get(id).cloned()
    }

    /// Overwrite a plugin's state and publish it on the state-change channel.
    ///
    /// No transition-legality check happens here; the loader owns the state
    /// machine.
    pub fn update_state(&mut self, id: &str, new_state: PluginState) -> PluginResult<()> {
        if !self.states.contains_key(id) {
            return Err(PluginError::plugin_not_found(id));
        }

        debug!("Plugin '{}' state -> {}", id, new_state);
        self.states.insert(id.to_string(), new_state.clone());

        if let Some(tx) = self.state_channels.get(id) {
            // No receivers is fine; the stream is replay-none
            let _ = tx.send(new_state);
        }

        Ok(())
    }

    /// Live stream of subsequent state changes for a plugin, or `None` if
    /// the id is unknown. Previously published states are not replayed.
    pub fn state_stream(&self, id: &str) -> Option<BroadcastStream<PluginState>> {
        self.state_channels
            .get(id)
            .map(|tx| BroadcastStream::new(tx.subscribe()))
    }

    /// Get the count of registered plugins
    pub fn plugin_count(&self) -> usize {
        self.plugins.len()
    }

    /// Collect metadata for every registered plugin
    pub fn plugin_infos(&self) -> Vec<crate::plugin::traits::PluginInfo> {
        self.plugins.values().map(|p| p.info().clone()).collect()
    }

    /// Remove every plugin; used during teardown and in tests
    pub fn clear(&mut self) {
        self.plugins.clear();
        self.states.clear();
        self.state_channels.clear();
    }

    /// Diagnostic key-value snapshot for logging and tests
    pub fn get_status(&self) -> HashMap<String, serde_json::Value> {
        let mut status = HashMap::new();
        status.insert("plugin_count".to_string(), serde_json::json!(self.plugins.len()));
        status.insert("active_count".to_string(), serde_json::json!(self.active_plugins().len()));

        let states: HashMap<String, String> = self.states
            .iter()
            .map(|(id, state)| (id.clone(), state.to_string()))
            .collect();
        status.insert("states".to_string(), serde_json::json!(states));

        status
    }
}

impl Default for PluginRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Thread-safe plugin registry wrapper
pub struct SharedPluginRegistry {
    inner: Arc<RwLock<PluginRegistry>>,
}

impl SharedPluginRegistry {
    /// Create a new shared plugin registry
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(PluginRegistry::new())),
        }
    }

    /// Get the inner registry for direct access
    pub fn inner(&self) -> &Arc<RwLock<PluginRegistry>> {
        &self.inner
    }

    /// Clone the Arc for sharing
    pub fn clone_inner(&self) -> Arc<RwLock<PluginRegistry>> {
        Arc::clone(&self.inner)
    }
}

impl Clone for SharedPluginRegistry {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl Default for SharedPluginRegistry {
    fn default() -> Self {
        Self::new()
    }
}
