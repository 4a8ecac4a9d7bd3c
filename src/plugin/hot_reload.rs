//! Hot Reload Manager
//!
//! A development-time reload transaction built on the loader and registry:
//! unload, snapshot, re-register, load, and optional state restore. Batch
//! operations capture per-plugin failures into results so one broken plugin
//! cannot abort the batch.
//!
//! The actual file-watch mechanism is an external collaborator; this
//! component only reacts to plugin-changed signals while watching.

use crate::plugin::error::{PluginError, PluginResult};
use crate::plugin::loader::PluginLoader;
use crate::plugin::registry::SharedPluginRegistry;
use crate::plugin::traits::{Plugin, PluginState};
use dashmap::DashMap;
use log::{debug, info, warn};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::SystemTime;
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;

/// Capacity of the manager state-change channel
const STATE_CHANNEL_CAPACITY: usize = 16;

/// Hot reload manager state machine:
/// `Idle → Watching → Reloading → Idle`, with `Error` reachable from
/// `Reloading`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HotReloadState {
    Idle,
    Watching,
    Reloading,
    Error(String),
}

/// Point-in-time capture of a plugin's configuration, taken immediately
/// before unload so a reload can optionally restore it. Superseded by a
/// newer snapshot for the same id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateSnapshot {
    pub plugin_id: String,
    pub state: PluginState,
    pub config: HashMap<String, serde_json::Value>,
    pub timestamp: SystemTime,
}

/// Options for a single reload
#[derive(Default)]
pub struct ReloadOptions {
    /// Snapshot the plugin's config before unloading and re-apply it to the
    /// freshly started instance
    pub preserve_state: bool,

    /// Substitute instance to register in place of the current one
    pub new_plugin: Option<Box<dyn Plugin>>,
}

impl ReloadOptions {
    /// Reload preserving the plugin's configuration
    pub fn preserve() -> Self {
        Self {
            preserve_state: true,
            new_plugin: None,
        }
    }

    /// Reload with a substitute instance
    pub fn with_new_plugin(mut self, plugin: Box<dyn Plugin>) -> Self {
        self.new_plugin = Some(plugin);
        self
    }
}

/// Per-plugin result of a reload; batch operations collect these instead of
/// failing fast
#[derive(Debug, Clone)]
pub struct ReloadOutcome {
    pub success: bool,
    pub plugin_id: String,
    pub error: Option<String>,
}

impl ReloadOutcome {
    fn success(plugin_id: &str) -> Self {
        Self {
            success: true,
            plugin_id: plugin_id.to_string(),
            error: None,
        }
    }

    fn failure(plugin_id: &str, error: &PluginError) -> Self {
        Self {
            success: false,
            plugin_id: plugin_id.to_string(),
            error: Some(error.to_string()),
        }
    }
}

/// Orchestrates reload transactions over the loader and registry
pub struct HotReloadManager {
    loader: Arc<PluginLoader>,
    registry: SharedPluginRegistry,
    snapshots: DashMap<String, StateSnapshot>,
    watched_paths: RwLock<Vec<PathBuf>>,
    state: RwLock<HotReloadState>,
    state_tx: broadcast::Sender<HotReloadState>,
}

impl HotReloadManager {
    /// Create a new hot reload manager
    pub fn new(loader: Arc<PluginLoader>, registry: SharedPluginRegistry) -> Self {
        let (state_tx, _) = broadcast::channel(STATE_CHANNEL_CAPACITY);
        Self {
            loader,
            registry,
            snapshots: DashMap::new(),
            watched_paths: RwLock::new(Vec::new()),
            state: RwLock::new(HotReloadState::Idle),
            state_tx,
        }
    }

    fn set_state(&self, new_state: HotReloadState) {
        debug!("Hot reload state -> {:?}", new_state);
        *self.state.write() = new_state.clone();
        let _ = self.state_tx.send(new_state);
    }

    /// Current manager state
    pub fn current_state(&self) -> HotReloadState {
        self.state.read().clone()
    }

    /// Live stream of subsequent manager state changes
    pub fn state_changes(&self) -> BroadcastStream<HotReloadState> {
        BroadcastStream::new(self.state_tx.subscribe())
    }

    /// Begin reacting to plugin-changed signals for the given locations
    pub fn start_watching(&self, paths: Vec<PathBuf>) {
        info!("Watching {} path(s) for plugin changes", paths.len());
        *self.watched_paths.write() = paths;
        self.set_state(HotReloadState::Watching);
    }

    /// Stop reacting to plugin-changed signals
    pub fn stop_watching(&self) {
        self.watched_paths.write().clear();
        self.set_state(HotReloadState::Idle);
    }

    /// Paths currently being watched
    pub fn watched_paths(&self) -> Vec<PathBuf> {
        self.watched_paths.read().clone()
    }

    /// React to an external plugin-changed signal with a state-preserving
    /// reload. Ignored unless the manager is watching.
    pub async fn handle_change_signal(&self, plugin_id: &str) -> ReloadOutcome {
        if self.current_state() != HotReloadState::Watching {
            return ReloadOutcome {
                success: false,
                plugin_id: plugin_id.to_string(),
                error: Some("hot reload manager is not watching".to_string()),
            };
        }

        debug!("Change signal for plugin '{}'", plugin_id);
        self.reload_plugin(plugin_id, ReloadOptions::preserve()).await
    }

    /// Reload a plugin, optionally preserving its configuration across the
    /// unload/load cycle. Captures failures into the outcome instead of
    /// returning an error, so batch operations can continue past them.
    pub async fn reload_plugin(&self, id: &str, options: ReloadOptions) -> ReloadOutcome {
        let resume_state = match self.current_state() {
            HotReloadState::Watching => HotReloadState::Watching,
            _ => HotReloadState::Idle,
        };

        self.set_state(HotReloadState::Reloading);

        match self.perform_reload(id, options).await {
            Ok(()) => {
                info!("Reloaded plugin '{}'", id);
                self.set_state(resume_state);
                ReloadOutcome::success(id)
            }
            Err(e) => {
                warn!("Reload of plugin '{}' failed: {}", id, e);
                self.set_state(HotReloadState::Error(e.to_string()));
                ReloadOutcome::failure(id, &e)
            }
        }
    }

    async fn perform_reload(&self, id: &str, options: ReloadOptions) -> PluginResult<()> {
        let snapshot = if options.preserve_state {
            Some(self.create_snapshot(id).await?)
        } else {
            None
        };

        self.loader.reload_plugin(id, options.new_plugin, None).await?;

        if let Some(snapshot) = snapshot {
            self.apply_snapshot(&snapshot).await?;
            // The unload side cleared the stored copy; keep the applied
            // snapshot available until superseded or cleaned up
            self.snapshots.insert(id.to_string(), snapshot);
        }

        Ok(())
    }

    /// Reload every registered plugin and collect all per-plugin results
    pub async fn reload_all_plugins(&self, preserve_state: bool) -> Vec<ReloadOutcome> {
        let mut ids = {
            let reg = self.registry.inner().read().await;
            reg.list_plugins()
        };
        ids.sort();

        let mut outcomes = Vec::with_capacity(ids.len());
        for id in ids {
            let options = ReloadOptions {
                preserve_state,
                new_plugin: None,
            };
            outcomes.push(self.reload_plugin(&id, options).await);
        }
        outcomes
    }

    /// Capture the plugin's current configuration into the snapshot store,
    /// superseding any previous snapshot for the id
    pub async fn create_snapshot(&self, id: &str) -> PluginResult<StateSnapshot> {
        let reg = self.registry.inner().read().await;
        let plugin = reg
            .get_plugin(id)
            .ok_or_else(|| PluginError::plugin_not_found(id))?;
        let state = reg
            .plugin_state(id)
            .ok_or_else(|| PluginError::plugin_not_found(id))?;

        let snapshot = StateSnapshot {
            plugin_id: id.to_string(),
            state,
            config: plugin.config(),
            timestamp: SystemTime::now(),
        };

        self.snapshots.insert(id.to_string(), snapshot.clone());
        Ok(snapshot)
    }

    /// Re-apply the stored snapshot's configuration to the plugin's current
    /// instance. Returns false when no snapshot exists for the id.
    pub async fn restore_snapshot(&self, id: &str) -> PluginResult<bool> {
        let snapshot = match self.snapshots.get(id) {
            Some(entry) => entry.value().clone(),
            None => return Ok(false),
        };

        self.apply_snapshot(&snapshot).await?;
        Ok(true)
    }

    async fn apply_snapshot(&self, snapshot: &StateSnapshot) -> PluginResult<()> {
        let mut reg = self.registry.inner().write().await;
        match reg.get_plugin_mut(&snapshot.plugin_id) {
            Some(plugin) => plugin.restore_config(snapshot.config.clone()).await,
            None => Err(PluginError::plugin_not_found(&snapshot.plugin_id)),
        }
    }

    /// Inspect the stored snapshot for a plugin
    pub fn get_state_snapshot(&self, id: &str) -> Option<StateSnapshot> {
        self.snapshots.get(id).map(|entry| entry.value().clone())
    }

    /// Drop the plugin's snapshot; called on unload
    pub fn cleanup_plugin(&self, id: &str) {
        self.snapshots.remove(id);
    }

    /// Diagnostic key-value snapshot for logging and tests
    pub fn get_status(&self) -> HashMap<String, serde_json::Value> {
        let mut status = HashMap::new();
        status.insert(
            "state".to_string(),
            serde_json::json!(format!("{:?}", self.current_state())),
        );
        status.insert(
            "watched_path_count".to_string(),
            serde_json::json!(self.watched_paths.read().len()),
        );
        status.insert(
            "snapshot_count".to_string(),
            serde_json::json!(self.snapshots.len()),
        );
        status
    }
}
