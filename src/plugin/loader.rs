//! Plugin Loader
//!
//! Owns every lifecycle-method invocation and enforces the plugin state
//! machine. Consults the dependency manager for ordering and unload
//! validity, and the registry for current state.
//!
//! Concurrent loads for the same plugin id are coalesced through a
//! single-flight map of shared futures: only one load executes, and every
//! caller observes its single outcome.

use crate::config::RuntimeConfig;
use crate::plugin::context::PluginContext;
use crate::plugin::dependency::DependencyManager;
use crate::plugin::error::{PluginError, PluginResult};
use crate::plugin::registry::{PluginRegistry, SharedPluginRegistry};
use crate::plugin::traits::{Platform, Plugin, PluginState};
use futures::future::{BoxFuture, FutureExt, Shared};
use log::{debug, info, warn};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::timeout;

/// In-flight load operation, joinable by any number of callers
type LoadFuture = Shared<BoxFuture<'static, PluginResult<()>>>;

/// Callback invoked after a plugin is unregistered, letting the messenger,
/// event bus, and hot-reload manager clear their per-plugin bookkeeping
pub type CleanupHook = Arc<dyn Fn(&str) + Send + Sync>;

/// Loader for plugin lifecycle operations
pub struct PluginLoader {
    registry: SharedPluginRegistry,
    dependencies: Arc<DependencyManager>,
    config: RuntimeConfig,

    /// Single-flight map of in-flight loads keyed by plugin id
    pending: Arc<Mutex<HashMap<String, LoadFuture>>>,

    cleanup_hooks: Mutex<Vec<CleanupHook>>,
}

impl PluginLoader {
    /// Create a new loader over the given registry and dependency manager
    pub fn new(
        registry: SharedPluginRegistry,
        dependencies: Arc<DependencyManager>,
        config: RuntimeConfig,
    ) -> Self {
        Self {
            registry,
            dependencies,
            config,
            pending: Arc::new(Mutex::new(HashMap::new())),
            cleanup_hooks: Mutex::new(Vec::new()),
        }
    }

    /// Register a per-plugin cleanup callback run after unload
    pub fn add_cleanup_hook(&self, hook: CleanupHook) {
        self.cleanup_hooks.lock().push(hook);
    }

    fn run_cleanup_hooks(&self, id: &str) {
        for hook in self.cleanup_hooks.lock().iter() {
            hook(id);
        }
    }

    /// Load a plugin: register if absent, then `initialize()` and `start()`,
    /// each step bounded by `load_timeout` (the configured default when
    /// `None`).
    ///
    /// If a load for the same id is already in flight, the caller joins that
    /// operation instead of starting a second one; the plugin's lifecycle
    /// methods run exactly once. On failure the plugin is left in the error
    /// state; callers must explicitly reload to recover.
    pub async fn load_plugin(
        &self,
        plugin: Box<dyn Plugin>,
        load_timeout: Option<Duration>,
    ) -> PluginResult<()> {
        let id = plugin.info().id.clone();
        let step_timeout = load_timeout.unwrap_or(self.config.default_load_timeout);

        let (future, owner) = {
            let mut pending = self.pending.lock();
            if let Some(existing) = pending.get(&id) {
                debug!("Joining in-flight load for plugin '{}'", id);
                (existing.clone(), false)
            } else {
                let future = Self::drive_load(
                    self.registry.clone_inner(),
                    Arc::clone(&self.dependencies),
                    self.config.clone(),
                    plugin,
                    step_timeout,
                )
                .boxed()
                .shared();
                pending.insert(id.clone(), future.clone());
                (future, true)
            }
        };

        let result = future.await;
        // Only the executing side removes the entry, so a joiner finishing
        // late cannot evict a newer in-flight load for the same id
        if owner {
            self.pending.lock().remove(&id);
        }
        result
    }

    /// The single execution of a load; everything owned so the future can be
    /// shared across callers.
    async fn drive_load(
        registry: Arc<RwLock<PluginRegistry>>,
        dependencies: Arc<DependencyManager>,
        config: RuntimeConfig,
        plugin: Box<dyn Plugin>,
        step_timeout: Duration,
    ) -> PluginResult<()> {
        let plugin_info = plugin.info().clone();
        let id = plugin_info.id.clone();

        // Register if absent
        {
            let mut reg = registry.write().await;
            match reg.plugin_state(&id) {
                None => reg.register_plugin(plugin)?,
                Some(PluginState::Loaded) => {
                    // Already registered; the duplicate instance is dropped
                }
                Some(PluginState::Started) => return Ok(()),
                Some(state) => {
                    return Err(PluginError::invalid_state(format!(
                        "Cannot load plugin '{}' from state {}",
                        id, state
                    )));
                }
            }
        }

        if let Err(e) = Self::validate(&dependencies, &config, &plugin_info).await {
            Self::mark_error(&registry, &id, &e.to_string()).await;
            return Err(e);
        }

        dependencies.update_dependency_graph(&plugin_info);

        let context = PluginContext::new(&config);

        // initialize() -> Initialized
        {
            let mut reg = registry.write().await;
            let outcome = match reg.get_plugin_mut(&id) {
                Some(plugin) => timeout(step_timeout, plugin.initialize(&context)).await,
                None => return Err(PluginError::plugin_not_found(&id)),
            };
            match outcome {
                Ok(Ok(())) => reg.update_state(&id, PluginState::Initialized)?,
                Ok(Err(e)) => {
                    let _ = reg.update_state(&id, PluginState::Error(format!("initialize failed: {}", e)));
                    return Err(PluginError::loading_failed(format!(
                        "Plugin '{}' initialize failed: {}",
                        id, e
                    )));
                }
                Err(_) => {
                    let _ = reg.update_state(&id, PluginState::Error("initialize timed out".to_string()));
                    return Err(PluginError::timeout(format!(
                        "Plugin '{}' initialize timed out after {:?}",
                        id, step_timeout
                    )));
                }
            }
        }

        // start() -> Started
        {
            let mut reg = registry.write().await;
            let outcome = match reg.get_plugin_mut(&id) {
                Some(plugin) => timeout(step_timeout, plugin.start()).await,
                None => return Err(PluginError::plugin_not_found(&id)),
            };
            match outcome {
                Ok(Ok(())) => reg.update_state(&id, PluginState::Started)?,
                Ok(Err(e)) => {
                    let _ = reg.update_state(&id, PluginState::Error(format!("start failed: {}", e)));
                    return Err(PluginError::loading_failed(format!(
                        "Plugin '{}' start failed: {}",
                        id, e
                    )));
                }
                Err(_) => {
                    let _ = reg.update_state(&id, PluginState::Error("start timed out".to_string()));
                    return Err(PluginError::timeout(format!(
                        "Plugin '{}' start timed out after {:?}",
                        id, step_timeout
                    )));
                }
            }
        }

        info!("Loaded plugin '{}' v{}", id, plugin_info.version);
        Ok(())
    }

    /// Pre-flight checks between registration and initialization
    async fn validate(
        dependencies: &DependencyManager,
        config: &RuntimeConfig,
        info: &crate::plugin::traits::PluginInfo,
    ) -> PluginResult<()> {
        dependencies.checker().check_plugin_compatibility(info)?;

        let platform = Platform::current();
        if !info.supports_platform(platform) {
            return Err(PluginError::loading_failed(format!(
                "Plugin '{}' does not support platform {:?}",
                info.id, platform
            )));
        }

        if !config.granted_permissions.contains(info.required_permissions) {
            let missing = info.required_permissions - config.granted_permissions;
            return Err(PluginError::permission_denied(format!(
                "Plugin '{}' requires permissions not granted by the host: {:?}",
                info.id, missing
            )));
        }

        if !dependencies.check_dependencies(info).await {
            let missing = dependencies.get_missing_dependencies(info).await;
            let names: Vec<String> = missing
                .iter()
                .map(|d| format!("{} ({})", d.plugin_id, d.version_requirement))
                .collect();
            return Err(PluginError::dependency_error(format!(
                "Plugin '{}' has unmet dependencies: {}",
                info.id,
                names.join(", ")
            )));
        }

        Ok(())
    }

    async fn mark_error(registry: &Arc<RwLock<PluginRegistry>>, id: &str, reason: &str) {
        let mut reg = registry.write().await;
        let _ = reg.update_state(id, PluginState::Error(reason.to_string()));
    }

    /// Unload a plugin: `stop()` then `dispose()`, unregister, and clear all
    /// per-plugin bookkeeping.
    ///
    /// Unless `force` is set, fails while another started plugin declares a
    /// mandatory dependency on `id`. With `force`, lifecycle failures are
    /// logged and the unload proceeds.
    pub async fn unload_plugin(&self, id: &str, force: bool) -> PluginResult<()> {
        if !force && !self.dependencies.can_unload_plugin(id).await {
            return Err(PluginError::dependency_error(format!(
                "Plugin '{}' is required by started plugins; use force to unload anyway",
                id
            )));
        }

        let step_timeout = self.config.default_load_timeout;

        {
            let mut reg = self.registry.inner().write().await;
            if !reg.contains(id) {
                return Err(PluginError::plugin_not_found(id));
            }

            // stop()
            let outcome = match reg.get_plugin_mut(id) {
                Some(plugin) => timeout(step_timeout, plugin.stop()).await,
                None => return Err(PluginError::plugin_not_found(id)),
            };
            match outcome {
                Ok(Ok(())) => {
                    let _ = reg.update_state(id, PluginState::Stopped);
                }
                Ok(Err(e)) if force => warn!("stop() failed during forced unload of '{}': {}", id, e),
                Ok(Err(e)) => {
                    let _ = reg.update_state(id, PluginState::Error(format!("stop failed: {}", e)));
                    return Err(PluginError::unload_failed(format!(
                        "Plugin '{}' stop failed: {}",
                        id, e
                    )));
                }
                Err(_) if force => warn!("stop() timed out during forced unload of '{}'", id),
                Err(_) => {
                    let _ = reg.update_state(id, PluginState::Error("stop timed out".to_string()));
                    return Err(PluginError::timeout(format!(
                        "Plugin '{}' stop timed out after {:?}",
                        id, step_timeout
                    )));
                }
            }

            // dispose()
            let outcome = match reg.get_plugin_mut(id) {
                Some(plugin) => timeout(step_timeout, plugin.dispose()).await,
                None => return Err(PluginError::plugin_not_found(id)),
            };
            match outcome {
                Ok(Ok(())) => {}
                Ok(Err(e)) if force => warn!("dispose() failed during forced unload of '{}': {}", id, e),
                Ok(Err(e)) => {
                    let _ = reg.update_state(id, PluginState::Error(format!("dispose failed: {}", e)));
                    return Err(PluginError::unload_failed(format!(
                        "Plugin '{}' dispose failed: {}",
                        id, e
                    )));
                }
                Err(_) if force => warn!("dispose() timed out during forced unload of '{}'", id),
                Err(_) => {
                    let _ = reg.update_state(id, PluginState::Error("dispose timed out".to_string()));
                    return Err(PluginError::timeout(format!(
                        "Plugin '{}' dispose timed out after {:?}",
                        id, step_timeout
                    )));
                }
            }

            reg.unregister_plugin(id)?;
        }

        self.dependencies.cleanup_plugin(id);
        self.run_cleanup_hooks(id);

        info!("Unloaded plugin '{}'", id);
        Ok(())
    }

    /// Reload a plugin: stop and dispose the current instance, then run the
    /// load sequence again, optionally substituting `new_plugin` for the
    /// existing instance (used by hot reload).
    pub async fn reload_plugin(
        &self,
        id: &str,
        new_plugin: Option<Box<dyn Plugin>>,
        load_timeout: Option<Duration>,
    ) -> PluginResult<()> {
        let step_timeout = self.config.default_load_timeout;

        let old = {
            let mut reg = self.registry.inner().write().await;
            if !reg.contains(id) {
                return Err(PluginError::plugin_not_found(id));
            }

            // The instance is being replaced; lifecycle failures are logged
            // rather than aborting the reload
            if let Some(plugin) = reg.get_plugin_mut(id) {
                match timeout(step_timeout, plugin.stop()).await {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => warn!("stop() failed during reload of '{}': {}", id, e),
                    Err(_) => warn!("stop() timed out during reload of '{}'", id),
                }
            }
            if let Some(plugin) = reg.get_plugin_mut(id) {
                match timeout(step_timeout, plugin.dispose()).await {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => warn!("dispose() failed during reload of '{}': {}", id, e),
                    Err(_) => warn!("dispose() timed out during reload of '{}'", id),
                }
            }

            reg.unregister_plugin(id)?
        };

        self.dependencies.cleanup_plugin(id);
        self.run_cleanup_hooks(id);

        let next = new_plugin.unwrap_or(old);
        self.load_plugin(next, load_timeout).await
    }

    /// Pause a started plugin
    pub async fn pause_plugin(&self, id: &str) -> PluginResult<()> {
        let mut reg = self.registry.inner().write().await;

        match reg.plugin_state(id) {
            None => return Err(PluginError::plugin_not_found(id)),
            Some(PluginState::Started) => {}
            Some(state) => {
                return Err(PluginError::invalid_state(format!(
                    "Cannot pause plugin '{}' from state {}",
                    id, state
                )));
            }
        }

        let outcome = match reg.get_plugin_mut(id) {
            Some(plugin) => plugin.pause().await,
            None => return Err(PluginError::plugin_not_found(id)),
        };
        match outcome {
            Ok(()) => reg.update_state(id, PluginState::Paused),
            Err(e) => {
                let _ = reg.update_state(id, PluginState::Error(format!("pause failed: {}", e)));
                Err(e)
            }
        }
    }

    /// Resume a paused plugin
    pub async fn resume_plugin(&self, id: &str) -> PluginResult<()> {
        let mut reg = self.registry.inner().write().await;

        match reg.plugin_state(id) {
            None => return Err(PluginError::plugin_not_found(id)),
            Some(PluginState::Paused) => {}
            Some(state) => {
                return Err(PluginError::invalid_state(format!(
                    "Cannot resume plugin '{}' from state {}",
                    id, state
                )));
            }
        }

        let outcome = match reg.get_plugin_mut(id) {
            Some(plugin) => plugin.resume().await,
            None => return Err(PluginError::plugin_not_found(id)),
        };
        match outcome {
            Ok(()) => reg.update_state(id, PluginState::Started),
            Err(e) => {
                let _ = reg.update_state(id, PluginState::Error(format!("resume failed: {}", e)));
                Err(e)
            }
        }
    }

    /// Unload every registered plugin, dependents before their dependencies.
    /// With `force`, individual failures are logged and the teardown
    /// continues.
    pub async fn unload_all_plugins(&self, force: bool) -> PluginResult<()> {
        let infos = {
            let reg = self.registry.inner().read().await;
            reg.plugin_infos()
        };

        let resolution = self.dependencies.resolve_dependencies(&infos).await;
        let ids: Vec<String> = if resolution.success {
            let mut order = resolution.load_order;
            order.reverse();
            order
        } else {
            infos.into_iter().map(|info| info.id).collect()
        };

        for id in ids {
            match self.unload_plugin(&id, force).await {
                Ok(()) => {}
                Err(e) if force => warn!("Failed to unload plugin '{}': {}", id, e),
                Err(e) => return Err(e),
            }
        }

        Ok(())
    }

    /// Ids with a load currently in flight
    pub fn loading_plugins(&self) -> Vec<String> {
        self.pending.lock().keys().cloned().collect()
    }

    /// Whether a load for the given id is in flight
    pub fn is_loading(&self, id: &str) -> bool {
        self.pending.lock().contains_key(id)
    }

    /// Join an in-flight load for the given id, if any
    pub async fn wait_for_plugin(&self, id: &str) -> PluginResult<()> {
        let future = { self.pending.lock().get(id).cloned() };
        match future {
            Some(f) => f.await,
            None => Ok(()),
        }
    }

    /// Diagnostic key-value snapshot for logging and tests
    pub fn get_status(&self) -> HashMap<String, serde_json::Value> {
        let mut status = HashMap::new();
        status.insert(
            "loading".to_string(),
            serde_json::json!(self.loading_plugins()),
        );
        status.insert(
            "cleanup_hook_count".to_string(),
            serde_json::json!(self.cleanup_hooks.lock().len()),
        );
        status
    }
}
