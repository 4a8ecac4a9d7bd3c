//! Plugin Runtime Tests
//!
//! Suites for the runtime components with mock plugin implementations.

pub mod mock_plugins;


#[cfg(test)]
pub mod dependency_tests;




use crate::config::RuntimeConfig;
use crate::events::EventBus;
use crate::plugin::dependency::DependencyManager;
use crate::plugin::hot_reload::HotReloadManager;
use crate::plugin::loader::PluginLoader;
use crate::plugin::messenger::PluginMessenger;
use crate::plugin::registry::SharedPluginRegistry;
use std::sync::Arc;

/// Fully wired runtime for tests, mirroring the host bootstrap: explicit
/// instances, registry first, cleanup hooks attached to the loader.
pub struct TestRuntime {
    pub registry: SharedPluginRegistry,
    pub dependencies: Arc<DependencyManager>,
    pub loader: Arc<PluginLoader>,
    pub messenger: Arc<PluginMessenger>,
    pub events: Arc<EventBus>,
    pub hot_reload: Arc<HotReloadManager>,
}

pub fn build_runtime() -> TestRuntime {
    build_runtime_with_config(RuntimeConfig::default())
}

pub fn build_runtime_with_config(config: RuntimeConfig) -> TestRuntime {
    let registry = SharedPluginRegistry::new();
    let dependencies = Arc::new(DependencyManager::new(registry.clone()));
    let loader = Arc::new(PluginLoader::new(
        registry.clone(),
        Arc::clone(&dependencies),
        config.clone(),
    ));
    let messenger = Arc::new(PluginMessenger::new(registry.clone(), config.clone()));
    let events = Arc::new(EventBus::new().with_default_wait(config.event_wait_timeout));
    let hot_reload = Arc::new(HotReloadManager::new(Arc::clone(&loader), registry.clone()));

    loader.add_cleanup_hook({
        let messenger = Arc::clone(&messenger);
        Arc::new(move |id: &str| messenger.cleanup_plugin(id))
    });
    loader.add_cleanup_hook({
        let events = Arc::clone(&events);
        Arc::new(move |id: &str| events.cleanup_plugin(id))
    });
    loader.add_cleanup_hook({
        let hot_reload = Arc::clone(&hot_reload);
        Arc::new(move |id: &str| hot_reload.cleanup_plugin(id))
    });

    TestRuntime {
        registry,
        dependencies,
        loader,
        messenger,
        events,
        hot_reload,
    }
}
