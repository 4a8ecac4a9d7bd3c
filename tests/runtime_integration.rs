//! End-to-end integration of the plugin runtime: registry, dependency
//! resolution, loading, messaging, events, and hot reload working together
//! the way the host application wires them at startup.

use async_trait::async_trait;
use atelier_core::config::RuntimeConfig;
use atelier_core::events::EventBus;
use atelier_core::plugin::context::PluginContext;
use atelier_core::plugin::dependency::DependencyManager;
use atelier_core::plugin::hot_reload::{HotReloadManager, ReloadOptions};
use atelier_core::plugin::loader::PluginLoader;
use atelier_core::plugin::messenger::PluginMessenger;
use atelier_core::plugin::registry::SharedPluginRegistry;
use atelier_core::plugin::{Plugin, PluginCategory, PluginInfo, PluginResult, PluginState};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio_stream::StreamExt;

/// Minimal companion-app plugin used by the integration scenario
struct CompanionPlugin {
    info: PluginInfo,
    config: Mutex<HashMap<String, Value>>,
}

impl CompanionPlugin {
    fn new(id: &str, version: &str) -> Self {
        Self {
            info: PluginInfo::new(id, version, PluginCategory::Widget),
            config: Mutex::new(HashMap::new()),
        }
    }

    fn with_dependency(mut self, plugin_id: &str, requirement: &str) -> Self {
        self.info = self.info.with_dependency(plugin_id, requirement, false);
        self
    }

    fn with_config_value(self, key: &str, value: Value) -> Self {
        self.config.lock().unwrap().insert(key.to_string(), value);
        self
    }
}

#[async_trait]
impl Plugin for CompanionPlugin {
    fn info(&self) -> &PluginInfo {
        &self.info
    }

    async fn initialize(&mut self, _context: &PluginContext) -> PluginResult<()> {
        Ok(())
    }

    async fn start(&mut self) -> PluginResult<()> {
        Ok(())
    }

    async fn stop(&mut self) -> PluginResult<()> {
        Ok(())
    }

    async fn dispose(&mut self) -> PluginResult<()> {
        self.config.lock().unwrap().clear();
        Ok(())
    }

    async fn handle_message(&self, action: &str, payload: Value) -> PluginResult<Value> {
        match action {
            "greet" => {
                let name = payload
                    .get("name")
                    .and_then(|v| v.as_str())
                    .unwrap_or("friend");
                Ok(json!({"message": format!("Hello, {}", name)}))
            }
            other => Ok(json!({"ack": other})),
        }
    }

    fn config(&self) -> HashMap<String, Value> {
        self.config.lock().unwrap().clone()
    }

    async fn restore_config(&mut self, config: HashMap<String, Value>) -> PluginResult<()> {
        *self.config.lock().unwrap() = config;
        Ok(())
    }
}

struct Runtime {
    registry: SharedPluginRegistry,
    dependencies: Arc<DependencyManager>,
    loader: Arc<PluginLoader>,
    messenger: Arc<PluginMessenger>,
    events: Arc<EventBus>,
    hot_reload: Arc<HotReloadManager>,
}

/// Wire the runtime the way the application bootstrap does: explicit
/// instances, registry first, cleanup hooks attached to the loader.
fn bootstrap() -> Runtime {
    atelier_core::logging::init_from_env();

    let config = RuntimeConfig::default();
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

    Runtime {
        registry,
        dependencies,
        loader,
        messenger,
        events,
        hot_reload,
    }
}

#[tokio::test]
async fn test_full_runtime_scenario() {
    let rt = bootstrap();

    // Resolve the startup set into a load order
    let infos = vec![
        CompanionPlugin::new("pet-dashboard", "1.0.0")
            .with_dependency("pixel-pet", "^1.0.0")
            .info()
            .clone(),
        CompanionPlugin::new("pixel-pet", "1.1.0").info().clone(),
    ];
    let resolution = rt.dependencies.resolve_dependencies(&infos).await;
    assert!(resolution.success);
    assert_eq!(resolution.load_order, vec!["pixel-pet", "pet-dashboard"]);

    // Load in resolved order
    rt.loader
        .load_plugin(
            Box::new(CompanionPlugin::new("pixel-pet", "1.1.0").with_config_value("mood", json!("sunny"))),
            None,
        )
        .await
        .unwrap();
    rt.loader
        .load_plugin(
            Box::new(CompanionPlugin::new("pet-dashboard", "1.0.0").with_dependency("pixel-pet", "^1.0.0")),
            None,
        )
        .await
        .unwrap();

    {
        let reg = rt.registry.inner().read().await;
        assert_eq!(reg.plugin_state("pixel-pet"), Some(PluginState::Started));
        assert_eq!(reg.plugin_state("pet-dashboard"), Some(PluginState::Started));
    }

    // Lateral messaging between started plugins
    let reply = rt
        .messenger
        .send_message("pet-dashboard", "pixel-pet", "greet", json!({"name": "Pip"}), Some(500))
        .await
        .unwrap();
    assert_eq!(reply, json!({"message": "Hello, Pip"}));

    // Event fan-out to a host subscriber
    let event = {
        let bus = Arc::clone(&rt.events);
        let waiter = tokio::spawn(async move { bus.wait_for("pet.mood_changed", None, None).await });
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        rt.events
            .publish("pet.mood_changed", "pixel-pet", Some(json!({"mood": "playful"})));
        waiter.await.unwrap().unwrap()
    };
    assert_eq!(event.source, "pixel-pet");

    // Pause/resume is observable on the registry's state stream
    let mut states = {
        let reg = rt.registry.inner().read().await;
        reg.state_stream("pixel-pet").unwrap()
    };
    rt.loader.pause_plugin("pixel-pet").await.unwrap();
    rt.loader.resume_plugin("pixel-pet").await.unwrap();
    assert_eq!(states.next().await.unwrap().unwrap(), PluginState::Paused);
    assert_eq!(states.next().await.unwrap().unwrap(), PluginState::Started);

    // The unload guard protects a started dependency, force overrides
    assert!(rt.loader.unload_plugin("pixel-pet", false).await.is_err());

    // Hot reload preserving the pet's mood
    let outcome = rt
        .hot_reload
        .reload_plugin("pixel-pet", ReloadOptions::preserve())
        .await;
    assert!(outcome.success, "error: {:?}", outcome.error);
    {
        let reg = rt.registry.inner().read().await;
        let config = reg.get_plugin("pixel-pet").unwrap().config();
        assert_eq!(config.get("mood").unwrap(), &json!("sunny"));
    }

    // Full teardown
    rt.loader.unload_all_plugins(false).await.unwrap();
    let reg = rt.registry.inner().read().await;
    assert_eq!(reg.plugin_count(), 0);
    assert_eq!(rt.messenger.pending_count(), 0);
}

#[tokio::test]
async fn test_status_surfaces() {
    let rt = bootstrap();

    rt.loader
        .load_plugin(Box::new(CompanionPlugin::new("pixel-pet", "1.1.0")), None)
        .await
        .unwrap();

    let reg = rt.registry.inner().read().await;
    assert_eq!(reg.get_status().get("plugin_count").unwrap(), &json!(1));
    drop(reg);

    assert!(rt.dependencies.get_status().contains_key("node_count"));
    assert!(rt.loader.get_status().contains_key("loading"));
    assert!(rt.messenger.get_status().contains_key("pending_count"));
    assert!(rt.events.get_status().contains_key("subscription_count"));
    assert!(rt.hot_reload.get_status().contains_key("state"));
}
