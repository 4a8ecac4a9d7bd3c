//! Mock Plugin Implementations for Testing
//!
//! Configurable mock plugins exercising every lifecycle path, plus shared
//! counters so tests can observe how often each lifecycle method ran.

use crate::plugin::context::PluginContext;
use crate::plugin::error::{PluginError, PluginResult};
use crate::plugin::traits::*;
use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use uuid::Uuid;

/// Lifecycle invocation counters, shareable across mock instances
#[derive(Default)]
pub struct LifecycleCounters {
    pub initialize: AtomicU32,
    pub start: AtomicU32,
    pub pause: AtomicU32,
    pub resume: AtomicU32,
    pub stop: AtomicU32,
    pub dispose: AtomicU32,
}

impl LifecycleCounters {
    pub fn initialized(&self) -> u32 {
        self.initialize.load(Ordering::SeqCst)
    }

    pub fn started(&self) -> u32 {
        self.start.load(Ordering::SeqCst)
    }
}

/// Mock plugin for testing the runtime components
pub struct MockPlugin {
    info: PluginInfo,
    instance_tag: String,
    config: Arc<Mutex<HashMap<String, Value>>>,
    counters: Arc<LifecycleCounters>,
    received: Arc<Mutex<Vec<String>>>,
    fail_initialize: bool,
    fail_start: bool,
    fail_start_after: Option<u32>,
    init_delay: Option<Duration>,
}

impl MockPlugin {
    /// Create a mock plugin with version 1.0.0 in the tool category
    pub fn new(id: &str) -> Self {
        Self {
            info: PluginInfo::new(id, "1.0.0", PluginCategory::Tool)
                .with_description("Mock plugin for testing")
                .with_author("Test Author"),
            instance_tag: Uuid::new_v4().to_string(),
            config: Arc::new(Mutex::new(HashMap::new())),
            counters: Arc::new(LifecycleCounters::default()),
            received: Arc::new(Mutex::new(Vec::new())),
            fail_initialize: false,
            fail_start: false,
            fail_start_after: None,
            init_delay: None,
        }
    }

    pub fn with_version(mut self, version: &str) -> Self {
        self.info.version = version.to_string();
        self
    }

    pub fn with_category(mut self, category: PluginCategory) -> Self {
        self.info.category = category;
        self
    }

    pub fn with_dependency(mut self, plugin_id: &str, requirement: &str, optional: bool) -> Self {
        self.info = self.info.with_dependency(plugin_id, requirement, optional);
        self
    }

    pub fn with_permissions(mut self, permissions: PluginPermissions) -> Self {
        self.info = self.info.with_permissions(permissions);
        self
    }

    pub fn with_api_version(mut self, api_version: i64) -> Self {
        self.info = self.info.with_api_version(api_version);
        self
    }

    pub fn fail_on_initialize(mut self) -> Self {
        self.fail_initialize = true;
        self
    }

    pub fn fail_on_start(mut self) -> Self {
        self.fail_start = true;
        self
    }

    /// Fail `start()` once it has already succeeded `after` times
    pub fn with_fail_start_after(mut self, after: u32) -> Self {
        self.fail_start_after = Some(after);
        self
    }

    pub fn with_init_delay(mut self, delay: Duration) -> Self {
        self.init_delay = Some(delay);
        self
    }

    pub fn with_config_value(self, key: &str, value: Value) -> Self {
        self.config.lock().unwrap().insert(key.to_string(), value);
        self
    }

    /// Share lifecycle counters with another instance of the same plugin
    pub fn with_counters(mut self, counters: Arc<LifecycleCounters>) -> Self {
        self.counters = counters;
        self
    }

    pub fn counters(&self) -> Arc<LifecycleCounters> {
        Arc::clone(&self.counters)
    }

    /// Actions delivered through `handle_message`, in order
    pub fn received_log(&self) -> Arc<Mutex<Vec<String>>> {
        Arc::clone(&self.received)
    }

    pub fn instance_tag(&self) -> &str {
        &self.instance_tag
    }
}

#[async_trait]
impl Plugin for MockPlugin {
    fn info(&self) -> &PluginInfo {
        &self.info
    }

    async fn initialize(&mut self, _context: &PluginContext) -> PluginResult<()> {
        self.counters.initialize.fetch_add(1, Ordering::SeqCst);

        if let Some(delay) = self.init_delay {
            tokio::time::sleep(delay).await;
        }

        if self.fail_initialize {
            return Err(PluginError::generic("mock initialize failure"));
        }
        Ok(())
    }

    async fn start(&mut self) -> PluginResult<()> {
        let previous = self.counters.start.fetch_add(1, Ordering::SeqCst);

        if self.fail_start {
            return Err(PluginError::generic("mock start failure"));
        }
        if let Some(after) = self.fail_start_after {
            if previous >= after {
                return Err(PluginError::generic("mock start failure after reload"));
            }
        }
        Ok(())
    }

    async fn pause(&mut self) -> PluginResult<()> {
        self.counters.pause.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn resume(&mut self) -> PluginResult<()> {
        self.counters.resume.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn stop(&mut self) -> PluginResult<()> {
        self.counters.stop.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn dispose(&mut self) -> PluginResult<()> {
        self.counters.dispose.fetch_add(1, Ordering::SeqCst);
        // Disposal releases runtime state; a reload without a snapshot
        // starts from defaults
        self.config.lock().unwrap().clear();
        Ok(())
    }

    async fn handle_message(&self, action: &str, payload: Value) -> PluginResult<Value> {
        self.received.lock().unwrap().push(action.to_string());

        match action {
            "greet" => {
                let name = payload
                    .get("name")
                    .and_then(|v| v.as_str())
                    .unwrap_or("friend");
                Ok(json!({"message": format!("Hello, {}", name)}))
            }
            "slow" => {
                tokio::time::sleep(Duration::from_millis(50)).await;
                Ok(json!({"done": true}))
            }
            "fail" => Err(PluginError::generic("mock handler failure")),
            other => Ok(json!({"ack": other})),
        }
    }

    fn config(&self) -> HashMap<String, Value> {
        let mut map = self.config.lock().unwrap().clone();
        map.insert("instance_tag".to_string(), json!(self.instance_tag));
        map
    }

    async fn restore_config(&mut self, config: HashMap<String, Value>) -> PluginResult<()> {
        let mut stored = self.config.lock().unwrap();
        *stored = config;
        stored.remove("instance_tag");
        Ok(())
    }
}
