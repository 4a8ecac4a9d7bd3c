//! Plugin Messenger
//!
//! Addressed, typed message delivery between registered plugins with
//! request/response semantics, correlation ids, and timeouts.
//!
//! Messages from a given sender to a given target are delivered in send
//! order; nothing is guaranteed across different sender/target pairs.

use crate::config::RuntimeConfig;
use crate::plugin::error::{PluginError, PluginResult};
use crate::plugin::registry::{PluginRegistry, SharedPluginRegistry};
use crate::plugin::traits::PluginState;
use dashmap::DashMap;
use futures::future::BoxFuture;
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::sync::{oneshot, RwLock};
use tokio::time::timeout;
use uuid::Uuid;

/// Kinds of messages routed by the messenger
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageType {
    /// Expects a correlated response
    Request,

    /// Answers a request; carries the request id as correlation id
    Response,

    /// Fire-and-forget, addressed
    Notification,

    /// Fire-and-forget, fanned out to all started plugins
    Broadcast,
}

/// Message priority levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessagePriority {
    /// Background traffic
    Low = 1,
    /// Standard traffic
    Normal = 2,
    /// User-visible traffic
    High = 3,
    /// Host-critical traffic
    Critical = 4,
}

/// An immutable message between plugins
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// Unique message id
    pub id: String,

    /// Message kind
    pub message_type: MessageType,

    /// Action the target should perform
    pub action: String,

    /// Id of the sending plugin (or host component)
    pub sender_id: String,

    /// Id of the target plugin; absent for unaddressed kinds
    pub target_id: Option<String>,

    /// Message payload
    pub payload: Value,

    /// Delivery priority
    pub priority: MessagePriority,

    /// Construction time
    pub timestamp: SystemTime,

    /// Response deadline for requests
    pub timeout_ms: Option<u64>,

    /// For responses, the id of the request being answered
    pub correlation_id: Option<String>,
}

impl Message {
    fn new(
        message_type: MessageType,
        sender_id: &str,
        target_id: Option<&str>,
        action: &str,
        payload: Value,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            message_type,
            action: action.to_string(),
            sender_id: sender_id.to_string(),
            target_id: target_id.map(|t| t.to_string()),
            payload,
            priority: MessagePriority::Normal,
            timestamp: SystemTime::now(),
            timeout_ms: None,
            correlation_id: None,
        }
    }

    /// Build a request message
    pub fn request(
        sender_id: &str,
        target_id: &str,
        action: &str,
        payload: Value,
        timeout_ms: Option<u64>,
    ) -> Self {
        let mut message = Self::new(MessageType::Request, sender_id, Some(target_id), action, payload);
        message.timeout_ms = timeout_ms;
        message
    }

    /// Build the response to a request; always carries the request's id as
    /// its correlation id
    pub fn response(request: &Message, payload: Value) -> Self {
        let mut message = Self::new(
            MessageType::Response,
            request.target_id.as_deref().unwrap_or(""),
            Some(request.sender_id.as_str()),
            &request.action,
            payload,
        );
        message.correlation_id = Some(request.id.clone());
        message
    }

    /// Build an addressed fire-and-forget message
    pub fn notification(sender_id: &str, target_id: &str, action: &str, payload: Value) -> Self {
        Self::new(MessageType::Notification, sender_id, Some(target_id), action, payload)
    }

    /// Build a broadcast message for one recipient of the fan-out
    pub fn broadcast(sender_id: &str, target_id: &str, action: &str, payload: Value) -> Self {
        Self::new(MessageType::Broadcast, sender_id, Some(target_id), action, payload)
    }

    /// Override the priority
    pub fn with_priority(mut self, priority: MessagePriority) -> Self {
        self.priority = priority;
        self
    }
}

/// Typed message handler registered for a (plugin, action) pair
pub type MessageHandler = Arc<dyn Fn(Message) -> BoxFuture<'static, PluginResult<Value>> + Send + Sync>;

/// A response waiter for an in-flight request
struct PendingWaiter {
    sender_id: String,
    target_id: String,
    tx: oneshot::Sender<PluginResult<Value>>,
}

/// Message router between registered plugins
pub struct PluginMessenger {
    registry: SharedPluginRegistry,
    config: RuntimeConfig,

    /// Pending response waiters keyed by request message id
    pending: Arc<DashMap<String, PendingWaiter>>,

    /// Typed handlers: plugin id -> action -> handler
    handlers: Arc<DashMap<String, HashMap<String, MessageHandler>>>,
}

impl PluginMessenger {
    /// Create a new messenger over the given registry
    pub fn new(registry: SharedPluginRegistry, config: RuntimeConfig) -> Self {
        Self {
            registry,
            config,
            pending: Arc::new(DashMap::new()),
            handlers: Arc::new(DashMap::new()),
        }
    }

    /// Send a request and await the correlated response payload.
    ///
    /// Fails with a communication error if the target is not started, and
    /// with a timeout error if no response arrives within `timeout_ms` (the
    /// configured default when `None`). Exactly one response completes the
    /// waiter; late or duplicate responses for the same correlation id are
    /// discarded.
    pub async fn send_message(
        &self,
        sender_id: &str,
        target_id: &str,
        action: &str,
        data: Value,
        timeout_ms: Option<u64>,
    ) -> PluginResult<Value> {
        self.ensure_started(target_id).await?;

        let message = Message::request(sender_id, target_id, action, data, timeout_ms);
        let request_id = message.id.clone();

        let (tx, rx) = oneshot::channel();
        self.pending.insert(
            request_id.clone(),
            PendingWaiter {
                sender_id: sender_id.to_string(),
                target_id: target_id.to_string(),
                tx,
            },
        );

        debug!(
            "Request {} '{}' from '{}' to '{}'",
            request_id, action, sender_id, target_id
        );
        self.dispatch_request(message);

        let wait = timeout_ms
            .map(Duration::from_millis)
            .unwrap_or(self.config.default_message_timeout);

        match timeout(wait, rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(PluginError::communication(format!(
                "Request to '{}' was cancelled",
                target_id
            ))),
            Err(_) => {
                // Discard the waiter; a response racing in later finds no
                // entry and is dropped
                self.pending.remove(&request_id);
                Err(PluginError::timeout(format!(
                    "No response from '{}' for '{}' within {}ms",
                    target_id,
                    action,
                    wait.as_millis()
                )))
            }
        }
    }

    /// Run the target's handler in its own task and complete the waiter with
    /// the correlated response.
    fn dispatch_request(&self, message: Message) {
        let registry = self.registry.clone_inner();
        let handlers = Arc::clone(&self.handlers);
        let pending = Arc::clone(&self.pending);

        tokio::spawn(async move {
            let result = Self::invoke_target(&registry, &handlers, &message).await;
            let payload = match &result {
                Ok(value) => value.clone(),
                Err(_) => Value::Null,
            };
            let response = Message::response(&message, payload);
            Self::complete_waiter(&pending, &response, result);
        });
    }

    /// Complete the waiter matching the response's correlation id. Removing
    /// the entry first makes exactly one response win; anything later is
    /// discarded.
    fn complete_waiter(
        pending: &DashMap<String, PendingWaiter>,
        response: &Message,
        result: PluginResult<Value>,
    ) {
        let Some(correlation_id) = response.correlation_id.as_deref() else {
            return;
        };

        match pending.remove(correlation_id) {
            Some((_, waiter)) => {
                let _ = waiter.tx.send(result);
            }
            None => {
                debug!(
                    "Discarding late or duplicate response for request {}",
                    correlation_id
                );
            }
        }
    }

    /// Send an addressed fire-and-forget message. Addressing failures are
    /// returned; handler failures are logged and do not propagate.
    pub async fn send_notification(
        &self,
        sender_id: &str,
        target_id: &str,
        action: &str,
        data: Value,
    ) -> PluginResult<()> {
        self.ensure_started(target_id).await?;

        let message = Message::notification(sender_id, target_id, action, data);
        match Self::invoke_target(&self.registry.clone_inner(), &self.handlers, &message).await {
            Ok(_) => Ok(()),
            Err(e) => {
                warn!("Notification '{}' to '{}' failed: {}", action, target_id, e);
                Ok(())
            }
        }
    }

    /// Deliver a broadcast to every started plugin except the sender and
    /// `exclude`. Returns the number of successful deliveries.
    pub async fn broadcast_message(
        &self,
        sender_id: &str,
        action: &str,
        data: Value,
        exclude: &[String],
    ) -> usize {
        let targets = {
            let reg = self.registry.inner().read().await;
            reg.active_plugins()
        };

        let mut delivered = 0;
        for target_id in targets {
            if target_id == sender_id || exclude.contains(&target_id) {
                continue;
            }

            let message = Message::broadcast(sender_id, &target_id, action, data.clone());
            match Self::invoke_target(&self.registry.clone_inner(), &self.handlers, &message).await {
                Ok(_) => delivered += 1,
                Err(e) => warn!("Broadcast '{}' to '{}' failed: {}", action, target_id, e),
            }
        }

        delivered
    }

    /// Deliver a message to its target: the typed handler for the action if
    /// one is registered, else the plugin's generic `handle_message`. The
    /// target's started state is checked immediately before delivery.
    async fn invoke_target(
        registry: &Arc<RwLock<PluginRegistry>>,
        handlers: &DashMap<String, HashMap<String, MessageHandler>>,
        message: &Message,
    ) -> PluginResult<Value> {
        let Some(target_id) = message.target_id.as_deref() else {
            return Err(PluginError::communication("Message has no target"));
        };

        let handler = handlers
            .get(target_id)
            .and_then(|entry| entry.get(&message.action).cloned());

        let reg = registry.read().await;
        match reg.plugin_state(target_id) {
            Some(PluginState::Started) => {}
            Some(state) => {
                return Err(PluginError::communication(format!(
                    "Target '{}' is not started (state {})",
                    target_id, state
                )));
            }
            None => {
                return Err(PluginError::communication(format!(
                    "Target '{}' is not registered",
                    target_id
                )));
            }
        }

        if let Some(handler) = handler {
            drop(reg);
            handler(message.clone()).await
        } else {
            match reg.get_plugin(target_id) {
                Some(plugin) => plugin.handle_message(&message.action, message.payload.clone()).await,
                None => Err(PluginError::communication(format!(
                    "Target '{}' is not registered",
                    target_id
                ))),
            }
        }
    }

    async fn ensure_started(&self, target_id: &str) -> PluginResult<()> {
        let reg = self.registry.inner().read().await;
        match reg.plugin_state(target_id) {
            Some(PluginState::Started) => Ok(()),
            Some(state) => Err(PluginError::communication(format!(
                "Target '{}' is not started (state {})",
                target_id, state
            ))),
            None => Err(PluginError::communication(format!(
                "Target '{}' is not registered",
                target_id
            ))),
        }
    }

    /// Register a typed handler for an action, consulted before the plugin's
    /// generic `handle_message`
    pub fn register_handler<F>(&self, plugin_id: &str, action: &str, handler: F)
    where
        F: Fn(Message) -> BoxFuture<'static, PluginResult<Value>> + Send + Sync + 'static,
    {
        self.handlers
            .entry(plugin_id.to_string())
            .or_default()
            .insert(action.to_string(), Arc::new(handler));
    }

    /// Remove a typed handler; with no action, removes all of the plugin's
    /// handlers
    pub fn unregister_handler(&self, plugin_id: &str, action: Option<&str>) {
        match action {
            Some(action) => {
                if let Some(mut entry) = self.handlers.get_mut(plugin_id) {
                    entry.remove(action);
                }
            }
            None => {
                self.handlers.remove(plugin_id);
            }
        }
    }

    /// Cancel pending waiters involving the plugin and remove its handlers;
    /// called on unload
    pub fn cleanup_plugin(&self, plugin_id: &str) {
        let cancelled: Vec<String> = self
            .pending
            .iter()
            .filter(|entry| {
                entry.value().sender_id == plugin_id || entry.value().target_id == plugin_id
            })
            .map(|entry| entry.key().clone())
            .collect();

        for request_id in cancelled {
            if let Some((_, waiter)) = self.pending.remove(&request_id) {
                let _ = waiter.tx.send(Err(PluginError::communication(format!(
                    "Plugin '{}' was unloaded while a request was in flight",
                    plugin_id
                ))));
            }
        }

        self.handlers.remove(plugin_id);
    }

    /// Number of requests currently awaiting a response
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Diagnostic key-value snapshot for logging and tests
    pub fn get_status(&self) -> HashMap<String, serde_json::Value> {
        let handler_count: usize = self.handlers.iter().map(|entry| entry.value().len()).sum();

        let mut status = HashMap::new();
        status.insert("pending_count".to_string(), serde_json::json!(self.pending.len()));
        status.insert("handler_count".to_string(), serde_json::json!(handler_count));
        status
    }
}
