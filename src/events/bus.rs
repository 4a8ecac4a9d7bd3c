//! Event Bus
//!
//! Decoupled fan-out notification, independent of message addressing.
//! Callback subscriptions are invoked synchronously in subscription order; a
//! failing listener is isolated at the publish site and never prevents
//! delivery to the remaining subscribers. Pull-based consumers use the
//! filtered broadcast streams instead.

use crate::events::error::{EventError, EventResult};
use crate::events::types::Event;
use log::{debug, warn};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, oneshot};
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::{Stream, StreamExt};

/// Capacity of the pull-stream broadcast channel. Lagging stream consumers
/// lose old events, not the stream itself.
const STREAM_CHANNEL_CAPACITY: usize = 256;

/// Callback invoked for each matching event
pub type EventListener = Arc<dyn Fn(&Event) -> EventResult<()> + Send + Sync>;

/// Predicate ANDed with the type/source constraints of a subscription
pub type EventFilterFn = Arc<dyn Fn(&Event) -> bool + Send + Sync>;

/// Constraints attached to a subscription
#[derive(Default, Clone)]
pub struct SubscribeOptions {
    /// Only events of this type
    pub event_type: Option<String>,

    /// Only events from this source
    pub source: Option<String>,

    /// Additional predicate, ANDed with the above
    pub filter: Option<EventFilterFn>,

    /// Owning plugin id, used by `cleanup_plugin`
    pub owner: Option<String>,
}

impl SubscribeOptions {
    /// Constrain to an event type
    pub fn for_type(mut self, event_type: &str) -> Self {
        self.event_type = Some(event_type.to_string());
        self
    }

    /// Constrain to a source
    pub fn for_source(mut self, source: &str) -> Self {
        self.source = Some(source.to_string());
        self
    }

    /// Attach a filter predicate
    pub fn with_filter<F>(mut self, filter: F) -> Self
    where
        F: Fn(&Event) -> bool + Send + Sync + 'static,
    {
        self.filter = Some(Arc::new(filter));
        self
    }

    /// Record the owning plugin
    pub fn owned_by(mut self, plugin_id: &str) -> Self {
        self.owner = Some(plugin_id.to_string());
        self
    }
}

struct SubscriptionEntry {
    id: u64,
    owner: Option<String>,
    event_type: Option<String>,
    source: Option<String>,
    filter: Option<EventFilterFn>,
    listener: EventListener,
}

impl SubscriptionEntry {
    fn matches(&self, event: &Event) -> bool {
        if let Some(event_type) = &self.event_type {
            if event.event_type != *event_type {
                return false;
            }
        }
        if let Some(source) = &self.source {
            if event.source != *source {
                return false;
            }
        }
        if let Some(filter) = &self.filter {
            if !filter(event) {
                return false;
            }
        }
        true
    }
}

/// Cancellable subscription handle. Cancellation is synchronous and
/// immediate: no callback fires after `cancel()` returns.
pub struct SubscriptionHandle {
    id: u64,
    subscriptions: Arc<RwLock<Vec<SubscriptionEntry>>>,
}

impl SubscriptionHandle {
    /// Subscription identifier
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Whether the subscription is still registered
    pub fn is_active(&self) -> bool {
        self.subscriptions.read().iter().any(|s| s.id == self.id)
    }

    /// Remove the subscription
    pub fn cancel(&self) {
        self.subscriptions.write().retain(|s| s.id != self.id);
    }
}

/// Filtered publish/subscribe event bus
pub struct EventBus {
    subscriptions: Arc<RwLock<Vec<SubscriptionEntry>>>,
    next_id: AtomicU64,
    stream_tx: broadcast::Sender<Event>,
    default_wait: Duration,

    /// Published-event counters keyed "{type}_{source}"
    event_stats: Mutex<HashMap<String, u64>>,

    /// Subscription counters keyed by event type ("*" for unconstrained)
    subscription_stats: Mutex<HashMap<String, u64>>,
}

impl EventBus {
    /// Create a new event bus
    pub fn new() -> Self {
        let (stream_tx, _) = broadcast::channel(STREAM_CHANNEL_CAPACITY);
        Self {
            subscriptions: Arc::new(RwLock::new(Vec::new())),
            next_id: AtomicU64::new(1),
            stream_tx,
            default_wait: Duration::from_secs(5),
            event_stats: Mutex::new(HashMap::new()),
            subscription_stats: Mutex::new(HashMap::new()),
        }
    }

    /// Override the default `wait_for` timeout
    pub fn with_default_wait(mut self, default_wait: Duration) -> Self {
        self.default_wait = default_wait;
        self
    }

    /// Publish an event to all matching subscriptions, in subscription
    /// order, and to the pull streams. Returns the number of callback
    /// subscriptions the event was delivered to.
    pub fn publish(&self, event_type: &str, source: &str, payload: Option<serde_json::Value>) -> usize {
        let event = Event::new(event_type, source, payload);

        // No stream consumers is fine
        let _ = self.stream_tx.send(event.clone());

        {
            let mut stats = self.event_stats.lock();
            *stats.entry(format!("{}_{}", event_type, source)).or_insert(0) += 1;
        }

        let matching: Vec<(u64, EventListener)> = {
            let subs = self.subscriptions.read();
            subs.iter()
                .filter(|s| s.matches(&event))
                .map(|s| (s.id, Arc::clone(&s.listener)))
                .collect()
        };

        let mut delivered = 0;
        for (id, listener) in matching {
            // Re-check liveness so a cancel() during this publish takes
            // effect immediately
            if !self.subscriptions.read().iter().any(|s| s.id == id) {
                continue;
            }
            delivered += 1;
            if let Err(e) = listener(&event) {
                warn!("{}", EventError::handler_failed(id, e.to_string()));
            }
        }

        debug!(
            "Published '{}' from '{}' to {} subscriber(s)",
            event_type, source, delivered
        );
        delivered
    }

    /// Register a callback subscription
    pub fn subscribe<F>(&self, options: SubscribeOptions, listener: F) -> SubscriptionHandle
    where
        F: Fn(&Event) -> EventResult<()> + Send + Sync + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);

        {
            let key = options.event_type.clone().unwrap_or_else(|| "*".to_string());
            *self.subscription_stats.lock().entry(key).or_insert(0) += 1;
        }

        self.subscriptions.write().push(SubscriptionEntry {
            id,
            owner: options.owner,
            event_type: options.event_type,
            source: options.source,
            filter: options.filter,
            listener: Arc::new(listener),
        });

        SubscriptionHandle {
            id,
            subscriptions: Arc::clone(&self.subscriptions),
        }
    }

    /// Subscribe to a single event type
    pub fn on<F>(&self, event_type: &str, listener: F) -> SubscriptionHandle
    where
        F: Fn(&Event) -> EventResult<()> + Send + Sync + 'static,
    {
        self.subscribe(SubscribeOptions::default().for_type(event_type), listener)
    }

    /// Subscribe to all events from a source
    pub fn from_source<F>(&self, source: &str, listener: F) -> SubscriptionHandle
    where
        F: Fn(&Event) -> EventResult<()> + Send + Sync + 'static,
    {
        self.subscribe(SubscribeOptions::default().for_source(source), listener)
    }

    /// Pull-based stream of every published event
    pub fn stream(&self) -> BroadcastStream<Event> {
        BroadcastStream::new(self.stream_tx.subscribe())
    }

    /// Pull-based stream of events of one type
    pub fn stream_of(&self, event_type: &str) -> impl Stream<Item = Event> + Send {
        let event_type = event_type.to_string();
        self.stream().filter_map(move |result| match result {
            Ok(event) if event.event_type == event_type => Some(event),
            _ => None,
        })
    }

    /// Pull-based stream of events from one source
    pub fn stream_from(&self, source: &str) -> impl Stream<Item = Event> + Send {
        let source = source.to_string();
        self.stream().filter_map(move |result| match result {
            Ok(event) if event.source == source => Some(event),
            _ => None,
        })
    }

    /// Resolve with the first matching event, or fail with a timeout error.
    /// Implemented as a one-shot subscription that is cancelled on first
    /// match.
    pub async fn wait_for(
        &self,
        event_type: &str,
        wait: Option<Duration>,
        filter: Option<EventFilterFn>,
    ) -> EventResult<Event> {
        let (tx, rx) = oneshot::channel();
        let slot = Arc::new(Mutex::new(Some(tx)));

        let options = SubscribeOptions {
            event_type: Some(event_type.to_string()),
            source: None,
            filter,
            owner: None,
        };

        let slot_clone = Arc::clone(&slot);
        let handle = self.subscribe(options, move |event| {
            if let Some(tx) = slot_clone.lock().take() {
                let _ = tx.send(event.clone());
            }
            Ok(())
        });

        let wait = wait.unwrap_or(self.default_wait);
        let result = tokio::time::timeout(wait, rx).await;
        handle.cancel();

        match result {
            Ok(Ok(event)) => Ok(event),
            Ok(Err(_)) => Err(EventError::closed("subscription dropped before a match")),
            Err(_) => Err(EventError::timeout(event_type, wait.as_millis() as u64)),
        }
    }

    /// Remove every subscription
    pub fn clear_subscriptions(&self) {
        self.subscriptions.write().clear();
    }

    /// Reset the event and subscription counters
    pub fn clear_stats(&self) {
        self.event_stats.lock().clear();
        self.subscription_stats.lock().clear();
    }

    /// Remove subscriptions owned by the plugin; called on unload
    pub fn cleanup_plugin(&self, plugin_id: &str) {
        self.subscriptions
            .write()
            .retain(|s| s.owner.as_deref() != Some(plugin_id));
    }

    /// Published-event counters keyed "{type}_{source}"
    pub fn event_stats(&self) -> HashMap<String, u64> {
        self.event_stats.lock().clone()
    }

    /// Subscription counters keyed by event type
    pub fn subscription_stats(&self) -> HashMap<String, u64> {
        self.subscription_stats.lock().clone()
    }

    /// Number of live subscriptions
    pub fn subscription_count(&self) -> usize {
        self.subscriptions.read().len()
    }

    /// Diagnostic key-value snapshot for logging and tests
    pub fn get_status(&self) -> HashMap<String, serde_json::Value> {
        let mut status = HashMap::new();
        status.insert(
            "subscription_count".to_string(),
            serde_json::json!(self.subscription_count()),
        );
        status.insert(
            "event_types_seen".to_string(),
            serde_json::json!(self.event_stats.lock().len()),
        );
        status
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
