//! Event Types
//!
//! The broadcast-only event value that flows through the bus. Events carry
//! no addressing; routing is entirely subscription-side.

use serde::{Deserialize, Serialize};
use std::time::SystemTime;

/// An immutable, broadcast-only event
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    /// Event type, e.g. "pet.mood_changed"
    pub event_type: String,

    /// Component or plugin that published the event
    pub source: String,

    /// Optional payload
    pub payload: Option<serde_json::Value>,

    /// Publication time
    pub timestamp: SystemTime,
}

impl Event {
    /// Construct an event stamped with the current time
    pub fn new(event_type: &str, source: &str, payload: Option<serde_json::Value>) -> Self {
        Self {
            event_type: event_type.to_string(),
            source: source.to_string(),
            payload,
            timestamp: SystemTime::now(),
        }
    }
}
