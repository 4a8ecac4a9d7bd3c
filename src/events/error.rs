//! Event Bus Error Types

use std::fmt;

/// Result type for event bus operations
pub type EventResult<T> = Result<T, EventError>;

/// Errors that can occur in the event bus
#[derive(Debug, Clone)]
pub enum EventError {
    /// A listener failed while handling an event
    HandlerFailed {
        subscription_id: u64,
        error: String,
    },

    /// A bounded wait expired without a matching event
    Timeout {
        event_type: String,
        duration_ms: u64,
    },

    /// The bus side of a wait was dropped before completion
    Closed(String),

    /// Generic error
    Generic(String),
}

impl fmt::Display for EventError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventError::HandlerFailed { subscription_id, error } => {
                write!(f, "Listener {} failed to handle event: {}", subscription_id, error)
            }
            EventError::Timeout { event_type, duration_ms } => {
                write!(f, "No '{}' event within {}ms", event_type, duration_ms)
            }
            EventError::Closed(detail) => {
                write!(f, "Event wait was closed: {}", detail)
            }
            EventError::Generic(msg) => {
                write!(f, "Event error: {}", msg)
            }
        }
    }
}

impl std::error::Error for EventError {}

impl EventError {
    /// Create a handler failed error
    pub fn handler_failed<S: Into<String>>(subscription_id: u64, error: S) -> Self {
        Self::HandlerFailed {
            subscription_id,
            error: error.into(),
        }
    }

    /// Create a timeout error
    pub fn timeout<S: Into<String>>(event_type: S, duration_ms: u64) -> Self {
        Self::Timeout {
            event_type: event_type.into(),
            duration_ms,
        }
    }

    /// Create a closed error
    pub fn closed<S: Into<String>>(detail: S) -> Self {
        Self::Closed(detail.into())
    }

    /// Create a generic error
    pub fn generic<S: Into<String>>(message: S) -> Self {
        Self::Generic(message.into())
    }
}
