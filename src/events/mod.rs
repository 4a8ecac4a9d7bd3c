//! Event Bus Module
//!
//! Decoupled publish/subscribe notification between plugins and host
//! components. Publishers emit typed events; subscribers attach callback
//! subscriptions or consume filtered pull streams. Delivery is independent
//! of the messenger's explicit addressing.

pub mod bus;
pub mod error;
pub mod types;


// Re-export core types for convenience
pub use bus::{EventBus, EventFilterFn, EventListener, SubscribeOptions, SubscriptionHandle};
pub use error::{EventError, EventResult};
pub use types::Event;
