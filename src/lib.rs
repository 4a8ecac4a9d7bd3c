//! Atelier plugin runtime core.
//!
//! Registers, loads, unloads and hot-reloads plugins, resolves their
//! dependency graph, and routes messages and events between them. The host
//! application constructs the components once at startup and passes them by
//! reference; see the `plugin` and `events` modules for the individual
//! contracts.

pub mod config;
pub mod events;
pub mod logging;
pub mod plugin;
