//! API Version Management
//!
//! Provides build-time API version reading from Cargo.toml metadata.
//! The version is defined in Cargo.toml under package.metadata.atelier.api_version
//! and ensures reproducible builds across all developers and environments.

// Include the build-generated API version constant
include!(concat!(env!("OUT_DIR"), "/version_api.rs"));

/// Get the current API version
///
/// This uses a build-generated constant that reads the API version from
/// Cargo.toml (package.metadata.atelier.api_version). Same source code always
/// produces the same API version.
///
/// Version format: YYYYMMDD (e.g., 20250801 = 1 August 2025)
pub fn get_api_version() -> i64 {
    BASE_API_VERSION
}

/// Check if a plugin's targeted API version is accepted by this host.
///
/// Plugins built against an older API remain loadable; plugins targeting a
/// newer API than the host are rejected.
pub fn is_api_compatible(required_version: i64) -> bool {
    get_api_version() >= required_version
}
