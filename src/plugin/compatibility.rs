//! Version Compatibility Checker
//!
//! Validates plugin API versions and semver dependency constraints.

use crate::plugin::error::{PluginError, PluginResult};
use crate::plugin::traits::PluginInfo;

/// Checker for plugin version compatibility
pub struct VersionCompatibilityChecker {
    /// Current API version (YYYYMMDD)
    api_version: i64,
}

impl VersionCompatibilityChecker {
    /// Create a new version compatibility checker
    pub fn new(api_version: i64) -> Self {
        Self { api_version }
    }

    /// Check if a plugin API version is compatible
    pub fn is_api_compatible(&self, plugin_api_version: i64) -> bool {
        // Same major version (year) is compatible
        self.get_major_version(self.api_version) == self.get_major_version(plugin_api_version)
    }

    /// Get major version (year) from API version
    pub fn get_major_version(&self, api_version: i64) -> i64 {
        api_version / 10000
    }

    /// Check plugin compatibility against the host API
    pub fn check_plugin_compatibility(&self, info: &PluginInfo) -> PluginResult<()> {
        if !self.is_api_compatible(info.api_version) {
            return Err(PluginError::version_incompatible(format!(
                "Plugin '{}' targets API version {} but current version is {}",
                info.id,
                info.api_version,
                self.api_version
            )));
        }
        Ok(())
    }

    /// Check if a version satisfies a requirement.
    ///
    /// Supports `*`, caret (`^`), tilde (`~`) and exact requirements. A
    /// constraint or version that does not parse as dotted numerals is
    /// treated as unmet.
    pub fn version_matches(&self, requirement: &str, version: &str) -> bool {
        if requirement == "*" {
            return true;
        }

        if let Some(req_version) = requirement.strip_prefix('^') {
            return self.matches_caret(req_version, version);
        }

        if let Some(req_version) = requirement.strip_prefix('~') {
            return self.matches_tilde(req_version, version);
        }

        // Exact match
        requirement == version
    }

    /// Check if version matches caret requirement (same major, >= requirement)
    fn matches_caret(&self, requirement: &str, version: &str) -> bool {
        let (req_parts, ver_parts) = match (parse_version(requirement), parse_version(version)) {
            (Some(req), Some(ver)) => (req, ver),
            _ => return false,
        };

        if req_parts[0] != ver_parts[0] {
            return false;
        }

        version_compare(&ver_parts, &req_parts) >= 0
    }

    /// Check if version matches tilde requirement (same major.minor, >= requirement)
    fn matches_tilde(&self, requirement: &str, version: &str) -> bool {
        let (req_parts, ver_parts) = match (parse_version(requirement), parse_version(version)) {
            (Some(req), Some(ver)) => (req, ver),
            _ => return false,
        };

        if req_parts.len() < 2 || ver_parts.len() < 2 {
            return false;
        }

        if req_parts[0] != ver_parts[0] || req_parts[1] != ver_parts[1] {
            return false;
        }

        version_compare(&ver_parts, &req_parts) >= 0
    }
}

impl Default for VersionCompatibilityChecker {
    fn default() -> Self {
        Self::new(crate::plugin::version::get_api_version())
    }
}

/// Parse a dotted numeric version. Any non-numeric part makes the whole
/// version unparseable, so incompatibility is assumed rather than guessed.
fn parse_version(version: &str) -> Option<Vec<u64>> {
    let parts: Vec<u64> = version
        .split('.')
        .map(|s| s.parse().ok())
        .collect::<Option<Vec<u64>>>()?;

    if parts.is_empty() {
        None
    } else {
        Some(parts)
    }
}

/// Compare two version arrays
fn version_compare(v1: &[u64], v2: &[u64]) -> i32 {
    for i in 0..std::cmp::max(v1.len(), v2.len()) {
        let part1 = v1.get(i).copied().unwrap_or(0);
        let part2 = v2.get(i).copied().unwrap_or(0);

        if part1 < part2 {
            return -1;
        } else if part1 > part2 {
            return 1;
        }
    }
    0
}
