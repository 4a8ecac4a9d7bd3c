//! Dependency Manager
//!
//! Pure graph computation over plugin declarations: load-order resolution
//! with cycle detection, version compatibility checks, and forward/reverse
//! graph queries. Reads the registry; never loads, unloads, or transitions
//! plugin state itself.

use crate::plugin::compatibility::VersionCompatibilityChecker;
use crate::plugin::error::{PluginError, PluginResult};
use crate::plugin::registry::SharedPluginRegistry;
use crate::plugin::traits::{Plugin, PluginDependency, PluginInfo, PluginState};
use log::{debug, warn};
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// Factory used by best-effort auto-install to materialize a locally
/// resolvable dependency
pub type PluginFactory = Arc<dyn Fn() -> Box<dyn Plugin> + Send + Sync>;

/// Outcome of a batch dependency resolution
#[derive(Debug, Clone)]
pub struct ResolutionResult {
    /// True iff no conflicts were found
    pub success: bool,

    /// Safe load order, dependencies before dependents; empty on failure —
    /// a partial order is never treated as valid
    pub load_order: Vec<String>,

    /// Everything found wrong, so batch resolution reports all conflicts at
    /// once
    pub conflicts: Vec<DependencyConflict>,
}

/// A single problem found during resolution
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DependencyConflict {
    /// A dependency cycle; the chain ends where it re-enters itself
    Cycle { chain: Vec<String> },

    /// A non-optional dependency that is neither in the batch nor registered
    Missing { plugin_id: String, dependency: String },

    /// A dependency present at an incompatible version
    Incompatible {
        plugin_id: String,
        dependency: String,
        required: String,
        found: String,
    },
}

impl std::fmt::Display for DependencyConflict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DependencyConflict::Cycle { chain } => {
                write!(f, "circular dependency: {}", chain.join(" -> "))
            }
            DependencyConflict::Missing { plugin_id, dependency } => {
                write!(f, "plugin '{}' requires '{}' which is not available", plugin_id, dependency)
            }
            DependencyConflict::Incompatible { plugin_id, dependency, required, found } => {
                write!(
                    f,
                    "plugin '{}' requires '{}' version {} but found {}",
                    plugin_id, dependency, required, found
                )
            }
        }
    }
}

impl DependencyConflict {
    /// Convert the conflict into the equivalent error value
    pub fn to_error(&self) -> PluginError {
        match self {
            DependencyConflict::Cycle { .. } => PluginError::circular_dependency(self.to_string()),
            _ => PluginError::dependency_error(self.to_string()),
        }
    }
}

/// DFS visit colors for topological sorting
#[derive(Clone, Copy, PartialEq)]
enum Mark {
    White,
    Grey,
    Black,
}

/// Dependency graph manager
pub struct DependencyManager {
    registry: SharedPluginRegistry,
    checker: VersionCompatibilityChecker,

    /// Declared dependencies by plugin id, in declaration order
    graph: RwLock<HashMap<String, Vec<PluginDependency>>>,

    /// Reverse index: id -> ids of plugins declaring it as a dependency
    dependents: RwLock<HashMap<String, HashSet<String>>>,

    /// Factories for locally resolvable dependencies
    providers: RwLock<HashMap<String, PluginFactory>>,
}

impl DependencyManager {
    /// Create a new dependency manager over the given registry
    pub fn new(registry: SharedPluginRegistry) -> Self {
        Self {
            registry,
            checker: VersionCompatibilityChecker::default(),
            graph: RwLock::new(HashMap::new()),
            dependents: RwLock::new(HashMap::new()),
            providers: RwLock::new(HashMap::new()),
        }
    }

    /// Access the version compatibility checker
    pub fn checker(&self) -> &VersionCompatibilityChecker {
        &self.checker
    }

    /// Resolve a batch of plugins into a safe load order.
    ///
    /// Builds edges plugin -> dependency and performs a depth-first
    /// topological sort. Ties between independent plugins are broken by
    /// declaration order (stable), so load order is reproducible across
    /// runs. All conflicts are collected rather than failing fast.
    pub async fn resolve_dependencies(&self, infos: &[PluginInfo]) -> ResolutionResult {
        let index: HashMap<&str, usize> = infos
            .iter()
            .enumerate()
            .map(|(i, info)| (info.id.as_str(), i))
            .collect();

        let registered_versions: HashMap<String, String> = {
            let reg = self.registry.inner().read().await;
            reg.plugin_infos()
                .into_iter()
                .map(|info| (info.id, info.version))
                .collect()
        };

        let mut conflicts = Vec::new();
        let mut edges: Vec<Vec<usize>> = vec![Vec::new(); infos.len()];

        for (i, info) in infos.iter().enumerate() {
            for dep in &info.dependencies {
                if let Some(&j) = index.get(dep.plugin_id.as_str()) {
                    if !self.checker.version_matches(&dep.version_requirement, &infos[j].version) {
                        conflicts.push(DependencyConflict::Incompatible {
                            plugin_id: info.id.clone(),
                            dependency: dep.plugin_id.clone(),
                            required: dep.version_requirement.clone(),
                            found: infos[j].version.clone(),
                        });
                    }
                    // The edge still participates in ordering and cycle
                    // detection even when the version conflicts
                    edges[i].push(j);
                } else if let Some(found) = registered_versions.get(&dep.plugin_id) {
                    if !dep.optional
                        && !self.checker.version_matches(&dep.version_requirement, found)
                    {
                        conflicts.push(DependencyConflict::Incompatible {
                            plugin_id: info.id.clone(),
                            dependency: dep.plugin_id.clone(),
                            required: dep.version_requirement.clone(),
                            found: found.clone(),
                        });
                    }
                } else if !dep.optional {
                    conflicts.push(DependencyConflict::Missing {
                        plugin_id: info.id.clone(),
                        dependency: dep.plugin_id.clone(),
                    });
                }
            }
        }

        let mut marks = vec![Mark::White; infos.len()];
        let mut path = Vec::new();
        let mut order = Vec::with_capacity(infos.len());

        for i in 0..infos.len() {
            if marks[i] == Mark::White {
                Self::visit(i, infos, &edges, &mut marks, &mut path, &mut order, &mut conflicts);
            }
        }

        let success = conflicts.is_empty();
        if !success {
            debug!("Dependency resolution failed with {} conflict(s)", conflicts.len());
        }

        ResolutionResult {
            success,
            load_order: if success { order } else { Vec::new() },
            conflicts,
        }
    }

    fn visit(
        i: usize,
        infos: &[PluginInfo],
        edges: &[Vec<usize>],
        marks: &mut [Mark],
        path: &mut Vec<usize>,
        order: &mut Vec<String>,
        conflicts: &mut Vec<DependencyConflict>,
    ) {
        marks[i] = Mark::Grey;
        path.push(i);

        for &j in &edges[i] {
            match marks[j] {
                Mark::White => {
                    Self::visit(j, infos, edges, marks, path, order, conflicts);
                }
                Mark::Grey => {
                    // Back-edge: the chain runs from j's position to here and
                    // closes on j
                    let pos = path.iter().position(|&p| p == j).unwrap_or(0);
                    let mut chain: Vec<String> =
                        path[pos..].iter().map(|&p| infos[p].id.clone()).collect();
                    chain.push(infos[j].id.clone());
                    conflicts.push(DependencyConflict::Cycle { chain });
                }
                Mark::Black => {}
            }
        }

        path.pop();
        marks[i] = Mark::Black;
        order.push(infos[i].id.clone());
    }

    /// True iff every non-optional dependency of the plugin is registered at
    /// a compatible version. Optional dependencies never block.
    pub async fn check_dependencies(&self, info: &PluginInfo) -> bool {
        let reg = self.registry.inner().read().await;

        for dep in &info.dependencies {
            if dep.optional {
                continue;
            }
            match reg.get_plugin(&dep.plugin_id) {
                Some(plugin)
                    if self
                        .checker
                        .version_matches(&dep.version_requirement, &plugin.info().version) => {}
                _ => return false,
            }
        }

        true
    }

    /// Non-optional dependencies that are unregistered or incompatible
    pub async fn get_missing_dependencies(&self, info: &PluginInfo) -> Vec<PluginDependency> {
        let reg = self.registry.inner().read().await;

        info.dependencies
            .iter()
            .filter(|dep| {
                if dep.optional {
                    return false;
                }
                match reg.get_plugin(&dep.plugin_id) {
                    Some(plugin) => !self
                        .checker
                        .version_matches(&dep.version_requirement, &plugin.info().version),
                    None => true,
                }
            })
            .cloned()
            .collect()
    }

    /// Whether the declared graph contains a cycle through the given id
    pub fn has_circular_dependency(&self, id: &str) -> bool {
        let graph = self.graph.read();
        let mut visited = HashSet::new();
        let mut stack: Vec<String> = graph
            .get(id)
            .map(|deps| deps.iter().map(|d| d.plugin_id.clone()).collect())
            .unwrap_or_default();

        while let Some(current) = stack.pop() {
            if current == id {
                return true;
            }
            if !visited.insert(current.clone()) {
                continue;
            }
            if let Some(deps) = graph.get(&current) {
                stack.extend(deps.iter().map(|d| d.plugin_id.clone()));
            }
        }

        false
    }

    /// Declared dependencies of a plugin; `recursive` walks transitively
    pub fn get_plugin_dependencies(&self, id: &str, recursive: bool) -> Vec<String> {
        let graph = self.graph.read();

        let direct: Vec<String> = graph
            .get(id)
            .map(|deps| deps.iter().map(|d| d.plugin_id.clone()).collect())
            .unwrap_or_default();

        if !recursive {
            return direct;
        }

        let mut seen: HashSet<String> = HashSet::new();
        let mut result = Vec::new();
        let mut stack = direct;

        while let Some(current) = stack.pop() {
            if current == id || !seen.insert(current.clone()) {
                continue;
            }
            if let Some(deps) = graph.get(&current) {
                stack.extend(deps.iter().map(|d| d.plugin_id.clone()));
            }
            result.push(current);
        }

        result
    }

    /// Plugins that declare the given id as a dependency
    pub fn get_plugin_dependents(&self, id: &str) -> Vec<String> {
        self.dependents
            .read()
            .get(id)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// False if any *other* started plugin lists `id` as a non-optional
    /// dependency
    pub async fn can_unload_plugin(&self, id: &str) -> bool {
        let blockers: Vec<String> = {
            let graph = self.graph.read();
            let dependents = self.dependents.read();
            dependents
                .get(id)
                .map(|set| {
                    set.iter()
                        .filter(|dependent| dependent.as_str() != id)
                        .filter(|dependent| {
                            graph
                                .get(*dependent)
                                .map(|deps| {
                                    deps.iter().any(|d| d.plugin_id == id && !d.optional)
                                })
                                .unwrap_or(false)
                        })
                        .cloned()
                        .collect()
                })
                .unwrap_or_default()
        };

        if blockers.is_empty() {
            return true;
        }

        let reg = self.registry.inner().read().await;
        !blockers
            .iter()
            .any(|dependent| reg.plugin_state(dependent) == Some(PluginState::Started))
    }

    /// Register a factory able to materialize a dependency locally
    pub fn register_provider<F>(&self, plugin_id: &str, factory: F)
    where
        F: Fn() -> Box<dyn Plugin> + Send + Sync + 'static,
    {
        self.providers
            .write()
            .insert(plugin_id.to_string(), Arc::new(factory));
    }

    /// Best-effort installation of missing dependencies from registered
    /// providers. Returns the ids that were newly registered. Installed
    /// plugins are left in the loaded state; starting them stays with the
    /// loader. A dependency whose provided version cannot be verified is
    /// never installed.
    pub async fn auto_install_dependencies(&self, info: &PluginInfo) -> PluginResult<Vec<String>> {
        let mut installed = Vec::new();

        for dep in &info.dependencies {
            let satisfied = {
                let reg = self.registry.inner().read().await;
                reg.get_plugin(&dep.plugin_id)
                    .map(|p| {
                        self.checker
                            .version_matches(&dep.version_requirement, &p.info().version)
                    })
                    .unwrap_or(false)
            };
            if satisfied {
                continue;
            }

            let factory = self.providers.read().get(&dep.plugin_id).cloned();
            let Some(factory) = factory else {
                if !dep.optional {
                    debug!(
                        "No provider for missing dependency '{}' of '{}'",
                        dep.plugin_id, info.id
                    );
                }
                continue;
            };

            let candidate = factory();
            let candidate_info = candidate.info().clone();

            if !self
                .checker
                .version_matches(&dep.version_requirement, &candidate_info.version)
            {
                warn!(
                    "Provider for '{}' offers version {} which does not satisfy {}; not installing",
                    dep.plugin_id, candidate_info.version, dep.version_requirement
                );
                continue;
            }

            {
                let mut reg = self.registry.inner().write().await;
                if reg.contains(&candidate_info.id) {
                    continue;
                }
                reg.register_plugin(candidate)?;
            }
            self.update_dependency_graph(&candidate_info);
            installed.push(candidate_info.id);
        }

        Ok(installed)
    }

    /// Incremental graph maintenance on register
    pub fn update_dependency_graph(&self, info: &PluginInfo) {
        let mut graph = self.graph.write();
        let mut dependents = self.dependents.write();

        if let Some(previous) = graph.insert(info.id.clone(), info.dependencies.clone()) {
            for dep in previous {
                if let Some(set) = dependents.get_mut(&dep.plugin_id) {
                    set.remove(&info.id);
                }
            }
        }

        for dep in &info.dependencies {
            dependents
                .entry(dep.plugin_id.clone())
                .or_default()
                .insert(info.id.clone());
        }
    }

    /// Incremental graph maintenance on unregister
    pub fn cleanup_plugin(&self, id: &str) {
        let mut graph = self.graph.write();
        let mut dependents = self.dependents.write();

        if let Some(deps) = graph.remove(id) {
            for dep in deps {
                if let Some(set) = dependents.get_mut(&dep.plugin_id) {
                    set.remove(id);
                }
            }
        }
    }

    /// Diagnostic key-value snapshot for logging and tests
    pub fn get_status(&self) -> HashMap<String, serde_json::Value> {
        let graph = self.graph.read();
        let edge_count: usize = graph.values().map(|deps| deps.len()).sum();

        let mut status = HashMap::new();
        status.insert("node_count".to_string(), serde_json::json!(graph.len()));
        status.insert("edge_count".to_string(), serde_json::json!(edge_count));
        status.insert(
            "provider_count".to_string(),
            serde_json::json!(self.providers.read().len()),
        );
        status
    }
}
