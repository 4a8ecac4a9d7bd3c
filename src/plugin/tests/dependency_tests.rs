//! Tests for Dependency Manager
//!
//! Resolution ordering, cycle detection, version constraints, unload
//! guards, and best-effort auto-install.

use super::mock_plugins::*;
use crate::plugin::dependency::{DependencyConflict, DependencyManager};
use crate::plugin::registry::SharedPluginRegistry;
use crate::plugin::traits::{PluginCategory, PluginInfo, PluginState};
use std::sync::Arc;

fn info(id: &str, version: &str) -> PluginInfo {
    PluginInfo::new(id, version, PluginCategory::Tool)
}

fn manager() -> (SharedPluginRegistry, Arc<DependencyManager>) {
    let registry = SharedPluginRegistry::new();
    let manager = Arc::new(DependencyManager::new(registry.clone()));
    (registry, manager)
}

#[tokio::test]
async fn test_topological_order() {
    let (_registry, manager) = manager();

    // Declared dependents-first on purpose; resolution must still place
    // every dependency before its dependent
    let infos = vec![
        info("paint-mixer", "1.0.0").with_dependency("color-palette", "^1.0.0", false),
        info("color-palette", "1.2.0").with_dependency("pigment-store", "*", false),
        info("pigment-store", "0.9.0"),
    ];

    let result = manager.resolve_dependencies(&infos).await;
    assert!(result.success, "conflicts: {:?}", result.conflicts);

    let order = result.load_order;
    let position = |id: &str| order.iter().position(|x| x == id).unwrap();
    assert!(position("pigment-store") < position("color-palette"));
    assert!(position("color-palette") < position("paint-mixer"));
}

#[tokio::test]
async fn test_declaration_order_tie_break() {
    let (_registry, manager) = manager();

    // No edges at all: the order must be exactly the declaration order
    let infos = vec![
        info("gamma", "1.0.0"),
        info("alpha", "1.0.0"),
        info("beta", "1.0.0"),
    ];

    let result = manager.resolve_dependencies(&infos).await;
    assert!(result.success);
    assert_eq!(result.load_order, vec!["gamma", "alpha", "beta"]);
}

#[tokio::test]
async fn test_cycle_detection() {
    let (_registry, manager) = manager();

    let infos = vec![
        info("a", "1.0.0").with_dependency("b", "*", false),
        info("b", "1.0.0").with_dependency("c", "*", false),
        info("c", "1.0.0").with_dependency("a", "*", false),
    ];

    let result = manager.resolve_dependencies(&infos).await;
    assert!(!result.success);
    // No partial load order is treated as valid
    assert!(result.load_order.is_empty());

    let cycle = result
        .conflicts
        .iter()
        .find_map(|c| match c {
            DependencyConflict::Cycle { chain } => Some(chain.clone()),
            _ => None,
        })
        .expect("cycle conflict reported");
    assert!(cycle.contains(&"a".to_string()));
    assert!(cycle.contains(&"b".to_string()));
    assert!(cycle.contains(&"c".to_string()));
}

#[tokio::test]
async fn test_missing_and_optional_dependencies() {
    let (_registry, manager) = manager();

    let required = vec![info("paint-mixer", "1.0.0").with_dependency("color-palette", "*", false)];
    let result = manager.resolve_dependencies(&required).await;
    assert!(!result.success);
    assert!(matches!(result.conflicts[0], DependencyConflict::Missing { .. }));

    // The same dependency marked optional never blocks
    let optional = vec![info("paint-mixer", "1.0.0").with_dependency("color-palette", "*", true)];
    let result = manager.resolve_dependencies(&optional).await;
    assert!(result.success);
}

#[tokio::test]
async fn test_version_conflict_in_batch() {
    let (_registry, manager) = manager();

    let infos = vec![
        info("paint-mixer", "1.0.0").with_dependency("color-palette", "^1.0.0", false),
        info("color-palette", "2.0.0"),
    ];

    let result = manager.resolve_dependencies(&infos).await;
    assert!(!result.success);
    assert!(matches!(result.conflicts[0], DependencyConflict::Incompatible { .. }));
}

#[tokio::test]
async fn test_registered_dependency_outside_batch() {
    let (registry, manager) = manager();

    {
        let mut reg = registry.inner().write().await;
        reg.register_plugin(Box::new(MockPlugin::new("color-palette").with_version("1.5.0")))
            .unwrap();
    }

    let compatible = vec![info("paint-mixer", "1.0.0").with_dependency("color-palette", "^1.0.0", false)];
    assert!(manager.resolve_dependencies(&compatible).await.success);

    let incompatible = vec![info("paint-mixer", "1.0.0").with_dependency("color-palette", "^2.0.0", false)];
    let result = manager.resolve_dependencies(&incompatible).await;
    assert!(!result.success);
}

#[tokio::test]
async fn test_check_and_missing_dependencies() {
    let (registry, manager) = manager();

    let plugin = info("paint-mixer", "1.0.0")
        .with_dependency("color-palette", "^1.0.0", false)
        .with_dependency("brush-pack", "*", true);

    assert!(!manager.check_dependencies(&plugin).await);
    let missing = manager.get_missing_dependencies(&plugin).await;
    assert_eq!(missing.len(), 1);
    assert_eq!(missing[0].plugin_id, "color-palette");

    {
        let mut reg = registry.inner().write().await;
        reg.register_plugin(Box::new(MockPlugin::new("color-palette").with_version("1.1.0")))
            .unwrap();
    }

    assert!(manager.check_dependencies(&plugin).await);
    assert!(manager.get_missing_dependencies(&plugin).await.is_empty());
}

#[tokio::test]
async fn test_graph_queries() {
    let (_registry, manager) = manager();

    manager.update_dependency_graph(&info("a", "1.0.0").with_dependency("b", "*", false));
    manager.update_dependency_graph(&info("b", "1.0.0").with_dependency("c", "*", false));
    manager.update_dependency_graph(&info("c", "1.0.0"));

    assert_eq!(manager.get_plugin_dependencies("a", false), vec!["b"]);
    let mut transitive = manager.get_plugin_dependencies("a", true);
    transitive.sort();
    assert_eq!(transitive, vec!["b", "c"]);

    assert_eq!(manager.get_plugin_dependents("c"), vec!["b"]);
    assert!(!manager.has_circular_dependency("a"));

    manager.update_dependency_graph(&info("c", "1.0.0").with_dependency("a", "*", false));
    assert!(manager.has_circular_dependency("a"));

    manager.cleanup_plugin("c");
    assert!(!manager.has_circular_dependency("a"));
    // b still declares c; only c's own edges were removed
    assert_eq!(manager.get_plugin_dependents("c"), vec!["b"]);
}

#[tokio::test]
async fn test_can_unload_guard() {
    let (registry, manager) = manager();

    {
        let mut reg = registry.inner().write().await;
        reg.register_plugin(Box::new(MockPlugin::new("color-palette"))).unwrap();
        reg.register_plugin(Box::new(
            MockPlugin::new("paint-mixer").with_dependency("color-palette", "*", false),
        ))
        .unwrap();
    }
    manager.update_dependency_graph(&info("color-palette", "1.0.0"));
    manager.update_dependency_graph(
        &info("paint-mixer", "1.0.0").with_dependency("color-palette", "*", false),
    );

    // Dependent not started: unloading is allowed
    assert!(manager.can_unload_plugin("color-palette").await);

    {
        let mut reg = registry.inner().write().await;
        reg.update_state("paint-mixer", PluginState::Started).unwrap();
    }
    assert!(!manager.can_unload_plugin("color-palette").await);

    // An optional dependent never blocks
    {
        let mut reg = registry.inner().write().await;
        reg.update_state("paint-mixer", PluginState::Stopped).unwrap();
        reg.register_plugin(Box::new(
            MockPlugin::new("moodboard").with_dependency("color-palette", "*", true),
        ))
        .unwrap();
        reg.update_state("moodboard", PluginState::Started).unwrap();
    }
    manager.update_dependency_graph(
        &info("moodboard", "1.0.0").with_dependency("color-palette", "*", true),
    );
    assert!(manager.can_unload_plugin("color-palette").await);
}

#[tokio::test]
async fn test_auto_install_from_provider() {
    let (registry, manager) = manager();

    manager.register_provider("color-palette", || {
        Box::new(MockPlugin::new("color-palette").with_version("1.2.0"))
    });

    let plugin = info("paint-mixer", "1.0.0").with_dependency("color-palette", "^1.0.0", false);
    let installed = manager.auto_install_dependencies(&plugin).await.unwrap();
    assert_eq!(installed, vec!["color-palette"]);

    let reg = registry.inner().read().await;
    assert!(reg.contains("color-palette"));
    // Auto-install registers but never starts; loading stays with the loader
    assert_eq!(reg.plugin_state("color-palette"), Some(PluginState::Loaded));
}

#[tokio::test]
async fn test_auto_install_refuses_unverifiable_version() {
    let (registry, manager) = manager();

    manager.register_provider("color-palette", || {
        Box::new(MockPlugin::new("color-palette").with_version("2.0.0"))
    });

    let plugin = info("paint-mixer", "1.0.0").with_dependency("color-palette", "^1.0.0", false);
    let installed = manager.auto_install_dependencies(&plugin).await.unwrap();
    assert!(installed.is_empty());

    let reg = registry.inner().read().await;
    assert!(!reg.contains("color-palette"));
}
