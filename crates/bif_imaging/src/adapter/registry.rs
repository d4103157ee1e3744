//! Adapter lookup by schema type name.

use std::collections::HashMap;
use std::sync::Arc;

use super::{AdapterHandle, GprimAdapter};
use crate::point_instancer::PointInstancerAdapter;

/// Builds one adapter instance.
pub type AdapterFactory = fn() -> AdapterHandle;

fn gprim_factory() -> AdapterHandle {
    Arc::new(GprimAdapter::new())
}

fn point_instancer_factory() -> AdapterHandle {
    Arc::new(PointInstancerAdapter::new())
}

/// Maps schema type names to adapters.
///
/// Each registration instantiates its factory once; all type names given
/// in that call share the instance.
#[derive(Debug, Default)]
pub struct AdapterRegistry {
    adapters: HashMap<String, AdapterHandle>,
}

impl AdapterRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Gprims and point instancers.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(&["Mesh", "BasisCurves", "Points"], gprim_factory);
        registry.register(&["PointInstancer"], point_instancer_factory);
        registry
    }

    pub fn register(&mut self, type_names: &[&str], factory: AdapterFactory) {
        let adapter = factory();
        for type_name in type_names {
            self.insert(type_name, adapter.clone());
        }
    }

    /// Register an already-built adapter.
    pub fn insert(&mut self, type_name: &str, adapter: AdapterHandle) {
        if self.adapters.insert(type_name.to_string(), adapter).is_some() {
            log::debug!("Replaced adapter for '{}'", type_name);
        }
    }

    pub fn get(&self, type_name: &str) -> Option<AdapterHandle> {
        self.adapters.get(type_name).cloned()
    }

    pub fn contains(&self, type_name: &str) -> bool {
        self.adapters.contains_key(type_name)
    }

    /// Registered type names, sorted.
    pub fn type_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.adapters.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let registry = AdapterRegistry::with_defaults();
        assert_eq!(
            registry.type_names(),
            vec!["BasisCurves", "Mesh", "PointInstancer", "Points"]
        );
        assert!(registry.get("PointInstancer").unwrap().is_instancer_adapter());
        assert!(!registry.get("Mesh").unwrap().is_instancer_adapter());
        assert!(registry.get("Xform").is_none());
    }

    #[test]
    fn test_factory_runs_once_per_registration() {
        let registry = AdapterRegistry::with_defaults();
        let mesh = registry.get("Mesh").unwrap();
        let points = registry.get("Points").unwrap();
        assert!(Arc::ptr_eq(&mesh, &points));
    }

    #[test]
    fn test_insert_replaces() {
        let mut registry = AdapterRegistry::new();
        registry.register(&["Mesh"], gprim_factory);
        let first = registry.get("Mesh").unwrap();
        registry.insert("Mesh", Arc::new(GprimAdapter::new()));

        assert!(!Arc::ptr_eq(&first, &registry.get("Mesh").unwrap()));
        assert!(registry.contains("Mesh"));
    }
}
