//! Per-prim values computed during sync.
//!
//! `update_for_time` writes here from many threads; the render side reads
//! it afterwards. Entries are keyed by cache path.

use std::collections::HashMap;

use bif_core::{Interpolation, SdfPath, Value};
use bif_math::Mat4;
use parking_lot::RwLock;

/// A primvar as the render side sees it.
#[derive(Clone, Debug, PartialEq)]
pub struct PrimvarDescriptor {
    pub name: String,
    pub interpolation: Interpolation,
}

impl PrimvarDescriptor {
    pub fn new(name: impl Into<String>, interpolation: Interpolation) -> Self {
        Self {
            name: name.into(),
            interpolation,
        }
    }
}

/// Everything cached for one cache path.
#[derive(Clone, Debug, Default)]
pub struct CachedValues {
    pub transform: Option<Mat4>,
    pub visible: Option<bool>,
    pub instance_indices: Option<Vec<i32>>,
    pub instancer_transform: Option<Mat4>,
    /// (time offset, transform) pairs across the shutter window
    pub instancer_transform_samples: Vec<(f32, Mat4)>,
    pub primvars: Vec<PrimvarDescriptor>,
    pub values: HashMap<String, Value>,
    pub topology: Option<Value>,
    pub material_id: Option<SdfPath>,
    pub purpose: Option<String>,
    pub draw_mode: Option<String>,
}

#[derive(Debug, Default)]
pub struct ValueCache {
    entries: RwLock<HashMap<SdfPath, CachedValues>>,
}

impl ValueCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Edit the entry for `cache_path`, creating it if needed.
    pub fn update(&self, cache_path: &SdfPath, f: impl FnOnce(&mut CachedValues)) {
        let mut entries = self.entries.write();
        f(entries.entry(cache_path.clone()).or_default());
    }

    pub fn get(&self, cache_path: &SdfPath) -> Option<CachedValues> {
        self.entries.read().get(cache_path).cloned()
    }

    pub fn transform(&self, cache_path: &SdfPath) -> Option<Mat4> {
        self.entries.read().get(cache_path).and_then(|v| v.transform)
    }

    pub fn visible(&self, cache_path: &SdfPath) -> Option<bool> {
        self.entries.read().get(cache_path).and_then(|v| v.visible)
    }

    pub fn instance_indices(&self, cache_path: &SdfPath) -> Option<Vec<i32>> {
        self.entries
            .read()
            .get(cache_path)
            .and_then(|v| v.instance_indices.clone())
    }

    pub fn instancer_transform(&self, cache_path: &SdfPath) -> Option<Mat4> {
        self.entries
            .read()
            .get(cache_path)
            .and_then(|v| v.instancer_transform)
    }

    pub fn instancer_transform_samples(&self, cache_path: &SdfPath) -> Vec<(f32, Mat4)> {
        self.entries
            .read()
            .get(cache_path)
            .map(|v| v.instancer_transform_samples.clone())
            .unwrap_or_default()
    }

    pub fn value(&self, cache_path: &SdfPath, name: &str) -> Option<Value> {
        self.entries
            .read()
            .get(cache_path)
            .and_then(|v| v.values.get(name).cloned())
    }

    pub fn primvars(&self, cache_path: &SdfPath) -> Vec<PrimvarDescriptor> {
        self.entries
            .read()
            .get(cache_path)
            .map(|v| v.primvars.clone())
            .unwrap_or_default()
    }

    pub fn remove(&self, cache_path: &SdfPath) {
        self.entries.write().remove(cache_path);
    }

    /// Drop every entry at or beneath `prefix`.
    pub fn remove_under(&self, prefix: &SdfPath) {
        self.entries.write().retain(|p, _| !p.has_prefix(prefix));
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}
