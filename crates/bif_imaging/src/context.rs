//! Instancer context threaded through population.

use bif_core::SdfPath;

use crate::adapter::AdapterHandle;

/// How a prototype prim is being instanced.
///
/// An instancer hands this to the adapters of prims inside its prototypes so
/// they populate under the instancer's cache path rather than their own.
#[derive(Clone, Debug, Default)]
pub struct InstancerContext {
    /// Cache path of the enclosing instancer
    pub instancer_cache_path: SdfPath,
    /// Synthesized child name; empty when the prim keeps its own path
    pub child_name: String,
    /// Material bound on the instance proxy, overriding the prototype's own
    pub instancer_material_usd_path: Option<SdfPath>,
    pub instance_draw_mode: Option<String>,
    pub instance_inheritable_purpose: Option<String>,
    /// Adapter that owns rprims created under this context
    pub instancer_adapter: Option<AdapterHandle>,
}

impl InstancerContext {
    pub fn new(instancer_cache_path: SdfPath) -> Self {
        Self {
            instancer_cache_path,
            ..Default::default()
        }
    }

    pub fn with_child_name(mut self, child_name: impl Into<String>) -> Self {
        self.child_name = child_name.into();
        self
    }

    pub fn with_adapter(mut self, adapter: Option<AdapterHandle>) -> Self {
        self.instancer_adapter = adapter;
        self
    }
}
