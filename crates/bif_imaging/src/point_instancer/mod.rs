//! Point instancer adapter.
//!
//! A point instancer draws each of its prototypes once per instance. During
//! population the adapter walks every prototype subtree, including native
//! instances found inside it, and gives each leaf prim a synthesized cache
//! path under the instancer (`/PI.proto0_Mesh_id0`). Those child rprims keep
//! their own adapters for geometry but report back here for transform,
//! visibility and instance indices. Instancers found inside a prototype
//! are populated as nested instancers with this instancer as their parent.
//!
//! All per-instancer state lives in an [`InstancerRegistry`] shared by
//! every delegate thread. Change processing consults its reverse indexes
//! to find every instancer a scene edit can reach.

mod indices;
mod populate;
mod record;
mod resync;
mod selection;
mod update;
mod variability;
mod xform;

pub use indices::{bucket_instances, compute_mask, InstanceMap, InvalidProtoIndex};
pub use record::{InstancerRecord, InstancerRegistry, ProtoPrimRecord};

use std::sync::Arc;

use bif_core::{PrimInfo, SdfPath, TimeCode};
use bif_math::Mat4;

use crate::adapter::base::{self, PRIMVARS_PREFIX, VISIBILITY, XFORM_OP_ORDER, XFORM_OP_PREFIX};
use crate::adapter::{InstanceIndexLookup, PrimAdapter};
use crate::context::InstancerContext;
use crate::delegate::ImagingDelegate;
use crate::dirty::{DirtyBits, PropertyChange};
use crate::index::IndexProxy;
use crate::selection::{HighlightMode, Selection};

const POINT_INSTANCER: &str = "PointInstancer";
pub(crate) const PROTOTYPES: &str = "prototypes";
pub(crate) const PROTO_INDICES: &str = "protoIndices";
pub(crate) const POSITIONS: &str = "positions";
pub(crate) const ORIENTATIONS: &str = "orientations";
pub(crate) const SCALES: &str = "scales";
pub(crate) const INVISIBLE_IDS: &str = "invisibleIds";
pub(crate) const IDS: &str = "ids";

#[derive(Debug, Default)]
pub struct PointInstancerAdapter {
    registry: InstancerRegistry,
}

impl PointInstancerAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn registry(&self) -> &InstancerRegistry {
        &self.registry
    }

    /// The instancer and proto prim record behind a child cache path.
    pub(super) fn proto_for_child(&self, cache_path: &SdfPath) -> Option<(Arc<InstancerRecord>, Arc<ProtoPrimRecord>)> {
        let record = self.registry.get(&cache_path.parent())?;
        let proto = record.proto_prim(cache_path)?;
        Some((record, proto))
    }

    fn instancer_property_change(&self, delegate: &ImagingDelegate, prim: &SdfPath, property: &str) -> PropertyChange {
        match property {
            POSITIONS | ORIENTATIONS | SCALES => PropertyChange::Dirty(DirtyBits::PRIMVAR),
            PROTO_INDICES | INVISIBLE_IDS | IDS => PropertyChange::Dirty(DirtyBits::INSTANCE_INDEX),
            VISIBILITY | XFORM_OP_ORDER | PROTOTYPES => PropertyChange::Resync,
            p if p.starts_with(XFORM_OP_PREFIX) => PropertyChange::Resync,
            p if p.starts_with(PRIMVARS_PREFIX) => {
                let name = &p[PRIMVARS_PREFIX.len()..];
                let per_prim = delegate
                    .scene()
                    .primvars(prim)
                    .iter()
                    .find(|primvar| primvar.name == name)
                    .is_some_and(|primvar| primvar.interpolation.is_per_prim());
                if per_prim {
                    PropertyChange::Clean
                } else {
                    PropertyChange::Dirty(DirtyBits::PRIMVAR)
                }
            }
            _ => PropertyChange::Clean,
        }
    }

    fn child_property_change(&self, delegate: &ImagingDelegate, cache_path: &SdfPath, property: &str) -> PropertyChange {
        let Some((_, proto)) = self.proto_for_child(cache_path) else {
            return PropertyChange::Resync;
        };
        let Some(prim) = proto.attribute_prim(delegate.scene()) else {
            return PropertyChange::Resync;
        };
        match proto.adapter.process_property_change(delegate, &prim, cache_path, property) {
            // Transform and visibility of prototype prims are owned by the
            // instancer and baked at population time
            PropertyChange::Dirty(bits) if bits.intersects(DirtyBits::TRANSFORM | DirtyBits::VISIBILITY) => {
                PropertyChange::Resync
            }
            change => change,
        }
    }
}

impl PrimAdapter for PointInstancerAdapter {
    fn populate(
        &self,
        delegate: &ImagingDelegate,
        prim: &PrimInfo,
        index: &mut dyn IndexProxy,
        ctx: Option<&InstancerContext>,
    ) -> Option<SdfPath> {
        match self.populate_instancer(delegate, prim, index, ctx) {
            Ok(cache_path) => Some(cache_path),
            Err(err) => {
                log::warn!("{}. Not adding it to the render index.", err);
                None
            }
        }
    }

    fn track_variability(&self, delegate: &ImagingDelegate, _prim: &SdfPath, cache_path: &SdfPath) -> DirtyBits {
        if base::is_child_path(cache_path) {
            return self.track_child_variability(delegate, cache_path);
        }
        match self.registry.get(cache_path) {
            Some(record) => self.track_instancer_variability(delegate, &record),
            None => {
                log::error!("No instancer record for {}", cache_path);
                DirtyBits::empty()
            }
        }
    }

    fn update_for_time(
        &self,
        delegate: &ImagingDelegate,
        _prim: &SdfPath,
        cache_path: &SdfPath,
        time: TimeCode,
        requested: DirtyBits,
    ) {
        if base::is_child_path(cache_path) {
            self.update_child(delegate, cache_path, time, requested);
            return;
        }
        match self.registry.get(cache_path) {
            Some(record) => self.update_instancer(delegate, &record, time, requested),
            None => log::error!("No instancer record for {}", cache_path),
        }
    }

    fn process_property_change(
        &self,
        delegate: &ImagingDelegate,
        prim: &SdfPath,
        cache_path: &SdfPath,
        property: &str,
    ) -> PropertyChange {
        if base::is_child_path(cache_path) {
            self.child_property_change(delegate, cache_path, property)
        } else {
            self.instancer_property_change(delegate, prim, property)
        }
    }

    fn process_prim_resync(&self, delegate: &ImagingDelegate, cache_path: &SdfPath, index: &mut dyn IndexProxy) {
        self.process_instancer_removal(delegate, cache_path, index, true);
    }

    fn process_prim_removal(&self, delegate: &ImagingDelegate, cache_path: &SdfPath, index: &mut dyn IndexProxy) {
        self.process_instancer_removal(delegate, cache_path, index, false);
    }

    fn mark_dirty(
        &self,
        delegate: &ImagingDelegate,
        prim: &SdfPath,
        cache_path: &SdfPath,
        bits: DirtyBits,
        index: &mut dyn IndexProxy,
    ) {
        if base::is_child_path(cache_path) {
            let Some((record, proto)) = self.proto_for_child(cache_path) else {
                index.mark_rprim_dirty(cache_path, bits);
                return;
            };
            if bits.contains(DirtyBits::INSTANCE_INDEX) {
                record.invalidate_instance_map();
            }
            proto.adapter.mark_dirty(delegate, prim, cache_path, bits, index);
            return;
        }
        if let Some(record) = self.registry.get(cache_path) {
            if bits.contains(DirtyBits::INSTANCE_INDEX) {
                record.invalidate_instance_map();
            }
            if bits.contains(DirtyBits::VISIBILITY) {
                record.invalidate_visibility();
            }
        }
        index.mark_instancer_dirty(cache_path, bits);
    }

    fn should_cull_children(&self) -> bool {
        true
    }

    fn is_instancer_adapter(&self) -> bool {
        true
    }

    fn transform(
        &self,
        delegate: &ImagingDelegate,
        prim: &SdfPath,
        cache_path: &SdfPath,
        time: TimeCode,
        ignore_root: bool,
    ) -> Mat4 {
        if base::is_child_path(cache_path) {
            if let Some((_, proto)) = self.proto_for_child(cache_path) {
                return self.child_transform(delegate, &proto, cache_path, time, ignore_root);
            }
        }
        base::compute_transform(delegate, prim, time, ignore_root)
    }

    fn visible(&self, delegate: &ImagingDelegate, prim: &SdfPath, cache_path: &SdfPath, time: TimeCode) -> bool {
        if base::is_child_path(cache_path) {
            if let Some((record, proto)) = self.proto_for_child(cache_path) {
                return self.child_visible(delegate, &record, &proto, time);
            }
        }
        base::compute_visibility(delegate, prim, time)
    }

    fn instance_indices(
        &self,
        delegate: &ImagingDelegate,
        instancer_cache_path: &SdfPath,
        proto_cache_path: &SdfPath,
        time: TimeCode,
    ) -> Vec<i32> {
        self.proto_instance_indices(delegate, instancer_cache_path, proto_cache_path, time)
    }

    fn relative_instancer_transform(
        &self,
        delegate: &ImagingDelegate,
        parent_cache_path: &SdfPath,
        cache_path: &SdfPath,
        time: TimeCode,
    ) -> Mat4 {
        self.relative_transform(delegate, parent_cache_path, cache_path, time)
    }

    fn instancer_transform(&self, delegate: &ImagingDelegate, cache_path: &SdfPath, time: TimeCode) -> Mat4 {
        self.instancer_transform_at(delegate, cache_path, time)
    }

    fn sample_instancer_transform(
        &self,
        delegate: &ImagingDelegate,
        cache_path: &SdfPath,
        time: TimeCode,
        max_samples: usize,
    ) -> Vec<(f32, Mat4)> {
        self.sample_transform(delegate, cache_path, time, max_samples)
    }

    fn instancer_id(&self, _delegate: &ImagingDelegate, cache_path: &SdfPath) -> Option<SdfPath> {
        if base::is_child_path(cache_path) {
            return Some(cache_path.parent());
        }
        self.registry
            .get(cache_path)
            .map(|record| record.parent_instancer_path.clone())
            .filter(|parent| !parent.is_empty())
    }

    fn scene_prim_path(
        &self,
        delegate: &ImagingDelegate,
        cache_path: &SdfPath,
        instance_index: i32,
        instancer_context: Option<&mut Vec<(SdfPath, i32)>>,
    ) -> Option<SdfPath> {
        self.picked_prim_path(delegate, cache_path, instance_index, instancer_context)
    }

    fn path_for_instance_index(
        &self,
        delegate: &ImagingDelegate,
        cache_path: &SdfPath,
        instance_index: i32,
    ) -> Option<InstanceIndexLookup> {
        self.lookup_instance_index(delegate, cache_path, instance_index)
    }

    fn populate_selection(
        &self,
        delegate: &ImagingDelegate,
        mode: HighlightMode,
        cache_path: &SdfPath,
        usd_path: &SdfPath,
        instance_index: Option<i32>,
        parent_instance_indices: &[i32],
        result: &mut Selection,
    ) -> bool {
        self.select(delegate, mode, cache_path, usd_path, instance_index, parent_instance_indices, result)
    }
}
