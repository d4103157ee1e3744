//! Prim adapters.
//!
//! An adapter turns one kind of scene prim into render-index prims and keeps
//! them current. The delegate and the point instancer drive every adapter
//! through [`PrimAdapter`] without knowing the concrete prim type.
//!
//! Most methods have "not instanced" defaults. Only instancer-capable
//! adapters override the instancing queries.

pub mod base;
mod gprim;
mod registry;

pub use gprim::GprimAdapter;
pub use registry::{AdapterFactory, AdapterRegistry};

use std::fmt::Debug;
use std::sync::Arc;

use bif_core::{PrimInfo, SdfPath, TimeCode};
use bif_math::Mat4;

use crate::context::InstancerContext;
use crate::delegate::ImagingDelegate;
use crate::dirty::{DirtyBits, PropertyChange};
use crate::index::IndexProxy;
use crate::selection::{HighlightMode, Selection};

/// Shared handle to an adapter. Adapters are stateless or internally synchronized.
pub type AdapterHandle = Arc<dyn PrimAdapter>;

/// Answer to [`PrimAdapter::path_for_instance_index`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InstanceIndexLookup {
    /// Instancer that owns the instance at this level
    pub instancer_cache_path: SdfPath,
    /// Instances of the prototype at this level; 0 at the top of the recursion
    pub instance_count_for_level: usize,
    /// Index into the instancer's full instance list
    pub absolute_index: Option<i32>,
}

/// Per-prim-type strategy for population and change tracking.
///
/// Methods take the delegate so adapters can reach the scene, the value
/// cache and other adapters. `prim` is a scene path; `cache_path` is the
/// render-index path, which differs from `prim` for instanced prims.
pub trait PrimAdapter: Send + Sync + Debug {
    /// Insert render prims for `prim`. Returns the cache path on success.
    fn populate(
        &self,
        delegate: &ImagingDelegate,
        prim: &PrimInfo,
        index: &mut dyn IndexProxy,
        ctx: Option<&InstancerContext>,
    ) -> Option<SdfPath>;

    /// Which dirty bits can ever change over time for this prim.
    fn track_variability(&self, delegate: &ImagingDelegate, prim: &SdfPath, cache_path: &SdfPath) -> DirtyBits;

    /// Recompute the `requested` values at `time` into the value cache.
    fn update_for_time(
        &self,
        delegate: &ImagingDelegate,
        prim: &SdfPath,
        cache_path: &SdfPath,
        time: TimeCode,
        requested: DirtyBits,
    );

    /// Classify a change to one authored property.
    fn process_property_change(
        &self,
        delegate: &ImagingDelegate,
        prim: &SdfPath,
        cache_path: &SdfPath,
        property: &str,
    ) -> PropertyChange;

    /// Structure changed: drop the render prims and ask for repopulation.
    fn process_prim_resync(&self, delegate: &ImagingDelegate, cache_path: &SdfPath, index: &mut dyn IndexProxy) {
        self.process_prim_removal(delegate, cache_path, index);
        let prim_path = cache_path.prim_path();
        if delegate.scene().exists(&prim_path) {
            index.repopulate(&prim_path);
        }
    }

    /// The prim is gone for good.
    fn process_prim_removal(&self, delegate: &ImagingDelegate, cache_path: &SdfPath, index: &mut dyn IndexProxy) {
        index.remove_rprim(cache_path);
        delegate.values().remove(cache_path);
    }

    fn mark_dirty(
        &self,
        _delegate: &ImagingDelegate,
        _prim: &SdfPath,
        cache_path: &SdfPath,
        bits: DirtyBits,
        index: &mut dyn IndexProxy,
    ) {
        index.mark_rprim_dirty(cache_path, bits);
    }

    fn mark_transform_dirty(
        &self,
        delegate: &ImagingDelegate,
        prim: &SdfPath,
        cache_path: &SdfPath,
        index: &mut dyn IndexProxy,
    ) {
        self.mark_dirty(delegate, prim, cache_path, DirtyBits::TRANSFORM, index);
    }

    fn mark_visibility_dirty(
        &self,
        delegate: &ImagingDelegate,
        prim: &SdfPath,
        cache_path: &SdfPath,
        index: &mut dyn IndexProxy,
    ) {
        self.mark_dirty(delegate, prim, cache_path, DirtyBits::VISIBILITY, index);
    }

    /// Population of this prim also covers its descendants.
    fn should_cull_children(&self) -> bool {
        false
    }

    fn is_instancer_adapter(&self) -> bool {
        false
    }

    /// Native instance prims are normally expanded; adapters that can draw
    /// an instance prim directly opt in here.
    fn can_populate_usd_instance(&self) -> bool {
        false
    }

    /// Local-to-world transform, with the delegate root transform applied
    /// unless `ignore_root`.
    fn transform(
        &self,
        delegate: &ImagingDelegate,
        prim: &SdfPath,
        _cache_path: &SdfPath,
        time: TimeCode,
        ignore_root: bool,
    ) -> Mat4 {
        base::compute_transform(delegate, prim, time, ignore_root)
    }

    fn visible(&self, delegate: &ImagingDelegate, prim: &SdfPath, _cache_path: &SdfPath, time: TimeCode) -> bool {
        base::compute_visibility(delegate, prim, time)
    }

    /// Instances of `proto_cache_path` drawn by `instancer_cache_path`.
    fn instance_indices(
        &self,
        _delegate: &ImagingDelegate,
        _instancer_cache_path: &SdfPath,
        _proto_cache_path: &SdfPath,
        _time: TimeCode,
    ) -> Vec<i32> {
        Vec::new()
    }

    /// Transform of the instancer at `cache_path` relative to its parent
    /// instancer at `parent_cache_path`.
    fn relative_instancer_transform(
        &self,
        _delegate: &ImagingDelegate,
        _parent_cache_path: &SdfPath,
        _cache_path: &SdfPath,
        _time: TimeCode,
    ) -> Mat4 {
        Mat4::IDENTITY
    }

    fn instancer_transform(&self, _delegate: &ImagingDelegate, _cache_path: &SdfPath, _time: TimeCode) -> Mat4 {
        Mat4::IDENTITY
    }

    /// Up to `max_samples` `(time offset, transform)` pairs for motion blur.
    fn sample_instancer_transform(
        &self,
        _delegate: &ImagingDelegate,
        _cache_path: &SdfPath,
        _time: TimeCode,
        _max_samples: usize,
    ) -> Vec<(f32, Mat4)> {
        Vec::new()
    }

    /// The instancer drawing `cache_path`, if any.
    fn instancer_id(&self, _delegate: &ImagingDelegate, _cache_path: &SdfPath) -> Option<SdfPath> {
        None
    }

    /// Scene path of one drawn instance, for picking.
    ///
    /// When `instancer_context` is given, each instancer level pushes its
    /// `(instancer path, local instance index)` pair.
    fn scene_prim_path(
        &self,
        _delegate: &ImagingDelegate,
        cache_path: &SdfPath,
        _instance_index: i32,
        _instancer_context: Option<&mut Vec<(SdfPath, i32)>>,
    ) -> Option<SdfPath> {
        Some(cache_path.prim_path())
    }

    fn path_for_instance_index(
        &self,
        _delegate: &ImagingDelegate,
        _cache_path: &SdfPath,
        _instance_index: i32,
    ) -> Option<InstanceIndexLookup> {
        None
    }

    /// Add selection records for `usd_path` as seen from `cache_path`.
    /// Returns true if anything was added.
    #[allow(clippy::too_many_arguments)]
    fn populate_selection(
        &self,
        _delegate: &ImagingDelegate,
        mode: HighlightMode,
        cache_path: &SdfPath,
        usd_path: &SdfPath,
        instance_index: Option<i32>,
        parent_instance_indices: &[i32],
        result: &mut Selection,
    ) -> bool {
        if !cache_path.has_prefix(usd_path) {
            return false;
        }
        match instance_index {
            Some(i) => result.add_instance(mode, cache_path, vec![i]),
            None if parent_instance_indices.is_empty() => result.add_rprim(mode, cache_path),
            None => result.add_instance(mode, cache_path, parent_instance_indices.to_vec()),
        }
        true
    }
}
