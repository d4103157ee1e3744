//! Leaf geometry adapter for meshes, curves and points.

use bif_core::{Interpolation, PrimInfo, SdfPath, TimeCode, Value};

use super::base::{self, MATERIAL_BINDING, PRIMVARS_PREFIX, VISIBILITY, XFORM_OP_ORDER, XFORM_OP_PREFIX};
use super::PrimAdapter;
use crate::context::InstancerContext;
use crate::delegate::ImagingDelegate;
use crate::dirty::{DirtyBits, PropertyChange};
use crate::index::{IndexProxy, RprimKind};

const POINTS: &str = "points";
const EXTENT: &str = "extent";
const DOUBLE_SIDED: &str = "doubleSided";

/// Attributes that change the element layout; editing one needs a resync.
const TOPOLOGY_ATTRS: &[&str] = &["faceVertexCounts", "faceVertexIndices", "curveVertexCounts"];

#[derive(Debug, Default)]
pub struct GprimAdapter;

impl GprimAdapter {
    pub fn new() -> Self {
        Self
    }
}

impl PrimAdapter for GprimAdapter {
    fn populate(
        &self,
        delegate: &ImagingDelegate,
        prim: &PrimInfo,
        index: &mut dyn IndexProxy,
        ctx: Option<&InstancerContext>,
    ) -> Option<SdfPath> {
        let Some(kind) = RprimKind::from_type_name(&prim.type_name) else {
            log::warn!("No rprim kind for '{}' at {}", prim.type_name, prim.path);
            return None;
        };
        if !index.is_rprim_type_supported(kind) {
            log::debug!("Rprim kind {:?} unsupported, skipping {}", kind, prim.path);
            return None;
        }

        let cache_path = base::resolve_cache_path(&prim.path, ctx);
        if index.is_populated(&cache_path) {
            log::debug!("{} already populated", cache_path);
            return Some(cache_path);
        }
        let owner = ctx
            .and_then(|c| c.instancer_adapter.clone())
            .or_else(|| delegate.adapter_for(prim));
        index.insert_rprim(kind, &cache_path, &prim.path, owner);

        let scene = delegate.scene();
        let material = base::material_path(scene, &prim.path).or_else(|| ctx.and_then(|c| c.instancer_material_usd_path.clone()));
        let purpose = base::inheritable_purpose(scene, &prim.path).or_else(|| ctx.and_then(|c| c.instance_inheritable_purpose.clone()));
        let draw_mode = ctx
            .and_then(|c| c.instance_draw_mode.clone())
            .or_else(|| base::model_draw_mode(scene, prim));
        delegate.values().update(&cache_path, |v| {
            v.material_id = material;
            v.purpose = purpose;
            v.draw_mode = draw_mode;
        });

        Some(cache_path)
    }

    fn track_variability(&self, delegate: &ImagingDelegate, prim: &SdfPath, _cache_path: &SdfPath) -> DirtyBits {
        let mut bits = DirtyBits::empty();
        if base::is_transform_varying(delegate, prim) {
            bits |= DirtyBits::TRANSFORM;
        }
        if base::is_varying(delegate, prim, VISIBILITY, true) {
            bits |= DirtyBits::VISIBILITY;
        }
        if base::is_varying(delegate, prim, POINTS, false) {
            bits |= DirtyBits::POINTS;
        }
        if base::is_varying(delegate, prim, EXTENT, false) {
            bits |= DirtyBits::EXTENT;
        }
        if TOPOLOGY_ATTRS
            .iter()
            .any(|attr| base::is_varying(delegate, prim, attr, false))
        {
            bits |= DirtyBits::TOPOLOGY;
        }
        if delegate
            .scene()
            .primvars(prim)
            .iter()
            .any(|p| p.might_be_time_varying)
        {
            bits |= DirtyBits::PRIMVAR;
        }
        bits
    }

    fn update_for_time(
        &self,
        delegate: &ImagingDelegate,
        prim: &SdfPath,
        cache_path: &SdfPath,
        time: TimeCode,
        requested: DirtyBits,
    ) {
        let scene = delegate.scene();
        let values = delegate.values();

        if requested.contains(DirtyBits::TRANSFORM) {
            let transform = self.transform(delegate, prim, cache_path, time, false);
            values.update(cache_path, |v| v.transform = Some(transform));
        }
        if requested.contains(DirtyBits::VISIBILITY) {
            let visible = self.visible(delegate, prim, cache_path, time);
            values.update(cache_path, |v| v.visible = Some(visible));
        }
        if requested.contains(DirtyBits::POINTS) {
            if let Some(points) = scene.attribute(prim, POINTS, time) {
                values.update(cache_path, |v| {
                    v.values.insert(POINTS.to_string(), points);
                    base::merge_primvar(&mut v.primvars, POINTS, Interpolation::Vertex);
                });
            }
        }
        if requested.contains(DirtyBits::TOPOLOGY) {
            for attr in TOPOLOGY_ATTRS {
                let Some(value) = scene.attribute(prim, attr, time) else {
                    continue;
                };
                values.update(cache_path, |v| {
                    if attr.ends_with("VertexCounts") {
                        v.topology = Some(value.clone());
                    }
                    v.values.insert(attr.to_string(), value);
                });
            }
        }
        if requested.contains(DirtyBits::EXTENT) {
            if let Some(extent) = scene.attribute(prim, EXTENT, time) {
                values.update(cache_path, |v| {
                    v.values.insert(EXTENT.to_string(), extent);
                });
            }
        }
        if requested.contains(DirtyBits::PRIMVAR) {
            for primvar in scene.primvars(prim) {
                let attr = format!("{}{}", PRIMVARS_PREFIX, primvar.name);
                let Some(value) = scene.attribute(prim, &attr, time) else {
                    continue;
                };
                values.update(cache_path, |v| {
                    base::merge_primvar(&mut v.primvars, &primvar.name, primvar.interpolation);
                    v.values.insert(primvar.name.clone(), value);
                });
            }
        }
        if requested.contains(DirtyBits::DOUBLE_SIDED) {
            let double_sided = matches!(scene.attribute(prim, DOUBLE_SIDED, time), Some(Value::Bool(true)));
            values.update(cache_path, |v| {
                v.values.insert(DOUBLE_SIDED.to_string(), Value::Bool(double_sided));
            });
        }
        if requested.contains(DirtyBits::MATERIAL_ID) {
            if let Some(material) = base::material_path(scene, prim) {
                values.update(cache_path, |v| v.material_id = Some(material));
            }
        }
    }

    fn process_property_change(
        &self,
        _delegate: &ImagingDelegate,
        _prim: &SdfPath,
        _cache_path: &SdfPath,
        property: &str,
    ) -> PropertyChange {
        match property {
            POINTS => PropertyChange::Dirty(DirtyBits::POINTS),
            EXTENT => PropertyChange::Dirty(DirtyBits::EXTENT),
            VISIBILITY => PropertyChange::Dirty(DirtyBits::VISIBILITY),
            DOUBLE_SIDED => PropertyChange::Dirty(DirtyBits::DOUBLE_SIDED),
            MATERIAL_BINDING => PropertyChange::Dirty(DirtyBits::MATERIAL_ID),
            p if TOPOLOGY_ATTRS.contains(&p) => PropertyChange::Resync,
            p if p.starts_with(XFORM_OP_PREFIX) || p == XFORM_OP_ORDER => PropertyChange::Dirty(DirtyBits::TRANSFORM),
            p if p.starts_with(PRIMVARS_PREFIX) => PropertyChange::Dirty(DirtyBits::PRIMVAR),
            _ => PropertyChange::Clean,
        }
    }
}
