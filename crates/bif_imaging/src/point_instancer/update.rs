//! Per-time updates for instancers and their prototype prims.

use bif_core::{Interpolation, SdfPath, TimeCode, Value};
use bif_math::quat_to_real_first;

use super::record::InstancerRecord;
use super::{PointInstancerAdapter, ORIENTATIONS, POSITIONS, SCALES};
use crate::adapter::base::{self, PRIMVARS_PREFIX};
use crate::delegate::ImagingDelegate;
use crate::dirty::DirtyBits;

/// Instance primvar names as the render side expects them.
const TRANSLATE: &str = "translate";
const ROTATE: &str = "rotate";
const SCALE: &str = "scale";

impl PointInstancerAdapter {
    pub(super) fn update_child(&self, delegate: &ImagingDelegate, cache_path: &SdfPath, time: TimeCode, requested: DirtyBits) {
        let Some((record, proto)) = self.proto_for_child(cache_path) else {
            log::error!("No prototype record for {}", cache_path);
            return;
        };
        let Some(prim) = proto.attribute_prim(delegate.scene()) else {
            return;
        };
        let values = delegate.values();

        if requested.contains(DirtyBits::INSTANCE_INDEX) {
            let indices = self.proto_instance_indices(delegate, &record.cache_path, cache_path, time);
            values.update(cache_path, |v| v.instance_indices = Some(indices));
        }

        let delegated = requested - (DirtyBits::VISIBILITY | DirtyBits::INSTANCE_INDEX | DirtyBits::TRANSFORM);
        if !delegated.is_empty() {
            proto.adapter.update_for_time(delegate, &prim, cache_path, time, delegated);
        }

        if requested.contains(DirtyBits::TRANSFORM) {
            let transform = self.child_transform(delegate, &proto, cache_path, time, false);
            values.update(cache_path, |v| v.transform = Some(transform));
        }
        if requested.contains(DirtyBits::VISIBILITY) {
            let visible = self.child_visible(delegate, &record, &proto, time);
            values.update(cache_path, |v| v.visible = Some(visible));
        }
    }

    pub(super) fn update_instancer(
        &self,
        delegate: &ImagingDelegate,
        record: &InstancerRecord,
        time: TimeCode,
        requested: DirtyBits,
    ) {
        let cache_path = &record.cache_path;
        let prim = &record.usd_path;
        let scene = delegate.scene();
        let values = delegate.values();

        if requested.contains(DirtyBits::TRANSFORM) {
            let transform = self.instancer_transform_at(delegate, cache_path, time);
            values.update(cache_path, |v| v.instancer_transform = Some(transform));
        }
        if requested.contains(DirtyBits::VISIBILITY) {
            let visible = self.update_instancer_visibility(delegate, record, time);
            values.update(cache_path, |v| v.visible = Some(visible));
        }

        if requested.contains(DirtyBits::PRIMVAR) {
            if let Some(Value::Vec3Array(positions)) = scene.attribute(prim, POSITIONS, time) {
                values.update(cache_path, |v| {
                    v.values.insert(TRANSLATE.to_string(), Value::Vec3Array(positions));
                    base::merge_primvar(&mut v.primvars, TRANSLATE, Interpolation::Instance);
                });
            }
            if let Some(Value::QuatArray(orientations)) = scene.attribute(prim, ORIENTATIONS, time) {
                let rotate = orientations.into_iter().map(quat_to_real_first).collect();
                values.update(cache_path, |v| {
                    v.values.insert(ROTATE.to_string(), Value::Vec4Array(rotate));
                    base::merge_primvar(&mut v.primvars, ROTATE, Interpolation::Instance);
                });
            }
            if let Some(Value::Vec3Array(scales)) = scene.attribute(prim, SCALES, time) {
                values.update(cache_path, |v| {
                    v.values.insert(SCALE.to_string(), Value::Vec3Array(scales));
                    base::merge_primvar(&mut v.primvars, SCALE, Interpolation::Instance);
                });
            }

            // Per-prim primvars on the instancer do not vary per instance
            for primvar in scene.primvars(prim) {
                if primvar.interpolation.is_per_prim() {
                    continue;
                }
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

        if requested.contains(DirtyBits::INSTANCE_INDEX) {
            let map = self.instance_map(delegate, record, time);
            for (proto_cache_path, proto) in record.proto_prims() {
                let Some(slot) = record.prototype_slot(&proto.proto_root_path) else {
                    continue;
                };
                let indices = map.slot(slot).to_vec();
                values.update(&proto_cache_path, |v| v.instance_indices = Some(indices));
            }
        }
    }
}
