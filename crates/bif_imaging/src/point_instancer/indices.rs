//! Instance-index buckets.
//!
//! `protoIndices` assigns each instance ordinal to a prototype slot. The
//! buckets group ordinals by slot after dropping instances hidden through
//! `invisibleIds`. They are derived per time code and never persisted.

use std::collections::HashSet;
use std::sync::Arc;

use bif_core::{SceneAccessor, SdfPath, TimeCode, Value};

use super::record::InstancerRecord;
use super::{PointInstancerAdapter, IDS, INVISIBLE_IDS, PROTO_INDICES};
use crate::delegate::ImagingDelegate;

/// An instance whose proto index names no prototype.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct InvalidProtoIndex {
    pub instance: usize,
    pub proto_index: i32,
}

/// Instance ordinals grouped by prototype slot.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct InstanceMap {
    pub buckets: Vec<Vec<i32>>,
    /// Skipped instances, in ordinal order
    pub invalid: Vec<InvalidProtoIndex>,
}

impl InstanceMap {
    pub fn slot(&self, slot: usize) -> &[i32] {
        self.buckets.get(slot).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Instances that landed in some bucket.
    pub fn instance_count(&self) -> usize {
        self.buckets.iter().map(Vec::len).sum()
    }
}

/// Per-instance visibility, or `None` when every instance is visible.
///
/// Instances are identified by `ids` when authored, otherwise by ordinal.
pub fn compute_mask(instance_count: usize, ids: Option<&[i64]>, invisible_ids: &[i64]) -> Option<Vec<bool>> {
    if invisible_ids.is_empty() {
        return None;
    }
    let invisible: HashSet<i64> = invisible_ids.iter().copied().collect();
    let mask = (0..instance_count)
        .map(|i| {
            let id = ids.and_then(|ids| ids.get(i).copied()).unwrap_or(i as i64);
            !invisible.contains(&id)
        })
        .collect();
    Some(mask)
}

/// Group instance ordinals by prototype slot.
pub fn bucket_instances(proto_indices: &[i32], mask: Option<&[bool]>, prototype_count: usize) -> InstanceMap {
    let mut map = InstanceMap {
        buckets: vec![Vec::new(); prototype_count],
        invalid: Vec::new(),
    };
    for (instance, &proto_index) in proto_indices.iter().enumerate() {
        let slot = usize::try_from(proto_index)
            .ok()
            .filter(|slot| *slot < prototype_count);
        let Some(slot) = slot else {
            map.invalid.push(InvalidProtoIndex { instance, proto_index });
            continue;
        };
        if mask.is_some_and(|m| !m.get(instance).copied().unwrap_or(true)) {
            continue;
        }
        map.buckets[slot].push(instance as i32);
    }
    map
}

/// Read the instancing attributes of `prim` at `time` and bucket them.
pub fn compute_instance_map(
    scene: &dyn SceneAccessor,
    prim: &SdfPath,
    prototype_count: usize,
    time: TimeCode,
) -> InstanceMap {
    let proto_indices = scene.attribute(prim, PROTO_INDICES, time);
    let proto_indices = proto_indices
        .as_ref()
        .and_then(Value::as_int_array)
        .unwrap_or(&[]);
    let ids = scene
        .attribute(prim, IDS, time)
        .and_then(|v| v.to_i64_array());
    let invisible_ids = scene
        .attribute(prim, INVISIBLE_IDS, time)
        .and_then(|v| v.to_i64_array())
        .unwrap_or_default();

    let mask = compute_mask(proto_indices.len(), ids.as_deref(), &invisible_ids);
    bucket_instances(proto_indices, mask.as_deref(), prototype_count)
}

impl PointInstancerAdapter {
    /// Buckets for `record` at `time`, computed at most once per time code.
    ///
    /// Only the buckets of the current frame are kept. A new time code
    /// replaces them, and marking INSTANCE_INDEX dirty drops them.
    pub(super) fn instance_map(&self, delegate: &ImagingDelegate, record: &InstancerRecord, time: TimeCode) -> Arc<InstanceMap> {
        let mut cache = record.cache();
        if let Some((cached_time, map)) = &cache.instance_map {
            if *cached_time == time {
                return map.clone();
            }
        }

        let map = Arc::new(compute_instance_map(
            delegate.scene(),
            &record.usd_path,
            record.prototype_paths.len(),
            time,
        ));
        for invalid in &map.invalid {
            log::warn!(
                "Invalid index ({}) found in <{}.{}> for time ({:?})",
                invalid.proto_index,
                record.usd_path,
                PROTO_INDICES,
                time
            );
        }
        cache.instance_map = Some((time, map.clone()));
        map
    }

    /// The bucket for the prototype that produced `proto_cache_path`.
    pub(super) fn proto_instance_indices(
        &self,
        delegate: &ImagingDelegate,
        instancer_cache_path: &SdfPath,
        proto_cache_path: &SdfPath,
        time: TimeCode,
    ) -> Vec<i32> {
        let Some(record) = self.registry.get(instancer_cache_path) else {
            log::error!("No instancer record for {}", instancer_cache_path);
            return Vec::new();
        };
        let Some(proto) = record.proto_prim(proto_cache_path) else {
            log::error!("{} is not a prototype prim of {}", proto_cache_path, instancer_cache_path);
            return Vec::new();
        };
        let Some(slot) = record.prototype_slot(&proto.proto_root_path) else {
            log::error!("Prototype {} not targeted by {}", proto.proto_root_path, instancer_cache_path);
            return Vec::new();
        };
        self.instance_map(delegate, &record, time).slot(slot).to_vec()
    }
}
