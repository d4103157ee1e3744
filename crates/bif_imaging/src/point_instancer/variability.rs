//! Variability tracking and visibility.

use bif_core::{SdfPath, TimeCode};

use super::record::{InstancerRecord, ProtoPrimRecord};
use super::{PointInstancerAdapter, IDS, INVISIBLE_IDS, ORIENTATIONS, POSITIONS, PROTO_INDICES, SCALES};
use crate::adapter::base::{self, INVISIBLE, VISIBILITY};
use crate::delegate::ImagingDelegate;
use crate::dirty::DirtyBits;

impl PointInstancerAdapter {
    pub(super) fn instance_indices_vary(&self, delegate: &ImagingDelegate, prim: &SdfPath) -> bool {
        [PROTO_INDICES, INVISIBLE_IDS, IDS]
            .iter()
            .any(|attr| base::is_varying(delegate, prim, attr, false))
    }

    /// Variability of a prototype prim, plus what it inherits from its instancer.
    pub(super) fn track_child_variability(&self, delegate: &ImagingDelegate, cache_path: &SdfPath) -> DirtyBits {
        let Some((record, proto)) = self.proto_for_child(cache_path) else {
            log::error!("No prototype record for {}", cache_path);
            return DirtyBits::ALL_DIRTY;
        };
        let Some(prim) = proto.attribute_prim(delegate.scene()) else {
            log::error!("Empty prototype chain for {}", cache_path);
            return DirtyBits::ALL_DIRTY;
        };

        let mut bits = proto.adapter.track_variability(delegate, &prim, cache_path);
        proto.set_variability(bits);
        if !bits.contains(DirtyBits::VISIBILITY) {
            let time = TimeCode::Time(delegate.config().variability_time);
            proto.set_static_visible(self.proto_visibility(delegate, &proto, time));
        }

        if base::is_varying(delegate, &record.usd_path, VISIBILITY, true) {
            bits |= DirtyBits::VISIBILITY;
        }
        if self.instance_indices_vary(delegate, &record.usd_path) {
            bits |= DirtyBits::INSTANCE_INDEX;
        }
        bits
    }

    pub(super) fn track_instancer_variability(&self, delegate: &ImagingDelegate, record: &InstancerRecord) -> DirtyBits {
        let prim = &record.usd_path;
        let mut bits = DirtyBits::empty();

        if self.instance_indices_vary(delegate, prim) {
            bits |= DirtyBits::INSTANCE_INDEX;
        }
        if base::is_transform_varying(delegate, prim) {
            bits |= DirtyBits::TRANSFORM;
        }

        if base::is_varying(delegate, prim, VISIBILITY, true) {
            bits |= DirtyBits::VISIBILITY;
            let mut cache = record.cache();
            cache.variable_visibility = true;
            cache.visible_time = None;
        } else {
            let visible = self.instancer_visible(delegate, &record.cache_path, delegate.current_time());
            let mut cache = record.cache();
            cache.visible = visible;
            cache.variable_visibility = false;
        }

        let scene = delegate.scene();
        let attrs_vary = [POSITIONS, ORIENTATIONS, SCALES]
            .iter()
            .any(|attr| base::is_varying(delegate, prim, attr, false));
        let primvars_vary = scene
            .primvars(prim)
            .iter()
            .any(|p| !p.interpolation.is_per_prim() && p.might_be_time_varying);
        if attrs_vary || primvars_vary {
            bits |= DirtyBits::PRIMVAR;
        }
        bits
    }

    /// Visibility of the instancer itself, including every parent instancer.
    pub(super) fn instancer_visible(&self, delegate: &ImagingDelegate, cache_path: &SdfPath, time: TimeCode) -> bool {
        let mut current = self.registry.get(cache_path);
        while let Some(record) = current {
            if !base::compute_visibility(delegate, &record.usd_path, time) {
                return false;
            }
            if record.parent_instancer_path.is_empty() {
                break;
            }
            current = self.registry.get(&record.parent_instancer_path);
        }
        true
    }

    /// Instancer visibility at `time`, cached per time code when it varies.
    pub(super) fn update_instancer_visibility(&self, delegate: &ImagingDelegate, record: &InstancerRecord, time: TimeCode) -> bool {
        let mut cache = record.cache();
        if !cache.variable_visibility || cache.visible_time == Some(time) {
            return cache.visible;
        }
        let visible = self.instancer_visible(delegate, &record.cache_path, time);
        cache.visible = visible;
        cache.visible_time = Some(time);
        visible
    }

    /// Visibility of a prototype prim within its prototype, across every
    /// native instance it was reached through.
    pub(super) fn proto_visibility(&self, delegate: &ImagingDelegate, proto: &ProtoPrimRecord, time: TimeCode) -> bool {
        let scene = delegate.scene();
        for hop in proto.paths.windows(2) {
            let (inner, instance) = (&hop[0], &hop[1]);
            let Some(prototype) = scene.prim(instance).and_then(|p| p.prototype) else {
                continue;
            };
            if !self.visible_under(delegate, &prototype, inner, time) {
                return false;
            }
        }
        match proto.paths.last() {
            Some(last) => self.visible_under(delegate, &proto.proto_root_path, last, time),
            None => true,
        }
    }

    /// Visibility of `prim` composed from `root` downwards. Prototype roots
    /// have no opinion and end the walk.
    fn visible_under(&self, delegate: &ImagingDelegate, root: &SdfPath, prim: &SdfPath, time: TimeCode) -> bool {
        if !prim.has_prefix(root) {
            log::error!("Prototype <{}> is not prefixed under proto root <{}>", prim, root);
            return true;
        }
        let scene = delegate.scene();
        for path in prim.ancestors() {
            if delegate.is_in_invised_paths(&path) {
                return false;
            }
            if scene.token(&path, VISIBILITY, time).as_deref() == Some(INVISIBLE) {
                return false;
            }
            if path == *root || scene.prim(&path).is_some_and(|p| p.is_prototype) {
                break;
            }
        }
        true
    }

    /// Composed visibility of a prototype prim's instances.
    pub(super) fn child_visible(
        &self,
        delegate: &ImagingDelegate,
        record: &InstancerRecord,
        proto: &ProtoPrimRecord,
        time: TimeCode,
    ) -> bool {
        if !self.update_instancer_visibility(delegate, record, time) {
            return false;
        }
        if proto.variability().contains(DirtyBits::VISIBILITY) {
            self.proto_visibility(delegate, proto, time)
        } else {
            proto.static_visible()
        }
    }
}
