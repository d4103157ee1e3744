//! Transforms across instancing boundaries.
//!
//! Composition is column-vector (`parent * child`). A prototype prim's own
//! adapter reports its full world transform. The instancer then draws it
//! once per instance, so the part above the prototype has to come out and
//! the native instance hops have to go back in.

use bif_core::{SdfPath, TimeCode};
use bif_math::{Mat4, Mat4Ext};

use super::record::ProtoPrimRecord;
use super::PointInstancerAdapter;
use crate::adapter::base;
use crate::delegate::ImagingDelegate;

impl PointInstancerAdapter {
    /// Rebase a prototype prim's transform onto its prototype root.
    ///
    /// Strips the delegate root transform, folds in each native instance
    /// hop after the prim itself, then strips the transform above the
    /// prototype root.
    pub(super) fn correct_transform(
        &self,
        delegate: &ImagingDelegate,
        proto: &ProtoPrimRecord,
        transform: Mat4,
        time: TimeCode,
    ) -> Mat4 {
        let mut corrected = delegate.root_transform().inverse_or_identity() * transform;
        for hop in proto.paths.iter().skip(1) {
            corrected = base::compute_transform(delegate, hop, time, true) * corrected;
        }
        let proto_parent = proto.proto_root_path.parent();
        if !proto_parent.is_empty() {
            let above = base::compute_transform(delegate, &proto_parent, time, true);
            corrected = above.inverse_or_identity() * corrected;
        }
        corrected
    }

    /// Transform of a prototype prim, ready to be instanced.
    pub(super) fn child_transform(
        &self,
        delegate: &ImagingDelegate,
        proto: &ProtoPrimRecord,
        cache_path: &SdfPath,
        time: TimeCode,
        ignore_root: bool,
    ) -> Mat4 {
        let scene = delegate.scene();
        let Some(prim) = proto.attribute_prim(scene) else {
            log::error!("Empty prototype chain for {}", cache_path);
            return Mat4::IDENTITY;
        };
        let transform = if scene.prim(&prim).is_some_and(|p| p.is_instance) {
            // The instance's own transform is folded in as a hop
            delegate.root_transform()
        } else {
            proto.adapter.transform(delegate, &prim, cache_path, time, ignore_root)
        };
        self.correct_transform(delegate, proto, transform, time)
    }

    /// Transform of an instancer relative to its parent instancer.
    pub(super) fn relative_transform(
        &self,
        delegate: &ImagingDelegate,
        parent_cache_path: &SdfPath,
        cache_path: &SdfPath,
        time: TimeCode,
    ) -> Mat4 {
        let prim_path = cache_path.prim_path();
        let mut target = Mat4::IDENTITY;
        if !parent_cache_path.is_empty() {
            let proto = self
                .registry
                .get(parent_cache_path)
                .and_then(|parent| parent.proto_prim(cache_path));
            match proto {
                // The parent draws this instancer as its prototype
                Some(proto) if proto.proto_root_path == prim_path => return Mat4::IDENTITY,
                Some(proto) => {
                    let in_prototype = delegate
                        .scene()
                        .prim(&prim_path)
                        .is_some_and(|p| p.is_in_prototype);
                    target = if in_prototype {
                        delegate.root_transform()
                    } else {
                        base::compute_transform(delegate, &proto.proto_root_path, time, false)
                    };
                }
                None => {
                    log::error!("{} is not a prototype prim of {}", cache_path, parent_cache_path);
                }
            }
        }
        target.inverse_or_identity() * base::compute_transform(delegate, &prim_path, time, false)
    }

    /// Instancer transform, asking the parent instancer's adapter when nested.
    pub(super) fn instancer_transform_at(&self, delegate: &ImagingDelegate, cache_path: &SdfPath, time: TimeCode) -> Mat4 {
        let Some(record) = self.registry.get(cache_path) else {
            log::error!("No instancer record for {}", cache_path);
            return Mat4::IDENTITY;
        };
        let parent = &record.parent_instancer_path;
        if parent.is_empty() {
            return self.relative_transform(delegate, parent, cache_path, time);
        }
        match delegate.adapter_for_path(&parent.prim_path()) {
            Some(adapter) => adapter.relative_instancer_transform(delegate, parent, cache_path, time),
            None => {
                log::error!("No adapter for parent instancer {}", parent);
                Mat4::IDENTITY
            }
        }
    }

    /// Relative transforms at each authored sample inside the shutter window.
    pub(super) fn sample_transform(
        &self,
        delegate: &ImagingDelegate,
        cache_path: &SdfPath,
        time: TimeCode,
        max_samples: usize,
    ) -> Vec<(f32, Mat4)> {
        if max_samples == 0 {
            return Vec::new();
        }
        let Some(record) = self.registry.get(cache_path) else {
            log::error!("No instancer record for {}", cache_path);
            return Vec::new();
        };

        let t = time.value_or_zero();
        let interval = delegate.config().sampling_interval(t);
        let parent = &record.parent_instancer_path;
        let (sample_prim, parent_adapter) = if parent.is_empty() {
            (cache_path.prim_path(), None)
        } else {
            (parent.prim_path(), delegate.adapter_for_path(&parent.prim_path()))
        };

        let mut times = vec![interval.min, interval.max];
        let scene = delegate.scene();
        for path in sample_prim.ancestors().take_while(|p| !p.is_absolute_root()) {
            times.extend(scene.transform_time_samples(&path, interval));
        }
        times.sort_by(f64::total_cmp);
        times.dedup();

        times
            .into_iter()
            .take(max_samples)
            .map(|sample| {
                let at = TimeCode::Time(sample);
                let transform = match &parent_adapter {
                    Some(adapter) => adapter.relative_instancer_transform(delegate, parent, cache_path, at),
                    None => self.relative_transform(delegate, parent, cache_path, at),
                };
                ((sample - t) as f32, transform)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use bif_core::{PrimSpec, Stage, XformOp};
    use bif_math::Vec3;

    use crate::adapter::GprimAdapter;
    use crate::config::ImagingConfig;

    fn proto(paths: &[&str], root: &str) -> ProtoPrimRecord {
        ProtoPrimRecord::new(
            paths.iter().map(|p| SdfPath::new(*p)).collect(),
            Arc::new(GprimAdapter::new()),
            root.into(),
        )
    }

    fn origin(m: Mat4) -> Vec3 {
        m.transform_point3(Vec3::ZERO)
    }

    #[test]
    fn test_identity_correction_keeps_transform() {
        let stage = Stage::new();
        stage.define("/PI", PrimSpec::new("PointInstancer")).unwrap();
        stage.define("/PI/Protos", PrimSpec::new("Xform")).unwrap();
        stage.define("/PI/Protos/P", PrimSpec::new("Xform")).unwrap();
        stage
            .define("/PI/Protos/P/M", PrimSpec::new("Mesh").with_translate(Vec3::new(1.0, 2.0, 3.0)))
            .unwrap();
        let delegate = ImagingDelegate::new(Arc::new(stage));
        let adapter = PointInstancerAdapter::new();
        let record = proto(&["/PI/Protos/P/M"], "/PI/Protos/P");

        let original = base::compute_transform(&delegate, &"/PI/Protos/P/M".into(), TimeCode::Default, false);
        let corrected = adapter.child_transform(&delegate, &record, &"/PI.proto0_M_id0".into(), TimeCode::Default, false);
        assert!(corrected.abs_diff_eq(original, 1e-6));
    }

    #[test]
    fn test_correction_strips_root_and_prototype_placement() {
        let stage = Stage::new();
        stage
            .define("/PI", PrimSpec::new("PointInstancer").with_translate(Vec3::new(100.0, 0.0, 0.0)))
            .unwrap();
        stage
            .define("/PI/Protos", PrimSpec::new("Xform").with_translate(Vec3::new(0.0, 50.0, 0.0)))
            .unwrap();
        stage
            .define("/PI/Protos/P", PrimSpec::new("Xform").with_translate(Vec3::new(0.0, 0.0, 7.0)))
            .unwrap();
        stage
            .define("/PI/Protos/P/M", PrimSpec::new("Mesh").with_translate(Vec3::new(1.0, 0.0, 0.0)))
            .unwrap();
        let mut config = ImagingConfig::default();
        config.root_transform = Mat4::from_translation(Vec3::new(0.0, -9.0, 0.0)).to_cols_array();
        let delegate = ImagingDelegate::with_config(Arc::new(stage), config);
        let adapter = PointInstancerAdapter::new();
        let record = proto(&["/PI/Protos/P/M"], "/PI/Protos/P");

        let corrected = adapter.child_transform(&delegate, &record, &"/PI.proto0_M_id0".into(), TimeCode::Default, false);
        // Prototype root and leaf survive; instancer, Protos and root do not
        assert!((origin(corrected) - Vec3::new(1.0, 0.0, 7.0)).length() < 1e-4);
    }

    #[test]
    fn test_correction_folds_in_native_instance_hops() {
        let stage = Stage::new();
        stage.define("/PI", PrimSpec::new("PointInstancer")).unwrap();
        stage.define("/PI/Protos", PrimSpec::new("Xform")).unwrap();
        stage.define_prototype("/__Prototype_1").unwrap();
        stage
            .define("/__Prototype_1/cube", PrimSpec::new("Mesh").with_translate(Vec3::new(0.0, 0.0, 1.0)))
            .unwrap();
        stage
            .define(
                "/PI/Protos/A",
                PrimSpec::new("Xform")
                    .instance_of("/__Prototype_1")
                    .with_translate(Vec3::new(3.0, 0.0, 0.0)),
            )
            .unwrap();
        let delegate = ImagingDelegate::new(Arc::new(stage));
        let adapter = PointInstancerAdapter::new();
        let record = proto(&["/__Prototype_1/cube", "/PI/Protos/A"], "/PI/Protos/A");

        let corrected = adapter.child_transform(&delegate, &record, &"/PI.proto0_cube_id0".into(), TimeCode::Default, false);
        assert!((origin(corrected) - Vec3::new(3.0, 0.0, 1.0)).length() < 1e-4);
    }

    #[test]
    fn test_relative_transform_cases() {
        let stage = Stage::new();
        stage
            .define("/A", PrimSpec::new("PointInstancer").with_translate(Vec3::new(5.0, 0.0, 0.0)))
            .unwrap();
        stage
            .define("/A/Protos", PrimSpec::new("Xform").with_translate(Vec3::new(0.0, 1.0, 0.0)))
            .unwrap();
        stage
            .define("/A/Protos/B", PrimSpec::new("PointInstancer").with_translate(Vec3::new(0.0, 0.0, 2.0)))
            .unwrap();
        stage
            .define("/A/Protos/Group", PrimSpec::new("Xform").with_translate(Vec3::new(0.0, 0.0, 4.0)))
            .unwrap();
        stage
            .define("/A/Protos/Group/C", PrimSpec::new("PointInstancer").with_translate(Vec3::new(8.0, 0.0, 0.0)))
            .unwrap();
        let delegate = ImagingDelegate::new(Arc::new(stage));
        let adapter = PointInstancerAdapter::new();
        let registry = adapter.registry();
        let a = registry.reserve(&"/A".into(), &"/A".into(), &SdfPath::empty(), vec!["/A/Protos/B".into(), "/A/Protos/Group".into()]);
        let b = registry.reserve(&"/A/Protos/B".into(), &"/A/Protos/B".into(), &a.cache_path, Vec::new());
        let c = registry.reserve(&"/A/Protos/Group/C".into(), &"/A/Protos/Group/C".into(), &a.cache_path, Vec::new());
        a.add_proto_prim(b.cache_path.clone(), proto(&["/A/Protos/B"], "/A/Protos/B"));
        a.add_proto_prim(c.cache_path.clone(), proto(&["/A/Protos/Group/C"], "/A/Protos/Group"));

        // B is A's prototype root: its own transform comes from A's instances
        let b_rel = adapter.relative_transform(&delegate, &a.cache_path, &b.cache_path, TimeCode::Default);
        assert!(b_rel.abs_diff_eq(Mat4::IDENTITY, 1e-6));

        // C sits below the prototype root: relative to the root's world transform
        let c_rel = adapter.relative_transform(&delegate, &a.cache_path, &c.cache_path, TimeCode::Default);
        assert!((origin(c_rel) - Vec3::new(8.0, 0.0, 0.0)).length() < 1e-4);

        // A has no parent: its world transform
        let a_rel = adapter.instancer_transform_at(&delegate, &a.cache_path, TimeCode::Default);
        assert!((origin(a_rel) - Vec3::new(5.0, 0.0, 0.0)).length() < 1e-4);
    }

    #[test]
    fn test_sample_transform() {
        let stage = Stage::new();
        stage
            .define(
                "/World",
                PrimSpec::new("Xform")
                    .with_xform_sample(0.0, vec![XformOp::Translate(Vec3::ZERO)])
                    .with_xform_sample(1.0, vec![XformOp::Translate(Vec3::X)]),
            )
            .unwrap();
        stage
            .define(
                "/World/PI",
                PrimSpec::new("PointInstancer")
                    .with_xform_sample(0.5, vec![XformOp::Translate(Vec3::ZERO)])
                    .with_xform_sample(3.0, vec![XformOp::Translate(Vec3::Y)]),
            )
            .unwrap();
        let config = ImagingConfig {
            shutter_open: -0.5,
            shutter_close: 0.5,
            ..Default::default()
        };
        let delegate = ImagingDelegate::with_config(Arc::new(stage), config);
        let adapter = PointInstancerAdapter::new();
        let pi = SdfPath::new("/World/PI");
        adapter
            .registry()
            .reserve(&pi, &pi, &SdfPath::empty(), Vec::new());

        let samples = adapter.sample_transform(&delegate, &pi, TimeCode::Time(1.0), 8);
        let offsets: Vec<f32> = samples.iter().map(|(dt, _)| *dt).collect();
        assert_eq!(offsets, vec![-0.5, 0.0, 0.5]);
        assert!((origin(samples[1].1) - Vec3::X).length() < 1e-4);

        assert_eq!(adapter.sample_transform(&delegate, &pi, TimeCode::Time(1.0), 2).len(), 2);
        assert!(adapter.sample_transform(&delegate, &pi, TimeCode::Time(1.0), 0).is_empty());
    }
}
