//! The scene delegate.
//!
//! [`ImagingDelegate`] walks the scene, hands each prim to its adapter and
//! keeps the resulting render index current: per-frame syncs, scene edits
//! and selection all go through here.

use std::collections::BTreeSet;
use std::sync::Arc;

use bif_core::{PrimInfo, SceneAccessor, SdfPath, TimeCode};
use bif_math::Mat4;
use parking_lot::RwLock;
use rayon::prelude::*;

use crate::adapter::{base, AdapterHandle, AdapterRegistry};
use crate::config::ImagingConfig;
use crate::dirty::{DirtyBits, PropertyChange};
use crate::index::{IndexEntry, IndexProxy, RenderIndex};
use crate::prim_range::PrimRange;
use crate::selection::{HighlightMode, Selection};
use crate::value_cache::ValueCache;

/// Properties whose changes affect every prim beneath the authoring prim.
fn is_inherited_property(property: &str) -> bool {
    property == base::VISIBILITY || property == base::XFORM_OP_ORDER || property.starts_with(base::XFORM_OP_PREFIX)
}

pub struct ImagingDelegate {
    scene: Arc<dyn SceneAccessor>,
    adapters: AdapterRegistry,
    config: ImagingConfig,
    root_transform: RwLock<Mat4>,
    invised_paths: RwLock<Vec<SdfPath>>,
    time: RwLock<TimeCode>,
    values: ValueCache,
}

impl std::fmt::Debug for ImagingDelegate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImagingDelegate")
            .field("adapters", &self.adapters.type_names())
            .field("time", &*self.time.read())
            .finish_non_exhaustive()
    }
}

impl ImagingDelegate {
    /// A delegate with the default adapters and configuration.
    pub fn new(scene: Arc<dyn SceneAccessor>) -> Self {
        Self::with_config(scene, ImagingConfig::default())
    }

    pub fn with_config(scene: Arc<dyn SceneAccessor>, config: ImagingConfig) -> Self {
        Self::with_adapters(scene, config, AdapterRegistry::with_defaults())
    }

    pub fn with_adapters(scene: Arc<dyn SceneAccessor>, config: ImagingConfig, adapters: AdapterRegistry) -> Self {
        let root_transform = config.root_transform();
        Self {
            scene,
            adapters,
            config,
            root_transform: RwLock::new(root_transform),
            invised_paths: RwLock::new(Vec::new()),
            time: RwLock::new(TimeCode::Default),
            values: ValueCache::new(),
        }
    }

    pub fn scene(&self) -> &dyn SceneAccessor {
        self.scene.as_ref()
    }

    pub fn config(&self) -> &ImagingConfig {
        &self.config
    }

    pub fn root_transform(&self) -> Mat4 {
        *self.root_transform.read()
    }

    /// Callers re-dirty transforms themselves.
    pub fn set_root_transform(&self, transform: Mat4) {
        *self.root_transform.write() = transform;
    }

    pub fn set_invised_paths(&self, paths: Vec<SdfPath>) {
        *self.invised_paths.write() = paths;
    }

    /// True when `path` is, or is beneath, an invised path.
    pub fn is_in_invised_paths(&self, path: &SdfPath) -> bool {
        self.invised_paths.read().iter().any(|p| path.has_prefix(p))
    }

    pub fn current_time(&self) -> TimeCode {
        *self.time.read()
    }

    pub fn set_time(&self, time: TimeCode) {
        *self.time.write() = time;
    }

    pub fn values(&self) -> &ValueCache {
        &self.values
    }

    pub fn adapters(&self) -> &AdapterRegistry {
        &self.adapters
    }

    pub fn adapter_for(&self, prim: &PrimInfo) -> Option<AdapterHandle> {
        self.adapters.get(&prim.type_name)
    }

    pub fn adapter_for_path(&self, path: &SdfPath) -> Option<AdapterHandle> {
        self.scene.prim(path).and_then(|prim| self.adapter_for(&prim))
    }

    /// The adapter that owns an index entry: its recorded owner, or the
    /// adapter for the prim that produced it.
    fn adapter_for_entry(&self, entry: &IndexEntry) -> Option<AdapterHandle> {
        entry
            .adapter
            .clone()
            .or_else(|| self.adapter_for_path(&entry.usd_path.prim_path()))
    }

    /// Populate `root` and everything beneath it that is not yet in `index`.
    ///
    /// Native instances are expanded into instance proxies. Returns the
    /// number of prims the adapters accepted.
    pub fn populate(&self, index: &mut RenderIndex, root: &SdfPath) -> usize {
        let scene = self.scene();
        let mut range = PrimRange::new(scene, root.clone()).with_instance_proxies();
        let mut populated = 0usize;

        while let Some(path) = range.current().cloned() {
            if index.is_populated(&path) {
                range.advance(scene, true);
                continue;
            }
            let Some(prim) = scene.prim(&path) else {
                range.advance(scene, true);
                continue;
            };
            if base::should_cull_subtree(self, &prim) {
                log::debug!("Culling subtree at {}", path);
                range.advance(scene, true);
                continue;
            }
            let Some(adapter) = self.adapter_for(&prim) else {
                range.advance(scene, false);
                continue;
            };
            if adapter.populate(self, &prim, index, None).is_some() {
                populated += 1;
            }
            range.advance(scene, adapter.should_cull_children());
        }

        log::info!("Populated {} prims under {} ({} in index)", populated, root, index.len());
        populated
    }

    /// Bring every dirty prim up to date at `time`.
    ///
    /// Variability is tracked once per prim; afterwards only bits found to
    /// be time-varying are re-dirtied on each call. Both phases run on the
    /// rayon pool. Returns the number of prims updated.
    pub fn sync(&self, index: &mut RenderIndex, time: TimeCode) -> usize {
        self.set_time(time);
        index.mark_time_varying_dirty();

        let untracked: Vec<(SdfPath, SdfPath, AdapterHandle)> = index
            .entries()
            .filter(|(_, entry)| !entry.variability_tracked)
            .filter_map(|(path, entry)| {
                self.adapter_for_entry(entry)
                    .map(|adapter| (path.clone(), entry.usd_path.clone(), adapter))
            })
            .collect();
        let tracked: Vec<(SdfPath, DirtyBits)> = untracked
            .par_iter()
            .map(|(cache_path, usd_path, adapter)| {
                (cache_path.clone(), adapter.track_variability(self, usd_path, cache_path))
            })
            .collect();
        for (cache_path, bits) in &tracked {
            index.set_time_varying(cache_path, *bits);
        }

        let dirty: Vec<(SdfPath, SdfPath, DirtyBits, bool, AdapterHandle)> = index
            .entries()
            .filter(|(_, entry)| !entry.dirty.is_empty())
            .filter_map(|(path, entry)| {
                self.adapter_for_entry(entry).map(|adapter| {
                    (path.clone(), entry.usd_path.clone(), entry.dirty, entry.is_instancer(), adapter)
                })
            })
            .collect();
        let max_samples = self.config.max_transform_samples;
        dirty.par_iter().for_each(|(cache_path, usd_path, bits, is_instancer, adapter)| {
            adapter.update_for_time(self, usd_path, cache_path, time, *bits);
            if *is_instancer && bits.contains(DirtyBits::TRANSFORM) {
                let samples = adapter.sample_instancer_transform(self, cache_path, time, max_samples);
                self.values
                    .update(cache_path, |v| v.instancer_transform_samples = samples);
            }
        });
        for (cache_path, ..) in &dirty {
            index.clear_dirty(cache_path);
        }

        log::debug!(
            "Synced {} prims at {:?} ({} newly tracked)",
            dirty.len(),
            time,
            tracked.len()
        );
        dirty.len()
    }

    fn resync_entries(&self, index: &mut RenderIndex, cache_paths: &BTreeSet<SdfPath>) {
        for cache_path in cache_paths {
            // An earlier resync may have taken this one with it
            let Some(adapter) = index.entry(cache_path).and_then(|e| self.adapter_for_entry(e)) else {
                continue;
            };
            adapter.process_prim_resync(self, cache_path, index);
        }
    }

    /// Handle a structural change at `path`.
    ///
    /// Prims populated at `path` or an ancestor resync first; that covers
    /// edits inside instancer prototypes. Otherwise prims beneath `path`
    /// resync and the subtree is populated again for anything new.
    pub fn resync_prim(&self, index: &mut RenderIndex, path: &SdfPath) {
        log::debug!("Resync {}", path);
        let owners = path
            .ancestors()
            .take_while(|p| !p.is_absolute_root())
            .map(|p| index.direct_dependents_of(&p))
            .find(|deps| !deps.is_empty());

        match owners {
            Some(owners) => self.resync_entries(index, &owners),
            None => {
                let below = index.dependents_of(path);
                self.resync_entries(index, &below);
                if self.scene.exists(path) {
                    index.repopulate(path);
                }
            }
        }
        self.apply_repopulation(index);
    }

    /// Handle the removal of `path` from the scene.
    pub fn remove_prim(&self, index: &mut RenderIndex, path: &SdfPath) {
        log::debug!("Remove {}", path);
        let mut affected = index.dependents_of(path);
        if affected.is_empty() {
            affected = path
                .ancestors()
                .skip(1)
                .take_while(|p| !p.is_absolute_root())
                .map(|p| index.direct_dependents_of(&p))
                .find(|deps| !deps.is_empty())
                .unwrap_or_default();
        }

        for cache_path in &affected {
            let Some(adapter) = index.entry(cache_path).and_then(|e| self.adapter_for_entry(e)) else {
                continue;
            };
            // Prims outside the removed subtree only lost part of their input
            if cache_path.prim_path().has_prefix(path) {
                adapter.process_prim_removal(self, cache_path, index);
            } else {
                adapter.process_prim_resync(self, cache_path, index);
            }
        }
        self.apply_repopulation(index);
    }

    /// Route an authored property change to every prim that reads it.
    pub fn property_changed(&self, index: &mut RenderIndex, prim: &SdfPath, property: &str) {
        let dependents = if is_inherited_property(property) {
            index.dependents_of(prim)
        } else {
            index.direct_dependents_of(prim)
        };
        if dependents.is_empty() {
            log::trace!("No prims depend on {}.{}", prim, property);
            return;
        }

        for cache_path in &dependents {
            let Some(entry) = index.entry(cache_path) else {
                continue;
            };
            let usd_path = entry.usd_path.clone();
            let Some(adapter) = self.adapter_for_entry(entry) else {
                continue;
            };
            match adapter.process_property_change(self, &usd_path, cache_path, property) {
                PropertyChange::Clean => {}
                PropertyChange::Dirty(bits) => adapter.mark_dirty(self, &usd_path, cache_path, bits, index),
                PropertyChange::Resync => adapter.process_prim_resync(self, cache_path, index),
            }
        }
        self.apply_repopulation(index);
    }

    /// Populate every path adapters asked for during change processing.
    pub fn apply_repopulation(&self, index: &mut RenderIndex) {
        for path in index.take_repopulate_requests() {
            if self.scene.exists(&path) {
                self.populate(index, &path);
            }
        }
    }

    /// Add selection records for `usd_path`. Returns true if anything was selected.
    pub fn populate_selection(
        &self,
        index: &RenderIndex,
        mode: HighlightMode,
        usd_path: &SdfPath,
        instance_index: Option<i32>,
        result: &mut Selection,
    ) -> bool {
        let mut candidates = index.dependents_of(usd_path);
        if candidates.is_empty() {
            candidates = usd_path
                .ancestors()
                .skip(1)
                .take_while(|p| !p.is_absolute_root())
                .map(|p| index.direct_dependents_of(&p))
                .find(|deps| !deps.is_empty())
                .unwrap_or_default();
        }

        let mut added = false;
        for cache_path in &candidates {
            let Some(entry) = index.entry(cache_path) else {
                continue;
            };
            // Instancers select their own prototype prims
            let owned_by_candidate = (base::is_child_path(cache_path) && candidates.contains(&cache_path.parent()))
                || (!entry.parent_instancer.is_empty() && candidates.contains(&entry.parent_instancer));
            if owned_by_candidate {
                continue;
            }
            let Some(adapter) = self.adapter_for_entry(entry) else {
                continue;
            };
            added |= adapter.populate_selection(self, mode, cache_path, usd_path, instance_index, &[], result);
        }
        added
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use bif_core::{PrimSpec, Stage, Value, XformOp};
    use bif_math::{Quat, Vec3};

    fn init_logging() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    fn scene() -> Arc<Stage> {
        let stage = Stage::new();
        stage.define("/World", PrimSpec::new("Xform")).unwrap();
        stage
            .define("/World/Ground", PrimSpec::new("Mesh").with_attribute("points", vec![Vec3::ZERO]))
            .unwrap();
        stage
            .define(
                "/World/PI",
                PrimSpec::new("PointInstancer")
                    .with_translate(Vec3::new(10.0, 0.0, 0.0))
                    .with_relationship("prototypes", &["/World/PI/Protos/Tree", "/World/PI/Protos/Rock"])
                    .with_attribute("protoIndices", vec![0, 1, 0, 1, 0])
                    .with_attribute("positions", vec![Vec3::ZERO; 5])
                    .with_attribute("orientations", Value::QuatArray(vec![Quat::IDENTITY; 5])),
            )
            .unwrap();
        stage.define("/World/PI/Protos", PrimSpec::new("Scope")).unwrap();
        stage.define("/World/PI/Protos/Tree", PrimSpec::new("Xform")).unwrap();
        stage.define("/World/PI/Protos/Tree/Trunk", PrimSpec::new("Mesh")).unwrap();
        stage.define("/World/PI/Protos/Tree/Leaves", PrimSpec::new("Points")).unwrap();
        stage.define("/World/PI/Protos/Rock", PrimSpec::new("Mesh")).unwrap();
        stage.define("/World/Look", PrimSpec::new("Material")).unwrap();
        Arc::new(stage)
    }

    fn populated(stage: Arc<Stage>) -> (ImagingDelegate, RenderIndex) {
        init_logging();
        let delegate = ImagingDelegate::new(stage);
        let mut index = RenderIndex::new();
        delegate.populate(&mut index, &SdfPath::absolute_root());
        (delegate, index)
    }

    fn sorted_paths(index: &RenderIndex) -> Vec<String> {
        index.entries().map(|(p, _)| p.to_string()).collect()
    }

    #[test]
    fn test_populate_instancer_and_gprims() {
        let (_, index) = populated(scene());
        assert_eq!(
            sorted_paths(&index),
            vec![
                "/World/Ground",
                "/World/PI",
                "/World/PI.proto0_Leaves_id1",
                "/World/PI.proto0_Trunk_id0",
                "/World/PI.proto1_Rock_id0",
            ]
        );
        let child = index.entry(&"/World/PI.proto0_Trunk_id0".into()).unwrap();
        assert_eq!(child.usd_path, SdfPath::new("/World/PI/Protos/Tree/Trunk"));
        assert!(child.adapter.as_ref().unwrap().is_instancer_adapter());
    }

    #[test]
    fn test_populate_twice_is_idempotent() {
        let (delegate, mut index) = populated(scene());
        let before = sorted_paths(&index);
        assert_eq!(delegate.populate(&mut index, &SdfPath::absolute_root()), 0);
        assert_eq!(sorted_paths(&index), before);
    }

    #[test]
    fn test_sync_fills_value_cache() {
        let (delegate, mut index) = populated(scene());
        let updated = delegate.sync(&mut index, TimeCode::Time(1.0));
        assert_eq!(updated, index.len());

        let values = delegate.values();
        assert_eq!(values.instance_indices(&"/World/PI.proto0_Trunk_id0".into()), Some(vec![0, 2, 4]));
        assert_eq!(values.instance_indices(&"/World/PI.proto1_Rock_id0".into()), Some(vec![1, 3]));

        let instancer = values.get(&"/World/PI".into()).unwrap();
        let origin = instancer.instancer_transform.unwrap().transform_point3(Vec3::ZERO);
        assert!((origin - Vec3::new(10.0, 0.0, 0.0)).length() < 1e-5);
        assert_eq!(instancer.values.get("rotate"), Some(&Value::Vec4Array(vec![bif_math::Vec4::new(1.0, 0.0, 0.0, 0.0); 5])));
        assert!(instancer.primvars.iter().any(|p| p.name == "translate"));
        // A closed shutter gives a single sample at the current time
        assert_eq!(instancer.instancer_transform_samples.len(), 1);
        assert_eq!(instancer.instancer_transform_samples[0].0, 0.0);

        // Prototype prims do not carry the instancer's transform
        let trunk = values.transform(&"/World/PI.proto0_Trunk_id0".into()).unwrap();
        assert!(trunk.abs_diff_eq(Mat4::IDENTITY, 1e-6));

        // Nothing varies, so a second sync has nothing to do
        assert_eq!(delegate.sync(&mut index, TimeCode::Time(2.0)), 0);
    }

    fn moving_instancer() -> Arc<Stage> {
        let stage = Stage::new();
        stage
            .define(
                "/Mover",
                PrimSpec::new("Xform")
                    .with_xform_sample(0.0, vec![XformOp::Translate(Vec3::ZERO)])
                    .with_xform_sample(1.0, vec![XformOp::Translate(Vec3::X)]),
            )
            .unwrap();
        stage
            .define(
                "/Mover/PI",
                PrimSpec::new("PointInstancer")
                    .with_relationship("prototypes", &["/Mover/PI/Protos/Rock"])
                    .with_attribute("protoIndices", vec![0])
                    .with_attribute("positions", vec![Vec3::ZERO]),
            )
            .unwrap();
        stage.define("/Mover/PI/Protos", PrimSpec::new("Scope")).unwrap();
        stage.define("/Mover/PI/Protos/Rock", PrimSpec::new("Mesh")).unwrap();
        Arc::new(stage)
    }

    #[test]
    fn test_sync_samples_instancer_transform_over_shutter() {
        init_logging();
        let config = ImagingConfig {
            shutter_open: 0.0,
            shutter_close: 1.0,
            max_transform_samples: 4,
            ..Default::default()
        };
        let delegate = ImagingDelegate::with_config(moving_instancer(), config);
        let mut index = RenderIndex::new();
        delegate.populate(&mut index, &SdfPath::absolute_root());
        delegate.sync(&mut index, TimeCode::Time(0.0));

        let samples = delegate.values().instancer_transform_samples(&"/Mover/PI".into());
        let offsets: Vec<f32> = samples.iter().map(|(dt, _)| *dt).collect();
        assert_eq!(offsets, vec![0.0, 1.0]);
        assert!(samples[0].1.transform_point3(Vec3::ZERO).length() < 1e-5);
        assert!((samples[1].1.transform_point3(Vec3::ZERO) - Vec3::X).length() < 1e-5);
    }

    #[test]
    fn test_sync_caps_transform_samples() {
        init_logging();
        let config = ImagingConfig {
            shutter_open: 0.0,
            shutter_close: 1.0,
            max_transform_samples: 1,
            ..Default::default()
        };
        let delegate = ImagingDelegate::with_config(moving_instancer(), config);
        let mut index = RenderIndex::new();
        delegate.populate(&mut index, &SdfPath::absolute_root());
        delegate.sync(&mut index, TimeCode::Time(0.0));

        assert_eq!(delegate.values().instancer_transform_samples(&"/Mover/PI".into()).len(), 1);
        // Gprims are never sampled
        assert!(delegate
            .values()
            .instancer_transform_samples(&"/Mover/PI.proto0_Rock_id0".into())
            .is_empty());
    }

    #[test]
    fn test_time_varying_indices_resync_each_frame() {
        let stage = scene();
        let pi = SdfPath::new("/World/PI");
        stage.set_time_sample(&pi, "protoIndices", 1.0, vec![0, 0, 0, 0, 0]).unwrap();
        stage.set_time_sample(&pi, "protoIndices", 2.0, vec![1, 1, 1, 1, 1]).unwrap();
        let (delegate, mut index) = populated(stage);

        delegate.sync(&mut index, TimeCode::Time(1.0));
        assert_eq!(delegate.values().instance_indices(&"/World/PI.proto1_Rock_id0".into()), Some(vec![]));

        assert!(delegate.sync(&mut index, TimeCode::Time(2.0)) > 0);
        assert_eq!(
            delegate.values().instance_indices(&"/World/PI.proto1_Rock_id0".into()),
            Some(vec![0, 1, 2, 3, 4])
        );
    }

    #[test]
    fn test_property_change_marks_dirty() {
        let (delegate, mut index) = populated(scene());
        delegate.sync(&mut index, TimeCode::Time(1.0));

        let pi = SdfPath::new("/World/PI");
        delegate.property_changed(&mut index, &pi, "positions");
        assert_eq!(index.entry(&pi).unwrap().dirty, DirtyBits::PRIMVAR);

        delegate.property_changed(&mut index, &pi, "protoIndices");
        assert!(index.entry(&pi).unwrap().dirty.contains(DirtyBits::INSTANCE_INDEX));

        delegate.property_changed(&mut index, &pi, "customData");
        assert_eq!(index.entry(&pi).unwrap().dirty, DirtyBits::PRIMVAR | DirtyBits::INSTANCE_INDEX);
    }

    #[test]
    fn test_edit_indices_then_sync() {
        let stage = scene();
        let (delegate, mut index) = populated(stage.clone());
        delegate.sync(&mut index, TimeCode::Default);

        let pi = SdfPath::new("/World/PI");
        stage.set_attribute(&pi, "protoIndices", vec![1, 1, 1, 1, 0]).unwrap();
        delegate.property_changed(&mut index, &pi, "protoIndices");
        delegate.sync(&mut index, TimeCode::Default);

        assert_eq!(delegate.values().instance_indices(&"/World/PI.proto0_Trunk_id0".into()), Some(vec![4]));
        assert_eq!(
            delegate.values().instance_indices(&"/World/PI.proto1_Rock_id0".into()),
            Some(vec![0, 1, 2, 3])
        );
    }

    #[test]
    fn test_prototype_edit_repopulates_instancer() {
        let stage = scene();
        let (delegate, mut index) = populated(stage.clone());
        let before = sorted_paths(&index);

        // A topology edit inside a prototype resyncs the owning instancer
        delegate.property_changed(&mut index, &"/World/PI/Protos/Rock".into(), "faceVertexCounts");
        assert_eq!(sorted_paths(&index), before);

        // So does a new prim inside a prototype
        stage.define("/World/PI/Protos/Rock2", PrimSpec::new("Mesh")).unwrap();
        stage.define("/World/PI/Protos/Tree/Branch", PrimSpec::new("Mesh")).unwrap();
        delegate.resync_prim(&mut index, &"/World/PI/Protos/Tree/Branch".into());
        assert!(index.is_populated(&"/World/PI.proto0_Branch_id2".into()));
        assert!(!index.is_populated(&"/World/PI/Protos/Rock2".into()));
        assert!(!index.is_populated(&"/World/PI/Protos/Tree/Branch".into()));
    }

    #[test]
    fn test_new_top_level_prim_is_populated() {
        let stage = scene();
        let (delegate, mut index) = populated(stage.clone());
        stage.define("/World/Extra", PrimSpec::new("Mesh")).unwrap();

        delegate.resync_prim(&mut index, &"/World/Extra".into());
        assert!(index.is_populated(&"/World/Extra".into()));
        assert!(index.is_populated(&"/World/PI".into()));
    }

    #[test]
    fn test_remove_instancer() {
        let stage = scene();
        let (delegate, mut index) = populated(stage.clone());
        delegate.sync(&mut index, TimeCode::Default);
        let pi = SdfPath::new("/World/PI");

        stage.remove(&pi).unwrap();
        delegate.remove_prim(&mut index, &pi);
        assert_eq!(sorted_paths(&index), vec!["/World/Ground"]);
        assert!(delegate.values().get(&"/World/PI.proto0_Trunk_id0".into()).is_none());
        assert!(delegate.values().get(&pi).is_none());

        // Removing again finds nothing to do
        delegate.remove_prim(&mut index, &pi);
        assert_eq!(index.len(), 1);
    }

    #[test]
    fn test_remove_gprim() {
        let stage = scene();
        let (delegate, mut index) = populated(stage.clone());
        delegate.sync(&mut index, TimeCode::Default);
        let ground = SdfPath::new("/World/Ground");

        stage.remove(&ground).unwrap();
        delegate.remove_prim(&mut index, &ground);
        assert!(!index.is_populated(&ground));
        assert!(delegate.values().get(&ground).is_none());
        assert!(index.is_populated(&"/World/PI".into()));
    }

    #[test]
    fn test_remove_prototype_prim() {
        let stage = scene();
        let (delegate, mut index) = populated(stage.clone());
        let leaves = SdfPath::new("/World/PI/Protos/Tree/Leaves");

        stage.remove(&leaves).unwrap();
        delegate.remove_prim(&mut index, &leaves);
        assert_eq!(
            sorted_paths(&index),
            vec!["/World/Ground", "/World/PI", "/World/PI.proto0_Trunk_id0", "/World/PI.proto1_Rock_id0"]
        );
    }

    #[test]
    fn test_hidden_instancer_hides_children() {
        let stage = scene();
        stage.set_attribute(&"/World/PI".into(), "visibility", "invisible").unwrap();
        let (delegate, mut index) = populated(stage);
        delegate.sync(&mut index, TimeCode::Default);

        assert_eq!(delegate.values().visible(&"/World/PI.proto1_Rock_id0".into()), Some(false));
        assert_eq!(delegate.values().visible(&"/World/Ground".into()), Some(true));
    }

    #[test]
    fn test_select_instancer_selects_every_instance() {
        let (delegate, mut index) = populated(scene());
        delegate.sync(&mut index, TimeCode::Default);
        let mut selection = Selection::new();

        assert!(delegate.populate_selection(&index, HighlightMode::Select, &"/World/PI".into(), None, &mut selection));
        assert_eq!(
            selection.instance_indices(HighlightMode::Select, &"/World/PI.proto1_Rock_id0".into()),
            Some(&[vec![0, 1]][..])
        );
        assert_eq!(selection.selected_paths(HighlightMode::Select).len(), 3);
    }

    #[test]
    fn test_select_one_instance_of_instancer() {
        let (delegate, mut index) = populated(scene());
        delegate.sync(&mut index, TimeCode::Default);
        let mut selection = Selection::new();

        // Instance 3 is the second Rock
        assert!(delegate.populate_selection(&index, HighlightMode::Select, &"/World/PI".into(), Some(3), &mut selection));
        assert_eq!(selection.selected_paths(HighlightMode::Select), vec![SdfPath::new("/World/PI.proto1_Rock_id0")]);
        assert_eq!(
            selection.instance_indices(HighlightMode::Select, &"/World/PI.proto1_Rock_id0".into()),
            Some(&[vec![1]][..])
        );
    }

    #[test]
    fn test_select_prototype_prim() {
        let (delegate, mut index) = populated(scene());
        let mut selection = Selection::new();

        let tree = SdfPath::new("/World/PI/Protos/Tree");
        assert!(delegate.populate_selection(&index, HighlightMode::Locate, &tree, None, &mut selection));
        let mut selected = selection.selected_paths(HighlightMode::Locate);
        selected.sort();
        assert_eq!(
            selected,
            vec![SdfPath::new("/World/PI.proto0_Leaves_id1"), SdfPath::new("/World/PI.proto0_Trunk_id0")]
        );

        let mut none = Selection::new();
        assert!(!delegate.populate_selection(&index, HighlightMode::Select, &"/Nowhere".into(), None, &mut none));
        assert!(none.is_empty());
    }

    #[test]
    fn test_concurrent_sync_of_many_instancers() {
        let stage = Stage::new();
        for i in 0..24 {
            let pi = format!("/PI_{}", i);
            stage
                .define(
                    &pi,
                    PrimSpec::new("PointInstancer")
                        .with_relationship("prototypes", &[format!("{}/P", pi).as_str()])
                        .with_attribute("protoIndices", vec![0; 3])
                        .with_attribute("positions", vec![Vec3::ONE; 3]),
                )
                .unwrap();
            stage.define(&format!("{}/P", pi), PrimSpec::new("Mesh")).unwrap();
        }
        let (delegate, mut index) = populated(Arc::new(stage));
        assert_eq!(index.len(), 48);

        assert_eq!(delegate.sync(&mut index, TimeCode::Time(1.0)), 48);
        for i in 0..24 {
            let child = SdfPath::new(format!("/PI_{}.proto0_P_id0", i));
            assert_eq!(delegate.values().instance_indices(&child), Some(vec![0, 1, 2]));
        }
    }
}
