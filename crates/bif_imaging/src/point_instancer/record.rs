//! Instancer bookkeeping.
//!
//! The registry owns one [`InstancerRecord`] per populated instancer, keyed
//! by cache path, plus two reverse indexes used by change processing:
//! prototype path to instancers, and parent instancer to child instancers.
//! Both indexes are updated in the same write section that inserts or
//! removes a record.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;

use bif_core::{SceneAccessor, SdfPath, TimeCode};
use parking_lot::{Mutex, MutexGuard, RwLock};

use super::indices::InstanceMap;
use crate::adapter::AdapterHandle;
use crate::dirty::DirtyBits;

/// One render prim produced while walking a prototype.
#[derive(Debug)]
pub struct ProtoPrimRecord {
    /// Innermost first: the prim, then each native instance crossed to reach it
    pub paths: Vec<SdfPath>,
    pub adapter: AdapterHandle,
    /// The prototype this prim was found under
    pub proto_root_path: SdfPath,
    variability: AtomicU32,
    visible: AtomicBool,
}

impl ProtoPrimRecord {
    pub fn new(paths: Vec<SdfPath>, adapter: AdapterHandle, proto_root_path: SdfPath) -> Self {
        Self {
            paths,
            adapter,
            proto_root_path,
            variability: AtomicU32::new(0),
            visible: AtomicBool::new(true),
        }
    }

    pub fn variability(&self) -> DirtyBits {
        DirtyBits::from_bits_truncate(self.variability.load(Ordering::Acquire))
    }

    pub fn set_variability(&self, bits: DirtyBits) {
        self.variability.store(bits.bits(), Ordering::Release);
    }

    /// Visibility computed during variability tracking; only meaningful
    /// when visibility does not vary.
    pub fn static_visible(&self) -> bool {
        self.visible.load(Ordering::Acquire)
    }

    pub fn set_static_visible(&self, visible: bool) {
        self.visible.store(visible, Ordering::Release);
    }

    /// The prim to read attributes from.
    ///
    /// Prototype roots carry no opinions, so a chain that starts at one
    /// reads from the instance prim that referenced it instead.
    pub fn attribute_prim(&self, scene: &dyn SceneAccessor) -> Option<SdfPath> {
        let first = self.paths.first()?;
        if self.paths.len() > 1 && scene.prim(first).is_some_and(|p| p.is_prototype) {
            return self.paths.get(1).cloned();
        }
        Some(first.clone())
    }
}

/// Per-instancer values shared by all of its prototype prims.
#[derive(Debug, Default)]
pub(crate) struct InstancerCache {
    pub visible: bool,
    pub variable_visibility: bool,
    pub visible_time: Option<TimeCode>,
    /// Buckets for one time code only; cleared by INSTANCE_INDEX dirty marks
    pub instance_map: Option<(TimeCode, Arc<InstanceMap>)>,
}

/// One populated point instancer.
#[derive(Debug)]
pub struct InstancerRecord {
    pub cache_path: SdfPath,
    /// The scene prim; a prototype-local path for nested instancers
    pub usd_path: SdfPath,
    /// Empty for root instancers
    pub parent_instancer_path: SdfPath,
    /// Prototype targets, indexed by proto slot
    pub prototype_paths: Vec<SdfPath>,
    proto_prims: RwLock<BTreeMap<SdfPath, Arc<ProtoPrimRecord>>>,
    cache: Mutex<InstancerCache>,
    initialized: AtomicBool,
}

impl InstancerRecord {
    fn new(cache_path: SdfPath, usd_path: SdfPath, parent_instancer_path: SdfPath, prototype_paths: Vec<SdfPath>) -> Self {
        Self {
            cache_path,
            usd_path,
            parent_instancer_path,
            prototype_paths,
            proto_prims: RwLock::new(BTreeMap::new()),
            cache: Mutex::new(InstancerCache {
                visible: true,
                ..Default::default()
            }),
            initialized: AtomicBool::new(false),
        }
    }

    pub fn add_proto_prim(&self, cache_path: SdfPath, record: ProtoPrimRecord) {
        self.proto_prims.write().insert(cache_path, Arc::new(record));
    }

    pub fn proto_prim(&self, cache_path: &SdfPath) -> Option<Arc<ProtoPrimRecord>> {
        self.proto_prims.read().get(cache_path).cloned()
    }

    /// Snapshot of the proto prim map, sorted by cache path.
    pub fn proto_prims(&self) -> Vec<(SdfPath, Arc<ProtoPrimRecord>)> {
        self.proto_prims
            .read()
            .iter()
            .map(|(path, record)| (path.clone(), record.clone()))
            .collect()
    }

    pub fn proto_prim_count(&self) -> usize {
        self.proto_prims.read().len()
    }

    pub fn has_proto_prim(&self, cache_path: &SdfPath) -> bool {
        self.proto_prims.read().contains_key(cache_path)
    }

    /// Slot of a prototype root. A prototype targeted twice resolves to its last slot.
    pub fn prototype_slot(&self, proto_root: &SdfPath) -> Option<usize> {
        self.prototype_paths.iter().rposition(|p| p == proto_root)
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::Acquire)
    }

    pub(crate) fn mark_initialized(&self) {
        self.initialized.store(true, Ordering::Release);
    }

    pub(crate) fn cache(&self) -> MutexGuard<'_, InstancerCache> {
        self.cache.lock()
    }

    pub(crate) fn invalidate_instance_map(&self) {
        self.cache.lock().instance_map = None;
    }

    pub(crate) fn invalidate_visibility(&self) {
        self.cache.lock().visible_time = None;
    }
}

#[derive(Debug, Default)]
struct RegistryState {
    records: HashMap<SdfPath, Arc<InstancerRecord>>,
    by_prototype: HashMap<SdfPath, BTreeSet<SdfPath>>,
    by_parent: HashMap<SdfPath, BTreeSet<SdfPath>>,
}

impl RegistryState {
    fn unlink(index: &mut HashMap<SdfPath, BTreeSet<SdfPath>>, key: &SdfPath, cache_path: &SdfPath) {
        if let Some(set) = index.get_mut(key) {
            set.remove(cache_path);
            if set.is_empty() {
                index.remove(key);
            }
        }
    }
}

/// All populated instancers of one adapter.
#[derive(Debug, Default)]
pub struct InstancerRegistry {
    state: RwLock<RegistryState>,
    instance_counter: AtomicU64,
}

impl InstancerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a record for `usd_path`, keyed by `natural_path` or, if that
    /// is taken, by a variant-selection-suffixed path that is not.
    ///
    /// Reservation and insertion happen under one write lock, so two
    /// threads populating the same path always get distinct records.
    pub fn reserve(
        &self,
        natural_path: &SdfPath,
        usd_path: &SdfPath,
        parent_instancer_path: &SdfPath,
        prototype_paths: Vec<SdfPath>,
    ) -> Arc<InstancerRecord> {
        let mut state = self.state.write();
        let mut cache_path = natural_path.clone();
        while state.records.contains_key(&cache_path) {
            let n = self.instance_counter.fetch_add(1, Ordering::Relaxed) + 1;
            cache_path = natural_path.append_variant_selection("instance", &n.to_string());
        }

        let record = Arc::new(InstancerRecord::new(
            cache_path.clone(),
            usd_path.clone(),
            parent_instancer_path.clone(),
            prototype_paths,
        ));
        for prototype in &record.prototype_paths {
            state
                .by_prototype
                .entry(prototype.clone())
                .or_default()
                .insert(cache_path.clone());
        }
        if !parent_instancer_path.is_empty() {
            state
                .by_parent
                .entry(parent_instancer_path.clone())
                .or_default()
                .insert(cache_path.clone());
        }
        state.records.insert(cache_path, record.clone());
        record
    }

    pub fn get(&self, cache_path: &SdfPath) -> Option<Arc<InstancerRecord>> {
        self.state.read().records.get(cache_path).cloned()
    }

    pub fn contains(&self, cache_path: &SdfPath) -> bool {
        self.state.read().records.contains_key(cache_path)
    }

    /// Remove a record and its reverse-index entries.
    pub fn remove(&self, cache_path: &SdfPath) -> Option<Arc<InstancerRecord>> {
        let mut state = self.state.write();
        let record = state.records.remove(cache_path)?;
        for prototype in &record.prototype_paths {
            RegistryState::unlink(&mut state.by_prototype, prototype, cache_path);
        }
        if !record.parent_instancer_path.is_empty() {
            RegistryState::unlink(&mut state.by_parent, &record.parent_instancer_path, cache_path);
        }
        Some(record)
    }

    /// Instancers whose prototypes contain `path`.
    pub fn instancers_for_prototype(&self, path: &SdfPath) -> BTreeSet<SdfPath> {
        let state = self.state.read();
        path.prim_path()
            .ancestors()
            .filter_map(|ancestor| state.by_prototype.get(&ancestor))
            .flat_map(|set| set.iter().cloned())
            .collect()
    }

    /// Instancers nested directly under `parent`.
    pub fn children_of(&self, parent: &SdfPath) -> BTreeSet<SdfPath> {
        self.state
            .read()
            .by_parent
            .get(parent)
            .cloned()
            .unwrap_or_default()
    }

    /// Parent, grandparent, ... of `cache_path`, nearest first.
    pub fn ancestors_of(&self, cache_path: &SdfPath) -> Vec<SdfPath> {
        let state = self.state.read();
        let mut ancestors = Vec::new();
        let mut current = state.records.get(cache_path);
        while let Some(record) = current {
            let parent = &record.parent_instancer_path;
            if parent.is_empty() || ancestors.contains(parent) {
                break;
            }
            ancestors.push(parent.clone());
            current = state.records.get(parent);
        }
        ancestors
    }

    /// Scene paths of `cache_path` and every instancer above it.
    pub fn usd_ancestry(&self, cache_path: &SdfPath) -> Vec<SdfPath> {
        let state = self.state.read();
        let mut paths = Vec::new();
        let mut current = state.records.get(cache_path);
        while let Some(record) = current {
            if paths.contains(&record.usd_path) {
                break;
            }
            paths.push(record.usd_path.clone());
            current = state.records.get(&record.parent_instancer_path);
        }
        paths
    }

    /// The instancer whose proto prim map holds `proto_cache_path`.
    pub fn owner_of(&self, proto_cache_path: &SdfPath) -> Option<SdfPath> {
        let state = self.state.read();
        let mut owners: Vec<&SdfPath> = state
            .records
            .iter()
            .filter(|(_, record)| record.has_proto_prim(proto_cache_path))
            .map(|(path, _)| path)
            .collect();
        owners.sort();
        owners.first().map(|p| (*p).clone())
    }

    /// Every registered cache path, sorted.
    pub fn cache_paths(&self) -> Vec<SdfPath> {
        let mut paths: Vec<SdfPath> = self.state.read().records.keys().cloned().collect();
        paths.sort();
        paths
    }

    pub fn len(&self) -> usize {
        self.state.read().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.read().records.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rayon::prelude::*;

    use crate::adapter::GprimAdapter;

    fn protos(paths: &[&str]) -> Vec<SdfPath> {
        paths.iter().map(|p| SdfPath::new(*p)).collect()
    }

    #[test]
    fn test_reserve_disambiguates() {
        let registry = InstancerRegistry::new();
        let natural = SdfPath::new("/PI");
        let first = registry.reserve(&natural, &natural, &SdfPath::empty(), protos(&["/PI/Protos"]));
        let second = registry.reserve(&natural, &natural, &SdfPath::empty(), protos(&["/PI/Protos"]));

        assert_eq!(first.cache_path, natural);
        assert_eq!(second.cache_path, SdfPath::new("/PI{instance=1}"));
        assert_eq!(second.cache_path.prim_path(), natural);
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_concurrent_reserve_gives_distinct_paths() {
        let registry = InstancerRegistry::new();
        let natural = SdfPath::new("/PI");
        let paths: BTreeSet<SdfPath> = (0..32)
            .into_par_iter()
            .map(|_| {
                registry
                    .reserve(&natural, &natural, &SdfPath::empty(), Vec::new())
                    .cache_path
                    .clone()
            })
            .collect();

        assert_eq!(paths.len(), 32);
        assert_eq!(registry.len(), 32);
    }

    #[test]
    fn test_reverse_indexes_follow_removal() {
        let registry = InstancerRegistry::new();
        let a = registry.reserve(&"/A".into(), &"/A".into(), &SdfPath::empty(), protos(&["/A/Protos"]));
        let b = registry.reserve(
            &"/A/Protos/B".into(),
            &"/A/Protos/B".into(),
            &a.cache_path,
            protos(&["/A/Protos/B/Protos"]),
        );

        assert_eq!(
            registry.instancers_for_prototype(&"/A/Protos/B/Protos/M".into()),
            [a.cache_path.clone(), b.cache_path.clone()].into_iter().collect::<BTreeSet<_>>()
        );
        assert_eq!(registry.children_of(&a.cache_path).len(), 1);
        assert_eq!(registry.ancestors_of(&b.cache_path), vec![a.cache_path.clone()]);
        assert_eq!(
            registry.usd_ancestry(&b.cache_path),
            protos(&["/A/Protos/B", "/A"])
        );

        registry.remove(&b.cache_path).unwrap();
        assert!(registry.children_of(&a.cache_path).is_empty());
        assert_eq!(registry.instancers_for_prototype(&"/A/Protos/B/Protos/M".into()).len(), 1);

        registry.remove(&a.cache_path).unwrap();
        assert!(registry.instancers_for_prototype(&"/A/Protos/M".into()).is_empty());
        assert!(registry.remove(&a.cache_path).is_none());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_proto_prims_and_owner() {
        let registry = InstancerRegistry::new();
        let record = registry.reserve(&"/PI".into(), &"/PI".into(), &SdfPath::empty(), protos(&["/P0", "/P1", "/P0"]));
        let cache = SdfPath::new("/PI.proto0_M_id0");
        record.add_proto_prim(
            cache.clone(),
            ProtoPrimRecord::new(protos(&["/P0/M"]), Arc::new(GprimAdapter::new()), "/P0".into()),
        );

        assert_eq!(record.proto_prim_count(), 1);
        assert_eq!(record.prototype_slot(&"/P0".into()), Some(2));
        assert_eq!(record.prototype_slot(&"/P1".into()), Some(1));
        assert_eq!(registry.owner_of(&cache), Some(SdfPath::new("/PI")));
        assert_eq!(registry.owner_of(&"/Nope.x".into()), None);
    }

    #[test]
    fn test_proto_record_variability() {
        let record = ProtoPrimRecord::new(protos(&["/P/M"]), Arc::new(GprimAdapter::new()), "/P".into());
        assert!(record.variability().is_empty());
        assert!(record.static_visible());

        record.set_variability(DirtyBits::POINTS | DirtyBits::TRANSFORM);
        record.set_static_visible(false);
        assert!(record.variability().contains(DirtyBits::POINTS));
        assert!(!record.static_visible());
    }
}
