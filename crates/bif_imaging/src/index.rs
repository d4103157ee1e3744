//! The render-index side of population.
//!
//! Adapters never touch render storage directly. They insert, remove and
//! invalidate prims through an [`IndexProxy`]. [`RenderIndex`] is an
//! in-memory implementation that records what was asked of it, which is
//! what the delegate syncs from and what tests assert against.

use std::collections::{BTreeMap, BTreeSet};

use bif_core::SdfPath;

use crate::adapter::AdapterHandle;
use crate::dirty::DirtyBits;

/// Kinds of renderable prims.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RprimKind {
    Mesh,
    BasisCurves,
    Points,
}

impl RprimKind {
    /// The rprim kind produced by a schema type, if any.
    pub fn from_type_name(type_name: &str) -> Option<Self> {
        match type_name {
            "Mesh" => Some(RprimKind::Mesh),
            "BasisCurves" => Some(RprimKind::BasisCurves),
            "Points" => Some(RprimKind::Points),
            _ => None,
        }
    }
}

/// Mutation surface handed to adapters during population and change processing.
pub trait IndexProxy {
    fn insert_instancer(
        &mut self,
        cache_path: &SdfPath,
        parent_instancer: &SdfPath,
        prim: &SdfPath,
        adapter: Option<AdapterHandle>,
    );

    fn insert_rprim(
        &mut self,
        kind: RprimKind,
        cache_path: &SdfPath,
        prim: &SdfPath,
        adapter: Option<AdapterHandle>,
    );

    fn remove_rprim(&mut self, cache_path: &SdfPath);

    fn remove_instancer(&mut self, cache_path: &SdfPath);

    /// Route changes on `prim` to `cache_path`.
    fn add_dependency(&mut self, cache_path: &SdfPath, prim: &SdfPath);

    fn remove_prim_info_dependency(&mut self, cache_path: &SdfPath);

    fn mark_instancer_dirty(&mut self, cache_path: &SdfPath, bits: DirtyBits);

    fn mark_rprim_dirty(&mut self, cache_path: &SdfPath, bits: DirtyBits);

    /// Ask for `path` to be populated again after change processing.
    fn repopulate(&mut self, path: &SdfPath);

    fn is_rprim_type_supported(&self, kind: RprimKind) -> bool;

    fn is_populated(&self, cache_path: &SdfPath) -> bool;
}

/// What kind of thing lives at a cache path.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EntryKind {
    Rprim(RprimKind),
    Instancer,
}

/// One populated prim.
#[derive(Clone, Debug)]
pub struct IndexEntry {
    pub kind: EntryKind,
    /// The scene prim that produced this entry
    pub usd_path: SdfPath,
    /// Empty for rprims and root instancers
    pub parent_instancer: SdfPath,
    /// Owning adapter; `None` falls back to the prim's type adapter
    pub adapter: Option<AdapterHandle>,
    pub dirty: DirtyBits,
    pub time_varying: DirtyBits,
    pub variability_tracked: bool,
}

impl IndexEntry {
    fn new(kind: EntryKind, usd_path: &SdfPath, parent_instancer: &SdfPath, adapter: Option<AdapterHandle>) -> Self {
        Self {
            kind,
            usd_path: usd_path.clone(),
            parent_instancer: parent_instancer.clone(),
            adapter,
            dirty: DirtyBits::ALL_DIRTY,
            time_varying: DirtyBits::empty(),
            variability_tracked: false,
        }
    }

    pub fn is_instancer(&self) -> bool {
        self.kind == EntryKind::Instancer
    }
}

/// An in-memory render index.
#[derive(Debug)]
pub struct RenderIndex {
    entries: BTreeMap<SdfPath, IndexEntry>,
    /// scene prim path -> cache paths that depend on it
    dependencies: BTreeMap<SdfPath, BTreeSet<SdfPath>>,
    repopulate_requests: Vec<SdfPath>,
    supported: BTreeSet<RprimKind>,
}

impl Default for RenderIndex {
    fn default() -> Self {
        Self::new()
    }
}

impl RenderIndex {
    /// An index that accepts every rprim kind.
    pub fn new() -> Self {
        Self::with_supported_kinds(&[RprimKind::Mesh, RprimKind::BasisCurves, RprimKind::Points])
    }

    pub fn with_supported_kinds(kinds: &[RprimKind]) -> Self {
        Self {
            entries: BTreeMap::new(),
            dependencies: BTreeMap::new(),
            repopulate_requests: Vec::new(),
            supported: kinds.iter().copied().collect(),
        }
    }

    pub fn entry(&self, cache_path: &SdfPath) -> Option<&IndexEntry> {
        self.entries.get(cache_path)
    }

    pub fn entries(&self) -> impl Iterator<Item = (&SdfPath, &IndexEntry)> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn rprim_paths(&self) -> Vec<SdfPath> {
        self.entries
            .iter()
            .filter(|(_, e)| !e.is_instancer())
            .map(|(p, _)| p.clone())
            .collect()
    }

    pub fn instancer_paths(&self) -> Vec<SdfPath> {
        self.entries
            .iter()
            .filter(|(_, e)| e.is_instancer())
            .map(|(p, _)| p.clone())
            .collect()
    }

    /// Entries at or beneath `prefix`, including synthesized child paths.
    pub fn paths_under(&self, prefix: &SdfPath) -> Vec<SdfPath> {
        self.entries
            .keys()
            .filter(|p| p.has_prefix(prefix))
            .cloned()
            .collect()
    }

    /// Cache paths depending on `prim` or anything beneath it.
    pub fn dependents_of(&self, prim: &SdfPath) -> BTreeSet<SdfPath> {
        self.dependencies
            .iter()
            .filter(|(usd, _)| usd.has_prefix(prim))
            .flat_map(|(_, caches)| caches.iter().cloned())
            .collect()
    }

    /// Cache paths depending on exactly `prim`.
    pub fn direct_dependents_of(&self, prim: &SdfPath) -> BTreeSet<SdfPath> {
        self.dependencies.get(prim).cloned().unwrap_or_default()
    }

    pub fn take_repopulate_requests(&mut self) -> Vec<SdfPath> {
        std::mem::take(&mut self.repopulate_requests)
    }

    pub fn set_time_varying(&mut self, cache_path: &SdfPath, bits: DirtyBits) {
        if let Some(entry) = self.entries.get_mut(cache_path) {
            entry.time_varying = bits;
            entry.variability_tracked = true;
        }
    }

    /// Re-dirty everything that may change with time.
    pub fn mark_time_varying_dirty(&mut self) {
        for entry in self.entries.values_mut() {
            entry.dirty |= entry.time_varying;
        }
    }

    pub fn clear_dirty(&mut self, cache_path: &SdfPath) {
        if let Some(entry) = self.entries.get_mut(cache_path) {
            entry.dirty = DirtyBits::empty();
        }
    }

    fn mark_dirty(&mut self, cache_path: &SdfPath, bits: DirtyBits) {
        match self.entries.get_mut(cache_path) {
            Some(entry) => entry.dirty |= bits,
            None => log::debug!("Ignoring dirty bits for unknown prim {}", cache_path),
        }
    }

    fn remove_entry(&mut self, cache_path: &SdfPath, want_instancer: bool) {
        match self.entries.get(cache_path) {
            Some(entry) if entry.is_instancer() == want_instancer => {
                self.entries.remove(cache_path);
                self.remove_prim_info_dependency(cache_path);
            }
            Some(_) => log::error!("Prim kind mismatch removing {}", cache_path),
            None => log::debug!("Remove of unknown prim {} ignored", cache_path),
        }
    }
}

impl IndexProxy for RenderIndex {
    fn insert_instancer(
        &mut self,
        cache_path: &SdfPath,
        parent_instancer: &SdfPath,
        prim: &SdfPath,
        adapter: Option<AdapterHandle>,
    ) {
        if self.entries.contains_key(cache_path) {
            log::warn!("Instancer {} inserted twice", cache_path);
        }
        self.entries.insert(
            cache_path.clone(),
            IndexEntry::new(EntryKind::Instancer, prim, parent_instancer, adapter),
        );
        self.add_dependency(cache_path, prim);
    }

    fn insert_rprim(
        &mut self,
        kind: RprimKind,
        cache_path: &SdfPath,
        prim: &SdfPath,
        adapter: Option<AdapterHandle>,
    ) {
        if self.entries.contains_key(cache_path) {
            log::warn!("Rprim {} inserted twice", cache_path);
        }
        self.entries.insert(
            cache_path.clone(),
            IndexEntry::new(EntryKind::Rprim(kind), prim, &SdfPath::empty(), adapter),
        );
        self.add_dependency(cache_path, prim);
    }

    fn remove_rprim(&mut self, cache_path: &SdfPath) {
        self.remove_entry(cache_path, false);
    }

    fn remove_instancer(&mut self, cache_path: &SdfPath) {
        self.remove_entry(cache_path, true);
    }

    fn add_dependency(&mut self, cache_path: &SdfPath, prim: &SdfPath) {
        self.dependencies
            .entry(prim.clone())
            .or_default()
            .insert(cache_path.clone());
    }

    fn remove_prim_info_dependency(&mut self, cache_path: &SdfPath) {
        self.dependencies.retain(|_, caches| {
            caches.remove(cache_path);
            !caches.is_empty()
        });
    }

    fn mark_instancer_dirty(&mut self, cache_path: &SdfPath, bits: DirtyBits) {
        self.mark_dirty(cache_path, bits);
    }

    fn mark_rprim_dirty(&mut self, cache_path: &SdfPath, bits: DirtyBits) {
        self.mark_dirty(cache_path, bits);
    }

    fn repopulate(&mut self, path: &SdfPath) {
        if !self.repopulate_requests.contains(path) {
            self.repopulate_requests.push(path.clone());
        }
    }

    fn is_rprim_type_supported(&self, kind: RprimKind) -> bool {
        self.supported.contains(&kind)
    }

    fn is_populated(&self, cache_path: &SdfPath) -> bool {
        self.entries.contains_key(cache_path)
    }
}
