//! Selection records produced by picking.

use std::collections::BTreeMap;

use bif_core::SdfPath;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum HighlightMode {
    Select,
    Locate,
}

/// Selected rprims, each with optional instance-index lists.
///
/// An rprim with no instance lists is selected as a whole.
#[derive(Clone, Debug, Default)]
pub struct Selection {
    items: BTreeMap<(HighlightMode, SdfPath), Vec<Vec<i32>>>,
}

impl Selection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Select a whole rprim.
    pub fn add_rprim(&mut self, mode: HighlightMode, cache_path: &SdfPath) {
        self.items.entry((mode, cache_path.clone())).or_default();
    }

    /// Select some instances of an rprim.
    pub fn add_instance(&mut self, mode: HighlightMode, cache_path: &SdfPath, instance_indices: Vec<i32>) {
        let entry = self.items.entry((mode, cache_path.clone())).or_default();
        if !instance_indices.is_empty() {
            entry.push(instance_indices);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn contains(&self, mode: HighlightMode, cache_path: &SdfPath) -> bool {
        self.items.contains_key(&(mode, cache_path.clone()))
    }

    pub fn selected_paths(&self, mode: HighlightMode) -> Vec<SdfPath> {
        self.items
            .keys()
            .filter(|(m, _)| *m == mode)
            .map(|(_, p)| p.clone())
            .collect()
    }

    pub fn instance_indices(&self, mode: HighlightMode, cache_path: &SdfPath) -> Option<&[Vec<i32>]> {
        self.items
            .get(&(mode, cache_path.clone()))
            .map(Vec::as_slice)
    }
}
