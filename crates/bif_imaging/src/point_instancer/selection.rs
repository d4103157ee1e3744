//! Picking and selection.
//!
//! A drawn instance of a prototype prim is addressed by one flat index.
//! Under nested instancers that index is `parent_index * n + i`, where `n`
//! is the number of instances this level draws of the prototype and `i` is
//! the position in that level's bucket.

use bif_core::SdfPath;

use super::PointInstancerAdapter;
use crate::adapter::{base, InstanceIndexLookup};
use crate::delegate::ImagingDelegate;
use crate::selection::{HighlightMode, Selection};

impl PointInstancerAdapter {
    /// The instancer whose proto prim map holds `cache_path`.
    fn owning_instancer(&self, cache_path: &SdfPath) -> Option<SdfPath> {
        if base::is_child_path(cache_path) {
            return Some(cache_path.parent());
        }
        match self.registry.get(cache_path) {
            Some(record) => Some(record.parent_instancer_path.clone()).filter(|p| !p.is_empty()),
            None => self.registry.owner_of(cache_path),
        }
    }

    pub(super) fn picked_prim_path(
        &self,
        delegate: &ImagingDelegate,
        cache_path: &SdfPath,
        instance_index: i32,
        mut instancer_context: Option<&mut Vec<(SdfPath, i32)>>,
    ) -> Option<SdfPath> {
        log::trace!("Picking {} [{}]", cache_path, instance_index);
        let instancer_path = self.owning_instancer(cache_path)?;
        let record = self.registry.get(&instancer_path)?;
        let proto = record.proto_prim(cache_path)?;
        let prim_path = base::prim_path_from_instancer_chain(&proto.paths);

        let indices = self.proto_instance_indices(delegate, &instancer_path, cache_path, delegate.current_time());
        let count = i32::try_from(indices.len()).ok().filter(|n| *n > 0)?;
        if instance_index < 0 {
            return None;
        }
        let parent_index = instance_index / count;
        let local_index = indices[(instance_index % count) as usize];

        let parent = &record.parent_instancer_path;
        let fq_instancer_path = if parent.is_empty() {
            instancer_path.clone()
        } else {
            let Some(adapter) = delegate.adapter_for_path(&parent.prim_path()) else {
                log::error!("No adapter for parent instancer {}", parent);
                return None;
            };
            adapter.scene_prim_path(delegate, &instancer_path, parent_index, instancer_context.as_deref_mut())?
        };
        if let Some(context) = instancer_context {
            context.push((fq_instancer_path.clone(), local_index));
        }

        let scene = delegate.scene();
        if !scene.prim(&prim_path).is_some_and(|p| p.is_in_prototype) {
            return Some(prim_path);
        }

        // Both live in one prototype; the parent resolved which instance of it was hit
        let instancer_prim = instancer_path.prim_path();
        let same_prototype = scene.prim(&instancer_prim).is_some_and(|p| p.is_in_prototype)
            && base::root_prim(&prim_path) == base::root_prim(&instancer_prim);
        if !same_prototype {
            log::error!(
                "primPath <{}> and instancerPath <{}> are not in the same prototype",
                prim_path,
                instancer_path
            );
            return None;
        }
        if !scene.prim(&fq_instancer_path).is_some_and(|p| p.is_instance_proxy) {
            return None;
        }
        let instance_path = fq_instancer_path
            .ancestors()
            .find(|path| scene.prim(path).is_some_and(|p| p.is_instance))?;
        Some(base::prim_path_from_instancer_chain(&[prim_path, instance_path]))
    }

    pub(super) fn lookup_instance_index(
        &self,
        delegate: &ImagingDelegate,
        cache_path: &SdfPath,
        instance_index: i32,
    ) -> Option<InstanceIndexLookup> {
        let instancer_path = if base::is_child_path(cache_path) {
            cache_path.parent()
        } else {
            let record = self.registry.get(cache_path)?;
            if record.parent_instancer_path.is_empty() {
                // Top of the recursion
                return Some(InstanceIndexLookup {
                    instancer_cache_path: cache_path.clone(),
                    instance_count_for_level: 0,
                    absolute_index: None,
                });
            }
            record.parent_instancer_path.clone()
        };

        let record = self.registry.get(&instancer_path)?;
        if !record.has_proto_prim(cache_path) {
            return Some(InstanceIndexLookup {
                instancer_cache_path: instancer_path,
                instance_count_for_level: 0,
                absolute_index: None,
            });
        }
        let indices = self.proto_instance_indices(delegate, &instancer_path, cache_path, delegate.current_time());
        let absolute_index = i32::try_from(indices.len())
            .ok()
            .filter(|n| *n > 0)
            .map(|n| indices[instance_index.rem_euclid(n) as usize]);
        Some(InstanceIndexLookup {
            instancer_cache_path: instancer_path,
            instance_count_for_level: indices.len(),
            absolute_index,
        })
    }

    #[allow(clippy::too_many_arguments)]
    pub(super) fn select(
        &self,
        delegate: &ImagingDelegate,
        mode: HighlightMode,
        cache_path: &SdfPath,
        usd_path: &SdfPath,
        instance_index: Option<i32>,
        parent_instance_indices: &[i32],
        result: &mut Selection,
    ) -> bool {
        if base::is_child_path(cache_path) {
            self.select_child(delegate, mode, cache_path, usd_path, instance_index, parent_instance_indices, result)
        } else {
            self.select_instancer(delegate, mode, cache_path, usd_path, instance_index, parent_instance_indices, result)
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn select_child(
        &self,
        delegate: &ImagingDelegate,
        mode: HighlightMode,
        cache_path: &SdfPath,
        usd_path: &SdfPath,
        instance_index: Option<i32>,
        parent_instance_indices: &[i32],
        result: &mut Selection,
    ) -> bool {
        let Some((record, proto)) = self.proto_for_child(cache_path) else {
            return false;
        };
        // Selecting any hop of the chain selects this prototype prim
        if !proto.paths.iter().any(|path| path.has_prefix(usd_path)) {
            return false;
        }

        let mut instance_indices = Vec::new();
        if instance_index.is_none() && !parent_instance_indices.is_empty() {
            let indices = self.proto_instance_indices(delegate, &record.cache_path, cache_path, delegate.current_time());
            let n = indices.len() as i32;
            for &pi in parent_instance_indices {
                instance_indices.extend((0..n).map(|i| pi * n + i));
            }
        }
        proto.adapter.populate_selection(
            delegate,
            mode,
            cache_path,
            &cache_path.prim_path(),
            instance_index,
            &instance_indices,
            result,
        )
    }

    #[allow(clippy::too_many_arguments)]
    fn select_instancer(
        &self,
        delegate: &ImagingDelegate,
        mode: HighlightMode,
        cache_path: &SdfPath,
        usd_path: &SdfPath,
        instance_index: Option<i32>,
        parent_instance_indices: &[i32],
        result: &mut Selection,
    ) -> bool {
        let Some(record) = self.registry.get(cache_path) else {
            return false;
        };
        let scene = delegate.scene();
        let time = delegate.current_time();

        // Break the selection path into native-instance hops, outermost first
        let mut selection_paths = Vec::new();
        let mut current = usd_path.clone();
        while let Some(proxy) = scene.prim(&current).filter(|p| p.is_instance_proxy) {
            if let Some(in_prototype) = proxy.prim_in_prototype {
                selection_paths.push(in_prototype);
            }
            let instance = current
                .ancestors()
                .skip(1)
                .find(|path| scene.prim(path).is_some_and(|p| p.is_instance));
            match instance {
                Some(instance) => current = instance,
                None => break,
            }
        }
        selection_paths.push(current);
        selection_paths.reverse();

        // An index on the instancer itself names one entry of protoIndices
        if let Some(wanted) = instance_index.filter(|_| *usd_path == cache_path.prim_path()) {
            let mut added = false;
            for (proto_cache_path, proto) in record.proto_prims() {
                let indices = self.proto_instance_indices(delegate, cache_path, &proto_cache_path, time);
                let Some(found) = indices.iter().position(|&i| i == wanted) else {
                    continue;
                };
                let n = indices.len() as i32;
                let instance_indices: Vec<i32> = if parent_instance_indices.is_empty() {
                    vec![found as i32]
                } else {
                    parent_instance_indices.iter().map(|pi| pi * n + found as i32).collect()
                };
                added |= proto.adapter.populate_selection(
                    delegate,
                    mode,
                    &proto_cache_path,
                    &proto_cache_path.prim_path(),
                    None,
                    &instance_indices,
                    result,
                );
            }
            return added;
        }

        let mut added = false;
        for (proto_cache_path, proto) in record.proto_prims() {
            let Some(selection_prim) = zipper_match(&proto.paths, &selection_paths, &proto_cache_path) else {
                continue;
            };

            let indices = self.proto_instance_indices(delegate, cache_path, &proto_cache_path, time);
            let n = indices.len() as i32;
            let instance_indices: Vec<i32> = if parent_instance_indices.is_empty() {
                (0..n).collect()
            } else {
                parent_instance_indices
                    .iter()
                    .flat_map(|pi| (0..n).map(move |i| pi * n + i))
                    .collect()
            };
            added |= proto.adapter.populate_selection(
                delegate,
                mode,
                &proto_cache_path,
                &selection_prim,
                instance_index,
                &instance_indices,
                result,
            );
        }
        added
    }
}

/// Compare a proto prim's hop chain (innermost first) against selection
/// hops (outermost first). Returns the path to hand to the proto prim's
/// adapter, or `None` when the selection does not reach this proto prim.
fn zipper_match(proto_paths: &[SdfPath], selection_paths: &[SdfPath], proto_cache_path: &SdfPath) -> Option<SdfPath> {
    let mut instance_count = 0;
    let mut selection_count = 0;
    while instance_count < proto_paths.len() && selection_count < selection_paths.len() {
        let proto_path = &proto_paths[proto_paths.len() - instance_count - 1];
        let selection_path = &selection_paths[selection_count];
        if proto_path.has_prefix(selection_path) {
            selection_count += 1;
        } else if selection_path.has_prefix(proto_path) {
            // The rest of the selection is resolved by the proto prim's adapter
            instance_count += 1;
            break;
        } else if selection_count != 0 {
            selection_count = 0;
            break;
        }
        instance_count += 1;
    }

    if selection_count == selection_paths.len() {
        return Some(proto_cache_path.prim_path());
    }
    if selection_count != 0 && instance_count == proto_paths.len() {
        let residual: Vec<SdfPath> = selection_paths[selection_count..].iter().rev().cloned().collect();
        return Some(base::prim_path_from_instancer_chain(&residual));
    }
    None
}
