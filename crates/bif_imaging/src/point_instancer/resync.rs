//! Removal and resync of instancers.
//!
//! An edit at one path can reach instancers in three ways: the path is an
//! instancer (or a child rprim of one), it lies inside some instancer's
//! prototype, or it is the parent of nested instancers. Whatever is found
//! is then closed over parents and children, because a nested instancer
//! never outlives the instancer that populated it and an outer instancer
//! has to repopulate to recreate the inner one.

use std::collections::BTreeSet;

use bif_core::SdfPath;

use super::PointInstancerAdapter;
use crate::adapter::base;
use crate::delegate::ImagingDelegate;
use crate::index::IndexProxy;

impl PointInstancerAdapter {
    /// Every registered instancer affected by a change at `path`, sorted.
    pub(super) fn affected_instancers(&self, path: &SdfPath) -> BTreeSet<SdfPath> {
        let registry = &self.registry;
        let mut affected = BTreeSet::new();

        let own = if base::is_child_path(path) { path.parent() } else { path.clone() };
        if registry.contains(&own) {
            affected.insert(own.clone());
            affected.extend(registry.ancestors_of(&own));
        }
        affected.extend(registry.instancers_for_prototype(path));
        affected.extend(registry.children_of(path));

        let mut pending: Vec<SdfPath> = affected.iter().cloned().collect();
        while let Some(current) = pending.pop() {
            let reachable = registry
                .children_of(&current)
                .into_iter()
                .chain(registry.ancestors_of(&current));
            for next in reachable {
                if affected.insert(next.clone()) {
                    pending.push(next);
                }
            }
        }
        affected
    }

    /// Unload every instancer affected by `cache_path`, optionally asking
    /// for the outermost ones to be populated again.
    pub(super) fn process_instancer_removal(
        &self,
        delegate: &ImagingDelegate,
        cache_path: &SdfPath,
        index: &mut dyn IndexProxy,
        repopulate: bool,
    ) {
        let affected = self.affected_instancers(cache_path);
        if affected.is_empty() {
            log::debug!("No instancers affected by {}", cache_path);
            return;
        }
        log::debug!("Removing {} instancer(s) for {}", affected.len(), cache_path);

        // Outermost first, so nested instancers go down with their parents
        let mut ordered: Vec<(usize, SdfPath)> = affected
            .into_iter()
            .map(|path| (self.registry.ancestors_of(&path).len(), path))
            .collect();
        ordered.sort();

        let scene = delegate.scene();
        for (_, instancer) in &ordered {
            let Some(record) = self.registry.get(instancer) else {
                // Already unloaded along with an outer instancer
                continue;
            };
            let is_root = record.parent_instancer_path.is_empty();
            self.unload_instancer(delegate, instancer, index);

            if repopulate && is_root {
                let prim_path = instancer.prim_path();
                if scene.prim(&prim_path).is_some_and(|p| p.is_active) {
                    index.repopulate(&prim_path);
                }
            }
        }
    }

    /// Remove an instancer, its proto prims and every nested instancer
    /// below it from the registry and the index.
    ///
    /// Removal is bottom-up: an instancer leaves the index only after all
    /// of its proto prims, nested instancers included, are gone.
    pub(super) fn unload_instancer(&self, delegate: &ImagingDelegate, cache_path: &SdfPath, index: &mut dyn IndexProxy) {
        enum Step {
            Enter(SdfPath),
            Finish(SdfPath),
        }

        let mut pending = vec![Step::Enter(cache_path.clone())];
        while let Some(step) = pending.pop() {
            match step {
                Step::Enter(current) => {
                    let Some(record) = self.registry.remove(&current) else {
                        continue;
                    };
                    pending.push(Step::Finish(current));
                    for (proto_cache_path, proto) in record.proto_prims() {
                        if self.registry.contains(&proto_cache_path) {
                            pending.push(Step::Enter(proto_cache_path));
                        } else {
                            proto.adapter.process_prim_removal(delegate, &proto_cache_path, index);
                        }
                    }
                }
                Step::Finish(current) => {
                    index.remove_instancer(&current);
                    delegate.values().remove(&current);
                    log::debug!("Unloaded instancer {}", current);
                }
            }
        }
    }
}
