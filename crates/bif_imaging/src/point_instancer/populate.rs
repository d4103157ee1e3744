//! Instancer population and prototype traversal.

use bif_core::{PrimInfo, SceneAccessor, SdfPath};

use super::record::{InstancerRecord, ProtoPrimRecord};
use super::{PointInstancerAdapter, POINT_INSTANCER, POSITIONS, PROTOTYPES, PROTO_INDICES};
use crate::adapter::base;
use crate::context::InstancerContext;
use crate::delegate::ImagingDelegate;
use crate::dirty::DirtyBits;
use crate::error::PopulateError;
use crate::index::IndexProxy;
use crate::prim_range::PrimRange;

fn advance(stack: &mut [PrimRange], scene: &dyn SceneAccessor, prune_children: bool) {
    if let Some(range) = stack.last_mut() {
        range.advance(scene, prune_children);
    }
}

impl PointInstancerAdapter {
    /// Check that `prim` describes a well-formed instancer and return its prototypes.
    fn validate(&self, delegate: &ImagingDelegate, prim: &PrimInfo) -> Result<Vec<SdfPath>, PopulateError> {
        let scene = delegate.scene();
        if !scene.exists(&prim.path) {
            return Err(PopulateError::PrimNotFound(prim.path.clone()));
        }
        if !prim.is_a(POINT_INSTANCER) {
            return Err(PopulateError::WrongType {
                path: prim.path.clone(),
                type_name: prim.type_name.clone(),
                expected: POINT_INSTANCER,
            });
        }
        let prototypes = scene
            .relationship_targets(&prim.path, PROTOTYPES)
            .filter(|targets| !targets.is_empty())
            .ok_or_else(|| PopulateError::NoPrototypes(prim.path.clone()))?;
        if !scene.has_authored_value(&prim.path, PROTO_INDICES) {
            return Err(PopulateError::NoProtoIndices(prim.path.clone()));
        }
        if !scene.has_authored_value(&prim.path, POSITIONS) {
            return Err(PopulateError::NoPositions(prim.path.clone()));
        }
        Ok(prototypes)
    }

    pub(super) fn populate_instancer(
        &self,
        delegate: &ImagingDelegate,
        prim: &PrimInfo,
        index: &mut dyn IndexProxy,
        ctx: Option<&InstancerContext>,
    ) -> Result<SdfPath, PopulateError> {
        let prototypes = self.validate(delegate, prim)?;
        let parent = ctx
            .map(|c| c.instancer_cache_path.clone())
            .unwrap_or_default();

        let record = self
            .registry
            .reserve(&prim.path, &prim.path, &parent, prototypes);
        let cache_path = record.cache_path.clone();
        if cache_path != prim.path {
            log::debug!("{} already populated, using {}", prim.path, cache_path);
        }
        let owner = ctx
            .and_then(|c| c.instancer_adapter.clone())
            .or_else(|| delegate.adapter_for(prim));
        index.insert_instancer(&cache_path, &parent, &prim.path, owner);

        // Prims under this instancer report back to it
        let proto_ctx = InstancerContext::new(cache_path.clone()).with_adapter(delegate.adapter_for(prim));
        let scene = delegate.scene();
        for (slot, proto_path) in record.prototype_paths.iter().enumerate() {
            let Some(proto_root) = scene.prim(proto_path) else {
                log::warn!("Targeted prototype was not found <{}> for {}", proto_path, prim.path);
                continue;
            };
            self.populate_prototype(delegate, slot, &record, &proto_root, index, &proto_ctx);
        }

        record.mark_initialized();
        index.mark_instancer_dirty(&cache_path, DirtyBits::INSTANCER_INITIAL);
        log::info!(
            "Populated instancer {} ({} prototypes, {} prototype prims)",
            cache_path,
            record.prototype_paths.len(),
            record.proto_prim_count()
        );
        Ok(cache_path)
    }

    /// Walk one prototype, populating a render prim for every leaf.
    ///
    /// The walk keeps one range per native instance crossed. The chain of
    /// their current prims, innermost first, is what gets recorded for
    /// each leaf.
    fn populate_prototype(
        &self,
        delegate: &ImagingDelegate,
        slot: usize,
        record: &InstancerRecord,
        proto_root: &PrimInfo,
        index: &mut dyn IndexProxy,
        ctx: &InstancerContext,
    ) {
        let scene = delegate.scene();
        let ancestry = self.registry.usd_ancestry(&record.cache_path);
        let mut proto_id = 0usize;
        let mut prim_count = 0usize;
        let mut instantiated = 0usize;

        let mut stack = vec![PrimRange::new(scene, proto_root.path.clone())];
        loop {
            let Some(top) = stack.last() else {
                break;
            };
            let Some(current) = top.current().cloned() else {
                stack.pop();
                // The outer range is still parked on the instance that led here
                advance(&mut stack, scene, true);
                continue;
            };
            let Some(prim) = scene.prim(&current) else {
                advance(&mut stack, scene, false);
                continue;
            };

            if prim.is_instance {
                if let Some(prototype) = &prim.prototype {
                    index.add_dependency(&ctx.instancer_cache_path, &current);
                    stack.push(PrimRange::new(scene, prototype.clone()));
                    continue;
                }
            }

            let chain: Vec<SdfPath> = stack
                .iter()
                .rev()
                .filter_map(|range| range.current().cloned())
                .collect();
            let proxy_path = base::prim_path_from_instancer_chain(&chain);
            let Some(proxy) = scene.prim(&proxy_path) else {
                advance(&mut stack, scene, false);
                continue;
            };
            if base::should_cull_subtree(delegate, &proxy) {
                log::debug!("Culling subtree at {}", proxy_path);
                advance(&mut stack, scene, true);
                continue;
            }

            let adapter = delegate.adapter_for(&proxy);
            if proxy.is_instance && adapter.as_ref().is_some_and(|a| !a.can_populate_usd_instance()) {
                log::warn!(
                    "The gprim at path <{}> was directly instanced. In order to instance this prim, \
                     put the prim under an Xform, and instance the Xform parent.",
                    proxy_path
                );
                advance(&mut stack, scene, false);
                continue;
            }
            let Some(adapter) = adapter else {
                advance(&mut stack, scene, false);
                continue;
            };
            prim_count += 1;

            let populated = if adapter.is_instancer_adapter() {
                if ancestry.contains(&prim.path) {
                    log::warn!("Instancer cycle at <{}> under {}, skipping", prim.path, record.cache_path);
                    advance(&mut stack, scene, true);
                    continue;
                }
                let nested_ctx = InstancerContext {
                    instancer_cache_path: ctx.instancer_cache_path.clone(),
                    child_name: ctx.child_name.clone(),
                    instancer_material_usd_path: ctx.instancer_material_usd_path.clone(),
                    instance_draw_mode: ctx.instance_draw_mode.clone(),
                    instance_inheritable_purpose: ctx.instance_inheritable_purpose.clone(),
                    instancer_adapter: None,
                };
                adapter.populate(delegate, &prim, index, Some(&nested_ctx))
            } else {
                let child_name = format!("proto{}_{}_id{}", slot, prim.path.name(), proto_id);
                proto_id += 1;
                // Prototype roots carry no opinions; populate from the instance
                let populate_prim = if prim.is_prototype && chain.len() > 1 {
                    scene.prim(&chain[1])
                } else {
                    Some(prim.clone())
                };
                match populate_prim {
                    Some(populate_prim) => {
                        let leaf_ctx = InstancerContext {
                            instancer_cache_path: ctx.instancer_cache_path.clone(),
                            child_name,
                            instancer_material_usd_path: base::material_path(scene, &populate_prim.path),
                            instance_draw_mode: base::model_draw_mode(scene, &proxy),
                            instance_inheritable_purpose: base::inheritable_purpose(scene, &proxy_path),
                            instancer_adapter: ctx.instancer_adapter.clone(),
                        };
                        adapter.populate(delegate, &populate_prim, index, Some(&leaf_ctx))
                    }
                    None => None,
                }
            };

            let prune = adapter.should_cull_children();
            if let Some(cache_path) = populated {
                let proto_root_path = record.prototype_paths[slot].clone();
                record.add_proto_prim(cache_path, ProtoPrimRecord::new(chain, adapter, proto_root_path));
                instantiated += 1;
            }
            advance(&mut stack, scene, prune);
        }

        log::debug!(
            "Prototype[{}]: <{}>, primCount: {}, instantiatedPrimCount: {}",
            slot,
            proto_root.path,
            prim_count,
            instantiated
        );
    }
}
