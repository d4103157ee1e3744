//! Helpers shared by every adapter.

use bif_core::{is_imageable_type, Interpolation, PrimInfo, SceneAccessor, SdfPath, TimeCode};
use bif_math::Mat4;

use crate::context::InstancerContext;
use crate::delegate::ImagingDelegate;
use crate::value_cache::PrimvarDescriptor;

pub const VISIBILITY: &str = "visibility";
pub const INVISIBLE: &str = "invisible";
pub const PURPOSE: &str = "purpose";
pub const MATERIAL_BINDING: &str = "material:binding";
pub const DRAW_MODE: &str = "model:drawMode";
pub const XFORM_OP_PREFIX: &str = "xformOp:";
pub const XFORM_OP_ORDER: &str = "xformOpOrder";
pub const PRIMVARS_PREFIX: &str = "primvars:";

/// Rprims synthesized by an instancer live at property-like child paths.
pub fn is_child_path(path: &SdfPath) -> bool {
    path.is_property_path()
}

/// The cache path for `usd_path`, as populated under `ctx`.
///
/// With a child name the prim becomes a child of the instancer's cache
/// path; otherwise it keeps its own path. Every adapter resolves cache
/// paths through here so lookups agree across adapters.
pub fn resolve_cache_path(usd_path: &SdfPath, ctx: Option<&InstancerContext>) -> SdfPath {
    match ctx {
        Some(ctx) if !ctx.child_name.is_empty() => ctx.instancer_cache_path.append_property(&ctx.child_name),
        _ => usd_path.clone(),
    }
}

/// Ancestors of `path` starting at `path`, excluding the pseudo-root.
fn prim_ancestors(path: &SdfPath) -> impl Iterator<Item = SdfPath> {
    path.ancestors().take_while(|p| !p.is_absolute_root())
}

/// Local-to-world transform of `prim`, stopping at a prim that resets the
/// xform stack.
pub fn compute_transform(delegate: &ImagingDelegate, prim: &SdfPath, time: TimeCode, ignore_root: bool) -> Mat4 {
    let scene = delegate.scene();
    let mut world = Mat4::IDENTITY;
    for path in prim_ancestors(prim) {
        let local = scene.local_transform(&path, time);
        world = local.matrix * world;
        if local.resets_xform_stack {
            break;
        }
    }
    if ignore_root {
        world
    } else {
        delegate.root_transform() * world
    }
}

/// Inherited visibility: false if any ancestor is invisible or invised.
pub fn compute_visibility(delegate: &ImagingDelegate, prim: &SdfPath, time: TimeCode) -> bool {
    if delegate.is_in_invised_paths(prim) {
        return false;
    }
    let scene = delegate.scene();
    !prim_ancestors(prim).any(|p| scene.token(&p, VISIBILITY, time).as_deref() == Some(INVISIBLE))
}

/// Whether `attr` might vary over time, on `prim` or, if `inherited`, on any ancestor.
pub fn is_varying(delegate: &ImagingDelegate, prim: &SdfPath, attr: &str, inherited: bool) -> bool {
    let scene = delegate.scene();
    if !inherited {
        return scene.attribute_might_be_time_varying(prim, attr);
    }
    prim_ancestors(prim).any(|p| scene.attribute_might_be_time_varying(&p, attr))
}

/// Whether the composed transform of `prim` might vary. Ancestors above a
/// prim that resets the xform stack do not contribute.
pub fn is_transform_varying(delegate: &ImagingDelegate, prim: &SdfPath) -> bool {
    let scene = delegate.scene();
    for path in prim_ancestors(prim) {
        if scene.transform_might_be_time_varying(&path) {
            return true;
        }
        if scene.local_transform(&path, TimeCode::Default).resets_xform_stack {
            break;
        }
    }
    false
}

/// Replace a descriptor with the same name, or append a new one.
pub fn merge_primvar(primvars: &mut Vec<PrimvarDescriptor>, name: &str, interpolation: Interpolation) {
    match primvars.iter_mut().find(|p| p.name == name) {
        Some(existing) => existing.interpolation = interpolation,
        None => primvars.push(PrimvarDescriptor::new(name, interpolation)),
    }
}

/// Typed prims that cannot produce imageable output are skipped with their subtree.
pub fn should_cull_subtree(delegate: &ImagingDelegate, prim: &PrimInfo) -> bool {
    delegate.config().cull_non_imageable && !prim.type_name.is_empty() && !is_imageable_type(&prim.type_name)
}

/// The root-level prim containing `path`. Prototype roots always live there.
pub fn root_prim(path: &SdfPath) -> Option<SdfPath> {
    path.prim_names()
        .first()
        .map(|name| SdfPath::absolute_root().append_child(name))
}

/// Fold a chain of native-instance hops back into one scene path.
///
/// `chain` is innermost first: a prototype-local path, then for each native
/// instance crossed the path of the instance prim that led there. Each hop
/// replaces the enclosing prototype root, producing an instance proxy path.
pub fn prim_path_from_instancer_chain(chain: &[SdfPath]) -> SdfPath {
    let Some((first, hops)) = chain.split_first() else {
        return SdfPath::empty();
    };
    let mut path = first.clone();
    for hop in hops {
        let Some(prototype) = root_prim(&path) else {
            break;
        };
        if let Some(replaced) = path.replace_prefix(&prototype, hop) {
            path = replaced;
        }
    }
    path
}

/// First target of the nearest `material:binding`.
pub fn material_path(scene: &dyn SceneAccessor, prim: &SdfPath) -> Option<SdfPath> {
    prim_ancestors(prim).find_map(|p| {
        scene
            .relationship_targets(&p, MATERIAL_BINDING)
            .and_then(|targets| targets.into_iter().next())
    })
}

/// The nearest authored purpose.
pub fn inheritable_purpose(scene: &dyn SceneAccessor, prim: &SdfPath) -> Option<String> {
    prim_ancestors(prim).find_map(|p| scene.token(&p, PURPOSE, TimeCode::Default))
}

pub fn model_draw_mode(scene: &dyn SceneAccessor, prim: &PrimInfo) -> Option<String> {
    if !prim.is_model {
        return None;
    }
    scene.token(&prim.path, DRAW_MODE, TimeCode::Default)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use bif_core::{PrimSpec, Stage, XformOp};
    use bif_math::{Mat4Ext, Vec3};

    fn stage() -> Arc<Stage> {
        let stage = Stage::new();
        stage
            .define("/World", PrimSpec::new("Xform").with_translate(Vec3::new(1.0, 0.0, 0.0)))
            .unwrap();
        stage
            .define(
                "/World/Group",
                PrimSpec::new("Xform")
                    .with_translate(Vec3::new(0.0, 2.0, 0.0))
                    .with_attribute(VISIBILITY, INVISIBLE),
            )
            .unwrap();
        stage
            .define("/World/Group/Mesh", PrimSpec::new("Mesh"))
            .unwrap();
        stage
            .define(
                "/World/Reset",
                PrimSpec::new("Mesh")
                    .with_translate(Vec3::new(0.0, 0.0, 3.0))
                    .resetting_xform_stack(),
            )
            .unwrap();
        stage
            .define("/World/Material", PrimSpec::new("Material"))
            .unwrap();
        Arc::new(stage)
    }

    #[test]
    fn test_compute_transform_composes_ancestors() {
        let delegate = ImagingDelegate::new(stage());
        let xf = compute_transform(&delegate, &"/World/Group/Mesh".into(), TimeCode::Default, true);
        let p = xf.transform_point3(Vec3::ZERO);
        assert!((p - Vec3::new(1.0, 2.0, 0.0)).length() < 1e-5);
    }

    #[test]
    fn test_compute_transform_applies_root() {
        let delegate = ImagingDelegate::new(stage());
        delegate.set_root_transform(Mat4::from_translation(Vec3::new(0.0, 0.0, 10.0)));

        let with_root = compute_transform(&delegate, &"/World".into(), TimeCode::Default, false);
        let without = compute_transform(&delegate, &"/World".into(), TimeCode::Default, true);
        assert!((with_root.transform_point3(Vec3::ZERO) - Vec3::new(1.0, 0.0, 10.0)).length() < 1e-5);
        assert!((without.transform_point3(Vec3::ZERO) - Vec3::new(1.0, 0.0, 0.0)).length() < 1e-5);
    }

    #[test]
    fn test_reset_xform_stack_stops_composition() {
        let delegate = ImagingDelegate::new(stage());
        let xf = compute_transform(&delegate, &"/World/Reset".into(), TimeCode::Default, true);
        assert!((xf.transform_point3(Vec3::ZERO) - Vec3::new(0.0, 0.0, 3.0)).length() < 1e-5);
    }

    #[test]
    fn test_visibility_is_inherited() {
        let delegate = ImagingDelegate::new(stage());
        assert!(!compute_visibility(&delegate, &"/World/Group/Mesh".into(), TimeCode::Default));
        assert!(compute_visibility(&delegate, &"/World/Reset".into(), TimeCode::Default));

        delegate.set_invised_paths(vec![SdfPath::new("/World/Reset")]);
        assert!(!compute_visibility(&delegate, &"/World/Reset".into(), TimeCode::Default));
    }

    #[test]
    fn test_transform_variability_stops_at_reset() {
        let stage = stage();
        stage
            .define(
                "/Anim",
                PrimSpec::new("Xform")
                    .with_xform_sample(1.0, vec![XformOp::Translate(Vec3::ZERO)])
                    .with_xform_sample(2.0, vec![XformOp::Translate(Vec3::X)]),
            )
            .unwrap();
        stage.define("/Anim/Child", PrimSpec::new("Mesh")).unwrap();
        stage
            .define("/Anim/Pinned", PrimSpec::new("Mesh").resetting_xform_stack())
            .unwrap();
        let delegate = ImagingDelegate::new(stage);

        assert!(is_transform_varying(&delegate, &"/Anim/Child".into()));
        assert!(!is_transform_varying(&delegate, &"/Anim/Pinned".into()));
        assert!(!is_transform_varying(&delegate, &"/World/Group/Mesh".into()));
    }

    #[test]
    fn test_resolve_cache_path() {
        let usd = SdfPath::new("/PI/Protos/Mesh");
        assert_eq!(resolve_cache_path(&usd, None), usd);

        let ctx = InstancerContext::new("/PI".into()).with_child_name("proto0_Mesh_id0");
        assert_eq!(resolve_cache_path(&usd, Some(&ctx)), SdfPath::new("/PI.proto0_Mesh_id0"));

        let unnamed = InstancerContext::new("/PI".into());
        assert_eq!(resolve_cache_path(&usd, Some(&unnamed)), usd);
    }

    #[test]
    fn test_prim_path_from_instancer_chain() {
        let single = [SdfPath::new("/PI/Protos/Mesh")];
        assert_eq!(prim_path_from_instancer_chain(&single), single[0]);

        let chain = [
            SdfPath::new("/__Prototype_2/cube"),
            SdfPath::new("/__Prototype_1/Inner"),
            SdfPath::new("/PI/Outer"),
        ];
        assert_eq!(
            prim_path_from_instancer_chain(&chain),
            SdfPath::new("/PI/Outer/Inner/cube")
        );
        assert!(prim_path_from_instancer_chain(&[]).is_empty());
    }

    #[test]
    fn test_merge_primvar_replaces_by_name() {
        let mut primvars = Vec::new();
        merge_primvar(&mut primvars, "displayColor", Interpolation::Constant);
        merge_primvar(&mut primvars, "points", Interpolation::Vertex);
        merge_primvar(&mut primvars, "displayColor", Interpolation::Instance);

        assert_eq!(primvars.len(), 2);
        assert_eq!(primvars[0].interpolation, Interpolation::Instance);
    }

    #[test]
    fn test_cull_non_imageable() {
        let delegate = ImagingDelegate::new(stage());
        let scene = delegate.scene();
        let material = scene.prim(&"/World/Material".into()).unwrap();
        let group = scene.prim(&"/World/Group".into()).unwrap();
        assert!(should_cull_subtree(&delegate, &material));
        assert!(!should_cull_subtree(&delegate, &group));
    }

    #[test]
    fn test_identity_when_nothing_authored() {
        let delegate = ImagingDelegate::new(stage());
        let xf = compute_transform(&delegate, &"/World/Material".into(), TimeCode::Default, false);
        assert!((xf * Mat4::from_translation(Vec3::new(-1.0, 0.0, 0.0))).is_identity_approx(1e-6));
    }
}
