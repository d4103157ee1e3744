//! Resumable pre-order prim traversal.

use bif_core::{SceneAccessor, SdfPath};

/// A depth-first walk over one subtree, driven one prim at a time.
///
/// The caller looks at [`PrimRange::current`] and then calls
/// [`PrimRange::advance`], optionally pruning the current prim's children.
/// Ranges hold no borrows, so a stack of them can be paused and resumed
/// while the scene is queried in between.
#[derive(Clone, Debug)]
pub struct PrimRange {
    pending: Vec<SdfPath>,
    instance_proxies: bool,
}

impl PrimRange {
    /// A range over `root` and its descendants. Native instances are leaves.
    pub fn new(scene: &dyn SceneAccessor, root: SdfPath) -> Self {
        let visible = scene
            .prim(&root)
            .is_some_and(|p| p.is_active && p.is_loaded);
        Self {
            pending: if visible { vec![root] } else { Vec::new() },
            instance_proxies: false,
        }
    }

    /// Also descend into native instances through instance proxy paths.
    pub fn with_instance_proxies(mut self) -> Self {
        self.instance_proxies = true;
        self
    }

    pub fn current(&self) -> Option<&SdfPath> {
        self.pending.last()
    }

    pub fn is_done(&self) -> bool {
        self.pending.is_empty()
    }

    /// Step past the current prim, visiting its children next unless pruned.
    pub fn advance(&mut self, scene: &dyn SceneAccessor, prune_children: bool) {
        let Some(current) = self.pending.pop() else {
            return;
        };
        if prune_children {
            return;
        }
        if !self.instance_proxies && scene.prim(&current).is_some_and(|p| p.is_instance) {
            return;
        }
        let children = scene.children(&current);
        self.pending.extend(children.into_iter().rev());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bif_core::{PrimSpec, Stage};

    fn walk(stage: &Stage, mut range: PrimRange, prune: &[&str]) -> Vec<String> {
        let mut visited = Vec::new();
        while let Some(path) = range.current().cloned() {
            visited.push(path.to_string());
            let pruned = prune.contains(&path.as_str());
            range.advance(stage, pruned);
        }
        visited
    }

    fn stage() -> Stage {
        let stage = Stage::new();
        stage.define("/A", PrimSpec::new("Xform")).unwrap();
        stage.define("/A/B", PrimSpec::new("Xform")).unwrap();
        stage.define("/A/B/M", PrimSpec::new("Mesh")).unwrap();
        stage.define("/A/C", PrimSpec::new("Mesh")).unwrap();
        stage.define_prototype("/__Prototype_1").unwrap();
        stage.define("/__Prototype_1/P", PrimSpec::new("Mesh")).unwrap();
        stage
            .define("/A/I", PrimSpec::new("Xform").instance_of("/__Prototype_1"))
            .unwrap();
        stage
    }

    #[test]
    fn test_preorder() {
        let stage = stage();
        let range = PrimRange::new(&stage, SdfPath::new("/A"));
        assert_eq!(walk(&stage, range, &[]), vec!["/A", "/A/B", "/A/B/M", "/A/C", "/A/I"]);
    }

    #[test]
    fn test_prune_children() {
        let stage = stage();
        let range = PrimRange::new(&stage, SdfPath::new("/A"));
        assert_eq!(walk(&stage, range, &["/A/B"]), vec!["/A", "/A/B", "/A/C", "/A/I"]);
    }

    #[test]
    fn test_instance_proxies() {
        let stage = stage();
        let range = PrimRange::new(&stage, SdfPath::new("/A/I")).with_instance_proxies();
        assert_eq!(walk(&stage, range, &[]), vec!["/A/I", "/A/I/P"]);
    }

    #[test]
    fn test_missing_root_is_empty() {
        let stage = stage();
        let range = PrimRange::new(&stage, SdfPath::new("/Nope"));
        assert!(range.is_done());
    }
}
