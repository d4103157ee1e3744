//! In-memory stage.
//!
//! A small composed-scene store that implements [`SceneAccessor`]. It knows
//! about native instancing: a prim marked `instance_of` a prototype exposes
//! that prototype's children as instance proxies under its own path.
//! Prototype roots are defined with [`Stage::define_prototype`] and are not
//! children of the pseudo-root.

use std::collections::{BTreeSet, HashMap};

use bif_math::{Interval, Vec3};
use parking_lot::RwLock;
use thiserror::Error;

use crate::accessor::{Interpolation, LocalTransform, PrimInfo, PrimvarInfo, SceneAccessor};
use crate::time::Sampled;
use crate::xform::{compose_xform_ops, XformOp};
use crate::{PathError, SdfPath, TimeCode, Value};

/// Errors from stage edits.
#[derive(Error, Debug)]
pub enum StageError {
    #[error("Invalid path: {0}")]
    Path(#[from] PathError),

    #[error("Parent of {0} is not defined")]
    ParentNotFound(SdfPath),

    #[error("Prim already defined at {0}")]
    AlreadyDefined(SdfPath),

    #[error("No prim at {0}")]
    NotFound(SdfPath),
}

pub type StageResult<T> = Result<T, StageError>;

#[derive(Clone, Debug, Default)]
struct Attribute {
    value: Sampled<Value>,
    interpolation: Option<Interpolation>,
}

/// Authored opinions for one prim.
#[derive(Clone, Debug)]
pub struct PrimSpec {
    type_name: String,
    active: bool,
    loaded: bool,
    model: bool,
    instance_of: Option<SdfPath>,
    resets_xform_stack: bool,
    xform: Sampled<Vec<XformOp>>,
    attributes: HashMap<String, Attribute>,
    relationships: HashMap<String, Vec<SdfPath>>,
    children: Vec<String>,
}

impl Default for PrimSpec {
    fn default() -> Self {
        Self {
            type_name: String::new(),
            active: true,
            loaded: true,
            model: false,
            instance_of: None,
            resets_xform_stack: false,
            xform: Sampled::default(),
            attributes: HashMap::new(),
            relationships: HashMap::new(),
            children: Vec::new(),
        }
    }
}

impl PrimSpec {
    /// A typed prim spec. Pass an empty type name for a typeless prim.
    pub fn new(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            ..Default::default()
        }
    }

    pub fn with_attribute(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.attributes
            .entry(name.to_string())
            .or_default()
            .value
            .set_default(value.into());
        self
    }

    pub fn with_time_sample(mut self, name: &str, time: f64, value: impl Into<Value>) -> Self {
        self.attributes
            .entry(name.to_string())
            .or_default()
            .value
            .set_sample(time, value.into());
        self
    }

    /// Author `primvars:<name>` with an interpolation.
    pub fn with_primvar(mut self, name: &str, interpolation: Interpolation, value: impl Into<Value>) -> Self {
        let attr = self.attributes.entry(format!("primvars:{}", name)).or_default();
        attr.value.set_default(value.into());
        attr.interpolation = Some(interpolation);
        self
    }

    pub fn with_relationship(mut self, name: &str, targets: &[&str]) -> Self {
        self.relationships
            .insert(name.to_string(), targets.iter().map(|t| SdfPath::new(*t)).collect());
        self
    }

    pub fn with_xform_ops(mut self, ops: Vec<XformOp>) -> Self {
        self.xform.set_default(ops);
        self
    }

    pub fn with_translate(self, translation: Vec3) -> Self {
        self.with_xform_ops(vec![XformOp::Translate(translation)])
    }

    pub fn with_xform_sample(mut self, time: f64, ops: Vec<XformOp>) -> Self {
        self.xform.set_sample(time, ops);
        self
    }

    pub fn resetting_xform_stack(mut self) -> Self {
        self.resets_xform_stack = true;
        self
    }

    pub fn inactive(mut self) -> Self {
        self.active = false;
        self
    }

    pub fn unloaded(mut self) -> Self {
        self.loaded = false;
        self
    }

    pub fn as_model(mut self) -> Self {
        self.model = true;
        self
    }

    /// Make this prim a native instance of a prototype root.
    pub fn instance_of(mut self, prototype: &str) -> Self {
        self.instance_of = Some(SdfPath::new(prototype));
        self
    }
}

/// Where a (possibly proxy) path lands in the authored data.
struct Resolved {
    spec_path: SdfPath,
    is_proxy: bool,
}

#[derive(Debug)]
struct StageData {
    prims: HashMap<SdfPath, PrimSpec>,
    prototypes: BTreeSet<SdfPath>,
}

/// A thread-safe in-memory stage.
#[derive(Debug)]
pub struct Stage {
    data: RwLock<StageData>,
}

impl Default for Stage {
    fn default() -> Self {
        Self::new()
    }
}

impl Stage {
    pub fn new() -> Self {
        let mut prims = HashMap::new();
        prims.insert(SdfPath::absolute_root(), PrimSpec::default());
        Self {
            data: RwLock::new(StageData {
                prims,
                prototypes: BTreeSet::new(),
            }),
        }
    }

    /// Define a prim under an existing parent.
    pub fn define(&self, path: &str, spec: PrimSpec) -> StageResult<SdfPath> {
        let path = SdfPath::parse(path)?;
        let parent = path.parent();
        let mut data = self.data.write();
        if data.prims.contains_key(&path) {
            return Err(StageError::AlreadyDefined(path));
        }
        let parent_spec = data
            .prims
            .get_mut(&parent)
            .ok_or_else(|| StageError::ParentNotFound(path.clone()))?;
        parent_spec.children.push(path.name().to_string());
        data.prims.insert(path.clone(), spec);
        Ok(path)
    }

    /// Define a prototype root. Prototypes live outside the pseudo-root's children.
    pub fn define_prototype(&self, path: &str) -> StageResult<SdfPath> {
        let path = SdfPath::parse(path)?;
        if path.parent() != SdfPath::absolute_root() {
            return Err(StageError::ParentNotFound(path));
        }
        let mut data = self.data.write();
        if data.prims.contains_key(&path) {
            return Err(StageError::AlreadyDefined(path));
        }
        data.prims.insert(path.clone(), PrimSpec::default());
        data.prototypes.insert(path.clone());
        Ok(path)
    }

    pub fn set_attribute(&self, path: &SdfPath, name: &str, value: impl Into<Value>) -> StageResult<()> {
        self.edit(path, |spec| {
            spec.attributes
                .entry(name.to_string())
                .or_default()
                .value = Sampled::from_default(value.into());
        })
    }

    pub fn set_time_sample(&self, path: &SdfPath, name: &str, time: f64, value: impl Into<Value>) -> StageResult<()> {
        self.edit(path, |spec| {
            spec.attributes
                .entry(name.to_string())
                .or_default()
                .value
                .set_sample(time, value.into());
        })
    }

    pub fn set_xform_ops(&self, path: &SdfPath, ops: Vec<XformOp>) -> StageResult<()> {
        self.edit(path, |spec| spec.xform = Sampled::from_default(ops))
    }

    pub fn set_active(&self, path: &SdfPath, active: bool) -> StageResult<()> {
        self.edit(path, |spec| spec.active = active)
    }

    /// Remove a prim and everything beneath it.
    pub fn remove(&self, path: &SdfPath) -> StageResult<()> {
        let mut data = self.data.write();
        if !data.prims.contains_key(path) {
            return Err(StageError::NotFound(path.clone()));
        }
        let before = data.prims.len();
        data.prims.retain(|p, _| !p.has_prefix(path));
        data.prototypes.retain(|p| !p.has_prefix(path));
        log::debug!("Removed {} prims under {}", before - data.prims.len(), path);
        let name = path.name().to_string();
        if let Some(parent) = data.prims.get_mut(&path.parent()) {
            parent.children.retain(|c| *c != name);
        }
        Ok(())
    }

    pub fn prim_count(&self) -> usize {
        // The pseudo-root is not a prim
        self.data.read().prims.len() - 1
    }

    fn edit(&self, path: &SdfPath, f: impl FnOnce(&mut PrimSpec)) -> StageResult<()> {
        let mut data = self.data.write();
        let spec = data
            .prims
            .get_mut(path)
            .ok_or_else(|| StageError::NotFound(path.clone()))?;
        f(spec);
        Ok(())
    }

    fn resolve(data: &StageData, path: &SdfPath) -> Option<Resolved> {
        if path.is_empty() || *path != path.prim_path() {
            return None;
        }
        let names = path.prim_names();
        let mut current = SdfPath::absolute_root();
        let mut is_proxy = false;
        for (i, name) in names.iter().enumerate() {
            current = current.append_child(name);
            let spec = data.prims.get(&current)?;
            if i + 1 < names.len() {
                if !spec.active {
                    return None;
                }
                if let Some(prototype) = &spec.instance_of {
                    current = prototype.clone();
                    is_proxy = true;
                }
            }
        }
        Some(Resolved {
            spec_path: current,
            is_proxy,
        })
    }

    fn with_spec<R>(&self, path: &SdfPath, f: impl FnOnce(&PrimSpec) -> R) -> Option<R> {
        let data = self.data.read();
        let resolved = Self::resolve(&data, path)?;
        data.prims.get(&resolved.spec_path).map(f)
    }

    fn with_attribute<R>(&self, path: &SdfPath, name: &str, f: impl FnOnce(&Attribute) -> R) -> Option<R> {
        self.with_spec(path, |spec| spec.attributes.get(name).map(f)).flatten()
    }
}

impl SceneAccessor for Stage {
    fn prim(&self, path: &SdfPath) -> Option<PrimInfo> {
        let data = self.data.read();
        let resolved = Self::resolve(&data, path)?;
        let spec = data.prims.get(&resolved.spec_path)?;
        let in_prototype = data.prototypes.iter().any(|p| path.has_prefix(p));
        Some(PrimInfo {
            path: path.clone(),
            type_name: spec.type_name.clone(),
            is_active: spec.active,
            is_loaded: spec.loaded,
            is_model: spec.model,
            is_instance: spec.instance_of.is_some(),
            is_prototype: !resolved.is_proxy && data.prototypes.contains(path),
            is_in_prototype: in_prototype,
            is_instance_proxy: resolved.is_proxy,
            prototype: spec.instance_of.clone(),
            prim_in_prototype: resolved.is_proxy.then(|| resolved.spec_path.clone()),
        })
    }

    fn children(&self, path: &SdfPath) -> Vec<SdfPath> {
        let data = self.data.read();
        let Some(resolved) = Self::resolve(&data, path) else {
            return Vec::new();
        };
        let Some(spec) = data.prims.get(&resolved.spec_path) else {
            return Vec::new();
        };
        // Instance contents come from the prototype
        let (source, names) = match &spec.instance_of {
            Some(prototype) => match data.prims.get(prototype) {
                Some(proto_spec) => (prototype.clone(), &proto_spec.children),
                None => return Vec::new(),
            },
            None => (resolved.spec_path.clone(), &spec.children),
        };
        names
            .iter()
            .filter(|name| {
                data.prims
                    .get(&source.append_child(name))
                    .is_some_and(|child| child.active && child.loaded)
            })
            .map(|name| path.append_child(name))
            .collect()
    }

    fn attribute(&self, path: &SdfPath, name: &str, time: TimeCode) -> Option<Value> {
        self.with_attribute(path, name, |attr| attr.value.get(time).cloned())
            .flatten()
    }

    fn has_authored_value(&self, path: &SdfPath, name: &str) -> bool {
        self.with_attribute(path, name, |attr| attr.value.has_value())
            .unwrap_or(false)
    }

    fn attribute_might_be_time_varying(&self, path: &SdfPath, name: &str) -> bool {
        self.with_attribute(path, name, |attr| attr.value.might_be_time_varying())
            .unwrap_or(false)
    }

    fn attribute_time_samples(&self, path: &SdfPath, name: &str, interval: Interval) -> Vec<f64> {
        self.with_attribute(path, name, |attr| attr.value.sample_times_in(interval))
            .unwrap_or_default()
    }

    fn relationship_targets(&self, path: &SdfPath, name: &str) -> Option<Vec<SdfPath>> {
        self.with_spec(path, |spec| spec.relationships.get(name).cloned())
            .flatten()
    }

    fn primvars(&self, path: &SdfPath) -> Vec<PrimvarInfo> {
        self.with_spec(path, |spec| {
            let mut primvars: Vec<PrimvarInfo> = spec
                .attributes
                .iter()
                .filter_map(|(name, attr)| {
                    let short = name.strip_prefix("primvars:")?;
                    Some(PrimvarInfo {
                        name: short.to_string(),
                        interpolation: attr.interpolation.unwrap_or(Interpolation::Constant),
                        might_be_time_varying: attr.value.might_be_time_varying(),
                    })
                })
                .collect();
            primvars.sort_by(|a, b| a.name.cmp(&b.name));
            primvars
        })
        .unwrap_or_default()
    }

    fn local_transform(&self, path: &SdfPath, time: TimeCode) -> LocalTransform {
        self.with_spec(path, |spec| LocalTransform {
            matrix: spec
                .xform
                .get(time)
                .map(|ops| compose_xform_ops(ops))
                .unwrap_or_default(),
            resets_xform_stack: spec.resets_xform_stack,
        })
        .unwrap_or_default()
    }

    fn transform_might_be_time_varying(&self, path: &SdfPath) -> bool {
        self.with_spec(path, |spec| spec.xform.might_be_time_varying())
            .unwrap_or(false)
    }

    fn transform_time_samples(&self, path: &SdfPath, interval: Interval) -> Vec<f64> {
        self.with_spec(path, |spec| spec.xform.sample_times_in(interval))
            .unwrap_or_default()
    }
}
