//! Read-only access to a composed scene.
//!
//! Everything the imaging side knows about the scene goes through
//! [`SceneAccessor`]. Paths may address instance proxies (prims seen
//! through a native instance); implementations resolve them to the shared
//! prototype prim for attribute reads.

use crate::{SdfPath, TimeCode, Value};
use bif_math::{Interval, Mat4};

/// How a primvar's values map onto geometry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Interpolation {
    Constant,
    Uniform,
    Varying,
    Vertex,
    FaceVarying,
    Instance,
}

impl Interpolation {
    /// Constant and uniform primvars describe the whole prim, not its elements.
    pub fn is_per_prim(&self) -> bool {
        matches!(self, Interpolation::Constant | Interpolation::Uniform)
    }
}

/// A primvar authored on a prim.
#[derive(Clone, Debug, PartialEq)]
pub struct PrimvarInfo {
    /// Name without the `primvars:` namespace
    pub name: String,
    pub interpolation: Interpolation,
    pub might_be_time_varying: bool,
}

/// A prim's local transform at one time.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LocalTransform {
    pub matrix: Mat4,
    /// Ancestor transforms do not apply when set
    pub resets_xform_stack: bool,
}

impl Default for LocalTransform {
    fn default() -> Self {
        Self {
            matrix: Mat4::IDENTITY,
            resets_xform_stack: false,
        }
    }
}

/// Predicates and navigation for one prim.
#[derive(Clone, Debug, PartialEq)]
pub struct PrimInfo {
    pub path: SdfPath,
    /// Schema type name; empty for typeless prims
    pub type_name: String,
    pub is_active: bool,
    pub is_loaded: bool,
    pub is_model: bool,
    /// A native instance: its contents come from `prototype`
    pub is_instance: bool,
    /// The root of a shared native-instance prototype
    pub is_prototype: bool,
    /// The prototype root or a prim beneath it
    pub is_in_prototype: bool,
    /// A prim beneath an instance, addressed through the instance
    pub is_instance_proxy: bool,
    /// For instances, the prototype root they share
    pub prototype: Option<SdfPath>,
    /// For instance proxies, the prototype prim they stand for
    pub prim_in_prototype: Option<SdfPath>,
}

impl PrimInfo {
    pub fn is_a(&self, type_name: &str) -> bool {
        self.type_name == type_name
    }
}

/// Schema types that produce imageable output or group it.
const IMAGEABLE_TYPES: &[&str] = &[
    "Xform",
    "Scope",
    "Mesh",
    "BasisCurves",
    "NurbsCurves",
    "NurbsPatch",
    "Points",
    "PointInstancer",
    "Cube",
    "Sphere",
    "Cylinder",
    "Cone",
    "Capsule",
    "Camera",
    "Volume",
];

pub fn is_imageable_type(type_name: &str) -> bool {
    IMAGEABLE_TYPES.contains(&type_name)
}

/// Read-only scene queries.
pub trait SceneAccessor: Send + Sync {
    /// Look up a prim. Returns `None` when nothing is defined at `path`.
    fn prim(&self, path: &SdfPath) -> Option<PrimInfo>;

    /// Active, loaded children in authored order. Children of an instance
    /// are returned as instance proxy paths.
    fn children(&self, path: &SdfPath) -> Vec<SdfPath>;

    fn attribute(&self, path: &SdfPath, name: &str, time: TimeCode) -> Option<Value>;

    /// True when the attribute has a default or any time sample.
    fn has_authored_value(&self, path: &SdfPath, name: &str) -> bool;

    fn attribute_might_be_time_varying(&self, path: &SdfPath, name: &str) -> bool;

    fn attribute_time_samples(&self, path: &SdfPath, name: &str, interval: Interval) -> Vec<f64>;

    /// Forwarded relationship targets, or `None` if the relationship is not authored.
    fn relationship_targets(&self, path: &SdfPath, name: &str) -> Option<Vec<SdfPath>>;

    fn primvars(&self, path: &SdfPath) -> Vec<PrimvarInfo>;

    fn local_transform(&self, path: &SdfPath, time: TimeCode) -> LocalTransform;

    fn transform_might_be_time_varying(&self, path: &SdfPath) -> bool;

    fn transform_time_samples(&self, path: &SdfPath, interval: Interval) -> Vec<f64>;

    fn exists(&self, path: &SdfPath) -> bool {
        self.prim(path).is_some()
    }

    fn token(&self, path: &SdfPath, name: &str, time: TimeCode) -> Option<String> {
        self.attribute(path, name, time)
            .and_then(|v| v.as_token().map(str::to_string))
    }
}
