//! BIF Core - Scene description types for the imaging pipeline.
//!
//! This crate provides:
//!
//! - **Paths and time**: `SdfPath`, `TimeCode`, time-sampled values
//! - **Scene access**: the read-only `SceneAccessor` trait
//! - **In-memory stage**: `Stage`, with native instancing and instance proxies
//!
//! # Example
//!
//! ```ignore
//! use bif_core::{PrimSpec, SceneAccessor, SdfPath, Stage};
//!
//! let stage = Stage::new();
//! stage.define("/World", PrimSpec::new("Xform"))?;
//! stage.define("/World/Mesh", PrimSpec::new("Mesh"))?;
//! assert!(stage.exists(&SdfPath::new("/World/Mesh")));
//! ```

pub mod accessor;
pub mod path;
pub mod stage;
pub mod time;
pub mod value;
pub mod xform;

// Re-export commonly used types
pub use accessor::{
    is_imageable_type, Interpolation, LocalTransform, PrimInfo, PrimvarInfo, SceneAccessor,
};
pub use path::{PathError, SdfPath};
pub use stage::{PrimSpec, Stage, StageError, StageResult};
pub use time::{Sampled, TimeCode};
pub use value::Value;
pub use xform::{compose_xform_ops, XformOp};
