//! BIF Imaging - Scene-to-render-index population and change tracking.
//!
//! This crate provides:
//!
//! - **Delegate**: `ImagingDelegate` populates a render index from a scene
//!   and keeps it current across time changes and scene edits
//! - **Adapters**: the `PrimAdapter` contract, plus gprim and point
//!   instancer adapters
//! - **Point instancing**: prototype population through nested instancers
//!   and native instances, instance indices, transforms, picking and
//!   selection
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use bif_core::{SdfPath, Stage, TimeCode};
//! use bif_imaging::{ImagingDelegate, RenderIndex};
//!
//! let stage = Arc::new(Stage::new());
//! let delegate = ImagingDelegate::new(stage);
//! let mut index = RenderIndex::new();
//! delegate.populate(&mut index, &SdfPath::absolute_root());
//! delegate.sync(&mut index, TimeCode::Time(1.0));
//! ```

pub mod adapter;
pub mod config;
pub mod context;
pub mod delegate;
pub mod dirty;
pub mod error;
pub mod index;
pub mod point_instancer;
pub mod prim_range;
pub mod selection;
pub mod value_cache;

// Re-export commonly used types
pub use adapter::{AdapterHandle, AdapterRegistry, GprimAdapter, InstanceIndexLookup, PrimAdapter};
pub use config::ImagingConfig;
pub use context::InstancerContext;
pub use delegate::ImagingDelegate;
pub use dirty::{DirtyBits, PropertyChange};
pub use error::{ConfigError, PopulateError};
pub use index::{IndexProxy, RenderIndex, RprimKind};
pub use point_instancer::{InstancerRecord, InstancerRegistry, PointInstancerAdapter, ProtoPrimRecord};
pub use selection::{HighlightMode, Selection};
pub use value_cache::{CachedValues, PrimvarDescriptor, ValueCache};
