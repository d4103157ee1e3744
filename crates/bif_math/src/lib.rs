// Re-export glam for convenience
pub use glam::*;

// BIF math types
mod interval;
mod transform;
pub use interval::Interval;
pub use transform::{quat_to_real_first, Mat4Ext};
