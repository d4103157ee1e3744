//! Error types.

use bif_core::SdfPath;
use thiserror::Error;

/// Why an instancer could not be populated.
///
/// These never escape the adapter contract: population logs them and
/// produces no geometry for that instancer.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PopulateError {
    #[error("Prim {0} not found")]
    PrimNotFound(SdfPath),

    #[error("Prim {path} is a '{type_name}', expected {expected}")]
    WrongType {
        path: SdfPath,
        type_name: String,
        expected: &'static str,
    },

    #[error("Point instancer {0} has no prototypes")]
    NoPrototypes(SdfPath),

    #[error("Point instancer {0} has no protoIndices")]
    NoProtoIndices(SdfPath),

    #[error("Point instancer {0} has no positions")]
    NoPositions(SdfPath),
}

/// Errors loading an [`crate::ImagingConfig`].
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid shutter interval [{open}, {close}]")]
    InvalidShutter { open: f64, close: f64 },
}
