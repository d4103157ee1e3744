//! Delegate configuration.

use std::path::Path;

use bif_math::{Interval, Mat4};
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Settings for an [`crate::ImagingDelegate`], loadable from JSON.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImagingConfig {
    /// Column-major root transform applied to the whole scene
    pub root_transform: [f32; 16],

    /// Motion-sample window start, relative to the current time
    pub shutter_open: f64,

    /// Motion-sample window end, relative to the current time
    pub shutter_close: f64,

    /// Upper bound for transform samples per instancer
    pub max_transform_samples: usize,

    /// Skip subtrees under typed, non-imageable prims
    pub cull_non_imageable: bool,

    /// Time used to evaluate values found to be static
    pub variability_time: f64,
}

impl Default for ImagingConfig {
    fn default() -> Self {
        Self {
            root_transform: Mat4::IDENTITY.to_cols_array(),
            shutter_open: 0.0,
            shutter_close: 0.0,
            max_transform_samples: 4,
            cull_non_imageable: true,
            variability_time: 1.0,
        }
    }
}

impl ImagingConfig {
    pub fn from_json_str(text: &str) -> Result<Self, ConfigError> {
        let config: ImagingConfig = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path.as_ref())?;
        let config = Self::from_json_str(&text)?;
        log::info!("Loaded imaging config from {}", path.as_ref().display());
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.shutter_open > self.shutter_close {
            return Err(ConfigError::InvalidShutter {
                open: self.shutter_open,
                close: self.shutter_close,
            });
        }
        Ok(())
    }

    pub fn root_transform(&self) -> Mat4 {
        Mat4::from_cols_array(&self.root_transform)
    }

    /// Absolute motion-sample window around `time`.
    pub fn sampling_interval(&self, time: f64) -> Interval {
        Interval::new(self.shutter_open, self.shutter_close).add_scalar(time)
    }
}
