//! Engine and session configuration
//!
//! Defaults reproduce the constants the visualization has always used
//! (100 relaxation passes, a 30 mph projection speed). A YAML file can
//! override any subset of fields; CLI flags override the file.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Default ceiling on relaxation passes per source
pub const DEFAULT_MAX_PASSES: usize = 100;

/// Meters travelled per second of travel time when projecting isochronic
/// positions (30 mph)
pub const DEFAULT_METERS_PER_SECOND: f64 = 0.44704 * 30.0;

/// Mean Earth radius in meters
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Multiplier applied to the seconds-per-meter ratio before the square root
pub const DEFAULT_TRAFFIC_SCALE: f64 = 20.0;

/// Height (z) per unit of traffic ratio in traffic mode
pub const DEFAULT_HEIGHT_SCALE: f64 = 200.0;

/// Node radius used by the uniform display mode
pub const DEFAULT_BASE_RADIUS: f64 = 1.0;

/// Configuration for the engines and the display transform
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Ceiling on relaxation passes after a reset
    pub max_passes: usize,
    /// Calibration constant k: meters per unit of travel time
    pub meters_per_second: f64,
    /// Sphere radius used by bearing/destination math
    pub earth_radius_m: f64,
    /// Scale of the traffic ratio
    pub traffic_scale: f64,
    /// Traffic mode height scale
    pub height_scale: f64,
    /// Radius for the uniform mode
    pub base_radius: f64,
    /// Ramp distortion over several passes instead of jumping to convergence
    pub transition: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_passes: DEFAULT_MAX_PASSES,
            meters_per_second: DEFAULT_METERS_PER_SECOND,
            earth_radius_m: EARTH_RADIUS_M,
            traffic_scale: DEFAULT_TRAFFIC_SCALE,
            height_scale: DEFAULT_HEIGHT_SCALE,
            base_radius: DEFAULT_BASE_RADIUS,
            transition: false,
        }
    }
}

impl EngineConfig {
    /// Load a configuration from a YAML file, filling unspecified fields with defaults
    pub fn from_yaml_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&text)
    }

    /// Parse a configuration from YAML text
    pub fn from_yaml_str(text: &str) -> Result<Self> {
        let config: EngineConfig = serde_yaml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values that would make the engines meaningless
    pub fn validate(&self) -> Result<()> {
        if self.max_passes == 0 {
            return Err(Error::Parse("max_passes must be at least 1".to_string()));
        }
        let positive = [
            ("meters_per_second", self.meters_per_second),
            ("earth_radius_m", self.earth_radius_m),
            ("traffic_scale", self.traffic_scale),
        ];
        for (name, value) in positive {
            if !(value.is_finite() && value > 0.0) {
                return Err(Error::Parse(format!("{name} must be positive, got {value}")));
            }
        }
        if !(self.height_scale.is_finite() && self.base_radius.is_finite()) {
            return Err(Error::Parse("scales must be finite".to_string()));
        }
        Ok(())
    }
}
