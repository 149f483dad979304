//! Display attributes derived from a distance field
//!
//! Everything here is a pure function of the field, the attribute buffers,
//! the display mode and a `distortion` scalar in [0, 1]. The renderer gets
//! per-node `{position, color, radius}` and per-edge endpoint positions with
//! a validity flag.
//!
//! The shared quantity is the traffic ratio
//! `r = sqrt(time / straight_line_distance × traffic_scale)`, blended from
//! the neutral value 1 toward its real value by `distortion`.

use serde::{Deserialize, Serialize};

use crate::buffers::{EdgeBuffers, NodeBuffers};
use crate::config::EngineConfig;
use crate::field::DistanceField;
use crate::geo::{self, LatLon};

/// RGBA colour, 0-255 per channel
pub type Rgba = [u8; 4];

pub const GREEN: Rgba = [0, 255, 0, 255];
pub const YELLOW: Rgba = [255, 255, 0, 255];
pub const RED: Rgba = [255, 0, 0, 255];
pub const BLACK: Rgba = [0, 0, 0, 255];
pub const NEUTRAL: Rgba = [128, 128, 128, 255];

/// How node attributes are derived from the field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum DisplayMode {
    /// Uniform nodes at their true positions
    #[default]
    None,
    /// Radius grows with the square root of the network distance
    NodeDistance,
    /// Colour and height follow the time/distance ratio
    Traffic,
    /// Positions pulled toward or pushed away from the source by the ratio
    Isochronic,
}

/// Render attributes for one node
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct NodeAttributes {
    /// `[lon, lat, z]`
    pub position: [f64; 3],
    pub color: Rgba,
    pub radius: f64,
    /// Mirrors the field's validity
    pub valid: bool,
}

/// Render attributes for one edge
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct EdgeAttributes {
    pub source_position: [f64; 3],
    pub target_position: [f64; 3],
    /// Both endpoints reached
    pub valid: bool,
}

/// Everything the rendering collaborator needs for one frame
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Frame {
    pub mode: DisplayMode,
    pub passes: usize,
    pub distortion: f64,
    pub nodes: Vec<NodeAttributes>,
    pub edges: Vec<EdgeAttributes>,
}

fn mix(a: f64, b: f64, t: f64) -> f64 {
    a + (b - a) * t
}

fn mix_color(a: Rgba, b: Rgba, t: f64) -> Rgba {
    let t = t.clamp(0.0, 1.0);
    let mut out = [0u8; 4];
    for (channel, slot) in out.iter_mut().enumerate() {
        *slot = mix(a[channel] as f64, b[channel] as f64, t).round() as u8;
    }
    out
}

/// Green at 0, yellow at 1, red at 2, black from 3 on
pub fn ramp(r: f64) -> Rgba {
    let color = mix_color(GREEN, YELLOW, r);
    let color = mix_color(color, RED, r - 1.0);
    mix_color(color, BLACK, r - 2.0)
}

/// Derive per-node render attributes
pub fn transform_nodes(
    field: &DistanceField,
    nodes: NodeBuffers<'_>,
    source: usize,
    mode: DisplayMode,
    distortion: f64,
    config: &EngineConfig,
) -> Vec<NodeAttributes> {
    let distortion = distortion.clamp(0.0, 1.0);
    let Some(&[source_lon, source_lat]) = nodes.positions.get(source) else {
        return Vec::new();
    };
    let origin = LatLon::new(source_lat, source_lon);

    nodes
        .positions
        .iter()
        .zip(nodes.indices)
        .map(|(&[lon, lat], &index)| {
            let value = field
                .get(index as usize)
                .copied()
                .unwrap_or(crate::field::NodeValue::UNREACHED);
            let valid = value.valid;

            let straight =
                geo::haversine_distance(origin, LatLon::new(lat, lon), config.earth_radius_m);
            let ratio = if valid && straight > f64::EPSILON {
                (value.time / straight * config.traffic_scale).sqrt()
            } else {
                1.0
            };
            let r = mix(1.0, ratio, distortion);
            let shown = if valid { 1.0 } else { 0.0 };

            match mode {
                DisplayMode::None => NodeAttributes {
                    position: [lon, lat, 0.0],
                    color: NEUTRAL,
                    radius: config.base_radius,
                    valid,
                },
                DisplayMode::NodeDistance => {
                    let size = if valid { value.distance.sqrt() } else { 0.0 };
                    NodeAttributes {
                        position: [lon, lat, 0.0],
                        color: ramp(r),
                        radius: mix(config.base_radius, size, distortion) * shown,
                        valid,
                    }
                }
                DisplayMode::Traffic => NodeAttributes {
                    position: [lon, lat, r * config.height_scale * shown],
                    color: ramp(r),
                    radius: config.base_radius * shown,
                    valid,
                },
                DisplayMode::Isochronic => NodeAttributes {
                    position: [mix(source_lon, lon, r), mix(source_lat, lat, r), 0.0],
                    color: ramp(r),
                    radius: config.base_radius * shown,
                    valid,
                },
            }
        })
        .collect()
}

/// Derive per-edge render attributes from the node attributes
pub fn transform_edges(nodes: &[NodeAttributes], edges: EdgeBuffers<'_>) -> Vec<EdgeAttributes> {
    edges
        .sources
        .iter()
        .zip(edges.targets)
        .map(|(&source, &target)| {
            match (nodes.get(source as usize), nodes.get(target as usize)) {
                (Some(a), Some(b)) => EdgeAttributes {
                    source_position: a.position,
                    target_position: b.position,
                    valid: a.valid && b.valid,
                },
                _ => EdgeAttributes {
                    source_position: [0.0; 3],
                    target_position: [0.0; 3],
                    valid: false,
                },
            }
        })
        .collect()
}
