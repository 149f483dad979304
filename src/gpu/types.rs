//! GPU buffer types for the relaxation engine
//!
//! These types are uploaded directly to GPU buffers. All use 32-bit fields
//! and are repr(C) so the layout matches the WGSL structs in
//! [`super::shaders`].

use bytemuck::{Pod, Zeroable};

use crate::buffers::EdgeValue;
use crate::field::NodeValue;

/// Threads per workgroup in every relaxation kernel
pub const WORKGROUP_SIZE: u32 = 256;

/// Number of `u32` accumulator words per node: time, distance, hops, valid
pub const SCRATCH_WORDS_PER_NODE: usize = 4;

/// One node's field entry as stored on the GPU
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct GpuNodeValue {
    pub time: f32,
    pub distance: f32,
    pub hops: f32,
    /// 0 or 1
    pub valid: u32,
}

impl From<NodeValue> for GpuNodeValue {
    fn from(value: NodeValue) -> Self {
        Self {
            time: value.time as f32,
            distance: value.distance as f32,
            hops: value.hops as f32,
            valid: value.valid as u32,
        }
    }
}

impl From<GpuNodeValue> for NodeValue {
    fn from(value: GpuNodeValue) -> Self {
        Self {
            time: value.time as f64,
            distance: value.distance as f64,
            hops: value.hops as f64,
            valid: value.valid != 0,
        }
    }
}

/// An active edge lane
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct GpuEdge {
    pub source: u32,
    pub target: u32,
    pub time: f32,
    pub distance: f32,
}

impl GpuEdge {
    pub fn new(source: u32, target: u32, weight: &EdgeValue) -> Self {
        Self {
            source,
            target,
            time: weight[0] as f32,
            distance: weight[1] as f32,
        }
    }
}

/// Per-graph constants, padded to 16 bytes for the uniform buffer
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct RelaxUniforms {
    pub node_count: u32,
    pub edge_count: u32,
    pub _padding: [u32; 2],
}

impl RelaxUniforms {
    pub fn new(node_count: u32, edge_count: u32) -> Self {
        Self {
            node_count,
            edge_count,
            _padding: [0; 2],
        }
    }
}
