//! WGSL compute shaders for one relaxation pass
//!
//! A pass is three dispatches over the same bind group:
//!
//! 1. `seed` (per node) copies the current value into the accumulator
//! 2. `scatter` (per edge) offers `current[source] + weight` to the target
//!    with `atomicMin` on the float bits
//! 3. `fold` (per node) writes the accumulator into the next buffer and
//!    raises the `changed` flag if any word differs from the current value
//!
//! Non-negative `f32` values (including +inf) order the same way as their
//! bit patterns read as `u32`, so `atomicMin` on the bits is a float min.

/// Struct and binding declarations shared by all kernels
pub const TYPES: &str = r#"
struct NodeValue {
    time: f32,
    distance: f32,
    hops: f32,
    valid: u32,
}

struct Edge {
    source: u32,
    target_node: u32,
    time: f32,
    distance: f32,
}

struct Uniforms {
    node_count: u32,
    edge_count: u32,
    _padding0: u32,
    _padding1: u32,
}

@group(0) @binding(0) var<storage, read> current: array<NodeValue>;
@group(0) @binding(1) var<storage, read_write> next: array<NodeValue>;
@group(0) @binding(2) var<storage, read> edges: array<Edge>;
@group(0) @binding(3) var<storage, read_write> scratch: array<atomic<u32>>;
@group(0) @binding(4) var<uniform> uniforms: Uniforms;
@group(0) @binding(5) var<storage, read_write> changed: atomic<u32>;
"#;

/// Identity contribution: every node starts from its own previous value
pub const SEED: &str = r#"
@compute @workgroup_size(256)
fn seed(@builtin(global_invocation_id) global_id: vec3<u32>) {
    let idx = global_id.x;
    if (idx >= uniforms.node_count) {
        return;
    }
    let value = current[idx];
    let base = idx * 4u;
    atomicStore(&scratch[base], bitcast<u32>(value.time));
    atomicStore(&scratch[base + 1u], bitcast<u32>(value.distance));
    atomicStore(&scratch[base + 2u], bitcast<u32>(value.hops));
    atomicStore(&scratch[base + 3u], value.valid);
}
"#;

/// One lane per active edge
pub const SCATTER: &str = r#"
@compute @workgroup_size(256)
fn scatter(@builtin(global_invocation_id) global_id: vec3<u32>) {
    let edge_idx = global_id.x;
    if (edge_idx >= uniforms.edge_count) {
        return;
    }
    let edge = edges[edge_idx];
    let origin = current[edge.source];
    if (origin.valid == 0u) {
        return;
    }
    let base = edge.target_node * 4u;
    atomicMin(&scratch[base], bitcast<u32>(origin.time + edge.time));
    atomicMin(&scratch[base + 1u], bitcast<u32>(origin.distance + edge.distance));
    atomicMin(&scratch[base + 2u], bitcast<u32>(origin.hops + 1.0));
    atomicOr(&scratch[base + 3u], 1u);
}
"#;

/// Publish the accumulated values and detect change
pub const FOLD: &str = r#"
@compute @workgroup_size(256)
fn fold(@builtin(global_invocation_id) global_id: vec3<u32>) {
    let idx = global_id.x;
    if (idx >= uniforms.node_count) {
        return;
    }
    let base = idx * 4u;
    let time = atomicLoad(&scratch[base]);
    let distance = atomicLoad(&scratch[base + 1u]);
    let hops = atomicLoad(&scratch[base + 2u]);
    let valid = atomicLoad(&scratch[base + 3u]);

    next[idx] = NodeValue(
        bitcast<f32>(time),
        bitcast<f32>(distance),
        bitcast<f32>(hops),
        valid,
    );

    let previous = current[idx];
    if (time != bitcast<u32>(previous.time)
        || distance != bitcast<u32>(previous.distance)
        || hops != bitcast<u32>(previous.hops)
        || valid != previous.valid) {
        atomicStore(&changed, 1u);
    }
}
"#;

/// Complete shader sources, one module per kernel
pub struct RelaxShaders {
    pub seed: String,
    pub scatter: String,
    pub fold: String,
}

impl RelaxShaders {
    pub fn new() -> Self {
        Self {
            seed: format!("{TYPES}\n{SEED}"),
            scatter: format!("{TYPES}\n{SCATTER}"),
            fold: format!("{TYPES}\n{FOLD}"),
        }
    }
}

impl Default for RelaxShaders {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn each_module_declares_its_entry_point() {
        let shaders = RelaxShaders::new();
        assert!(shaders.seed.contains("fn seed("));
        assert!(shaders.scatter.contains("fn scatter("));
        assert!(shaders.fold.contains("fn fold("));
        for source in [&shaders.seed, &shaders.scatter, &shaders.fold] {
            assert!(source.contains("struct NodeValue"));
        }
    }

    #[test]
    fn workgroup_size_matches_dispatch() {
        let expected = format!("@workgroup_size({})", super::super::types::WORKGROUP_SIZE);
        for kernel in [SEED, SCATTER, FOLD] {
            assert!(kernel.contains(&expected));
        }
    }
}
