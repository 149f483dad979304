//! Lane-parallel iterative relaxation
//!
//! The relaxation engines solve the same single-source problem as
//! [`crate::sssp`] as a fixed point. Each pass reads the current
//! [`DistanceField`] and, for every active edge `u -> v` with weight vector
//! `w`, offers `current[u] + w` to node `v`. Offers to the same node are
//! combined with a commutative min, so the arrival order of concurrent
//! writers does not matter. The node's previous value is always one of the
//! offers, which makes every channel non-increasing from pass to pass.
//!
//! State is double-buffered: a pass reads one buffer, writes the other and
//! flips the active index only after the write completed. A reset writes the
//! initial field into both buffers. Both operations take `&mut self`, so a
//! reset can never interleave with a pass in flight.
//!
//! After `k` passes every node within `k` hops of the source holds its exact
//! hop-bounded optimum, which is what the progressive reveal animates.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use rayon::prelude::*;
use tracing::{debug, instrument, trace};

use crate::buffers::{EdgeBuffers, EdgeValue, GraphAttributes};
use crate::error::{Error, Result};
use crate::field::{DistanceField, NodeValue};
use crate::graph::{Graph, Hour};

/// Common interface of the CPU and GPU relaxation engines
pub trait Relaxation {
    /// Replace the graph buffers. The field is cleared to "unreached"
    /// everywhere until the next [`Relaxation::reset`].
    fn update(&mut self, node_count: usize, edges: EdgeBuffers<'_>) -> Result<()>;

    /// Start over from `source`: value 0 at the source, unreached elsewhere
    fn reset(&mut self, source: usize) -> Result<()>;

    /// Run one synchronous pass. Returns whether any node value changed.
    fn run_pass(&mut self) -> Result<bool>;

    /// Snapshot of the field after the last completed pass
    fn field(&self) -> Result<DistanceField>;

    /// Passes run since the last reset
    fn passes_run(&self) -> usize;

    /// Configured pass ceiling
    fn max_passes(&self) -> usize;

    fn node_count(&self) -> usize;

    /// The last pass changed nothing
    fn is_converged(&self) -> bool;

    /// Passes after which the field is final: the ceiling, or the
    /// hop-diameter bound `node_count - 1` if that is smaller
    fn pass_limit(&self) -> usize {
        let bound = self.node_count().saturating_sub(1);
        self.max_passes().min(bound.max(1))
    }

    /// Run passes until a pass changes nothing, the ceiling is hit, or the
    /// hop-diameter bound guarantees exact convergence. Returns the number
    /// of passes run by this call.
    fn run_to_convergence(&mut self) -> Result<usize> {
        let limit = self.pass_limit();
        let mut ran = 0;
        while !self.is_converged() && self.passes_run() < limit {
            self.run_pass()?;
            ran += 1;
        }
        debug!(
            ran,
            total = self.passes_run(),
            converged = self.is_converged(),
            "relaxation stopped"
        );
        Ok(ran)
    }
}

/// Per-node accumulator for one pass. Values are stored as `f64` bit
/// patterns: for non-negative floats (including +inf) the unsigned order of
/// the bits equals the numeric order, so `fetch_min` is a float min.
#[derive(Debug)]
struct Accumulator {
    time: AtomicU64,
    distance: AtomicU64,
    hops: AtomicU64,
    valid: AtomicBool,
}

impl Accumulator {
    fn new() -> Self {
        Self {
            time: AtomicU64::new(0),
            distance: AtomicU64::new(0),
            hops: AtomicU64::new(0),
            valid: AtomicBool::new(false),
        }
    }

    fn store(&self, value: &NodeValue) {
        self.time.store(value.time.to_bits(), Ordering::Relaxed);
        self.distance.store(value.distance.to_bits(), Ordering::Relaxed);
        self.hops.store(value.hops.to_bits(), Ordering::Relaxed);
        self.valid.store(value.valid, Ordering::Relaxed);
    }

    fn offer(&self, from: &NodeValue, weight: &EdgeValue) {
        self.time
            .fetch_min((from.time + weight[0]).to_bits(), Ordering::Relaxed);
        self.distance
            .fetch_min((from.distance + weight[1]).to_bits(), Ordering::Relaxed);
        self.hops
            .fetch_min((from.hops + weight[2]).to_bits(), Ordering::Relaxed);
        self.valid.fetch_or(true, Ordering::Relaxed);
    }

    fn load(&self) -> NodeValue {
        NodeValue {
            time: f64::from_bits(self.time.load(Ordering::Relaxed)),
            distance: f64::from_bits(self.distance.load(Ordering::Relaxed)),
            hops: f64::from_bits(self.hops.load(Ordering::Relaxed)),
            valid: self.valid.load(Ordering::Relaxed),
        }
    }
}

/// Active edge as consumed by a pass
#[derive(Debug, Clone, Copy)]
struct Lane {
    source: usize,
    target: usize,
    weight: EdgeValue,
}

/// Relaxation on the CPU, one rayon task per edge and per node
#[derive(Debug)]
pub struct CpuRelaxation {
    node_count: usize,
    lanes: Vec<Lane>,
    buffers: [Vec<NodeValue>; 2],
    current: usize,
    scratch: Vec<Accumulator>,
    passes: usize,
    converged: bool,
    max_passes: usize,
}

impl CpuRelaxation {
    pub fn new(node_count: usize, edges: EdgeBuffers<'_>, max_passes: usize) -> Result<Self> {
        let mut engine = Self {
            node_count: 0,
            lanes: Vec::new(),
            buffers: [Vec::new(), Vec::new()],
            current: 0,
            scratch: Vec::new(),
            passes: 0,
            converged: false,
            max_passes,
        };
        engine.update(node_count, edges)?;
        Ok(engine)
    }

    /// Build the attribute buffers for `graph` at `hour` and load them
    pub fn from_graph(graph: &Graph, hour: Hour, max_passes: usize) -> Result<Self> {
        let mut attributes = GraphAttributes::new();
        attributes.update(graph, hour);
        Self::new(graph.node_count(), attributes.edges(), max_passes)
    }

    /// The current field without copying
    pub fn values(&self) -> &[NodeValue] {
        &self.buffers[self.current]
    }

    /// Number of edges active in the loaded buffers
    pub fn active_edge_count(&self) -> usize {
        self.lanes.len()
    }
}

impl Relaxation for CpuRelaxation {
    fn update(&mut self, node_count: usize, edges: EdgeBuffers<'_>) -> Result<()> {
        let mut lanes = Vec::with_capacity(edges.len());
        for ((&source, &target), weight) in edges
            .sources
            .iter()
            .zip(edges.targets)
            .zip(edges.values)
        {
            let (source, target) = (source as usize, target as usize);
            for index in [source, target] {
                if index >= node_count {
                    return Err(Error::NodeOutOfRange {
                        index,
                        count: node_count,
                    });
                }
            }
            if weight[0].is_finite() {
                lanes.push(Lane {
                    source,
                    target,
                    weight: *weight,
                });
            }
        }

        self.node_count = node_count;
        self.lanes = lanes;
        self.buffers = [
            vec![NodeValue::UNREACHED; node_count],
            vec![NodeValue::UNREACHED; node_count],
        ];
        self.scratch = (0..node_count).map(|_| Accumulator::new()).collect();
        self.current = 0;
        self.passes = 0;
        self.converged = false;
        debug!(nodes = node_count, active_edges = self.lanes.len(), "cpu relaxation loaded");
        Ok(())
    }

    fn reset(&mut self, source: usize) -> Result<()> {
        if source >= self.node_count {
            return Err(Error::NodeOutOfRange {
                index: source,
                count: self.node_count,
            });
        }
        let initial = DistanceField::reset(self.node_count, source);
        for buffer in &mut self.buffers {
            buffer.clear();
            buffer.extend_from_slice(initial.values());
        }
        self.passes = 0;
        self.converged = false;
        debug!(source, "cpu relaxation reset");
        Ok(())
    }

    fn run_pass(&mut self) -> Result<bool> {
        let [first, second] = &mut self.buffers;
        let (current, next) = if self.current == 0 {
            (&*first, second)
        } else {
            (&*second, first)
        };
        let scratch = &self.scratch;

        // Identity contribution: every node starts from its previous value.
        scratch
            .par_iter()
            .zip(current.par_iter())
            .for_each(|(acc, value)| acc.store(value));

        self.lanes.par_iter().for_each(|lane| {
            let from = &current[lane.source];
            if from.valid {
                scratch[lane.target].offer(from, &lane.weight);
            }
        });

        // Rayon joins all tasks before returning, which is the barrier
        // between the scatter and the fold.
        let changed = next
            .par_iter_mut()
            .zip(scratch.par_iter())
            .zip(current.par_iter())
            .map(|((slot, acc), previous)| {
                *slot = acc.load();
                *slot != *previous
            })
            .reduce(|| false, |a, b| a || b);

        self.current = 1 - self.current;
        self.passes += 1;
        self.converged = !changed;
        trace!(pass = self.passes, changed, "relaxation pass");
        Ok(changed)
    }

    fn field(&self) -> Result<DistanceField> {
        Ok(DistanceField::from_values(self.values().to_vec()))
    }

    fn passes_run(&self) -> usize {
        self.passes
    }

    fn max_passes(&self) -> usize {
        self.max_passes
    }

    fn node_count(&self) -> usize {
        self.node_count
    }

    fn is_converged(&self) -> bool {
        self.converged
    }
}

/// Convenience: relax `graph` from `source` at `hour` to convergence
#[instrument(skip(graph), fields(nodes = graph.node_count()))]
pub fn relax_to_convergence(
    graph: &Graph,
    source: usize,
    hour: Hour,
    max_passes: usize,
) -> Result<DistanceField> {
    let mut engine = CpuRelaxation::from_graph(graph, hour, max_passes)?;
    engine.reset(source)?;
    engine.run_to_convergence()?;
    engine.field()
}
