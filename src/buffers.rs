//! Flat per-node and per-edge attribute buffers
//!
//! Engines and the display transform never walk the [`Graph`] directly; they
//! read flat arrays addressed by node or edge index. Each array is an
//! [`Attribute`] with its own generation stamp so that, for example, an hour
//! change rebuilds only the edge weight vector and leaves node positions
//! untouched.
//!
//! Every attribute is double-buffered. Stale attributes are populated into
//! their back buffers first and all of them are committed together, so a
//! reader always sees one consistent buffer set.

use std::collections::HashMap;

use tracing::debug;

use crate::field::UNREACHED;
use crate::graph::{Edge, Graph, Hour, Node};

/// Per-edge weight vector `{time, distance, constant = 1}`
pub type EdgeValue = [f64; 3];

/// Weight vector of an edge that is inactive for the current hour
pub const INACTIVE_EDGE: EdgeValue = [UNREACHED, UNREACHED, 1.0];

/// The attributes materialised for a graph
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AttributeKind {
    /// `[lon, lat]` per node
    NodePositions,
    /// Dense index per node
    NodeIndices,
    /// Source node index per edge
    EdgeSources,
    /// Target node index per edge
    EdgeTargets,
    /// Hour-dependent weight vector per edge
    EdgeValues,
}

impl AttributeKind {
    pub const ALL: [AttributeKind; 5] = [
        AttributeKind::NodePositions,
        AttributeKind::NodeIndices,
        AttributeKind::EdgeSources,
        AttributeKind::EdgeTargets,
        AttributeKind::EdgeValues,
    ];
}

/// Generation pair an attribute was last built from: `(dataset, accessor)`
type Stamp = (u64, u64);

/// A double-buffered flat attribute
#[derive(Debug, Clone)]
pub struct Attribute<T> {
    buffers: [Vec<T>; 2],
    front: usize,
    pending: bool,
    built: Option<Stamp>,
}

impl<T> Default for Attribute<T> {
    fn default() -> Self {
        Self {
            buffers: [Vec::new(), Vec::new()],
            front: 0,
            pending: false,
            built: None,
        }
    }
}

impl<T> Attribute<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserve room for `count` elements in the back buffer
    pub fn allocate(&mut self, count: usize) {
        let back = &mut self.buffers[1 - self.front];
        back.clear();
        back.reserve(count);
    }

    /// Fill the back buffer from `records`. The stable buffer is unchanged
    /// until [`Attribute::commit`].
    pub fn populate<R, F>(&mut self, records: &[R], accessor: F)
    where
        F: Fn(&R) -> T,
    {
        self.allocate(records.len());
        let back = &mut self.buffers[1 - self.front];
        back.extend(records.iter().map(accessor));
        self.pending = true;
    }

    /// Expose the freshly populated buffer. No-op if nothing is pending.
    pub fn commit(&mut self) {
        if self.pending {
            self.front = 1 - self.front;
            self.pending = false;
        }
    }

    /// The buffer readers should use
    pub fn stable(&self) -> &[T] {
        &self.buffers[self.front]
    }

    pub fn is_pending(&self) -> bool {
        self.pending
    }

    fn is_current(&self, stamp: Stamp) -> bool {
        self.built == Some(stamp)
    }
}

/// Borrowed view of the per-node buffers
#[derive(Debug, Clone, Copy)]
pub struct NodeBuffers<'a> {
    pub positions: &'a [[f64; 2]],
    pub indices: &'a [u32],
}

/// Borrowed view of the per-edge buffers
#[derive(Debug, Clone, Copy, Default)]
pub struct EdgeBuffers<'a> {
    pub sources: &'a [u32],
    pub targets: &'a [u32],
    pub values: &'a [EdgeValue],
}

impl EdgeBuffers<'_> {
    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }
}

/// All attributes for one graph, with per-attribute invalidation
#[derive(Debug, Clone, Default)]
pub struct GraphAttributes {
    node_positions: Attribute<[f64; 2]>,
    node_indices: Attribute<u32>,
    edge_sources: Attribute<u32>,
    edge_targets: Attribute<u32>,
    edge_values: Attribute<EdgeValue>,

    dataset_generation: u64,
    accessor_generations: HashMap<AttributeKind, u64>,
    hour: Option<Hour>,
}

impl GraphAttributes {
    pub fn new() -> Self {
        Self::default()
    }

    /// The dataset reference changed: every attribute is stale
    pub fn dataset_changed(&mut self) {
        self.dataset_generation += 1;
    }

    /// Mark one accessor dirty so only its attribute is rebuilt
    pub fn invalidate(&mut self, kind: AttributeKind) {
        *self.accessor_generations.entry(kind).or_default() += 1;
    }

    fn stamp(&self, kind: AttributeKind) -> Stamp {
        (
            self.dataset_generation,
            self.accessor_generations.get(&kind).copied().unwrap_or_default(),
        )
    }

    fn is_current(&self, kind: AttributeKind) -> bool {
        let stamp = self.stamp(kind);
        match kind {
            AttributeKind::NodePositions => self.node_positions.is_current(stamp),
            AttributeKind::NodeIndices => self.node_indices.is_current(stamp),
            AttributeKind::EdgeSources => self.edge_sources.is_current(stamp),
            AttributeKind::EdgeTargets => self.edge_targets.is_current(stamp),
            AttributeKind::EdgeValues => self.edge_values.is_current(stamp),
        }
    }

    /// Bring every stale attribute up to date for `graph` at `hour`.
    ///
    /// A change of hour invalidates only the edge weight vector. Returns the
    /// attributes that were rebuilt.
    pub fn update(&mut self, graph: &Graph, hour: Hour) -> Vec<AttributeKind> {
        if self.hour != Some(hour) {
            if self.hour.is_some() {
                self.invalidate(AttributeKind::EdgeValues);
            }
            self.hour = Some(hour);
        }

        let stale: Vec<AttributeKind> = AttributeKind::ALL
            .into_iter()
            .filter(|kind| !self.is_current(*kind))
            .collect();

        for &kind in &stale {
            let stamp = self.stamp(kind);
            match kind {
                AttributeKind::NodePositions => {
                    self.node_positions
                        .populate(graph.nodes(), |n: &Node| [n.lon, n.lat]);
                    self.node_positions.built = Some(stamp);
                }
                AttributeKind::NodeIndices => {
                    self.node_indices
                        .populate(graph.nodes(), |n: &Node| n.index as u32);
                    self.node_indices.built = Some(stamp);
                }
                AttributeKind::EdgeSources => {
                    self.edge_sources
                        .populate(graph.edges(), |e: &Edge| e.source as u32);
                    self.edge_sources.built = Some(stamp);
                }
                AttributeKind::EdgeTargets => {
                    self.edge_targets
                        .populate(graph.edges(), |e: &Edge| e.target as u32);
                    self.edge_targets.built = Some(stamp);
                }
                AttributeKind::EdgeValues => {
                    self.edge_values.populate(graph.edges(), |e: &Edge| {
                        e.weight(hour)
                            .map_or(INACTIVE_EDGE, |w| [w.time, w.distance, 1.0])
                    });
                    self.edge_values.built = Some(stamp);
                }
            }
        }

        self.node_positions.commit();
        self.node_indices.commit();
        self.edge_sources.commit();
        self.edge_targets.commit();
        self.edge_values.commit();

        if !stale.is_empty() {
            debug!(?stale, %hour, "attribute buffers rebuilt");
        }
        stale
    }

    pub fn hour(&self) -> Option<Hour> {
        self.hour
    }

    pub fn nodes(&self) -> NodeBuffers<'_> {
        NodeBuffers {
            positions: self.node_positions.stable(),
            indices: self.node_indices.stable(),
        }
    }

    pub fn edges(&self) -> EdgeBuffers<'_> {
        EdgeBuffers {
            sources: self.edge_sources.stable(),
            targets: self.edge_targets.stable(),
            values: self.edge_values.stable(),
        }
    }

    pub fn node_count(&self) -> usize {
        self.node_indices.stable().len()
    }
}
