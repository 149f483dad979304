//! Sequential single-source shortest path (Dijkstra)
//!
//! This engine is the exact reference: it settles nodes in travel-time
//! order using [`IndexedHeap`] and afterwards projects every reachable node
//! onto a synthetic "isochronic" position at `time × k` meters from the
//! source along the node's true bearing.

use std::collections::HashMap;
use std::collections::hash_map::Entry;

use serde::Serialize;
use tracing::{debug, instrument};

use crate::config::EngineConfig;
use crate::error::Result;
use crate::field::{DistanceField, NodeValue, UNREACHED};
use crate::geo::{self, LatLon};
use crate::graph::{Graph, Hour, HourWeight};
use crate::heap::IndexedHeap;

/// Outcome of the sequential engine for one node
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Reach {
    /// Shortest travel time from the source; +inf if unreachable
    pub time_to_reach: f64,
    /// Length in meters of the time-shortest path
    pub distance: f64,
    /// Edge count of the time-shortest path
    pub hops: usize,
    /// Bearing from the source in degrees, for reachable nodes
    pub bearing: Option<f64>,
    /// Projected isochronic position, for reachable nodes
    pub display_position: Option<LatLon>,
}

impl Reach {
    const UNREACHED: Self = Self {
        time_to_reach: UNREACHED,
        distance: UNREACHED,
        hops: 0,
        bearing: None,
        display_position: None,
    };

    pub fn is_reachable(&self) -> bool {
        self.time_to_reach.is_finite()
    }
}

/// Result of a single-source run
#[derive(Debug, Clone, Serialize)]
pub struct ShortestPaths {
    pub source: usize,
    pub hour: Hour,
    pub nodes: Vec<Reach>,
}

impl ShortestPaths {
    pub fn reach(&self, index: usize) -> Option<&Reach> {
        self.nodes.get(index)
    }

    /// Convert into the shape produced by the relaxation engines
    pub fn to_field(&self) -> DistanceField {
        DistanceField::from_values(
            self.nodes
                .iter()
                .map(|r| {
                    if r.is_reachable() {
                        NodeValue {
                            time: r.time_to_reach,
                            distance: r.distance,
                            hops: r.hops as f64,
                            valid: true,
                        }
                    } else {
                        NodeValue::UNREACHED
                    }
                })
                .collect(),
        )
    }
}

/// Neighbor lists restricted to edges active in one hour.
///
/// Parallel edges between the same pair collapse to the fastest one.
fn active_adjacency(graph: &Graph, hour: Hour) -> Vec<Vec<(usize, HourWeight)>> {
    let mut segments: HashMap<(usize, usize), HourWeight> = HashMap::new();
    let mut neighbors: Vec<Vec<usize>> = vec![Vec::new(); graph.node_count()];

    for (edge, weight) in graph.active_edges(hour) {
        match segments.entry((edge.source, edge.target)) {
            Entry::Vacant(slot) => {
                slot.insert(weight);
                neighbors[edge.source].push(edge.target);
            }
            Entry::Occupied(mut slot) => {
                if weight.time < slot.get().time {
                    slot.insert(weight);
                }
            }
        }
    }

    neighbors
        .into_iter()
        .enumerate()
        .map(|(source, targets)| {
            targets
                .into_iter()
                .map(|target| (target, segments[&(source, target)]))
                .collect()
        })
        .collect()
}

/// Run Dijkstra from `source` over the edges active during `hour`
#[instrument(skip(graph, config), fields(nodes = graph.node_count()))]
pub fn shortest_paths(
    graph: &Graph,
    source: usize,
    hour: Hour,
    config: &EngineConfig,
) -> Result<ShortestPaths> {
    graph.check_index(source)?;
    let node_count = graph.node_count();
    let adjacency = active_adjacency(graph, hour);

    let mut time = vec![UNREACHED; node_count];
    let mut distance = vec![UNREACHED; node_count];
    let mut hops = vec![0usize; node_count];
    time[source] = 0.0;
    distance[source] = 0.0;

    let mut queue = IndexedHeap::with_capacity(node_count);
    for index in 0..node_count {
        queue.push(index, |i| time[*i]);
    }

    let mut settled = 0usize;
    while !queue.is_empty() {
        let current = queue.pop(|i| time[*i])?;
        let time_current = time[current];
        if !time_current.is_finite() {
            // Everything left in the queue is unreachable.
            break;
        }
        settled += 1;

        for &(neighbor, weight) in &adjacency[current] {
            let candidate = time_current + weight.time;
            if candidate < time[neighbor] {
                queue.remove(&neighbor, |i| time[*i]);
                time[neighbor] = candidate;
                distance[neighbor] = distance[current] + weight.distance;
                hops[neighbor] = hops[current] + 1;
                queue.push(neighbor, |i| time[*i]);
            }
        }
    }
    debug!(settled, "dijkstra finished");

    let origin = graph.nodes()[source].position();
    let nodes = graph
        .nodes()
        .iter()
        .map(|node| {
            let t = time[node.index];
            if !t.is_finite() {
                return Reach::UNREACHED;
            }
            let bearing = geo::bearing(origin, node.position());
            let display = geo::destination(
                origin,
                bearing,
                t * config.meters_per_second,
                config.earth_radius_m,
            );
            Reach {
                time_to_reach: t,
                distance: distance[node.index],
                hops: hops[node.index],
                bearing: Some(bearing),
                display_position: Some(display),
            }
        })
        .collect();

    Ok(ShortestPaths {
        source,
        hour,
        nodes,
    })
}
