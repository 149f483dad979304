//! Road network graph model
//!
//! A [`Graph`] is built once per dataset load from [`NodeRecord`]s and
//! [`EdgeRecord`]s and is immutable afterwards. Nodes receive a dense
//! 0-based index in record order; that index addresses every per-node
//! buffer in the engines. Edges are directed and carry one optional
//! `{time, distance}` weight per hour of the day. A missing weight makes the
//! edge inactive for that hour without removing it from the graph.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};
use tracing::{debug, instrument, warn};

use crate::error::{Error, Result};
use crate::geo::LatLon;

/// Number of hour slots carried by every edge
pub const HOURS_PER_DAY: usize = 24;

/// An hour of the day, 0..=23
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize)]
pub struct Hour(u8);

impl Hour {
    /// Validate and wrap an hour
    pub fn new(hour: u8) -> Result<Self> {
        if (hour as usize) < HOURS_PER_DAY {
            Ok(Self(hour))
        } else {
            Err(Error::HourOutOfRange(hour))
        }
    }

    pub fn get(self) -> u8 {
        self.0
    }

    fn slot(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for Hour {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}h", self.0)
    }
}

impl<'de> Deserialize<'de> for Hour {
    fn deserialize<D: Deserializer<'de>>(d: D) -> std::result::Result<Self, D::Error> {
        let raw = u8::deserialize(d)?;
        Hour::new(raw).map_err(serde::de::Error::custom)
    }
}

/// Travel cost of an edge during one hour
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HourWeight {
    /// Travel time in seconds
    pub time: f64,
    /// Segment length in meters
    pub distance: f64,
}

impl HourWeight {
    pub fn new(time: f64, distance: f64) -> Self {
        Self { time, distance }
    }

    fn is_usable(&self) -> bool {
        self.time.is_finite()
            && self.time >= 0.0
            && self.distance.is_finite()
            && self.distance >= 0.0
    }
}

/// One hour slot as it appears in a dataset. A slot without a time is
/// inactive; a slot without a distance falls back to the edge's length.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct HourSlot {
    #[serde(default)]
    pub time: Option<f64>,
    #[serde(default)]
    pub distance: Option<f64>,
}

impl HourSlot {
    fn weight(&self, edge_distance: Option<f64>) -> Option<HourWeight> {
        let weight = HourWeight::new(self.time?, self.distance.or(edge_distance)?);
        weight.is_usable().then_some(weight)
    }
}

/// Node as supplied by the loading collaborator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeRecord {
    /// Opaque identifier; numeric ids are accepted and stringified
    #[serde(deserialize_with = "opaque_id")]
    pub id: String,
    pub lat: f64,
    pub lon: f64,
}

impl NodeRecord {
    pub fn new(id: impl Into<String>, lat: f64, lon: f64) -> Self {
        Self {
            id: id.into(),
            lat,
            lon,
        }
    }
}

/// Directed edge as supplied by the loading collaborator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EdgeRecord {
    #[serde(
        rename = "start_junction_id",
        alias = "startId",
        deserialize_with = "opaque_id"
    )]
    pub start_id: String,
    #[serde(
        rename = "end_junction_id",
        alias = "endId",
        deserialize_with = "opaque_id"
    )]
    pub end_id: String,
    /// Segment length in meters, used by slots that carry only a time
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub distance: Option<f64>,
    /// Hour slots indexed 0..=23; `null` or missing entries are inactive
    #[serde(default)]
    pub hours: Vec<Option<HourSlot>>,
}

impl EdgeRecord {
    /// An edge with no active hours
    pub fn new(start_id: impl Into<String>, end_id: impl Into<String>) -> Self {
        Self {
            start_id: start_id.into(),
            end_id: end_id.into(),
            distance: None,
            hours: vec![None; HOURS_PER_DAY],
        }
    }

    /// Activate the edge for one hour
    pub fn with_hour(mut self, hour: u8, time: f64, distance: f64) -> Self {
        let slot = hour as usize;
        if self.hours.len() <= slot {
            self.hours.resize(slot + 1, None);
        }
        self.hours[slot] = Some(HourSlot {
            time: Some(time),
            distance: Some(distance),
        });
        self
    }

    /// Activate the edge with the same weight for every hour
    pub fn with_all_hours(mut self, time: f64, distance: f64) -> Self {
        for hour in 0..HOURS_PER_DAY as u8 {
            self = self.with_hour(hour, time, distance);
        }
        self
    }
}

fn opaque_id<'de, D: Deserializer<'de>>(d: D) -> std::result::Result<String, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawId {
        Text(String),
        Integer(i64),
        Float(f64),
    }

    Ok(match RawId::deserialize(d)? {
        RawId::Text(s) => s,
        RawId::Integer(i) => i.to_string(),
        RawId::Float(f) => f.to_string(),
    })
}

/// A road intersection
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Node {
    pub id: String,
    /// Dense position assigned at load time
    pub index: usize,
    pub lat: f64,
    pub lon: f64,
}

impl Node {
    pub fn position(&self) -> LatLon {
        LatLon::new(self.lat, self.lon)
    }
}

/// A directed road segment between two node indices
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Edge {
    pub source: usize,
    pub target: usize,
    pub weight_by_hour: [Option<HourWeight>; HOURS_PER_DAY],
}

impl Edge {
    /// Weight for `hour`, or `None` when the edge is inactive
    pub fn weight(&self, hour: Hour) -> Option<HourWeight> {
        self.weight_by_hour[hour.slot()]
    }

    pub fn is_active(&self, hour: Hour) -> bool {
        self.weight(hour).is_some()
    }
}

/// Immutable road network
#[derive(Debug, Clone, Default)]
pub struct Graph {
    nodes: Vec<Node>,
    edges: Vec<Edge>,
    index_of: HashMap<String, usize>,
}

impl Graph {
    /// Build a graph, resolving edge endpoints through the id index.
    ///
    /// Fails with [`Error::GraphIntegrity`] if an edge names an id that is
    /// not among the nodes, and with [`Error::DuplicateNode`] if two nodes
    /// share an id.
    #[instrument(skip_all, fields(nodes = nodes.len(), edges = edges.len()))]
    pub fn from_records(nodes: &[NodeRecord], edges: &[EdgeRecord]) -> Result<Self> {
        let mut index_of = HashMap::with_capacity(nodes.len());
        let nodes: Vec<Node> = nodes
            .iter()
            .enumerate()
            .map(|(index, record)| {
                if index_of.insert(record.id.clone(), index).is_some() {
                    return Err(Error::DuplicateNode(record.id.clone()));
                }
                Ok(Node {
                    id: record.id.clone(),
                    index,
                    lat: record.lat,
                    lon: record.lon,
                })
            })
            .collect::<Result<_>>()?;

        let mut dropped_slots = 0usize;
        let mut converted = Vec::with_capacity(edges.len());
        for (position, record) in edges.iter().enumerate() {
            let resolve = |id: &str| {
                index_of.get(id).copied().ok_or_else(|| Error::GraphIntegrity {
                    edge: position,
                    node_id: id.to_string(),
                })
            };
            let source = resolve(&record.start_id)?;
            let target = resolve(&record.end_id)?;

            if record.hours.len() > HOURS_PER_DAY {
                dropped_slots += record.hours.len() - HOURS_PER_DAY;
            }
            let mut weight_by_hour = [None; HOURS_PER_DAY];
            for (slot, hour) in record.hours.iter().take(HOURS_PER_DAY).enumerate() {
                weight_by_hour[slot] = hour.as_ref().and_then(|h| h.weight(record.distance));
            }

            converted.push(Edge {
                source,
                target,
                weight_by_hour,
            });
        }

        if dropped_slots > 0 {
            warn!(dropped_slots, "ignoring hour slots beyond the 24th");
        }
        debug!("graph built");

        Ok(Self {
            nodes,
            edges: converted,
            index_of,
        })
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    pub fn node(&self, index: usize) -> Option<&Node> {
        self.nodes.get(index)
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// O(1) id to index lookup
    pub fn node_index(&self, id: &str) -> Option<usize> {
        self.index_of.get(id).copied()
    }

    /// Like [`Graph::node_index`] but reports an unknown id as an error
    pub fn require_index(&self, id: &str) -> Result<usize> {
        self.node_index(id)
            .ok_or_else(|| Error::UnknownNode(id.to_string()))
    }

    /// Check that `index` addresses a node of this graph
    pub fn check_index(&self, index: usize) -> Result<()> {
        if index < self.nodes.len() {
            Ok(())
        } else {
            Err(Error::NodeOutOfRange {
                index,
                count: self.nodes.len(),
            })
        }
    }

    /// Edges active during `hour`, paired with that hour's weight
    pub fn active_edges(&self, hour: Hour) -> impl Iterator<Item = (&Edge, HourWeight)> {
        self.edges
            .iter()
            .filter_map(move |edge| edge.weight(hour).map(|w| (edge, w)))
    }

    pub fn active_edge_count(&self, hour: Hour) -> usize {
        self.active_edges(hour).count()
    }

    /// Upper bound on the number of hops of any shortest path
    pub fn hop_diameter_bound(&self) -> usize {
        self.nodes.len().saturating_sub(1)
    }
}
