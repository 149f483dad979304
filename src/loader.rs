//! Dataset readers
//!
//! Two on-disk layouts are supported:
//!
//! - a single JSON document `{"nodes": [...], "edges": [...]}`
//! - a nodes CSV (`id,lat,lon` header, any column order, extra columns
//!   ignored, fields optionally quoted) next to an edges JSON file holding
//!   either an array of edges or an object keyed by edge id
//!
//! Readers only produce records. Integrity checking happens in
//! [`Graph::from_records`].

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use csv::{ReaderBuilder, Trim};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{Error, Result};
use crate::graph::{EdgeRecord, Graph, NodeRecord};

/// Raw node and edge records as read from disk
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
    pub nodes: Vec<NodeRecord>,
    #[serde(deserialize_with = "edge_collection")]
    pub edges: Vec<EdgeRecord>,
}

impl Dataset {
    /// Resolve ids and build the graph
    pub fn into_graph(self) -> Result<Graph> {
        Graph::from_records(&self.nodes, &self.edges)
    }
}

/// A source of datasets
pub trait DatasetReader {
    /// Read the dataset from disk
    fn read(&self) -> Result<Dataset>;

    /// Files whose modification should trigger a reload
    fn paths(&self) -> Vec<PathBuf>;

    /// Read and build the graph in one step
    fn load_graph(&self) -> Result<Graph> {
        let dataset = self.read()?;
        let (nodes, edges) = (dataset.nodes.len(), dataset.edges.len());
        let graph = dataset.into_graph()?;
        info!(nodes, edges, "dataset loaded");
        Ok(graph)
    }
}

/// Reader for a single JSON dataset document
#[derive(Debug, Clone)]
pub struct JsonDatasetReader {
    path: PathBuf,
}

impl JsonDatasetReader {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl DatasetReader for JsonDatasetReader {
    fn read(&self) -> Result<Dataset> {
        let content = fs::read_to_string(&self.path)?;
        serde_json::from_str(&content)
            .map_err(|e| Error::Parse(format!("{}: {e}", self.path.display())))
    }

    fn paths(&self) -> Vec<PathBuf> {
        vec![self.path.clone()]
    }
}

/// Reader for a nodes CSV plus an edges JSON file
#[derive(Debug, Clone)]
pub struct SplitDatasetReader {
    nodes: PathBuf,
    edges: PathBuf,
}

impl SplitDatasetReader {
    pub fn new(nodes: impl Into<PathBuf>, edges: impl Into<PathBuf>) -> Self {
        Self {
            nodes: nodes.into(),
            edges: edges.into(),
        }
    }
}

impl DatasetReader for SplitDatasetReader {
    fn read(&self) -> Result<Dataset> {
        let nodes_text = fs::read_to_string(&self.nodes)?;
        let nodes = parse_nodes_csv(&nodes_text)
            .map_err(|e| Error::Parse(format!("{}: {e}", self.nodes.display())))?;
        let edges_text = fs::read_to_string(&self.edges)?;
        let edges = parse_edges_json(&edges_text)
            .map_err(|e| Error::Parse(format!("{}: {e}", self.edges.display())))?;
        Ok(Dataset { nodes, edges })
    }

    fn paths(&self) -> Vec<PathBuf> {
        vec![self.nodes.clone(), self.edges.clone()]
    }
}

/// Pick a reader for either a JSON dataset or a nodes/edges pair
pub fn reader_for(
    dataset: Option<&Path>,
    nodes: Option<&Path>,
    edges: Option<&Path>,
) -> Result<Box<dyn DatasetReader + Send + Sync>> {
    match (dataset, nodes, edges) {
        (Some(path), None, None) => Ok(Box::new(JsonDatasetReader::new(path))),
        (None, Some(nodes), Some(edges)) => Ok(Box::new(SplitDatasetReader::new(nodes, edges))),
        _ => Err(Error::Parse(
            "expected either a dataset file or both a nodes CSV and an edges file".to_string(),
        )),
    }
}

/// Parse `id,lat,lon` rows. Fields may be quoted; line numbers in errors
/// are 1-based.
pub fn parse_nodes_csv(text: &str) -> Result<Vec<NodeRecord>> {
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(Trim::All)
        .from_reader(text.as_bytes());

    let columns = reader.headers().map_err(csv_error)?.clone();
    if columns.is_empty() {
        return Ok(Vec::new());
    }
    let column = |name: &str| {
        columns
            .iter()
            .position(|c| c.eq_ignore_ascii_case(name))
            .ok_or_else(|| Error::Parse(format!("nodes header lacks column '{name}'")))
    };
    let (id_col, lat_col, lon_col) = (column("id")?, column("lat")?, column("lon")?);

    reader
        .records()
        .map(|row| {
            let row = row.map_err(csv_error)?;
            let number = row.position().map_or(0, |p| p.line());
            let field = |col: usize, name: &str| {
                row.get(col)
                    .ok_or_else(|| Error::Parse(format!("line {number}: missing '{name}'")))
            };
            let coordinate = |col: usize, name: &str| -> Result<f64> {
                let raw = field(col, name)?;
                raw.parse::<f64>()
                    .map_err(|_| Error::Parse(format!("line {number}: invalid {name} '{raw}'")))
            };
            Ok(NodeRecord::new(
                field(id_col, "id")?,
                coordinate(lat_col, "lat")?,
                coordinate(lon_col, "lon")?,
            ))
        })
        .collect()
}

fn csv_error(e: csv::Error) -> Error {
    match e.position() {
        Some(position) => Error::Parse(format!("line {}: {e}", position.line())),
        None => Error::Parse(e.to_string()),
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum EdgeCollection {
    List(Vec<EdgeRecord>),
    ById(BTreeMap<String, EdgeRecord>),
}

impl From<EdgeCollection> for Vec<EdgeRecord> {
    fn from(collection: EdgeCollection) -> Self {
        match collection {
            EdgeCollection::List(edges) => edges,
            EdgeCollection::ById(edges) => edges.into_values().collect(),
        }
    }
}

fn edge_collection<'de, D: serde::Deserializer<'de>>(
    d: D,
) -> std::result::Result<Vec<EdgeRecord>, D::Error> {
    EdgeCollection::deserialize(d).map(Vec::from)
}

/// Parse an edges document: an array, or an object keyed by edge id (taken
/// in key order)
pub fn parse_edges_json(text: &str) -> Result<Vec<EdgeRecord>> {
    let collection: EdgeCollection = serde_json::from_str(text)?;
    Ok(collection.into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::Hour;
    use std::io::Write;
    use tempfile::{NamedTempFile, TempDir};

    const EDGES: &str = r#"[
        {"start_junction_id": "1", "end_junction_id": "2", "hours": [{"time": 10, "distance": 100}]},
        {"startId": 2, "endId": 3, "distance": 80, "hours": [{"time": 5}]}
    ]"#;

    #[test]
    fn csv_columns_in_any_order() {
        let nodes =
            parse_nodes_csv("lon,id,lat,extra\n-122.4,a,37.7,x\n\n-122.5,b,37.8,y\n").unwrap();
        assert_eq!(
            nodes,
            vec![
                NodeRecord::new("a", 37.7, -122.4),
                NodeRecord::new("b", 37.8, -122.5),
            ]
        );
    }

    #[test]
    fn csv_errors_carry_line_numbers() {
        let err = parse_nodes_csv("id,lat,lon\n1,37.7,-122.4\n2,north,-122.4\n").unwrap_err();
        assert_eq!(err.to_string(), "parse error: line 3: invalid lat 'north'");

        let err = parse_nodes_csv("id,lat,lon\n1,37.7\n").unwrap_err();
        assert!(err.to_string().contains("line 2: missing 'lon'"));

        let err = parse_nodes_csv("id,latitude,lon\n").unwrap_err();
        assert!(err.to_string().contains("'lat'"));
    }

    #[test]
    fn empty_csv_has_no_nodes() {
        assert!(parse_nodes_csv("\n\n").unwrap().is_empty());
    }

    #[test]
    fn quoted_csv_fields_match_edge_ids() {
        let nodes =
            parse_nodes_csv("\"id\",\"lat\",\"lon\"\n\"1\",\"0\",\"0\"\n\"2\", \"0\" ,\"0.01\"\n")
                .unwrap();
        assert_eq!(
            nodes,
            vec![NodeRecord::new("1", 0.0, 0.0), NodeRecord::new("2", 0.0, 0.01)]
        );

        let nodes = parse_nodes_csv("id,lat,lon\n\"Main St, north\",1,2\n").unwrap();
        assert_eq!(nodes[0].id, "Main St, north");

        let edges = parse_edges_json(r#"[{"startId": 1, "endId": 2}]"#).unwrap();
        let nodes = parse_nodes_csv("id,lat,lon\n\"1\",0,0\n\"2\",0,0.01\n").unwrap();
        let graph = Graph::from_records(&nodes, &edges).unwrap();
        assert_eq!(graph.node_index("2"), Some(1));
    }

    #[test]
    fn edges_as_array_or_keyed_object() {
        let list = parse_edges_json(EDGES).unwrap();
        assert_eq!(list.len(), 2);
        assert_eq!(list[1].start_id, "2");
        assert_eq!(list[1].distance, Some(80.0));

        let keyed = parse_edges_json(
            r#"{"e2": {"startId": "b", "endId": "c"}, "e1": {"startId": "a", "endId": "b"}}"#,
        )
        .unwrap();
        let starts: Vec<&str> = keyed.iter().map(|e| e.start_id.as_str()).collect();
        assert_eq!(starts, vec!["a", "b"]);
    }

    #[test]
    fn split_reader_builds_graph() {
        let dir = TempDir::new().unwrap();
        let nodes = dir.path().join("nodes.csv");
        let edges = dir.path().join("edges.json");
        fs::write(&nodes, "id,lat,lon\n1,0,0\n2,0,0.01\n3,0.01,0.01\n").unwrap();
        fs::write(&edges, EDGES).unwrap();

        let reader = SplitDatasetReader::new(&nodes, &edges);
        assert_eq!(reader.paths(), vec![nodes.clone(), edges.clone()]);
        let graph = reader.load_graph().unwrap();
        assert_eq!(graph.node_count(), 3);
        assert_eq!(graph.active_edge_count(Hour::new(0).unwrap()), 2);
    }

    #[test]
    fn json_reader_reports_path_on_error() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "{{\"nodes\": [").unwrap();
        let err = JsonDatasetReader::new(file.path()).read().unwrap_err();
        let path = file.path().display().to_string();
        assert!(matches!(err, Error::Parse(ref msg) if msg.contains(&path)));
    }

    #[test]
    fn json_dataset_with_keyed_edges() {
        let mut file = NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"nodes": [{{"id": 1, "lat": 0, "lon": 0}}, {{"id": 2, "lat": 0, "lon": 1}}],
                "edges": {{"x": {{"startId": 1, "endId": 2, "hours": [{{"time": 3, "distance": 4}}]}}}}}}"#
        )
        .unwrap();
        let graph = JsonDatasetReader::new(file.path()).load_graph().unwrap();
        assert_eq!(graph.node_index("2"), Some(1));
        assert_eq!(graph.edge_count(), 1);
    }

    #[test]
    fn dangling_edge_fails_at_load() {
        let mut file = NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"nodes": [{{"id": "a", "lat": 0, "lon": 0}}], "edges": [{{"startId": "a", "endId": "ghost"}}]}}"#
        )
        .unwrap();
        let err = JsonDatasetReader::new(file.path()).load_graph().unwrap_err();
        assert!(
            matches!(err, Error::GraphIntegrity { edge: 0, ref node_id } if node_id == "ghost")
        );
    }

    #[test]
    fn reader_selection() {
        assert!(reader_for(Some(Path::new("d.json")), None, None).is_ok());
        assert!(reader_for(None, Some(Path::new("n.csv")), Some(Path::new("e.json"))).is_ok());
        assert!(reader_for(None, Some(Path::new("n.csv")), None).is_err());
        assert!(reader_for(Some(Path::new("d.json")), Some(Path::new("n.csv")), None).is_err());
    }
}
