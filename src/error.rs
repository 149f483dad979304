//! Error types shared by the graph model, both engines and the loaders

use thiserror::Error;

/// Errors that can occur while loading a graph or driving an engine
#[derive(Error, Debug)]
pub enum Error {
    /// An edge references a node id that is not part of the dataset
    #[error("edge {edge} references unknown node id '{node_id}'")]
    GraphIntegrity {
        /// Position of the offending edge in the input records
        edge: usize,
        /// The id that could not be resolved
        node_id: String,
    },

    /// Two node records share the same id
    #[error("duplicate node id '{0}'")]
    DuplicateNode(String),

    /// `pop` was called on an empty priority queue
    #[error("pop from an empty priority queue")]
    EmptyQueue,

    /// Hours are indexed 0..=23
    #[error("hour {0} is out of range (expected 0-23)")]
    HourOutOfRange(u8),

    /// A node index outside the loaded graph
    #[error("node index {index} is out of range for a graph of {count} nodes")]
    NodeOutOfRange {
        /// The requested index
        index: usize,
        /// Number of nodes in the graph
        count: usize,
    },

    /// A node id lookup failed (e.g. a source id given on the command line)
    #[error("unknown node id '{0}'")]
    UnknownNode(String),

    /// An I/O error occurred
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A parsing or validation error occurred
    #[error("parse error: {0}")]
    Parse(String),

    /// A thread panicked while holding the session
    #[error("session lock poisoned")]
    LockPoisoned,

    /// The GPU backend could not be initialised or failed mid-pass
    #[error("gpu error: {0}")]
    Gpu(String),
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Parse(err.to_string())
    }
}

impl From<serde_yaml::Error> for Error {
    fn from(err: serde_yaml::Error) -> Self {
        Error::Parse(err.to_string())
    }
}

/// Result type used throughout the crate
pub type Result<T> = std::result::Result<T, Error>;
