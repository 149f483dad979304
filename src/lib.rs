//! isochron - travel-time reachability over city road networks.
//!
//! A road network is loaded as a [`graph::Graph`] whose directed edges carry
//! one optional `{time, distance}` weight per hour of the day. From a source
//! node the crate computes how long it takes to reach every other node in
//! two independent ways:
//!
//! - [`sssp`]: an exact sequential Dijkstra over an indexed binary heap
//! - [`relax`]: a lane-parallel fixed-point relaxation that exposes the
//!   field after every pass, with an optional GPU backend in `gpu`
//!
//! [`transform`] turns a (possibly partial) field into render attributes and
//! [`session::Session`] drives the whole pipeline the way an interactive
//! map layer does.

pub mod buffers;
pub mod config;
pub mod error;
pub mod field;
pub mod geo;
#[cfg(feature = "gpu")]
pub mod gpu;
pub mod graph;
pub mod heap;
pub mod loader;
pub mod relax;
pub mod server;
pub mod session;
pub mod sssp;
pub mod transform;

pub use config::EngineConfig;
pub use error::{Error, Result};
pub use field::{DistanceField, NodeValue};
pub use graph::{Graph, Hour};
pub use session::Session;
pub use transform::{DisplayMode, Frame};
