//! Host loop tying graph, attribute buffers, a relaxation engine and the
//! display transform together
//!
//! A [`Session`] owns the loaded [`Graph`] and reacts to input changes the
//! way an interactive map layer would:
//!
//! | input      | effect                                                 |
//! |------------|--------------------------------------------------------|
//! | dataset    | every buffer rebuilt, engine reloaded, field reset     |
//! | hour       | edge weights rebuilt, engine reloaded, field reset     |
//! | source     | field reset                                            |
//! | mode       | nothing recomputed; only the next frame changes        |
//! | transition | switches between per-tick passes and instant results   |
//!
//! With transition on, each [`Session::tick`] runs one relaxation pass and
//! distortion grows with pass progress, producing the spreading reveal. With
//! transition off a tick runs to convergence and distortion is 1.

use tracing::{debug, info};

use crate::buffers::GraphAttributes;
use crate::config::EngineConfig;
use crate::error::Result;
use crate::field::DistanceField;
use crate::graph::{Graph, Hour};
use crate::relax::{CpuRelaxation, Relaxation};
use crate::transform::{DisplayMode, Frame, transform_edges, transform_nodes};

/// Interactive driver over one relaxation engine
pub struct Session {
    graph: Graph,
    config: EngineConfig,
    attributes: GraphAttributes,
    engine: Box<dyn Relaxation + Send>,
    source: usize,
    hour: Hour,
    mode: DisplayMode,
    transition: bool,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("nodes", &self.graph.node_count())
            .field("edges", &self.graph.edge_count())
            .field("source", &self.source)
            .field("hour", &self.hour)
            .field("mode", &self.mode)
            .field("transition", &self.transition)
            .field("passes", &self.engine.passes_run())
            .finish()
    }
}

impl Session {
    /// Session on the CPU engine, source 0 at hour 0
    pub fn new(graph: Graph, config: EngineConfig) -> Result<Self> {
        let engine = CpuRelaxation::new(0, Default::default(), config.max_passes)?;
        Self::with_engine(graph, config, Box::new(engine))
    }

    /// Session driving the given engine. The engine is (re)loaded from the
    /// graph's attribute buffers.
    pub fn with_engine(
        graph: Graph,
        config: EngineConfig,
        engine: Box<dyn Relaxation + Send>,
    ) -> Result<Self> {
        let mut session = Self {
            graph: Graph::default(),
            transition: config.transition,
            config,
            attributes: GraphAttributes::new(),
            engine,
            source: 0,
            hour: Hour::default(),
            mode: DisplayMode::default(),
        };
        session.set_graph(graph)?;
        Ok(session)
    }

    /// Replace the dataset. The source falls back to node 0 if it no longer
    /// exists.
    pub fn set_graph(&mut self, graph: Graph) -> Result<()> {
        self.graph = graph;
        if self.source >= self.graph.node_count() {
            self.source = 0;
        }
        self.attributes.dataset_changed();
        self.reload()?;
        info!(
            nodes = self.graph.node_count(),
            edges = self.graph.edge_count(),
            "session graph loaded"
        );
        Ok(())
    }

    pub fn set_hour(&mut self, hour: Hour) -> Result<()> {
        if hour == self.hour {
            return Ok(());
        }
        self.hour = hour;
        self.reload()?;
        debug!(%hour, "session hour changed");
        Ok(())
    }

    pub fn set_source(&mut self, source: usize) -> Result<()> {
        self.graph.check_index(source)?;
        self.source = source;
        self.engine.reset(source)?;
        debug!(source, "session source changed");
        Ok(())
    }

    /// Select the source by node id
    pub fn set_source_id(&mut self, id: &str) -> Result<()> {
        let index = self.graph.require_index(id)?;
        self.set_source(index)
    }

    pub fn set_mode(&mut self, mode: DisplayMode) {
        self.mode = mode;
    }

    pub fn set_transition(&mut self, transition: bool) {
        self.transition = transition;
    }

    /// Rebuild stale buffers, reload the engine and reset the field
    fn reload(&mut self) -> Result<()> {
        self.attributes.update(&self.graph, self.hour);
        self.engine
            .update(self.graph.node_count(), self.attributes.edges())?;
        if !self.graph.is_empty() {
            self.engine.reset(self.source)?;
        }
        Ok(())
    }

    /// Advance the animation. Returns whether more ticks would change the
    /// field.
    pub fn tick(&mut self) -> Result<bool> {
        if self.graph.is_empty() {
            return Ok(false);
        }
        if self.transition {
            if self.is_animating() {
                self.engine.run_pass()?;
            }
        } else {
            self.engine.run_to_convergence()?;
        }
        Ok(self.is_animating())
    }

    /// Transition is on and passes remain before the field is final
    pub fn is_animating(&self) -> bool {
        self.transition
            && !self.graph.is_empty()
            && !self.engine.is_converged()
            && self.engine.passes_run() < self.engine.pass_limit()
    }

    /// Animation progress in [0, 1]
    pub fn distortion(&self) -> f64 {
        if !self.transition || self.engine.is_converged() {
            return 1.0;
        }
        let limit = self.engine.pass_limit().max(1);
        (self.engine.passes_run() as f64 / limit as f64).min(1.0)
    }

    /// Current field snapshot
    pub fn field(&self) -> Result<DistanceField> {
        self.engine.field()
    }

    /// Render attributes for the current state
    pub fn frame(&self) -> Result<Frame> {
        let field = self.engine.field()?;
        let distortion = self.distortion();
        let nodes = transform_nodes(
            &field,
            self.attributes.nodes(),
            self.source,
            self.mode,
            distortion,
            &self.config,
        );
        let edges = transform_edges(&nodes, self.attributes.edges());
        Ok(Frame {
            mode: self.mode,
            passes: self.engine.passes_run(),
            distortion,
            nodes,
            edges,
        })
    }

    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn source(&self) -> usize {
        self.source
    }

    pub fn hour(&self) -> Hour {
        self.hour
    }

    pub fn mode(&self) -> DisplayMode {
        self.mode
    }

    pub fn transition(&self) -> bool {
        self.transition
    }

    pub fn passes_run(&self) -> usize {
        self.engine.passes_run()
    }
}
