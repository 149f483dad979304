//! GPU relaxation engine (wgpu compute shaders)
//!
//! Enabled with the `gpu` feature. [`GpuRelaxation`] implements
//! [`crate::relax::Relaxation`] so it can stand in for the CPU engine
//! anywhere, e.g. in a [`crate::session::Session`].
//!
//! # Example
//!
//! ```rust,ignore
//! use isochron::gpu::GpuRelaxation;
//! use isochron::relax::Relaxation;
//!
//! let mut engine = GpuRelaxation::from_graph(&graph, hour, 100)?;
//! engine.reset(source)?;
//! engine.run_to_convergence()?;
//! let field = engine.field()?;
//! ```

mod relaxation;
mod shaders;
mod types;

pub use relaxation::GpuRelaxation;
pub use shaders::RelaxShaders;
pub use types::{GpuEdge, GpuNodeValue, RelaxUniforms, WORKGROUP_SIZE};
