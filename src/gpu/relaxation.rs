//! Relaxation passes on the GPU using wgpu compute shaders
//!
//! Same contract as [`crate::relax::CpuRelaxation`], with the field kept in
//! two storage buffers that swap roles every pass. Values are `f32` on the
//! device, so results agree with the CPU engines up to a relative tolerance.

use std::sync::Arc;

use tracing::{debug, trace};
use wgpu::util::DeviceExt;

use super::shaders::RelaxShaders;
use super::types::{GpuEdge, GpuNodeValue, RelaxUniforms, SCRATCH_WORDS_PER_NODE, WORKGROUP_SIZE};
use crate::buffers::{EdgeBuffers, GraphAttributes};
use crate::error::{Error, Result};
use crate::field::{DistanceField, NodeValue};
use crate::graph::{Graph, Hour};
use crate::relax::Relaxation;

/// Smallest buffer we allocate; wgpu rejects zero-sized storage bindings
const MIN_BUFFER_SIZE: u64 = 16;

/// Buffers and bind groups for one loaded graph
struct GraphState {
    values: [wgpu::Buffer; 2],
    // Kept alive for the bind groups
    _edges: wgpu::Buffer,
    _scratch: wgpu::Buffer,
    _uniforms: wgpu::Buffer,
    changed: wgpu::Buffer,
    /// `bind_groups[i]` reads `values[i]` and writes `values[1 - i]`
    bind_groups: [wgpu::BindGroup; 2],
    staging: wgpu::Buffer,
    flag_staging: wgpu::Buffer,
}

/// GPU relaxation engine
pub struct GpuRelaxation {
    device: Arc<wgpu::Device>,
    queue: Arc<wgpu::Queue>,

    seed_pipeline: wgpu::ComputePipeline,
    scatter_pipeline: wgpu::ComputePipeline,
    fold_pipeline: wgpu::ComputePipeline,
    bind_group_layout: wgpu::BindGroupLayout,

    state: Option<GraphState>,
    node_count: usize,
    edge_count: u32,
    current: usize,
    passes: usize,
    converged: bool,
    max_passes: usize,
}

impl GpuRelaxation {
    /// Acquire a device and build the pipelines. No graph is loaded yet.
    pub fn new(max_passes: usize) -> Result<Self> {
        let (device, queue) = pollster::block_on(Self::create_device())?;
        Ok(Self::with_device(Arc::new(device), Arc::new(queue), max_passes))
    }

    /// Build the pipelines on an existing device and queue
    pub fn with_device(
        device: Arc<wgpu::Device>,
        queue: Arc<wgpu::Queue>,
        max_passes: usize,
    ) -> Self {
        let shaders = RelaxShaders::new();

        let storage = |binding: u32, read_only: bool| wgpu::BindGroupLayoutEntry {
            binding,
            visibility: wgpu::ShaderStages::COMPUTE,
            ty: wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Storage { read_only },
                has_dynamic_offset: false,
                min_binding_size: None,
            },
            count: None,
        };

        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Relaxation Bind Group Layout"),
            entries: &[
                storage(0, true),
                storage(1, false),
                storage(2, true),
                storage(3, false),
                wgpu::BindGroupLayoutEntry {
                    binding: 4,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
                storage(5, false),
            ],
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Relaxation Pipeline Layout"),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });

        let pipeline = |label: &str, source: &str, entry_point: &str| {
            let module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some(label),
                source: wgpu::ShaderSource::Wgsl(source.into()),
            });
            device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
                label: Some(label),
                layout: Some(&pipeline_layout),
                module: &module,
                entry_point: Some(entry_point),
                compilation_options: Default::default(),
                cache: None,
            })
        };

        let seed_pipeline = pipeline("Seed Pipeline", &shaders.seed, "seed");
        let scatter_pipeline = pipeline("Scatter Pipeline", &shaders.scatter, "scatter");
        let fold_pipeline = pipeline("Fold Pipeline", &shaders.fold, "fold");

        Self {
            device,
            queue,
            seed_pipeline,
            scatter_pipeline,
            fold_pipeline,
            bind_group_layout,
            state: None,
            node_count: 0,
            edge_count: 0,
            current: 0,
            passes: 0,
            converged: false,
            max_passes,
        }
    }

    /// Build the attribute buffers for `graph` at `hour` and load them
    pub fn from_graph(graph: &Graph, hour: Hour, max_passes: usize) -> Result<Self> {
        let mut attributes = GraphAttributes::new();
        attributes.update(graph, hour);
        let mut engine = Self::new(max_passes)?;
        engine.update(graph.node_count(), attributes.edges())?;
        Ok(engine)
    }

    async fn create_device() -> Result<(wgpu::Device, wgpu::Queue)> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: None,
                force_fallback_adapter: false,
            })
            .await
            .ok_or_else(|| Error::Gpu("no suitable GPU adapter".to_string()))?;

        adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("Relaxation Device"),
                    required_features: wgpu::Features::empty(),
                    required_limits: wgpu::Limits::default(),
                    memory_hints: wgpu::MemoryHints::default(),
                },
                None,
            )
            .await
            .map_err(|e| Error::Gpu(e.to_string()))
    }

    fn state(&self) -> Result<&GraphState> {
        self.state
            .as_ref()
            .ok_or_else(|| Error::Gpu("no graph loaded".to_string()))
    }

    fn storage_buffer(
        &self,
        label: &str,
        contents: &[u8],
        usage: wgpu::BufferUsages,
    ) -> wgpu::Buffer {
        if contents.is_empty() {
            self.device.create_buffer(&wgpu::BufferDescriptor {
                label: Some(label),
                size: MIN_BUFFER_SIZE,
                usage: wgpu::BufferUsages::STORAGE | usage,
                mapped_at_creation: false,
            })
        } else {
            self.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some(label),
                contents,
                usage: wgpu::BufferUsages::STORAGE | usage,
            })
        }
    }

    /// Copy `size` bytes of `source` through `staging` back to the host
    fn read_back<T: bytemuck::Pod>(
        &self,
        source: &wgpu::Buffer,
        staging: &wgpu::Buffer,
        size: u64,
    ) -> Result<Vec<T>> {
        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Read Back Encoder"),
            });
        encoder.copy_buffer_to_buffer(source, 0, staging, 0, size);
        self.queue.submit(std::iter::once(encoder.finish()));

        let slice = staging.slice(..size);
        let (tx, rx) = std::sync::mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = tx.send(result);
        });
        let _ = self.device.poll(wgpu::Maintain::Wait);
        rx.recv()
            .map_err(|e| Error::Gpu(e.to_string()))?
            .map_err(|e| Error::Gpu(e.to_string()))?;

        let data = slice.get_mapped_range();
        let values: Vec<T> = bytemuck::cast_slice(&data).to_vec();
        drop(data);
        staging.unmap();
        Ok(values)
    }
}

impl Relaxation for GpuRelaxation {
    fn update(&mut self, node_count: usize, edges: EdgeBuffers<'_>) -> Result<()> {
        let mut lanes = Vec::with_capacity(edges.len());
        for ((&source, &target), weight) in edges
            .sources
            .iter()
            .zip(edges.targets)
            .zip(edges.values)
        {
            for index in [source as usize, target as usize] {
                if index >= node_count {
                    return Err(Error::NodeOutOfRange {
                        index,
                        count: node_count,
                    });
                }
            }
            if weight[0].is_finite() {
                lanes.push(GpuEdge::new(source, target, weight));
            }
        }

        let unreached = vec![GpuNodeValue::from(NodeValue::UNREACHED); node_count];
        let value_usage = wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::COPY_SRC;
        let values = [
            self.storage_buffer("Node Values A", bytemuck::cast_slice(&unreached), value_usage),
            self.storage_buffer("Node Values B", bytemuck::cast_slice(&unreached), value_usage),
        ];
        let edge_buffer = self.storage_buffer(
            "Edge Lanes",
            bytemuck::cast_slice(&lanes),
            wgpu::BufferUsages::empty(),
        );
        let scratch_words = vec![0u32; node_count * SCRATCH_WORDS_PER_NODE];
        let scratch = self.storage_buffer(
            "Accumulator",
            bytemuck::cast_slice(&scratch_words),
            wgpu::BufferUsages::empty(),
        );
        let changed = self.storage_buffer(
            "Changed Flag",
            bytemuck::bytes_of(&[0u32; 4]),
            wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::COPY_SRC,
        );

        let uniforms = RelaxUniforms::new(node_count as u32, lanes.len() as u32);
        let uniform_buffer = self.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Relaxation Uniforms"),
            contents: bytemuck::bytes_of(&uniforms),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });

        let bind_group = |read: &wgpu::Buffer, write: &wgpu::Buffer, label: &str| {
            self.device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some(label),
                layout: &self.bind_group_layout,
                entries: &[
                    wgpu::BindGroupEntry {
                        binding: 0,
                        resource: read.as_entire_binding(),
                    },
                    wgpu::BindGroupEntry {
                        binding: 1,
                        resource: write.as_entire_binding(),
                    },
                    wgpu::BindGroupEntry {
                        binding: 2,
                        resource: edge_buffer.as_entire_binding(),
                    },
                    wgpu::BindGroupEntry {
                        binding: 3,
                        resource: scratch.as_entire_binding(),
                    },
                    wgpu::BindGroupEntry {
                        binding: 4,
                        resource: uniform_buffer.as_entire_binding(),
                    },
                    wgpu::BindGroupEntry {
                        binding: 5,
                        resource: changed.as_entire_binding(),
                    },
                ],
            })
        };
        let bind_groups = [
            bind_group(&values[0], &values[1], "Relaxation Bind Group A->B"),
            bind_group(&values[1], &values[0], "Relaxation Bind Group B->A"),
        ];

        let value_bytes = (std::mem::size_of::<GpuNodeValue>() * node_count) as u64;
        let staging = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Field Staging Buffer"),
            size: value_bytes.max(MIN_BUFFER_SIZE),
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let flag_staging = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Flag Staging Buffer"),
            size: MIN_BUFFER_SIZE,
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        self.state = Some(GraphState {
            values,
            _edges: edge_buffer,
            _scratch: scratch,
            _uniforms: uniform_buffer,
            changed,
            bind_groups,
            staging,
            flag_staging,
        });
        self.node_count = node_count;
        self.edge_count = lanes.len() as u32;
        self.current = 0;
        self.passes = 0;
        self.converged = false;
        debug!(nodes = node_count, active_edges = self.edge_count, "gpu relaxation loaded");
        Ok(())
    }

    fn reset(&mut self, source: usize) -> Result<()> {
        if source >= self.node_count {
            return Err(Error::NodeOutOfRange {
                index: source,
                count: self.node_count,
            });
        }
        let state = self.state()?;
        let initial: Vec<GpuNodeValue> = DistanceField::reset(self.node_count, source)
            .iter()
            .map(|v| GpuNodeValue::from(*v))
            .collect();
        for buffer in &state.values {
            self.queue.write_buffer(buffer, 0, bytemuck::cast_slice(&initial));
        }
        self.current = 0;
        self.passes = 0;
        self.converged = false;
        debug!(source, "gpu relaxation reset");
        Ok(())
    }

    fn run_pass(&mut self) -> Result<bool> {
        let state = self.state()?;
        self.queue.write_buffer(&state.changed, 0, bytemuck::bytes_of(&0u32));

        let node_workgroups = (self.node_count as u32).div_ceil(WORKGROUP_SIZE).max(1);
        let edge_workgroups = self.edge_count.div_ceil(WORKGROUP_SIZE).max(1);
        let bind_group = &state.bind_groups[self.current];

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Relaxation Encoder"),
            });

        // Separate compute passes act as barriers between the kernels.
        {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("Seed Pass"),
                timestamp_writes: None,
            });
            pass.set_pipeline(&self.seed_pipeline);
            pass.set_bind_group(0, bind_group, &[]);
            pass.dispatch_workgroups(node_workgroups, 1, 1);
        }
        if self.edge_count > 0 {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("Scatter Pass"),
                timestamp_writes: None,
            });
            pass.set_pipeline(&self.scatter_pipeline);
            pass.set_bind_group(0, bind_group, &[]);
            pass.dispatch_workgroups(edge_workgroups, 1, 1);
        }
        {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("Fold Pass"),
                timestamp_writes: None,
            });
            pass.set_pipeline(&self.fold_pipeline);
            pass.set_bind_group(0, bind_group, &[]);
            pass.dispatch_workgroups(node_workgroups, 1, 1);
        }
        self.queue.submit(std::iter::once(encoder.finish()));

        let flag: Vec<u32> = self.read_back(&state.changed, &state.flag_staging, 4)?;
        let changed = flag.first().is_some_and(|f| *f != 0);

        self.current = 1 - self.current;
        self.passes += 1;
        self.converged = !changed;
        trace!(pass = self.passes, changed, "gpu relaxation pass");
        Ok(changed)
    }

    fn field(&self) -> Result<DistanceField> {
        let state = self.state()?;
        if self.node_count == 0 {
            return Ok(DistanceField::from_values(Vec::new()));
        }
        let size = (std::mem::size_of::<GpuNodeValue>() * self.node_count) as u64;
        let values: Vec<GpuNodeValue> =
            self.read_back(&state.values[self.current], &state.staging, size)?;
        Ok(DistanceField::from_values(
            values.into_iter().map(NodeValue::from).collect(),
        ))
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
