//! GPU (Metal/Vulkan/DX12 via wgpu) implementation of the PBF pipeline.
//!
//! `GpuBackend` implements [`SolverBackend`] with wgpu compute shaders. The
//! whole frame is recorded into one command encoder and submitted once:
//!
//! 1. Clear transients, predict
//! 2. Spatial hash: clear, assign, scan (3 passes), load heads, scatter, offsets
//! 3. `solver_iterations` x (density, lambda, delta, apply)
//! 4. Velocity, curl, confinement, XSPH, final positions
//!
//! Particle state is read back into a host [`ParticleArrays`] after every
//! frame so the position snapshot is always current.
//!
//! # Bind group layout
//! - Grid shader: group 0 holds params plus every grid buffer
//! - Scan shader: group 0 holds its own params, input, output and block sums
//! - Solver / finalize shaders: group 0 holds params plus particle buffers,
//!   group 1 is the read-only neighbor view (cell keys, sorted indices, offsets)

pub mod buffers;

use buffers::{
    create_storage_buf, create_uniform_buf, create_zeroed_buf, read_buffer, scan_blocks, GpuBuffers,
    GpuCellOffset, GpuScanParams, GpuSimParams, MAX_SCAN_CELLS,
};

use crate::bounds::Aabb;
use crate::error::SimulationError;
use crate::neighbor::CellOffset;
use crate::params::SimulationParameters;
use crate::particle::ParticleArrays;
use crate::{FrameContext, SolverBackend};

const WORKGROUP_SIZE: u32 = 256;

/// The solver pipelines bind nine storage buffers (group 0 + neighbor view).
const REQUIRED_STORAGE_BUFFERS: u32 = 9;

const COMMON_WGSL: &str = include_str!("shaders/common.wgsl");
const NEIGHBORS_WGSL: &str = include_str!("shaders/neighbors.wgsl");

/// Check whether a GPU adapter is available.
pub fn gpu_available() -> bool {
    let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
        backends: wgpu::Backends::all(),
        ..Default::default()
    });
    let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
        power_preference: wgpu::PowerPreference::HighPerformance,
        compatible_surface: None,
        force_fallback_adapter: false,
    }));
    adapter.is_some()
}

/// Grid state read back from the device, for inspection and parity tests.
#[derive(Debug, Clone, Default)]
pub struct GpuGridSnapshot {
    /// Cell key of each particle.
    pub cell_keys: Vec<u32>,
    /// Particle count per cell.
    pub histogram: Vec<u32>,
    /// Exclusive prefix sum of the histogram.
    pub prefix_sums: Vec<u32>,
    /// Particle indices ordered by cell.
    pub sorted: Vec<u32>,
    /// Run of each cell in `sorted`.
    pub offsets: Vec<CellOffset>,
}

struct Pipelines {
    clear_grid: wgpu::ComputePipeline,
    assign_cells: wgpu::ComputePipeline,
    load_write_heads: wgpu::ComputePipeline,
    scatter: wgpu::ComputePipeline,
    build_offsets: wgpu::ComputePipeline,
    scan_blocks: wgpu::ComputePipeline,
    scan_block_sums: wgpu::ComputePipeline,
    add_block_offsets: wgpu::ComputePipeline,
    predict: wgpu::ComputePipeline,
    density: wgpu::ComputePipeline,
    lambda: wgpu::ComputePipeline,
    delta: wgpu::ComputePipeline,
    apply: wgpu::ComputePipeline,
    derive_velocity: wgpu::ComputePipeline,
    curl: wgpu::ComputePipeline,
    confinement: wgpu::ComputePipeline,
    xsph: wgpu::ComputePipeline,
    write_positions: wgpu::ComputePipeline,
    contain: wgpu::ComputePipeline,
}

struct BindGroups {
    grid: wgpu::BindGroup,
    scan: wgpu::BindGroup,
    solver: wgpu::BindGroup,
    finalize: wgpu::BindGroup,
    neighbors: wgpu::BindGroup,
}

/// GPU-accelerated PBF backend using wgpu compute shaders.
pub struct GpuBackend {
    device: wgpu::Device,
    queue: wgpu::Queue,
    adapter_name: String,

    pipelines: Pipelines,
    bgl_scan: wgpu::BindGroupLayout,
    bind_groups: BindGroups,
    bufs: GpuBuffers,

    params: SimulationParameters,
    cells_per_axis: [u32; 3],
    /// Domain and dt of the last uploaded uniform, reused by `contain`.
    last_frame: FrameContext,

    particles: ParticleArrays,
    density: Vec<f32>,
    snapshot: Vec<[f32; 3]>,
    /// First frame error; once set, `step` does nothing.
    fault: Option<SimulationError>,
}

impl GpuBackend {
    /// Create a GPU backend.
    ///
    /// Returns `Err(SimulationError::Backend)` if no suitable adapter is found
    /// or a shader fails validation, allowing callers to fall back to the
    /// CPU backend.
    pub fn new(
        particles: &ParticleArrays,
        params: &SimulationParameters,
        domain: &Aabb,
        cells_per_axis: [u32; 3],
    ) -> Result<Self, SimulationError> {
        let total_cells = cells_per_axis.iter().product::<u32>();
        if total_cells > MAX_SCAN_CELLS {
            return Err(SimulationError::Backend(format!(
                "{total_cells} grid cells exceed the GPU scan capacity of {MAX_SCAN_CELLS}"
            )));
        }

        // --- Device initialization ---
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });

        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::HighPerformance,
            compatible_surface: None,
            force_fallback_adapter: false,
        }))
        .ok_or_else(|| SimulationError::Backend("no suitable GPU adapter found".into()))?;

        let adapter_name = adapter.get_info().name;
        tracing::info!("GPU adapter: {:?}", adapter_name);

        // The solver passes bind more storage buffers than wgpu's default of 8.
        let adapter_limits = adapter.limits();
        if adapter_limits.max_storage_buffers_per_shader_stage < REQUIRED_STORAGE_BUFFERS {
            return Err(SimulationError::Backend(format!(
                "adapter supports {} storage buffers per stage, {} required",
                adapter_limits.max_storage_buffers_per_shader_stage, REQUIRED_STORAGE_BUFFERS
            )));
        }
        let mut required_limits = wgpu::Limits::default();
        required_limits.max_storage_buffers_per_shader_stage =
            adapter_limits.max_storage_buffers_per_shader_stage;

        let (device, queue) = pollster::block_on(adapter.request_device(
            &wgpu::DeviceDescriptor {
                label: Some("pbf_gpu_device"),
                required_features: wgpu::Features::empty(),
                required_limits,
                memory_hints: wgpu::MemoryHints::Performance,
            },
            None,
        ))
        .map_err(|e| SimulationError::Backend(format!("failed to create device: {e}")))?;

        // --- Buffers ---
        let frame = FrameContext {
            dt: crate::params::DEFAULT_DT,
            domain: *domain,
        };
        let sim_params = GpuSimParams::new(params, &frame, cells_per_axis, particles.len() as u32);
        let bufs = GpuBuffers::new(&device, particles, total_cells, &sim_params);

        // --- Shaders, layouts and pipelines ---
        device.push_error_scope(wgpu::ErrorFilter::Validation);

        let grid_shader = particle_shader(&device, "grid", include_str!("shaders/grid.wgsl"), false);
        let solver_shader = particle_shader(&device, "solver", include_str!("shaders/solver.wgsl"), true);
        let finalize_shader = particle_shader(&device, "finalize", include_str!("shaders/finalize.wgsl"), true);
        let scan_shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("scan"),
            source: wgpu::ShaderSource::Wgsl(include_str!("shaders/scan.wgsl").into()),
        });

        // Grid: params(uniform), pred(read), cell_keys, histogram, prefix(read), write_heads, sorted, offsets
        let bgl_grid = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("grid_bgl"),
            entries: &[
                bgl_uniform(0),
                bgl_storage_ro(1),
                bgl_storage_rw(2),
                bgl_storage_rw(3),
                bgl_storage_ro(4),
                bgl_storage_rw(5),
                bgl_storage_rw(6),
                bgl_storage_rw(7),
            ],
        });
        // Scan: params(uniform), input(read), output, block_sums
        let bgl_scan = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("scan_bgl"),
            entries: &[bgl_uniform(0), bgl_storage_ro(1), bgl_storage_rw(2), bgl_storage_rw(3)],
        });
        // Solver: params(uniform), pos(read), pred, vel, density, lambda, delta
        let bgl_solver = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("solver_bgl"),
            entries: &[
                bgl_uniform(0),
                bgl_storage_ro(1),
                bgl_storage_rw(2),
                bgl_storage_rw(3),
                bgl_storage_rw(4),
                bgl_storage_rw(5),
                bgl_storage_rw(6),
            ],
        });
        // Finalize: params(uniform), pos, pred, vel, vel_frozen(read), omega
        let bgl_finalize = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("finalize_bgl"),
            entries: &[
                bgl_uniform(0),
                bgl_storage_rw(1),
                bgl_storage_rw(2),
                bgl_storage_rw(3),
                bgl_storage_ro(4),
                bgl_storage_rw(5),
            ],
        });
        // Neighbor view: cell_keys, sorted, offsets (all read)
        let bgl_neighbors = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("neighbors_bgl"),
            entries: &[bgl_storage_ro(0), bgl_storage_ro(1), bgl_storage_ro(2)],
        });

        let pl_grid = pipeline_layout(&device, "grid_pl", &[&bgl_grid]);
        let pl_scan = pipeline_layout(&device, "scan_pl", &[&bgl_scan]);
        let pl_solver = pipeline_layout(&device, "solver_pl", &[&bgl_solver, &bgl_neighbors]);
        let pl_finalize = pipeline_layout(&device, "finalize_pl", &[&bgl_finalize, &bgl_neighbors]);

        let pipelines = Pipelines {
            clear_grid: compute_pipeline(&device, &pl_grid, &grid_shader, "clear_grid"),
            assign_cells: compute_pipeline(&device, &pl_grid, &grid_shader, "assign_cells"),
            load_write_heads: compute_pipeline(&device, &pl_grid, &grid_shader, "load_write_heads"),
            scatter: compute_pipeline(&device, &pl_grid, &grid_shader, "scatter"),
            build_offsets: compute_pipeline(&device, &pl_grid, &grid_shader, "build_offsets"),
            scan_blocks: compute_pipeline(&device, &pl_scan, &scan_shader, "scan_blocks"),
            scan_block_sums: compute_pipeline(&device, &pl_scan, &scan_shader, "scan_block_sums"),
            add_block_offsets: compute_pipeline(&device, &pl_scan, &scan_shader, "add_block_offsets"),
            predict: compute_pipeline(&device, &pl_solver, &solver_shader, "predict"),
            density: compute_pipeline(&device, &pl_solver, &solver_shader, "compute_density"),
            lambda: compute_pipeline(&device, &pl_solver, &solver_shader, "compute_lambda"),
            delta: compute_pipeline(&device, &pl_solver, &solver_shader, "compute_delta"),
            apply: compute_pipeline(&device, &pl_solver, &solver_shader, "apply_delta"),
            derive_velocity: compute_pipeline(&device, &pl_finalize, &finalize_shader, "derive_velocity"),
            curl: compute_pipeline(&device, &pl_finalize, &finalize_shader, "compute_curl"),
            confinement: compute_pipeline(&device, &pl_finalize, &finalize_shader, "apply_confinement"),
            xsph: compute_pipeline(&device, &pl_finalize, &finalize_shader, "apply_xsph"),
            write_positions: compute_pipeline(&device, &pl_finalize, &finalize_shader, "write_positions"),
            contain: compute_pipeline(&device, &pl_finalize, &finalize_shader, "contain"),
        };

        if let Some(err) = pollster::block_on(device.pop_error_scope()) {
            return Err(SimulationError::Backend(format!("shader validation failed: {err}")));
        }

        // --- Bind groups (buffers never change size, so these are built once) ---
        let bind_groups = BindGroups {
            grid: bind_group(
                &device,
                "grid_bg",
                &bgl_grid,
                &[
                    &bufs.params_buffer,
                    &bufs.pred,
                    &bufs.cell_key,
                    &bufs.histogram,
                    &bufs.prefix,
                    &bufs.write_heads,
                    &bufs.sorted,
                    &bufs.offsets,
                ],
            ),
            scan: bind_group(
                &device,
                "scan_bg",
                &bgl_scan,
                &[&bufs.scan_params_buffer, &bufs.histogram, &bufs.prefix, &bufs.block_sums],
            ),
            solver: bind_group(
                &device,
                "solver_bg",
                &bgl_solver,
                &[
                    &bufs.params_buffer,
                    &bufs.pos,
                    &bufs.pred,
                    &bufs.vel,
                    &bufs.density,
                    &bufs.lambda,
                    &bufs.delta,
                ],
            ),
            finalize: bind_group(
                &device,
                "finalize_bg",
                &bgl_finalize,
                &[
                    &bufs.params_buffer,
                    &bufs.pos,
                    &bufs.pred,
                    &bufs.vel,
                    &bufs.vel_frozen,
                    &bufs.omega,
                ],
            ),
            neighbors: bind_group(
                &device,
                "neighbors_bg",
                &bgl_neighbors,
                &[&bufs.cell_key, &bufs.sorted, &bufs.offsets],
            ),
        };

        tracing::info!(
            particles = particles.len(),
            cells = total_cells,
            "gpu backend ready"
        );

        Ok(Self {
            device,
            queue,
            adapter_name,
            pipelines,
            bgl_scan,
            bind_groups,
            bufs,
            params: *params,
            cells_per_axis,
            last_frame: frame,
            density: vec![0.0; particles.len()],
            snapshot: particles.positions(),
            fault: None,
            particles: particles.clone(),
        })
    }

    /// Name of the adapter the device was created on.
    pub fn adapter_name(&self) -> &str {
        &self.adapter_name
    }

    fn n_particles(&self) -> u32 {
        self.bufs.n_particles
    }

    fn encode_scan(&self, encoder: &mut wgpu::CommandEncoder, bind_group: &wgpu::BindGroup, n: u32) {
        let blocks = scan_blocks(n);
        dispatch(encoder, "scan_blocks", &self.pipelines.scan_blocks, &[bind_group], blocks);
        dispatch(encoder, "scan_block_sums", &self.pipelines.scan_block_sums, &[bind_group], 1);
        dispatch(
            encoder,
            "scan_add_offsets",
            &self.pipelines.add_block_offsets,
            &[bind_group],
            dispatch_size(n, WORKGROUP_SIZE),
        );
    }

    fn encode_grid(&self, encoder: &mut wgpu::CommandEncoder) {
        let p = &self.pipelines;
        let bg = &self.bind_groups.grid;
        let wg_particles = dispatch_size(self.n_particles(), WORKGROUP_SIZE);
        let wg_cells = dispatch_size(self.bufs.total_cells, WORKGROUP_SIZE);

        dispatch(encoder, "grid_clear", &p.clear_grid, &[bg], wg_cells);
        dispatch(encoder, "grid_assign", &p.assign_cells, &[bg], wg_particles);
        self.encode_scan(encoder, &self.bind_groups.scan, self.bufs.total_cells);
        dispatch(encoder, "grid_heads", &p.load_write_heads, &[bg], wg_cells);
        dispatch(encoder, "grid_scatter", &p.scatter, &[bg], wg_particles);
        dispatch(encoder, "grid_offsets", &p.build_offsets, &[bg], wg_particles);
    }

    fn encode_solver(&self, encoder: &mut wgpu::CommandEncoder) {
        let p = &self.pipelines;
        let groups = [&self.bind_groups.solver, &self.bind_groups.neighbors];
        let wg = dispatch_size(self.n_particles(), WORKGROUP_SIZE);
        for _ in 0..self.params.solver_iterations {
            dispatch(encoder, "density", &p.density, &groups, wg);
            dispatch(encoder, "lambda", &p.lambda, &groups, wg);
            dispatch(encoder, "delta", &p.delta, &groups, wg);
            dispatch(encoder, "apply_delta", &p.apply, &groups, wg);
        }
    }

    fn encode_finalize(&self, encoder: &mut wgpu::CommandEncoder) {
        let p = &self.pipelines;
        let groups = [&self.bind_groups.finalize, &self.bind_groups.neighbors];
        let wg = dispatch_size(self.n_particles(), WORKGROUP_SIZE);
        dispatch(encoder, "derive_velocity", &p.derive_velocity, &groups, wg);
        dispatch(encoder, "curl", &p.curl, &groups, wg);
        dispatch(encoder, "confinement", &p.confinement, &groups, wg);
        let bytes = self.n_particles() as u64 * 16;
        encoder.copy_buffer_to_buffer(&self.bufs.vel, 0, &self.bufs.vel_frozen, 0, bytes);
        dispatch(encoder, "xsph", &p.xsph, &groups, wg);
        dispatch(encoder, "write_positions", &p.write_positions, &groups, wg);
    }

    fn upload_params(&mut self, ctx: &FrameContext) {
        let params = GpuSimParams::new(&self.params, ctx, self.cells_per_axis, self.n_particles());
        self.bufs.update_params(&self.queue, &params);
        self.last_frame = *ctx;
    }

    /// Submit `encoder` after appending the particle readback, then pull the
    /// results into the host copy.
    fn submit_and_read(&mut self, mut encoder: wgpu::CommandEncoder) -> Result<(), SimulationError> {
        self.bufs.encode_readback(&mut encoder);
        self.queue.submit(std::iter::once(encoder.finish()));
        self.device.poll(wgpu::Maintain::Wait);
        self.bufs.read_staged(&self.device, &mut self.particles, &mut self.density)?;
        self.particles.write_positions(&mut self.snapshot);
        Ok(())
    }

    /// Run one frame and report device errors instead of logging them.
    pub fn try_step(&mut self, ctx: &FrameContext) -> Result<(), SimulationError> {
        self.upload_params(ctx);
        let mut encoder = self.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("pbf_step"),
        });

        self.bufs.encode_clear_transients(&mut encoder);
        dispatch(
            &mut encoder,
            "predict",
            &self.pipelines.predict,
            &[&self.bind_groups.solver, &self.bind_groups.neighbors],
            dispatch_size(self.n_particles(), WORKGROUP_SIZE),
        );
        self.encode_grid(&mut encoder);
        self.encode_solver(&mut encoder);
        self.encode_finalize(&mut encoder);

        self.submit_and_read(encoder)
    }

    /// Read the frame's spatial hash back from the device.
    pub fn read_grid(&self) -> Result<GpuGridSnapshot, SimulationError> {
        let n = self.n_particles() as usize;
        let cells = self.bufs.total_cells as usize;
        let (device, queue) = (&self.device, &self.queue);
        let offsets: Vec<GpuCellOffset> = read_buffer(device, queue, &self.bufs.offsets, cells)?;
        Ok(GpuGridSnapshot {
            cell_keys: read_buffer(device, queue, &self.bufs.cell_key, n)?,
            histogram: read_buffer(device, queue, &self.bufs.histogram, cells)?,
            prefix_sums: read_buffer(device, queue, &self.bufs.prefix, cells)?,
            sorted: read_buffer(device, queue, &self.bufs.sorted, n)?,
            offsets: offsets.into_iter().map(CellOffset::from).collect(),
        })
    }

    /// Exclusive prefix sum of `input` computed by the device scan passes.
    pub fn exclusive_scan(&self, input: &[u32]) -> Result<Vec<u32>, SimulationError> {
        let n = input.len() as u32;
        if n == 0 {
            return Ok(Vec::new());
        }
        if n > MAX_SCAN_CELLS {
            return Err(SimulationError::Backend(format!(
                "scan of {n} elements exceeds capacity {MAX_SCAN_CELLS}"
            )));
        }
        let uniform = create_uniform_buf(
            &self.device,
            "scan_test_params",
            &GpuScanParams {
                n,
                n_blocks: scan_blocks(n),
                _pad0: 0,
                _pad1: 0,
            },
        );
        let input_buf = create_storage_buf(&self.device, "scan_test_input", input);
        let output_buf = create_zeroed_buf(&self.device, "scan_test_output", n as u64 * 4);
        let sums_buf = create_zeroed_buf(&self.device, "scan_test_sums", scan_blocks(n) as u64 * 4);
        let bg = bind_group(
            &self.device,
            "scan_test_bg",
            &self.bgl_scan,
            &[&uniform, &input_buf, &output_buf, &sums_buf],
        );

        let mut encoder = self.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("scan_test"),
        });
        self.encode_scan(&mut encoder, &bg, n);
        self.queue.submit(std::iter::once(encoder.finish()));
        read_buffer(&self.device, &self.queue, &output_buf, n as usize)
    }
}

impl SolverBackend for GpuBackend {
    fn name(&self) -> &str {
        "gpu"
    }

    fn load_particles(&mut self, particles: &ParticleArrays) {
        self.particles.clone_from(particles);
        self.particles.write_positions(&mut self.snapshot);
        self.density.clear();
        self.density.resize(particles.len(), 0.0);
        self.bufs.upload_particles(&self.queue, particles);
    }

    fn set_parameters(&mut self, params: &SimulationParameters) {
        self.params = *params;
        let frame = self.last_frame;
        self.upload_params(&frame);
    }

    fn step(&mut self, ctx: &FrameContext) {
        if self.fault.is_some() {
            return;
        }
        if let Err(e) = self.try_step(ctx) {
            tracing::error!("gpu step failed: {e}");
            self.fault = Some(e);
        }
    }

    fn fault(&self) -> Option<&SimulationError> {
        self.fault.as_ref()
    }

    fn contain(&mut self, domain: &Aabb) {
        let frame = FrameContext {
            dt: self.last_frame.dt,
            domain: *domain,
        };
        self.upload_params(&frame);
        let mut encoder = self.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("pbf_contain"),
        });
        dispatch(
            &mut encoder,
            "contain",
            &self.pipelines.contain,
            &[&self.bind_groups.finalize, &self.bind_groups.neighbors],
            dispatch_size(self.n_particles(), WORKGROUP_SIZE),
        );
        if let Err(e) = self.submit_and_read(encoder) {
            tracing::error!("gpu containment readback failed: {e}");
            // keep the host copy consistent with the new domain
            self.particles.clamp_into(domain, self.params.particle_radius);
            self.particles.write_positions(&mut self.snapshot);
        }
    }

    fn particles(&self) -> &ParticleArrays {
        &self.particles
    }

    fn positions(&self) -> &[[f32; 3]] {
        &self.snapshot
    }

    fn densities(&self) -> &[f32] {
        &self.density
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Build a particle shader module: shared declarations, optional neighbor
/// view, then the shader body.
fn particle_shader(device: &wgpu::Device, label: &str, body: &str, with_neighbors: bool) -> wgpu::ShaderModule {
    let neighbors = if with_neighbors { NEIGHBORS_WGSL } else { "" };
    let source = format!("{COMMON_WGSL}\n{neighbors}\n{body}");
    device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some(label),
        source: wgpu::ShaderSource::Wgsl(source.into()),
    })
}

fn pipeline_layout(device: &wgpu::Device, label: &str, groups: &[&wgpu::BindGroupLayout]) -> wgpu::PipelineLayout {
    device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
        label: Some(label),
        bind_group_layouts: groups,
        push_constant_ranges: &[],
    })
}

fn compute_pipeline(
    device: &wgpu::Device,
    layout: &wgpu::PipelineLayout,
    module: &wgpu::ShaderModule,
    entry_point: &str,
) -> wgpu::ComputePipeline {
    device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
        label: Some(entry_point),
        layout: Some(layout),
        module,
        entry_point: Some(entry_point),
        compilation_options: Default::default(),
        cache: None,
    })
}

/// Bind `buffers` to consecutive bindings starting at 0.
fn bind_group(
    device: &wgpu::Device,
    label: &str,
    layout: &wgpu::BindGroupLayout,
    buffers: &[&wgpu::Buffer],
) -> wgpu::BindGroup {
    let entries: Vec<wgpu::BindGroupEntry> = buffers
        .iter()
        .enumerate()
        .map(|(binding, buf)| wgpu::BindGroupEntry {
            binding: binding as u32,
            resource: buf.as_entire_binding(),
        })
        .collect();
    device.create_bind_group(&wgpu::BindGroupDescriptor {
        label: Some(label),
        layout,
        entries: &entries,
    })
}

fn dispatch(
    encoder: &mut wgpu::CommandEncoder,
    label: &str,
    pipeline: &wgpu::ComputePipeline,
    groups: &[&wgpu::BindGroup],
    workgroups: u32,
) {
    let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
        label: Some(label),
        timestamp_writes: None,
    });
    pass.set_pipeline(pipeline);
    for (index, group) in groups.iter().enumerate() {
        pass.set_bind_group(index as u32, *group, &[]);
    }
    pass.dispatch_workgroups(workgroups.max(1), 1, 1);
}

fn dispatch_size(total: u32, workgroup_size: u32) -> u32 {
    total.div_ceil(workgroup_size)
}

fn bgl_uniform(binding: u32) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::COMPUTE,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Uniform,
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}

fn bgl_storage_ro(binding: u32) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::COMPUTE,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Storage { read_only: true },
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}

fn bgl_storage_rw(binding: u32) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::COMPUTE,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Storage { read_only: false },
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}
