//! GPU buffer management for PBF particle and grid data.
//!
//! Particle vectors live on the device as `array<vec4<f32>>` (w unused) so a
//! pass binds one buffer per quantity instead of three. The host keeps the
//! struct-of-arrays layout; [`pack_vec4`] and [`unpack_vec4`] convert between
//! the two on upload and readback.

use wgpu::util::DeviceExt;

use crate::error::SimulationError;
use crate::neighbor::{CellOffset, GridLayout};
use crate::params::SimulationParameters;
use crate::particle::ParticleArrays;
use crate::sph::poly6_coefficient;
use crate::FrameContext;

/// Simulation parameters uniform buffer layout.
/// Must match the SimParams struct in `shaders/common.wgsl` exactly.
#[repr(C)]
#[derive(Debug, Copy, Clone, bytemuck::Pod, bytemuck::Zeroable)]
pub struct GpuSimParams {
    pub domain_min: [f32; 4],
    pub domain_max: [f32; 4],
    pub cell_size: [f32; 4],
    pub gravity: [f32; 4],
    /// xyz: cells per axis, w: total cells.
    pub grid_dims: [u32; 4],
    /// xyz: stencil reach, w: particle count.
    pub reach: [u32; 4],
    pub dt: f32,
    pub h: f32,
    pub particle_radius: f32,
    pub rest_density: f32,
    pub particle_mass: f32,
    pub rest_volume: f32,
    pub relaxation_epsilon: f32,
    pub poly6_coeff: f32,
    pub spiky_coeff: f32,
    pub scorr_k: f32,
    pub scorr_w_dq: f32,
    pub scorr_n: f32,
    pub vorticity_epsilon: f32,
    pub xsph_viscosity: f32,
    pub wall_restitution: f32,
    pub _pad: f32,
}

impl GpuSimParams {
    /// Uniform contents for one frame.
    pub fn new(params: &SimulationParameters, ctx: &FrameContext, cells_per_axis: [u32; 3], n_particles: u32) -> Self {
        let h = params.smoothing_radius;
        let layout = GridLayout::new(&ctx.domain, cells_per_axis, h);
        let dq = params.artificial_pressure_dq * h;
        let h3 = h * h * h;
        Self {
            domain_min: vec4(ctx.domain.min),
            domain_max: vec4(ctx.domain.max),
            cell_size: vec4(layout.cell_size),
            gravity: vec4(params.gravity),
            grid_dims: [layout.dims[0], layout.dims[1], layout.dims[2], layout.cell_count() as u32],
            reach: [layout.reach[0], layout.reach[1], layout.reach[2], n_particles],
            dt: ctx.dt,
            h,
            particle_radius: params.particle_radius,
            rest_density: params.rest_density,
            particle_mass: params.particle_mass(),
            rest_volume: params.rest_volume(),
            relaxation_epsilon: params.relaxation_epsilon,
            poly6_coeff: poly6_coefficient(h),
            spiky_coeff: -45.0 / (std::f32::consts::PI * h3 * h3),
            scorr_k: params.artificial_pressure_k,
            scorr_w_dq: crate::sph::poly6(dq * dq, h),
            scorr_n: params.artificial_pressure_n as f32,
            vorticity_epsilon: params.vorticity_epsilon,
            xsph_viscosity: params.xsph_viscosity,
            wall_restitution: params.wall_restitution,
            _pad: 0.0,
        }
    }
}

/// Uniform for the prefix-sum passes. Must match ScanParams in `shaders/scan.wgsl`.
#[repr(C)]
#[derive(Debug, Copy, Clone, bytemuck::Pod, bytemuck::Zeroable)]
pub struct GpuScanParams {
    pub n: u32,
    pub n_blocks: u32,
    pub _pad0: u32,
    pub _pad1: u32,
}

/// Device-side cell offset. Same layout as the WGSL `CellOffset`.
#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, Eq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct GpuCellOffset {
    pub start: i32,
    pub length: u32,
}

impl From<GpuCellOffset> for CellOffset {
    fn from(o: GpuCellOffset) -> Self {
        if o.start < 0 {
            CellOffset::EMPTY
        } else {
            CellOffset {
                start: o.start,
                length: o.length,
            }
        }
    }
}

/// Elements one scan workgroup covers (256 threads, two elements each).
pub const SCAN_BLOCK: u32 = 512;

/// Largest cell count the two-level scan supports.
pub const MAX_SCAN_CELLS: u32 = SCAN_BLOCK * SCAN_BLOCK;

/// All GPU buffers needed for the PBF pipeline.
pub struct GpuBuffers {
    // Uniform buffers
    pub params_buffer: wgpu::Buffer,
    pub scan_params_buffer: wgpu::Buffer,

    // Particle buffers (vec4 per particle)
    pub pos: wgpu::Buffer,
    pub pred: wgpu::Buffer,
    pub vel: wgpu::Buffer,
    pub vel_frozen: wgpu::Buffer,
    pub omega: wgpu::Buffer,
    pub delta: wgpu::Buffer,

    // Scalar per-particle buffers
    pub density: wgpu::Buffer,
    pub lambda: wgpu::Buffer,

    // Grid buffers, rebuilt every frame
    pub cell_key: wgpu::Buffer,
    pub histogram: wgpu::Buffer,
    pub prefix: wgpu::Buffer,
    pub block_sums: wgpu::Buffer,
    pub write_heads: wgpu::Buffer,
    pub sorted: wgpu::Buffer,
    pub offsets: wgpu::Buffer,

    // Staging buffers for the per-frame readback
    pub staging_pos: wgpu::Buffer,
    pub staging_pred: wgpu::Buffer,
    pub staging_vel: wgpu::Buffer,
    pub staging_density: wgpu::Buffer,

    /// Number of particles
    pub n_particles: u32,
    /// Total number of grid cells
    pub total_cells: u32,
}

/// Minimum buffer size (wgpu requires non-zero buffers).
const MIN_BUF_SIZE: u64 = 16;

const VEC4_BYTES: u64 = 16;
const SCALAR_BYTES: u64 = 4;

/// Interleave three component arrays into `[x, y, z, 0]` rows.
pub fn pack_vec4(x: &[f32], y: &[f32], z: &[f32]) -> Vec<[f32; 4]> {
    x.iter()
        .zip(y)
        .zip(z)
        .map(|((&x, &y), &z)| [x, y, z, 0.0])
        .collect()
}

/// Split `[x, y, z, _]` rows back into component arrays.
pub fn unpack_vec4(rows: &[[f32; 4]], x: &mut Vec<f32>, y: &mut Vec<f32>, z: &mut Vec<f32>) {
    x.clear();
    y.clear();
    z.clear();
    for r in rows {
        x.push(r[0]);
        y.push(r[1]);
        z.push(r[2]);
    }
}

fn vec4(v: [f32; 3]) -> [f32; 4] {
    [v[0], v[1], v[2], 0.0]
}

const STORAGE_USAGE: wgpu::BufferUsages = wgpu::BufferUsages::STORAGE
    .union(wgpu::BufferUsages::COPY_SRC)
    .union(wgpu::BufferUsages::COPY_DST);

/// Create a storage buffer from Pod data. If the slice is empty, creates a
/// minimal buffer.
pub(crate) fn create_storage_buf<T: bytemuck::Pod>(device: &wgpu::Device, label: &str, data: &[T]) -> wgpu::Buffer {
    if data.is_empty() {
        create_zeroed_buf(device, label, 0)
    } else {
        device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(label),
            contents: bytemuck::cast_slice(data),
            usage: STORAGE_USAGE,
        })
    }
}

/// Create a zero-initialized storage buffer of `size` bytes.
pub(crate) fn create_zeroed_buf(device: &wgpu::Device, label: &str, size: u64) -> wgpu::Buffer {
    device.create_buffer(&wgpu::BufferDescriptor {
        label: Some(label),
        size: size.max(MIN_BUF_SIZE),
        usage: STORAGE_USAGE,
        mapped_at_creation: false,
    })
}

/// Create a staging (MAP_READ) buffer for readback.
fn create_staging_buf(device: &wgpu::Device, label: &str, size: u64) -> wgpu::Buffer {
    device.create_buffer(&wgpu::BufferDescriptor {
        label: Some(label),
        size: size.max(MIN_BUF_SIZE),
        usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
        mapped_at_creation: false,
    })
}

/// Create a uniform buffer holding `value`.
pub(crate) fn create_uniform_buf<T: bytemuck::Pod>(device: &wgpu::Device, label: &str, value: &T) -> wgpu::Buffer {
    device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
        label: Some(label),
        contents: bytemuck::bytes_of(value),
        usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
    })
}

/// Workgroups needed to scan `n` elements.
pub fn scan_blocks(n: u32) -> u32 {
    n.div_ceil(SCAN_BLOCK).max(1)
}

impl GpuBuffers {
    /// Create all GPU buffers from the initial particle pool.
    pub fn new(
        device: &wgpu::Device,
        particles: &ParticleArrays,
        total_cells: u32,
        params: &GpuSimParams,
    ) -> Self {
        let n = particles.len() as u64;
        let cells = total_cells as u64;

        let params_buffer = create_uniform_buf(device, "sim_params", params);
        let scan_params_buffer = create_uniform_buf(
            device,
            "scan_params",
            &GpuScanParams {
                n: total_cells,
                n_blocks: scan_blocks(total_cells),
                _pad0: 0,
                _pad1: 0,
            },
        );

        let pos = create_storage_buf(device, "pos", &pack_vec4(&particles.x, &particles.y, &particles.z));
        let pred = create_storage_buf(device, "pred", &pack_vec4(&particles.px, &particles.py, &particles.pz));
        let vel = create_storage_buf(device, "vel", &pack_vec4(&particles.vx, &particles.vy, &particles.vz));
        let vel_frozen = create_zeroed_buf(device, "vel_frozen", n * VEC4_BYTES);
        let omega = create_zeroed_buf(device, "omega", n * VEC4_BYTES);
        let delta = create_zeroed_buf(device, "delta", n * VEC4_BYTES);
        let density = create_zeroed_buf(device, "density", n * SCALAR_BYTES);
        let lambda = create_zeroed_buf(device, "lambda", n * SCALAR_BYTES);

        let cell_key = create_zeroed_buf(device, "cell_key", n * SCALAR_BYTES);
        let histogram = create_zeroed_buf(device, "histogram", cells * SCALAR_BYTES);
        let prefix = create_zeroed_buf(device, "prefix", cells * SCALAR_BYTES);
        let block_sums = create_zeroed_buf(device, "block_sums", scan_blocks(total_cells) as u64 * SCALAR_BYTES);
        let write_heads = create_zeroed_buf(device, "write_heads", cells * SCALAR_BYTES);
        let sorted = create_zeroed_buf(device, "sorted", n * SCALAR_BYTES);
        let offsets = create_zeroed_buf(device, "offsets", cells * 2 * SCALAR_BYTES);

        let staging_pos = create_staging_buf(device, "staging_pos", n * VEC4_BYTES);
        let staging_pred = create_staging_buf(device, "staging_pred", n * VEC4_BYTES);
        let staging_vel = create_staging_buf(device, "staging_vel", n * VEC4_BYTES);
        let staging_density = create_staging_buf(device, "staging_density", n * SCALAR_BYTES);

        Self {
            params_buffer,
            scan_params_buffer,
            pos,
            pred,
            vel,
            vel_frozen,
            omega,
            delta,
            density,
            lambda,
            cell_key,
            histogram,
            prefix,
            block_sums,
            write_heads,
            sorted,
            offsets,
            staging_pos,
            staging_pred,
            staging_vel,
            staging_density,
            n_particles: n as u32,
            total_cells,
        }
    }

    /// Update the uniform params buffer.
    pub fn update_params(&self, queue: &wgpu::Queue, params: &GpuSimParams) {
        queue.write_buffer(&self.params_buffer, 0, bytemuck::bytes_of(params));
    }

    /// Overwrite positions, predicted positions and velocities.
    pub fn upload_particles(&self, queue: &wgpu::Queue, particles: &ParticleArrays) {
        let pos = pack_vec4(&particles.x, &particles.y, &particles.z);
        let pred = pack_vec4(&particles.px, &particles.py, &particles.pz);
        let vel = pack_vec4(&particles.vx, &particles.vy, &particles.vz);
        queue.write_buffer(&self.pos, 0, bytemuck::cast_slice(&pos));
        queue.write_buffer(&self.pred, 0, bytemuck::cast_slice(&pred));
        queue.write_buffer(&self.vel, 0, bytemuck::cast_slice(&vel));
    }

    /// Zero the per-frame scratch buffers.
    pub fn encode_clear_transients(&self, encoder: &mut wgpu::CommandEncoder) {
        for buf in [&self.density, &self.lambda, &self.delta, &self.omega, &self.vel_frozen] {
            encoder.clear_buffer(buf, 0, None);
        }
    }

    /// Copy particle state into the staging buffers.
    pub fn encode_readback(&self, encoder: &mut wgpu::CommandEncoder) {
        let n = self.n_particles as u64;
        encoder.copy_buffer_to_buffer(&self.pos, 0, &self.staging_pos, 0, n * VEC4_BYTES);
        encoder.copy_buffer_to_buffer(&self.pred, 0, &self.staging_pred, 0, n * VEC4_BYTES);
        encoder.copy_buffer_to_buffer(&self.vel, 0, &self.staging_vel, 0, n * VEC4_BYTES);
        encoder.copy_buffer_to_buffer(&self.density, 0, &self.staging_density, 0, n * SCALAR_BYTES);
    }

    /// Map the staging buffers (after [`GpuBuffers::encode_readback`] was
    /// submitted) into `particles` and `density`.
    pub fn read_staged(
        &self,
        device: &wgpu::Device,
        particles: &mut ParticleArrays,
        density: &mut Vec<f32>,
    ) -> Result<(), SimulationError> {
        let n = self.n_particles as usize;
        let pos: Vec<[f32; 4]> = map_staging(device, &self.staging_pos, n)?;
        let pred: Vec<[f32; 4]> = map_staging(device, &self.staging_pred, n)?;
        let vel: Vec<[f32; 4]> = map_staging(device, &self.staging_vel, n)?;
        *density = map_staging(device, &self.staging_density, n)?;

        unpack_vec4(&pos, &mut particles.x, &mut particles.y, &mut particles.z);
        unpack_vec4(&pred, &mut particles.px, &mut particles.py, &mut particles.pz);
        unpack_vec4(&vel, &mut particles.vx, &mut particles.vy, &mut particles.vz);
        Ok(())
    }
}

/// Block on mapping a staging buffer and read `count` elements.
pub(crate) fn map_staging<T: bytemuck::Pod>(
    device: &wgpu::Device,
    buffer: &wgpu::Buffer,
    count: usize,
) -> Result<Vec<T>, SimulationError> {
    if count == 0 {
        return Ok(Vec::new());
    }
    let bytes = (count * std::mem::size_of::<T>()) as u64;
    let slice = buffer.slice(..bytes);
    let (tx, rx) = std::sync::mpsc::channel();
    slice.map_async(wgpu::MapMode::Read, move |result| {
        let _ = tx.send(result);
    });
    device.poll(wgpu::Maintain::Wait);
    rx.recv()
        .map_err(|e| SimulationError::Backend(format!("readback channel closed: {e}")))?
        .map_err(|e| SimulationError::Backend(format!("buffer map failed: {e}")))?;

    let data = slice.get_mapped_range();
    let result: Vec<T> = bytemuck::cast_slice(&data).to_vec();
    drop(data);
    buffer.unmap();
    Ok(result)
}

/// Copy `count` elements of `source` into a fresh staging buffer and read
/// them back. Used for inspection outside the per-frame path.
pub(crate) fn read_buffer<T: bytemuck::Pod>(
    device: &wgpu::Device,
    queue: &wgpu::Queue,
    source: &wgpu::Buffer,
    count: usize,
) -> Result<Vec<T>, SimulationError> {
    if count == 0 {
        return Ok(Vec::new());
    }
    let bytes = (count * std::mem::size_of::<T>()) as u64;
    let staging = create_staging_buf(device, "inspect_staging", bytes);
    let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
        label: Some("inspect_readback"),
    });
    encoder.copy_buffer_to_buffer(source, 0, &staging, 0, bytes);
    queue.submit(std::iter::once(encoder.finish()));
    map_staging(device, &staging, count)
}
