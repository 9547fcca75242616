//! GPU buffer management for the N-body shader.
//!
//! Bodies are packed as `vec4<f32>` `(x, y, z, mass)` so one load fetches a
//! whole body. Forces come back as `vec4<f32>` with an unused `w`.

use wgpu::util::DeviceExt;

use crate::error::AcceleratorError;

/// Uniform block. Must match `Params` in `shaders/nbody.wgsl`.
#[repr(C)]
#[derive(Debug, Copy, Clone, bytemuck::Pod, bytemuck::Zeroable)]
pub struct NBodyParams {
    pub n: u32,
    pub g: f32,
    pub eps2: f32,
    pub _pad: u32,
}

/// Buffers for one N-body dispatch.
pub struct NBodyBuffers {
    pub params: wgpu::Buffer,
    pub bodies: wgpu::Buffer,
    pub forces: wgpu::Buffer,
    pub staging: wgpu::Buffer,
    pub n: usize,
}

/// Byte length of `n` `vec4<f32>` values.
fn vec4_bytes(n: usize) -> u64 {
    (n * 4 * std::mem::size_of::<f32>()) as u64
}

/// Pack flat positions and masses into `(x, y, z, m)` quadruples.
pub fn pack_bodies(positions: &[f64], masses: &[f64]) -> Vec<[f32; 4]> {
    positions
        .chunks(3)
        .zip(masses)
        .map(|(p, &m)| [p[0] as f32, p[1] as f32, p[2] as f32, m as f32])
        .collect()
}

impl NBodyBuffers {
    /// Upload bodies and parameters. `n` must be non-zero.
    pub fn new(device: &wgpu::Device, bodies: &[[f32; 4]], params: &NBodyParams) -> Self {
        let n = bodies.len();
        let byte_len = vec4_bytes(n);

        let params = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("nbody_params"),
            contents: bytemuck::bytes_of(params),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });
        let bodies = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("nbody_bodies"),
            contents: bytemuck::cast_slice(bodies),
            usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST,
        });
        let forces = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("nbody_forces"),
            size: byte_len,
            usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_SRC,
            mapped_at_creation: false,
        });
        let staging = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("nbody_staging"),
            size: byte_len,
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        Self {
            params,
            bodies,
            forces,
            staging,
            n,
        }
    }

    /// Record the copy of the force buffer into the staging buffer.
    pub fn encode_readback(&self, encoder: &mut wgpu::CommandEncoder) {
        encoder.copy_buffer_to_buffer(&self.forces, 0, &self.staging, 0, vec4_bytes(self.n));
    }

    /// Block on mapping the staging buffer and return the packed forces.
    pub fn read_forces(&self, device: &wgpu::Device) -> Result<Vec<[f32; 4]>, AcceleratorError> {
        let slice = self.staging.slice(..);
        let (tx, rx) = std::sync::mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            // Receiver outlives the poll below.
            let _ = tx.send(result);
        });
        device.poll(wgpu::Maintain::Wait);
        rx.recv()
            .map_err(|e| AcceleratorError::Dispatch(format!("readback channel closed: {e}")))?
            .map_err(|e| AcceleratorError::Dispatch(format!("buffer map failed: {e}")))?;

        let data = slice.get_mapped_range();
        let result: Vec<[f32; 4]> = bytemuck::cast_slice(&data).to_vec();
        drop(data);
        self.staging.unmap();
        Ok(result)
    }
}
