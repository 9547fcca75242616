//! wgpu compute backend (Metal/Vulkan/DX12).
//!
//! `GpuAccelerator` implements [`Accelerator`] for the N-body force kernel
//! only; the other kernels report `Unsupported` and run on the CPU.
//!
//! The shader computes in `f32`. Results are widened back to `f64` and are
//! therefore only accurate to single precision.
//!
//! # Bind group layout
//! - Group 0, binding 0: `NBodyParams` (uniform)
//! - Group 0, binding 1: bodies `vec4<f32>` (storage, read)
//! - Group 0, binding 2: forces `vec4<f32>` (storage, read-write)

pub mod buffers;

use buffers::{pack_bodies, NBodyBuffers, NBodyParams};

use crate::accel::Accelerator;
use crate::error::AcceleratorError;

/// Workgroup size baked into `shaders/nbody.wgsl`.
const WORKGROUP_SIZE: u32 = 256;

/// A wgpu device with the N-body pipeline compiled.
pub struct GpuAccelerator {
    device: wgpu::Device,
    queue: wgpu::Queue,
    pipeline: wgpu::ComputePipeline,
    bind_group_layout: wgpu::BindGroupLayout,
    adapter_name: String,
}

impl GpuAccelerator {
    /// Acquire an adapter and device, build the pipeline and run the self-test.
    ///
    /// Returns an error if no adapter is found, the device cannot be created,
    /// or the self-test disagrees with the expected two-body force.
    pub fn new() -> Result<Self, AcceleratorError> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });

        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::HighPerformance,
            compatible_surface: None,
            force_fallback_adapter: false,
        }))
        .ok_or(AcceleratorError::NoAdapter)?;

        let adapter_name = adapter.get_info().name;
        tracing::info!("GPU adapter: {adapter_name:?}");

        let (device, queue) = pollster::block_on(adapter.request_device(
            &wgpu::DeviceDescriptor {
                label: Some("simkernels_device"),
                required_features: wgpu::Features::empty(),
                required_limits: wgpu::Limits::default(),
                memory_hints: wgpu::MemoryHints::Performance,
            },
            None,
        ))
        .map_err(|e| AcceleratorError::DeviceCreation(e.to_string()))?;

        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("nbody"),
            source: wgpu::ShaderSource::Wgsl(include_str!("shaders/nbody.wgsl").into()),
        });

        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("nbody_bgl"),
            entries: &[bgl_uniform(0), bgl_storage_ro(1), bgl_storage_rw(2)],
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("nbody_layout"),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });

        let pipeline = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
            label: Some("nbody_forces"),
            layout: Some(&pipeline_layout),
            module: &shader,
            entry_point: Some("main"),
            compilation_options: Default::default(),
            cache: None,
        });

        let gpu = Self {
            device,
            queue,
            pipeline,
            bind_group_layout,
            adapter_name,
        };
        gpu.self_test()?;
        Ok(gpu)
    }

    /// Two unit masses one unit apart with `G = 1` must attract with unit force.
    fn self_test(&self) -> Result<(), AcceleratorError> {
        let bodies = [[0.0, 0.0, 0.0, 1.0], [1.0, 0.0, 0.0, 1.0]];
        let forces = self.dispatch_nbody(&bodies, 1.0, 0.0)?;
        let ok = (forces[0][0] - 1.0).abs() < 1.0e-5
            && (forces[1][0] + 1.0).abs() < 1.0e-5
            && forces[0][1] == 0.0
            && forces[0][2] == 0.0;
        if !ok {
            return Err(AcceleratorError::SelfTest(format!(
                "two-body force {:?}, expected [1, 0, 0] / [-1, 0, 0]",
                &forces[..2]
            )));
        }
        tracing::debug!("GPU self-test passed");
        Ok(())
    }

    /// Run the shader over packed bodies and return packed forces.
    fn dispatch_nbody(
        &self,
        bodies: &[[f32; 4]],
        g: f32,
        eps2: f32,
    ) -> Result<Vec<[f32; 4]>, AcceleratorError> {
        let n = bodies.len();
        let params = NBodyParams {
            n: n as u32,
            g,
            eps2,
            _pad: 0,
        };

        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let bufs = NBodyBuffers::new(&self.device, bodies, &params);

        let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("nbody_bg"),
            layout: &self.bind_group_layout,
            entries: &[
                wgpu::BindGroupEntry { binding: 0, resource: bufs.params.as_entire_binding() },
                wgpu::BindGroupEntry { binding: 1, resource: bufs.bodies.as_entire_binding() },
                wgpu::BindGroupEntry { binding: 2, resource: bufs.forces.as_entire_binding() },
            ],
        });

        let mut encoder = self.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("nbody"),
        });
        {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("nbody_forces"),
                timestamp_writes: None,
            });
            pass.set_pipeline(&self.pipeline);
            pass.set_bind_group(0, &bind_group, &[]);
            pass.dispatch_workgroups(dispatch_size(n as u32, WORKGROUP_SIZE), 1, 1);
        }
        bufs.encode_readback(&mut encoder);
        self.queue.submit(std::iter::once(encoder.finish()));

        if let Some(err) = pollster::block_on(self.device.pop_error_scope()) {
            return Err(AcceleratorError::Dispatch(err.to_string()));
        }
        bufs.read_forces(&self.device)
    }
}

impl Accelerator for GpuAccelerator {
    fn name(&self) -> String {
        self.adapter_name.clone()
    }

    fn is_available(&self) -> bool {
        true
    }

    fn nbody_forces(
        &self,
        positions: &[f64],
        masses: &[f64],
        forces: &mut [f64],
        g: f64,
        softening: f64,
    ) -> Result<(), AcceleratorError> {
        if masses.is_empty() {
            return Ok(());
        }
        let bodies = pack_bodies(positions, masses);
        let packed = self.dispatch_nbody(&bodies, g as f32, (softening * softening) as f32)?;

        if packed
            .iter()
            .take(masses.len())
            .any(|f| !(f[0].is_finite() && f[1].is_finite() && f[2].is_finite()))
        {
            return Err(AcceleratorError::NonFinite);
        }

        for (out, f) in forces.chunks_mut(3).zip(&packed) {
            out[0] = f[0] as f64;
            out[1] = f[1] as f64;
            out[2] = f[2] as f64;
        }
        tracing::debug!(n = masses.len(), "N-body GPU dispatch");
        Ok(())
    }
}

/// Calculate dispatch workgroup count: ceil(total / workgroup_size).
fn dispatch_size(total: u32, workgroup_size: u32) -> u32 {
    total.div_ceil(workgroup_size)
}

// ---- Bind group layout entry helpers ----

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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dispatch_size_rounds_up() {
        assert_eq!(dispatch_size(1, 256), 1);
        assert_eq!(dispatch_size(256, 256), 1);
        assert_eq!(dispatch_size(257, 256), 2);
    }
}
