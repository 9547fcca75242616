//! SPH smoothing kernels and the three-pass SPH fluid step.
//!
//! Uses the Müller (2003) kernel family in 3D with compact support radius `h`:
//! poly6 for density, spiky gradient for pressure and the viscosity Laplacian
//! for viscous diffusion.
//!
//! A step is three passes separated by full barriers. Every pass writes only
//! its own particle's slots and reads the previous pass's output for all
//! neighbors, so each pass is a plain parallel map over particle index:
//!
//! 1. density and pressure
//! 2. forces (body + pressure + viscosity)
//! 3. semi-implicit Euler integration
//!
//! Neighbor search is all-pairs; a particle's neighborhood is every other
//! particle closer than `h`.

use std::f64::consts::PI;
use std::sync::Arc;

use rayon::prelude::*;

use crate::accel::Accelerator;
use crate::config::KernelConfig;
use crate::dispatch::Dispatcher;
use crate::eos::linear_eos;
use crate::error::{check_finite, check_len, check_positive, KernelError, KernelResult};
use crate::{BackendType, Provider};

/// Pairs closer than this contribute no pressure or viscosity force.
pub const DISTANCE_FLOOR: f64 = 1.0e-10;

/// Lower bound on density in the integration pass.
pub const DENSITY_FLOOR: f64 = 1.0e-10;

// ---------------------------------------------------------------------------
// Smoothing kernels
// ---------------------------------------------------------------------------

/// Poly6 density kernel.
///
/// ```text
/// W(r, h) = 315 / (64 pi h^9) * (h^2 - r^2)^3    for r <= h
/// W(r, h) = 0                                    for r > h
/// ```
pub fn poly6(r: f64, h: f64) -> f64 {
    if r > h {
        return 0.0;
    }
    let diff = h * h - r * r;
    315.0 / (64.0 * PI * h.powi(9)) * diff * diff * diff
}

/// Radial derivative of the spiky kernel.
///
/// ```text
/// dW/dr = -45 / (pi h^6) * (h - r)^2    for 0 < r <= h
/// ```
///
/// Zero at `r == 0` and beyond the support.
pub fn spiky_grad(r: f64, h: f64) -> f64 {
    if r <= 0.0 || r > h {
        return 0.0;
    }
    let diff = h - r;
    -45.0 / (PI * h.powi(6)) * diff * diff
}

/// Laplacian of the viscosity kernel.
///
/// ```text
/// lap W = 45 / (pi h^6) * (h - r)    for r <= h
/// ```
pub fn viscosity_laplacian(r: f64, h: f64) -> f64 {
    if r > h {
        return 0.0;
    }
    45.0 / (PI * h.powi(6)) * (h - r)
}

// ---------------------------------------------------------------------------
// Parameters and borrowed state
// ---------------------------------------------------------------------------

/// Scalar parameters of one SPH step.
///
/// All particles share one mass.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SphParams {
    /// Time-step length.
    pub dt: f64,
    /// Per-particle mass.
    pub mass: f64,
    /// Rest density `rho0` of the linear equation of state.
    pub rest_density: f64,
    /// Gas constant `k` of the linear equation of state.
    pub stiffness: f64,
    /// Dynamic viscosity coefficient `mu`.
    pub viscosity: f64,
    /// Smoothing radius `h`; also the neighbor cutoff.
    pub smoothing_radius: f64,
    /// Body acceleration applied to every particle.
    pub gravity: [f64; 3],
}

impl Default for SphParams {
    fn default() -> Self {
        Self {
            dt: 1.0e-3,
            mass: 0.02,
            rest_density: 1000.0,
            stiffness: 3.0,
            viscosity: 3.5,
            smoothing_radius: 0.0457,
            gravity: [0.0, -9.81, 0.0],
        }
    }
}

impl SphParams {
    /// Check every parameter for a usable value.
    pub fn validate(&self) -> KernelResult<()> {
        check_positive("smoothing_radius", self.smoothing_radius)?;
        check_positive("mass", self.mass)?;
        check_finite("dt", self.dt)?;
        check_finite("rest_density", self.rest_density)?;
        check_finite("stiffness", self.stiffness)?;
        check_finite("viscosity", self.viscosity)?;
        if self.viscosity < 0.0 {
            return Err(KernelError::InvalidParameter {
                name: "viscosity",
                value: self.viscosity,
                reason: "must be >= 0",
            });
        }
        for g in self.gravity {
            check_finite("gravity", g)?;
        }
        Ok(())
    }
}

/// Caller-owned SPH particle buffers.
///
/// Vectors are flat `[x0, y0, z0, x1, ...]`; scalars are indexed by particle.
/// `densities`, `pressures` and `forces` are outputs of the step.
#[derive(Debug)]
pub struct SphFields<'a> {
    /// Positions, `3 * n`.
    pub positions: &'a mut [f64],
    /// Velocities, `3 * n`.
    pub velocities: &'a mut [f64],
    /// Densities, `n`.
    pub densities: &'a mut [f64],
    /// Pressures, `n`.
    pub pressures: &'a mut [f64],
    /// Forces, `3 * n`.
    pub forces: &'a mut [f64],
}

impl<'a> SphFields<'a> {
    /// Bundle the buffers, checking that their lengths are congruent.
    pub fn new(
        positions: &'a mut [f64],
        velocities: &'a mut [f64],
        densities: &'a mut [f64],
        pressures: &'a mut [f64],
        forces: &'a mut [f64],
    ) -> KernelResult<Self> {
        let fields = Self {
            positions,
            velocities,
            densities,
            pressures,
            forces,
        };
        fields.check()?;
        Ok(fields)
    }

    /// Number of particles.
    pub fn len(&self) -> usize {
        self.densities.len()
    }

    /// Whether there are no particles.
    pub fn is_empty(&self) -> bool {
        self.densities.is_empty()
    }

    fn check(&self) -> KernelResult<usize> {
        let n = self.densities.len();
        check_len("positions", 3 * n, self.positions.len())?;
        check_len("velocities", 3 * n, self.velocities.len())?;
        check_len("pressures", n, self.pressures.len())?;
        check_len("forces", 3 * n, self.forces.len())?;
        Ok(n)
    }
}

// ---------------------------------------------------------------------------
// Passes
// ---------------------------------------------------------------------------

#[inline]
fn offset(positions: &[f64], i: usize, j: usize) -> ([f64; 3], f64) {
    let d = [
        positions[3 * i] - positions[3 * j],
        positions[3 * i + 1] - positions[3 * j + 1],
        positions[3 * i + 2] - positions[3 * j + 2],
    ];
    let r = (d[0] * d[0] + d[1] * d[1] + d[2] * d[2]).sqrt();
    (d, r)
}

/// Pass 1: density by poly6 summation over all particles (self included),
/// then pressure from [`linear_eos`].
///
/// ```text
/// rho_i = sum_j m W_poly6(|x_i - x_j|, h)
/// ```
pub fn compute_density_pressure(
    positions: &[f64],
    densities: &mut [f64],
    pressures: &mut [f64],
    params: &SphParams,
) {
    let n = densities.len();
    let h = params.smoothing_radius;

    densities
        .par_iter_mut()
        .zip(pressures.par_iter_mut())
        .enumerate()
        .for_each(|(i, (rho, p))| {
            let mut sum = 0.0;
            for j in 0..n {
                let (_, r) = offset(positions, i, j);
                sum += params.mass * poly6(r, h);
            }
            *rho = sum;
            *p = linear_eos(sum, params.rest_density, params.stiffness);
        });
}

/// Pass 2: total force on each particle.
///
/// ```text
/// F_i = rho_i g
///     + sum_{j != i, r < h} -m (p_i + p_j) / (2 rho_j) * dW_spiky/dr * (x_i - x_j) / r
///     + sum_{j != i, r < h}  mu m / rho_j * (v_j - v_i) * lap W_visc
/// ```
///
/// The pressure term divides by `2 rho_j` only, so it is not symmetric in
/// `i` and `j`. This is the Müller (2003) form and is kept as is.
pub fn compute_forces(
    positions: &[f64],
    velocities: &[f64],
    densities: &[f64],
    pressures: &[f64],
    forces: &mut [f64],
    params: &SphParams,
) {
    let n = densities.len();
    let h = params.smoothing_radius;
    let m = params.mass;
    let mu = params.viscosity;

    forces.par_chunks_mut(3).enumerate().for_each(|(i, f)| {
        let rho_i = densities[i];
        let mut acc = [
            rho_i * params.gravity[0],
            rho_i * params.gravity[1],
            rho_i * params.gravity[2],
        ];

        for j in 0..n {
            if j == i {
                continue;
            }
            let (d, r) = offset(positions, i, j);
            if r < DISTANCE_FLOOR || r >= h {
                continue;
            }
            let rho_j = densities[j];

            let pressure = -m * (pressures[i] + pressures[j]) / (2.0 * rho_j) * spiky_grad(r, h) / r;
            let visc = mu * m / rho_j * viscosity_laplacian(r, h);
            for k in 0..3 {
                acc[k] += pressure * d[k] + visc * (velocities[3 * j + k] - velocities[3 * i + k]);
            }
        }
        f.copy_from_slice(&acc);
    });
}

/// Pass 3: semi-implicit Euler.
///
/// ```text
/// v += dt * F / max(rho, floor)
/// x += dt * v
/// ```
pub fn integrate(
    positions: &mut [f64],
    velocities: &mut [f64],
    densities: &[f64],
    forces: &[f64],
    dt: f64,
) {
    positions
        .par_chunks_mut(3)
        .zip(velocities.par_chunks_mut(3))
        .enumerate()
        .for_each(|(i, (x, v))| {
            let inv_rho = 1.0 / densities[i].max(DENSITY_FLOOR);
            for k in 0..3 {
                v[k] += dt * forces[3 * i + k] * inv_rho;
                x[k] += dt * v[k];
            }
        });
}

/// Run the three passes in order on the current rayon pool.
pub fn step_cpu(fields: &mut SphFields<'_>, params: &SphParams) {
    compute_density_pressure(fields.positions, fields.densities, fields.pressures, params);
    compute_forces(
        fields.positions,
        fields.velocities,
        fields.densities,
        fields.pressures,
        fields.forces,
        params,
    );
    integrate(
        fields.positions,
        fields.velocities,
        fields.densities,
        fields.forces,
        params.dt,
    );
}

// ---------------------------------------------------------------------------
// Provider
// ---------------------------------------------------------------------------

/// SPH provider with accelerator dispatch.
pub struct SphProvider {
    dispatch: Dispatcher,
}

impl SphProvider {
    /// Auto-probing provider with default configuration.
    pub fn new() -> Self {
        Self::from_config(&KernelConfig::default()).unwrap_or_else(|_| Self::cpu())
    }

    /// CPU-only provider on the global worker pool.
    pub fn cpu() -> Self {
        Self {
            dispatch: Dispatcher::cpu(KernelConfig::cpu().thresholds.sph_min_particles),
        }
    }

    /// CPU-only provider with a dedicated pool of `threads` workers.
    pub fn with_threads(threads: usize) -> KernelResult<Self> {
        Self::from_config(&KernelConfig {
            threads: Some(threads),
            ..KernelConfig::cpu()
        })
    }

    /// Provider built from explicit configuration.
    pub fn from_config(config: &KernelConfig) -> KernelResult<Self> {
        let dispatch = Dispatcher::from_config(config, config.thresholds.sph_min_particles)?;
        tracing::info!("SPH provider: {}", dispatch.label("SPH"));
        Ok(Self { dispatch })
    }

    /// Provider using a caller-supplied accelerator strategy.
    pub fn with_accelerator(
        accelerator: Arc<dyn Accelerator>,
        config: &KernelConfig,
    ) -> KernelResult<Self> {
        Ok(Self {
            dispatch: Dispatcher::with_accelerator(
                accelerator,
                config,
                config.thresholds.sph_min_particles,
            )?,
        })
    }

    /// Advance the particles by one time-step of `params.dt`.
    ///
    /// Fails without touching any buffer if the buffers are not congruent or
    /// a parameter is out of range.
    pub fn step(&self, fields: &mut SphFields<'_>, params: &SphParams) -> KernelResult<()> {
        let n = fields.check()?;
        params.validate()?;

        if let Some(accel) = self.dispatch.accelerator_for(n, true) {
            match accel.sph_step(fields, params) {
                Ok(()) => return Ok(()),
                Err(e) => self.dispatch.note_fallback("SPH", &e),
            }
        }

        tracing::debug!(n, "SPH CPU path");
        self.dispatch.pool().install(|| step_cpu(fields, params));
        Ok(())
    }
}

impl Default for SphProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl Provider for SphProvider {
    fn name(&self) -> String {
        self.dispatch.label("SPH")
    }

    fn supports_gpu(&self) -> bool {
        self.dispatch.supports_gpu()
    }

    fn backend(&self) -> BackendType {
        self.dispatch.backend()
    }
}
