//! Direct-summation gravitational N-body solver.
//!
//! Positions, velocities and forces are flat arrays indexed `3*i, 3*i+1, 3*i+2`;
//! masses are indexed by particle id. All buffers belong to the caller and are
//! only written, never resized.
//!
//! Pair interaction with Plummer softening `eps`:
//!
//! ```text
//! d   = x_j - x_i
//! r2  = |d|^2 + eps^2
//! F_i += G m_i m_j d / (r2 * sqrt(r2))
//! F_j -= G m_i m_j d / (r2 * sqrt(r2))
//! ```

use std::sync::Arc;

use rayon::prelude::*;

use crate::accel::Accelerator;
use crate::config::KernelConfig;
use crate::dispatch::Dispatcher;
use crate::error::{check_finite, check_len, check_positive, KernelError, KernelResult};
use crate::{BackendType, Provider};

/// Force scale `G m_i m_j / r2^(3/2)` for one pair, or `None` for a coincident
/// pair with zero softening.
///
/// `m_i * m_j` is formed first so the value is bit-identical for `(i, j)` and
/// `(j, i)`.
#[inline]
fn pair_scale(g: f64, mi: f64, mj: f64, r2: f64) -> Option<f64> {
    if r2 > 0.0 {
        Some(g * (mi * mj) / (r2 * r2.sqrt()))
    } else {
        None
    }
}

#[inline]
fn displacement(positions: &[f64], i: usize, j: usize) -> [f64; 3] {
    [
        positions[3 * j] - positions[3 * i],
        positions[3 * j + 1] - positions[3 * i + 1],
        positions[3 * j + 2] - positions[3 * i + 2],
    ]
}

/// Sequential all-pairs forces, each unordered pair evaluated once.
///
/// Applies `+f d` to `i` and `-f d` to `j`, so Newton's third law holds
/// exactly. Overwrites `forces`.
pub fn compute_forces_pairwise(
    positions: &[f64],
    masses: &[f64],
    forces: &mut [f64],
    g: f64,
    softening: f64,
) {
    let n = masses.len();
    let eps2 = softening * softening;
    forces.iter_mut().for_each(|f| *f = 0.0);

    for i in 0..n {
        for j in (i + 1)..n {
            let d = displacement(positions, i, j);
            let r2 = d[0] * d[0] + d[1] * d[1] + d[2] * d[2] + eps2;
            let Some(s) = pair_scale(g, masses[i], masses[j], r2) else {
                continue;
            };
            for k in 0..3 {
                forces[3 * i + k] += s * d[k];
                forces[3 * j + k] -= s * d[k];
            }
        }
    }
}

/// Parallel per-particle forces.
///
/// Each worker owns one particle's three output slots and loops over every
/// `j != i`, so no synchronization is needed. Twice the pair evaluations of
/// [`compute_forces_pairwise`]. Overwrites `forces`.
pub fn compute_forces_parallel(
    positions: &[f64],
    masses: &[f64],
    forces: &mut [f64],
    g: f64,
    softening: f64,
) {
    let n = masses.len();
    let eps2 = softening * softening;

    forces.par_chunks_mut(3).enumerate().for_each(|(i, out)| {
        let mut acc = [0.0_f64; 3];
        for j in 0..n {
            if j == i {
                continue;
            }
            let d = displacement(positions, i, j);
            let r2 = d[0] * d[0] + d[1] * d[1] + d[2] * d[2] + eps2;
            if let Some(s) = pair_scale(g, masses[i], masses[j], r2) {
                acc[0] += s * d[0];
                acc[1] += s * d[1];
                acc[2] += s * d[2];
            }
        }
        out.copy_from_slice(&acc);
    });
}

/// Total softened gravitational potential energy, `-sum_{i<j} G m_i m_j / sqrt(r2)`.
pub fn potential_energy(positions: &[f64], masses: &[f64], g: f64, softening: f64) -> f64 {
    let n = masses.len();
    let eps2 = softening * softening;
    (0..n)
        .into_par_iter()
        .map(|i| {
            let mut e = 0.0;
            for j in (i + 1)..n {
                let d = displacement(positions, i, j);
                let r2 = d[0] * d[0] + d[1] * d[1] + d[2] * d[2] + eps2;
                if r2 > 0.0 {
                    e -= g * masses[i] * masses[j] / r2.sqrt();
                }
            }
            e
        })
        .sum()
}

/// Total kinetic energy, `sum_i m_i |v_i|^2 / 2`.
pub fn kinetic_energy(velocities: &[f64], masses: &[f64]) -> f64 {
    velocities
        .chunks(3)
        .zip(masses)
        .map(|(v, m)| 0.5 * m * (v[0] * v[0] + v[1] * v[1] + v[2] * v[2]))
        .sum()
}

/// N-body provider: softened gravitational forces with accelerator dispatch.
pub struct NBodyProvider {
    dispatch: Dispatcher,
}

impl NBodyProvider {
    /// Auto-probing provider with default configuration.
    pub fn new() -> Self {
        Self::from_config(&KernelConfig::default()).unwrap_or_else(|_| Self::cpu())
    }

    /// CPU-only provider on the global worker pool.
    pub fn cpu() -> Self {
        Self {
            dispatch: Dispatcher::cpu(KernelConfig::cpu().thresholds.nbody_min_particles),
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
        let dispatch = Dispatcher::from_config(config, config.thresholds.nbody_min_particles)?;
        tracing::info!("N-body provider: {}", dispatch.label("N-body"));
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
                config.thresholds.nbody_min_particles,
            )?,
        })
    }

    /// Compute softened gravitational forces for every particle.
    ///
    /// `forces` is overwritten. Returns an error, without touching `forces`,
    /// if the buffers are not congruent, a mass is not positive, or `g` /
    /// `softening` are not finite (softening must also be `>= 0`).
    pub fn compute_forces(
        &self,
        positions: &[f64],
        masses: &[f64],
        forces: &mut [f64],
        g: f64,
        softening: f64,
    ) -> KernelResult<()> {
        validate(positions, masses, forces, g, softening)?;
        let n = masses.len();

        if let Some(accel) = self.dispatch.accelerator_for(n, true) {
            match accel.nbody_forces(positions, masses, forces, g, softening) {
                Ok(()) => return Ok(()),
                Err(e) => self.dispatch.note_fallback("N-body", &e),
            }
        }

        tracing::debug!(n, "N-body CPU path");
        self.dispatch
            .pool()
            .install(|| compute_forces_parallel(positions, masses, forces, g, softening));
        Ok(())
    }

    /// Advance one kick-drift-kick leapfrog step of length `dt`.
    ///
    /// Forces are evaluated at the start and end positions through
    /// [`NBodyProvider::compute_forces`]; on return `forces` holds the forces
    /// at the new positions.
    #[allow(clippy::too_many_arguments)]
    pub fn step(
        &self,
        positions: &mut [f64],
        velocities: &mut [f64],
        masses: &[f64],
        forces: &mut [f64],
        g: f64,
        softening: f64,
        dt: f64,
    ) -> KernelResult<()> {
        check_len("velocities", positions.len(), velocities.len())?;
        check_finite("dt", dt)?;
        let half_dt = 0.5 * dt;

        self.compute_forces(positions, masses, forces, g, softening)?;
        kick(velocities, forces, masses, half_dt);
        positions
            .iter_mut()
            .zip(velocities.iter())
            .for_each(|(x, v)| *x += v * dt);
        self.compute_forces(positions, masses, forces, g, softening)?;
        kick(velocities, forces, masses, half_dt);
        Ok(())
    }
}

fn kick(velocities: &mut [f64], forces: &[f64], masses: &[f64], dt: f64) {
    velocities
        .chunks_mut(3)
        .zip(forces.chunks(3))
        .zip(masses)
        .for_each(|((v, f), m)| {
            let inv_m = 1.0 / m;
            v[0] += dt * f[0] * inv_m;
            v[1] += dt * f[1] * inv_m;
            v[2] += dt * f[2] * inv_m;
        });
}

fn validate(
    positions: &[f64],
    masses: &[f64],
    forces: &[f64],
    g: f64,
    softening: f64,
) -> KernelResult<()> {
    check_len("positions", 3 * masses.len(), positions.len())?;
    check_len("forces", positions.len(), forces.len())?;
    check_finite("g", g)?;
    check_finite("softening", softening)?;
    if softening < 0.0 {
        return Err(KernelError::InvalidParameter {
            name: "softening",
            value: softening,
            reason: "must be >= 0",
        });
    }
    for &m in masses {
        check_positive("mass", m)?;
    }
    Ok(())
}

impl Default for NBodyProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl Provider for NBodyProvider {
    fn name(&self) -> String {
        self.dispatch.label("N-body")
    }

    fn supports_gpu(&self) -> bool {
        self.dispatch.supports_gpu()
    }

    fn backend(&self) -> BackendType {
        self.dispatch.backend()
    }
}
