//! D2Q9 Lattice-Boltzmann solver with BGK collision, periodic streaming and
//! bounce-back obstacles.
//!
//! Velocity set (index `q`):
//!
//! ```text
//!   6   2   5
//!     \ | /
//!   3 - 0 - 1
//!     / | \
//!   7   4   8
//! ```
//!
//! A time-step is collision on every fluid cell followed by streaming into a
//! second buffer. Streaming pulls: a fluid cell `d` takes direction `q` from
//! `s = d - c_q` (wrapped periodically). If `s` is an obstacle, `d` instead
//! takes its own post-collision value in `OPP[q]`, which is the value it sent
//! into the wall. Obstacle cells neither collide nor stream, so total mass is
//! conserved.

use std::sync::Arc;

use rayon::prelude::*;

use crate::accel::Accelerator;
use crate::config::KernelConfig;
use crate::dispatch::Dispatcher;
use crate::error::{check_finite, check_len, KernelError, KernelResult};
use crate::{BackendType, Provider};

/// Number of discrete velocities.
pub const Q: usize = 9;

/// x component of each lattice velocity.
pub const CX: [i64; Q] = [0, 1, 0, -1, 0, 1, -1, -1, 1];

/// y component of each lattice velocity.
pub const CY: [i64; Q] = [0, 0, 1, 0, -1, 1, 1, -1, -1];

/// Quadrature weights.
pub const W: [f64; Q] = [
    4.0 / 9.0,
    1.0 / 9.0,
    1.0 / 9.0,
    1.0 / 9.0,
    1.0 / 9.0,
    1.0 / 36.0,
    1.0 / 36.0,
    1.0 / 36.0,
    1.0 / 36.0,
];

/// Opposite direction of each velocity, `c[OPP[q]] == -c[q]`.
pub const OPP: [usize; Q] = [0, 3, 4, 1, 2, 7, 8, 5, 6];

/// Second-order equilibrium distribution for direction `q`.
///
/// ```text
/// f_eq = rho W_q (1 + 3 (c_q . u) + 4.5 (c_q . u)^2 - 1.5 |u|^2)
/// ```
#[inline]
pub fn equilibrium(rho: f64, ux: f64, uy: f64, q: usize) -> f64 {
    let cu = CX[q] as f64 * ux + CY[q] as f64 * uy;
    let uu = ux * ux + uy * uy;
    rho * W[q] * (1.0 + 3.0 * cu + 4.5 * cu * cu - 1.5 * uu)
}

/// Lattice kinematic viscosity for relaxation rate `omega`:
/// `nu = (1/omega - 1/2) / 3`.
pub fn kinematic_viscosity(omega: f64) -> f64 {
    (1.0 / omega - 0.5) / 3.0
}

/// Density and velocity of one cell's distributions.
#[inline]
fn moments(f: &[f64]) -> (f64, f64, f64) {
    let mut rho = 0.0;
    let mut mx = 0.0;
    let mut my = 0.0;
    for q in 0..Q {
        rho += f[q];
        mx += f[q] * CX[q] as f64;
        my += f[q] * CY[q] as f64;
    }
    if rho <= 0.0 {
        return (rho, 0.0, 0.0);
    }
    (rho, mx / rho, my / rho)
}

/// Distribution state of a periodic `width x height` D2Q9 lattice.
///
/// `f[x][y][q]` is stored flat at `(x * height + y) * 9 + q`. The streaming
/// buffer is allocated once with the lattice.
#[derive(Debug, Clone)]
pub struct Lattice {
    width: usize,
    height: usize,
    f: Vec<f64>,
    scratch: Vec<f64>,
    obstacles: Vec<bool>,
}

impl Lattice {
    /// All-zero lattice with no obstacles.
    pub fn new(width: usize, height: usize) -> Self {
        let cells = width * height;
        Self {
            width,
            height,
            f: vec![0.0; cells * Q],
            scratch: vec![0.0; cells * Q],
            obstacles: vec![false; cells],
        }
    }

    /// Fluid at rest with unit density: `f[x][y][q] = W[q]`.
    pub fn uniform(width: usize, height: usize) -> Self {
        let mut lattice = Self::new(width, height);
        for cell in lattice.f.chunks_mut(Q) {
            cell.copy_from_slice(&W);
        }
        lattice
    }

    /// Equilibrium lattice from a macroscopic field `(x, y) -> (rho, [ux, uy])`.
    pub fn from_macroscopic<F>(width: usize, height: usize, field: F) -> Self
    where
        F: Fn(usize, usize) -> (f64, [f64; 2]),
    {
        let mut lattice = Self::new(width, height);
        for x in 0..width {
            for y in 0..height {
                let (rho, [ux, uy]) = field(x, y);
                let base = lattice.index(x, y, 0);
                for q in 0..Q {
                    lattice.f[base + q] = equilibrium(rho, ux, uy, q);
                }
            }
        }
        lattice
    }

    /// Lattice over caller-provided distributions in `(x * height + y) * 9 + q` order.
    pub fn from_distributions(width: usize, height: usize, f: Vec<f64>) -> KernelResult<Self> {
        check_len("distributions", width * height * Q, f.len())?;
        let cells = width * height;
        Ok(Self {
            width,
            height,
            f,
            scratch: vec![0.0; cells * Q],
            obstacles: vec![false; cells],
        })
    }

    /// Lattice extent in x.
    pub fn width(&self) -> usize {
        self.width
    }

    /// Lattice extent in y.
    pub fn height(&self) -> usize {
        self.height
    }

    /// Number of cells, `width * height`.
    pub fn cells(&self) -> usize {
        self.width * self.height
    }

    /// Flat index of cell `(x, y)` in the obstacle mask.
    ///
    /// Panics when the coordinate lies outside the lattice.
    #[inline]
    fn cell_index(&self, x: usize, y: usize) -> usize {
        assert!(
            x < self.width && y < self.height,
            "cell ({x}, {y}) outside {}x{} lattice",
            self.width,
            self.height
        );
        x * self.height + y
    }

    /// Flat index of `f[x][y][q]`.
    ///
    /// Panics when `(x, y)` lies outside the lattice or `q >= 9`.
    #[inline]
    pub fn index(&self, x: usize, y: usize, q: usize) -> usize {
        assert!(q < Q, "direction {q} out of range");
        self.cell_index(x, y) * Q + q
    }

    /// `f[x][y][q]`.
    pub fn get(&self, x: usize, y: usize, q: usize) -> f64 {
        self.f[self.index(x, y, q)]
    }

    /// Set `f[x][y][q]`.
    pub fn set(&mut self, x: usize, y: usize, q: usize, value: f64) {
        let i = self.index(x, y, q);
        self.f[i] = value;
    }

    /// The nine distributions of cell `(x, y)`.
    pub fn cell(&self, x: usize, y: usize) -> &[f64] {
        let base = self.index(x, y, 0);
        &self.f[base..base + Q]
    }

    /// All distributions, flat.
    pub fn distributions(&self) -> &[f64] {
        &self.f
    }

    /// All distributions, flat and mutable.
    pub fn distributions_mut(&mut self) -> &mut [f64] {
        &mut self.f
    }

    /// Mark or clear cell `(x, y)` as a solid wall.
    pub fn set_obstacle(&mut self, x: usize, y: usize, solid: bool) {
        let i = self.cell_index(x, y);
        self.obstacles[i] = solid;
    }

    /// Whether cell `(x, y)` is a solid wall.
    pub fn is_obstacle(&self, x: usize, y: usize) -> bool {
        self.obstacles[self.cell_index(x, y)]
    }

    /// Obstacle mask in `x * height + y` order.
    pub fn obstacles(&self) -> &[bool] {
        &self.obstacles
    }

    /// Replace the whole obstacle mask.
    pub fn set_obstacles(&mut self, mask: Vec<bool>) -> KernelResult<()> {
        check_len("obstacles", self.cells(), mask.len())?;
        self.obstacles = mask;
        Ok(())
    }

    /// Density of cell `(x, y)`.
    pub fn density(&self, x: usize, y: usize) -> f64 {
        moments(self.cell(x, y)).0
    }

    /// Velocity of cell `(x, y)`; zero where the density is not positive.
    pub fn velocity(&self, x: usize, y: usize) -> [f64; 2] {
        let (_, ux, uy) = moments(self.cell(x, y));
        [ux, uy]
    }

    /// Density of every cell in `x * height + y` order.
    pub fn density_field(&self) -> Vec<f64> {
        self.f.par_chunks(Q).map(|c| moments(c).0).collect()
    }

    /// Velocity of every cell in `x * height + y` order.
    pub fn velocity_field(&self) -> Vec<[f64; 2]> {
        self.f
            .par_chunks(Q)
            .map(|c| {
                let (_, ux, uy) = moments(c);
                [ux, uy]
            })
            .collect()
    }

    /// Sum of every distribution value, obstacles included.
    pub fn total_mass(&self) -> f64 {
        self.f.par_iter().sum()
    }

    /// BGK collision on every fluid cell, in place.
    pub fn collide(&mut self, omega: f64) {
        self.f
            .par_chunks_mut(Q)
            .zip(self.obstacles.par_iter())
            .for_each(|(cell, &solid)| {
                if solid {
                    return;
                }
                let (rho, ux, uy) = moments(cell);
                for q in 0..Q {
                    cell[q] += omega * (equilibrium(rho, ux, uy, q) - cell[q]);
                }
            });
    }

    /// Periodic pull streaming with bounce-back at obstacles.
    pub fn stream(&mut self) {
        let (w, h) = (self.width as i64, self.height as i64);
        let height = self.height;
        let f = &self.f;
        let obstacles = &self.obstacles;

        self.scratch
            .par_chunks_mut(Q)
            .enumerate()
            .for_each(|(c, out)| {
                let own = &f[c * Q..c * Q + Q];
                if obstacles[c] {
                    out.copy_from_slice(own);
                    return;
                }
                let x = (c / height) as i64;
                let y = (c % height) as i64;
                for q in 0..Q {
                    let sx = (x - CX[q]).rem_euclid(w) as usize;
                    let sy = (y - CY[q]).rem_euclid(h) as usize;
                    let s = sx * height + sy;
                    out[q] = if obstacles[s] { own[OPP[q]] } else { f[s * Q + q] };
                }
            });

        std::mem::swap(&mut self.f, &mut self.scratch);
    }
}

fn check_omega(omega: f64) -> KernelResult<()> {
    check_finite("omega", omega)?;
    if !(0.0..=2.0).contains(&omega) {
        return Err(KernelError::InvalidParameter {
            name: "omega",
            value: omega,
            reason: "must lie in [0, 2]",
        });
    }
    Ok(())
}

/// LBM provider with accelerator dispatch.
pub struct LbmProvider {
    dispatch: Dispatcher,
}

impl LbmProvider {
    /// Auto-probing provider with default configuration.
    pub fn new() -> Self {
        Self::from_config(&KernelConfig::default()).unwrap_or_else(|_| Self::cpu())
    }

    /// CPU-only provider on the global worker pool.
    pub fn cpu() -> Self {
        Self {
            dispatch: Dispatcher::cpu(KernelConfig::cpu().thresholds.lbm_min_cells),
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
        let dispatch = Dispatcher::from_config(config, config.thresholds.lbm_min_cells)?;
        tracing::info!("LBM provider: {}", dispatch.label("LBM"));
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
                config.thresholds.lbm_min_cells,
            )?,
        })
    }

    /// Advance the lattice by one collide-and-stream step.
    ///
    /// `omega` must lie in `[0, 2]`; `omega == 0` streams without relaxing.
    pub fn evolve(&self, lattice: &mut Lattice, omega: f64) -> KernelResult<()> {
        check_omega(omega)?;
        let cells = lattice.cells();

        if let Some(accel) = self.dispatch.accelerator_for(cells, true) {
            match accel.lbm_evolve(lattice, omega) {
                Ok(()) => return Ok(()),
                Err(e) => self.dispatch.note_fallback("LBM", &e),
            }
        }

        tracing::debug!(cells, "LBM CPU path");
        self.dispatch.pool().install(|| {
            lattice.collide(omega);
            lattice.stream();
        });
        Ok(())
    }

    /// Run `steps` consecutive [`LbmProvider::evolve`] calls.
    pub fn evolve_steps(&self, lattice: &mut Lattice, omega: f64, steps: usize) -> KernelResult<()> {
        for _ in 0..steps {
            self.evolve(lattice, omega)?;
        }
        Ok(())
    }
}

impl Default for LbmProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl Provider for LbmProvider {
    fn name(&self) -> String {
        self.dispatch.label("LBM")
    }

    fn supports_gpu(&self) -> bool {
        self.dispatch.supports_gpu()
    }

    fn backend(&self) -> BackendType {
        self.dispatch.backend()
    }
}
