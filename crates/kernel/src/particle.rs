//! Flat-array particle storage shared by the N-body and SPH kernels.

use crate::error::KernelResult;
use crate::sph::SphFields;

/// Owned particle buffers in the flat layout the kernels expect.
///
/// Vector quantities are stored as `[x0, y0, z0, x1, y1, z1, ...]`, so
/// particle `i` occupies slots `3*i..3*i+3`. Scalar arrays are indexed by `i`.
/// All arrays always describe the same number of particles.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParticleSystem {
    // ---- Vectors (3 per particle) ----
    /// Positions
    pub positions: Vec<f64>,
    /// Velocities
    pub velocities: Vec<f64>,
    /// Forces written by the last kernel call
    pub forces: Vec<f64>,

    // ---- Scalars (1 per particle) ----
    /// Masses
    pub masses: Vec<f64>,
    /// SPH densities
    pub densities: Vec<f64>,
    /// SPH pressures
    pub pressures: Vec<f64>,
}

impl ParticleSystem {
    /// Create an empty system.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty system with room for `n` particles.
    pub fn with_capacity(n: usize) -> Self {
        Self {
            positions: Vec::with_capacity(3 * n),
            velocities: Vec::with_capacity(3 * n),
            forces: Vec::with_capacity(3 * n),
            masses: Vec::with_capacity(n),
            densities: Vec::with_capacity(n),
            pressures: Vec::with_capacity(n),
        }
    }

    /// Number of particles.
    pub fn len(&self) -> usize {
        self.masses.len()
    }

    /// `true` if there are no particles.
    pub fn is_empty(&self) -> bool {
        self.masses.is_empty()
    }

    /// Append a particle. Force, density and pressure start at zero.
    pub fn push_particle(&mut self, position: [f64; 3], velocity: [f64; 3], mass: f64) {
        self.positions.extend_from_slice(&position);
        self.velocities.extend_from_slice(&velocity);
        self.forces.extend_from_slice(&[0.0; 3]);
        self.masses.push(mass);
        self.densities.push(0.0);
        self.pressures.push(0.0);
    }

    /// Position of particle `i`.
    pub fn position(&self, i: usize) -> [f64; 3] {
        [
            self.positions[3 * i],
            self.positions[3 * i + 1],
            self.positions[3 * i + 2],
        ]
    }

    /// Velocity of particle `i`.
    pub fn velocity(&self, i: usize) -> [f64; 3] {
        [
            self.velocities[3 * i],
            self.velocities[3 * i + 1],
            self.velocities[3 * i + 2],
        ]
    }

    /// Total linear momentum `sum_i m_i v_i`.
    pub fn total_momentum(&self) -> [f64; 3] {
        let mut p = [0.0; 3];
        for (v, m) in self.velocities.chunks(3).zip(&self.masses) {
            p[0] += m * v[0];
            p[1] += m * v[1];
            p[2] += m * v[2];
        }
        p
    }

    /// Sum of all force vectors.
    pub fn net_force(&self) -> [f64; 3] {
        let mut sum = [0.0; 3];
        for f in self.forces.chunks(3) {
            sum[0] += f[0];
            sum[1] += f[1];
            sum[2] += f[2];
        }
        sum
    }

    /// Borrow the buffers the SPH step reads and writes.
    pub fn sph_fields(&mut self) -> KernelResult<SphFields<'_>> {
        SphFields::new(
            &mut self.positions,
            &mut self.velocities,
            &mut self.densities,
            &mut self.pressures,
            &mut self.forces,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_system() {
        let ps = ParticleSystem::new();
        assert_eq!(ps.len(), 0);
        assert!(ps.is_empty());
        assert_eq!(ps.total_momentum(), [0.0; 3]);
    }

    #[test]
    fn push_keeps_arrays_congruent() {
        let mut ps = ParticleSystem::with_capacity(2);
        ps.push_particle([1.0, 2.0, 3.0], [0.5, 0.0, 0.0], 2.0);
        ps.push_particle([4.0, 5.0, 6.0], [0.0, -1.0, 0.0], 1.0);
        assert_eq!(ps.len(), 2);
        assert_eq!(ps.positions.len(), 6);
        assert_eq!(ps.forces, vec![0.0; 6]);
        assert_eq!(ps.densities.len(), 2);
        assert_eq!(ps.position(1), [4.0, 5.0, 6.0]);
        assert_eq!(ps.velocity(0), [0.5, 0.0, 0.0]);
    }

    #[test]
    fn momentum_sums_mass_weighted_velocity() {
        let mut ps = ParticleSystem::new();
        ps.push_particle([0.0; 3], [1.0, 0.0, 0.0], 2.0);
        ps.push_particle([0.0; 3], [-2.0, 1.0, 0.0], 1.0);
        assert_eq!(ps.total_momentum(), [0.0, 1.0, 0.0]);
    }

    #[test]
    fn sph_fields_borrow() {
        let mut ps = ParticleSystem::new();
        ps.push_particle([0.0; 3], [0.0; 3], 1.0);
        let fields = ps.sph_fields().unwrap();
        assert_eq!(fields.len(), 1);
    }
}
