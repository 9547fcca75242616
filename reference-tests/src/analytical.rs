//! Analytical reference solutions for kernel validation.
//!
//! Provides closed-form solutions against which kernel results can be compared
//! for quantitative accuracy assessment.

use std::f64::consts::PI;

/// Circular two-body orbit.
///
/// Two point masses separated by `r` orbit their common centre of mass. With
/// `M = m1 + m2`:
///
/// ```text
/// T   = 2 pi sqrt(r^3 / (G M))
/// v_1 = m2 sqrt(G / (M r))
/// v_2 = m1 sqrt(G / (M r))
/// E   = -G m1 m2 / (2 r)
/// ```
pub struct CircularOrbit {
    /// Gravitational constant G
    pub g: f64,
    /// Mass of body 1
    pub m1: f64,
    /// Mass of body 2
    pub m2: f64,
    /// Separation r
    pub separation: f64,
}

impl CircularOrbit {
    /// Create a new circular orbit solution.
    pub fn new(g: f64, m1: f64, m2: f64, separation: f64) -> Self {
        Self {
            g,
            m1,
            m2,
            separation,
        }
    }

    /// Orbital period.
    pub fn period(&self) -> f64 {
        let m = self.m1 + self.m2;
        2.0 * PI * (self.separation.powi(3) / (self.g * m)).sqrt()
    }

    /// Orbital speeds `(v_1, v_2)` relative to the centre of mass.
    pub fn speeds(&self) -> (f64, f64) {
        let base = (self.g / ((self.m1 + self.m2) * self.separation)).sqrt();
        (self.m2 * base, self.m1 * base)
    }

    /// Distances `(r_1, r_2)` of each body from the centre of mass.
    pub fn radii(&self) -> (f64, f64) {
        let m = self.m1 + self.m2;
        (self.separation * self.m2 / m, self.separation * self.m1 / m)
    }

    /// Total (kinetic + potential) energy.
    pub fn total_energy(&self) -> f64 {
        -self.g * self.m1 * self.m2 / (2.0 * self.separation)
    }
}

/// Amplitude of a decaying sinusoidal shear wave.
///
/// A velocity profile `u_x(y) = u0 sin(k y)` in a viscous fluid at rest
/// otherwise decays as
///
/// ```text
/// u0(t) = u0 * exp(-nu k^2 t)
/// ```
pub fn shear_wave_amplitude(u0: f64, kinematic_viscosity: f64, wavenumber: f64, t: f64) -> f64 {
    u0 * (-kinematic_viscosity * wavenumber * wavenumber * t).exp()
}

/// Position and velocity after `steps` semi-implicit Euler steps under a
/// constant acceleration `g`:
///
/// ```text
/// v_k = v0 + k dt g
/// x_k = x0 + k dt v0 + dt^2 g k (k + 1) / 2
/// ```
pub fn euler_free_fall(x0: f64, v0: f64, g: f64, dt: f64, steps: usize) -> (f64, f64) {
    let k = steps as f64;
    let v = v0 + k * dt * g;
    let x = x0 + k * dt * v0 + dt * dt * g * k * (k + 1.0) / 2.0;
    (x, v)
}

/// Continuous ballistic position `x0 + v0 t + g t^2 / 2`.
pub fn ballistic_position(x0: f64, v0: f64, g: f64, t: f64) -> f64 {
    x0 + v0 * t + 0.5 * g * t * t
}

/// Magnitude of each of the two spectral peaks of `A sin(2 pi k t / N)` over
/// `N` samples (`k` not 0 or `N/2`): `A N / 2`.
pub fn tone_peak_magnitude(amplitude: f64, n: usize) -> f64 {
    amplitude * n as f64 / 2.0
}

/// Project samples onto `sin(k y)` to recover the amplitude of that mode.
///
/// `samples[y]` is the value at integer position `y` over one full period.
pub fn sine_mode_amplitude(samples: &[f64], wavenumber: f64) -> f64 {
    let n = samples.len() as f64;
    2.0 / n
        * samples
            .iter()
            .enumerate()
            .map(|(y, u)| u * (wavenumber * y as f64).sin())
            .sum::<f64>()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_equal_mass_orbit() {
        let orbit = CircularOrbit::new(1.0, 1.0, 1.0, 1.0);
        let (v1, v2) = orbit.speeds();
        assert!((v1 - 0.5_f64.sqrt()).abs() < 1e-15);
        assert_eq!(v1, v2);
        assert_eq!(orbit.radii(), (0.5, 0.5));
        assert!((orbit.period() - 2.0 * PI / 2.0_f64.sqrt()).abs() < 1e-12);
    }

    #[test]
    fn test_orbit_energy_is_virial() {
        // E = -KE for a circular orbit.
        let orbit = CircularOrbit::new(2.0, 3.0, 1.0, 1.5);
        let (v1, v2) = orbit.speeds();
        let ke = 0.5 * orbit.m1 * v1 * v1 + 0.5 * orbit.m2 * v2 * v2;
        assert!((orbit.total_energy() + ke).abs() < 1e-12);
    }

    #[test]
    fn test_shear_wave_decay() {
        let a = shear_wave_amplitude(1.0, 0.1, 2.0, 0.0);
        assert_eq!(a, 1.0);
        let half_life = std::f64::consts::LN_2 / (0.1 * 4.0);
        assert!((shear_wave_amplitude(1.0, 0.1, 2.0, half_life) - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_euler_free_fall_one_step() {
        let (x, v) = euler_free_fall(1.0, 2.0, -10.0, 0.1, 1);
        assert!((v - 1.0).abs() < 1e-12);
        assert!((x - 1.1).abs() < 1e-12);
    }

    #[test]
    fn test_euler_approaches_ballistic() {
        let t = 1.0;
        let coarse = euler_free_fall(0.0, 0.0, -9.81, t / 10.0, 10).0;
        let fine = euler_free_fall(0.0, 0.0, -9.81, t / 1000.0, 1000).0;
        let exact = ballistic_position(0.0, 0.0, -9.81, t);
        assert!((fine - exact).abs() < (coarse - exact).abs());
    }

    #[test]
    fn test_sine_mode_projection() {
        let n = 64;
        let k = 2.0 * PI / n as f64;
        let samples: Vec<f64> = (0..n).map(|y| 0.3 * (k * y as f64).sin()).collect();
        assert!((sine_mode_amplitude(&samples, k) - 0.3).abs() < 1e-12);
    }
}
