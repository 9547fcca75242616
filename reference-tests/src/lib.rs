//! Reference test framework for kernel validation
//!
//! Each reference test drives one provider through a scenario with a known
//! closed-form answer and validates the result with explicit tolerances.

pub mod analytical;


use std::f64::consts::PI;
use std::time::Instant;

use analytical::{
    ballistic_position, euler_free_fall, shear_wave_amplitude, sine_mode_amplitude,
    tone_peak_magnitude, CircularOrbit,
};
use simkernels::sph::poly6;
use simkernels::{
    kinematic_viscosity, kinetic_energy, potential_energy, FftProvider, KernelConfig, Lattice,
    LbmProvider, NBodyProvider, ParticleSystem, Provider, SphParams, SphProvider,
};

/// Scenario to run and its parameters
#[derive(Debug, Clone)]
pub enum Scenario {
    /// Equal-mass circular two-body orbit integrated for one period
    KeplerOrbit {
        /// Leapfrog steps per orbital period
        steps_per_orbit: usize,
    },
    /// Viscous decay of a sinusoidal shear wave on the D2Q9 lattice
    ShearWave {
        /// Lattice width (periodic, flow direction)
        width: usize,
        /// Lattice height (one wavelength)
        height: usize,
        /// BGK relaxation rate
        omega: f64,
        /// Initial velocity amplitude (lattice units)
        u0: f64,
        /// Number of time-steps
        steps: usize,
    },
    /// A single SPH particle falling under gravity
    SphFreeFall {
        /// Number of time-steps
        steps: usize,
        /// Time-step (s)
        dt: f64,
    },
    /// Spectrum of a pure sine tone
    PureTone {
        /// Signal length
        n: usize,
        /// Frequency bin of the tone
        bin: usize,
        /// Tone amplitude
        amplitude: f64,
    },
}

/// Result of running a reference test
#[derive(Debug)]
pub struct TestResult {
    /// Test name
    pub name: String,
    /// Provider label used for the run
    pub provider: String,
    /// Whether test passed
    pub passed: bool,
    /// Individual check results
    pub checks: Vec<CheckResult>,
    /// Number of kernel calls executed
    pub steps: usize,
    /// Wall-clock time (milliseconds)
    pub elapsed_ms: f64,
}

/// Result of an individual validation check
#[derive(Debug)]
pub struct CheckResult {
    /// Check name
    pub name: String,
    /// Whether check passed
    pub passed: bool,
    /// Error message if failed
    pub message: Option<String>,
}

impl CheckResult {
    /// Pass when `|actual - expected| <= tolerance`.
    pub fn close(name: &str, actual: f64, expected: f64, tolerance: f64) -> Self {
        let error = (actual - expected).abs();
        let passed = error <= tolerance;
        Self {
            name: name.to_string(),
            passed,
            message: (!passed).then(|| {
                format!("got {actual:.6e}, expected {expected:.6e} (error {error:.3e} > {tolerance:.3e})")
            }),
        }
    }

    /// Pass when `value <= limit`.
    pub fn below(name: &str, value: f64, limit: f64) -> Self {
        let passed = value <= limit;
        Self {
            name: name.to_string(),
            passed,
            message: (!passed).then(|| format!("{value:.6e} exceeds limit {limit:.6e}")),
        }
    }
}

/// What a scenario hands back to [`ReferenceTest::run`].
struct Outcome {
    provider: String,
    steps: usize,
    checks: Vec<CheckResult>,
}

/// A reference test case
pub struct ReferenceTest {
    /// Test name
    pub name: String,
    /// Path to a `KernelConfig` JSON file; CPU-only defaults when `None`
    pub config_path: Option<String>,
    /// Scenario to run
    pub scenario: Scenario,
}

impl ReferenceTest {
    /// Run the reference test and return results
    pub fn run(&self) -> Result<TestResult, String> {
        tracing::info!("Running reference test: {}", self.name);

        let config = match &self.config_path {
            Some(path) => KernelConfig::load(path).map_err(|e| e.to_string())?,
            None => KernelConfig::cpu(),
        };

        let start = Instant::now();
        let outcome = match self.scenario {
            Scenario::KeplerOrbit { steps_per_orbit } => run_kepler(&config, steps_per_orbit)?,
            Scenario::ShearWave {
                width,
                height,
                omega,
                u0,
                steps,
            } => run_shear_wave(&config, width, height, omega, u0, steps)?,
            Scenario::SphFreeFall { steps, dt } => run_free_fall(&config, steps, dt)?,
            Scenario::PureTone { n, bin, amplitude } => run_pure_tone(&config, n, bin, amplitude)?,
        };
        let elapsed_ms = start.elapsed().as_secs_f64() * 1000.0;

        let passed = outcome.checks.iter().all(|c| c.passed);
        tracing::info!(
            "{}: {} in {:.1} ms on {}",
            self.name,
            if passed { "passed" } else { "FAILED" },
            elapsed_ms,
            outcome.provider
        );

        Ok(TestResult {
            name: self.name.clone(),
            provider: outcome.provider,
            passed,
            checks: outcome.checks,
            steps: outcome.steps,
            elapsed_ms,
        })
    }
}

fn log_progress(step: usize, total: usize) {
    if (step + 1) % (total / 10).max(1) == 0 {
        let progress = ((step + 1) as f64 / total as f64) * 100.0;
        tracing::debug!("Progress: {:.0}% ({}/{})", progress, step + 1, total);
    }
}

// ---------------------------------------------------------------------------
// Scenarios
// ---------------------------------------------------------------------------

fn run_kepler(config: &KernelConfig, steps: usize) -> Result<Outcome, String> {
    let nbody = NBodyProvider::from_config(config).map_err(|e| e.to_string())?;
    let orbit = CircularOrbit::new(1.0, 1.0, 1.0, 1.0);
    let (r1, r2) = orbit.radii();
    let (v1, v2) = orbit.speeds();

    let mut ps = ParticleSystem::new();
    ps.push_particle([-r1, 0.0, 0.0], [0.0, -v1, 0.0], orbit.m1);
    ps.push_particle([r2, 0.0, 0.0], [0.0, v2, 0.0], orbit.m2);

    let energy = |ps: &ParticleSystem| {
        kinetic_energy(&ps.velocities, &ps.masses) + potential_energy(&ps.positions, &ps.masses, orbit.g, 0.0)
    };
    let e0 = energy(&ps);

    let dt = orbit.period() / steps as f64;
    let mut max_separation_error: f64 = 0.0;
    for step in 0..steps {
        nbody
            .step(
                &mut ps.positions,
                &mut ps.velocities,
                &ps.masses,
                &mut ps.forces,
                orbit.g,
                0.0,
                dt,
            )
            .map_err(|e| e.to_string())?;

        let (a, b) = (ps.position(0), ps.position(1));
        let sep = ((b[0] - a[0]).powi(2) + (b[1] - a[1]).powi(2) + (b[2] - a[2]).powi(2)).sqrt();
        max_separation_error = max_separation_error.max((sep - orbit.separation).abs());
        log_progress(step, steps);
    }

    let end = ps.position(1);
    let closure = ((end[0] - r2).powi(2) + end[1].powi(2) + end[2].powi(2)).sqrt();
    let momentum = ps.total_momentum();
    let momentum_norm = momentum.iter().map(|p| p * p).sum::<f64>().sqrt();

    Ok(Outcome {
        provider: nbody.name(),
        steps,
        checks: vec![
            CheckResult::close("Initial energy", e0, orbit.total_energy(), 1e-12),
            CheckResult::below("Separation drift", max_separation_error, 1e-3),
            CheckResult::below("Orbit closure after one period", closure, 1e-2),
            CheckResult::below(
                "Relative energy drift",
                ((energy(&ps) - e0) / e0).abs(),
                1e-4,
            ),
            CheckResult::below("Total momentum", momentum_norm, 1e-12),
        ],
    })
}

fn run_shear_wave(
    config: &KernelConfig,
    width: usize,
    height: usize,
    omega: f64,
    u0: f64,
    steps: usize,
) -> Result<Outcome, String> {
    let lbm = LbmProvider::from_config(config).map_err(|e| e.to_string())?;
    let k = 2.0 * PI / height as f64;
    let mut lattice = Lattice::from_macroscopic(width, height, |_, y| {
        (1.0, [u0 * (k * y as f64).sin(), 0.0])
    });
    let m0 = lattice.total_mass();

    for step in 0..steps {
        lbm.evolve(&mut lattice, omega).map_err(|e| e.to_string())?;
        log_progress(step, steps);
    }

    let column: Vec<f64> = (0..height).map(|y| lattice.velocity(0, y)[0]).collect();
    let measured = sine_mode_amplitude(&column, k);
    let expected = shear_wave_amplitude(u0, kinematic_viscosity(omega), k, steps as f64);

    Ok(Outcome {
        provider: lbm.name(),
        steps,
        checks: vec![
            CheckResult::close("Decayed amplitude", measured, expected, 0.03 * expected),
            CheckResult::below(
                "Relative mass drift",
                ((lattice.total_mass() - m0) / m0).abs(),
                1e-12,
            ),
        ],
    })
}

fn run_free_fall(config: &KernelConfig, steps: usize, dt: f64) -> Result<Outcome, String> {
    let sph = SphProvider::from_config(config).map_err(|e| e.to_string())?;
    let params = SphParams {
        dt,
        gravity: [0.0, -9.81, 0.0],
        ..SphParams::default()
    };
    let x0 = [0.0, 10.0, 0.0];
    let v0 = [1.0, 0.0, 0.0];

    let mut ps = ParticleSystem::new();
    ps.push_particle(x0, v0, params.mass);

    for step in 0..steps {
        let mut fields = ps.sph_fields().map_err(|e| e.to_string())?;
        sph.step(&mut fields, &params).map_err(|e| e.to_string())?;
        log_progress(step, steps);
    }

    let g = params.gravity[1];
    let (y, vy) = euler_free_fall(x0[1], v0[1], g, dt, steps);
    let (x, _) = euler_free_fall(x0[0], v0[0], 0.0, dt, steps);
    let t = dt * steps as f64;
    let discretization = (g * dt * t / 2.0).abs();

    Ok(Outcome {
        provider: sph.name(),
        steps,
        checks: vec![
            CheckResult::close(
                "Self density",
                ps.densities[0],
                params.mass * poly6(0.0, params.smoothing_radius),
                1e-12 * ps.densities[0].abs(),
            ),
            CheckResult::close("Euler height", ps.position(0)[1], y, 1e-9),
            CheckResult::close("Euler vertical velocity", ps.velocity(0)[1], vy, 1e-9),
            CheckResult::close("Horizontal drift", ps.position(0)[0], x, 1e-9),
            CheckResult::close(
                "Ballistic height (first order in dt)",
                ps.position(0)[1],
                ballistic_position(x0[1], v0[1], g, t),
                1.01 * discretization,
            ),
        ],
    })
}

fn run_pure_tone(config: &KernelConfig, n: usize, bin: usize, amplitude: f64) -> Result<Outcome, String> {
    if bin == 0 || 2 * bin >= n {
        return Err(format!("tone bin {bin} must satisfy 0 < bin < n/2 (n = {n})"));
    }
    let fft = FftProvider::from_config(config).map_err(|e| e.to_string())?;
    let signal: Vec<f64> = (0..n)
        .map(|t| amplitude * (2.0 * PI * bin as f64 * t as f64 / n as f64).sin())
        .collect();

    let mut re = signal.clone();
    let mut im = vec![0.0; n];
    fft.transform(&mut re, &mut im).map_err(|e| e.to_string())?;

    let mag: Vec<f64> = simkernels::power_spectrum(&re, &im).iter().map(|p| p.sqrt()).collect();
    let peak = tone_peak_magnitude(amplitude, n);
    let leakage = mag
        .iter()
        .enumerate()
        .filter(|&(k, _)| k != bin && k != n - bin)
        .map(|(_, m)| *m)
        .fold(0.0, f64::max);
    let loudest = mag
        .iter()
        .take(n / 2 + 1)
        .enumerate()
        .fold((0, 0.0), |best, (k, &m)| if m > best.1 { (k, m) } else { best })
        .0;

    fft.inverse_transform(&mut re, &mut im).map_err(|e| e.to_string())?;
    let roundtrip = re
        .iter()
        .zip(&signal)
        .map(|(a, b)| (a - b).abs())
        .chain(im.iter().map(|v| v.abs()))
        .fold(0.0, f64::max);

    Ok(Outcome {
        provider: fft.name(),
        steps: 2,
        checks: vec![
            CheckResult::close("Positive-frequency peak", mag[bin], peak, 1e-9 * peak),
            CheckResult::close("Negative-frequency peak", mag[n - bin], peak, 1e-9 * peak),
            CheckResult::below("Leakage into other bins", leakage, 1e-8 * peak),
            CheckResult::close("Loudest bin", loudest as f64, bin as f64, 0.0),
            CheckResult::below("Inverse round-trip error", roundtrip, 1e-10 * amplitude),
        ],
    })
}

// ---------------------------------------------------------------------------
// Reporting
// ---------------------------------------------------------------------------

impl TestResult {
    /// Print a summary of the test result
    pub fn print_summary(&self) {
        println!("\n{}", "=".repeat(80));
        println!("Test: {}", self.name);
        println!("{}", "=".repeat(80));
        println!("Status: {}", if self.passed { "PASSED" } else { "FAILED" });
        println!("Provider: {}", self.provider);
        println!("Kernel calls: {}", self.steps);
        println!("Wall time: {:.1} ms", self.elapsed_ms);
        println!("\nValidation Checks:");
        for check in &self.checks {
            let status = if check.passed { "PASS" } else { "FAIL" };
            print!("  [{}] {}", status, check.name);
            if let Some(ref msg) = check.message {
                print!(" - {}", msg);
            }
            println!();
        }
        println!("{}", "=".repeat(80));
    }
}
