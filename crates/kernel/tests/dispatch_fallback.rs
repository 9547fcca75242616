//! Dispatch contract: the accelerator is tried only when available, at or
//! above threshold and with its precondition met; a failing accelerator
//! always yields the correct CPU result.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use simkernels::{
    Accelerator, AcceleratorError, BackendType, DispatchThresholds, FftProvider, KernelConfig,
    KernelError, Lattice, LbmProvider, NBodyProvider, Provider, SphFields, SphParams,
    SphProvider,
};

/// Counts calls; fails every call when `fail` is set, otherwise writes a
/// recognizable sentinel.
#[derive(Default)]
struct Probe {
    fail: bool,
    available: bool,
    calls: AtomicUsize,
}

impl Probe {
    fn working() -> Arc<Self> {
        Arc::new(Self {
            fail: false,
            available: true,
            ..Self::default()
        })
    }

    fn failing() -> Arc<Self> {
        Arc::new(Self {
            fail: true,
            available: true,
            ..Self::default()
        })
    }

    fn unavailable() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn enter(&self) -> Result<(), AcceleratorError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            Err(AcceleratorError::Dispatch("injected failure".to_string()))
        } else {
            Ok(())
        }
    }
}

const SENTINEL: f64 = 12345.0;

impl Accelerator for Probe {
    fn name(&self) -> String {
        "probe".to_string()
    }

    fn is_available(&self) -> bool {
        self.available
    }

    fn fft(&self, real: &mut [f64], _imag: &mut [f64]) -> Result<(), AcceleratorError> {
        self.enter()?;
        real.fill(SENTINEL);
        Ok(())
    }

    fn nbody_forces(
        &self,
        _positions: &[f64],
        _masses: &[f64],
        forces: &mut [f64],
        _g: f64,
        _softening: f64,
    ) -> Result<(), AcceleratorError> {
        self.enter()?;
        forces.fill(SENTINEL);
        Ok(())
    }

    fn sph_step(
        &self,
        fields: &mut SphFields<'_>,
        _params: &SphParams,
    ) -> Result<(), AcceleratorError> {
        self.enter()?;
        fields.densities.fill(SENTINEL);
        Ok(())
    }

    fn lbm_evolve(&self, lattice: &mut Lattice, _omega: f64) -> Result<(), AcceleratorError> {
        self.enter()?;
        lattice.distributions_mut().fill(SENTINEL);
        Ok(())
    }
}

fn config(threshold: usize) -> KernelConfig {
    KernelConfig {
        thresholds: DispatchThresholds {
            fft_min_len: threshold,
            nbody_min_particles: threshold,
            sph_min_particles: threshold,
            lbm_min_cells: threshold,
        },
        ..KernelConfig::default()
    }
}

#[test]
fn fft_uses_accelerator_only_above_threshold_and_for_powers_of_two() {
    let accel = Probe::working();
    let fft = FftProvider::with_accelerator(accel.clone(), &config(8)).unwrap();
    assert!(fft.supports_gpu());
    assert_eq!(fft.name(), "FFT GPU (probe)");

    let mut re = vec![1.0, 0.0, 0.0, 0.0];
    let mut im = vec![0.0; 4];
    fft.transform(&mut re, &mut im).unwrap();
    assert_eq!(accel.calls(), 0);
    assert_eq!(re, vec![1.0; 4]);

    let mut re = vec![0.0; 12];
    let mut im = vec![0.0; 12];
    fft.transform(&mut re, &mut im).unwrap();
    assert_eq!(accel.calls(), 0, "non power of two stays on CPU");

    let mut re = vec![0.0; 8];
    let mut im = vec![0.0; 8];
    fft.transform(&mut re, &mut im).unwrap();
    assert_eq!(accel.calls(), 1);
    assert_eq!(re, vec![SENTINEL; 8]);
}

#[test]
fn failing_fft_accelerator_falls_back_once() {
    let accel = Probe::failing();
    let fft = FftProvider::with_accelerator(accel.clone(), &config(1)).unwrap();
    let mut re = vec![1.0, 0.0, 0.0, 0.0];
    let mut im = vec![0.0; 4];
    fft.transform(&mut re, &mut im).unwrap();
    assert_eq!(accel.calls(), 1);
    assert_eq!(re, vec![1.0; 4]);
    assert_eq!(im, vec![0.0; 4]);
}

#[test]
fn failing_nbody_accelerator_yields_cpu_forces() {
    let accel = Probe::failing();
    let nbody = NBodyProvider::with_accelerator(accel.clone(), &config(1)).unwrap();
    let mut forces = [0.0; 6];
    nbody
        .compute_forces(&[0.0, 0.0, 0.0, 1.0, 0.0, 0.0], &[1.0, 1.0], &mut forces, 1.0, 0.0)
        .unwrap();
    assert_eq!(accel.calls(), 1);
    assert_eq!(forces, [1.0, 0.0, 0.0, -1.0, 0.0, 0.0]);
}

#[test]
fn nbody_accelerator_result_is_returned() {
    let accel = Probe::working();
    let nbody = NBodyProvider::with_accelerator(accel.clone(), &config(2)).unwrap();
    let mut forces = [0.0; 6];
    nbody
        .compute_forces(&[0.0, 0.0, 0.0, 1.0, 0.0, 0.0], &[1.0, 1.0], &mut forces, 1.0, 0.0)
        .unwrap();
    assert_eq!(forces, [SENTINEL; 6]);
}

#[test]
fn invalid_input_never_reaches_accelerator() {
    let accel = Probe::working();
    let nbody = NBodyProvider::with_accelerator(accel.clone(), &config(1)).unwrap();
    let mut forces = [0.0; 6];
    let result = nbody.compute_forces(&[0.0; 6], &[1.0, -1.0], &mut forces, 1.0, 0.0);
    assert!(matches!(result, Err(KernelError::InvalidParameter { .. })));
    assert_eq!(accel.calls(), 0);
}

#[test]
fn failing_sph_accelerator_runs_cpu_step() {
    let accel = Probe::failing();
    let sph = SphProvider::with_accelerator(accel.clone(), &config(1)).unwrap();
    let mut ps = simkernels::ParticleSystem::new();
    ps.push_particle([0.0; 3], [0.0; 3], 1.0);
    let params = SphParams {
        mass: 1.0,
        ..SphParams::default()
    };
    let mut fields = ps.sph_fields().unwrap();
    sph.step(&mut fields, &params).unwrap();
    assert_eq!(accel.calls(), 1);
    assert!(ps.densities[0] > 0.0 && ps.densities[0] != SENTINEL);
}

#[test]
fn failing_lbm_accelerator_runs_cpu_step() {
    let accel = Probe::failing();
    let lbm = LbmProvider::with_accelerator(accel.clone(), &config(4)).unwrap();
    let mut lattice = Lattice::uniform(2, 2);
    lbm.evolve(&mut lattice, 1.0).unwrap();
    assert_eq!(accel.calls(), 1);
    assert!(lattice.distributions().iter().all(|f| *f != SENTINEL));
}

#[test]
fn lbm_threshold_counts_cells() {
    let accel = Probe::working();
    let lbm = LbmProvider::with_accelerator(accel.clone(), &config(10)).unwrap();
    let mut small = Lattice::uniform(3, 3);
    lbm.evolve(&mut small, 1.0).unwrap();
    assert_eq!(accel.calls(), 0);
    let mut large = Lattice::uniform(2, 5);
    lbm.evolve(&mut large, 1.0).unwrap();
    assert_eq!(accel.calls(), 1);
}

#[test]
fn unavailable_accelerator_is_never_called() {
    let accel = Probe::unavailable();
    let nbody = NBodyProvider::with_accelerator(accel.clone(), &config(1)).unwrap();
    assert!(!nbody.supports_gpu());
    assert_eq!(nbody.name(), "N-body CPU");
    let mut forces = [0.0; 6];
    nbody
        .compute_forces(&[0.0, 0.0, 0.0, 1.0, 0.0, 0.0], &[1.0, 1.0], &mut forces, 1.0, 0.0)
        .unwrap();
    assert_eq!(accel.calls(), 0);
}

#[test]
fn gpu_only_provider_requires_available_accelerator() {
    let gpu_only = KernelConfig {
        backend: BackendType::Gpu,
        ..config(1000)
    };
    let result = SphProvider::with_accelerator(Probe::unavailable(), &gpu_only);
    assert!(matches!(
        result,
        Err(KernelError::Accelerator(AcceleratorError::NoAdapter))
    ));

    // A GPU-only provider attempts every size.
    let accel = Probe::working();
    let fft = FftProvider::with_accelerator(accel.clone(), &gpu_only).unwrap();
    assert_eq!(fft.backend(), BackendType::Gpu);
    let mut re = vec![0.0; 2];
    let mut im = vec![0.0; 2];
    fft.transform(&mut re, &mut im).unwrap();
    assert_eq!(accel.calls(), 1);
}

#[test]
fn cpu_only_provider_never_probes() {
    let fft = FftProvider::from_config(&KernelConfig::cpu()).unwrap();
    assert!(!fft.supports_gpu());
    assert_eq!(fft.backend(), BackendType::Cpu);
}
