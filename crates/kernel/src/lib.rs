//! Parallel Numerical Simulation Kernels
//!
//! Four data-parallel kernels, each behind a small provider with a portable
//! CPU path and an optional accelerator path:
//!
//! - [`fft`] -- radix-2 FFT (iterative and recursive), DFT fallback, inverse.
//! - [`nbody`] -- softened all-pairs gravity and leapfrog integration.
//! - [`sph`] -- three-pass SPH fluid step (density/pressure, forces, Euler).
//! - [`lbm`] -- D2Q9 Lattice-Boltzmann with periodic wrap and bounce-back.
//!
//! Shared infrastructure:
//!
//! - [`dispatch`] -- the CPU/accelerator decision and the CPU worker pool.
//! - [`accel`] -- the [`Accelerator`] strategy trait and the cached probe.
//! - [`config`] -- JSON-loadable [`KernelConfig`].
//! - [`particle`] -- flat-array [`ParticleSystem`] container.
//! - [`eos`] -- linear equation of state.
//!
//! Every kernel call fans out over a rayon pool and joins before returning.
//! Buffers are caller-owned slices; kernels write values but never resize.
//!
//! ```no_run
//! use simkernels::{FftProvider, Provider};
//!
//! let fft = FftProvider::new();
//! let mut re = vec![1.0, 0.0, 0.0, 0.0];
//! let mut im = vec![0.0; 4];
//! fft.transform(&mut re, &mut im).unwrap();
//! println!("{}: {re:?}", fft.name());
//! ```

#![warn(missing_docs)]

pub mod accel;
pub mod config;
pub mod dispatch;
pub mod eos;
pub mod error;
pub mod fft;
pub mod lbm;
pub mod nbody;
pub mod particle;
pub mod sph;

#[cfg(feature = "gpu")]
#[allow(missing_docs)]
pub mod gpu;

pub use accel::Accelerator;
pub use config::{BackendType, DispatchThresholds, FftStrategy, KernelConfig};
pub use dispatch::{use_accelerator, Backend, CpuPool, Dispatcher};
pub use eos::linear_eos;
pub use error::{AcceleratorError, KernelError, KernelResult};
pub use fft::{power_spectrum, FftProvider};
pub use lbm::{kinematic_viscosity, Lattice, LbmProvider};
pub use nbody::{kinetic_energy, potential_energy, NBodyProvider};
pub use particle::ParticleSystem;
pub use sph::{SphFields, SphParams, SphProvider};

#[cfg(feature = "gpu")]
pub use gpu::GpuAccelerator;

// ---------------------------------------------------------------------------
// Provider trait
// ---------------------------------------------------------------------------

/// Capability surface shared by every kernel provider.
///
/// The kernel entry points themselves differ per provider; this trait covers
/// what callers inspect after construction.
pub trait Provider {
    /// Diagnostic label, e.g. `"FFT CPU"`, `"SPH CPU (4 threads)"` or
    /// `"N-body GPU (<adapter>)"`.
    fn name(&self) -> String;

    /// Whether an accelerator was found usable at construction. Never changes
    /// for the life of the provider.
    fn supports_gpu(&self) -> bool;

    /// The configured backend policy.
    fn backend(&self) -> BackendType;
}

/// Whether this process has a usable accelerator.
///
/// Runs the shared probe on first call; later calls return the cached result.
pub fn accelerator_available() -> bool {
    accel::probe().is_ok()
}
