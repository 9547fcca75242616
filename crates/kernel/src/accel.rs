//! Accelerator strategy objects.
//!
//! An [`Accelerator`] is an optional backend that may run a kernel faster than
//! the CPU path. Its contract is deliberately weak: every method may return an
//! error, and the calling provider then runs the CPU path instead. The default
//! method bodies report [`AcceleratorError::Unsupported`], so a backend only
//! implements the kernels it actually has.
//!
//! The process-wide probe ([`probe`]) runs at most once. It never panics
//! outward: a failed or panicking device probe is cached as "unavailable".

use std::sync::{Arc, OnceLock};

use crate::error::AcceleratorError;
use crate::lbm::Lattice;
use crate::sph::{SphFields, SphParams};

/// An optional hardware backend for the kernels in this crate.
///
/// Implementations must leave every caller buffer untouched when they return
/// `Err`, because the provider hands the same buffers to the CPU path.
pub trait Accelerator: Send + Sync {
    /// Human-readable device label, e.g. the adapter name.
    fn name(&self) -> String;

    /// Whether the device is usable. Evaluated once, at provider construction.
    fn is_available(&self) -> bool;

    /// Forward DFT of a power-of-two signal, in place.
    fn fft(&self, _real: &mut [f64], _imag: &mut [f64]) -> Result<(), AcceleratorError> {
        Err(AcceleratorError::Unsupported("fft"))
    }

    /// Softened all-pairs gravitational forces; overwrites `forces`.
    fn nbody_forces(
        &self,
        _positions: &[f64],
        _masses: &[f64],
        _forces: &mut [f64],
        _g: f64,
        _softening: f64,
    ) -> Result<(), AcceleratorError> {
        Err(AcceleratorError::Unsupported("nbody"))
    }

    /// One SPH time-step.
    fn sph_step(
        &self,
        _fields: &mut SphFields<'_>,
        _params: &SphParams,
    ) -> Result<(), AcceleratorError> {
        Err(AcceleratorError::Unsupported("sph"))
    }

    /// One collide-and-stream LBM time-step.
    fn lbm_evolve(&self, _lattice: &mut Lattice, _omega: f64) -> Result<(), AcceleratorError> {
        Err(AcceleratorError::Unsupported("lbm"))
    }
}

/// Result of the one-time device probe, shared by every provider.
static SHARED_PROBE: OnceLock<Result<Arc<dyn Accelerator>, AcceleratorError>> = OnceLock::new();

/// Return the process-wide accelerator, probing on first use.
///
/// The probe result is cached for the life of the process, so repeated
/// provider construction does not re-initialize the device.
pub fn probe() -> Result<Arc<dyn Accelerator>, AcceleratorError> {
    SHARED_PROBE.get_or_init(probe_device).clone()
}

#[cfg(feature = "gpu")]
fn probe_device() -> Result<Arc<dyn Accelerator>, AcceleratorError> {
    match std::panic::catch_unwind(crate::gpu::GpuAccelerator::new) {
        Ok(Ok(gpu)) => {
            tracing::info!("accelerator available: {}", gpu.name());
            Ok(Arc::new(gpu))
        }
        Ok(Err(e)) => {
            tracing::info!("no accelerator, CPU paths only: {e}");
            Err(e)
        }
        Err(_) => {
            tracing::warn!("accelerator probe panicked, CPU paths only");
            Err(AcceleratorError::DeviceCreation("probe panicked".to_string()))
        }
    }
}

#[cfg(not(feature = "gpu"))]
fn probe_device() -> Result<Arc<dyn Accelerator>, AcceleratorError> {
    tracing::debug!("built without the `gpu` feature, CPU paths only");
    Err(AcceleratorError::NoAdapter)
}
