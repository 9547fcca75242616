//! Backend selection shared by all providers.
//!
//! The decision is made once per call, never per element:
//!
//! ```text
//! use_accelerator = accelerator_available && size >= threshold && precondition
//! ```
//!
//! If the accelerator is taken and fails, the CPU path runs exactly once.

use std::sync::Arc;

use crate::accel::{self, Accelerator};
use crate::config::{BackendType, KernelConfig};
use crate::error::{AcceleratorError, KernelResult};

/// The code path chosen for one kernel call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    /// Reference CPU implementation.
    Cpu,
    /// Accelerator attempt (with CPU fallback on failure).
    Accelerator,
}

/// Pure dispatch rule.
pub fn use_accelerator(available: bool, size: usize, threshold: usize, precondition: bool) -> bool {
    available && size >= threshold && precondition
}

/// Data-parallel worker pool used by the CPU paths.
///
/// Either the global rayon pool or a dedicated pool with a fixed worker count.
/// Every kernel body runs inside [`CpuPool::install`], so `par_iter` calls in
/// the kernels fan out on the selected pool and join before returning.
pub struct CpuPool {
    pool: Option<rayon::ThreadPool>,
}

impl CpuPool {
    /// Use the global rayon pool.
    pub fn global() -> Self {
        Self { pool: None }
    }

    /// Build a dedicated pool with `threads` workers.
    pub fn with_threads(threads: usize) -> KernelResult<Self> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|i| format!("simkernels-{i}"))
            .build()?;
        Ok(Self { pool: Some(pool) })
    }

    /// Number of workers available to kernel bodies.
    pub fn threads(&self) -> usize {
        match &self.pool {
            Some(pool) => pool.current_num_threads(),
            None => rayon::current_num_threads(),
        }
    }

    /// Whether this pool was built with an explicit worker count.
    pub fn is_dedicated(&self) -> bool {
        self.pool.is_some()
    }

    /// Run `op` with this pool as the current rayon pool.
    pub fn install<R, F>(&self, op: F) -> R
    where
        R: Send,
        F: FnOnce() -> R + Send,
    {
        match &self.pool {
            Some(pool) => pool.install(op),
            None => op(),
        }
    }
}

/// Per-provider dispatch state: cached probe result, threshold and CPU pool.
pub struct Dispatcher {
    backend: BackendType,
    accelerator: Option<Arc<dyn Accelerator>>,
    threshold: usize,
    pool: CpuPool,
}

impl Dispatcher {
    /// Build dispatch state from configuration, probing the shared accelerator
    /// unless the backend is [`BackendType::Cpu`].
    pub fn from_config(config: &KernelConfig, threshold: usize) -> KernelResult<Self> {
        config.validate()?;
        let accelerator = match config.backend {
            BackendType::Cpu => None,
            BackendType::Auto => accel::probe().ok(),
            BackendType::Gpu => Some(accel::probe()?),
        };
        Self::assemble(config, accelerator, threshold)
    }

    /// CPU-only dispatch state on the global pool. Never probes.
    pub fn cpu(threshold: usize) -> Self {
        Self {
            backend: BackendType::Cpu,
            accelerator: None,
            threshold,
            pool: CpuPool::global(),
        }
    }

    /// Build dispatch state around an explicit accelerator.
    ///
    /// The accelerator's availability is still honoured: an unavailable
    /// accelerator is dropped here and never called.
    pub fn with_accelerator(
        accelerator: Arc<dyn Accelerator>,
        config: &KernelConfig,
        threshold: usize,
    ) -> KernelResult<Self> {
        config.validate()?;
        Self::assemble(config, Some(accelerator), threshold)
    }

    fn assemble(
        config: &KernelConfig,
        accelerator: Option<Arc<dyn Accelerator>>,
        threshold: usize,
    ) -> KernelResult<Self> {
        let accelerator = accelerator.filter(|a| a.is_available());
        if config.backend == BackendType::Gpu && accelerator.is_none() {
            return Err(AcceleratorError::NoAdapter.into());
        }
        let pool = match config.threads {
            Some(n) => CpuPool::with_threads(n)?,
            None => CpuPool::global(),
        };
        // A GPU-only provider attempts the device for every problem size.
        let threshold = match config.backend {
            BackendType::Gpu => 1,
            _ => threshold,
        };
        Ok(Self {
            backend: config.backend,
            accelerator,
            threshold,
            pool,
        })
    }

    /// Configured backend policy.
    pub fn backend(&self) -> BackendType {
        self.backend
    }

    /// Cached result of the availability probe.
    pub fn supports_gpu(&self) -> bool {
        self.accelerator.is_some()
    }

    /// Size threshold for the accelerator path.
    pub fn threshold(&self) -> usize {
        self.threshold
    }

    /// The CPU worker pool.
    pub fn pool(&self) -> &CpuPool {
        &self.pool
    }

    /// Choose the code path for a problem of `size` elements.
    pub fn select(&self, size: usize, precondition: bool) -> Backend {
        if use_accelerator(self.supports_gpu(), size, self.threshold, precondition) {
            Backend::Accelerator
        } else {
            Backend::Cpu
        }
    }

    /// The accelerator to attempt for this call, if any.
    pub fn accelerator_for(&self, size: usize, precondition: bool) -> Option<&dyn Accelerator> {
        match self.select(size, precondition) {
            Backend::Accelerator => self.accelerator.as_deref(),
            Backend::Cpu => None,
        }
    }

    /// Record a failed accelerator attempt before the CPU path runs.
    pub fn note_fallback(&self, kernel: &str, err: &AcceleratorError) {
        match err {
            AcceleratorError::Unsupported(_) => {
                tracing::debug!("{kernel}: {err}, running CPU path");
            }
            _ => tracing::warn!("{kernel}: accelerator failed ({err}), falling back to CPU"),
        }
    }

    /// Diagnostic label: `"<kernel> GPU (<device>)"`, `"<kernel> CPU (n threads)"`
    /// or `"<kernel> CPU"`.
    pub fn label(&self, kernel: &str) -> String {
        match &self.accelerator {
            Some(accel) => format!("{kernel} GPU ({})", accel.name()),
            None if self.pool.is_dedicated() => {
                format!("{kernel} CPU ({} threads)", self.pool.threads())
            }
            None => format!("{kernel} CPU"),
        }
    }
}
