//! Provider configuration: backend selection, worker count and dispatch thresholds.

use serde::{Deserialize, Serialize};
use std::fs;

use crate::error::{KernelError, KernelResult};

/// Which execution backend a provider should use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum BackendType {
    /// Probe for an accelerator and use it for large problems, CPU otherwise.
    #[default]
    Auto,
    /// Never probe; always run the CPU path.
    Cpu,
    /// Require an accelerator; construction fails when none is usable.
    Gpu,
}

/// Which CPU FFT algorithm the FFT provider runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum FftStrategy {
    /// In-place radix-2 Cooley-Tukey with bit-reversal permutation.
    #[default]
    Iterative,
    /// Even/odd divide-and-conquer with fork-join above a size threshold.
    Recursive,
}

/// Minimum problem sizes at which the accelerator path is attempted.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchThresholds {
    /// Signal length (samples).
    pub fft_min_len: usize,
    /// Body count for the gravitational solver.
    pub nbody_min_particles: usize,
    /// Particle count for the SPH step.
    pub sph_min_particles: usize,
    /// Lattice cell count (`width * height`).
    pub lbm_min_cells: usize,
}

impl Default for DispatchThresholds {
    fn default() -> Self {
        Self {
            fft_min_len: 4096,
            nbody_min_particles: 2048,
            sph_min_particles: 4096,
            lbm_min_cells: 65_536,
        }
    }
}

/// Top-level provider configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KernelConfig {
    /// Backend selection policy
    pub backend: BackendType,
    /// Dedicated worker count; `None` uses the global rayon pool
    pub threads: Option<usize>,
    /// Accelerator size thresholds
    pub thresholds: DispatchThresholds,
    /// Sub-problem length above which FFT work is split across workers
    pub fft_parallel_threshold: usize,
    /// CPU FFT algorithm
    pub fft_strategy: FftStrategy,
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self {
            backend: BackendType::Auto,
            threads: None,
            thresholds: DispatchThresholds::default(),
            fft_parallel_threshold: 1024,
            fft_strategy: FftStrategy::Iterative,
        }
    }
}

impl KernelConfig {
    /// Configuration that never touches an accelerator.
    pub fn cpu() -> Self {
        Self {
            backend: BackendType::Cpu,
            ..Self::default()
        }
    }

    /// Load configuration from a JSON file and validate it.
    pub fn load(path: &str) -> KernelResult<Self> {
        let contents = fs::read_to_string(path)
            .map_err(|e| KernelError::Config(format!("failed to read {path}: {e}")))?;
        Self::from_json(&contents)
    }

    /// Parse configuration from a JSON string and validate it.
    pub fn from_json(json: &str) -> KernelResult<Self> {
        let config: KernelConfig = serde_json::from_str(json)
            .map_err(|e| KernelError::Config(format!("failed to parse config JSON: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> KernelResult<()> {
        if self.threads == Some(0) {
            return Err(KernelError::Config("threads must be at least 1".to_string()));
        }
        if self.fft_parallel_threshold < 2 {
            return Err(KernelError::Config(
                "fft_parallel_threshold must be at least 2".to_string(),
            ));
        }
        let t = &self.thresholds;
        if t.fft_min_len == 0
            || t.nbody_min_particles == 0
            || t.sph_min_particles == 0
            || t.lbm_min_cells == 0
        {
            return Err(KernelError::Config(
                "dispatch thresholds must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}
