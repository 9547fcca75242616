//! Typed errors for kernel preconditions, configuration and accelerators.
//!
//! Kernel entry points validate their inputs up front and return
//! [`KernelError`] instead of producing NaN/Infinity. Accelerator failures are
//! described by [`AcceleratorError`]; they are caught at the provider boundary
//! and turned into a CPU fallback, so callers of a kernel never see one unless
//! they explicitly asked for a GPU-only provider.

/// Errors returned by kernel calls and provider construction.
#[derive(Debug, thiserror::Error)]
pub enum KernelError {
    /// A caller-supplied buffer does not have the length implied by the others.
    #[error("length mismatch for `{buffer}`: expected {expected}, got {actual}")]
    LengthMismatch {
        /// Name of the offending buffer.
        buffer: &'static str,
        /// Length implied by the other buffers.
        expected: usize,
        /// Length actually supplied.
        actual: usize,
    },

    /// A scalar parameter is outside its valid domain.
    #[error("invalid parameter `{name}` = {value}: {reason}")]
    InvalidParameter {
        /// Parameter name.
        name: &'static str,
        /// Supplied value.
        value: f64,
        /// What the value must satisfy.
        reason: &'static str,
    },

    /// A transform was requested on a zero-length signal.
    #[error("signal must contain at least one sample")]
    EmptySignal,

    /// Configuration could not be read, parsed or validated.
    #[error("configuration error: {0}")]
    Config(String),

    /// A dedicated worker pool could not be built.
    #[error("failed to build worker pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),

    /// A GPU-only provider was requested but no accelerator is usable.
    #[error("accelerator unavailable: {0}")]
    Accelerator(#[from] AcceleratorError),
}

/// Errors raised by an accelerator backend.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum AcceleratorError {
    /// No compatible adapter was found.
    #[error("no GPU adapter found")]
    NoAdapter,

    /// Device creation failed (wraps the backend's message).
    #[error("failed to create GPU device: {0}")]
    DeviceCreation(String),

    /// The backend has no implementation for this kernel or problem shape.
    #[error("operation not supported by accelerator: {0}")]
    Unsupported(&'static str),

    /// Submitting work or reading results back failed.
    #[error("accelerator dispatch failed: {0}")]
    Dispatch(String),

    /// The device produced NaN or Infinity where the reference path would not.
    #[error("accelerator produced non-finite output")]
    NonFinite,

    /// The construction-time self-test returned a wrong answer.
    #[error("accelerator self-test failed: {0}")]
    SelfTest(String),
}

/// Convenience alias used by every kernel entry point.
pub type KernelResult<T> = Result<T, KernelError>;

/// Check that `buffer` has exactly `expected` elements.
pub(crate) fn check_len(buffer: &'static str, expected: usize, actual: usize) -> KernelResult<()> {
    if expected == actual {
        Ok(())
    } else {
        Err(KernelError::LengthMismatch {
            buffer,
            expected,
            actual,
        })
    }
}

/// Check that `value` is finite and strictly positive.
pub(crate) fn check_positive(name: &'static str, value: f64) -> KernelResult<()> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(KernelError::InvalidParameter {
            name,
            value,
            reason: "must be finite and > 0",
        })
    }
}

/// Check that `value` is finite.
pub(crate) fn check_finite(name: &'static str, value: f64) -> KernelResult<()> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(KernelError::InvalidParameter {
            name,
            value,
            reason: "must be finite",
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_length_mismatch() {
        let err = KernelError::LengthMismatch {
            buffer: "forces",
            expected: 6,
            actual: 3,
        };
        assert_eq!(err.to_string(), "length mismatch for `forces`: expected 6, got 3");
    }

    #[test]
    fn display_no_adapter() {
        let err = AcceleratorError::NoAdapter;
        assert_eq!(err.to_string(), "no GPU adapter found");
    }

    #[test]
    fn accelerator_error_converts() {
        let err: KernelError = AcceleratorError::Unsupported("fft").into();
        assert!(err.to_string().contains("fft"));
    }

    #[test]
    fn positive_check_rejects_zero_and_nan() {
        assert!(check_positive("h", 0.0).is_err());
        assert!(check_positive("h", f64::NAN).is_err());
        assert!(check_positive("h", -1.0).is_err());
        assert!(check_positive("h", 0.1).is_ok());
    }

    #[test]
    fn len_check() {
        assert!(check_len("x", 3, 3).is_ok());
        assert!(matches!(
            check_len("x", 3, 2),
            Err(KernelError::LengthMismatch { expected: 3, actual: 2, .. })
        ));
    }
}
