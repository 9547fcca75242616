//! Fast Fourier Transform.
//!
//! Signals are two parallel arrays of real and imaginary parts, transformed in
//! place. Two independent algorithms implement the forward transform:
//!
//! - [`fft_iterative`]: bit-reversal permutation followed by iterative radix-2
//!   Cooley-Tukey butterflies. Twiddle factors inside a block are advanced by
//!   repeated complex multiplication rather than a trig call per butterfly.
//! - [`fft_recursive`]: even/odd divide-and-conquer that forks both halves onto
//!   the worker pool above a size threshold.
//!
//! Lengths that are not a power of two fall back to the direct O(N^2) [`dft`].
//! The inverse is always `(1/N) * conj(forward(conj(x)))`, so forward and
//! inverse share one code path.

use std::f64::consts::PI;
use std::sync::Arc;

use rayon::prelude::*;

use crate::accel::Accelerator;
use crate::config::{FftStrategy, KernelConfig};
use crate::dispatch::Dispatcher;
use crate::error::{check_len, KernelError, KernelResult};
use crate::{BackendType, Provider};

/// Reorder `real`/`imag` so index `i` holds the sample at `reverse_bits(i)`.
///
/// Swaps only when `i < j`, so every pair is exchanged once.
/// `real.len()` must be a power of two.
pub fn bit_reverse_permute(real: &mut [f64], imag: &mut [f64]) {
    let n = real.len();
    if n <= 2 {
        return;
    }
    let bits = n.trailing_zeros();
    for i in 0..n {
        let j = i.reverse_bits() >> (usize::BITS - bits);
        if i < j {
            real.swap(i, j);
            imag.swap(i, j);
        }
    }
}

/// One butterfly stage on a single block of width `len`.
fn butterfly_block(real: &mut [f64], imag: &mut [f64], w_re: f64, w_im: f64) {
    let half = real.len() / 2;
    let (mut cur_re, mut cur_im) = (1.0_f64, 0.0_f64);
    for k in 0..half {
        let b = k + half;
        let t_re = real[b] * cur_re - imag[b] * cur_im;
        let t_im = real[b] * cur_im + imag[b] * cur_re;
        real[b] = real[k] - t_re;
        imag[b] = imag[k] - t_im;
        real[k] += t_re;
        imag[k] += t_im;

        let next_re = cur_re * w_re - cur_im * w_im;
        cur_im = cur_re * w_im + cur_im * w_re;
        cur_re = next_re;
    }
}

/// In-place iterative radix-2 forward FFT.
///
/// Blocks of one stage are independent; when the signal is at least
/// `parallel_threshold` long they are processed in parallel, each worker
/// owning a disjoint range of bins. `real.len()` must be a power of two.
pub fn fft_iterative(real: &mut [f64], imag: &mut [f64], parallel_threshold: usize) {
    let n = real.len();
    if n < 2 {
        return;
    }
    bit_reverse_permute(real, imag);

    let parallel = n >= parallel_threshold;
    let mut len = 2;
    while len <= n {
        let angle = -2.0 * PI / len as f64;
        let (w_im, w_re) = angle.sin_cos();
        if parallel {
            real.par_chunks_mut(len)
                .zip(imag.par_chunks_mut(len))
                .for_each(|(re, im)| butterfly_block(re, im, w_re, w_im));
        } else {
            for (re, im) in real.chunks_mut(len).zip(imag.chunks_mut(len)) {
                butterfly_block(re, im, w_re, w_im);
            }
        }
        len <<= 1;
    }
}

/// Direct discrete Fourier transform, `X[k] = sum_j x[j] e^{-2 pi i k j / N}`.
///
/// O(N^2); used for lengths that are not a power of two. Output bins are
/// computed in parallel and written back over the input.
pub fn dft(real: &mut [f64], imag: &mut [f64]) {
    let n = real.len();
    if n < 2 {
        return;
    }
    let step = -2.0 * PI / n as f64;
    let bins: Vec<(f64, f64)> = {
        let (re_in, im_in): (&[f64], &[f64]) = (real, imag);
        (0..n)
            .into_par_iter()
            .map(|k| {
                let mut sum_re = 0.0;
                let mut sum_im = 0.0;
                for j in 0..n {
                    // Reduce k*j mod n so the angle stays in [0, 2 pi).
                    let (s, c) = (step * ((k * j) % n) as f64).sin_cos();
                    sum_re += re_in[j] * c - im_in[j] * s;
                    sum_im += re_in[j] * s + im_in[j] * c;
                }
                (sum_re, sum_im)
            })
            .collect()
    };
    for (k, (re, im)) in bins.into_iter().enumerate() {
        real[k] = re;
        imag[k] = im;
    }
}

/// Divide-and-conquer forward FFT, returning the spectrum as new vectors.
///
/// Splits into even and odd samples, transforms both halves (forked with
/// `rayon::join` when the sub-problem is at least `parallel_threshold` long),
/// then applies the radix-2 combine. Recursion depth is `log2(N)`.
/// `real.len()` must be a power of two.
pub fn fft_recursive(real: &[f64], imag: &[f64], parallel_threshold: usize) -> (Vec<f64>, Vec<f64>) {
    let n = real.len();
    if n <= 1 {
        return (real.to_vec(), imag.to_vec());
    }

    let half = n / 2;
    let even_re: Vec<f64> = real.iter().step_by(2).copied().collect();
    let even_im: Vec<f64> = imag.iter().step_by(2).copied().collect();
    let odd_re: Vec<f64> = real.iter().skip(1).step_by(2).copied().collect();
    let odd_im: Vec<f64> = imag.iter().skip(1).step_by(2).copied().collect();

    let ((e_re, e_im), (o_re, o_im)) = if n >= parallel_threshold {
        rayon::join(
            || fft_recursive(&even_re, &even_im, parallel_threshold),
            || fft_recursive(&odd_re, &odd_im, parallel_threshold),
        )
    } else {
        (
            fft_recursive(&even_re, &even_im, parallel_threshold),
            fft_recursive(&odd_re, &odd_im, parallel_threshold),
        )
    };

    let mut out_re = vec![0.0; n];
    let mut out_im = vec![0.0; n];
    for k in 0..half {
        let (s, c) = (-2.0 * PI * k as f64 / n as f64).sin_cos();
        let t_re = c * o_re[k] - s * o_im[k];
        let t_im = c * o_im[k] + s * o_re[k];
        out_re[k] = e_re[k] + t_re;
        out_im[k] = e_im[k] + t_im;
        out_re[k + half] = e_re[k] - t_re;
        out_im[k + half] = e_im[k] - t_im;
    }
    (out_re, out_im)
}

/// Squared magnitude `|X_k|^2` of each bin.
pub fn power_spectrum(real: &[f64], imag: &[f64]) -> Vec<f64> {
    real.iter()
        .zip(imag)
        .map(|(re, im)| re * re + im * im)
        .collect()
}

/// FFT provider: forward and inverse transforms with accelerator dispatch.
pub struct FftProvider {
    dispatch: Dispatcher,
    strategy: FftStrategy,
    parallel_threshold: usize,
}

impl FftProvider {
    /// Auto-probing provider with default configuration.
    pub fn new() -> Self {
        Self::from_config(&KernelConfig::default()).unwrap_or_else(|_| Self::cpu())
    }

    /// CPU-only provider on the global worker pool.
    pub fn cpu() -> Self {
        let config = KernelConfig::cpu();
        Self {
            dispatch: Dispatcher::cpu(config.thresholds.fft_min_len),
            strategy: config.fft_strategy,
            parallel_threshold: config.fft_parallel_threshold,
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
        let dispatch = Dispatcher::from_config(config, config.thresholds.fft_min_len)?;
        tracing::info!("FFT provider: {}", dispatch.label("FFT"));
        Ok(Self {
            dispatch,
            strategy: config.fft_strategy,
            parallel_threshold: config.fft_parallel_threshold,
        })
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
                config.thresholds.fft_min_len,
            )?,
            strategy: config.fft_strategy,
            parallel_threshold: config.fft_parallel_threshold,
        })
    }

    /// CPU algorithm used by this provider.
    pub fn strategy(&self) -> FftStrategy {
        self.strategy
    }

    /// Forward transform of `(real, imag)`, in place.
    pub fn transform(&self, real: &mut [f64], imag: &mut [f64]) -> KernelResult<()> {
        let n = real.len();
        if n == 0 {
            return Err(KernelError::EmptySignal);
        }
        check_len("imag", n, imag.len())?;

        if let Some(accel) = self.dispatch.accelerator_for(n, n.is_power_of_two()) {
            match accel.fft(real, imag) {
                Ok(()) => return Ok(()),
                Err(e) => self.dispatch.note_fallback("FFT", &e),
            }
        }

        tracing::debug!(n, strategy = ?self.strategy, "FFT CPU path");
        self.dispatch.pool().install(|| self.forward_cpu(real, imag));
        Ok(())
    }

    /// Scaled inverse transform, in place: `(1/N) * conj(forward(conj(x)))`.
    pub fn inverse_transform(&self, real: &mut [f64], imag: &mut [f64]) -> KernelResult<()> {
        if real.is_empty() {
            return Err(KernelError::EmptySignal);
        }
        check_len("imag", real.len(), imag.len())?;

        imag.iter_mut().for_each(|v| *v = -*v);
        self.transform(real, imag)?;

        let scale = 1.0 / real.len() as f64;
        real.iter_mut().for_each(|v| *v *= scale);
        imag.iter_mut().for_each(|v| *v = -*v * scale);
        Ok(())
    }

    fn forward_cpu(&self, real: &mut [f64], imag: &mut [f64]) {
        if !real.len().is_power_of_two() {
            dft(real, imag);
            return;
        }
        match self.strategy {
            FftStrategy::Iterative => fft_iterative(real, imag, self.parallel_threshold),
            FftStrategy::Recursive => {
                let (re, im) = fft_recursive(real, imag, self.parallel_threshold);
                real.copy_from_slice(&re);
                imag.copy_from_slice(&im);
            }
        }
    }
}

impl Default for FftProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl Provider for FftProvider {
    fn name(&self) -> String {
        self.dispatch.label("FFT")
    }

    fn supports_gpu(&self) -> bool {
        self.dispatch.supports_gpu()
    }

    fn backend(&self) -> BackendType {
        self.dispatch.backend()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOL: f64 = 1.0e-10;

    fn assert_close(a: &[f64], b: &[f64], tol: f64) {
        assert_eq!(a.len(), b.len());
        for (i, (x, y)) in a.iter().zip(b).enumerate() {
            assert!((x - y).abs() < tol, "index {i}: {x} vs {y}");
        }
    }

    #[test]
    fn bit_reverse_of_eight() {
        let mut re: Vec<f64> = (0..8).map(|i| i as f64).collect();
        let mut im = vec![0.0; 8];
        bit_reverse_permute(&mut re, &mut im);
        assert_eq!(re, vec![0.0, 4.0, 2.0, 6.0, 1.0, 5.0, 3.0, 7.0]);
    }

    #[test]
    fn bit_reverse_is_involution() {
        let orig: Vec<f64> = (0..64).map(|i| i as f64).collect();
        let mut re = orig.clone();
        let mut im = vec![0.0; 64];
        bit_reverse_permute(&mut re, &mut im);
        bit_reverse_permute(&mut re, &mut im);
        assert_eq!(re, orig);
    }

    #[test]
    fn impulse_gives_flat_spectrum() {
        let mut re = vec![1.0, 0.0, 0.0, 0.0];
        let mut im = vec![0.0; 4];
        fft_iterative(&mut re, &mut im, usize::MAX);
        assert_close(&re, &[1.0, 1.0, 1.0, 1.0], TOL);
        assert_close(&im, &[0.0, 0.0, 0.0, 0.0], TOL);
    }

    #[test]
    fn constant_signal_concentrates_in_dc() {
        let mut re = vec![2.0; 8];
        let mut im = vec![0.0; 8];
        fft_iterative(&mut re, &mut im, usize::MAX);
        assert!((re[0] - 16.0).abs() < TOL);
        for k in 1..8 {
            assert!(re[k].abs() < TOL && im[k].abs() < TOL, "bin {k}");
        }
    }

    #[test]
    fn dft_matches_iterative_on_power_of_two() {
        let orig_re: Vec<f64> = (0..16).map(|i| ((i * 7) % 5) as f64 - 2.0).collect();
        let orig_im: Vec<f64> = (0..16).map(|i| ((i * 3) % 4) as f64 * 0.5).collect();

        let (mut a_re, mut a_im) = (orig_re.clone(), orig_im.clone());
        fft_iterative(&mut a_re, &mut a_im, usize::MAX);
        let (mut b_re, mut b_im) = (orig_re, orig_im);
        dft(&mut b_re, &mut b_im);

        assert_close(&a_re, &b_re, 1.0e-9);
        assert_close(&a_im, &b_im, 1.0e-9);
    }

    #[test]
    fn parallel_stages_match_sequential() {
        let orig: Vec<f64> = (0..256).map(|i| (i as f64 * 0.37).sin()).collect();
        let (mut a_re, mut a_im) = (orig.clone(), vec![0.0; 256]);
        let (mut b_re, mut b_im) = (orig, vec![0.0; 256]);
        fft_iterative(&mut a_re, &mut a_im, usize::MAX);
        fft_iterative(&mut b_re, &mut b_im, 2);
        assert_eq!(a_re, b_re);
        assert_eq!(a_im, b_im);
    }

    #[test]
    fn dft_of_three_samples() {
        // x = [1, 2, 3]: X0 = 6, X1 = -1.5 + 0.866i, X2 = -1.5 - 0.866i
        let mut re = vec![1.0, 2.0, 3.0];
        let mut im = vec![0.0; 3];
        dft(&mut re, &mut im);
        let h = 3.0_f64.sqrt() / 2.0;
        assert_close(&re, &[6.0, -1.5, -1.5], 1.0e-12);
        assert_close(&im, &[0.0, h, -h], 1.0e-12);
    }

    #[test]
    fn recursive_length_one_is_identity() {
        let (re, im) = fft_recursive(&[3.5], &[-1.0], 2);
        assert_eq!(re, vec![3.5]);
        assert_eq!(im, vec![-1.0]);
    }

    #[test]
    fn provider_rejects_empty_and_mismatched() {
        let fft = FftProvider::cpu();
        let mut re: Vec<f64> = vec![];
        let mut im: Vec<f64> = vec![];
        assert!(matches!(fft.transform(&mut re, &mut im), Err(KernelError::EmptySignal)));

        let mut re = vec![1.0, 2.0];
        let mut im = vec![0.0];
        assert!(matches!(
            fft.inverse_transform(&mut re, &mut im),
            Err(KernelError::LengthMismatch { buffer: "imag", .. })
        ));
        // Rejected before any mutation.
        assert_eq!(im, vec![0.0]);
    }

    #[test]
    fn provider_length_one() {
        let fft = FftProvider::cpu();
        let mut re = vec![4.0];
        let mut im = vec![2.0];
        fft.transform(&mut re, &mut im).unwrap();
        assert_eq!((re[0], im[0]), (4.0, 2.0));
        fft.inverse_transform(&mut re, &mut im).unwrap();
        assert_eq!((re[0], im[0]), (4.0, 2.0));
    }

    #[test]
    fn non_power_of_two_round_trip() {
        let fft = FftProvider::cpu();
        let orig: Vec<f64> = (0..12).map(|i| (i as f64).cos() + 0.25 * i as f64).collect();
        let mut re = orig.clone();
        let mut im = vec![0.0; 12];
        fft.transform(&mut re, &mut im).unwrap();
        fft.inverse_transform(&mut re, &mut im).unwrap();
        assert_close(&re, &orig, 1.0e-10);
        assert_close(&im, &[0.0; 12], 1.0e-10);
    }

    #[test]
    fn power_spectrum_of_impulse() {
        let ps = power_spectrum(&[1.0, 1.0], &[0.0, 2.0]);
        assert_eq!(ps, vec![1.0, 5.0]);
    }

    #[test]
    fn cpu_provider_name() {
        let fft = FftProvider::cpu();
        assert_eq!(fft.name(), "FFT CPU");
        assert!(!fft.supports_gpu());
        assert_eq!(fft.backend(), BackendType::Cpu);
    }
}
