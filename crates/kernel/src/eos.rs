//! Equation of state for the SPH step.

/// Linear (Tait-like, exponent 1) equation of state.
///
/// ```text
/// P = k * (rho - rho0)
/// ```
///
/// # Arguments
/// * `density` - Current density rho.
/// * `rest_density` - Reference rest density rho0.
/// * `stiffness` - Gas constant k.
///
/// # Returns
/// Gauge pressure. Negative (tension) when `density < rest_density`.
#[inline]
pub fn linear_eos(density: f64, rest_density: f64, stiffness: f64) -> f64 {
    stiffness * (density - rest_density)
}
