//! Reference-frame transforms for field-oriented control.
//!
//! Three-phase quantities (a, b, c) map to the stationary two-axis frame
//! (alpha, beta) through the Clarke transform, and from there to the rotating
//! rotor frame (d, q) through the Park transform. The inverse transforms take
//! controller outputs back to per-phase duty cycles.
//!
//! # Example
//! ```rust
//! use drvkit_core::utils::math::transforms::inverse_clarke;
//! let duties = inverse_clarke(1.0, 0.0);
//! assert_eq!(duties, [1.0, -0.5, -0.5]);
//! ```

/// sqrt(3)/2, truncated to the precision of the phase B/C coefficients.
pub const SQRT3_OVER_2: f32 = 0.866;

/// 1/sqrt(3)
const FRAC_1_SQRT_3: f32 = 0.577_350_27;

/// Amplitude-invariant Clarke transform of two measured phase currents.
///
/// The third phase is implied by `ia + ib + ic = 0`. Returns `(alpha, beta)`.
pub fn clarke(
    ia: f32,
    ib: f32,
) -> (f32, f32) {
    (ia, FRAC_1_SQRT_3 * (ia + 2.0 * ib))
}

/// Park transform into the rotor frame at electrical angle `theta` (rad).
///
/// Returns `(d, q)`.
pub fn park(
    alpha: f32,
    beta: f32,
    theta: f32,
) -> (f32, f32) {
    let (s, c) = (libm::sinf(theta), libm::cosf(theta));
    (c * alpha + s * beta, c * beta - s * alpha)
}

/// Inverse Park transform from the rotor frame at electrical angle `theta`.
///
/// Returns `(alpha, beta)`. At `theta = 0` this is the identity.
pub fn inverse_park(
    d: f32,
    q: f32,
    theta: f32,
) -> (f32, f32) {
    let (s, c) = (libm::sinf(theta), libm::cosf(theta));
    (c * d - s * q, s * d + c * q)
}

/// Inverse Clarke transform to three phase duty components.
///
/// Results are not clamped; see [`clamp_duty`].
pub fn inverse_clarke(
    alpha: f32,
    beta: f32,
) -> [f32; 3] {
    [
        alpha,
        -0.5 * alpha + SQRT3_OVER_2 * beta,
        -0.5 * alpha - SQRT3_OVER_2 * beta,
    ]
}

/// Clamp a duty cycle to the closed interval `[0.0, 1.0]`.
///
/// NaN maps to `0.0` so a corrupted setpoint never reaches the output stage.
pub fn clamp_duty(duty: f32) -> f32 {
    if duty.is_nan() {
        0.0
    } else {
        duty.clamp(0.0, 1.0)
    }
}
