//! Discrete PID controller used by every stage of the FOC cascade.
//!
//! Works in `no_std` and does not allocate memory.

use serde::{Deserialize, Serialize};

/// Tunable gains and limits for one control loop.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PidParams {
    /// Proportional gain
    pub kp: f32,
    /// Integral gain
    pub ki: f32,
    /// Derivative gain
    pub kd: f32,
    /// Symmetric clamp on the accumulated integral
    pub integral_limit: f32,
    /// Symmetric clamp on the controller output
    pub output_limit: f32,
}

impl PidParams {
    pub const fn new(
        kp: f32,
        ki: f32,
        kd: f32,
        integral_limit: f32,
        output_limit: f32,
    ) -> Self {
        Self {
            kp,
            ki,
            kd,
            integral_limit,
            output_limit,
        }
    }
}

/// Clamp `value` to `[-bound, bound]`. Never panics, whatever `bound` is.
///
/// A NaN value or bound yields `0.0`.
pub fn limit(
    value: f32,
    bound: f32,
) -> f32 {
    if value.is_nan() || bound.is_nan() {
        return 0.0;
    }
    let bound = libm::fabsf(bound);
    value.max(-bound).min(bound)
}

/// A discrete PID controller with a fixed timestep.
pub struct PidController {
    params: PidParams,
    dt: f32,
    prev_err: f32,
    integral: f32,
    first_update: bool,
}

impl PidController {
    pub fn new(
        params: PidParams,
        dt: f32,
    ) -> Self {
        Self {
            params,
            dt,
            prev_err: 0.0,
            integral: 0.0,
            first_update: true,
        }
    }

    pub fn params(&self) -> PidParams {
        self.params
    }

    /// Replace the gains and limits, discarding accumulated state.
    pub fn set_params(
        &mut self,
        params: PidParams,
    ) {
        self.params = params;
        self.reset();
    }

    /// Compute control output for the current error.
    ///
    /// The derivative term is skipped on the first update after a reset.
    /// A NaN error yields `0.0` and leaves the loop history untouched.
    pub fn update(
        &mut self,
        error: f32,
    ) -> f32 {
        if error.is_nan() {
            return 0.0;
        }
        let p = &self.params;

        self.integral = limit(self.integral + error * self.dt, p.integral_limit);

        let derivative = if self.first_update {
            self.first_update = false;
            0.0
        } else {
            (error - self.prev_err) / self.dt
        };
        self.prev_err = error;

        limit(p.kp * error + p.ki * self.integral + p.kd * derivative, p.output_limit)
    }

    /// Reset integrator and derivative history.
    pub fn reset(&mut self) {
        self.prev_err = 0.0;
        self.integral = 0.0;
        self.first_update = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DT: f32 = 0.01;

    #[test]
    fn test_proportional_only() {
        let mut pid = PidController::new(PidParams::new(2.0, 0.0, 0.0, 10.0, 10.0), DT);
        assert!(libm::fabsf(pid.update(1.5) - 3.0) < 1e-6);
    }

    #[test]
    fn test_output_clamped() {
        let mut pid = PidController::new(PidParams::new(100.0, 0.0, 0.0, 10.0, 1.0), DT);
        assert_eq!(pid.update(5.0), 1.0);
        assert_eq!(pid.update(-5.0), -1.0);
    }

    #[test]
    fn test_integral_anti_windup() {
        let mut pid = PidController::new(PidParams::new(0.0, 1.0, 0.0, 0.05, 10.0), DT);
        for _ in 0..1000 {
            pid.update(1.0);
        }
        // integral saturates at 0.05 regardless of how long the error persists
        assert!(libm::fabsf(pid.update(1.0) - 0.05) < 1e-6);
    }

    #[test]
    fn test_derivative_skips_first_update() {
        let mut pid = PidController::new(PidParams::new(0.0, 0.0, 1.0, 10.0, 1000.0), DT);
        assert_eq!(pid.update(1.0), 0.0);
        assert!(libm::fabsf(pid.update(2.0) - 100.0) < 1e-3);
    }

    #[test]
    fn test_limit_tolerates_negative_bound() {
        assert_eq!(limit(5.0, -2.0), 2.0);
        assert_eq!(limit(-5.0, 2.0), -2.0);
        assert_eq!(limit(0.5, 2.0), 0.5);
    }

    #[test]
    fn test_limit_maps_nan_to_zero() {
        assert_eq!(limit(f32::NAN, 10.0), 0.0);
        assert_eq!(limit(3.0, f32::NAN), 0.0);
        assert_eq!(limit(f32::INFINITY, 10.0), 10.0);
    }

    #[test]
    fn test_nan_error_does_not_saturate() {
        let mut pid = PidController::new(PidParams::new(1.0, 1.0, 0.0, 10.0, 10.0), DT);
        assert_eq!(pid.update(f32::NAN), 0.0);
        assert!(libm::fabsf(pid.update(0.5) - (0.5 + 0.5 * DT)) < 1e-6);
    }

    #[test]
    fn test_reset_clears_history() {
        let mut pid = PidController::new(PidParams::new(0.0, 1.0, 0.0, 10.0, 10.0), DT);
        pid.update(1.0);
        pid.reset();
        assert!(libm::fabsf(pid.update(1.0) - DT) < 1e-6);
    }
}
