//! PID fan-speed controller
//!
//! A textbook proportional-integral-derivative controller with integral
//! anti-windup and a base duty offset.

use serde::{Deserialize, Serialize};

use crate::constants::pid as pid_consts;

/// Controller state. `error = current_temp - setpoint`: a reading hotter than
/// the setpoint produces positive error, which should increase fan duty.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PidState {
    pub kp: f64,
    pub ki: f64,
    pub kd: f64,
    pub setpoint: f64,
    pub integral: f64,
    pub prev_error: f64,
    pub output: f64,
    pub output_min: f64,
    pub output_max: f64,
}

impl Default for PidState {
    fn default() -> Self {
        Self {
            kp: pid_consts::DEFAULT_KP,
            ki: pid_consts::DEFAULT_KI,
            kd: pid_consts::DEFAULT_KD,
            setpoint: pid_consts::DEFAULT_SETPOINT,
            integral: 0.0,
            prev_error: 0.0,
            output: pid_consts::INITIAL_OUTPUT,
            output_min: pid_consts::DEFAULT_OUTPUT_MIN,
            output_max: pid_consts::DEFAULT_OUTPUT_MAX,
        }
    }
}

impl PidState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Advance the controller by one tick of duration `dt` (seconds) given the
    /// latest process value `current`, returning the new clamped output.
    pub fn compute(&mut self, current: f64, dt: f64) -> f64 {
        let dt = if dt <= 0.0 { 1.0 } else { dt };
        let error = current - self.setpoint;

        self.integral += error * dt;
        if self.ki > 0.0 {
            let limit = (self.output_max - self.output_min) / self.ki;
            self.integral = self.integral.clamp(-limit, limit);
        }

        let derivative = (error - self.prev_error) / dt;
        self.prev_error = error;

        let p_term = self.kp * error;
        let i_term = self.ki * self.integral;
        let d_term = self.kd * derivative;

        let output = p_term + i_term + d_term + pid_consts::BASE_OFFSET;
        self.output = output.clamp(self.output_min, self.output_max);
        self.output
    }

    /// Zero the accumulated integral and derivative history, e.g. after a mode
    /// switch, without touching gains, setpoint, or output limits.
    pub fn reset(&mut self) {
        self.integral = 0.0;
        self.prev_error = 0.0;
    }

    /// Change the output clamp range, rejecting an inverted range and
    /// re-clamping the current output to the new bounds.
    pub fn set_output_limits(&mut self, min: f64, max: f64) -> Result<(), String> {
        if min >= max {
            return Err(format!("invalid output limits: min {} >= max {}", min, max));
        }
        self.output_min = min;
        self.output_max = max;
        self.output = self.output.clamp(min, max);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn initializes_with_midrange_output_and_default_gains() {
        let pid = PidState::new();
        assert_eq!(pid.output, 30.0);
        assert_eq!(pid.output_min, 10.0);
        assert_eq!(pid.output_max, 100.0);
    }

    #[test]
    fn at_setpoint_output_sits_near_base_offset() {
        let mut pid = PidState::new();
        pid.kp = 2.0;
        let out = pid.compute(pid.setpoint, 1.0);
        assert!((out - 40.0).abs() <= 5.0, "output was {}", out);
    }

    #[test]
    fn above_setpoint_increases_output() {
        let mut pid = PidState::new();
        let out = pid.compute(pid.setpoint + 20.0, 1.0);
        assert!(out > 50.0);
        assert!(out <= 100.0);
    }

    #[test]
    fn below_setpoint_decreases_output() {
        let mut pid = PidState::new();
        let out = pid.compute(pid.setpoint - 20.0, 1.0);
        assert!(out < 40.0);
        assert!(out >= 10.0);
    }

    #[test]
    fn output_clamps_to_custom_limits() {
        let mut pid = PidState::new();
        pid.set_output_limits(20.0, 80.0).unwrap();
        let low = pid.compute(pid.setpoint - 100.0, 1.0);
        assert_eq!(low, 20.0);

        pid.reset();
        let high = pid.compute(pid.setpoint + 100.0, 1.0);
        assert_eq!(high, 80.0);
    }

    #[test]
    fn set_output_limits_rejects_inverted_range() {
        let mut pid = PidState::new();
        assert!(pid.set_output_limits(80.0, 20.0).is_err());
    }

    #[test]
    fn converges_to_setpoint_under_a_simplified_thermal_model() {
        let mut pid = PidState::new();
        pid.kp = 3.0;
        pid.ki = 0.1;
        pid.kd = 1.5;
        pid.setpoint = 65.0;

        let mut temp = 70.0;
        for _ in 0..100 {
            let output = pid.compute(temp, 1.0);
            temp += (55.0 + 15.0 - (output / 100.0) * 25.0 - temp) * 0.1;
        }

        assert!((temp - 65.0).abs() < 5.0, "final temp was {}", temp);
    }

    #[test]
    fn reset_zeroes_integral_and_prev_error() {
        let mut pid = PidState::new();
        pid.compute(pid.setpoint + 10.0, 1.0);
        assert_ne!(pid.integral, 0.0);

        pid.reset();
        assert_eq!(pid.integral, 0.0);
        assert_eq!(pid.prev_error, 0.0);
    }
}
