//! Aggregate simulator state
//!
//! `GlobalState` owns every piece of domain data the daemon mutates each
//! tick or in response to an IPMI command. It deliberately does not own its
//! own lock: callers share it behind whatever synchronization primitive fits
//! their runtime (an `Arc<tokio::sync::Mutex<GlobalState>>` in the daemon),
//! so this crate stays free of any async runtime dependency.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::constants::paths;
use crate::pid::PidState;
use crate::sel::EventLog;
use crate::sensors::{self, GaussianNoise, SensorReading};
use crate::secure_boot::FwImage;

/// Whether the fan duty cycle is being driven by the PID controller or has
/// been pinned by an explicit IPMI `Set Fan Duty` command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FanControlMode {
    Automatic,
    Manual,
}

/// Everything the simulator knows right now. Not `Serialize`/`Deserialize`
/// itself — `StateSnapshot` (below) defines the on-disk document shape and
/// is built from this on each persist.
#[derive(Debug, Clone)]
pub struct GlobalState {
    pub sensors: Vec<SensorReading>,
    pub pid: PidState,
    pub fan_duty_percent: f64,
    pub fan_control_mode: FanControlMode,
    pub secure_boot_passed: bool,
    pub event_log: EventLog,
    pub fw_images: Vec<FwImage>,
    pub noise: GaussianNoise,
    pub running: bool,
}

impl GlobalState {
    /// Build the initial state: default sensor table, fresh PID controller,
    /// fan duty at the PID's initial output, automatic control.
    pub fn init(now: u64) -> Self {
        let pid = PidState::new();
        Self {
            sensors: sensors::init_sensors(now),
            fan_duty_percent: pid.output,
            pid,
            fan_control_mode: FanControlMode::Automatic,
            secure_boot_passed: false,
            event_log: EventLog::new(),
            fw_images: Vec::new(),
            noise: GaussianNoise::new(),
            running: false,
        }
    }

    pub fn state_file() -> PathBuf {
        PathBuf::from(paths::STATE_FILE)
    }

    pub fn sel_file() -> PathBuf {
        PathBuf::from(paths::SEL_FILE)
    }

    pub fn fw_image_dir() -> PathBuf {
        PathBuf::from(paths::FW_IMAGE_DIR)
    }

    /// Apply an explicit fan duty override, switching control to `Manual`.
    /// The PID continues to compute on subsequent ticks (see `tick`) so a
    /// later switch back to `Automatic` is bumpless, but its output will not
    /// be written back to `fan_duty_percent` until that switch happens.
    pub fn set_fan_duty_manual(&mut self, duty_percent: f64) {
        self.fan_duty_percent = duty_percent.clamp(0.0, 100.0);
        self.fan_control_mode = FanControlMode::Manual;
    }

    /// Advance sensors and the PID controller by one tick. Always computes
    /// the PID (so it tracks the live process value even in Manual mode) but
    /// only commits its output to `fan_duty_percent` while in Automatic mode.
    pub fn tick(&mut self, now: u64, dt: f64, rand_uniform: impl FnMut() -> f64) {
        sensors::poll_all(
            &mut self.sensors,
            self.fan_duty_percent,
            &mut self.noise,
            &mut self.event_log,
            now,
            rand_uniform,
        );

        let cpu_temp = self
            .sensors
            .iter()
            .find(|s| s.name == "CPU_Temp")
            .map(|s| s.value)
            .unwrap_or(self.pid.setpoint);

        let output = self.pid.compute(cpu_temp, dt);
        if self.fan_control_mode == FanControlMode::Automatic {
            self.fan_duty_percent = output;
        }
    }

    /// Build the on-disk state snapshot document (`/tmp/bmc_state.json`).
    /// Field names and nesting are a fixed external contract for downstream
    /// consumers of the snapshot file.
    pub fn snapshot(&self) -> StateSnapshot {
        StateSnapshot {
            sensors: self.sensors.clone(),
            thermal: ThermalSnapshot {
                fan_duty_percent: self.fan_duty_percent,
                pid: PidSnapshot {
                    kp: self.pid.kp,
                    ki: self.pid.ki,
                    kd: self.pid.kd,
                    setpoint: self.pid.setpoint,
                    output: self.pid.output,
                    integral: self.pid.integral,
                    prev_error: self.pid.prev_error,
                },
            },
            secure_boot: SecureBootSnapshot {
                overall_passed: self.secure_boot_passed,
                images: self
                    .fw_images
                    .iter()
                    .map(|img| FwImageSnapshot {
                        name: img.name.clone(),
                        expected_hash: img.expected_hash.clone(),
                        actual_hash: img.actual_hash.clone(),
                        verified: img.verified,
                        passed: img.passed,
                    })
                    .collect(),
            },
        }
    }
}

/// The state snapshot file's on-disk shape (`/tmp/bmc_state.json`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateSnapshot {
    pub sensors: Vec<SensorReading>,
    pub thermal: ThermalSnapshot,
    pub secure_boot: SecureBootSnapshot,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThermalSnapshot {
    pub fan_duty_percent: f64,
    pub pid: PidSnapshot,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PidSnapshot {
    pub kp: f64,
    pub ki: f64,
    pub kd: f64,
    pub setpoint: f64,
    pub output: f64,
    pub integral: f64,
    pub prev_error: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecureBootSnapshot {
    pub overall_passed: bool,
    pub images: Vec<FwImageSnapshot>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FwImageSnapshot {
    pub name: String,
    pub expected_hash: String,
    pub actual_hash: Option<String>,
    pub verified: bool,
    pub passed: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_starts_in_automatic_mode_with_no_secure_boot() {
        let state = GlobalState::init(0);
        assert_eq!(state.fan_control_mode, FanControlMode::Automatic);
        assert!(!state.secure_boot_passed);
        assert_eq!(state.sensors.len(), 8);
    }

    #[test]
    fn manual_override_pins_duty_and_switches_mode() {
        let mut state = GlobalState::init(0);
        state.set_fan_duty_manual(75.0);
        assert_eq!(state.fan_duty_percent, 75.0);
        assert_eq!(state.fan_control_mode, FanControlMode::Manual);

        state.tick(1, 1.0, || 0.5);
        assert_eq!(state.fan_duty_percent, 75.0);
    }

    #[test]
    fn automatic_mode_lets_the_pid_drive_duty() {
        let mut state = GlobalState::init(0);
        state.sensors[0].value = state.pid.setpoint + 30.0;
        let before = state.fan_duty_percent;
        state.tick(1, 1.0, || 0.5);
        assert_eq!(state.fan_control_mode, FanControlMode::Automatic);
        assert_ne!(state.fan_duty_percent, before);
    }

    #[test]
    fn snapshot_carries_sensors_thermal_and_secure_boot_blocks() {
        let mut state = GlobalState::init(0);
        state.fw_images = vec![crate::secure_boot::FwImage {
            name: "bootloader".to_string(),
            path: PathBuf::from("/tmp/does-not-matter"),
            expected_hash: "a".repeat(64),
            actual_hash: Some("a".repeat(64)),
            verified: true,
            passed: true,
        }];
        state.secure_boot_passed = true;

        let snapshot = state.snapshot();
        assert_eq!(snapshot.sensors.len(), 8);
        assert_eq!(snapshot.thermal.pid.setpoint, 65.0);
        assert!(snapshot.secure_boot.overall_passed);
        assert_eq!(snapshot.secure_boot.images.len(), 1);
        assert!(snapshot.secure_boot.images[0].passed);
    }
}
