//! Sensor simulation & polling engine
//!
//! Advances a first-order thermal/electrical model for each configured sensor,
//! reclassifies status, and emits SEL entries on transitions into a non-Ok state.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::constants::{self, sensor as sensor_consts, DEFAULT_SENSORS};
use crate::sel::{EventLog, Severity};

/// Sensor measurement category. Drives which update formula `poll_all` applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SensorKind {
    Temperature,
    Voltage,
    FanRpm,
    Power,
}

impl SensorKind {
    /// Wire-level tag used by the IPMI `Get Sensor Reading` response (byte 3).
    pub fn wire_tag(self) -> u8 {
        match self {
            SensorKind::Temperature => 0,
            SensorKind::Voltage => 1,
            SensorKind::FanRpm => 2,
            SensorKind::Power => 3,
        }
    }
}

impl std::fmt::Display for SensorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SensorKind::Temperature => "Temperature",
            SensorKind::Voltage => "Voltage",
            SensorKind::FanRpm => "Fan",
            SensorKind::Power => "Power",
        };
        f.write_str(s)
    }
}

/// Health classification derived from a reading's value against its thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SensorStatus {
    Ok,
    Warning,
    Critical,
    Absent,
}

impl SensorStatus {
    /// Wire-level tag used by the IPMI `Get Sensor Reading` response (byte 2).
    pub fn wire_tag(self) -> u8 {
        match self {
            SensorStatus::Ok => 0,
            SensorStatus::Warning => 1,
            SensorStatus::Critical => 2,
            SensorStatus::Absent => 3,
        }
    }
}

impl std::fmt::Display for SensorStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SensorStatus::Ok => "OK",
            SensorStatus::Warning => "Warning",
            SensorStatus::Critical => "Critical",
            SensorStatus::Absent => "Absent",
        };
        f.write_str(s)
    }
}

/// A single sensor's live state. Invariant: `min_valid <= max_warning <= max_critical`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SensorReading {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: SensorKind,
    pub value: f64,
    pub min_valid: f64,
    pub max_warning: f64,
    pub max_critical: f64,
    pub status: SensorStatus,
    pub last_updated: u64,
}

impl SensorReading {
    fn from_config(cfg: &constants::SensorConfig, now: u64) -> Self {
        Self {
            name: cfg.name.to_string(),
            kind: cfg.kind,
            value: cfg.base_value,
            min_valid: cfg.min_valid,
            max_warning: cfg.max_warning,
            max_critical: cfg.max_critical,
            status: SensorStatus::Ok,
            last_updated: now,
        }
    }
}

/// Gaussian noise generator using the Box-Muller transform with spare-value
/// caching: each pair of uniform draws produces two independent normal samples,
/// so every other call is a cheap cached lookup instead of a fresh transform.
#[derive(Debug, Default, Clone, Copy)]
pub struct GaussianNoise {
    spare: Option<f64>,
}

impl GaussianNoise {
    pub fn new() -> Self {
        Self { spare: None }
    }

    /// Sample `N(mean, stddev)`, using `rand_uniform` to obtain fresh draws in
    /// `[-1.0, 1.0)` when the spare value has been consumed.
    pub fn sample(&mut self, mean: f64, stddev: f64, mut rand_uniform: impl FnMut() -> f64) -> f64 {
        if let Some(spare) = self.spare.take() {
            return mean + stddev * spare;
        }

        let (u, v, s) = loop {
            let u = rand_uniform() * 2.0 - 1.0;
            let v = rand_uniform() * 2.0 - 1.0;
            let s = u * u + v * v;
            if s < 1.0 && s != 0.0 {
                break (u, v, s);
            }
        };

        let scale = (-2.0 * s.ln() / s).sqrt();
        self.spare = Some(v * scale);
        mean + stddev * u * scale
    }
}

/// Build the initial sensor table from the static configuration.
pub fn init_sensors(now: u64) -> Vec<SensorReading> {
    DEFAULT_SENSORS
        .iter()
        .map(|cfg| SensorReading::from_config(cfg, now))
        .collect()
}

fn evaluate_status(kind: SensorKind, value: f64, min_valid: f64, max_warning: f64, max_critical: f64) -> SensorStatus {
    if kind == SensorKind::FanRpm {
        if value < min_valid || value > max_critical {
            return SensorStatus::Critical;
        }
        if value > max_warning {
            return SensorStatus::Warning;
        }
        return SensorStatus::Ok;
    }

    if value >= max_critical {
        return SensorStatus::Critical;
    }
    if value >= max_warning || value < min_valid {
        return SensorStatus::Warning;
    }
    SensorStatus::Ok
}

/// Advance the thermal/electrical model for every sensor by one tick.
///
/// Takes `&mut [SensorReading]` directly rather than acquiring any lock of its
/// own: the only way a caller can obtain that slice is by already holding the
/// state lock (the slice borrows out of `GlobalState`), so the precondition
/// that the caller already holds the lock is enforced by the borrow checker
/// rather than documented as a runtime convention.
pub fn poll_all(
    sensors: &mut [SensorReading],
    fan_duty_percent: f64,
    noise: &mut GaussianNoise,
    sel: &mut EventLog,
    now: u64,
    mut rand_uniform: impl FnMut() -> f64,
) {
    for (cfg, reading) in DEFAULT_SENSORS.iter().zip(sensors.iter_mut()) {
        let old_status = reading.status;

        match reading.kind {
            SensorKind::Temperature => {
                let cooling = (fan_duty_percent / 100.0) * sensor_consts::COOL_CAPACITY;
                let target = cfg.base_value + sensor_consts::HEAT_LOAD - cooling;
                reading.value += (target - reading.value) * sensor_consts::THERMAL_RESPONSE_RATE;
                reading.value += noise.sample(0.0, cfg.noise_stddev, &mut rand_uniform);
                reading.value = reading
                    .value
                    .clamp(sensor_consts::MIN_TEMP_CLAMP, sensor_consts::MAX_TEMP_CLAMP);
            }
            SensorKind::Voltage => {
                reading.value = cfg.base_value + noise.sample(0.0, cfg.noise_stddev, &mut rand_uniform);
                reading.value = reading.value.max(0.0);
            }
            SensorKind::FanRpm => {
                let max_rpm = cfg.base_value * 2.0;
                reading.value = (fan_duty_percent / 100.0) * max_rpm + noise.sample(0.0, cfg.noise_stddev, &mut rand_uniform);
                reading.value = reading.value.max(0.0);
            }
            SensorKind::Power => {}
        }

        reading.last_updated = now;
        reading.status = evaluate_status(
            reading.kind,
            reading.value,
            reading.min_valid,
            reading.max_warning,
            reading.max_critical,
        );

        if reading.status != old_status && reading.status != SensorStatus::Ok {
            let severity = match reading.status {
                SensorStatus::Critical => Severity::Critical,
                _ => Severity::Warning,
            };
            sel.add(
                severity,
                "Sensor",
                format!(
                    "{} transitioned to {} (value: {:.2})",
                    reading.name, reading.status, reading.value
                ),
                now,
            );
            debug!(sensor = %reading.name, status = %reading.status, value = reading.value, "sensor status transition");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn det_rand(seq: &[f64]) -> impl FnMut() -> f64 + '_ {
        let mut i = 0;
        move || {
            let v = seq[i % seq.len()];
            i += 1;
            v
        }
    }

    #[test]
    fn invariant_thresholds_are_ordered_for_every_default_sensor() {
        for cfg in DEFAULT_SENSORS {
            assert!(cfg.min_valid <= cfg.max_warning);
            assert!(cfg.max_warning <= cfg.max_critical);
        }
    }

    #[test]
    fn fan_status_is_critical_below_min_valid() {
        let status = evaluate_status(SensorKind::FanRpm, 100.0, 500.0, 6000.0, 7000.0);
        assert_eq!(status, SensorStatus::Critical);
    }

    #[test]
    fn temperature_status_warns_below_min_valid() {
        // For non-fan sensors a value below min_valid is a Warning, not
        // Critical or Ok.
        let status = evaluate_status(SensorKind::Temperature, 2.0, 10.0, 75.0, 90.0);
        assert_eq!(status, SensorStatus::Warning);
    }

    #[test]
    fn gaussian_noise_caches_a_spare_value() {
        let mut noise = GaussianNoise::new();
        let mut rand = det_rand(&[0.3, 0.4, 0.6, 0.1]);
        let a = noise.sample(0.0, 1.0, &mut rand);
        assert!(noise.spare.is_some());
        let b = noise.sample(0.0, 1.0, &mut rand);
        assert!(noise.spare.is_none());
        assert_ne!(a, 0.0);
        assert_ne!(b, 0.0);
    }

    #[test]
    fn poll_emits_sel_entry_on_transition_into_warning() {
        let mut sensors = init_sensors(0);
        // Force the CPU_Temp reading straight into Critical territory.
        sensors[0].value = 999.0;
        let mut noise = GaussianNoise::new();
        let mut sel = EventLog::new();
        poll_all(&mut sensors, 50.0, &mut noise, &mut sel, 1, || 0.5);
        assert_eq!(sensors[0].status, SensorStatus::Critical);
        assert_eq!(sel.len(), 1);
        assert!(sel.all()[0].message.contains("CPU_Temp"));
    }
}
