//! Constants and configuration values for the BMC firmware simulator
//!
//! Centralizes all magic numbers, paths, and configuration defaults.
//! This is the single source of truth for all configuration values.
//! Never use magic numbers in other files - add them here first.

/// Filesystem paths for the simulator's external interfaces.
pub mod paths {
    /// Atomically-written state snapshot, read by downstream consumers.
    pub const STATE_FILE: &str = "/tmp/bmc_state.json";

    /// Best-effort event log snapshot.
    pub const SEL_FILE: &str = "/tmp/bmc_sel.json";

    /// Unix stream socket the IPMI listener binds.
    pub const IPMI_SOCKET: &str = "/tmp/bmc_ipmi.sock";

    /// Scratch directory holding the deterministic firmware blobs.
    pub const FW_IMAGE_DIR: &str = "/tmp/bmc_fw_images";
}

/// Sensor engine constants.
pub mod sensor {
    /// Maximum number of sensors `GlobalState` can hold.
    pub const MAX_SENSORS: usize = 8;

    /// Simulated constant workload heat contribution (°C).
    pub const HEAT_LOAD: f64 = 15.0;

    /// Maximum cooling effect at 100% fan duty (°C).
    pub const COOL_CAPACITY: f64 = 25.0;

    /// First-order thermal response rate per tick (time constant ≈ 10 ticks).
    pub const THERMAL_RESPONSE_RATE: f64 = 0.1;

    /// Temperature sensors never report below this (°C), regardless of model output.
    pub const MIN_TEMP_CLAMP: f64 = 5.0;

    /// Temperature sensors never report above this (°C), regardless of model output.
    pub const MAX_TEMP_CLAMP: f64 = 105.0;
}

/// Static sensor configuration table: {name, kind, base_value, noise_stddev,
/// min_valid, max_warning, max_critical}. Order is preserved in `GlobalState.sensors`
/// and is part of the IPMI `Get Sensor Reading` index contract.
pub struct SensorConfig {
    pub name: &'static str,
    pub kind: crate::sensors::SensorKind,
    pub base_value: f64,
    pub noise_stddev: f64,
    pub min_valid: f64,
    pub max_warning: f64,
    pub max_critical: f64,
}

pub const DEFAULT_SENSORS: &[SensorConfig] = &[
    SensorConfig {
        name: "CPU_Temp",
        kind: crate::sensors::SensorKind::Temperature,
        base_value: 55.0,
        noise_stddev: 1.5,
        min_valid: 10.0,
        max_warning: 75.0,
        max_critical: 90.0,
    },
    SensorConfig {
        name: "Inlet_Temp",
        kind: crate::sensors::SensorKind::Temperature,
        base_value: 28.0,
        noise_stddev: 0.8,
        min_valid: 5.0,
        max_warning: 38.0,
        max_critical: 45.0,
    },
    SensorConfig {
        name: "PCH_Temp",
        kind: crate::sensors::SensorKind::Temperature,
        base_value: 48.0,
        noise_stddev: 1.0,
        min_valid: 10.0,
        max_warning: 70.0,
        max_critical: 85.0,
    },
    SensorConfig {
        name: "VCore",
        kind: crate::sensors::SensorKind::Voltage,
        base_value: 1.05,
        noise_stddev: 0.02,
        min_valid: 0.90,
        max_warning: 1.15,
        max_critical: 1.25,
    },
    SensorConfig {
        name: "V3.3_Stdby",
        kind: crate::sensors::SensorKind::Voltage,
        base_value: 3.30,
        noise_stddev: 0.03,
        min_valid: 3.10,
        max_warning: 3.50,
        max_critical: 3.60,
    },
    SensorConfig {
        name: "V12_Main",
        kind: crate::sensors::SensorKind::Voltage,
        base_value: 12.00,
        noise_stddev: 0.08,
        min_valid: 11.40,
        max_warning: 12.60,
        max_critical: 13.00,
    },
    SensorConfig {
        name: "CPU_Fan",
        kind: crate::sensors::SensorKind::FanRpm,
        base_value: 3000.0,
        noise_stddev: 50.0,
        min_valid: 500.0,
        max_warning: 6000.0,
        max_critical: 7000.0,
    },
    SensorConfig {
        name: "SYS_Fan",
        kind: crate::sensors::SensorKind::FanRpm,
        base_value: 2500.0,
        noise_stddev: 40.0,
        min_valid: 400.0,
        max_warning: 5000.0,
        max_critical: 6000.0,
    },
];

/// PID controller defaults.
pub mod pid {
    /// Proportional gain.
    pub const DEFAULT_KP: f64 = 3.0;
    /// Integral gain.
    pub const DEFAULT_KI: f64 = 0.1;
    /// Derivative gain.
    pub const DEFAULT_KD: f64 = 1.5;
    /// Target CPU temperature (°C).
    pub const DEFAULT_SETPOINT: f64 = 65.0;
    /// Lower fan duty bound (%), a safety floor.
    pub const DEFAULT_OUTPUT_MIN: f64 = 10.0;
    /// Upper fan duty bound (%).
    pub const DEFAULT_OUTPUT_MAX: f64 = 100.0;
    /// Base duty cycle added to the PID terms so zero error sits mid-range.
    pub const BASE_OFFSET: f64 = 40.0;
    /// Output value before the first `compute()` call.
    pub const INITIAL_OUTPUT: f64 = 30.0;
    /// Default supervisor poll interval, in seconds (used as PID `dt`).
    pub const DEFAULT_POLL_INTERVAL_SECS: f64 = 2.0;
}

/// Event log (SEL) constants.
pub mod sel {
    /// Fixed ring capacity.
    pub const MAX_ENTRIES: usize = 256;
    /// Maximum `source` length before truncation.
    pub const MAX_SOURCE_LEN: usize = 31;
    /// Maximum `message` length before truncation.
    pub const MAX_MESSAGE_LEN: usize = 255;
}

/// Secure boot / firmware chain-of-trust constants.
pub mod secure_boot {
    /// Size, in bytes, of each simulated firmware image.
    pub const FW_IMAGE_SIZE: usize = 4096;

    /// Firmware image names, in chain-of-trust order. The PRNG seed for image
    /// `i` is `FW_SEED_BASE + i`.
    pub const FW_IMAGE_NAMES: &[&str] = &["bootloader", "bmc_firmware", "application", "config_data"];

    /// Base seed added to an image's index to derive its deterministic content.
    pub const FW_SEED_BASE: u64 = 42;
}
