//! BMC Core Simulation Library
//!
//! The domain logic behind the mini-bmc firmware simulator: sensor modeling,
//! PID fan control, the system event log, firmware chain-of-trust, and
//! snapshot persistence. Deliberately has no async runtime dependency; the
//! daemon binary owns the shared-state lock and the tokio runtime.
//!
//! # Module Structure
//!
//! - `constants` - single source of truth for tuning values, paths, and tables
//! - `sensors` - sensor simulation and status classification
//! - `pid` - the fan-speed PID controller
//! - `sel` - the bounded system event log
//! - `secure_boot` - firmware chain-of-trust verification
//! - `persistence` - atomic JSON snapshot save/load
//! - `state` - the aggregate `GlobalState` record

pub mod constants;
pub mod persistence;
pub mod pid;
pub mod secure_boot;
pub mod sel;
pub mod sensors;
pub mod state;

pub use pid::PidState;
pub use sel::{EventLog, SelEntry, SelSnapshot, Severity};
pub use secure_boot::FwImage;
pub use sensors::{GaussianNoise, SensorKind, SensorReading, SensorStatus};
pub use state::{FanControlMode, GlobalState, StateSnapshot};

pub use bmc_error::{BmcError, Result};
