//! Station level: the supervisor, its status indication, the force control
//! loop and the assembly of a complete station from configuration.
//!
//! - [`supervisor`] - station state machine and service table
//! - [`led`] - status LED policy
//! - [`control_loop`] - analog sampling of the force sensor
//! - [`builder`] - wiring of devices, composites and services

use crate::runtime::message::Topic;

pub mod builder;
pub mod control_loop;
pub mod led;
pub mod supervisor;

pub use builder::{Cell, CellBuilder};
pub use supervisor::{Station, StationState, ServiceTable};

/// Topics of the station publisher, the surface seen by the supervisory
/// system.
pub const STATION_TOPICS: &[Topic] = &[
    Topic::StationState,
    Topic::StationStateMaintenance,
    Topic::StationSafetyState,
    Topic::Ack,
    Topic::StationErrorCode,
    Topic::StationErrorDescription,
    Topic::StationMessageCode,
    Topic::StationMessageDescription,
];

/// `StationSafetyState` while the safety switch is pressed.
pub const SAFETY_ACTIVATED: &str = "safetySwitchActivated";
/// `StationSafetyState` once the safety switch is released.
pub const SAFETY_NOT_ACTIVATED: &str = "safetySwitchNotActivated";
