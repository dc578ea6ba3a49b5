//! Composite actors.
//!
//! A composite owns a few device actors, initializes them, aggregates
//! their readings into a position or fill state, and publishes that state.
//! Composites react to the station's `StationState=Error`, to its `Ack`
//! and to the safety switch.

use crate::runtime::message::{ActorId, DeviceId, Topic, TopicMessage};

pub mod carriage;
pub mod dicehalf_rack;
pub mod plate_rack;
pub mod press;
pub mod stock;

/// Topics of carriage and press publishers.
pub const COMPOSITE_TOPICS: &[Topic] = &[Topic::State, Topic::Detail];

/// Station-wide signal relevant to every composite.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum StationSignal {
    /// The station published `StationState=Error`.
    Error,
    /// The station published `Ack`.
    Acknowledge,
    /// The safety switch is activated.
    Estop,
}

pub(crate) fn station_signal(message: &TopicMessage) -> Option<StationSignal> {
    match (message.sender, message.topic) {
        (ActorId::Station, Topic::StationState) if message.value.as_str() == Some("Error") => {
            Some(StationSignal::Error)
        }
        (ActorId::Station, Topic::Ack) if message.value.as_bool() == Some(true) => {
            Some(StationSignal::Acknowledge)
        }
        (ActorId::Device(DeviceId::SafetySwitch), Topic::Value) if message.level() == Some(true) => {
            Some(StationSignal::Estop)
        }
        _ => None,
    }
}

/// Lifecycle report of an owned device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum DeviceReport {
    Initialized,
    Fault,
}

pub(crate) fn device_report(message: &TopicMessage) -> Option<DeviceReport> {
    if message.reports_initialized() {
        Some(DeviceReport::Initialized)
    } else if message.reports_error().is_some() {
        Some(DeviceReport::Fault)
    } else {
        None
    }
}
