//! Device actors.
//!
//! Each device wraps one or a few process-image lines and publishes its
//! state on its own publisher. Devices start in `NotInitialized` and ignore
//! commands until an `Initialize` event arrives. A failed output write puts
//! the device in `Error`; a new `Initialize` recovers it.

use crate::runtime::hsm::StateId;
use crate::runtime::message::Topic;

pub mod blinker;
pub mod clamp;
pub mod force;
pub mod led;
pub mod motor;
pub mod nfc;
pub mod sensor;

/// Topics every device publisher offers.
pub const DEVICE_TOPICS: &[Topic] = &[Topic::State, Topic::Value, Topic::Detail];

/// Lifecycle shared by devices without operating substates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceState {
    NotInitialized,
    Initialized,
    Error,
}

impl StateId for DeviceState {
    fn all() -> &'static [Self] {
        &[Self::NotInitialized, Self::Initialized, Self::Error]
    }

    fn parent(self) -> Option<Self> {
        None
    }

    fn name(self) -> &'static str {
        match self {
            Self::NotInitialized => "NotInitialized",
            Self::Initialized => "Initialized",
            Self::Error => "Error",
        }
    }
}
