//! Status LED policy.

use super::supervisor::StationState;
use crate::device::led::LedColor;

/// What the status LED shows in one station state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Indication {
    pub color: LedColor,
    pub blinking: bool,
}

impl Indication {
    const fn steady(color: LedColor) -> Self {
        Self {
            color,
            blinking: false,
        }
    }

    const fn blinking(color: LedColor) -> Self {
        Self {
            color,
            blinking: true,
        }
    }
}

/// Indication for `state`. Standby is purple, blinking while the station
/// works its way there; faults are red, blinking while they persist.
pub const fn indication(state: StationState) -> Indication {
    match state {
        StationState::Starting | StationState::Initialization | StationState::Homing => {
            Indication::blinking(LedColor::Purple)
        }
        StationState::NotInitialized => Indication::steady(LedColor::Purple),
        StationState::Ready => Indication::steady(LedColor::Green),
        StationState::Running => Indication::steady(LedColor::Yellow),
        StationState::Error => Indication::steady(LedColor::Red),
        StationState::Estop | StationState::NoConnection => Indication::blinking(LedColor::Red),
    }
}
