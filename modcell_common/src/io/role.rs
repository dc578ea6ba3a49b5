//! I/O role types.
//!
//! `IoRole` maps a string like `"PresenceSensor2"` to a typed enum variant
//! with rack number extraction. Devices resolve their lines by functional
//! role, never by pin name.

use core::fmt;
use core::str::FromStr;
use serde::{Deserialize, Serialize};

// ─── IoPointType ────────────────────────────────────────────────────

/// I/O point type discriminator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IoPointType {
    Di,
    Do,
    Ai,
    Ao,
}

impl fmt::Display for IoPointType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Di => write!(f, "di"),
            Self::Do => write!(f, "do"),
            Self::Ai => write!(f, "ai"),
            Self::Ao => write!(f, "ao"),
        }
    }
}

// ─── DiLogic ────────────────────────────────────────────────────────

/// Digital input logic interpretation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum DiLogic {
    /// Normally open: true when signal present.
    #[default]
    #[serde(rename = "NO")]
    NO,
    /// Normally closed: inverted, a wire break reads as active.
    #[serde(rename = "NC")]
    NC,
}

impl DiLogic {
    /// Translate a raw line level into the logical level.
    #[inline]
    pub const fn apply(self, raw: bool) -> bool {
        match self {
            Self::NO => raw,
            Self::NC => !raw,
        }
    }
}

// ─── IoRole ─────────────────────────────────────────────────────────

/// Functional I/O role.
///
/// Station-wide roles have no number. Per-rack roles carry a 1-based rack
/// number. Unknown strings become `Custom`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum IoRole {
    // ── Safety & indication ─────────
    SafetySwitch,
    StatusLedRed,
    StatusLedGreen,
    StatusLedBlue,
    StatusShutter,

    // ── Carriage ────────────────────
    CarriageFrontSensor,
    CarriageRackSensor,
    CarriageMotorCw,
    CarriageMotorCcw,

    // ── Press ───────────────────────
    PressUpperSensor,
    PressEndSwitch,
    PressForce,
    PressMotorCw,
    PressMotorCcw,
    Clamp,

    // ── Dice-half rack & dispatch ───
    RackTopSensor,
    RackBottomSensor,
    DispatchSensor,

    // ── Per plate rack ──────────────
    PresenceSensor(u8),
    InteractionSensor(u8),

    // ── Project-specific extension ──
    Custom(String),
}

impl IoRole {
    /// Return the rack number if this is a per-rack role, else `None`.
    pub fn rack(&self) -> Option<u8> {
        match self {
            Self::PresenceSensor(n) | Self::InteractionSensor(n) => Some(*n),
            _ => None,
        }
    }

    /// Expected I/O type for known roles.
    pub fn expected_io_type(&self) -> Option<IoPointType> {
        match self {
            Self::SafetySwitch
            | Self::CarriageFrontSensor
            | Self::CarriageRackSensor
            | Self::PressUpperSensor
            | Self::PressEndSwitch
            | Self::RackTopSensor
            | Self::RackBottomSensor
            | Self::DispatchSensor
            | Self::PresenceSensor(_)
            | Self::InteractionSensor(_) => Some(IoPointType::Di),

            Self::StatusLedRed
            | Self::StatusLedGreen
            | Self::StatusLedBlue
            | Self::StatusShutter
            | Self::CarriageMotorCw
            | Self::CarriageMotorCcw
            | Self::PressMotorCw
            | Self::PressMotorCcw
            | Self::Clamp => Some(IoPointType::Do),

            Self::PressForce => Some(IoPointType::Ai),

            Self::Custom(_) => None,
        }
    }
}

/// Split a role string into (prefix, optional rack number).
///
/// `"PresenceSensor1"` → `("PresenceSensor", Some(1))`
fn split_role_str(s: &str) -> (&str, Option<u8>) {
    let digit_start = s
        .char_indices()
        .rev()
        .take_while(|(_, c)| c.is_ascii_digit())
        .last()
        .map(|(i, _)| i);

    match digit_start {
        Some(i) if i > 0 => match s[i..].parse::<u8>() {
            Ok(n) => (&s[..i], Some(n)),
            Err(_) => (s, None),
        },
        _ => (s, None),
    }
}

impl FromStr for IoRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Err("empty role string".to_string());
        }
        let (prefix, rack) = split_role_str(s);

        if let Some(n) = rack {
            match prefix {
                "PresenceSensor" => return Ok(Self::PresenceSensor(n)),
                "InteractionSensor" => return Ok(Self::InteractionSensor(n)),
                _ => {}
            }
        }

        let role = match s {
            "SafetySwitch" => Self::SafetySwitch,
            "StatusLedRed" => Self::StatusLedRed,
            "StatusLedGreen" => Self::StatusLedGreen,
            "StatusLedBlue" => Self::StatusLedBlue,
            "StatusShutter" => Self::StatusShutter,
            "CarriageFrontSensor" => Self::CarriageFrontSensor,
            "CarriageRackSensor" => Self::CarriageRackSensor,
            "CarriageMotorCw" => Self::CarriageMotorCw,
            "CarriageMotorCcw" => Self::CarriageMotorCcw,
            "PressUpperSensor" => Self::PressUpperSensor,
            "PressEndSwitch" => Self::PressEndSwitch,
            "PressForce" => Self::PressForce,
            "PressMotorCw" => Self::PressMotorCw,
            "PressMotorCcw" => Self::PressMotorCcw,
            "Clamp" => Self::Clamp,
            "RackTopSensor" => Self::RackTopSensor,
            "RackBottomSensor" => Self::RackBottomSensor,
            "DispatchSensor" => Self::DispatchSensor,
            other => Self::Custom(other.to_string()),
        };
        Ok(role)
    }
}

impl fmt::Display for IoRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SafetySwitch => write!(f, "SafetySwitch"),
            Self::StatusLedRed => write!(f, "StatusLedRed"),
            Self::StatusLedGreen => write!(f, "StatusLedGreen"),
            Self::StatusLedBlue => write!(f, "StatusLedBlue"),
            Self::StatusShutter => write!(f, "StatusShutter"),
            Self::CarriageFrontSensor => write!(f, "CarriageFrontSensor"),
            Self::CarriageRackSensor => write!(f, "CarriageRackSensor"),
            Self::CarriageMotorCw => write!(f, "CarriageMotorCw"),
            Self::CarriageMotorCcw => write!(f, "CarriageMotorCcw"),
            Self::PressUpperSensor => write!(f, "PressUpperSensor"),
            Self::PressEndSwitch => write!(f, "PressEndSwitch"),
            Self::PressForce => write!(f, "PressForce"),
            Self::PressMotorCw => write!(f, "PressMotorCw"),
            Self::PressMotorCcw => write!(f, "PressMotorCcw"),
            Self::Clamp => write!(f, "Clamp"),
            Self::RackTopSensor => write!(f, "RackTopSensor"),
            Self::RackBottomSensor => write!(f, "RackBottomSensor"),
            Self::DispatchSensor => write!(f, "DispatchSensor"),
            Self::PresenceSensor(n) => write!(f, "PresenceSensor{n}"),
            Self::InteractionSensor(n) => write!(f, "InteractionSensor{n}"),
            Self::Custom(s) => write!(f, "{s}"),
        }
    }
}
