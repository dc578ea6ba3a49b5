//! I/O configuration structs.
//!
//! Deserialized from the `[io]` section of the station file. Points bind a
//! functional role to a named line; reactions describe how the simulated
//! process image answers output changes.

use serde::{Deserialize, Serialize};

use super::role::{DiLogic, IoPointType};

fn default_true() -> bool {
    true
}

/// Complete I/O description of one station.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct IoConfig {
    /// Every wired I/O point.
    #[serde(default)]
    pub points: Vec<IoPoint>,

    /// Linked reactions used by the simulated process image.
    #[serde(default)]
    pub reactions: Vec<LinkedReaction>,
}

/// One wired I/O point.
///
/// ```toml
/// [[io.points]]
/// role = "CarriageFrontSensor"
/// pin = "I1.0"
/// io_type = "di"
/// logic = "NC"
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct IoPoint {
    /// Functional role string, parsed into [`super::role::IoRole`].
    pub role: String,
    /// Line name on the process image.
    pub pin: String,
    pub io_type: IoPointType,
    /// Input logic; only meaningful for `di` points.
    #[serde(default)]
    pub logic: Option<DiLogic>,
    /// Initial raw value (0/1 for digital points, counts for analog).
    #[serde(default)]
    pub initial: Option<i64>,
}

/// An output change that drives an input after a delay.
///
/// Exactly one of `set` (digital target) or `analog` (analog target) must
/// be given.
///
/// ```toml
/// [[io.reactions]]
/// trigger = "CarriageMotorCw"
/// target = "CarriageFrontSensor"
/// set = true
/// delay_ms = 800
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LinkedReaction {
    /// Output role whose change arms the reaction.
    pub trigger: String,
    /// Output level that arms the reaction.
    #[serde(default = "default_true")]
    pub level: bool,
    /// Input role that changes.
    pub target: String,
    /// New raw digital level of the target.
    #[serde(default)]
    pub set: Option<bool>,
    /// New analog value of the target.
    #[serde(default)]
    pub analog: Option<i64>,
    pub delay_ms: u64,
    /// Apply only if the trigger output still holds `level` when the delay expires.
    #[serde(default = "default_true")]
    pub hold: bool,
}
