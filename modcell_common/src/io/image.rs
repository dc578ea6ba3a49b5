//! Process-image contract between the control core and the I/O driver.
//!
//! The core consumes digital input edges, digital output set/clear, analog
//! input reads and analog output writes, all addressed by line name. Edge
//! callbacks are registered once while the station is assembled.

use std::fmt;
use std::sync::Arc;

use thiserror::Error;

use super::role::IoPointType;

/// Transition of a digital input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Edge {
    Rising,
    Falling,
}

impl Edge {
    /// Edge produced by a level change, `None` if the level did not change.
    pub const fn between(previous: bool, next: bool) -> Option<Self> {
        match (previous, next) {
            (false, true) => Some(Self::Rising),
            (true, false) => Some(Self::Falling),
            _ => None,
        }
    }

    /// Level of the line after this edge.
    pub const fn level(self) -> bool {
        matches!(self, Self::Rising)
    }

    /// The same edge seen through inverted logic.
    pub const fn inverted(self) -> Self {
        match self {
            Self::Rising => Self::Falling,
            Self::Falling => Self::Rising,
        }
    }
}

/// Callback invoked on every edge of a digital input.
pub type EdgeCallback = Arc<dyn Fn(Edge) + Send + Sync>;

/// Error reported by the process image.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IoError {
    #[error("unknown I/O point '{0}'")]
    UnknownPoint(String),

    #[error("I/O point '{point}' is not of type {expected}")]
    WrongType {
        point: String,
        expected: IoPointType,
    },

    #[error("I/O driver fault: {0}")]
    Driver(String),
}

/// Access to the station's process image.
///
/// Implementations must be usable from every actor task at once.
pub trait ProcessImage: Send + Sync {
    /// Current raw level of a digital input.
    fn read_input(&self, point: &str) -> Result<bool, IoError>;

    /// Current raw level of a digital output.
    fn read_output(&self, point: &str) -> Result<bool, IoError>;

    /// Apply a batch of digital output levels, in order, as one atomic update.
    fn write_outputs(&self, levels: &[(&str, bool)]) -> Result<(), IoError>;

    /// Set a single digital output.
    fn write_output(&self, point: &str, level: bool) -> Result<(), IoError> {
        self.write_outputs(&[(point, level)])
    }

    /// Raw counts of an analog input.
    fn read_analog(&self, point: &str) -> Result<i64, IoError>;

    /// Set an analog output in raw counts.
    fn write_analog(&self, point: &str, value: i64) -> Result<(), IoError>;

    /// Register a callback for every edge of a digital input.
    fn on_edge(&self, point: &str, callback: EdgeCallback) -> Result<(), IoError>;
}

// ─── Direction outputs ──────────────────────────────────────────────

/// Commanded direction of a DC motor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    Off,
    Cw,
    Ccw,
}

/// The two mutually exclusive direction outputs of one motor.
///
/// Every write goes through a single atomic batch that de-asserts the
/// opposite line before asserting the requested one, so both lines are
/// never high together. The motor actor and the force sensor's emergency
/// cut share clones of the same pair.
#[derive(Clone)]
pub struct DirectionPair {
    image: Arc<dyn ProcessImage>,
    cw: String,
    ccw: String,
}

impl DirectionPair {
    pub fn new(image: Arc<dyn ProcessImage>, cw: impl Into<String>, ccw: impl Into<String>) -> Self {
        Self {
            image,
            cw: cw.into(),
            ccw: ccw.into(),
        }
    }

    /// Drive the pair to `direction`.
    pub fn drive(&self, direction: Direction) -> Result<(), IoError> {
        let (cw, ccw) = (self.cw.as_str(), self.ccw.as_str());
        match direction {
            Direction::Off => self.image.write_outputs(&[(cw, false), (ccw, false)]),
            Direction::Cw => self.image.write_outputs(&[(ccw, false), (cw, true)]),
            Direction::Ccw => self.image.write_outputs(&[(cw, false), (ccw, true)]),
        }
    }

    /// Direction currently asserted on the lines.
    pub fn current(&self) -> Result<Direction, IoError> {
        let cw = self.image.read_output(&self.cw)?;
        let ccw = self.image.read_output(&self.ccw)?;
        Ok(match (cw, ccw) {
            (true, false) => Direction::Cw,
            (false, true) => Direction::Ccw,
            (false, false) => Direction::Off,
            (true, true) => {
                return Err(IoError::Driver(format!(
                    "direction outputs {} and {} asserted together",
                    self.cw, self.ccw
                )));
            }
        })
    }
}

impl fmt::Debug for DirectionPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DirectionPair")
            .field("cw", &self.cw)
            .field("ccw", &self.ccw)
            .finish()
    }
}
