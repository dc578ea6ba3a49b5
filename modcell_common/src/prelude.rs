//! Prelude module for common re-exports.
//!
//! ```rust
//! use modcell_common::prelude::*;
//! ```

// ─── Logging ────────────────────────────────────────────────────────
pub use crate::config::LogLevel;

// ─── Configuration ──────────────────────────────────────────────────
pub use crate::config::{ConfigError, ConfigLoader, SharedConfig};
pub use crate::station::config::{Layout, StationConfig};

// ─── System Constants ───────────────────────────────────────────────
pub use crate::consts::{DEFAULT_INBOX_CAPACITY, MAX_PLATE_RACKS};

// ─── I/O ────────────────────────────────────────────────────────────
pub use crate::io::image::{Direction, DirectionPair, Edge, IoError, ProcessImage};
pub use crate::io::registry::IoRegistry;
pub use crate::io::role::IoRole;
pub use crate::io::sim::SimulatedProcessImage;

// ─── Codes ──────────────────────────────────────────────────────────
pub use crate::station::codes::{ErrorCode, MessageCode};
