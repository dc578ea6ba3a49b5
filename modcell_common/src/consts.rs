//! System-wide constants for the modcell workspace.
//!
//! Single source of truth for numeric limits and defaults.

use static_assertions::const_assert;

/// Default bounded inbox depth of every active object.
pub const DEFAULT_INBOX_CAPACITY: usize = 64;

/// Smallest inbox depth accepted by configuration validation.
pub const MIN_INBOX_CAPACITY: usize = 8;

/// Number of service slots a station exposes (slot 0 is initialization).
pub const SERVICE_SLOTS: usize = 7;

/// Slots 1..=JOB_SLOTS carry the jobs of a layout and must be bound.
/// Higher slots are optional.
pub const JOB_SLOTS: u8 = 3;

/// Highest plate rack index a storage station can host.
pub const MAX_PLATE_RACKS: u8 = 3;

/// Color/quantity pairs held by one plate rack.
pub const PLATE_COLORS_PER_RACK: usize = 3;

/// Default configuration file path.
pub const DEFAULT_CONFIG_PATH: &str = "/etc/modcell/station.toml";

/// File name prefix of the persistent per-rack stock.
pub const STOCK_FILE_PREFIX: &str = "StorageRack";

const_assert!(DEFAULT_INBOX_CAPACITY >= MIN_INBOX_CAPACITY);
const_assert!(SERVICE_SLOTS == 7);
const_assert!((JOB_SLOTS as usize) < SERVICE_SLOTS);
