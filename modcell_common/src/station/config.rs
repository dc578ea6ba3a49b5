//! Station configuration file.
//!
//! ```toml
//! [shared]
//! service_name = "assembly-01"
//!
//! [station]
//! layout = "assembly"
//!
//! [timing]
//! carriage_move_ms = 5000
//!
//! [racks]
//! dicehalf_maximum = 12
//!
//! [force]
//! setpoint = 2000
//!
//! [[io.points]]
//! role = "SafetySwitch"
//! pin = "I0.0"
//! io_type = "di"
//! ```

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::{ConfigError, SharedConfig};
use crate::consts::{DEFAULT_INBOX_CAPACITY, MAX_PLATE_RACKS, MIN_INBOX_CAPACITY, STOCK_FILE_PREFIX};
use crate::io::config::IoConfig;

/// Which set of composites and services a station runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Layout {
    /// Carriage, press, clamp and dice-half rack.
    Assembly,
    /// Plate racks sorted by color.
    Storage,
}

/// Complete station file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StationConfig {
    pub shared: SharedConfig,
    pub station: StationSection,
    #[serde(default)]
    pub timing: TimingConfig,
    #[serde(default)]
    pub racks: RackConfig,
    #[serde(default)]
    pub force: ForceConfig,
    #[serde(default)]
    pub blink: BlinkConfig,
    #[serde(default)]
    pub io: IoConfig,
}

fn default_true() -> bool {
    true
}

fn default_inbox_capacity() -> usize {
    DEFAULT_INBOX_CAPACITY
}

/// `[station]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StationSection {
    pub layout: Layout,
    /// Run the homing service after initialization.
    #[serde(default = "default_true")]
    pub homing_required: bool,
    #[serde(default = "default_inbox_capacity")]
    pub inbox_capacity: usize,
}

/// `[timing]` section, all values in milliseconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TimingConfig {
    pub carriage_move_ms: u64,
    pub press_move_ms: u64,
    pub rack_full_check_ms: u64,
    pub clamp_wait_ms: u64,
    pub pressing_dwell_ms: u64,
    pub control_tick_ms: u64,
    pub init_service_ms: u64,
    pub homing_service_ms: u64,
    pub pressing_service_ms: u64,
    pub material_service_ms: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            carriage_move_ms: 5_000,
            press_move_ms: 4_000,
            rack_full_check_ms: 500,
            clamp_wait_ms: 300,
            pressing_dwell_ms: 1_000,
            control_tick_ms: 10,
            init_service_ms: 5_000,
            homing_service_ms: 20_000,
            pressing_service_ms: 30_000,
            material_service_ms: 120_000,
        }
    }
}

impl TimingConfig {
    pub fn carriage_move(&self) -> Duration {
        Duration::from_millis(self.carriage_move_ms)
    }

    pub fn press_move(&self) -> Duration {
        Duration::from_millis(self.press_move_ms)
    }

    pub fn rack_full_check(&self) -> Duration {
        Duration::from_millis(self.rack_full_check_ms)
    }

    pub fn clamp_wait(&self) -> Duration {
        Duration::from_millis(self.clamp_wait_ms)
    }

    pub fn pressing_dwell(&self) -> Duration {
        Duration::from_millis(self.pressing_dwell_ms)
    }

    pub fn control_tick(&self) -> Duration {
        Duration::from_millis(self.control_tick_ms)
    }

    pub fn init_service(&self) -> Duration {
        Duration::from_millis(self.init_service_ms)
    }

    pub fn homing_service(&self) -> Duration {
        Duration::from_millis(self.homing_service_ms)
    }

    pub fn pressing_service(&self) -> Duration {
        Duration::from_millis(self.pressing_service_ms)
    }

    pub fn material_service(&self) -> Duration {
        Duration::from_millis(self.material_service_ms)
    }

    fn entries(&self) -> [(&'static str, u64); 10] {
        [
            ("carriage_move_ms", self.carriage_move_ms),
            ("press_move_ms", self.press_move_ms),
            ("rack_full_check_ms", self.rack_full_check_ms),
            ("clamp_wait_ms", self.clamp_wait_ms),
            ("pressing_dwell_ms", self.pressing_dwell_ms),
            ("control_tick_ms", self.control_tick_ms),
            ("init_service_ms", self.init_service_ms),
            ("homing_service_ms", self.homing_service_ms),
            ("pressing_service_ms", self.pressing_service_ms),
            ("material_service_ms", self.material_service_ms),
        ]
    }
}

/// `[racks]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RackConfig {
    /// Capacity of the dice-half rack.
    pub dicehalf_maximum: u32,
    /// Capacity per color of every plate rack.
    pub plate_maximum: u32,
    /// Number of plate racks in a storage station.
    pub plate_racks: u8,
    /// Directory holding `StorageRackN.json`.
    pub storage_dir: PathBuf,
}

impl Default for RackConfig {
    fn default() -> Self {
        Self {
            dicehalf_maximum: 12,
            plate_maximum: 10,
            plate_racks: MAX_PLATE_RACKS,
            storage_dir: PathBuf::from("."),
        }
    }
}

impl RackConfig {
    /// Path of the persistent stock file of plate rack `index` (1-based).
    pub fn stock_path(&self, index: u8) -> PathBuf {
        self.storage_dir
            .join(format!("{STOCK_FILE_PREFIX}{index}.json"))
    }
}

/// `[force]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ForceConfig {
    /// Pressing force threshold in raw counts.
    pub setpoint: i64,
}

impl Default for ForceConfig {
    fn default() -> Self {
        Self { setpoint: 2_000 }
    }
}

/// `[blink]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BlinkConfig {
    pub on_ms: u64,
    pub off_ms: u64,
}

impl Default for BlinkConfig {
    fn default() -> Self {
        Self {
            on_ms: 500,
            off_ms: 500,
        }
    }
}

impl StationConfig {
    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ValidationError` if:
    /// - `service_name` is empty
    /// - any timing is zero
    /// - `inbox_capacity` is below the minimum
    /// - rack capacities are zero or the plate rack count is out of range
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.shared.validate()?;

        if let Some((name, _)) = self.timing.entries().iter().find(|(_, ms)| *ms == 0) {
            return Err(ConfigError::ValidationError(format!(
                "timing.{name} must be greater than zero"
            )));
        }
        if self.station.inbox_capacity < MIN_INBOX_CAPACITY {
            return Err(ConfigError::ValidationError(format!(
                "station.inbox_capacity must be at least {MIN_INBOX_CAPACITY}"
            )));
        }
        if self.racks.dicehalf_maximum == 0 || self.racks.plate_maximum == 0 {
            return Err(ConfigError::ValidationError(
                "rack capacities must be greater than zero".to_string(),
            ));
        }
        if !(1..=MAX_PLATE_RACKS).contains(&self.racks.plate_racks) {
            return Err(ConfigError::ValidationError(format!(
                "racks.plate_racks must be within 1..={MAX_PLATE_RACKS}"
            )));
        }
        if self.blink.on_ms == 0 || self.blink.off_ms == 0 {
            return Err(ConfigError::ValidationError(
                "blink periods must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}
