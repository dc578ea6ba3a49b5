//! Persistent stock of a plate rack.
//!
//! One JSON object per rack with six keys:
//!
//! ```json
//! {
//!   "PlateColor1": "Red",   "PlateColor1Quantity": 8,
//!   "PlateColor2": "Green", "PlateColor2Quantity": 7,
//!   "PlateColor3": "Blue",  "PlateColor3Quantity": 6
//! }
//! ```

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use modcell_common::consts::PLATE_COLORS_PER_RACK;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum StockError {
    #[error("stock file {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("stock file {} is malformed: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// One color slot of a rack.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PlateSlot {
    pub color: String,
    pub quantity: u32,
}

/// Colors and quantities held by one rack.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RackStock {
    pub slots: [PlateSlot; PLATE_COLORS_PER_RACK],
}

impl RackStock {
    pub fn new(slots: [(&str, u32); PLATE_COLORS_PER_RACK]) -> Self {
        Self {
            slots: slots.map(|(color, quantity)| PlateSlot {
                color: color.to_string(),
                quantity,
            }),
        }
    }

    /// Slot index holding `color`. Empty color names never match.
    pub fn find(&self, color: &str) -> Option<usize> {
        if color.is_empty() {
            return None;
        }
        self.slots.iter().position(|s| s.color == color)
    }

    pub fn total(&self) -> u32 {
        self.slots.iter().map(|s| s.quantity).sum()
    }
}

#[derive(Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct StockFile {
    #[serde(rename = "PlateColor1")]
    color1: String,
    #[serde(rename = "PlateColor1Quantity")]
    quantity1: u32,
    #[serde(rename = "PlateColor2")]
    color2: String,
    #[serde(rename = "PlateColor2Quantity")]
    quantity2: u32,
    #[serde(rename = "PlateColor3")]
    color3: String,
    #[serde(rename = "PlateColor3Quantity")]
    quantity3: u32,
}

impl From<&RackStock> for StockFile {
    fn from(stock: &RackStock) -> Self {
        let [a, b, c] = &stock.slots;
        Self {
            color1: a.color.clone(),
            quantity1: a.quantity,
            color2: b.color.clone(),
            quantity2: b.quantity,
            color3: c.color.clone(),
            quantity3: c.quantity,
        }
    }
}

impl From<StockFile> for RackStock {
    fn from(file: StockFile) -> Self {
        Self {
            slots: [
                PlateSlot {
                    color: file.color1,
                    quantity: file.quantity1,
                },
                PlateSlot {
                    color: file.color2,
                    quantity: file.quantity2,
                },
                PlateSlot {
                    color: file.color3,
                    quantity: file.quantity3,
                },
            ],
        }
    }
}

/// JSON file backing one rack.
#[derive(Debug, Clone)]
pub struct StockStore {
    path: PathBuf,
}

impl StockStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the stock, `None` if the file does not exist.
    pub fn load(&self) -> Result<Option<RackStock>, StockError> {
        let text = match fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(source) => return Err(self.io_error(source)),
        };
        let file: StockFile = serde_json::from_str(&text).map_err(|source| StockError::Parse {
            path: self.path.clone(),
            source,
        })?;
        Ok(Some(file.into()))
    }

    /// Read the stock, writing an empty one if the file does not exist.
    pub fn load_or_create(&self) -> Result<RackStock, StockError> {
        match self.load()? {
            Some(stock) => Ok(stock),
            None => {
                info!("Creating empty stock file {}", self.path.display());
                let stock = RackStock::default();
                self.save(&stock)?;
                Ok(stock)
            }
        }
    }

    /// Replace the file contents through a temporary sibling.
    pub fn save(&self, stock: &RackStock) -> Result<(), StockError> {
        let json = serde_json::to_string_pretty(&StockFile::from(stock)).map_err(|source| {
            StockError::Parse {
                path: self.path.clone(),
                source,
            }
        })?;
        let temp = self.temp_path();
        fs::write(&temp, json).map_err(|e| self.io_error(e))?;
        fs::rename(&temp, &self.path).map_err(|e| self.io_error(e))?;
        debug!("Stock written to {}", self.path.display());
        Ok(())
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }

    fn io_error(&self, source: io::Error) -> StockError {
        StockError::Io {
            path: self.path.clone(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn store(dir: &TempDir) -> StockStore {
        StockStore::new(dir.path().join("StorageRack1.json"))
    }

    #[test]
    fn missing_file_creates_empty_stock() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        assert!(store.load().unwrap().is_none());
        let stock = store.load_or_create().unwrap();
        assert_eq!(stock, RackStock::default());
        assert!(store.path().exists());
    }

    #[test]
    fn saved_file_uses_the_six_keys() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        store
            .save(&RackStock::new([("Red", 8), ("Green", 7), ("Blue", 6)]))
            .unwrap();
        let raw: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(store.path()).unwrap()).unwrap();
        let object = raw.as_object().unwrap();
        assert_eq!(object.len(), 6);
        assert_eq!(object["PlateColor2"], "Green");
        assert_eq!(object["PlateColor3Quantity"], 6);
        assert!(!dir.path().join("StorageRack1.json.tmp").exists());
    }

    #[test]
    fn malformed_file_is_a_parse_error() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        fs::write(store.path(), "{\"PlateColor1\": 3}").unwrap();
        let err = store.load().unwrap_err();
        assert!(matches!(err, StockError::Parse { .. }));
        assert!(err.to_string().contains("StorageRack1.json"));
    }

    #[test]
    fn find_ignores_empty_colors() {
        let stock = RackStock::new([("Red", 1), ("", 0), ("Blue", 2)]);
        assert_eq!(stock.find("Blue"), Some(2));
        assert_eq!(stock.find(""), None);
        assert_eq!(stock.find("Green"), None);
        assert_eq!(stock.total(), 3);
    }
}
