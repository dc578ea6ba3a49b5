//! Shared fixtures: sample configurations, a started cell and polling.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use modcell_common::config::ConfigLoader;
use modcell_common::io::sim::SimulatedProcessImage;
use modcell_common::station::config::StationConfig;
use modcell_control::device::nfc::SimulatedTagReader;
use modcell_control::runtime::message::{ActorId, StationCommand, Topic};
use modcell_control::runtime::recorder::Recorder;
use modcell_control::station::{Cell, CellBuilder};
use tokio::time::{Instant, sleep};

/// Poll interval of [`wait_until`].
const POLL: Duration = Duration::from_millis(10);

pub fn sample_config(name: &str) -> StationConfig {
    let path = PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("../config")
        .join(name);
    StationConfig::load(&path).unwrap_or_else(|e| panic!("{}: {e}", path.display()))
}

pub fn assembly_config() -> StationConfig {
    sample_config("assembly.toml")
}

/// Storage station keeping its stock files in `dir`.
pub fn storage_config(dir: &Path) -> StationConfig {
    let mut config = sample_config("storage.toml");
    config.racks.storage_dir = dir.to_path_buf();
    config
}

/// A running station with everything it publishes recorded.
pub struct Rig {
    pub cell: Cell,
    pub image: Arc<SimulatedProcessImage>,
    pub tags: Arc<SimulatedTagReader>,
    pub rec: Recorder,
}

impl Rig {
    pub fn start(config: StationConfig) -> Self {
        let (builder, image) = CellBuilder::simulated(config).unwrap();
        let tags = SimulatedTagReader::new();
        let cell = builder.with_tag_reader(tags.clone()).start().unwrap();
        let rec = Recorder::new();
        cell.observe(rec.callback()).unwrap();
        Self {
            cell,
            image,
            tags,
            rec,
        }
    }

    /// Post a station input without parameters.
    pub fn send(&self, command: StationCommand) {
        self.cell.command(command, None).unwrap();
    }

    /// Internal station state, as published on `StationStateMaintenance`.
    pub fn station_state(&self) -> Option<String> {
        self.rec
            .texts(ActorId::Station, Topic::StationStateMaintenance)
            .pop()
    }

    /// Every internal station state so far, oldest first.
    pub fn station_history(&self) -> Vec<String> {
        self.rec.texts(ActorId::Station, Topic::StationStateMaintenance)
    }

    pub fn last_state(&self, sender: ActorId) -> Option<String> {
        self.rec.texts(sender, Topic::State).pop()
    }

    /// Error codes published on the station surface by `sender`.
    pub fn errors(&self, sender: ActorId) -> Vec<String> {
        self.rec.texts(sender, Topic::StationErrorCode)
    }

    pub async fn wait_for_station(&self, state: &str, limit: Duration) {
        wait_until(&format!("station {state}"), limit, || {
            self.station_state().as_deref() == Some(state)
        })
        .await;
    }

    /// Initialize and home the station, then wait for `Ready`.
    pub async fn bring_up(&self) {
        self.wait_for_station("NotInitialized", Duration::from_secs(1))
            .await;
        self.send(StationCommand::Initialize);
        self.wait_for_station("Ready", Duration::from_secs(30)).await;
    }

    pub async fn shutdown(self) {
        self.cell.shutdown().await;
    }
}

/// Advance virtual time until `check` holds, failing after `limit`.
pub async fn wait_until(what: &str, limit: Duration, mut check: impl FnMut() -> bool) {
    let deadline = Instant::now() + limit;
    while !check() {
        assert!(Instant::now() < deadline, "timed out waiting for {what}");
        sleep(POLL).await;
    }
}

/// Let the station run for `ms` of virtual time.
pub async fn settle(ms: u64) {
    sleep(Duration::from_millis(ms)).await;
}
