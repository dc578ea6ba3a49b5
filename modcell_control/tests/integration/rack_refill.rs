//! Integration test: plate rack jobs on a storage station.
//!
//! Reset, refill and withdrawal run through the station's service slots,
//! wait for the operator at the rack and end up in the rack's stock file.

use std::path::Path;
use std::time::Duration;

use modcell_control::runtime::message::{
    ActorId, Parameters, ServiceKind, StationCommand, Topic, Value,
};
use serde_json::json;

use super::common::{Rig, settle, storage_config};

const PRESENCE_1: &str = "I1.0";
const INTERACTION_1: &str = "I1.1";

fn params(tokens: &str) -> Option<Parameters> {
    Some(tokens.split_whitespace().map(Value::parse).collect())
}

fn stock_file(dir: &Path, rack: u8) -> serde_json::Value {
    let text = std::fs::read_to_string(dir.join(format!("StorageRack{rack}.json"))).unwrap();
    serde_json::from_str(&text).unwrap()
}

/// Post a service command with parameters and let the station take it.
async fn job(rig: &Rig, command: StationCommand, tokens: &str) {
    rig.cell.command(command, params(tokens)).unwrap();
    settle(50).await;
}

#[tokio::test(start_paused = true)]
async fn reset_refill_and_withdraw() {
    let dir = tempfile::tempdir().unwrap();
    let rig = Rig::start(storage_config(dir.path()));
    rig.bring_up().await;
    assert_eq!(
        rig.station_history(),
        ["Starting", "NotInitialized", "Initialization", "Ready"]
    );
    for n in 1..=3 {
        assert!(dir.path().join(format!("StorageRack{n}.json")).exists());
    }

    job(&rig, StationCommand::ResetMaterial, "1 Red 3 Green 2 Blue 0").await;
    rig.wait_for_station("Ready", Duration::from_secs(1)).await;
    assert!(rig.rec.contains(ActorId::PlateRack(1), Topic::State, "MaterialResetDone"));

    // Refill waits for the operator at the rack.
    job(&rig, StationCommand::RefillMaterial, "1 Red 2 Green 0 Blue 5").await;
    assert_eq!(rig.station_state().as_deref(), Some("Running"));
    assert_eq!(rig.last_state(ActorId::PlateRack(1)).as_deref(), Some("RefillMaterial"));
    rig.image.set_input(INTERACTION_1, true).unwrap();
    rig.wait_for_station("Ready", Duration::from_secs(1)).await;
    rig.image.set_input(INTERACTION_1, false).unwrap();

    job(&rig, StationCommand::ProvideMaterial, "1 Green").await;
    assert_eq!(rig.last_state(ActorId::PlateRack(1)).as_deref(), Some("ProvideMaterial"));
    rig.image.set_input(PRESENCE_1, true).unwrap();
    rig.wait_for_station("Ready", Duration::from_secs(1)).await;

    assert_eq!(
        stock_file(dir.path(), 1),
        json!({
            "PlateColor1": "Red", "PlateColor1Quantity": 5,
            "PlateColor2": "Green", "PlateColor2Quantity": 1,
            "PlateColor3": "Blue", "PlateColor3Quantity": 5,
        })
    );
    assert_eq!(
        rig.rec.last(ActorId::PlateRack(1), Topic::QuantityOfPlateColor(2)),
        Some(Value::Int(1))
    );
    assert_eq!(
        rig.rec.texts(ActorId::PlateRack(1), Topic::StationMessageCode),
        ["0x1004", "0x1003", "0x1002"]
    );
    assert_eq!(
        rig.station_history().iter().filter(|s| *s == "Running").count(),
        3
    );

    rig.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn stock_survives_a_restart() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
        dir.path().join("StorageRack2.json"),
        r#"{"PlateColor1":"Yellow","PlateColor1Quantity":4,
            "PlateColor2":"","PlateColor2Quantity":0,
            "PlateColor3":"Black","PlateColor3Quantity":9}"#,
    )
    .unwrap();

    let rig = Rig::start(storage_config(dir.path()));
    rig.bring_up().await;

    let rack = ActorId::PlateRack(2);
    assert_eq!(rig.rec.last(rack, Topic::PlateColor(1)), Some(Value::from("Yellow")));
    assert_eq!(rig.rec.last(rack, Topic::QuantityOfPlateColor(1)), Some(Value::Int(4)));
    assert_eq!(rig.rec.last(rack, Topic::QuantityOfPlateColor(3)), Some(Value::Int(9)));
    assert_eq!(
        rig.rec.last(ActorId::PlateRack(1), Topic::QuantityOfPlateColor(1)),
        Some(Value::Int(0))
    );

    rig.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn refill_beyond_capacity_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let rig = Rig::start(storage_config(dir.path()));
    rig.bring_up().await;

    job(&rig, StationCommand::RefillMaterial, "1 Red 11 Green 0 Blue 0").await;
    rig.wait_for_station("Error", Duration::from_secs(1)).await;
    assert_eq!(rig.errors(ActorId::PlateRack(1)), ["0x0303"]);
    assert_eq!(rig.last_state(ActorId::PlateRack(1)).as_deref(), Some("Error"));

    // The rack error does not require initialization.
    rig.send(StationCommand::Ack);
    rig.wait_for_station("Ready", Duration::from_secs(1)).await;
    settle(50).await;
    assert_eq!(rig.last_state(ActorId::PlateRack(1)).as_deref(), Some("Initialized"));
    assert_eq!(
        stock_file(dir.path(), 1)["PlateColor1Quantity"],
        json!(0)
    );

    rig.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn invalid_jobs_fail_the_service() {
    let dir = tempfile::tempdir().unwrap();
    let rig = Rig::start(storage_config(dir.path()));
    rig.bring_up().await;

    // No rack 5 on this station.
    job(&rig, StationCommand::ProvideMaterial, "5 Red").await;
    rig.wait_for_station("Error", Duration::from_secs(1)).await;
    assert_eq!(
        rig.errors(ActorId::Service(ServiceKind::ProvideMaterial)),
        ["0x0014"]
    );
    rig.send(StationCommand::Ack);
    rig.wait_for_station("Ready", Duration::from_secs(1)).await;

    // Unknown color in rack 2.
    job(&rig, StationCommand::ProvideMaterial, "2 Purple").await;
    rig.wait_for_station("Error", Duration::from_secs(1)).await;
    assert_eq!(rig.errors(ActorId::PlateRack(2)), ["0x0301"]);

    rig.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn cancelled_refill_leaves_stock_untouched() {
    let dir = tempfile::tempdir().unwrap();
    let rig = Rig::start(storage_config(dir.path()));
    rig.bring_up().await;

    job(&rig, StationCommand::RefillMaterial, "1 Red 4 Green 0 Blue 0").await;
    assert_eq!(rig.station_state().as_deref(), Some("Running"));
    rig.send(StationCommand::CancelService);
    rig.wait_for_station("Ready", Duration::from_secs(1)).await;
    settle(50).await;

    assert!(rig.rec.contains(ActorId::PlateRack(1), Topic::StationMessageCode, "0x1001"));
    rig.image.set_input(INTERACTION_1, true).unwrap();
    settle(50).await;
    assert_eq!(stock_file(dir.path(), 1)["PlateColor1Quantity"], json!(0));
    assert!(!rig.rec.contains(ActorId::PlateRack(1), Topic::State, "MaterialRefillDone"));

    rig.shutdown().await;
}
