//! Integration test: cold start of an assembly station.
//!
//! Starting → NotInitialized → Initialization → Homing → Ready, with every
//! composite initialized and referenced on the way.

use std::time::Duration;

use modcell_common::io::image::ProcessImage;
use modcell_control::runtime::message::{ActorId, ServiceKind, StationCommand, Topic};

use super::common::{Rig, assembly_config, settle};

#[tokio::test(start_paused = true)]
async fn station_waits_for_initialize() {
    let rig = Rig::start(assembly_config());
    rig.wait_for_station("NotInitialized", Duration::from_secs(1))
        .await;

    assert_eq!(rig.station_history(), ["Starting", "NotInitialized"]);
    assert_eq!(
        rig.rec.texts(ActorId::Station, Topic::StationState),
        ["Starting", "Standby"]
    );
    assert!(rig.rec.contains(
        ActorId::Station,
        Topic::StationSafetyState,
        "safetySwitchNotActivated"
    ));
    assert_eq!(rig.last_state(ActorId::Carriage).as_deref(), Some("NotInitialized"));

    // A service before initialization is ignored.
    rig.send(StationCommand::Assemble);
    settle(100).await;
    assert_eq!(rig.station_state().as_deref(), Some("NotInitialized"));

    rig.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn initialize_homes_and_reaches_ready() {
    let rig = Rig::start(assembly_config());
    rig.bring_up().await;

    assert_eq!(
        rig.station_history(),
        ["Starting", "NotInitialized", "Initialization", "Homing", "Ready"]
    );
    assert_eq!(rig.last_state(ActorId::Carriage).as_deref(), Some("AtFrontPosition"));
    assert_eq!(rig.last_state(ActorId::Press).as_deref(), Some("InUpperPosition"));
    assert_eq!(rig.last_state(ActorId::DicehalfRack).as_deref(), Some("RackFilling"));

    for kind in [ServiceKind::Init, ServiceKind::Homing] {
        let states = rig.rec.texts(ActorId::Service(kind), Topic::State);
        assert_eq!(states, ["Ready", "Busy", "Done", "Ready"], "{kind}");
    }
    let homing = rig
        .rec
        .texts(ActorId::Service(ServiceKind::Homing), Topic::Detail);
    assert!(homing.iter().any(|d| d == "RackDispatchHoming"));
    assert_eq!(homing.last().map(String::as_str), Some("NotReferenced"));

    // Green, steady.
    assert!(rig.image.read_output("Q0.1").unwrap());
    assert!(!rig.image.read_output("Q0.0").unwrap());
    assert!(!rig.image.read_output("Q0.2").unwrap());

    rig.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn homing_brings_carriage_back_to_front() {
    let mut config = assembly_config();
    // Carriage parked at the rack.
    for point in &mut config.io.points {
        match point.role.as_str() {
            "CarriageFrontSensor" => point.initial = None,
            "CarriageRackSensor" => point.initial = Some(1),
            _ => {}
        }
    }
    let rig = Rig::start(config);
    rig.bring_up().await;

    let homing = rig
        .rec
        .texts(ActorId::Service(ServiceKind::Homing), Topic::Detail);
    assert!(homing.iter().any(|d| d == "CarriageMovingToFront"));
    let carriage = rig.rec.texts(ActorId::Carriage, Topic::State);
    let at_rack = carriage.iter().position(|s| s == "AtRackPosition");
    let at_front = carriage.iter().rposition(|s| s == "AtFrontPosition");
    match (at_rack, at_front) {
        (Some(rack), Some(front)) => assert!(rack < front, "{carriage:?}"),
        _ => panic!("carriage never moved from rack to front: {carriage:?}"),
    }
    assert!(!rig.image.read_output("Q1.0").unwrap());

    rig.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn homing_is_skipped_when_not_required() {
    let mut config = assembly_config();
    config.station.homing_required = false;
    let rig = Rig::start(config);
    rig.bring_up().await;

    assert!(!rig.station_history().iter().any(|s| s == "Homing"));
    assert!(
        rig.rec
            .values(ActorId::Service(ServiceKind::Homing), Topic::Detail)
            .iter()
            .all(|d| d.as_str() != Some("CarriageHoming"))
    );

    // Homing on request from Ready.
    rig.send(StationCommand::Homing);
    settle(50).await;
    rig.wait_for_station("Ready", Duration::from_secs(30)).await;
    assert!(rig.station_history().iter().any(|s| s == "Homing"));

    rig.shutdown().await;
}
