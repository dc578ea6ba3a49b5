//! Integration test: a carriage that never reaches the rack.
//!
//! The rack sensor is held off, so the move runs into the carriage timer.
//! The failure latches `init_required`: after `Ack` the station asks for a
//! new initialization.

use std::time::Duration;

use modcell_common::io::image::ProcessImage;
use modcell_control::runtime::message::{ActorId, ServiceKind, StationCommand, Topic};

use super::common::{Rig, assembly_config, settle};

const RACK_SENSOR: &str = "I1.1";
const TO_RACK_TIMEOUT: &str = "0x0101";

#[tokio::test(start_paused = true)]
async fn maintenance_move_times_out() {
    let rig = Rig::start(assembly_config());
    rig.bring_up().await;
    rig.image.suppress(RACK_SENSOR);

    rig.send(StationCommand::MaintenanceCarriageToRack);
    settle(1_000).await;
    assert_eq!(rig.station_state().as_deref(), Some("Ready"));
    assert!(rig.image.read_output("Q1.1").unwrap(), "motor runs towards the rack");

    rig.wait_for_station("Error", Duration::from_secs(6)).await;
    assert_eq!(rig.errors(ActorId::Carriage), [TO_RACK_TIMEOUT]);
    assert_eq!(rig.last_state(ActorId::Carriage).as_deref(), Some("ErrorWithInit"));
    assert!(!rig.image.read_output("Q1.0").unwrap());
    assert!(!rig.image.read_output("Q1.1").unwrap());

    rig.send(StationCommand::Ack);
    rig.wait_for_station("NotInitialized", Duration::from_secs(1))
        .await;
    assert!(rig.rec.contains(ActorId::Station, Topic::Ack, true));
    assert_eq!(
        rig.rec
            .texts(ActorId::Station, Topic::StationMessageCode)
            .last()
            .map(String::as_str),
        Some("0x1201")
    );
    assert_eq!(rig.last_state(ActorId::Carriage).as_deref(), Some("OutOfPosition"));

    // A fresh initialization homes the carriage back to the front.
    rig.image.release(RACK_SENSOR);
    rig.send(StationCommand::Initialize);
    rig.wait_for_station("Ready", Duration::from_secs(30)).await;
    assert_eq!(rig.last_state(ActorId::Carriage).as_deref(), Some("AtFrontPosition"));

    rig.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn timeout_during_assemble_fails_the_service() {
    let rig = Rig::start(assembly_config());
    rig.bring_up().await;
    rig.image.suppress(RACK_SENSOR);

    rig.send(StationCommand::Assemble);
    settle(100).await;
    assert_eq!(rig.station_state().as_deref(), Some("Running"));

    rig.wait_for_station("Error", Duration::from_secs(6)).await;
    let press_job = ActorId::Service(ServiceKind::Press);
    assert_eq!(
        rig.rec.texts(press_job, Topic::State).last().map(String::as_str),
        Some("Error")
    );
    assert_eq!(
        rig.rec.texts(press_job, Topic::Detail).last().map(String::as_str),
        Some("WaitForJob")
    );
    assert_eq!(rig.errors(ActorId::Carriage), [TO_RACK_TIMEOUT]);

    rig.send(StationCommand::Ack);
    rig.wait_for_station("NotInitialized", Duration::from_secs(1))
        .await;
    assert_eq!(
        rig.rec.texts(press_job, Topic::State).last().map(String::as_str),
        Some("Ready")
    );

    rig.shutdown().await;
}
