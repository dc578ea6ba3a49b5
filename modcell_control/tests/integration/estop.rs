//! Integration test: emergency stop and connection loss.
//!
//! Both stop every service and the motors, latch `init_required` and hold
//! the station out of `Ready` until it is released and acknowledged.

use std::time::Duration;

use modcell_common::io::image::ProcessImage;
use modcell_control::runtime::message::{ActorId, ServiceKind, StationCommand, Topic};
use modcell_control::station::{SAFETY_ACTIVATED, SAFETY_NOT_ACTIVATED};

use super::common::{Rig, assembly_config, settle};

const SAFETY_SWITCH: &str = "I0.0";
const MOTOR_OUTPUTS: [&str; 4] = ["Q1.0", "Q1.1", "Q2.0", "Q2.1"];

fn motors_off(rig: &Rig) -> bool {
    MOTOR_OUTPUTS
        .iter()
        .all(|pin| !rig.image.read_output(pin).unwrap())
}

#[tokio::test(start_paused = true)]
async fn safety_switch_stops_and_latches() {
    let rig = Rig::start(assembly_config());
    rig.bring_up().await;

    rig.send(StationCommand::Assemble);
    settle(300).await;
    assert!(!motors_off(&rig), "carriage is moving");

    rig.image.set_input(SAFETY_SWITCH, true).unwrap();
    rig.wait_for_station("Estop", Duration::from_secs(1)).await;
    settle(10).await;
    assert!(motors_off(&rig));
    assert_eq!(
        rig.rec.texts(ActorId::Station, Topic::StationState).last().map(String::as_str),
        Some("Error")
    );
    assert_eq!(rig.errors(ActorId::Station), ["0x0002"]);
    assert_eq!(
        rig.rec.texts(ActorId::Station, Topic::StationSafetyState).last().map(String::as_str),
        Some(SAFETY_ACTIVATED)
    );
    assert!(rig.rec.contains(
        ActorId::Service(ServiceKind::Press),
        Topic::State,
        "Cancelled"
    ));
    assert_eq!(rig.last_state(ActorId::Carriage).as_deref(), Some("ErrorWithInit"));

    // Still pressed: neither EstopOk nor Ack gets out.
    rig.send(StationCommand::EstopOk);
    rig.send(StationCommand::Ack);
    settle(50).await;
    assert_eq!(rig.station_state().as_deref(), Some("Estop"));

    rig.image.set_input(SAFETY_SWITCH, false).unwrap();
    rig.wait_for_station("Error", Duration::from_secs(1)).await;
    assert_eq!(
        rig.rec.texts(ActorId::Station, Topic::StationSafetyState).last().map(String::as_str),
        Some(SAFETY_NOT_ACTIVATED)
    );

    rig.send(StationCommand::Ack);
    rig.wait_for_station("NotInitialized", Duration::from_secs(1))
        .await;
    rig.send(StationCommand::Initialize);
    rig.wait_for_station("Ready", Duration::from_secs(30)).await;

    rig.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn estop_command_cancels_running_service() {
    let rig = Rig::start(assembly_config());
    rig.bring_up().await;

    rig.send(StationCommand::Assemble);
    settle(300).await;
    rig.send(StationCommand::Estop);
    rig.wait_for_station("Estop", Duration::from_secs(1)).await;
    settle(10).await;
    assert!(motors_off(&rig));

    // Nothing is pressed, EstopOk releases at once.
    rig.send(StationCommand::EstopOk);
    rig.wait_for_station("Error", Duration::from_secs(1)).await;

    // Commands other than Ack are refused in Error.
    rig.send(StationCommand::Assemble);
    settle(50).await;
    assert_eq!(rig.station_state().as_deref(), Some("Error"));

    rig.send(StationCommand::Ack);
    rig.wait_for_station("NotInitialized", Duration::from_secs(1))
        .await;
    assert_eq!(
        rig.rec
            .texts(ActorId::Station, Topic::StationMessageCode)
            .last()
            .map(String::as_str),
        Some("0x1201")
    );

    rig.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn connection_loss_outranks_estop_release() {
    let rig = Rig::start(assembly_config());
    rig.bring_up().await;

    rig.send(StationCommand::Estop);
    rig.wait_for_station("Estop", Duration::from_secs(1)).await;
    rig.send(StationCommand::NoConn);
    settle(50).await;
    assert_eq!(rig.station_state().as_deref(), Some("Estop"));

    rig.send(StationCommand::EstopOk);
    rig.wait_for_station("NoConnection", Duration::from_secs(1))
        .await;
    assert_eq!(rig.errors(ActorId::Station), ["0x0002", "0x0003"]);
    assert_eq!(
        rig.rec.texts(ActorId::Station, Topic::StationState).last().map(String::as_str),
        Some("NoConnection")
    );

    rig.send(StationCommand::Ack);
    settle(50).await;
    assert_eq!(rig.station_state().as_deref(), Some("NoConnection"));

    rig.send(StationCommand::ConnOk);
    rig.wait_for_station("Error", Duration::from_secs(1)).await;
    rig.send(StationCommand::Ack);
    rig.wait_for_station("NotInitialized", Duration::from_secs(1))
        .await;

    rig.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn fatal_error_stops_without_safety_switch() {
    let rig = Rig::start(assembly_config());
    rig.bring_up().await;

    rig.send(StationCommand::FatalError);
    rig.wait_for_station("Estop", Duration::from_secs(1)).await;
    assert_eq!(rig.errors(ActorId::Station), ["0x0001"]);
    assert!(!rig.rec.contains(ActorId::Station, Topic::StationSafetyState, SAFETY_ACTIVATED));

    rig.send(StationCommand::EstopOk);
    rig.wait_for_station("Error", Duration::from_secs(1)).await;

    rig.shutdown().await;
}
