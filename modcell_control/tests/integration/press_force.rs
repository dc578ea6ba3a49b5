//! Integration test: pressing with the force control loop.
//!
//! Driving the press down builds up force on the analog input. The control
//! loop turns the setpoint crossing into an edge, the force sensor cuts the
//! press motor and the press stops in the pressing position.

use std::time::Duration;

use modcell_common::io::image::ProcessImage;
use modcell_control::runtime::message::{ActorId, DeviceId, ServiceKind, StationCommand, Topic};

use super::common::{Rig, assembly_config, settle, wait_until};

const FORCE_INPUT: &str = "AI0";
const PRESS_DOWN: &str = "Q2.1";

#[tokio::test(start_paused = true)]
async fn assemble_runs_a_full_pressing_cycle() {
    let rig = Rig::start(assembly_config());
    rig.tags.place("04:A2:19:7F");
    rig.bring_up().await;

    rig.send(StationCommand::Assemble);
    settle(100).await;
    assert_eq!(rig.station_state().as_deref(), Some("Running"));
    rig.wait_for_station("Ready", Duration::from_secs(30)).await;

    let press_job = ActorId::Service(ServiceKind::Press);
    assert_eq!(
        rig.rec.texts(press_job, Topic::Detail),
        [
            "WaitForJob",
            "WaitClampingPos",
            "Clamping",
            "WaitPressingPos",
            "Pressing",
            "MovingUp",
            "ReturningToFront",
            "WaitForJob",
        ]
    );
    assert!(rig.rec.contains(press_job, Topic::State, "Done"));

    let force = ActorId::Device(DeviceId::ForceSensor);
    assert!(rig.rec.contains(force, Topic::Value, true));
    assert!(rig.rec.contains(force, Topic::AnalogValue, 2500i64));
    assert!(rig.rec.contains(ActorId::Press, Topic::State, "InPressingPosition"));
    assert!(rig.rec.contains(
        ActorId::Device(DeviceId::Nfc),
        Topic::Value,
        "04:A2:19:7F"
    ));

    assert_eq!(rig.last_state(ActorId::Press).as_deref(), Some("InUpperPosition"));
    assert_eq!(rig.last_state(ActorId::Carriage).as_deref(), Some("AtFrontPosition"));
    assert!(!rig.image.read_output("Q3.0").unwrap(), "clamp released");

    let history = rig.station_history();
    assert_eq!(&history[history.len() - 2..], ["Running", "Ready"]);

    rig.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn force_trip_cuts_the_motor() {
    let rig = Rig::start(assembly_config());
    rig.bring_up().await;

    rig.send(StationCommand::MaintenanceMotorCcw);
    settle(100).await;
    assert!(rig.image.read_output(PRESS_DOWN).unwrap());

    let force = ActorId::Device(DeviceId::ForceSensor);
    wait_until("force trip", Duration::from_secs(2), || {
        rig.rec.contains(force, Topic::Value, true)
    })
    .await;
    assert!(!rig.image.read_output(PRESS_DOWN).unwrap());
    assert!(rig.image.read_analog(FORCE_INPUT).unwrap() >= 2000);

    rig.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn press_without_force_times_out() {
    let rig = Rig::start(assembly_config());
    rig.bring_up().await;
    rig.image.suppress(FORCE_INPUT);

    rig.send(StationCommand::Assemble);
    rig.wait_for_station("Error", Duration::from_secs(15)).await;

    // Press moving down timeout.
    assert_eq!(rig.errors(ActorId::Press), ["0x0403"]);
    assert_eq!(rig.last_state(ActorId::Press).as_deref(), Some("ErrorWithInit"));
    assert!(!rig.image.read_output(PRESS_DOWN).unwrap());
    assert!(
        !rig.rec
            .contains(ActorId::Device(DeviceId::ForceSensor), Topic::Value, true)
    );

    rig.shutdown().await;
}
