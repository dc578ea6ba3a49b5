//! Integration test: dice-half jobs against the real rack.
//!
//! After bring-up the bottom sensor sees parts but nothing has been
//! counted, so the rack sits in `RackFilling` with a count of zero.

use std::time::Duration;

use modcell_control::runtime::message::{ActorId, ServiceKind, StationCommand, Topic, Value};

use super::common::{Rig, assembly_config, settle};

const RACK_EMPTY: &str = "0x0201";

fn count(rig: &Rig) -> Option<Value> {
    rig.rec
        .last(ActorId::DicehalfRack, Topic::NumberOfCurrentlyStoredDicehalves)
}

#[tokio::test(start_paused = true)]
async fn provide_from_uncounted_rack_fails_the_station() {
    let rig = Rig::start(assembly_config());
    rig.bring_up().await;
    assert_eq!(rig.last_state(ActorId::DicehalfRack).as_deref(), Some("RackFilling"));
    assert_eq!(count(&rig), Some(Value::Int(0)));

    rig.send(StationCommand::ProvideDicehalf);
    rig.wait_for_station("Error", Duration::from_millis(500)).await;

    let job = ActorId::Service(ServiceKind::ProvideDicehalf);
    assert_eq!(rig.rec.texts(job, Topic::State), ["Ready", "Busy", "Error"]);
    assert_eq!(rig.errors(ActorId::DicehalfRack), [RACK_EMPTY]);
    assert_eq!(rig.last_state(ActorId::DicehalfRack).as_deref(), Some("Error"));
    let history = rig.station_history();
    assert_eq!(&history[history.len() - 3..], ["Ready", "Running", "Error"]);

    rig.send(StationCommand::Ack);
    rig.wait_for_station("Ready", Duration::from_secs(1)).await;
    settle(100).await;
    assert_eq!(rig.rec.texts(job, Topic::State).last().map(String::as_str), Some("Ready"));
    assert_eq!(rig.last_state(ActorId::DicehalfRack).as_deref(), Some("RackFilling"));

    rig.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn refill_then_provide_counts_down() {
    let rig = Rig::start(assembly_config());
    rig.bring_up().await;

    rig.cell
        .command(StationCommand::RefillRack, Some(vec![Value::Int(4)]))
        .unwrap();
    settle(50).await;
    rig.wait_for_station("Ready", Duration::from_millis(500)).await;
    assert_eq!(count(&rig), Some(Value::Int(4)));
    assert_eq!(
        rig.rec.texts(ActorId::Service(ServiceKind::RefillRack), Topic::State),
        ["Ready", "Busy", "Done", "Ready"]
    );

    rig.send(StationCommand::ProvideDicehalf);
    settle(50).await;
    rig.wait_for_station("Ready", Duration::from_millis(500)).await;
    assert_eq!(count(&rig), Some(Value::Int(3)));
    assert!(rig.errors(ActorId::DicehalfRack).is_empty());
    assert_eq!(
        rig.station_history().iter().filter(|s| *s == "Running").count(),
        2
    );

    rig.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn refill_beyond_capacity_is_an_error() {
    let rig = Rig::start(assembly_config());
    rig.bring_up().await;

    rig.cell
        .command(StationCommand::RefillRack, Some(vec![Value::Int(13)]))
        .unwrap();
    rig.wait_for_station("Error", Duration::from_millis(500)).await;
    assert_eq!(rig.errors(ActorId::DicehalfRack), ["0x0204"]);
    assert_eq!(
        rig.rec
            .texts(ActorId::Service(ServiceKind::RefillRack), Topic::State)
            .last()
            .map(String::as_str),
        Some("Error")
    );

    rig.shutdown().await;
}
