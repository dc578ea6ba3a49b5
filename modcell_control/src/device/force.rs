//! Press force sensor.
//!
//! Fed by the control loop with analog samples and with synthesized edges
//! whenever the reading crosses the setpoint. A rising edge cuts the press
//! motor outputs directly, whatever the state of this device or of the
//! press motor actor, before anything is published.

use std::sync::Arc;

use modcell_common::io::image::{Direction, DirectionPair, Edge, ProcessImage};
use tracing::{debug, error, warn};

use super::DeviceState;
use crate::runtime::active::Behavior;
use crate::runtime::hsm::{Hsm, StateId, StateMachine};
use crate::runtime::message::{ActorId, EventKind, Message, Topic};
use crate::runtime::pubsub::Publisher;

/// Topics of the force sensor publisher.
pub const FORCE_TOPICS: &[Topic] = &[Topic::State, Topic::Value, Topic::AnalogValue, Topic::Detail];

pub struct ForceSensor {
    id: ActorId,
    sm: StateMachine<DeviceState>,
    publisher: Arc<Publisher>,
    image: Arc<dyn ProcessImage>,
    pin: String,
    setpoint: i64,
    cut: Option<DirectionPair>,
    last_sample: Option<i64>,
}

impl ForceSensor {
    pub fn new(
        id: ActorId,
        publisher: Arc<Publisher>,
        image: Arc<dyn ProcessImage>,
        pin: impl Into<String>,
        setpoint: i64,
    ) -> Self {
        Self {
            id,
            sm: StateMachine::new("force_sensor", DeviceState::NotInitialized),
            publisher,
            image,
            pin: pin.into(),
            setpoint,
            cut: None,
            last_sample: None,
        }
    }

    /// Direction outputs to de-assert on a rising edge.
    pub fn with_motor_cut(mut self, pair: DirectionPair) -> Self {
        self.cut = Some(pair);
        self
    }

    fn sample(&mut self, value: i64) {
        if self.last_sample != Some(value) {
            self.last_sample = Some(value);
            self.publisher.announce(Topic::AnalogValue, value);
        }
    }

    fn refresh(&mut self) {
        match self.image.read_analog(&self.pin) {
            Ok(value) => {
                self.sample(value);
                self.publisher.announce(Topic::Value, value >= self.setpoint);
            }
            Err(e) => {
                warn!(device = %self.id, "Analog read failed: {}", e);
                self.set_state(DeviceState::Error);
            }
        }
    }

    fn edge(&mut self, edge: Edge) {
        if edge == Edge::Rising {
            if let Some(pair) = &self.cut {
                if let Err(e) = pair.drive(Direction::Off) {
                    error!(device = %self.id, "Motor cut failed: {}", e);
                }
            }
        }
        if self.current() == DeviceState::Initialized {
            self.publisher.announce(Topic::Value, edge.level());
        }
    }
}

impl Hsm for ForceSensor {
    type State = DeviceState;

    fn machine(&self) -> &StateMachine<DeviceState> {
        &self.sm
    }

    fn machine_mut(&mut self) -> &mut StateMachine<DeviceState> {
        &mut self.sm
    }

    fn on_enter(&mut self, state: DeviceState) {
        self.publisher.announce(Topic::State, state.name());
    }
}

impl Behavior for ForceSensor {
    fn dispatch(&mut self, message: Message) {
        let Message::Event(event) = message else {
            return;
        };
        match (self.current(), event.kind) {
            (_, EventKind::Edge(edge)) => self.edge(edge),
            (DeviceState::Initialized, EventKind::Initialize) => {
                self.publisher.announce(Topic::State, DeviceState::Initialized.name());
            }
            (_, EventKind::Initialize) => self.set_state(DeviceState::Initialized),
            (DeviceState::Initialized, EventKind::AnalogSample(value)) => self.sample(value),
            (DeviceState::Initialized, EventKind::Update) => self.refresh(),
            (_, EventKind::AnalogSample(_)) => {}
            (state, kind) => debug!(device = %self.id, ?state, ?kind, "Ignored"),
        }
    }
}
