//! Digital sensor.
//!
//! Publishes its logical level on `Value` for every edge of its input line
//! and on request. Normally-closed sensors are inverted before publishing.

use std::sync::Arc;

use modcell_common::io::image::{IoError, ProcessImage};
use modcell_common::io::role::DiLogic;
use tracing::{debug, warn};

use super::DeviceState;
use crate::runtime::active::Behavior;
use crate::runtime::hsm::{Hsm, StateId, StateMachine};
use crate::runtime::message::{ActorId, EventKind, Message, Topic};
use crate::runtime::pubsub::Publisher;

pub struct Sensor {
    id: ActorId,
    sm: StateMachine<DeviceState>,
    publisher: Arc<Publisher>,
    image: Arc<dyn ProcessImage>,
    pin: String,
    logic: DiLogic,
}

impl Sensor {
    pub fn new(
        id: ActorId,
        publisher: Arc<Publisher>,
        image: Arc<dyn ProcessImage>,
        pin: impl Into<String>,
        logic: DiLogic,
    ) -> Self {
        Self {
            id,
            sm: StateMachine::new("sensor", DeviceState::NotInitialized),
            publisher,
            image,
            pin: pin.into(),
            logic,
        }
    }

    /// Current logical level.
    pub fn read(&self) -> Result<bool, IoError> {
        Ok(self.logic.apply(self.image.read_input(&self.pin)?))
    }

    fn refresh(&mut self) {
        match self.read() {
            Ok(level) => self.publisher.announce(Topic::Value, level),
            Err(e) => {
                warn!(device = %self.id, "Input read failed: {}", e);
                self.set_state(DeviceState::Error);
            }
        }
    }
}

impl Hsm for Sensor {
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

impl Behavior for Sensor {
    fn dispatch(&mut self, message: Message) {
        let Message::Event(event) = message else {
            return;
        };
        match (self.current(), event.kind) {
            (DeviceState::Initialized, EventKind::Initialize) => {
                self.publisher.announce(Topic::State, DeviceState::Initialized.name());
            }
            (_, EventKind::Initialize) => self.set_state(DeviceState::Initialized),
            (DeviceState::Initialized, EventKind::Update) => self.refresh(),
            (DeviceState::Initialized, EventKind::Edge(edge)) => {
                self.publisher.announce(Topic::Value, self.logic.apply(edge.level()));
            }
            (state, kind) => debug!(device = %self.id, ?state, ?kind, "Ignored"),
        }
    }
}
