//! Workpiece clamp on a single output. Asserted means closed.

use std::sync::Arc;

use modcell_common::io::image::ProcessImage;
use tracing::{debug, error};

use crate::runtime::active::Behavior;
use crate::runtime::hsm::{Hsm, StateId, StateMachine};
use crate::runtime::message::{ActorId, EventKind, Message, Topic};
use crate::runtime::pubsub::Publisher;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClampState {
    NotInitialized,
    Initialized,
    Opened,
    Closed,
    Error,
}

impl StateId for ClampState {
    fn all() -> &'static [Self] {
        &[
            Self::NotInitialized,
            Self::Initialized,
            Self::Opened,
            Self::Closed,
            Self::Error,
        ]
    }

    fn parent(self) -> Option<Self> {
        match self {
            Self::Opened | Self::Closed => Some(Self::Initialized),
            _ => None,
        }
    }

    fn name(self) -> &'static str {
        match self {
            Self::NotInitialized => "NotInitialized",
            Self::Initialized => "Initialized",
            Self::Opened => "Opened",
            Self::Closed => "Closed",
            Self::Error => "Error",
        }
    }
}

pub struct Clamp {
    id: ActorId,
    sm: StateMachine<ClampState>,
    publisher: Arc<Publisher>,
    image: Arc<dyn ProcessImage>,
    pin: String,
}

impl Clamp {
    pub fn new(
        id: ActorId,
        publisher: Arc<Publisher>,
        image: Arc<dyn ProcessImage>,
        pin: impl Into<String>,
    ) -> Self {
        Self {
            id,
            sm: StateMachine::new("clamp", ClampState::NotInitialized),
            publisher,
            image,
            pin: pin.into(),
        }
    }

    fn write(&mut self, closed: bool) -> bool {
        match self.image.write_output(&self.pin, closed) {
            Ok(()) => true,
            Err(e) => {
                error!(device = %self.id, "Clamp write failed: {}", e);
                self.set_state(ClampState::Error);
                false
            }
        }
    }
}

impl Hsm for Clamp {
    type State = ClampState;

    fn machine(&self) -> &StateMachine<ClampState> {
        &self.sm
    }

    fn machine_mut(&mut self) -> &mut StateMachine<ClampState> {
        &mut self.sm
    }

    fn on_enter(&mut self, state: ClampState) {
        match state {
            ClampState::NotInitialized => {}
            ClampState::Initialized => {
                self.publisher.announce(Topic::State, state.name());
                self.set_state(ClampState::Opened);
            }
            ClampState::Opened | ClampState::Closed => {
                let closed = state == ClampState::Closed;
                if self.write(closed) {
                    self.publisher.announce(Topic::Detail, state.name());
                    self.publisher.announce(Topic::Value, closed);
                }
            }
            ClampState::Error => self.publisher.announce(Topic::State, state.name()),
        }
    }
}

impl Behavior for Clamp {
    fn dispatch(&mut self, message: Message) {
        let Message::Event(event) = message else {
            return;
        };
        use ClampState::*;
        match (self.current(), event.kind) {
            (s, EventKind::Initialize) if s.top() == Initialized => {
                self.publisher.announce(Topic::State, Initialized.name());
            }
            (_, EventKind::Initialize) => self.set_state(Initialized),
            (Opened, EventKind::Close) => self.set_state(Closed),
            (Closed, EventKind::Open) => self.set_state(Opened),
            (s @ (Opened | Closed), EventKind::Open | EventKind::Close | EventKind::Update) => {
                self.publisher.announce(Topic::Value, s == Closed);
            }
            (state, kind) => debug!(device = %self.id, ?state, ?kind, "Ignored"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::DEVICE_TOPICS;
    use crate::runtime::message::{DeviceId, Event};
    use modcell_common::io::sim::SimulatedProcessImage;

    const ID: ActorId = ActorId::Device(DeviceId::Clamp);

    #[test]
    fn close_and_open_drive_the_output() {
        let image = SimulatedProcessImage::new();
        image.add_output("Q3.0");
        let mut clamp = Clamp::new(ID, Publisher::new(ID, DEVICE_TOPICS), image.clone(), "Q3.0");
        let mut post = |kind| clamp.dispatch(Event::new(kind, ActorId::Station).into());
        post(EventKind::Close);
        assert!(!image.read_output("Q3.0").unwrap());
        post(EventKind::Initialize);
        post(EventKind::Close);
        assert!(image.read_output("Q3.0").unwrap());
        post(EventKind::Open);
        assert!(!image.read_output("Q3.0").unwrap());
        assert_eq!(clamp.current(), ClampState::Opened);
    }
}
