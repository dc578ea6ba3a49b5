//! Bidirectional DC motor driven by a direction pair.

use std::sync::Arc;

use modcell_common::io::image::{Direction, DirectionPair};
use tracing::{debug, error};

use crate::runtime::active::Behavior;
use crate::runtime::hsm::{Hsm, StateId, StateMachine};
use crate::runtime::message::{ActorId, EventKind, Message, Topic};
use crate::runtime::pubsub::Publisher;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MotorState {
    NotInitialized,
    Initialized,
    Stopped,
    RotatingCw,
    RotatingCcw,
    Error,
}

impl StateId for MotorState {
    fn all() -> &'static [Self] {
        &[
            Self::NotInitialized,
            Self::Initialized,
            Self::Stopped,
            Self::RotatingCw,
            Self::RotatingCcw,
            Self::Error,
        ]
    }

    fn parent(self) -> Option<Self> {
        match self {
            Self::Stopped | Self::RotatingCw | Self::RotatingCcw => Some(Self::Initialized),
            _ => None,
        }
    }

    fn name(self) -> &'static str {
        match self {
            Self::NotInitialized => "NotInitialized",
            Self::Initialized => "Initialized",
            Self::Stopped => "Stopped",
            Self::RotatingCw => "RotatingCw",
            Self::RotatingCcw => "RotatingCcw",
            Self::Error => "Error",
        }
    }
}

pub struct Motor {
    id: ActorId,
    sm: StateMachine<MotorState>,
    publisher: Arc<Publisher>,
    pair: DirectionPair,
}

impl Motor {
    pub fn new(id: ActorId, publisher: Arc<Publisher>, pair: DirectionPair) -> Self {
        Self {
            id,
            sm: StateMachine::new("motor", MotorState::NotInitialized),
            publisher,
            pair,
        }
    }

    /// Drive the outputs; a failed write moves the motor to `Error`.
    fn drive(&mut self, direction: Direction) {
        if let Err(e) = self.pair.drive(direction) {
            error!(device = %self.id, "Direction write failed: {}", e);
            if self.current() != MotorState::Error {
                self.set_state(MotorState::Error);
            }
        }
    }

    fn running(&self) -> bool {
        matches!(self.current(), MotorState::RotatingCw | MotorState::RotatingCcw)
    }
}

impl Hsm for Motor {
    type State = MotorState;

    fn machine(&self) -> &StateMachine<MotorState> {
        &self.sm
    }

    fn machine_mut(&mut self) -> &mut StateMachine<MotorState> {
        &mut self.sm
    }

    fn on_enter(&mut self, state: MotorState) {
        match state {
            MotorState::NotInitialized => {}
            MotorState::Initialized => {
                self.publisher.announce(Topic::State, state.name());
                self.set_state(MotorState::Stopped);
                return;
            }
            MotorState::Stopped => self.drive(Direction::Off),
            MotorState::RotatingCw => self.drive(Direction::Cw),
            MotorState::RotatingCcw => self.drive(Direction::Ccw),
            MotorState::Error => {
                let _ = self.pair.drive(Direction::Off);
                self.publisher.announce(Topic::State, state.name());
            }
        }
        if self.current() == state && state.is_substate() {
            self.publisher.announce(Topic::Detail, state.name());
            self.publisher.announce(Topic::Value, self.running());
        }
    }
}

impl Behavior for Motor {
    fn dispatch(&mut self, message: Message) {
        let Message::Event(event) = message else {
            return;
        };
        use MotorState::*;
        match (self.current(), event.kind) {
            (s, EventKind::Initialize) if s.top() == Initialized => {
                self.publisher.announce(Topic::State, Initialized.name());
                if s != Stopped {
                    self.set_state(Stopped);
                }
            }
            (_, EventKind::Initialize) => self.set_state(Initialized),
            (Stopped | RotatingCcw, EventKind::RotateCw) => self.set_state(RotatingCw),
            (Stopped | RotatingCw, EventKind::RotateCcw) => self.set_state(RotatingCcw),
            (RotatingCw | RotatingCcw, EventKind::Stop) => self.set_state(Stopped),
            (Stopped, EventKind::Stop) => self.drive(Direction::Off),
            (s, EventKind::Update) if s.top() == Initialized => {
                self.publisher.announce(Topic::Detail, s.name());
                self.publisher.announce(Topic::Value, self.running());
            }
            (state, kind) => debug!(device = %self.id, ?state, ?kind, "Ignored"),
        }
    }

    fn on_stop(&mut self) {
        let _ = self.pair.drive(Direction::Off);
    }
}
