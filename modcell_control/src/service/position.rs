//! Carriage positioning service: bring the carriage to the front.

use super::{Peer, Request, ServiceCore, ignored, peer, request};
use crate::composite::carriage::CarriageState;
use crate::runtime::active::{ActorRef, Behavior};
use crate::runtime::hsm::{Hsm, StateId, StateMachine};
use crate::runtime::message::{EventKind, Message};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PositionState {
    Idle,
    MovingToFront,
}

impl StateId for PositionState {
    fn all() -> &'static [Self] {
        &[Self::Idle, Self::MovingToFront]
    }

    fn parent(self) -> Option<Self> {
        None
    }

    fn name(self) -> &'static str {
        match self {
            Self::Idle => "Idle",
            Self::MovingToFront => "MovingToFront",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Input {
    Request(Request),
    Carriage(Peer<CarriageState>),
}

pub struct PositionService {
    core: ServiceCore,
    sm: StateMachine<PositionState>,
    carriage: ActorRef,
}

impl PositionService {
    pub fn new(core: ServiceCore, carriage: ActorRef) -> Self {
        Self {
            core,
            sm: StateMachine::new("position_service", PositionState::Idle),
            carriage,
        }
    }

    fn classify(&self, message: Message) -> Option<Input> {
        if let Some(r) = request(&message) {
            return Some(Input::Request(r));
        }
        match message {
            Message::Topic(msg) if msg.sender == self.carriage.id() => {
                peer::<CarriageState>(&msg).map(Input::Carriage)
            }
            _ => None,
        }
    }

    fn handle(&mut self, state: PositionState, input: Input) {
        use PositionState::*;
        match (state, input) {
            (Idle, Input::Request(Request::Execute { service_index, .. })) => {
                if self.core.begin(service_index) {
                    self.set_state(MovingToFront);
                }
            }
            (MovingToFront, Input::Carriage(Peer::At(CarriageState::AtFrontPosition))) => {
                self.core.done();
                self.set_state(Idle);
            }
            (MovingToFront, Input::Carriage(Peer::Failed { init_required })) => {
                self.core.fail(None, init_required);
                self.set_state(Idle);
            }
            (MovingToFront, Input::Request(Request::Timeout)) => {
                self.core.send(&self.carriage, EventKind::Stop);
                self.core.timed_out();
                self.set_state(Idle);
            }
            (s, Input::Request(Request::Cancel)) => {
                if s == MovingToFront {
                    self.core.send(&self.carriage, EventKind::Stop);
                    self.set_state(Idle);
                }
                self.core.cancel();
            }
            (_, Input::Request(Request::Acknowledge)) => self.core.acknowledge(),
            (s, other) => ignored(self.core.id(), s.name(), &other),
        }
    }
}

impl Hsm for PositionService {
    type State = PositionState;

    fn machine(&self) -> &StateMachine<PositionState> {
        &self.sm
    }

    fn machine_mut(&mut self) -> &mut StateMachine<PositionState> {
        &mut self.sm
    }

    fn on_enter(&mut self, state: PositionState) {
        self.core.detail(state.name());
        if state == PositionState::MovingToFront {
            self.core.send(&self.carriage, EventKind::MoveToFront);
        }
    }
}

impl Behavior for PositionService {
    fn on_start(&mut self) {
        self.core.start();
        self.start_machine();
    }

    fn dispatch(&mut self, message: Message) {
        if let Some(input) = self.classify(message) {
            let state = self.current();
            self.handle(state, input);
        }
    }
}
