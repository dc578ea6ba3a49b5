//! Homing service.
//!
//! Brings the assembly station into its reference position: press up,
//! carriage at the front, then checks the dice-half rack and the dispatch
//! position. Every decision is taken from the state the composites publish
//! after an `Update`, never from a direct sensor read.
//!
//! Within `RackDispatchHoming` the rack and the dispatch sensor answer in
//! either order. `RackEmpty` means the rack has answered and the dispatch is
//! pending, `DispatchEmpty` the other way round.

use modcell_common::station::codes::MessageCode;
use tracing::debug;

use super::{Peer, Request, ServiceCore, ignored, peer, request};
use crate::composite::carriage::CarriageState;
use crate::composite::dicehalf_rack::DicehalfRackState;
use crate::composite::press::PressState;
use crate::runtime::active::{ActorRef, Behavior};
use crate::runtime::hsm::{Hsm, StateId, StateMachine};
use crate::runtime::message::{EventKind, Message};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HomingState {
    NotReferenced,
    CarriageHoming,
    CarriageMovingToFront,
    RackDispatchHoming,
    RackEmpty,
    DispatchEmpty,
    AllReferenced,
}

impl StateId for HomingState {
    fn all() -> &'static [Self] {
        &[
            Self::NotReferenced,
            Self::CarriageHoming,
            Self::CarriageMovingToFront,
            Self::RackDispatchHoming,
            Self::RackEmpty,
            Self::DispatchEmpty,
            Self::AllReferenced,
        ]
    }

    fn parent(self) -> Option<Self> {
        match self {
            Self::RackEmpty | Self::DispatchEmpty => Some(Self::RackDispatchHoming),
            _ => None,
        }
    }

    fn name(self) -> &'static str {
        match self {
            Self::NotReferenced => "NotReferenced",
            Self::CarriageHoming => "CarriageHoming",
            Self::CarriageMovingToFront => "CarriageMovingToFront",
            Self::RackDispatchHoming => "RackDispatchHoming",
            Self::RackEmpty => "RackEmpty",
            Self::DispatchEmpty => "DispatchEmpty",
            Self::AllReferenced => "AllReferenced",
        }
    }
}

/// Actors the homing sequence drives and observes.
#[derive(Debug, Clone)]
pub struct HomingTargets {
    pub carriage: ActorRef,
    pub press: ActorRef,
    pub rack: ActorRef,
    pub dispatch: ActorRef,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Input {
    Execute(u8),
    Cancel,
    Timeout,
    Acknowledge,
    Carriage(CarriageState),
    Press(PressState),
    Rack(DicehalfRackState),
    Dispatch(bool),
    PeerFailed(bool),
}

pub struct HomingService {
    core: ServiceCore,
    sm: StateMachine<HomingState>,
    targets: HomingTargets,
    press_up: bool,
    press_commanded: bool,
    carriage_at: Option<CarriageState>,
}

impl HomingService {
    pub fn new(core: ServiceCore, targets: HomingTargets) -> Self {
        Self {
            core,
            sm: StateMachine::new("homing_service", HomingState::NotReferenced),
            targets,
            press_up: false,
            press_commanded: false,
            carriage_at: None,
        }
    }

    fn classify(&self, message: Message) -> Option<Input> {
        if let Some(r) = request(&message) {
            return match r {
                Request::Execute { service_index, .. } => Some(Input::Execute(service_index)),
                Request::Cancel => Some(Input::Cancel),
                Request::Timeout => Some(Input::Timeout),
                Request::Acknowledge => Some(Input::Acknowledge),
            };
        }
        let Message::Topic(msg) = message else {
            return None;
        };
        let t = &self.targets;
        if msg.sender == t.dispatch.id() {
            return msg.level().map(Input::Dispatch);
        }
        let report = if msg.sender == t.carriage.id() {
            peer::<CarriageState>(&msg).map(|p| p.map(Input::Carriage))
        } else if msg.sender == t.press.id() {
            peer::<PressState>(&msg).map(|p| p.map(Input::Press))
        } else if msg.sender == t.rack.id() {
            peer::<DicehalfRackState>(&msg).map(|p| p.map(Input::Rack))
        } else {
            None
        }?;
        Some(match report {
            Peer::At(input) => input,
            Peer::Failed { init_required } => Input::PeerFailed(init_required),
        })
    }

    fn handle(&mut self, state: HomingState, input: Input) {
        use HomingState::*;
        match (state, input) {
            (NotReferenced, Input::Execute(index)) => {
                if self.core.begin(index) {
                    self.set_state(CarriageHoming);
                }
            }

            (CarriageHoming, Input::Press(PressState::InUpperPosition)) => {
                self.press_up = true;
                self.check_axes();
            }
            (CarriageHoming, Input::Press(p)) if p.is_resting() => {
                if !self.press_commanded {
                    self.press_commanded = true;
                    self.core.send(&self.targets.press, EventKind::MoveUp);
                }
            }
            (CarriageHoming, Input::Carriage(c)) if c.is_resting() => {
                self.carriage_at = Some(c);
                self.check_axes();
            }

            (CarriageMovingToFront, Input::Carriage(CarriageState::AtFrontPosition)) => {
                self.set_state(RackDispatchHoming)
            }

            (RackDispatchHoming, Input::Rack(r)) if r.is_resting() => {
                self.rack_reported(r);
                self.set_state(RackEmpty);
            }
            (RackDispatchHoming, Input::Dispatch(occupied)) => {
                self.dispatch_reported(occupied);
                self.set_state(DispatchEmpty);
            }
            (RackEmpty, Input::Dispatch(occupied)) => {
                self.dispatch_reported(occupied);
                self.set_state(AllReferenced);
            }
            (DispatchEmpty, Input::Rack(r)) if r.is_resting() => {
                self.rack_reported(r);
                self.set_state(AllReferenced);
            }
            (RackEmpty, Input::Rack(_)) | (DispatchEmpty, Input::Dispatch(_)) => {}

            (s, Input::PeerFailed(init_required)) if s != NotReferenced => {
                self.core.fail(None, init_required);
                self.set_state(NotReferenced);
            }
            (s, Input::Timeout) if s != NotReferenced => {
                self.halt();
                self.core.timed_out();
                self.set_state(NotReferenced);
            }
            (s, Input::Cancel) => {
                if s != NotReferenced {
                    self.halt();
                    self.set_state(NotReferenced);
                }
                self.core.cancel();
            }
            (_, Input::Acknowledge) => self.core.acknowledge(),

            (s, input) => match s.parent() {
                Some(parent) => self.handle(parent, input),
                None => ignored(self.core.id(), s.name(), &input),
            },
        }
    }

    /// Both axes answered: the press is up and the carriage is at rest.
    fn check_axes(&mut self) {
        match (self.press_up, self.carriage_at) {
            (true, Some(CarriageState::AtFrontPosition)) => {
                self.set_state(HomingState::RackDispatchHoming)
            }
            (true, Some(_)) => self.set_state(HomingState::CarriageMovingToFront),
            _ => debug!(
                press_up = self.press_up,
                carriage = ?self.carriage_at,
                "Homing waits for both axes"
            ),
        }
    }

    fn rack_reported(&self, rack: DicehalfRackState) {
        if rack == DicehalfRackState::RackEmpty {
            self.core.reporter().message(MessageCode::RackEmpty);
        }
    }

    fn dispatch_reported(&self, occupied: bool) {
        if occupied {
            self.core.reporter().message(MessageCode::DispatchOccupied);
        }
    }

    fn halt(&self) {
        self.core.send(&self.targets.carriage, EventKind::Stop);
        self.core.send(&self.targets.press, EventKind::Stop);
    }
}

impl Hsm for HomingService {
    type State = HomingState;

    fn machine(&self) -> &StateMachine<HomingState> {
        &self.sm
    }

    fn machine_mut(&mut self) -> &mut StateMachine<HomingState> {
        &mut self.sm
    }

    fn on_enter(&mut self, state: HomingState) {
        use HomingState::*;
        self.core.detail(state.name());
        match state {
            CarriageHoming => {
                self.press_up = false;
                self.press_commanded = false;
                self.carriage_at = None;
                self.core.send(&self.targets.press, EventKind::Update);
                self.core.send(&self.targets.carriage, EventKind::Update);
            }
            CarriageMovingToFront => {
                self.core.send(&self.targets.carriage, EventKind::MoveToFront);
            }
            RackDispatchHoming => {
                self.core.send(&self.targets.rack, EventKind::Update);
                self.core.send(&self.targets.dispatch, EventKind::Update);
            }
            AllReferenced => {
                self.core.done();
                self.set_state(NotReferenced);
            }
            NotReferenced | RackEmpty | DispatchEmpty => {}
        }
    }
}

impl Behavior for HomingService {
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
