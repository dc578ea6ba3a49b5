//! Pressing service (`Assemble`).
//!
//! Carriage to the rack, clamp and read the workpiece tag, press down until
//! the force sensor trips, dwell, press up, release and return the carriage
//! to the front. The carriage must stay in the clamping position from
//! clamping until the press is back up.

use std::time::Duration;

use modcell_common::station::codes::ErrorCode;
use tracing::info;

use super::{Peer, Request, ServiceCore, ignored, peer, request};
use crate::composite::carriage::CarriageState;
use crate::composite::press::PressState;
use crate::runtime::active::{ActorRef, Behavior};
use crate::runtime::hsm::{Hsm, StateId, StateMachine};
use crate::runtime::message::{Event, EventKind, Message, TimerId};
use crate::runtime::timer::MonitoringTimer;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PressJobState {
    WaitForJob,
    WaitClampingPos,
    Clamping,
    WaitPressingPos,
    Pressing,
    MovingUp,
    ReturningToFront,
}

impl PressJobState {
    /// Phases in which the carriage must hold the clamping position.
    fn needs_clamp_position(self) -> bool {
        matches!(
            self,
            Self::Clamping | Self::WaitPressingPos | Self::Pressing | Self::MovingUp
        )
    }
}

impl StateId for PressJobState {
    fn all() -> &'static [Self] {
        &[
            Self::WaitForJob,
            Self::WaitClampingPos,
            Self::Clamping,
            Self::WaitPressingPos,
            Self::Pressing,
            Self::MovingUp,
            Self::ReturningToFront,
        ]
    }

    fn parent(self) -> Option<Self> {
        None
    }

    fn name(self) -> &'static str {
        match self {
            Self::WaitForJob => "WaitForJob",
            Self::WaitClampingPos => "WaitClampingPos",
            Self::Clamping => "Clamping",
            Self::WaitPressingPos => "WaitPressingPos",
            Self::Pressing => "Pressing",
            Self::MovingUp => "MovingUp",
            Self::ReturningToFront => "ReturningToFront",
        }
    }
}

#[derive(Debug, Clone)]
pub struct PressJobTargets {
    pub carriage: ActorRef,
    pub press: ActorRef,
    pub clamp: ActorRef,
    pub nfc: ActorRef,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Input {
    Execute(u8),
    Cancel,
    Timeout,
    Acknowledge,
    ClampWaitOver,
    DwellOver,
    Carriage(CarriageState),
    Press(PressState),
    PeerFailed(bool),
    Tag(String),
}

pub struct PressService {
    core: ServiceCore,
    sm: StateMachine<PressJobState>,
    targets: PressJobTargets,
    clamp_wait: MonitoringTimer,
    dwell: MonitoringTimer,
    press_commanded: bool,
    workpiece: Option<String>,
}

impl PressService {
    pub fn new(
        core: ServiceCore,
        targets: PressJobTargets,
        clamp_wait: Duration,
        dwell: Duration,
    ) -> Self {
        let timer = |interval, id| {
            MonitoringTimer::posting(
                interval,
                core.me().clone(),
                Event::new(EventKind::Timeout(id), core.id()),
            )
        };
        let clamp_wait = timer(clamp_wait, TimerId::ClampWait);
        let dwell = timer(dwell, TimerId::PressingDwell);
        Self {
            core,
            sm: StateMachine::new("press_service", PressJobState::WaitForJob),
            targets,
            clamp_wait,
            dwell,
            press_commanded: false,
            workpiece: None,
        }
    }

    /// Tag of the workpiece read while clamping.
    pub fn workpiece(&self) -> Option<&str> {
        self.workpiece.as_deref()
    }

    fn classify(&self, message: Message) -> Option<Input> {
        if let Some(r) = request(&message) {
            return Some(match r {
                Request::Execute { service_index, .. } => Input::Execute(service_index),
                Request::Cancel => Input::Cancel,
                Request::Timeout => Input::Timeout,
                Request::Acknowledge => Input::Acknowledge,
            });
        }
        match message {
            Message::Event(event) => match event.kind {
                EventKind::Timeout(TimerId::ClampWait) => Some(Input::ClampWaitOver),
                EventKind::Timeout(TimerId::PressingDwell) => Some(Input::DwellOver),
                _ => None,
            },
            Message::Topic(msg) => {
                let t = &self.targets;
                if msg.sender == t.nfc.id() {
                    return msg
                        .value
                        .as_str()
                        .filter(|tag| !tag.is_empty())
                        .map(|tag| Input::Tag(tag.to_string()));
                }
                let report = if msg.sender == t.carriage.id() {
                    peer::<CarriageState>(&msg).map(|p| p.map(Input::Carriage))
                } else if msg.sender == t.press.id() {
                    peer::<PressState>(&msg).map(|p| p.map(Input::Press))
                } else {
                    None
                }?;
                Some(match report {
                    Peer::At(input) => input,
                    Peer::Failed { init_required } => Input::PeerFailed(init_required),
                })
            }
        }
    }

    fn handle(&mut self, state: PressJobState, input: Input) {
        use PressJobState::*;
        match (state, input) {
            (WaitForJob, Input::Execute(index)) => {
                if self.core.begin(index) {
                    self.set_state(WaitClampingPos);
                }
            }

            (WaitClampingPos, Input::Carriage(CarriageState::AtRackPosition)) => {
                self.set_state(Clamping)
            }
            (s, Input::Carriage(c)) if s.needs_clamp_position() => {
                if c != CarriageState::AtRackPosition {
                    self.abort();
                    self.core.fail(Some(ErrorCode::NotInClampPosError), true);
                    self.set_state(WaitForJob);
                }
            }

            (Clamping, Input::ClampWaitOver) => self.set_state(WaitPressingPos),

            (WaitPressingPos, Input::Press(PressState::InUpperPosition)) => {
                self.set_state(Pressing)
            }
            (WaitPressingPos, Input::Press(p)) if p.is_resting() => {
                if !self.press_commanded {
                    self.press_commanded = true;
                    self.core.send(&self.targets.press, EventKind::MoveUp);
                }
            }

            (Pressing, Input::Press(PressState::InPressingPosition)) => self.dwell.start(),
            (Pressing, Input::DwellOver) => self.set_state(MovingUp),

            (MovingUp, Input::Press(PressState::InUpperPosition)) => {
                self.set_state(ReturningToFront)
            }

            (ReturningToFront, Input::Carriage(CarriageState::AtFrontPosition)) => {
                self.core.done();
                self.set_state(WaitForJob);
            }

            (s, Input::Tag(tag)) if s != WaitForJob => {
                info!("Workpiece {}", tag);
                self.workpiece = Some(tag);
            }
            (s, Input::PeerFailed(init_required)) if s != WaitForJob => {
                self.abort();
                self.core.fail(None, init_required);
                self.set_state(WaitForJob);
            }
            (s, Input::Timeout) if s != WaitForJob => {
                self.abort();
                self.core.timed_out();
                self.set_state(WaitForJob);
            }
            (s, Input::Cancel) => {
                if s != WaitForJob {
                    self.abort();
                    self.set_state(WaitForJob);
                }
                self.core.cancel();
            }
            (_, Input::Acknowledge) => self.core.acknowledge(),

            (s, other) => ignored(self.core.id(), s.name(), &other),
        }
    }

    /// Stop both axes and release the workpiece.
    fn abort(&mut self) {
        self.clamp_wait.cancel();
        self.dwell.cancel();
        self.core.send(&self.targets.press, EventKind::Stop);
        self.core.send(&self.targets.carriage, EventKind::Stop);
        self.core.send(&self.targets.clamp, EventKind::Open);
    }
}

impl Hsm for PressService {
    type State = PressJobState;

    fn machine(&self) -> &StateMachine<PressJobState> {
        &self.sm
    }

    fn machine_mut(&mut self) -> &mut StateMachine<PressJobState> {
        &mut self.sm
    }

    fn on_enter(&mut self, state: PressJobState) {
        use PressJobState::*;
        self.core.detail(state.name());
        let t = &self.targets;
        match state {
            WaitForJob => {}
            WaitClampingPos => {
                self.workpiece = None;
                self.core.send(&t.carriage, EventKind::MoveToRack);
            }
            Clamping => {
                self.core.send(&t.clamp, EventKind::Close);
                self.core.send(&t.nfc, EventKind::Update);
                self.clamp_wait.start();
            }
            WaitPressingPos => {
                self.press_commanded = false;
                self.core.send(&t.press, EventKind::Update);
            }
            Pressing => self.core.send(&t.press, EventKind::MoveDown),
            MovingUp => self.core.send(&t.press, EventKind::MoveUp),
            ReturningToFront => {
                self.core.send(&t.clamp, EventKind::Open);
                self.core.send(&t.carriage, EventKind::MoveToFront);
            }
        }
    }

    fn on_exit(&mut self, state: PressJobState) {
        match state {
            PressJobState::Clamping => self.clamp_wait.cancel(),
            PressJobState::Pressing => self.dwell.cancel(),
            _ => {}
        }
    }
}

impl Behavior for PressService {
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

    fn on_stop(&mut self) {
        self.clamp_wait.cancel();
        self.dwell.cancel();
    }
}
