//! Plate rack services: withdraw, refill and reset the stock of one rack.
//!
//! The first parameter selects the rack (1-based); the whole parameter list
//! is forwarded, the rack validates it and waits for the operator.

use modcell_common::station::codes::ErrorCode;

use super::{Request, ServiceCore, ignored, request};
use crate::composite::plate_rack::{REFILL_DONE, RESET_DONE, WITHDRAWAL_DONE};
use crate::runtime::active::{ActorRef, Behavior};
use crate::runtime::hsm::{Hsm, StateId, StateMachine};
use crate::runtime::message::{EventKind, Message, Parameters, Value, param_int};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MaterialOp {
    Provide,
    Refill,
    Reset,
}

impl MaterialOp {
    /// State the rack publishes when the job is finished.
    fn done_state(self) -> &'static str {
        match self {
            Self::Provide => WITHDRAWAL_DONE,
            Self::Refill => REFILL_DONE,
            Self::Reset => RESET_DONE,
        }
    }

    fn request(self, parameters: Parameters) -> EventKind {
        match self {
            Self::Provide => EventKind::Provide(parameters),
            Self::Refill => EventKind::Refill(parameters),
            Self::Reset => EventKind::Reset(parameters),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MaterialJobState {
    Idle,
    WaitingForRack,
}

impl StateId for MaterialJobState {
    fn all() -> &'static [Self] {
        &[Self::Idle, Self::WaitingForRack]
    }

    fn parent(self) -> Option<Self> {
        None
    }

    fn name(self) -> &'static str {
        match self {
            Self::Idle => "Idle",
            Self::WaitingForRack => "WaitingForRack",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Input {
    Request(Request),
    RackDone,
    RackFailed(bool),
}

pub struct MaterialService {
    core: ServiceCore,
    sm: StateMachine<MaterialJobState>,
    op: MaterialOp,
    racks: Vec<ActorRef>,
    /// Rack of the running job.
    active: Option<usize>,
}

impl MaterialService {
    pub fn new(core: ServiceCore, op: MaterialOp, racks: Vec<ActorRef>) -> Self {
        Self {
            core,
            sm: StateMachine::new("material_service", MaterialJobState::Idle),
            op,
            racks,
            active: None,
        }
    }

    fn active_rack(&self) -> Option<&ActorRef> {
        self.active.and_then(|i| self.racks.get(i))
    }

    fn classify(&self, message: Message) -> Option<Input> {
        if let Some(r) = request(&message) {
            return Some(Input::Request(r));
        }
        let Message::Topic(msg) = message else {
            return None;
        };
        if Some(msg.sender) != self.active_rack().map(ActorRef::id) {
            return None;
        }
        if msg.state() == Some(self.op.done_state()) {
            return Some(Input::RackDone);
        }
        msg.reports_error().map(Input::RackFailed)
    }

    /// Rack addressed by `parameters`, as an index into `racks`.
    fn select(&self, parameters: &[Value]) -> Option<usize> {
        let n = param_int(parameters, 0)?;
        let index = usize::try_from(n).ok()?.checked_sub(1)?;
        (index < self.racks.len()).then_some(index)
    }

    fn handle(&mut self, state: MaterialJobState, input: Input) {
        use MaterialJobState::*;
        match (state, input) {
            (
                Idle,
                Input::Request(Request::Execute {
                    service_index,
                    parameters,
                }),
            ) => {
                if !self.core.begin(service_index) {
                    return;
                }
                let parameters = parameters.unwrap_or_default();
                let Some(index) = self.select(&parameters) else {
                    self.core.fail(Some(ErrorCode::InvalidServiceParameters), false);
                    return;
                };
                self.active = Some(index);
                self.core.send(&self.racks[index], self.op.request(parameters));
                self.set_state(WaitingForRack);
            }
            (WaitingForRack, Input::RackDone) => {
                self.core.done();
                self.set_state(Idle);
            }
            (WaitingForRack, Input::RackFailed(init_required)) => {
                self.core.fail(None, init_required);
                self.set_state(Idle);
            }
            (WaitingForRack, Input::Request(Request::Timeout)) => {
                self.cancel_rack();
                self.core.timed_out();
                self.set_state(Idle);
            }
            (s, Input::Request(Request::Cancel)) => {
                if s == WaitingForRack {
                    self.cancel_rack();
                    self.set_state(Idle);
                }
                self.core.cancel();
            }
            (_, Input::Request(Request::Acknowledge)) => self.core.acknowledge(),
            (s, other) => ignored(self.core.id(), s.name(), &other),
        }
    }

    fn cancel_rack(&self) {
        if let Some(rack) = self.active_rack() {
            self.core.send(rack, EventKind::Cancel);
        }
    }
}

impl Hsm for MaterialService {
    type State = MaterialJobState;

    fn machine(&self) -> &StateMachine<MaterialJobState> {
        &self.sm
    }

    fn machine_mut(&mut self) -> &mut StateMachine<MaterialJobState> {
        &mut self.sm
    }

    fn on_enter(&mut self, state: MaterialJobState) {
        self.core.detail(state.name());
        if state == MaterialJobState::Idle {
            self.active = None;
        }
    }
}

impl Behavior for MaterialService {
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
