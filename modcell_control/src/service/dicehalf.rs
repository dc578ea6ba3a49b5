//! Dice-half rack services: take one dice-half out (`ProvideDicehalf`) or
//! tell the rack how many were put in (`RefillRack`).
//!
//! The rack validates every count itself. The service waits for the rack
//! to reach a fill state, forwards the request and completes once the rack
//! publishes the expected count followed by a fill state. The rack always
//! publishes its count before its state, so a rejected request shows up as
//! a count followed by `Error`.

use modcell_common::station::codes::ErrorCode;
use tracing::debug;

use super::{Peer, Request, ServiceCore, ignored, peer, request};
use crate::composite::dicehalf_rack::DicehalfRackState;
use crate::runtime::active::{ActorRef, Behavior};
use crate::runtime::hsm::{Hsm, StateId, StateMachine};
use crate::runtime::message::{EventKind, Message, Parameters, Topic, param_int};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DicehalfOp {
    Provide,
    Refill,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DicehalfJobState {
    Idle,
    CheckingRack,
    Adjusting,
}

impl StateId for DicehalfJobState {
    fn all() -> &'static [Self] {
        &[Self::Idle, Self::CheckingRack, Self::Adjusting]
    }

    fn parent(self) -> Option<Self> {
        None
    }

    fn name(self) -> &'static str {
        match self {
            Self::Idle => "Idle",
            Self::CheckingRack => "CheckingRack",
            Self::Adjusting => "Adjusting",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Input {
    Execute(u8, Option<Parameters>),
    Cancel,
    Timeout,
    Acknowledge,
    Rack(DicehalfRackState),
    RackFailed(bool),
    Count(i64),
}

pub struct DicehalfService {
    core: ServiceCore,
    sm: StateMachine<DicehalfJobState>,
    op: DicehalfOp,
    rack: ActorRef,
    /// Capacity of the rack; a full rack saturates any refill to it.
    maximum: u32,
    /// Count to set on refill.
    requested: i64,
    /// Last count the rack published before the request was sent.
    stored: Option<i64>,
    /// Count the rack must publish for the request to succeed.
    expected: Option<i64>,
    /// Count published since the request was sent.
    observed: Option<i64>,
}

impl DicehalfService {
    pub fn new(core: ServiceCore, op: DicehalfOp, rack: ActorRef, maximum: u32) -> Self {
        Self {
            core,
            sm: StateMachine::new("dicehalf_service", DicehalfJobState::Idle),
            op,
            rack,
            maximum,
            requested: 0,
            stored: None,
            expected: None,
            observed: None,
        }
    }

    /// Count the rack should end up with when acting from `rack`.
    fn expectation(&self, rack: DicehalfRackState) -> Option<i64> {
        match self.op {
            DicehalfOp::Provide => self.stored.map(|n| n - 1),
            DicehalfOp::Refill if rack == DicehalfRackState::RackFull => {
                Some(i64::from(self.maximum))
            }
            DicehalfOp::Refill => Some(self.requested),
        }
    }

    /// Whether the rack can take the request in `rack`.
    fn accepts(&self, rack: DicehalfRackState) -> bool {
        rack.is_resting()
            || (self.op == DicehalfOp::Provide && rack == DicehalfRackState::CheckRackFull)
    }

    fn classify(&self, message: Message) -> Option<Input> {
        if let Some(r) = request(&message) {
            return Some(match r {
                Request::Execute {
                    service_index,
                    parameters,
                } => Input::Execute(service_index, parameters),
                Request::Cancel => Input::Cancel,
                Request::Timeout => Input::Timeout,
                Request::Acknowledge => Input::Acknowledge,
            });
        }
        let Message::Topic(msg) = message else {
            return None;
        };
        if msg.sender != self.rack.id() {
            return None;
        }
        if msg.topic == Topic::NumberOfCurrentlyStoredDicehalves {
            return msg.value.as_int().map(Input::Count);
        }
        Some(match peer::<DicehalfRackState>(&msg)? {
            Peer::At(state) => Input::Rack(state),
            Peer::Failed { init_required } => Input::RackFailed(init_required),
        })
    }

    fn handle(&mut self, state: DicehalfJobState, input: Input) {
        use DicehalfJobState::*;
        match (state, input) {
            (Idle, Input::Execute(index, parameters)) => {
                if !self.core.begin(index) {
                    return;
                }
                if self.op == DicehalfOp::Refill {
                    match parameters.as_deref().and_then(|p| param_int(p, 0)) {
                        Some(n) => self.requested = n,
                        None => {
                            self.core.fail(Some(ErrorCode::InvalidServiceParameters), false);
                            return;
                        }
                    }
                }
                self.stored = None;
                self.set_state(CheckingRack);
            }

            (CheckingRack, Input::Count(n)) => self.stored = Some(n),

            (CheckingRack, Input::Rack(DicehalfRackState::NotInitialized)) => {
                self.core.fail(None, true);
                self.set_state(Idle);
            }
            (CheckingRack, Input::Rack(rack)) => {
                if self.accepts(rack) {
                    self.expected = self.expectation(rack);
                    self.set_state(Adjusting);
                } else {
                    debug!(rack = rack.name(), "Waiting for a fill state");
                }
            }

            (Adjusting, Input::Count(n)) => self.observed = Some(n),
            (Adjusting, Input::Rack(rack)) => match self.observed.take() {
                Some(n) if self.expected.is_none_or(|e| e == n) => {
                    debug!(count = n, rack = rack.name(), "Rack count updated");
                    self.core.done();
                    self.set_state(Idle);
                }
                Some(n) => debug!(count = n, expected = ?self.expected, "Count does not match"),
                None => debug!(rack = rack.name(), "Waiting for the rack count"),
            },

            (CheckingRack | Adjusting, Input::RackFailed(init_required)) => {
                self.core.fail(None, init_required);
                self.set_state(Idle);
            }
            (CheckingRack | Adjusting, Input::Timeout) => {
                self.core.timed_out();
                self.set_state(Idle);
            }
            (s, Input::Cancel) => {
                self.core.cancel();
                if s != Idle {
                    self.set_state(Idle);
                }
            }
            (_, Input::Acknowledge) => self.core.acknowledge(),

            (s, other) => ignored(self.core.id(), s.name(), &other),
        }
    }
}

impl Hsm for DicehalfService {
    type State = DicehalfJobState;

    fn machine(&self) -> &StateMachine<DicehalfJobState> {
        &self.sm
    }

    fn machine_mut(&mut self) -> &mut StateMachine<DicehalfJobState> {
        &mut self.sm
    }

    fn on_enter(&mut self, state: DicehalfJobState) {
        self.core.detail(state.name());
        match state {
            DicehalfJobState::Idle => {}
            DicehalfJobState::CheckingRack => self.core.send(&self.rack, EventKind::Update),
            DicehalfJobState::Adjusting => {
                self.observed = None;
                let kind = match self.op {
                    DicehalfOp::Provide => EventKind::DecRack,
                    DicehalfOp::Refill => EventKind::SetRack(self.requested),
                };
                self.core.send(&self.rack, kind);
            }
        }
    }
}

impl Behavior for DicehalfService {
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::active::{Mailbox, mailbox};
    use crate::runtime::message::{ActorId, ServiceKind, TopicMessage, Value};
    use crate::service::testing::Harness;

    const MAXIMUM: u32 = 12;

    fn service(op: DicehalfOp, kind: ServiceKind) -> (Harness, DicehalfService, Mailbox) {
        let h = Harness::new(ActorId::Service(kind));
        let (rack_ref, rack) = mailbox(ActorId::DicehalfRack, 8);
        let mut s = DicehalfService::new(h.core(), op, rack_ref, MAXIMUM);
        s.on_start();
        (h, s, rack)
    }

    fn count(n: u32) -> Message {
        TopicMessage::new(Topic::NumberOfCurrentlyStoredDicehalves, n, ActorId::DicehalfRack).into()
    }

    fn rack(state: DicehalfRackState) -> Message {
        Harness::state(ActorId::DicehalfRack, state.name())
    }

    /// What the rack publishes for every status update.
    fn status(s: &mut DicehalfService, n: u32, state: DicehalfRackState) {
        s.dispatch(count(n));
        s.dispatch(rack(state));
    }

    #[test]
    fn provide_decrements_a_filled_rack() {
        let (mut h, mut s, mut r) = service(DicehalfOp::Provide, ServiceKind::ProvideDicehalf);
        s.dispatch(Harness::execute(2, None));
        assert_eq!(r.drain_events(), [EventKind::Update]);
        status(&mut s, 4, DicehalfRackState::RackFilling);
        assert_eq!(r.drain_events(), [EventKind::DecRack]);
        s.dispatch(count(3));
        assert!(h.reports().is_empty());
        s.dispatch(rack(DicehalfRackState::RackFilling));
        assert_eq!(h.reports(), [EventKind::Done { service_index: 2 }]);
        assert_eq!(s.current(), DicehalfJobState::Idle);
    }

    #[test]
    fn provide_from_uncounted_rack_reports_the_rack_error() {
        let (mut h, mut s, mut r) = service(DicehalfOp::Provide, ServiceKind::ProvideDicehalf);
        s.dispatch(Harness::execute(2, None));
        status(&mut s, 0, DicehalfRackState::RackFilling);
        assert_eq!(r.drain_events(), [EventKind::Update, EventKind::DecRack]);
        // Rejected decrement: unchanged count, then the error state.
        s.dispatch(count(0));
        s.dispatch(Harness::state(ActorId::DicehalfRack, "Error"));
        assert_eq!(h.reports(), [EventKind::Error { init_required: false }]);
        assert_eq!(
            h.lifecycle(ActorId::Service(ServiceKind::ProvideDicehalf)),
            ["Ready", "Busy", "Error"]
        );
        assert_eq!(s.current(), DicehalfJobState::Idle);
    }

    #[test]
    fn provide_from_empty_rack_fails_with_the_rack() {
        let (mut h, mut s, mut r) = service(DicehalfOp::Provide, ServiceKind::ProvideDicehalf);
        s.dispatch(Harness::execute(2, None));
        status(&mut s, 0, DicehalfRackState::RackEmpty);
        assert_eq!(r.drain_events(), [EventKind::Update, EventKind::DecRack]);
        s.dispatch(count(0));
        s.dispatch(Harness::state(ActorId::DicehalfRack, "Error"));
        assert_eq!(h.reports(), [EventKind::Error { init_required: false }]);
    }

    #[test]
    fn refill_sets_the_requested_count() {
        let (mut h, mut s, mut r) = service(DicehalfOp::Refill, ServiceKind::RefillRack);
        s.dispatch(Harness::execute(3, Some(vec![Value::Int(6)])));
        status(&mut s, 0, DicehalfRackState::UnknownPosition);
        assert_eq!(s.current(), DicehalfJobState::CheckingRack);
        status(&mut s, 2, DicehalfRackState::RackFilling);
        assert_eq!(r.drain_events(), [EventKind::Update, EventKind::SetRack(6)]);
        status(&mut s, 6, DicehalfRackState::RackFilling);
        assert_eq!(h.reports(), [EventKind::Done { service_index: 3 }]);
    }

    #[test]
    fn refill_of_a_full_rack_expects_the_capacity() {
        let (mut h, mut s, mut r) = service(DicehalfOp::Refill, ServiceKind::RefillRack);
        s.dispatch(Harness::execute(3, Some(vec![Value::Int(6)])));
        status(&mut s, MAXIMUM, DicehalfRackState::RackFull);
        assert_eq!(r.drain_events(), [EventKind::Update, EventKind::SetRack(6)]);
        status(&mut s, MAXIMUM, DicehalfRackState::RackFull);
        assert_eq!(h.reports(), [EventKind::Done { service_index: 3 }]);
    }

    #[test]
    fn rejected_refill_is_not_done() {
        for requested in [-2, 0, 13] {
            let (mut h, mut s, _r) = service(DicehalfOp::Refill, ServiceKind::RefillRack);
            s.dispatch(Harness::execute(3, Some(vec![Value::Int(requested)])));
            status(&mut s, 0, DicehalfRackState::RackFilling);
            s.dispatch(count(0));
            s.dispatch(Harness::state(ActorId::DicehalfRack, "Error"));
            assert_eq!(
                h.reports(),
                [EventKind::Error { init_required: false }],
                "refill with {requested}"
            );
        }
    }

    #[test]
    fn refill_without_count_is_rejected() {
        let (mut h, mut s, mut r) = service(DicehalfOp::Refill, ServiceKind::RefillRack);
        s.dispatch(Harness::execute(3, None));
        assert_eq!(h.reports(), [EventKind::Error { init_required: false }]);
        assert_eq!(
            h.errors(ActorId::Service(ServiceKind::RefillRack)),
            [ErrorCode::InvalidServiceParameters.hex()]
        );
        assert!(r.drain().is_empty());
        assert_eq!(s.current(), DicehalfJobState::Idle);
    }

    #[test]
    fn uninitialized_rack_requires_initialization() {
        let (mut h, mut s, _r) = service(DicehalfOp::Provide, ServiceKind::ProvideDicehalf);
        s.dispatch(Harness::execute(2, None));
        s.dispatch(rack(DicehalfRackState::NotInitialized));
        assert_eq!(h.reports(), [EventKind::Error { init_required: true }]);
    }
}
