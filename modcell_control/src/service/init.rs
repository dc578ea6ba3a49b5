//! Initialization service.
//!
//! Sends `Initialize` to every target and completes once each of them has
//! published `State=Initialized`.

use std::collections::BTreeSet;

use tracing::debug;

use super::{Request, ServiceCore, ignored, request};
use crate::runtime::active::{ActorRef, Behavior};
use crate::runtime::hsm::{Hsm, StateId, StateMachine};
use crate::runtime::message::{ActorId, EventKind, Message};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InitState {
    Idle,
    Initializing,
}

impl StateId for InitState {
    fn all() -> &'static [Self] {
        &[Self::Idle, Self::Initializing]
    }

    fn parent(self) -> Option<Self> {
        None
    }

    fn name(self) -> &'static str {
        match self {
            Self::Idle => "Idle",
            Self::Initializing => "Initializing",
        }
    }
}

#[derive(Debug)]
enum Input {
    Request(Request),
    Initialized(ActorId),
    Failed(ActorId, bool),
}

pub struct InitService {
    core: ServiceCore,
    sm: StateMachine<InitState>,
    targets: Vec<ActorRef>,
    pending: BTreeSet<ActorId>,
}

impl InitService {
    pub fn new(core: ServiceCore, targets: Vec<ActorRef>) -> Self {
        Self {
            core,
            sm: StateMachine::new("init_service", InitState::Idle),
            targets,
            pending: BTreeSet::new(),
        }
    }

    /// Targets that have not reported yet.
    pub fn pending(&self) -> impl Iterator<Item = &ActorId> {
        self.pending.iter()
    }

    fn classify(&self, message: Message) -> Option<Input> {
        if let Some(r) = request(&message) {
            return Some(Input::Request(r));
        }
        let Message::Topic(msg) = message else {
            return None;
        };
        if !self.targets.iter().any(|t| t.id() == msg.sender) {
            return None;
        }
        if msg.reports_initialized() {
            Some(Input::Initialized(msg.sender))
        } else {
            msg.reports_error()
                .map(|init_required| Input::Failed(msg.sender, init_required))
        }
    }

    fn handle(&mut self, state: InitState, input: Input) {
        use InitState::*;
        match (state, input) {
            (Idle, Input::Request(Request::Execute { service_index, .. })) => {
                if self.core.begin(service_index) {
                    self.set_state(Initializing);
                }
            }
            (Initializing, Input::Initialized(id)) => {
                if self.pending.remove(&id) {
                    debug!("{} initialized, {} pending", id, self.pending.len());
                }
                if self.pending.is_empty() {
                    self.core.done();
                    self.set_state(Idle);
                }
            }
            (Initializing, Input::Failed(id, _)) => {
                debug!("{} failed during initialization", id);
                self.core.fail(None, true);
                self.set_state(Idle);
            }
            (Initializing, Input::Request(Request::Timeout)) => {
                self.core.timed_out();
                self.set_state(Idle);
            }
            (_, Input::Request(Request::Cancel)) => {
                self.core.cancel();
                if state != Idle {
                    self.set_state(Idle);
                }
            }
            (_, Input::Request(Request::Acknowledge)) => self.core.acknowledge(),
            (s, other) => ignored(self.core.id(), s.name(), &other),
        }
    }
}

impl Hsm for InitService {
    type State = InitState;

    fn machine(&self) -> &StateMachine<InitState> {
        &self.sm
    }

    fn machine_mut(&mut self) -> &mut StateMachine<InitState> {
        &mut self.sm
    }

    fn on_enter(&mut self, state: InitState) {
        self.core.detail(state.name());
        if state == InitState::Initializing {
            self.pending = self.targets.iter().map(ActorRef::id).collect();
            for target in &self.targets {
                self.core.send(target, EventKind::Initialize);
            }
        }
    }

    fn on_exit(&mut self, state: InitState) {
        if state == InitState::Initializing {
            self.pending.clear();
        }
    }
}

impl Behavior for InitService {
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
    use crate::runtime::message::{INITIALIZED, ServiceKind};
    use crate::service::INITIALIZE_SLOT;
    use crate::service::testing::Harness;

    const ID: ActorId = ActorId::Service(ServiceKind::Init);

    fn service(h: &Harness) -> (InitService, Vec<Mailbox>) {
        let (refs, boxes): (Vec<_>, Vec<_>) = [ActorId::Carriage, ActorId::Press]
            .into_iter()
            .map(|id| mailbox(id, 8))
            .unzip();
        let mut s = InitService::new(h.core(), refs);
        s.on_start();
        (s, boxes)
    }

    #[test]
    fn completes_when_every_target_reported() {
        let mut h = Harness::new(ID);
        let (mut s, mut targets) = service(&h);
        s.dispatch(Harness::execute(INITIALIZE_SLOT, None));
        for t in &mut targets {
            assert_eq!(t.drain_events(), [EventKind::Initialize]);
        }
        s.dispatch(Harness::state(ActorId::Carriage, INITIALIZED));
        s.dispatch(Harness::state(ActorId::Carriage, INITIALIZED));
        assert_eq!(s.pending().collect::<Vec<_>>(), [&ActorId::Press]);
        assert!(h.reports().is_empty());
        s.dispatch(Harness::state(ActorId::Press, INITIALIZED));
        assert_eq!(h.reports(), [EventKind::Done { service_index: 0 }]);
        assert_eq!(s.current(), InitState::Idle);
    }

    #[test]
    fn target_error_fails_with_init_required() {
        let mut h = Harness::new(ID);
        let (mut s, _targets) = service(&h);
        s.dispatch(Harness::execute(INITIALIZE_SLOT, None));
        s.dispatch(Harness::state(ActorId::Press, "ErrorWithInit"));
        assert_eq!(h.reports(), [EventKind::Error { init_required: true }]);
    }

    #[test]
    fn reports_outside_execution_are_ignored() {
        let mut h = Harness::new(ID);
        let (mut s, _targets) = service(&h);
        s.dispatch(Harness::state(ActorId::Press, INITIALIZED));
        s.dispatch(Harness::state(ActorId::DicehalfRack, INITIALIZED));
        assert!(h.reports().is_empty());
        assert_eq!(s.current(), InitState::Idle);
    }
}
