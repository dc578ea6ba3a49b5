//! Service actors.
//!
//! A service runs one scripted sequence on behalf of its user, the station.
//! It accepts `Execute`, reports exactly one `Done` or `Error` per
//! execution, and can be cancelled. The shared part of that contract lives
//! in [`ServiceCore`]; each service adds its own state machine for the
//! intermediate steps and publishes it on `Detail`.

use std::sync::Arc;
use std::time::Duration;

use modcell_common::station::codes::ErrorCode;
use tracing::{debug, info, warn};

use crate::runtime::active::ActorRef;
use crate::runtime::hsm::StateId;
use crate::runtime::message::{
    ActorId, Event, EventKind, Message, Parameters, TimerId, Topic, TopicMessage,
};
use crate::runtime::pubsub::Publisher;
use crate::runtime::report::Reporter;
use crate::runtime::timer::MonitoringTimer;

pub mod dicehalf;
pub mod homing;
pub mod init;
pub mod material;
pub mod position;
pub mod press;

/// Topics of every service publisher.
pub const SERVICE_TOPICS: &[Topic] = &[Topic::State, Topic::Detail];

/// Slot of the initialization service.
pub const INITIALIZE_SLOT: u8 = 0;

/// Index the homing service reports in `Done`; outside the command slots.
pub const HOMING_SLOT: u8 = 7;

/// Generic lifecycle, published on `State`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    Ready,
    Busy,
    Done,
    Error,
    Cancelled,
}

impl Lifecycle {
    pub const fn name(self) -> &'static str {
        match self {
            Self::Ready => "Ready",
            Self::Busy => "Busy",
            Self::Done => "Done",
            Self::Error => "Error",
            Self::Cancelled => "Cancelled",
        }
    }
}

/// Lifecycle bookkeeping shared by all services.
pub struct ServiceCore {
    id: ActorId,
    me: ActorRef,
    user: ActorRef,
    publisher: Arc<Publisher>,
    reporter: Reporter,
    timeout: Option<(MonitoringTimer, ErrorCode)>,
    lifecycle: Lifecycle,
    service_index: u8,
}

impl ServiceCore {
    pub fn new(me: ActorRef, user: ActorRef, publisher: Arc<Publisher>, reporter: Reporter) -> Self {
        let id = me.id();
        Self {
            id,
            me,
            user,
            publisher,
            reporter: reporter.for_actor(id),
            timeout: None,
            lifecycle: Lifecycle::Ready,
            service_index: 0,
        }
    }

    /// Supervise every execution with a timer reporting `code` on expiry.
    pub fn with_timeout(mut self, interval: Duration, code: ErrorCode) -> Self {
        let timer = MonitoringTimer::posting(
            interval,
            self.me.clone(),
            Event::new(EventKind::Timeout(TimerId::Service), self.id),
        );
        self.timeout = Some((timer, code));
        self
    }

    pub fn id(&self) -> ActorId {
        self.id
    }

    /// Own inbox, for timers of the concrete service.
    pub fn me(&self) -> &ActorRef {
        &self.me
    }

    pub fn reporter(&self) -> &Reporter {
        &self.reporter
    }

    pub fn lifecycle(&self) -> Lifecycle {
        self.lifecycle
    }

    pub fn is_busy(&self) -> bool {
        self.lifecycle == Lifecycle::Busy
    }

    /// Publish the initial lifecycle.
    pub fn start(&self) {
        self.publisher.announce(Topic::State, self.lifecycle.name());
    }

    /// Accept an execution. Returns `false` if one is already running.
    pub fn begin(&mut self, service_index: u8) -> bool {
        if self.is_busy() {
            warn!(service = %self.id, "Already busy, execute ignored");
            return false;
        }
        info!(service = %self.id, service_index, "Executing");
        self.service_index = service_index;
        if let Some((timer, _)) = self.timeout.as_mut() {
            timer.start();
        }
        self.set(Lifecycle::Busy);
        true
    }

    /// Report success to the user.
    pub fn done(&mut self) {
        if !self.is_busy() {
            return;
        }
        self.disarm();
        info!(service = %self.id, "Done");
        self.set(Lifecycle::Done);
        self.user.send(
            EventKind::Done {
                service_index: self.service_index,
            },
            self.id,
        );
        self.set(Lifecycle::Ready);
    }

    /// Report failure to the user, publishing `code` if given.
    pub fn fail(&mut self, code: Option<ErrorCode>, init_required: bool) {
        if !self.is_busy() {
            return;
        }
        self.disarm();
        if let Some(code) = code {
            self.reporter.error(code);
        }
        warn!(service = %self.id, init_required, "Failed");
        self.set(Lifecycle::Error);
        self.user.send(EventKind::Error { init_required }, self.id);
    }

    /// Drop the running execution without reporting to the user.
    pub fn cancel(&mut self) {
        self.disarm();
        if self.lifecycle == Lifecycle::Ready {
            return;
        }
        info!(service = %self.id, "Cancelled");
        self.set(Lifecycle::Cancelled);
        self.set(Lifecycle::Ready);
    }

    /// Handle expiry of the service timer. Returns `true` if the running
    /// execution failed because of it.
    pub fn timed_out(&mut self) -> bool {
        let code = match &self.timeout {
            Some((_, code)) if self.is_busy() => *code,
            _ => return false,
        };
        self.fail(Some(code), true);
        true
    }

    /// The station acknowledged, leave `Error`.
    pub fn acknowledge(&mut self) {
        if self.lifecycle == Lifecycle::Error {
            self.set(Lifecycle::Ready);
        }
    }

    pub fn detail(&self, text: &str) {
        self.publisher.announce(Topic::Detail, text);
    }

    pub fn send(&self, target: &ActorRef, kind: EventKind) {
        target.send(kind, self.id);
    }

    fn disarm(&mut self) {
        if let Some((timer, _)) = self.timeout.as_mut() {
            timer.cancel();
        }
    }

    fn set(&mut self, lifecycle: Lifecycle) {
        self.lifecycle = lifecycle;
        self.publisher.announce(Topic::State, lifecycle.name());
    }
}

// ─── Input helpers ──────────────────────────────────────────────────

/// Request every service understands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Request {
    Execute {
        service_index: u8,
        parameters: Option<Parameters>,
    },
    Cancel,
    Timeout,
    Acknowledge,
}

/// Classify the service-level part of `message`.
pub(crate) fn request(message: &Message) -> Option<Request> {
    match message {
        Message::Event(event) => match &event.kind {
            EventKind::Execute {
                service_index,
                parameters,
            } => Some(Request::Execute {
                service_index: *service_index,
                parameters: parameters.clone(),
            }),
            EventKind::Cancel => Some(Request::Cancel),
            EventKind::Timeout(TimerId::Service) => Some(Request::Timeout),
            EventKind::Acknowledge => Some(Request::Acknowledge),
            _ => None,
        },
        Message::Topic(msg)
            if msg.sender == ActorId::Station
                && msg.topic == Topic::Ack
                && msg.value.as_bool() == Some(true) =>
        {
            Some(Request::Acknowledge)
        }
        Message::Topic(_) => None,
    }
}

/// State report of a composite a service watches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Peer<S> {
    At(S),
    Failed { init_required: bool },
}

impl<S> Peer<S> {
    pub(crate) fn map<T>(self, f: impl FnOnce(S) -> T) -> Peer<T> {
        match self {
            Self::At(state) => Peer::At(f(state)),
            Self::Failed { init_required } => Peer::Failed { init_required },
        }
    }
}

pub(crate) fn peer<S: StateId>(message: &TopicMessage) -> Option<Peer<S>> {
    if let Some(init_required) = message.reports_error() {
        return Some(Peer::Failed { init_required });
    }
    message.state_as::<S>().map(Peer::At)
}

/// Log a message a service has no use for.
pub(crate) fn ignored(service: ActorId, state: &'static str, what: &dyn std::fmt::Debug) {
    debug!(%service, state, "Ignoring {:?}", what);
}
