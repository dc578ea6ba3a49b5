//! Dice-half rack tracked by count.
//!
//! A top sensor sees the stack when the rack is full, a bottom sensor sees
//! whether anything is stored. The stored count is kept in software: an
//! insertion is counted when the top sensor rises and falls again before
//! the full-check debounce expires. A top sensor that stays on for the
//! debounce period means the rack is full.

use std::sync::Arc;
use std::time::Duration;

use bitflags::bitflags;
use modcell_common::station::codes::{ErrorCode, MessageCode};
use tracing::{debug, warn};

use super::{DeviceReport, StationSignal, device_report, station_signal};
use crate::runtime::active::{ActorRef, Behavior};
use crate::runtime::hsm::{Hsm, StateId, StateMachine};
use crate::runtime::message::{
    ActorId, ERROR_WITH_INIT, Event, EventKind, INITIALIZED, Message, TimerId, Topic,
};
use crate::runtime::pubsub::Publisher;
use crate::runtime::report::Reporter;
use crate::runtime::timer::MonitoringTimer;

/// Topics of the dice-half rack publisher.
pub const DICEHALF_RACK_TOPICS: &[Topic] = &[
    Topic::State,
    Topic::Detail,
    Topic::NumberOfCurrentlyStoredDicehalves,
];

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct RackParts: u8 {
        const TOP_SENSOR = 0b01;
        const BOTTOM_SENSOR = 0b10;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DicehalfRackState {
    NotInitialized,
    Initialization,
    NothingInit,
    TopSensorInit,
    BottomSensorInit,
    UnknownPosition,
    RackEmpty,
    RackFilling,
    CheckRackFull,
    RackFull,
    Error,
}

impl DicehalfRackState {
    /// Fill states a service can act on.
    pub fn is_resting(self) -> bool {
        matches!(self, Self::RackEmpty | Self::RackFilling | Self::RackFull)
    }
}

impl StateId for DicehalfRackState {
    fn all() -> &'static [Self] {
        &[
            Self::NotInitialized,
            Self::Initialization,
            Self::NothingInit,
            Self::TopSensorInit,
            Self::BottomSensorInit,
            Self::UnknownPosition,
            Self::RackEmpty,
            Self::RackFilling,
            Self::CheckRackFull,
            Self::RackFull,
            Self::Error,
        ]
    }

    fn parent(self) -> Option<Self> {
        match self {
            Self::NothingInit | Self::TopSensorInit | Self::BottomSensorInit => {
                Some(Self::Initialization)
            }
            _ => None,
        }
    }

    fn name(self) -> &'static str {
        match self {
            Self::NotInitialized => "NotInitialized",
            Self::Initialization => "Initialization",
            Self::NothingInit => "NothingInit",
            Self::TopSensorInit => "TopSensorInit",
            Self::BottomSensorInit => "BottomSensorInit",
            Self::UnknownPosition => "UnknownPosition",
            Self::RackEmpty => "RackEmpty",
            Self::RackFilling => "RackFilling",
            Self::CheckRackFull => "CheckRackFull",
            Self::RackFull => "RackFull",
            Self::Error => "Error",
        }
    }
}

#[derive(Debug, Clone)]
pub struct RackSensors {
    pub top: ActorRef,
    pub bottom: ActorRef,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Input {
    Initialize,
    Update,
    SetRack(i64),
    DecRack,
    Acknowledge,
    Timeout,
    Ready(RackParts),
    DeviceFault(ActorId),
    Top(bool),
    Bottom(bool),
    StationError,
}

pub struct DicehalfRack {
    id: ActorId,
    sm: StateMachine<DicehalfRackState>,
    publisher: Arc<Publisher>,
    reporter: Reporter,
    sensors: RackSensors,
    full_check: MonitoringTimer,
    count: u32,
    maximum: u32,
    top_level: Option<bool>,
    bottom_level: Option<bool>,
    parts: RackParts,
    init_required: bool,
}

impl DicehalfRack {
    pub fn new(
        me: ActorRef,
        publisher: Arc<Publisher>,
        reporter: Reporter,
        sensors: RackSensors,
        maximum: u32,
        debounce: Duration,
    ) -> Self {
        let id = me.id();
        Self {
            id,
            sm: StateMachine::new("dicehalf_rack", DicehalfRackState::NotInitialized),
            publisher,
            reporter: reporter.for_actor(id),
            sensors,
            full_check: MonitoringTimer::posting(
                debounce,
                me,
                Event::new(EventKind::Timeout(TimerId::RackFullCheck), id),
            ),
            count: 0,
            maximum,
            top_level: None,
            bottom_level: None,
            parts: RackParts::empty(),
            init_required: false,
        }
    }

    pub fn count(&self) -> u32 {
        self.count
    }

    fn classify(&self, message: Message) -> Option<Input> {
        match message {
            Message::Event(event) => Some(match event.kind {
                EventKind::Initialize => Input::Initialize,
                EventKind::Update => Input::Update,
                EventKind::SetRack(n) => Input::SetRack(n),
                EventKind::DecRack => Input::DecRack,
                EventKind::Acknowledge => Input::Acknowledge,
                EventKind::Timeout(TimerId::RackFullCheck) => Input::Timeout,
                _ => return None,
            }),
            Message::Topic(msg) => {
                match station_signal(&msg) {
                    Some(StationSignal::Error) => return Some(Input::StationError),
                    Some(StationSignal::Acknowledge) => return Some(Input::Acknowledge),
                    Some(StationSignal::Estop) | None => {}
                }
                let top = if msg.sender == self.sensors.top.id() {
                    true
                } else if msg.sender == self.sensors.bottom.id() {
                    false
                } else {
                    return None;
                };
                match device_report(&msg) {
                    Some(DeviceReport::Initialized) => Some(Input::Ready(if top {
                        RackParts::TOP_SENSOR
                    } else {
                        RackParts::BOTTOM_SENSOR
                    })),
                    Some(DeviceReport::Fault) => Some(Input::DeviceFault(msg.sender)),
                    None => {
                        let level = msg.level()?;
                        Some(if top { Input::Top(level) } else { Input::Bottom(level) })
                    }
                }
            }
        }
    }

    fn handle(&mut self, state: DicehalfRackState, input: Input) {
        use DicehalfRackState::*;
        match (state, input) {
            (Initialization, Input::Ready(part)) => {
                self.parts |= part;
                let next = if self.parts.is_all() {
                    UnknownPosition
                } else if self.parts.contains(RackParts::TOP_SENSOR) {
                    TopSensorInit
                } else {
                    BottomSensorInit
                };
                if next == UnknownPosition {
                    self.publisher.announce(Topic::State, INITIALIZED);
                }
                if next != self.current() {
                    self.set_state(next);
                }
            }

            (UnknownPosition, Input::Top(true)) => self.set_state(CheckRackFull),
            (UnknownPosition, Input::Top(false)) => {
                self.top_level = Some(false);
                self.classify_fill();
            }
            (UnknownPosition, Input::Bottom(level)) => {
                self.bottom_level = Some(level);
                self.classify_fill();
            }

            (RackEmpty | RackFilling, Input::Top(true)) => self.set_state(CheckRackFull),
            (RackEmpty, Input::Bottom(true)) => self.set_state(RackFilling),
            (RackEmpty, Input::DecRack) => self.fail(ErrorCode::RackEmptyDicehalfsNum),
            (RackEmpty, Input::SetRack(_)) => self.fail(ErrorCode::RackEmptyDicehalfsNum),

            (RackFilling, Input::Bottom(false)) => self.set_state(RackEmpty),
            (RackFilling, Input::SetRack(n)) => {
                if let Some(n) = self.validate(n) {
                    self.count = n;
                    self.publish_status();
                }
            }

            (CheckRackFull, Input::Top(false)) => {
                if self.count < self.maximum {
                    self.count += 1;
                } else {
                    self.reporter.message(MessageCode::WrongNumRackFull);
                }
                self.set_state(RackFilling);
            }
            (CheckRackFull, Input::Timeout) => self.set_state(RackFull),

            (RackFull, Input::Top(false)) => self.set_state(RackFilling),
            (RackFull, Input::SetRack(n)) => {
                if let Some(n) = self.validate(n) {
                    if n != self.maximum {
                        self.reporter.message(MessageCode::WrongNumRackFull);
                    }
                    self.count = self.maximum;
                    self.publish_status();
                }
            }

            (RackFilling | CheckRackFull | RackFull, Input::DecRack) => self.decrement(),

            (Error, Input::Acknowledge) => {
                if self.parts.is_all() {
                    self.set_state(UnknownPosition);
                } else {
                    self.set_state(NotInitialized);
                }
            }
            (Error, Input::StationError) => {}

            (s, input) => match s.parent() {
                Some(parent) => self.handle(parent, input),
                None => self.handle_any(s, input),
            },
        }
    }

    fn handle_any(&mut self, state: DicehalfRackState, input: Input) {
        match input {
            Input::Initialize => self.set_state(DicehalfRackState::Initialization),
            Input::Update => self.publish_status(),
            Input::StationError | Input::DeviceFault(_)
                if state == DicehalfRackState::NotInitialized =>
            {
                debug!("Rack not initialized, {:?} ignored", input);
            }
            Input::StationError => self.set_state(DicehalfRackState::Error),
            Input::DeviceFault(device) => {
                warn!("Rack sensor {} reported an error", device);
                self.init_required = true;
                self.fail(ErrorCode::DeviceFault);
            }
            Input::Timeout => debug!("Stale full-check timeout ignored"),
            other => debug!(state = state.name(), "Rack ignores {:?}", other),
        }
    }

    /// Classify once both sensors answered and the rack is not full.
    fn classify_fill(&mut self) {
        if let (Some(false), Some(bottom)) = (self.top_level, self.bottom_level) {
            self.set_state(if bottom {
                DicehalfRackState::RackFilling
            } else {
                DicehalfRackState::RackEmpty
            });
        }
    }

    /// Check a count set by an operator.
    fn validate(&mut self, n: i64) -> Option<u32> {
        let code = if n < 0 {
            ErrorCode::RackNegDicehalfsNum
        } else if n == 0 {
            ErrorCode::NotEmptyRack
        } else if n > i64::from(self.maximum) {
            ErrorCode::RackDicehalfsNumMaximum
        } else {
            return u32::try_from(n).ok();
        };
        self.fail(code);
        None
    }

    fn decrement(&mut self) {
        if self.count == 0 {
            self.fail(ErrorCode::RackEmptyDicehalfsNum);
        } else {
            self.count -= 1;
            self.publish_status();
        }
    }

    fn fail(&mut self, code: ErrorCode) {
        self.reporter.error(code);
        self.set_state(DicehalfRackState::Error);
    }

    /// Count first, then state.
    fn publish_status(&self) {
        self.publisher
            .announce(Topic::NumberOfCurrentlyStoredDicehalves, self.count);
        let name = match self.current().top() {
            DicehalfRackState::Error if self.init_required => ERROR_WITH_INIT,
            top => top.name(),
        };
        self.publisher.announce(Topic::State, name);
    }
}

impl Hsm for DicehalfRack {
    type State = DicehalfRackState;

    fn machine(&self) -> &StateMachine<DicehalfRackState> {
        &self.sm
    }

    fn machine_mut(&mut self) -> &mut StateMachine<DicehalfRackState> {
        &mut self.sm
    }

    fn on_enter(&mut self, state: DicehalfRackState) {
        use DicehalfRackState::*;
        if state.is_substate() {
            self.publisher.announce(Topic::Detail, state.name());
            return;
        }
        match state {
            Initialization => {
                self.full_check.cancel();
                self.parts = RackParts::empty();
                self.init_required = false;
                self.publish_status();
                self.sensors.top.send(EventKind::Initialize, self.id);
                self.sensors.bottom.send(EventKind::Initialize, self.id);
                self.set_state(NothingInit);
            }
            UnknownPosition => {
                self.top_level = None;
                self.bottom_level = None;
                self.publish_status();
                self.sensors.top.send(EventKind::Update, self.id);
                self.sensors.bottom.send(EventKind::Update, self.id);
            }
            CheckRackFull => {
                self.full_check.start();
                self.publish_status();
            }
            RackEmpty => {
                if self.count != 0 {
                    self.reporter.message(MessageCode::RackErrorByDiceCounting);
                    self.count = 0;
                }
                self.publish_status();
            }
            RackFull => {
                if self.count != self.maximum {
                    self.reporter.message(MessageCode::WrongNumRackFull);
                    self.count = self.maximum;
                }
                self.publish_status();
            }
            Error => {
                self.full_check.cancel();
                self.publish_status();
            }
            _ => self.publish_status(),
        }
    }

    fn on_exit(&mut self, state: DicehalfRackState) {
        if state == DicehalfRackState::CheckRackFull {
            self.full_check.cancel();
        }
    }
}

impl Behavior for DicehalfRack {
    fn on_start(&mut self) {
        self.start_machine();
    }

    fn dispatch(&mut self, message: Message) {
        match self.classify(message) {
            Some(input) => {
                let state = self.current();
                self.handle(state, input);
            }
            None => debug!(actor = %self.id, "Unhandled message"),
        }
    }

    fn on_stop(&mut self) {
        self.full_check.cancel();
    }
}
