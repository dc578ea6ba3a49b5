//! Carriage between the front (dispatch) position and the rack position.
//!
//! Owns the front sensor, the rack sensor and the carriage motor. Clockwise
//! rotation moves towards the front, counter-clockwise towards the rack.
//! Every move is supervised by a timer; an expired move is an error that
//! requires re-initialization.

use std::sync::Arc;
use std::time::Duration;

use bitflags::bitflags;
use modcell_common::station::codes::ErrorCode;
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

bitflags! {
    /// Devices that reported `Initialized`.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct CarriageParts: u8 {
        const FRONT_SENSOR = 0b001;
        const RACK_SENSOR = 0b010;
        const MOTOR = 0b100;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CarriageState {
    NotInitialized,
    Initialization,
    NothingInit,
    FrontSensorInit,
    RackSensorInit,
    MotorInit,
    FrontRackSensorsInit,
    MotorFrontSensorInit,
    MotorRackSensorInit,
    EverythingIsInitialized,
    CheckCarriagePosition,
    UnknownPosition,
    FrontSensorOff,
    RackSensorOff,
    OutOfPosition,
    AtFrontPosition,
    AtRackPosition,
    Error,
}

impl CarriageState {
    /// Initialization substate matching the set of initialized devices.
    pub fn for_parts(parts: CarriageParts) -> Self {
        const FRONT: u8 = CarriageParts::FRONT_SENSOR.bits();
        const RACK: u8 = CarriageParts::RACK_SENSOR.bits();
        const MOTOR: u8 = CarriageParts::MOTOR.bits();
        match parts.bits() {
            0 => Self::NothingInit,
            FRONT => Self::FrontSensorInit,
            RACK => Self::RackSensorInit,
            MOTOR => Self::MotorInit,
            b if b == FRONT | RACK => Self::FrontRackSensorsInit,
            b if b == MOTOR | FRONT => Self::MotorFrontSensorInit,
            b if b == MOTOR | RACK => Self::MotorRackSensorInit,
            _ => Self::EverythingIsInitialized,
        }
    }

    /// Stable positions a service can wait for.
    pub fn is_resting(self) -> bool {
        matches!(
            self,
            Self::OutOfPosition | Self::AtFrontPosition | Self::AtRackPosition
        )
    }
}

impl StateId for CarriageState {
    fn all() -> &'static [Self] {
        &[
            Self::NotInitialized,
            Self::Initialization,
            Self::NothingInit,
            Self::FrontSensorInit,
            Self::RackSensorInit,
            Self::MotorInit,
            Self::FrontRackSensorsInit,
            Self::MotorFrontSensorInit,
            Self::MotorRackSensorInit,
            Self::EverythingIsInitialized,
            Self::CheckCarriagePosition,
            Self::UnknownPosition,
            Self::FrontSensorOff,
            Self::RackSensorOff,
            Self::OutOfPosition,
            Self::AtFrontPosition,
            Self::AtRackPosition,
            Self::Error,
        ]
    }

    fn parent(self) -> Option<Self> {
        match self {
            Self::NothingInit
            | Self::FrontSensorInit
            | Self::RackSensorInit
            | Self::MotorInit
            | Self::FrontRackSensorsInit
            | Self::MotorFrontSensorInit
            | Self::MotorRackSensorInit
            | Self::EverythingIsInitialized => Some(Self::Initialization),
            Self::UnknownPosition | Self::FrontSensorOff | Self::RackSensorOff => {
                Some(Self::CheckCarriagePosition)
            }
            _ => None,
        }
    }

    fn name(self) -> &'static str {
        match self {
            Self::NotInitialized => "NotInitialized",
            Self::Initialization => "Initialization",
            Self::NothingInit => "NothingInit",
            Self::FrontSensorInit => "FrontSensorInit",
            Self::RackSensorInit => "RackSensorInit",
            Self::MotorInit => "MotorInit",
            Self::FrontRackSensorsInit => "FrontRackSensorsInit",
            Self::MotorFrontSensorInit => "MotorFrontSensorInit",
            Self::MotorRackSensorInit => "MotorRackSensorInit",
            Self::EverythingIsInitialized => "EverythingIsInitialized",
            Self::CheckCarriagePosition => "CheckCarriagePosition",
            Self::UnknownPosition => "UnknownPosition",
            Self::FrontSensorOff => "FrontSensorOff",
            Self::RackSensorOff => "RackSensorOff",
            Self::OutOfPosition => "OutOfPosition",
            Self::AtFrontPosition => "AtFrontPosition",
            Self::AtRackPosition => "AtRackPosition",
            Self::Error => "Error",
        }
    }
}

/// Destination of a carriage move.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    Front,
    Rack,
}

/// Device actors owned by the carriage.
#[derive(Debug, Clone)]
pub struct CarriageDevices {
    pub front: ActorRef,
    pub rack: ActorRef,
    pub motor: ActorRef,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Input {
    Initialize,
    MoveToFront,
    MoveToRack,
    Stop,
    Update,
    Acknowledge,
    Timeout(Target),
    Ready(CarriageParts),
    DeviceFault(ActorId),
    Front(bool),
    Rack(bool),
    StationError,
    Estop,
}

pub struct Carriage {
    id: ActorId,
    sm: StateMachine<CarriageState>,
    publisher: Arc<Publisher>,
    reporter: Reporter,
    devices: CarriageDevices,
    to_front: MonitoringTimer,
    to_rack: MonitoringTimer,
    moving: Option<Target>,
    parts: CarriageParts,
    init_required: bool,
}

impl Carriage {
    pub fn new(
        me: ActorRef,
        publisher: Arc<Publisher>,
        reporter: Reporter,
        devices: CarriageDevices,
        move_timeout: Duration,
    ) -> Self {
        let id = me.id();
        let timer = |timer| {
            MonitoringTimer::posting(
                move_timeout,
                me.clone(),
                Event::new(EventKind::Timeout(timer), id),
            )
        };
        Self {
            id,
            sm: StateMachine::new("carriage", CarriageState::NotInitialized),
            publisher,
            reporter: reporter.for_actor(id),
            to_front: timer(TimerId::CarriageToFront),
            to_rack: timer(TimerId::CarriageToRack),
            devices,
            moving: None,
            parts: CarriageParts::empty(),
            init_required: false,
        }
    }

    /// Move currently supervised, if any.
    pub fn moving(&self) -> Option<Target> {
        self.moving
    }

    fn classify(&self, message: Message) -> Option<Input> {
        match message {
            Message::Event(event) => Some(match event.kind {
                EventKind::Initialize => Input::Initialize,
                EventKind::MoveToFront => Input::MoveToFront,
                EventKind::MoveToRack => Input::MoveToRack,
                EventKind::Stop => Input::Stop,
                EventKind::Update => Input::Update,
                EventKind::Acknowledge => Input::Acknowledge,
                EventKind::Timeout(TimerId::CarriageToFront) => Input::Timeout(Target::Front),
                EventKind::Timeout(TimerId::CarriageToRack) => Input::Timeout(Target::Rack),
                _ => return None,
            }),
            Message::Topic(msg) => {
                if let Some(signal) = station_signal(&msg) {
                    return Some(match signal {
                        StationSignal::Error => Input::StationError,
                        StationSignal::Acknowledge => Input::Acknowledge,
                        StationSignal::Estop => Input::Estop,
                    });
                }
                let (part, source) = if msg.sender == self.devices.front.id() {
                    (CarriageParts::FRONT_SENSOR, Some(Input::Front as fn(bool) -> Input))
                } else if msg.sender == self.devices.rack.id() {
                    (CarriageParts::RACK_SENSOR, Some(Input::Rack as fn(bool) -> Input))
                } else if msg.sender == self.devices.motor.id() {
                    (CarriageParts::MOTOR, None)
                } else {
                    return None;
                };
                if let Some(report) = device_report(&msg) {
                    return Some(match report {
                        DeviceReport::Initialized => Input::Ready(part),
                        DeviceReport::Fault => Input::DeviceFault(msg.sender),
                    });
                }
                source.zip(msg.level()).map(|(input, level)| input(level))
            }
        }
    }

    fn handle(&mut self, state: CarriageState, input: Input) {
        use CarriageState::*;
        match (state, input) {
            (Initialization, Input::Ready(part)) => {
                self.parts |= part;
                let next = CarriageState::for_parts(self.parts);
                if next != self.current() {
                    self.set_state(next);
                }
            }

            (UnknownPosition | FrontSensorOff | RackSensorOff, Input::Front(true)) => {
                self.set_state(AtFrontPosition)
            }
            (UnknownPosition | FrontSensorOff | RackSensorOff, Input::Rack(true)) => {
                self.set_state(AtRackPosition)
            }
            (UnknownPosition, Input::Front(false)) => self.set_state(FrontSensorOff),
            (UnknownPosition, Input::Rack(false)) => self.set_state(RackSensorOff),
            (FrontSensorOff, Input::Rack(false)) | (RackSensorOff, Input::Front(false)) => {
                self.set_state(OutOfPosition)
            }

            (OutOfPosition, Input::MoveToFront) => self.start_move(Target::Front),
            (OutOfPosition, Input::MoveToRack) => self.start_move(Target::Rack),
            (OutOfPosition, Input::Front(true)) if self.moving != Some(Target::Rack) => {
                self.set_state(AtFrontPosition)
            }
            (OutOfPosition, Input::Rack(true)) if self.moving != Some(Target::Front) => {
                self.set_state(AtRackPosition)
            }
            (OutOfPosition, Input::Stop) => self.halt(),
            (OutOfPosition, Input::Timeout(target)) if self.moving == Some(target) => {
                let code = match target {
                    Target::Rack => ErrorCode::CarriageMovingToRackTimeout,
                    Target::Front => ErrorCode::CarriageMovingToDispatchTimeout,
                };
                self.fail(code, true);
            }

            (AtFrontPosition, Input::MoveToRack) => {
                self.start_move(Target::Rack);
                self.set_state(OutOfPosition);
            }
            (AtRackPosition, Input::MoveToFront) => {
                self.start_move(Target::Front);
                self.set_state(OutOfPosition);
            }
            (AtFrontPosition, Input::MoveToFront) | (AtRackPosition, Input::MoveToRack) => {
                self.publish_state()
            }
            (AtFrontPosition, Input::Front(false)) | (AtRackPosition, Input::Rack(false)) => {
                self.set_state(OutOfPosition)
            }
            (AtFrontPosition | AtRackPosition, Input::Stop) => {
                self.devices.motor.send(EventKind::Stop, self.id)
            }

            (Error, Input::Acknowledge) => {
                if self.parts.is_all() {
                    self.set_state(CheckCarriagePosition);
                } else {
                    self.set_state(NotInitialized);
                }
            }
            (Error, Input::StationError | Input::Estop) => {
                if input == Input::Estop && !self.init_required {
                    self.init_required = true;
                    self.publish_state();
                }
            }

            (s, input) => match s.parent() {
                Some(parent) => self.handle(parent, input),
                None => self.handle_any(s, input),
            },
        }
    }

    fn handle_any(&mut self, state: CarriageState, input: Input) {
        match input {
            Input::Initialize => self.set_state(CarriageState::Initialization),
            Input::Update => self.publish_state(),
            Input::StationError | Input::Estop | Input::DeviceFault(_)
                if state == CarriageState::NotInitialized =>
            {
                debug!("Carriage not initialized, {:?} ignored", input);
            }
            Input::StationError => self.set_state(CarriageState::Error),
            Input::Estop => {
                self.init_required = true;
                self.set_state(CarriageState::Error);
            }
            Input::DeviceFault(device) => {
                warn!("Carriage device {} reported an error", device);
                self.fail(ErrorCode::DeviceFault, true);
            }
            Input::Timeout(_) => debug!("Stale carriage timeout ignored"),
            other => debug!(state = state.name(), "Carriage ignores {:?}", other),
        }
    }

    fn start_move(&mut self, target: Target) {
        self.moving = Some(target);
        let (timer, kind, detail) = match target {
            Target::Front => (&mut self.to_front, EventKind::RotateCw, "MovingToFront"),
            Target::Rack => (&mut self.to_rack, EventKind::RotateCcw, "MovingToRack"),
        };
        timer.start();
        self.devices.motor.send(kind, self.id);
        self.publisher.announce(Topic::Detail, detail);
    }

    fn halt(&mut self) {
        self.to_front.cancel();
        self.to_rack.cancel();
        self.moving = None;
        self.devices.motor.send(EventKind::Stop, self.id);
    }

    fn fail(&mut self, code: ErrorCode, init_required: bool) {
        self.init_required |= init_required;
        self.reporter.error(code);
        self.set_state(CarriageState::Error);
    }

    fn publish_state(&self) {
        let name = match self.current().top() {
            CarriageState::Error if self.init_required => ERROR_WITH_INIT,
            top => top.name(),
        };
        self.publisher.announce(Topic::State, name);
    }
}

impl Hsm for Carriage {
    type State = CarriageState;

    fn machine(&self) -> &StateMachine<CarriageState> {
        &self.sm
    }

    fn machine_mut(&mut self) -> &mut StateMachine<CarriageState> {
        &mut self.sm
    }

    fn on_enter(&mut self, state: CarriageState) {
        use CarriageState::*;
        if state.is_substate() {
            self.publisher.announce(Topic::Detail, state.name());
        }
        match state {
            NotInitialized => self.publish_state(),
            Initialization => {
                self.halt();
                self.parts = CarriageParts::empty();
                self.init_required = false;
                self.publish_state();
                for device in [&self.devices.front, &self.devices.rack, &self.devices.motor] {
                    device.send(EventKind::Initialize, self.id);
                }
                self.set_state(NothingInit);
            }
            EverythingIsInitialized => {
                self.publisher.announce(Topic::State, INITIALIZED);
                self.set_state(CheckCarriagePosition);
            }
            CheckCarriagePosition => {
                self.halt();
                self.publish_state();
                self.devices.front.send(EventKind::Update, self.id);
                self.devices.rack.send(EventKind::Update, self.id);
                self.set_state(UnknownPosition);
            }
            AtFrontPosition | AtRackPosition => {
                self.halt();
                self.publish_state();
            }
            OutOfPosition => self.publish_state(),
            Error => {
                self.halt();
                self.publish_state();
            }
            _ => {}
        }
    }
}

impl Behavior for Carriage {
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
        self.to_front.cancel();
        self.to_rack.cancel();
    }
}
