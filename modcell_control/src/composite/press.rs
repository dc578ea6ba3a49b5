//! Press: vertical axis with upper sensor, end switch and force sensor.
//!
//! Clockwise rotation moves up, counter-clockwise moves down. The press
//! normally stops in the pressing position when the force sensor trips; the
//! end switch below it is a fault while moving down. A reverse command that
//! arrives while a stroke is still running is latched and replayed once
//! the stroke ends.

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
    pub struct PressParts: u8 {
        const UPPER_SENSOR = 0b0001;
        const END_SWITCH = 0b0010;
        const FORCE_SENSOR = 0b0100;
        const MOTOR = 0b1000;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PressState {
    NotInitialized,
    Initialization,
    CheckPressPosition,
    UnknownPosition,
    UpSensorOff,
    DownSensorOff,
    OutOfPosition,
    InUpperPosition,
    InBottomPosition,
    InPressingPosition,
    Error,
}

impl PressState {
    /// Stable positions a service can wait for.
    pub fn is_resting(self) -> bool {
        matches!(
            self,
            Self::OutOfPosition
                | Self::InUpperPosition
                | Self::InBottomPosition
                | Self::InPressingPosition
        )
    }
}

impl StateId for PressState {
    fn all() -> &'static [Self] {
        &[
            Self::NotInitialized,
            Self::Initialization,
            Self::CheckPressPosition,
            Self::UnknownPosition,
            Self::UpSensorOff,
            Self::DownSensorOff,
            Self::OutOfPosition,
            Self::InUpperPosition,
            Self::InBottomPosition,
            Self::InPressingPosition,
            Self::Error,
        ]
    }

    fn parent(self) -> Option<Self> {
        match self {
            Self::UnknownPosition | Self::UpSensorOff | Self::DownSensorOff => {
                Some(Self::CheckPressPosition)
            }
            _ => None,
        }
    }

    fn name(self) -> &'static str {
        match self {
            Self::NotInitialized => "NotInitialized",
            Self::Initialization => "Initialization",
            Self::CheckPressPosition => "CheckPressPosition",
            Self::UnknownPosition => "UnknownPosition",
            Self::UpSensorOff => "UpSensorOff",
            Self::DownSensorOff => "DownSensorOff",
            Self::OutOfPosition => "OutOfPosition",
            Self::InUpperPosition => "InUpperPosition",
            Self::InBottomPosition => "InBottomPosition",
            Self::InPressingPosition => "InPressingPosition",
            Self::Error => "Error",
        }
    }
}

/// Direction of a press stroke.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stroke {
    Up,
    Down,
}

/// Device actors owned by the press.
#[derive(Debug, Clone)]
pub struct PressDevices {
    pub upper: ActorRef,
    pub end_switch: ActorRef,
    pub force: ActorRef,
    pub motor: ActorRef,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Input {
    Initialize,
    MoveUp,
    MoveDown,
    Stop,
    Update,
    Acknowledge,
    Timeout,
    Ready(PressParts),
    DeviceFault(ActorId),
    Upper(bool),
    EndSwitch(bool),
    Force(bool),
    StationError,
    Estop,
}

pub struct Press {
    id: ActorId,
    sm: StateMachine<PressState>,
    publisher: Arc<Publisher>,
    reporter: Reporter,
    devices: PressDevices,
    move_timer: MonitoringTimer,
    moving: Option<Stroke>,
    moveup_future: bool,
    movedown_future: bool,
    upper_on: bool,
    parts: PressParts,
    init_required: bool,
}

impl Press {
    pub fn new(
        me: ActorRef,
        publisher: Arc<Publisher>,
        reporter: Reporter,
        devices: PressDevices,
        move_timeout: Duration,
    ) -> Self {
        let id = me.id();
        Self {
            id,
            sm: StateMachine::new("press", PressState::NotInitialized),
            publisher,
            reporter: reporter.for_actor(id),
            devices,
            move_timer: MonitoringTimer::posting(
                move_timeout,
                me,
                Event::new(EventKind::Timeout(TimerId::PressMove), id),
            ),
            moving: None,
            moveup_future: false,
            movedown_future: false,
            upper_on: false,
            parts: PressParts::empty(),
            init_required: false,
        }
    }

    pub fn moving(&self) -> Option<Stroke> {
        self.moving
    }

    fn classify(&self, message: Message) -> Option<Input> {
        match message {
            Message::Event(event) => Some(match event.kind {
                EventKind::Initialize => Input::Initialize,
                EventKind::MoveUp => Input::MoveUp,
                EventKind::MoveDown => Input::MoveDown,
                EventKind::Stop => Input::Stop,
                EventKind::Update => Input::Update,
                EventKind::Acknowledge => Input::Acknowledge,
                EventKind::Timeout(TimerId::PressMove) => Input::Timeout,
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
                let d = &self.devices;
                let (part, source): (PressParts, Option<fn(bool) -> Input>) =
                    if msg.sender == d.upper.id() {
                        (PressParts::UPPER_SENSOR, Some(Input::Upper as fn(bool) -> Input))
                    } else if msg.sender == d.end_switch.id() {
                        (PressParts::END_SWITCH, Some(Input::EndSwitch as fn(bool) -> Input))
                    } else if msg.sender == d.force.id() {
                        (PressParts::FORCE_SENSOR, Some(Input::Force as fn(bool) -> Input))
                    } else if msg.sender == d.motor.id() {
                        (PressParts::MOTOR, None)
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

    fn handle(&mut self, state: PressState, input: Input) {
        use PressState::*;
        match (state, input) {
            (Initialization, Input::Ready(part)) => {
                self.parts |= part;
                if self.parts.is_all() {
                    self.publisher.announce(Topic::State, INITIALIZED);
                    self.set_state(CheckPressPosition);
                }
            }

            // Position check polls upper sensor, end switch, force sensor in turn.
            (UnknownPosition, Input::Upper(true)) => {
                self.upper_on = true;
                self.devices.end_switch.send(EventKind::Update, self.id);
            }
            (UnknownPosition, Input::Upper(false)) => self.set_state(UpSensorOff),
            (UnknownPosition, Input::EndSwitch(true)) if self.upper_on => {
                self.fail(ErrorCode::EndSwitchInUpperPos)
            }
            (UnknownPosition, Input::EndSwitch(false)) if self.upper_on => {
                self.set_state(InUpperPosition)
            }
            (UpSensorOff, Input::EndSwitch(true)) => self.set_state(InBottomPosition),
            (UpSensorOff, Input::EndSwitch(false)) => self.set_state(DownSensorOff),
            (DownSensorOff, Input::Force(true)) => self.set_state(InPressingPosition),
            (DownSensorOff, Input::Force(false)) => self.set_state(OutOfPosition),

            (OutOfPosition, Input::MoveUp) => self.request(Stroke::Up),
            (OutOfPosition, Input::MoveDown) => self.request(Stroke::Down),
            (OutOfPosition, Input::Upper(true)) if self.moving != Some(Stroke::Down) => {
                self.set_state(InUpperPosition)
            }
            (OutOfPosition, Input::Force(true)) if self.moving != Some(Stroke::Up) => {
                self.set_state(InPressingPosition)
            }
            (OutOfPosition, Input::EndSwitch(true)) => {
                if self.moving == Some(Stroke::Down) {
                    self.fail(ErrorCode::OnEndSwitchError);
                } else {
                    self.set_state(InBottomPosition);
                }
            }
            (OutOfPosition, Input::Stop) => self.halt(),
            (OutOfPosition, Input::Timeout) if self.moving.is_some() => {
                let code = match self.moving {
                    Some(Stroke::Up) => ErrorCode::PressMovingUpTimeout,
                    _ => ErrorCode::PressMovingDownTimeout,
                };
                self.fail(code);
            }

            (InUpperPosition, Input::MoveDown) => self.leave(Stroke::Down),
            (InBottomPosition | InPressingPosition, Input::MoveUp) => self.leave(Stroke::Up),
            (InUpperPosition, Input::MoveUp)
            | (InBottomPosition | InPressingPosition, Input::MoveDown) => {
                debug!("Press already at the end of that stroke");
                self.publish_state();
            }
            (InUpperPosition, Input::Upper(false)) => self.set_state(OutOfPosition),
            (InUpperPosition, Input::EndSwitch(true)) => self.fail(ErrorCode::EndSwitchInUpperPos),
            (InPressingPosition, Input::EndSwitch(true)) => self.fail(ErrorCode::OnEndSwitchError),
            (InBottomPosition, Input::EndSwitch(false)) => self.set_state(OutOfPosition),
            (InUpperPosition | InBottomPosition | InPressingPosition, Input::Stop) => {
                self.devices.motor.send(EventKind::Stop, self.id)
            }

            (Error, Input::Acknowledge) => {
                if self.parts.is_all() {
                    self.set_state(CheckPressPosition);
                } else {
                    self.set_state(NotInitialized);
                }
            }
            (Error, Input::StationError) => {}
            (Error, Input::Estop) => {
                if !self.init_required {
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

    fn handle_any(&mut self, state: PressState, input: Input) {
        match input {
            Input::Initialize => self.set_state(PressState::Initialization),
            Input::Update => self.publish_state(),
            Input::StationError | Input::Estop | Input::DeviceFault(_)
                if state == PressState::NotInitialized =>
            {
                debug!("Press not initialized, {:?} ignored", input);
            }
            Input::StationError => self.set_state(PressState::Error),
            Input::Estop => {
                self.init_required = true;
                self.set_state(PressState::Error);
            }
            Input::DeviceFault(device) => {
                warn!("Press device {} reported an error", device);
                self.fail(ErrorCode::DeviceFault);
            }
            Input::Timeout => debug!("Stale press timeout ignored"),
            other => debug!(state = state.name(), "Press ignores {:?}", other),
        }
    }

    /// Move command while out of position.
    fn request(&mut self, stroke: Stroke) {
        match self.moving {
            None => self.start_move(stroke),
            Some(current) if current == stroke && !self.reverse_latched(current) => {
                self.publish_state()
            }
            Some(_) => {
                match stroke {
                    Stroke::Up => self.moveup_future = true,
                    Stroke::Down => self.movedown_future = true,
                }
                debug!("Press latched {:?} until the running stroke ends", stroke);
                if self.moveup_future && self.movedown_future {
                    self.fail(ErrorCode::PressConflictingMoves);
                }
            }
        }
    }

    /// A command against the running `stroke` is waiting for its end.
    fn reverse_latched(&self, stroke: Stroke) -> bool {
        match stroke {
            Stroke::Up => self.movedown_future,
            Stroke::Down => self.moveup_future,
        }
    }

    fn leave(&mut self, stroke: Stroke) {
        self.start_move(stroke);
        self.set_state(PressState::OutOfPosition);
    }

    fn start_move(&mut self, stroke: Stroke) {
        self.moving = Some(stroke);
        self.move_timer.start();
        let (kind, detail) = match stroke {
            Stroke::Up => (EventKind::RotateCw, "MovingUp"),
            Stroke::Down => (EventKind::RotateCcw, "MovingDown"),
        };
        self.devices.motor.send(kind, self.id);
        self.publisher.announce(Topic::Detail, detail);
    }

    fn halt(&mut self) {
        self.move_timer.cancel();
        self.moving = None;
        self.devices.motor.send(EventKind::Stop, self.id);
    }

    /// Stroke end reached: stop, then replay a latched reverse command.
    fn arrive(&mut self, state: PressState) {
        self.halt();
        self.publish_state();
        let replay = match state {
            PressState::InUpperPosition => {
                self.moveup_future = false;
                std::mem::take(&mut self.movedown_future).then_some(Stroke::Down)
            }
            _ => {
                self.movedown_future = false;
                std::mem::take(&mut self.moveup_future).then_some(Stroke::Up)
            }
        };
        if let Some(stroke) = replay {
            debug!("Press replays latched {:?}", stroke);
            self.leave(stroke);
        }
    }

    fn fail(&mut self, code: ErrorCode) {
        self.init_required = true;
        self.reporter.error(code);
        self.set_state(PressState::Error);
    }

    fn publish_state(&self) {
        let name = match self.current().top() {
            PressState::Error if self.init_required => ERROR_WITH_INIT,
            top => top.name(),
        };
        self.publisher.announce(Topic::State, name);
    }
}

impl Hsm for Press {
    type State = PressState;

    fn machine(&self) -> &StateMachine<PressState> {
        &self.sm
    }

    fn machine_mut(&mut self) -> &mut StateMachine<PressState> {
        &mut self.sm
    }

    fn on_enter(&mut self, state: PressState) {
        use PressState::*;
        if state.is_substate() {
            self.publisher.announce(Topic::Detail, state.name());
        }
        match state {
            NotInitialized | OutOfPosition => self.publish_state(),
            Initialization => {
                self.halt();
                self.parts = PressParts::empty();
                self.init_required = false;
                self.publish_state();
                let d = &self.devices;
                for device in [&d.upper, &d.end_switch, &d.force, &d.motor] {
                    device.send(EventKind::Initialize, self.id);
                }
            }
            CheckPressPosition => {
                self.halt();
                self.moveup_future = false;
                self.movedown_future = false;
                self.publish_state();
                self.set_state(UnknownPosition);
            }
            UnknownPosition => {
                self.upper_on = false;
                self.devices.upper.send(EventKind::Update, self.id);
            }
            UpSensorOff => self.devices.end_switch.send(EventKind::Update, self.id),
            DownSensorOff => self.devices.force.send(EventKind::Update, self.id),
            InUpperPosition | InBottomPosition | InPressingPosition => self.arrive(state),
            Error => {
                self.halt();
                self.moveup_future = false;
                self.movedown_future = false;
                self.publish_state();
            }
        }
    }
}

impl Behavior for Press {
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
        self.move_timer.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::composite::COMPOSITE_TOPICS;
    use crate::runtime::active::{Mailbox, mailbox};
    use crate::runtime::message::{DeviceId, TopicMessage, Value};
    use crate::runtime::recorder::Recorder;

    const UPPER: ActorId = ActorId::Device(DeviceId::UpperSensor);
    const END: ActorId = ActorId::Device(DeviceId::EndSwitch);
    const FORCE: ActorId = ActorId::Device(DeviceId::ForceSensor);
    const MOTOR: ActorId = ActorId::Device(DeviceId::PressMotor);

    struct Fixture {
        press: Press,
        me: Mailbox,
        motor: Mailbox,
        end_switch: Mailbox,
        _others: (Mailbox, Mailbox),
        recorder: Recorder,
    }

    impl Fixture {
        fn new() -> Self {
            let (me_ref, me) = mailbox(ActorId::Press, 16);
            let (upper, upper_mb) = mailbox(UPPER, 16);
            let (end_switch, end_mb) = mailbox(END, 16);
            let (force, force_mb) = mailbox(FORCE, 16);
            let (motor, motor_mb) = mailbox(MOTOR, 16);
            let surface = Publisher::new(
                ActorId::Station,
                &[Topic::StationErrorCode, Topic::StationErrorDescription],
            );
            let publisher = Publisher::new(ActorId::Press, COMPOSITE_TOPICS);
            let recorder = Recorder::new();
            recorder.attach(&publisher).unwrap();
            recorder.attach(&surface).unwrap();
            let mut press = Press::new(
                me_ref,
                publisher,
                Reporter::new(surface, ActorId::Station),
                PressDevices {
                    upper,
                    end_switch,
                    force,
                    motor,
                },
                Duration::from_millis(800),
            );
            press.on_start();
            Self {
                press,
                me,
                motor: motor_mb,
                end_switch: end_mb,
                _others: (upper_mb, force_mb),
                recorder,
            }
        }

        fn event(&mut self, kind: EventKind) {
            self.press.dispatch(Event::new(kind, ActorId::Station).into());
        }

        fn topic(&mut self, sender: ActorId, topic: Topic, value: impl Into<Value>) {
            self.press.dispatch(TopicMessage::new(topic, value, sender).into());
        }

        fn initialized(&mut self) {
            self.event(EventKind::Initialize);
            for device in [UPPER, END, FORCE, MOTOR] {
                self.topic(device, Topic::State, INITIALIZED);
            }
            assert_eq!(self.press.current(), PressState::UnknownPosition);
        }

        fn in_upper(&mut self) {
            self.initialized();
            self.topic(UPPER, Topic::Value, true);
            self.topic(END, Topic::Value, false);
            self.motor.drain();
        }

        fn states(&self) -> Vec<String> {
            self.recorder.texts(ActorId::Press, Topic::State)
        }

        fn error_codes(&self) -> Vec<String> {
            self.recorder.texts(ActorId::Press, Topic::StationErrorCode)
        }
    }

    #[test]
    fn upper_sensor_on_waits_for_end_switch() {
        let mut f = Fixture::new();
        f.initialized();
        f.topic(UPPER, Topic::Value, true);
        assert_eq!(f.press.current(), PressState::UnknownPosition);
        assert!(f.end_switch.drain_events().contains(&EventKind::Update));
        f.topic(END, Topic::Value, false);
        assert_eq!(f.press.current(), PressState::InUpperPosition);
    }

    #[test]
    fn end_switch_in_upper_position_is_an_error() {
        let mut f = Fixture::new();
        f.initialized();
        f.topic(UPPER, Topic::Value, true);
        f.topic(END, Topic::Value, true);
        assert_eq!(f.press.current(), PressState::Error);
        assert_eq!(f.error_codes(), [ErrorCode::EndSwitchInUpperPos.hex()]);
        assert_eq!(f.states().last().unwrap(), ERROR_WITH_INIT);
    }

    #[test]
    fn lower_positions_are_classified() {
        let mut f = Fixture::new();
        f.initialized();
        f.topic(UPPER, Topic::Value, false);
        f.topic(END, Topic::Value, false);
        assert_eq!(f.press.current(), PressState::DownSensorOff);
        f.topic(FORCE, Topic::Value, true);
        assert_eq!(f.press.current(), PressState::InPressingPosition);

        let mut f = Fixture::new();
        f.initialized();
        f.topic(UPPER, Topic::Value, false);
        f.topic(END, Topic::Value, true);
        assert_eq!(f.press.current(), PressState::InBottomPosition);
    }

    #[test]
    fn pressing_stroke() {
        let mut f = Fixture::new();
        f.in_upper();
        f.event(EventKind::MoveDown);
        assert_eq!(f.press.current(), PressState::OutOfPosition);
        assert_eq!(f.press.moving(), Some(Stroke::Down));
        assert_eq!(f.motor.drain_events(), vec![EventKind::RotateCcw]);
        f.topic(UPPER, Topic::Value, false);
        f.topic(FORCE, Topic::Value, true);
        assert_eq!(f.press.current(), PressState::InPressingPosition);
        assert_eq!(f.motor.drain_events(), vec![EventKind::Stop]);
        f.event(EventKind::MoveUp);
        f.topic(FORCE, Topic::Value, false);
        f.topic(UPPER, Topic::Value, true);
        assert_eq!(f.press.current(), PressState::InUpperPosition);
    }

    #[test]
    fn end_switch_while_moving_down() {
        let mut f = Fixture::new();
        f.in_upper();
        f.event(EventKind::MoveDown);
        f.topic(END, Topic::Value, true);
        assert_eq!(f.press.current(), PressState::Error);
        assert_eq!(f.error_codes(), [ErrorCode::OnEndSwitchError.hex()]);
    }

    #[test]
    fn reverse_command_is_latched_and_replayed() {
        let mut f = Fixture::new();
        f.in_upper();
        f.event(EventKind::MoveDown);
        f.event(EventKind::MoveUp);
        assert_eq!(f.press.moving(), Some(Stroke::Down));
        f.topic(FORCE, Topic::Value, true);
        assert_eq!(f.press.current(), PressState::OutOfPosition);
        assert_eq!(f.press.moving(), Some(Stroke::Up));
        assert_eq!(
            f.motor.drain_events(),
            vec![EventKind::RotateCcw, EventKind::Stop, EventKind::RotateCw]
        );
        assert!(f.states().contains(&"InPressingPosition".to_string()));
    }

    #[test]
    fn conflicting_latches_fail() {
        let mut f = Fixture::new();
        f.in_upper();
        f.event(EventKind::MoveDown);
        f.event(EventKind::MoveUp);
        assert_eq!(f.press.current(), PressState::OutOfPosition);
        assert!(f.error_codes().is_empty());
        f.event(EventKind::MoveDown);
        assert_eq!(f.press.current(), PressState::Error);
        assert_eq!(f.error_codes(), [ErrorCode::PressConflictingMoves.hex()]);
    }

    #[test]
    fn repeated_stroke_command_is_not_latched() {
        let mut f = Fixture::new();
        f.in_upper();
        f.event(EventKind::MoveDown);
        f.event(EventKind::MoveDown);
        f.event(EventKind::MoveDown);
        assert_eq!(f.press.current(), PressState::OutOfPosition);
        assert_eq!(f.press.moving(), Some(Stroke::Down));
        assert!(f.error_codes().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn stroke_timeout() {
        let mut f = Fixture::new();
        f.in_upper();
        f.event(EventKind::MoveDown);
        tokio::time::sleep(Duration::from_millis(801)).await;
        while let Some(m) = f.me.try_next() {
            f.press.dispatch(m);
        }
        assert_eq!(f.press.current(), PressState::Error);
        assert_eq!(f.error_codes(), [ErrorCode::PressMovingDownTimeout.hex()]);
    }
}
