//! Station supervisor.
//!
//! Owns the service table and routes operator commands to it. E-stop and
//! connection loss outrank every service: both cancel all services, latch
//! `init_required` and keep the station out of `Ready` until an operator
//! acknowledges the resulting `Error`.
//!
//! ```text
//! Starting → NotInitialized → Initialization → [Homing] → Ready ⇄ Running
//!                                                          ↓
//!   Estop / NoConnection (from anywhere) ───→ Error ─ Ack ─→ NotInitialized | Ready
//! ```

use std::sync::Arc;

use modcell_common::consts::{JOB_SLOTS, SERVICE_SLOTS};
use modcell_common::station::codes::{ErrorCode, MessageCode};
use tracing::{debug, info, warn};

use super::led::indication;
use super::{SAFETY_ACTIVATED, SAFETY_NOT_ACTIVATED};
use crate::device::blinker::BlinkPattern;
use crate::runtime::active::{ActorRef, Behavior};
use crate::runtime::hsm::{Hsm, StateId, StateMachine};
use crate::runtime::message::{
    ActorId, DeviceId, EventKind, Message, Parameters, ServiceKind, StationCommand, Topic,
    TopicMessage,
};
use crate::runtime::pubsub::Publisher;
use crate::runtime::report::Reporter;
use crate::service::{HOMING_SLOT, INITIALIZE_SLOT};

// ─── States ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StationState {
    Starting,
    NotInitialized,
    Initialization,
    Homing,
    Ready,
    Running,
    Error,
    Estop,
    NoConnection,
}

impl StationState {
    /// Value published on `StationState`.
    pub const fn public_name(self) -> &'static str {
        match self {
            Self::Starting => "Starting",
            Self::NotInitialized | Self::Initialization | Self::Homing => "Standby",
            Self::Ready => "Ready",
            Self::Running => "Running",
            Self::Error | Self::Estop => "Error",
            Self::NoConnection => "NoConnection",
        }
    }

    /// States in which maintenance commands reach the actuators.
    const fn allows_maintenance(self) -> bool {
        matches!(self, Self::NotInitialized | Self::Ready | Self::Error)
    }

    /// States a failing composite or service drives into `Error`.
    const fn is_operational(self) -> bool {
        matches!(
            self,
            Self::Initialization | Self::Homing | Self::Ready | Self::Running
        )
    }
}

impl StateId for StationState {
    fn all() -> &'static [Self] {
        &[
            Self::Starting,
            Self::NotInitialized,
            Self::Initialization,
            Self::Homing,
            Self::Ready,
            Self::Running,
            Self::Error,
            Self::Estop,
            Self::NoConnection,
        ]
    }

    fn parent(self) -> Option<Self> {
        None
    }

    fn name(self) -> &'static str {
        match self {
            Self::Starting => "Starting",
            Self::NotInitialized => "NotInitialized",
            Self::Initialization => "Initialization",
            Self::Homing => "Homing",
            Self::Ready => "Ready",
            Self::Running => "Running",
            Self::Error => "Error",
            Self::Estop => "Estop",
            Self::NoConnection => "NoConnection",
        }
    }
}

// ─── Service table ──────────────────────────────────────────────────

/// Services bound to the station's slots.
///
/// Slot 0 is initialization, slots 1..=6 are the `serviceN` commands.
/// Homing is kept outside the slots and reports [`HOMING_SLOT`].
#[derive(Debug, Clone, Default)]
pub struct ServiceTable {
    slots: [Option<(ServiceKind, ActorRef)>; SERVICE_SLOTS],
    homing: Option<ActorRef>,
}

impl ServiceTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `service` to `slot`. Out-of-range slots are rejected.
    pub fn bind(&mut self, slot: u8, kind: ServiceKind, service: ActorRef) -> bool {
        match self.slots.get_mut(usize::from(slot)) {
            Some(entry) => {
                *entry = Some((kind, service));
                true
            }
            None => {
                warn!(slot, "Service slot out of range, {} not bound", kind);
                false
            }
        }
    }

    pub fn bind_homing(&mut self, service: ActorRef) {
        self.homing = Some(service);
    }

    pub fn get(&self, slot: u8) -> Option<&ActorRef> {
        if slot == HOMING_SLOT {
            return self.homing.as_ref();
        }
        self.slots
            .get(usize::from(slot))?
            .as_ref()
            .map(|(_, service)| service)
    }

    /// Slot a service kind is bound to.
    pub fn slot_of(&self, kind: ServiceKind) -> Option<u8> {
        self.slots
            .iter()
            .position(|s| matches!(s, Some((k, _)) if *k == kind))
            .and_then(|i| u8::try_from(i).ok())
    }

    pub fn has_homing(&self) -> bool {
        self.homing.is_some()
    }

    /// Every bound service, homing included.
    pub fn all(&self) -> impl Iterator<Item = &ActorRef> {
        self.slots
            .iter()
            .flatten()
            .map(|(_, service)| service)
            .chain(self.homing.as_ref())
    }
}

// ─── Station ────────────────────────────────────────────────────────

/// Devices the station drives itself.
#[derive(Debug, Clone)]
pub struct StationDevices {
    pub led: ActorRef,
    pub blinker: ActorRef,
    pub safety: ActorRef,
    /// Press motor, target of `MaintenanceMotor*`.
    pub press_motor: Option<ActorRef>,
    /// Carriage, target of `MaintenanceCarriageTo*`.
    pub carriage: Option<ActorRef>,
}

#[derive(Debug, Clone, Copy)]
pub struct StationSettings {
    pub homing_required: bool,
    pub blink: BlinkPattern,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Input {
    Initialize,
    Service(u8, Option<Parameters>),
    Homing,
    Done(u8),
    ServiceError(bool),
    Acknowledge,
    Estop,
    EstopOk,
    NoConn,
    ConnOk,
    Fatal,
    CancelService,
    Maintenance(StationCommand),
    Safety(bool),
    SafetyFault,
    CompositeFailed(ActorId, bool),
}

pub struct Station {
    sm: StateMachine<StationState>,
    publisher: Arc<Publisher>,
    reporter: Reporter,
    devices: StationDevices,
    services: ServiceTable,
    settings: StationSettings,
    init_required: bool,
    estop: bool,
    noconn: bool,
    safety_active: bool,
    /// Code reported on the next `Estop` entry.
    stop_cause: ErrorCode,
    /// Slot of the service currently executing.
    running: Option<u8>,
}

impl Station {
    pub const ID: ActorId = ActorId::Station;

    pub fn new(
        publisher: Arc<Publisher>,
        reporter: Reporter,
        devices: StationDevices,
        services: ServiceTable,
        settings: StationSettings,
    ) -> Self {
        Self {
            sm: StateMachine::new("station", StationState::Starting),
            publisher,
            reporter: reporter.for_actor(Self::ID),
            devices,
            services,
            settings,
            init_required: true,
            estop: false,
            noconn: false,
            safety_active: false,
            stop_cause: ErrorCode::Estop,
            running: None,
        }
    }

    pub fn init_required(&self) -> bool {
        self.init_required
    }

    fn classify(&self, message: Message) -> Option<Input> {
        match message {
            Message::Event(event) => match event.kind {
                EventKind::Command {
                    command,
                    parameters,
                } => self.command(command, parameters),
                EventKind::Done { service_index } => Some(Input::Done(service_index)),
                EventKind::Error { init_required } => Some(Input::ServiceError(init_required)),
                other => {
                    debug!("Station ignores event {:?}", other);
                    None
                }
            },
            Message::Topic(msg) => self.observe(&msg),
        }
    }

    fn command(&self, command: StationCommand, parameters: Option<Parameters>) -> Option<Input> {
        use StationCommand as C;
        Some(match command {
            C::Initialize => Input::Initialize,
            C::Service(index) => Input::Service(index, parameters),
            C::ServiceDone(index) => Input::Done(index),
            C::Ack => Input::Acknowledge,
            C::Estop => Input::Estop,
            C::EstopOk => Input::EstopOk,
            C::NoConn => Input::NoConn,
            C::ConnOk => Input::ConnOk,
            C::FatalError => Input::Fatal,
            C::CancelService => Input::CancelService,
            C::Homing => Input::Homing,
            c if c.is_maintenance() => Input::Maintenance(c),
            c => {
                let kind = c.service_kind()?;
                match self.services.slot_of(kind) {
                    Some(slot) => Input::Service(slot, parameters),
                    None => {
                        warn!("{} is not available on this station", c);
                        return None;
                    }
                }
            }
        })
    }

    fn observe(&self, msg: &TopicMessage) -> Option<Input> {
        match msg.sender {
            ActorId::Device(DeviceId::SafetySwitch) => {
                if msg.reports_error().is_some() {
                    Some(Input::SafetyFault)
                } else {
                    msg.level().map(Input::Safety)
                }
            }
            ActorId::Carriage | ActorId::Press | ActorId::DicehalfRack | ActorId::PlateRack(_) => {
                msg.reports_error()
                    .map(|init_required| Input::CompositeFailed(msg.sender, init_required))
            }
            _ => None,
        }
    }

    fn handle(&mut self, state: StationState, input: Input) {
        use StationState::*;
        match (state, input) {
            (Starting, Input::Safety(false)) => {
                self.safety_active = false;
                self.publisher
                    .announce(Topic::StationSafetyState, SAFETY_NOT_ACTIVATED);
                self.set_state(NotInitialized);
            }

            (NotInitialized | Ready, Input::Initialize) => self.set_state(Initialization),

            (Initialization, Input::Done(INITIALIZE_SLOT)) => {
                self.init_required = false;
                if self.settings.homing_required && self.services.has_homing() {
                    self.set_state(Homing);
                } else {
                    self.set_state(Ready);
                }
            }
            (Homing, Input::Done(HOMING_SLOT)) => self.set_state(Ready),
            (Initialization | Homing, Input::CancelService) => {
                self.cancel_running();
                self.set_state(NotInitialized);
            }

            (Ready, Input::Service(index, parameters)) => self.start_service(index, parameters),
            (Ready, Input::Homing) => {
                if self.services.has_homing() {
                    self.set_state(Homing);
                } else {
                    warn!("No homing service on this station");
                }
            }
            (Running, Input::Done(index)) if self.running == Some(index) => {
                self.set_state(Ready)
            }
            (Running, Input::CancelService) => {
                self.cancel_running();
                self.set_state(Ready);
            }
            (Running, Input::Service(index, _)) => {
                warn!(index, "Service {:?} still running, request ignored", self.running);
            }

            (Error, Input::Acknowledge) => {
                self.publisher.announce(Topic::Ack, true);
                self.reporter.clear();
                if self.init_required {
                    self.reporter.message(MessageCode::InitializationRequired);
                    self.set_state(NotInitialized);
                } else {
                    self.set_state(Ready);
                }
            }

            (Estop, Input::EstopOk) => {
                if self.safety_active {
                    warn!("Safety switch still activated, EstopOk ignored");
                } else {
                    self.release_estop();
                }
            }
            (Estop, Input::Safety(false)) => {
                self.safety_active = false;
                self.release_estop();
            }
            (NoConnection, Input::ConnOk) => {
                self.noconn = false;
                self.set_state(Error);
            }

            (s, input) => self.handle_any(s, input),
        }
    }

    /// Inputs with the same effect in every state.
    fn handle_any(&mut self, state: StationState, input: Input) {
        use StationState::*;
        match input {
            Input::Safety(true) => {
                self.safety_active = true;
                self.stop_cause = ErrorCode::Estop;
                if state != Estop {
                    self.set_state(Estop);
                }
            }
            Input::Safety(false) => {
                self.safety_active = false;
                self.publisher
                    .announce(Topic::StationSafetyState, SAFETY_NOT_ACTIVATED);
            }
            Input::SafetyFault => {
                self.stop_cause = ErrorCode::DeviceFault;
                if state == Estop {
                    self.reporter.error(ErrorCode::DeviceFault);
                } else {
                    self.set_state(Estop);
                }
            }
            Input::Estop if state != Estop => {
                self.stop_cause = ErrorCode::Estop;
                self.set_state(Estop);
            }
            Input::Fatal => {
                self.stop_cause = ErrorCode::FatalError;
                if state == Estop {
                    self.reporter.error(ErrorCode::FatalError);
                } else {
                    self.set_state(Estop);
                }
            }
            Input::NoConn => {
                self.noconn = true;
                if !matches!(state, Estop | NoConnection) {
                    self.set_state(NoConnection);
                }
            }
            Input::ServiceError(init_required) => {
                self.init_required |= init_required;
                if state.is_operational() {
                    self.set_state(Error);
                }
            }
            Input::CompositeFailed(sender, init_required) => {
                self.init_required |= init_required;
                debug!(%sender, init_required, "Composite failed");
                if state == Ready {
                    self.set_state(Error);
                }
            }
            Input::Maintenance(command) if state.allows_maintenance() => self.maintain(command),
            Input::Maintenance(command) => {
                warn!(state = state.name(), "{} not allowed", command);
            }
            Input::Service(index, _) => {
                warn!(index, state = state.name(), "Station not ready, service ignored");
            }
            other => debug!(state = state.name(), "Station ignores {:?}", other),
        }
    }

    // ─── Actions ────────────────────────────────────────────────────

    fn start_service(&mut self, index: u8, parameters: Option<Parameters>) {
        if !(1..SERVICE_SLOTS as u8).contains(&index) {
            warn!(index, "Unknown service index ignored");
            return;
        }
        if self.execute(index, parameters) {
            self.set_state(StationState::Running);
        } else if index <= JOB_SLOTS {
            warn!(index, "No service registered for job slot");
            self.reporter.error(ErrorCode::ServiceNotRegistered);
            self.set_state(StationState::Error);
        } else {
            info!(index, "No service bound to slot, request ignored");
        }
    }

    /// Send `Execute` to the service of `slot`. Returns `false` if unbound.
    fn execute(&mut self, slot: u8, parameters: Option<Parameters>) -> bool {
        let Some(service) = self.services.get(slot) else {
            return false;
        };
        service.send(
            EventKind::Execute {
                service_index: slot,
                parameters,
            },
            Self::ID,
        );
        self.running = Some(slot);
        true
    }

    fn cancel_running(&mut self) {
        if let Some(service) = self.running.take().and_then(|slot| self.services.get(slot)) {
            service.send(EventKind::Cancel, Self::ID);
        }
    }

    fn cancel_all(&mut self) {
        self.running = None;
        for service in self.services.all() {
            service.send(EventKind::Cancel, Self::ID);
        }
        if let Some(motor) = &self.devices.press_motor {
            motor.send(EventKind::Stop, Self::ID);
        }
        if let Some(carriage) = &self.devices.carriage {
            carriage.send(EventKind::Stop, Self::ID);
        }
    }

    fn release_estop(&mut self) {
        self.estop = false;
        self.publisher
            .announce(Topic::StationSafetyState, SAFETY_NOT_ACTIVATED);
        self.set_state(StationState::Error);
    }

    fn maintain(&self, command: StationCommand) {
        use StationCommand as C;
        let (target, kind) = match command {
            C::MaintenanceMotorCw => (&self.devices.press_motor, EventKind::RotateCw),
            C::MaintenanceMotorCcw => (&self.devices.press_motor, EventKind::RotateCcw),
            C::MaintenanceMotorStop => (&self.devices.press_motor, EventKind::Stop),
            C::MaintenanceCarriageToRack => (&self.devices.carriage, EventKind::MoveToRack),
            C::MaintenanceCarriageToFront => (&self.devices.carriage, EventKind::MoveToFront),
            C::MaintenanceCarriageToStop => (&self.devices.carriage, EventKind::Stop),
            other => {
                debug!("{} is not a maintenance command", other);
                return;
            }
        };
        match target {
            Some(target) => {
                info!("Maintenance: {}", command);
                target.send(kind, Self::ID);
            }
            None => warn!("{} has no target on this station", command),
        }
    }

    fn indicate(&self, state: StationState) {
        let shown = indication(state);
        self.devices
            .led
            .send(EventKind::Color(shown.color), Self::ID);
        let blink = if shown.blinking {
            EventKind::BlinkStart(self.settings.blink)
        } else {
            EventKind::BlinkStop
        };
        self.devices.blinker.send(blink, Self::ID);
    }
}

impl Hsm for Station {
    type State = StationState;

    fn machine(&self) -> &StateMachine<StationState> {
        &self.sm
    }

    fn machine_mut(&mut self) -> &mut StateMachine<StationState> {
        &mut self.sm
    }

    fn on_enter(&mut self, state: StationState) {
        use StationState::*;
        // Latched faults take precedence, connection loss first.
        if state == Error {
            if self.noconn {
                self.set_state(NoConnection);
                return;
            }
            if self.estop {
                self.set_state(Estop);
                return;
            }
        }

        info!("Station {}", state.name());
        self.publisher
            .announce(Topic::StationState, state.public_name());
        self.publisher
            .announce(Topic::StationStateMaintenance, state.name());

        if state == Starting {
            for device in [&self.devices.led, &self.devices.blinker, &self.devices.safety] {
                device.send(EventKind::Initialize, Self::ID);
            }
            self.devices.safety.send(EventKind::Update, Self::ID);
        }
        self.indicate(state);

        match state {
            Initialization => {
                if !self.execute(INITIALIZE_SLOT, None) {
                    warn!("No initialization service bound");
                    self.init_required = false;
                    self.set_state(Ready);
                }
            }
            Homing => {
                if !self.execute(HOMING_SLOT, None) {
                    self.set_state(Ready);
                }
            }
            Ready | NotInitialized => self.running = None,
            Estop => {
                self.estop = true;
                self.init_required = true;
                self.cancel_all();
                self.reporter.error(self.stop_cause);
                if self.safety_active {
                    self.publisher
                        .announce(Topic::StationSafetyState, SAFETY_ACTIVATED);
                }
            }
            NoConnection => {
                self.init_required = true;
                self.cancel_all();
                self.reporter.error(ErrorCode::NoConnection);
            }
            Error => self.running = None,
            Starting | Running => {}
        }
    }
}

impl Behavior for Station {
    fn on_start(&mut self) {
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
    use std::time::Duration;

    use super::*;
    use crate::device::led::LedColor;
    use crate::runtime::active::{Mailbox, mailbox};
    use crate::runtime::message::{Event, Value};
    use crate::runtime::recorder::Recorder;
    use crate::station::STATION_TOPICS;

    const BLINK: BlinkPattern =
        BlinkPattern::continuous(Duration::from_millis(500), Duration::from_millis(500));

    struct Fixture {
        st: Station,
        rec: Recorder,
        led: Mailbox,
        blinker: Mailbox,
        safety: Mailbox,
        motor: Mailbox,
        carriage: Mailbox,
        init: Mailbox,
        homing: Mailbox,
        assemble: Mailbox,
    }

    impl Fixture {
        fn new(homing_required: bool) -> Self {
            let publisher = Publisher::new(Station::ID, STATION_TOPICS);
            let rec = Recorder::new();
            rec.attach(&publisher).unwrap();
            let reporter = Reporter::new(Arc::clone(&publisher), Station::ID);

            let device = |id| mailbox(ActorId::Device(id), 16);
            let (led_ref, led) = device(DeviceId::StatusLed);
            let (blinker_ref, blinker) = device(DeviceId::Blinker);
            let (safety_ref, safety) = device(DeviceId::SafetySwitch);
            let (motor_ref, motor) = device(DeviceId::PressMotor);
            let (carriage_ref, carriage) = mailbox(ActorId::Carriage, 16);

            let service = |kind| mailbox(ActorId::Service(kind), 16);
            let (init_ref, init) = service(ServiceKind::Init);
            let (homing_ref, homing) = service(ServiceKind::Homing);
            let (assemble_ref, assemble) = service(ServiceKind::Press);
            let mut services = ServiceTable::new();
            services.bind(INITIALIZE_SLOT, ServiceKind::Init, init_ref);
            services.bind(1, ServiceKind::Press, assemble_ref);
            services.bind_homing(homing_ref);

            let mut st = Station::new(
                publisher,
                reporter,
                StationDevices {
                    led: led_ref,
                    blinker: blinker_ref,
                    safety: safety_ref,
                    press_motor: Some(motor_ref),
                    carriage: Some(carriage_ref),
                },
                services,
                StationSettings {
                    homing_required,
                    blink: BLINK,
                },
            );
            st.on_start();
            Self {
                st,
                rec,
                led,
                blinker,
                safety,
                motor,
                carriage,
                init,
                homing,
                assemble,
            }
        }

        fn command(&mut self, command: StationCommand, parameters: Option<Parameters>) {
            let kind = EventKind::Command {
                command,
                parameters,
            };
            self.st.dispatch(Event::new(kind, ActorId::Bridge).into());
        }

        fn report(&mut self, kind: EventKind, service: ServiceKind) {
            self.st
                .dispatch(Event::new(kind, ActorId::Service(service)).into());
        }

        fn safety(&mut self, activated: bool) {
            let msg = TopicMessage::new(
                Topic::Value,
                activated,
                ActorId::Device(DeviceId::SafetySwitch),
            );
            self.st.dispatch(msg.into());
        }

        /// Cold start up to `Ready`, draining every inbox.
        fn ready(homing_required: bool) -> Self {
            let mut f = Self::new(homing_required);
            f.safety(false);
            f.command(StationCommand::Initialize, None);
            f.report(EventKind::Done { service_index: 0 }, ServiceKind::Init);
            if homing_required {
                f.report(EventKind::Done { service_index: HOMING_SLOT }, ServiceKind::Homing);
            }
            assert_eq!(f.st.current(), StationState::Ready);
            f.drain();
            f.rec.clear();
            f
        }

        fn drain(&mut self) {
            for mb in [
                &mut self.led,
                &mut self.blinker,
                &mut self.safety,
                &mut self.motor,
                &mut self.carriage,
                &mut self.init,
                &mut self.homing,
                &mut self.assemble,
            ] {
                mb.drain();
            }
        }

        fn texts(&self, topic: Topic) -> Vec<String> {
            self.rec.texts(Station::ID, topic)
        }
    }

    #[test]
    fn cold_start_with_homing() {
        let mut f = Fixture::new(true);
        assert_eq!(
            f.safety.drain_events(),
            [EventKind::Initialize, EventKind::Update]
        );
        assert_eq!(
            f.led.drain_events(),
            [EventKind::Initialize, EventKind::Color(LedColor::Purple)]
        );
        f.safety(false);
        f.command(StationCommand::Initialize, None);
        assert_eq!(
            f.init.drain_events(),
            [EventKind::Execute { service_index: 0, parameters: None }]
        );
        f.report(EventKind::Done { service_index: 0 }, ServiceKind::Init);
        assert_eq!(
            f.homing.drain_events(),
            [EventKind::Execute { service_index: HOMING_SLOT, parameters: None }]
        );
        f.report(EventKind::Done { service_index: HOMING_SLOT }, ServiceKind::Homing);

        assert_eq!(
            f.texts(Topic::StationState),
            ["Starting", "Standby", "Standby", "Standby", "Ready"]
        );
        assert_eq!(
            f.texts(Topic::StationStateMaintenance),
            ["Starting", "NotInitialized", "Initialization", "Homing", "Ready"]
        );
        assert_eq!(f.led.drain_events().last(), Some(&EventKind::Color(LedColor::Green)));
        assert_eq!(f.blinker.drain_events().last(), Some(&EventKind::BlinkStop));
        assert!(!f.st.init_required());
    }

    #[test]
    fn homing_is_skipped_when_not_required() {
        let f = Fixture::ready(false);
        assert_eq!(f.st.current(), StationState::Ready);
    }

    #[test]
    fn service_runs_and_returns_to_ready() {
        let mut f = Fixture::ready(true);
        let params = vec![Value::Int(1)];
        f.command(StationCommand::Service(1), Some(params.clone()));
        assert_eq!(f.st.current(), StationState::Running);
        assert_eq!(
            f.assemble.drain_events(),
            [EventKind::Execute { service_index: 1, parameters: Some(params) }]
        );
        f.command(StationCommand::Assemble, None);
        assert!(f.assemble.drain().is_empty());
        f.report(EventKind::Done { service_index: 1 }, ServiceKind::Press);
        assert_eq!(f.st.current(), StationState::Ready);
        assert_eq!(f.texts(Topic::StationState), ["Running", "Ready"]);
    }

    #[test]
    fn named_command_uses_bound_slot() {
        let mut f = Fixture::ready(true);
        f.command(StationCommand::Assemble, None);
        assert_eq!(
            f.assemble.drain_events(),
            [EventKind::Execute { service_index: 1, parameters: None }]
        );
        f.command(StationCommand::ServiceDone(1), None);
        assert_eq!(f.st.current(), StationState::Ready);
    }

    #[test]
    fn unregistered_job_slot_is_an_error() {
        let mut f = Fixture::ready(true);
        f.command(StationCommand::Service(2), None);
        assert_eq!(f.st.current(), StationState::Error);
        assert_eq!(
            f.texts(Topic::StationErrorCode),
            [ErrorCode::ServiceNotRegistered.hex()]
        );
        assert!(f.assemble.drain().is_empty());
        f.command(StationCommand::Ack, None);
        assert_eq!(f.st.current(), StationState::Ready);
    }

    #[test]
    fn unbound_and_unknown_slots_are_ignored() {
        let mut f = Fixture::ready(true);
        for index in [4, 6, 9] {
            f.command(StationCommand::Service(index), None);
            assert_eq!(f.st.current(), StationState::Ready);
        }
        f.command(StationCommand::ProvideMaterial, None);
        assert_eq!(f.st.current(), StationState::Ready);
    }

    #[test]
    fn estop_cancels_services_and_requires_init() {
        let mut f = Fixture::ready(true);
        f.command(StationCommand::Service(1), None);
        f.drain();
        f.safety(true);
        assert_eq!(f.st.current(), StationState::Estop);
        for mb in [&mut f.init, &mut f.homing, &mut f.assemble] {
            assert_eq!(mb.drain_events(), [EventKind::Cancel]);
        }
        assert_eq!(f.motor.drain_events(), [EventKind::Stop]);
        assert_eq!(f.carriage.drain_events(), [EventKind::Stop]);
        assert_eq!(f.led.drain_events(), [EventKind::Color(LedColor::Red)]);
        assert_eq!(f.blinker.drain_events(), [EventKind::BlinkStart(BLINK)]);
        assert_eq!(f.texts(Topic::StationSafetyState), [SAFETY_ACTIVATED]);
        assert_eq!(f.texts(Topic::StationErrorCode), [ErrorCode::Estop.hex()]);

        f.command(StationCommand::EstopOk, None);
        assert_eq!(f.st.current(), StationState::Estop);
        f.safety(false);
        assert_eq!(f.st.current(), StationState::Error);
        assert_eq!(f.texts(Topic::StationSafetyState).last().map(String::as_str), Some(SAFETY_NOT_ACTIVATED));

        f.command(StationCommand::Ack, None);
        assert_eq!(f.rec.values(Station::ID, Topic::Ack), [Value::Bool(true)]);
        assert_eq!(f.st.current(), StationState::NotInitialized);
        assert_eq!(
            f.texts(Topic::StationMessageCode).last(),
            Some(&MessageCode::InitializationRequired.hex())
        );
    }

    #[test]
    fn connection_loss_is_checked_before_estop() {
        let mut f = Fixture::ready(true);
        f.command(StationCommand::NoConn, None);
        assert_eq!(f.st.current(), StationState::NoConnection);
        f.command(StationCommand::Estop, None);
        assert_eq!(f.st.current(), StationState::Estop);
        f.command(StationCommand::EstopOk, None);
        assert_eq!(f.st.current(), StationState::NoConnection);
        f.command(StationCommand::ConnOk, None);
        assert_eq!(f.st.current(), StationState::Error);
        f.command(StationCommand::Ack, None);
        assert_eq!(f.st.current(), StationState::NotInitialized);
    }

    #[test]
    fn fatal_error_forces_estop() {
        let mut f = Fixture::ready(true);
        f.command(StationCommand::FatalError, None);
        assert_eq!(f.st.current(), StationState::Estop);
        assert_eq!(f.texts(Topic::StationErrorCode), [ErrorCode::FatalError.hex()]);
        f.command(StationCommand::EstopOk, None);
        assert_eq!(f.st.current(), StationState::Error);
    }

    #[test]
    fn service_error_without_init_returns_to_ready() {
        let mut f = Fixture::ready(true);
        f.command(StationCommand::Service(1), None);
        f.report(EventKind::Error { init_required: false }, ServiceKind::Press);
        assert_eq!(f.st.current(), StationState::Error);
        f.command(StationCommand::Ack, None);
        assert_eq!(f.st.current(), StationState::Ready);
    }

    #[test]
    fn composite_error_in_ready_latches_init() {
        let mut f = Fixture::ready(true);
        f.st.dispatch(TopicMessage::new(Topic::State, "ErrorWithInit", ActorId::Carriage).into());
        assert_eq!(f.st.current(), StationState::Error);
        assert!(f.st.init_required());
    }

    #[test]
    fn maintenance_only_outside_operation() {
        let mut f = Fixture::new(true);
        f.safety(false);
        f.drain();
        f.command(StationCommand::MaintenanceMotorCw, None);
        f.command(StationCommand::MaintenanceCarriageToRack, None);
        assert_eq!(f.motor.drain_events(), [EventKind::RotateCw]);
        assert_eq!(f.carriage.drain_events(), [EventKind::MoveToRack]);

        f.command(StationCommand::Initialize, None);
        f.command(StationCommand::MaintenanceMotorCcw, None);
        assert!(f.motor.drain().is_empty());
    }

    #[test]
    fn service_table_lookup() {
        let (a, _ma) = mailbox(ActorId::Service(ServiceKind::ProvideMaterial), 1);
        let (h, _mh) = mailbox(ActorId::Service(ServiceKind::Homing), 1);
        let mut table = ServiceTable::new();
        assert!(table.bind(1, ServiceKind::ProvideMaterial, a));
        assert!(!table.bind(7, ServiceKind::ProvideMaterial, h.clone()));
        table.bind_homing(h);
        assert_eq!(table.slot_of(ServiceKind::ProvideMaterial), Some(1));
        assert_eq!(table.slot_of(ServiceKind::ResetMaterial), None);
        assert_eq!(
            table.get(HOMING_SLOT).map(ActorRef::id),
            Some(ActorId::Service(ServiceKind::Homing))
        );
        assert_eq!(table.all().count(), 2);
    }
}
