//! Plate rack sorted by color.
//!
//! A rack holds up to three colors, each with its own quantity, and keeps
//! them in a JSON stock file. An operator job is started by a service and
//! confirmed at the rack: the presence sensor sees a plate withdrawn, the
//! interaction sensor confirms a refill. The rack idles in
//! `Initialization` once its sensors and stock are loaded.

use std::sync::Arc;

use bitflags::bitflags;
use modcell_common::consts::PLATE_COLORS_PER_RACK;
use modcell_common::station::codes::{ErrorCode, MessageCode};
use tracing::{debug, error, info, warn};

use super::stock::{RackStock, StockStore};
use super::{DeviceReport, StationSignal, device_report, station_signal};
use crate::runtime::active::{ActorRef, Behavior};
use crate::runtime::hsm::{Hsm, StateId, StateMachine};
use crate::runtime::message::{
    ActorId, ERROR_WITH_INIT, EventKind, INITIALIZED, Message, Parameters, Topic, Value,
    param_int, param_text,
};
use crate::runtime::pubsub::Publisher;
use crate::runtime::report::Reporter;

/// State published after a confirmed withdrawal.
pub const WITHDRAWAL_DONE: &str = "MaterialWithdrawalDone";
/// State published after a confirmed refill.
pub const REFILL_DONE: &str = "MaterialRefillDone";
/// State published after a stock reset.
pub const RESET_DONE: &str = "MaterialResetDone";

/// Topics of a plate rack publisher.
pub const PLATE_RACK_TOPICS: &[Topic] = &[
    Topic::State,
    Topic::Detail,
    Topic::PlateColor(1),
    Topic::QuantityOfPlateColor(1),
    Topic::PlateColor(2),
    Topic::QuantityOfPlateColor(2),
    Topic::PlateColor(3),
    Topic::QuantityOfPlateColor(3),
];

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct PlateRackParts: u8 {
        const PRESENCE_SENSOR = 0b01;
        const INTERACTION_SENSOR = 0b10;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PlateRackState {
    NotInitialized,
    Initialization,
    ProvideMaterial,
    RefillMaterial,
    ResetMaterial,
    Error,
}

impl StateId for PlateRackState {
    fn all() -> &'static [Self] {
        &[
            Self::NotInitialized,
            Self::Initialization,
            Self::ProvideMaterial,
            Self::RefillMaterial,
            Self::ResetMaterial,
            Self::Error,
        ]
    }

    fn parent(self) -> Option<Self> {
        None
    }

    fn name(self) -> &'static str {
        match self {
            Self::NotInitialized => "NotInitialized",
            Self::Initialization => "Initialization",
            Self::ProvideMaterial => "ProvideMaterial",
            Self::RefillMaterial => "RefillMaterial",
            Self::ResetMaterial => "ResetMaterial",
            Self::Error => "Error",
        }
    }
}

#[derive(Debug, Clone)]
pub struct PlateRackSensors {
    pub presence: ActorRef,
    pub interaction: ActorRef,
}

/// Job accepted by the rack and waiting for the operator.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Job {
    Withdraw(usize),
    Refill([u32; PLATE_COLORS_PER_RACK]),
    Reset(RackStock),
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Input {
    Initialize,
    Update,
    Provide(Parameters),
    Refill(Parameters),
    Reset(Parameters),
    Cancel,
    Acknowledge,
    Ready(PlateRackParts),
    DeviceFault(ActorId),
    Presence(bool),
    Interaction(bool),
    StationError,
}

pub struct PlateRack {
    id: ActorId,
    sm: StateMachine<PlateRackState>,
    publisher: Arc<Publisher>,
    reporter: Reporter,
    sensors: PlateRackSensors,
    store: StockStore,
    stock: RackStock,
    maximum: u32,
    job: Option<Job>,
    parts: PlateRackParts,
    init_required: bool,
}

impl PlateRack {
    pub fn new(
        id: ActorId,
        publisher: Arc<Publisher>,
        reporter: Reporter,
        sensors: PlateRackSensors,
        store: StockStore,
        maximum: u32,
    ) -> Self {
        Self {
            id,
            sm: StateMachine::new("plate_rack", PlateRackState::NotInitialized),
            publisher,
            reporter: reporter.for_actor(id),
            sensors,
            store,
            stock: RackStock::default(),
            maximum,
            job: None,
            parts: PlateRackParts::empty(),
            init_required: false,
        }
    }

    pub fn stock(&self) -> &RackStock {
        &self.stock
    }

    /// Sensors are up and the stock is loaded.
    fn is_idle(&self) -> bool {
        self.current() == PlateRackState::Initialization && self.parts.is_all()
    }

    fn classify(&self, message: Message) -> Option<Input> {
        match message {
            Message::Event(event) => Some(match event.kind {
                EventKind::Initialize => Input::Initialize,
                EventKind::Update => Input::Update,
                EventKind::Provide(p) => Input::Provide(p),
                EventKind::Refill(p) => Input::Refill(p),
                EventKind::Reset(p) => Input::Reset(p),
                EventKind::Cancel => Input::Cancel,
                EventKind::Acknowledge => Input::Acknowledge,
                _ => return None,
            }),
            Message::Topic(msg) => {
                match station_signal(&msg) {
                    Some(StationSignal::Error) => return Some(Input::StationError),
                    Some(StationSignal::Acknowledge) => return Some(Input::Acknowledge),
                    Some(StationSignal::Estop) | None => {}
                }
                let part = if msg.sender == self.sensors.presence.id() {
                    PlateRackParts::PRESENCE_SENSOR
                } else if msg.sender == self.sensors.interaction.id() {
                    PlateRackParts::INTERACTION_SENSOR
                } else {
                    return None;
                };
                match device_report(&msg) {
                    Some(DeviceReport::Initialized) => Some(Input::Ready(part)),
                    Some(DeviceReport::Fault) => Some(Input::DeviceFault(msg.sender)),
                    None => {
                        let level = msg.level()?;
                        Some(if part == PlateRackParts::PRESENCE_SENSOR {
                            Input::Presence(level)
                        } else {
                            Input::Interaction(level)
                        })
                    }
                }
            }
        }
    }

    fn handle(&mut self, state: PlateRackState, input: Input) {
        use PlateRackState::*;
        match (state, input) {
            (Initialization, Input::Ready(part)) => {
                let was_ready = self.parts.is_all();
                self.parts |= part;
                if self.parts.is_all() && !was_ready {
                    self.publisher.announce(Topic::State, INITIALIZED);
                }
            }
            (Initialization, Input::Provide(p)) if self.is_idle() => match self.withdrawal(&p) {
                Ok(slot) => self.begin(Job::Withdraw(slot), ProvideMaterial),
                Err(code) => self.fail(code),
            },
            (Initialization, Input::Refill(p)) if self.is_idle() => match self.refill(&p) {
                Ok(deltas) => self.begin(Job::Refill(deltas), RefillMaterial),
                Err(code) => self.fail(code),
            },
            (Initialization, Input::Reset(p)) if self.is_idle() => match self.reset(&p) {
                Ok(stock) => self.begin(Job::Reset(stock), ResetMaterial),
                Err(code) => self.fail(code),
            },

            (ProvideMaterial, Input::Presence(true)) => {
                if let Some(Job::Withdraw(slot)) = self.job.take() {
                    let mut stock = self.stock.clone();
                    stock.slots[slot].quantity -= 1;
                    self.commit(stock, WITHDRAWAL_DONE, MessageCode::MaterialWithdrawalDone);
                }
            }
            (RefillMaterial, Input::Interaction(true)) => {
                if let Some(Job::Refill(deltas)) = self.job.take() {
                    let mut stock = self.stock.clone();
                    for (slot, delta) in stock.slots.iter_mut().zip(deltas) {
                        slot.quantity += delta;
                    }
                    self.commit(stock, REFILL_DONE, MessageCode::MaterialRefillDone);
                }
            }
            (ProvideMaterial | RefillMaterial, Input::Cancel) => {
                self.job = None;
                self.reporter.message(MessageCode::CancelJob);
                self.set_state(Initialization);
            }

            (Error, Input::Acknowledge) => self.set_state(Initialization),
            (Error, Input::StationError) => {}

            (s, input) => self.handle_any(s, input),
        }
    }

    fn handle_any(&mut self, state: PlateRackState, input: Input) {
        match input {
            Input::Initialize => self.set_state(PlateRackState::Initialization),
            Input::Update => {
                self.publish_stock();
                self.publish_state();
            }
            Input::StationError | Input::DeviceFault(_)
                if state == PlateRackState::NotInitialized =>
            {
                debug!("Rack not initialized, {:?} ignored", input);
            }
            Input::StationError => self.set_state(PlateRackState::Error),
            Input::DeviceFault(device) => {
                warn!("Rack sensor {} reported an error", device);
                self.init_required = true;
                self.fail(ErrorCode::DeviceFault);
            }
            Input::Provide(_) | Input::Refill(_) | Input::Reset(_) => {
                warn!(state = state.name(), "{} is busy, job rejected", self.id);
            }
            other => debug!(state = state.name(), "Plate rack ignores {:?}", other),
        }
    }

    // ─── Job validation ─────────────────────────────────────────────

    /// `[rack, color]`: slot of the requested color.
    fn withdrawal(&self, parameters: &[Value]) -> Result<usize, ErrorCode> {
        let color = param_text(parameters, 1).ok_or(ErrorCode::InvalidServiceParameters)?;
        let slot = self
            .stock
            .find(&color)
            .ok_or(ErrorCode::WrongDiceplateColor)?;
        if self.stock.slots[slot].quantity == 0 {
            return Err(ErrorCode::RackDiceplateNumMinimum);
        }
        Ok(slot)
    }

    /// `[rack, _, d1, _, d2, _, d3]`: quantities added per slot.
    fn refill(&self, parameters: &[Value]) -> Result<[u32; PLATE_COLORS_PER_RACK], ErrorCode> {
        let mut deltas = [0; PLATE_COLORS_PER_RACK];
        for (i, delta) in deltas.iter_mut().enumerate() {
            let raw = param_int(parameters, 2 + 2 * i).ok_or(ErrorCode::InvalidServiceParameters)?;
            *delta = u32::try_from(raw).map_err(|_| ErrorCode::RackDiceplateNumMinimum)?;
            let total = self.stock.slots[i].quantity.saturating_add(*delta);
            if total > self.maximum {
                return Err(ErrorCode::RackDiceplateNumMaximum);
            }
        }
        Ok(deltas)
    }

    /// `[rack, c1, q1, c2, q2, c3, q3]`: the complete new stock.
    fn reset(&self, parameters: &[Value]) -> Result<RackStock, ErrorCode> {
        let mut stock = RackStock::default();
        for (i, slot) in stock.slots.iter_mut().enumerate() {
            slot.color =
                param_text(parameters, 1 + 2 * i).ok_or(ErrorCode::InvalidServiceParameters)?;
            let raw = param_int(parameters, 2 + 2 * i).ok_or(ErrorCode::InvalidServiceParameters)?;
            slot.quantity = u32::try_from(raw).map_err(|_| ErrorCode::RackDiceplateNumMinimum)?;
            if slot.quantity > self.maximum {
                return Err(ErrorCode::RackDiceplateNumMaximum);
            }
        }
        Ok(stock)
    }

    // ─── Actions ────────────────────────────────────────────────────

    fn begin(&mut self, job: Job, state: PlateRackState) {
        info!(rack = %self.id, "Accepted {:?}", job);
        self.job = Some(job);
        self.set_state(state);
    }

    /// Persist `stock`, then announce the finished job and go idle.
    fn commit(&mut self, stock: RackStock, done: &str, code: MessageCode) {
        if let Err(e) = self.store.save(&stock) {
            error!("{}", e);
            self.fail(ErrorCode::StorageFileError);
            return;
        }
        self.stock = stock;
        self.publish_stock();
        self.publisher.announce(Topic::State, done);
        self.reporter.message(code);
        self.set_state(PlateRackState::Initialization);
    }

    fn fail(&mut self, code: ErrorCode) {
        self.reporter.error(code);
        self.set_state(PlateRackState::Error);
    }

    fn publish_stock(&self) {
        for (n, slot) in (1u8..).zip(&self.stock.slots) {
            self.publisher
                .announce(Topic::PlateColor(n), slot.color.as_str());
            self.publisher
                .announce(Topic::QuantityOfPlateColor(n), slot.quantity);
        }
    }

    fn publish_state(&self) {
        let name = match self.current() {
            PlateRackState::Error if self.init_required => ERROR_WITH_INIT,
            state => state.name(),
        };
        self.publisher.announce(Topic::State, name);
    }
}

impl Hsm for PlateRack {
    type State = PlateRackState;

    fn machine(&self) -> &StateMachine<PlateRackState> {
        &self.sm
    }

    fn machine_mut(&mut self) -> &mut StateMachine<PlateRackState> {
        &mut self.sm
    }

    fn on_enter(&mut self, state: PlateRackState) {
        use PlateRackState::*;
        self.publish_state();
        match state {
            Initialization => {
                self.job = None;
                self.init_required = false;
                self.parts = PlateRackParts::empty();
                match self.store.load_or_create() {
                    Ok(stock) => self.stock = stock,
                    Err(e) => {
                        error!("{}", e);
                        self.fail(ErrorCode::StorageFileError);
                        return;
                    }
                }
                self.publish_stock();
                self.sensors.presence.send(EventKind::Initialize, self.id);
                self.sensors.interaction.send(EventKind::Initialize, self.id);
            }
            ResetMaterial => {
                if let Some(Job::Reset(stock)) = self.job.take() {
                    self.commit(stock, RESET_DONE, MessageCode::MaterialResetDone);
                }
            }
            _ => {}
        }
    }
}

impl Behavior for PlateRack {
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
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::active::{Mailbox, mailbox};
    use crate::runtime::message::{DeviceId, Event, TopicMessage};
    use crate::runtime::recorder::Recorder;
    use std::fs;
    use tempfile::TempDir;

    const RACK: ActorId = ActorId::PlateRack(1);
    const PRESENCE: ActorId = ActorId::Device(DeviceId::PresenceSensor(1));
    const INTERACTION: ActorId = ActorId::Device(DeviceId::InteractionSensor(1));

    struct Fixture {
        rack: PlateRack,
        sensors: (Mailbox, Mailbox),
        recorder: Recorder,
        dir: TempDir,
    }

    impl Fixture {
        fn with_stock(stock: Option<RackStock>) -> Self {
            let dir = TempDir::new().unwrap();
            let store = StockStore::new(dir.path().join("StorageRack1.json"));
            if let Some(stock) = stock {
                store.save(&stock).unwrap();
            }
            let (presence, presence_mb) = mailbox(PRESENCE, 16);
            let (interaction, interaction_mb) = mailbox(INTERACTION, 16);
            let surface = Publisher::new(
                ActorId::Station,
                &[
                    Topic::StationErrorCode,
                    Topic::StationErrorDescription,
                    Topic::StationMessageCode,
                    Topic::StationMessageDescription,
                ],
            );
            let publisher = Publisher::new(RACK, PLATE_RACK_TOPICS);
            let recorder = Recorder::new();
            recorder.attach(&publisher).unwrap();
            recorder.attach(&surface).unwrap();
            let mut rack = PlateRack::new(
                RACK,
                publisher,
                Reporter::new(surface, ActorId::Station),
                PlateRackSensors {
                    presence,
                    interaction,
                },
                store,
                10,
            );
            rack.on_start();
            Self {
                rack,
                sensors: (presence_mb, interaction_mb),
                recorder,
                dir,
            }
        }

        fn stocked() -> Self {
            let mut f = Self::with_stock(Some(RackStock::new([
                ("Red", 8),
                ("Green", 7),
                ("Blue", 6),
            ])));
            f.initialize();
            f
        }

        fn initialize(&mut self) {
            self.event(EventKind::Initialize);
            for sender in [PRESENCE, INTERACTION] {
                self.rack
                    .dispatch(TopicMessage::new(Topic::State, INITIALIZED, sender).into());
            }
        }

        fn event(&mut self, kind: EventKind) {
            self.rack.dispatch(Event::new(kind, ActorId::Station).into());
        }

        fn sensor(&mut self, sender: ActorId, level: bool) {
            self.rack
                .dispatch(TopicMessage::new(Topic::Value, level, sender).into());
        }

        fn file(&self) -> String {
            fs::read_to_string(self.dir.path().join("StorageRack1.json")).unwrap()
        }

        fn quantities(&self) -> Vec<u32> {
            self.rack.stock().slots.iter().map(|s| s.quantity).collect()
        }

        fn errors(&self) -> Vec<String> {
            self.recorder.texts(RACK, Topic::StationErrorCode)
        }
    }

    fn params(tokens: &str) -> Parameters {
        tokens.split_whitespace().map(Value::parse).collect()
    }

    #[test]
    fn initialization_loads_and_publishes_stock() {
        let f = Fixture::stocked();
        assert_eq!(f.rack.current(), PlateRackState::Initialization);
        assert_eq!(
            f.recorder.last(RACK, Topic::PlateColor(2)),
            Some(Value::from("Green"))
        );
        assert_eq!(
            f.recorder.last(RACK, Topic::QuantityOfPlateColor(3)),
            Some(Value::Int(6))
        );
        assert_eq!(f.recorder.last(RACK, Topic::State), Some(Value::from(INITIALIZED)));
    }

    #[test]
    fn initialization_asks_sensors_to_initialize() {
        let mut f = Fixture::stocked();
        assert_eq!(f.sensors.0.drain_events(), [EventKind::Initialize]);
        assert_eq!(f.sensors.1.drain_events(), [EventKind::Initialize]);
    }

    #[test]
    fn missing_stock_file_is_created_empty() {
        let mut f = Fixture::with_stock(None);
        f.initialize();
        assert_eq!(f.rack.current(), PlateRackState::Initialization);
        assert_eq!(f.quantities(), [0, 0, 0]);
        assert!(f.file().contains("PlateColor1Quantity"));
    }

    #[test]
    fn malformed_stock_file_is_an_error() {
        let mut f = Fixture::with_stock(None);
        fs::write(f.dir.path().join("StorageRack1.json"), "not json").unwrap();
        f.event(EventKind::Initialize);
        assert_eq!(f.rack.current(), PlateRackState::Error);
        assert_eq!(f.errors(), [ErrorCode::StorageFileError.hex()]);
    }

    #[test]
    fn withdrawal_completes_on_presence_edge() {
        let mut f = Fixture::stocked();
        f.event(EventKind::Provide(params("1 Green")));
        assert_eq!(f.rack.current(), PlateRackState::ProvideMaterial);
        f.sensor(PRESENCE, true);
        assert_eq!(f.quantities(), [8, 6, 6]);
        assert!(f.recorder.contains(RACK, Topic::State, WITHDRAWAL_DONE));
        assert_eq!(
            f.recorder.texts(RACK, Topic::StationMessageCode),
            [MessageCode::MaterialWithdrawalDone.hex()]
        );
        assert!(f.file().contains("\"PlateColor2Quantity\": 6"));
        assert_eq!(f.rack.current(), PlateRackState::Initialization);
    }

    #[test]
    fn withdrawal_validation() {
        let mut f = Fixture::stocked();
        f.event(EventKind::Provide(params("1 Purple")));
        assert_eq!(f.errors(), [ErrorCode::WrongDiceplateColor.hex()]);

        let mut f = Fixture::with_stock(Some(RackStock::new([("Red", 0), ("Green", 1), ("Blue", 1)])));
        f.initialize();
        f.event(EventKind::Provide(params("1 Red")));
        assert_eq!(f.rack.current(), PlateRackState::Error);
        assert_eq!(f.errors(), [ErrorCode::RackDiceplateNumMinimum.hex()]);
    }

    #[test]
    fn refill_over_maximum_leaves_file_unchanged() {
        let mut f = Fixture::stocked();
        let before = f.file();
        f.event(EventKind::Refill(params("1 Red 3 Green 4 Blue 5")));
        assert_eq!(f.rack.current(), PlateRackState::Error);
        assert_eq!(f.errors(), [ErrorCode::RackDiceplateNumMaximum.hex()]);
        assert_eq!(f.file(), before);
    }

    #[test]
    fn refill_commits_on_interaction_edge() {
        let mut f = Fixture::stocked();
        f.event(EventKind::Refill(params("1 Red 2 Green 3 Blue 4")));
        assert_eq!(f.rack.current(), PlateRackState::RefillMaterial);
        f.sensor(PRESENCE, true);
        assert_eq!(f.quantities(), [8, 7, 6]);
        f.sensor(INTERACTION, true);
        assert_eq!(f.quantities(), [10, 10, 10]);
        assert!(f.recorder.contains(RACK, Topic::State, REFILL_DONE));
    }

    #[test]
    fn negative_refill_is_rejected() {
        let mut f = Fixture::stocked();
        f.event(EventKind::Refill(params("1 Red -1 Green 0 Blue 0")));
        assert_eq!(f.errors(), [ErrorCode::RackDiceplateNumMinimum.hex()]);
    }

    #[test]
    fn cancel_aborts_refill() {
        let mut f = Fixture::stocked();
        f.event(EventKind::Refill(params("1 Red 1 Green 1 Blue 1")));
        f.event(EventKind::Cancel);
        assert_eq!(f.rack.current(), PlateRackState::Initialization);
        assert_eq!(
            f.recorder.texts(RACK, Topic::StationMessageCode),
            [MessageCode::CancelJob.hex()]
        );
        f.initialize();
        assert_eq!(f.quantities(), [8, 7, 6]);
    }

    #[test]
    fn reset_replaces_the_stock() {
        let mut f = Fixture::stocked();
        f.event(EventKind::Reset(params("1 Yellow 1 Black 2 White 3")));
        assert_eq!(f.rack.current(), PlateRackState::Initialization);
        assert_eq!(f.rack.stock().slots[1].color, "Black");
        assert_eq!(f.quantities(), [1, 2, 3]);
        assert!(f.recorder.contains(RACK, Topic::State, RESET_DONE));
        assert!(f.file().contains("White"));
    }

    #[test]
    fn missing_parameters_are_invalid() {
        let mut f = Fixture::stocked();
        f.event(EventKind::Reset(params("1 Yellow 1")));
        assert_eq!(f.errors(), [ErrorCode::InvalidServiceParameters.hex()]);
        f.rack
            .dispatch(TopicMessage::new(Topic::Ack, true, ActorId::Station).into());
        assert_eq!(f.rack.current(), PlateRackState::Initialization);
    }
}
