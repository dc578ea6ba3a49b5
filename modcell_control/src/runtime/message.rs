//! Messages exchanged between active objects.
//!
//! An inbox carries two kinds of message: a [`TopicMessage`] delivered by a
//! publisher the receiver subscribed to, and an [`Event`] posted directly
//! by a peer, the process image or a timer.

use core::fmt;
use core::str::FromStr;

use modcell_common::io::image::Edge;
use serde::{Deserialize, Serialize};

use super::hsm::StateId;
use crate::device::blinker::BlinkPattern;
use crate::device::led::LedColor;

/// State value published by a composite in error without re-initialization.
pub const ERROR: &str = "Error";
/// State value published by a composite in error that needs re-initialization.
pub const ERROR_WITH_INIT: &str = "ErrorWithInit";
/// State value published once initialization completed.
pub const INITIALIZED: &str = "Initialized";

// ─── Values ─────────────────────────────────────────────────────────

/// Payload of a topic message or service parameter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Bool(bool),
    Int(i64),
    Text(String),
}

/// Positional service parameters.
pub type Parameters = Vec<Value>;

impl Value {
    /// Parse an operator token: `true`/`false`, an integer, or text.
    pub fn parse(token: &str) -> Self {
        match token {
            "true" => Self::Bool(true),
            "false" => Self::Bool(false),
            _ => token
                .parse::<i64>()
                .map(Self::Int)
                .unwrap_or_else(|_| Self::Text(token.to_string())),
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            Self::Int(i) => Some(*i != 0),
            Self::Text(t) => match t.as_str() {
                "true" => Some(true),
                "false" => Some(false),
                _ => None,
            },
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(*i),
            Self::Text(t) => t.trim().parse().ok(),
            Self::Bool(_) => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(t) => Some(t),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int(i) => write!(f, "{i}"),
            Self::Text(t) => f.write_str(t),
        }
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<u32> for Value {
    fn from(value: u32) -> Self {
        Self::Int(i64::from(value))
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

/// Integer parameter at `index`.
pub fn param_int(parameters: &[Value], index: usize) -> Option<i64> {
    parameters.get(index).and_then(Value::as_int)
}

/// Text parameter at `index`; integers are rendered as text.
pub fn param_text(parameters: &[Value], index: usize) -> Option<String> {
    parameters.get(index).map(Value::to_string)
}

// ─── Identities ─────────────────────────────────────────────────────

/// Device actors of a station.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DeviceId {
    SafetySwitch,
    StatusLed,
    Blinker,
    FrontSensor,
    RackSensor,
    CarriageMotor,
    UpperSensor,
    EndSwitch,
    ForceSensor,
    PressMotor,
    Clamp,
    Nfc,
    TopSensor,
    BottomSensor,
    DispatchSensor,
    PresenceSensor(u8),
    InteractionSensor(u8),
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PresenceSensor(n) => write!(f, "PresenceSensor{n}"),
            Self::InteractionSensor(n) => write!(f, "InteractionSensor{n}"),
            other => fmt::Debug::fmt(other, f),
        }
    }
}

/// Services a station can bind to its service slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ServiceKind {
    Init,
    Homing,
    Press,
    Position,
    ProvideDicehalf,
    RefillRack,
    ProvideMaterial,
    RefillMaterial,
    ResetMaterial,
}

impl fmt::Display for ServiceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}Service")
    }
}

/// Address of a message sender or receiver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ActorId {
    Station,
    /// The supervisory-system bridge or an operator console.
    Bridge,
    ProcessImage,
    ControlLoop,
    Service(ServiceKind),
    Carriage,
    Press,
    DicehalfRack,
    PlateRack(u8),
    Device(DeviceId),
}

impl fmt::Display for ActorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Service(kind) => fmt::Display::fmt(kind, f),
            Self::PlateRack(n) => write!(f, "PlateRack{n}"),
            Self::Device(device) => fmt::Display::fmt(device, f),
            other => fmt::Debug::fmt(other, f),
        }
    }
}

// ─── Topics ─────────────────────────────────────────────────────────

/// Named channel of a publisher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topic {
    /// Current state name of the sender.
    State,
    /// Logical level or reading of a device.
    Value,
    /// Raw analog counts.
    AnalogValue,
    /// Free-form detail, named `<Sender>State` on the wire.
    Detail,
    StationState,
    StationStateMaintenance,
    StationSafetyState,
    Ack,
    StationErrorCode,
    StationErrorDescription,
    StationMessageCode,
    StationMessageDescription,
    PlateColor(u8),
    QuantityOfPlateColor(u8),
    NumberOfCurrentlyStoredDicehalves,
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PlateColor(n) => write!(f, "PlateColor{n}"),
            Self::QuantityOfPlateColor(n) => write!(f, "QuantityOfPlateColor{n}"),
            other => fmt::Debug::fmt(other, f),
        }
    }
}

/// A published value as seen by a subscriber.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicMessage {
    pub topic: Topic,
    pub value: Value,
    pub sender: ActorId,
}

impl TopicMessage {
    pub fn new(topic: Topic, value: impl Into<Value>, sender: ActorId) -> Self {
        Self {
            topic,
            value: value.into(),
            sender,
        }
    }

    /// Topic name used towards the supervisory system.
    pub fn external_topic(&self) -> String {
        match self.topic {
            Topic::Detail => format!("{}State", self.sender),
            other => other.to_string(),
        }
    }

    /// State name if this is a `State` message.
    pub fn state(&self) -> Option<&str> {
        match self.topic {
            Topic::State => self.value.as_str(),
            _ => None,
        }
    }

    /// Typed state if this is a `State` message naming a state of `S`.
    pub fn state_as<S: StateId>(&self) -> Option<S> {
        self.state().and_then(S::from_name)
    }

    pub fn is_state<S: StateId>(&self, state: S) -> bool {
        self.state() == Some(state.name())
    }

    pub fn reports_initialized(&self) -> bool {
        self.state() == Some(INITIALIZED)
    }

    /// `Some(init_required)` if the sender reports an error state.
    pub fn reports_error(&self) -> Option<bool> {
        match self.state() {
            Some(ERROR) => Some(false),
            Some(ERROR_WITH_INIT) => Some(true),
            _ => None,
        }
    }

    /// Logical level carried by a `Value` message.
    pub fn level(&self) -> Option<bool> {
        match self.topic {
            Topic::Value => self.value.as_bool(),
            _ => None,
        }
    }
}

// ─── Events ─────────────────────────────────────────────────────────

/// Timers an actor may arm against itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimerId {
    CarriageToFront,
    CarriageToRack,
    PressMove,
    RackFullCheck,
    ClampWait,
    PressingDwell,
    Service,
    BlinkPhase,
}

/// Commands accepted by the station supervisor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StationCommand {
    Initialize,
    /// `serviceN`, N in 1..=6.
    Service(u8),
    /// `serviceN_done`.
    ServiceDone(u8),
    Ack,
    Estop,
    EstopOk,
    NoConn,
    ConnOk,
    FatalError,
    CancelService,
    MaintenanceMotorCw,
    MaintenanceMotorCcw,
    MaintenanceMotorStop,
    MaintenanceCarriageToRack,
    MaintenanceCarriageToFront,
    MaintenanceCarriageToStop,
    ProvideMaterial,
    RefillMaterial,
    ResetMaterial,
    ProvideDicehalf,
    RefillRack,
    Homing,
    Assemble,
}

impl StationCommand {
    /// Named commands that map to a service of the station layout.
    pub const fn service_kind(self) -> Option<ServiceKind> {
        match self {
            Self::Assemble => Some(ServiceKind::Press),
            Self::ProvideDicehalf => Some(ServiceKind::ProvideDicehalf),
            Self::RefillRack => Some(ServiceKind::RefillRack),
            Self::ProvideMaterial => Some(ServiceKind::ProvideMaterial),
            Self::RefillMaterial => Some(ServiceKind::RefillMaterial),
            Self::ResetMaterial => Some(ServiceKind::ResetMaterial),
            _ => None,
        }
    }

    pub const fn is_maintenance(self) -> bool {
        matches!(
            self,
            Self::MaintenanceMotorCw
                | Self::MaintenanceMotorCcw
                | Self::MaintenanceMotorStop
                | Self::MaintenanceCarriageToRack
                | Self::MaintenanceCarriageToFront
                | Self::MaintenanceCarriageToStop
        )
    }
}

impl fmt::Display for StationCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Service(n) => write!(f, "service{n}"),
            Self::ServiceDone(n) => write!(f, "service{n}_done"),
            Self::MaintenanceMotorCw => f.write_str("MaintenanceMotorCW"),
            Self::MaintenanceMotorCcw => f.write_str("MaintenanceMotorCCW"),
            other => fmt::Debug::fmt(other, f),
        }
    }
}

impl FromStr for StationCommand {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Some(rest) = s.strip_prefix("service") {
            let (digits, done) = match rest.strip_suffix("_done") {
                Some(digits) => (digits, true),
                None => (rest, false),
            };
            let index: u8 = digits
                .parse()
                .map_err(|_| format!("invalid service command '{s}'"))?;
            return Ok(if done {
                Self::ServiceDone(index)
            } else {
                Self::Service(index)
            });
        }
        Ok(match s {
            "Initialize" => Self::Initialize,
            "Ack" => Self::Ack,
            "Estop" => Self::Estop,
            "EstopOk" => Self::EstopOk,
            "NoConn" => Self::NoConn,
            "ConnOk" => Self::ConnOk,
            "FatalError" => Self::FatalError,
            "CancelService" => Self::CancelService,
            "MaintenanceMotorCW" => Self::MaintenanceMotorCw,
            "MaintenanceMotorCCW" => Self::MaintenanceMotorCcw,
            "MaintenanceMotorStop" => Self::MaintenanceMotorStop,
            "MaintenanceCarriageToRack" => Self::MaintenanceCarriageToRack,
            "MaintenanceCarriageToFront" => Self::MaintenanceCarriageToFront,
            "MaintenanceCarriageToStop" => Self::MaintenanceCarriageToStop,
            "ProvideMaterial" => Self::ProvideMaterial,
            "RefillMaterial" => Self::RefillMaterial,
            "ResetMaterial" => Self::ResetMaterial,
            "ProvideDicehalf" => Self::ProvideDicehalf,
            "RefillRack" => Self::RefillRack,
            "Homing" => Self::Homing,
            "Assemble" => Self::Assemble,
            _ => return Err(format!("unknown station command '{s}'")),
        })
    }
}

/// What an event asks the receiver to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventKind {
    // ── Devices ─────────────────────
    Initialize,
    Update,
    Stop,
    RotateCw,
    RotateCcw,
    Open,
    Close,
    Color(LedColor),
    BlinkStart(BlinkPattern),
    BlinkStop,
    Edge(Edge),
    AnalogSample(i64),

    // ── Composites ──────────────────
    MoveToFront,
    MoveToRack,
    MoveUp,
    MoveDown,
    SetRack(i64),
    DecRack,
    Provide(Parameters),
    Refill(Parameters),
    Reset(Parameters),

    // ── Generic ─────────────────────
    Acknowledge,
    Timeout(TimerId),

    // ── Services ────────────────────
    Execute {
        service_index: u8,
        parameters: Option<Parameters>,
    },
    Cancel,
    Done {
        service_index: u8,
    },
    Error {
        init_required: bool,
    },

    // ── Station ─────────────────────
    Command {
        command: StationCommand,
        parameters: Option<Parameters>,
    },
}

/// A directly posted event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    pub kind: EventKind,
    pub sender: ActorId,
}

impl Event {
    pub fn new(kind: EventKind, sender: ActorId) -> Self {
        Self { kind, sender }
    }
}

/// Anything that can sit in an inbox.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    Topic(TopicMessage),
    Event(Event),
}

impl From<TopicMessage> for Message {
    fn from(message: TopicMessage) -> Self {
        Self::Topic(message)
    }
}

impl From<Event> for Message {
    fn from(event: Event) -> Self {
        Self::Event(event)
    }
}
