//! NFC reader for workpiece tags.

use std::sync::Arc;

use modcell_common::io::image::IoError;
use parking_lot::Mutex;
use tracing::{debug, warn};

use super::DeviceState;
use crate::runtime::active::Behavior;
use crate::runtime::hsm::{Hsm, StateId, StateMachine};
use crate::runtime::message::{ActorId, EventKind, Message, Topic};
use crate::runtime::pubsub::Publisher;

/// Source of tag identifiers.
pub trait TagReader: Send + Sync {
    /// Identifier of the tag in the field, `None` when no tag is present.
    fn read_tag(&self) -> Result<Option<String>, IoError>;
}

/// Tag reader whose field is set by hand.
#[derive(Debug, Default)]
pub struct SimulatedTagReader {
    tag: Mutex<Option<String>>,
}

impl SimulatedTagReader {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn place(&self, tag: impl Into<String>) {
        *self.tag.lock() = Some(tag.into());
    }

    pub fn remove(&self) {
        *self.tag.lock() = None;
    }
}

impl TagReader for SimulatedTagReader {
    fn read_tag(&self) -> Result<Option<String>, IoError> {
        Ok(self.tag.lock().clone())
    }
}

pub struct NfcReader {
    id: ActorId,
    sm: StateMachine<DeviceState>,
    publisher: Arc<Publisher>,
    reader: Arc<dyn TagReader>,
}

impl NfcReader {
    pub fn new(id: ActorId, publisher: Arc<Publisher>, reader: Arc<dyn TagReader>) -> Self {
        Self {
            id,
            sm: StateMachine::new("nfc", DeviceState::NotInitialized),
            publisher,
            reader,
        }
    }

    fn refresh(&mut self) {
        match self.reader.read_tag() {
            Ok(tag) => self.publisher.announce(Topic::Value, tag.unwrap_or_default()),
            Err(e) => {
                warn!(device = %self.id, "Tag read failed: {}", e);
                self.set_state(DeviceState::Error);
            }
        }
    }
}

impl Hsm for NfcReader {
    type State = DeviceState;

    fn machine(&self) -> &StateMachine<DeviceState> {
        &self.sm
    }

    fn machine_mut(&mut self) -> &mut StateMachine<DeviceState> {
        &mut self.sm
    }

    fn on_enter(&mut self, state: DeviceState) {
        self.publisher.announce(Topic::State, state.name());
    }
}

impl Behavior for NfcReader {
    fn dispatch(&mut self, message: Message) {
        let Message::Event(event) = message else {
            return;
        };
        match (self.current(), event.kind) {
            (DeviceState::Initialized, EventKind::Initialize) => {
                self.publisher.announce(Topic::State, DeviceState::Initialized.name());
            }
            (_, EventKind::Initialize) => self.set_state(DeviceState::Initialized),
            (DeviceState::Initialized, EventKind::Update) => self.refresh(),
            (state, kind) => debug!(device = %self.id, ?state, ?kind, "Ignored"),
        }
    }
}
