//! Status LED with separate red, green and blue outputs.

use std::sync::Arc;

use modcell_common::io::image::ProcessImage;
use tracing::{debug, error};

use super::DeviceState;
use crate::runtime::active::Behavior;
use crate::runtime::hsm::{Hsm, StateId, StateMachine};
use crate::runtime::message::{ActorId, EventKind, Message, Topic};
use crate::runtime::pubsub::Publisher;

/// Colors the status LED can show.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LedColor {
    Off,
    Red,
    Green,
    Yellow,
    Purple,
}

impl LedColor {
    /// Levels of the red, green and blue lines.
    pub const fn channels(self) -> (bool, bool, bool) {
        match self {
            Self::Off => (false, false, false),
            Self::Red => (true, false, false),
            Self::Green => (false, true, false),
            Self::Yellow => (true, true, false),
            Self::Purple => (true, false, true),
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            Self::Off => "Off",
            Self::Red => "Red",
            Self::Green => "Green",
            Self::Yellow => "Yellow",
            Self::Purple => "Purple",
        }
    }
}

/// Line names of the three color channels.
#[derive(Debug, Clone)]
pub struct RgbPins {
    pub red: String,
    pub green: String,
    pub blue: String,
}

pub struct RgbLed {
    id: ActorId,
    sm: StateMachine<DeviceState>,
    publisher: Arc<Publisher>,
    image: Arc<dyn ProcessImage>,
    pins: RgbPins,
    color: LedColor,
}

impl RgbLed {
    pub fn new(
        id: ActorId,
        publisher: Arc<Publisher>,
        image: Arc<dyn ProcessImage>,
        pins: RgbPins,
    ) -> Self {
        Self {
            id,
            sm: StateMachine::new("rgb_led", DeviceState::NotInitialized),
            publisher,
            image,
            pins,
            color: LedColor::Off,
        }
    }

    pub fn color(&self) -> LedColor {
        self.color
    }

    fn show(&mut self, color: LedColor) {
        let (r, g, b) = color.channels();
        let levels = [
            (self.pins.red.as_str(), r),
            (self.pins.green.as_str(), g),
            (self.pins.blue.as_str(), b),
        ];
        match self.image.write_outputs(&levels) {
            Ok(()) => {
                self.color = color;
                self.publisher.announce(Topic::Value, color.name());
            }
            Err(e) => {
                error!(device = %self.id, "LED write failed: {}", e);
                self.set_state(DeviceState::Error);
            }
        }
    }
}

impl Hsm for RgbLed {
    type State = DeviceState;

    fn machine(&self) -> &StateMachine<DeviceState> {
        &self.sm
    }

    fn machine_mut(&mut self) -> &mut StateMachine<DeviceState> {
        &mut self.sm
    }

    fn on_enter(&mut self, state: DeviceState) {
        self.publisher.announce(Topic::State, state.name());
        if state == DeviceState::Initialized {
            let color = self.color;
            self.show(color);
        }
    }
}

impl Behavior for RgbLed {
    fn dispatch(&mut self, message: Message) {
        let Message::Event(event) = message else {
            return;
        };
        match (self.current(), event.kind) {
            (DeviceState::Initialized, EventKind::Initialize) => {
                self.publisher.announce(Topic::State, DeviceState::Initialized.name());
            }
            (_, EventKind::Initialize) => self.set_state(DeviceState::Initialized),
            (DeviceState::Initialized, EventKind::Color(color)) => self.show(color),
            (DeviceState::Initialized, EventKind::Update) => {
                self.publisher.announce(Topic::Value, self.color.name());
            }
            (state, kind) => debug!(device = %self.id, ?state, ?kind, "Ignored"),
        }
    }

    fn on_stop(&mut self) {
        let _ = self.image.write_outputs(&[
            (self.pins.red.as_str(), false),
            (self.pins.green.as_str(), false),
            (self.pins.blue.as_str(), false),
        ]);
    }
}
