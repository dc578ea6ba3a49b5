//! LED blinker.
//!
//! Drives the status shutter line, which blanks the status LED while
//! asserted. Blinking alternates the shutter between its on and off phases
//! with a self-posted timer; stopping leaves the shutter released so the
//! LED shows its steady color.

use std::sync::Arc;
use std::time::Duration;

use modcell_common::io::image::ProcessImage;
use tracing::{debug, error};

use crate::runtime::active::{ActorRef, Behavior};
use crate::runtime::hsm::{Hsm, StateId, StateMachine};
use crate::runtime::message::{ActorId, Event, EventKind, Message, TimerId, Topic};
use crate::runtime::pubsub::Publisher;
use crate::runtime::timer::MonitoringTimer;

/// Shutter timing of one blink sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlinkPattern {
    /// Time the shutter blanks the LED.
    pub on: Duration,
    /// Time the LED is visible.
    pub off: Duration,
    /// Number of cycles, `None` to blink until stopped.
    pub count: Option<u32>,
}

impl BlinkPattern {
    pub const fn continuous(on: Duration, off: Duration) -> Self {
        Self {
            on,
            off,
            count: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlinkerState {
    NotInitialized,
    Initialized,
    Blinking,
    ShutterOn,
    ShutterOff,
    Error,
}

impl StateId for BlinkerState {
    fn all() -> &'static [Self] {
        &[
            Self::NotInitialized,
            Self::Initialized,
            Self::Blinking,
            Self::ShutterOn,
            Self::ShutterOff,
            Self::Error,
        ]
    }

    fn parent(self) -> Option<Self> {
        match self {
            Self::ShutterOn | Self::ShutterOff => Some(Self::Blinking),
            _ => None,
        }
    }

    fn name(self) -> &'static str {
        match self {
            Self::NotInitialized => "NotInitialized",
            Self::Initialized => "Initialized",
            Self::Blinking => "Blinking",
            Self::ShutterOn => "ShutterOn",
            Self::ShutterOff => "ShutterOff",
            Self::Error => "Error",
        }
    }
}

pub struct Blinker {
    id: ActorId,
    sm: StateMachine<BlinkerState>,
    publisher: Arc<Publisher>,
    image: Arc<dyn ProcessImage>,
    pin: String,
    pattern: BlinkPattern,
    remaining: Option<u32>,
    phase: MonitoringTimer,
}

impl Blinker {
    pub fn new(
        me: ActorRef,
        publisher: Arc<Publisher>,
        image: Arc<dyn ProcessImage>,
        pin: impl Into<String>,
        pattern: BlinkPattern,
    ) -> Self {
        let id = me.id();
        let phase = MonitoringTimer::posting(
            pattern.on,
            me,
            Event::new(EventKind::Timeout(TimerId::BlinkPhase), id),
        );
        Self {
            id,
            sm: StateMachine::new("blinker", BlinkerState::NotInitialized),
            publisher,
            image,
            pin: pin.into(),
            pattern,
            remaining: None,
            phase,
        }
    }

    fn shutter(&mut self, blank: bool) -> bool {
        match self.image.write_output(&self.pin, blank) {
            Ok(()) => true,
            Err(e) => {
                error!(device = %self.id, "Shutter write failed: {}", e);
                self.set_state(BlinkerState::Error);
                false
            }
        }
    }

    fn arm(&mut self, interval: Duration) {
        self.phase.set_interval(interval);
        self.phase.start();
    }

    fn end_of_cycle(&mut self) {
        match self.remaining {
            Some(n) if n <= 1 => self.set_state(BlinkerState::Initialized),
            Some(n) => {
                self.remaining = Some(n - 1);
                self.set_state(BlinkerState::ShutterOn);
            }
            None => self.set_state(BlinkerState::ShutterOn),
        }
    }
}

impl Hsm for Blinker {
    type State = BlinkerState;

    fn machine(&self) -> &StateMachine<BlinkerState> {
        &self.sm
    }

    fn machine_mut(&mut self) -> &mut StateMachine<BlinkerState> {
        &mut self.sm
    }

    fn on_enter(&mut self, state: BlinkerState) {
        match state {
            BlinkerState::NotInitialized => {}
            BlinkerState::Initialized => {
                if self.shutter(false) {
                    self.publisher.announce(Topic::State, state.name());
                    self.publisher.announce(Topic::Value, false);
                }
            }
            BlinkerState::Blinking => {
                self.publisher.announce(Topic::State, state.name());
                self.publisher.announce(Topic::Value, true);
                self.remaining = self.pattern.count;
                self.set_state(BlinkerState::ShutterOn);
            }
            BlinkerState::ShutterOn => {
                if self.shutter(true) {
                    self.arm(self.pattern.on);
                }
            }
            BlinkerState::ShutterOff => {
                if self.shutter(false) {
                    self.arm(self.pattern.off);
                }
            }
            BlinkerState::Error => {
                self.phase.cancel();
                self.publisher.announce(Topic::State, state.name());
            }
        }
    }

    fn on_exit(&mut self, state: BlinkerState) {
        if state == BlinkerState::Blinking {
            self.phase.cancel();
            let _ = self.image.write_output(&self.pin, false);
        }
    }
}

impl Behavior for Blinker {
    fn dispatch(&mut self, message: Message) {
        let Message::Event(event) = message else {
            return;
        };
        use BlinkerState::*;
        match (self.current(), event.kind) {
            (Initialized, EventKind::Initialize) => {
                self.publisher.announce(Topic::State, Initialized.name());
            }
            (s, EventKind::Initialize) if s.top() == Blinking => {
                self.publisher.announce(Topic::State, Blinking.name());
            }
            (_, EventKind::Initialize) => self.set_state(Initialized),
            (Initialized, EventKind::BlinkStart(pattern)) => {
                self.pattern = pattern;
                self.set_state(Blinking);
            }
            (s, EventKind::BlinkStop) if s.top() == Blinking => self.set_state(Initialized),
            (Initialized, EventKind::BlinkStop) => {
                self.shutter(false);
            }
            (ShutterOn, EventKind::Timeout(TimerId::BlinkPhase)) => self.set_state(ShutterOff),
            (ShutterOff, EventKind::Timeout(TimerId::BlinkPhase)) => self.end_of_cycle(),
            (state, kind) => debug!(device = %self.id, ?state, ?kind, "Ignored"),
        }
    }

    fn on_stop(&mut self) {
        self.phase.cancel();
        let _ = self.image.write_output(&self.pin, false);
    }
}
