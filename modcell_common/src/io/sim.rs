//! Simulated process image.
//!
//! Keeps digital and analog points in memory and answers output changes
//! through linked reactions: an output reaching a level schedules an input
//! change after a delay, the way a motor running toward a position sensor
//! eventually trips it. Delays run on the tokio timer, so tests with a
//! paused clock replay a whole station cycle deterministically.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tracing::{debug, trace, warn};

use super::image::{Edge, EdgeCallback, IoError, ProcessImage};
use super::registry::{IoRegistry, ReactionEffect, ResolvedReaction};
use super::role::IoPointType;

#[derive(Default)]
struct SimState {
    inputs: HashMap<String, bool>,
    outputs: HashMap<String, bool>,
    analog_in: HashMap<String, i64>,
    analog_out: HashMap<String, i64>,
    callbacks: HashMap<String, Vec<EdgeCallback>>,
    reactions: Vec<ResolvedReaction>,
    suppressed: HashSet<String>,
}

impl SimState {
    /// Error for a point missing from the map of `expected` type.
    fn missing(&self, point: &str, expected: IoPointType) -> IoError {
        let known = self.inputs.contains_key(point)
            || self.outputs.contains_key(point)
            || self.analog_in.contains_key(point)
            || self.analog_out.contains_key(point);
        if known {
            IoError::WrongType {
                point: point.to_string(),
                expected,
            }
        } else {
            IoError::UnknownPoint(point.to_string())
        }
    }
}

/// In-memory [`ProcessImage`] with linked reactions.
pub struct SimulatedProcessImage {
    me: Weak<SimulatedProcessImage>,
    state: Mutex<SimState>,
}

impl SimulatedProcessImage {
    /// Empty image; add points with the `add_*` methods.
    pub fn new() -> Arc<Self> {
        Arc::new_cyclic(|me| Self {
            me: me.clone(),
            state: Mutex::new(SimState::default()),
        })
    }

    /// Image holding every point and reaction of `registry`.
    pub fn from_registry(registry: &IoRegistry) -> Arc<Self> {
        let image = Self::new();
        for (_, binding) in registry.bindings() {
            match binding.io_type {
                IoPointType::Di => image.add_input(&binding.pin, binding.initial != 0),
                IoPointType::Do => image.add_output(&binding.pin),
                IoPointType::Ai => image.add_analog_input(&binding.pin, binding.initial),
                IoPointType::Ao => image.add_analog_output(&binding.pin),
            }
        }
        for reaction in registry.reactions() {
            image.add_reaction(reaction.clone());
        }
        debug!(
            "Simulated process image: {} DI, {} DO, {} AI, {} AO, {} reactions",
            registry.di_count,
            registry.do_count,
            registry.ai_count,
            registry.ao_count,
            registry.reactions().len()
        );
        image
    }

    pub fn add_input(&self, point: &str, level: bool) {
        self.state.lock().inputs.insert(point.to_string(), level);
    }

    pub fn add_output(&self, point: &str) {
        self.state.lock().outputs.insert(point.to_string(), false);
    }

    pub fn add_analog_input(&self, point: &str, value: i64) {
        self.state.lock().analog_in.insert(point.to_string(), value);
    }

    pub fn add_analog_output(&self, point: &str) {
        self.state.lock().analog_out.insert(point.to_string(), 0);
    }

    pub fn add_reaction(&self, reaction: ResolvedReaction) {
        self.state.lock().reactions.push(reaction);
    }

    /// Withhold every reaction that would change `target`.
    pub fn suppress(&self, target: &str) {
        self.state.lock().suppressed.insert(target.to_string());
    }

    /// Re-enable reactions on `target`.
    pub fn release(&self, target: &str) {
        self.state.lock().suppressed.remove(target);
    }

    /// Drive a digital input to a raw level, firing edge callbacks on change.
    pub fn set_input(&self, point: &str, level: bool) -> Result<(), IoError> {
        let (edge, callbacks) = {
            let mut state = self.state.lock();
            if !state.inputs.contains_key(point) {
                return Err(state.missing(point, IoPointType::Di));
            }
            let previous = state
                .inputs
                .insert(point.to_string(), level)
                .unwrap_or(false);
            let edge = Edge::between(previous, level);
            let callbacks = match edge {
                Some(_) => state.callbacks.get(point).cloned().unwrap_or_default(),
                None => Vec::new(),
            };
            (edge, callbacks)
        };

        if let Some(edge) = edge {
            trace!(point, ?edge, "input edge");
            for callback in callbacks {
                callback(edge);
            }
        }
        Ok(())
    }

    /// Set the raw counts of an analog input.
    pub fn set_analog(&self, point: &str, value: i64) -> Result<(), IoError> {
        let mut state = self.state.lock();
        if !state.analog_in.contains_key(point) {
            return Err(state.missing(point, IoPointType::Ai));
        }
        state.analog_in.insert(point.to_string(), value);
        Ok(())
    }

    /// Last value written to an analog output.
    pub fn analog_output(&self, point: &str) -> Result<i64, IoError> {
        let state = self.state.lock();
        state
            .analog_out
            .get(point)
            .copied()
            .ok_or_else(|| state.missing(point, IoPointType::Ao))
    }

    fn schedule(&self, reaction: ResolvedReaction) {
        let Some(me) = self.me.upgrade() else {
            return;
        };
        if reaction.delay.is_zero() {
            me.apply(&reaction);
            return;
        }
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    tokio::time::sleep(reaction.delay).await;
                    me.apply(&reaction);
                });
            }
            Err(_) => {
                debug!("No async runtime, applying reaction on {} at once", reaction.target_pin);
                me.apply(&reaction);
            }
        }
    }

    fn apply(&self, reaction: &ResolvedReaction) {
        {
            let state = self.state.lock();
            if state.suppressed.contains(&reaction.target_pin) {
                return;
            }
            if reaction.hold {
                let held = state.outputs.get(&reaction.trigger_pin).copied().unwrap_or(false);
                if held != reaction.level {
                    trace!(trigger = %reaction.trigger_pin, "reaction dropped, trigger released");
                    return;
                }
            }
        }
        let result = match reaction.effect {
            ReactionEffect::Digital(level) => self.set_input(&reaction.target_pin, level),
            ReactionEffect::Analog(value) => self.set_analog(&reaction.target_pin, value),
        };
        if let Err(e) = result {
            warn!("Reaction on {} failed: {}", reaction.target_pin, e);
        }
    }
}

impl ProcessImage for SimulatedProcessImage {
    fn read_input(&self, point: &str) -> Result<bool, IoError> {
        let state = self.state.lock();
        state
            .inputs
            .get(point)
            .copied()
            .ok_or_else(|| state.missing(point, IoPointType::Di))
    }

    fn read_output(&self, point: &str) -> Result<bool, IoError> {
        let state = self.state.lock();
        state
            .outputs
            .get(point)
            .copied()
            .ok_or_else(|| state.missing(point, IoPointType::Do))
    }

    fn write_outputs(&self, levels: &[(&str, bool)]) -> Result<(), IoError> {
        let fired = {
            let mut guard = self.state.lock();
            let state = &mut *guard;
            if let Some((point, _)) = levels.iter().find(|(p, _)| !state.outputs.contains_key(*p)) {
                return Err(state.missing(point, IoPointType::Do));
            }
            let mut fired = Vec::new();
            for &(point, level) in levels {
                let previous = state.outputs.insert(point.to_string(), level).unwrap_or(false);
                if previous == level {
                    continue;
                }
                trace!(point, level, "output changed");
                fired.extend(
                    state
                        .reactions
                        .iter()
                        .filter(|r| r.trigger_pin == point && r.level == level)
                        .cloned(),
                );
            }
            fired
        };

        for reaction in fired {
            self.schedule(reaction);
        }
        Ok(())
    }

    fn read_analog(&self, point: &str) -> Result<i64, IoError> {
        let state = self.state.lock();
        state
            .analog_in
            .get(point)
            .copied()
            .ok_or_else(|| state.missing(point, IoPointType::Ai))
    }

    fn write_analog(&self, point: &str, value: i64) -> Result<(), IoError> {
        let mut state = self.state.lock();
        if !state.analog_out.contains_key(point) {
            return Err(state.missing(point, IoPointType::Ao));
        }
        state.analog_out.insert(point.to_string(), value);
        Ok(())
    }

    fn on_edge(&self, point: &str, callback: EdgeCallback) -> Result<(), IoError> {
        let mut state = self.state.lock();
        if !state.inputs.contains_key(point) {
            return Err(state.missing(point, IoPointType::Di));
        }
        state
            .callbacks
            .entry(point.to_string())
            .or_default()
            .push(callback);
        Ok(())
    }
}
