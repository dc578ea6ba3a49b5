//! I/O Registry: role-based lookup of the station wiring.
//!
//! Built at startup from [`IoConfig`]. Immutable after construction.

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use thiserror::Error;

use super::config::{IoConfig, IoPoint};
use super::role::{DiLogic, IoPointType, IoRole};

// ─── Error Types ────────────────────────────────────────────────────

/// I/O configuration validation error.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IoConfigError {
    /// Two points share the same line name.
    #[error("duplicate pin '{pin}' used by '{role_a}' and '{role_b}'")]
    PinDuplicate {
        pin: String,
        role_a: String,
        role_b: String,
    },

    /// Two points share the same role.
    #[error("duplicate role '{role}'")]
    RoleDuplicate { role: String },

    /// Role assigned to the wrong I/O type.
    #[error("role '{role}' must be {expected}, found {actual}")]
    RoleTypeMismatch {
        role: String,
        expected: IoPointType,
        actual: IoPointType,
    },

    /// A device requires a role that is not wired.
    #[error("role '{role}' required by {peripheral} is not configured")]
    RoleMissing { role: String, peripheral: String },

    /// Role string failed to parse.
    #[error("invalid role '{role_str}': {error}")]
    RoleParseError { role_str: String, error: String },

    /// Linked reaction refers to unknown roles or has no effect.
    #[error("invalid reaction {trigger} -> {target}: {reason}")]
    ReactionInvalid {
        trigger: String,
        target: String,
        reason: String,
    },
}

// ─── Bindings ───────────────────────────────────────────────────────

/// Resolved I/O point.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IoBinding {
    pub pin: String,
    pub io_type: IoPointType,
    pub logic: DiLogic,
    pub initial: i64,
}

/// Effect of a linked reaction on its target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReactionEffect {
    Digital(bool),
    Analog(i64),
}

/// Linked reaction resolved to line names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedReaction {
    pub trigger_pin: String,
    pub level: bool,
    pub target_pin: String,
    pub effect: ReactionEffect,
    pub delay: Duration,
    pub hold: bool,
}

// ─── Registry ───────────────────────────────────────────────────────

/// Role → binding map of one station.
#[derive(Debug, Clone, Default)]
pub struct IoRegistry {
    bindings: HashMap<IoRole, IoBinding>,
    reactions: Vec<ResolvedReaction>,
    pub di_count: u16,
    pub do_count: u16,
    pub ai_count: u16,
    pub ao_count: u16,
}

impl IoRegistry {
    /// Build the registry from an `IoConfig`, running all validation rules.
    ///
    /// Returns the first validation error encountered.
    pub fn from_config(config: &IoConfig) -> Result<Self, IoConfigError> {
        let mut registry = Self::default();
        let mut pin_owner: HashMap<&str, &str> = HashMap::new();
        let mut seen_roles: HashSet<&str> = HashSet::new();

        for point in &config.points {
            if let Some(prev) = pin_owner.insert(point.pin.as_str(), point.role.as_str()) {
                return Err(IoConfigError::PinDuplicate {
                    pin: point.pin.clone(),
                    role_a: prev.to_string(),
                    role_b: point.role.clone(),
                });
            }
            if !seen_roles.insert(point.role.as_str()) {
                return Err(IoConfigError::RoleDuplicate {
                    role: point.role.clone(),
                });
            }

            let role: IoRole = point.role.parse().map_err(|e: String| {
                IoConfigError::RoleParseError {
                    role_str: point.role.clone(),
                    error: e,
                }
            })?;

            if let Some(expected) = role.expected_io_type() {
                if expected != point.io_type {
                    return Err(IoConfigError::RoleTypeMismatch {
                        role: point.role.clone(),
                        expected,
                        actual: point.io_type,
                    });
                }
            }

            match point.io_type {
                IoPointType::Di => registry.di_count += 1,
                IoPointType::Do => registry.do_count += 1,
                IoPointType::Ai => registry.ai_count += 1,
                IoPointType::Ao => registry.ao_count += 1,
            }
            registry.bindings.insert(role, Self::build_binding(point));
        }

        for reaction in &config.reactions {
            let invalid = |reason: &str| IoConfigError::ReactionInvalid {
                trigger: reaction.trigger.clone(),
                target: reaction.target.clone(),
                reason: reason.to_string(),
            };
            let trigger = registry
                .binding_for_str(&reaction.trigger)
                .ok_or_else(|| invalid("unknown trigger role"))?;
            if trigger.io_type != IoPointType::Do {
                return Err(invalid("trigger must be a digital output"));
            }
            let target = registry
                .binding_for_str(&reaction.target)
                .ok_or_else(|| invalid("unknown target role"))?;
            let effect = match (reaction.set, reaction.analog, target.io_type) {
                (Some(level), None, IoPointType::Di) => ReactionEffect::Digital(level),
                (None, Some(value), IoPointType::Ai) => ReactionEffect::Analog(value),
                _ => return Err(invalid("effect does not match target type")),
            };
            let resolved = ResolvedReaction {
                trigger_pin: trigger.pin.clone(),
                level: reaction.level,
                target_pin: target.pin.clone(),
                effect,
                delay: Duration::from_millis(reaction.delay_ms),
                hold: reaction.hold,
            };
            registry.reactions.push(resolved);
        }

        Ok(registry)
    }

    fn build_binding(point: &IoPoint) -> IoBinding {
        IoBinding {
            pin: point.pin.clone(),
            io_type: point.io_type,
            logic: point.logic.unwrap_or_default(),
            initial: point.initial.unwrap_or(0),
        }
    }

    fn binding_for_str(&self, role: &str) -> Option<&IoBinding> {
        role.parse::<IoRole>()
            .ok()
            .and_then(|role| self.bindings.get(&role))
    }

    /// Look up a binding by role.
    pub fn get(&self, role: &IoRole) -> Option<&IoBinding> {
        self.bindings.get(role)
    }

    /// Check if a role exists in the registry.
    pub fn has_role(&self, role: &IoRole) -> bool {
        self.bindings.contains_key(role)
    }

    /// Number of registered role bindings.
    pub fn role_count(&self) -> usize {
        self.bindings.len()
    }

    /// Resolve a role that `peripheral` cannot work without.
    pub fn require(&self, role: &IoRole, peripheral: &str) -> Result<&IoBinding, IoConfigError> {
        self.bindings
            .get(role)
            .ok_or_else(|| IoConfigError::RoleMissing {
                role: role.to_string(),
                peripheral: peripheral.to_string(),
            })
    }

    /// All bindings, in no particular order.
    pub fn bindings(&self) -> impl Iterator<Item = (&IoRole, &IoBinding)> {
        self.bindings.iter()
    }

    /// Linked reactions for the simulated process image.
    pub fn reactions(&self) -> &[ResolvedReaction] {
        &self.reactions
    }
}
