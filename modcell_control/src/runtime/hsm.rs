//! Hierarchical state machine engine.
//!
//! States form a tree at most two levels deep: top-level states and
//! substates of a composite top-level state. Transitions run exit actions
//! innermost first, then the entry action of the target. Entry actions may
//! transition again; the nested transition runs to completion before the
//! outer call returns.
//!
//! Input handling is per machine: each machine matches on
//! `(current state, input)` and delegates unhandled pairs to
//! [`StateId::parent`], ending at the machine's global handler.

use core::fmt;

use heapless::Vec as StackVec;
use tracing::debug;

/// Identifier of one state of a machine.
pub trait StateId: Copy + Eq + fmt::Debug + Send + 'static {
    /// Every state of the machine.
    fn all() -> &'static [Self];

    /// Composite state containing this one, `None` for top-level states.
    fn parent(self) -> Option<Self>;

    /// Published name of the state.
    fn name(self) -> &'static str;

    fn is_substate(self) -> bool {
        self.parent().is_some()
    }

    /// Top-level state this one belongs to.
    fn top(self) -> Self {
        self.parent().unwrap_or(self)
    }

    fn from_name(name: &str) -> Option<Self> {
        Self::all().iter().copied().find(|s| s.name() == name)
    }
}

/// Current state of one machine.
#[derive(Debug, Clone)]
pub struct StateMachine<S: StateId> {
    name: &'static str,
    current: S,
    transitions: u64,
}

impl<S: StateId> StateMachine<S> {
    pub fn new(name: &'static str, initial: S) -> Self {
        Self {
            name,
            current: initial,
            transitions: 0,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    #[inline]
    pub fn current(&self) -> S {
        self.current
    }

    /// True if the current state is `state` or one of its substates.
    pub fn is_in(&self, state: S) -> bool {
        self.current == state || self.current.parent() == Some(state)
    }

    /// Completed transitions since construction.
    pub fn transitions(&self) -> u64 {
        self.transitions
    }

    /// States to exit, innermost first, on the way to `target`.
    ///
    /// - top-level to its own substate: nothing is exited
    /// - substate to a top-level state: the substate, then its parent
    /// - anything else: the current state only
    pub fn exit_path(&self, target: S) -> StackVec<S, 2> {
        let mut path = StackVec::new();
        let current = self.current;
        if target.parent() == Some(current) {
            return path;
        }
        let _ = path.push(current);
        if let (Some(parent), None) = (current.parent(), target.parent()) {
            let _ = path.push(parent);
        }
        path
    }

    fn assign(&mut self, target: S) {
        debug!(
            machine = self.name,
            from = self.current.name(),
            to = target.name(),
            "transition"
        );
        self.current = target;
        self.transitions += 1;
    }
}

/// A type driven by a [`StateMachine`].
pub trait Hsm {
    type State: StateId;

    fn machine(&self) -> &StateMachine<Self::State>;

    fn machine_mut(&mut self) -> &mut StateMachine<Self::State>;

    /// Entry action of `state`.
    fn on_enter(&mut self, state: Self::State);

    /// Exit action of `state`.
    fn on_exit(&mut self, _state: Self::State) {}

    fn current(&self) -> Self::State {
        self.machine().current()
    }

    /// Run the entry action of the initial state.
    fn start_machine(&mut self) {
        let initial = self.current();
        self.on_enter(initial);
    }

    /// Transition to `target`.
    fn set_state(&mut self, target: Self::State) {
        let exits = self.machine().exit_path(target);
        for state in exits {
            self.on_exit(state);
        }
        self.machine_mut().assign(target);
        self.on_enter(target);
    }
}
