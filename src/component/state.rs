//! Component states and the legal transitions between them.

use std::fmt;

/// Top-level component state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum State {
    /// Created; no buffers, transports closed.
    Loaded,
    /// Buffers allocated, transports open, not processing.
    Idle,
    /// Processing data.
    Executing,
    /// Processing suspended; buffers held.
    Pause,
    /// Waiting for resources to become available before going Idle.
    WaitForResources,
    /// Unrecoverable; only deinitialization is possible.
    Invalid,
}

impl State {
    /// Whether `self -> to` is a legal transition.
    ///
    /// Any state may move to `Invalid`. Transitions out of `Invalid` are
    /// never legal.
    pub fn can_transition_to(self, to: State) -> bool {
        use State::*;
        match (self, to) {
            (Invalid, _) => false,
            (_, Invalid) => true,
            (Loaded, Idle) | (Idle, Loaded) => true,
            (Loaded, WaitForResources) | (WaitForResources, Loaded) => true,
            (WaitForResources, Idle) => true,
            (Idle, Executing) | (Executing, Idle) => true,
            (Idle, Pause) | (Pause, Idle) => true,
            (Executing, Pause) | (Pause, Executing) => true,
            _ => false,
        }
    }

    /// Whether client buffers may flow through the ports.
    pub fn accepts_buffers(self) -> bool {
        matches!(self, State::Idle | State::Executing | State::Pause)
    }

    /// Whether port transports are open in this state.
    pub fn has_open_ports(self) -> bool {
        self.accepts_buffers()
    }

    /// Name of the state.
    pub fn as_str(self) -> &'static str {
        match self {
            State::Loaded => "Loaded",
            State::Idle => "Idle",
            State::Executing => "Executing",
            State::Pause => "Pause",
            State::WaitForResources => "WaitForResources",
            State::Invalid => "Invalid",
        }
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Current state plus the target of the latest accepted StateSet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct StateInfo {
    pub current: State,
    pub pending: Option<State>,
    // StateSet(Loaded) commands queued or running. `pending` only holds the
    // latest target, which a later StateSet may have replaced.
    pub unloads: u32,
}

impl StateInfo {
    pub fn new() -> Self {
        Self {
            current: State::Loaded,
            pending: None,
            unloads: 0,
        }
    }

    /// The state the component is heading to once queued commands run.
    pub fn effective(&self) -> State {
        self.pending.unwrap_or(self.current)
    }

    /// Whether an Idle to Loaded transition is queued or running.
    pub fn unloading(&self) -> bool {
        self.current == State::Idle && self.unloads > 0
    }

    /// Record an accepted StateSet.
    pub fn queue_target(&mut self, target: State) {
        self.pending = Some(target);
        if target == State::Loaded {
            self.unloads += 1;
        }
    }

    /// Record that the worker finished a StateSet, successfully or not.
    pub fn settle(&mut self, target: State) {
        if self.pending == Some(target) {
            self.pending = None;
        }
        if target == State::Loaded {
            self.unloads = self.unloads.saturating_sub(1);
        }
    }
}
