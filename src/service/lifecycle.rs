//! Dispatch lifecycle states and the per-dispatch report.

use std::fmt;

use crate::domain::{ConnId, PoolId};
use crate::error::DispatchError;

/// State of one dispatch. Transitions are strictly linear; `Errored` is
/// reachable from any non-terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DispatchState {
    /// Request received, nothing checked yet.
    Pending,
    /// Verifier passed (or none configured).
    Verified,
    /// Live connection obtained.
    Upgraded,
    /// Connection registered in a pool.
    Assigned,
    /// Processor returned, successfully or not.
    Handled,
    /// Connection removed from its pool.
    Released,
    /// A step failed; no further transitions.
    Errored,
}

impl DispatchState {
    /// Returns `true` for `Released` and `Errored`.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Released | Self::Errored)
    }

    /// The state that follows on success, `None` for terminal states.
    #[must_use]
    pub const fn next(self) -> Option<Self> {
        match self {
            Self::Pending => Some(Self::Verified),
            Self::Verified => Some(Self::Upgraded),
            Self::Upgraded => Some(Self::Assigned),
            Self::Assigned => Some(Self::Handled),
            Self::Handled => Some(Self::Released),
            Self::Released | Self::Errored => None,
        }
    }

    /// Returns `true` if moving from `self` to `to` is a legal transition.
    #[must_use]
    pub fn can_transition_to(self, to: Self) -> bool {
        if self.is_terminal() {
            return false;
        }
        to == Self::Errored || self.next() == Some(to)
    }

    /// Lower-case state name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Verified => "verified",
            Self::Upgraded => "upgraded",
            Self::Assigned => "assigned",
            Self::Handled => "handled",
            Self::Released => "released",
            Self::Errored => "errored",
        }
    }
}

impl fmt::Display for DispatchState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What the dispatch knew when an error was reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatchContext {
    /// State the failing step started from.
    pub state: DispatchState,
    /// Connection identity, once upgraded.
    pub conn_id: Option<ConnId>,
    /// Pool, once assigned.
    pub pool_id: Option<PoolId>,
}

/// Outcome of one dispatch: every state entered, in order, plus every error
/// raised along the way.
#[derive(Debug)]
pub struct DispatchReport {
    /// Connection identity, once upgraded.
    pub conn_id: Option<ConnId>,
    /// Pool the connection was assigned to, if any.
    pub pool_id: Option<PoolId>,
    /// States entered, starting with `Pending`.
    pub transitions: Vec<DispatchState>,
    /// Errors raised, in order.
    pub errors: Vec<DispatchError>,
}

impl DispatchReport {
    /// A fresh report in `Pending`.
    #[must_use]
    pub fn new() -> Self {
        Self {
            conn_id: None,
            pool_id: None,
            transitions: vec![DispatchState::Pending],
            errors: Vec::new(),
        }
    }

    /// Current (or final) state.
    #[must_use]
    pub fn state(&self) -> DispatchState {
        self.transitions
            .last()
            .copied()
            .unwrap_or(DispatchState::Pending)
    }

    /// Returns `true` if the dispatch passed through `state`.
    #[must_use]
    pub fn reached(&self, state: DispatchState) -> bool {
        self.transitions.contains(&state)
    }

    /// Returns `true` if the dispatch released its connection without any
    /// error along the way.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.state() == DispatchState::Released && self.errors.is_empty()
    }

    /// Context for an error raised from the current state.
    #[must_use]
    pub fn context(&self) -> DispatchContext {
        DispatchContext {
            state: self.state(),
            conn_id: self.conn_id,
            pool_id: self.pool_id,
        }
    }

    /// Moves to `to`. Illegal transitions are ignored and logged.
    pub fn enter(&mut self, to: DispatchState) {
        let from = self.state();
        if from.can_transition_to(to) {
            self.transitions.push(to);
        } else {
            tracing::error!(%from, %to, "illegal dispatch transition ignored");
        }
    }
}

impl Default for DispatchReport {
    fn default() -> Self {
        Self::new()
    }
}
