//! Bounded transition history.
//!
//! Keeps the most recently fired transitions of a machine for diagnostics
//! and report generators. Older records are dropped once the capacity is
//! reached.

use super::state::{EventKind, State};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::time::Duration;

/// Default number of transitions kept by a machine.
pub const DEFAULT_HISTORY_CAPACITY: usize = 64;

/// Record of a single fired transition.
///
/// # Example
///
/// ```rust
/// use hsm_actors::core::TransitionRecord;
/// use hsm_actors::{event_enum, state_enum};
/// use chrono::Utc;
///
/// state_enum! {
///     enum Phase {
///         Root,
///         Idle,
///         Running,
///     }
/// }
///
/// event_enum! {
///     enum Command {
///         Start,
///     }
/// }
///
/// let record = TransitionRecord {
///     source: Phase::Idle,
///     target: Some(Phase::Running),
///     event: Command::Start,
///     local: false,
///     timestamp: Utc::now(),
/// };
/// assert!(record.changes_state());
/// ```
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(bound = "")]
pub struct TransitionRecord<S: State, E: EventKind> {
    /// The state declaring the transition
    pub source: S,
    /// The target state, `None` for internal transitions
    pub target: Option<S>,
    /// The kind of the triggering event
    pub event: E,
    /// Whether the transition was declared local
    pub local: bool,
    /// When the transition fired
    pub timestamp: DateTime<Utc>,
}

impl<S: State, E: EventKind> TransitionRecord<S, E> {
    /// Whether firing this transition changed the active configuration.
    pub fn changes_state(&self) -> bool {
        !self.local && self.target.is_some()
    }
}

/// Ordered, bounded history of fired transitions.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(bound = "")]
pub struct TransitionHistory<S: State, E: EventKind> {
    capacity: usize,
    records: VecDeque<TransitionRecord<S, E>>,
}

impl<S: State, E: EventKind> Default for TransitionHistory<S, E> {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_HISTORY_CAPACITY)
    }
}

impl<S: State, E: EventKind> TransitionHistory<S, E> {
    /// Create an empty history keeping at most `capacity` records.
    ///
    /// A capacity of zero disables recording.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity,
            records: VecDeque::with_capacity(capacity.min(DEFAULT_HISTORY_CAPACITY)),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Record a transition, evicting the oldest record when full.
    pub fn record(&mut self, record: TransitionRecord<S, E>) {
        if self.capacity == 0 {
            return;
        }
        if self.records.len() == self.capacity {
            self.records.pop_front();
        }
        self.records.push_back(record);
    }

    /// Records in firing order, oldest first.
    pub fn records(&self) -> impl Iterator<Item = &TransitionRecord<S, E>> {
        self.records.iter()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Get the path of states traversed by state-changing transitions.
    ///
    /// Returns the source of the first such transition, then the target of
    /// each one in order. Internal and local transitions do not contribute.
    pub fn path(&self) -> Vec<S> {
        let mut path = Vec::new();
        let mut changing = self.records.iter().filter(|r| r.changes_state());
        if let Some(first) = changing.next() {
            path.push(first.source);
            path.extend(first.target);
        }
        for record in changing {
            path.extend(record.target);
        }
        path
    }

    /// Time elapsed between the oldest and the newest record.
    ///
    /// Returns `None` if there are no records.
    pub fn duration(&self) -> Option<Duration> {
        let (first, last) = (self.records.front()?, self.records.back()?);
        last.timestamp
            .signed_duration_since(first.timestamp)
            .to_std()
            .ok()
    }
}
