//! Runtime errors raised while processing events.

use std::fmt;
use thiserror::Error;

/// Where a failing action was running.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Entry,
    Exit,
    Transition,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Entry => f.write_str("entry"),
            Self::Exit => f.write_str("exit"),
            Self::Transition => f.write_str("transition"),
        }
    }
}

/// Errors surfaced by [`StateMachine::process`](crate::StateMachine::process).
///
/// When an event fails the machine restores the configuration it had before
/// the event. Side effects of actions that already ran are not undone.
#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("{phase} action of state '{state}' failed{}", on_event(.event))]
    ActionFailed {
        state: &'static str,
        event: Option<&'static str>,
        phase: Phase,
        #[source]
        source: anyhow::Error,
    },
}

fn on_event(event: &Option<&'static str>) -> String {
    event.map(|e| format!(" on '{e}'")).unwrap_or_default()
}

impl ProcessError {
    pub fn phase(&self) -> Phase {
        match self {
            Self::ActionFailed { phase, .. } => *phase,
        }
    }

    pub fn state(&self) -> &'static str {
        match self {
            Self::ActionFailed { state, .. } => state,
        }
    }
}
