//! Build errors for state machine definitions.

use thiserror::Error;

/// Structural problems detected while building a definition.
///
/// All of them are reported by [`FsmBuilder::build`](crate::FsmBuilder::build),
/// before any machine can be created.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BuildError {
    #[error("State '{state}' is declared more than once")]
    DuplicateState { state: &'static str },

    #[error("State '{state}' is used before it was declared. Declare it with .add(state)")]
    UnknownState { state: &'static str },

    #[error("Composite '{parent}' has more than one initial child ('{first}' and '{second}')")]
    AmbiguousInitialState {
        parent: &'static str,
        first: &'static str,
        second: &'static str,
    },

    #[error("Composite '{composite}' has no initial child. Mark one child with .initial()")]
    MissingInitialState { composite: &'static str },

    #[error("Transition '{source_state}' --{event}--> '{target}' targets an undeclared state")]
    UnresolvedTarget {
        source_state: &'static str,
        event: &'static str,
        target: &'static str,
    },

    #[error("State '{state}' declares more than one unguarded transition on '{event}'")]
    DuplicateTransition {
        state: &'static str,
        event: &'static str,
    },

    #[error("Local transition on '{event}' in '{state}' cannot have a target state")]
    LocalTransitionWithTarget {
        state: &'static str,
        event: &'static str,
    },
}
