//! Discriminator traits for states and events.
//!
//! States and events are identified by small enum-like values. The engine
//! never inspects them beyond equality, hashing, ordering and naming, so any
//! type satisfying these traits can drive a machine.

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt::Debug;
use std::hash::Hash;

/// Identifier of a node in the hierarchical state tree.
///
/// # Required Traits
///
/// - `Copy`: identifiers are passed around by value inside the engine
/// - `Eq` + `Hash` + `Ord`: identifiers key lookup tables and sorted reports
/// - `Debug`: identifiers appear in errors and logs
/// - `Serialize` + `Deserialize`: identifiers appear in history and snapshots
///
/// # Example
///
/// ```rust
/// use hsm_actors::core::State;
/// use serde::{Deserialize, Serialize};
///
/// #[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Debug, Serialize, Deserialize)]
/// enum Door {
///     Root,
///     Open,
///     Closed,
/// }
///
/// impl State for Door {
///     fn name(&self) -> &'static str {
///         match self {
///             Self::Root => "Root",
///             Self::Open => "Open",
///             Self::Closed => "Closed",
///         }
///     }
/// }
///
/// assert_eq!(Door::Open.name(), "Open");
/// ```
pub trait State:
    Copy + Eq + Hash + Ord + Debug + Serialize + DeserializeOwned + Send + Sync + 'static
{
    /// Get the state's name for display/logging.
    fn name(&self) -> &'static str;
}

/// Discriminator of an [`Event`](crate::core::Event).
///
/// Transitions are keyed by the event kind, never by the event's parameters.
pub trait EventKind:
    Copy + Eq + Hash + Ord + Debug + Serialize + DeserializeOwned + Send + Sync + 'static
{
    /// Get the event's name for display/logging.
    fn name(&self) -> &'static str;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Debug, Serialize, Deserialize)]
    enum TestState {
        Root,
        Idle,
        Busy,
    }

    impl State for TestState {
        fn name(&self) -> &'static str {
            match self {
                Self::Root => "Root",
                Self::Idle => "Idle",
                Self::Busy => "Busy",
            }
        }
    }

    #[test]
    fn state_name_returns_correct_value() {
        assert_eq!(TestState::Root.name(), "Root");
        assert_eq!(TestState::Idle.name(), "Idle");
        assert_eq!(TestState::Busy.name(), "Busy");
    }

    #[test]
    fn state_serializes_correctly() {
        let state = TestState::Busy;
        let json = serde_json::to_string(&state).unwrap();
        let deserialized: TestState = serde_json::from_str(&json).unwrap();
        assert_eq!(state, deserialized);
    }

    #[test]
    fn states_are_ordered_by_declaration() {
        assert!(TestState::Root < TestState::Idle);
        assert!(TestState::Idle < TestState::Busy);
    }
}
