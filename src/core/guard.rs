//! Guard predicates for controlling state transitions.
//!
//! Guards are boolean functions over the owning object and the triggering
//! event. They decide whether a transition is eligible and must not mutate
//! anything.

use super::event::Event;
use super::state::EventKind;

/// Predicate that determines if a transition can fire.
///
/// # Example
///
/// ```rust
/// use hsm_actors::core::{Event, Guard};
/// use hsm_actors::event_enum;
///
/// event_enum! {
///     enum Coin {
///         Insert,
///     }
/// }
///
/// struct Till {
///     balance: u32,
/// }
///
/// let enough = Guard::new(|till: &Till, _event: &Event<Coin>| till.balance >= 100);
///
/// assert!(enough.check(&Till { balance: 150 }, &Event::of(Coin::Insert)));
/// assert!(!enough.check(&Till { balance: 20 }, &Event::of(Coin::Insert)));
/// ```
pub struct Guard<O, E: EventKind> {
    predicate: Box<dyn Fn(&O, &Event<E>) -> bool + Send + Sync>,
}

impl<O, E: EventKind> Guard<O, E> {
    /// Create a guard from a predicate function.
    ///
    /// The predicate must be deterministic and thread-safe (Send + Sync);
    /// it may run on any worker thread.
    pub fn new<F>(predicate: F) -> Self
    where
        F: Fn(&O, &Event<E>) -> bool + Send + Sync + 'static,
    {
        Guard {
            predicate: Box::new(predicate),
        }
    }

    /// Check if the guard allows the transition for this owner and event.
    pub fn check(&self, owner: &O, event: &Event<E>) -> bool {
        (self.predicate)(owner, event)
    }
}

impl<O, E: EventKind> std::fmt::Debug for Guard<O, E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Guard")
    }
}
