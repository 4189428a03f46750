//! Actors: state machines with mailboxes, reachable by name.
//!
//! Each [`Actor`] owns one [`StateMachine`](crate::StateMachine) and a FIFO
//! mailbox drained by its own tokio task. Receiving never blocks; processing
//! is strictly sequential per actor, so machines need no internal locking.
//! Actors find each other through an [`ActorDirectory`].
//!
//! # Guarantees
//!
//! - **FIFO per actor**: events from one mailbox are processed in arrival order
//! - **No ordering across actors**: different mailboxes drain independently
//! - **Drained on removal**: a deregistered actor still processes the events
//!   already queued in its mailbox

mod directory;
mod error;
mod local;

pub use directory::ActorDirectory;
pub use error::ActorError;
pub use local::{Actor, Mailbox};
