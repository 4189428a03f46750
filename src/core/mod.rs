//! Core value types shared by the builder, the engine and the actors:
//! - State and event discriminators via the `State` and `EventKind` traits
//! - Events carrying opaque parameters
//! - Guard predicates and actions
//! - Bounded transition history

mod action;
mod event;
mod guard;
mod history;
mod state;

pub use action::{StateAction, TransitionAction};
pub use event::{Event, Param};
pub use guard::Guard;
pub use history::{TransitionHistory, TransitionRecord, DEFAULT_HISTORY_CAPACITY};
pub use state::{EventKind, State};
