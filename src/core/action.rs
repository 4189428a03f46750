//! Actions executed by transitions and on state entry/exit.
//!
//! Actions receive the owning object mutably. A failing action returns an
//! error, which the engine surfaces from [`StateMachine::process`](crate::StateMachine::process).

use super::event::Event;

/// Action run when a transition fires.
pub type TransitionAction<O, E> =
    Box<dyn Fn(&mut O, &Event<E>) -> anyhow::Result<()> + Send + Sync>;

/// Action run when a state is entered or exited.
pub type StateAction<O> = Box<dyn Fn(&mut O) -> anyhow::Result<()> + Send + Sync>;

