//! hsm-actors: hierarchical state machines, mailbox actors and an event bus
//!
//! State machines are declared once with a fluent builder and then run by
//! any number of independent instances, each bound to its own owner object.
//! Definitions support nested states, orthogonal regions, guards, local
//! transitions, final states and shallow history.
//!
//! # Core Concepts
//!
//! - **Definition**: an immutable, shareable [`StateMachineDefinition`] built
//!   by [`FsmBuilder`]
//! - **Machine**: a [`StateMachine`] processing [`core::Event`]s against one owner
//! - **Actor**: a machine behind a FIFO mailbox, addressed by name through an
//!   [`ActorDirectory`]
//! - **Event bus**: typed publish/subscribe with synchronous or asynchronous
//!   delivery
//!
//! # Example
//!
//! ```rust
//! use hsm_actors::core::Event;
//! use hsm_actors::{event_enum, state_enum, FsmBuilder, Outcome};
//!
//! state_enum! {
//!     enum Player {
//!         Root,
//!         Stopped,
//!         Active,
//!         Playing,
//!         Paused,
//!     }
//! }
//!
//! event_enum! {
//!     enum Command {
//!         Play,
//!         Pause,
//!         Stop,
//!     }
//! }
//!
//! let mut builder = FsmBuilder::<Vec<String>, Player, Command>::of(Player::Root);
//! builder.root().add(Player::Stopped).initial();
//! builder.root().add(Player::Active);
//! builder.state(Player::Active).add(Player::Playing).initial();
//! builder.state(Player::Active).add(Player::Paused);
//! builder.in_state(Player::Stopped).on(Command::Play).to(Player::Active);
//! builder.in_state(Player::Playing).on(Command::Pause).to(Player::Paused);
//! builder.in_state(Player::Paused).on(Command::Play).to(Player::Playing);
//! builder
//!     .in_state(Player::Active)
//!     .on(Command::Stop)
//!     .to(Player::Stopped)
//!     .execute(|log, event| {
//!         log.push(format!("stopped by {:?}", event.kind()));
//!         Ok(())
//!     });
//! let definition = builder.build().unwrap();
//!
//! let mut machine = definition.create(Vec::new()).unwrap();
//! machine.fire(Command::Play).unwrap();
//! machine.fire(Command::Pause).unwrap();
//! assert_eq!(machine.active_states(), vec![Player::Paused]);
//!
//! // Declared on the parent, inherited by every child.
//! assert_eq!(machine.process(&Event::of(Command::Stop)).unwrap(), Outcome::Handled(1));
//! assert_eq!(machine.active_states(), vec![Player::Stopped]);
//! assert_eq!(machine.owner().len(), 1);
//! ```

pub mod actor;
pub mod builder;
pub mod bus;
pub mod core;
pub mod definition;
pub mod machine;

mod idle;

// Re-export commonly used types
pub use crate::actor::{Actor, ActorDirectory, ActorError, Mailbox};
pub use crate::builder::{BuildError, FsmBuilder, SourceBuilder, StateBuilder, TransitionBuilder};
pub use crate::bus::{BusError, BusEvent, ConsumerId, EventBus};
pub use crate::core::{Event, EventKind, Guard, State};
pub use crate::definition::{StateDescriptor, StateMachineDefinition, TransitionDescriptor};
pub use crate::machine::{Outcome, Phase, ProcessError, Snapshot, SnapshotError, StateMachine};
