//! Builder API for hierarchical state machine definitions.
//!
//! This module provides the fluent [`FsmBuilder`] DSL and the macros that
//! declare state and event discriminators with minimal boilerplate.

pub mod error;
pub mod machine;
pub mod macros;
pub mod transition;

pub use error::BuildError;
pub use machine::{FsmBuilder, StateBuilder};
pub use transition::{SourceBuilder, TransitionBuilder};
