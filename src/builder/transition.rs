//! Builders for transition declarations.

use crate::builder::error::BuildError;
use crate::builder::machine::FsmBuilder;
use crate::core::{Event, EventKind, Guard, State, TransitionAction};

pub(crate) struct TransitionDecl<O, S: State, E: EventKind> {
    pub(crate) source: S,
    pub(crate) event: E,
    pub(crate) target: Option<S>,
    pub(crate) local: bool,
    pub(crate) guard: Option<Guard<O, E>>,
    pub(crate) actions: Vec<TransitionAction<O, E>>,
    pub(crate) description: Option<String>,
}

/// Selects the source state of the transitions being declared.
///
/// Returned by [`FsmBuilder::in_state`].
pub struct SourceBuilder<'a, O, S: State, E: EventKind> {
    builder: &'a mut FsmBuilder<O, S, E>,
    source: S,
}

impl<'a, O, S: State, E: EventKind> SourceBuilder<'a, O, S, E> {
    pub(crate) fn new(builder: &'a mut FsmBuilder<O, S, E>, source: S) -> Self {
        Self { builder, source }
    }

    /// Declare a transition triggered by `event`.
    ///
    /// Without a call to [`TransitionBuilder::to`] the transition is
    /// internal: its actions run and the configuration is unchanged.
    pub fn on(self, event: E) -> TransitionBuilder<'a, O, S, E> {
        self.declare(event, false)
    }

    /// Declare a local transition triggered by `event`.
    ///
    /// Local transitions run their actions without exiting or entering any
    /// state, so nested configuration and entry/exit side effects are left
    /// untouched.
    pub fn on_local(self, event: E) -> TransitionBuilder<'a, O, S, E> {
        self.declare(event, true)
    }

    fn declare(self, event: E, local: bool) -> TransitionBuilder<'a, O, S, E> {
        self.builder.transitions.push(TransitionDecl {
            source: self.source,
            event,
            target: None,
            local,
            guard: None,
            actions: Vec::new(),
            description: None,
        });
        let index = self.builder.transitions.len() - 1;
        TransitionBuilder {
            builder: self.builder,
            index,
        }
    }
}

/// Builder for a single declared transition.
pub struct TransitionBuilder<'a, O, S: State, E: EventKind> {
    builder: &'a mut FsmBuilder<O, S, E>,
    index: usize,
}

impl<'a, O, S: State, E: EventKind> TransitionBuilder<'a, O, S, E> {
    /// Set the target state.
    ///
    /// A target equal to the source declares a self-transition, which exits
    /// and re-enters the source.
    pub fn to(self, target: S) -> Self {
        let decl = &mut self.builder.transitions[self.index];
        if decl.local {
            let error = BuildError::LocalTransitionWithTarget {
                state: decl.source.name(),
                event: decl.event.name(),
            };
            self.builder.errors.push(error);
        } else {
            decl.target = Some(target);
        }
        self
    }

    /// Add a guard predicate. Guards are evaluated in declaration order and
    /// the first transition whose guard holds fires.
    pub fn when<F>(self, predicate: F) -> Self
    where
        F: Fn(&O, &Event<E>) -> bool + Send + Sync + 'static,
    {
        self.builder.transitions[self.index].guard = Some(Guard::new(predicate));
        self
    }

    /// Add an action; actions run in the order they were added.
    pub fn execute<F>(self, action: F) -> Self
    where
        F: Fn(&mut O, &Event<E>) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.builder.transitions[self.index]
            .actions
            .push(Box::new(action));
        self
    }

    pub fn describe(self, description: impl Into<String>) -> Self {
        self.builder.transitions[self.index].description = Some(description.into());
        self
    }
}
