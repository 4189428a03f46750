//! Builder for hierarchical state machine definitions.

use crate::builder::error::BuildError;
use crate::builder::transition::{SourceBuilder, TransitionDecl};
use crate::core::{EventKind, State, StateAction, DEFAULT_HISTORY_CAPACITY};
use crate::definition::{DefinitionInner, NodeId, StateMachineDefinition, StateNode, TransitionDef};
use std::collections::{HashMap, HashSet};
use std::marker::PhantomData;

pub(crate) struct StateDecl<O, S: State> {
    id: S,
    parent: Option<usize>,
    initial: bool,
    orthogonal: bool,
    final_state: bool,
    history: bool,
    description: Option<String>,
    entry: Option<StateAction<O>>,
    exit: Option<StateAction<O>>,
}

impl<O, S: State> StateDecl<O, S> {
    fn new(id: S, parent: Option<usize>) -> Self {
        Self {
            id,
            parent,
            initial: false,
            orthogonal: false,
            final_state: false,
            history: false,
            description: None,
            entry: None,
            exit: None,
        }
    }
}

/// Fluent builder for [`StateMachineDefinition`]s.
///
/// Declarations are recorded as they are made; structural problems are
/// collected and reported by [`build`](Self::build).
///
/// # Example
///
/// ```
/// use hsm_actors::{event_enum, state_enum, FsmBuilder};
///
/// state_enum! {
///     enum Turnstile {
///         Root,
///         Locked,
///         Unlocked,
///     }
/// }
///
/// event_enum! {
///     enum Input {
///         Coin,
///         Push,
///     }
/// }
///
/// #[derive(Default)]
/// struct Gate {
///     coins: u32,
/// }
///
/// let mut builder = FsmBuilder::<Gate, Turnstile, Input>::of(Turnstile::Root);
/// builder.root().add(Turnstile::Locked).initial();
/// builder.root().add(Turnstile::Unlocked);
/// builder
///     .in_state(Turnstile::Locked)
///     .on(Input::Coin)
///     .to(Turnstile::Unlocked)
///     .execute(|gate, _| {
///         gate.coins += 1;
///         Ok(())
///     });
/// builder.in_state(Turnstile::Unlocked).on(Input::Push).to(Turnstile::Locked);
///
/// let definition = builder.build().unwrap();
/// let mut machine = definition.create(Gate::default()).unwrap();
/// machine.fire(Input::Coin).unwrap();
///
/// assert_eq!(machine.active_states(), vec![Turnstile::Unlocked]);
/// assert_eq!(machine.owner().coins, 1);
/// ```
pub struct FsmBuilder<O, S: State, E: EventKind> {
    pub(crate) states: Vec<StateDecl<O, S>>,
    pub(crate) transitions: Vec<TransitionDecl<O, S, E>>,
    pub(crate) errors: Vec<BuildError>,
    history_capacity: usize,
    _owner: PhantomData<fn(&mut O)>,
}

impl<O, S: State, E: EventKind> FsmBuilder<O, S, E> {
    /// Start a builder whose root is the implicit composite `root`.
    pub fn of(root: S) -> Self {
        Self {
            states: vec![StateDecl::new(root, None)],
            transitions: Vec::new(),
            errors: Vec::new(),
            history_capacity: DEFAULT_HISTORY_CAPACITY,
            _owner: PhantomData,
        }
    }

    /// Builder for the root state.
    pub fn root(&mut self) -> StateBuilder<'_, O, S, E> {
        StateBuilder {
            builder: self,
            index: Some(0),
        }
    }

    /// Builder for an already declared state.
    pub fn state(&mut self, state: S) -> StateBuilder<'_, O, S, E> {
        let index = self.lookup(state);
        if index.is_none() {
            self.errors.push(BuildError::UnknownState {
                state: state.name(),
            });
        }
        StateBuilder {
            builder: self,
            index,
        }
    }

    /// Start declaring transitions whose source is `state`.
    pub fn in_state(&mut self, state: S) -> SourceBuilder<'_, O, S, E> {
        SourceBuilder::new(self, state)
    }

    /// Bound the transition history kept by each machine.
    pub fn history_capacity(&mut self, capacity: usize) -> &mut Self {
        self.history_capacity = capacity;
        self
    }

    fn lookup(&self, state: S) -> Option<usize> {
        self.states.iter().position(|decl| decl.id == state)
    }

    /// Validate the declarations and freeze them into a definition.
    ///
    /// Checks that every state is declared once, that each sequential
    /// composite has exactly one initial child, that every transition source
    /// and target exists, and that no state has two unguarded transitions on
    /// the same event.
    pub fn build(self) -> Result<StateMachineDefinition<O, S, E>, BuildError> {
        if let Some(error) = self.errors.into_iter().next() {
            return Err(error);
        }

        // Parents are always declared before their children, so declaration
        // order is a valid arena order with the root at index 0.
        let index: HashMap<S, NodeId> = self
            .states
            .iter()
            .enumerate()
            .map(|(i, decl)| (decl.id, i))
            .collect();

        let mut nodes: Vec<StateNode<O, S>> = Vec::with_capacity(self.states.len());
        for (i, decl) in self.states.into_iter().enumerate() {
            let ancestors = match decl.parent {
                Some(parent) => {
                    let mut chain = Vec::with_capacity(nodes[parent].ancestors.len() + 1);
                    chain.push(i);
                    chain.extend_from_slice(&nodes[parent].ancestors);
                    nodes[parent].children.push(i);
                    chain
                }
                None => vec![i],
            };
            nodes.push(StateNode {
                id: decl.id,
                parent: decl.parent,
                children: Vec::new(),
                initial: None,
                orthogonal: decl.orthogonal,
                final_state: decl.final_state,
                history: decl.history,
                description: decl.description,
                entry: decl.entry,
                exit: decl.exit,
                transitions: Vec::new(),
                ancestors,
            });
            if decl.initial {
                if let Some(parent) = decl.parent {
                    match nodes[parent].initial {
                        Some(first) if !nodes[parent].orthogonal => {
                            return Err(BuildError::AmbiguousInitialState {
                                parent: nodes[parent].id.name(),
                                first: nodes[first].id.name(),
                                second: decl.id.name(),
                            });
                        }
                        Some(_) => {}
                        None => nodes[parent].initial = Some(i),
                    }
                }
            }
        }

        for node in nodes.iter_mut() {
            if node.orthogonal {
                node.initial = None;
            } else if node.is_composite() && node.initial.is_none() {
                return Err(BuildError::MissingInitialState {
                    composite: node.id.name(),
                });
            }
        }

        let mut unguarded: HashSet<(NodeId, E)> = HashSet::new();
        let mut transitions = Vec::with_capacity(self.transitions.len());
        for decl in self.transitions {
            let source = *index.get(&decl.source).ok_or(BuildError::UnknownState {
                state: decl.source.name(),
            })?;
            let target = match decl.target {
                Some(target) => Some(*index.get(&target).ok_or(BuildError::UnresolvedTarget {
                    source_state: decl.source.name(),
                    event: decl.event.name(),
                    target: target.name(),
                })?),
                None => None,
            };
            if decl.guard.is_none() && !unguarded.insert((source, decl.event)) {
                return Err(BuildError::DuplicateTransition {
                    state: decl.source.name(),
                    event: decl.event.name(),
                });
            }
            nodes[source].transitions.push(transitions.len());
            transitions.push(TransitionDef {
                source,
                target,
                event: decl.event,
                local: decl.local,
                guard: decl.guard,
                actions: decl.actions,
                description: decl.description,
                _state: PhantomData,
            });
        }

        tracing::debug!(
            root = nodes[0].id.name(),
            states = nodes.len(),
            transitions = transitions.len(),
            "state machine definition built"
        );

        Ok(StateMachineDefinition::new(DefinitionInner {
            nodes,
            transitions,
            index,
            history_capacity: self.history_capacity,
        }))
    }
}

/// Builder for a single declared state.
///
/// Obtained from [`FsmBuilder::root`], [`FsmBuilder::state`] or
/// [`StateBuilder::add`]. When the state is unknown the builder records the
/// error once and ignores further calls.
pub struct StateBuilder<'a, O, S: State, E: EventKind> {
    builder: &'a mut FsmBuilder<O, S, E>,
    index: Option<usize>,
}

impl<'a, O, S: State, E: EventKind> StateBuilder<'a, O, S, E> {
    /// Declare `child` inside this state and continue with the child.
    pub fn add(self, child: S) -> StateBuilder<'a, O, S, E> {
        let Some(parent) = self.index else {
            return self;
        };
        if self.builder.lookup(child).is_some() {
            self.builder.errors.push(BuildError::DuplicateState {
                state: child.name(),
            });
            return StateBuilder {
                builder: self.builder,
                index: None,
            };
        }
        self.builder.states.push(StateDecl::new(child, Some(parent)));
        let index = Some(self.builder.states.len() - 1);
        StateBuilder {
            builder: self.builder,
            index,
        }
    }

    /// Mark this state as the initial child of its parent.
    pub fn initial(self) -> Self {
        self.update(|decl| decl.initial = true)
    }

    /// Make this composite orthogonal: each child is a region, all of them
    /// active together.
    pub fn orthogonal(self) -> Self {
        self.update(|decl| decl.orthogonal = true)
    }

    /// Mark this state as final.
    pub fn final_state(self) -> Self {
        self.update(|decl| decl.final_state = true)
    }

    /// Remember the last active child and restore it on re-entry.
    pub fn has_history(self) -> Self {
        self.update(|decl| decl.history = true)
    }

    pub fn describe(self, description: impl Into<String>) -> Self {
        let description = description.into();
        self.update(|decl| decl.description = Some(description))
    }

    /// Run `action` whenever this state is entered.
    pub fn on_entry<F>(self, action: F) -> Self
    where
        F: Fn(&mut O) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.update(|decl| decl.entry = Some(Box::new(action)))
    }

    /// Run `action` whenever this state is exited.
    pub fn on_exit<F>(self, action: F) -> Self
    where
        F: Fn(&mut O) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.update(|decl| decl.exit = Some(Box::new(action)))
    }

    fn update(self, apply: impl FnOnce(&mut StateDecl<O, S>)) -> Self {
        if let Some(index) = self.index {
            apply(&mut self.builder.states[index]);
        }
        self
    }
}
