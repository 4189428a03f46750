//! Immutable state machine definitions.
//!
//! A [`StateMachineDefinition`] is produced by [`FsmBuilder::build`](crate::FsmBuilder::build)
//! and never changes afterwards. States live in an arena indexed by
//! position; parents, children and transition targets are arena indices, and
//! every node carries its precomputed ancestor chain so event dispatch is a
//! plain loop.
//!
//! Definitions are cheap to clone and safe to share between any number of
//! machines running on any number of threads.

use crate::core::{EventKind, Guard, State, StateAction, TransitionAction};
use crate::machine::{ProcessError, StateMachine};
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

pub(crate) type NodeId = usize;

pub(crate) const ROOT: NodeId = 0;

pub(crate) struct StateNode<O, S: State> {
    pub(crate) id: S,
    pub(crate) parent: Option<NodeId>,
    pub(crate) children: Vec<NodeId>,
    pub(crate) initial: Option<NodeId>,
    pub(crate) orthogonal: bool,
    pub(crate) final_state: bool,
    pub(crate) history: bool,
    pub(crate) description: Option<String>,
    pub(crate) entry: Option<StateAction<O>>,
    pub(crate) exit: Option<StateAction<O>>,
    /// Transitions declared on this state, in declaration order.
    pub(crate) transitions: Vec<usize>,
    /// This node followed by its ancestors up to the root.
    pub(crate) ancestors: Vec<NodeId>,
}

impl<O, S: State> StateNode<O, S> {
    pub(crate) fn depth(&self) -> usize {
        self.ancestors.len() - 1
    }

    pub(crate) fn is_composite(&self) -> bool {
        !self.children.is_empty()
    }
}

pub(crate) struct TransitionDef<O, S: State, E: EventKind> {
    pub(crate) source: NodeId,
    pub(crate) target: Option<NodeId>,
    pub(crate) event: E,
    pub(crate) local: bool,
    pub(crate) guard: Option<Guard<O, E>>,
    pub(crate) actions: Vec<TransitionAction<O, E>>,
    pub(crate) description: Option<String>,
    pub(crate) _state: std::marker::PhantomData<S>,
}

pub(crate) struct DefinitionInner<O, S: State, E: EventKind> {
    pub(crate) nodes: Vec<StateNode<O, S>>,
    pub(crate) transitions: Vec<TransitionDef<O, S, E>>,
    pub(crate) index: HashMap<S, NodeId>,
    pub(crate) history_capacity: usize,
}

/// Read-only view of a state for report generators.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(bound = "")]
pub struct StateDescriptor<S: State> {
    pub id: S,
    pub parent: Option<S>,
    pub children: Vec<S>,
    pub initial: Option<S>,
    pub orthogonal: bool,
    pub final_state: bool,
    pub history: bool,
    pub has_entry: bool,
    pub has_exit: bool,
    pub description: Option<String>,
}

/// Read-only view of a transition for report generators.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(bound = "")]
pub struct TransitionDescriptor<S: State, E: EventKind> {
    pub source: S,
    pub target: Option<S>,
    pub event: E,
    pub local: bool,
    pub guarded: bool,
    pub actions: usize,
    pub description: Option<String>,
}

/// Immutable, shareable hierarchical state machine definition.
pub struct StateMachineDefinition<O, S: State, E: EventKind> {
    pub(crate) inner: Arc<DefinitionInner<O, S, E>>,
}

impl<O, S: State, E: EventKind> Clone for StateMachineDefinition<O, S, E> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<O, S: State, E: EventKind> fmt::Debug for StateMachineDefinition<O, S, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StateMachineDefinition")
            .field("root", &self.root())
            .field("states", &self.inner.nodes.len())
            .field("transitions", &self.inner.transitions.len())
            .finish()
    }
}

impl<O, S: State, E: EventKind> StateMachineDefinition<O, S, E> {
    pub(crate) fn new(inner: DefinitionInner<O, S, E>) -> Self {
        Self {
            inner: Arc::new(inner),
        }
    }

    /// Start a machine driving `owner`, entering the initial configuration.
    ///
    /// Fails if an entry action of the initial configuration fails.
    pub fn create(&self, owner: O) -> Result<StateMachine<O, S, E>, ProcessError> {
        StateMachine::start(self.clone(), owner)
    }

    pub fn root(&self) -> S {
        self.inner.nodes[ROOT].id
    }

    /// Maximum number of records kept in each machine's history.
    pub fn history_capacity(&self) -> usize {
        self.inner.history_capacity
    }

    /// All states, parents before children.
    pub fn states(&self) -> impl Iterator<Item = S> + '_ {
        self.inner.nodes.iter().map(|node| node.id)
    }

    pub fn contains(&self, state: S) -> bool {
        self.inner.index.contains_key(&state)
    }

    pub fn parent_of(&self, state: S) -> Option<S> {
        let node = self.node(state)?;
        node.parent.map(|p| self.inner.nodes[p].id)
    }

    pub fn children_of(&self, state: S) -> Vec<S> {
        self.node(state)
            .map(|node| self.ids(&node.children))
            .unwrap_or_default()
    }

    pub fn initial_child_of(&self, state: S) -> Option<S> {
        let node = self.node(state)?;
        node.initial.map(|i| self.inner.nodes[i].id)
    }

    /// Whether `ancestor` contains `state`, or is `state` itself.
    pub fn is_within(&self, state: S, ancestor: S) -> bool {
        match (self.inner.index.get(&state), self.inner.index.get(&ancestor)) {
            (Some(&s), Some(a)) => self.inner.nodes[s].ancestors.contains(a),
            _ => false,
        }
    }

    pub fn descriptor(&self, state: S) -> Option<StateDescriptor<S>> {
        let node = self.node(state)?;
        Some(StateDescriptor {
            id: node.id,
            parent: node.parent.map(|p| self.inner.nodes[p].id),
            children: self.ids(&node.children),
            initial: node.initial.map(|i| self.inner.nodes[i].id),
            orthogonal: node.orthogonal,
            final_state: node.final_state,
            history: node.history,
            has_entry: node.entry.is_some(),
            has_exit: node.exit.is_some(),
            description: node.description.clone(),
        })
    }

    /// All transitions in declaration order.
    pub fn transitions(&self) -> Vec<TransitionDescriptor<S, E>> {
        self.inner
            .transitions
            .iter()
            .map(|t| self.transition_descriptor(t))
            .collect()
    }

    /// Transitions declared on `state`, in declaration order.
    pub fn transitions_from(&self, state: S) -> Vec<TransitionDescriptor<S, E>> {
        self.node(state)
            .map(|node| {
                node.transitions
                    .iter()
                    .map(|&t| self.transition_descriptor(&self.inner.transitions[t]))
                    .collect()
            })
            .unwrap_or_default()
    }

    pub(crate) fn node(&self, state: S) -> Option<&StateNode<O, S>> {
        self.inner.index.get(&state).map(|&i| &self.inner.nodes[i])
    }

    pub(crate) fn nodes(&self) -> &[StateNode<O, S>] {
        &self.inner.nodes
    }

    pub(crate) fn transition(&self, index: usize) -> &TransitionDef<O, S, E> {
        &self.inner.transitions[index]
    }

    fn ids(&self, nodes: &[NodeId]) -> Vec<S> {
        nodes.iter().map(|&n| self.inner.nodes[n].id).collect()
    }

    fn transition_descriptor(&self, t: &TransitionDef<O, S, E>) -> TransitionDescriptor<S, E> {
        TransitionDescriptor {
            source: self.inner.nodes[t.source].id,
            target: t.target.map(|n| self.inner.nodes[n].id),
            event: t.event,
            local: t.local,
            guarded: t.guard.is_some(),
            actions: t.actions.len(),
            description: t.description.clone(),
        }
    }
}
