//! Execution engine: a running machine bound to an owning object.
//!
//! A [`StateMachine`] is a mutable cursor over an immutable
//! [`StateMachineDefinition`]. Its configuration is the set of active states;
//! the active leaves are its visible state, one per active orthogonal region.
//!
//! # Dispatch
//!
//! For each active leaf the engine walks the leaf's ancestor chain and picks
//! the first transition declared on the event's kind whose guard holds, so a
//! transition declared deeper in the hierarchy shadows one declared on an
//! ancestor. Every region is offered the event; distinct selected transitions
//! fire in region order. Events no region handles are ignored.
//!
//! A machine is not synchronized. [`Actor`](crate::Actor) serializes access
//! when machines run concurrently.

mod error;
mod snapshot;

pub use error::{Phase, ProcessError};
pub use snapshot::{Snapshot, SnapshotError, SNAPSHOT_VERSION};

use crate::core::{Event, EventKind, State, TransitionHistory, TransitionRecord};
use crate::definition::{NodeId, StateMachineDefinition, TransitionDef, ROOT};
use chrono::Utc;
use std::cmp::Reverse;
use std::collections::{BTreeSet, HashMap};
use std::panic::{self, AssertUnwindSafe};

/// What processing an event did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// No active state handles the event.
    Ignored,
    /// The number of transitions that fired.
    Handled(usize),
}

impl Outcome {
    pub fn is_handled(&self) -> bool {
        matches!(self, Self::Handled(_))
    }
}

/// A running hierarchical state machine driving an owner `O`.
pub struct StateMachine<O, S: State, E: EventKind> {
    definition: StateMachineDefinition<O, S, E>,
    owner: O,
    active: BTreeSet<NodeId>,
    remembered: HashMap<NodeId, NodeId>,
    history: TransitionHistory<S, E>,
}

impl<O, S: State, E: EventKind> StateMachine<O, S, E> {
    pub(crate) fn start(
        definition: StateMachineDefinition<O, S, E>,
        owner: O,
    ) -> Result<Self, ProcessError> {
        let history = TransitionHistory::with_capacity(definition.history_capacity());
        let mut machine = Self {
            definition,
            owner,
            active: BTreeSet::new(),
            remembered: HashMap::new(),
            history,
        };
        machine.enter_default(ROOT, None)?;
        Ok(machine)
    }

    /// Process a single event.
    ///
    /// Returns [`Outcome::Ignored`] when no active state handles the event.
    /// If an action fails or panics the configuration is restored to what it
    /// was before the event; the error is returned and the panic resumed.
    pub fn process(&mut self, event: &Event<E>) -> Result<Outcome, ProcessError> {
        let active = self.active.clone();
        let remembered = self.remembered.clone();
        let result = match panic::catch_unwind(AssertUnwindSafe(|| self.dispatch(event))) {
            Ok(result) => result,
            Err(payload) => {
                self.active = active;
                self.remembered = remembered;
                panic::resume_unwind(payload);
            }
        };
        match result {
            Ok((outcome, records)) => {
                for record in records {
                    self.history.record(record);
                }
                Ok(outcome)
            }
            Err(error) => {
                self.active = active;
                self.remembered = remembered;
                Err(error)
            }
        }
    }

    /// Process an event without parameters.
    pub fn fire(&mut self, kind: E) -> Result<Outcome, ProcessError> {
        self.process(&Event::of(kind))
    }

    /// Exit the whole configuration and re-enter the initial one.
    ///
    /// Shallow history is forgotten. On failure the configuration is
    /// restored, as for [`process`](Self::process).
    pub fn reset(&mut self) -> Result<(), ProcessError> {
        let active = self.active.clone();
        let remembered = self.remembered.clone();
        let everything = self.active.iter().copied().collect();
        let result = panic::catch_unwind(AssertUnwindSafe(|| {
            self.exit_states(everything, None)?;
            self.remembered.clear();
            self.enter_default(ROOT, None)
        }));
        match result {
            Ok(Ok(())) => Ok(()),
            Ok(Err(error)) => {
                self.active = active;
                self.remembered = remembered;
                Err(error)
            }
            Err(payload) => {
                self.active = active;
                self.remembered = remembered;
                panic::resume_unwind(payload);
            }
        }
    }

    /// Active leaf states, one per active region, in declaration order.
    pub fn active_states(&self) -> Vec<S> {
        self.active_leaves()
            .into_iter()
            .map(|n| self.definition.nodes()[n].id)
            .collect()
    }

    /// Whether `state` is active, either as a leaf or as an ancestor of one.
    pub fn is_active(&self, state: S) -> bool {
        self.definition
            .inner
            .index
            .get(&state)
            .is_some_and(|n| self.active.contains(n))
    }

    /// Whether every active leaf is a final state.
    pub fn is_final(&self) -> bool {
        let leaves = self.active_leaves();
        !leaves.is_empty()
            && leaves
                .iter()
                .all(|&n| self.definition.nodes()[n].final_state)
    }

    pub fn owner(&self) -> &O {
        &self.owner
    }

    pub fn owner_mut(&mut self) -> &mut O {
        &mut self.owner
    }

    pub fn into_owner(self) -> O {
        self.owner
    }

    pub fn definition(&self) -> &StateMachineDefinition<O, S, E> {
        &self.definition
    }

    pub fn history(&self) -> &TransitionHistory<S, E> {
        &self.history
    }

    /// Serializable view of the configuration and history.
    pub fn snapshot(&self) -> Snapshot<S, E> {
        Snapshot::new(
            self.definition.root(),
            self.active_states(),
            self.history.clone(),
        )
    }

    fn active_leaves(&self) -> Vec<NodeId> {
        let nodes = self.definition.nodes();
        self.active
            .iter()
            .copied()
            .filter(|&n| !nodes[n].is_composite())
            .collect()
    }

    fn dispatch(
        &mut self,
        event: &Event<E>,
    ) -> Result<(Outcome, Vec<TransitionRecord<S, E>>), ProcessError> {
        let definition = self.definition.clone();

        let mut selected: Vec<usize> = Vec::new();
        for leaf in self.active_leaves() {
            if let Some(t) = self.select(&definition, leaf, event) {
                if !selected.contains(&t) {
                    selected.push(t);
                }
            }
        }

        if selected.is_empty() {
            tracing::trace!(event = event.kind().name(), "event ignored");
            return Ok((Outcome::Ignored, Vec::new()));
        }

        let mut records = Vec::with_capacity(selected.len());
        let mut exited: BTreeSet<NodeId> = BTreeSet::new();
        for t in selected {
            let transition = definition.transition(t);
            // Skip sources an earlier region's transition exited, even when
            // that transition re-entered them.
            if exited.contains(&transition.source) || !self.active.contains(&transition.source) {
                continue;
            }
            exited.extend(self.fire_transition(&definition, transition, event)?);
            let nodes = definition.nodes();
            records.push(TransitionRecord {
                source: nodes[transition.source].id,
                target: transition.target.map(|n| nodes[n].id),
                event: transition.event,
                local: transition.local,
                timestamp: Utc::now(),
            });
        }
        Ok((Outcome::Handled(records.len()), records))
    }

    fn select(
        &self,
        definition: &StateMachineDefinition<O, S, E>,
        leaf: NodeId,
        event: &Event<E>,
    ) -> Option<usize> {
        let nodes = definition.nodes();
        nodes[leaf].ancestors.iter().find_map(|&node| {
            nodes[node].transitions.iter().copied().find(|&t| {
                let transition = definition.transition(t);
                transition.event == event.kind()
                    && transition
                        .guard
                        .as_ref()
                        .is_none_or(|guard| guard.check(&self.owner, event))
            })
        })
    }

    fn fire_transition(
        &mut self,
        definition: &StateMachineDefinition<O, S, E>,
        transition: &TransitionDef<O, S, E>,
        event: &Event<E>,
    ) -> Result<Vec<NodeId>, ProcessError> {
        let nodes = definition.nodes();
        let source = transition.source;

        let target = match transition.target {
            Some(target) if !transition.local => target,
            _ => {
                tracing::debug!(
                    state = nodes[source].id.name(),
                    event = event.kind().name(),
                    local = transition.local,
                    "internal transition fired"
                );
                self.run_actions(transition, nodes[source].id, event)?;
                return Ok(Vec::new());
            }
        };

        let (domain, exiting) = self.scope(source, target);
        self.exit_states(exiting.clone(), Some(event))?;
        self.run_actions(transition, nodes[source].id, event)?;

        let path: Vec<NodeId> = nodes[target]
            .ancestors
            .iter()
            .copied()
            .take_while(|&n| Some(n) != domain)
            .collect::<Vec<_>>()
            .into_iter()
            .rev()
            .collect();
        for (i, &node) in path.iter().enumerate() {
            self.enter(node, Some(event))?;
            // The target itself descends below, all regions at once.
            if let Some(&next) = path.get(i + 1).filter(|_| nodes[node].orthogonal) {
                for &region in &nodes[node].children {
                    if region != next {
                        self.enter_default(region, Some(event))?;
                    }
                }
            }
        }
        self.descend(target, Some(event))?;

        tracing::debug!(
            from = nodes[source].id.name(),
            to = nodes[target].id.name(),
            event = event.kind().name(),
            "transition fired"
        );
        Ok(exiting)
    }

    /// The state that stays active while a transition from `source` to
    /// `target` exits and enters below it (`None` stands above the root),
    /// together with the active states to exit.
    ///
    /// Below an orthogonal state only the region leading to the target is
    /// exited. A transition crossing from one region into another exits and
    /// re-enters the whole orthogonal state.
    fn scope(&self, source: NodeId, target: NodeId) -> (Option<NodeId>, Vec<NodeId>) {
        let nodes = self.definition.nodes();
        let mut domain = if source == target {
            nodes[source].parent
        } else {
            let target_chain = &nodes[target].ancestors;
            let lca = nodes[source]
                .ancestors
                .iter()
                .copied()
                .find(|n| target_chain.contains(n))
                .unwrap_or(ROOT);
            if lca == target {
                nodes[target].parent
            } else {
                Some(lca)
            }
        };

        let branch = |of: NodeId, below: NodeId| {
            nodes[of]
                .ancestors
                .iter()
                .copied()
                .find(|&n| nodes[n].parent == Some(below))
        };

        let mut scope_root = None;
        while let Some(d) = domain.filter(|&d| nodes[d].orthogonal) {
            let target_branch = branch(target, d);
            let source_branch = branch(source, d);
            if source_branch.is_some() && source_branch != target_branch {
                domain = nodes[d].parent;
            } else {
                scope_root = target_branch;
                break;
            }
        }

        let exiting = self
            .active
            .iter()
            .copied()
            .filter(|&n| match (scope_root, domain) {
                (Some(root), _) => nodes[n].ancestors.contains(&root),
                (None, Some(d)) => n != d && nodes[n].ancestors.contains(&d),
                (None, None) => true,
            })
            .collect();
        (domain, exiting)
    }

    fn run_actions(
        &mut self,
        transition: &TransitionDef<O, S, E>,
        source: S,
        event: &Event<E>,
    ) -> Result<(), ProcessError> {
        for action in &transition.actions {
            action(&mut self.owner, event).map_err(|error| ProcessError::ActionFailed {
                state: source.name(),
                event: Some(event.kind().name()),
                phase: Phase::Transition,
                source: error,
            })?;
        }
        Ok(())
    }

    /// Exit `exiting`, deepest states first.
    fn exit_states(
        &mut self,
        mut exiting: Vec<NodeId>,
        event: Option<&Event<E>>,
    ) -> Result<(), ProcessError> {
        let definition = self.definition.clone();
        let nodes = definition.nodes();
        exiting.sort_by_key(|&n| (Reverse(nodes[n].depth()), Reverse(n)));

        for node in exiting {
            if let Some(exit) = &nodes[node].exit {
                exit(&mut self.owner).map_err(|error| ProcessError::ActionFailed {
                    state: nodes[node].id.name(),
                    event: event.map(|e| e.kind().name()),
                    phase: Phase::Exit,
                    source: error,
                })?;
            }
            self.active.remove(&node);
            if let Some(parent) = nodes[node].parent {
                if nodes[parent].history {
                    self.remembered.insert(parent, node);
                }
            }
        }
        Ok(())
    }

    fn enter(&mut self, node: NodeId, event: Option<&Event<E>>) -> Result<(), ProcessError> {
        let definition = self.definition.clone();
        let state = &definition.nodes()[node];
        if let Some(entry) = &state.entry {
            entry(&mut self.owner).map_err(|error| ProcessError::ActionFailed {
                state: state.id.name(),
                event: event.map(|e| e.kind().name()),
                phase: Phase::Entry,
                source: error,
            })?;
        }
        self.active.insert(node);
        Ok(())
    }

    fn enter_default(&mut self, node: NodeId, event: Option<&Event<E>>) -> Result<(), ProcessError> {
        self.enter(node, event)?;
        self.descend(node, event)
    }

    /// Enter the default children of an active composite: every region of
    /// an orthogonal state, otherwise the remembered or initial child.
    fn descend(&mut self, node: NodeId, event: Option<&Event<E>>) -> Result<(), ProcessError> {
        let definition = self.definition.clone();
        let state = &definition.nodes()[node];
        if state.orthogonal {
            for &region in &state.children {
                self.enter_default(region, event)?;
            }
            return Ok(());
        }
        let child = if state.history {
            self.remembered.get(&node).copied().or(state.initial)
        } else {
            state.initial
        };
        match child {
            Some(child) => self.enter_default(child, event),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{event_enum, state_enum, FsmBuilder};

    state_enum! {
        enum Player {
            Root,
            Stopped,
            Active,
            Playing,
            Paused,
        }
    }

    event_enum! {
        enum Button {
            Play,
            Pause,
            Stop,
            Tick,
        }
    }

    #[derive(Default)]
    struct Log {
        lines: Vec<String>,
    }

    impl Log {
        fn push(&mut self, line: &str) -> anyhow::Result<()> {
            self.lines.push(line.to_string());
            Ok(())
        }
    }

    fn player() -> StateMachineDefinition<Log, Player, Button> {
        let mut builder = FsmBuilder::of(Player::Root);
        builder
            .root()
            .add(Player::Stopped)
            .initial()
            .on_entry(|log: &mut Log| log.push("enter Stopped"))
            .on_exit(|log: &mut Log| log.push("exit Stopped"));
        builder
            .root()
            .add(Player::Active)
            .on_entry(|log: &mut Log| log.push("enter Active"))
            .on_exit(|log: &mut Log| log.push("exit Active"));
        builder
            .state(Player::Active)
            .add(Player::Playing)
            .initial()
            .on_entry(|log: &mut Log| log.push("enter Playing"))
            .on_exit(|log: &mut Log| log.push("exit Playing"));
        builder
            .state(Player::Active)
            .add(Player::Paused)
            .on_entry(|log: &mut Log| log.push("enter Paused"))
            .on_exit(|log: &mut Log| log.push("exit Paused"));
        builder
            .in_state(Player::Stopped)
            .on(Button::Play)
            .to(Player::Active)
            .execute(|log, _| log.push("play"));
        builder.in_state(Player::Playing).on(Button::Pause).to(Player::Paused);
        builder.in_state(Player::Paused).on(Button::Play).to(Player::Playing);
        builder.in_state(Player::Active).on(Button::Stop).to(Player::Stopped);
        builder.build().unwrap()
    }

    #[test]
    fn create_enters_initial_configuration() {
        let machine = player().create(Log::default()).unwrap();

        assert_eq!(machine.active_states(), vec![Player::Stopped]);
        assert!(machine.is_active(Player::Root));
        assert_eq!(machine.owner().lines, vec!["enter Stopped"]);
        assert!(machine.history().is_empty());
    }

    #[test]
    fn entering_composite_descends_to_initial_leaf() {
        let mut machine = player().create(Log::default()).unwrap();
        machine.owner_mut().lines.clear();

        assert_eq!(machine.fire(Button::Play).unwrap(), Outcome::Handled(1));
        assert_eq!(machine.active_states(), vec![Player::Playing]);
        assert!(machine.is_active(Player::Active));
        assert_eq!(
            machine.owner().lines,
            vec!["exit Stopped", "play", "enter Active", "enter Playing"]
        );
    }

    #[test]
    fn ancestor_transition_exits_from_leaf_upwards() {
        let mut machine = player().create(Log::default()).unwrap();
        machine.fire(Button::Play).unwrap();
        machine.fire(Button::Pause).unwrap();
        machine.owner_mut().lines.clear();

        machine.fire(Button::Stop).unwrap();

        assert_eq!(machine.active_states(), vec![Player::Stopped]);
        assert_eq!(
            machine.owner().lines,
            vec!["exit Paused", "exit Active", "enter Stopped"]
        );
    }

    #[test]
    fn sibling_transition_keeps_parent_active() {
        let mut machine = player().create(Log::default()).unwrap();
        machine.fire(Button::Play).unwrap();
        machine.owner_mut().lines.clear();

        machine.fire(Button::Pause).unwrap();

        assert_eq!(machine.active_states(), vec![Player::Paused]);
        assert_eq!(machine.owner().lines, vec!["exit Playing", "enter Paused"]);
    }

    #[test]
    fn unhandled_event_is_ignored() {
        let mut machine = player().create(Log::default()).unwrap();

        assert_eq!(machine.fire(Button::Pause).unwrap(), Outcome::Ignored);
        assert_eq!(machine.active_states(), vec![Player::Stopped]);
        assert!(machine.history().is_empty());
    }

    #[test]
    fn history_records_fired_transitions() {
        let mut machine = player().create(Log::default()).unwrap();
        machine.fire(Button::Play).unwrap();
        machine.fire(Button::Pause).unwrap();
        machine.fire(Button::Tick).unwrap();

        assert_eq!(machine.history().len(), 2);
        assert_eq!(
            machine.history().path(),
            vec![Player::Stopped, Player::Active, Player::Paused]
        );
    }

    #[test]
    fn reset_returns_to_initial_configuration() {
        let mut machine = player().create(Log::default()).unwrap();
        machine.fire(Button::Play).unwrap();
        machine.owner_mut().lines.clear();

        machine.reset().unwrap();

        assert_eq!(machine.active_states(), vec![Player::Stopped]);
        assert_eq!(
            machine.owner().lines,
            vec!["exit Playing", "exit Active", "enter Stopped"]
        );
    }

    #[test]
    fn snapshot_reflects_configuration() {
        let mut machine = player().create(Log::default()).unwrap();
        machine.fire(Button::Play).unwrap();

        let snapshot = machine.snapshot();
        assert_eq!(snapshot.root, Player::Root);
        assert_eq!(snapshot.active, vec![Player::Playing]);
        assert_eq!(snapshot.history.len(), 1);
    }

    #[test]
    fn panicking_action_restores_configuration() {
        let mut builder = FsmBuilder::of(Player::Root);
        builder.root().add(Player::Stopped).initial();
        builder
            .root()
            .add(Player::Active)
            .on_entry(|_: &mut Log| panic!("no output device"));
        builder.state(Player::Active).add(Player::Playing).initial();
        builder.in_state(Player::Stopped).on(Button::Play).to(Player::Active);
        let mut machine = builder.build().unwrap().create(Log::default()).unwrap();

        let result = panic::catch_unwind(AssertUnwindSafe(|| machine.fire(Button::Play)));

        assert!(result.is_err());
        assert_eq!(machine.active_states(), vec![Player::Stopped]);
        assert!(machine.history().is_empty());
    }
}
