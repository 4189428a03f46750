//! Named lookup of actors.

use crate::actor::error::ActorError;
use crate::actor::local::{ActorStatus, Mailbox};
use crate::core::{Event, EventKind};
use crate::idle::IdleTracker;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;

struct Registration<E: EventKind> {
    mailbox: Arc<dyn Mailbox<E>>,
    status: Arc<ActorStatus>,
}

/// Directory of actors sharing an event type, keyed by unique name.
///
/// Directories are plain values: create one per system (or per test) and
/// share it behind an `Arc` with the owners that need to send events. The
/// directory holds its actors strongly until they are deregistered.
pub struct ActorDirectory<E: EventKind> {
    actors: DashMap<String, Registration<E>>,
    idle: Arc<IdleTracker>,
}

impl<E: EventKind> Default for ActorDirectory<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: EventKind> ActorDirectory<E> {
    pub fn new() -> Self {
        Self {
            actors: DashMap::new(),
            idle: Arc::new(IdleTracker::new()),
        }
    }

    pub(crate) fn idle_tracker(&self) -> Arc<IdleTracker> {
        Arc::clone(&self.idle)
    }

    pub(crate) fn register(
        &self,
        mailbox: Arc<dyn Mailbox<E>>,
        status: Arc<ActorStatus>,
    ) -> Result<(), ActorError> {
        match self.actors.entry(mailbox.name().to_string()) {
            Entry::Occupied(entry) => Err(ActorError::NameTaken {
                name: entry.key().clone(),
            }),
            Entry::Vacant(entry) => {
                entry.insert(Registration { mailbox, status });
                Ok(())
            }
        }
    }

    /// Remove the actor named `name`.
    ///
    /// Returns `false` if no such actor was registered. The actor's task
    /// still drains the events already in its mailbox; later sends through
    /// the directory fail with [`ActorError::NotFound`].
    pub fn deregister(&self, name: &str) -> bool {
        let removed = self.actors.remove(name).is_some();
        if !removed {
            tracing::warn!(actor = name, "deregistering unknown actor");
        }
        removed
    }

    pub fn actor_named(&self, name: &str) -> Option<Arc<dyn Mailbox<E>>> {
        self.actors
            .get(name)
            .map(|registration| Arc::clone(&registration.mailbox))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.actors.contains_key(name)
    }

    /// Names of all registered actors, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.actors.iter().map(|entry| entry.key().clone()).collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.actors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actors.is_empty()
    }

    /// Deliver `event` to the actor named `target`.
    ///
    /// Fails with [`ActorError::NotFound`] instead of dropping the event when
    /// no such actor exists.
    pub fn send_event_to(&self, event: Event<E>, target: &str) -> Result<(), ActorError> {
        let mailbox = self.actor_named(target).ok_or_else(|| ActorError::NotFound {
            name: target.to_string(),
        })?;
        mailbox.receive(event)
    }

    /// Wait until each named actor has an empty mailbox and is idle.
    ///
    /// Actors may keep sending each other events while being awaited, so a
    /// round of waiting only counts when no named actor started new work
    /// since the round began. Unknown names fail with [`ActorError::NotFound`].
    pub async fn await_completion(&self, names: &[&str], timeout: Duration) -> Result<(), ActorError> {
        let mut statuses = Vec::with_capacity(names.len());
        for name in names {
            let status = self
                .actors
                .get(*name)
                .map(|registration| Arc::clone(&registration.status))
                .ok_or_else(|| ActorError::NotFound {
                    name: name.to_string(),
                })?;
            statuses.push(status);
        }

        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let started: Vec<u64> = statuses.iter().map(|s| s.idle.started()).collect();
            for status in &statuses {
                tokio::time::timeout_at(deadline, status.idle.wait_idle())
                    .await
                    .map_err(|_| ActorError::Timeout {
                        waiting_for: format!("actors {:?}", names),
                        timeout,
                    })?;
            }
            let settled = statuses.iter().all(|s| s.idle.is_idle())
                && statuses.iter().map(|s| s.idle.started()).eq(started);
            if settled {
                return Ok(());
            }
        }
    }

    /// Wait until no actor spawned in this directory has pending events.
    pub async fn await_all(&self, timeout: Duration) -> Result<(), ActorError> {
        if self.idle.wait_idle_for(timeout).await {
            Ok(())
        } else {
            Err(ActorError::Timeout {
                waiting_for: "all actors".to_string(),
                timeout,
            })
        }
    }
}

impl<E: EventKind> std::fmt::Debug for ActorDirectory<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActorDirectory")
            .field("actors", &self.actors.len())
            .field("pending", &self.idle.pending())
            .finish()
    }
}
