//! Mailbox actors wrapping a single state machine.

use crate::actor::directory::ActorDirectory;
use crate::actor::error::ActorError;
use crate::core::{Event, EventKind, State};
use crate::idle::IdleTracker;
use crate::machine::{Outcome, ProcessError, StateMachine};
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::mpsc;

/// Anything that accepts events by name: the object-safe face of an actor
/// stored in an [`ActorDirectory`].
pub trait Mailbox<E: EventKind>: Send + Sync {
    fn name(&self) -> &str;

    /// Enqueue `event` without waiting for it to be processed.
    fn receive(&self, event: Event<E>) -> Result<(), ActorError>;

    /// Events received but not yet fully processed.
    fn pending(&self) -> usize;

    fn is_idle(&self) -> bool {
        self.pending() == 0
    }
}

/// Processing counters shared between an actor and its loop.
#[derive(Debug)]
pub(crate) struct ActorStatus {
    pub(crate) idle: IdleTracker,
    directory: Arc<IdleTracker>,
    processed: AtomicU64,
    failed: AtomicU64,
}

impl ActorStatus {
    fn begin(&self) {
        self.directory.begin();
        self.idle.begin();
    }

    fn end(&self) {
        self.idle.end();
        self.directory.end();
    }
}

type SharedMachine<O, S, E> = Arc<Mutex<StateMachine<O, S, E>>>;

/// A named state machine with a mailbox.
///
/// [`receive`](Mailbox::receive) only enqueues; a dedicated task dequeues
/// events in FIFO order and hands them to the machine one at a time, so a
/// machine never processes two events concurrently.
///
/// An event whose processing fails or panics is logged and counted in
/// [`failed_events`](Self::failed_events); the actor keeps running with the
/// configuration restored by the machine.
pub struct Actor<O, S: State, E: EventKind> {
    name: String,
    mailbox: mpsc::UnboundedSender<Event<E>>,
    machine: SharedMachine<O, S, E>,
    status: Arc<ActorStatus>,
}

impl<O, S, E> Actor<O, S, E>
where
    O: Send + 'static,
    S: State,
    E: EventKind,
{
    /// Register an actor named `name` in `directory` and start its
    /// processing task on the current tokio runtime.
    pub fn spawn(
        directory: &ActorDirectory<E>,
        name: impl Into<String>,
        machine: StateMachine<O, S, E>,
    ) -> Result<Arc<Self>, ActorError> {
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| ActorError::NoRuntime)?;
        let name = name.into();
        let (sender, receiver) = mpsc::unbounded_channel();
        let status = Arc::new(ActorStatus {
            idle: IdleTracker::new(),
            directory: directory.idle_tracker(),
            processed: AtomicU64::new(0),
            failed: AtomicU64::new(0),
        });
        let actor = Arc::new(Self {
            name: name.clone(),
            mailbox: sender,
            machine: Arc::new(Mutex::new(machine)),
            status: Arc::clone(&status),
        });

        directory.register(Arc::clone(&actor) as Arc<dyn Mailbox<E>>, Arc::clone(&status))?;
        runtime.spawn(run(
            name.clone(),
            receiver,
            Arc::clone(&actor.machine),
            status,
        ));
        tracing::debug!(actor = %name, "actor started");
        Ok(actor)
    }

    /// Wait until the mailbox is empty and no event is being processed.
    ///
    /// This is a quiescence check: an actor that will receive more events
    /// later is indistinguishable from a finished one.
    pub async fn await_completion(&self, timeout: Duration) -> Result<(), ActorError> {
        if self.status.idle.wait_idle_for(timeout).await {
            Ok(())
        } else {
            Err(ActorError::Timeout {
                waiting_for: format!("actor '{}'", self.name),
                timeout,
            })
        }
    }

    /// Run `f` against the machine between two events.
    ///
    /// Must not be called from one of this actor's own actions.
    pub fn inspect<R>(&self, f: impl FnOnce(&StateMachine<O, S, E>) -> R) -> R {
        f(&lock(&self.machine))
    }

    pub fn active_states(&self) -> Vec<S> {
        self.inspect(|machine| machine.active_states())
    }

    /// Events processed so far, failed ones included.
    pub fn processed_events(&self) -> u64 {
        self.status.processed.load(Ordering::SeqCst)
    }

    /// Events whose processing returned an error or panicked.
    pub fn failed_events(&self) -> u64 {
        self.status.failed.load(Ordering::SeqCst)
    }
}

impl<O, S, E> Mailbox<E> for Actor<O, S, E>
where
    O: Send + 'static,
    S: State,
    E: EventKind,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn receive(&self, event: Event<E>) -> Result<(), ActorError> {
        self.status.begin();
        tracing::trace!(actor = %self.name, event = event.kind().name(), "event received");
        if self.mailbox.send(event).is_err() {
            self.status.end();
            return Err(ActorError::MailboxClosed {
                name: self.name.clone(),
            });
        }
        Ok(())
    }

    fn pending(&self) -> usize {
        self.status.idle.pending()
    }
}

impl<O, S: State, E: EventKind> std::fmt::Debug for Actor<O, S, E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Actor")
            .field("name", &self.name)
            .field("pending", &self.status.idle.pending())
            .finish()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

async fn run<O, S, E>(
    name: String,
    mut receiver: mpsc::UnboundedReceiver<Event<E>>,
    machine: SharedMachine<O, S, E>,
    status: Arc<ActorStatus>,
) where
    O: Send + 'static,
    S: State,
    E: EventKind,
{
    while let Some(event) = receiver.recv().await {
        let result = {
            let mut machine = lock(&machine);
            std::panic::catch_unwind(AssertUnwindSafe(|| machine.process(&event)))
        };
        match result {
            Ok(Ok(Outcome::Ignored)) => {
                tracing::trace!(actor = %name, event = event.kind().name(), "event ignored");
            }
            Ok(Ok(Outcome::Handled(fired))) => {
                tracing::trace!(actor = %name, event = event.kind().name(), fired, "event processed");
            }
            Ok(Err(error)) => report_failure(&name, &event, &status, &error),
            Err(payload) => {
                status.failed.fetch_add(1, Ordering::SeqCst);
                tracing::error!(
                    actor = %name,
                    event = event.kind().name(),
                    panic = panic_message(payload.as_ref()),
                    "action panicked"
                );
            }
        }
        status.processed.fetch_add(1, Ordering::SeqCst);
        status.end();
    }
    tracing::debug!(actor = %name, "mailbox closed");
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&str>() {
        *message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.as_str()
    } else {
        "unknown panic"
    }
}

fn report_failure<E: EventKind>(
    name: &str,
    event: &Event<E>,
    status: &ActorStatus,
    error: &ProcessError,
) {
    status.failed.fetch_add(1, Ordering::SeqCst);
    tracing::error!(
        actor = %name,
        event = event.kind().name(),
        error = %error,
        phase = %error.phase(),
        "event processing failed"
    );
}
