//! Typed publish/subscribe event bus.
//!
//! Consumers register for a concrete event type. Publishing an event
//! delivers it to the consumers of its type and then, following
//! [`BusEvent::parent`], to the consumers of every embedded "supertype".
//!
//! # Delivery
//!
//! - **Synchronous**: consumers run on the publishing thread, in
//!   registration order, before `publish` returns. The first failing
//!   consumer aborts the publication and its error is returned.
//! - **Asynchronous**: each consumer runs as its own task on a tokio
//!   runtime; `publish` returns immediately. There is no ordering between
//!   consumers. Failures are logged and counted in
//!   [`EventBus::failed_deliveries`], never silently dropped.
//!
//! Every consumer receives a reference to the same event instance.

mod error;

pub use error::BusError;

use crate::idle::IdleTracker;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::any::{Any, TypeId};
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use uuid::Uuid;

/// An event that can be published on an [`EventBus`].
///
/// Rust has no class hierarchy, so an event declares its supertype by
/// embedding it and returning it from [`parent`](Self::parent).
///
/// # Example
///
/// ```
/// use hsm_actors::{BusEvent, EventBus};
/// use std::sync::atomic::{AtomicUsize, Ordering};
/// use std::sync::Arc;
///
/// struct Notice {
///     text: String,
/// }
///
/// impl BusEvent for Notice {}
///
/// struct Alarm {
///     notice: Notice,
///     level: u8,
/// }
///
/// impl BusEvent for Alarm {
///     fn parent(&self) -> Option<&(dyn BusEvent + 'static)> {
///         Some(&self.notice)
///     }
/// }
///
/// let bus = EventBus::synchronous("alerts");
/// let seen = Arc::new(AtomicUsize::new(0));
/// let counter = Arc::clone(&seen);
/// bus.register(move |notice: &Notice| {
///     assert!(!notice.text.is_empty());
///     counter.fetch_add(1, Ordering::SeqCst);
///     Ok(())
/// });
///
/// bus.publish(Notice { text: "hello".into() }).unwrap();
/// bus.publish(Alarm { notice: Notice { text: "fire".into() }, level: 3 }).unwrap();
/// assert_eq!(seen.load(Ordering::SeqCst), 2);
/// ```
pub trait BusEvent: Any + Send + Sync + 'static {
    /// The embedded supertype event, if any.
    fn parent(&self) -> Option<&(dyn BusEvent + 'static)> {
        None
    }
}

/// Handle identifying a registered consumer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConsumerId(Uuid);

impl fmt::Display for ConsumerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

type Consumer = Arc<dyn Fn(&dyn Any) -> anyhow::Result<()> + Send + Sync>;

struct Subscription {
    id: ConsumerId,
    consumer: Consumer,
}

enum Delivery {
    Synchronous,
    Asynchronous(Handle),
}

/// Named publish/subscribe router.
pub struct EventBus {
    name: String,
    delivery: Delivery,
    consumers: DashMap<TypeId, Vec<Subscription>>,
    in_flight: Arc<IdleTracker>,
    failures: Arc<AtomicU64>,
}

impl EventBus {
    /// Bus delivering on the publishing thread.
    pub fn synchronous(name: impl Into<String>) -> Self {
        Self::with_delivery(name.into(), Delivery::Synchronous)
    }

    /// Bus delivering on the current tokio runtime.
    pub fn asynchronous(name: impl Into<String>) -> Result<Self, BusError> {
        let name = name.into();
        match Handle::try_current() {
            Ok(handle) => Ok(Self::with_delivery(name, Delivery::Asynchronous(handle))),
            Err(_) => Err(BusError::NoRuntime { bus: name }),
        }
    }

    /// Bus delivering on the runtime behind `handle`.
    ///
    /// The runtime's owner decides when its worker threads shut down.
    pub fn asynchronous_on(name: impl Into<String>, handle: Handle) -> Self {
        Self::with_delivery(name.into(), Delivery::Asynchronous(handle))
    }

    fn with_delivery(name: String, delivery: Delivery) -> Self {
        Self {
            name,
            delivery,
            consumers: DashMap::new(),
            in_flight: Arc::new(IdleTracker::new()),
            failures: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_asynchronous(&self) -> bool {
        matches!(self.delivery, Delivery::Asynchronous(_))
    }

    /// Register `consumer` for events of type `T` and, through
    /// [`BusEvent::parent`], for every event embedding a `T`.
    pub fn register<T, F>(&self, consumer: F) -> ConsumerId
    where
        T: BusEvent,
        F: Fn(&T) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        let id = ConsumerId(Uuid::new_v4());
        let consumer: Consumer = Arc::new(move |event: &dyn Any| match event.downcast_ref::<T>() {
            Some(event) => consumer(event),
            None => Ok(()),
        });
        self.consumers
            .entry(TypeId::of::<T>())
            .or_default()
            .push(Subscription { id, consumer });
        tracing::trace!(bus = %self.name, consumer = %id, event = std::any::type_name::<T>(), "consumer registered");
        id
    }

    /// Remove a consumer of `T`. Removing an unknown consumer is a no-op
    /// returning `false`.
    pub fn unregister<T: BusEvent>(&self, id: ConsumerId) -> bool {
        let Some(mut subscriptions) = self.consumers.get_mut(&TypeId::of::<T>()) else {
            return false;
        };
        let before = subscriptions.len();
        subscriptions.retain(|subscription| subscription.id != id);
        before != subscriptions.len()
    }

    pub fn is_registered<T: BusEvent>(&self, id: ConsumerId) -> bool {
        self.consumers
            .get(&TypeId::of::<T>())
            .is_some_and(|subscriptions| subscriptions.iter().any(|s| s.id == id))
    }

    /// Number of consumers registered directly for `T`.
    pub fn consumer_count<T: BusEvent>(&self) -> usize {
        self.consumers
            .get(&TypeId::of::<T>())
            .map_or(0, |subscriptions| subscriptions.len())
    }

    /// Publish `event`, returning the number of consumers it was delivered
    /// (synchronous) or submitted (asynchronous) to.
    pub fn publish<T: BusEvent>(&self, event: T) -> Result<usize, BusError> {
        let event: Arc<dyn BusEvent> = Arc::new(event);
        let deliveries = self.deliveries(event.as_ref());
        tracing::trace!(
            bus = %self.name,
            event = std::any::type_name::<T>(),
            consumers = deliveries.len(),
            "event published"
        );

        match &self.delivery {
            Delivery::Synchronous => {
                for (depth, consumer) in &deliveries {
                    if let Some(level) = ancestor(event.as_ref(), *depth) {
                        consumer(level).map_err(|source| BusError::ConsumerFailed {
                            bus: self.name.clone(),
                            event: std::any::type_name::<T>(),
                            source,
                        })?;
                    }
                }
            }
            Delivery::Asynchronous(handle) => {
                for (depth, consumer) in &deliveries {
                    self.in_flight.begin();
                    handle.spawn(deliver(
                        self.name.clone(),
                        std::any::type_name::<T>(),
                        Arc::clone(&event),
                        *depth,
                        Arc::clone(consumer),
                        Arc::clone(&self.in_flight),
                        Arc::clone(&self.failures),
                    ));
                }
            }
        }
        Ok(deliveries.len())
    }

    /// Asynchronous deliveries that failed or panicked so far.
    pub fn failed_deliveries(&self) -> u64 {
        self.failures.load(Ordering::SeqCst)
    }

    /// Wait until every submitted asynchronous delivery has finished.
    pub async fn await_idle(&self, timeout: Duration) -> Result<(), BusError> {
        if self.in_flight.wait_idle_for(timeout).await {
            Ok(())
        } else {
            Err(BusError::Timeout {
                bus: self.name.clone(),
                timeout,
            })
        }
    }

    /// Consumers matching each level of the event's parent chain, tagged
    /// with the level's depth. Consumers are cloned out so none runs while
    /// the consumer map is locked.
    fn deliveries(&self, event: &dyn BusEvent) -> Vec<(usize, Consumer)> {
        let mut deliveries = Vec::new();
        let mut level = Some(event);
        let mut depth = 0;
        while let Some(current) = level {
            let any: &dyn Any = current;
            if let Some(subscriptions) = self.consumers.get(&any.type_id()) {
                deliveries.extend(
                    subscriptions
                        .iter()
                        .map(|subscription| (depth, Arc::clone(&subscription.consumer))),
                );
            }
            level = current.parent();
            depth += 1;
        }
        deliveries
    }
}

fn ancestor(event: &dyn BusEvent, depth: usize) -> Option<&dyn Any> {
    let mut level = event;
    for _ in 0..depth {
        level = level.parent()?;
    }
    Some(level)
}

async fn deliver(
    bus: String,
    event_type: &'static str,
    event: Arc<dyn BusEvent>,
    depth: usize,
    consumer: Consumer,
    in_flight: Arc<IdleTracker>,
    failures: Arc<AtomicU64>,
) {
    let result = std::panic::catch_unwind(AssertUnwindSafe(|| match ancestor(event.as_ref(), depth) {
        Some(level) => consumer(level),
        None => Ok(()),
    }));
    match result {
        Ok(Ok(())) => {}
        Ok(Err(error)) => {
            failures.fetch_add(1, Ordering::SeqCst);
            tracing::error!(bus = %bus, event = event_type, error = %error, "asynchronous delivery failed");
        }
        Err(_) => {
            failures.fetch_add(1, Ordering::SeqCst);
            tracing::error!(bus = %bus, event = event_type, "consumer panicked");
        }
    }
    in_flight.end();
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("name", &self.name)
            .field("asynchronous", &self.is_asynchronous())
            .field("event_types", &self.consumers.len())
            .finish()
    }
}
