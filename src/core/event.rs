//! Events delivered to state machines.

use super::state::EventKind;
use std::any::Any;
use std::fmt;
use std::sync::Arc;

/// Opaque, shareable event parameter.
pub type Param = Arc<dyn Any + Send + Sync>;

/// Immutable event: a kind plus an ordered list of opaque parameters.
///
/// Cloning an event shares its parameters; consumers must treat them as
/// read-only.
///
/// # Example
///
/// ```rust
/// use hsm_actors::core::Event;
/// use hsm_actors::event_enum;
///
/// event_enum! {
///     enum Signal {
///         Ping,
///     }
/// }
///
/// let event = Event::of(Signal::Ping).with_param(String::from("client-1")).with_param(7u32);
/// assert_eq!(event.param::<String>(0).map(String::as_str), Some("client-1"));
/// assert_eq!(event.param::<u32>(1), Some(&7));
/// assert_eq!(event.param::<u32>(0), None);
/// ```
#[derive(Clone)]
pub struct Event<E: EventKind> {
    kind: E,
    params: Vec<Param>,
}

impl<E: EventKind> Event<E> {
    /// Create an event without parameters.
    pub fn of(kind: E) -> Self {
        Self {
            kind,
            params: Vec::new(),
        }
    }

    /// Create an event from already erased parameters.
    pub fn with_params(kind: E, params: Vec<Param>) -> Self {
        Self { kind, params }
    }

    /// Append a parameter, returning the extended event.
    pub fn with_param<T: Any + Send + Sync>(mut self, value: T) -> Self {
        self.params.push(Arc::new(value));
        self
    }

    pub fn kind(&self) -> E {
        self.kind
    }

    pub fn params(&self) -> &[Param] {
        &self.params
    }

    /// Typed access to the parameter at `index`.
    ///
    /// Returns `None` when the index is out of range or the parameter has a
    /// different type.
    pub fn param<T: Any>(&self, index: usize) -> Option<&T> {
        self.params.get(index)?.downcast_ref::<T>()
    }
}

impl<E: EventKind> fmt::Debug for Event<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Event")
            .field("kind", &self.kind)
            .field("params", &self.params.len())
            .finish()
    }
}

impl<E: EventKind> From<E> for Event<E> {
    fn from(kind: E) -> Self {
        Self::of(kind)
    }
}
