//! Event bus errors.

use std::time::Duration;
use thiserror::Error;

/// Errors raised by [`EventBus`](crate::EventBus).
#[derive(Debug, Error)]
pub enum BusError {
    #[error("Consumer of '{event}' on bus '{bus}' failed")]
    ConsumerFailed {
        bus: String,
        event: &'static str,
        #[source]
        source: anyhow::Error,
    },

    #[error("Asynchronous bus '{bus}' needs a running tokio runtime")]
    NoRuntime { bus: String },

    #[error("Deliveries on bus '{bus}' did not complete within {timeout:?}")]
    Timeout { bus: String, timeout: Duration },
}
