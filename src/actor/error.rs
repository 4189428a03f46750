//! Actor and directory errors.

use std::time::Duration;
use thiserror::Error;

/// Errors raised by actors and the actor directory.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ActorError {
    #[error("An actor named '{name}' is already registered")]
    NameTaken { name: String },

    #[error("No actor named '{name}' is registered")]
    NotFound { name: String },

    #[error("Mailbox of actor '{name}' is closed")]
    MailboxClosed { name: String },

    #[error("{waiting_for} did not complete within {timeout:?}")]
    Timeout {
        waiting_for: String,
        timeout: Duration,
    },

    #[error("Actors must be spawned from within a tokio runtime")]
    NoRuntime,
}
