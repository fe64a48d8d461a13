//! Error types
//!
//! Two kinds of failure exist in the actor core:
//!
//! - **Expected errors** ([`ActorError`]) travel through the normal call path
//!   as `Err` values: closed ports, remote failures, values that cannot be
//!   moved or copied, cancellation.
//! - **Invariant violations** indicate a defect in the caller or in the
//!   runtime itself (malformed select input, double registration, basket
//!   reuse, lock misuse). They abort through [`fatal!`] with diagnostic
//!   context instead of returning.

use crate::actor::ActorId;
use crate::value::Value;
use std::fmt;

/// Which port of an actor an operation ran into
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Port {
    /// Feeds the mailbox (`send` / `recv`)
    Incoming,
    /// Feeds the rendezvous (`yield` / `take`)
    Outgoing,
}

impl fmt::Display for Port {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Port::Incoming => write!(f, "incoming"),
            Port::Outgoing => write!(f, "outgoing"),
        }
    }
}

/// Recoverable errors raised by actor operations
#[derive(Debug, Clone, thiserror::Error)]
pub enum ActorError {
    /// The port is already closed
    #[error("the {port} port of actor {actor} is already closed")]
    Closed { port: Port, actor: ActorId },

    /// The message was an exception raised by the sending actor
    #[error("thrown by remote actor {}: {cause}", display_sender(.sender))]
    RemoteFailure {
        sender: Option<ActorId>,
        cause: Value,
    },

    /// Move requested on a kind outside the movable allowlist
    #[error("can not move {0} object")]
    NotMovable(&'static str),

    /// Deep copy failed
    #[error("can not copy the object: {0}")]
    NotCopyable(String),

    /// The value graph contains something that can not be frozen
    #[error("can not make {0} object shareable")]
    NotShareable(&'static str),

    /// The object was moved to another actor
    #[error("can not send any methods to a moved object")]
    Moved,

    /// Mutation of a frozen object
    #[error("can not modify frozen {0} object")]
    Frozen(&'static str),

    /// A pending cancellation was delivered to a waiting thread
    #[error("interrupted")]
    Interrupted,

    /// Selector already watches this actor
    #[error("actor {0} is already added")]
    AlreadyAdded(ActorId),

    /// Selector does not watch this actor
    #[error("actor {0} is not added yet")]
    NotAdded(ActorId),

    /// recv / recv_if called from inside a recv_if predicate
    #[error("can not call receive/receive_if recursively")]
    RecursiveReceive,

    /// The OS refused to start an actor thread
    #[error("failed to start actor thread: {0}")]
    Spawn(String),

    /// Shutdown gave up waiting for actors to terminate
    #[error("shutdown timed out with {0} actors still alive")]
    ShutdownTimeout(usize),
}

fn display_sender(sender: &Option<ActorId>) -> String {
    match sender {
        Some(id) => id.to_string(),
        None => "<unknown>".to_string(),
    }
}

impl ActorError {
    /// Short class name, used when the error is published as an exception object
    pub fn class_name(&self) -> &'static str {
        match self {
            ActorError::Closed { .. } => "ClosedError",
            ActorError::RemoteFailure { .. } => "RemoteError",
            ActorError::NotMovable(_) => "NotMovableError",
            ActorError::NotCopyable(_) => "NotCopyableError",
            ActorError::NotShareable(_) => "NotShareableError",
            ActorError::Moved => "MovedError",
            ActorError::Frozen(_) => "FrozenError",
            ActorError::Interrupted => "Interrupt",
            ActorError::AlreadyAdded(_) | ActorError::NotAdded(_) => "ArgumentError",
            ActorError::RecursiveReceive => "ActorError",
            ActorError::Spawn(_) => "ThreadError",
            ActorError::ShutdownTimeout(_) => "ActorError",
        }
    }

    /// Convert into an `Error` object that can travel in an exception basket
    pub fn into_value(self) -> Value {
        match self {
            // Keep the original cause so a chain of relays still exposes it
            ActorError::RemoteFailure { cause, .. } => cause,
            other => Value::error(other.class_name(), other.to_string()),
        }
    }

    /// True for the closed-port error, on either port
    pub fn is_closed(&self) -> bool {
        matches!(self, ActorError::Closed { .. })
    }
}

/// Result alias used throughout the crate
pub type Result<T, E = ActorError> = std::result::Result<T, E>;

/// Abort on a broken invariant.
///
/// Logs the message at `error` level before panicking so the diagnostic
/// context survives even when the panic is swallowed by a thread boundary.
#[macro_export]
macro_rules! fatal {
    ($($arg:tt)*) => {{
        let message = format!($($arg)*);
        tracing::error!("[BUG] {}", message);
        panic!("[BUG] {}", message)
    }};
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_closed_message_names_port() {
        let id = ActorId::new();
        let err = ActorError::Closed {
            port: Port::Incoming,
            actor: id.clone(),
        };
        let msg = err.to_string();
        assert!(msg.contains("incoming"));
        assert!(msg.contains(&id.to_string()));
        assert!(err.is_closed());
    }

    #[test]
    fn test_into_value_wraps_message() {
        let value = ActorError::NotMovable("native").into_value();
        assert_eq!(value, Value::error("NotMovableError", "can not move native object"));
    }

    #[test]
    fn test_remote_failure_keeps_cause() {
        let cause = Value::error("RuntimeError", "boom");
        let err = ActorError::RemoteFailure {
            sender: None,
            cause: cause.clone(),
        };
        assert!(err.to_string().contains("<unknown>"));
        assert_eq!(err.into_value(), cause);
    }

    #[test]
    #[should_panic(expected = "[BUG] broken 42")]
    fn test_fatal_panics_with_context() {
        fatal!("broken {}", 42);
    }
}
