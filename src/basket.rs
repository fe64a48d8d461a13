//! Message envelopes
//!
//! A [`Basket`] carries one value between actors together with the way it
//! was transferred. The payload is prepared when the basket is built, on
//! the sender's thread:
//!
//! ```text
//!   value ──► shareable? ──yes──► Shareable (same reference)
//!               │ no
//!               ▼
//!           wants_move? ──yes──► Move (storage transferred, original poisoned)
//!               │ no
//!               ▼
//!             Copy (deep copy through the object model)
//! ```
//!
//! A basket is consumed exactly once by [`Basket::accept`], which empties it.

use crate::actor::ActorId;
use crate::error::{ActorError, Result};
use crate::fatal;
use crate::serialize::ObjectModel;
use crate::value::Value;
use std::fmt;

/// How the payload was transferred
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BasketKind {
    /// Empty (never filled, or already accepted)
    None,
    /// Payload is the sender's own reference
    Shareable,
    /// Payload is an independent deep copy
    Copy,
    /// Payload took over the storage of the sender's object
    Move,
    /// Payload is an error raised by the sender
    Exception,
}

impl fmt::Display for BasketKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BasketKind::None => "none",
            BasketKind::Shareable => "shareable",
            BasketKind::Copy => "copy",
            BasketKind::Move => "move",
            BasketKind::Exception => "exception",
        };
        write!(f, "{}", name)
    }
}

/// Message envelope
#[derive(Debug)]
pub struct Basket {
    kind: BasketKind,
    payload: Value,
    sender: Option<ActorId>,
}

impl Basket {
    /// Build a basket for `value`.
    ///
    /// Fails with `Moved` when the value's storage was already moved away,
    /// with `NotMovable` when a move is requested on a kind outside the
    /// movable allowlist, and with `NotCopyable` when the deep copy
    /// fails. A failed move leaves the original untouched.
    pub fn new(
        model: &dyn ObjectModel,
        sender: Option<ActorId>,
        value: Value,
        wants_move: bool,
        is_exception: bool,
    ) -> Result<Basket> {
        if value.is_moved() {
            return Err(ActorError::Moved);
        }
        let (kind, payload) = if model.is_shareable(&value) {
            (BasketKind::Shareable, value)
        } else if wants_move {
            let moved = match &value {
                Value::Object(obj) => Value::Object(obj.move_out()?),
                // Immediates are always shareable
                other => other.clone(),
            };
            (BasketKind::Move, moved)
        } else {
            (BasketKind::Copy, model.deep_copy(&value)?)
        };

        let kind = if is_exception { BasketKind::Exception } else { kind };
        tracing::trace!(kind = %kind, "basket filled");
        Ok(Basket {
            kind,
            payload,
            sender,
        })
    }

    /// Final value of a terminating actor.
    ///
    /// Filled like any other basket: the routine may have captured a handle
    /// its creator still holds, so non-shareable values are copied.
    pub fn will(
        model: &dyn ObjectModel,
        sender: ActorId,
        value: Value,
        is_exception: bool,
    ) -> Result<Basket> {
        Basket::new(model, Some(sender), value, false, is_exception)
    }

    pub fn kind(&self) -> BasketKind {
        self.kind
    }

    pub fn sender(&self) -> Option<&ActorId> {
        self.sender.as_ref()
    }

    /// The payload without consuming it
    pub fn peek(&self) -> &Value {
        &self.payload
    }

    /// True once the basket has been accepted
    pub fn is_empty(&self) -> bool {
        self.kind == BasketKind::None
    }

    /// Consume the basket.
    ///
    /// Exception baskets surface as `RemoteFailure` tagged with the sender.
    /// The basket is empty afterwards whatever the outcome; accepting it
    /// again is a fatal error.
    pub fn accept(&mut self) -> Result<Value> {
        let kind = std::mem::replace(&mut self.kind, BasketKind::None);
        let payload = std::mem::replace(&mut self.payload, Value::Nil);
        match kind {
            BasketKind::None => fatal!("basket accepted twice (sender {:?})", self.sender),
            BasketKind::Exception => Err(ActorError::RemoteFailure {
                sender: self.sender.clone(),
                cause: payload,
            }),
            _ => Ok(payload),
        }
    }
}
