//! The calling actor's view of itself
//!
//! Operations that only make sense for the actor running on the current
//! thread (receiving, yielding, selecting, actor-local storage, owned
//! threads) live on [`ActorContext`]. A context is obtained for the
//! current thread and cannot be sent to another thread.

use crate::actor::ActorRef;
use crate::error::{ActorError, Result};
use crate::mailbox;
use crate::runtime::{current_actor, Runtime};
use crate::select::{self, Action, Offer, Selector, Source};
use crate::value::Value;
use std::marker::PhantomData;
use std::thread::JoinHandle;

/// Handle to the actor owning the current thread
pub struct ActorContext {
    actor: ActorRef,
    _not_send: PhantomData<*const ()>,
}

impl ActorContext {
    pub(crate) fn new(actor: ActorRef) -> Self {
        ActorContext {
            actor,
            _not_send: PhantomData,
        }
    }

    /// Context of the actor owning this thread, if any
    pub fn current() -> Option<ActorContext> {
        current_actor().map(ActorContext::new)
    }

    /// The actor itself, as others see it
    pub fn actor(&self) -> &ActorRef {
        &self.actor
    }

    /// Receive the next message, waiting while the mailbox is empty
    pub fn recv(&self) -> Result<Value> {
        mailbox::receive(&self.actor)
    }

    /// Receive without waiting
    pub fn try_recv(&self) -> Result<Option<Value>> {
        self.actor.check_interrupts()?;
        mailbox::try_receive(&self.actor)
    }

    /// Receive the first message accepted by `pred`
    pub fn recv_if(&self, pred: impl FnMut(&Value) -> bool) -> Result<Value> {
        mailbox::receive_if(&self.actor, pred)
    }

    /// Hand a copy of `value` to one taker, waiting until somebody takes it
    pub fn yield_value(&self, value: Value) -> Result<()> {
        select::select(&self.actor, &[], Some(Offer::copy(value)))?;
        Ok(())
    }

    /// Like [`yield_value`](Self::yield_value) but transfers the storage
    pub fn yield_move(&self, value: Value) -> Result<()> {
        select::select(&self.actor, &[], Some(Offer::moving(value)))?;
        Ok(())
    }

    /// Wait on several actions at once
    pub fn select(&self, actions: &[Action], offer: Option<Offer>) -> Result<(Source, Value)> {
        select::select(&self.actor, actions, offer)
    }

    /// A persistent set of take targets
    pub fn selector(&self) -> Selector {
        Selector::new(self.actor.clone())
    }

    pub fn local_get(&self, key: &str) -> Option<Value> {
        self.actor.local_get(key)
    }

    /// Returns the previous value
    pub fn local_set(&self, key: &str, value: Value) -> Option<Value> {
        self.actor.local_set(key, value)
    }

    /// Value under `key`, storing `init()` first if there is none.
    ///
    /// Unlike a `local_get` followed by `local_set`, this cannot race with
    /// the actor's other threads.
    pub fn local_get_or_insert_with(&self, key: &str, init: impl FnOnce() -> Value) -> Value {
        self.actor.local_get_or_insert_with(key, init)
    }

    pub fn local_remove(&self, key: &str) -> Option<Value> {
        self.actor.local_remove(key)
    }

    /// Join a pending barrier and surface a pending interrupt
    pub fn check_interrupts(&self) -> Result<()> {
        self.actor.check_interrupts()
    }

    /// Run `f` with the current thread counted as blocked.
    ///
    /// For foreign calls that may wait indefinitely (I/O, sleeping). `f`
    /// must not touch actor state.
    pub fn blocking<R>(&self, f: impl FnOnce() -> R) -> R {
        match self.actor.runtime() {
            Some(rt) => rt.blocking(f),
            None => f(),
        }
    }

    /// Start another thread owned by this actor
    pub fn spawn_thread<F, R>(&self, f: F) -> Result<JoinHandle<R>>
    where
        F: FnOnce(&ActorContext) -> R + Send + 'static,
        R: Send + 'static,
    {
        let Some(rt) = self.actor.runtime() else {
            return Err(ActorError::Spawn("runtime is gone".to_string()));
        };
        rt.spawn_thread(&self.actor, f)
    }

    pub fn runtime(&self) -> Option<Runtime> {
        self.actor.runtime()
    }
}
