//! Actor types
//!
//! An actor consists of:
//! - Identity (ActorId, plus a small sequence number for display)
//! - A mailbox with closable incoming and outgoing ports
//! - A waiting list of actors parked on `take` against it
//! - A wait slot describing what its parked thread waits for
//! - Thread bookkeeping that drives the Running/Blocking status
//!
//! All of the messaging state sits behind the actor's own lock. The lock
//! is never held while another actor's lock is acquired.

use crate::basket::Basket;
use crate::error::{ActorError, Port, Result};
use crate::fatal;
use crate::mailbox::{self, Mailbox};
use crate::runtime::{current_actor, Runtime, Shared};
use crate::select::{self, Action};
use crate::serialize::ObjectModel;
use crate::value::Value;
use crate::wait::{Parked, WaitState, WaitStatus, Wakeup};
use crate::waiting::{self, WaitingList};
use parking_lot::{Condvar, Mutex, MutexGuard};
use std::collections::HashMap;
use std::fmt;
use std::ops::Deref;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Arc, Weak};
use uuid::Uuid;

/// Unique identifier for an actor
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ActorId(pub Uuid);

impl ActorId {
    /// Create a new random actor ID
    pub fn new() -> Self {
        ActorId(Uuid::new_v4())
    }

    /// Create from an existing UUID
    pub fn from_uuid(uuid: Uuid) -> Self {
        ActorId(uuid)
    }

    /// Get the UUID as a string
    pub fn as_str(&self) -> String {
        self.0.to_string()
    }
}

impl Default for ActorId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ActorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle of an actor
///
/// ```text
/// Created ──register──► Blocking ◄──all threads block── Running
///                          │  └──────a thread resumes──────►│
///                          └────last thread exits──► Terminated
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ActorStatus {
    Created = 0,
    Running = 1,
    Blocking = 2,
    Terminated = 3,
}

impl ActorStatus {
    fn from_u8(raw: u8) -> ActorStatus {
        match raw {
            0 => ActorStatus::Created,
            1 => ActorStatus::Running,
            2 => ActorStatus::Blocking,
            _ => ActorStatus::Terminated,
        }
    }
}

impl fmt::Display for ActorStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ActorStatus::Created => "created",
            ActorStatus::Running => "running",
            ActorStatus::Blocking => "blocking",
            ActorStatus::Terminated => "terminated",
        };
        write!(f, "{}", name)
    }
}

/// Owned threads of an actor. Only touched under the runtime state lock.
#[derive(Debug, Default)]
pub(crate) struct ThreadCounts {
    pub count: usize,
    pub blocking: usize,
}

/// Everything guarded by the actor lock
#[derive(Debug, Default)]
pub(crate) struct SyncState {
    pub mailbox: Mailbox,
    pub takers: WaitingList,
    pub wait: WaitState,
    /// Standing offer left behind by a terminating actor
    pub at_exit: Option<Basket>,
}

/// Actor instance
pub struct Actor {
    id: ActorId,
    number: u64,
    name: Option<String>,
    status: AtomicU8,
    pub(crate) sync: Mutex<SyncState>,
    pub(crate) cond: Condvar,
    pub(crate) threads: Mutex<ThreadCounts>,
    /// Set by a barrier requester; checked at every checkpoint
    pub(crate) barrier_interrupt: AtomicBool,
    /// Pending cancellation
    cancel: AtomicBool,
    locals: Mutex<HashMap<String, Value>>,
    model: Arc<dyn ObjectModel>,
    runtime: Weak<Shared>,
}

impl Actor {
    pub(crate) fn new(
        number: u64,
        name: Option<String>,
        model: Arc<dyn ObjectModel>,
        runtime: Weak<Shared>,
    ) -> Actor {
        Actor {
            id: ActorId::new(),
            number,
            name,
            status: AtomicU8::new(ActorStatus::Created as u8),
            sync: Mutex::new(SyncState::default()),
            cond: Condvar::new(),
            threads: Mutex::new(ThreadCounts::default()),
            barrier_interrupt: AtomicBool::new(false),
            cancel: AtomicBool::new(false),
            locals: Mutex::new(HashMap::new()),
            model,
            runtime,
        }
    }

    pub fn id(&self) -> &ActorId {
        &self.id
    }

    /// Sequence number, unique within its runtime (the main actor is 1)
    pub fn number(&self) -> u64 {
        self.number
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn status(&self) -> ActorStatus {
        ActorStatus::from_u8(self.status.load(Ordering::Acquire))
    }

    pub(crate) fn set_status(&self, next: ActorStatus) {
        let prev = self.status();
        let legal = matches!(
            (prev, next),
            (ActorStatus::Created, _)
                | (ActorStatus::Running, ActorStatus::Blocking)
                | (ActorStatus::Running, ActorStatus::Terminated)
                | (ActorStatus::Blocking, ActorStatus::Running)
                | (ActorStatus::Blocking, ActorStatus::Terminated)
        );
        if !legal {
            fatal!("actor {} illegal status transition {} -> {}", self.id, prev, next);
        }
        self.status.store(next as u8, Ordering::Release);
        tracing::debug!(actor = %self.id, from = %prev, to = %next, "status");
    }

    pub(crate) fn runtime(&self) -> Option<Runtime> {
        self.runtime.upgrade().map(Runtime::from_shared)
    }

    pub(crate) fn model(&self) -> &dyn ObjectModel {
        self.model.as_ref()
    }

    pub fn is_incoming_closed(&self) -> bool {
        self.sync.lock().mailbox.incoming_closed
    }

    pub fn is_outgoing_closed(&self) -> bool {
        self.sync.lock().mailbox.outgoing_closed
    }

    /// Number of queued messages
    pub fn mailbox_len(&self) -> usize {
        self.sync.lock().mailbox.len()
    }

    /// Number of actors currently registered to take from this one
    pub fn taker_count(&self) -> usize {
        self.sync.lock().takers.len()
    }

    /// What this actor's parked thread waits for, if any
    pub fn wait_status(&self) -> WaitStatus {
        self.sync.lock().wait.status
    }

    /// Wake the parked thread if it waits on `mask` and nobody claimed it yet
    pub(crate) fn wakeup_locked(&self, sync: &mut SyncState, mask: WaitStatus, reason: Wakeup) -> bool {
        if sync.wait.sleeping_by(mask) {
            sync.wait.wakeup = reason;
            self.cond.notify_all();
            tracing::trace!(actor = %self.id, wait = %sync.wait.status, reason = %reason, "wakeup");
            true
        } else {
            false
        }
    }

    /// Wait until no other thread of this actor occupies the wait slot
    pub(crate) fn wait_slot(&self, sync: &mut MutexGuard<'_, SyncState>) {
        while !sync.wait.status.is_none() {
            let runtime = self.runtime();
            if let Some(rt) = &runtime {
                rt.enter_blocking();
            }
            while !sync.wait.status.is_none() {
                self.cond.wait(sync);
            }
            if let Some(rt) = &runtime {
                MutexGuard::unlocked(sync, || rt.leave_blocking());
            }
        }
    }

    /// Claim the wait slot for `status`. Returns the new wait round.
    pub(crate) fn begin_wait(&self, sync: &mut SyncState, status: WaitStatus) -> u64 {
        if !sync.wait.status.is_none() {
            fatal!("actor {} wait slot busy ({})", self.id, sync.wait.status);
        }
        sync.wait.status = status;
        sync.wait.wakeup = Wakeup::None;
        sync.wait.round += 1;
        sync.wait.round
    }

    /// Sleep until a wakeup is recorded or a cancellation is pending.
    ///
    /// The calling thread counts as blocked for the duration. Returns with
    /// the lock held and the wait slot released.
    pub(crate) fn park(&self, sync: &mut MutexGuard<'_, SyncState>) -> Parked {
        if sync.wait.status.is_none() {
            fatal!("actor {} parked without a wait status", self.id);
        }
        if sync.wait.wakeup == Wakeup::None && !self.cancel_pending() {
            tracing::trace!(actor = %self.id, wait = %sync.wait.status, "park");
            let runtime = self.runtime();
            if let Some(rt) = &runtime {
                rt.enter_blocking();
            }
            while sync.wait.wakeup == Wakeup::None && !self.cancel_pending() {
                self.cond.wait(sync);
            }
            if let Some(rt) = &runtime {
                MutexGuard::unlocked(sync, || rt.leave_blocking());
            }
        }
        if sync.wait.wakeup == Wakeup::None {
            sync.wait.wakeup = Wakeup::ByInterrupt;
        }

        let parked = Parked {
            reason: sync.wait.wakeup,
            taken: sync.wait.taken.take(),
            yielded: sync.wait.yielded.take(),
        };
        sync.wait.status = WaitStatus::NONE;
        sync.wait.wakeup = Wakeup::None;
        self.cond.notify_all();
        tracing::trace!(actor = %self.id, reason = %parked.reason, "unpark");
        parked
    }

    fn cancel_pending(&self) -> bool {
        self.cancel.load(Ordering::Acquire)
    }

    /// Consume a pending cancellation
    pub(crate) fn take_cancel(&self) -> bool {
        self.cancel.swap(false, Ordering::AcqRel)
    }

    /// Checkpoint: join a pending barrier, then surface a pending cancellation
    pub(crate) fn check_interrupts(&self) -> Result<()> {
        if self.barrier_interrupt.load(Ordering::Acquire) {
            if let Some(rt) = self.runtime() {
                drop(rt.lock());
            }
        }
        if self.take_cancel() {
            tracing::debug!(actor = %self.id, "interrupted");
            return Err(ActorError::Interrupted);
        }
        Ok(())
    }

    /// Request cancellation of whatever this actor's thread is waiting on
    pub fn interrupt(&self) {
        self.cancel.store(true, Ordering::Release);
        let mut sync = self.sync.lock();
        if !self.wakeup_locked(&mut sync, WaitStatus::ANY, Wakeup::ByInterrupt) {
            self.cond.notify_all();
        }
    }

    /// Wake a parked thread without cancelling anything; it resumes waiting
    pub fn wakeup(&self) {
        let mut sync = self.sync.lock();
        self.wakeup_locked(&mut sync, WaitStatus::ANY, Wakeup::ByInterrupt);
    }

    pub(crate) fn local_get(&self, key: &str) -> Option<Value> {
        self.locals.lock().get(key).cloned()
    }

    pub(crate) fn local_set(&self, key: &str, value: Value) -> Option<Value> {
        self.locals.lock().insert(key.to_string(), value)
    }

    /// Value under `key`, storing `init()` first if there is none.
    /// Atomic across the actor's threads.
    pub(crate) fn local_get_or_insert_with(
        &self,
        key: &str,
        init: impl FnOnce() -> Value,
    ) -> Value {
        self.locals
            .lock()
            .entry(key.to_string())
            .or_insert_with(init)
            .clone()
    }

    pub(crate) fn local_remove(&self, key: &str) -> Option<Value> {
        self.locals.lock().remove(key)
    }
}

/// Reference to an actor (for sending messages)
#[derive(Clone)]
pub struct ActorRef {
    inner: Arc<Actor>,
}

impl ActorRef {
    pub(crate) fn new(actor: Actor) -> Self {
        ActorRef {
            inner: Arc::new(actor),
        }
    }

    /// Send a copy (or the shared reference) of `value` to this actor's mailbox
    pub fn send(&self, value: Value) -> Result<()> {
        self.send_basket(value, false)
    }

    /// Send `value`, transferring its storage; the caller's handle is poisoned
    pub fn send_move(&self, value: Value) -> Result<()> {
        self.send_basket(value, true)
    }

    fn send_basket(&self, value: Value, wants_move: bool) -> Result<()> {
        let sender = current_actor();
        if let Some(cr) = &sender {
            cr.check_interrupts()?;
        }
        let basket = Basket::new(
            self.model(),
            sender.map(|cr| cr.id().clone()),
            value,
            wants_move,
            false,
        )?;
        mailbox::send(self, basket)
    }

    /// Wait for this actor to yield a value (or for its at-exit value).
    ///
    /// Must be called from inside an actor context.
    pub fn take(&self) -> Result<Value> {
        let Some(cr) = current_actor() else {
            fatal!("take called outside actor context");
        };
        let (_, value) = select::select(&cr, &[Action::Take(self.clone())], None)?;
        Ok(value)
    }

    /// Close the incoming port. Returns whether it was already closed.
    pub fn close_incoming(&self) -> bool {
        mailbox::close_incoming(self)
    }

    /// Close the outgoing port. Returns whether it was already closed.
    pub fn close_outgoing(&self) -> bool {
        waiting::close_outgoing(self)
    }

    pub fn ptr_eq(&self, other: &ActorRef) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Deref for ActorRef {
    type Target = Actor;

    fn deref(&self) -> &Actor {
        &self.inner
    }
}

impl PartialEq for ActorRef {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for ActorRef {}

impl fmt::Debug for ActorRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActorRef")
            .field("id", &self.id)
            .field("number", &self.number)
            .field("status", &self.status())
            .finish()
    }
}

impl fmt::Display for ActorRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#<Actor:#{}", self.number)?;
        if let Some(name) = &self.name {
            write!(f, " {}", name)?;
        }
        write!(f, " {}>", self.status())
    }
}

/// Closed-port error for this actor
pub(crate) fn closed(actor: &Actor, port: Port) -> ActorError {
    ActorError::Closed {
        port,
        actor: actor.id().clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::serialize::DefaultObjectModel;

    fn detached(number: u64, name: Option<&str>) -> ActorRef {
        ActorRef::new(Actor::new(
            number,
            name.map(str::to_string),
            Arc::new(DefaultObjectModel),
            Weak::new(),
        ))
    }

    #[test]
    fn test_actor_id_creation() {
        let id1 = ActorId::new();
        let id2 = ActorId::new();
        assert_ne!(id1, id2);
        assert_eq!(ActorId::from_uuid(id1.0).as_str(), id1.to_string());
    }

    #[test]
    fn test_display() {
        let actor = detached(3, Some("worker"));
        assert_eq!(actor.to_string(), "#<Actor:#3 worker created>");
        actor.set_status(ActorStatus::Blocking);
        assert_eq!(actor.to_string(), "#<Actor:#3 worker blocking>");

        let anonymous = detached(4, None);
        assert_eq!(anonymous.to_string(), "#<Actor:#4 created>");
    }

    #[test]
    fn test_status_transitions() {
        let actor = detached(1, None);
        actor.set_status(ActorStatus::Blocking);
        actor.set_status(ActorStatus::Running);
        actor.set_status(ActorStatus::Blocking);
        actor.set_status(ActorStatus::Terminated);
        assert_eq!(actor.status(), ActorStatus::Terminated);
    }

    #[test]
    #[should_panic(expected = "illegal status transition")]
    fn test_terminated_is_final() {
        let actor = detached(1, None);
        actor.set_status(ActorStatus::Terminated);
        actor.set_status(ActorStatus::Running);
    }

    #[test]
    fn test_wakeup_only_claims_matching_sleeper() {
        let actor = detached(1, None);
        let mut sync = actor.sync.lock();
        actor.begin_wait(&mut sync, WaitStatus::RECEIVING);

        assert!(!actor.wakeup_locked(&mut sync, WaitStatus::TAKING, Wakeup::ByYield));
        assert!(actor.wakeup_locked(&mut sync, WaitStatus::RECEIVING, Wakeup::BySend));
        // First wakeup wins
        assert!(!actor.wakeup_locked(&mut sync, WaitStatus::RECEIVING, Wakeup::ByClose));

        let parked = actor.park(&mut sync);
        assert_eq!(parked.reason, Wakeup::BySend);
        assert!(sync.wait.status.is_none());
    }

    #[test]
    fn test_park_with_pending_cancel_returns_interrupt() {
        let actor = detached(1, None);
        actor.interrupt();
        let mut sync = actor.sync.lock();
        actor.begin_wait(&mut sync, WaitStatus::RECEIVING);
        let parked = actor.park(&mut sync);
        drop(sync);

        assert_eq!(parked.reason, Wakeup::ByInterrupt);
        assert!(actor.take_cancel());
        assert!(!actor.take_cancel());
    }

    #[test]
    fn test_check_interrupts_consumes_cancel() {
        let actor = detached(1, None);
        assert!(actor.check_interrupts().is_ok());
        actor.interrupt();
        assert!(matches!(
            actor.check_interrupts(),
            Err(ActorError::Interrupted)
        ));
        assert!(actor.check_interrupts().is_ok());
    }

    #[test]
    fn test_local_get_or_insert_runs_init_once() {
        let actor = detached(1, None);
        let calls = std::sync::atomic::AtomicUsize::new(0);

        std::thread::scope(|scope| {
            for _ in 0..8 {
                scope.spawn(|| {
                    let v = actor.local_get_or_insert_with("conn", || {
                        calls.fetch_add(1, Ordering::SeqCst);
                        Value::Int(42)
                    });
                    assert_eq!(v, Value::Int(42));
                });
            }
        });

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(actor.local_get_or_insert_with("conn", || Value::Nil), Value::Int(42));
    }

    #[test]
    fn test_locals() {
        let actor = detached(1, None);
        assert!(actor.local_get("k").is_none());
        assert!(actor.local_set("k", Value::Int(1)).is_none());
        assert_eq!(actor.local_set("k", Value::Int(2)), Some(Value::Int(1)));
        assert_eq!(actor.local_get("k"), Some(Value::Int(2)));
        assert_eq!(actor.local_remove("k"), Some(Value::Int(2)));
    }
}
