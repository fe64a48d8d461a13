//! Mailbox: the incoming queue of an actor
//!
//! ```text
//!   sender ── send ──► [ b1 | b2 | b3 | ... ] ── recv ──► owner
//!                        ▲                      │
//!                 incoming port           recv_if reserves one
//!                 (closable)              entry at a time
//! ```
//!
//! Delivery is strictly FIFO. `send` never blocks. `recv` parks the
//! owner's thread (counted as blocked) while the queue is empty and the
//! incoming port is open. Queued messages are still delivered after the
//! port closes; only an empty, closed mailbox fails with `Closed`.

use crate::actor::{closed, Actor};
use crate::basket::Basket;
use crate::error::{ActorError, Port, Result};
use crate::value::Value;
use crate::wait::{WaitStatus, Wakeup};
use std::cell::Cell;
use std::collections::VecDeque;

thread_local! {
    /// Set while a recv_if predicate runs on this thread
    static IN_PREDICATE: Cell<bool> = const { Cell::new(false) };
}

#[derive(Debug)]
struct Entry {
    seq: u64,
    basket: Basket,
    reserved: bool,
}

/// Per-actor incoming queue plus the two port flags
#[derive(Debug, Default)]
pub(crate) struct Mailbox {
    // VecDeque keeps its capacity as entries are removed
    queue: VecDeque<Entry>,
    next_seq: u64,
    pub incoming_closed: bool,
    pub outgoing_closed: bool,
}

impl Mailbox {
    pub fn enqueue(&mut self, basket: Basket) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.queue.push_back(Entry {
            seq,
            basket,
            reserved: false,
        });
    }

    /// Pop the oldest entry not reserved by a recv_if scan
    pub fn dequeue(&mut self) -> Option<Basket> {
        let index = self.queue.iter().position(|e| !e.reserved)?;
        self.queue.remove(index).map(|e| e.basket)
    }

    /// True if `dequeue` would return something
    pub fn has_ready(&self) -> bool {
        self.queue.iter().any(|e| !e.reserved)
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    /// Reserve the oldest unreserved entry with `seq >= from`
    pub fn reserve_from(&mut self, from: u64) -> Option<(u64, Value)> {
        let entry = self
            .queue
            .iter_mut()
            .find(|e| e.seq >= from && !e.reserved)?;
        entry.reserved = true;
        Some((entry.seq, entry.basket.peek().clone()))
    }

    /// Give a reserved entry back to the queue
    pub fn release(&mut self, seq: u64) {
        if let Some(entry) = self.queue.iter_mut().find(|e| e.seq == seq) {
            entry.reserved = false;
        }
    }

    /// Remove a reserved entry
    pub fn remove(&mut self, seq: u64) -> Option<Basket> {
        let index = self.queue.iter().position(|e| e.seq == seq)?;
        self.queue.remove(index).map(|e| e.basket)
    }
}

/// Enqueue a basket on `target`. Never blocks.
pub(crate) fn send(target: &Actor, basket: Basket) -> Result<()> {
    let mut sync = target.sync.lock();
    if sync.mailbox.incoming_closed {
        return Err(closed(target, Port::Incoming));
    }
    sync.mailbox.enqueue(basket);
    tracing::trace!(actor = %target.id(), queued = sync.mailbox.len(), "send");
    target.wakeup_locked(&mut sync, WaitStatus::RECEIVING, Wakeup::BySend);
    Ok(())
}

/// Non-blocking receive
pub(crate) fn try_receive(cr: &Actor) -> Result<Option<Value>> {
    if IN_PREDICATE.get() {
        return Err(ActorError::RecursiveReceive);
    }
    let basket = {
        let mut sync = cr.sync.lock();
        match sync.mailbox.dequeue() {
            Some(basket) => basket,
            None if sync.mailbox.incoming_closed => return Err(closed(cr, Port::Incoming)),
            None => return Ok(None),
        }
    };
    let mut basket = basket;
    basket.accept().map(Some)
}

/// Blocking receive
pub(crate) fn receive(cr: &Actor) -> Result<Value> {
    loop {
        cr.check_interrupts()?;
        if let Some(value) = try_receive(cr)? {
            return Ok(value);
        }

        let mut sync = cr.sync.lock();
        cr.wait_slot(&mut sync);
        if sync.mailbox.has_ready() {
            continue;
        }
        if sync.mailbox.incoming_closed {
            return Err(closed(cr, Port::Incoming));
        }
        cr.begin_wait(&mut sync, WaitStatus::RECEIVING);
        let parked = cr.park(&mut sync);
        drop(sync);

        if parked.reason == Wakeup::ByInterrupt && cr.take_cancel() {
            return Err(ActorError::Interrupted);
        }
    }
}

/// Entry reserved for a running recv_if predicate.
///
/// Dropping it without settling (the predicate panicked) hands the entry
/// back to the queue.
struct Reservation<'a> {
    actor: &'a Actor,
    seq: u64,
    settled: bool,
}

impl<'a> Reservation<'a> {
    fn new(actor: &'a Actor, seq: u64) -> Self {
        IN_PREDICATE.set(true);
        Reservation {
            actor,
            seq,
            settled: false,
        }
    }

    fn settle(mut self, matched: bool) -> Option<Basket> {
        self.settled = true;
        IN_PREDICATE.set(false);
        let mut sync = self.actor.sync.lock();
        if matched {
            sync.mailbox.remove(self.seq)
        } else {
            sync.mailbox.release(self.seq);
            self.actor
                .wakeup_locked(&mut sync, WaitStatus::RECEIVING, Wakeup::BySend);
            None
        }
    }
}

impl Drop for Reservation<'_> {
    fn drop(&mut self) {
        if self.settled {
            return;
        }
        IN_PREDICATE.set(false);
        let mut sync = self.actor.sync.lock();
        sync.mailbox.release(self.seq);
        self.actor
            .wakeup_locked(&mut sync, WaitStatus::RECEIVING, Wakeup::BySend);
    }
}

/// Selective receive: the first message (in FIFO order) accepted by `pred`.
///
/// The predicate runs without the actor lock held. Rejected messages stay
/// queued in their original order.
pub(crate) fn receive_if(cr: &Actor, mut pred: impl FnMut(&Value) -> bool) -> Result<Value> {
    let mut cursor = 0;
    loop {
        cr.check_interrupts()?;
        if IN_PREDICATE.get() {
            return Err(ActorError::RecursiveReceive);
        }

        let mut sync = cr.sync.lock();
        cr.wait_slot(&mut sync);
        if let Some((seq, value)) = sync.mailbox.reserve_from(cursor) {
            drop(sync);
            let reservation = Reservation::new(cr, seq);
            let matched = pred(&value);
            match reservation.settle(matched) {
                Some(mut basket) => return basket.accept(),
                None => {
                    cursor = seq + 1;
                    continue;
                }
            }
        }

        if sync.mailbox.incoming_closed {
            return Err(closed(cr, Port::Incoming));
        }
        cr.begin_wait(&mut sync, WaitStatus::RECEIVING);
        let parked = cr.park(&mut sync);
        drop(sync);

        if parked.reason == Wakeup::ByInterrupt && cr.take_cancel() {
            return Err(ActorError::Interrupted);
        }
    }
}

/// Close the incoming port. Returns the previous state; never fails.
pub(crate) fn close_incoming(actor: &Actor) -> bool {
    let mut sync = actor.sync.lock();
    let prev = sync.mailbox.incoming_closed;
    if !prev {
        sync.mailbox.incoming_closed = true;
        actor.wakeup_locked(&mut sync, WaitStatus::RECEIVING, Wakeup::ByClose);
        tracing::debug!(actor = %actor.id(), "incoming port closed");
    }
    prev
}
