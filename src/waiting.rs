//! Rendezvous: yield / take
//!
//! A yield hands one basket straight to one taker, bypassing the mailbox.
//! Takers that arrive first park and register in the yielder's
//! [`WaitingList`]; a yielder that arrives first parks with its basket in
//! its wait slot, where a taker can pick it up.
//!
//! ```text
//!   taker C1 ─┐                         ┌─ try_yield pops C1, hands basket,
//!   taker C2 ─┼─► P.takers [C1, C2, C3] │  wakes C1 with ByYield
//!   taker C3 ─┘                         └─ C2, C3 stay parked
//! ```
//!
//! No function here holds two actor locks at once. A taker is popped
//! under the yielder's lock and then inspected under its own lock; if it
//! stopped waiting in between, the next taker is tried.

use crate::actor::{closed, Actor, ActorId, ActorRef};
use crate::basket::Basket;
use crate::error::{Port, Result};
use crate::fatal;
use crate::value::Value;
use crate::wait::{Delivery, WaitStatus, Wakeup};
use std::collections::VecDeque;

/// An actor parked on `take`, tagged with the wait round it registered in
#[derive(Debug)]
pub(crate) struct Taker {
    pub actor: ActorRef,
    pub round: u64,
}

/// FIFO registry of actors waiting to take from the owning actor
#[derive(Debug, Default)]
pub(crate) struct WaitingList {
    takers: VecDeque<Taker>,
}

impl WaitingList {
    pub fn push(&mut self, taker: Taker) {
        if self.contains(taker.actor.id()) {
            fatal!("actor {} registered twice as taker", taker.actor.id());
        }
        self.takers.push_back(taker);
    }

    pub fn pop_front(&mut self) -> Option<Taker> {
        self.takers.pop_front()
    }

    pub fn remove(&mut self, actor: &Actor) -> bool {
        let before = self.takers.len();
        self.takers.retain(|t| t.actor.id() != actor.id());
        self.takers.len() != before
    }

    pub fn contains(&self, id: &ActorId) -> bool {
        self.takers.iter().any(|t| t.actor.id() == id)
    }

    pub fn drain(&mut self) -> Vec<Taker> {
        self.takers.drain(..).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.takers.is_empty()
    }

    pub fn len(&self) -> usize {
        self.takers.len()
    }
}

/// Hand `basket` to the first eligible taker of `cr`.
///
/// Returns `Ok(true)` once delivered (the slot is emptied), `Ok(false)`
/// if nobody is waiting (the basket stays in the slot).
pub(crate) fn try_yield(cr: &ActorRef, slot: &mut Option<Basket>) -> Result<bool> {
    if cr.sync.lock().mailbox.outgoing_closed {
        return Err(closed(cr, Port::Outgoing));
    }
    loop {
        let Some(taker) = cr.sync.lock().takers.pop_front() else {
            return Ok(false);
        };
        let mut ts = taker.actor.sync.lock();
        if ts.wait.sleeping_by(WaitStatus::TAKING) && ts.wait.round == taker.round {
            let Some(basket) = slot.take() else {
                fatal!("actor {} yielded an empty slot", cr.id());
            };
            ts.wait.taken = Some(Delivery {
                basket,
                from: cr.clone(),
            });
            taker
                .actor
                .wakeup_locked(&mut ts, WaitStatus::TAKING, Wakeup::ByYield);
            tracing::trace!(from = %cr.id(), to = %taker.actor.id(), "yield handed off");
            return Ok(true);
        }
        tracing::trace!(from = %cr.id(), to = %taker.actor.id(), "stale taker skipped");
    }
}

/// Take without waiting: the at-exit offer first, then a parked yielder's basket.
pub(crate) fn try_take(target: &Actor) -> Result<Option<Value>> {
    let basket = {
        let mut ts = target.sync.lock();
        if let Some(basket) = ts.at_exit.take() {
            tracing::trace!(from = %target.id(), "took at-exit value");
            Some(basket)
        } else if ts.wait.sleeping_by(WaitStatus::YIELDING) && ts.wait.yielded.is_some() {
            let basket = ts.wait.yielded.take();
            target.wakeup_locked(&mut ts, WaitStatus::YIELDING, Wakeup::ByTake);
            basket
        } else if ts.mailbox.outgoing_closed {
            return Err(closed(target, Port::Outgoing));
        } else {
            None
        }
    };
    match basket {
        Some(mut basket) => basket.accept().map(Some),
        None => Ok(None),
    }
}

/// Register `cr` as a taker of `target`.
///
/// Returns `false` instead of registering when a take could succeed (or
/// fail) right now, so the caller retries rather than sleeping through it.
pub(crate) fn register_taking(target: &Actor, cr: &ActorRef, round: u64) -> bool {
    let mut ts = target.sync.lock();
    if ts.mailbox.outgoing_closed
        || ts.at_exit.is_some()
        || ts.wait.sleeping_by(WaitStatus::YIELDING)
    {
        return false;
    }
    ts.takers.push(Taker {
        actor: cr.clone(),
        round,
    });
    true
}

pub(crate) fn unregister_taking(target: &Actor, cr: &Actor) {
    target.sync.lock().takers.remove(cr);
}

/// Close the outgoing port. Returns the previous state; never fails.
///
/// Every registered taker and a parked yielder of `actor` wake with `ByClose`.
pub(crate) fn close_outgoing(actor: &Actor) -> bool {
    let (prev, takers) = {
        let mut sync = actor.sync.lock();
        let prev = sync.mailbox.outgoing_closed;
        if !prev {
            sync.mailbox.outgoing_closed = true;
            actor.wakeup_locked(&mut sync, WaitStatus::YIELDING, Wakeup::ByClose);
            tracing::debug!(actor = %actor.id(), takers = sync.takers.len(), "outgoing port closed");
        }
        (prev, sync.takers.drain())
    };
    for taker in takers {
        let mut ts = taker.actor.sync.lock();
        if ts.wait.round == taker.round {
            taker
                .actor
                .wakeup_locked(&mut ts, WaitStatus::TAKING, Wakeup::ByClose);
        }
    }
    prev
}

/// Publish the final value of a terminating actor.
///
/// Goes to a waiting taker if there is one, otherwise stays behind as a
/// standing offer for exactly one later take. Dropped if the outgoing
/// port is already closed.
pub(crate) fn yield_at_exit(cr: &ActorRef, basket: Basket) {
    let mut slot = Some(basket);
    loop {
        match try_yield(cr, &mut slot) {
            Ok(true) | Err(_) => return,
            Ok(false) => {}
        }
        let mut sync = cr.sync.lock();
        if sync.mailbox.outgoing_closed {
            return;
        }
        if sync.takers.is_empty() {
            tracing::debug!(actor = %cr.id(), "leaving at-exit value");
            sync.at_exit = slot.take();
            return;
        }
        // A taker registered after try_yield looked; hand it over directly
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ActorError;
    use crate::serialize::DefaultObjectModel;
    use std::sync::{Arc, Weak};

    fn detached(number: u64) -> ActorRef {
        ActorRef::new(Actor::new(
            number,
            None,
            Arc::new(DefaultObjectModel),
            Weak::new(),
        ))
    }

    fn basket(v: i64) -> Basket {
        Basket::new(&DefaultObjectModel, None, Value::Int(v), false, false).unwrap()
    }

    fn park_taking(taker: &ActorRef) -> u64 {
        let mut sync = taker.sync.lock();
        taker.begin_wait(&mut sync, WaitStatus::TAKING)
    }

    #[test]
    fn test_yield_without_takers_keeps_basket() {
        let p = detached(1);
        let mut slot = Some(basket(1));
        assert!(!try_yield(&p, &mut slot).unwrap());
        assert!(slot.is_some());
    }

    #[test]
    fn test_yield_goes_to_first_eligible_taker() {
        let p = detached(1);
        let c1 = detached(2);
        let c2 = detached(3);
        let r1 = park_taking(&c1);
        let r2 = park_taking(&c2);
        assert!(register_taking(&p, &c1, r1));
        assert!(register_taking(&p, &c2, r2));

        // c1 was woken by something else in the meantime
        c1.wakeup();

        let mut slot = Some(basket(42));
        assert!(try_yield(&p, &mut slot).unwrap());
        assert!(slot.is_none());

        let mut sync = c2.sync.lock();
        let parked = c2.park(&mut sync);
        assert_eq!(parked.reason, Wakeup::ByYield);
        let mut delivery = parked.taken.unwrap();
        assert!(delivery.from.ptr_eq(&p));
        assert_eq!(delivery.basket.accept().unwrap(), Value::Int(42));
        assert_eq!(p.taker_count(), 0);
    }

    #[test]
    fn test_register_refused_when_yielder_parked() {
        let p = detached(1);
        let c = detached(2);
        {
            let mut sync = p.sync.lock();
            p.begin_wait(&mut sync, WaitStatus::YIELDING);
            sync.wait.yielded = Some(basket(5));
        }
        assert!(!register_taking(&p, &c, 1));
        assert_eq!(try_take(&p).unwrap(), Some(Value::Int(5)));

        let mut sync = p.sync.lock();
        assert_eq!(p.park(&mut sync).reason, Wakeup::ByTake);
    }

    #[test]
    #[should_panic(expected = "registered twice")]
    fn test_double_registration_is_fatal() {
        let p = detached(1);
        let c = detached(2);
        assert!(register_taking(&p, &c, 1));
        register_taking(&p, &c, 1);
    }

    #[test]
    fn test_close_outgoing_wakes_takers() {
        let p = detached(1);
        let c = detached(2);
        let round = park_taking(&c);
        assert!(register_taking(&p, &c, round));

        assert!(!close_outgoing(&p));
        assert!(close_outgoing(&p));
        assert_eq!(p.taker_count(), 0);

        let mut sync = c.sync.lock();
        assert_eq!(c.park(&mut sync).reason, Wakeup::ByClose);
        drop(sync);
        assert!(matches!(
            try_take(&p),
            Err(ActorError::Closed { port: Port::Outgoing, .. })
        ));
        let mut slot = Some(basket(1));
        assert!(try_yield(&p, &mut slot).unwrap_err().is_closed());
    }

    #[test]
    fn test_at_exit_offer_is_taken_once() {
        let p = detached(1);
        let will = Basket::will(&DefaultObjectModel, p.id().clone(), Value::Int(9), false).unwrap();
        yield_at_exit(&p, will);
        close_outgoing(&p);

        assert!(!register_taking(&p, &detached(2), 1));
        assert_eq!(try_take(&p).unwrap(), Some(Value::Int(9)));
        assert!(try_take(&p).unwrap_err().is_closed());
    }

    #[test]
    fn test_at_exit_goes_to_waiting_taker() {
        let p = detached(1);
        let c = detached(2);
        let round = park_taking(&c);
        assert!(register_taking(&p, &c, round));

        let will = Basket::will(&DefaultObjectModel, p.id().clone(), Value::Int(3), false).unwrap();

        yield_at_exit(&p, will);
        assert!(p.sync.lock().at_exit.is_none());

        let mut sync = c.sync.lock();
        let parked = c.park(&mut sync);
        assert_eq!(parked.reason, Wakeup::ByYield);
        assert_eq!(parked.taken.unwrap().basket.accept().unwrap(), Value::Int(3));
    }
}
