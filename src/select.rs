//! Select engine
//!
//! One operation waiting on several heterogeneous conditions at once:
//! receiving from the own mailbox, taking from any number of other actors,
//! and offering one yielded value.
//!
//! ```text
//!  ┌─► try each action in list order, then the yield ──ready──► return
//!  │        │ nothing ready
//!  │        ▼
//!  │   claim wait slot (status = union of action kinds)
//!  │   register as taker of every Take target
//!  │   re-check receive / yield; retry instead of sleeping if ready
//!  │        ▼
//!  │      park ──► unregister from every target
//!  │        │
//!  │        ├─ ByYield     → the taken value
//!  │        ├─ ByTake      → the yield was consumed
//!  │        ├─ ByInterrupt → Interrupted if a cancellation is pending
//!  └────────┴─ otherwise   → loop (closed ports surface on the retry)
//! ```

use crate::actor::{ActorId, ActorRef};
use crate::basket::Basket;
use crate::error::{ActorError, Port, Result};
use crate::fatal;
use crate::mailbox;
use crate::value::Value;
use crate::wait::{WaitStatus, Wakeup};
use crate::waiting;

/// One thing a select may wait for
#[derive(Debug, Clone)]
pub enum Action {
    /// Take the next value yielded by this actor
    Take(ActorRef),
    /// Receive from the calling actor's own mailbox
    Receive,
}

/// Which action fired
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Source {
    Receive,
    Take(ActorRef),
    Yield,
}

/// A value offered to takers while selecting
#[derive(Debug, Clone)]
pub struct Offer {
    pub value: Value,
    pub wants_move: bool,
}

impl Offer {
    pub fn copy(value: Value) -> Self {
        Offer {
            value,
            wants_move: false,
        }
    }

    pub fn moving(value: Value) -> Self {
        Offer {
            value,
            wants_move: true,
        }
    }
}

fn validate(cr: &ActorRef, actions: &[Action], has_yield: bool) {
    if actions.is_empty() && !has_yield {
        fatal!("select on actor {} with no action and no yield", cr.id());
    }
    let mut seen: Vec<&ActorId> = Vec::with_capacity(actions.len());
    let mut receives = 0;
    for action in actions {
        match action {
            Action::Receive => receives += 1,
            Action::Take(target) => {
                if target.id() == cr.id() {
                    fatal!("actor {} can not take from itself", cr.id());
                }
                if seen.contains(&target.id()) {
                    fatal!("select on actor {} lists {} twice", cr.id(), target.id());
                }
                seen.push(target.id());
            }
        }
    }
    if receives > 1 {
        fatal!("select on actor {} lists receive {} times", cr.id(), receives);
    }
}

/// Wait for whichever action becomes ready first.
///
/// The offer's basket is built once, up front; a move offer poisons the
/// caller's value even if another action ends up firing.
pub(crate) fn select(
    cr: &ActorRef,
    actions: &[Action],
    offer: Option<Offer>,
) -> Result<(Source, Value)> {
    let mut basket = match offer {
        Some(offer) => Some(Basket::new(
            cr.model(),
            Some(cr.id().clone()),
            offer.value,
            offer.wants_move,
            false,
        )?),
        None => None,
    };
    select_basket(cr, actions, &mut basket)
}

/// Select with a prepared yield basket. On success through the yield the
/// slot is emptied; on any other outcome the basket is left in place.
pub(crate) fn select_basket(
    cr: &ActorRef,
    actions: &[Action],
    basket: &mut Option<Basket>,
) -> Result<(Source, Value)> {
    validate(cr, actions, basket.is_some());

    let receive = actions.iter().any(|a| matches!(a, Action::Receive));
    let targets: Vec<&ActorRef> = actions
        .iter()
        .filter_map(|a| match a {
            Action::Take(target) => Some(target),
            Action::Receive => None,
        })
        .collect();

    let mut status = WaitStatus::NONE;
    if receive {
        status |= WaitStatus::RECEIVING;
    }
    if !targets.is_empty() {
        status |= WaitStatus::TAKING;
    }
    if basket.is_some() {
        status |= WaitStatus::YIELDING;
    }

    loop {
        cr.check_interrupts()?;

        for action in actions {
            match action {
                Action::Receive => {
                    if let Some(value) = mailbox::try_receive(cr)? {
                        return Ok((Source::Receive, value));
                    }
                }
                Action::Take(target) => {
                    if let Some(value) = waiting::try_take(target)? {
                        return Ok((Source::Take(target.clone()), value));
                    }
                }
            }
        }
        if basket.is_some() && waiting::try_yield(cr, basket)? {
            return Ok((Source::Yield, Value::Nil));
        }

        let round = {
            let mut sync = cr.sync.lock();
            cr.wait_slot(&mut sync);
            let round = cr.begin_wait(&mut sync, status);
            sync.wait.yielded = basket.take();
            round
        };

        let mut retry = false;
        for target in &targets {
            if !waiting::register_taking(target, cr, round) {
                retry = true;
            }
        }

        let parked = {
            let mut sync = cr.sync.lock();
            let ready = retry
                || (receive && (sync.mailbox.has_ready() || sync.mailbox.incoming_closed))
                || (sync.wait.yielded.is_some()
                    && (!sync.takers.is_empty() || sync.mailbox.outgoing_closed));
            if ready && sync.wait.wakeup == Wakeup::None {
                sync.wait.wakeup = Wakeup::ByRetry;
            }
            cr.park(&mut sync)
        };

        for target in &targets {
            waiting::unregister_taking(target, cr);
        }
        *basket = parked.yielded;

        match parked.reason {
            Wakeup::ByYield => {
                let Some(delivery) = parked.taken else {
                    fatal!("actor {} woken by yield without a delivery", cr.id());
                };
                let mut taken = delivery.basket;
                let value = taken.accept()?;
                return Ok((Source::Take(delivery.from), value));
            }
            Wakeup::ByTake => return Ok((Source::Yield, Value::Nil)),
            Wakeup::ByInterrupt if cr.take_cancel() => {
                tracing::debug!(actor = %cr.id(), "select interrupted");
                return Err(ActorError::Interrupted);
            }
            reason => {
                tracing::trace!(actor = %cr.id(), reason = %reason, "select retry");
            }
        }
    }
}

/// A reusable set of take targets
///
/// Targets whose outgoing port closes are dropped from the set
/// automatically while waiting.
pub struct Selector {
    cr: ActorRef,
    targets: Vec<ActorRef>,
}

impl Selector {
    pub(crate) fn new(cr: ActorRef) -> Self {
        Selector {
            cr,
            targets: Vec::new(),
        }
    }

    /// Watch `target`. Fails if it is already watched.
    pub fn add(&mut self, target: ActorRef) -> Result<()> {
        if self.targets.contains(&target) {
            return Err(ActorError::AlreadyAdded(target.id().clone()));
        }
        self.targets.push(target);
        Ok(())
    }

    /// Stop watching `target`. Fails if it is not watched.
    pub fn remove(&mut self, target: &ActorRef) -> Result<()> {
        let Some(index) = self.targets.iter().position(|t| t == target) else {
            return Err(ActorError::NotAdded(target.id().clone()));
        };
        self.targets.remove(index);
        Ok(())
    }

    pub fn clear(&mut self) {
        self.targets.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn targets(&self) -> &[ActorRef] {
        &self.targets
    }

    /// Take from any watched actor, optionally also receiving and offering a value.
    pub fn wait(&mut self, receive: bool, offer: Option<Offer>) -> Result<(Source, Value)> {
        let mut basket = match offer {
            Some(offer) => Some(Basket::new(
                self.cr.model(),
                Some(self.cr.id().clone()),
                offer.value,
                offer.wants_move,
                false,
            )?),
            None => None,
        };

        loop {
            let mut actions: Vec<Action> = self.targets.iter().cloned().map(Action::Take).collect();
            if receive {
                actions.push(Action::Receive);
            }

            match select_basket(&self.cr, &actions, &mut basket) {
                Err(ActorError::Closed {
                    port: Port::Outgoing,
                    actor,
                }) if self.targets.iter().any(|t| *t.id() == actor) => {
                    self.targets.retain(|t| *t.id() != actor);
                    tracing::debug!(actor = %self.cr.id(), closed = %actor, "selector dropped closed target");
                    if self.targets.is_empty() && !receive && basket.is_none() {
                        return Err(ActorError::Closed {
                            port: Port::Outgoing,
                            actor,
                        });
                    }
                }
                other => return other,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actor::Actor;
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

    #[test]
    fn test_ready_receive_returns_immediately() {
        let cr = detached(1);
        cr.send(Value::Int(1)).unwrap();
        let (source, value) = select(&cr, &[Action::Receive], None).unwrap();
        assert_eq!(source, Source::Receive);
        assert_eq!(value, Value::Int(1));
    }

    #[test]
    fn test_list_order_breaks_ties() {
        let cr = detached(1);
        let other = detached(2);
        cr.send(Value::Int(1)).unwrap();
        let will = Basket::will(&DefaultObjectModel, other.id().clone(), Value::Int(2), false).unwrap();
        waiting::yield_at_exit(&other, will);

        let (source, value) =
            select(&cr, &[Action::Take(other.clone()), Action::Receive], None).unwrap();
        assert_eq!(source, Source::Take(other));
        assert_eq!(value, Value::Int(2));
    }

    #[test]
    fn test_closed_target_surfaces() {
        let cr = detached(1);
        let other = detached(2);
        other.close_outgoing();
        let err = select(&cr, &[Action::Take(other)], None).unwrap_err();
        assert!(matches!(err, ActorError::Closed { port: Port::Outgoing, .. }));
    }

    #[test]
    fn test_pending_interrupt_cancels_select() {
        let cr = detached(1);
        cr.interrupt();
        let err = select(&cr, &[Action::Receive], None).unwrap_err();
        assert!(matches!(err, ActorError::Interrupted));
    }

    #[test]
    #[should_panic(expected = "no action and no yield")]
    fn test_empty_select_is_fatal() {
        let cr = detached(1);
        let _ = select(&cr, &[], None);
    }

    #[test]
    #[should_panic(expected = "can not take from itself")]
    fn test_take_from_self_is_fatal() {
        let cr = detached(1);
        let _ = select(&cr, &[Action::Take(cr.clone())], None);
    }

    #[test]
    #[should_panic(expected = "twice")]
    fn test_duplicate_target_is_fatal() {
        let cr = detached(1);
        let other = detached(2);
        let _ = select(
            &cr,
            &[Action::Take(other.clone()), Action::Take(other)],
            None,
        );
    }

    #[test]
    fn test_selector_membership() {
        let cr = detached(1);
        let a = detached(2);
        let mut selector = Selector::new(cr);
        assert!(selector.is_empty());

        selector.add(a.clone()).unwrap();
        assert!(matches!(selector.add(a.clone()), Err(ActorError::AlreadyAdded(_))));
        assert_eq!(selector.len(), 1);

        selector.remove(&a).unwrap();
        assert!(matches!(selector.remove(&a), Err(ActorError::NotAdded(_))));

        selector.add(a).unwrap();
        selector.clear();
        assert!(selector.is_empty());
    }

    #[test]
    fn test_selector_drops_closed_targets() {
        let cr = detached(1);
        let closed = detached(2);
        let live = detached(3);
        closed.close_outgoing();
        let will = Basket::will(&DefaultObjectModel, live.id().clone(), Value::Int(8), false).unwrap();
        waiting::yield_at_exit(&live, will);

        let mut selector = Selector::new(cr);
        selector.add(closed).unwrap();
        selector.add(live.clone()).unwrap();

        let (source, value) = selector.wait(false, None).unwrap();
        assert_eq!(source, Source::Take(live));
        assert_eq!(value, Value::Int(8));
        assert_eq!(selector.len(), 1);
    }

    #[test]
    fn test_selector_all_closed_fails() {
        let cr = detached(1);
        let closed = detached(2);
        closed.close_outgoing();

        let mut selector = Selector::new(cr);
        selector.add(closed).unwrap();
        assert!(selector.wait(false, None).unwrap_err().is_closed());
        assert!(selector.is_empty());
    }
}
