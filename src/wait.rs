//! Wait state of a parked actor thread
//!
//! A thread that cannot make progress publishes *what* it waits for as a
//! [`WaitStatus`] bitmask, then sleeps on its actor's condition variable.
//! Whoever satisfies the wait records *why* in [`Wakeup`]. Both fields are
//! only touched under the actor lock, and a wakeup is only ever recorded
//! while the reason is still `None`, so exactly one event wins.

use crate::actor::ActorRef;
use crate::basket::Basket;
use std::fmt;
use std::ops::{BitOr, BitOrAssign};

/// Bitmask of conditions a thread is parked on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WaitStatus(u8);

impl WaitStatus {
    pub const NONE: WaitStatus = WaitStatus(0);
    pub const RECEIVING: WaitStatus = WaitStatus(0x01);
    pub const TAKING: WaitStatus = WaitStatus(0x02);
    pub const YIELDING: WaitStatus = WaitStatus(0x04);
    pub const ANY: WaitStatus = WaitStatus(0x07);

    pub fn is_none(self) -> bool {
        self.0 == 0
    }

    pub fn intersects(self, mask: WaitStatus) -> bool {
        self.0 & mask.0 != 0
    }
}

impl BitOr for WaitStatus {
    type Output = WaitStatus;

    fn bitor(self, rhs: WaitStatus) -> WaitStatus {
        WaitStatus(self.0 | rhs.0)
    }
}

impl BitOrAssign for WaitStatus {
    fn bitor_assign(&mut self, rhs: WaitStatus) {
        self.0 |= rhs.0;
    }
}

impl fmt::Display for WaitStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_none() {
            return write!(f, "none");
        }
        let mut parts = Vec::new();
        if self.intersects(WaitStatus::RECEIVING) {
            parts.push("receiving");
        }
        if self.intersects(WaitStatus::TAKING) {
            parts.push("taking");
        }
        if self.intersects(WaitStatus::YIELDING) {
            parts.push("yielding");
        }
        write!(f, "{}", parts.join("|"))
    }
}

/// Why a parked thread was woken
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Wakeup {
    #[default]
    None,
    BySend,
    ByYield,
    ByTake,
    ByClose,
    ByInterrupt,
    ByRetry,
}

impl fmt::Display for Wakeup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Wakeup::None => "none",
            Wakeup::BySend => "by_send",
            Wakeup::ByYield => "by_yield",
            Wakeup::ByTake => "by_take",
            Wakeup::ByClose => "by_close",
            Wakeup::ByInterrupt => "by_interrupt",
            Wakeup::ByRetry => "by_retry",
        };
        write!(f, "{}", name)
    }
}

/// A basket handed directly to a parked taker
#[derive(Debug)]
pub(crate) struct Delivery {
    pub basket: Basket,
    pub from: ActorRef,
}

/// Per-actor wait slot. At most one thread of an actor owns it at a time.
#[derive(Debug, Default)]
pub(crate) struct WaitState {
    pub status: WaitStatus,
    pub wakeup: Wakeup,
    /// Bumped on every new wait so stale taker registrations can be told apart
    pub round: u64,
    pub taken: Option<Delivery>,
    pub yielded: Option<Basket>,
}

impl WaitState {
    /// True if a thread is parked on any of `mask` and nobody has claimed the wakeup yet
    pub fn sleeping_by(&self, mask: WaitStatus) -> bool {
        self.status.intersects(mask) && self.wakeup == Wakeup::None
    }
}

/// What a parked thread found when it woke up
#[derive(Debug)]
pub(crate) struct Parked {
    pub reason: Wakeup,
    pub taken: Option<Delivery>,
    pub yielded: Option<Basket>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_union() {
        let status = WaitStatus::RECEIVING | WaitStatus::TAKING;
        assert!(status.intersects(WaitStatus::RECEIVING));
        assert!(status.intersects(WaitStatus::TAKING));
        assert!(!status.intersects(WaitStatus::YIELDING));
        assert_eq!(status.to_string(), "receiving|taking");
        assert_eq!(WaitStatus::NONE.to_string(), "none");
    }

    #[test]
    fn test_sleeping_by_requires_unclaimed_wakeup() {
        let mut state = WaitState {
            status: WaitStatus::TAKING,
            ..WaitState::default()
        };
        assert!(state.sleeping_by(WaitStatus::TAKING));
        assert!(!state.sleeping_by(WaitStatus::RECEIVING));

        state.wakeup = Wakeup::ByClose;
        assert!(!state.sleeping_by(WaitStatus::TAKING));
    }
}
