//! Reentrancy protection for capture, restore and navigation.
//!
//! A [`LockTable`] hands out at most one [`LockToken`] per lane; the token
//! releases its lane on drop, and a lane held longer than the timeout is
//! considered abandoned and may be taken over. A [`Cooldown`] rejects
//! triggers arriving inside a minimum interval after the previous one.

use super::clock::Clock;
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::hash::Hash;
use std::rc::Rc;

pub struct LockTable<K: Eq + Hash + Clone> {
    held: Rc<RefCell<HashMap<K, i64>>>,
    timeout_ms: i64,
    clock: Rc<dyn Clock>,
}

impl<K: Eq + Hash + Clone + std::fmt::Debug> LockTable<K> {
    pub fn new(timeout_ms: i64, clock: Rc<dyn Clock>) -> Self {
        Self {
            held: Rc::new(RefCell::new(HashMap::new())),
            timeout_ms,
            clock,
        }
    }

    /// Takes the lane, or returns `None` while another holder is active.
    pub fn try_acquire(&self, lane: K) -> Option<LockToken<K>> {
        let now = self.clock.now_ms();
        let mut held = self.held.borrow_mut();
        if let Some(since) = held.get(&lane) {
            let age = now - since;
            if age < self.timeout_ms {
                return None;
            }
            log::warn!("lock {:?} held for {} ms, releasing stale holder", lane, age);
        }
        held.insert(lane.clone(), now);
        Some(LockToken {
            held: Rc::clone(&self.held),
            lane,
            acquired_at: now,
        })
    }

    pub fn is_held(&self, lane: &K) -> bool {
        let now = self.clock.now_ms();
        self.held
            .borrow()
            .get(lane)
            .is_some_and(|since| now - since < self.timeout_ms)
    }
}

/// Held lane; dropping it releases the lane.
pub struct LockToken<K: Eq + Hash + Clone> {
    held: Rc<RefCell<HashMap<K, i64>>>,
    lane: K,
    acquired_at: i64,
}

impl<K: Eq + Hash + Clone> Drop for LockToken<K> {
    fn drop(&mut self) {
        let mut held = self.held.borrow_mut();
        // A stale takeover owns the lane now; leave it alone.
        if held.get(&self.lane) == Some(&self.acquired_at) {
            held.remove(&self.lane);
        }
    }
}

/// Minimum interval between two accepted triggers.
pub struct Cooldown {
    window_ms: i64,
    last: Cell<Option<i64>>,
    clock: Rc<dyn Clock>,
}

impl Cooldown {
    pub fn new(window_ms: i64, clock: Rc<dyn Clock>) -> Self {
        Self {
            window_ms,
            last: Cell::new(None),
            clock,
        }
    }

    /// Accepts the trigger and starts a new window, or rejects it.
    pub fn try_pass(&self) -> bool {
        let now = self.clock.now_ms();
        match self.last.get() {
            Some(last) if now - last < self.window_ms => false,
            _ => {
                self.last.set(Some(now));
                true
            }
        }
    }

    /// Restarts the window from now (e.g. when a guarded operation ends).
    pub fn touch(&self) {
        self.last.set(Some(self.clock.now_ms()));
    }

    pub fn reset(&self) {
        self.last.set(None);
    }
}
