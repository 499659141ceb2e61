//! One-shot rendezvous between a completion and a blocked caller.

use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use hopline_wire::{Error, Result};

enum Slot<V> {
    Waiting,
    Ready(V),
    Taken,
}

/// Carries exactly one value from the thread that produces it to the thread
/// that waits for it.
///
/// A second [`resolve`](ResponseBridge::resolve) is rejected with
/// [`Error::AlreadyResolved`] and the first value is kept.
pub struct ResponseBridge<V> {
    slot: Mutex<Slot<V>>,
    resolved: Condvar,
}

impl<V> Default for ResponseBridge<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V> ResponseBridge<V> {
    pub fn new() -> Self {
        Self {
            slot: Mutex::new(Slot::Waiting),
            resolved: Condvar::new(),
        }
    }

    // A panicking resolver cannot leave the slot half-written, so a poisoned
    // lock still guards a consistent value.
    fn lock(&self) -> MutexGuard<'_, Slot<V>> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn resolve(&self, value: V) -> Result<()> {
        let mut slot = self.lock();
        if !matches!(*slot, Slot::Waiting) {
            return Err(Error::AlreadyResolved);
        }
        *slot = Slot::Ready(value);
        self.resolved.notify_all();
        Ok(())
    }

    /// Block until the value arrives and take it.
    ///
    /// Fails with [`Error::AlreadyResolved`] when another waiter took the
    /// value first.
    pub fn wait(&self) -> Result<V> {
        let guard = self.lock();
        let mut slot = self
            .resolved
            .wait_while(guard, |slot| matches!(slot, Slot::Waiting))
            .unwrap_or_else(PoisonError::into_inner);
        Self::take(&mut slot).ok_or(Error::AlreadyResolved)
    }

    /// Like [`wait`](ResponseBridge::wait) but gives up after `timeout`,
    /// returning `Ok(None)`.
    pub fn wait_timeout(&self, timeout: Duration) -> Result<Option<V>> {
        let guard = self.lock();
        let (mut slot, result) = self
            .resolved
            .wait_timeout_while(guard, timeout, |slot| matches!(slot, Slot::Waiting))
            .unwrap_or_else(PoisonError::into_inner);
        if result.timed_out() {
            return Ok(None);
        }
        Self::take(&mut slot).map(Some).ok_or(Error::AlreadyResolved)
    }

    /// Take the value if it has arrived.
    pub fn try_take(&self) -> Option<V> {
        let mut slot = self.lock();
        Self::take(&mut slot)
    }

    pub fn is_resolved(&self) -> bool {
        !matches!(*self.lock(), Slot::Waiting)
    }

    /// True once a waiter has taken the value.
    pub fn is_taken(&self) -> bool {
        matches!(*self.lock(), Slot::Taken)
    }

    fn take(slot: &mut Slot<V>) -> Option<V> {
        match std::mem::replace(slot, Slot::Taken) {
            Slot::Ready(value) => Some(value),
            other => {
                *slot = other;
                None
            }
        }
    }
}
