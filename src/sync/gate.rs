//! One-shot countdown gate.
//!
//! The gate opens when `count` calls to [`CompletionGate::count_down`] have
//! been observed. Once open it stays open; further count-downs are no-ops.

use std::fmt;
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

/// Error returned when a gate is constructed with an invalid count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateError {
    /// The initial count must be at least 1.
    InvalidCount(usize),
}

impl fmt::Display for GateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GateError::InvalidCount(count) => {
                write!(f, "gate count must be at least 1, got {}", count)
            }
        }
    }
}

impl std::error::Error for GateError {}

/// Single-use countdown signal.
///
/// Threads blocked in [`wait`](Self::wait) are parked until the remaining
/// count reaches zero, then all of them resume together. Any state written by
/// the thread that performs the final count-down is visible to every thread
/// returning from `wait`.
#[derive(Debug)]
pub struct CompletionGate {
    remaining: Mutex<usize>,
    cvar: Condvar,
}

impl CompletionGate {
    /// Creates a gate that opens after `count` count-downs.
    pub fn new(count: usize) -> Result<Self, GateError> {
        if count < 1 {
            return Err(GateError::InvalidCount(count));
        }
        Ok(Self {
            remaining: Mutex::new(count),
            cvar: Condvar::new(),
        })
    }

    /// Decrements the count if it is still above zero.
    ///
    /// Returns `true` only for the call that opened the gate.
    pub fn count_down(&self) -> bool {
        let mut remaining = self.lock();
        if *remaining == 0 {
            return false;
        }

        *remaining -= 1;
        if *remaining == 0 {
            self.cvar.notify_all();
            tracing::trace!("completion gate released");
            return true;
        }
        false
    }

    /// Blocks the calling thread until the gate is open.
    ///
    /// There is no deadline: if the awaited condition never happens the
    /// caller blocks forever. Use [`wait_timeout`](Self::wait_timeout) when
    /// that is not acceptable.
    pub fn wait(&self) {
        let mut remaining = self.lock();
        while *remaining > 0 {
            remaining = self
                .cvar
                .wait(remaining)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Blocks until the gate is open or `timeout` elapses.
    ///
    /// Returns `true` if the gate opened.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut remaining = self.lock();

        while *remaining > 0 {
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            let (guard, _) = self
                .cvar
                .wait_timeout(remaining, deadline - now)
                .unwrap_or_else(PoisonError::into_inner);
            remaining = guard;
        }
        true
    }

    /// Current remaining count.
    pub fn remaining(&self) -> usize {
        *self.lock()
    }

    /// Returns true once the count has reached zero.
    pub fn is_released(&self) -> bool {
        self.remaining() == 0
    }

    // Nothing panics while holding the lock, but stay usable if a caller's
    // thread is torn down mid-wait.
    fn lock(&self) -> MutexGuard<'_, usize> {
        self.remaining.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
