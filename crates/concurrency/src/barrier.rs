//! One-shot step barrier
//!
//! A `Barrier` is a counting latch: it is created with a required number of
//! signals, every `signal()` decrements the remaining count, and waiters are
//! released once the count reaches zero. Unlike `std::sync::Barrier` the
//! parties that signal and the parties that wait are different workers, and
//! the gate never closes again.
//!
//! ## Invariants
//!
//! - `wait` never reports `Opened` before exactly `required` signals
//! - Once open, the barrier stays open; waiting on it returns immediately
//! - Signals beyond `required` are counted for diagnostics and otherwise ignored
//! - A bounded wait returns `TimedOut` instead of failing

use parking_lot::{Condvar, Mutex};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

/// Result of waiting on a barrier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WaitStatus {
    /// The barrier reached zero
    Opened,
    /// The bound elapsed first
    TimedOut,
}

impl WaitStatus {
    /// Whether the barrier was open when the wait returned
    pub fn is_opened(&self) -> bool {
        matches!(self, WaitStatus::Opened)
    }
}

#[derive(Debug)]
struct LatchState {
    remaining: usize,
    signals: usize,
}

/// One-shot multi-party synchronization gate
///
/// # Thread Safety
///
/// The count is guarded by a `parking_lot::Mutex`, so two workers signalling
/// from different threads can never miscount. Waiters park on a `Condvar` and
/// are woken together when the last required signal arrives.
///
/// # Example
///
/// ```
/// use interleave_concurrency::{Barrier, WaitStatus};
/// use std::time::Duration;
///
/// let barrier = Barrier::new("updated", 1);
/// assert_eq!(barrier.wait(Some(Duration::from_millis(1))), WaitStatus::TimedOut);
/// barrier.signal();
/// assert_eq!(barrier.wait(None), WaitStatus::Opened);
/// ```
#[derive(Debug)]
pub struct Barrier {
    name: String,
    required: usize,
    state: Mutex<LatchState>,
    opened: Condvar,
}

impl Barrier {
    /// Create a barrier that opens after `required` signals
    ///
    /// A barrier with `required == 0` is open from the start.
    pub fn new(name: impl Into<String>, required: usize) -> Self {
        Barrier {
            name: name.into(),
            required,
            state: Mutex::new(LatchState {
                remaining: required,
                signals: 0,
            }),
            opened: Condvar::new(),
        }
    }

    /// Barrier name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of signals required to open
    pub fn required(&self) -> usize {
        self.required
    }

    /// Signals still missing
    pub fn remaining(&self) -> usize {
        self.state.lock().remaining
    }

    /// Total `signal()` calls received, including surplus ones
    pub fn signals_received(&self) -> usize {
        self.state.lock().signals
    }

    /// Whether the barrier has opened
    pub fn is_open(&self) -> bool {
        self.remaining() == 0
    }

    /// Record one signal
    ///
    /// Returns `true` if this call opened the barrier. Calls after the
    /// barrier is open are no-ops.
    pub fn signal(&self) -> bool {
        let mut state = self.state.lock();
        state.signals += 1;
        if state.remaining == 0 {
            return false;
        }
        state.remaining -= 1;
        if state.remaining == 0 {
            self.opened.notify_all();
            true
        } else {
            false
        }
    }

    /// Block until the barrier opens or `bound` elapses
    ///
    /// `None` waits without limit. A bound too large to represent as a
    /// deadline is treated as unbounded.
    pub fn wait(&self, bound: Option<Duration>) -> WaitStatus {
        let deadline = bound.and_then(|b| Instant::now().checked_add(b));
        let mut state = self.state.lock();

        while state.remaining > 0 {
            match deadline {
                Some(deadline) => {
                    if self.opened.wait_until(&mut state, deadline).timed_out() {
                        return if state.remaining == 0 {
                            WaitStatus::Opened
                        } else {
                            WaitStatus::TimedOut
                        };
                    }
                }
                None => self.opened.wait(&mut state),
            }
        }

        WaitStatus::Opened
    }
}
