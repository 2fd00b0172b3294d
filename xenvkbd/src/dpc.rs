//! Deferred procedure calls
//!
//! A DPC runs a short routine that must not block. Queuing a DPC that is
//! already queued or running does not run it twice concurrently: the request
//! is folded into the current run, which goes round once more before idling.

use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};

const IDLE: u8 = 0;
const QUEUED: u8 = 1 << 0;
const RUNNING: u8 = 1 << 1;

/// Coalescing deferred procedure call
#[derive(Debug, Default)]
pub struct Dpc {
    state: AtomicU8,
    runs: AtomicU64,
}

impl Dpc {
    /// Create an idle DPC
    pub fn new() -> Self {
        Self::default()
    }

    /// Request a run of `routine`
    ///
    /// Returns `true` if the caller ran the routine and `false` if the request
    /// was folded into a run already in progress on another thread, or further
    /// up this thread's stack.
    pub fn queue<F: Fn()>(&self, routine: F) -> bool {
        if self.state.fetch_or(QUEUED, Ordering::AcqRel) != IDLE {
            return false;
        }

        loop {
            self.state.swap(RUNNING, Ordering::AcqRel);
            self.runs.fetch_add(1, Ordering::Relaxed);

            routine();

            if self
                .state
                .compare_exchange(RUNNING, IDLE, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                break;
            }
        }

        true
    }

    /// Number of times a routine has run
    pub fn runs(&self) -> u64 {
        self.runs.load(Ordering::Relaxed)
    }
}
