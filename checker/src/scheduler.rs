//! Debounce and run-token bookkeeping for one checker instance.
//!
//! This is the pure state machine; the instance actor owns the timers and
//! processes. Every method is called from the actor, so no operation here can
//! interleave with another.
//!
//! ```text
//! Idle --arm--> Pending --fire--> Running --settle--> Idle
//!                 ^  |                |
//!                 +--+ arm (re-arm)   +--arm--> Running + Pending
//! ```

use crate::types::RunToken;

/// Identifies one arming of the debounce timer.
///
/// A timer that fires after being superseded carries an old sequence number
/// and is ignored.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TimerSeq(u64);

#[derive(Debug, Default)]
pub struct RunScheduler {
    token: RunToken,
    next_seq: u64,
    armed: Option<TimerSeq>,
    running: Option<RunToken>,
    /// Files of the current run still waiting to be written.
    outstanding: usize,
    disposed: bool,
}

impl RunScheduler {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Arm (or re-arm) the debounce timer. Any earlier arming is superseded.
    ///
    /// Returns `None` once disposed.
    pub fn arm(&mut self) -> Option<TimerSeq> {
        if self.disposed {
            return None;
        }
        self.next_seq += 1;
        let seq = TimerSeq(self.next_seq);
        self.armed = Some(seq);
        Some(seq)
    }

    /// The timer armed as `seq` elapsed. Starts a run if it is still the
    /// latest arming, returning the new run's token.
    pub fn fire(&mut self, seq: TimerSeq) -> Option<RunToken> {
        if self.disposed || self.armed != Some(seq) {
            return None;
        }
        self.armed = None;
        self.token = self.token.next();
        self.running = Some(self.token);
        self.outstanding = 0;
        Some(self.token)
    }

    /// Whether results stamped with `token` may still be published.
    #[must_use]
    pub fn is_current(&self, token: RunToken) -> bool {
        !self.disposed && token == self.token
    }

    /// A current run finished producing output for `files` files.
    ///
    /// Returns `true` when nothing is left to publish (the run settled).
    pub fn expect_files(&mut self, token: RunToken, files: usize) -> bool {
        if !self.is_current(token) {
            return false;
        }
        self.outstanding = files;
        self.settle_if_done()
    }

    /// One file of the current run was written (or skipped).
    ///
    /// Returns `true` when this was the last outstanding file.
    pub fn file_done(&mut self, token: RunToken) -> bool {
        if !self.is_current(token) || self.running != Some(token) {
            return false;
        }
        self.outstanding = self.outstanding.saturating_sub(1);
        self.settle_if_done()
    }

    /// The current run was abandoned (launch or I/O failure).
    pub fn abandon(&mut self, token: RunToken) {
        if self.running == Some(token) {
            self.running = None;
            self.outstanding = 0;
        }
    }

    /// Invalidate every in-flight run permanently and refuse new ones.
    pub fn dispose(&mut self) {
        self.token = self.token.next();
        self.armed = None;
        self.running = None;
        self.outstanding = 0;
        self.disposed = true;
    }

    fn settle_if_done(&mut self) -> bool {
        if self.outstanding == 0 {
            self.running = None;
            true
        } else {
            false
        }
    }
}

// Introspection for the state machine tests.
#[cfg(test)]
impl RunScheduler {
    #[must_use]
    pub fn current_token(&self) -> RunToken {
        self.token
    }

    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.armed.is_some()
    }

    #[must_use]
    pub fn running(&self) -> Option<RunToken> {
        self.running
    }

    #[must_use]
    pub fn is_disposed(&self) -> bool {
        self.disposed
    }
}
