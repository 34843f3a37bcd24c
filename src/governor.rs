//! Fixed-window send cap shared by every sequence run.
//!
//! Every mutation happens under one lock, so concurrent reservations never
//! lose an increment or overshoot the cap.
use crate::config::ThroughputConfig;
use serde::{Deserialize, Serialize};
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Persistable counter state.
#[derive(Debug, Deserialize, Serialize, Clone, Copy, Default, PartialEq, Eq)]
pub struct GovernorState {
    pub window_start: u64,
    pub sent_in_window: u32,
}

/// Proof that one send slot was reserved in a specific window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[must_use]
pub struct SendPermit {
    window_start: u64,
}

#[derive(Debug)]
pub struct ThroughputGovernor {
    max_sends: u32,
    window_ms: u64,
    state: Mutex<GovernorState>,
}

impl ThroughputGovernor {
    pub fn new(config: &ThroughputConfig) -> Self {
        Self::with_state(config, GovernorState::default())
    }

    pub fn with_state(config: &ThroughputConfig, state: GovernorState) -> Self {
        Self {
            max_sends: config.max_sends,
            window_ms: config.window_secs.saturating_mul(1000),
            state: Mutex::new(state),
        }
    }

    pub fn max_sends(&self) -> u32 {
        self.max_sends
    }

    fn current(&self, now: u64) -> MutexGuard<'_, GovernorState> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if now.saturating_sub(state.window_start) >= self.window_ms || now < state.window_start {
            state.window_start = now;
            state.sent_in_window = 0;
        }
        state
    }

    /// Reset the window if it has elapsed, then report whether a send fits.
    pub fn can_send(&self, now: u64) -> bool {
        self.current(now).sent_in_window < self.max_sends
    }

    /// Count one completed send.
    pub fn record_send(&self, now: u64) {
        let mut state = self.current(now);
        state.sent_in_window = state.sent_in_window.saturating_add(1);
    }

    /// Check and count in one step; `None` when the window is exhausted.
    pub fn try_reserve(&self, now: u64) -> Option<SendPermit> {
        let mut state = self.current(now);
        if state.sent_in_window >= self.max_sends {
            return None;
        }
        state.sent_in_window += 1;
        Some(SendPermit {
            window_start: state.window_start,
        })
    }

    /// Return a reserved slot whose send did not happen.
    ///
    /// A permit from an earlier window is simply dropped.
    pub fn release(&self, permit: SendPermit) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if state.window_start == permit.window_start {
            state.sent_in_window = state.sent_in_window.saturating_sub(1);
        }
    }

    pub fn remaining(&self, now: u64) -> u32 {
        self.max_sends
            .saturating_sub(self.current(now).sent_in_window)
    }

    pub fn snapshot(&self) -> GovernorState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn governor(max_sends: u32) -> ThroughputGovernor {
        ThroughputGovernor::new(&ThroughputConfig {
            max_sends,
            window_secs: 60,
        })
    }

    #[test]
    fn cap_holds_until_window_resets() {
        let governor = governor(5);
        for _ in 0..5 {
            assert!(governor.can_send(1_000));
            governor.record_send(1_000);
        }
        assert!(!governor.can_send(1_000));
        assert!(!governor.can_send(60_999));
        assert!(governor.can_send(61_000));
        assert_eq!(governor.remaining(61_000), 5);
    }

    #[test]
    fn released_permit_frees_its_slot_only_in_same_window() {
        let governor = governor(1);
        let permit = governor.try_reserve(0).expect("first slot");
        assert!(governor.try_reserve(0).is_none());
        governor.release(permit);
        let permit = governor.try_reserve(0).expect("slot returned");

        assert!(governor.try_reserve(70_000).is_some());
        governor.release(permit);
        assert_eq!(governor.snapshot().sent_in_window, 1);
    }

    #[test]
    fn concurrent_reservations_never_exceed_cap() {
        let governor = Arc::new(governor(10));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let governor = Arc::clone(&governor);
                std::thread::spawn(move || (0..5).filter(|_| governor.try_reserve(5).is_some()).count())
            })
            .collect();
        let granted: usize = handles
            .into_iter()
            .map(|handle| handle.join().expect("thread"))
            .sum();
        assert_eq!(granted, 10);
        assert_eq!(governor.snapshot().sent_in_window, 10);
    }

    #[test]
    fn restored_state_keeps_window_usage() {
        let governor = ThroughputGovernor::with_state(
            &ThroughputConfig {
                max_sends: 2,
                window_secs: 60,
            },
            GovernorState {
                window_start: 0,
                sent_in_window: 2,
            },
        );
        assert!(!governor.can_send(30_000));
    }
}
