// Deadline timers for the autosave engine.
//
// Neither timer sleeps. Each records a deadline and answers "is it due at
// `now`?"; the session loop sleeps until the earliest deadline and then asks
// the engine to fire whatever is due. Dropping a timer cancels it.

use std::time::Duration;

use tokio::time::Instant;

use crate::config::EngineConfig;

// ── Local save debounce ─────────────────────────────────────────────

/// Debounce for local cache writes.
///
/// Every `schedule_at` resets the window. When the previous local save is
/// younger than `recent_window`, the longer `burst` window is used so fast
/// typing does not produce back-to-back writes.
#[derive(Debug, Clone)]
pub struct LocalDebounce {
    base: Duration,
    recent_window: Duration,
    burst: Duration,
    deadline: Option<Instant>,
    last_saved_at: Option<Instant>,
}

impl LocalDebounce {
    pub fn new(base: Duration, recent_window: Duration, burst: Duration) -> Self {
        Self { base, recent_window, burst, deadline: None, last_saved_at: None }
    }

    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(config.local_debounce(), config.recent_save_window(), config.burst_debounce())
    }

    /// Request a save. Returns the new deadline.
    pub fn schedule_at(&mut self, now: Instant) -> Instant {
        let window = if self.recently_saved(now) { self.burst } else { self.base };
        let deadline = now + window;
        self.deadline = Some(deadline);
        deadline
    }

    fn recently_saved(&self, now: Instant) -> bool {
        self.last_saved_at.is_some_and(|saved| now.duration_since(saved) < self.recent_window)
    }

    /// Consume the pending save if its window has elapsed.
    pub fn take_ready_at(&mut self, now: Instant) -> bool {
        match self.deadline {
            Some(deadline) if deadline <= now => self.take_pending_at(now),
            _ => false,
        }
    }

    /// Consume the pending save regardless of its deadline.
    pub fn take_pending_at(&mut self, now: Instant) -> bool {
        if self.deadline.take().is_some() {
            self.last_saved_at = Some(now);
            true
        } else {
            false
        }
    }

    pub fn is_pending(&self) -> bool {
        self.deadline.is_some()
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn cancel(&mut self) {
        self.deadline = None;
    }
}

// ── Idle timer ──────────────────────────────────────────────────────

/// Classic debounce for the remote tier: fires exactly `delay` after the last
/// `arm_at`. Re-arming before it fires counts a merged edit.
#[derive(Debug, Clone)]
pub struct IdleTimer {
    delay: Duration,
    deadline: Option<Instant>,
    merged_edits: u64,
}

impl IdleTimer {
    pub fn new(delay: Duration) -> Self {
        Self { delay, deadline: None, merged_edits: 0 }
    }

    pub fn arm_at(&mut self, now: Instant) -> Instant {
        if self.deadline.is_some() {
            self.merged_edits += 1;
        }
        let deadline = now + self.delay;
        self.deadline = Some(deadline);
        deadline
    }

    /// Disarm and report whether the timer was due.
    pub fn take_ready_at(&mut self, now: Instant) -> bool {
        match self.deadline {
            Some(deadline) if deadline <= now => {
                self.deadline = None;
                true
            }
            _ => false,
        }
    }

    pub fn is_armed(&self) -> bool {
        self.deadline.is_some()
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Re-arms that landed while the timer was already armed.
    pub fn merged_edits(&self) -> u64 {
        self.merged_edits
    }

    pub fn cancel(&mut self) {
        self.deadline = None;
    }
}
