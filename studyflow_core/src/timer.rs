//! Focus-session countdown timer.
//!
//! The timer is a plain state machine; it owns no threads and no clock.
//! Whoever drives it (see [`crate::driver`]) schedules one tick per second
//! and hands each tick back through a [`PendingTick`].
//!
//! ## State Transitions
//!
//! ```text
//! Idle --start--> Running --tick(0 left)--> Completed
//!   ^               |                           |
//!   +----pause------+                           |
//!   +------------------reset--------------------+
//! ```
//!
//! A `PendingTick` is the only way to advance the countdown. `start` issues
//! one, each accepted tick hands back the next one, and every transition out
//! of `Running` bumps the timer's generation so any tick issued earlier is
//! rejected as stale. Since the token is neither `Clone` nor `Copy`, at most
//! one tick can be outstanding.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimerState {
    /// Not counting. Covers both "never started" and "paused".
    Idle,
    Running,
    /// Reached zero. Terminal until `reset`.
    Completed,
}

/// Permission to apply exactly one tick to the timer that issued it
#[derive(Debug, PartialEq, Eq)]
#[must_use = "dropping a PendingTick stops the countdown"]
pub struct PendingTick {
    generation: u64,
}

/// What a tick did
#[derive(Debug, PartialEq, Eq)]
pub enum Tick {
    /// One second counted; schedule the returned tick next
    Continue(PendingTick),
    /// The last second counted; the timer is now `Completed`
    Completed,
    /// The timer left `Running` after this tick was issued; nothing changed
    Stale,
}

/// Countdown over whole seconds
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CountdownTimer {
    total_seconds: u32,
    remaining_seconds: u32,
    state: TimerState,
    #[serde(skip)]
    generation: u64,
}

impl CountdownTimer {
    /// A timer armed with `total_seconds` (at least one second)
    pub fn new(total_seconds: u32) -> Self {
        let total_seconds = total_seconds.max(1);
        Self {
            total_seconds,
            remaining_seconds: total_seconds,
            state: TimerState::Idle,
            generation: 0,
        }
    }

    pub fn from_minutes(minutes: u32) -> Self {
        Self::new(minutes.saturating_mul(60))
    }

    // ── Queries ──────────────────────────────────────────────────────

    pub fn state(&self) -> TimerState {
        self.state
    }

    pub fn total_seconds(&self) -> u32 {
        self.total_seconds
    }

    pub fn remaining_seconds(&self) -> u32 {
        self.remaining_seconds
    }

    pub fn elapsed_seconds(&self) -> u32 {
        self.total_seconds - self.remaining_seconds
    }

    pub fn is_running(&self) -> bool {
        self.state == TimerState::Running
    }

    pub fn is_completed(&self) -> bool {
        self.state == TimerState::Completed
    }

    /// 0.0 ..= 100.0 of the duration already counted down
    pub fn progress_pct(&self) -> f64 {
        self.elapsed_seconds() as f64 / self.total_seconds as f64 * 100.0
    }

    /// Remaining time as `MM:SS`; minutes are not wrapped into hours
    pub fn format_remaining(&self) -> String {
        format_mm_ss(self.remaining_seconds)
    }

    // ── Commands ─────────────────────────────────────────────────────

    /// Begin or resume counting.
    ///
    /// Returns the first tick to schedule, or `None` when already running
    /// (a tick is already outstanding) or completed.
    pub fn start(&mut self) -> Option<PendingTick> {
        match self.state {
            TimerState::Idle => {
                self.state = TimerState::Running;
                self.generation += 1;
                Some(PendingTick {
                    generation: self.generation,
                })
            }
            TimerState::Running | TimerState::Completed => None,
        }
    }

    /// Stop counting, keeping the remaining time. Returns whether anything changed.
    pub fn pause(&mut self) -> bool {
        match self.state {
            TimerState::Running => {
                self.state = TimerState::Idle;
                self.generation += 1;
                true
            }
            _ => false,
        }
    }

    /// Apply one elapsed second.
    pub fn tick(&mut self, pending: PendingTick) -> Tick {
        if self.state != TimerState::Running || pending.generation != self.generation {
            return Tick::Stale;
        }

        self.remaining_seconds = self.remaining_seconds.saturating_sub(1);
        if self.remaining_seconds == 0 {
            self.state = TimerState::Completed;
            self.generation += 1;
            return Tick::Completed;
        }

        Tick::Continue(pending)
    }

    /// Re-arm with a new duration from any state, leaving the timer idle
    pub fn reset(&mut self, total_seconds: u32) {
        let total_seconds = total_seconds.max(1);
        self.total_seconds = total_seconds;
        self.remaining_seconds = total_seconds;
        self.state = TimerState::Idle;
        self.generation += 1;
    }
}

/// Format seconds as zero-padded `MM:SS` with unbounded minutes
pub fn format_mm_ss(seconds: u32) -> String {
    format!("{:02}:{:02}", seconds / 60, seconds % 60)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Tick until the timer stops handing out ticks; returns how many were accepted
    fn run_out(timer: &mut CountdownTimer, mut pending: PendingTick) -> u32 {
        let mut ticks = 0;
        loop {
            match timer.tick(pending) {
                Tick::Continue(next) => {
                    ticks += 1;
                    pending = next;
                }
                Tick::Completed => return ticks + 1,
                Tick::Stale => return ticks,
            }
        }
    }

    #[test]
    fn test_new_timer_is_idle_and_full() {
        let timer = CountdownTimer::from_minutes(25);
        assert_eq!(timer.state(), TimerState::Idle);
        assert_eq!(timer.total_seconds(), 1500);
        assert_eq!(timer.remaining_seconds(), 1500);
        assert!(!timer.is_running());
        assert!(!timer.is_completed());
        assert_eq!(timer.format_remaining(), "25:00");
    }

    #[test]
    fn test_runs_to_completion_in_exact_ticks() {
        for minutes in [1, 2, 5] {
            let mut timer = CountdownTimer::from_minutes(minutes);
            let first = timer.start().unwrap();
            assert_eq!(run_out(&mut timer, first), minutes * 60);
            assert_eq!(timer.remaining_seconds(), 0);
            assert_eq!(timer.state(), TimerState::Completed);
            assert!(!timer.is_running());
        }
    }

    #[test]
    fn test_pause_and_resume_continues_without_skipping() {
        let mut timer = CountdownTimer::from_minutes(1);
        let mut pending = timer.start().unwrap();
        for _ in 0..15 {
            pending = match timer.tick(pending) {
                Tick::Continue(next) => next,
                other => panic!("unexpected {:?}", other),
            };
        }
        assert_eq!(timer.remaining_seconds(), 45);

        assert!(timer.pause());
        assert_eq!(timer.state(), TimerState::Idle);

        // The tick scheduled before the pause must not count
        assert_eq!(timer.tick(pending), Tick::Stale);
        assert_eq!(timer.remaining_seconds(), 45);

        let resumed = timer.start().unwrap();
        assert_eq!(run_out(&mut timer, resumed), 45);
        assert!(timer.is_completed());
    }

    #[test]
    fn test_start_is_noop_while_running_or_completed() {
        let mut timer = CountdownTimer::new(1);
        let pending = timer.start().unwrap();
        assert!(timer.start().is_none());

        assert_eq!(timer.tick(pending), Tick::Completed);
        assert!(timer.start().is_none());
        assert!(timer.is_completed());
    }

    #[test]
    fn test_pause_is_noop_unless_running() {
        let mut timer = CountdownTimer::new(30);
        assert!(!timer.pause());
        let pending = timer.start().unwrap();
        assert!(timer.pause());
        assert!(!timer.pause());
        assert_eq!(timer.tick(pending), Tick::Stale);
    }

    #[test]
    fn test_completed_timer_rejects_old_ticks() {
        let mut timer = CountdownTimer::new(2);
        let stale = timer.start().unwrap();
        assert!(timer.pause());
        let live = timer.start().unwrap();
        let live = match timer.tick(live) {
            Tick::Continue(next) => next,
            other => panic!("unexpected {:?}", other),
        };
        assert_eq!(timer.tick(live), Tick::Completed);
        assert_eq!(timer.tick(stale), Tick::Stale);
        assert_eq!(timer.remaining_seconds(), 0);
    }

    #[test]
    fn test_reset_rearms_from_any_state() {
        let mut timer = CountdownTimer::new(1);
        let pending = timer.start().unwrap();
        assert_eq!(timer.tick(pending), Tick::Completed);

        timer.reset(90 * 60);
        assert_eq!(timer.state(), TimerState::Idle);
        assert_eq!(timer.remaining_seconds(), 5400);
        assert_eq!(timer.format_remaining(), "90:00");

        let pending = timer.start().unwrap();
        timer.reset(10);
        assert_eq!(timer.tick(pending), Tick::Stale);
        assert_eq!(timer.remaining_seconds(), 10);
    }

    #[test]
    fn test_zero_duration_is_clamped() {
        let timer = CountdownTimer::new(0);
        assert_eq!(timer.total_seconds(), 1);
    }

    #[test]
    fn test_format_mm_ss() {
        assert_eq!(format_mm_ss(125), "02:05");
        assert_eq!(format_mm_ss(5999), "99:59");
        assert_eq!(format_mm_ss(0), "00:00");
        assert_eq!(format_mm_ss(6000), "100:00");
    }

    #[test]
    fn test_progress() {
        let mut timer = CountdownTimer::new(4);
        assert_eq!(timer.progress_pct(), 0.0);
        let pending = timer.start().unwrap();
        let _ = timer.tick(pending);
        assert_eq!(timer.progress_pct(), 25.0);
    }
}
