//! Real-time driver for a [`CountdownTimer`].
//!
//! One tokio task owns the timer. Callers talk to it through a
//! [`TimerHandle`]: commands go in over an mpsc channel and state snapshots
//! come out over a watch channel. The task keeps at most one tick scheduled
//! and always handles pending commands before a due tick, so a `pause` sent
//! before the deadline is guaranteed to win. Dropping the handle closes the
//! command channel and the task exits without ticking again.

use crate::timer::{format_mm_ss, CountdownTimer, PendingTick, Tick, TimerState};
use crate::{Error, Result};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};

/// Production tick period
pub const TICK_PERIOD: Duration = Duration::from_secs(1);

/// Command accepted by the driver task
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerCommand {
    Start,
    Pause,
    /// Pause when running, start otherwise
    Toggle,
    /// Re-arm with a new duration in seconds
    Reset(u32),
    Shutdown,
}

/// Point-in-time view of the driven timer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerSnapshot {
    pub state: TimerState,
    pub total_seconds: u32,
    pub remaining_seconds: u32,
}

impl TimerSnapshot {
    fn of(timer: &CountdownTimer) -> Self {
        Self {
            state: timer.state(),
            total_seconds: timer.total_seconds(),
            remaining_seconds: timer.remaining_seconds(),
        }
    }

    pub fn formatted(&self) -> String {
        format_mm_ss(self.remaining_seconds)
    }

    pub fn is_completed(&self) -> bool {
        self.state == TimerState::Completed
    }
}

/// Owner-side handle to a running driver task
pub struct TimerHandle {
    commands: mpsc::UnboundedSender<TimerCommand>,
    snapshots: watch::Receiver<TimerSnapshot>,
    task: JoinHandle<CountdownTimer>,
}

/// Spawn a driver task for `timer` ticking every `period`.
///
/// The timer is not started; send [`TimerCommand::Start`].
pub fn spawn_timer(timer: CountdownTimer, period: Duration) -> TimerHandle {
    let (commands, rx) = mpsc::unbounded_channel();
    let (tx, snapshots) = watch::channel(TimerSnapshot::of(&timer));
    let task = tokio::spawn(drive(timer, period, rx, tx));
    TimerHandle {
        commands,
        snapshots,
        task,
    }
}

impl TimerHandle {
    pub fn start(&self) {
        self.send(TimerCommand::Start);
    }

    pub fn pause(&self) {
        self.send(TimerCommand::Pause);
    }

    pub fn toggle(&self) {
        self.send(TimerCommand::Toggle);
    }

    pub fn reset(&self, total_seconds: u32) {
        self.send(TimerCommand::Reset(total_seconds));
    }

    pub fn send(&self, command: TimerCommand) {
        if self.commands.send(command).is_err() {
            tracing::debug!("Timer task already stopped, dropping {:?}", command);
        }
    }

    /// Latest published snapshot
    pub fn snapshot(&self) -> TimerSnapshot {
        *self.snapshots.borrow()
    }

    /// Independent receiver for UI refreshes
    pub fn subscribe(&self) -> watch::Receiver<TimerSnapshot> {
        self.snapshots.clone()
    }

    /// Wait until the countdown reaches zero.
    ///
    /// Fails if the driver stops first (shutdown or dropped task).
    pub async fn wait_until_completed(&mut self) -> Result<TimerSnapshot> {
        let snapshot = self
            .snapshots
            .wait_for(|s| s.is_completed())
            .await
            .map_err(|_| Error::Timer("timer stopped before completing".into()))?;
        Ok(*snapshot)
    }

    /// Stop the driver and take back the timer
    pub async fn shutdown(self) -> Result<CountdownTimer> {
        self.send(TimerCommand::Shutdown);
        self.task
            .await
            .map_err(|e| Error::Timer(format!("timer task failed: {}", e)))
    }
}

async fn drive(
    mut timer: CountdownTimer,
    period: Duration,
    mut commands: mpsc::UnboundedReceiver<TimerCommand>,
    snapshots: watch::Sender<TimerSnapshot>,
) -> CountdownTimer {
    let mut pending: Option<PendingTick> = None;
    let mut deadline = Instant::now() + period;

    loop {
        tokio::select! {
            biased;

            command = commands.recv() => {
                let Some(command) = command else {
                    tracing::debug!("Timer handle dropped, stopping driver");
                    break;
                };
                match command {
                    TimerCommand::Start => {
                        if let Some(first) = timer.start() {
                            pending = Some(first);
                            deadline = Instant::now() + period;
                        }
                    }
                    TimerCommand::Pause => {
                        if timer.pause() {
                            pending = None;
                        }
                    }
                    TimerCommand::Toggle => {
                        if timer.is_running() {
                            timer.pause();
                            pending = None;
                        } else if let Some(first) = timer.start() {
                            pending = Some(first);
                            deadline = Instant::now() + period;
                        }
                    }
                    TimerCommand::Reset(total_seconds) => {
                        timer.reset(total_seconds);
                        pending = None;
                    }
                    TimerCommand::Shutdown => break,
                }
                tracing::debug!("Timer {:?} -> {:?}", command, timer.state());
                snapshots.send_replace(TimerSnapshot::of(&timer));
            }

            () = sleep_until(deadline), if pending.is_some() => {
                if let Some(tick) = pending.take() {
                    match timer.tick(tick) {
                        Tick::Continue(next) => {
                            pending = Some(next);
                            deadline += period;
                        }
                        Tick::Completed => {
                            tracing::info!("Countdown of {}s completed", timer.total_seconds());
                        }
                        Tick::Stale => {}
                    }
                }
                snapshots.send_replace(TimerSnapshot::of(&timer));
            }
        }
    }

    timer
}

#[cfg(test)]
mod tests {
    use super::*;

    const PERIOD: Duration = Duration::from_secs(1);

    /// Let the driver task drain its queue without moving virtual time
    async fn settle() {
        for _ in 0..8 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_runs_to_completion() {
        crate::logging::init_test();
        let mut handle = spawn_timer(CountdownTimer::from_minutes(1), PERIOD);
        handle.start();

        let done = handle.wait_until_completed().await.unwrap();
        assert_eq!(done.remaining_seconds, 0);
        assert_eq!(done.state, TimerState::Completed);

        let timer = handle.shutdown().await.unwrap();
        assert!(timer.is_completed());
        assert_eq!(timer.remaining_seconds(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_one_decrement_per_period() {
        let handle = spawn_timer(CountdownTimer::new(10), PERIOD);
        handle.start();
        settle().await;

        tokio::time::sleep(Duration::from_millis(3500)).await;
        settle().await;
        assert_eq!(handle.snapshot().remaining_seconds, 7);
        assert_eq!(handle.snapshot().formatted(), "00:07");
    }

    #[tokio::test(start_paused = true)]
    async fn test_pause_stops_ticks() {
        let handle = spawn_timer(CountdownTimer::new(10), PERIOD);
        handle.start();
        settle().await;

        tokio::time::sleep(Duration::from_millis(2500)).await;
        handle.pause();
        settle().await;
        let paused = handle.snapshot();
        assert_eq!(paused.state, TimerState::Idle);
        assert_eq!(paused.remaining_seconds, 8);

        // A tick was due at 3s; it must not land
        tokio::time::sleep(Duration::from_secs(5)).await;
        settle().await;
        assert_eq!(handle.snapshot().remaining_seconds, 8);

        handle.start();
        settle().await;
        tokio::time::sleep(Duration::from_millis(1500)).await;
        settle().await;
        assert_eq!(handle.snapshot().remaining_seconds, 7);
    }

    #[tokio::test(start_paused = true)]
    async fn test_toggle_and_reset() {
        let handle = spawn_timer(CountdownTimer::new(5), PERIOD);
        handle.toggle();
        settle().await;
        assert_eq!(handle.snapshot().state, TimerState::Running);

        handle.toggle();
        settle().await;
        assert_eq!(handle.snapshot().state, TimerState::Idle);

        handle.reset(90 * 60);
        settle().await;
        let snap = handle.snapshot();
        assert_eq!(snap.state, TimerState::Idle);
        assert_eq!(snap.formatted(), "90:00");
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_before_completion_fails_wait() {
        let mut handle = spawn_timer(CountdownTimer::new(60), PERIOD);
        handle.start();
        handle.send(TimerCommand::Shutdown);
        settle().await;
        assert!(handle.wait_until_completed().await.is_err());
        assert_eq!(handle.snapshot().remaining_seconds, 60);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_returns_untouched_timer() {
        let handle = spawn_timer(CountdownTimer::new(3), PERIOD);
        let subscriber = handle.subscribe();
        let timer = handle.shutdown().await.unwrap();
        assert_eq!(timer.state(), TimerState::Idle);
        assert_eq!(subscriber.borrow().remaining_seconds, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropping_handle_stops_running_countdown() {
        let handle = spawn_timer(CountdownTimer::new(10), PERIOD);
        let subscriber = handle.subscribe();
        handle.start();
        settle().await;

        tokio::time::sleep(Duration::from_millis(2500)).await;
        settle().await;
        assert_eq!(subscriber.borrow().remaining_seconds, 8);

        // Next tick is due at 3s
        drop(handle);
        settle().await;
        tokio::time::sleep(Duration::from_secs(5)).await;
        settle().await;

        assert_eq!(subscriber.borrow().remaining_seconds, 8);
        assert_eq!(subscriber.borrow().state, TimerState::Running);
        // Driver task has exited and released the sender
        assert!(subscriber.has_changed().is_err());
    }
}
