//! Study statistics over a user's sessions and tasks.

use crate::{StudySession, Task};
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

/// Length of the trailing window used for the weekly figures
pub const WEEK_DAYS: i64 = 7;

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct StudyAnalytics {
    pub total_sessions: usize,
    pub total_minutes: u64,
    pub completed_tasks: usize,
    pub average_session_minutes: u64,
    pub week_sessions: usize,
    pub week_minutes: u64,
    pub daily_average_minutes: u64,
}

impl StudyAnalytics {
    /// Aggregate completed sessions and completed tasks as of `now`.
    ///
    /// Unfinished sessions are ignored. The weekly window includes any
    /// session that started at or after `now - 7 days`.
    pub fn compute(sessions: &[StudySession], tasks: &[Task], now: DateTime<Utc>) -> Self {
        let week_start = now - Duration::days(WEEK_DAYS);

        let mut stats = StudyAnalytics {
            completed_tasks: tasks.iter().filter(|t| t.is_completed).count(),
            ..Default::default()
        };

        for session in sessions.iter().filter(|s| s.completed) {
            let minutes = u64::from(session.duration_minutes);
            stats.total_sessions += 1;
            stats.total_minutes += minutes;
            if session.started_at >= week_start {
                stats.week_sessions += 1;
                stats.week_minutes += minutes;
            }
        }

        stats.average_session_minutes = rounded_div(stats.total_minutes, stats.total_sessions as u64);
        stats.daily_average_minutes = rounded_div(stats.week_minutes, WEEK_DAYS as u64);
        stats
    }
}

// Round half up; zero when there is nothing to divide by
fn rounded_div(total: u64, count: u64) -> u64 {
    if count == 0 {
        return 0;
    }
    (total * 2 + count) / (count * 2)
}

/// Render a minute count as `45m`, `2h` or `1h 30m`
pub fn format_minutes(minutes: u64) -> String {
    let hours = minutes / 60;
    let mins = minutes % 60;
    match (hours, mins) {
        (0, m) => format!("{}m", m),
        (h, 0) => format!("{}h", h),
        (h, m) => format!("{}h {}m", h, m),
    }
}
