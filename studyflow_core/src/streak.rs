//! Daily study streak calculation.
//!
//! A streak counts consecutive calendar days with at least one completed
//! focus session. Days are compared as local calendar dates, never as
//! timestamp differences, so DST shifts cannot change the count.

use crate::{Profile, StreakUpdate};
use chrono::{Local, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

const DATE_FORMAT: &str = "%Y-%m-%d";

/// A date without time of day, in the user's local time zone.
///
/// Canonical text form is `YYYY-MM-DD`, which is also how the data
/// service stores `last_study_date`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CalendarDate(NaiveDate);

impl CalendarDate {
    pub fn new(date: NaiveDate) -> Self {
        Self(date)
    }

    pub fn from_ymd(year: i32, month: u32, day: u32) -> Option<Self> {
        NaiveDate::from_ymd_opt(year, month, day).map(Self)
    }

    /// Today according to the local clock
    pub fn today() -> Self {
        Self(Local::now().date_naive())
    }

    pub fn date(&self) -> NaiveDate {
        self.0
    }

    /// Whole calendar days from `earlier` to `self` (negative if `earlier` is later)
    pub fn days_since(&self, earlier: CalendarDate) -> i64 {
        (self.0 - earlier.0).num_days()
    }

    pub fn checked_sub_days(&self, days: u64) -> Option<Self> {
        self.0.checked_sub_days(chrono::Days::new(days)).map(Self)
    }
}

impl fmt::Display for CalendarDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format(DATE_FORMAT))
    }
}

impl FromStr for CalendarDate {
    type Err = crate::Error;

    fn from_str(s: &str) -> crate::Result<Self> {
        NaiveDate::parse_from_str(s.trim(), DATE_FORMAT)
            .map(Self)
            .map_err(|e| crate::Error::Validation(format!("Invalid date {:?}: {}", s, e)))
    }
}

/// Result of advancing a streak by one completed session
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreakOutcome {
    pub new_streak: u32,
    /// True when a gap (or a last date in the future) broke the previous streak
    pub was_reset: bool,
}

/// Compute the streak after a session completed on `today`.
///
/// - no previous study day: the streak starts at 1
/// - studied earlier today: unchanged, one increment per day at most
/// - studied yesterday: incremented
/// - anything else, including a last date after `today`: restarts at 1
pub fn compute_next_streak(
    last_study_date: Option<CalendarDate>,
    current_streak: u32,
    today: CalendarDate,
) -> StreakOutcome {
    let Some(last) = last_study_date else {
        return StreakOutcome {
            new_streak: 1,
            was_reset: false,
        };
    };

    match today.days_since(last) {
        0 => StreakOutcome {
            new_streak: current_streak,
            was_reset: false,
        },
        1 => StreakOutcome {
            new_streak: current_streak.saturating_add(1),
            was_reset: false,
        },
        _ => StreakOutcome {
            new_streak: 1,
            was_reset: true,
        },
    }
}

/// [`compute_next_streak`] against the local clock
pub fn compute_next_streak_today(
    last_study_date: Option<CalendarDate>,
    current_streak: u32,
) -> StreakOutcome {
    compute_next_streak(last_study_date, current_streak, CalendarDate::today())
}

/// Profile columns to write back after a session completed on `today`
pub fn apply_streak(profile: &Profile, today: CalendarDate) -> (StreakOutcome, StreakUpdate) {
    let outcome = compute_next_streak(profile.last_study_date, profile.current_streak, today);
    let update = StreakUpdate {
        current_streak: outcome.new_streak,
        longest_streak: profile.longest_streak.max(outcome.new_streak),
        last_study_date: today,
    };

    if outcome.was_reset {
        tracing::info!(
            "Streak for {} reset (last studied {:?}, was {})",
            profile.id,
            profile.last_study_date.map(|d| d.to_string()),
            profile.current_streak
        );
    }

    (outcome, update)
}

/// Short encouragement line for a current streak value
pub fn streak_message(current_streak: u32) -> &'static str {
    match current_streak {
        0 => "Complete a session to start your streak!",
        1 => "Great start! Keep going tomorrow!",
        _ => "Amazing! You're on fire!",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::UserId;
    use chrono::Utc;

    fn date(s: &str) -> CalendarDate {
        s.parse().unwrap()
    }

    #[test]
    fn test_first_session_starts_streak() {
        for current in [0, 3, 250] {
            let outcome = compute_next_streak(None, current, date("2024-06-01"));
            assert_eq!(
                outcome,
                StreakOutcome {
                    new_streak: 1,
                    was_reset: false
                }
            );
        }
    }

    #[test]
    fn test_same_day_does_not_increment() {
        let today = date("2024-06-01");
        for current in [0, 1, 7] {
            let outcome = compute_next_streak(Some(today), current, today);
            assert_eq!(outcome.new_streak, current);
            assert!(!outcome.was_reset);
        }
    }

    #[test]
    fn test_consecutive_day_increments() {
        let outcome = compute_next_streak(Some(date("2024-05-31")), 4, date("2024-06-01"));
        assert_eq!(
            outcome,
            StreakOutcome {
                new_streak: 5,
                was_reset: false
            }
        );
    }

    #[test]
    fn test_gap_resets_to_one() {
        let today = date("2024-06-01");
        for last in ["2024-05-30", "2024-05-27", "2023-01-01"] {
            let outcome = compute_next_streak(Some(date(last)), 10, today);
            assert_eq!(
                outcome,
                StreakOutcome {
                    new_streak: 1,
                    was_reset: true
                }
            );
        }
    }

    #[test]
    fn test_future_last_date_resets() {
        let outcome = compute_next_streak(Some(date("2024-06-03")), 6, date("2024-06-01"));
        assert_eq!(outcome.new_streak, 1);
        assert!(outcome.was_reset);
    }

    #[test]
    fn test_day_delta_ignores_month_and_year_boundaries() {
        assert_eq!(
            compute_next_streak(Some(date("2024-02-29")), 2, date("2024-03-01")).new_streak,
            3
        );
        assert_eq!(
            compute_next_streak(Some(date("2023-12-31")), 9, date("2024-01-01")).new_streak,
            10
        );
        // Across the spring-forward weekend in most northern time zones
        assert_eq!(
            compute_next_streak(Some(date("2024-03-09")), 1, date("2024-03-10")).new_streak,
            2
        );
    }

    #[test]
    fn test_pure_function_is_repeatable() {
        let args = (Some(date("2024-05-31")), 4, date("2024-06-01"));
        assert_eq!(
            compute_next_streak(args.0, args.1, args.2),
            compute_next_streak(args.0, args.1, args.2)
        );
    }

    #[test]
    fn test_today_helper_uses_local_calendar() {
        let today = CalendarDate::today();
        let yesterday = today.checked_sub_days(1).unwrap();
        assert_eq!(compute_next_streak_today(Some(today), 3).new_streak, 3);
        assert_eq!(compute_next_streak_today(Some(yesterday), 3).new_streak, 4);
    }

    #[test]
    fn test_apply_streak_yesterday_scenario() {
        let today = date("2024-06-01");
        let mut profile = Profile::new(UserId::new(), "sam", Utc::now());
        profile.current_streak = 4;
        profile.longest_streak = 4;
        profile.last_study_date = Some(date("2024-05-31"));

        let (outcome, update) = apply_streak(&profile, today);
        assert_eq!(outcome.new_streak, 5);
        assert_eq!(update.current_streak, 5);
        assert_eq!(update.longest_streak, 5);
        assert_eq!(update.last_study_date, today);
    }

    #[test]
    fn test_apply_streak_broken_keeps_longest() {
        let today = date("2024-06-01");
        let mut profile = Profile::new(UserId::new(), "sam", Utc::now());
        profile.current_streak = 10;
        profile.longest_streak = 12;
        profile.last_study_date = Some(date("2024-05-27"));

        let (outcome, update) = apply_streak(&profile, today);
        assert!(outcome.was_reset);
        assert_eq!(update.current_streak, 1);
        assert_eq!(update.longest_streak, 12);
    }

    #[test]
    fn test_calendar_date_text_form() {
        let d = CalendarDate::from_ymd(2024, 3, 7).unwrap();
        assert_eq!(d.to_string(), "2024-03-07");
        assert_eq!(date("2024-03-07"), d);
        assert!("2024-3-7x".parse::<CalendarDate>().is_err());
        assert!("07/03/2024".parse::<CalendarDate>().is_err());
    }

    #[test]
    fn test_streak_message() {
        assert!(streak_message(0).contains("start"));
        assert!(streak_message(1).contains("Great start"));
        assert!(streak_message(9).contains("on fire"));
    }
}
