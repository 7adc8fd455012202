#![forbid(unsafe_code)]

//! Core domain model and business logic for Studyflow.
//!
//! This crate provides:
//! - Domain types (profiles, tasks, study sessions, chat messages)
//! - The daily streak calculator
//! - The focus countdown and its async driver
//! - Store backends (local JSON document, hosted REST service)
//! - Session bookkeeping, analytics, CSV export and the study assistant

pub mod types;
pub mod error;
pub mod config;
pub mod logging;
pub mod streak;
pub mod timer;
pub mod driver;
pub mod store;
pub mod session;
pub mod analytics;
pub mod assistant;
pub mod export;

// Re-export commonly used types
pub use error::{Error, Result};
pub use types::*;
pub use config::Config;
pub use streak::{apply_streak, compute_next_streak, compute_next_streak_today, CalendarDate, StreakOutcome};
pub use timer::{format_mm_ss, CountdownTimer, PendingTick, Tick, TimerState};
pub use driver::{spawn_timer, TimerCommand, TimerHandle, TimerSnapshot};
pub use store::{LocalStore, RestStore, Store};
pub use session::{abandon_on_error, begin_session, cancel_session, complete_session, SessionSummary};
pub use analytics::{format_minutes, StudyAnalytics};
pub use assistant::{ChatCompletionClient, Completer, Conversation};
pub use export::export_sessions;
