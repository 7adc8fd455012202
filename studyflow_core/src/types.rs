//! Core domain types for Studyflow.
//!
//! Records mirror the hosted data service's tables (`profiles`, `tasks`,
//! `study_sessions`), so serde field names are the column names.

use crate::streak::CalendarDate;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

// ============================================================================
// Identity
// ============================================================================

/// Identity of the signed-in user.
///
/// Passed explicitly to every operation that reads or writes user data.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub Uuid);

impl UserId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for UserId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for UserId {
    type Err = crate::Error;

    fn from_str(s: &str) -> crate::Result<Self> {
        Uuid::parse_str(s.trim())
            .map(UserId)
            .map_err(|e| crate::Error::Validation(format!("Invalid user id {:?}: {}", s, e)))
    }
}

// ============================================================================
// Profile
// ============================================================================

/// A user's profile row, including streak bookkeeping
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Profile {
    pub id: UserId,
    pub username: String,
    #[serde(default)]
    pub current_streak: u32,
    #[serde(default)]
    pub longest_streak: u32,
    #[serde(default)]
    pub last_study_date: Option<CalendarDate>,
    pub created_at: DateTime<Utc>,
}

impl Profile {
    pub fn new(id: UserId, username: impl Into<String>, created_at: DateTime<Utc>) -> Self {
        Self {
            id,
            username: username.into(),
            current_streak: 0,
            longest_streak: 0,
            last_study_date: None,
            created_at,
        }
    }
}

/// The three profile columns written back after a completed session
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct StreakUpdate {
    pub current_streak: u32,
    pub longest_streak: u32,
    pub last_study_date: CalendarDate,
}

// ============================================================================
// Tasks
// ============================================================================

/// A study task
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Task {
    pub id: Uuid,
    pub user_id: UserId,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub subject: String,
    pub is_completed: bool,
    pub created_at: DateTime<Utc>,
}

/// Fields supplied when creating a task
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct NewTask {
    pub user_id: UserId,
    pub title: String,
    pub description: String,
    pub subject: String,
}

impl NewTask {
    pub fn validate(&self) -> crate::Result<()> {
        if self.title.trim().is_empty() {
            return Err(crate::Error::Validation("Task title must not be empty".into()));
        }
        Ok(())
    }

    pub(crate) fn into_task(self, created_at: DateTime<Utc>) -> Task {
        Task {
            id: Uuid::new_v4(),
            user_id: self.user_id,
            title: self.title.trim().to_string(),
            description: self.description,
            subject: self.subject,
            is_completed: false,
            created_at,
        }
    }
}

/// Task list view selector
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskFilter {
    #[default]
    All,
    Active,
    Completed,
}

impl TaskFilter {
    pub fn matches(&self, task: &Task) -> bool {
        match self {
            TaskFilter::All => true,
            TaskFilter::Active => !task.is_completed,
            TaskFilter::Completed => task.is_completed,
        }
    }
}

impl FromStr for TaskFilter {
    type Err = crate::Error;

    fn from_str(s: &str) -> crate::Result<Self> {
        match s.to_lowercase().as_str() {
            "all" => Ok(TaskFilter::All),
            "active" => Ok(TaskFilter::Active),
            "completed" | "done" => Ok(TaskFilter::Completed),
            other => Err(crate::Error::Validation(format!(
                "Unknown task filter: {}",
                other
            ))),
        }
    }
}

// ============================================================================
// Study sessions
// ============================================================================

/// A persisted focus session
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct StudySession {
    pub id: Uuid,
    pub user_id: UserId,
    pub task_id: Option<Uuid>,
    pub duration_minutes: u32,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub completed: bool,
}

/// Fields supplied when a focus session starts
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct NewStudySession {
    pub user_id: UserId,
    pub task_id: Option<Uuid>,
    pub duration_minutes: u32,
    pub started_at: DateTime<Utc>,
    pub completed: bool,
}

impl NewStudySession {
    pub(crate) fn into_session(self) -> StudySession {
        StudySession {
            id: Uuid::new_v4(),
            user_id: self.user_id,
            task_id: self.task_id,
            duration_minutes: self.duration_minutes,
            started_at: self.started_at,
            ended_at: None,
            completed: self.completed,
        }
    }
}

// ============================================================================
// Assistant chat
// ============================================================================

/// Speaker of a chat message
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

/// One entry in a chat transcript
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: ChatRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_id_parse_and_display() {
        let id = UserId::new();
        let parsed: UserId = id.to_string().parse().unwrap();
        assert_eq!(parsed, id);
        assert!("not-a-uuid".parse::<UserId>().is_err());
    }

    #[test]
    fn test_task_filter() {
        let mut task = NewTask {
            user_id: UserId::new(),
            title: "Read chapter 3".into(),
            description: String::new(),
            subject: "Biology".into(),
        }
        .into_task(Utc::now());

        assert!(TaskFilter::All.matches(&task));
        assert!(TaskFilter::Active.matches(&task));
        assert!(!TaskFilter::Completed.matches(&task));

        task.is_completed = true;
        assert!(!TaskFilter::Active.matches(&task));
        assert!(TaskFilter::Completed.matches(&task));

        assert_eq!("done".parse::<TaskFilter>().unwrap(), TaskFilter::Completed);
        assert!("someday".parse::<TaskFilter>().is_err());
    }

    #[test]
    fn test_blank_task_title_rejected() {
        let task = NewTask {
            user_id: UserId::new(),
            title: "   ".into(),
            description: String::new(),
            subject: String::new(),
        };
        assert!(matches!(task.validate(), Err(crate::Error::Validation(_))));
    }

    #[test]
    fn test_profile_uses_column_names() {
        let mut profile = Profile::new(UserId::new(), "ada", Utc::now());
        profile.last_study_date = Some("2024-03-09".parse().unwrap());

        let json = serde_json::to_value(&profile).unwrap();
        assert_eq!(json["current_streak"], 0);
        assert_eq!(json["last_study_date"], "2024-03-09");

        let back: Profile = serde_json::from_value(json).unwrap();
        assert_eq!(back, profile);
    }
}
