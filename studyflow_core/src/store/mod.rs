//! Data-service abstraction.
//!
//! Profiles, tasks and study sessions live in an external managed store.
//! [`Store`] is the CRUD surface the rest of the crate needs; every call
//! names the user or record it touches explicitly.

use crate::{
    NewStudySession, NewTask, Profile, Result, StreakUpdate, StudySession, Task, UserId,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

mod local;
mod rest;

pub use local::{Database, LocalStore};
pub use rest::RestStore;

#[async_trait]
pub trait Store: Send + Sync {
    async fn fetch_profile(&self, user: &UserId) -> Result<Option<Profile>>;

    /// Fetch the profile, creating an empty one if the user has none yet
    async fn ensure_profile(&self, user: &UserId, username: &str) -> Result<Profile>;

    async fn update_streak(&self, user: &UserId, update: &StreakUpdate) -> Result<()>;

    /// All of a user's tasks, newest first
    async fn list_tasks(&self, user: &UserId) -> Result<Vec<Task>>;

    async fn fetch_task(&self, id: &Uuid) -> Result<Option<Task>>;

    async fn insert_task(&self, task: NewTask) -> Result<Task>;

    async fn set_task_completed(&self, id: &Uuid, completed: bool) -> Result<()>;

    async fn delete_task(&self, id: &Uuid) -> Result<()>;

    async fn insert_session(&self, session: NewStudySession) -> Result<StudySession>;

    /// Stamp `ended_at` and mark the session completed
    async fn finish_session(&self, id: &Uuid, ended_at: DateTime<Utc>) -> Result<()>;

    async fn delete_session(&self, id: &Uuid) -> Result<()>;

    /// A user's sessions, oldest first
    async fn list_sessions(&self, user: &UserId, completed_only: bool)
        -> Result<Vec<StudySession>>;
}
