//! Local JSON store with file locking.
//!
//! All three tables live in one JSON document. Readers take a shared lock,
//! writers take an exclusive lock on a sibling `.lock` file for the whole
//! load-modify-save cycle, and saves go through a temp file that is renamed
//! over the original.

use super::Store;
use crate::{
    Error, NewStudySession, NewTask, Profile, Result, StreakUpdate, StudySession, Task, UserId,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use uuid::Uuid;

/// Every table of the local store
#[derive(Clone, Debug, Serialize, Deserialize, Default)]
pub struct Database {
    #[serde(default)]
    pub profiles: Vec<Profile>,
    #[serde(default)]
    pub tasks: Vec<Task>,
    #[serde(default)]
    pub study_sessions: Vec<StudySession>,
}

enum Loaded {
    Missing,
    Parsed(Database),
    Corrupt,
}

impl Database {
    /// Load the document, treating a missing or unreadable file as empty
    pub fn load(path: &Path) -> Result<Self> {
        let _guard = lock(path, false)?;
        Ok(match read_document(path)? {
            Loaded::Parsed(db) => db,
            Loaded::Missing | Loaded::Corrupt => Self::default(),
        })
    }

    /// Atomically write the document
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let temp = NamedTempFile::new_in(path.parent().ok_or_else(|| {
            std::io::Error::new(std::io::ErrorKind::Other, "store path missing parent")
        })?)?;

        {
            let mut writer = std::io::BufWriter::new(temp.as_file());
            let contents = serde_json::to_string(self)?;
            writer.write_all(contents.as_bytes())?;
            writer.flush()?;
        }

        temp.as_file().sync_all()?;
        temp.persist(path).map_err(|e| Error::Io(e.error))?;

        tracing::debug!("Saved store to {:?}", path);
        Ok(())
    }

    /// Load, modify and save under one exclusive lock.
    ///
    /// The closure's error aborts the save. A corrupt document is moved to
    /// `<name>.corrupt` before the fresh one is written.
    pub fn update<F, T>(path: &Path, f: F) -> Result<T>
    where
        F: FnOnce(&mut Database) -> Result<T>,
    {
        let _guard = lock(path, true)?;

        let mut db = match read_document(path)? {
            Loaded::Parsed(db) => db,
            Loaded::Missing => Database::default(),
            Loaded::Corrupt => {
                let aside = corrupt_path(path);
                std::fs::rename(path, &aside)?;
                tracing::warn!("Moved unreadable store to {:?}, starting empty", aside);
                Database::default()
            }
        };

        let value = f(&mut db)?;
        db.save(path)?;
        Ok(value)
    }
}

fn read_document(path: &Path) -> Result<Loaded> {
    if !path.exists() {
        tracing::debug!("No store file at {:?}", path);
        return Ok(Loaded::Missing);
    }

    let mut contents = String::new();
    File::open(path)?.read_to_string(&mut contents)?;

    match serde_json::from_str::<Database>(&contents) {
        Ok(db) => Ok(Loaded::Parsed(db)),
        Err(e) => {
            tracing::warn!("Failed to parse store file {:?}: {}", path, e);
            Ok(Loaded::Corrupt)
        }
    }
}

fn lock_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".lock");
    path.with_file_name(name)
}

fn corrupt_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".corrupt");
    path.with_file_name(name)
}

/// Holds a lock on the store's lock file until dropped
struct LockGuard(File);

impl Drop for LockGuard {
    fn drop(&mut self) {
        let _ = self.0.unlock();
    }
}

fn lock(path: &Path, exclusive: bool) -> Result<LockGuard> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let file = OpenOptions::new()
        .create(true)
        .truncate(false)
        .write(true)
        .open(lock_path(path))?;
    if exclusive {
        file.lock_exclusive()?;
    } else {
        file.lock_shared()?;
    }
    Ok(LockGuard(file))
}

/// [`Store`] backed by a JSON document on disk
#[derive(Clone, Debug)]
pub struct LocalStore {
    path: PathBuf,
}

impl LocalStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Run a load or load-modify-save cycle off the async worker threads.
    ///
    /// File locks block, so every store call goes through the blocking pool.
    async fn with_db<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Path) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || f(&path))
            .await
            .map_err(|e| Error::Other(format!("Store task failed: {}", e)))?
    }
}

#[async_trait]
impl Store for LocalStore {
    async fn fetch_profile(&self, user: &UserId) -> Result<Option<Profile>> {
        let user = *user;
        self.with_db(move |path| {
            let db = Database::load(path)?;
            Ok(db.profiles.into_iter().find(|p| p.id == user))
        })
        .await
    }

    async fn ensure_profile(&self, user: &UserId, username: &str) -> Result<Profile> {
        let user = *user;
        let username = username.to_string();
        self.with_db(move |path| {
            Database::update(path, |db| {
                if let Some(existing) = db.profiles.iter().find(|p| p.id == user) {
                    return Ok(existing.clone());
                }
                let profile = Profile::new(user, &username, Utc::now());
                db.profiles.push(profile.clone());
                tracing::info!("Created profile for {}", user);
                Ok(profile)
            })
        })
        .await
    }

    async fn update_streak(&self, user: &UserId, update: &StreakUpdate) -> Result<()> {
        let user = *user;
        let update = update.clone();
        self.with_db(move |path| {
            Database::update(path, |db| {
                let profile = db
                    .profiles
                    .iter_mut()
                    .find(|p| p.id == user)
                    .ok_or_else(|| Error::not_found("profile", user))?;
                profile.current_streak = update.current_streak;
                profile.longest_streak = update.longest_streak;
                profile.last_study_date = Some(update.last_study_date);
                Ok(())
            })
        })
        .await
    }

    async fn list_tasks(&self, user: &UserId) -> Result<Vec<Task>> {
        let user = *user;
        self.with_db(move |path| {
            let db = Database::load(path)?;
            let mut tasks: Vec<Task> = db
                .tasks
                .into_iter()
                .filter(|t| t.user_id == user)
                .collect();
            tasks.sort_by(|a, b| b.created_at.cmp(&a.created_at));
            Ok(tasks)
        })
        .await
    }

    async fn fetch_task(&self, id: &Uuid) -> Result<Option<Task>> {
        let id = *id;
        self.with_db(move |path| {
            let db = Database::load(path)?;
            Ok(db.tasks.into_iter().find(|t| t.id == id))
        })
        .await
    }

    async fn insert_task(&self, task: NewTask) -> Result<Task> {
        task.validate()?;
        self.with_db(move |path| {
            Database::update(path, |db| {
                let task = task.into_task(Utc::now());
                db.tasks.push(task.clone());
                tracing::debug!("Inserted task {}", task.id);
                Ok(task)
            })
        })
        .await
    }

    async fn set_task_completed(&self, id: &Uuid, completed: bool) -> Result<()> {
        let id = *id;
        self.with_db(move |path| {
            Database::update(path, |db| {
                let task = db
                    .tasks
                    .iter_mut()
                    .find(|t| t.id == id)
                    .ok_or_else(|| Error::not_found("task", id))?;
                task.is_completed = completed;
                Ok(())
            })
        })
        .await
    }

    async fn delete_task(&self, id: &Uuid) -> Result<()> {
        let id = *id;
        self.with_db(move |path| {
            Database::update(path, |db| {
                let before = db.tasks.len();
                db.tasks.retain(|t| t.id != id);
                if db.tasks.len() == before {
                    return Err(Error::not_found("task", id));
                }
                Ok(())
            })
        })
        .await
    }

    async fn insert_session(&self, session: NewStudySession) -> Result<StudySession> {
        self.with_db(move |path| {
            Database::update(path, |db| {
                let session = session.into_session();
                db.study_sessions.push(session.clone());
                tracing::debug!("Inserted study session {}", session.id);
                Ok(session)
            })
        })
        .await
    }

    async fn finish_session(&self, id: &Uuid, ended_at: DateTime<Utc>) -> Result<()> {
        let id = *id;
        self.with_db(move |path| {
            Database::update(path, |db| {
                let session = db
                    .study_sessions
                    .iter_mut()
                    .find(|s| s.id == id)
                    .ok_or_else(|| Error::not_found("study session", id))?;
                session.ended_at = Some(ended_at);
                session.completed = true;
                Ok(())
            })
        })
        .await
    }

    async fn delete_session(&self, id: &Uuid) -> Result<()> {
        let id = *id;
        self.with_db(move |path| {
            Database::update(path, |db| {
                let before = db.study_sessions.len();
                db.study_sessions.retain(|s| s.id != id);
                if db.study_sessions.len() == before {
                    return Err(Error::not_found("study session", id));
                }
                Ok(())
            })
        })
        .await
    }

    async fn list_sessions(
        &self,
        user: &UserId,
        completed_only: bool,
    ) -> Result<Vec<StudySession>> {
        let user = *user;
        self.with_db(move |path| {
            let db = Database::load(path)?;
            let mut sessions: Vec<StudySession> = db
                .study_sessions
                .into_iter()
                .filter(|s| s.user_id == user && (!completed_only || s.completed))
                .collect();
            sessions.sort_by(|a, b| a.started_at.cmp(&b.started_at));
            Ok(sessions)
        })
        .await
    }
}
