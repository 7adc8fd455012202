//! Focus-session bookkeeping around the countdown.
//!
//! The countdown itself persists nothing. This module brackets it with
//! store writes: a session row is inserted when the user starts, finished
//! when the timer completes (followed by the streak update), or deleted when
//! the user abandons it.

use crate::store::Store;
use crate::streak::{apply_streak, CalendarDate, StreakOutcome};
use crate::{Error, NewStudySession, Profile, Result, StudySession, UserId};
use chrono::{DateTime, Utc};
use uuid::Uuid;

/// What the summary screen shows after a completed session
#[derive(Clone, Debug)]
pub struct SessionSummary {
    pub session_id: Uuid,
    pub duration_minutes: u32,
    pub task_title: Option<String>,
    /// `None` when the profile could not be updated; the session still counts
    pub streak: Option<StreakOutcome>,
    pub current_streak: Option<u32>,
    pub longest_streak: Option<u32>,
}

/// Insert an unfinished session row for a countdown that is about to start
pub async fn begin_session<S>(
    store: &S,
    user: &UserId,
    duration_minutes: u32,
    task_id: Option<Uuid>,
    now: DateTime<Utc>,
) -> Result<StudySession>
where
    S: Store + ?Sized,
{
    if duration_minutes == 0 {
        return Err(Error::Validation(
            "Session duration must be at least one minute".into(),
        ));
    }

    if let Some(id) = task_id {
        match store.fetch_task(&id).await? {
            Some(task) if task.user_id == *user => {}
            _ => return Err(Error::not_found("task", id)),
        }
    }

    let session = store
        .insert_session(NewStudySession {
            user_id: *user,
            task_id,
            duration_minutes,
            started_at: now,
            completed: false,
        })
        .await?;

    tracing::info!(
        "Started {}-minute session {} for {}",
        duration_minutes,
        session.id,
        user
    );
    Ok(session)
}

/// Close a session whose countdown reached zero and advance the streak.
///
/// The session row is always finished first. A failure while updating the
/// profile is logged and reported as `streak: None` rather than undoing the
/// completed session.
pub async fn complete_session<S>(
    store: &S,
    user: &UserId,
    session: &StudySession,
    today: CalendarDate,
    now: DateTime<Utc>,
) -> Result<SessionSummary>
where
    S: Store + ?Sized,
{
    store.finish_session(&session.id, now).await?;

    // The row is already finished; nothing after this point may fail the call
    let task_title = match session.task_id {
        Some(id) => match store.fetch_task(&id).await {
            Ok(task) => task.map(|t| t.title),
            Err(e) => {
                tracing::warn!("Could not load task {} for session summary: {}", id, e);
                None
            }
        },
        None => None,
    };

    let mut summary = SessionSummary {
        session_id: session.id,
        duration_minutes: session.duration_minutes,
        task_title,
        streak: None,
        current_streak: None,
        longest_streak: None,
    };

    match record_streak(store, user, today).await {
        Ok((outcome, profile)) => {
            summary.streak = Some(outcome);
            summary.current_streak = Some(profile.current_streak);
            summary.longest_streak = Some(profile.longest_streak);
        }
        Err(e) => {
            tracing::warn!("Session {} completed but streak update failed: {}", session.id, e);
        }
    }

    tracing::info!("Completed session {}", session.id);
    Ok(summary)
}

/// Abandon a session before completion by removing its row
pub async fn cancel_session<S>(store: &S, session_id: &Uuid) -> Result<()>
where
    S: Store + ?Sized,
{
    store.delete_session(session_id).await?;
    tracing::info!("Cancelled session {}", session_id);
    Ok(())
}

/// Pass `result` through, deleting the unfinished session row if it is an error.
///
/// The original error is returned even when the cleanup itself fails.
pub async fn abandon_on_error<S, T>(store: &S, session_id: &Uuid, result: Result<T>) -> Result<T>
where
    S: Store + ?Sized,
{
    if let Err(ref e) = result {
        tracing::warn!("Session {} interrupted: {}", session_id, e);
        if let Err(cleanup) = cancel_session(store, session_id).await {
            tracing::warn!("Could not remove session {}: {}", session_id, cleanup);
        }
    }
    result
}

/// Read the profile, apply one study day on `today` and write it back
pub async fn record_streak<S>(
    store: &S,
    user: &UserId,
    today: CalendarDate,
) -> Result<(StreakOutcome, Profile)>
where
    S: Store + ?Sized,
{
    let mut profile = store
        .fetch_profile(user)
        .await?
        .ok_or_else(|| Error::not_found("profile", user))?;

    let (outcome, update) = apply_streak(&profile, today);
    store.update_streak(user, &update).await?;

    profile.current_streak = update.current_streak;
    profile.longest_streak = update.longest_streak;
    profile.last_study_date = Some(update.last_study_date);
    Ok((outcome, profile))
}
