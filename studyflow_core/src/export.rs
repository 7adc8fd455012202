//! CSV export of study sessions.
//!
//! Rows are appended to the target file; headers are written only when the
//! file is new or empty. The file is fsynced before returning.

use crate::{Result, StudySession, Task};
use std::collections::HashMap;
use std::fs::OpenOptions;
use std::path::Path;
use uuid::Uuid;

#[derive(Debug, serde::Serialize)]
struct CsvRow<'a> {
    id: String,
    task: &'a str,
    duration_minutes: u32,
    started_at: String,
    ended_at: Option<String>,
    completed: bool,
}

/// Append `sessions` to `csv_path`, naming each session's task when it is in `tasks`
pub fn export_sessions(sessions: &[StudySession], tasks: &[Task], csv_path: &Path) -> Result<usize> {
    if let Some(parent) = csv_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let titles: HashMap<Uuid, &str> = tasks.iter().map(|t| (t.id, t.title.as_str())).collect();

    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(csv_path)?;
    let needs_headers = file.metadata()?.len() == 0;

    let mut writer = csv::WriterBuilder::new()
        .has_headers(needs_headers)
        .from_writer(file);

    for session in sessions {
        let task = session
            .task_id
            .and_then(|id| titles.get(&id).copied())
            .unwrap_or("");
        writer.serialize(CsvRow {
            id: session.id.to_string(),
            task,
            duration_minutes: session.duration_minutes,
            started_at: session.started_at.to_rfc3339(),
            ended_at: session.ended_at.map(|t| t.to_rfc3339()),
            completed: session.completed,
        })?;
    }

    writer.flush()?;
    let file = writer
        .into_inner()
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?;
    file.sync_all()?;

    tracing::info!("Exported {} sessions to {:?}", sessions.len(), csv_path);
    Ok(sessions.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::UserId;
    use chrono::Utc;

    fn sample(user: UserId, task_id: Option<Uuid>) -> StudySession {
        let started_at = Utc::now();
        StudySession {
            id: Uuid::new_v4(),
            user_id: user,
            task_id,
            duration_minutes: 25,
            started_at,
            ended_at: Some(started_at),
            completed: true,
        }
    }

    #[test]
    fn test_export_writes_headers_once() {
        let temp_dir = tempfile::tempdir().unwrap();
        let csv_path = temp_dir.path().join("out").join("sessions.csv");
        let user = UserId::new();

        assert_eq!(export_sessions(&[sample(user, None)], &[], &csv_path).unwrap(), 1);
        assert_eq!(
            export_sessions(&[sample(user, None), sample(user, None)], &[], &csv_path).unwrap(),
            2
        );

        let content = std::fs::read_to_string(&csv_path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 4);
        assert_eq!(lines[0], "id,task,duration_minutes,started_at,ended_at,completed");
        assert_eq!(content.matches("duration_minutes").count(), 1);
    }

    #[test]
    fn test_export_names_tasks() {
        let temp_dir = tempfile::tempdir().unwrap();
        let csv_path = temp_dir.path().join("sessions.csv");
        let user = UserId::new();
        let task = Task {
            id: Uuid::new_v4(),
            user_id: user,
            title: "Calculus, chapter 3".into(),
            description: String::new(),
            subject: "Math".into(),
            is_completed: false,
            created_at: Utc::now(),
        };

        export_sessions(&[sample(user, Some(task.id))], &[task], &csv_path).unwrap();

        let mut reader = csv::Reader::from_path(&csv_path).unwrap();
        let record = reader.records().next().unwrap().unwrap();
        assert_eq!(&record[1], "Calculus, chapter 3");
        assert_eq!(&record[2], "25");
        assert_eq!(&record[5], "true");
    }

    #[test]
    fn test_export_nothing_creates_empty_file() {
        let temp_dir = tempfile::tempdir().unwrap();
        let csv_path = temp_dir.path().join("sessions.csv");
        assert_eq!(export_sessions(&[], &[], &csv_path).unwrap(), 0);
        assert!(csv_path.exists());
    }
}
