//! Hosted data service over its PostgREST-style HTTP interface.
//!
//! Tables are addressed as `{url}/rest/v1/{table}`, rows are filtered with
//! `column=eq.value` query pairs, and writes ask for the affected rows back
//! (`Prefer: return=representation`) so an empty reply means nothing matched.

use super::Store;
use crate::config::{secret_from_env, BackendConfig};
use crate::{
    Error, NewStudySession, NewTask, Profile, Result, StreakUpdate, StudySession, Task, UserId,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, Method, RequestBuilder};
use serde::de::DeserializeOwned;
use serde_json::json;
use uuid::Uuid;

const PROFILES: &str = "profiles";
const TASKS: &str = "tasks";
const SESSIONS: &str = "study_sessions";

/// [`Store`] backed by the hosted data service
#[derive(Clone, Debug)]
pub struct RestStore {
    base_url: String,
    api_key: String,
    access_token: Option<String>,
    http_client: Client,
}

impl RestStore {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            access_token: None,
            http_client: Client::new(),
        }
    }

    /// Act as a signed-in user instead of the anonymous key
    pub fn with_access_token(mut self, token: impl Into<String>) -> Self {
        self.access_token = Some(token.into());
        self
    }

    /// Build from config, reading the key (and optional user token) from the environment
    pub fn from_config(config: &BackendConfig) -> Result<Self> {
        let url = config
            .url
            .as_deref()
            .filter(|u| !u.trim().is_empty())
            .ok_or_else(|| Error::Config("backend.url is required for the remote backend".into()))?;
        let store = Self::new(url, secret_from_env(&config.api_key_env)?);
        Ok(match secret_from_env(&config.access_token_env) {
            Ok(token) => store.with_access_token(token),
            Err(_) => store,
        })
    }

    fn request(&self, method: Method, table: &str) -> RequestBuilder {
        let bearer = self.access_token.as_deref().unwrap_or(&self.api_key);
        self.http_client
            .request(method, format!("{}/rest/v1/{}", self.base_url, table))
            .header("apikey", &self.api_key)
            .bearer_auth(bearer)
            .header("Prefer", "return=representation")
    }

    async fn rows<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<Vec<T>> {
        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Backend {
                status: status.as_u16(),
                message: backend_message(&body),
            });
        }
        Ok(response.json::<Vec<T>>().await?)
    }

    async fn first<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<Option<T>> {
        Ok(self.rows(request).await?.into_iter().next())
    }

    async fn expect_one<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
        kind: &'static str,
        id: impl ToString,
    ) -> Result<T> {
        self.first(request)
            .await?
            .ok_or_else(|| Error::not_found(kind, id))
    }
}

/// Prefer the service's `message` field over the raw body
fn backend_message(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v.get("message").and_then(|m| m.as_str()).map(str::to_string))
        .unwrap_or_else(|| body.trim().to_string())
}

fn eq(value: impl ToString) -> String {
    format!("eq.{}", value.to_string())
}

#[async_trait]
impl Store for RestStore {
    async fn fetch_profile(&self, user: &UserId) -> Result<Option<Profile>> {
        self.first(
            self.request(Method::GET, PROFILES)
                .query(&[("id", eq(user)), ("select", "*".into())]),
        )
        .await
    }

    async fn ensure_profile(&self, user: &UserId, username: &str) -> Result<Profile> {
        if let Some(profile) = self.fetch_profile(user).await? {
            return Ok(profile);
        }
        let request = self
            .request(Method::POST, PROFILES)
            .json(&json!([{ "id": user, "username": username }]));
        let profile = self.expect_one(request, "profile", user).await?;
        tracing::info!("Created profile for {}", user);
        Ok(profile)
    }

    async fn update_streak(&self, user: &UserId, update: &StreakUpdate) -> Result<()> {
        let request = self
            .request(Method::PATCH, PROFILES)
            .query(&[("id", eq(user))])
            .json(update);
        self.expect_one::<Profile>(request, "profile", user).await?;
        Ok(())
    }

    async fn list_tasks(&self, user: &UserId) -> Result<Vec<Task>> {
        self.rows(self.request(Method::GET, TASKS).query(&[
            ("user_id", eq(user)),
            ("select", "*".into()),
            ("order", "created_at.desc".into()),
        ]))
        .await
    }

    async fn fetch_task(&self, id: &Uuid) -> Result<Option<Task>> {
        self.first(
            self.request(Method::GET, TASKS)
                .query(&[("id", eq(id)), ("select", "*".into())]),
        )
        .await
    }

    async fn insert_task(&self, task: NewTask) -> Result<Task> {
        task.validate()?;
        let body = json!([{
            "user_id": task.user_id,
            "title": task.title.trim(),
            "description": task.description,
            "subject": task.subject,
            "is_completed": false,
        }]);
        let request = self.request(Method::POST, TASKS).json(&body);
        let task: Task = self.expect_one(request, "task", "(new)").await?;
        tracing::debug!("Inserted task {}", task.id);
        Ok(task)
    }

    async fn set_task_completed(&self, id: &Uuid, completed: bool) -> Result<()> {
        let request = self
            .request(Method::PATCH, TASKS)
            .query(&[("id", eq(id))])
            .json(&json!({ "is_completed": completed }));
        self.expect_one::<Task>(request, "task", id).await?;
        Ok(())
    }

    async fn delete_task(&self, id: &Uuid) -> Result<()> {
        let request = self.request(Method::DELETE, TASKS).query(&[("id", eq(id))]);
        self.expect_one::<Task>(request, "task", id).await?;
        Ok(())
    }

    async fn insert_session(&self, session: NewStudySession) -> Result<StudySession> {
        let request = self.request(Method::POST, SESSIONS).json(&[session]);
        let session: StudySession = self.expect_one(request, "study session", "(new)").await?;
        tracing::debug!("Inserted study session {}", session.id);
        Ok(session)
    }

    async fn finish_session(&self, id: &Uuid, ended_at: DateTime<Utc>) -> Result<()> {
        let request = self
            .request(Method::PATCH, SESSIONS)
            .query(&[("id", eq(id))])
            .json(&json!({ "ended_at": ended_at, "completed": true }));
        self.expect_one::<StudySession>(request, "study session", id)
            .await?;
        Ok(())
    }

    async fn delete_session(&self, id: &Uuid) -> Result<()> {
        let request = self
            .request(Method::DELETE, SESSIONS)
            .query(&[("id", eq(id))]);
        self.expect_one::<StudySession>(request, "study session", id)
            .await?;
        Ok(())
    }

    async fn list_sessions(
        &self,
        user: &UserId,
        completed_only: bool,
    ) -> Result<Vec<StudySession>> {
        let mut query = vec![
            ("user_id", eq(user)),
            ("select", "*".to_string()),
            ("order", "started_at.asc".to_string()),
        ];
        if completed_only {
            query.push(("completed", eq(true)));
        }
        self.rows(self.request(Method::GET, SESSIONS).query(&query))
            .await
    }
}
