//! Study assistant backed by a hosted chat-completion endpoint.
//!
//! The endpoint speaks the OpenAI-compatible chat format: one system prompt
//! plus the student's question go in, the first choice's message comes out.

use crate::config::{secret_from_env, AssistantConfig};
use crate::{ChatMessage, ChatRole, Error, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

/// Shown in the transcript when the endpoint fails
pub const APOLOGY: &str = "Sorry, I encountered an error. Please try again.";

/// Anything that can answer a free-text question
#[async_trait]
pub trait Completer: Send + Sync {
    async fn ask(&self, question: &str) -> Result<String>;
}

#[derive(Debug, Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChatMessage,
}

/// HTTP client for the completion endpoint
#[derive(Clone, Debug)]
pub struct ChatCompletionClient {
    config: AssistantConfig,
    api_key: String,
    http_client: Client,
}

impl ChatCompletionClient {
    pub fn new(config: AssistantConfig, api_key: impl Into<String>) -> Self {
        Self {
            config,
            api_key: api_key.into(),
            http_client: Client::new(),
        }
    }

    /// Build from config, reading the key from the configured environment variable
    pub fn from_config(config: &AssistantConfig) -> Result<Self> {
        let api_key = secret_from_env(&config.api_key_env)?;
        Ok(Self::new(config.clone(), api_key))
    }
}

#[async_trait]
impl Completer for ChatCompletionClient {
    async fn ask(&self, question: &str) -> Result<String> {
        let body = CompletionRequest {
            model: &self.config.model,
            messages: vec![
                ChatMessage::new(ChatRole::System, self.config.system_prompt.clone()),
                ChatMessage::new(ChatRole::User, question),
            ],
            temperature: self.config.temperature,
            max_tokens: self.config.max_tokens,
        };

        let response = self
            .http_client
            .post(&self.config.endpoint)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            tracing::warn!("Completion endpoint returned {}: {}", status, detail.trim());
            return Err(Error::Assistant(format!(
                "completion endpoint returned {}",
                status
            )));
        }

        let reply: CompletionResponse = response
            .json()
            .await
            .map_err(|e| Error::Assistant(format!("unreadable completion reply: {}", e)))?;

        reply
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .ok_or_else(|| Error::Assistant("completion reply had no choices".into()))
    }
}

/// Running question/answer transcript
#[derive(Clone, Debug, Default)]
pub struct Conversation {
    messages: Vec<ChatMessage>,
}

impl Conversation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    /// Ask `input` and append both sides to the transcript.
    ///
    /// Blank input is ignored and returns `None`. A failed completion is
    /// logged and answered with [`APOLOGY`] so the transcript always
    /// alternates user/assistant.
    pub async fn submit<C>(&mut self, completer: &C, input: &str) -> Option<&ChatMessage>
    where
        C: Completer + ?Sized,
    {
        let question = input.trim();
        if question.is_empty() {
            return None;
        }

        self.messages
            .push(ChatMessage::new(ChatRole::User, question));

        let answer = match completer.ask(question).await {
            Ok(answer) => answer,
            Err(e) => {
                tracing::warn!("Assistant failed to answer: {}", e);
                APOLOGY.to_string()
            }
        };
        self.messages
            .push(ChatMessage::new(ChatRole::Assistant, answer));
        self.messages.last()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;
    use serde_json::json;

    fn client_for(server: &mockito::ServerGuard) -> ChatCompletionClient {
        let config = AssistantConfig {
            endpoint: format!("{}/openai/v1/chat/completions", server.url()),
            ..AssistantConfig::default()
        };
        ChatCompletionClient::new(config, "test-key")
    }

    #[tokio::test]
    async fn test_ask_sends_prompt_and_parses_answer() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/openai/v1/chat/completions")
            .match_header("authorization", "Bearer test-key")
            .match_body(Matcher::AllOf(vec![
                Matcher::PartialJson(json!({
                    "model": "llama-3.1-8b-instant",
                    "max_tokens": 300,
                })),
                Matcher::Regex(r#""role":"system""#.into()),
                Matcher::Regex(r#""content":"What is osmosis\?""#.into()),
            ]))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                json!({
                    "choices": [
                        { "message": { "role": "assistant", "content": "Water moving across a membrane." } }
                    ]
                })
                .to_string(),
            )
            .create_async()
            .await;

        let answer = client_for(&server).ask("What is osmosis?").await.unwrap();
        assert_eq!(answer, "Water moving across a membrane.");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_error_status_is_assistant_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/openai/v1/chat/completions")
            .with_status(429)
            .with_body(r#"{"error":{"message":"rate limited"}}"#)
            .create_async()
            .await;

        let err = client_for(&server).ask("anything").await.unwrap_err();
        assert!(matches!(err, Error::Assistant(_)));
    }

    #[tokio::test]
    async fn test_empty_choices_is_assistant_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/openai/v1/chat/completions")
            .with_status(200)
            .with_body(r#"{"choices":[]}"#)
            .create_async()
            .await;

        let err = client_for(&server).ask("anything").await.unwrap_err();
        assert!(matches!(err, Error::Assistant(_)));
    }

    struct Echo;

    #[async_trait]
    impl Completer for Echo {
        async fn ask(&self, question: &str) -> Result<String> {
            Ok(format!("You asked: {}", question))
        }
    }

    struct Broken;

    #[async_trait]
    impl Completer for Broken {
        async fn ask(&self, _question: &str) -> Result<String> {
            Err(Error::Assistant("offline".into()))
        }
    }

    #[tokio::test]
    async fn test_conversation_appends_both_sides() {
        let mut chat = Conversation::new();
        let reply = chat.submit(&Echo, "  define entropy ").await.unwrap();
        assert_eq!(reply.content, "You asked: define entropy");

        assert_eq!(chat.messages().len(), 2);
        assert_eq!(chat.messages()[0].role, ChatRole::User);
        assert_eq!(chat.messages()[0].content, "define entropy");
        assert_eq!(chat.messages()[1].role, ChatRole::Assistant);
    }

    #[tokio::test]
    async fn test_conversation_ignores_blank_input() {
        let mut chat = Conversation::new();
        assert!(chat.submit(&Echo, "   ").await.is_none());
        assert!(chat.messages().is_empty());
    }

    #[tokio::test]
    async fn test_conversation_apologises_on_failure() {
        let mut chat = Conversation::new();
        let reply = chat.submit(&Broken, "hello?").await.unwrap();
        assert_eq!(reply.content, APOLOGY);
        assert_eq!(chat.messages().len(), 2);
    }
}
