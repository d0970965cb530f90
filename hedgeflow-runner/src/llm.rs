//! Language-model boundary: an ordered list of role/content messages in, one
//! content string out.

use std::thread;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::LlmSection;

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("API key environment variable {0} is not set")]
    MissingApiKey(String),

    #[error("chat request failed: {0}")]
    Request(String),

    #[error("chat API returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("chat API returned no content")]
    EmptyResponse,

    #[error("could not interpret model output: {0}")]
    Unparseable(String),

    #[error("chat model failed after {attempts} attempts: {last}")]
    Exhausted {
        attempts: u32,
        #[source]
        last: Box<LlmError>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

/// A hosted text-completion service.
pub trait ChatModel: Send + Sync {
    fn name(&self) -> &str;

    fn complete(&self, messages: &[ChatMessage]) -> Result<String, LlmError>;
}

/// Retries a model with `initial_delay * 2^attempt` between attempts. An
/// empty or whitespace-only response counts as a failed attempt.
pub struct RetryingChatModel<M> {
    inner: M,
    max_attempts: u32,
    initial_delay: Duration,
}

impl<M: ChatModel> RetryingChatModel<M> {
    pub fn new(inner: M, max_attempts: u32, initial_delay: Duration) -> Self {
        Self {
            inner,
            max_attempts: max_attempts.max(1),
            initial_delay,
        }
    }

    pub fn inner(&self) -> &M {
        &self.inner
    }
}

impl<M: ChatModel> ChatModel for RetryingChatModel<M> {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn complete(&self, messages: &[ChatMessage]) -> Result<String, LlmError> {
        let mut last = LlmError::EmptyResponse;
        for attempt in 0..self.max_attempts {
            match self.inner.complete(messages) {
                Ok(content) if !content.trim().is_empty() => return Ok(content),
                Ok(_) => last = LlmError::EmptyResponse,
                Err(e) => last = e,
            }
            warn!(
                model = self.inner.name(),
                attempt = attempt + 1,
                max_attempts = self.max_attempts,
                error = %last,
                "chat completion attempt failed"
            );
            if attempt + 1 < self.max_attempts {
                let delay = self.initial_delay.saturating_mul(1 << attempt.min(16));
                thread::sleep(delay);
            }
        }
        Err(LlmError::Exhausted {
            attempts: self.max_attempts,
            last: Box::new(last),
        })
    }
}

#[derive(Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
}

#[derive(Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

/// OpenRouter chat-completions client over blocking HTTPS.
pub struct OpenRouterClient {
    client: reqwest::blocking::Client,
    endpoint: String,
    model: String,
    api_key: String,
}

impl OpenRouterClient {
    pub fn new(
        base_url: &str,
        model: &str,
        api_key: String,
        timeout: Duration,
    ) -> Result<Self, LlmError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| LlmError::Request(e.to_string()))?;
        Ok(Self {
            client,
            endpoint: format!("{}/chat/completions", base_url.trim_end_matches('/')),
            model: model.to_string(),
            api_key,
        })
    }

    /// Build a client from configuration, reading the key from the configured
    /// environment variable.
    pub fn from_config(section: &LlmSection, timeout: Duration) -> Result<Self, LlmError> {
        let api_key = std::env::var(&section.api_key_env)
            .ok()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| LlmError::MissingApiKey(section.api_key_env.clone()))?;
        Self::new(&section.base_url, &section.model, api_key, timeout)
    }
}

impl ChatModel for OpenRouterClient {
    fn name(&self) -> &str {
        &self.model
    }

    fn complete(&self, messages: &[ChatMessage]) -> Result<String, LlmError> {
        debug!(model = %self.model, messages = messages.len(), "requesting chat completion");
        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .header("X-Title", "HedgeFlow")
            .json(&CompletionRequest {
                model: &self.model,
                messages,
            })
            .send()
            .map_err(|e| LlmError::Request(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(LlmError::Status {
                status: status.as_u16(),
                body: body.chars().take(200).collect(),
            });
        }

        let parsed: CompletionResponse = response
            .json()
            .map_err(|e| LlmError::Request(format!("malformed completion body: {e}")))?;
        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or(LlmError::EmptyResponse)?;
        info!(model = %self.model, chars = content.len(), "chat completion received");
        Ok(content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Returns queued responses in order, then empty strings.
    struct Scripted {
        calls: AtomicU32,
        responses: Vec<Result<&'static str, &'static str>>,
    }

    impl Scripted {
        fn new(responses: Vec<Result<&'static str, &'static str>>) -> Self {
            Self {
                calls: AtomicU32::new(0),
                responses,
            }
        }
    }

    impl ChatModel for Scripted {
        fn name(&self) -> &str {
            "scripted"
        }

        fn complete(&self, _: &[ChatMessage]) -> Result<String, LlmError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) as usize;
            match self.responses.get(n) {
                Some(Ok(s)) => Ok(s.to_string()),
                Some(Err(e)) => Err(LlmError::Request(e.to_string())),
                None => Ok(String::new()),
            }
        }
    }

    #[test]
    fn empty_response_is_retried() {
        let model = RetryingChatModel::new(
            Scripted::new(vec![Ok("  "), Err("timeout"), Ok("fine")]),
            3,
            Duration::ZERO,
        );
        assert_eq!(model.complete(&[ChatMessage::user("hi")]).unwrap(), "fine");
        assert_eq!(model.inner().calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn exhaustion_reports_last_error() {
        let model = RetryingChatModel::new(
            Scripted::new(vec![Err("a"), Err("b")]),
            2,
            Duration::ZERO,
        );
        match model.complete(&[]) {
            Err(LlmError::Exhausted { attempts: 2, last }) => {
                assert!(last.to_string().contains('b'));
            }
            other => panic!("expected exhaustion, got {other:?}"),
        }
    }

    #[test]
    fn zero_attempts_still_tries_once() {
        let model = RetryingChatModel::new(Scripted::new(vec![Ok("x")]), 0, Duration::ZERO);
        assert_eq!(model.complete(&[]).unwrap(), "x");
    }

    #[test]
    fn messages_serialize_with_lowercase_roles() {
        let json = serde_json::to_string(&ChatMessage::system("be brief")).unwrap();
        assert_eq!(json, r#"{"role":"system","content":"be brief"}"#);
    }

    #[test]
    fn missing_key_is_reported() {
        let section = LlmSection {
            api_key_env: "HEDGEFLOW_TEST_KEY_THAT_IS_NEVER_SET".into(),
            ..LlmSection::default()
        };
        assert!(matches!(
            OpenRouterClient::from_config(&section, Duration::from_secs(1)),
            Err(LlmError::MissingApiKey(_))
        ));
    }
}
