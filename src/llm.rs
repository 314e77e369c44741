//! LLM access with exponential backoff retry logic.
//!
//! # Architecture
//!
//! - [`AskAsync`]: core trait for sending a conversation to a model
//! - [`GeminiClient`]: Gemini through its OpenAI-compatible chat-completions endpoint
//! - [`RetryAsk`]: decorator that retries any [`AskAsync`] on transient failures
//!
//! The rest of the crate talks to [`Llm`], which is `RetryAsk<GeminiClient>`.

use crate::error::ApiError;
use crate::http::{RateLimit, RetryPolicy, ServiceClient};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, instrument, warn};

pub const DEFAULT_GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta/openai";
pub const DEFAULT_GEMINI_MODEL: &str = "gemini-2.0-flash";

const SERVICE: &str = "gemini";

/// Speaker of a [`ChatMessage`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// One turn of a conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
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

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Trait for async LLM interaction.
///
/// Implementors send a conversation to a model and return its reply. The
/// abstraction lets decorators such as [`RetryAsk`] and test doubles stand
/// in for the real client.
pub trait AskAsync {
    /// The type of response returned by the LLM.
    type Response;

    /// Send the conversation and receive the model's reply.
    async fn ask(&self, messages: &[ChatMessage]) -> Result<Self::Response, ApiError>;
}

/// Send a single user prompt.
pub async fn ask_prompt<L>(llm: &L, prompt: &str) -> Result<String, ApiError>
where
    L: AskAsync<Response = String>,
{
    llm.ask(&[ChatMessage::user(prompt)]).await
}

/// Wrapper that adds exponential backoff retry logic to any [`AskAsync`] implementation.
///
/// Only transient failures (transport, 429, 5xx) are retried; credential and
/// shape errors are returned immediately.
#[derive(Clone)]
pub struct RetryAsk<T> {
    inner: T,
    policy: RetryPolicy,
}

impl<T> RetryAsk<T>
where
    T: AskAsync,
{
    pub fn new(inner: T, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }

    pub fn inner(&self) -> &T {
        &self.inner
    }
}

impl<T> fmt::Debug for RetryAsk<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryAsk")
            .field("max_retries", &self.policy.max_retries)
            .field("base_delay", &self.policy.base_delay)
            .field("max_delay", &self.policy.max_delay)
            .finish()
    }
}

impl<T> AskAsync for RetryAsk<T>
where
    T: AskAsync + fmt::Debug,
{
    type Response = T::Response;

    #[instrument(level = "info", skip_all)]
    async fn ask(&self, messages: &[ChatMessage]) -> Result<Self::Response, ApiError> {
        let total_t0 = Instant::now();
        let mut attempt = 0usize;

        loop {
            match self.inner.ask(messages).await {
                Ok(resp) => {
                    debug!(
                        attempt,
                        elapsed_ms_total = total_t0.elapsed().as_millis(),
                        "ask() succeeded"
                    );
                    return Ok(resp);
                }
                Err(e) => {
                    attempt += 1;
                    if let Err(e) = self.policy.pause_or_give_up("llm.ask", attempt, e).await {
                        error!(
                            attempt,
                            elapsed_ms_total = total_t0.elapsed().as_millis(),
                            error = %e,
                            "ask() failed"
                        );
                        return Err(e);
                    }
                }
            }
        }
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

/// Gemini through the OpenAI-compatible chat-completions API.
#[derive(Clone)]
pub struct GeminiClient {
    service: ServiceClient,
    api_key: Option<String>,
    base_url: String,
    model: String,
}

impl fmt::Debug for GeminiClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GeminiClient")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("configured", &self.api_key.is_some())
            .finish()
    }
}

impl GeminiClient {
    pub fn new(
        http: reqwest::Client,
        api_key: Option<String>,
        base_url: impl Into<String>,
        model: impl Into<String>,
        limit: RateLimit,
    ) -> Self {
        if api_key.is_none() {
            warn!("Gemini API key not set; content generation will fail");
        }
        Self {
            service: ServiceClient::new(SERVICE, http, limit, RetryPolicy::none()),
            api_key,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
        }
    }

    pub fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }
}

impl AskAsync for GeminiClient {
    type Response = String;

    #[instrument(level = "info", skip_all, fields(model = %self.model, turns = messages.len()))]
    async fn ask(&self, messages: &[ChatMessage]) -> Result<String, ApiError> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| ApiError::not_configured(SERVICE, "GEMINI_API_KEY"))?;

        let t0 = Instant::now();
        let request = self
            .service
            .http()
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(api_key)
            .timeout(Duration::from_secs(120))
            .json(&ChatRequest {
                model: &self.model,
                messages,
            });

        let response = match self.service.send(request).await {
            Ok(r) => r,
            Err(e) => {
                warn!(elapsed_ms = t0.elapsed().as_millis(), error = %e, "API call failed");
                return Err(e);
            }
        };
        let body: ChatResponse = self.service.json(response).await?;
        let content = body
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty())
            .ok_or_else(|| ApiError::malformed(SERVICE, "response had no message content"))?;

        info!(
            elapsed_ms = t0.elapsed().as_millis(),
            chars = content.len(),
            "model replied"
        );
        Ok(content)
    }
}

/// The production model stack.
pub type Llm = RetryAsk<GeminiClient>;

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Replays canned replies in order and records every prompt it saw.
    #[derive(Debug, Default)]
    pub struct ScriptedLlm {
        replies: Mutex<VecDeque<Result<String, ApiError>>>,
        pub prompts: Mutex<Vec<Vec<ChatMessage>>>,
    }

    impl ScriptedLlm {
        pub fn new(replies: Vec<Result<String, ApiError>>) -> Self {
            Self {
                replies: Mutex::new(replies.into()),
                prompts: Mutex::new(Vec::new()),
            }
        }

        pub fn replying(replies: &[&str]) -> Self {
            Self::new(replies.iter().map(|r| Ok(r.to_string())).collect())
        }

        pub fn last_prompt(&self) -> String {
            self.prompts
                .lock()
                .unwrap()
                .last()
                .and_then(|m| m.last())
                .map(|m| m.content.clone())
                .unwrap_or_default()
        }

        pub fn calls(&self) -> usize {
            self.prompts.lock().unwrap().len()
        }
    }

    impl AskAsync for ScriptedLlm {
        type Response = String;

        async fn ask(&self, messages: &[ChatMessage]) -> Result<String, ApiError> {
            self.prompts.lock().unwrap().push(messages.to_vec());
            self.replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(ApiError::malformed("scripted", "no reply left")))
        }
    }
}
