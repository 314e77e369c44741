//! Shared HTTP plumbing for the external API clients.
//!
//! - [`ServiceClient`]: one per external service; owns the reqwest client, a
//!   token bucket and a retry policy, and maps HTTP status codes to [`ApiError`]
//! - [`RetryPolicy`]: exponential backoff with jitter for idempotent calls
//! - [`TokenBucket`]: async rate limiter that waits for a token instead of failing

use crate::error::ApiError;
use rand::{Rng, rng};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::{Instant, sleep};
use tracing::{debug, error, warn};

pub const USER_AGENT: &str = "WordPress-News-Bot/1.0";

/// Build the reqwest client every service shares.
pub fn build_client(timeout: Duration) -> Result<Client, ApiError> {
    Client::builder()
        .timeout(timeout)
        .user_agent(USER_AGENT)
        .build()
        .map_err(|e| ApiError::transport("http", e))
}

/// Retry settings for idempotent requests.
///
/// The delay before retry `n` (1-based) is
/// ```text
/// min(base_delay * 2^(n-1), max_delay) + random_jitter(0..=250ms)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    pub max_retries: usize,
    #[serde(with = "millis")]
    pub base_delay: Duration,
    #[serde(with = "millis")]
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    /// Backoff before retry number `attempt`, without jitter.
    pub fn backoff(&self, attempt: usize) -> Duration {
        let shift = attempt.saturating_sub(1).min(16) as u32;
        let delay = self.base_delay.saturating_mul(1u32 << shift);
        delay.min(self.max_delay)
    }

    fn backoff_with_jitter(&self, attempt: usize) -> Duration {
        if self.base_delay.is_zero() {
            return Duration::ZERO;
        }
        let jitter_ms: u64 = rng().random_range(0..=250);
        self.backoff(attempt) + Duration::from_millis(jitter_ms)
    }

    /// Wait before the next attempt, or hand the error back when it is
    /// permanent or retries are exhausted.
    pub async fn pause_or_give_up(
        &self,
        op: &str,
        attempt: usize,
        err: ApiError,
    ) -> Result<(), ApiError> {
        if !err.is_transient() || attempt > self.max_retries {
            if err.is_transient() {
                error!(op, attempt, max = self.max_retries, error = %err, "exhausted retries");
            }
            return Err(err);
        }
        let delay = match &err {
            ApiError::RateLimited {
                retry_after: Some(after),
                ..
            } => (*after).min(self.max_delay),
            _ => self.backoff_with_jitter(attempt),
        };
        warn!(op, attempt, max = self.max_retries, ?delay, error = %err, "attempt failed; backing off");
        sleep(delay).await;
        Ok(())
    }
}

mod millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(d)?))
    }
}

/// Per-service request budget: `burst` tokens, refilled at `per_second`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RateLimit {
    pub burst: f64,
    pub per_second: f64,
}

impl RateLimit {
    pub const fn new(burst: f64, per_second: f64) -> Self {
        Self { burst, per_second }
    }
}

#[derive(Debug)]
struct BucketState {
    tokens: f64,
    last_refill: Instant,
}

/// Token bucket rate limiter. [`TokenBucket::acquire`] sleeps until a token
/// is available.
#[derive(Debug)]
pub struct TokenBucket {
    state: Mutex<BucketState>,
    max_tokens: f64,
    refill_rate: f64, // tokens per second
}

impl TokenBucket {
    pub fn new(max_tokens: f64, refill_rate: f64) -> Self {
        let max_tokens = max_tokens.max(1.0);
        Self {
            state: Mutex::new(BucketState {
                tokens: max_tokens,
                last_refill: Instant::now(),
            }),
            max_tokens,
            refill_rate,
        }
    }

    pub fn from_limit(limit: RateLimit) -> Self {
        Self::new(limit.burst, limit.per_second)
    }

    fn refill(&self, state: &mut BucketState) {
        let now = Instant::now();
        let elapsed = now.duration_since(state.last_refill).as_secs_f64();
        state.tokens = (state.tokens + elapsed * self.refill_rate).min(self.max_tokens);
        state.last_refill = now;
    }

    /// Try to consume a token without waiting.
    pub async fn try_consume(&self) -> bool {
        let mut state = self.state.lock().await;
        self.refill(&mut state);
        if state.tokens >= 1.0 {
            state.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    /// Consume a token, sleeping until one is available.
    pub async fn acquire(&self) {
        loop {
            let wait = {
                let mut state = self.state.lock().await;
                self.refill(&mut state);
                if state.tokens >= 1.0 {
                    state.tokens -= 1.0;
                    return;
                }
                if self.refill_rate <= 0.0 {
                    // Never refills; treat as unlimited instead of hanging forever.
                    return;
                }
                Duration::from_secs_f64((1.0 - state.tokens) / self.refill_rate)
            };
            debug!(?wait, "rate limited; waiting for token");
            sleep(wait).await;
        }
    }
}

/// A downloaded file.
#[derive(Debug, Clone)]
pub struct Download {
    pub bytes: Vec<u8>,
    pub content_type: Option<String>,
}

/// HTTP access to one external service.
#[derive(Debug, Clone)]
pub struct ServiceClient {
    name: &'static str,
    http: Client,
    limiter: Arc<TokenBucket>,
    retry: RetryPolicy,
}

impl ServiceClient {
    pub fn new(name: &'static str, http: Client, limit: RateLimit, retry: RetryPolicy) -> Self {
        Self {
            name,
            http,
            limiter: Arc::new(TokenBucket::from_limit(limit)),
            retry,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn http(&self) -> &Client {
        &self.http
    }

    /// Send once. Used for calls that must not be repeated (creates, uploads).
    pub async fn send(&self, request: RequestBuilder) -> Result<Response, ApiError> {
        self.limiter.acquire().await;
        let response = request
            .send()
            .await
            .map_err(|e| ApiError::transport(self.name, e))?;
        check_status(self.name, response).await
    }

    /// Send an idempotent request, rebuilding it for each retry.
    pub async fn send_with_retry<F>(&self, op: &str, make: F) -> Result<Response, ApiError>
    where
        F: Fn() -> RequestBuilder,
    {
        let mut attempt = 0usize;
        loop {
            match self.send(make()).await {
                Ok(resp) => return Ok(resp),
                Err(e) => {
                    attempt += 1;
                    self.retry.pause_or_give_up(op, attempt, e).await?;
                }
            }
        }
    }

    /// GET a binary resource (with retry), returning its bytes and the
    /// `Content-Type` header.
    pub async fn download(&self, op: &str, url: &str) -> Result<Download, ApiError> {
        let response = self
            .send_with_retry(op, || self.http.get(url).timeout(Duration::from_secs(30)))
            .await?;
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.split(';').next().unwrap_or(v).trim().to_string())
            .filter(|v| !v.is_empty());
        let bytes = response
            .bytes()
            .await
            .map_err(|e| ApiError::transport(self.name, e))?;
        debug!(op, bytes = bytes.len(), ?content_type, "downloaded");
        Ok(Download {
            bytes: bytes.to_vec(),
            content_type,
        })
    }

    pub async fn json<T: DeserializeOwned>(&self, response: Response) -> Result<T, ApiError> {
        response
            .json::<T>()
            .await
            .map_err(|e| ApiError::transport(self.name, e))
    }
}

/// Map non-2xx responses to typed errors, passing successful ones through.
pub async fn check_status(service: &'static str, response: Response) -> Result<Response, ApiError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let url = response.url().to_string();
    let retry_after = response
        .headers()
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(Duration::from_secs);
    let body = response.text().await.unwrap_or_default();
    let body = crate::utils::truncate_for_log(&body, 300);

    Err(match status {
        StatusCode::UNAUTHORIZED => ApiError::Unauthorized { service, body },
        StatusCode::FORBIDDEN => ApiError::Forbidden { service, body },
        StatusCode::NOT_FOUND => ApiError::NotFound { service, url },
        StatusCode::TOO_MANY_REQUESTS => ApiError::RateLimited {
            service,
            retry_after,
        },
        other => ApiError::Status {
            service,
            status: other.as_u16(),
            body,
        },
    })
}
