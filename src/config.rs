//! Run configuration and client wiring.
//!
//! Two layers feed a run:
//!
//! - [`Settings`]: credentials and endpoints, normally filled from flags or
//!   environment variables (`.env` is loaded first)
//! - [`BotConfig`]: optional YAML with run defaults, pacing, step policy,
//!   rate limits and retry settings
//!
//! ```yaml
//! categories: [technology, business, sports]
//! articles_per_category: 2
//! status: draft
//! article_delay_secs: 5
//! category_delay_secs: 10
//! on_critical_failure: skip_article
//! steps:
//!   post_tweet: critical
//! retry:
//!   max_retries: 3
//!   base_delay: 1000
//!   max_delay: 30000
//! ```

use crate::blog::BlogGenerator;
use crate::chat::{ChatAssistant, ChatSession};
use crate::content_enhancer::ContentEnhancer;
use crate::error::ApiError;
use crate::http::{RateLimit, RetryPolicy, ServiceClient, build_client};
use crate::image_fetcher::{DEFAULT_PEXELS_BASE_URL, ImageFetcher};
use crate::llm::{DEFAULT_GEMINI_BASE_URL, DEFAULT_GEMINI_MODEL, GeminiClient, Llm, RetryAsk};
use crate::models::PostStatus;
use crate::news_fetcher::{DEFAULT_TAVILY_BASE_URL, NewsFetcher};
use crate::pipeline::{CriticalFailureMode, NewsBot, Pacing, StepPolicy};
use crate::session::{DEFAULT_MAX_SESSIONS, SessionStore};
use crate::twitter::{DEFAULT_X_API_BASE_URL, DEFAULT_X_UPLOAD_BASE_URL, OAuthCredentials, TwitterPoster};
use crate::utils::configured;
use crate::wordpress::WordPressPublisher;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{info, instrument, warn};

/// Categories used by a multi-category run when none are given.
pub const DEFAULT_CATEGORIES: &[&str] = &["technology", "business", "sports", "health", "science"];

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("could not parse config file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("invalid setting {field}: {reason}")]
    Invalid { field: &'static str, reason: String },

    #[error(transparent)]
    Client(#[from] ApiError),
}

/// Request budgets per external service.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimits {
    pub tavily: RateLimit,
    pub pexels: RateLimit,
    pub gemini: RateLimit,
    pub wordpress: RateLimit,
    pub x: RateLimit,
    /// Plain image downloads from photo CDNs.
    pub media: RateLimit,
}

impl Default for RateLimits {
    fn default() -> Self {
        Self {
            tavily: RateLimit::new(5.0, 1.0),
            pexels: RateLimit::new(5.0, 1.0),
            gemini: RateLimit::new(5.0, 0.25),
            wordpress: RateLimit::new(10.0, 5.0),
            x: RateLimit::new(3.0, 0.5),
            media: RateLimit::new(10.0, 5.0),
        }
    }
}

/// YAML run configuration. Every field is optional.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BotConfig {
    pub categories: Vec<String>,
    pub articles_per_category: usize,
    pub trending_articles: usize,
    pub status: PostStatus,
    pub article_delay_secs: u64,
    pub category_delay_secs: u64,
    pub on_critical_failure: CriticalFailureMode,
    pub steps: StepPolicy,
    pub rate_limits: RateLimits,
    pub retry: RetryPolicy,
    pub report_dir: Option<String>,
    pub max_sessions: u64,
    pub session_idle_minutes: u64,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            categories: DEFAULT_CATEGORIES.iter().map(|c| c.to_string()).collect(),
            articles_per_category: 2,
            trending_articles: 5,
            status: PostStatus::Publish,
            article_delay_secs: 5,
            category_delay_secs: 10,
            on_critical_failure: CriticalFailureMode::AbortRun,
            steps: StepPolicy::default(),
            rate_limits: RateLimits::default(),
            retry: RetryPolicy::default(),
            report_dir: None,
            max_sessions: DEFAULT_MAX_SESSIONS,
            session_idle_minutes: 30,
        }
    }
}

impl BotConfig {
    /// Load and validate a YAML file.
    #[instrument(level = "info")]
    pub fn load(path: &str) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_string(),
            source,
        })?;
        let config = Self::from_yaml(&raw).map_err(|e| match e {
            ConfigError::Parse { source, .. } => ConfigError::Parse {
                path: path.to_string(),
                source,
            },
            other => other,
        })?;
        info!(categories = config.categories.len(), "loaded configuration");
        Ok(config)
    }

    pub fn from_yaml(raw: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yaml::from_str(raw).map_err(|source| ConfigError::Parse {
            path: "<inline>".to_string(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.articles_per_category == 0 {
            return Err(ConfigError::Invalid {
                field: "articles_per_category",
                reason: "must be at least 1".into(),
            });
        }
        if self.trending_articles == 0 {
            return Err(ConfigError::Invalid {
                field: "trending_articles",
                reason: "must be at least 1".into(),
            });
        }
        if self.categories.iter().any(|c| c.trim().is_empty()) {
            return Err(ConfigError::Invalid {
                field: "categories",
                reason: "category names cannot be empty".into(),
            });
        }
        if self.max_sessions == 0 {
            return Err(ConfigError::Invalid {
                field: "max_sessions",
                reason: "must be at least 1".into(),
            });
        }
        let limits = &self.rate_limits;
        for (name, limit) in [
            ("tavily", limits.tavily),
            ("pexels", limits.pexels),
            ("gemini", limits.gemini),
            ("wordpress", limits.wordpress),
            ("x", limits.x),
            ("media", limits.media),
        ] {
            if limit.per_second <= 0.0 || limit.burst < 1.0 {
                return Err(ConfigError::Invalid {
                    field: "rate_limits",
                    reason: format!("{name}: burst must be >= 1 and per_second > 0"),
                });
            }
        }
        Ok(())
    }

    pub fn pacing(&self) -> Pacing {
        Pacing {
            between_articles: Duration::from_secs(self.article_delay_secs),
            between_categories: Duration::from_secs(self.category_delay_secs),
        }
    }

    pub fn session_ttl(&self) -> Duration {
        Duration::from_secs(self.session_idle_minutes.max(1) * 60)
    }
}

/// Credentials and endpoints for every external service.
#[derive(Clone, Default)]
pub struct Settings {
    pub wordpress_base_url: String,
    pub bearer_token: Option<String>,
    pub gemini_api_key: Option<String>,
    pub gemini_base_url: Option<String>,
    pub gemini_model: Option<String>,
    pub tavily_api_key: Option<String>,
    pub tavily_base_url: Option<String>,
    pub pexels_api_key: Option<String>,
    pub pexels_base_url: Option<String>,
    pub x_consumer_key: Option<String>,
    pub x_consumer_secret: Option<String>,
    pub x_access_token: Option<String>,
    pub x_access_token_secret: Option<String>,
    pub x_api_base_url: Option<String>,
    pub x_upload_base_url: Option<String>,
}

impl fmt::Debug for Settings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Settings")
            .field("wordpress_base_url", &self.wordpress_base_url)
            .field("bearer_token", &self.bearer_token.is_some())
            .field("gemini_api_key", &self.gemini_api_key.is_some())
            .field("tavily_api_key", &self.tavily_api_key.is_some())
            .field("pexels_api_key", &self.pexels_api_key.is_some())
            .field("x_consumer_key", &self.x_consumer_key.is_some())
            .finish_non_exhaustive()
    }
}

/// Builds the clients a run needs from [`Settings`] and [`BotConfig`].
#[derive(Debug, Clone)]
pub struct Wiring {
    http: Client,
    settings: Settings,
    config: BotConfig,
}

impl Wiring {
    pub fn new(settings: Settings, config: BotConfig) -> Result<Self, ConfigError> {
        let http = build_client(Duration::from_secs(30))?;
        Ok(Self {
            http,
            settings,
            config,
        })
    }

    pub fn config(&self) -> &BotConfig {
        &self.config
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn has_llm_key(&self) -> bool {
        configured(self.settings.gemini_api_key.as_deref()).is_some()
    }

    fn service(&self, name: &'static str, limit: RateLimit, retry: RetryPolicy) -> ServiceClient {
        ServiceClient::new(name, self.http.clone(), limit, retry)
    }

    fn media(&self) -> ServiceClient {
        self.service("media", self.config.rate_limits.media, self.config.retry)
    }

    pub fn news_fetcher(&self) -> NewsFetcher {
        let s = &self.settings;
        NewsFetcher::new(
            self.service("tavily", self.config.rate_limits.tavily, self.config.retry),
            s.tavily_api_key.as_deref(),
            s.tavily_base_url.as_deref().unwrap_or(DEFAULT_TAVILY_BASE_URL),
        )
    }

    pub fn image_fetcher(&self) -> ImageFetcher {
        let s = &self.settings;
        ImageFetcher::new(
            self.service("pexels", self.config.rate_limits.pexels, self.config.retry),
            s.pexels_api_key.as_deref(),
            s.pexels_base_url.as_deref().unwrap_or(DEFAULT_PEXELS_BASE_URL),
        )
    }

    pub fn llm(&self) -> Arc<Llm> {
        let s = &self.settings;
        let client = GeminiClient::new(
            self.http.clone(),
            configured(s.gemini_api_key.as_deref()),
            s.gemini_base_url.as_deref().unwrap_or(DEFAULT_GEMINI_BASE_URL),
            s.gemini_model.as_deref().unwrap_or(DEFAULT_GEMINI_MODEL),
            self.config.rate_limits.gemini,
        );
        Arc::new(RetryAsk::new(client, self.config.retry))
    }

    pub fn wordpress(&self) -> Result<WordPressPublisher, ConfigError> {
        let s = &self.settings;
        if s.wordpress_base_url.trim().is_empty() {
            return Err(ConfigError::Invalid {
                field: "WORDPRESS_BASE_URL",
                reason: "is not set".into(),
            });
        }
        // Post creation is not idempotent, so this client never retries.
        Ok(WordPressPublisher::new(
            self.service("wordpress", self.config.rate_limits.wordpress, RetryPolicy::none()),
            self.media(),
            &s.wordpress_base_url,
            s.bearer_token.as_deref(),
        )?)
    }

    /// `None` when any of the four OAuth values is missing.
    pub fn twitter(&self) -> Option<TwitterPoster> {
        let s = &self.settings;
        let Some(credentials) = OAuthCredentials::complete(
            s.x_consumer_key.as_deref(),
            s.x_consumer_secret.as_deref(),
            s.x_access_token.as_deref(),
            s.x_access_token_secret.as_deref(),
        ) else {
            warn!("X credentials incomplete; tweeting disabled");
            return None;
        };
        Some(TwitterPoster::new(
            self.service("x", self.config.rate_limits.x, RetryPolicy::none()),
            self.media(),
            credentials,
            s.x_api_base_url.as_deref().unwrap_or(DEFAULT_X_API_BASE_URL),
            s.x_upload_base_url.as_deref().unwrap_or(DEFAULT_X_UPLOAD_BASE_URL),
        ))
    }

    /// The orchestrator with every collaborator, sharing one LLM.
    pub fn news_bot(&self, llm: Arc<Llm>, with_twitter: bool) -> Result<NewsBot, ConfigError> {
        let twitter = if with_twitter { self.twitter() } else { None };
        Ok(NewsBot::new(
            self.news_fetcher(),
            self.image_fetcher(),
            ContentEnhancer::new(llm),
            self.wordpress()?,
            twitter,
        )
        .with_policy(self.config.steps.clone())
        .with_failure_mode(self.config.on_critical_failure)
        .with_pacing(self.config.pacing()))
    }

    pub fn blog_generator(&self, llm: Arc<Llm>) -> BlogGenerator<Llm> {
        BlogGenerator::new(llm)
    }

    pub fn chat_assistant(&self, llm: Option<Arc<Llm>>) -> Result<ChatAssistant<Llm>, ConfigError> {
        let sessions: SessionStore<ChatSession> =
            SessionStore::new(self.config.max_sessions, self.config.session_ttl());
        Ok(ChatAssistant::new(self.wordpress()?, llm, sessions))
    }
}
