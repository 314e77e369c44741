//! # wp_news_bot
//!
//! Automated news publishing for WordPress: search recent news, find a stock
//! photo, rewrite the story with an LLM, publish it with media and taxonomy,
//! and announce it on X.
//!
//! ## Architecture
//!
//! Each external service is a thin client over a shared [`http::ServiceClient`]
//! (rate limiting, retry, status mapping):
//!
//! 1. [`news_fetcher::NewsFetcher`]: Tavily search
//! 2. [`image_fetcher::ImageFetcher`]: Pexels photos with query fallbacks
//! 3. [`content_enhancer::ContentEnhancer`]: Gemini rewriting, excerpts, tweets
//! 4. [`wordpress::WordPressPublisher`]: media, categories, tags, posts
//! 5. [`twitter::TwitterPoster`]: OAuth 1.0a signed tweets with images
//!
//! [`pipeline::NewsBot`] runs articles through those clients step by step.
//! [`blog::BlogGenerator`] and [`chat::ChatAssistant`] reuse the same
//! clients for themed blog posts and a conversational WordPress helper.

pub mod blog;
pub mod chat;
pub mod config;
pub mod content_enhancer;
pub mod error;
pub mod http;
pub mod image_fetcher;
pub mod llm;
pub mod models;
pub mod news_fetcher;
pub mod pipeline;
pub mod report;
pub mod session;
pub mod twitter;
pub mod utils;
pub mod wordpress;
