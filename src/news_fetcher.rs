//! News search through the Tavily API.
//!
//! One POST per query, API key in the JSON body. Fixed query templates map
//! well-known category names to searches; unknown categories fall back to
//! `"latest {category} news"`.

use crate::error::ApiError;
use crate::http::ServiceClient;
use crate::models::Article;
use crate::utils::{configured, truncate_for_log};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info, instrument};

pub const DEFAULT_TAVILY_BASE_URL: &str = "https://api.tavily.com";

const SERVICE: &str = "tavily";

/// Categories with a canned query.
pub const KNOWN_CATEGORIES: &[(&str, &str)] = &[
    ("technology", "latest technology news and innovations"),
    ("business", "latest business and finance news"),
    ("sports", "latest sports news and updates"),
    ("health", "latest health and medical news"),
    ("science", "latest science and research news"),
    ("entertainment", "latest entertainment and celebrity news"),
    ("politics", "latest political news and updates"),
    ("world", "latest world news and international updates"),
];

pub const TRENDING_QUERY: &str = "latest breaking news and trending topics";

/// Tavily search depth.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchDepth {
    Basic,
    #[default]
    Advanced,
}

/// Parameters for [`NewsFetcher::fetch_news`].
#[derive(Debug, Clone)]
pub struct NewsQuery {
    pub query: String,
    pub category: Option<String>,
    pub max_results: usize,
    pub search_depth: SearchDepth,
    pub include_images: bool,
    pub include_answer: bool,
    pub days: u32,
}

impl NewsQuery {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            category: None,
            max_results: 5,
            search_depth: SearchDepth::Advanced,
            include_images: true,
            include_answer: true,
            days: 3,
        }
    }

    pub fn category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    pub fn max_results(mut self, n: usize) -> Self {
        self.max_results = n;
        self
    }

    pub fn depth(mut self, depth: SearchDepth) -> Self {
        self.search_depth = depth;
        self
    }

    /// Query string sent to the provider, category first.
    pub fn search_query(&self) -> String {
        match &self.category {
            Some(c) => format!("{} {}", c, self.query),
            None => self.query.clone(),
        }
    }
}

#[derive(Debug, Serialize)]
struct TavilyRequest<'a> {
    api_key: &'a str,
    query: String,
    search_depth: SearchDepth,
    include_images: bool,
    include_answer: bool,
    max_results: usize,
    days: u32,
}

#[derive(Debug, Deserialize)]
struct TavilyResponse {
    #[serde(default)]
    results: Vec<TavilyResult>,
    answer: Option<String>,
    #[serde(default)]
    images: Vec<TavilyImage>,
}

#[derive(Debug, Deserialize)]
struct TavilyResult {
    title: Option<String>,
    #[serde(default)]
    url: String,
    #[serde(default)]
    content: String,
    #[serde(default)]
    score: f64,
    published_date: Option<String>,
    raw_content: Option<String>,
}

/// Tavily returns images either as bare URLs or as `{url, description}`.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum TavilyImage {
    Url(String),
    Described { url: String },
}

impl TavilyImage {
    fn into_url(self) -> String {
        match self {
            TavilyImage::Url(u) | TavilyImage::Described { url: u } => u,
        }
    }
}

/// Canned query for a category name, case-insensitive.
pub fn category_query(category: &str) -> String {
    let key = category.trim().to_lowercase();
    KNOWN_CATEGORIES
        .iter()
        .find(|(name, _)| *name == key)
        .map(|(_, q)| q.to_string())
        .unwrap_or_else(|| format!("latest {category} news"))
}

/// Search client for recent news.
#[derive(Debug, Clone)]
pub struct NewsFetcher {
    service: ServiceClient,
    api_key: Option<String>,
    base_url: String,
}

impl NewsFetcher {
    pub fn new(service: ServiceClient, api_key: Option<&str>, base_url: impl Into<String>) -> Self {
        let api_key = configured(api_key);
        if api_key.is_none() {
            tracing::warn!("Tavily API key not set; news search will fail");
        }
        Self {
            service,
            api_key,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// Search for articles. An error means the call failed; an empty list
    /// means the provider found nothing.
    #[instrument(level = "info", skip_all, fields(query = %query.search_query()))]
    pub async fn fetch_news(&self, query: &NewsQuery) -> Result<Vec<Article>, ApiError> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| ApiError::not_configured(SERVICE, "TAVILY_API_KEY"))?;

        let url = format!("{}/search", self.base_url);
        let make_request = || {
            self.service
                .http()
                .post(&url)
                .timeout(Duration::from_secs(30))
                .json(&TavilyRequest {
                    api_key,
                    query: query.search_query(),
                    search_depth: query.search_depth,
                    include_images: query.include_images,
                    include_answer: query.include_answer,
                    max_results: query.max_results,
                    days: query.days,
                })
        };

        let response = self
            .service
            .send_with_retry("tavily.search", make_request)
            .await?;
        let body: TavilyResponse = self.service.json(response).await?;

        if query.include_answer {
            if let Some(answer) = &body.answer {
                debug!(answer = %truncate_for_log(answer, 100), "provider answer");
            }
        }

        let mut images = body.images.into_iter().map(TavilyImage::into_url);
        let articles: Vec<Article> = body
            .results
            .into_iter()
            .map(|r| Article {
                title: r
                    .title
                    .filter(|t| !t.trim().is_empty())
                    .unwrap_or_else(|| "Untitled".to_string()),
                url: r.url,
                content: r.content,
                published_date: r.published_date.filter(|d| !d.is_empty()),
                score: r.score,
                raw_content: r.raw_content,
                image: if query.include_images {
                    images.next()
                } else {
                    None
                },
            })
            .collect();

        info!(count = articles.len(), "fetched news articles");
        Ok(articles)
    }

    /// Latest news for a category.
    pub async fn fetch_news_by_category(
        &self,
        category: &str,
        max_results: usize,
    ) -> Result<Vec<Article>, ApiError> {
        let query = NewsQuery::new(category_query(category))
            .category(category)
            .max_results(max_results);
        self.fetch_news(&query).await
    }

    /// Breaking news across all categories.
    pub async fn fetch_trending_news(&self, max_results: usize) -> Result<Vec<Article>, ApiError> {
        let query = NewsQuery::new(TRENDING_QUERY)
            .max_results(max_results)
            .depth(SearchDepth::Advanced);
        self.fetch_news(&query).await
    }
}
