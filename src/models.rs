//! Data models passed between pipeline stages.
//!
//! - [`Article`]: a search hit from the news API, never mutated downstream
//! - [`ImageAsset`]: a stock photo with its size-keyed source URLs
//! - [`EnhancedContent`]: publishable HTML produced by the LLM
//! - [`PublishedPost`], [`TweetResult`]: terminal artifacts returned by WordPress and X
//! - [`PublishedArticle`], [`CategoryReport`], [`RunReport`]: what a run produced

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A news article as returned by the search API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Article {
    pub title: String,
    pub url: String,
    /// Raw text snippet from the search provider.
    pub content: String,
    pub published_date: Option<String>,
    pub score: f64,
    pub raw_content: Option<String>,
    /// Image URL the search provider returned alongside the result, if any.
    pub image: Option<String>,
}

/// Source URLs of a stock photo keyed by rendition.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ImageSources {
    pub original: Option<String>,
    pub large2x: Option<String>,
    pub large: Option<String>,
    pub medium: Option<String>,
    pub small: Option<String>,
    pub portrait: Option<String>,
    pub landscape: Option<String>,
    pub tiny: Option<String>,
}

impl ImageSources {
    /// The rendition used for featured images, falling back to larger or
    /// smaller sizes when the provider omitted it.
    pub fn best(&self) -> Option<&str> {
        [
            &self.large,
            &self.large2x,
            &self.original,
            &self.medium,
            &self.landscape,
            &self.small,
        ]
        .into_iter()
        .find_map(|s| s.as_deref())
    }
}

/// A stock photo chosen for an article.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageAsset {
    pub id: u64,
    pub photographer: Option<String>,
    pub photographer_url: Option<String>,
    pub src: ImageSources,
    pub width: Option<u32>,
    pub height: Option<u32>,
    /// Photo page on the provider's site.
    pub url: Option<String>,
    pub alt: String,
}

impl ImageAsset {
    /// Caption crediting the photographer, when known.
    pub fn credit(&self) -> Option<String> {
        self.photographer
            .as_ref()
            .map(|p| format!("Photo by {p} on Pexels"))
    }
}

/// Long-form HTML produced from an [`Article`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnhancedContent {
    pub title: String,
    pub html_content: String,
    pub category: Option<String>,
    pub source_url: String,
    pub image_url: Option<String>,
}

/// WordPress media attachment id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MediaId(pub u64);

impl fmt::Display for MediaId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A category or tag in WordPress.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaxonomyTerm {
    pub id: u64,
    #[serde(default)]
    pub name: String,
}

/// WordPress post status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PostStatus {
    Draft,
    #[default]
    Publish,
    Private,
    Pending,
}

impl PostStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PostStatus::Draft => "draft",
            PostStatus::Publish => "publish",
            PostStatus::Private => "private",
            PostStatus::Pending => "pending",
        }
    }
}

impl fmt::Display for PostStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PostStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "draft" => Ok(PostStatus::Draft),
            "publish" | "published" => Ok(PostStatus::Publish),
            "private" => Ok(PostStatus::Private),
            "pending" => Ok(PostStatus::Pending),
            other => Err(format!(
                "unknown post status '{other}' (expected draft, publish, private or pending)"
            )),
        }
    }
}

/// A post WordPress accepted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PublishedPost {
    pub id: u64,
    pub url: String,
    pub title: String,
    pub status: PostStatus,
    pub date: Option<String>,
}

/// A tweet X accepted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TweetResult {
    pub id: String,
    pub text: String,
    pub url: String,
}

/// Outcome of pushing one article or blog post through the pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PublishedArticle {
    pub post: PublishedPost,
    pub media_id: Option<MediaId>,
    pub category_id: Option<u64>,
    pub tag_ids: Vec<u64>,
    pub tweet: Option<TweetResult>,
}

/// Per-category summary of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryReport {
    pub category: String,
    pub fetched: usize,
    pub published: Vec<PublishedArticle>,
    /// Articles skipped after a critical failure.
    pub failed: usize,
}

/// Everything a single bot invocation produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    pub label: String,
    pub started_at: String,
    pub finished_at: String,
    pub categories: Vec<CategoryReport>,
}

impl RunReport {
    pub fn total_published(&self) -> usize {
        self.categories.iter().map(|c| c.published.len()).sum()
    }
}

/// Read-side view of a post, used by the chat assistant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PostSummary {
    pub id: u64,
    pub title: String,
    pub link: String,
    pub status: String,
    pub date: Option<String>,
}

/// Public information from the WordPress REST index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SiteInfo {
    pub name: String,
    pub description: String,
    pub url: String,
}
