//! The fetch, enhance and publish pipeline.
//!
//! [`NewsBot`] runs every article through a fixed sequence of [`Step`]s. Each
//! step is either critical or best-effort according to a [`StepPolicy`]:
//!
//! ```text
//! fetch_image -> enhance_content -> generate_excerpt -> upload_image
//!     -> resolve_category -> resolve_tags -> create_post -> post_tweet
//! ```
//!
//! A best-effort failure is logged and the article continues with degraded
//! data. A critical failure ends the article with a [`PipelineError`]; what
//! happens to the rest of the run is decided by [`CriticalFailureMode`].

use crate::blog::{BlogGenerator, BlogPost, markdown_to_html};
use crate::content_enhancer::{ContentEnhancer, TWEET_MAX_CHARS, generate_html_with_image};
use crate::error::{ApiError, PipelineError};
use crate::image_fetcher::ImageFetcher;
use crate::llm::{AskAsync, Llm};
use crate::models::{Article, CategoryReport, ImageAsset, MediaId, PostStatus, PublishedArticle, TweetResult};
use crate::news_fetcher::NewsFetcher;
use crate::twitter::TwitterPoster;
use crate::utils::{title_case, truncate_for_log, truncate_with_ellipsis};
use crate::wordpress::{NewPost, WordPressPublisher};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{error, info, instrument, warn};

/// Characters of raw article text used when no excerpt could be generated.
const FALLBACK_EXCERPT_CHARS: usize = 200;

/// Words asked for when summarising an article into an excerpt.
const EXCERPT_WORDS: usize = 50;

/// Category label used for trending runs.
pub const TRENDING_CATEGORY: &str = "Trending";

/// One stage of article processing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Step {
    FetchImage,
    EnhanceContent,
    GenerateExcerpt,
    UploadImage,
    ResolveCategory,
    ResolveTags,
    CreatePost,
    PostTweet,
}

impl Step {
    pub const ALL: [Step; 8] = [
        Step::FetchImage,
        Step::EnhanceContent,
        Step::GenerateExcerpt,
        Step::UploadImage,
        Step::ResolveCategory,
        Step::ResolveTags,
        Step::CreatePost,
        Step::PostTweet,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Step::FetchImage => "fetch_image",
            Step::EnhanceContent => "enhance_content",
            Step::GenerateExcerpt => "generate_excerpt",
            Step::UploadImage => "upload_image",
            Step::ResolveCategory => "resolve_category",
            Step::ResolveTags => "resolve_tags",
            Step::CreatePost => "create_post",
            Step::PostTweet => "post_tweet",
        }
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Criticality {
    /// Failure ends processing of the article.
    Critical,
    /// Failure is logged and the article continues without the step's output.
    BestEffort,
}

/// Per-step criticality. Content enhancement and post creation are
/// critical by default, everything else is best-effort.
///
/// `create_post` is always critical: there is nothing to continue with
/// without a post.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StepPolicy {
    overrides: HashMap<Step, Criticality>,
}

impl StepPolicy {
    pub fn default_criticality(step: Step) -> Criticality {
        match step {
            Step::EnhanceContent | Step::CreatePost => Criticality::Critical,
            _ => Criticality::BestEffort,
        }
    }

    pub fn with(mut self, step: Step, criticality: Criticality) -> Self {
        self.overrides.insert(step, criticality);
        self
    }

    pub fn criticality(&self, step: Step) -> Criticality {
        if step == Step::CreatePost {
            return Criticality::Critical;
        }
        self.overrides
            .get(&step)
            .copied()
            .unwrap_or_else(|| Self::default_criticality(step))
    }

    /// Apply the policy to a step's outcome: `Ok(Some)` on success,
    /// `Ok(None)` for a tolerated failure, `Err` for a critical one.
    pub fn settle<T>(&self, step: Step, result: Result<T, ApiError>) -> Result<Option<T>, PipelineError> {
        match result {
            Ok(v) => Ok(Some(v)),
            Err(source) => match self.criticality(step) {
                Criticality::Critical => {
                    error!(%step, error = %source, "critical step failed");
                    Err(PipelineError { step, source })
                }
                Criticality::BestEffort => {
                    warn!(%step, error = %source, "step failed; continuing without it");
                    Ok(None)
                }
            },
        }
    }
}

/// What a run does after an article fails a critical step.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CriticalFailureMode {
    /// Stop the whole run, including remaining categories.
    #[default]
    AbortRun,
    /// Log, count the article as failed, and move on.
    SkipArticle,
}

/// Sleeps between items to stay friendly with the upstream APIs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pacing {
    pub between_articles: Duration,
    pub between_categories: Duration,
}

impl Default for Pacing {
    fn default() -> Self {
        Self {
            between_articles: Duration::from_secs(5),
            between_categories: Duration::from_secs(10),
        }
    }
}

impl Pacing {
    pub fn none() -> Self {
        Self {
            between_articles: Duration::ZERO,
            between_categories: Duration::ZERO,
        }
    }
}

async fn pause(delay: Duration, what: &str) {
    if delay.is_zero() {
        return;
    }
    info!(?delay, "waiting before next {what}");
    sleep(delay).await;
}

/// Excerpt used when summarisation fails: the first 200 characters.
pub fn fallback_excerpt(content: &str) -> String {
    let content = content.trim();
    if content.chars().count() > FALLBACK_EXCERPT_CHARS {
        let head: String = content.chars().take(FALLBACK_EXCERPT_CHARS).collect();
        format!("{head}...")
    } else {
        content.to_string()
    }
}

/// Everything needed to publish a finished piece.
struct Draft<'a> {
    title: &'a str,
    html: &'a str,
    excerpt: &'a str,
    image: Option<&'a ImageAsset>,
    category: Option<&'a str>,
    tags: &'a [String],
    /// Text the tweet is written from.
    summary: &'a str,
    status: PostStatus,
}

/// Orchestrates the external clients for news and blog runs.
pub struct NewsBot<L = Llm>
where
    L: AskAsync<Response = String>,
{
    news: NewsFetcher,
    images: ImageFetcher,
    enhancer: ContentEnhancer<L>,
    wordpress: WordPressPublisher,
    twitter: Option<TwitterPoster>,
    policy: StepPolicy,
    on_critical: CriticalFailureMode,
    pacing: Pacing,
}

impl<L> fmt::Debug for NewsBot<L>
where
    L: AskAsync<Response = String>,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NewsBot")
            .field("wordpress", &self.wordpress.base_url())
            .field("twitter", &self.twitter.is_some())
            .field("policy", &self.policy)
            .field("on_critical", &self.on_critical)
            .field("pacing", &self.pacing)
            .finish()
    }
}

impl<L> NewsBot<L>
where
    L: AskAsync<Response = String>,
{
    pub fn new(
        news: NewsFetcher,
        images: ImageFetcher,
        enhancer: ContentEnhancer<L>,
        wordpress: WordPressPublisher,
        twitter: Option<TwitterPoster>,
    ) -> Self {
        match &twitter {
            Some(_) => info!("Twitter posting enabled"),
            None => info!("Twitter posting disabled"),
        }
        Self {
            news,
            images,
            enhancer,
            wordpress,
            twitter,
            policy: StepPolicy::default(),
            on_critical: CriticalFailureMode::default(),
            pacing: Pacing::default(),
        }
    }

    pub fn with_policy(mut self, policy: StepPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_failure_mode(mut self, mode: CriticalFailureMode) -> Self {
        self.on_critical = mode;
        self
    }

    pub fn with_pacing(mut self, pacing: Pacing) -> Self {
        self.pacing = pacing;
        self
    }

    pub fn wordpress(&self) -> &WordPressPublisher {
        &self.wordpress
    }

    pub fn twitter(&self) -> Option<&TwitterPoster> {
        self.twitter.as_ref()
    }

    /// Run one article through every step.
    #[instrument(level = "info", skip_all, fields(title = %truncate_for_log(&article.title, 60)))]
    pub async fn process_news_article(
        &self,
        article: &Article,
        category: Option<&str>,
        status: PostStatus,
    ) -> Result<PublishedArticle, PipelineError> {
        let title = article.title.as_str();

        let image = self
            .policy
            .settle(
                Step::FetchImage,
                self.images
                    .get_image_for_news(title, category, Some(article.content.as_str()))
                    .await,
            )?
            .flatten();
        let image_url = image.as_ref().and_then(|i| i.src.best());
        match &image {
            Some(img) => info!(photographer = ?img.photographer, "image found"),
            None => warn!("no image; continuing without one"),
        }

        let enhanced = self.policy.settle(
            Step::EnhanceContent,
            self.enhancer
                .enhance_news_content(title, &article.content, &article.url, category, image_url)
                .await,
        )?;
        let html = match enhanced {
            Some(e) => e.html_content,
            None => generate_html_with_image(
                title,
                &format!("<p>{}</p>", article.content),
                image.as_ref(),
                Some(article.url.as_str()),
                category,
            ),
        };

        let excerpt = self
            .policy
            .settle(
                Step::GenerateExcerpt,
                self.enhancer
                    .summarize_content(&article.content, EXCERPT_WORDS)
                    .await,
            )?
            .unwrap_or_else(|| fallback_excerpt(&article.content));

        self.publish_draft(Draft {
            title,
            html: &html,
            excerpt: &excerpt,
            image: image.as_ref(),
            category,
            tags: &[],
            summary: &article.content,
            status,
        })
        .await
    }

    /// Upload, resolve taxonomy, create the post and announce it.
    async fn publish_draft(&self, draft: Draft<'_>) -> Result<PublishedArticle, PipelineError> {
        let image_url = draft.image.and_then(|i| i.src.best());

        let mut media_id: Option<MediaId> = None;
        if let Some(url) = image_url {
            let credit = draft.image.and_then(ImageAsset::credit);
            media_id = self.policy.settle(
                Step::UploadImage,
                self.wordpress
                    .upload_media(url, Some(draft.title), Some(draft.title), credit.as_deref())
                    .await,
            )?;
        }

        let mut category_id = None;
        if let Some(name) = draft.category {
            category_id = self.policy.settle(
                Step::ResolveCategory,
                self.wordpress.get_or_create_category(name).await,
            )?;
        }

        let mut tag_ids = Vec::with_capacity(draft.tags.len());
        for tag in draft.tags {
            if let Some(id) = self
                .policy
                .settle(Step::ResolveTags, self.wordpress.get_or_create_tag(tag).await)?
            {
                tag_ids.push(id);
            }
        }

        let categories: Vec<u64> = category_id.into_iter().collect();
        let new_post = NewPost {
            title: draft.title,
            content: draft.html,
            status: draft.status,
            excerpt: Some(draft.excerpt).filter(|e| !e.is_empty()),
            categories: &categories,
            tags: &tag_ids,
            featured_media: media_id,
        };
        let post = self
            .wordpress
            .create_post(&new_post)
            .await
            .map_err(|source| {
                error!(error = %source, "post creation failed");
                PipelineError {
                    step: Step::CreatePost,
                    source,
                }
            })?;
        info!(id = post.id, url = %post.url, status = %post.status, "post created");

        let tweet = match &self.twitter {
            Some(twitter) => {
                let result = self.announce(twitter, draft.title, draft.summary, &post.url, image_url).await;
                self.policy.settle(Step::PostTweet, result)?
            }
            None => None,
        };
        if let Some(t) = &tweet {
            info!(id = %t.id, url = %t.url, "tweet posted");
        }

        Ok(PublishedArticle {
            post,
            media_id,
            category_id,
            tag_ids,
            tweet,
        })
    }

    async fn announce(
        &self,
        twitter: &TwitterPoster,
        title: &str,
        summary: &str,
        post_url: &str,
        image_url: Option<&str>,
    ) -> Result<TweetResult, ApiError> {
        let text = self
            .enhancer
            .generate_tweet(title, summary, Some(post_url), TWEET_MAX_CHARS)
            .await?;
        match image_url {
            Some(url) => twitter.post_tweet_with_image(&text, url).await,
            None => twitter.post_tweet(&text, &[], None).await,
        }
    }

    async fn run_articles(
        &self,
        label: &str,
        category: Option<&str>,
        articles: Vec<Article>,
        status: PostStatus,
    ) -> Result<CategoryReport, PipelineError> {
        let total = articles.len();
        let mut report = CategoryReport {
            category: label.to_string(),
            fetched: total,
            published: Vec::new(),
            failed: 0,
        };

        for (idx, article) in articles.iter().enumerate() {
            info!(index = idx + 1, total, "processing article");
            match self.process_news_article(article, category, status).await {
                Ok(published) => report.published.push(published),
                Err(e) => match self.on_critical {
                    CriticalFailureMode::AbortRun => {
                        error!(error = %e, "aborting run after critical failure");
                        return Err(e);
                    }
                    CriticalFailureMode::SkipArticle => {
                        error!(error = %e, "skipping article after critical failure");
                        report.failed += 1;
                    }
                },
            }
            if idx + 1 < total {
                pause(self.pacing.between_articles, "article").await;
            }
        }

        info!(
            category = label,
            fetched = report.fetched,
            created = report.published.len(),
            failed = report.failed,
            "category summary"
        );
        Ok(report)
    }

    /// Fetch and publish up to `max_articles` for one category. A failed
    /// search is logged and treated as an empty category.
    #[instrument(level = "info", skip(self))]
    pub async fn run_single_category(
        &self,
        category: &str,
        max_articles: usize,
        status: PostStatus,
    ) -> Result<CategoryReport, PipelineError> {
        let articles = match self.news.fetch_news_by_category(category, max_articles).await {
            Ok(a) => a,
            Err(e) => {
                error!(error = %e, "news search failed");
                Vec::new()
            }
        };
        if articles.is_empty() {
            warn!("no articles found");
        }
        self.run_articles(category, Some(category), articles, status)
            .await
    }

    /// Each category in turn, pausing between them.
    #[instrument(level = "info", skip(self, categories), fields(categories = categories.len()))]
    pub async fn run_multiple_categories(
        &self,
        categories: &[String],
        articles_per_category: usize,
        status: PostStatus,
    ) -> Result<Vec<CategoryReport>, PipelineError> {
        info!(
            categories = %categories.join(", "),
            articles_per_category,
            "starting multi-category run"
        );
        let mut reports = Vec::with_capacity(categories.len());
        for (idx, category) in categories.iter().enumerate() {
            info!(index = idx + 1, total = categories.len(), category = %category, "category");
            reports.push(
                self.run_single_category(category, articles_per_category, status)
                    .await?,
            );
            if idx + 1 < categories.len() {
                pause(self.pacing.between_categories, "category").await;
            }
        }

        let total: usize = reports.iter().map(|r| r.published.len()).sum();
        info!(categories = reports.len(), posts = total, "final summary");
        for r in &reports {
            info!(category = %r.category, posts = r.published.len(), "category total");
        }
        Ok(reports)
    }

    /// Breaking news, filed under the "Trending" category.
    #[instrument(level = "info", skip(self))]
    pub async fn run_trending_news(
        &self,
        max_articles: usize,
        status: PostStatus,
    ) -> Result<CategoryReport, PipelineError> {
        let articles = match self.news.fetch_trending_news(max_articles).await {
            Ok(a) => a,
            Err(e) => {
                error!(error = %e, "trending search failed");
                Vec::new()
            }
        };
        if articles.is_empty() {
            warn!("no trending articles found");
        }
        self.run_articles(TRENDING_CATEGORY, Some(TRENDING_CATEGORY), articles, status)
            .await
    }

    /// Publish a generated blog post under its theme with its tags.
    #[instrument(level = "info", skip_all, fields(title = %truncate_for_log(&blog.title, 60)))]
    pub async fn publish_blog(
        &self,
        blog: &BlogPost,
        image: Option<&ImageAsset>,
        status: PostStatus,
    ) -> Result<PublishedArticle, PipelineError> {
        let html = markdown_to_html(&blog.content);
        let category = title_case(&blog.theme);
        let excerpt = if blog.excerpt.is_empty() {
            fallback_excerpt(&blog.content)
        } else {
            blog.excerpt.clone()
        };
        let summary = truncate_with_ellipsis(&excerpt, 200);
        self.publish_draft(Draft {
            title: &blog.title,
            html: &html,
            excerpt: &excerpt,
            image,
            category: Some(category.as_str()),
            tags: &blog.tags,
            summary: &summary,
            status,
        })
        .await
    }

    /// Featured image for a generated post, settled under the `fetch_image` policy.
    pub async fn blog_image(
        &self,
        blog: &BlogPost,
        theme: &str,
        with_image: bool,
    ) -> Result<Option<ImageAsset>, PipelineError> {
        if !with_image {
            return Ok(None);
        }
        let found = self
            .images
            .get_image_for_news(&blog.title, Some(theme), None)
            .await;
        Ok(self.policy.settle(Step::FetchImage, found)?.flatten())
    }

    /// Generate `count` posts for a theme and publish each one.
    #[allow(clippy::too_many_arguments)]
    #[instrument(level = "info", skip(self, generator, keywords))]
    pub async fn run_blog_batch(
        &self,
        generator: &BlogGenerator<L>,
        theme: &str,
        count: usize,
        keywords: &[String],
        word_count: usize,
        status: PostStatus,
        with_image: bool,
    ) -> Result<CategoryReport, PipelineError> {
        let blogs = generator
            .generate_multiple_blogs(theme, count, keywords, word_count)
            .await;
        let mut report = CategoryReport {
            category: theme.to_string(),
            fetched: blogs.len(),
            published: Vec::new(),
            failed: count.saturating_sub(blogs.len()),
        };

        for (idx, blog) in blogs.iter().enumerate() {
            let outcome = match self.blog_image(blog, theme, with_image).await {
                Ok(image) => self.publish_blog(blog, image.as_ref(), status).await,
                Err(e) => Err(e),
            };
            match outcome {
                Ok(p) => report.published.push(p),
                Err(e) => match self.on_critical {
                    CriticalFailureMode::AbortRun => return Err(e),
                    CriticalFailureMode::SkipArticle => {
                        error!(error = %e, "skipping blog post after critical failure");
                        report.failed += 1;
                    }
                },
            }
            if idx + 1 < blogs.len() {
                pause(self.pacing.between_articles, "blog post").await;
            }
        }
        info!(
            theme,
            generated = report.fetched,
            published = report.published.len(),
            "blog batch summary"
        );
        Ok(report)
    }
}
