//! LLM-backed rewriting: long-form HTML, excerpts, SEO titles and tweets.

use crate::error::ApiError;
use crate::llm::{AskAsync, ask_prompt};
use crate::models::{EnhancedContent, ImageAsset};
use crate::utils::{strip_code_fences, strip_quotes, truncate_for_log, truncate_with_ellipsis};
use std::sync::Arc;
use tracing::{info, instrument, warn};

/// Hard length limit of a tweet.
pub const TWEET_MAX_CHARS: usize = 280;

/// Characters reserved for a link; X shortens every URL to 23 plus a space.
const URL_RESERVE: usize = 24;

const TWEET_SEPARATOR: &str = "\n\n";

/// Rewrites search results into publishable content.
#[derive(Debug)]
pub struct ContentEnhancer<L> {
    llm: Arc<L>,
}

impl<L> Clone for ContentEnhancer<L> {
    fn clone(&self) -> Self {
        Self {
            llm: Arc::clone(&self.llm),
        }
    }
}

impl<L> ContentEnhancer<L>
where
    L: AskAsync<Response = String>,
{
    pub fn new(llm: Arc<L>) -> Self {
        Self { llm }
    }

    /// Expand an article summary into a 300–500 word HTML article.
    #[instrument(level = "info", skip_all, fields(title = %truncate_for_log(title, 50)))]
    pub async fn enhance_news_content(
        &self,
        title: &str,
        original_content: &str,
        url: &str,
        category: Option<&str>,
        image_url: Option<&str>,
    ) -> Result<EnhancedContent, ApiError> {
        let prompt = format!(
            "You are a professional news content writer. I will provide you with a news article \
summary, and you need to:

1. Expand the content into a comprehensive, well-written article (300-500 words)
2. Maintain factual accuracy - DO NOT add false information
3. Make it engaging and professional
4. Structure it with proper paragraphs
5. Generate clean, semantic HTML format suitable for WordPress
6. Include the featured image at the top with proper attribution
7. Add a \"Read more at source\" link at the bottom

News Details:
- Title: {title}
- Category: {category}
- Original Content: {original_content}
- Source URL: {url}
- Featured Image URL: {image}

Generate a complete HTML article with:
- Featured image (if available) with alt text and caption
- Well-structured paragraphs
- Proper HTML formatting (h2, p, strong, em tags where appropriate)
- Source attribution at the end
- Professional styling classes

Return ONLY the HTML content without any markdown code blocks or explanations.",
            category = category.unwrap_or("General"),
            image = image_url.unwrap_or("No image available"),
        );

        let raw = ask_prompt(self.llm.as_ref(), &prompt).await?;
        let html_content = strip_code_fences(&raw);
        if html_content.is_empty() {
            return Err(ApiError::malformed("gemini", "model returned empty article"));
        }
        info!(chars = html_content.len(), "content enhanced");

        Ok(EnhancedContent {
            title: title.to_string(),
            html_content,
            category: category.map(str::to_string),
            source_url: url.to_string(),
            image_url: image_url.map(str::to_string),
        })
    }

    /// Summary of at most `max_words` words, used as the post excerpt.
    pub async fn summarize_content(&self, content: &str, max_words: usize) -> Result<String, ApiError> {
        let prompt = format!(
            "Summarize the following content in {max_words} words or less. \
Make it concise and informative:\n\n{content}"
        );
        let summary = ask_prompt(self.llm.as_ref(), &prompt).await?.trim().to_string();
        if summary.is_empty() {
            return Err(ApiError::malformed("gemini", "model returned empty summary"));
        }
        info!(words = summary.split_whitespace().count(), "content summarized");
        Ok(summary)
    }

    /// Catchy title under 60 characters, quotes stripped.
    pub async fn generate_seo_title(&self, title: &str) -> Result<String, ApiError> {
        let prompt = format!(
            "Create an SEO-optimized, engaging title for this news article.\n\
Make it catchy but professional, and keep it under 60 characters:\n\n\
Original title: {title}\n\nReturn ONLY the new title, nothing else."
        );
        let seo_title = strip_quotes(&ask_prompt(self.llm.as_ref(), &prompt).await?);
        if seo_title.is_empty() {
            return Err(ApiError::malformed("gemini", "model returned empty title"));
        }
        info!(seo_title = %seo_title, "SEO title generated");
        Ok(seo_title)
    }

    /// Tweet text announcing an article.
    ///
    /// # Arguments
    ///
    /// * `title` - Article headline
    /// * `content` - Body; only the first 200 characters reach the prompt
    /// * `url` - Link appended after a blank line, never cut off
    /// * `max_chars` - Hard limit for the whole tweet
    ///
    /// # Returns
    ///
    /// Text of at most `max_chars` characters, or an error when the model
    /// fails or answers with nothing.
    #[instrument(level = "info", skip_all, fields(title = %truncate_for_log(title, 50)))]
    pub async fn generate_tweet(
        &self,
        title: &str,
        content: &str,
        url: Option<&str>,
        max_chars: usize,
    ) -> Result<String, ApiError> {
        let available = if url.is_some() {
            max_chars.saturating_sub(URL_RESERVE)
        } else {
            max_chars
        };
        let summary: String = content.chars().take(200).collect();
        let url_rule = if url.is_some() {
            "- DO NOT include the URL, it will be added automatically\n"
        } else {
            ""
        };
        let prompt = format!(
            "Create an engaging, attention-grabbing tweet about this news article.

Requirements:
- Maximum {available} characters (STRICT LIMIT)
- Include relevant hashtags (1-2 only)
- Make it compelling and shareable
- Professional tone
- Include emoji if appropriate (1-2 maximum)
{url_rule}
Article Title: {title}
Article Summary: {summary}

Return ONLY the tweet text, nothing else. Make sure it's under {available} characters!"
        );

        let text = strip_quotes(&ask_prompt(self.llm.as_ref(), &prompt).await?);
        if text.is_empty() {
            return Err(ApiError::malformed("gemini", "model returned empty tweet"));
        }
        let tweet = fit_tweet(&text, url, max_chars);
        info!(chars = tweet.chars().count(), preview = %truncate_for_log(&tweet, 100), "tweet generated");
        Ok(tweet)
    }
}

/// Fit model text and an optional link into `max_chars` characters.
///
/// The text is cut first (with `"..."`) so the link always survives; a link
/// longer than the limit on its own is hard-truncated.
pub fn fit_tweet(text: &str, url: Option<&str>, max_chars: usize) -> String {
    let text = text.trim();
    let Some(url) = url else {
        return truncate_with_ellipsis(text, max_chars);
    };

    let url_len = url.chars().count();
    if url_len > max_chars {
        warn!(url_len, max_chars, "link alone exceeds tweet limit; truncating");
        return url.chars().take(max_chars).collect();
    }
    if text.is_empty() {
        return url.to_string();
    }

    let text = truncate_with_ellipsis(text, max_chars.saturating_sub(URL_RESERVE));
    let tweet = format!("{text}{TWEET_SEPARATOR}{url}");
    if tweet.chars().count() <= max_chars {
        return tweet;
    }

    let budget = max_chars.saturating_sub(url_len + TWEET_SEPARATOR.len());
    if budget == 0 {
        return url.to_string();
    }
    warn!(chars = tweet.chars().count(), "tweet too long; trimming text");
    format!(
        "{}{TWEET_SEPARATOR}{url}",
        truncate_with_ellipsis(&text, budget)
    )
}

fn escape_attr(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('"', "&quot;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

/// Deterministic article layout for callers that already have body HTML:
/// featured image with credit, category badge, body, source link.
pub fn generate_html_with_image(
    title: &str,
    content: &str,
    image: Option<&ImageAsset>,
    source_url: Option<&str>,
    category: Option<&str>,
) -> String {
    let mut parts: Vec<String> = Vec::new();

    if let Some(src) = image.and_then(|img| img.src.best().map(|s| (img, s))) {
        let (img, src) = src;
        let alt = if img.alt.is_empty() { title } else { img.alt.as_str() };
        parts.push(r#"<div class="featured-image" style="margin-bottom: 20px;">"#.to_string());
        parts.push(format!(
            r#"<img src="{}" alt="{}" style="width: 100%; height: auto; max-height: 500px; object-fit: cover; border-radius: 8px;" />"#,
            escape_attr(src),
            escape_attr(alt)
        ));
        if let Some(photographer) = &img.photographer {
            let who = match &img.photographer_url {
                Some(link) => format!(
                    r#"<a href="{}" target="_blank" rel="noopener">{photographer}</a>"#,
                    escape_attr(link)
                ),
                None => photographer.clone(),
            };
            parts.push(format!(
                r#"<p class="image-credit" style="font-size: 12px; color: #666; margin-top: 8px;">Photo by {who} on Pexels</p>"#
            ));
        }
        parts.push("</div>".to_string());
    }

    if let Some(category) = category {
        parts.push(format!(
            r#"<p class="category-badge" style="display: inline-block; background: #0073aa; color: white; padding: 4px 12px; border-radius: 4px; font-size: 12px; font-weight: bold; margin-bottom: 15px;">{}</p>"#,
            category.to_uppercase()
        ));
    }

    parts.push(format!(r#"<div class="article-content">{content}</div>"#));

    if let Some(source) = source_url {
        parts.push(format!(
            r#"<div class="source-attribution" style="margin-top: 30px; padding-top: 20px; border-top: 1px solid #ddd;"><p style="font-size: 14px; color: #666;"><strong>Source:</strong> <a href="{}" target="_blank" rel="noopener nofollow">Read the original article</a></p></div>"#,
            escape_attr(source)
        ));
    }

    parts.join("\n")
}
