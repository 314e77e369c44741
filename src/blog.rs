//! Themed blog posts written by the LLM, plus a small Markdown to HTML
//! converter for publishing them.

use crate::error::ApiError;
use crate::llm::{AskAsync, ask_prompt};
use crate::utils::{strip_quotes, truncate_for_log};
use itertools::Itertools;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument, warn};

static H3: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?m)^### (.*)$").unwrap());
static H2: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?m)^## (.*)$").unwrap());
static H1: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?m)^# (.*)$").unwrap());
static BOLD: Lazy<Regex> = Lazy::new(|| Regex::new(r"\*\*(.+?)\*\*").unwrap());
static ITALIC: Lazy<Regex> = Lazy::new(|| Regex::new(r"\*(.+?)\*").unwrap());
static BLANK_LINES: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n[ \t]*\n").unwrap());

/// A blog subject with suggested keywords.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Theme {
    pub key: &'static str,
    pub description: &'static str,
    pub keywords: &'static [&'static str],
}

pub const THEMES: &[Theme] = &[
    Theme {
        key: "travel",
        description: "Travel, tourism, destinations, adventures",
        keywords: &["destinations", "travel tips", "adventure", "vacation", "tourist attractions", "hotels", "flights", "backpacking", "cruise", "road trip"],
    },
    Theme {
        key: "food",
        description: "Food, recipes, cooking, restaurants, cuisine",
        keywords: &["recipes", "cooking tips", "restaurants", "cuisine", "healthy eating", "desserts", "vegetarian", "baking", "street food", "meal prep"],
    },
    Theme {
        key: "technology",
        description: "Technology, gadgets, software, AI, innovation",
        keywords: &["AI", "smartphones", "apps", "software", "gadgets", "coding", "cloud computing", "cybersecurity", "blockchain", "IoT"],
    },
    Theme {
        key: "health",
        description: "Health, fitness, wellness, nutrition, mental health",
        keywords: &["fitness", "nutrition", "mental health", "yoga", "meditation", "exercise", "diet", "wellness", "sleep", "stress management"],
    },
    Theme {
        key: "lifestyle",
        description: "Lifestyle, fashion, beauty, home decor, personal development",
        keywords: &["fashion", "beauty", "home decor", "productivity", "minimalism", "self-care", "hobbies", "organization", "skincare", "DIY"],
    },
    Theme {
        key: "business",
        description: "Business, entrepreneurship, marketing, finance",
        keywords: &["entrepreneurship", "marketing", "finance", "startups", "leadership", "productivity", "sales", "investing", "e-commerce", "branding"],
    },
    Theme {
        key: "education",
        description: "Education, learning, study tips, online courses",
        keywords: &["study tips", "online learning", "education technology", "teaching", "student life", "career development", "skills", "certifications", "e-learning", "scholarships"],
    },
    Theme {
        key: "entertainment",
        description: "Entertainment, movies, music, gaming, celebrity",
        keywords: &["movies", "music", "gaming", "celebrities", "TV shows", "streaming", "concerts", "books", "podcasts", "reviews"],
    },
    Theme {
        key: "sports",
        description: "Sports, fitness, athletics, competitions",
        keywords: &["football", "basketball", "training", "athletes", "competitions", "Olympics", "sports news", "cricket", "tennis", "fitness"],
    },
    Theme {
        key: "parenting",
        description: "Parenting, kids, family, child development",
        keywords: &["parenting tips", "child development", "family activities", "pregnancy", "baby care", "education", "behavior", "health", "toys", "teenagers"],
    },
];

/// Look up a built-in theme by key, case-insensitive.
pub fn find_theme(key: &str) -> Option<&'static Theme> {
    let key = key.trim();
    THEMES.iter().find(|t| t.key.eq_ignore_ascii_case(key))
}

fn theme_description(theme: &str) -> &str {
    find_theme(theme).map(|t| t.description).unwrap_or(theme)
}

/// A generated post, body in Markdown.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlogPost {
    pub title: String,
    pub content: String,
    pub excerpt: String,
    pub tags: Vec<String>,
    pub theme: String,
    pub keywords: Vec<String>,
    pub word_count: usize,
}

/// Split a comma-separated model answer into at most eight tags.
pub fn parse_tags(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(strip_quotes)
        .filter(|t| !t.is_empty())
        .unique_by(|t| t.to_lowercase())
        .take(8)
        .collect()
}

fn fallback_tags(theme: &str, keywords: &[String]) -> Vec<String> {
    std::iter::once(theme.to_string())
        .chain(keywords.iter().take(5).cloned())
        .collect()
}

fn inline(text: &str) -> String {
    let bold = BOLD.replace_all(text, "<strong>${1}</strong>");
    ITALIC.replace_all(&bold, "<em>${1}</em>").into_owned()
}

fn list_item(line: &str) -> Option<&str> {
    line.trim_start()
        .strip_prefix("- ")
        .or_else(|| line.trim_start().strip_prefix("* "))
}

/// Minimal Markdown to HTML: headings (`#` to `###`), `**bold**`, `*italic*`,
/// bullet lists and blank-line separated paragraphs.
pub fn markdown_to_html(markdown: &str) -> String {
    let normalized = markdown.replace("\r\n", "\n");
    let mut html = String::new();

    for block in BLANK_LINES.split(&normalized) {
        let block = block.trim_matches('\n');
        if block.trim().is_empty() {
            continue;
        }

        let lines: Vec<&str> = block.lines().filter(|l| !l.trim().is_empty()).collect();
        if lines.iter().all(|l| list_item(l).is_some()) {
            html.push_str("<ul>\n");
            for item in lines.iter().filter_map(|l| list_item(l)) {
                html.push_str(&format!("<li>{}</li>\n", inline(item.trim())));
            }
            html.push_str("</ul>\n");
            continue;
        }

        let converted = H3.replace_all(block, "<h3>${1}</h3>");
        let converted = H2.replace_all(&converted, "<h2>${1}</h2>");
        let converted = H1.replace_all(&converted, "<h1>${1}</h1>");
        let converted = inline(&converted);
        if converted.starts_with("<h") {
            html.push_str(&converted);
        } else {
            html.push_str(&format!("<p>{converted}</p>"));
        }
        html.push('\n');
    }
    html
}

/// Writes themed posts with the LLM.
#[derive(Debug)]
pub struct BlogGenerator<L> {
    llm: Arc<L>,
}

impl<L> Clone for BlogGenerator<L> {
    fn clone(&self) -> Self {
        Self {
            llm: Arc::clone(&self.llm),
        }
    }
}

impl<L> BlogGenerator<L>
where
    L: AskAsync<Response = String>,
{
    pub fn new(llm: Arc<L>) -> Self {
        Self { llm }
    }

    pub fn themes(&self) -> &'static [Theme] {
        THEMES
    }

    /// A catchy title under 60 characters.
    pub async fn generate_blog_title(&self, theme: &str, keywords: &[String]) -> Result<String, ApiError> {
        let focus = if keywords.is_empty() {
            String::new()
        } else {
            format!("Focus on these keywords: {}\n", keywords.join(", "))
        };
        let prompt = format!(
            "Generate a catchy, SEO-friendly blog post title about {}.

{focus}
Requirements:
- Make it engaging and click-worthy
- Keep it under 60 characters for SEO
- Professional and informative tone
- Include numbers if relevant (e.g., \"10 Tips...\", \"5 Ways...\")

Return ONLY the title, nothing else.",
            theme_description(theme)
        );
        let title = strip_quotes(&ask_prompt(self.llm.as_ref(), &prompt).await?);
        if title.is_empty() {
            return Err(ApiError::malformed("gemini", "model returned empty title"));
        }
        info!(title = %title, "blog title generated");
        Ok(title)
    }

    /// Write a full post. A title is generated when `title` is `None`.
    #[instrument(level = "info", skip(self, keywords))]
    pub async fn generate_blog_content(
        &self,
        theme: &str,
        keywords: &[String],
        title: Option<&str>,
        word_count: usize,
    ) -> Result<BlogPost, ApiError> {
        let title = match title.map(str::trim).filter(|t| !t.is_empty()) {
            Some(t) => t.to_string(),
            None => self.generate_blog_title(theme, keywords).await?,
        };

        let focus = if keywords.is_empty() {
            String::new()
        } else {
            format!("**Focus Keywords:** {}\n", keywords.join(", "))
        };
        let prompt = format!(
            "Write a comprehensive, high-quality blog post with the following specifications:

**Title:** {title}
**Theme:** {description}
{focus}**Target Word Count:** {word_count} words

Requirements:
1. Write engaging, informative content that provides real value
2. Use a conversational yet professional tone
3. Include proper structure with introduction, body, and conclusion
4. Add subheadings (use ## for H2, ### for H3)
5. Use bullet points or numbered lists where appropriate
6. Make it SEO-friendly with natural keyword integration
7. Include practical tips, examples, or insights
8. Write in markdown format

Return ONLY the blog content in markdown format, starting with ## Introduction
DO NOT include the main title (it will be added separately).",
            description = theme_description(theme),
        );
        let content = ask_prompt(self.llm.as_ref(), &prompt).await?.trim().to_string();
        if content.is_empty() {
            return Err(ApiError::malformed("gemini", "model returned empty blog body"));
        }

        let head: String = content.chars().take(500).collect();
        let excerpt_prompt = format!(
            "Create a compelling 2-3 sentence excerpt/summary for this blog post:

Title: {title}
Content: {head}...

Make it engaging and encourage readers to read more.
Return ONLY the excerpt, nothing else."
        );
        let excerpt = strip_quotes(&ask_prompt(self.llm.as_ref(), &excerpt_prompt).await?);

        let tags = self.generate_tags(theme, keywords, &content).await;
        let word_count = content.split_whitespace().count();
        info!(words = word_count, tags = tags.len(), "blog content generated");

        Ok(BlogPost {
            title,
            content,
            excerpt,
            tags,
            theme: theme.to_string(),
            keywords: keywords.to_vec(),
            word_count,
        })
    }

    /// Five to eight tags. Falls back to the theme and first five keywords
    /// when the model call fails.
    pub async fn generate_tags(&self, theme: &str, keywords: &[String], content: &str) -> Vec<String> {
        let head: String = content.chars().take(300).collect();
        let prompt = format!(
            "Based on this blog post content and theme, generate 5-8 relevant tags/categories.

Theme: {theme}
Content: {head}...

Return ONLY a comma-separated list of tags, nothing else.
Example: technology, AI, innovation, future, gadgets"
        );
        match ask_prompt(self.llm.as_ref(), &prompt).await {
            Ok(raw) => {
                let tags = parse_tags(&raw);
                if tags.is_empty() {
                    fallback_tags(theme, keywords)
                } else {
                    tags
                }
            }
            Err(e) => {
                warn!(error = %e, "tag generation failed; using theme and keywords");
                fallback_tags(theme, keywords)
            }
        }
    }

    /// Generate `count` posts with fresh titles; failures are logged and skipped.
    pub async fn generate_multiple_blogs(
        &self,
        theme: &str,
        count: usize,
        keywords: &[String],
        word_count: usize,
    ) -> Vec<BlogPost> {
        let mut blogs = Vec::with_capacity(count);
        for i in 1..=count {
            info!(index = i, count, "generating blog");
            let title = match self.generate_blog_title(theme, keywords).await {
                Ok(t) => t,
                Err(e) => {
                    warn!(index = i, error = %e, "title generation failed");
                    continue;
                }
            };
            match self
                .generate_blog_content(theme, keywords, Some(title.as_str()), word_count)
                .await
            {
                Ok(blog) => {
                    info!(index = i, title = %truncate_for_log(&blog.title, 50), "blog generated");
                    blogs.push(blog);
                }
                Err(e) => warn!(index = i, error = %e, "blog generation failed"),
            }
        }
        info!(generated = blogs.len(), count, "blog batch finished");
        blogs
    }
}
