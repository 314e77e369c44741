//! Text and file system helpers shared across the pipeline.
//!
//! - String truncation for logs and character-limited outputs
//! - Slugs and keyword extraction for file names and image queries
//! - Markdown code fence stripping for LLM output
//! - HTML-to-text for rendered WordPress fields
//! - Output directory validation

use itertools::Itertools;
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::Html;
use std::error::Error;
use std::fs as stdfs;
use tokio::fs;
use tracing::{info, instrument};

static NON_SLUG_CHARS: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^\w\s-]").unwrap());
static SLUG_SEPARATORS: Lazy<Regex> = Lazy::new(|| Regex::new(r"[-\s]+").unwrap());

const STOP_WORDS: &[&str] = &[
    "the", "a", "an", "and", "or", "but", "in", "on", "at", "to", "for", "of", "with", "by",
];

/// Truncate a string for logging purposes.
///
/// Long strings are cut to `max` characters with `"…(+N bytes)"` appended.
///
/// # Examples
///
/// ```ignore
/// assert_eq!(truncate_for_log("short", 100), "short");
/// ```
pub fn truncate_for_log(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        None => s.to_string(),
        Some((cut, _)) => format!("{}…(+{} bytes)", &s[..cut], s.len() - cut),
    }
}

/// Keep at most `max` characters, replacing the tail with `"..."` when cut.
///
/// The result never exceeds `max` characters.
pub fn truncate_with_ellipsis(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    if max < 3 {
        return s.chars().take(max).collect();
    }
    let kept: String = s.chars().take(max - 3).collect();
    format!("{kept}...")
}

/// Lowercase slug safe for file names: punctuation dropped, runs of spaces
/// and hyphens collapsed into one hyphen, at most `max_len` characters.
///
/// ```ignore
/// assert_eq!(slugify("AI: The Next Wave!", 50), "ai-the-next-wave");
/// ```
pub fn slugify(title: &str, max_len: usize) -> String {
    let lowered = title.to_lowercase();
    let cleaned = NON_SLUG_CHARS.replace_all(&lowered, "");
    let joined = SLUG_SEPARATORS.replace_all(cleaned.trim(), "-");
    joined.chars().take(max_len).collect()
}

/// Pick up to `limit` search keywords from a headline: lowercase words
/// longer than three characters that are not stop words.
pub fn extract_keywords(title: &str, limit: usize) -> Vec<String> {
    title
        .to_lowercase()
        .split_whitespace()
        .filter(|w| !STOP_WORDS.contains(w) && w.chars().count() > 3)
        .take(limit)
        .map(str::to_string)
        .collect()
}

/// Join keywords into a single query string.
pub fn keywords_query(keywords: &[String]) -> String {
    keywords.iter().join(" ")
}

/// Remove a Markdown code fence wrapper (```` ```html ```` or ```` ``` ````)
/// that models sometimes put around their output.
pub fn strip_code_fences(raw: &str) -> String {
    let mut text = raw.trim();
    if let Some(rest) = text.strip_prefix("```html") {
        text = rest;
    } else if let Some(rest) = text.strip_prefix("```") {
        text = rest;
    }
    if let Some(rest) = text.strip_suffix("```") {
        text = rest;
    }
    text.trim().to_string()
}

/// Trim whitespace and one layer of surrounding quotes from a model answer.
pub fn strip_quotes(raw: &str) -> String {
    raw.trim().trim_matches('"').trim_matches('\'').trim().to_string()
}

/// Plain text of an HTML fragment with entities decoded.
///
/// WordPress returns `title.rendered` and term names HTML-escaped
/// (`Science &amp; Tech`).
pub fn html_to_text(fragment: &str) -> String {
    if !fragment.contains('<') && !fragment.contains('&') {
        return fragment.trim().to_string();
    }
    let doc = Html::parse_fragment(fragment);
    let text = doc.root_element().text().collect::<String>();
    text.split_whitespace().join(" ")
}

/// Treat unset, empty, or template values (`your_xxx_here`) as missing.
pub fn configured(value: Option<&str>) -> Option<String> {
    let v = value?.trim().trim_matches('"').trim();
    if v.is_empty() || (v.starts_with("your_") && v.ends_with("_here")) {
        None
    } else {
        Some(v.to_string())
    }
}

/// Capitalize the first character of every word ("world news" → "World News").
/// The rest of each word is kept as given, so "AI tools" stays "AI Tools".
pub fn title_case(s: &str) -> String {
    s.split_whitespace()
        .map(|w| {
            let mut c = w.chars();
            match c.next() {
                None => String::new(),
                Some(f) => f.to_uppercase().collect::<String>() + c.as_str(),
            }
        })
        .join(" ")
}

/// Ensure a directory exists and is writable.
///
/// Creates the directory if needed, then writes and deletes a probe file.
#[instrument(level = "info", skip_all, fields(path = %path))]
pub async fn ensure_writable_dir(path: &str) -> Result<(), Box<dyn Error>> {
    fs::create_dir_all(path).await?;
    // Try a small sync write using std fs (simpler error surface)
    let probe_path = format!("{}/..__probe_write__", path.trim_end_matches('/'));
    stdfs::File::create(&probe_path)?;
    let _ = stdfs::remove_file(&probe_path);
    info!("Output directory is writable");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_for_log_short_string() {
        assert_eq!(truncate_for_log("Hello, world!", 100), "Hello, world!");
    }

    #[test]
    fn test_truncate_for_log_long_string() {
        let s = "a".repeat(500);
        let result = truncate_for_log(&s, 100);
        assert!(result.starts_with(&"a".repeat(100)));
        assert!(result.contains("…(+400 bytes)"));
    }

    #[test]
    fn test_truncate_for_log_multibyte_boundary() {
        let s = "é".repeat(10);
        let result = truncate_for_log(&s, 3);
        assert!(result.starts_with("ééé…"));
    }

    #[test]
    fn test_truncate_with_ellipsis() {
        assert_eq!(truncate_with_ellipsis("short", 10), "short");
        assert_eq!(truncate_with_ellipsis("abcdefghij", 8), "abcde...");
        assert_eq!(truncate_with_ellipsis("abcdefghij", 8).chars().count(), 8);
        assert_eq!(truncate_with_ellipsis("abcdef", 2), "ab");
    }

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("Hello World", 50), "hello-world");
        assert_eq!(slugify("AI: The Next  Wave!", 50), "ai-the-next-wave");
        assert_eq!(slugify("multi -- dash", 50), "multi-dash");
        assert_eq!(slugify(&"x".repeat(80), 50).len(), 50);
    }

    #[test]
    fn test_extract_keywords_drops_stop_words_and_short_words() {
        let kw = extract_keywords("Breaking: New AI Technology Revolutionizes Healthcare", 3);
        assert_eq!(kw, vec!["breaking:", "technology", "revolutionizes"]);

        let kw = extract_keywords("The cat and the dog", 3);
        assert!(kw.is_empty());
    }

    #[test]
    fn test_strip_code_fences() {
        assert_eq!(strip_code_fences("```html\n<p>x</p>\n```"), "<p>x</p>");
        assert_eq!(strip_code_fences("```\n<p>x</p>\n```"), "<p>x</p>");
        assert_eq!(strip_code_fences("  <p>x</p>  "), "<p>x</p>");
    }

    #[test]
    fn test_strip_quotes() {
        assert_eq!(strip_quotes("  \"Big News\" "), "Big News");
        assert_eq!(strip_quotes("'Title'"), "Title");
    }

    #[test]
    fn test_html_to_text_decodes_entities() {
        assert_eq!(html_to_text("Science &amp; Tech"), "Science & Tech");
        assert_eq!(html_to_text("<em>Hello</em>  world"), "Hello world");
        assert_eq!(html_to_text("plain"), "plain");
    }

    #[test]
    fn test_configured_rejects_placeholders() {
        assert_eq!(configured(None), None);
        assert_eq!(configured(Some("  ")), None);
        assert_eq!(configured(Some("your_tavily_api_key_here")), None);
        assert_eq!(configured(Some("\"abc\"")), Some("abc".to_string()));
    }

    #[test]
    fn test_title_case() {
        assert_eq!(title_case("world news"), "World News");
        assert_eq!(title_case("TRAVEL"), "TRAVEL");
        assert_eq!(title_case("AI tools"), "AI Tools");
        assert_eq!(title_case("  eSports  news "), "ESports News");
    }

    #[tokio::test]
    async fn test_ensure_writable_dir_creates_directory() {
        let tmp = tempfile::tempdir().unwrap();
        let nested = tmp.path().join("a/b");
        let path = nested.to_str().unwrap();
        ensure_writable_dir(path).await.unwrap();
        assert!(nested.is_dir());
    }
}
