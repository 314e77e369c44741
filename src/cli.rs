//! Command-line interface definitions for the news bot.
//!
//! Every credential can be passed as a flag or an environment variable;
//! a `.env` file in the working directory is loaded before parsing.

use clap::{Parser, Subcommand};
use wp_news_bot::config::Settings;
use wp_news_bot::models::PostStatus;

/// Command-line arguments for the WordPress news bot.
///
/// # Examples
///
/// ```sh
/// # Interactive menu
/// wp_news_bot
///
/// # Three technology stories as drafts
/// wp_news_bot category technology -n 3 --status draft
///
/// # Two blog posts about travel, with a JSON run report
/// wp_news_bot --report-dir ./reports blog travel -n 2 -k "budget,backpacking"
/// ```
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    /// Optional path to a YAML config file
    #[arg(short, long, env = "BOT_CONFIG")]
    pub config: Option<String>,

    /// Directory for JSON run reports
    #[arg(long, env = "REPORT_DIR")]
    pub report_dir: Option<String>,

    /// Do not tweet, even with X credentials configured
    #[arg(long)]
    pub no_twitter: bool,

    /// WordPress site root, e.g. https://blog.example.com
    #[arg(long, env = "WORDPRESS_BASE_URL", default_value = "")]
    pub wordpress_base_url: String,

    /// WordPress bearer token
    #[arg(long, env = "BEARER_TOKEN", hide_env_values = true)]
    pub bearer_token: Option<String>,

    /// Gemini API key
    #[arg(long, env = "GEMINI_API_KEY", hide_env_values = true)]
    pub gemini_api_key: Option<String>,

    /// Gemini OpenAI-compatible endpoint
    #[arg(long, env = "GEMINI_BASE_URL")]
    pub gemini_base_url: Option<String>,

    /// Gemini model name
    #[arg(long, env = "GEMINI_MODEL")]
    pub gemini_model: Option<String>,

    /// Tavily API key
    #[arg(long, env = "TAVILY_API_KEY", hide_env_values = true)]
    pub tavily_api_key: Option<String>,

    #[arg(long, env = "TAVILY_BASE_URL")]
    pub tavily_base_url: Option<String>,

    /// Pexels API key
    #[arg(long, env = "PEXELS_API_KEY", hide_env_values = true)]
    pub pexels_api_key: Option<String>,

    #[arg(long, env = "PEXELS_BASE_URL")]
    pub pexels_base_url: Option<String>,

    #[arg(long, env = "X_CONSUMER_KEY", hide_env_values = true)]
    pub x_consumer_key: Option<String>,

    #[arg(long, env = "X_CONSUMER_SECRET", hide_env_values = true)]
    pub x_consumer_secret: Option<String>,

    #[arg(long, env = "X_ACCESS_TOKEN", hide_env_values = true)]
    pub x_access_token: Option<String>,

    #[arg(long, env = "X_ACCESS_TOKEN_SECRET", hide_env_values = true)]
    pub x_access_token_secret: Option<String>,

    #[arg(long, env = "X_API_BASE_URL")]
    pub x_api_base_url: Option<String>,

    #[arg(long, env = "X_UPLOAD_BASE_URL")]
    pub x_upload_base_url: Option<String>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
    /// Publish news from one category
    Category {
        category: String,
        /// Number of articles (1-10)
        #[arg(short = 'n', long, default_value_t = 3, value_parser = clap::value_parser!(u8).range(1..=10))]
        max_articles: u8,
        /// draft, publish, private or pending
        #[arg(short, long)]
        status: Option<PostStatus>,
    },

    /// Publish news from several categories (config defaults when none given)
    Categories {
        categories: Vec<String>,
        /// Articles per category
        #[arg(short = 'n', long)]
        per_category: Option<usize>,
        #[arg(short, long)]
        status: Option<PostStatus>,
    },

    /// Publish trending news
    Trending {
        #[arg(short = 'n', long, value_parser = clap::value_parser!(u8).range(1..=10))]
        max_articles: Option<u8>,
        #[arg(short, long)]
        status: Option<PostStatus>,
    },

    /// Generate and publish themed blog posts
    Blog {
        /// Theme key (see `themes`) or any free-form topic
        theme: String,
        /// Comma-separated keywords
        #[arg(short, long, value_delimiter = ',')]
        keywords: Vec<String>,
        /// Number of posts
        #[arg(short = 'n', long, default_value_t = 1)]
        count: usize,
        /// Target word count per post
        #[arg(short, long, default_value_t = 800)]
        words: usize,
        /// Use this title instead of generating one (single post only)
        #[arg(long)]
        title: Option<String>,
        /// Skip the featured image
        #[arg(long)]
        no_image: bool,
        #[arg(short, long)]
        status: Option<PostStatus>,
    },

    /// List built-in blog themes
    Themes,

    /// Chat with the WordPress assistant
    Chat {
        /// Resume a session id instead of starting a new one
        #[arg(long)]
        session: Option<String>,
    },

    /// Check connectivity and credentials for every service
    Verify,

    /// Interactive menu (the default)
    Menu,
}

impl Cli {
    pub fn settings(&self) -> Settings {
        Settings {
            wordpress_base_url: self.wordpress_base_url.clone(),
            bearer_token: self.bearer_token.clone(),
            gemini_api_key: self.gemini_api_key.clone(),
            gemini_base_url: self.gemini_base_url.clone(),
            gemini_model: self.gemini_model.clone(),
            tavily_api_key: self.tavily_api_key.clone(),
            tavily_base_url: self.tavily_base_url.clone(),
            pexels_api_key: self.pexels_api_key.clone(),
            pexels_base_url: self.pexels_base_url.clone(),
            x_consumer_key: self.x_consumer_key.clone(),
            x_consumer_secret: self.x_consumer_secret.clone(),
            x_access_token: self.x_access_token.clone(),
            x_access_token_secret: self.x_access_token_secret.clone(),
            x_api_base_url: self.x_api_base_url.clone(),
            x_upload_base_url: self.x_upload_base_url.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_defaults_to_menu() {
        let cli = Cli::parse_from(["wp_news_bot", "--wordpress-base-url", "https://blog.example.com"]);
        assert!(cli.command.is_none());
        assert_eq!(cli.settings().wordpress_base_url, "https://blog.example.com");
    }

    #[test]
    fn test_category_command() {
        let cli = Cli::parse_from(["wp_news_bot", "category", "technology", "-n", "2", "-s", "draft"]);
        assert_eq!(
            cli.command,
            Some(Command::Category {
                category: "technology".into(),
                max_articles: 2,
                status: Some(PostStatus::Draft),
            })
        );
    }

    #[test]
    fn test_article_count_is_bounded() {
        assert!(Cli::try_parse_from(["wp_news_bot", "category", "technology", "-n", "11"]).is_err());
        assert!(Cli::try_parse_from(["wp_news_bot", "trending", "-n", "0"]).is_err());
    }

    #[test]
    fn test_blog_keywords_are_comma_split() {
        let cli = Cli::parse_from([
            "wp_news_bot",
            "--report-dir",
            "/tmp/reports",
            "blog",
            "travel",
            "-k",
            "budget,backpacking",
            "-n",
            "2",
        ]);
        assert_eq!(cli.report_dir.as_deref(), Some("/tmp/reports"));
        match cli.command {
            Some(Command::Blog {
                theme,
                keywords,
                count,
                words,
                no_image,
                ..
            }) => {
                assert_eq!(theme, "travel");
                assert_eq!(keywords, vec!["budget", "backpacking"]);
                assert_eq!(count, 2);
                assert_eq!(words, 800);
                assert!(!no_image);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_bad_status_rejected() {
        assert!(Cli::try_parse_from(["wp_news_bot", "trending", "--status", "later"]).is_err());
    }
}
