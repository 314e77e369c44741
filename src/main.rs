//! # wp_news_bot
//!
//! Fetches recent news, rewrites it with Gemini, publishes it to WordPress
//! with a stock photo, category and excerpt, and announces each post on X.
//!
//! ## Usage
//!
//! ```sh
//! wp_news_bot                         # interactive menu
//! wp_news_bot category technology -n 3
//! wp_news_bot categories              # config defaults
//! wp_news_bot trending -n 5
//! wp_news_bot blog travel -n 2 -k budget,backpacking
//! wp_news_bot chat
//! wp_news_bot verify
//! ```
//!
//! ## Architecture
//!
//! 1. **Search**: Tavily returns recent articles for a category
//! 2. **Illustrate**: Pexels supplies a photo, falling back through broader queries
//! 3. **Rewrite**: Gemini expands the snippet into an HTML article and an excerpt
//! 4. **Publish**: WordPress receives the media, category and post
//! 5. **Announce**: X gets a tweet linking to the post
//!
//! Articles are processed one at a time with a pause in between.

use chrono::Utc;
use clap::Parser;
use dialoguer::{Input, Select};
use std::error::Error;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::{debug, error, info, instrument, warn};
use tracing_subscriber::{EnvFilter, fmt as tfmt};
use wp_news_bot::blog::{THEMES, find_theme};
use wp_news_bot::chat::HELP_TEXT;
use wp_news_bot::config::{BotConfig, Wiring};
use wp_news_bot::models::{CategoryReport, RunReport};
use wp_news_bot::report::write_report;

mod cli;

use cli::{Cli, Command};

#[tokio::main]
#[instrument]
async fn main() -> Result<(), Box<dyn Error>> {
    // --- Tracing init ---
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tfmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
        .init();

    let start_time = std::time::Instant::now();

    // .env first so clap sees its values as environment variables
    match dotenvy::dotenv() {
        Ok(path) => debug!(path = %path.display(), "loaded .env"),
        Err(e) if e.not_found() => debug!("no .env file"),
        Err(e) => warn!(error = %e, "could not read .env"),
    }

    let args = Cli::parse();
    info!(command = ?args.command, "wp_news_bot starting up");

    let mut config = match &args.config {
        Some(path) => BotConfig::load(path)?,
        None => BotConfig::default(),
    };
    if let Some(dir) = &args.report_dir {
        config.report_dir = Some(dir.clone());
    }
    let wiring = Wiring::new(args.settings(), config)?;

    let command = args.command.clone().unwrap_or(Command::Menu);
    let result = match command {
        Command::Menu => menu(&wiring, !args.no_twitter).await,
        Command::Chat { session } => chat(&wiring, session).await,
        Command::Verify => verify(&wiring).await,
        Command::Themes => {
            print_themes();
            Ok(())
        }
        other => run(&wiring, other, !args.no_twitter).await,
    };

    let elapsed = start_time.elapsed();
    match &result {
        Ok(()) => info!(?elapsed, secs = elapsed.as_secs(), "Execution complete"),
        Err(e) => error!(?elapsed, error = %e, "Execution stopped"),
    }
    result
}

/// Run one batch command and write its report.
async fn run(wiring: &Wiring, command: Command, with_twitter: bool) -> Result<(), Box<dyn Error>> {
    let config = wiring.config();
    let llm = wiring.llm();
    let bot = wiring.news_bot(llm.clone(), with_twitter)?;
    let started_at = Utc::now().to_rfc3339();

    let (label, categories): (String, Vec<CategoryReport>) = match command {
        Command::Category {
            category,
            max_articles,
            status,
        } => {
            let status = status.unwrap_or(config.status);
            let report = bot
                .run_single_category(&category, max_articles as usize, status)
                .await?;
            (category, vec![report])
        }
        Command::Categories {
            categories,
            per_category,
            status,
        } => {
            let categories = if categories.is_empty() {
                config.categories.clone()
            } else {
                categories
            };
            let per_category = per_category.unwrap_or(config.articles_per_category);
            let status = status.unwrap_or(config.status);
            let reports = bot
                .run_multiple_categories(&categories, per_category, status)
                .await?;
            ("categories".to_string(), reports)
        }
        Command::Trending {
            max_articles,
            status,
        } => {
            let max = max_articles.map(usize::from).unwrap_or(config.trending_articles);
            let report = bot
                .run_trending_news(max, status.unwrap_or(config.status))
                .await?;
            ("trending".to_string(), vec![report])
        }
        Command::Blog {
            theme,
            keywords,
            count,
            words,
            title,
            no_image,
            status,
        } => {
            let keywords = if keywords.is_empty() {
                find_theme(&theme)
                    .map(|t| t.keywords.iter().take(5).map(|k| k.to_string()).collect())
                    .unwrap_or_default()
            } else {
                keywords
            };
            let status = status.unwrap_or(config.status);
            let generator = wiring.blog_generator(llm);
            let report = match title {
                Some(title) => {
                    let blog = generator
                        .generate_blog_content(&theme, &keywords, Some(title.as_str()), words)
                        .await?;
                    let image = bot.blog_image(&blog, &theme, !no_image).await?;
                    let published = bot.publish_blog(&blog, image.as_ref(), status).await?;
                    CategoryReport {
                        category: theme.clone(),
                        fetched: 1,
                        published: vec![published],
                        failed: 0,
                    }
                }
                None => {
                    bot.run_blog_batch(&generator, &theme, count, &keywords, words, status, !no_image)
                        .await?
                }
            };
            (format!("blog-{theme}"), vec![report])
        }
        Command::Menu | Command::Chat { .. } | Command::Verify | Command::Themes => {
            return Ok(());
        }
    };

    let report = RunReport {
        label,
        started_at,
        finished_at: Utc::now().to_rfc3339(),
        categories,
    };
    for c in &report.categories {
        for p in &c.published {
            println!("✓ [{}] {} → {}", c.category, p.post.title, p.post.url);
            if let Some(t) = &p.tweet {
                println!("  tweeted: {}", t.url);
            }
        }
    }
    println!("\n✅ Published {} post(s)", report.total_published());

    if let Some(dir) = &config.report_dir {
        match write_report(&report, dir).await {
            Ok(path) => println!("Report: {path}"),
            Err(e) => error!(error = %e, "Failed to write run report"),
        }
    }
    Ok(())
}

/// The numbered menu of the interactive mode.
async fn menu(wiring: &Wiring, with_twitter: bool) -> Result<(), Box<dyn Error>> {
    println!(
        "
╔══════════════════════════════════════════════════════════╗
║         AUTOMATED NEWS BOT FOR WORDPRESS                 ║
║         Powered by Tavily, Pexels & Gemini AI            ║
╚══════════════════════════════════════════════════════════╝
"
    );
    let items = [
        "Fetch news from a single category",
        "Fetch news from multiple categories",
        "Fetch trending news",
        "Generate blog posts",
        "Chat with the WordPress assistant",
        "Verify connections",
        "Exit",
    ];
    let choice = Select::new()
        .with_prompt("Select an option")
        .items(&items)
        .default(0)
        .interact()?;

    let command = match choice {
        0 => {
            let known: Vec<&str> = wp_news_bot::news_fetcher::KNOWN_CATEGORIES
                .iter()
                .map(|(name, _)| *name)
                .collect();
            println!("Available categories: {}", known.join(", "));
            let category: String = Input::new().with_prompt("Category").interact_text()?;
            Command::Category {
                category,
                max_articles: ask_count("Number of articles (1-10)", 3)?,
                status: None,
            }
        }
        1 => Command::Categories {
            categories: Vec::new(),
            per_category: None,
            status: None,
        },
        2 => Command::Trending {
            max_articles: Some(ask_count("Number of trending articles (1-10)", 5)?),
            status: None,
        },
        3 => {
            print_themes();
            let theme: String = Input::new().with_prompt("Theme").interact_text()?;
            let keywords: String = Input::new()
                .with_prompt("Keywords (comma-separated, optional)")
                .allow_empty(true)
                .interact_text()?;
            Command::Blog {
                theme,
                keywords: keywords
                    .split(',')
                    .map(str::trim)
                    .filter(|k| !k.is_empty())
                    .map(String::from)
                    .collect(),
                count: usize::from(ask_count("Number of posts (1-10)", 1)?),
                words: 800,
                title: None,
                no_image: false,
                status: None,
            }
        }
        4 => return chat(wiring, None).await,
        5 => return verify(wiring).await,
        _ => {
            println!("Bye!");
            return Ok(());
        }
    };
    run(wiring, command, with_twitter).await
}

fn ask_count(prompt: &str, default: u8) -> Result<u8, Box<dyn Error>> {
    let n: u8 = Input::new()
        .with_prompt(prompt)
        .default(default)
        .validate_with(|n: &u8| -> Result<(), &str> {
            if (1..=10).contains(n) {
                Ok(())
            } else {
                Err("enter a number between 1 and 10")
            }
        })
        .interact_text()?;
    Ok(n)
}

fn print_themes() {
    println!("Available themes:");
    for theme in THEMES {
        println!("  {:<14} {}", theme.key, theme.description);
    }
}

/// Line-oriented chat loop. `/new` starts a fresh session, `/clear` wipes
/// the current one, `/quit` exits.
async fn chat(wiring: &Wiring, session: Option<String>) -> Result<(), Box<dyn Error>> {
    let llm = if wiring.has_llm_key() {
        Some(wiring.llm())
    } else {
        warn!("GEMINI_API_KEY not set; free-form questions will get the help text");
        None
    };
    let assistant = wiring.chat_assistant(llm)?;
    let mut session_id = session.unwrap_or_else(new_session_id);
    info!(session_id = %session_id, "chat session started");

    println!("WordPress assistant. /new, /clear, /quit\n\n{HELP_TEXT}\n");
    let mut stdout = tokio::io::stdout();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        stdout.write_all(b"\nYou: ").await?;
        stdout.flush().await?;
        let Some(line) = lines.next_line().await? else {
            break;
        };
        let message = line.trim();
        match message {
            "" => continue,
            "/quit" | "/exit" => break,
            "/clear" => {
                assistant.clear(&session_id).await;
                println!("Session cleared.");
            }
            "/new" => {
                session_id = new_session_id();
                println!("New session {session_id}");
            }
            _ => {
                let reply = assistant.handle(&session_id, message).await;
                println!("\nBot: {reply}");
            }
        }
    }
    println!("Bye!");
    Ok(())
}

fn new_session_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Check every configured service without publishing anything.
async fn verify(wiring: &Wiring) -> Result<(), Box<dyn Error>> {
    let mut failures = 0;

    let wordpress = wiring.wordpress()?;
    match wordpress.site_info().await {
        Ok(site) => println!("✓ WordPress: {} ({})", site.name, site.url),
        Err(e) => {
            failures += 1;
            println!("✗ WordPress: {e}");
        }
    }
    match wordpress.list_posts(None, 1).await {
        Ok(_) => println!("✓ WordPress REST posts endpoint reachable"),
        Err(e) => {
            failures += 1;
            println!("✗ WordPress posts: {e}");
        }
    }

    match wiring.twitter() {
        Some(twitter) => match twitter.verify_credentials().await {
            Ok(user) => println!("✓ X: authenticated as @{user}"),
            Err(e) => {
                failures += 1;
                println!("✗ X: {e}");
            }
        },
        None => println!("- X: credentials incomplete, tweeting disabled"),
    }

    if wiring.has_llm_key() {
        let enhancer = wp_news_bot::content_enhancer::ContentEnhancer::new(wiring.llm());
        match enhancer.generate_seo_title("Connectivity check").await {
            Ok(title) => println!("✓ Gemini: {title}"),
            Err(e) => {
                failures += 1;
                println!("✗ Gemini: {e}");
            }
        }
    } else {
        println!("✗ Gemini: GEMINI_API_KEY not set");
        failures += 1;
    }

    let images = wiring.image_fetcher();
    if images.is_configured() {
        match images.get_curated_photos(1, 1).await {
            Ok(_) => println!("✓ Pexels"),
            Err(e) => {
                failures += 1;
                println!("✗ Pexels: {e}");
            }
        }
    } else {
        println!("- Pexels: key not set, posts will have no images");
    }

    match wiring.news_fetcher().fetch_trending_news(1).await {
        Ok(a) => println!("✓ Tavily: {} result(s)", a.len()),
        Err(e) => {
            failures += 1;
            println!("✗ Tavily: {e}");
        }
    }

    if failures > 0 {
        return Err(format!("{failures} service check(s) failed").into());
    }
    println!("\nAll services reachable.");
    Ok(())
}
