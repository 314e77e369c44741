//! End-to-end runs of the orchestrator against one mock server standing in
//! for every external service.

use httpmock::prelude::*;
use serde_json::json;
use wp_news_bot::blog::BlogPost;
use wp_news_bot::config::{BotConfig, Settings, Wiring};
use wp_news_bot::error::ErrorKind;
use wp_news_bot::models::{MediaId, PostStatus};
use wp_news_bot::pipeline::{Criticality, Step};

fn settings(server: &MockServer) -> Settings {
    let base = server.base_url();
    Settings {
        wordpress_base_url: base.clone(),
        bearer_token: Some("wp-token".into()),
        gemini_api_key: Some("gemini-key".into()),
        gemini_base_url: Some(base.clone()),
        gemini_model: Some("gemini-test".into()),
        tavily_api_key: Some("tvly-key".into()),
        tavily_base_url: Some(base.clone()),
        pexels_api_key: Some("pexels-key".into()),
        pexels_base_url: Some(base.clone()),
        x_consumer_key: Some("ck".into()),
        x_consumer_secret: Some("cs".into()),
        x_access_token: Some("at".into()),
        x_access_token_secret: Some("ats".into()),
        x_api_base_url: Some(base.clone()),
        x_upload_base_url: Some(base),
    }
}

fn config(on_critical_failure: &str) -> BotConfig {
    BotConfig::from_yaml(&format!(
        "article_delay_secs: 0
category_delay_secs: 0
on_critical_failure: {on_critical_failure}
retry:
  max_retries: 0
  base_delay: 0
rate_limits:
  tavily: {{ burst: 100, per_second: 100 }}
  pexels: {{ burst: 100, per_second: 100 }}
  gemini: {{ burst: 100, per_second: 100 }}
  wordpress: {{ burst: 100, per_second: 100 }}
  x: {{ burst: 100, per_second: 100 }}
  media: {{ burst: 100, per_second: 100 }}
"
    ))
    .unwrap()
}

fn completion(text: &str) -> serde_json::Value {
    json!({"choices": [{"message": {"role": "assistant", "content": text}}]})
}

/// Search hits, a photo, and canned model replies.
async fn mock_sources(server: &MockServer) {
    server
        .mock_async(|when, then| {
            when.method(POST).path("/search");
            then.status(200).json_body(json!({
                "results": [
                    {"title": "Chip shortage eases", "url": "https://news.example/1", "content": "Supply recovers.", "score": 0.9},
                    {"title": "Cloud outage resolved", "url": "https://news.example/2", "content": "Services restored.", "score": 0.8}
                ]
            }));
        })
        .await;
    let photo_url = server.url("/photos/1.jpg");
    server
        .mock_async(move |when, then| {
            when.method(GET).path("/v1/search");
            then.status(200).json_body(json!({
                "photos": [{
                    "id": 1,
                    "photographer": "Jane Roe",
                    "alt": "chips",
                    "src": {"large": photo_url}
                }]
            }));
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/photos/1.jpg");
            then.status(200).header("content-type", "image/jpeg").body("jpeg-bytes");
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/chat/completions")
                .body_contains("Summarize the following");
            then.status(200).json_body(completion("A short excerpt."));
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/chat/completions")
                .body_contains("attention-grabbing tweet");
            then.status(200).json_body(completion("Big news today #tech"));
        })
        .await;
}

async fn mock_enhance_ok(server: &MockServer) {
    server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/chat/completions")
                .body_contains("professional news content writer");
            then.status(200)
                .json_body(completion("```html\n<h2>Story</h2><p>Body</p>\n```"));
        })
        .await;
}

/// Media, category and post endpoints that all succeed.
async fn mock_wordpress(server: &MockServer) {
    server
        .mock_async(|when, then| {
            when.method(POST).path("/wp-json/wp/v2/media");
            then.status(201).json_body(json!({"id": 9}));
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(POST).path("/wp-json/wp/v2/media/9");
            then.status(200).json_body(json!({"id": 9}));
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/wp-json/wp/v2/categories");
            then.status(200).json_body(json!([{"id": 4, "name": "Technology"}]));
        })
        .await;
}

async fn mock_posts(server: &MockServer) -> httpmock::Mock<'_> {
    server
        .mock_async(|when, then| {
            when.method(POST).path("/wp-json/wp/v2/posts");
            then.status(201)
                .json_body(json!({"id": 100, "link": "https://blog.example/?p=100"}));
        })
        .await
}

async fn mock_x(server: &MockServer) {
    server
        .mock_async(|when, then| {
            when.method(POST).path("/1.1/media/upload.json");
            then.status(200).json_body(json!({"media_id_string": "555"}));
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/2/tweets")
                .json_body_partial(r#"{"media":{"media_ids":["555"]}}"#);
            then.status(201).json_body(json!({"data": {"id": "1800", "text": "Big news today #tech"}}));
        })
        .await;
}

#[tokio::test]
async fn test_category_run_publishes_and_tweets() {
    let server = MockServer::start_async().await;
    mock_sources(&server).await;
    mock_enhance_ok(&server).await;
    mock_wordpress(&server).await;
    mock_x(&server).await;
    let posts = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/wp-json/wp/v2/posts")
                .json_body_partial(
                    r#"{"content":"<h2>Story</h2><p>Body</p>","status":"draft","excerpt":"A short excerpt.","categories":[4],"featured_media":9}"#,
                );
            then.status(201)
                .json_body(json!({"id": 100, "link": "https://blog.example/?p=100"}));
        })
        .await;

    let wiring = Wiring::new(settings(&server), config("abort_run")).unwrap();
    let bot = wiring.news_bot(wiring.llm(), true).unwrap();
    let report = bot
        .run_single_category("technology", 2, PostStatus::Draft)
        .await
        .unwrap();

    assert_eq!(posts.hits_async().await, 2);
    assert_eq!(report.category, "technology");
    assert_eq!(report.fetched, 2);
    assert_eq!(report.failed, 0);
    assert_eq!(report.published.len(), 2);
    for published in &report.published {
        assert_eq!(published.post.id, 100);
        assert_eq!(published.post.status, PostStatus::Draft);
        assert_eq!(published.media_id, Some(MediaId(9)));
        assert_eq!(published.category_id, Some(4));
        let tweet = published.tweet.as_ref().expect("tweet posted");
        assert_eq!(tweet.id, "1800");
        assert_eq!(tweet.url, "https://x.com/i/web/status/1800");
    }
}

#[tokio::test]
async fn test_enhance_failure_aborts_run() {
    let server = MockServer::start_async().await;
    mock_sources(&server).await;
    mock_wordpress(&server).await;
    server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/chat/completions")
                .body_contains("professional news content writer");
            then.status(500).body("overloaded");
        })
        .await;
    let posts = mock_posts(&server).await;

    let wiring = Wiring::new(settings(&server), config("abort_run")).unwrap();
    let bot = wiring.news_bot(wiring.llm(), false).unwrap();
    let err = bot
        .run_multiple_categories(&["technology".to_string(), "business".to_string()], 2, PostStatus::Publish)
        .await
        .unwrap_err();

    assert_eq!(err.step, Step::EnhanceContent);
    assert_eq!(err.source.kind(), ErrorKind::Server);
    assert_eq!(posts.hits_async().await, 0);
}

#[tokio::test]
async fn test_skip_article_mode_counts_failures() {
    let server = MockServer::start_async().await;
    mock_sources(&server).await;
    mock_wordpress(&server).await;
    server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/chat/completions")
                .body_contains("professional news content writer");
            then.status(500);
        })
        .await;
    let posts = mock_posts(&server).await;

    let wiring = Wiring::new(settings(&server), config("skip_article")).unwrap();
    let bot = wiring.news_bot(wiring.llm(), false).unwrap();
    let report = bot.run_trending_news(2, PostStatus::Publish).await.unwrap();

    assert_eq!(report.category, "Trending");
    assert_eq!(report.fetched, 2);
    assert_eq!(report.failed, 2);
    assert!(report.published.is_empty());
    assert_eq!(posts.hits_async().await, 0);
}

#[tokio::test]
async fn test_best_effort_failures_still_publish() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST).path("/search");
            then.status(200).json_body(json!({
                "results": [{"title": "Only story", "url": "https://news.example/1", "content": "Text.", "score": 1.0}]
            }));
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/v1/search");
            then.status(500);
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/wp-json/wp/v2/categories");
            then.status(503);
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(POST).path("/chat/completions").body_contains("Summarize");
            then.status(400).body("bad request");
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/chat/completions")
                .body_contains("attention-grabbing tweet");
            then.status(200).json_body(completion("Read this"));
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(POST).path("/2/tweets");
            then.status(401).body("unauthorized");
        })
        .await;
    mock_enhance_ok(&server).await;
    let posts = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/wp-json/wp/v2/posts")
                .json_body_partial(r#"{"excerpt":"Text."}"#);
            then.status(201)
                .json_body(json!({"id": 7, "link": "https://blog.example/?p=7"}));
        })
        .await;

    let wiring = Wiring::new(settings(&server), config("abort_run")).unwrap();
    let bot = wiring.news_bot(wiring.llm(), true).unwrap();
    let report = bot
        .run_single_category("science", 1, PostStatus::Publish)
        .await
        .unwrap();

    posts.assert_async().await;
    let published = &report.published[0];
    assert_eq!(published.post.id, 7);
    assert_eq!(published.media_id, None);
    assert_eq!(published.category_id, None);
    assert_eq!(published.tweet, None);
}

#[tokio::test]
async fn test_failed_search_is_an_empty_category() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST).path("/search");
            then.status(401).body("invalid key");
        })
        .await;
    let posts = mock_posts(&server).await;

    let wiring = Wiring::new(settings(&server), config("abort_run")).unwrap();
    let bot = wiring.news_bot(wiring.llm(), false).unwrap();
    let report = bot
        .run_single_category("health", 3, PostStatus::Publish)
        .await
        .unwrap();

    assert_eq!(report.fetched, 0);
    assert!(report.published.is_empty());
    assert_eq!(posts.hits_async().await, 0);
}

#[tokio::test]
async fn test_publish_blog_with_tags() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET)
                .path("/wp-json/wp/v2/categories")
                .query_param("search", "Travel");
            then.status(200).json_body(json!([]));
        })
        .await;
    let create_category = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/wp-json/wp/v2/categories")
                .json_body(json!({"name": "Travel"}));
            then.status(201).json_body(json!({"id": 12, "name": "Travel"}));
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(GET)
                .path("/wp-json/wp/v2/tags")
                .query_param("search", "budget");
            then.status(200)
                .json_body(json!([{"id": 31, "name": "Budget"}]));
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(GET)
                .path("/wp-json/wp/v2/tags")
                .query_param("search", "Hostels");
            then.status(200).json_body(json!([]));
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/wp-json/wp/v2/tags")
                .json_body(json!({"name": "Hostels"}));
            then.status(201).json_body(json!({"id": 32, "name": "Hostels"}));
        })
        .await;
    let posts = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/wp-json/wp/v2/posts")
                .json_body_partial(
                    r#"{"title":"Backpacking on a Budget","content":"<h2>Plan</h2>\n<p>Go <strong>light</strong>.</p>\n","excerpt":"Travel cheaply.","categories":[12],"tags":[31,32]}"#,
                );
            then.status(201)
                .json_body(json!({"id": 55, "link": "https://blog.example/?p=55"}));
        })
        .await;

    let blog = BlogPost {
        title: "Backpacking on a Budget".into(),
        content: "## Plan\n\nGo **light**.".into(),
        excerpt: "Travel cheaply.".into(),
        tags: vec!["budget".into(), "Hostels".into()],
        theme: "travel".into(),
        keywords: vec!["budget".into()],
        word_count: 3,
    };

    let wiring = Wiring::new(settings(&server), config("abort_run")).unwrap();
    let bot = wiring.news_bot(wiring.llm(), false).unwrap();
    let published = bot
        .publish_blog(&blog, None, PostStatus::Publish)
        .await
        .unwrap();

    posts.assert_async().await;
    create_category.assert_async().await;
    assert_eq!(published.category_id, Some(12));
    assert_eq!(published.tag_ids, vec![31, 32]);
    assert_eq!(published.tweet, None);
}

/// Model replies for one generated travel post.
async fn mock_blog_generation(server: &MockServer) {
    for (marker, reply) in [
        ("blog post title about", "Cheap Flights Guide"),
        ("comprehensive, high-quality blog post", "## Introduction\n\nFly midweek."),
        ("compelling 2-3 sentence excerpt", "Save on every trip."),
        ("generate 5-8 relevant tags", "budget, flights"),
    ] {
        server
            .mock_async(|when, then| {
                when.method(POST).path("/chat/completions").body_contains(marker);
                then.status(200).json_body(completion(reply));
            })
            .await;
    }
}

fn without_pexels(server: &MockServer) -> Settings {
    Settings {
        pexels_api_key: None,
        ..settings(server)
    }
}

#[tokio::test]
async fn test_blog_batch_skips_posts_when_critical_image_fails() {
    let server = MockServer::start_async().await;
    mock_blog_generation(&server).await;
    let posts = mock_posts(&server).await;

    let mut cfg = config("skip_article");
    cfg.steps = cfg.steps.with(Step::FetchImage, Criticality::Critical);
    let wiring = Wiring::new(without_pexels(&server), cfg).unwrap();
    let bot = wiring.news_bot(wiring.llm(), false).unwrap();
    let generator = wiring.blog_generator(wiring.llm());
    let report = bot
        .run_blog_batch(&generator, "travel", 2, &[], 300, PostStatus::Draft, true)
        .await
        .unwrap();

    assert_eq!(report.fetched, 2);
    assert_eq!(report.failed, 2);
    assert!(report.published.is_empty());
    assert_eq!(posts.hits_async().await, 0);
}

#[tokio::test]
async fn test_blog_batch_aborts_when_critical_image_fails() {
    let server = MockServer::start_async().await;
    mock_blog_generation(&server).await;
    let posts = mock_posts(&server).await;

    let mut cfg = config("abort_run");
    cfg.steps = cfg.steps.with(Step::FetchImage, Criticality::Critical);
    let wiring = Wiring::new(without_pexels(&server), cfg).unwrap();
    let bot = wiring.news_bot(wiring.llm(), false).unwrap();
    let generator = wiring.blog_generator(wiring.llm());
    let err = bot
        .run_blog_batch(&generator, "travel", 2, &[], 300, PostStatus::Draft, true)
        .await
        .unwrap_err();

    assert_eq!(err.step, Step::FetchImage);
    assert_eq!(posts.hits_async().await, 0);
}

#[tokio::test]
async fn test_blog_image_is_best_effort_by_default() {
    let server = MockServer::start_async().await;
    mock_blog_generation(&server).await;

    let wiring = Wiring::new(without_pexels(&server), config("abort_run")).unwrap();
    let bot = wiring.news_bot(wiring.llm(), false).unwrap();
    let blog = wiring
        .blog_generator(wiring.llm())
        .generate_blog_content("travel", &[], None, 300)
        .await
        .unwrap();

    assert_eq!(blog.title, "Cheap Flights Guide");
    assert_eq!(bot.blog_image(&blog, "travel", true).await.unwrap(), None);
    assert_eq!(bot.blog_image(&blog, "travel", false).await.unwrap(), None);
}
