//! WordPress REST client: posts, media, categories and tags.
//!
//! All calls go to `{base}/wp-json/wp/v2/...` with a bearer token. Creating a
//! post or uploading media is never retried; reads and taxonomy lookups are.

use crate::error::ApiError;
use crate::http::ServiceClient;
use crate::models::{MediaId, PostStatus, PostSummary, PublishedPost, SiteInfo, TaxonomyTerm};
use crate::utils::{configured, html_to_text, slugify, truncate_for_log};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use std::time::Duration;
use tracing::{info, instrument, warn};

const SERVICE: &str = "wordpress";

const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "gif", "webp"];

/// Which taxonomy a term lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaxonomyKind {
    Category,
    Tag,
}

impl TaxonomyKind {
    fn endpoint(&self) -> &'static str {
        match self {
            TaxonomyKind::Category => "categories",
            TaxonomyKind::Tag => "tags",
        }
    }

    fn label(&self) -> &'static str {
        match self {
            TaxonomyKind::Category => "category",
            TaxonomyKind::Tag => "tag",
        }
    }
}

/// Body of `POST /posts`.
#[derive(Debug, Clone, Serialize)]
pub struct NewPost<'a> {
    pub title: &'a str,
    pub content: &'a str,
    pub status: PostStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub excerpt: Option<&'a str>,
    #[serde(skip_serializing_if = "<[u64]>::is_empty")]
    pub categories: &'a [u64],
    #[serde(skip_serializing_if = "<[u64]>::is_empty")]
    pub tags: &'a [u64],
    #[serde(skip_serializing_if = "Option::is_none")]
    pub featured_media: Option<MediaId>,
}

impl<'a> NewPost<'a> {
    pub fn new(title: &'a str, content: &'a str, status: PostStatus) -> Self {
        Self {
            title,
            content,
            status,
            excerpt: None,
            categories: &[],
            tags: &[],
            featured_media: None,
        }
    }
}

#[derive(Debug, Deserialize)]
struct CreatedPost {
    id: u64,
    #[serde(default)]
    link: String,
    date: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Created {
    id: u64,
}

#[derive(Debug, Deserialize)]
struct Rendered {
    #[serde(default)]
    rendered: String,
}

#[derive(Debug, Deserialize)]
struct ListedPost {
    id: u64,
    title: Rendered,
    #[serde(default)]
    link: String,
    #[serde(default)]
    status: String,
    date: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SiteIndex {
    #[serde(default)]
    name: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    url: String,
}

/// File name for an uploaded image.
///
/// With a title: `{slug(title, 50)}-{ts}.{ext}`, where `ext` comes from the
/// URL when it is a known image type and defaults to `jpg`. Without one the
/// URL's own file stem is reused, or `image-{ts}.jpg` when it has none.
pub fn media_filename(title: Option<&str>, image_url: &str, timestamp: i64) -> String {
    let last = image_url
        .split('?')
        .next()
        .unwrap_or_default()
        .rsplit('/')
        .next()
        .unwrap_or_default();
    let split = last.rsplit_once('.').filter(|(stem, ext)| !stem.is_empty() && !ext.is_empty());

    match title.map(|t| slugify(t, 50)).filter(|s| !s.is_empty()) {
        Some(slug) => {
            let ext = split
                .map(|(_, ext)| ext.to_lowercase())
                .filter(|ext| IMAGE_EXTENSIONS.contains(&ext.as_str()))
                .unwrap_or_else(|| "jpg".to_string());
            format!("{slug}-{timestamp}.{ext}")
        }
        None => match split {
            Some((stem, ext)) => format!("{stem}-{timestamp}.{ext}"),
            None => format!("image-{timestamp}.jpg"),
        },
    }
}

/// MIME type for an upload: the download's type unless missing or generic,
/// else guessed from the file extension.
pub fn media_mime(content_type: Option<&str>, filename: &str) -> String {
    match content_type {
        Some(ct) if !ct.is_empty() && ct != "application/octet-stream" => ct.to_string(),
        _ => {
            let lower = filename.to_lowercase();
            let mime = if lower.ends_with(".png") {
                "image/png"
            } else if lower.ends_with(".gif") {
                "image/gif"
            } else if lower.ends_with(".webp") {
                "image/webp"
            } else {
                "image/jpeg"
            };
            mime.to_string()
        }
    }
}

/// Publishes to one WordPress site.
#[derive(Debug, Clone)]
pub struct WordPressPublisher {
    service: ServiceClient,
    /// Downloads images from third-party hosts.
    media_source: ServiceClient,
    base_url: String,
    token: Option<String>,
}

impl WordPressPublisher {
    pub fn new(
        service: ServiceClient,
        media_source: ServiceClient,
        base_url: &str,
        token: Option<&str>,
    ) -> Result<Self, ApiError> {
        let parsed = url::Url::parse(base_url)
            .map_err(|e| ApiError::validation("WORDPRESS_BASE_URL", e.to_string()))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(ApiError::validation(
                "WORDPRESS_BASE_URL",
                format!("unsupported scheme '{}'", parsed.scheme()),
            ));
        }
        let token = configured(token);
        if token.is_none() {
            warn!("WordPress bearer token not set; publishing will fail");
        }
        Ok(Self {
            service,
            media_source,
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn api(&self, path: &str) -> String {
        format!("{}/wp-json/wp/v2/{}", self.base_url, path)
    }

    fn token(&self) -> Result<&str, ApiError> {
        self.token
            .as_deref()
            .ok_or_else(|| ApiError::not_configured(SERVICE, "BEARER_TOKEN"))
    }

    /// Create a post through `POST /wp-json/wp/v2/posts`.
    ///
    /// Sent once with no retry, so a timeout never produces a duplicate post.
    ///
    /// # Arguments
    ///
    /// * `post` - Title, HTML body, status and the optional excerpt, term ids
    ///   and featured media
    ///
    /// # Returns
    ///
    /// The created post's id, link and status, or an [`ApiError`] whose kind
    /// tells an auth failure from a rejected request.
    #[instrument(level = "info", skip_all, fields(title = %truncate_for_log(post.title, 50), status = %post.status))]
    pub async fn create_post(&self, post: &NewPost<'_>) -> Result<PublishedPost, ApiError> {
        let token = self.token()?;
        let request = self
            .service
            .http()
            .post(self.api("posts"))
            .bearer_auth(token)
            .timeout(Duration::from_secs(30))
            .json(post);
        let response = self.service.send(request).await?;
        let created: CreatedPost = self.service.json(response).await?;
        info!(id = created.id, url = %created.link, "post created");
        Ok(PublishedPost {
            id: created.id,
            url: created.link,
            title: post.title.to_string(),
            status: post.status,
            date: created.date,
        })
    }

    /// Download `image_url` and upload it to the media library.
    ///
    /// Metadata is written by a second request; if that fails the upload
    /// still counts and a warning is logged.
    ///
    /// # Arguments
    ///
    /// * `image_url` - Source image; its content type or extension picks the MIME
    /// * `title` - Media title, also used for the file name
    /// * `alt_text` - Alt text stored with the attachment
    /// * `caption` - Caption, typically the photographer credit
    ///
    /// # Returns
    ///
    /// The new attachment's [`MediaId`].
    #[instrument(level = "info", skip_all, fields(image_url = %image_url))]
    pub async fn upload_media(
        &self,
        image_url: &str,
        title: Option<&str>,
        alt_text: Option<&str>,
        caption: Option<&str>,
    ) -> Result<MediaId, ApiError> {
        let token = self.token()?;
        let file = self
            .media_source
            .download("wordpress.download", image_url)
            .await?;

        let filename = media_filename(title, image_url, chrono::Utc::now().timestamp());
        let mime = media_mime(file.content_type.as_deref(), &filename);
        info!(filename = %filename, mime = %mime, bytes = file.bytes.len(), "uploading media");

        let request = self
            .service
            .http()
            .post(self.api("media"))
            .bearer_auth(token)
            .header(reqwest::header::CONTENT_TYPE, mime)
            .header(
                reqwest::header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{filename}\""),
            )
            .timeout(Duration::from_secs(60))
            .body(file.bytes);
        let response = self.service.send(request).await?;
        let created: Created = self.service.json(response).await?;
        let media_id = MediaId(created.id);
        info!(%media_id, "media uploaded");

        if title.is_some() || alt_text.is_some() || caption.is_some() {
            if let Err(e) = self
                .update_media_metadata(media_id, title, alt_text, caption)
                .await
            {
                warn!(%media_id, error = %e, "media uploaded but metadata update failed");
            }
        }
        Ok(media_id)
    }

    /// Set title, alt text and caption on an existing attachment.
    pub async fn update_media_metadata(
        &self,
        media_id: MediaId,
        title: Option<&str>,
        alt_text: Option<&str>,
        caption: Option<&str>,
    ) -> Result<(), ApiError> {
        let token = self.token()?;
        let mut body = Map::new();
        for (key, value) in [("title", title), ("alt_text", alt_text), ("caption", caption)] {
            if let Some(v) = value.filter(|v| !v.is_empty()) {
                body.insert(key.to_string(), Value::String(v.to_string()));
            }
        }
        if body.is_empty() {
            return Ok(());
        }
        let url = self.api(&format!("media/{media_id}"));
        let body = Value::Object(body);
        self.service
            .send_with_retry("wordpress.media_meta", || {
                self.service
                    .http()
                    .post(&url)
                    .bearer_auth(token)
                    .timeout(Duration::from_secs(30))
                    .json(&body)
            })
            .await?;
        info!(%media_id, "media metadata updated");
        Ok(())
    }

    pub async fn get_or_create_category(&self, name: &str) -> Result<u64, ApiError> {
        self.get_or_create_term(TaxonomyKind::Category, name).await
    }

    pub async fn get_or_create_tag(&self, name: &str) -> Result<u64, ApiError> {
        self.get_or_create_term(TaxonomyKind::Tag, name).await
    }

    /// Look a term up by exact (case-insensitive) name, creating it when
    /// missing. Two concurrent callers may both create the term.
    #[instrument(level = "info", skip(self))]
    pub async fn get_or_create_term(&self, kind: TaxonomyKind, name: &str) -> Result<u64, ApiError> {
        let token = self.token()?;
        let name = name.trim();
        if name.is_empty() {
            return Err(ApiError::validation("term name", "must not be empty"));
        }
        let url = self.api(kind.endpoint());

        let response = self
            .service
            .send_with_retry("wordpress.term_search", || {
                self.service
                    .http()
                    .get(&url)
                    .bearer_auth(token)
                    .query(&[("search", name)])
                    .timeout(Duration::from_secs(15))
            })
            .await?;
        let terms: Vec<TaxonomyTerm> = self.service.json(response).await?;
        let wanted = name.to_lowercase();
        if let Some(term) = terms
            .iter()
            .find(|t| html_to_text(&t.name).to_lowercase() == wanted)
        {
            info!(id = term.id, kind = kind.label(), "found existing term");
            return Ok(term.id);
        }

        let request = self
            .service
            .http()
            .post(&url)
            .bearer_auth(token)
            .timeout(Duration::from_secs(15))
            .json(&json!({ "name": name }));
        let response = self.service.send(request).await?;
        let created: Created = self.service.json(response).await?;
        info!(id = created.id, kind = kind.label(), "term created");
        Ok(created.id)
    }

    /// Most recent posts, optionally filtered by a search term.
    pub async fn list_posts(&self, search: Option<&str>, per_page: u32) -> Result<Vec<PostSummary>, ApiError> {
        let token = self.token()?;
        let url = self.api("posts");
        let mut query = vec![("per_page", per_page.to_string())];
        if let Some(s) = search.filter(|s| !s.trim().is_empty()) {
            query.push(("search", s.trim().to_string()));
        }
        let response = self
            .service
            .send_with_retry("wordpress.list_posts", || {
                self.service
                    .http()
                    .get(&url)
                    .bearer_auth(token)
                    .query(&query)
                    .timeout(Duration::from_secs(15))
            })
            .await?;
        let posts: Vec<ListedPost> = self.service.json(response).await?;
        Ok(posts
            .into_iter()
            .map(|p| PostSummary {
                id: p.id,
                title: html_to_text(&p.title.rendered),
                link: p.link,
                status: p.status,
                date: p.date,
            })
            .collect())
    }

    /// Site name and tagline from the public REST index.
    pub async fn site_info(&self) -> Result<SiteInfo, ApiError> {
        let url = format!("{}/wp-json", self.base_url);
        let response = self
            .service
            .send_with_retry("wordpress.site_info", || {
                self.service
                    .http()
                    .get(&url)
                    .timeout(Duration::from_secs(15))
            })
            .await?;
        let index: SiteIndex = self.service.json(response).await?;
        Ok(SiteInfo {
            name: html_to_text(&index.name),
            description: html_to_text(&index.description),
            url: if index.url.is_empty() {
                self.base_url.clone()
            } else {
                index.url
            },
        })
    }
}
