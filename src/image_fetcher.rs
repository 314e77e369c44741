//! Stock photos from the Pexels API.

use crate::error::ApiError;
use crate::http::ServiceClient;
use crate::models::{ImageAsset, ImageSources};
use crate::utils::{configured, extract_keywords, keywords_query};
use serde::Deserialize;
use std::time::Duration;
use tokio::fs;
use tracing::{debug, info, instrument, warn};

pub const DEFAULT_PEXELS_BASE_URL: &str = "https://api.pexels.com";

const SERVICE: &str = "pexels";

/// Generic queries tried after the category and headline keywords.
const FALLBACK_QUERIES: &[&str] = &["news", "breaking news", "newspaper"];

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Orientation {
    #[default]
    Landscape,
    Portrait,
    Square,
}

impl Orientation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Orientation::Landscape => "landscape",
            Orientation::Portrait => "portrait",
            Orientation::Square => "square",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ImageSize {
    #[default]
    Large,
    Medium,
    Small,
}

impl ImageSize {
    pub fn as_str(&self) -> &'static str {
        match self {
            ImageSize::Large => "large",
            ImageSize::Medium => "medium",
            ImageSize::Small => "small",
        }
    }
}

#[derive(Debug, Deserialize)]
struct PhotoPage {
    #[serde(default)]
    photos: Vec<Photo>,
}

#[derive(Debug, Deserialize)]
struct Photo {
    id: u64,
    width: Option<u32>,
    height: Option<u32>,
    url: Option<String>,
    photographer: Option<String>,
    photographer_url: Option<String>,
    alt: Option<String>,
    #[serde(default)]
    src: ImageSources,
}

impl Photo {
    fn into_asset(self, default_alt: &str) -> ImageAsset {
        ImageAsset {
            id: self.id,
            photographer: self.photographer,
            photographer_url: self.photographer_url,
            src: self.src,
            width: self.width,
            height: self.height,
            url: self.url,
            alt: self
                .alt
                .filter(|a| !a.trim().is_empty())
                .unwrap_or_else(|| default_alt.to_string()),
        }
    }
}

/// Search queries tried by [`ImageFetcher::get_image_for_news`], in order,
/// with duplicates removed.
pub fn image_queries(title: &str, category: Option<&str>) -> Vec<String> {
    let category = category.map(str::trim).filter(|c| !c.is_empty());
    let mut queries: Vec<String> = Vec::new();
    if let Some(c) = category {
        queries.push(c.to_string());
    }
    let keywords = extract_keywords(title, 3);
    if !keywords.is_empty() {
        queries.push(keywords_query(&keywords));
    }
    queries.extend(category.map(str::to_string));
    queries.extend(FALLBACK_QUERIES.iter().map(|q| q.to_string()));

    let mut seen = std::collections::HashSet::new();
    queries.retain(|q| seen.insert(q.to_lowercase()));
    queries
}

/// Client for the stock-photo API.
#[derive(Debug, Clone)]
pub struct ImageFetcher {
    service: ServiceClient,
    api_key: Option<String>,
    base_url: String,
}

impl ImageFetcher {
    pub fn new(service: ServiceClient, api_key: Option<&str>, base_url: impl Into<String>) -> Self {
        let api_key = configured(api_key);
        if api_key.is_none() {
            warn!("Pexels API key not set; articles will be published without images");
        }
        Self {
            service,
            api_key,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }

    fn key(&self) -> Result<&str, ApiError> {
        self.api_key
            .as_deref()
            .ok_or_else(|| ApiError::not_configured(SERVICE, "PEXELS_API_KEY"))
    }

    async fn get_photos(&self, path: &str, params: &[(&str, String)]) -> Result<PhotoPage, ApiError> {
        let key = self.key()?;
        let url = format!("{}/v1/{}", self.base_url, path);
        let response = self
            .service
            .send_with_retry("pexels.get", || {
                self.service
                    .http()
                    .get(&url)
                    .header(reqwest::header::AUTHORIZATION, key)
                    .query(params)
                    .timeout(Duration::from_secs(15))
            })
            .await?;
        self.service.json(response).await
    }

    /// First photo matching `query`, or `None` when the search is empty.
    #[instrument(level = "info", skip(self))]
    pub async fn search_image(
        &self,
        query: &str,
        orientation: Orientation,
        size: ImageSize,
        per_page: u32,
        page: u32,
    ) -> Result<Option<ImageAsset>, ApiError> {
        let params = [
            ("query", query.to_string()),
            ("orientation", orientation.as_str().to_string()),
            ("size", size.as_str().to_string()),
            ("per_page", per_page.to_string()),
            ("page", page.to_string()),
        ];
        let page = self.get_photos("search", &params).await?;
        let image = page.photos.into_iter().next().map(|p| p.into_asset(query));
        match &image {
            Some(img) => info!(id = img.id, photographer = ?img.photographer, "found image"),
            None => debug!("no photos for query"),
        }
        Ok(image)
    }

    /// Pick a photo for a headline: category, then title keywords, then
    /// generic news queries.
    ///
    /// Per-query failures are logged and the next query is tried.
    ///
    /// # Arguments
    ///
    /// * `title` - Headline whose keywords seed the fallback queries
    /// * `category` - Tried first when given
    /// * `_content` - Accepted for call-site symmetry; not used for search
    ///
    /// # Returns
    ///
    /// The first landscape photo found, `Ok(None)` once every query came back
    /// empty, or an error only when the API key is missing.
    #[instrument(level = "info", skip_all, fields(title = %title))]
    pub async fn get_image_for_news(
        &self,
        title: &str,
        category: Option<&str>,
        _content: Option<&str>,
    ) -> Result<Option<ImageAsset>, ApiError> {
        self.key()?;
        for query in image_queries(title, category) {
            match self
                .search_image(&query, Orientation::Landscape, ImageSize::Large, 1, 1)
                .await
            {
                Ok(Some(image)) => return Ok(Some(image)),
                Ok(None) => {}
                Err(e) => warn!(query = %query, error = %e, "image search failed; trying next query"),
            }
        }
        info!("no image found after all fallbacks");
        Ok(None)
    }

    /// The provider's curated feed.
    pub async fn get_curated_photos(&self, per_page: u32, page: u32) -> Result<Vec<ImageAsset>, ApiError> {
        let params = [("per_page", per_page.to_string()), ("page", page.to_string())];
        let page = self.get_photos("curated", &params).await?;
        let photos: Vec<ImageAsset> = page
            .photos
            .into_iter()
            .map(|p| p.into_asset("Curated photo"))
            .collect();
        info!(count = photos.len(), "fetched curated photos");
        Ok(photos)
    }

    /// Save an image to `path`, returning the number of bytes written.
    #[instrument(level = "info", skip(self))]
    pub async fn download_image(&self, image_url: &str, path: &str) -> Result<usize, ApiError> {
        let file = self.service.download("pexels.download", image_url).await?;
        fs::write(path, &file.bytes).await.map_err(|source| ApiError::Io {
            path: path.to_string(),
            source,
        })?;
        info!(bytes = file.bytes.len(), "image saved");
        Ok(file.bytes.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::http::{RateLimit, RetryPolicy, build_client};
    use httpmock::prelude::*;
    use serde_json::json;

    fn fetcher(server: &MockServer) -> ImageFetcher {
        let service = ServiceClient::new(
            SERVICE,
            build_client(Duration::from_secs(5)).unwrap(),
            RateLimit::new(50.0, 50.0),
            RetryPolicy::none(),
        );
        ImageFetcher::new(service, Some("pexels-key"), server.base_url())
    }

    fn photo(id: u64) -> serde_json::Value {
        json!({
            "id": id,
            "width": 1200,
            "height": 800,
            "url": format!("https://pexels.com/photo/{id}"),
            "photographer": "Jane Roe",
            "photographer_url": "https://pexels.com/@jane",
            "alt": "",
            "src": {"large": format!("https://images.pexels.com/{id}-large.jpg"), "original": "https://images.pexels.com/o.jpg"}
        })
    }

    #[test]
    fn test_image_queries_order() {
        let q = image_queries("New AI Technology Revolutionizes Healthcare", Some("technology"));
        assert_eq!(
            q,
            vec![
                "technology",
                "technology revolutionizes healthcare",
                "news",
                "breaking news",
                "newspaper"
            ]
        );
        let q = image_queries("The cat", None);
        assert_eq!(q, vec!["news", "breaking news", "newspaper"]);
    }

    #[tokio::test]
    async fn test_search_image_takes_first_photo() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(GET)
                    .path("/v1/search")
                    .query_param("query", "technology")
                    .query_param("orientation", "landscape");
                then.status(200)
                    .json_body(json!({"photos": [photo(7), photo(8)]}));
            })
            .await;

        let image = fetcher(&server)
            .search_image("technology", Orientation::Landscape, ImageSize::Large, 1, 1)
            .await
            .unwrap()
            .unwrap();
        mock.assert_async().await;
        assert_eq!(image.id, 7);
        assert_eq!(image.alt, "technology");
        assert_eq!(image.src.best(), Some("https://images.pexels.com/7-large.jpg"));
    }

    #[tokio::test]
    async fn test_get_image_for_news_walks_fallbacks() {
        let server = MockServer::start_async().await;
        let empty = server
            .mock_async(|when, then| {
                when.method(GET).path("/v1/search").query_param("query", "sports");
                then.status(200).json_body(json!({"photos": []}));
            })
            .await;
        let failing = server
            .mock_async(|when, then| {
                when.method(GET)
                    .path("/v1/search")
                    .query_param("query", "championship final tonight");
                then.status(500);
            })
            .await;
        let hit = server
            .mock_async(|when, then| {
                when.method(GET).path("/v1/search").query_param("query", "news");
                then.status(200).json_body(json!({"photos": [photo(3)]}));
            })
            .await;

        let image = fetcher(&server)
            .get_image_for_news("Championship final tonight", Some("sports"), None)
            .await
            .unwrap();
        assert_eq!(image.map(|i| i.id), Some(3));
        assert_eq!(empty.hits_async().await, 1);
        assert_eq!(failing.hits_async().await, 1);
        assert_eq!(hit.hits_async().await, 1);
    }

    #[tokio::test]
    async fn test_get_image_for_news_none_after_exhausting_chain() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(GET).path("/v1/search");
                then.status(200).json_body(json!({"photos": []}));
            })
            .await;

        let image = fetcher(&server)
            .get_image_for_news("Quiet markets", Some("business"), None)
            .await
            .unwrap();
        assert!(image.is_none());
        // business, "quiet markets", news, breaking news, newspaper
        assert_eq!(mock.hits_async().await, 5);
    }

    #[tokio::test]
    async fn test_missing_key_is_an_error() {
        let server = MockServer::start_async().await;
        let service = ServiceClient::new(
            SERVICE,
            build_client(Duration::from_secs(5)).unwrap(),
            RateLimit::new(5.0, 5.0),
            RetryPolicy::none(),
        );
        let fetcher = ImageFetcher::new(service, None, server.base_url());
        let err = fetcher.get_image_for_news("x", None, None).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotConfigured);
    }

    #[tokio::test]
    async fn test_curated_and_download() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/v1/curated").query_param("per_page", "2");
                then.status(200).json_body(json!({"photos": [photo(1), photo(2)]}));
            })
            .await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/file.jpg");
                then.status(200).header("content-type", "image/jpeg").body("jpegdata");
            })
            .await;

        let fetcher = fetcher(&server);
        let curated = fetcher.get_curated_photos(2, 1).await.unwrap();
        assert_eq!(curated.len(), 2);
        assert_eq!(curated[0].alt, "Curated photo");

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.jpg");
        let written = fetcher
            .download_image(&server.url("/file.jpg"), path.to_str().unwrap())
            .await
            .unwrap();
        assert_eq!(written, 8);
        assert_eq!(std::fs::read(&path).unwrap(), b"jpegdata");
    }
}
