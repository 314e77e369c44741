//! X (Twitter) client: media upload and tweets, signed with OAuth 1.0a.

use crate::error::ApiError;
use crate::http::ServiceClient;
use crate::models::TweetResult;
use crate::utils::{configured, truncate_for_log, truncate_with_ellipsis};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use itertools::Itertools;
use rand::distr::Alphanumeric;
use rand::{Rng, rng};
use reqwest::Method;
use reqwest::multipart::{Form, Part};
use ring::hmac;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use tracing::{error, info, instrument, warn};

pub const DEFAULT_X_API_BASE_URL: &str = "https://api.x.com";
pub const DEFAULT_X_UPLOAD_BASE_URL: &str = "https://upload.twitter.com";

const SERVICE: &str = "x";

/// Longest text X accepts.
pub const MAX_TWEET_CHARS: usize = 280;

/// Static OAuth 1.0a user-context credentials.
#[derive(Clone)]
pub struct OAuthCredentials {
    pub consumer_key: String,
    pub consumer_secret: String,
    pub access_token: String,
    pub access_token_secret: String,
}

impl fmt::Debug for OAuthCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OAuthCredentials")
            .field("consumer_key", &self.consumer_key)
            .field("access_token", &"<redacted>")
            .finish()
    }
}

impl OAuthCredentials {
    /// All four values, or `None` if any is unset or a placeholder.
    pub fn complete(
        consumer_key: Option<&str>,
        consumer_secret: Option<&str>,
        access_token: Option<&str>,
        access_token_secret: Option<&str>,
    ) -> Option<Self> {
        Some(Self {
            consumer_key: configured(consumer_key)?,
            consumer_secret: configured(consumer_secret)?,
            access_token: configured(access_token)?,
            access_token_secret: configured(access_token_secret)?,
        })
    }

    /// `Authorization` header value for a request.
    ///
    /// `params` are the query parameters of the request; JSON and multipart
    /// bodies are not part of the signature.
    pub fn authorization_header(
        &self,
        method: &Method,
        url: &str,
        params: &[(&str, &str)],
        nonce: &str,
        timestamp: i64,
    ) -> String {
        let timestamp = timestamp.to_string();
        let oauth: [(&str, &str); 6] = [
            ("oauth_consumer_key", self.consumer_key.as_str()),
            ("oauth_nonce", nonce),
            ("oauth_signature_method", "HMAC-SHA1"),
            ("oauth_timestamp", timestamp.as_str()),
            ("oauth_token", self.access_token.as_str()),
            ("oauth_version", "1.0"),
        ];
        let all: Vec<(&str, &str)> = oauth.iter().chain(params.iter()).copied().collect();
        let base = signature_base_string(method.as_str(), url, &all);
        let signature = sign(&base, &self.consumer_secret, &self.access_token_secret);

        let fields = oauth
            .iter()
            .copied()
            .chain(std::iter::once(("oauth_signature", signature.as_str())))
            .sorted()
            .map(|(k, v)| format!("{}=\"{}\"", percent_encode(k), percent_encode(v)))
            .join(", ");
        format!("OAuth {fields}")
    }
}

/// RFC 3986 encoding: everything but `A-Z a-z 0-9 - . _ ~`.
pub fn percent_encode(s: &str) -> String {
    urlencoding::encode(s).into_owned()
}

/// `METHOD&url&params` where params are encoded, sorted and `&`-joined.
pub fn signature_base_string(method: &str, url: &str, params: &[(&str, &str)]) -> String {
    let normalized = params
        .iter()
        .map(|(k, v)| (percent_encode(k), percent_encode(v)))
        .sorted()
        .map(|(k, v)| format!("{k}={v}"))
        .join("&");
    format!(
        "{}&{}&{}",
        method.to_uppercase(),
        percent_encode(url),
        percent_encode(&normalized)
    )
}

/// HMAC-SHA1 over the base string, base64-encoded.
pub fn sign(base: &str, consumer_secret: &str, token_secret: &str) -> String {
    let signing_key = format!(
        "{}&{}",
        percent_encode(consumer_secret),
        percent_encode(token_secret)
    );
    let key = hmac::Key::new(hmac::HMAC_SHA1_FOR_LEGACY_USE_ONLY, signing_key.as_bytes());
    let tag = hmac::sign(&key, base.as_bytes());
    STANDARD.encode(tag.as_ref())
}

fn nonce() -> String {
    rng()
        .sample_iter(Alphanumeric)
        .take(32)
        .map(char::from)
        .collect()
}

/// Strip an optional `data:...;base64,` prefix and decode.
pub fn decode_base64_image(data: &str) -> Result<Vec<u8>, ApiError> {
    let payload = match data.split_once(',') {
        Some((_, rest)) => rest,
        None => data,
    };
    STANDARD
        .decode(payload.trim())
        .map_err(|e| ApiError::validation("image data", e.to_string()))
}

#[derive(Debug, Serialize)]
struct TweetMedia<'a> {
    media_ids: &'a [String],
}

#[derive(Debug, Serialize)]
struct TweetReply<'a> {
    in_reply_to_tweet_id: &'a str,
}

#[derive(Debug, Serialize)]
struct TweetRequest<'a> {
    text: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    media: Option<TweetMedia<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    reply: Option<TweetReply<'a>>,
}

#[derive(Debug, Deserialize)]
struct TweetData {
    id: String,
}

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    data: Option<T>,
}

#[derive(Debug, Deserialize)]
struct UploadResponse {
    media_id_string: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Me {
    username: String,
}

/// Posts announcements to X.
#[derive(Debug, Clone)]
pub struct TwitterPoster {
    service: ServiceClient,
    media_source: ServiceClient,
    credentials: OAuthCredentials,
    api_base: String,
    upload_base: String,
}

impl TwitterPoster {
    pub fn new(
        service: ServiceClient,
        media_source: ServiceClient,
        credentials: OAuthCredentials,
        api_base: impl Into<String>,
        upload_base: impl Into<String>,
    ) -> Self {
        Self {
            service,
            media_source,
            credentials,
            api_base: api_base.into().trim_end_matches('/').to_string(),
            upload_base: upload_base.into().trim_end_matches('/').to_string(),
        }
    }

    fn signed(&self, method: Method, url: &str) -> reqwest::RequestBuilder {
        let header = self.credentials.authorization_header(
            &method,
            url,
            &[],
            &nonce(),
            chrono::Utc::now().timestamp(),
        );
        self.service
            .http()
            .request(method, url)
            .header(reqwest::header::AUTHORIZATION, header)
    }

    /// Post a tweet. Text over 280 characters is cut to 277 plus `"..."`.
    #[instrument(level = "info", skip_all, fields(preview = %truncate_for_log(text, 50)))]
    pub async fn post_tweet(
        &self,
        text: &str,
        media_ids: &[String],
        reply_to: Option<&str>,
    ) -> Result<TweetResult, ApiError> {
        let text = if text.chars().count() > MAX_TWEET_CHARS {
            warn!(chars = text.chars().count(), "tweet too long; truncating");
            truncate_with_ellipsis(text, MAX_TWEET_CHARS)
        } else {
            text.to_string()
        };

        let url = format!("{}/2/tweets", self.api_base);
        let body = TweetRequest {
            text: &text,
            media: (!media_ids.is_empty()).then_some(TweetMedia { media_ids }),
            reply: reply_to.map(|id| TweetReply {
                in_reply_to_tweet_id: id,
            }),
        };
        let request = self
            .signed(Method::POST, &url)
            .timeout(Duration::from_secs(30))
            .json(&body);
        let response = self.service.send(request).await?;
        let envelope: Envelope<TweetData> = self.service.json(response).await?;
        let data = envelope
            .data
            .ok_or_else(|| ApiError::malformed(SERVICE, "tweet response had no data"))?;

        info!(id = %data.id, "tweet posted");
        Ok(TweetResult {
            url: format!("https://x.com/i/web/status/{}", data.id),
            id: data.id,
            text,
        })
    }

    /// Upload raw image bytes, returning the media id string.
    async fn upload_bytes(&self, bytes: Vec<u8>) -> Result<String, ApiError> {
        let url = format!("{}/1.1/media/upload.json", self.upload_base);
        let form = Form::new().part("media", Part::bytes(bytes).file_name("media"));
        let request = self
            .signed(Method::POST, &url)
            .timeout(Duration::from_secs(60))
            .multipart(form);
        let response = self.service.send(request).await?;
        let uploaded: UploadResponse = self.service.json(response).await?;
        let id = uploaded
            .media_id_string
            .ok_or_else(|| ApiError::malformed(SERVICE, "upload response had no media_id_string"))?;
        info!(media_id = %id, "media uploaded to X");
        Ok(id)
    }

    /// Download an image and upload it to X.
    pub async fn upload_media(&self, image_url: &str) -> Result<String, ApiError> {
        let file = self.media_source.download("x.download", image_url).await?;
        self.upload_bytes(file.bytes).await
    }

    /// Upload base64 image data; a `data:` URI prefix is accepted.
    pub async fn upload_media_from_base64(&self, data: &str) -> Result<String, ApiError> {
        let bytes = decode_base64_image(data)?;
        self.upload_bytes(bytes).await
    }

    /// Tweet with an image, falling back to text only when the upload fails.
    pub async fn post_tweet_with_image(&self, text: &str, image_url: &str) -> Result<TweetResult, ApiError> {
        let media_ids = match self.upload_media(image_url).await {
            Ok(id) => vec![id],
            Err(e) => {
                warn!(error = %e, "image upload failed; posting text only");
                Vec::new()
            }
        };
        self.post_tweet(text, &media_ids, None).await
    }

    pub async fn post_tweet_with_base64_image(&self, text: &str, data: &str) -> Result<TweetResult, ApiError> {
        let media_ids = match self.upload_media_from_base64(data).await {
            Ok(id) => vec![id],
            Err(e) => {
                warn!(error = %e, "image upload failed; posting text only");
                Vec::new()
            }
        };
        self.post_tweet(text, &media_ids, None).await
    }

    /// Username of the authenticated account.
    pub async fn verify_credentials(&self) -> Result<String, ApiError> {
        let url = format!("{}/2/users/me", self.api_base);
        let response = self
            .service
            .send_with_retry("x.users_me", || {
                self.signed(Method::GET, &url).timeout(Duration::from_secs(15))
            })
            .await
            .inspect_err(|e| error!(error = %e, "X credential check failed"))?;
        let me: Envelope<Me> = self.service.json(response).await?;
        let me = me
            .data
            .ok_or_else(|| ApiError::malformed(SERVICE, "users/me response had no data"))?;
        info!(username = %me.username, "X credentials verified");
        Ok(me.username)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::http::{RateLimit, RetryPolicy, build_client};
    use httpmock::prelude::*;
    use serde_json::json;

    fn creds() -> OAuthCredentials {
        OAuthCredentials::complete(Some("ck"), Some("cs"), Some("at"), Some("ats")).unwrap()
    }

    fn poster(server: &MockServer) -> TwitterPoster {
        let http = build_client(Duration::from_secs(5)).unwrap();
        let service = ServiceClient::new(SERVICE, http.clone(), RateLimit::new(50.0, 50.0), RetryPolicy::none());
        let media = ServiceClient::new("media", http, RateLimit::new(50.0, 50.0), RetryPolicy::none());
        TwitterPoster::new(service, media, creds(), server.base_url(), server.base_url())
    }

    #[test]
    fn test_incomplete_credentials() {
        assert!(OAuthCredentials::complete(Some("ck"), Some("cs"), Some("at"), None).is_none());
        assert!(
            OAuthCredentials::complete(Some("ck"), Some("your_secret_here"), Some("at"), Some("s"))
                .is_none()
        );
    }

    #[test]
    fn test_signature_base_string_sorts_and_encodes() {
        let base = signature_base_string(
            "post",
            "https://api.x.com/2/tweets",
            &[("b", "two words"), ("a", "x&y"), ("a", "1")],
        );
        assert_eq!(
            base,
            "POST&https%3A%2F%2Fapi.x.com%2F2%2Ftweets&a%3D1%26a%3Dx%2526y%26b%3Dtwo%2520words"
        );
    }

    #[test]
    fn test_sign_depends_on_secrets() {
        let base = "GET&https%3A%2F%2Fapi.x.com%2F2%2Fusers%2Fme&oauth_nonce%3Dabc";
        let a = sign(base, "cs", "ts");
        assert_eq!(a, sign(base, "cs", "ts"));
        assert_ne!(a, sign(base, "cs", "other"));
        // 20-byte HMAC-SHA1 digest -> 28 base64 characters
        assert_eq!(a.len(), 28);
    }

    #[test]
    fn test_authorization_header_fields() {
        let header = creds().authorization_header(
            &Method::POST,
            "https://api.x.com/2/tweets",
            &[],
            "nonce123",
            1_700_000_000,
        );
        assert!(header.starts_with("OAuth oauth_consumer_key=\"ck\", oauth_nonce=\"nonce123\", oauth_signature=\""));
        assert!(header.contains("oauth_signature_method=\"HMAC-SHA1\""));
        assert!(header.contains("oauth_timestamp=\"1700000000\""));
        assert!(header.contains("oauth_token=\"at\""));
        assert!(header.ends_with("oauth_version=\"1.0\""));
    }

    #[test]
    fn test_decode_base64_accepts_data_uri() {
        assert_eq!(decode_base64_image("data:image/png;base64,aGVsbG8=").unwrap(), b"hello");
        assert_eq!(decode_base64_image("aGVsbG8=").unwrap(), b"hello");
        assert_eq!(
            decode_base64_image("not base64!").unwrap_err().kind(),
            ErrorKind::Validation
        );
    }

    #[tokio::test]
    async fn test_post_tweet_truncates_and_returns_url() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/2/tweets")
                    .json_body_partial(r#"{"media":{"media_ids":["m1"]}}"#);
                then.status(201).json_body(json!({"data": {"id": "123", "text": "t"}}));
            })
            .await;

        let long = "a".repeat(300);
        let tweet = poster(&server)
            .post_tweet(&long, &["m1".to_string()], None)
            .await
            .unwrap();
        mock.assert_async().await;
        assert_eq!(tweet.id, "123");
        assert_eq!(tweet.url, "https://x.com/i/web/status/123");
        assert_eq!(tweet.text.chars().count(), 280);
        assert!(tweet.text.ends_with("..."));
    }

    #[tokio::test]
    async fn test_post_tweet_with_image_falls_back_to_text() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/missing.jpg");
                then.status(404);
            })
            .await;
        let tweet_mock = server
            .mock_async(|when, then| {
                when.method(POST).path("/2/tweets");
                then.status(201).json_body(json!({"data": {"id": "9"}}));
            })
            .await;

        let result = poster(&server)
            .post_tweet_with_image("hello", &server.url("/missing.jpg"))
            .await
            .unwrap();
        assert_eq!(result.id, "9");
        tweet_mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_upload_media_from_base64() {
        let server = MockServer::start_async().await;
        let upload = server
            .mock_async(|when, then| {
                when.method(POST).path("/1.1/media/upload.json");
                then.status(200).json_body(json!({"media_id": 555, "media_id_string": "555"}));
            })
            .await;

        let id = poster(&server)
            .upload_media_from_base64("data:image/png;base64,aGVsbG8=")
            .await
            .unwrap();
        assert_eq!(id, "555");
        upload.assert_async().await;
    }

    #[tokio::test]
    async fn test_post_tweet_with_base64_image_attaches_media() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/1.1/media/upload.json");
                then.status(200).json_body(json!({"media_id_string": "777"}));
            })
            .await;
        let tweet_mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/2/tweets")
                    .json_body_partial(r#"{"text":"chart","media":{"media_ids":["777"]}}"#);
                then.status(201).json_body(json!({"data": {"id": "42"}}));
            })
            .await;

        let result = poster(&server)
            .post_tweet_with_base64_image("chart", "data:image/png;base64,aGVsbG8=")
            .await
            .unwrap();
        assert_eq!(result.id, "42");
        tweet_mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_post_tweet_with_bad_base64_posts_text_only() {
        let server = MockServer::start_async().await;
        let upload = server
            .mock_async(|when, then| {
                when.method(POST).path("/1.1/media/upload.json");
                then.status(200).json_body(json!({"media_id_string": "777"}));
            })
            .await;
        let tweet_mock = server
            .mock_async(|when, then| {
                when.method(POST).path("/2/tweets").json_body(json!({"text": "chart"}));
                then.status(201).json_body(json!({"data": {"id": "43"}}));
            })
            .await;

        let result = poster(&server)
            .post_tweet_with_base64_image("chart", "not base64!")
            .await
            .unwrap();
        assert_eq!(result.id, "43");
        tweet_mock.assert_async().await;
        assert_eq!(upload.hits_async().await, 0);
    }

    #[tokio::test]
    async fn test_verify_credentials() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/2/users/me");
                then.status(200).json_body(json!({"data": {"id": "1", "username": "newsbot"}}));
            })
            .await;
        assert_eq!(poster(&server).verify_credentials().await.unwrap(), "newsbot");
    }

    #[tokio::test]
    async fn test_rejected_credentials() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/2/users/me");
                then.status(401).body("Unauthorized");
            })
            .await;
        let err = poster(&server).verify_credentials().await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Auth);
    }
}
