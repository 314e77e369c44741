//! Typed errors for outbound API calls and pipeline steps.
//!
//! Every external call returns [`ApiError`], which keeps transport failures,
//! credential problems, missing resources and malformed payloads apart. The
//! orchestrator wraps a failure of a critical step in [`PipelineError`].

use crate::pipeline::Step;
use std::time::Duration;
use thiserror::Error;

/// Coarse classification of an [`ApiError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Credentials or base URL missing locally; no request was made.
    NotConfigured,
    /// Connection, TLS, timeout or body read failure.
    Transport,
    /// 401 or 403.
    Auth,
    /// 404.
    NotFound,
    /// 429.
    RateLimited,
    /// Any other 4xx.
    Client,
    /// 5xx.
    Server,
    /// The body did not have the expected shape.
    Malformed,
    /// A payload we built locally was rejected before sending.
    Validation,
    /// Reading or writing a local file.
    Io,
}

/// Error returned by every external API client in this crate.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{service} is not configured: {what}")]
    NotConfigured {
        service: &'static str,
        what: &'static str,
    },

    #[error("{service} request failed: {source}")]
    Transport {
        service: &'static str,
        #[source]
        source: reqwest::Error,
    },

    #[error("{service} rejected the credentials (HTTP 401): {body}")]
    Unauthorized { service: &'static str, body: String },

    #[error("{service} denied permission (HTTP 403): {body}")]
    Forbidden { service: &'static str, body: String },

    #[error("{service} returned 404 for {url}")]
    NotFound { service: &'static str, url: String },

    #[error("{service} is rate limiting requests")]
    RateLimited {
        service: &'static str,
        retry_after: Option<Duration>,
    },

    #[error("{service} returned HTTP {status}: {body}")]
    Status {
        service: &'static str,
        status: u16,
        body: String,
    },

    #[error("{service} returned an unexpected response: {detail}")]
    MalformedResponse {
        service: &'static str,
        detail: String,
    },

    #[error("invalid {field}: {reason}")]
    Validation { field: &'static str, reason: String },

    #[error("could not write {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

impl ApiError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ApiError::NotConfigured { .. } => ErrorKind::NotConfigured,
            ApiError::Transport { .. } => ErrorKind::Transport,
            ApiError::Unauthorized { .. } | ApiError::Forbidden { .. } => ErrorKind::Auth,
            ApiError::NotFound { .. } => ErrorKind::NotFound,
            ApiError::RateLimited { .. } => ErrorKind::RateLimited,
            ApiError::Status { status, .. } if *status >= 500 => ErrorKind::Server,
            ApiError::Status { .. } => ErrorKind::Client,
            ApiError::MalformedResponse { .. } => ErrorKind::Malformed,
            ApiError::Validation { .. } => ErrorKind::Validation,
            ApiError::Io { .. } => ErrorKind::Io,
        }
    }

    /// Whether retrying the same request can reasonably succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::Transport | ErrorKind::RateLimited | ErrorKind::Server
        )
    }

    /// Map a reqwest failure, separating body decode errors from transport ones.
    pub fn transport(service: &'static str, source: reqwest::Error) -> Self {
        if source.is_decode() {
            ApiError::MalformedResponse {
                service,
                detail: source.to_string(),
            }
        } else {
            ApiError::Transport { service, source }
        }
    }

    pub fn malformed(service: &'static str, detail: impl Into<String>) -> Self {
        ApiError::MalformedResponse {
            service,
            detail: detail.into(),
        }
    }

    pub fn not_configured(service: &'static str, what: &'static str) -> Self {
        ApiError::NotConfigured { service, what }
    }

    pub fn validation(field: &'static str, reason: impl Into<String>) -> Self {
        ApiError::Validation {
            field,
            reason: reason.into(),
        }
    }
}

/// A critical pipeline step failed; the current article cannot be published.
#[derive(Debug, Error)]
#[error("critical step {step} failed: {source}")]
pub struct PipelineError {
    pub step: Step,
    #[source]
    pub source: ApiError,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_for_status_codes() {
        let server = ApiError::Status {
            service: "wordpress",
            status: 502,
            body: String::new(),
        };
        let client = ApiError::Status {
            service: "wordpress",
            status: 400,
            body: String::new(),
        };
        assert_eq!(server.kind(), ErrorKind::Server);
        assert_eq!(client.kind(), ErrorKind::Client);
        assert!(server.is_transient());
        assert!(!client.is_transient());
    }

    #[test]
    fn test_auth_errors_are_not_transient() {
        let e = ApiError::Unauthorized {
            service: "wordpress",
            body: "bad token".into(),
        };
        assert_eq!(e.kind(), ErrorKind::Auth);
        assert!(!e.is_transient());
        assert!(e.to_string().contains("401"));
    }

    #[test]
    fn test_rate_limited_is_transient() {
        let e = ApiError::RateLimited {
            service: "pexels",
            retry_after: None,
        };
        assert!(e.is_transient());
    }

    #[test]
    fn test_pipeline_error_display_names_step() {
        let e = PipelineError {
            step: Step::CreatePost,
            source: ApiError::not_configured("wordpress", "BEARER_TOKEN"),
        };
        let msg = e.to_string();
        assert!(msg.contains("create_post"));
        assert!(msg.contains("BEARER_TOKEN"));
    }
}
