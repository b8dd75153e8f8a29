//! Error handling

use std::time::Duration;

use axum::Json;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;
use tracing::{error, info, warn};

use crate::model::{ProviderId, iso_timestamp_now};

/// What went wrong talking to an upstream provider.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum UpstreamErrorKind {
    /// Connection, TLS or body read failure
    Transport,
    /// The provider answered with a non-success HTTP status
    Status(u16),
    /// The provider accepted the call but reported a failure in its payload
    Provider,
    /// The attempt ran past its timeout
    Timeout,
    /// The adapter was handed a payload it cannot translate
    Unsupported,
}

/// A failed call to an upstream provider.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct UpstreamError {
    /// Failure class
    pub kind: UpstreamErrorKind,
    /// Human readable detail, truncated provider body where there is one
    pub message: String,
}

/// Upstream bodies are clipped to this many chars in error messages.
const MAX_UPSTREAM_BODY_CHARS: usize = 300;

impl UpstreamError {
    /// Transport level failure.
    pub fn transport(message: impl Into<String>) -> Self {
        Self {
            kind: UpstreamErrorKind::Transport,
            message: message.into(),
        }
    }

    /// Non-success HTTP status, with the response body as detail.
    pub fn status(code: u16, body: &str) -> Self {
        let mut message: String = body.chars().take(MAX_UPSTREAM_BODY_CHARS).collect();
        if message.is_empty() {
            message = "empty response body".to_string();
        }
        Self {
            kind: UpstreamErrorKind::Status(code),
            message,
        }
    }

    /// Provider reported failure inside a successful response.
    pub fn provider(message: impl Into<String>) -> Self {
        Self {
            kind: UpstreamErrorKind::Provider,
            message: message.into(),
        }
    }

    /// Attempt timed out.
    pub fn timeout(after: Duration) -> Self {
        Self {
            kind: UpstreamErrorKind::Timeout,
            message: format!("no response after {}ms", after.as_millis()),
        }
    }

    /// Payload shape not supported by the adapter.
    pub fn unsupported(message: impl Into<String>) -> Self {
        Self {
            kind: UpstreamErrorKind::Unsupported,
            message: message.into(),
        }
    }

    /// HTTP status code, when the provider returned one.
    pub fn code(&self) -> Option<u16> {
        match self.kind {
            UpstreamErrorKind::Status(code) => Some(code),
            _ => None,
        }
    }

    /// 401 and 403 can't succeed on retry with the same credential.
    pub fn is_auth_failure(&self) -> bool {
        matches!(self.code(), Some(401) | Some(403))
    }
}

impl std::fmt::Display for UpstreamError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.kind {
            UpstreamErrorKind::Transport => write!(f, "transport error: {}", self.message),
            UpstreamErrorKind::Status(code) => write!(f, "HTTP {code}: {}", self.message),
            UpstreamErrorKind::Provider => write!(f, "provider error: {}", self.message),
            UpstreamErrorKind::Timeout => write!(f, "timed out: {}", self.message),
            UpstreamErrorKind::Unsupported => write!(f, "unsupported call: {}", self.message),
        }
    }
}

impl std::error::Error for UpstreamError {}

impl From<reqwest::Error> for UpstreamError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            return Self {
                kind: UpstreamErrorKind::Timeout,
                message: err.to_string(),
            };
        }
        match err.status() {
            Some(status) => Self::status(status.as_u16(), &err.to_string()),
            None => Self::transport(err.to_string()),
        }
    }
}

impl From<crate::fetch::FetchError> for UpstreamError {
    fn from(err: crate::fetch::FetchError) -> Self {
        match err {
            crate::fetch::FetchError::Transport(message) => Self::transport(message),
            crate::fetch::FetchError::Status(code) => Self::status(code, ""),
            other => Self::provider(other.to_string()),
        }
    }
}

/// The terminal error of one provider in a fallback chain.
#[derive(Clone, Debug)]
pub struct ProviderFailure {
    /// Which provider failed
    pub provider: ProviderId,
    /// Rendered terminal error
    pub message: String,
}

impl ProviderFailure {
    /// Records `err` as the terminal failure of `provider`.
    pub fn new(provider: ProviderId, err: &GatewayError) -> Self {
        Self {
            provider,
            message: err.to_string(),
        }
    }
}

/// Errors surfaced by the gateway.
#[derive(Debug)]
pub enum GatewayError {
    /// A credential or setting is missing or malformed
    Configuration(String),
    /// Missing or malformed request field
    InvalidRequest(String),
    /// Image bytes could not be decoded
    InvalidImageData(String),
    /// An upstream call failed after the retry budget
    Upstream(UpstreamError),
    /// The provider answered but nothing usable could be extracted
    NoUsableImages(String),
    /// The local degraded transformation failed
    FallbackTransform(String),
    /// Every strategy failed; one entry per provider tried
    Exhausted(Vec<ProviderFailure>),
    /// Anything else
    Internal(String),
}

impl std::fmt::Display for GatewayError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Configuration(msg) => write!(f, "configuration error: {msg}"),
            Self::InvalidRequest(msg) => write!(f, "invalid request: {msg}"),
            Self::InvalidImageData(msg) => write!(f, "invalid image data: {msg}"),
            Self::Upstream(err) => write!(f, "upstream error: {err}"),
            Self::NoUsableImages(msg) => write!(f, "no usable images: {msg}"),
            Self::FallbackTransform(msg) => write!(f, "local fallback failed: {msg}"),
            Self::Exhausted(failures) => {
                write!(f, "all providers failed")?;
                for (index, failure) in failures.iter().enumerate() {
                    let sep = if index == 0 { ": " } else { "; " };
                    write!(f, "{sep}{} ({})", failure.provider, failure.message)?;
                }
                Ok(())
            }
            Self::Internal(msg) => write!(f, "internal error: {msg}"),
        }
    }
}

impl std::error::Error for GatewayError {}

impl From<UpstreamError> for GatewayError {
    fn from(err: UpstreamError) -> Self {
        GatewayError::Upstream(err)
    }
}

impl From<image::ImageError> for GatewayError {
    fn from(err: image::ImageError) -> Self {
        GatewayError::InvalidImageData(err.to_string())
    }
}

impl From<axum::extract::multipart::MultipartError> for GatewayError {
    fn from(err: axum::extract::multipart::MultipartError) -> Self {
        GatewayError::InvalidRequest(err.body_text())
    }
}

impl From<tokio::task::JoinError> for GatewayError {
    fn from(err: tokio::task::JoinError) -> Self {
        GatewayError::Internal(format!("image worker failed: {err}"))
    }
}

impl From<std::io::Error> for GatewayError {
    fn from(err: std::io::Error) -> Self {
        GatewayError::Internal(err.to_string())
    }
}

impl GatewayError {
    /// HTTP status this error maps to.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidRequest(_) | Self::InvalidImageData(_) => StatusCode::BAD_REQUEST,
            Self::Configuration(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Upstream(_)
            | Self::NoUsableImages(_)
            | Self::FallbackTransform(_)
            | Self::Exhausted(_) => StatusCode::BAD_GATEWAY,
        }
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> axum::response::Response {
        let status = self.status_code();
        let message = self.to_string();
        let body = match &self {
            GatewayError::InvalidRequest(_) | GatewayError::InvalidImageData(_) => {
                info!("Rejected request: {}", message);
                json!({ "error": message, "timestamp": iso_timestamp_now() })
            }
            GatewayError::Exhausted(failures) => {
                warn!("Request failed on every provider: {}", message);
                let attempts: Vec<_> = failures
                    .iter()
                    .map(|failure| {
                        json!({
                            "provider": failure.provider.to_string(),
                            "error": failure.message,
                        })
                    })
                    .collect();
                json!({
                    "error": message,
                    "attempts": attempts,
                    "timestamp": iso_timestamp_now(),
                })
            }
            _ => {
                error!("Request failed: {}", message);
                json!({ "error": message, "timestamp": iso_timestamp_now() })
            }
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auth_statuses_are_flagged() {
        assert!(UpstreamError::status(401, "nope").is_auth_failure());
        assert!(UpstreamError::status(403, "nope").is_auth_failure());
        assert!(!UpstreamError::status(500, "boom").is_auth_failure());
        assert!(!UpstreamError::transport("reset").is_auth_failure());
    }

    #[test]
    fn long_bodies_are_clipped() {
        let body = "x".repeat(2000);
        let err = UpstreamError::status(502, &body);
        assert_eq!(err.message.len(), MAX_UPSTREAM_BODY_CHARS);
        assert_eq!(err.code(), Some(502));
    }

    #[test]
    fn oversized_bodies_are_provider_errors() {
        let err = UpstreamError::from(crate::fetch::FetchError::TooLarge(1024));
        assert_eq!(err.kind, UpstreamErrorKind::Provider);
        assert!(err.message.contains("1024 bytes"), "{}", err.message);
        assert!(!err.is_auth_failure());
    }

    #[test]
    fn composite_error_lists_every_provider() {
        let err = GatewayError::Exhausted(vec![
            ProviderFailure {
                provider: ProviderId::PrimaryGenerate,
                message: "HTTP 500: down".to_string(),
            },
            ProviderFailure {
                provider: ProviderId::BackupGenerate,
                message: "timed out".to_string(),
            },
        ]);
        let rendered = err.to_string();
        assert!(rendered.contains("openai/gpt-image-1 (HTTP 500: down)"));
        assert!(rendered.contains("google/imagen-4 (timed out)"));
        assert_eq!(err.status_code(), StatusCode::BAD_GATEWAY);
    }
}
