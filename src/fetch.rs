//! Fetching caller-supplied images, from the network or from data URIs.

use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose;
use tracing::debug;
use url::Url;

use crate::model::InputImage;

/// Why a source image could not be fetched.
#[derive(Debug)]
pub enum FetchError {
    /// Not an http(s) URL or a base64 data URI
    UnsupportedSource(String),
    /// Network failure or timeout
    Transport(String),
    /// Server answered with a non-success status
    Status(u16),
    /// Body could not be decoded
    Decode(String),
    /// Body is larger than the allowed number of bytes
    TooLarge(usize),
}

impl std::fmt::Display for FetchError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnsupportedSource(source) => write!(f, "unsupported image source: {source}"),
            Self::Transport(err) => write!(f, "download failed: {err}"),
            Self::Status(code) => write!(f, "download failed with HTTP {code}"),
            Self::Decode(err) => write!(f, "could not decode image payload: {err}"),
            Self::TooLarge(limit) => write!(f, "response body exceeds {limit} bytes"),
        }
    }
}

impl std::error::Error for FetchError {}

/// Encodes bytes as a base64 data URI.
pub fn to_data_uri(mime: &str, bytes: &[u8]) -> String {
    format!(
        "data:{mime};base64,{}",
        general_purpose::STANDARD.encode(bytes)
    )
}

/// Reads a response body, giving up as soon as it passes `limit` bytes.
pub async fn read_capped(
    mut response: reqwest::Response,
    limit: usize,
) -> Result<Vec<u8>, FetchError> {
    if response
        .content_length()
        .is_some_and(|length| length > limit as u64)
    {
        return Err(FetchError::TooLarge(limit));
    }
    let mut body = Vec::new();
    while let Some(chunk) = response
        .chunk()
        .await
        .map_err(|err| FetchError::Transport(err.to_string()))?
    {
        if body.len() + chunk.len() > limit {
            return Err(FetchError::TooLarge(limit));
        }
        body.extend_from_slice(&chunk);
    }
    Ok(body)
}

/// Decodes a `data:<mime>;base64,<payload>` URI.
pub fn parse_data_uri(uri: &str) -> Result<InputImage, FetchError> {
    let rest = uri
        .strip_prefix("data:")
        .ok_or_else(|| FetchError::UnsupportedSource("not a data URI".to_string()))?;
    let (header, payload) = rest
        .split_once(',')
        .ok_or_else(|| FetchError::Decode("data URI has no payload".to_string()))?;
    let mime = header.strip_suffix(";base64").ok_or_else(|| {
        FetchError::UnsupportedSource("data URI is not base64 encoded".to_string())
    })?;
    let bytes = general_purpose::STANDARD
        .decode(payload.trim())
        .map_err(|err| FetchError::Decode(err.to_string()))?;
    let mime = if mime.is_empty() { "image/png" } else { mime };
    Ok(InputImage {
        bytes,
        mime: mime.to_string(),
    })
}

/// Fetches the image behind `source`, which is an http(s) URL or a data URI.
/// Bodies over `max_bytes` are refused.
pub async fn fetch_image(
    client: &reqwest::Client,
    source: &str,
    timeout: Duration,
    max_bytes: usize,
) -> Result<InputImage, FetchError> {
    let source = source.trim();
    if source.starts_with("data:") {
        let image = parse_data_uri(source)?;
        if image.bytes.len() > max_bytes {
            return Err(FetchError::TooLarge(max_bytes));
        }
        return Ok(image);
    }

    let url = Url::parse(source).map_err(|err| FetchError::UnsupportedSource(err.to_string()))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(FetchError::UnsupportedSource(format!(
            "scheme {} is not allowed",
            url.scheme()
        )));
    }

    debug!("Downloading source image from {}", url);
    let response = client
        .get(url)
        .timeout(timeout)
        .send()
        .await
        .map_err(|err| FetchError::Transport(err.to_string()))?;
    let status = response.status();
    if !status.is_success() {
        return Err(FetchError::Status(status.as_u16()));
    }
    let mime = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .filter(|value| value.starts_with("image/"))
        .unwrap_or("image/png")
        .to_string();
    let bytes = read_capped(response, max_bytes).await?;
    debug!("Downloaded {} bytes ({})", bytes.len(), mime);
    Ok(InputImage { bytes, mime })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn data_uris_round_trip() {
        let uri = to_data_uri("image/jpeg", b"\xff\xd8\xff");
        assert!(uri.starts_with("data:image/jpeg;base64,"));
        let image = parse_data_uri(&uri).expect("valid data uri");
        assert_eq!(image.mime, "image/jpeg");
        assert_eq!(image.bytes, b"\xff\xd8\xff");
    }

    #[test]
    fn malformed_data_uris_are_rejected() {
        assert!(matches!(
            parse_data_uri("data:image/png,plain"),
            Err(FetchError::UnsupportedSource(_))
        ));
        assert!(matches!(
            parse_data_uri("data:image/png;base64,@@@"),
            Err(FetchError::Decode(_))
        ));
    }

    #[tokio::test]
    async fn non_http_sources_are_refused_without_a_request() {
        let client = reqwest::Client::new();
        let result = fetch_image(&client, "file:///etc/passwd", Duration::from_secs(1), 1024).await;
        assert!(matches!(result, Err(FetchError::UnsupportedSource(_))));
        let result = fetch_image(&client, "not a url", Duration::from_secs(1), 1024).await;
        assert!(matches!(result, Err(FetchError::UnsupportedSource(_))));
    }

    #[tokio::test]
    async fn oversized_data_uris_are_refused() {
        let client = reqwest::Client::new();
        let uri = to_data_uri("image/png", &[7u8; 2048]);
        let result = fetch_image(&client, &uri, Duration::from_secs(1), 1024).await;
        assert!(matches!(result, Err(FetchError::TooLarge(1024))));
        let image = fetch_image(&client, &uri, Duration::from_secs(1), 4096)
            .await
            .expect("under the cap");
        assert_eq!(image.bytes.len(), 2048);
    }
}
