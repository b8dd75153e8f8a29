//! Config handling

use std::sync::Arc;
use std::time::Duration;

use tracing::log::LevelFilter;
use url::Url;

use crate::cli::CliOptions;
use crate::constants::{
    DEFAULT_DOWNLOAD_TIMEOUT, DEFAULT_PHOTOROOM_EDIT_URL, DEFAULT_PHOTOROOM_SEGMENT_URL,
    DEFAULT_POLL_INTERVAL, DEFAULT_REPLICATE_BASE_URL, MAX_BODY_BYTES,
};
use crate::error::GatewayError;
use crate::preprocess::Constraints;
use crate::retry::RetryPolicy;

/// Sets up logging based on the debug flag
pub fn setup_logging(debug: bool) -> Result<(), Box<std::io::Error>> {
    let level = if debug {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };

    let mut logger = simple_logger::SimpleLogger::new().with_level(level);
    if !debug {
        logger = logger
            .with_module_level("tracing", LevelFilter::Warn)
            .with_module_level("rustls", LevelFilter::Info)
            .with_module_level("hyper_util", LevelFilter::Info)
            .with_module_level("reqwest", LevelFilter::Info)
            .with_module_level("h2", LevelFilter::Info);
    }
    logger.init().map_err(|err| {
        eprintln!("Failed to initialize logger: {}", err);
        Box::new(std::io::Error::other(err))
    })
}

/// An API secret. Only a short prefix ever reaches `Debug` output or logs.
#[derive(Clone, Eq, PartialEq)]
pub struct Credential(Arc<str>);

impl Credential {
    /// Wraps a secret; blank strings count as absent.
    pub fn new(secret: &str) -> Option<Self> {
        let secret = secret.trim();
        (!secret.is_empty()).then(|| Self(Arc::from(secret)))
    }

    /// The secret, for building auth headers and payloads.
    pub fn expose(&self) -> &str {
        &self.0
    }

    /// Short prefix for log lines.
    pub fn redacted(&self) -> String {
        let prefix: String = self.0.chars().take(4).collect();
        format!("{prefix}... ({} chars)", self.0.chars().count())
    }
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Credential({})", self.redacted())
    }
}

/// Resolved gateway configuration, built once at startup and shared read-only.
#[derive(Clone, Debug)]
pub struct GatewayConfig {
    /// Replicate token, used for both text-to-image models
    pub replicate_token: Option<Credential>,
    /// OpenAI key forwarded to the primary model; without it the primary is skipped
    pub openai_key: Option<Credential>,
    /// PhotoRoom key for edit operations
    pub photoroom_key: Option<Credential>,
    /// Replicate API root
    pub replicate_base_url: String,
    /// PhotoRoom expansion endpoint
    pub photoroom_segment_url: String,
    /// PhotoRoom text removal endpoint
    pub photoroom_edit_url: String,
    /// Retry policy applied to every provider invocation
    pub retry: RetryPolicy,
    /// Timeout for fetching caller-supplied images
    pub download_timeout: Duration,
    /// Largest image body accepted from a download
    pub max_download_bytes: usize,
    /// Delay between polls of a running prediction
    pub poll_interval: Duration,
    /// Ceilings applied to uploads before they go upstream
    pub input_constraints: Constraints,
    /// How many format/feature combinations run at once
    pub fanout_concurrency: usize,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            replicate_token: None,
            openai_key: None,
            photoroom_key: None,
            replicate_base_url: DEFAULT_REPLICATE_BASE_URL.to_string(),
            photoroom_segment_url: DEFAULT_PHOTOROOM_SEGMENT_URL.to_string(),
            photoroom_edit_url: DEFAULT_PHOTOROOM_EDIT_URL.to_string(),
            retry: RetryPolicy::default(),
            download_timeout: DEFAULT_DOWNLOAD_TIMEOUT,
            max_download_bytes: MAX_BODY_BYTES,
            poll_interval: DEFAULT_POLL_INTERVAL,
            input_constraints: Constraints::default(),
            fanout_concurrency: 1,
        }
    }
}

impl GatewayConfig {
    /// Resolves the CLI/env options, validating endpoint URLs.
    pub fn from_cli(cli: &CliOptions) -> Result<Self, GatewayError> {
        let config = Self {
            replicate_token: cli.replicate_api_token.as_deref().and_then(Credential::new),
            openai_key: cli.openai_api_key.as_deref().and_then(Credential::new),
            photoroom_key: cli.photoroom_api_key.as_deref().and_then(Credential::new),
            replicate_base_url: validate_endpoint("replicate base url", &cli.replicate_base_url)?,
            photoroom_segment_url: validate_endpoint(
                "photoroom segment url",
                &cli.photoroom_segment_url,
            )?,
            photoroom_edit_url: validate_endpoint("photoroom edit url", &cli.photoroom_edit_url)?,
            retry: RetryPolicy {
                max_attempts: cli.max_attempts.max(1),
                base_delay: Duration::from_millis(cli.retry_base_delay_ms),
                attempt_timeout: Duration::from_secs(cli.attempt_timeout_secs.max(1)),
                retry_auth_failures: cli.retry_auth_failures,
            },
            fanout_concurrency: cli.fanout_concurrency.max(1),
            input_constraints: if cli.jpeg_uploads {
                Constraints::jpeg()
            } else {
                Constraints::default()
            },
            ..Self::default()
        };
        Ok(config)
    }

    /// Replicate token, or a configuration error naming the variable.
    pub fn replicate_token(&self) -> Result<&Credential, GatewayError> {
        self.replicate_token.as_ref().ok_or_else(|| {
            GatewayError::Configuration("REPLICATE_API_TOKEN is not configured".to_string())
        })
    }

    /// PhotoRoom key, or a configuration error naming the variable.
    pub fn photoroom_key(&self) -> Result<&Credential, GatewayError> {
        self.photoroom_key.as_ref().ok_or_else(|| {
            GatewayError::Configuration("PHOTOROOM_API_KEY is not configured".to_string())
        })
    }

    /// Logs which credentials are present, never their values.
    pub fn log_summary(&self) {
        tracing::info!(
            "REPLICATE_API_TOKEN present: {}",
            self.replicate_token.is_some()
        );
        tracing::info!("OPENAI_API_KEY present: {}", self.openai_key.is_some());
        tracing::info!(
            "PHOTOROOM_API_KEY present: {}",
            self.photoroom_key.is_some()
        );
        if self.openai_key.is_none() {
            tracing::warn!("OPENAI_API_KEY is not set - generation will only use the backup model");
        }
        tracing::debug!(
            "retry policy: {} attempts, {}ms base delay, {}s timeout",
            self.retry.max_attempts,
            self.retry.base_delay.as_millis(),
            self.retry.attempt_timeout.as_secs()
        );
    }

    /// Default settings for tests, with throwaway credentials and fast retries.
    #[cfg(test)]
    pub(crate) fn for_tests() -> Self {
        Self {
            replicate_token: Credential::new("r8_test_token"),
            openai_key: Credential::new("sk-test-key"),
            photoroom_key: Credential::new("pr-test-key"),
            retry: RetryPolicy {
                max_attempts: 3,
                base_delay: crate::constants::TEST_RETRY_DELAY,
                attempt_timeout: Duration::from_secs(5),
                retry_auth_failures: false,
            },
            poll_interval: Duration::from_millis(5),
            ..Self::default()
        }
    }
}

fn validate_endpoint(name: &str, value: &str) -> Result<String, GatewayError> {
    let parsed = Url::parse(value)
        .map_err(|err| GatewayError::Configuration(format!("invalid {name} '{value}': {err}")))?;
    match parsed.scheme() {
        "http" | "https" => Ok(value.trim_end_matches('/').to_string()),
        scheme => Err(GatewayError::Configuration(format!(
            "invalid {name} '{value}': unsupported scheme {scheme}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::preprocess::OutputEncoding;
    use clap::Parser;

    #[test]
    fn credentials_are_redacted_in_debug_output() {
        let credential = Credential::new("r8_supersecretvalue").expect("non-empty");
        let rendered = format!("{credential:?}");
        assert!(rendered.contains("r8_s..."));
        assert!(!rendered.contains("supersecret"));
        assert!(Credential::new("   ").is_none());
    }

    #[test]
    fn cli_options_resolve_into_config() {
        let cli = CliOptions::parse_from([
            "staticgenius",
            "--replicate-api-token",
            "r8_abc",
            "--max-attempts",
            "5",
            "--retry-base-delay-ms",
            "10",
            "--replicate-base-url",
            "http://127.0.0.1:9999/",
        ]);
        let config = GatewayConfig::from_cli(&cli).expect("valid config");
        assert_eq!(config.retry.max_attempts, 5);
        assert_eq!(config.retry.base_delay, Duration::from_millis(10));
        assert_eq!(config.replicate_base_url, "http://127.0.0.1:9999");
        assert!(config.replicate_token().is_ok());
        assert!(matches!(
            config.photoroom_key(),
            Err(GatewayError::Configuration(_))
        ));
        assert_eq!(config.input_constraints.encoding, OutputEncoding::Png);
        assert_eq!(config.max_download_bytes, MAX_BODY_BYTES);
    }

    #[test]
    fn jpeg_uploads_switch_the_output_encoding() {
        let cli = CliOptions::parse_from(["staticgenius", "--jpeg-uploads"]);
        let config = GatewayConfig::from_cli(&cli).expect("valid config");
        assert_eq!(
            config.input_constraints.encoding,
            Constraints::jpeg().encoding
        );
        assert!(matches!(
            config.input_constraints.encoding,
            OutputEncoding::Jpeg { .. }
        ));
    }

    #[test]
    fn bad_endpoints_are_rejected() {
        let cli = CliOptions::parse_from([
            "staticgenius",
            "--photoroom-edit-url",
            "ftp://example.org/edit",
        ]);
        assert!(matches!(
            GatewayConfig::from_cli(&cli),
            Err(GatewayError::Configuration(_))
        ));
    }
}
