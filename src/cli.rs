//! CLI parser
use clap::Parser;
use std::num::NonZeroU16;

use crate::constants::{
    DEFAULT_PHOTOROOM_EDIT_URL, DEFAULT_PHOTOROOM_SEGMENT_URL, DEFAULT_REPLICATE_BASE_URL,
};

#[derive(Parser, Debug)]
/// CLI Options
pub struct CliOptions {
    #[clap(long, help = "Enable debug logging", env = "STATICGENIUS_DEBUG")]
    /// Enable debug logging. Env: STATICGENIUS_DEBUG
    pub debug: bool,
    #[clap(long, short, default_value = "3001", env = "PORT")]
    /// http listener, defaults to `3001`.
    /// Env: PORT
    pub port: NonZeroU16,
    #[clap(
        long,
        short,
        default_value = "127.0.0.1",
        env = "STATICGENIUS_LISTEN_ADDRESS"
    )]
    /// Listen address, defaults to `127.0.0.1`.
    /// Env: STATICGENIUS_LISTEN_ADDRESS
    pub listen_address: String,

    #[clap(long, env = "REPLICATE_API_TOKEN", hide_env_values = true)]
    /// Replicate API token. Env: REPLICATE_API_TOKEN
    pub replicate_api_token: Option<String>,
    #[clap(long, env = "OPENAI_API_KEY", hide_env_values = true)]
    /// OpenAI key passed through to gpt-image-1. Env: OPENAI_API_KEY
    pub openai_api_key: Option<String>,
    #[clap(long, env = "PHOTOROOM_API_KEY", hide_env_values = true)]
    /// PhotoRoom API key. Env: PHOTOROOM_API_KEY
    pub photoroom_api_key: Option<String>,

    #[clap(long, default_value = DEFAULT_REPLICATE_BASE_URL, env = "STATICGENIUS_REPLICATE_URL")]
    /// Replicate API root. Env: STATICGENIUS_REPLICATE_URL
    pub replicate_base_url: String,
    #[clap(long, default_value = DEFAULT_PHOTOROOM_SEGMENT_URL, env = "STATICGENIUS_PHOTOROOM_SEGMENT_URL")]
    /// PhotoRoom expansion endpoint. Env: STATICGENIUS_PHOTOROOM_SEGMENT_URL
    pub photoroom_segment_url: String,
    #[clap(long, default_value = DEFAULT_PHOTOROOM_EDIT_URL, env = "STATICGENIUS_PHOTOROOM_EDIT_URL")]
    /// PhotoRoom text removal endpoint. Env: STATICGENIUS_PHOTOROOM_EDIT_URL
    pub photoroom_edit_url: String,

    #[clap(long, default_value = "3", env = "STATICGENIUS_MAX_ATTEMPTS")]
    /// Attempts per provider before falling back. Env: STATICGENIUS_MAX_ATTEMPTS
    pub max_attempts: u32,
    #[clap(long, default_value = "2000", env = "STATICGENIUS_RETRY_BASE_DELAY_MS")]
    /// Linear backoff base, in milliseconds. Env: STATICGENIUS_RETRY_BASE_DELAY_MS
    pub retry_base_delay_ms: u64,
    #[clap(long, default_value = "45", env = "STATICGENIUS_ATTEMPT_TIMEOUT_SECS")]
    /// Timeout for a single provider attempt. Env: STATICGENIUS_ATTEMPT_TIMEOUT_SECS
    pub attempt_timeout_secs: u64,
    #[clap(long, env = "STATICGENIUS_RETRY_AUTH_FAILURES")]
    /// Keep retrying on 401/403 instead of failing over immediately.
    /// Env: STATICGENIUS_RETRY_AUTH_FAILURES
    pub retry_auth_failures: bool,
    #[clap(long, default_value = "1", env = "STATICGENIUS_FANOUT_CONCURRENCY")]
    /// Format/feature combinations generated at once by /api/generate-ad.
    /// Env: STATICGENIUS_FANOUT_CONCURRENCY
    pub fanout_concurrency: usize,
    #[clap(long, env = "STATICGENIUS_JPEG_UPLOADS")]
    /// Re-encode oversized uploads as JPEG instead of PNG.
    /// Env: STATICGENIUS_JPEG_UPLOADS
    pub jpeg_uploads: bool,
}
