//! Shared constants for upstream endpoints, limits and defaults
//!

use std::time::Duration;

/// Replicate model used as the primary text-to-image provider.
pub const PRIMARY_MODEL: &str = "openai/gpt-image-1";

/// Replicate model used as the backup text-to-image provider.
pub const BACKUP_MODEL: &str = "google/imagen-4";

/// Default Replicate API root.
pub const DEFAULT_REPLICATE_BASE_URL: &str = "https://api.replicate.com";

/// PhotoRoom endpoint used for AI expansion to a new output size.
pub const DEFAULT_PHOTOROOM_SEGMENT_URL: &str = "https://sdk.photoroom.com/v1/segment";

/// PhotoRoom endpoint used for text removal.
pub const DEFAULT_PHOTOROOM_EDIT_URL: &str = "https://image-api.photoroom.com/v2/edit";

/// Language that needs no prompt augmentation.
pub const DEFAULT_LANGUAGE: &str = "English";

/// Upper bound on `numOutputs` for a single generation request.
pub const MAX_OUTPUTS_PER_REQUEST: u8 = 10;

/// Request body ceiling, uploads included.
pub const MAX_BODY_BYTES: usize = 50 * 1024 * 1024;

/// Input ceilings applied before an image is sent upstream.
pub const MAX_INPUT_WIDTH: u32 = 3000;
/// See [`MAX_INPUT_WIDTH`].
pub const MAX_INPUT_HEIGHT: u32 = 3000;
/// See [`MAX_INPUT_WIDTH`].
pub const MAX_INPUT_BYTES: usize = 15 * 1024 * 1024;

/// JPEG quality used when an input has to be re-encoded as JPEG.
pub const REENCODE_JPEG_QUALITY: u8 = 80;

/// Default number of attempts per provider.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Base of the linear backoff between attempts.
pub const DEFAULT_RETRY_BASE_DELAY: Duration = Duration::from_millis(2000);

/// Per-attempt timeout.
pub const DEFAULT_ATTEMPT_TIMEOUT: Duration = Duration::from_secs(45);

/// Timeout for downloading caller-supplied source images.
pub const DEFAULT_DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(30);

/// Connect timeout for the shared upstream HTTP client.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Interval between polls of a Replicate prediction that is still running.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(1000);

/// Text removal mode used when the caller does not pick one.
pub const DEFAULT_TEXT_REMOVAL_MODE: &str = "ai.all";

/// Text removal mode used alongside expansion.
pub const EXPAND_TEXT_REMOVAL_MODE: &str = "ai.artificial";

/// Header carrying the PhotoRoom API key.
pub const PHOTOROOM_API_KEY_HEADER: &str = "x-api-key";

#[cfg(test)]
/// Retry delay used by tests
pub const TEST_RETRY_DELAY: Duration = Duration::from_millis(1);
