//! Request and result types shared by the coordinator, the providers and the
//! web layer.

use std::str::FromStr;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;

use crate::config::Credential;
use crate::constants::{DEFAULT_LANGUAGE, MAX_OUTPUTS_PER_REQUEST};
use crate::error::GatewayError;
use crate::preprocess::PreparedImage;

/// Formats a timestamp the way the API reports them.
pub fn iso_timestamp(at: &DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Current time as an API timestamp.
pub fn iso_timestamp_now() -> String {
    iso_timestamp(&Utc::now())
}

/// Upstream providers, plus the local degraded path.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum ProviderId {
    /// Replicate `openai/gpt-image-1`
    PrimaryGenerate,
    /// Replicate `google/imagen-4`
    BackupGenerate,
    /// PhotoRoom editing
    ImageEdit,
    /// Centered crop done in-process
    LocalFallback,
}

impl ProviderId {
    /// Name reported to callers as `model_used`.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::PrimaryGenerate => crate::constants::PRIMARY_MODEL,
            Self::BackupGenerate => crate::constants::BACKUP_MODEL,
            Self::ImageEdit => "photoroom",
            Self::LocalFallback => "local-crop",
        }
    }
}

impl std::fmt::Display for ProviderId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which text-to-image provider the caller asked for.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum ProviderChoice {
    /// gpt-image-1
    #[default]
    Primary,
    /// imagen-4
    Backup,
}

impl ProviderChoice {
    /// Adapter that serves this choice.
    pub fn provider(self) -> ProviderId {
        match self {
            Self::Primary => ProviderId::PrimaryGenerate,
            Self::Backup => ProviderId::BackupGenerate,
        }
    }
}

impl FromStr for ProviderChoice {
    type Err = GatewayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "primary" | "gpt-image-1" | "openai/gpt-image-1" => Ok(Self::Primary),
            "backup" | "imagen-4" | "google/imagen-4" => Ok(Self::Backup),
            other => Err(GatewayError::InvalidRequest(format!(
                "Unknown model '{other}'. Supported: gpt-image-1, imagen-4"
            ))),
        }
    }
}

/// Aspect ratio tokens accepted for generation.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
pub enum AspectRatio {
    /// 1:1
    #[default]
    Square,
    /// 16:9
    Widescreen,
    /// 9:16
    Vertical,
    /// 4:3
    Landscape,
    /// 3:4
    Portrait,
    /// 3:2
    Photo,
    /// 2:3
    PhotoPortrait,
}

impl AspectRatio {
    /// Every ratio, in the order they are listed to callers.
    pub const ALL: [AspectRatio; 7] = [
        Self::Square,
        Self::Widescreen,
        Self::Vertical,
        Self::Landscape,
        Self::Portrait,
        Self::Photo,
        Self::PhotoPortrait,
    ];

    /// Wire token, e.g. `16:9`.
    pub fn token(self) -> &'static str {
        match self {
            Self::Square => "1:1",
            Self::Widescreen => "16:9",
            Self::Vertical => "9:16",
            Self::Landscape => "4:3",
            Self::Portrait => "3:4",
            Self::Photo => "3:2",
            Self::PhotoPortrait => "2:3",
        }
    }

    /// Word used when the ratio has to be described in a prompt.
    pub fn orientation(self) -> &'static str {
        match self {
            Self::Square => "square",
            Self::Widescreen | Self::Landscape | Self::Photo => "landscape",
            Self::Vertical | Self::Portrait | Self::PhotoPortrait => "portrait",
        }
    }
}

impl std::fmt::Display for AspectRatio {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.token())
    }
}

impl FromStr for AspectRatio {
    type Err = GatewayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let token = s.trim();
        Self::ALL
            .into_iter()
            .find(|ratio| ratio.token() == token)
            .ok_or_else(|| {
                let supported: Vec<_> = Self::ALL.iter().map(|ratio| ratio.token()).collect();
                GatewayError::InvalidRequest(format!(
                    "Invalid aspect ratio '{token}'. Supported: {}",
                    supported.join(", ")
                ))
            })
    }
}

/// Pixel dimensions.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
pub struct Dimensions {
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
}

/// Output sizes supported by expansion.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum TargetRatio {
    /// 1:1 at 1200x1200
    Square,
    /// 1.91:1 at 1200x628
    Landscape,
    /// 4:5 at 1200x1500
    Portrait,
}

impl TargetRatio {
    /// Every supported target.
    pub const ALL: [TargetRatio; 3] = [Self::Square, Self::Landscape, Self::Portrait];

    /// Wire token.
    pub fn token(self) -> &'static str {
        match self {
            Self::Square => "1:1",
            Self::Landscape => "1.91:1",
            Self::Portrait => "4:5",
        }
    }

    /// Output size sent to the editor and used by the local crop.
    pub fn dimensions(self) -> Dimensions {
        match self {
            Self::Square => Dimensions {
                width: 1200,
                height: 1200,
            },
            Self::Landscape => Dimensions {
                width: 1200,
                height: 628,
            },
            Self::Portrait => Dimensions {
                width: 1200,
                height: 1500,
            },
        }
    }
}

impl FromStr for TargetRatio {
    type Err = GatewayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let token = s.trim();
        Self::ALL
            .into_iter()
            .find(|ratio| ratio.token() == token)
            .ok_or_else(|| {
                let supported: Vec<_> = Self::ALL.iter().map(|ratio| ratio.token()).collect();
                GatewayError::InvalidRequest(format!(
                    "Invalid target ratio. Supported: {}",
                    supported.join(", ")
                ))
            })
    }
}

/// Image bytes supplied by the caller.
#[derive(Clone, Debug)]
pub struct InputImage {
    /// Encoded image
    pub bytes: Vec<u8>,
    /// MIME type as declared by the caller or the download
    pub mime: String,
}

/// A single generation request. Built once, never mutated afterwards.
#[derive(Clone, Debug)]
pub struct GenerationRequest {
    prompt: String,
    aspect_ratio: AspectRatio,
    language: String,
    output_count: u8,
    provider_choice: ProviderChoice,
    input_image: Option<InputImage>,
}

impl GenerationRequest {
    /// Validates and assembles a request.
    pub fn new(
        prompt: &str,
        aspect_ratio: AspectRatio,
        language: Option<&str>,
        output_count: Option<u32>,
        provider_choice: ProviderChoice,
    ) -> Result<Self, GatewayError> {
        let prompt = prompt.trim();
        if prompt.is_empty() {
            return Err(GatewayError::InvalidRequest(
                "Prompt is required".to_string(),
            ));
        }
        let output_count = match output_count {
            None => 1,
            Some(count) if (1..=u32::from(MAX_OUTPUTS_PER_REQUEST)).contains(&count) => count as u8,
            Some(count) => {
                return Err(GatewayError::InvalidRequest(format!(
                    "numOutputs must be between 1 and {MAX_OUTPUTS_PER_REQUEST}, got {count}"
                )));
            }
        };
        let language = language
            .map(str::trim)
            .filter(|language| !language.is_empty())
            .unwrap_or(DEFAULT_LANGUAGE)
            .to_string();

        Ok(Self {
            prompt: prompt.to_string(),
            aspect_ratio,
            language,
            output_count,
            provider_choice,
            input_image: None,
        })
    }

    /// Attaches the image the provider should condition on.
    pub fn with_input_image(mut self, image: InputImage) -> Self {
        self.input_image = Some(image);
        self
    }

    /// Caller's prompt, before augmentation.
    pub fn prompt(&self) -> &str {
        &self.prompt
    }

    /// Requested aspect ratio.
    pub fn aspect_ratio(&self) -> AspectRatio {
        self.aspect_ratio
    }

    /// Target language for rendered text.
    pub fn language(&self) -> &str {
        &self.language
    }

    /// Number of images asked for.
    pub fn output_count(&self) -> u8 {
        self.output_count
    }

    /// Provider asked for.
    pub fn provider_choice(&self) -> ProviderChoice {
        self.provider_choice
    }

    /// Conditioning image, if any.
    pub fn input_image(&self) -> Option<&InputImage> {
        self.input_image.as_ref()
    }
}

/// PhotoRoom operation parameters.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum EditOperation {
    /// Expand the canvas to a new output size
    Expand {
        /// Output size
        size: Dimensions,
        /// Deterministic expansion seed
        seed: Option<i64>,
        /// Also strip artificial text
        remove_text: bool,
    },
    /// Remove text only
    RemoveText {
        /// PhotoRoom `textRemoval.mode`
        mode: String,
    },
}

/// Provider-facing payload, after translation from the caller's request.
#[derive(Clone, Debug)]
pub enum CallPayload {
    /// Text-to-image call
    Generate {
        /// Prompt after aspect-ratio and language augmentation
        prompt: String,
        /// Set when the provider supports the ratio as a first-class field
        aspect_ratio: Option<AspectRatio>,
        /// Images requested
        output_count: u8,
        /// Conditioning images as data URIs
        input_images: Vec<String>,
    },
    /// Image editing call
    Edit {
        /// Prepared source image
        image: PreparedImage,
        /// What to do with it
        operation: EditOperation,
    },
}

/// Everything an adapter needs for one call. Immutable once built.
#[derive(Clone, Debug)]
pub struct ProviderCallSpec {
    /// Target provider
    pub provider: ProviderId,
    /// Resolved payload
    pub payload: CallPayload,
    /// Credential used to authenticate the call
    pub credential: Credential,
}

/// A canonical image reference: an `http(s)://` URL or a `data:` URI.
#[derive(Clone, Debug, Eq, Hash, PartialEq, Serialize)]
#[serde(transparent)]
pub struct NormalizedImage(String);

impl NormalizedImage {
    /// Accepts `value` only when it is already canonical.
    pub fn parse(value: &str) -> Option<Self> {
        let value = value.trim();
        let canonical = value.starts_with("https://")
            || value.starts_with("http://")
            || value.starts_with("data:");
        canonical.then(|| Self(value.to_string()))
    }

    /// Builds a data URI from raw image bytes.
    pub fn from_bytes(mime: &str, bytes: &[u8]) -> Self {
        Self(crate::fetch::to_data_uri(mime, bytes))
    }

    /// Wraps an already base64-encoded payload as a data URI.
    pub fn from_base64(mime: &str, payload: &str) -> Self {
        Self(format!("data:{mime};base64,{}", payload.trim()))
    }

    /// The reference itself.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// True for `data:` URIs.
    pub fn is_data_uri(&self) -> bool {
        self.0.starts_with("data:")
    }
}

impl std::fmt::Display for NormalizedImage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_data_uri() {
            write!(f, "data URI ({} bytes)", self.0.len())
        } else {
            f.write_str(&self.0)
        }
    }
}

/// Outcome of a generation request.
#[derive(Clone, Debug)]
pub struct GenerationResult {
    /// Images in provider order
    pub images: Vec<NormalizedImage>,
    /// Provider that produced them
    pub provider_used: ProviderId,
    /// True when the provider is not the one asked for
    pub used_fallback: bool,
    /// Outputs lost to partial failures
    pub dropped_outputs: usize,
    /// When the result was assembled
    pub timestamp: DateTime<Utc>,
}

impl GenerationResult {
    /// Assembles a result stamped with the current time.
    pub fn new(
        images: Vec<NormalizedImage>,
        provider_used: ProviderId,
        requested: ProviderId,
        dropped_outputs: usize,
    ) -> Self {
        Self {
            images,
            provider_used,
            used_fallback: provider_used != requested,
            dropped_outputs,
            timestamp: Utc::now(),
        }
    }
}

/// Outcome of an edit request.
#[derive(Clone, Debug)]
pub struct EditResult {
    /// Edited image
    pub image: NormalizedImage,
    /// Remote editor, or the local crop
    pub provider_used: ProviderId,
    /// Why the local path was taken
    pub fallback_reason: Option<String>,
    /// When the result was assembled
    pub timestamp: DateTime<Utc>,
}

impl EditResult {
    /// True when the local degraded path produced the image.
    pub fn used_fallback(&self) -> bool {
        self.fallback_reason.is_some()
    }
}
