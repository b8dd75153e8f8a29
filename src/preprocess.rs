//! Input image validation and downscaling before upload to a provider.

use std::io::Cursor;

use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::{CompressionType, FilterType as PngFilterType, PngEncoder};
use image::imageops::FilterType;
use image::{DynamicImage, ImageReader};
use tracing::{debug, info};

use crate::constants::{MAX_INPUT_BYTES, MAX_INPUT_HEIGHT, MAX_INPUT_WIDTH, REENCODE_JPEG_QUALITY};
use crate::error::GatewayError;

/// Each byte-driven pass shrinks the long edge to this fraction.
const SHRINK_FACTOR: f64 = 0.8;

/// Stop shrinking once the long edge reaches this size.
const MIN_LONG_EDGE: u32 = 256;

/// Encoding used when an image has to be rewritten.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum OutputEncoding {
    /// Lossless, maximum compression
    Png,
    /// Lossy at the given quality
    Jpeg {
        /// 1-100
        quality: u8,
    },
}

impl OutputEncoding {
    fn mime(self) -> &'static str {
        match self {
            Self::Png => "image/png",
            Self::Jpeg { .. } => "image/jpeg",
        }
    }
}

/// Ceilings an upload has to satisfy.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Constraints {
    /// Maximum width in pixels
    pub max_width: u32,
    /// Maximum height in pixels
    pub max_height: u32,
    /// Maximum encoded size
    pub max_bytes: usize,
    /// Encoding used when a rewrite is needed
    pub encoding: OutputEncoding,
}

impl Default for Constraints {
    fn default() -> Self {
        Self {
            max_width: MAX_INPUT_WIDTH,
            max_height: MAX_INPUT_HEIGHT,
            max_bytes: MAX_INPUT_BYTES,
            encoding: OutputEncoding::Png,
        }
    }
}

impl Constraints {
    /// JPEG variant of the defaults, for providers that take lossy input.
    pub fn jpeg() -> Self {
        Self {
            encoding: OutputEncoding::Jpeg {
                quality: REENCODE_JPEG_QUALITY,
            },
            ..Self::default()
        }
    }
}

/// An image ready to go upstream.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PreparedImage {
    /// Encoded bytes
    pub bytes: Vec<u8>,
    /// MIME type of `bytes`
    pub mime: String,
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
}

impl PreparedImage {
    /// The image as a data URI.
    pub fn to_data_uri(&self) -> String {
        crate::fetch::to_data_uri(&self.mime, &self.bytes)
    }
}

/// Largest size within `max_w`x`max_h` that keeps the aspect ratio. Never
/// upscales.
pub fn fit_within(width: u32, height: u32, max_w: u32, max_h: u32) -> (u32, u32) {
    if width <= max_w && height <= max_h {
        return (width, height);
    }
    let scale = f64::min(
        f64::from(max_w) / f64::from(width),
        f64::from(max_h) / f64::from(height),
    );
    scale_dimensions(width, height, scale)
}

fn scale_dimensions(width: u32, height: u32, scale: f64) -> (u32, u32) {
    let w = (f64::from(width) * scale).round().max(1.0) as u32;
    let h = (f64::from(height) * scale).round().max(1.0) as u32;
    (w, h)
}

/// Validates `buffer` and shrinks it until it fits `constraints`.
///
/// Compliant input comes back byte-for-byte, labelled with its sniffed
/// format. Otherwise the image is scaled to fit the dimension ceiling, then
/// repeatedly shrunk and re-encoded while the byte ceiling is exceeded. An
/// image that is still too large at [`MIN_LONG_EDGE`] is rejected.
pub fn prepare(buffer: &[u8], constraints: &Constraints) -> Result<PreparedImage, GatewayError> {
    let reader = ImageReader::new(Cursor::new(buffer))
        .with_guessed_format()
        .map_err(|err| GatewayError::InvalidImageData(err.to_string()))?;
    let format = reader
        .format()
        .ok_or_else(|| GatewayError::InvalidImageData("unrecognised image format".to_string()))?;
    let (width, height) = reader
        .into_dimensions()
        .map_err(|err| GatewayError::InvalidImageData(err.to_string()))?;
    debug!(
        "Input image: {}x{}, {}KB, {:?}",
        width,
        height,
        buffer.len() / 1024,
        format
    );

    let within_dimensions = width <= constraints.max_width && height <= constraints.max_height;
    if within_dimensions && buffer.len() <= constraints.max_bytes {
        return Ok(PreparedImage {
            bytes: buffer.to_vec(),
            mime: format.to_mime_type().to_string(),
            width,
            height,
        });
    }

    let image = image::load_from_memory_with_format(buffer, format)?;
    let (mut target_w, mut target_h) =
        fit_within(width, height, constraints.max_width, constraints.max_height);

    loop {
        let resized = if (target_w, target_h) == (width, height) {
            image.clone()
        } else {
            image.resize_exact(target_w, target_h, FilterType::Lanczos3)
        };
        let bytes = encode(&resized, constraints.encoding)?;
        let long_edge = target_w.max(target_h);
        if bytes.len() <= constraints.max_bytes {
            info!(
                "Compressed input {}x{} ({}KB) to {}x{} ({}KB)",
                width,
                height,
                buffer.len() / 1024,
                target_w,
                target_h,
                bytes.len() / 1024
            );
            return Ok(PreparedImage {
                bytes,
                mime: constraints.encoding.mime().to_string(),
                width: target_w,
                height: target_h,
            });
        }
        if long_edge <= MIN_LONG_EDGE {
            return Err(GatewayError::InvalidImageData(format!(
                "image is still {}KB at {}x{}, over the {}KB limit",
                bytes.len() / 1024,
                target_w,
                target_h,
                constraints.max_bytes / 1024
            )));
        }
        debug!(
            "{}x{} still {}KB over the limit, shrinking",
            target_w,
            target_h,
            (bytes.len() - constraints.max_bytes) / 1024
        );
        (target_w, target_h) = scale_dimensions(target_w, target_h, SHRINK_FACTOR);
    }
}

/// Runs [`prepare`] on the blocking pool, keeping decode and re-encode work
/// off the async workers.
pub async fn prepare_blocking(
    buffer: Vec<u8>,
    constraints: Constraints,
) -> Result<PreparedImage, GatewayError> {
    tokio::task::spawn_blocking(move || prepare(&buffer, &constraints)).await?
}

/// Encodes `image` with the given settings.
pub fn encode(image: &DynamicImage, encoding: OutputEncoding) -> Result<Vec<u8>, GatewayError> {
    let mut output = Vec::new();
    match encoding {
        OutputEncoding::Png => {
            let encoder = PngEncoder::new_with_quality(
                &mut output,
                CompressionType::Best,
                PngFilterType::Adaptive,
            );
            image
                .write_with_encoder(encoder)
                .map_err(|err| GatewayError::Internal(err.to_string()))?;
        }
        OutputEncoding::Jpeg { quality } => {
            let encoder = JpegEncoder::new_with_quality(&mut output, quality);
            DynamicImage::ImageRgb8(image.to_rgb8())
                .write_with_encoder(encoder)
                .map_err(|err| GatewayError::Internal(err.to_string()))?;
        }
    }
    Ok(output)
}
