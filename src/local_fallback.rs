//! In-process centered crop, used when the remote editor is unavailable.

use std::time::Duration;

use image::DynamicImage;
use image::imageops::FilterType;
use tracing::{info, warn};

use crate::error::GatewayError;
use crate::fetch::fetch_image;
use crate::model::{Dimensions, InputImage, NormalizedImage};
use crate::preprocess::{OutputEncoding, encode};

/// A crop window within the source image.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct CropRect {
    /// Left edge
    pub x: u32,
    /// Top edge
    pub y: u32,
    /// Width of the window
    pub width: u32,
    /// Height of the window
    pub height: u32,
}

/// Largest window with the target's ratio, centered in the source.
pub fn centered_crop(source: Dimensions, target: Dimensions) -> CropRect {
    let (sw, sh) = (u64::from(source.width), u64::from(source.height));
    let (tw, th) = (
        u64::from(target.width.max(1)),
        u64::from(target.height.max(1)),
    );

    // compare sw/sh with tw/th without floats
    let (width, height) = if sw * th > sh * tw {
        ((sh * tw / th).max(1), sh)
    } else {
        (sw, (sw * th / tw).max(1))
    };

    let width = width.min(sw) as u32;
    let height = height.min(sh) as u32;
    CropRect {
        x: (source.width - width) / 2,
        y: (source.height - height) / 2,
        width,
        height,
    }
}

/// Crops `image` to the target ratio and resizes it to the target exactly.
pub fn crop_and_resize(image: &DynamicImage, target: Dimensions) -> DynamicImage {
    let rect = centered_crop(
        Dimensions {
            width: image.width(),
            height: image.height(),
        },
        target,
    );
    image
        .crop_imm(rect.x, rect.y, rect.width, rect.height)
        .resize_exact(target.width, target.height, FilterType::Lanczos3)
}

/// Downloads a source image and crops it to a target size.
#[derive(Clone, Debug)]
pub struct LocalFallbackTransformer {
    http: reqwest::Client,
    timeout: Duration,
    max_bytes: usize,
}

impl LocalFallbackTransformer {
    /// Transformer downloading through `http`, refusing sources over `max_bytes`.
    pub fn new(http: reqwest::Client, timeout: Duration, max_bytes: usize) -> Self {
        Self {
            http,
            timeout,
            max_bytes,
        }
    }

    /// Fetches `source_url`, crops and resizes it to `target`, and returns
    /// the result as a PNG data URI.
    pub async fn transform(
        &self,
        source_url: &str,
        target: Dimensions,
    ) -> Result<NormalizedImage, GatewayError> {
        let source = fetch_image(&self.http, source_url, self.timeout, self.max_bytes)
            .await
            .map_err(|err| {
                warn!("Local fallback could not fetch source: {}", err);
                GatewayError::FallbackTransform(err.to_string())
            })?;
        tokio::task::spawn_blocking(move || transform_image(&source, target))
            .await
            .map_err(|err| GatewayError::Internal(format!("local crop worker failed: {err}")))?
    }
}

/// Crops and resizes an already fetched image to `target` as a PNG data URI.
pub fn transform_image(
    source: &InputImage,
    target: Dimensions,
) -> Result<NormalizedImage, GatewayError> {
    let decoded = image::load_from_memory(&source.bytes)
        .map_err(|err| GatewayError::FallbackTransform(format!("decode failed: {err}")))?;

    let output = crop_and_resize(&decoded, target);
    let png = encode(&output, OutputEncoding::Png)
        .map_err(|err| GatewayError::FallbackTransform(err.to_string()))?;
    info!(
        "Local fallback cropped {}x{} to {}x{}",
        decoded.width(),
        decoded.height(),
        target.width,
        target.height
    );
    Ok(NormalizedImage::from_bytes("image/png", &png))
}
