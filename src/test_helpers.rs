//! Shared test utilities: generated images and scripted provider adapters.

use std::io::Cursor;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};

use crate::error::UpstreamError;
use crate::extract::{RawEntry, RawProviderResponse};
use crate::model::{AspectRatio, ProviderCallSpec, ProviderId};
use crate::providers::ProviderAdapter;

// =========================================================================
// Images
// =========================================================================

fn png_bytes(image: RgbImage) -> Vec<u8> {
    let mut out = Cursor::new(Vec::new());
    DynamicImage::ImageRgb8(image)
        .write_to(&mut out, ImageFormat::Png)
        .expect("encode png");
    out.into_inner()
}

/// A PNG filled with one color.
pub fn solid_png(width: u32, height: u32, color: [u8; 3]) -> Vec<u8> {
    png_bytes(RgbImage::from_pixel(width, height, Rgb(color)))
}

/// A PNG of pseudo-random pixels that compresses badly.
pub fn noise_png(width: u32, height: u32) -> Vec<u8> {
    let mut state: u32 = 0x1234_5678;
    let image = RgbImage::from_fn(width, height, |_, _| {
        let mut next = || {
            state ^= state << 13;
            state ^= state >> 17;
            state ^= state << 5;
            (state & 0xff) as u8
        };
        Rgb([next(), next(), next()])
    });
    png_bytes(image)
}

/// A solid PNG as a data URI.
pub fn png_data_uri(width: u32, height: u32, color: [u8; 3]) -> String {
    crate::fetch::to_data_uri("image/png", &solid_png(width, height, color))
}

// =========================================================================
// Adapters
// =========================================================================

type Script = Box<dyn Fn(u32) -> Result<RawProviderResponse, UpstreamError> + Send + Sync>;

/// An adapter whose responses are scripted by call number (1-based).
pub struct ScriptedAdapter {
    id: ProviderId,
    native: Vec<AspectRatio>,
    script: Script,
    calls: AtomicU32,
    last_spec: Mutex<Option<ProviderCallSpec>>,
}

impl ScriptedAdapter {
    /// Adapter answering with `script(call_number)`.
    pub fn new<F>(id: ProviderId, script: F) -> Self
    where
        F: Fn(u32) -> Result<RawProviderResponse, UpstreamError> + Send + Sync + 'static,
    {
        Self {
            id,
            native: vec![AspectRatio::Square],
            script: Box::new(script),
            calls: AtomicU32::new(0),
            last_spec: Mutex::new(None),
        }
    }

    /// Always succeeds with the given URLs.
    pub fn returning(id: ProviderId, urls: &[&str]) -> Self {
        let entries: Vec<String> = urls.iter().map(|url| url.to_string()).collect();
        Self::new(id, move |_| {
            Ok(RawProviderResponse::Entries(
                entries.iter().cloned().map(RawEntry::Text).collect(),
            ))
        })
    }

    /// Always fails with `status`.
    pub fn failing(id: ProviderId, status: u16) -> Self {
        Self::new(id, move |call| {
            Err(UpstreamError::status(
                status,
                &format!("scripted failure {call}"),
            ))
        })
    }

    /// Replaces the natively supported ratios.
    pub fn with_native(mut self, ratios: &[AspectRatio]) -> Self {
        self.native = ratios.to_vec();
        self
    }

    /// Number of invocations so far.
    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    /// The most recent call spec.
    pub fn last_spec(&self) -> Option<ProviderCallSpec> {
        self.last_spec.lock().expect("spec lock").clone()
    }
}

#[async_trait]
impl ProviderAdapter for ScriptedAdapter {
    fn id(&self) -> ProviderId {
        self.id
    }

    fn native_aspect_ratio(&self, ratio: AspectRatio) -> bool {
        self.native.contains(&ratio)
    }

    async fn invoke(&self, spec: &ProviderCallSpec) -> Result<RawProviderResponse, UpstreamError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        *self.last_spec.lock().expect("spec lock") = Some(spec.clone());
        (self.script)(call)
    }
}
