//! Upstream provider adapters.
//!
//! Each adapter translates a [`ProviderCallSpec`] into a provider's wire
//! format and maps whatever comes back into a [`RawProviderResponse`].
//! Retry, fallback and normalization all live above this seam.

use async_trait::async_trait;

use crate::error::UpstreamError;
use crate::extract::RawProviderResponse;
use crate::model::{AspectRatio, ProviderCallSpec, ProviderId};

mod backup;
mod photoroom;
mod primary;
mod replicate;

pub use backup::BackupGenerate;
pub use photoroom::ImageEdit;
pub use primary::PrimaryGenerate;
pub use replicate::ReplicateClient;

/// A single upstream image provider.
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    /// Which provider this is.
    fn id(&self) -> ProviderId;

    /// True when the provider takes `ratio` as a first-class field rather
    /// than a prompt instruction.
    fn native_aspect_ratio(&self, ratio: AspectRatio) -> bool;

    /// Makes one call. Retrying is the caller's business.
    async fn invoke(&self, spec: &ProviderCallSpec) -> Result<RawProviderResponse, UpstreamError>;
}

/// Error for a payload variant the adapter has no mapping for.
fn unsupported_payload(provider: ProviderId) -> UpstreamError {
    UpstreamError::unsupported(format!("{provider} can't handle this kind of request"))
}
