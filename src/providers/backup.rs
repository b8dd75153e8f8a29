use async_trait::async_trait;
use futures::future::join_all;
use serde_json::{Value, json};
use tracing::{debug, warn};

use super::{ProviderAdapter, ReplicateClient, unsupported_payload};
use crate::constants::BACKUP_MODEL;
use crate::error::UpstreamError;
use crate::extract::{RawEntry, RawProviderResponse};
use crate::model::{AspectRatio, CallPayload, ProviderCallSpec, ProviderId};

/// `google/imagen-4` on Replicate. One image per prediction, so a request
/// for N outputs becomes N concurrent predictions.
#[derive(Clone, Debug)]
pub struct BackupGenerate {
    replicate: ReplicateClient,
}

impl BackupGenerate {
    /// Adapter over `replicate`.
    pub fn new(replicate: ReplicateClient) -> Self {
        Self { replicate }
    }
}

fn build_input(prompt: &str, aspect_ratio: Option<AspectRatio>) -> Value {
    let mut input = json!({
        "prompt": prompt,
        "output_format": "jpg",
        "safety_filter_level": "block_medium_and_above",
    });
    if let Some(ratio) = aspect_ratio {
        input["aspect_ratio"] = json!(ratio.token());
    }
    input
}

/// Folds per-call outcomes, in issue order, into one response. Fails only
/// when every call failed.
fn collect_outcomes(
    outcomes: Vec<Result<Value, UpstreamError>>,
) -> Result<RawProviderResponse, UpstreamError> {
    let mut entries: Vec<RawEntry> = Vec::with_capacity(outcomes.len());
    let mut dropped = 0;
    let mut last_error = None;
    for (index, outcome) in outcomes.into_iter().enumerate() {
        match outcome {
            Ok(output) => entries.extend(RawProviderResponse::from_output(output).into_entries()),
            Err(err) => {
                warn!("{} output {} failed: {}", BACKUP_MODEL, index + 1, err);
                dropped += 1;
                last_error = Some(err);
            }
        }
    }

    match last_error {
        Some(err) if entries.is_empty() => Err(err),
        _ if dropped > 0 => Ok(RawProviderResponse::Partial { entries, dropped }),
        _ if entries.is_empty() => Ok(RawProviderResponse::Empty),
        _ => Ok(RawProviderResponse::Entries(entries)),
    }
}

#[async_trait]
impl ProviderAdapter for BackupGenerate {
    fn id(&self) -> ProviderId {
        ProviderId::BackupGenerate
    }

    fn native_aspect_ratio(&self, ratio: AspectRatio) -> bool {
        matches!(
            ratio,
            AspectRatio::Square
                | AspectRatio::Widescreen
                | AspectRatio::Vertical
                | AspectRatio::Landscape
                | AspectRatio::Portrait
        )
    }

    async fn invoke(&self, spec: &ProviderCallSpec) -> Result<RawProviderResponse, UpstreamError> {
        let CallPayload::Generate {
            prompt,
            aspect_ratio,
            output_count,
            input_images,
        } = &spec.payload
        else {
            return Err(unsupported_payload(self.id()));
        };
        if !input_images.is_empty() {
            return Err(unsupported_payload(self.id()));
        }

        let input = build_input(prompt, *aspect_ratio);
        debug!("Issuing {} {} predictions", output_count, BACKUP_MODEL);
        let calls = (0..(*output_count).max(1)).map(|_| {
            self.replicate
                .run_model(BACKUP_MODEL, &spec.credential, input.clone())
        });
        collect_outcomes(join_all(calls).await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_failures_keep_successes_in_order() {
        let response = collect_outcomes(vec![
            Ok(json!("https://img.example.org/1.jpg")),
            Err(UpstreamError::status(500, "boom")),
            Ok(json!("https://img.example.org/3.jpg")),
        ])
        .expect("some succeeded");
        assert_eq!(response.dropped(), 1);
        let entries = response.entries();
        assert_eq!(entries.len(), 2);
        assert!(matches!(&entries[0], RawEntry::Text(url) if url.ends_with("1.jpg")));
        assert!(matches!(&entries[1], RawEntry::Text(url) if url.ends_with("3.jpg")));
    }

    #[test]
    fn all_failures_surface_the_last_error() {
        let err = collect_outcomes(vec![
            Err(UpstreamError::status(500, "first")),
            Err(UpstreamError::status(502, "second")),
        ])
        .expect_err("nothing succeeded");
        assert_eq!(err.code(), Some(502));
    }

    #[test]
    fn full_success_is_not_partial() {
        let response = collect_outcomes(vec![Ok(json!(["https://img.example.org/1.jpg"]))])
            .expect("succeeded");
        assert!(matches!(response, RawProviderResponse::Entries(_)));
        assert_eq!(response.dropped(), 0);
    }

    #[test]
    fn input_uses_jpeg_and_medium_safety() {
        let input = build_input("shoe", Some(AspectRatio::Widescreen));
        assert_eq!(input["output_format"], "jpg");
        assert_eq!(input["safety_filter_level"], "block_medium_and_above");
        assert_eq!(input["aspect_ratio"], "16:9");
        assert!(build_input("shoe", None).get("aspect_ratio").is_none());
    }
}
