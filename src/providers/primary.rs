use async_trait::async_trait;
use serde_json::{Value, json};

use super::{ProviderAdapter, ReplicateClient, unsupported_payload};
use crate::config::Credential;
use crate::constants::PRIMARY_MODEL;
use crate::error::UpstreamError;
use crate::extract::RawProviderResponse;
use crate::model::{AspectRatio, CallPayload, ProviderCallSpec, ProviderId};

/// `openai/gpt-image-1` on Replicate. The model needs an OpenAI key passed
/// through in its input on top of the Replicate token.
#[derive(Clone, Debug)]
pub struct PrimaryGenerate {
    replicate: ReplicateClient,
    openai_key: Option<Credential>,
}

impl PrimaryGenerate {
    /// Adapter over `replicate`.
    pub fn new(replicate: ReplicateClient, openai_key: Option<Credential>) -> Self {
        Self {
            replicate,
            openai_key,
        }
    }

    fn build_input(
        &self,
        prompt: &str,
        aspect_ratio: Option<AspectRatio>,
        output_count: u8,
        input_images: &[String],
    ) -> Result<Value, UpstreamError> {
        let openai_key = self
            .openai_key
            .as_ref()
            .ok_or_else(|| UpstreamError::unsupported("OPENAI_API_KEY is not configured"))?;
        let mut input = json!({
            "prompt": prompt,
            "openai_api_key": openai_key.expose(),
            "number_of_images": output_count,
        });
        if let Some(ratio) = aspect_ratio {
            input["aspect_ratio"] = json!(ratio.token());
        }
        if !input_images.is_empty() {
            input["input_images"] = json!(input_images);
        }
        Ok(input)
    }
}

#[async_trait]
impl ProviderAdapter for PrimaryGenerate {
    fn id(&self) -> ProviderId {
        ProviderId::PrimaryGenerate
    }

    fn native_aspect_ratio(&self, ratio: AspectRatio) -> bool {
        matches!(
            ratio,
            AspectRatio::Square | AspectRatio::Photo | AspectRatio::PhotoPortrait
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
        let input = self.build_input(prompt, *aspect_ratio, *output_count, input_images)?;
        let output = self
            .replicate
            .run_model(PRIMARY_MODEL, &spec.credential, input)
            .await?;
        Ok(RawProviderResponse::from_output(output))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn adapter(openai_key: Option<&str>) -> PrimaryGenerate {
        let replicate = ReplicateClient::new(
            reqwest::Client::new(),
            "http://127.0.0.1:9",
            Duration::from_millis(1),
        );
        PrimaryGenerate::new(replicate, openai_key.and_then(Credential::new))
    }

    #[test]
    fn input_carries_key_and_optional_fields() {
        let input = adapter(Some("sk-abc"))
            .build_input(
                "shoe",
                Some(AspectRatio::Photo),
                2,
                &["data:image/png;base64,AA".to_string()],
            )
            .expect("key is configured");
        assert_eq!(input["openai_api_key"], "sk-abc");
        assert_eq!(input["number_of_images"], 2);
        assert_eq!(input["aspect_ratio"], "3:2");
        assert_eq!(input["input_images"][0], "data:image/png;base64,AA");

        let input = adapter(Some("sk-abc"))
            .build_input("shoe", None, 1, &[])
            .expect("key is configured");
        assert!(input.get("aspect_ratio").is_none());
        assert!(input.get("input_images").is_none());
    }

    #[test]
    fn missing_key_is_unsupported() {
        let err = adapter(None)
            .build_input("shoe", None, 1, &[])
            .expect_err("no key");
        assert_eq!(err.kind, crate::error::UpstreamErrorKind::Unsupported);
    }

    #[test]
    fn native_ratios() {
        let adapter = adapter(None);
        assert!(adapter.native_aspect_ratio(AspectRatio::Square));
        assert!(adapter.native_aspect_ratio(AspectRatio::PhotoPortrait));
        assert!(!adapter.native_aspect_ratio(AspectRatio::Widescreen));
    }
}
