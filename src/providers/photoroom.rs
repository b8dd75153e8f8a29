use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use tracing::debug;

use super::{ProviderAdapter, unsupported_payload};
use crate::constants::{EXPAND_TEXT_REMOVAL_MODE, MAX_BODY_BYTES, PHOTOROOM_API_KEY_HEADER};
use crate::error::UpstreamError;
use crate::extract::{RawEntry, RawProviderResponse};
use crate::fetch::read_capped;
use crate::model::{
    AspectRatio, CallPayload, EditOperation, NormalizedImage, ProviderCallSpec, ProviderId,
};
use crate::preprocess::PreparedImage;

/// PhotoRoom image editing: AI expansion and text removal.
#[derive(Clone, Debug)]
pub struct ImageEdit {
    http: reqwest::Client,
    segment_url: String,
    edit_url: String,
}

impl ImageEdit {
    /// Adapter posting expansions to `segment_url` and text removal to
    /// `edit_url`.
    pub fn new(http: reqwest::Client, segment_url: &str, edit_url: &str) -> Self {
        Self {
            http,
            segment_url: segment_url.to_string(),
            edit_url: edit_url.to_string(),
        }
    }

    fn endpoint(&self, operation: &EditOperation) -> &str {
        match operation {
            EditOperation::Expand { .. } => &self.segment_url,
            EditOperation::RemoveText { .. } => &self.edit_url,
        }
    }
}

/// Flat form fields for `operation`.
pub(crate) fn edit_fields(operation: &EditOperation) -> Vec<(&'static str, String)> {
    match operation {
        EditOperation::Expand {
            size,
            seed,
            remove_text,
        } => {
            let mut fields = vec![
                ("outputSize", format!("{}x{}", size.width, size.height)),
                ("referenceBox", "originalImage".to_string()),
                ("removeBackground", "false".to_string()),
                ("expand.mode", "ai.auto".to_string()),
                ("quality", "high".to_string()),
            ];
            if *remove_text {
                fields.push(("textRemoval.mode", EXPAND_TEXT_REMOVAL_MODE.to_string()));
                fields.push(("textRemoval.quality", "high".to_string()));
            }
            if let Some(seed) = seed {
                fields.push(("expand.seed", seed.to_string()));
            }
            fields
        }
        EditOperation::RemoveText { mode } => vec![
            ("removeBackground", "false".to_string()),
            ("referenceBox", "originalImage".to_string()),
            ("textRemoval.mode", mode.clone()),
        ],
    }
}

fn image_part(image: &PreparedImage) -> Result<Part, UpstreamError> {
    let extension = match image.mime.as_str() {
        "image/jpeg" => "jpg",
        "image/webp" => "webp",
        _ => "png",
    };
    Part::bytes(image.bytes.clone())
        .file_name(format!("image.{extension}"))
        .mime_str(&image.mime)
        .map_err(|err| UpstreamError::unsupported(format!("bad image mime type: {err}")))
}

#[async_trait]
impl ProviderAdapter for ImageEdit {
    fn id(&self) -> ProviderId {
        ProviderId::ImageEdit
    }

    fn native_aspect_ratio(&self, _ratio: AspectRatio) -> bool {
        false
    }

    async fn invoke(&self, spec: &ProviderCallSpec) -> Result<RawProviderResponse, UpstreamError> {
        let CallPayload::Edit { image, operation } = &spec.payload else {
            return Err(unsupported_payload(self.id()));
        };

        let mut form = Form::new().part("imageFile", image_part(image)?);
        for (name, value) in edit_fields(operation) {
            form = form.text(name, value);
        }

        let url = self.endpoint(operation);
        debug!("Posting {}x{} image to {}", image.width, image.height, url);
        let response = self
            .http
            .post(url)
            .header(PHOTOROOM_API_KEY_HEADER, spec.credential.expose())
            .multipart(form)
            .send()
            .await?;

        let status = response.status();
        let mime = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .unwrap_or("image/png")
            .to_string();
        let bytes = read_capped(response, MAX_BODY_BYTES).await?;
        if !status.is_success() {
            return Err(UpstreamError::status(
                status.as_u16(),
                &String::from_utf8_lossy(&bytes),
            ));
        }
        if bytes.is_empty() {
            return Ok(RawProviderResponse::Empty);
        }
        if !mime.starts_with("image/") {
            return Err(UpstreamError::provider(format!(
                "expected image content, got {mime}"
            )));
        }
        debug!("PhotoRoom returned {}KB of {}", bytes.len() / 1024, mime);
        let image = NormalizedImage::from_bytes(&mime, &bytes);
        Ok(RawProviderResponse::Entries(vec![RawEntry::Text(
            image.as_str().to_string(),
        )]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Dimensions;

    #[test]
    fn expand_fields_follow_options() {
        let fields = edit_fields(&EditOperation::Expand {
            size: Dimensions {
                width: 1200,
                height: 628,
            },
            seed: Some(42),
            remove_text: true,
        });
        assert!(fields.contains(&("outputSize", "1200x628".to_string())));
        assert!(fields.contains(&("expand.mode", "ai.auto".to_string())));
        assert!(fields.contains(&("quality", "high".to_string())));
        assert!(fields.contains(&("textRemoval.mode", "ai.artificial".to_string())));
        assert!(fields.contains(&("textRemoval.quality", "high".to_string())));
        assert!(fields.contains(&("expand.seed", "42".to_string())));

        let fields = edit_fields(&EditOperation::Expand {
            size: Dimensions {
                width: 1200,
                height: 1200,
            },
            seed: None,
            remove_text: false,
        });
        assert!(
            fields
                .iter()
                .all(|(name, _)| !name.starts_with("textRemoval"))
        );
        assert!(fields.iter().all(|(name, _)| *name != "expand.seed"));
        assert!(fields.contains(&("quality", "high".to_string())));
    }

    #[test]
    fn text_removal_fields() {
        let fields = edit_fields(&EditOperation::RemoveText {
            mode: "ai.all".to_string(),
        });
        assert_eq!(
            fields,
            vec![
                ("removeBackground", "false".to_string()),
                ("referenceBox", "originalImage".to_string()),
                ("textRemoval.mode", "ai.all".to_string()),
            ]
        );
    }
}
