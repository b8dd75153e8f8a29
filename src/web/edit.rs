//! Image editing endpoints: expansion, text removal, translation and resize.

use std::collections::HashMap;

use axum::extract::Multipart;
use axum::extract::multipart::MultipartRejection;

use super::prelude::*;
use crate::model::{EditResult, InputImage, TargetRatio};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ExpandBody {
    #[serde(default)]
    image_url: String,
    #[serde(default)]
    target_ratio: Option<String>,
    #[serde(default)]
    seed: Option<i64>,
    #[serde(default)]
    remove_text: Option<bool>,
}

pub(crate) async fn photoroom_handler(
    State(state): State<AppState>,
    body: Result<Json<ExpandBody>, JsonRejection>,
) -> Result<Json<Value>, GatewayError> {
    let Json(body) = body.map_err(|err| GatewayError::InvalidRequest(err.body_text()))?;
    let target: TargetRatio = body
        .target_ratio
        .as_deref()
        .ok_or_else(|| GatewayError::InvalidRequest("targetRatio is required".to_string()))?
        .parse()?;
    let remove_text = body.remove_text.unwrap_or(false);
    info!(
        "Expand request: {} (seed {:?}, remove text {})",
        target.token(),
        body.seed,
        remove_text
    );

    let result = state
        .coordinator
        .expand(&body.image_url, target, body.seed, remove_text)
        .await?;
    let size = target.dimensions();
    let mut metadata = json!({
        "targetRatio": target.token(),
        "dimensions": size,
        "seed": body.seed,
        "removeText": remove_text,
        "provider": result.provider_used.as_str(),
        "timestamp": iso_timestamp(&result.timestamp),
    });
    if let Some(reason) = &result.fallback_reason {
        metadata["fallbackReason"] = json!(reason);
    }
    Ok(Json(edit_response(&result, metadata)))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct RemoveTextBody {
    #[serde(default)]
    image_url: String,
    #[serde(default)]
    text_removal_mode: Option<String>,
}

pub(crate) async fn remove_text_handler(
    State(state): State<AppState>,
    body: Result<Json<RemoveTextBody>, JsonRejection>,
) -> Result<Json<Value>, GatewayError> {
    let Json(body) = body.map_err(|err| GatewayError::InvalidRequest(err.body_text()))?;
    let result = state
        .coordinator
        .remove_text(&body.image_url, body.text_removal_mode.as_deref())
        .await?;
    let mode = body
        .text_removal_mode
        .unwrap_or_else(|| crate::constants::DEFAULT_TEXT_REMOVAL_MODE.to_string());
    let metadata = json!({
        "textRemovalMode": mode,
        "timestamp": iso_timestamp(&result.timestamp),
    });
    Ok(Json(edit_response(&result, metadata)))
}

fn edit_response(result: &EditResult, metadata: Value) -> Value {
    json!({
        "success": true,
        "imageUrl": result.image.as_str(),
        "metadata": metadata,
    })
}

/// An uploaded form: the `imageFile` part plus any text fields.
#[derive(Debug, Default)]
struct Upload {
    image: Option<InputImage>,
    file_name: Option<String>,
    fields: HashMap<String, String>,
}

impl Upload {
    async fn read(multipart: Result<Multipart, MultipartRejection>) -> Result<Self, GatewayError> {
        let mut multipart =
            multipart.map_err(|err| GatewayError::InvalidRequest(err.body_text()))?;
        let mut upload = Self::default();
        while let Some(field) = multipart.next_field().await? {
            let name = field.name().unwrap_or_default().to_string();
            if name == "imageFile" {
                let mime = field
                    .content_type()
                    .unwrap_or("application/octet-stream")
                    .to_string();
                if !mime.starts_with("image/") {
                    return Err(GatewayError::InvalidRequest(
                        "Only image files are allowed".to_string(),
                    ));
                }
                upload.file_name = field.file_name().map(str::to_string);
                let bytes = field.bytes().await?;
                debug!("Received {} bytes of {} as {}", bytes.len(), mime, name);
                upload.image = Some(InputImage {
                    bytes: bytes.to_vec(),
                    mime,
                });
            } else {
                let value = field.text().await?;
                upload.fields.insert(name, value);
            }
        }
        Ok(upload)
    }

    fn take_image(&mut self) -> Result<InputImage, GatewayError> {
        self.image
            .take()
            .ok_or_else(|| GatewayError::InvalidRequest("No image file provided".to_string()))
    }
}

pub(crate) async fn translate_handler(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<Value>, GatewayError> {
    let mut upload = Upload::read(multipart).await?;
    let image = upload.take_image()?;
    let language = upload
        .fields
        .get("targetLanguage")
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .ok_or_else(|| GatewayError::InvalidRequest("targetLanguage is required".to_string()))?;

    let result = state.coordinator.translate(&image, &language).await?;
    let image_url = result
        .images
        .first()
        .map(|image| image.as_str().to_string())
        .unwrap_or_default();
    Ok(Json(json!({
        "success": true,
        "imageUrl": image_url,
        "language": language,
        "metadata": {
            "originalFileName": upload.file_name,
            "targetLanguage": crate::prompt::language_name(&language),
            "timestamp": iso_timestamp(&result.timestamp),
        },
    })))
}

pub(crate) async fn resize_handler(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<Value>, GatewayError> {
    let mut upload = Upload::read(multipart).await?;
    let image = upload.take_image()?;

    let result = state.coordinator.resize(&image).await?;
    let image_url = result
        .images
        .first()
        .map(|image| image.as_str().to_string())
        .unwrap_or_default();
    Ok(Json(json!({
        "success": true,
        "imageUrl": image_url,
        "metadata": {
            "originalFileName": upload.file_name,
            "targetRatio": "3:2",
            "method": "gpt_vision_intelligent_resize",
            "timestamp": iso_timestamp(&result.timestamp),
        },
    })))
}
