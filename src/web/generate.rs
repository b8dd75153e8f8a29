//! Text-to-image endpoints.

use super::prelude::*;
use crate::ad_templates::{AdFeature, AdRequest};
use crate::model::{AspectRatio, GenerationRequest, GenerationResult, ProviderChoice, ProviderId};

/// Message attached when the backup model served a primary request.
const BACKUP_MESSAGE: &str = "GPT image generation was unavailable, switched to Google Imagen-4";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct GenerateBody {
    #[serde(default)]
    prompt: Option<String>,
    #[serde(default)]
    aspect_ratio: Option<String>,
    #[serde(default)]
    language: Option<String>,
    #[serde(default)]
    num_outputs: Option<u32>,
    #[serde(default)]
    model: Option<String>,
}

fn parse_aspect_ratio(value: Option<&str>) -> Result<AspectRatio, GatewayError> {
    match value {
        Some(token) if !token.trim().is_empty() => token.parse(),
        _ => Ok(AspectRatio::default()),
    }
}

fn parse_model(value: Option<&str>) -> Result<ProviderChoice, GatewayError> {
    value.unwrap_or_default().parse()
}

fn generation_response(result: &GenerationResult) -> Value {
    let is_backup = result.provider_used == ProviderId::BackupGenerate;
    let mut body = json!({
        "images": result.images,
        "model_used": result.provider_used.as_str(),
        "is_backup": is_backup,
        "dropped_outputs": result.dropped_outputs,
        "timestamp": iso_timestamp(&result.timestamp),
    });
    if result.used_fallback && is_backup {
        body["backup_message"] = json!(BACKUP_MESSAGE);
    }
    body
}

pub(crate) async fn generate_handler(
    State(state): State<AppState>,
    body: Result<Json<GenerateBody>, JsonRejection>,
) -> Result<Json<Value>, GatewayError> {
    let Json(body) = body.map_err(|err| GatewayError::InvalidRequest(err.body_text()))?;
    let request = GenerationRequest::new(
        body.prompt.as_deref().unwrap_or_default(),
        parse_aspect_ratio(body.aspect_ratio.as_deref())?,
        body.language.as_deref(),
        body.num_outputs,
        parse_model(body.model.as_deref())?,
    )?;
    info!(
        "Generate request: {} output(s), {}, {}, {:?}",
        request.output_count(),
        request.aspect_ratio(),
        request.language(),
        request.provider_choice()
    );

    let result = state.coordinator.generate(&request).await?;
    info!(
        "Returning {} image(s) from {}",
        result.images.len(),
        result.provider_used
    );
    Ok(Json(generation_response(&result)))
}

#[derive(Debug, Deserialize)]
pub(crate) struct FeatureBody {
    #[serde(default)]
    name: String,
    #[serde(default)]
    description: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct GenerateAdBody {
    #[serde(default)]
    product_name: String,
    #[serde(default)]
    product_description: String,
    #[serde(default)]
    formats: Vec<String>,
    #[serde(default)]
    features: Vec<FeatureBody>,
    #[serde(default)]
    aspect_ratio: Option<String>,
    #[serde(default)]
    language: Option<String>,
    #[serde(default)]
    num_ads: Option<u32>,
    #[serde(default)]
    model: Option<String>,
}

pub(crate) async fn generate_ad_handler(
    State(state): State<AppState>,
    body: Result<Json<GenerateAdBody>, JsonRejection>,
) -> Result<Json<Value>, GatewayError> {
    let Json(body) = body.map_err(|err| GatewayError::InvalidRequest(err.body_text()))?;
    let request = AdRequest {
        aspect_ratio: parse_aspect_ratio(body.aspect_ratio.as_deref())?,
        provider_choice: parse_model(body.model.as_deref())?,
        product_name: body.product_name,
        product_description: body.product_description,
        formats: body.formats,
        features: body
            .features
            .into_iter()
            .map(|feature| AdFeature {
                name: feature.name,
                description: feature.description,
            })
            .collect(),
        language: body.language,
        num_ads: body.num_ads.unwrap_or(1),
    };
    debug!(
        "Generate-ad request: {} format(s) x {} feature(s)",
        request.formats.len(),
        request.features.len()
    );

    let result = state.coordinator.generate_ad(&request).await?;
    let body =
        serde_json::to_value(&result).map_err(|err| GatewayError::Internal(err.to_string()))?;
    Ok(Json(body))
}
