//! Minimal Replicate predictions client.

use std::time::Duration;

use serde::Deserialize;
use serde_json::{Value, json};
use tracing::debug;

use crate::config::Credential;
use crate::constants::MAX_BODY_BYTES;
use crate::error::UpstreamError;
use crate::fetch::read_capped;

/// Prediction as returned by create and get.
#[derive(Debug, Deserialize)]
struct Prediction {
    #[serde(default)]
    id: Option<String>,
    status: String,
    #[serde(default)]
    output: Value,
    #[serde(default)]
    error: Value,
    #[serde(default)]
    urls: Option<PredictionUrls>,
}

#[derive(Debug, Deserialize)]
struct PredictionUrls {
    #[serde(default)]
    get: Option<String>,
}

impl Prediction {
    fn is_terminal(&self) -> bool {
        matches!(self.status.as_str(), "succeeded" | "failed" | "canceled")
    }

    fn error_message(&self) -> String {
        match &self.error {
            Value::Null => format!("prediction {}", self.status),
            Value::String(message) => message.clone(),
            other => other.to_string(),
        }
    }
}

/// Runs models on Replicate, waiting for their output.
#[derive(Clone, Debug)]
pub struct ReplicateClient {
    http: reqwest::Client,
    base_url: String,
    poll_interval: Duration,
}

impl ReplicateClient {
    /// Client against `base_url` (no trailing slash).
    pub fn new(http: reqwest::Client, base_url: &str, poll_interval: Duration) -> Self {
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            poll_interval,
        }
    }

    /// Creates a prediction for `model` (`owner/name`) and returns its output
    /// once it reaches a terminal state.
    pub async fn run_model(
        &self,
        model: &str,
        token: &Credential,
        input: Value,
    ) -> Result<Value, UpstreamError> {
        let url = format!("{}/v1/models/{}/predictions", self.base_url, model);
        debug!("Creating prediction on {}", model);
        let response = self
            .http
            .post(&url)
            .bearer_auth(token.expose())
            .header("Prefer", "wait")
            .json(&json!({ "input": input }))
            .send()
            .await?;
        let mut prediction = read_prediction(response).await?;

        while !prediction.is_terminal() {
            let Some(get_url) = prediction.urls.as_ref().and_then(|urls| urls.get.clone()) else {
                return Err(UpstreamError::provider(format!(
                    "prediction is {} but has no polling url",
                    prediction.status
                )));
            };
            debug!(
                "Prediction {} is {}, polling",
                prediction.id.as_deref().unwrap_or("?"),
                prediction.status
            );
            tokio::time::sleep(self.poll_interval).await;
            let response = self
                .http
                .get(&get_url)
                .bearer_auth(token.expose())
                .send()
                .await?;
            prediction = read_prediction(response).await?;
        }

        match prediction.status.as_str() {
            "succeeded" => Ok(prediction.output),
            _ => Err(UpstreamError::provider(prediction.error_message())),
        }
    }
}

async fn read_prediction(response: reqwest::Response) -> Result<Prediction, UpstreamError> {
    let status = response.status();
    let bytes = read_capped(response, MAX_BODY_BYTES).await?;
    if !status.is_success() {
        return Err(UpstreamError::status(
            status.as_u16(),
            &String::from_utf8_lossy(&bytes),
        ));
    }
    serde_json::from_slice(&bytes)
        .map_err(|err| UpstreamError::provider(format!("unreadable prediction: {err}")))
}
