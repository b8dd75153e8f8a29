//! Provider selection, fallback ordering and the local degraded path.
//!
//! Every request walks the same small state machine: try the requested
//! provider through the retry policy, normalize what it returned, and on
//! exhaustion move to the alternate provider (generation) or the local crop
//! (expansion). Each provider is tried at most once per request.

use std::sync::Arc;

use chrono::Utc;
use futures::FutureExt;
use tracing::{debug, info, warn};

use crate::ad_templates::{AdRequest, AdResult, AdTemplate};
use crate::config::{Credential, GatewayConfig};
use crate::constants::{DEFAULT_CONNECT_TIMEOUT, DEFAULT_TEXT_REMOVAL_MODE};
use crate::error::{GatewayError, ProviderFailure};
use crate::extract::extract;
use crate::fanout::run_bounded;
use crate::fetch::fetch_image;
use crate::local_fallback::LocalFallbackTransformer;
use crate::model::{
    AspectRatio, CallPayload, EditOperation, EditResult, GenerationRequest, GenerationResult,
    InputImage, NormalizedImage, ProviderCallSpec, ProviderChoice, ProviderId, TargetRatio,
};
use crate::preprocess::prepare_blocking;
use crate::prompt::{RESIZE_PROMPT, augment_prompt, language_name, translation_prompt};
use crate::providers::{
    BackupGenerate, ImageEdit, PrimaryGenerate, ProviderAdapter, ReplicateClient,
};

/// The upstream adapters the coordinator can route to.
#[derive(Clone)]
pub struct Adapters {
    /// Primary text-to-image model
    pub primary: Arc<dyn ProviderAdapter>,
    /// Backup text-to-image model
    pub backup: Arc<dyn ProviderAdapter>,
    /// Remote image editor
    pub editor: Arc<dyn ProviderAdapter>,
}

impl Adapters {
    /// Real adapters talking to the configured endpoints.
    pub fn from_config(config: &GatewayConfig, http: &reqwest::Client) -> Self {
        let replicate = ReplicateClient::new(
            http.clone(),
            &config.replicate_base_url,
            config.poll_interval,
        );
        Self {
            primary: Arc::new(PrimaryGenerate::new(
                replicate.clone(),
                config.openai_key.clone(),
            )),
            backup: Arc::new(BackupGenerate::new(replicate)),
            editor: Arc::new(ImageEdit::new(
                http.clone(),
                &config.photoroom_segment_url,
                &config.photoroom_edit_url,
            )),
        }
    }
}

/// What a single provider produced.
struct ProviderOutput {
    images: Vec<NormalizedImage>,
    dropped: usize,
}

/// Routes requests across providers.
pub struct FallbackCoordinator {
    config: Arc<GatewayConfig>,
    adapters: Adapters,
    local: LocalFallbackTransformer,
    http: reqwest::Client,
}

impl FallbackCoordinator {
    /// Coordinator over explicit adapters.
    pub fn new(config: GatewayConfig, adapters: Adapters, http: reqwest::Client) -> Self {
        let local = LocalFallbackTransformer::new(
            http.clone(),
            config.download_timeout,
            config.max_download_bytes,
        );
        Self {
            config: Arc::new(config),
            adapters,
            local,
            http,
        }
    }

    /// Coordinator with real adapters sharing one HTTP client.
    pub fn from_config(config: GatewayConfig) -> Result<Self, GatewayError> {
        let http = reqwest::Client::builder()
            .connect_timeout(DEFAULT_CONNECT_TIMEOUT)
            .build()
            .map_err(|err| GatewayError::Configuration(format!("http client: {err}")))?;
        let adapters = Adapters::from_config(&config, &http);
        Ok(Self::new(config, adapters, http))
    }

    /// Provider order for a generation request.
    fn generation_plan(&self, choice: ProviderChoice) -> Vec<Arc<dyn ProviderAdapter>> {
        let (first, second) = match choice {
            ProviderChoice::Primary => (&self.adapters.primary, &self.adapters.backup),
            ProviderChoice::Backup => (&self.adapters.backup, &self.adapters.primary),
        };
        [first, second]
            .into_iter()
            .filter(|adapter| {
                let skip =
                    adapter.id() == ProviderId::PrimaryGenerate && self.config.openai_key.is_none();
                if skip {
                    warn!(
                        "Skipping {} because OPENAI_API_KEY is not set",
                        adapter.id()
                    );
                }
                !skip
            })
            .cloned()
            .collect()
    }

    /// Builds the call for a generation adapter. Ratios the adapter can't
    /// take as a field go into the prompt instead.
    fn generation_spec(
        adapter: &dyn ProviderAdapter,
        prompt: &str,
        ratio: AspectRatio,
        language: &str,
        output_count: u8,
        input_images: Vec<String>,
        credential: Credential,
    ) -> ProviderCallSpec {
        let native = adapter.native_aspect_ratio(ratio);
        let instruction = (!native).then_some(ratio);
        ProviderCallSpec {
            provider: adapter.id(),
            payload: CallPayload::Generate {
                prompt: augment_prompt(prompt, instruction, language),
                aspect_ratio: native.then_some(ratio),
                output_count,
                input_images,
            },
            credential,
        }
    }

    /// One provider through the retry policy, then extraction.
    async fn try_provider(
        &self,
        adapter: &dyn ProviderAdapter,
        spec: &ProviderCallSpec,
    ) -> Result<ProviderOutput, GatewayError> {
        let raw = self
            .config
            .retry
            .run(adapter.id().as_str(), |_| adapter.invoke(spec))
            .await?;
        let images = extract(&raw)?;
        Ok(ProviderOutput {
            images,
            dropped: raw.dropped(),
        })
    }

    /// Uploaded image as a data URI, shrunk to the input ceilings first.
    async fn conditioning_image(&self, image: &InputImage) -> Result<String, GatewayError> {
        let prepared = prepare_blocking(image.bytes.clone(), self.config.input_constraints).await?;
        Ok(prepared.to_data_uri())
    }

    /// Text-to-image generation with provider fallback.
    pub async fn generate(
        &self,
        request: &GenerationRequest,
    ) -> Result<GenerationResult, GatewayError> {
        let credential = self.config.replicate_token()?.clone();
        let requested = request.provider_choice().provider();
        let input_images = match request.input_image() {
            Some(image) => vec![self.conditioning_image(image).await?],
            None => Vec::new(),
        };

        let mut failures = Vec::new();
        for adapter in self.generation_plan(request.provider_choice()) {
            let spec = Self::generation_spec(
                adapter.as_ref(),
                request.prompt(),
                request.aspect_ratio(),
                request.language(),
                request.output_count(),
                input_images.clone(),
                credential.clone(),
            );
            info!(
                "Generating {} image(s) with {} ({})",
                request.output_count(),
                adapter.id(),
                request.aspect_ratio()
            );
            match self.try_provider(adapter.as_ref(), &spec).await {
                Ok(output) => {
                    if adapter.id() != requested {
                        warn!("{} unavailable, served by {}", requested, adapter.id());
                    }
                    return Ok(GenerationResult::new(
                        output.images,
                        adapter.id(),
                        requested,
                        output.dropped,
                    ));
                }
                Err(err) => {
                    warn!("{} failed: {}", adapter.id(), err);
                    failures.push(ProviderFailure::new(adapter.id(), &err));
                }
            }
        }
        Err(GatewayError::Exhausted(failures))
    }

    /// A single primary-model call on an uploaded image. No fallback: the
    /// backup model can't condition on images.
    async fn transform_with_primary(
        &self,
        image: &InputImage,
        prompt: &str,
        ratio: AspectRatio,
    ) -> Result<GenerationResult, GatewayError> {
        let credential = self.config.replicate_token()?.clone();
        if self.config.openai_key.is_none() {
            return Err(GatewayError::Configuration(
                "OPENAI_API_KEY is not configured".to_string(),
            ));
        }
        let adapter = self.adapters.primary.as_ref();
        let spec = Self::generation_spec(
            adapter,
            prompt,
            ratio,
            crate::constants::DEFAULT_LANGUAGE,
            1,
            vec![self.conditioning_image(image).await?],
            credential,
        );
        match self.try_provider(adapter, &spec).await {
            Ok(output) => Ok(GenerationResult::new(
                output.images,
                adapter.id(),
                adapter.id(),
                output.dropped,
            )),
            Err(err) => Err(GatewayError::Exhausted(vec![ProviderFailure::new(
                adapter.id(),
                &err,
            )])),
        }
    }

    /// Re-renders an uploaded image for another language, as a square.
    pub async fn translate(
        &self,
        image: &InputImage,
        target_language: &str,
    ) -> Result<GenerationResult, GatewayError> {
        if target_language.trim().is_empty() {
            return Err(GatewayError::InvalidRequest(
                "targetLanguage is required".to_string(),
            ));
        }
        let language = language_name(target_language);
        info!("Translating image for {} audience", language);
        self.transform_with_primary(image, &translation_prompt(language), AspectRatio::Square)
            .await
    }

    /// Re-composes an uploaded image as 3:2 landscape.
    pub async fn resize(&self, image: &InputImage) -> Result<GenerationResult, GatewayError> {
        info!("Resizing image to 3:2");
        self.transform_with_primary(image, RESIZE_PROMPT, AspectRatio::Photo)
            .await
    }

    /// Sends a downloaded source through the editor with retry.
    async fn run_edit(
        &self,
        source: InputImage,
        operation: EditOperation,
        credential: Credential,
    ) -> Result<NormalizedImage, GatewayError> {
        let prepared = prepare_blocking(source.bytes, self.config.input_constraints).await?;
        let adapter = self.adapters.editor.as_ref();
        let spec = ProviderCallSpec {
            provider: adapter.id(),
            payload: CallPayload::Edit {
                image: prepared,
                operation,
            },
            credential,
        };
        let output = self.try_provider(adapter, &spec).await?;
        output
            .images
            .into_iter()
            .next()
            .ok_or_else(|| GatewayError::NoUsableImages("editor returned no image".to_string()))
    }

    async fn download_source(&self, image_url: &str) -> Result<InputImage, GatewayError> {
        if image_url.trim().is_empty() {
            return Err(GatewayError::InvalidRequest(
                "imageUrl is required".to_string(),
            ));
        }
        fetch_image(
            &self.http,
            image_url,
            self.config.download_timeout,
            self.config.max_download_bytes,
        )
        .await
        .map_err(|err| {
            GatewayError::InvalidRequest(format!("Failed to download image from URL: {err}"))
        })
    }

    /// Expands an image to `target`, falling back to a local centered crop
    /// when the remote editor is exhausted.
    pub async fn expand(
        &self,
        image_url: &str,
        target: TargetRatio,
        seed: Option<i64>,
        remove_text: bool,
    ) -> Result<EditResult, GatewayError> {
        let credential = self.config.photoroom_key()?.clone();
        let size = target.dimensions();
        let source = self.download_source(image_url).await?;
        debug!(
            "Expanding {} byte source to {}x{}",
            source.bytes.len(),
            size.width,
            size.height
        );

        let operation = EditOperation::Expand {
            size,
            seed,
            remove_text,
        };
        let remote_err = match self.run_edit(source, operation, credential).await {
            Ok(image) => {
                return Ok(EditResult {
                    image,
                    provider_used: ProviderId::ImageEdit,
                    fallback_reason: None,
                    timestamp: Utc::now(),
                });
            }
            Err(err @ GatewayError::InvalidImageData(_)) => return Err(err),
            Err(err) => err,
        };

        warn!("Remote expansion failed, using local crop: {}", remote_err);
        match self.local.transform(image_url, size).await {
            Ok(image) => Ok(EditResult {
                image,
                provider_used: ProviderId::LocalFallback,
                fallback_reason: Some(remote_err.to_string()),
                timestamp: Utc::now(),
            }),
            Err(local_err) => Err(GatewayError::Exhausted(vec![
                ProviderFailure::new(ProviderId::ImageEdit, &remote_err),
                ProviderFailure::new(ProviderId::LocalFallback, &local_err),
            ])),
        }
    }

    /// Removes text from an image. No local fallback exists for this.
    pub async fn remove_text(
        &self,
        image_url: &str,
        mode: Option<&str>,
    ) -> Result<EditResult, GatewayError> {
        let credential = self.config.photoroom_key()?.clone();
        let mode = mode
            .map(str::trim)
            .filter(|mode| !mode.is_empty())
            .unwrap_or(DEFAULT_TEXT_REMOVAL_MODE)
            .to_string();
        let source = self.download_source(image_url).await?;
        info!("Removing text with mode {}", mode);

        match self
            .run_edit(source, EditOperation::RemoveText { mode }, credential)
            .await
        {
            Ok(image) => Ok(EditResult {
                image,
                provider_used: ProviderId::ImageEdit,
                fallback_reason: None,
                timestamp: Utc::now(),
            }),
            Err(err @ GatewayError::InvalidImageData(_)) => Err(err),
            Err(err) => Err(GatewayError::Exhausted(vec![ProviderFailure::new(
                ProviderId::ImageEdit,
                &err,
            )])),
        }
    }

    /// Generates every format/feature combination through the worker pool.
    /// Failed combinations are skipped; only total failure is an error.
    pub async fn generate_ad(&self, request: &AdRequest) -> Result<AdResult, GatewayError> {
        request.validate()?;
        self.config.replicate_token()?;

        let mut jobs = Vec::new();
        for format in &request.formats {
            let Some(template) = AdTemplate::from_format_name(format) else {
                warn!("No template found for format: {}", format);
                continue;
            };
            for feature in &request.features {
                let prompt = template.render(
                    &request.product_name,
                    &request.product_description,
                    &feature.name,
                    &feature.description,
                );
                jobs.push((format.as_str(), feature.name.as_str(), prompt));
            }
        }
        if jobs.is_empty() {
            return Err(GatewayError::InvalidRequest(
                "none of the requested formats are supported".to_string(),
            ));
        }
        info!(
            "Generating {} format/feature combinations, {} at a time",
            jobs.len(),
            self.config.fanout_concurrency
        );

        let outcomes = run_bounded(
            jobs,
            self.config.fanout_concurrency,
            |(format, feature, prompt)| async move {
                let outcome = match GenerationRequest::new(
                    &prompt,
                    request.aspect_ratio,
                    request.language.as_deref(),
                    Some(request.num_ads),
                    request.provider_choice,
                ) {
                    Ok(generation) => self.generate(&generation).await,
                    Err(err) => Err(err),
                };
                (format, feature, outcome)
            },
        )
        .boxed()
        .await;

        let mut result = AdResult::default();
        let mut failures = Vec::new();
        for (format, feature, outcome) in outcomes {
            match outcome {
                Ok(generated) => {
                    debug!(
                        "{} image(s) for {} - {}",
                        generated.images.len(),
                        format,
                        feature
                    );
                    result.push(format, generated.images);
                }
                Err(GatewayError::Exhausted(provider_failures)) => {
                    warn!("Every provider failed for {} - {}", format, feature);
                    failures.extend(provider_failures);
                }
                Err(err) => {
                    warn!("Error generating for {} - {}: {}", format, feature, err);
                    failures.push(ProviderFailure::new(
                        request.provider_choice.provider(),
                        &err,
                    ));
                }
            }
        }

        if result.is_empty() {
            return Err(GatewayError::Exhausted(failures));
        }
        info!(
            "Generated {} image(s) across {} format(s)",
            result.total_images(),
            result.groups().len()
        );
        Ok(result)
    }
}
