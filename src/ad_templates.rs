//! Ad creative prompt templates and the request/result types of
//! `/api/generate-ad`.

use serde::Serialize;
use serde::ser::SerializeMap;

use crate::constants::MAX_OUTPUTS_PER_REQUEST;
use crate::error::GatewayError;
use crate::model::{AspectRatio, NormalizedImage, ProviderChoice};

/// Supported ad formats.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum AdTemplate {
    /// Headline, subheadline, hero visual and CTA
    Standard,
    /// Visual-led editorial ad
    PureHero,
    /// Customer quote with a portrait
    Testimonial,
    /// Three-panel comic strip
    ComicStory,
    /// Unconstrained creative direction
    CreativeFreedom,
}

impl AdTemplate {
    /// Every template.
    pub const ALL: [AdTemplate; 5] = [
        Self::Standard,
        Self::PureHero,
        Self::Testimonial,
        Self::ComicStory,
        Self::CreativeFreedom,
    ];

    /// Display name callers send in `formats`.
    pub fn format_name(self) -> &'static str {
        match self {
            Self::Standard => "Standard Template",
            Self::PureHero => "Pure Hero Concept",
            Self::Testimonial => "Testimonial",
            Self::ComicStory => "Comic Story",
            Self::CreativeFreedom => "Creative Freedom",
        }
    }

    /// Looks a template up by its display name.
    pub fn from_format_name(name: &str) -> Option<Self> {
        let name = name.trim();
        Self::ALL
            .into_iter()
            .find(|template| template.format_name() == name)
    }

    /// Builds the generation prompt for one product feature.
    pub fn render(
        self,
        product: &str,
        description: &str,
        feature: &str,
        feature_description: &str,
    ) -> String {
        match self {
            Self::Standard => format!(
                "You're a top ad designer. Create a high-converting static ad that promotes this feature with clear copy and a strong visual concept.

Product: {product}
Feature: {feature}: {feature_description}
Description: {description}

Layout:
- Headline at the top (max 10 chars, bold, benefit-driven)
- Subheadline just below (max 20 chars, plain tone)
- Centered hero visual showing the feature in action
- CTA at the bottom: \"Try {product} for free\"
- Leave 15% bottom padding so the CTA isn't cropped

Design rules:
- No logos
- Keep all text and visuals inside a central 80% safe zone
- Clean, modern design with soft shadows and a gradient or neutral background"
            ),
            Self::PureHero => format!(
                "You are a world-class ad creative designer. Create a high-quality static ad that highlights the feature below through strong visuals. Editorial style. No brand logo.

Product: {product}
Feature: {feature}: {feature_description}
Product description: {description}"
            ),
            Self::Testimonial => format!(
                "Create a testimonial ad for {product}'s {feature} feature.

Product: {product}
Feature: {feature}: {feature_description}
Context: {description}

Include a one or two sentence quote in quotation marks, an attribution line with a name and job title, and a realistic photo of that person in their work environment. Clean layout, no logos."
            ),
            Self::ComicStory => format!(
                "You are a skilled comic artist and storyteller. Create a 3-panel comic strip about this product feature.

Product: {product}
Feature: {feature}: {feature_description}
Context: {description}

Requirements:
- Panels follow setup, problem, solution
- Simple cartoon characters with short dialogue bubbles (max 8 words each)
- Show the feature solving a relatable problem
- No logos or brand names in the visuals"
            ),
            Self::CreativeFreedom => format!(
                "You are an innovative creative director with unlimited artistic freedom. Create an original advertisement that shows this feature in an unexpected, memorable way.

Product: {product}
Feature: {feature}: {feature_description}
Context: {description}

Keep the feature benefit understandable and leave out logos. Otherwise anything goes: abstract, metaphorical, surreal, minimalist or maximalist."
            ),
        }
    }
}

/// One product feature to advertise.
#[derive(Clone, Debug)]
pub struct AdFeature {
    /// Short name
    pub name: String,
    /// What it does
    pub description: String,
}

/// A batch of ads: every requested format crossed with every feature.
#[derive(Clone, Debug)]
pub struct AdRequest {
    /// Product name
    pub product_name: String,
    /// Product description
    pub product_description: String,
    /// Format display names, see [`AdTemplate::format_name`]
    pub formats: Vec<String>,
    /// Features to advertise
    pub features: Vec<AdFeature>,
    /// Aspect ratio for every image
    pub aspect_ratio: AspectRatio,
    /// Language of rendered text
    pub language: Option<String>,
    /// Images per format/feature combination
    pub num_ads: u32,
    /// Provider to start with
    pub provider_choice: ProviderChoice,
}

impl AdRequest {
    /// Checks required fields before any work is scheduled.
    pub fn validate(&self) -> Result<(), GatewayError> {
        if self.product_name.trim().is_empty() || self.product_description.trim().is_empty() {
            return Err(GatewayError::InvalidRequest(
                "productName and productDescription are required".to_string(),
            ));
        }
        if self.formats.is_empty() {
            return Err(GatewayError::InvalidRequest(
                "formats must be a non-empty array".to_string(),
            ));
        }
        if self.features.is_empty() || self.features.iter().any(|f| f.name.trim().is_empty()) {
            return Err(GatewayError::InvalidRequest(
                "features must be a non-empty array with name and description".to_string(),
            ));
        }
        if !(1..=u32::from(MAX_OUTPUTS_PER_REQUEST)).contains(&self.num_ads) {
            return Err(GatewayError::InvalidRequest(format!(
                "numAds must be between 1 and {MAX_OUTPUTS_PER_REQUEST}, got {}",
                self.num_ads
            )));
        }
        Ok(())
    }
}

/// Images grouped by format, in the order formats were requested.
/// Serializes as a JSON object keyed by format name.
#[derive(Clone, Debug, Default)]
pub struct AdResult {
    groups: Vec<(String, Vec<NormalizedImage>)>,
}

impl AdResult {
    /// Adds images under `format`, creating the group on first use.
    pub fn push(&mut self, format: &str, images: Vec<NormalizedImage>) {
        if images.is_empty() {
            return;
        }
        match self
            .groups
            .iter_mut()
            .find(|(name, _)| name.as_str() == format)
        {
            Some((_, existing)) => existing.extend(images),
            None => self.groups.push((format.to_string(), images)),
        }
    }

    /// Groups in request order.
    pub fn groups(&self) -> &[(String, Vec<NormalizedImage>)] {
        &self.groups
    }

    /// True when nothing was generated.
    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// Images across every format.
    pub fn total_images(&self) -> usize {
        self.groups.iter().map(|(_, images)| images.len()).sum()
    }
}

impl Serialize for AdResult {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.groups.len()))?;
        for (format, images) in &self.groups {
            map.serialize_entry(format, images)?;
        }
        map.end()
    }
}
