//! Normalization of provider responses into canonical image references.
//!
//! Providers are not consistent about how they hand back an image: a bare
//! URL string, an object with a `url` string, an object whose `url` is a
//! link object or a lazy accessor, base64 payloads, arrays or maps keyed by
//! position. Responses are first mapped into [`RawProviderResponse`], then
//! [`extract`] walks every entry through a fixed priority order and keeps
//! whatever it can turn into a [`NormalizedImage`].

use std::sync::Arc;

use base64::Engine;
use base64::engine::general_purpose;
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::error::GatewayError;
use crate::model::NormalizedImage;

/// Property names scanned, in order, when nothing better was found.
pub const FALLBACK_LINK_FIELDS: [&str; 4] = ["url", "href", "src", "link"];

/// A zero-argument accessor that yields the image location on demand.
pub type UrlAccessor = Arc<dyn Fn() -> Result<UrlValue, String> + Send + Sync>;

/// The value found under an entry's `url` property.
#[derive(Clone)]
pub enum UrlValue {
    /// Plain string
    Text(String),
    /// URL-like object exposing `href`
    Link {
        /// The link target
        href: String,
    },
    /// Lazily evaluated location
    Accessor(UrlAccessor),
    /// Anything else
    Other(Value),
}

impl std::fmt::Debug for UrlValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Text(text) => f.debug_tuple("Text").field(text).finish(),
            Self::Link { href } => f.debug_struct("Link").field("href", href).finish(),
            Self::Accessor(_) => f.write_str("Accessor(..)"),
            Self::Other(value) => f.debug_tuple("Other").field(value).finish(),
        }
    }
}

impl UrlValue {
    fn from_json(value: Value) -> Self {
        match value {
            Value::String(text) => Self::Text(text),
            Value::Object(mut object) => match object.remove("href") {
                Some(Value::String(href)) => Self::Link { href },
                Some(other) => {
                    object.insert("href".to_string(), other);
                    Self::Other(Value::Object(object))
                }
                None => Self::Other(Value::Object(object)),
            },
            other => Self::Other(other),
        }
    }
}

/// An object-shaped entry: the `url` property pulled out, everything else
/// kept untyped.
#[derive(Clone, Debug, Default)]
pub struct RawObject {
    /// The `url` property, if present
    pub url: Option<UrlValue>,
    /// Remaining properties
    pub fields: Map<String, Value>,
}

/// One element of a provider response.
#[derive(Clone, Debug)]
pub enum RawEntry {
    /// A bare string
    Text(String),
    /// An object
    Object(RawObject),
    /// A shape nothing knows how to read
    Unknown(Value),
}

impl RawEntry {
    /// Maps one JSON value into the entry union.
    pub fn from_json(value: Value) -> Self {
        match value {
            Value::String(text) => Self::Text(text),
            Value::Object(mut fields) => {
                let url = fields.remove("url").map(UrlValue::from_json);
                Self::Object(RawObject { url, fields })
            }
            other => Self::Unknown(other),
        }
    }

    /// Object entry whose `url` is an accessor.
    pub fn with_accessor<F>(accessor: F) -> Self
    where
        F: Fn() -> Result<UrlValue, String> + Send + Sync + 'static,
    {
        Self::Object(RawObject {
            url: Some(UrlValue::Accessor(Arc::new(accessor))),
            fields: Map::new(),
        })
    }
}

/// What a provider returned, before normalization.
#[derive(Clone, Debug)]
pub enum RawProviderResponse {
    /// Entries in provider order
    Entries(Vec<RawEntry>),
    /// Entries that made it, plus how many sub-calls were lost
    Partial {
        /// Successful entries in issue order
        entries: Vec<RawEntry>,
        /// Lost outputs
        dropped: usize,
    },
    /// Nothing came back
    Empty,
    /// The provider signalled failure in-band
    Failed(String),
}

impl RawProviderResponse {
    /// Maps a model's JSON output. Arrays map positionally, maps keyed by
    /// position map in numeric key order, an object carrying only an `error`
    /// message is an in-band failure, any other value is one entry.
    pub fn from_output(output: Value) -> Self {
        match output {
            Value::Null => Self::Empty,
            Value::Array(items) if items.is_empty() => Self::Empty,
            Value::Array(items) => {
                Self::Entries(items.into_iter().map(RawEntry::from_json).collect())
            }
            Value::Object(object) if is_positional_map(&object) => {
                let mut keyed: Vec<(usize, Value)> = object
                    .into_iter()
                    .filter_map(|(key, value)| key.parse::<usize>().ok().map(|key| (key, value)))
                    .collect();
                keyed.sort_by_key(|(key, _)| *key);
                Self::Entries(
                    keyed
                        .into_iter()
                        .map(|(_, value)| RawEntry::from_json(value))
                        .collect(),
                )
            }
            Value::Object(object) => match in_band_error(&object) {
                Some(message) => Self::Failed(message),
                None => Self::Entries(vec![RawEntry::from_json(Value::Object(object))]),
            },
            other => Self::Entries(vec![RawEntry::from_json(other)]),
        }
    }

    /// Number of outputs lost before extraction.
    pub fn dropped(&self) -> usize {
        match self {
            Self::Partial { dropped, .. } => *dropped,
            _ => 0,
        }
    }

    /// Entries, empty for the empty and failed shapes.
    pub fn entries(&self) -> &[RawEntry] {
        match self {
            Self::Entries(entries) | Self::Partial { entries, .. } => entries,
            Self::Empty | Self::Failed(_) => &[],
        }
    }

    /// Consumes the response, keeping only its entries.
    pub fn into_entries(self) -> Vec<RawEntry> {
        match self {
            Self::Entries(entries) | Self::Partial { entries, .. } => entries,
            Self::Empty | Self::Failed(_) => Vec::new(),
        }
    }
}

fn is_positional_map(object: &Map<String, Value>) -> bool {
    !object.is_empty() && object.keys().all(|key| key.parse::<usize>().is_ok())
}

/// The `error` message of an object that has no image field at all.
fn in_band_error(object: &Map<String, Value>) -> Option<String> {
    let message = object.get("error")?.as_str()?.trim();
    let has_image = FALLBACK_LINK_FIELDS
        .iter()
        .chain(["b64_json"].iter())
        .any(|field| object.contains_key(*field));
    (!has_image && !message.is_empty()).then(|| message.to_string())
}

/// Why an entry was dropped.
#[derive(Debug, Eq, PartialEq)]
pub enum SkipReason {
    /// String that is neither a URL nor a data URI
    NotALink,
    /// The `url` accessor raised
    AccessorFailed(String),
    /// Object with no readable link
    NoLinkField,
    /// Not a string or an object
    UnknownShape,
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotALink => write!(f, "string is not a URL or data URI"),
            Self::AccessorFailed(err) => write!(f, "url accessor failed: {err}"),
            Self::NoLinkField => write!(f, "object has no usable link property"),
            Self::UnknownShape => write!(f, "unrecognised entry shape"),
        }
    }
}

/// Normalizes one entry.
pub fn extract_entry(entry: &RawEntry) -> Result<NormalizedImage, SkipReason> {
    match entry {
        RawEntry::Text(text) => NormalizedImage::parse(text).ok_or(SkipReason::NotALink),
        RawEntry::Object(object) => extract_object(object),
        RawEntry::Unknown(_) => Err(SkipReason::UnknownShape),
    }
}

fn extract_object(object: &RawObject) -> Result<NormalizedImage, SkipReason> {
    if let Some(UrlValue::Text(text)) = &object.url
        && let Some(image) = NormalizedImage::parse(text)
    {
        return Ok(image);
    }

    if let Some(UrlValue::Accessor(accessor)) = &object.url {
        match accessor() {
            Ok(UrlValue::Text(text)) => {
                if let Some(image) = NormalizedImage::parse(&text) {
                    return Ok(image);
                }
            }
            Ok(UrlValue::Link { href }) => {
                if let Some(image) = NormalizedImage::parse(&href) {
                    return Ok(image);
                }
            }
            Ok(other) => debug!("url accessor returned a non-link value: {:?}", other),
            Err(err) => return Err(SkipReason::AccessorFailed(err)),
        }
    }

    if let Some(UrlValue::Link { href }) = &object.url
        && let Some(image) = NormalizedImage::parse(href)
    {
        return Ok(image);
    }

    if let Some(image) = object
        .fields
        .get("href")
        .and_then(Value::as_str)
        .and_then(NormalizedImage::parse)
    {
        return Ok(image);
    }

    for field in FALLBACK_LINK_FIELDS {
        if let Some(image) = object
            .fields
            .get(field)
            .and_then(Value::as_str)
            .and_then(NormalizedImage::parse)
        {
            debug!("found image link under '{field}'");
            return Ok(image);
        }
    }

    if let Some(payload) = object.fields.get("b64_json").and_then(Value::as_str)
        && general_purpose::STANDARD.decode(payload).is_ok()
    {
        return Ok(NormalizedImage::from_base64("image/png", payload));
    }

    Err(SkipReason::NoLinkField)
}

/// Normalizes a whole response. Bad entries are logged and skipped; an empty
/// result is an error.
pub fn extract(raw: &RawProviderResponse) -> Result<Vec<NormalizedImage>, GatewayError> {
    if let RawProviderResponse::Failed(message) = raw {
        return Err(GatewayError::NoUsableImages(format!(
            "provider reported failure: {message}"
        )));
    }

    let entries = raw.entries();
    let mut images = Vec::with_capacity(entries.len());
    for (index, entry) in entries.iter().enumerate() {
        match extract_entry(entry) {
            Ok(image) => {
                debug!("entry {index}: extracted {image}");
                images.push(image);
            }
            Err(reason) => warn!("entry {index}: dropped, {reason}"),
        }
    }

    if images.is_empty() {
        return Err(GatewayError::NoUsableImages(format!(
            "none of {} response entries held an image",
            entries.len()
        )));
    }
    Ok(images)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const URL: &str = "http://cdn.example.org/out-0.png";

    fn object_with_url(url: UrlValue) -> RawEntry {
        RawEntry::Object(RawObject {
            url: Some(url),
            fields: Map::new(),
        })
    }

    #[test]
    fn all_link_shapes_normalize_to_the_same_reference() {
        let shapes = vec![
            RawEntry::Text(URL.to_string()),
            object_with_url(UrlValue::Text(URL.to_string())),
            RawEntry::with_accessor(|| Ok(UrlValue::Text(URL.to_string()))),
            RawEntry::with_accessor(|| {
                Ok(UrlValue::Link {
                    href: URL.to_string(),
                })
            }),
            object_with_url(UrlValue::Link {
                href: URL.to_string(),
            }),
            RawEntry::from_json(json!({ "url": URL })),
            RawEntry::from_json(json!({ "url": { "href": URL } })),
            RawEntry::from_json(json!({ "href": URL })),
            RawEntry::from_json(json!({ "src": URL })),
            RawEntry::from_json(json!({ "link": URL })),
        ];
        for shape in &shapes {
            let image = extract_entry(shape).expect("shape should normalize");
            assert_eq!(image.as_str(), URL, "shape {shape:?}");
        }
    }

    #[test]
    fn one_malformed_entry_among_valid_ones_is_skipped_in_order() {
        let raw = RawProviderResponse::Entries(vec![
            RawEntry::Text("https://cdn.example.org/a.png".to_string()),
            RawEntry::from_json(json!({ "url": 42 })),
            RawEntry::with_accessor(|| {
                Ok(UrlValue::Text("https://cdn.example.org/b.png".to_string()))
            }),
            RawEntry::Text("data:image/png;base64,iVBORw0KGgo=".to_string()),
        ]);
        let images = extract(&raw).expect("three usable entries");
        let refs: Vec<_> = images.iter().map(NormalizedImage::as_str).collect();
        assert_eq!(
            refs,
            vec![
                "https://cdn.example.org/a.png",
                "https://cdn.example.org/b.png",
                "data:image/png;base64,iVBORw0KGgo=",
            ]
        );
    }

    #[test]
    fn failing_accessor_skips_only_that_entry() {
        let raw = RawProviderResponse::Entries(vec![
            RawEntry::with_accessor(|| Err("file handle closed".to_string())),
            RawEntry::Text(URL.to_string()),
        ]);
        let images = extract(&raw).expect("second entry survives");
        assert_eq!(images.len(), 1);
        assert_eq!(
            extract_entry(&raw.entries()[0]),
            Err(SkipReason::AccessorFailed("file handle closed".to_string()))
        );
    }

    #[test]
    fn accessor_returning_junk_is_dropped() {
        let entry = RawEntry::with_accessor(|| Ok(UrlValue::Other(json!(12))));
        assert_eq!(extract_entry(&entry), Err(SkipReason::NoLinkField));
    }

    #[test]
    fn base64_payloads_become_data_uris() {
        let entry = RawEntry::from_json(json!({ "b64_json": "iVBORw0KGgo=" }));
        let image = extract_entry(&entry).expect("base64 entry");
        assert_eq!(image.as_str(), "data:image/png;base64,iVBORw0KGgo=");
    }

    #[test]
    fn positional_maps_keep_numeric_order() {
        let raw = RawProviderResponse::from_output(json!({
            "10": "https://cdn.example.org/c.png",
            "2": { "url": "https://cdn.example.org/b.png" },
            "0": "https://cdn.example.org/a.png",
        }));
        let images = extract(&raw).expect("map entries");
        let refs: Vec<_> = images.iter().map(NormalizedImage::as_str).collect();
        assert_eq!(
            refs,
            vec![
                "https://cdn.example.org/a.png",
                "https://cdn.example.org/b.png",
                "https://cdn.example.org/c.png",
            ]
        );
    }

    #[test]
    fn single_string_output_is_one_entry() {
        let raw = RawProviderResponse::from_output(json!(URL));
        assert_eq!(raw.entries().len(), 1);
        assert_eq!(extract(&raw).expect("one image").len(), 1);
    }

    #[test]
    fn empty_and_failed_responses_have_no_usable_images() {
        for raw in [
            RawProviderResponse::from_output(Value::Null),
            RawProviderResponse::from_output(json!([])),
            RawProviderResponse::Failed("nsfw".to_string()),
            RawProviderResponse::Entries(vec![
                RawEntry::Text("not a url".to_string()),
                RawEntry::Unknown(json!(true)),
            ]),
        ] {
            assert!(matches!(
                extract(&raw),
                Err(GatewayError::NoUsableImages(_))
            ));
        }
    }

    #[test]
    fn error_objects_are_in_band_failures() {
        let raw = RawProviderResponse::from_output(json!({ "error": "NSFW content detected" }));
        assert!(matches!(&raw, RawProviderResponse::Failed(msg) if msg == "NSFW content detected"));
        match extract(&raw) {
            Err(GatewayError::NoUsableImages(msg)) => assert!(msg.contains("NSFW"), "{msg}"),
            other => panic!("expected no usable images, got {other:?}"),
        }

        // an image next to an error field still counts
        let raw = RawProviderResponse::from_output(json!({ "error": "partial", "url": URL }));
        assert_eq!(extract(&raw).expect("one image").len(), 1);
    }

    #[test]
    fn partial_responses_report_dropped_outputs() {
        let raw = RawProviderResponse::Partial {
            entries: vec![RawEntry::Text(URL.to_string())],
            dropped: 1,
        };
        assert_eq!(raw.dropped(), 1);
        assert_eq!(extract(&raw).expect("one image").len(), 1);
    }
}
