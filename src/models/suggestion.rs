//! Suggestion types and provider payload normalization.
//!
//! K_i: A suggestion is built fresh from each successful provider response
//! and never mutated afterwards.
//! B_i: Provider records may omit optional fields → defaulted, never null.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Tags that mark a suggestion as a city-level place.
const CITY_TAGS: [&str; 4] = [
    "locality",
    "administrative_area_level_1",
    "administrative_area_level_2",
    "country",
];

/// A single autocomplete suggestion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Suggestion {
    /// Opaque provider identifier
    pub place_id: String,

    /// Full human-readable description ("Paris, France")
    pub description: String,

    /// Primary line ("Paris")
    pub main_text: String,

    /// Secondary line ("France")
    pub secondary_text: String,

    /// Provider place types
    pub category_tags: BTreeSet<String>,
}

impl Suggestion {
    /// Text shown for this suggestion in a list.
    pub fn display(&self) -> &str {
        &self.description
    }

    /// Whether the provider tagged this as a city, region or country.
    pub fn is_city(&self) -> bool {
        self.category_tags
            .iter()
            .any(|tag| CITY_TAGS.contains(&tag.as_str()))
    }
}

/// Provider-level status carried in a successful HTTP response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderStatus {
    Ok,
    ZeroResults,
    OverQueryLimit,
    RequestDenied,
    InvalidRequest,
    UnknownError,
    Other(String),
}

impl ProviderStatus {
    pub fn parse(status: &str) -> Self {
        match status {
            "OK" => Self::Ok,
            "ZERO_RESULTS" => Self::ZeroResults,
            "OVER_QUERY_LIMIT" => Self::OverQueryLimit,
            "REQUEST_DENIED" => Self::RequestDenied,
            "INVALID_REQUEST" => Self::InvalidRequest,
            "UNKNOWN_ERROR" => Self::UnknownError,
            other => Self::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Ok => "OK",
            Self::ZeroResults => "ZERO_RESULTS",
            Self::OverQueryLimit => "OVER_QUERY_LIMIT",
            Self::RequestDenied => "REQUEST_DENIED",
            Self::InvalidRequest => "INVALID_REQUEST",
            Self::UnknownError => "UNKNOWN_ERROR",
            Self::Other(s) => s,
        }
    }

    /// `OK` and `ZERO_RESULTS` both mean "no error".
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Ok | Self::ZeroResults)
    }

    /// Only quota exhaustion and the provider's own transient failure are worth retrying.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::OverQueryLimit | Self::UnknownError)
    }

    /// Display-safe explanation.
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::OverQueryLimit => "Search limit reached. Please try again later.",
            Self::InvalidRequest => "Invalid search request. Please try a different search term.",
            Self::UnknownError => "Search service encountered an error. Please try again.",
            _ => "Search service is temporarily unavailable.",
        }
    }
}

impl fmt::Display for ProviderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Autocomplete endpoint response body.
#[derive(Debug, Default, Deserialize)]
pub struct PlacesResponse {
    #[serde(default)]
    pub predictions: Option<Vec<RawPrediction>>,

    #[serde(default)]
    pub status: Option<String>,
}

/// Error body returned alongside a non-success HTTP status.
#[derive(Debug, Default, Deserialize)]
pub struct PlacesErrorBody {
    #[serde(default)]
    pub error: Option<String>,
}

/// One prediction as the wire carries it.
///
/// Accepts both the proxied camelCase shape (`placeId`, `mainText`, ...) and
/// the provider's native shape (`place_id`, `structured_formatting`).
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct RawPrediction {
    #[serde(rename = "placeId", alias = "place_id")]
    pub place_id: Option<String>,

    pub description: Option<String>,

    #[serde(rename = "mainText", alias = "main_text")]
    pub main_text: Option<String>,

    #[serde(rename = "secondaryText", alias = "secondary_text")]
    pub secondary_text: Option<String>,

    pub structured_formatting: Option<StructuredFormatting>,

    #[serde(alias = "categoryTags")]
    pub types: Option<Vec<String>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct StructuredFormatting {
    pub main_text: Option<String>,
    pub secondary_text: Option<String>,
}

impl From<RawPrediction> for Suggestion {
    fn from(raw: RawPrediction) -> Self {
        let (structured_main, structured_secondary) = raw
            .structured_formatting
            .map(|s| (s.main_text, s.secondary_text))
            .unwrap_or_default();

        Self {
            place_id: raw.place_id.unwrap_or_default(),
            description: raw.description.unwrap_or_default(),
            main_text: raw.main_text.or(structured_main).unwrap_or_default(),
            secondary_text: raw
                .secondary_text
                .or(structured_secondary)
                .unwrap_or_default(),
            category_tags: raw.types.unwrap_or_default().into_iter().collect(),
        }
    }
}
