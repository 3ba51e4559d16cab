//! Core domain types shared across the pipeline, job store, and API layers.

use serde::{Deserialize, Serialize};

/// User-supplied coordinates.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct LatLng {
    pub lat: f64,
    pub lng: f64,
}

/// Soft filter hints a caller may supply up front.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RequestFilters {
    #[serde(rename = "openNow", default)]
    pub open_now: Option<bool>,
    #[serde(rename = "priceLevel", default)]
    pub price_level: Option<u8>,
    #[serde(default)]
    pub dietary: Option<Vec<String>>,
    #[serde(rename = "mustHave", default)]
    pub must_have: Option<Vec<String>>,
}

/// Immutable-after-accept inbound search request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchRequest {
    pub query: String,
    #[serde(rename = "userLocation", default)]
    pub user_location: Option<LatLng>,
    #[serde(default)]
    pub locale: Option<String>,
    #[serde(default)]
    pub filters: Option<RequestFilters>,
    #[serde(rename = "clearContext", default)]
    pub clear_context: Option<bool>,
}

/// UI/provider-facing language, resolved once per request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    He,
    En,
    Other,
}

impl Default for Language {
    fn default() -> Self {
        Self::Other
    }
}

/// A single ranked restaurant.
///
/// Invariant: no provider API keys ever appear here; photos are referenced
/// by opaque token only (`photo_reference` is never a raw provider URL).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RestaurantResult {
    #[serde(rename = "placeId")]
    pub place_id: String,
    pub name: String,
    pub address: String,
    pub location: LatLng,
    #[serde(default)]
    pub rating: Option<f64>,
    #[serde(rename = "openNow", default)]
    pub open_now: Option<bool>,
    #[serde(rename = "photoReference", default)]
    pub photo_reference: Option<String>,
    #[serde(rename = "distanceMeters", default)]
    pub distance_meters: Option<f64>,
    #[serde(default)]
    pub score: Option<f64>,
    #[serde(rename = "groupKind")]
    pub group_kind: GroupKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GroupKind {
    Exact,
    Nearby,
}

/// Why a search returned zero (or a degraded) result set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FailureReason {
    LowConfidence,
    LocationRequired,
}

/// Response metadata.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResponseMeta {
    pub source: String,
    #[serde(rename = "failureReason", skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<FailureReason>,
    #[serde(rename = "regionCode", skip_serializing_if = "Option::is_none")]
    pub region_code: Option<String>,
    #[serde(rename = "appliedFilters", default)]
    pub applied_filters: Vec<String>,
    #[serde(default)]
    pub chips: Vec<String>,
}

/// Assembled search response body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResponse {
    pub results: Vec<RestaurantResult>,
    pub meta: ResponseMeta,
}

impl SearchResponse {
    /// Build an empty response for a gate/clarify/near-me short-circuit.
    pub fn empty(source: &str, failure_reason: FailureReason) -> Self {
        Self {
            results: Vec::new(),
            meta: ResponseMeta {
                source: source.to_string(),
                failure_reason: Some(failure_reason),
                region_code: None,
                applied_filters: Vec::new(),
                chips: Vec::new(),
            },
        }
    }
}
