//! Intent stage.
//!
//! Classifies the raw query into a route (which downstream mapper stage
//! should handle it) plus a handful of advisory signals — a candidate
//! region, anchors, and whether the query reads as a near-me request. This
//! stage's LLM failures are stage-local: callers fall back to a
//! deterministic `TextSearch` route with a `reason` recording why, rather
//! than stopping the pipeline outright.

use std::time::Duration;

use serde::Deserialize;
use serde_json::json;

use crate::llm::{LlmClient, LlmError, LlmPurpose};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IntentRoute {
    TextSearch,
    Nearby,
    LandmarkPlan,
    Stop,
    Clarify,
}

/// Why `route` has the value it does. `Normal` means the LLM call
/// succeeded; the `Fallback*` variants mean the call failed and
/// [`passthrough`] produced a deterministic `TextSearch` route instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntentReason {
    Normal,
    FallbackTimeout,
    FallbackError,
    FallbackSchemaInvalid,
}

impl IntentReason {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Normal => "normal",
            Self::FallbackTimeout => "fallback_timeout",
            Self::FallbackError => "fallback_error",
            Self::FallbackSchemaInvalid => "fallback_schema_invalid",
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
struct IntentLlmOutput {
    route: IntentRoute,
    #[serde(rename = "regionCandidate", default)]
    region_candidate: Option<String>,
    #[serde(default)]
    language: Option<String>,
    #[serde(rename = "foodAnchor", default)]
    food_anchor: Option<String>,
    #[serde(rename = "locationAnchor", default)]
    location_anchor: Option<String>,
    #[serde(rename = "nearMe", default)]
    near_me: bool,
    #[serde(rename = "explicitDistanceMeters", default)]
    explicit_distance_meters: Option<f64>,
}

/// Intent classification. `region_candidate` is advisory only — the
/// canonical region code is resolved later by the shared-filters priority
/// chain, which may override it.
#[derive(Debug, Clone, PartialEq)]
pub struct IntentResult {
    pub route: IntentRoute,
    pub region_candidate: Option<String>,
    pub language: Option<String>,
    pub food_anchor: Option<String>,
    pub location_anchor: Option<String>,
    pub near_me: bool,
    pub explicit_distance_meters: Option<f64>,
    pub reason: IntentReason,
}

fn schema() -> serde_json::Value {
    json!({
        "type": "object",
        "properties": {
            "route": {
                "type": "string",
                "enum": ["TEXT_SEARCH", "NEARBY", "LANDMARK_PLAN", "STOP", "CLARIFY"],
            },
            "regionCandidate": {"type": ["string", "null"]},
            "language": {"type": ["string", "null"]},
            "foodAnchor": {"type": ["string", "null"]},
            "locationAnchor": {"type": ["string", "null"]},
            "nearMe": {"type": "boolean"},
            "explicitDistanceMeters": {"type": ["number", "null"]},
        },
        "required": ["route", "nearMe"],
        "additionalProperties": false,
    })
}

fn prompt(query: &str) -> String {
    format!(
        "Classify the following restaurant search query. Pick a route: \
         TEXT_SEARCH for a plain keyword/cuisine search, NEARBY when the \
         user wants places close to their current location, LANDMARK_PLAN \
         when the query anchors on a named landmark, STOP if this is not a \
         restaurant search, or CLARIFY if it is too ambiguous to route. \
         Extract an optional region candidate, food anchor, and location \
         anchor, and note whether the phrasing implies \"near me\".\n\n\
         Query: {query}"
    )
}

pub async fn run_intent(
    llm: &dyn LlmClient,
    model: &str,
    timeout: Duration,
    query: &str,
) -> Result<IntentResult, LlmError> {
    let raw = llm.complete_json(LlmPurpose::Intent, model, &prompt(query), &schema(), timeout).await?;
    let output: IntentLlmOutput =
        serde_json::from_value(raw).map_err(|e| LlmError::SchemaInvalid(e.to_string()))?;

    Ok(IntentResult {
        route: output.route,
        region_candidate: output.region_candidate,
        language: output.language,
        food_anchor: output.food_anchor,
        location_anchor: output.location_anchor,
        near_me: output.near_me,
        explicit_distance_meters: output.explicit_distance_meters,
        reason: IntentReason::Normal,
    })
}

/// Deterministic fallback used when the Intent stage's LLM call fails —
/// routes to `TextSearch` over the raw query rather than aborting, and
/// records why in `reason`.
pub fn passthrough(reason: IntentReason) -> IntentResult {
    IntentResult {
        route: IntentRoute::TextSearch,
        region_candidate: None,
        language: None,
        food_anchor: None,
        location_anchor: None,
        near_me: false,
        explicit_distance_meters: None,
        reason,
    }
}
