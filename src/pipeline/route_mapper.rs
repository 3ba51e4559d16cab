//! Route-LLM mapper: decides which shape of Places
//! request to issue — a text search, a nearby search anchored on the
//! user's coordinates, or a landmark-relative plan.
//!
//! Retries once on a transient LLM failure before giving up: try the
//! candidate, log and continue on failure, generalized here from
//! "escalate to the next tier" to "retry the same call once".

use std::time::Duration;

use serde::Deserialize;
use serde_json::json;
use tracing::warn;

use crate::llm::{LlmClient, LlmError, LlmPurpose};
use crate::model::LatLng;
use crate::places::PlacesRequest;

const MAX_ATTEMPTS: u32 = 2;

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "SCREAMING_SNAKE_CASE")]
enum MapperLlmOutput {
    TextSearch { query: String },
    Nearby { radius_meters: u32, keyword: Option<String> },
    LandmarkPlan { landmark: String, query: String },
}

fn schema() -> serde_json::Value {
    json!({
        "type": "object",
        "oneOf": [
            {"properties": {"kind": {"const": "TEXT_SEARCH"}, "query": {"type": "string"}}, "required": ["kind", "query"]},
            {"properties": {"kind": {"const": "NEARBY"}, "radiusMeters": {"type": "integer"}, "keyword": {"type": ["string", "null"]}}, "required": ["kind", "radiusMeters"]},
            {"properties": {"kind": {"const": "LANDMARK_PLAN"}, "landmark": {"type": "string"}, "query": {"type": "string"}}, "required": ["kind", "landmark", "query"]},
        ],
    })
}

fn prompt(query: &str, is_near_me: bool, has_location: bool) -> String {
    format!(
        "Map the following restaurant search query to exactly one provider \
         request shape: TEXT_SEARCH, NEARBY, or LANDMARK_PLAN. The user's \
         location is {}available. The query was flagged near-me: {}.\n\n\
         Query: {query}",
        if has_location { "" } else { "not " },
        is_near_me,
    )
}

fn to_places_request(output: MapperLlmOutput, region_code: Option<String>, location: LatLng) -> PlacesRequest {
    match output {
        MapperLlmOutput::TextSearch { query } => {
            PlacesRequest::TextSearch { query, region_code, open_now: None, price_level: None }
        }
        MapperLlmOutput::Nearby { radius_meters, keyword } => {
            PlacesRequest::Nearby { location, radius_meters, keyword, open_now: None, price_level: None }
        }
        MapperLlmOutput::LandmarkPlan { landmark, query } => PlacesRequest::LandmarkPlan { landmark, query },
    }
}

/// Result of the Route-LLM mapper: either a mapped provider request, or a
/// deterministic signal that a location is required and wasn't supplied —
/// in which case no LLM call is made at all.
#[derive(Debug)]
pub enum RouteMapperOutcome {
    Request(PlacesRequest),
    NeedsLocation,
}

/// Run the Route-LLM mapper, retrying once on failure before surfacing the
/// error to the caller for pipeline-level classification.
///
/// A near-me query with no supplied location short-circuits to
/// `NeedsLocation` before any LLM call — a deterministic guard distinct
/// from (and a safety net behind) the caller's own near-me check, since a
/// NEARBY route can also be produced without the near-me phrasing guard
/// having fired.
pub async fn run_route_mapper(
    llm: &dyn LlmClient,
    model: &str,
    timeout: Duration,
    query: &str,
    is_near_me: bool,
    location: Option<LatLng>,
    region_code: Option<String>,
) -> Result<RouteMapperOutcome, LlmError> {
    if is_near_me && location.is_none() {
        return Ok(RouteMapperOutcome::NeedsLocation);
    }

    let prompt_text = prompt(query, is_near_me, location.is_some());
    let mut last_err = None;

    for attempt in 1..=MAX_ATTEMPTS {
        match llm.complete_json(LlmPurpose::RouteMapper, model, &prompt_text, &schema(), timeout).await {
            Ok(raw) => match serde_json::from_value::<MapperLlmOutput>(raw) {
                Ok(MapperLlmOutput::Nearby { .. }) if location.is_none() => {
                    // The mapper chose NEARBY on its own even though the
                    // caller's near-me guard didn't fire — still no
                    // location to center on.
                    return Ok(RouteMapperOutcome::NeedsLocation);
                }
                Ok(output) => return Ok(RouteMapperOutcome::Request(to_places_request(
                    output,
                    region_code,
                    location.unwrap_or(LatLng { lat: 0.0, lng: 0.0 }),
                ))),
                Err(e) => {
                    warn!(attempt, error = %e, "route mapper output failed schema validation");
                    last_err = Some(LlmError::SchemaInvalid(e.to_string()));
                }
            },
            Err(e) => {
                warn!(attempt, error = %e, "route mapper call failed");
                last_err = Some(e);
            }
        }
    }

    Err(last_err.expect("loop runs at least once"))
}
