//! Filter resolution and post-filtering.
//!
//! "Base filters" are inferred from the query by an LLM call (e.g. "cheap
//! sushi" implies `priceLevel <= 2`); they are merged with whatever the
//! caller supplied explicitly in [`crate::model::RequestFilters`], with the
//! caller's explicit values always winning over an inferred guess.

use std::time::Duration;

use serde::Deserialize;
use serde_json::json;

use crate::llm::{LlmClient, LlmError, LlmPurpose};
use crate::model::RequestFilters;
use crate::places::PlacesRequest;

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct SharedFilters {
    #[serde(rename = "openNow")]
    pub open_now: Option<bool>,
    #[serde(rename = "priceLevel")]
    pub price_level: Option<u8>,
    #[serde(default)]
    pub dietary: Vec<String>,
    #[serde(rename = "mustHave", default)]
    pub must_have: Vec<String>,
}

fn schema() -> serde_json::Value {
    json!({
        "type": "object",
        "properties": {
            "openNow": {"type": ["boolean", "null"]},
            "priceLevel": {"type": ["integer", "null"], "minimum": 0, "maximum": 4},
            "dietary": {"type": "array", "items": {"type": "string"}},
            "mustHave": {"type": "array", "items": {"type": "string"}},
        },
    })
}

fn prompt(query: &str) -> String {
    format!(
        "Infer any implicit filters from this restaurant search query — \
         price level, dietary requirements, must-have amenities. Leave a \
         field out if nothing is implied.\n\nQuery: {query}"
    )
}

/// Infer filters implicit in the query text via an LLM call.
pub async fn infer_base_filters(
    llm: &dyn LlmClient,
    model: &str,
    timeout: Duration,
    query: &str,
) -> Result<SharedFilters, LlmError> {
    let raw = llm.complete_json(LlmPurpose::BaseFilters, model, &prompt(query), &schema(), timeout).await?;
    serde_json::from_value(raw).map_err(|e| LlmError::SchemaInvalid(e.to_string()))
}

/// Merge inferred filters with explicit caller-supplied ones. Explicit
/// values always win; list fields (`dietary`, `mustHave`) are unioned.
pub fn merge_filters(inferred: SharedFilters, explicit: Option<&RequestFilters>) -> SharedFilters {
    let Some(explicit) = explicit else { return inferred };

    let mut dietary = inferred.dietary;
    if let Some(extra) = &explicit.dietary {
        for item in extra {
            if !dietary.contains(item) {
                dietary.push(item.clone());
            }
        }
    }

    let mut must_have = inferred.must_have;
    if let Some(extra) = &explicit.must_have {
        for item in extra {
            if !must_have.contains(item) {
                must_have.push(item.clone());
            }
        }
    }

    SharedFilters {
        open_now: explicit.open_now.or(inferred.open_now),
        price_level: explicit.price_level.or(inferred.price_level),
        dietary,
        must_have,
    }
}

/// Fold resolved base filters into the mapped provider request — these are
/// the "hard" filters that shape the provider query itself (unlike
/// [`crate::pipeline::post_constraints::PostConstraints`], which only tags
/// or reorders results after the fact and never shrinks the result set).
pub fn apply_base_filters_to_request(request: PlacesRequest, filters: &SharedFilters) -> PlacesRequest {
    match request {
        PlacesRequest::TextSearch { query, region_code, .. } => PlacesRequest::TextSearch {
            query: augment_with_terms(query, filters),
            region_code,
            open_now: filters.open_now,
            price_level: filters.price_level,
        },
        PlacesRequest::Nearby { location, radius_meters, keyword, .. } => PlacesRequest::Nearby {
            location,
            radius_meters,
            keyword: augment_keyword_with_terms(keyword, filters),
            open_now: filters.open_now,
            price_level: filters.price_level,
        },
        PlacesRequest::LandmarkPlan { landmark, query } => {
            PlacesRequest::LandmarkPlan { landmark, query: augment_with_terms(query, filters) }
        }
    }
}

fn filter_terms(filters: &SharedFilters) -> Vec<&str> {
    filters.dietary.iter().chain(filters.must_have.iter()).map(String::as_str).collect()
}

fn augment_with_terms(query: String, filters: &SharedFilters) -> String {
    let terms = filter_terms(filters);
    if terms.is_empty() { query } else { format!("{query} {}", terms.join(" ")) }
}

fn augment_keyword_with_terms(keyword: Option<String>, filters: &SharedFilters) -> Option<String> {
    let terms = filter_terms(filters);
    if terms.is_empty() {
        return keyword;
    }
    let extra = terms.join(" ");
    Some(match keyword {
        Some(k) => format!("{k} {extra}"),
        None => extra,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_filters_override_inferred() {
        let inferred = SharedFilters { open_now: Some(false), price_level: Some(1), ..Default::default() };
        let explicit =
            RequestFilters { open_now: Some(true), price_level: None, dietary: None, must_have: None };
        let merged = merge_filters(inferred, Some(&explicit));
        assert_eq!(merged.open_now, Some(true));
        assert_eq!(merged.price_level, Some(1));
    }

    #[test]
    fn dietary_lists_are_unioned_without_duplicates() {
        let inferred = SharedFilters { dietary: vec!["vegan".into()], ..Default::default() };
        let explicit = RequestFilters {
            open_now: None,
            price_level: None,
            dietary: Some(vec!["vegan".into(), "gluten-free".into()]),
            must_have: None,
        };
        let merged = merge_filters(inferred, Some(&explicit));
        assert_eq!(merged.dietary, vec!["vegan".to_string(), "gluten-free".to_string()]);
    }

    #[test]
    fn no_explicit_filters_returns_inferred_unchanged() {
        let inferred = SharedFilters { open_now: Some(true), ..Default::default() };
        assert_eq!(merge_filters(inferred.clone(), None), inferred);
    }

    #[test]
    fn base_filters_set_open_now_and_price_level_on_text_search() {
        let filters = SharedFilters { open_now: Some(true), price_level: Some(2), ..Default::default() };
        let request =
            PlacesRequest::TextSearch { query: "pizza".into(), region_code: None, open_now: None, price_level: None };
        match apply_base_filters_to_request(request, &filters) {
            PlacesRequest::TextSearch { open_now, price_level, .. } => {
                assert_eq!(open_now, Some(true));
                assert_eq!(price_level, Some(2));
            }
            other => panic!("expected TextSearch, got {other:?}"),
        }
    }

    #[test]
    fn dietary_and_must_have_terms_are_appended_to_the_query() {
        let filters = SharedFilters { dietary: vec!["vegan".into()], must_have: vec!["rooftop".into()], ..Default::default() };
        let request =
            PlacesRequest::TextSearch { query: "pizza".into(), region_code: None, open_now: None, price_level: None };
        match apply_base_filters_to_request(request, &filters) {
            PlacesRequest::TextSearch { query, .. } => {
                assert!(query.contains("pizza"));
                assert!(query.contains("vegan"));
                assert!(query.contains("rooftop"));
            }
            other => panic!("expected TextSearch, got {other:?}"),
        }
    }

    #[test]
    fn no_filters_leaves_request_unchanged() {
        let filters = SharedFilters::default();
        let request =
            PlacesRequest::TextSearch { query: "pizza".into(), region_code: None, open_now: None, price_level: None };
        match apply_base_filters_to_request(request, &filters) {
            PlacesRequest::TextSearch { query, open_now, price_level, .. } => {
                assert_eq!(query, "pizza");
                assert_eq!(open_now, None);
                assert_eq!(price_level, None);
            }
            other => panic!("expected TextSearch, got {other:?}"),
        }
    }

    #[test]
    fn nearby_keyword_gains_filter_terms_alongside_any_existing_keyword() {
        let filters = SharedFilters { must_have: vec!["patio".into()], ..Default::default() };
        let request = PlacesRequest::Nearby {
            location: crate::model::LatLng { lat: 1.0, lng: 2.0 },
            radius_meters: 500,
            keyword: Some("sushi".into()),
            open_now: None,
            price_level: None,
        };
        match apply_base_filters_to_request(request, &filters) {
            PlacesRequest::Nearby { keyword: Some(k), .. } => {
                assert!(k.contains("sushi"));
                assert!(k.contains("patio"));
            }
            other => panic!("expected Nearby with a keyword, got {other:?}"),
        }
    }
}
