//! Post-constraints: soft hints extracted in parallel with base filters.
//!
//! Unlike [`crate::pipeline::filters::SharedFilters`], these never change
//! the provider query — they only tag or reorder results after the
//! Google-Maps stage has already run. A field left absent means "the user
//! didn't ask", never `false`; there's no way to request "not kosher".

use std::time::Duration;

use serde::Deserialize;
use serde_json::json;

use crate::llm::{LlmClient, LlmError, LlmPurpose};

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct PostConstraints {
    #[serde(rename = "isKosher", default)]
    pub is_kosher: Option<bool>,
    #[serde(rename = "isGlutenFree", default)]
    pub is_gluten_free: Option<bool>,
    #[serde(rename = "priceLevel", default)]
    pub price_level: Option<u8>,
    #[serde(default)]
    pub requirements: Vec<String>,
}

fn schema() -> serde_json::Value {
    json!({
        "type": "object",
        "properties": {
            "isKosher": {"type": ["boolean", "null"]},
            "isGlutenFree": {"type": ["boolean", "null"]},
            "priceLevel": {"type": ["integer", "null"], "minimum": 0, "maximum": 4},
            "requirements": {"type": "array", "items": {"type": "string"}},
        },
    })
}

fn prompt(query: &str) -> String {
    format!(
        "Extract soft preferences from this restaurant search query that \
         should only nudge ranking, not change the search itself — whether \
         the user wants kosher or gluten-free options, a price level, or \
         any other amenity requirement. Leave a field out entirely if the \
         user didn't mention it; never set a field to false.\n\nQuery: {query}"
    )
}

/// Infer soft constraints implicit in the query text via an LLM call, run
/// concurrently with [`crate::pipeline::filters::infer_base_filters`].
pub async fn infer_post_constraints(
    llm: &dyn LlmClient,
    model: &str,
    timeout: Duration,
    query: &str,
) -> Result<PostConstraints, LlmError> {
    let raw = llm.complete_json(LlmPurpose::PostConstraints, model, &prompt(query), &schema(), timeout).await?;
    serde_json::from_value(raw).map_err(|e| LlmError::SchemaInvalid(e.to_string()))
}

/// Soft-hint terms to nudge ranking with (matched against a result's
/// name/address) plus the `:soft`-suffixed labels to record in
/// `meta.appliedFilters`. Never used to drop a result.
pub fn soft_hints(constraints: &PostConstraints) -> (Vec<String>, Vec<String>) {
    let mut terms = Vec::new();
    let mut labels = Vec::new();

    if constraints.is_kosher == Some(true) {
        terms.push("kosher".to_string());
        labels.push("isKosher:soft".to_string());
    }
    if constraints.is_gluten_free == Some(true) {
        terms.push("gluten free".to_string());
        labels.push("isGlutenFree:soft".to_string());
    }
    if constraints.price_level.is_some() {
        labels.push("priceLevel:soft".to_string());
    }
    for requirement in &constraints.requirements {
        terms.push(requirement.clone());
        labels.push(format!("{requirement}:soft"));
    }

    (terms, labels)
}
