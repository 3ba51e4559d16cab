//! Gate2: the first pipeline stage.
//!
//! Decides, before any provider call is made, whether the query is even a
//! restaurant search. A `Stop` verdict routes straight to the assistant's
//! `GATE_FAIL` narration; a `Clarify` verdict asks the user a question
//! before any provider call — no Places or Route-LLM call is ever made for
//! either outcome.

use std::time::Duration;

use serde::Deserialize;
use serde_json::json;

use crate::llm::{LlmClient, LlmError, LlmPurpose};

/// Below this confidence, Gate2 stops the pipeline even if the LLM's own
/// decision was `CONTINUE` — low-confidence matches are treated the same
/// as a clear no.
pub const GATE_CONFIDENCE_THRESHOLD: f64 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
enum GateLlmDecision {
    Continue,
    Stop,
    Clarify,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
enum GateLlmReason {
    Ok,
    NotRestaurantSearch,
    Ambiguous,
    PolicyBlocked,
}

#[derive(Debug, Clone, Deserialize)]
struct GateLlmOutput {
    decision: GateLlmDecision,
    confidence: f64,
    reason: GateLlmReason,
}

/// Three-way Gate2 verdict, carried forward into response assembly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateAction {
    Continue,
    Stop,
    Clarify,
}

/// Closed set of reason codes Gate2 can attach to a `Stop`/`Clarify`
/// verdict, surfaced to the assistant narration as structured facts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateReason {
    Ok,
    NotRestaurantSearch,
    Ambiguous,
    PolicyBlocked,
    LowConfidence,
}

impl GateReason {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ok => "ok",
            Self::NotRestaurantSearch => "not_restaurant_search",
            Self::Ambiguous => "ambiguous",
            Self::PolicyBlocked => "policy_blocked",
            Self::LowConfidence => "low_confidence",
        }
    }
}

impl From<GateLlmReason> for GateReason {
    fn from(reason: GateLlmReason) -> Self {
        match reason {
            GateLlmReason::Ok => Self::Ok,
            GateLlmReason::NotRestaurantSearch => Self::NotRestaurantSearch,
            GateLlmReason::Ambiguous => Self::Ambiguous,
            GateLlmReason::PolicyBlocked => Self::PolicyBlocked,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GateDecision {
    pub action: GateAction,
    pub confidence: f64,
    pub reason: GateReason,
}

fn schema() -> serde_json::Value {
    json!({
        "type": "object",
        "properties": {
            "decision": {"type": "string", "enum": ["CONTINUE", "STOP", "CLARIFY"]},
            "confidence": {"type": "number", "minimum": 0, "maximum": 1},
            "reason": {
                "type": "string",
                "enum": ["ok", "not_restaurant_search", "ambiguous", "policy_blocked"],
            },
        },
        "required": ["decision", "confidence", "reason"],
        "additionalProperties": false,
    })
}

fn prompt(query: &str) -> String {
    format!(
        "Decide whether the following user message is a request to search \
         for a restaurant, cafe, or similar place to eat. Respond with \
         CONTINUE if it clearly is, STOP if it clearly is not, or CLARIFY \
         if you cannot tell without asking the user a question. Include \
         your confidence from 0 to 1 and a reason code.\n\nMessage: {query}"
    )
}

/// Run Gate2 against `query`. A low-confidence `CONTINUE` from the LLM is
/// downgraded to `Stop` here rather than trusted as-is.
pub async fn run_gate2(
    llm: &dyn LlmClient,
    model: &str,
    timeout: Duration,
    query: &str,
) -> Result<GateDecision, LlmError> {
    let raw = llm.complete_json(LlmPurpose::Gate, model, &prompt(query), &schema(), timeout).await?;
    let output: GateLlmOutput =
        serde_json::from_value(raw).map_err(|e| LlmError::SchemaInvalid(e.to_string()))?;

    let action = match output.decision {
        GateLlmDecision::Clarify => GateAction::Clarify,
        GateLlmDecision::Stop => GateAction::Stop,
        GateLlmDecision::Continue if output.confidence >= GATE_CONFIDENCE_THRESHOLD => GateAction::Continue,
        GateLlmDecision::Continue => GateAction::Stop,
    };
    let reason = if action == GateAction::Stop && output.decision == GateLlmDecision::Continue {
        GateReason::LowConfidence
    } else {
        output.reason.into()
    };

    Ok(GateDecision { action, confidence: output.confidence, reason })
}
