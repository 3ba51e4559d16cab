//! The narrating assistant.
//!
//! Every user-facing message the assistant produces is schema-validated LLM
//! output. There is deliberately no deterministic fallback string — if the
//! LLM call fails or returns something that doesn't validate, the caller
//! gets an error and the UI shows nothing rather than a canned sentence
//! pretending to be generated.
//!
//! Pure, independently-testable request/response translation functions
//! around one stateful call: `build_assistant_prompt` / `parse_assistant_response`.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;

use crate::assistant::context::{AssistantContextKind, AssistantMessage};
use crate::llm::{LlmClient, LlmError, LlmPurpose};

#[derive(Debug, thiserror::Error)]
pub enum AssistantError {
    #[error("assistant llm call failed: {0}")]
    Llm(#[from] LlmError),
    #[error("assistant produced an empty message")]
    EmptyMessage,
}

fn response_schema() -> serde_json::Value {
    json!({
        "type": "object",
        "properties": {"message": {"type": "string", "minLength": 1}},
        "required": ["message"],
        "additionalProperties": false,
    })
}

/// Build the prompt text for a given context kind and its supporting facts.
/// Pure and unit-testable in isolation from the LLM call itself.
pub fn build_assistant_prompt(kind: AssistantContextKind, facts: &serde_json::Value) -> String {
    let instruction = match kind {
        AssistantContextKind::GateFail => {
            "The user's message wasn't a restaurant search. Write one short, \
             friendly sentence steering them back on topic."
        }
        AssistantContextKind::Clarify => {
            "The search query is too ambiguous to run. Write one short \
             question asking the user what they mean."
        }
        AssistantContextKind::Summary => {
            "Summarize the search results below in one or two short, \
             conversational sentences."
        }
        AssistantContextKind::SearchFailed => {
            "The search ran but found nothing usable. Write one short, \
             empathetic sentence explaining that and suggesting a broader \
             search."
        }
    };
    format!("{instruction}\n\nContext:\n{facts}")
}

/// Parse and validate the LLM's raw JSON output into a message string.
pub fn parse_assistant_response(raw: &serde_json::Value) -> Result<String, AssistantError> {
    let message = raw.get("message").and_then(serde_json::Value::as_str).unwrap_or("");
    if message.trim().is_empty() {
        return Err(AssistantError::EmptyMessage);
    }
    Ok(message.to_string())
}

pub struct AssistantService {
    llm: Arc<dyn LlmClient>,
    model: String,
    timeout: Duration,
}

impl AssistantService {
    pub fn new(llm: Arc<dyn LlmClient>, model: String, timeout: Duration) -> Self {
        Self { llm, model, timeout }
    }

    pub async fn narrate(
        &self,
        kind: AssistantContextKind,
        facts: serde_json::Value,
    ) -> Result<AssistantMessage, AssistantError> {
        let prompt = build_assistant_prompt(kind, &facts);
        let raw = self
            .llm
            .complete_json(LlmPurpose::Assistant, &self.model, &prompt, &response_schema(), self.timeout)
            .await?;
        let text = parse_assistant_response(&raw)?;
        Ok(AssistantMessage { kind, text, created_at: chrono::Utc::now() })
    }
}
