//! Glues the pipeline orchestrator, the WS fan-out layer, and the
//! narrating assistant into one per-job execution.
//!
//! `ready` on the `search` channel is always published before the
//! assistant narration is even requested — the narration runs on its own
//! detached task so a slow or failing assistant call can never delay or
//! block delivery of `ready`.

use std::sync::Arc;

use serde_json::json;
use tracing::warn;

use crate::assistant::{AssistantContextKind, AssistantMessage, AssistantService};
use crate::jobs::runner::PipelineOutcome;
use crate::llm::LlmError;
use crate::pipeline::{Route2Context, Route2Orchestrator, StageObserver};
use crate::ws::WebSocketManager;

/// Publishes each pipeline stage's progress onto the `search` WS channel.
struct WsStageObserver {
    ws: Arc<WebSocketManager>,
    request_id: String,
}

impl StageObserver for WsStageObserver {
    fn emit(&self, stage: &str, payload: serde_json::Value) {
        let mut envelope = json!({"type": "progress", "stage": stage});
        if let (Some(envelope_obj), serde_json::Value::Object(payload_obj)) =
            (envelope.as_object_mut(), payload)
        {
            for (k, v) in payload_obj {
                envelope_obj.insert(k, v);
            }
        }
        self.ws.publish("search", &self.request_id, envelope);
    }
}

fn result_url(request_id: &str) -> String {
    format!("/api/v1/search/{request_id}/result")
}

fn assistant_error_code(err: &crate::assistant::service::AssistantError) -> &'static str {
    match err {
        crate::assistant::service::AssistantError::Llm(LlmError::Timeout(_)) => "LLM_TIMEOUT",
        crate::assistant::service::AssistantError::Llm(LlmError::SchemaInvalid(_)) => "SCHEMA_INVALID",
        crate::assistant::service::AssistantError::Llm(LlmError::Failed(_)) => "LLM_FAILED",
        crate::assistant::service::AssistantError::EmptyMessage => "LLM_FAILED",
    }
}

fn assistant_label(kind: AssistantContextKind) -> &'static str {
    match kind {
        AssistantContextKind::GateFail => "GATE_FAIL",
        AssistantContextKind::Clarify => "CLARIFY",
        AssistantContextKind::Summary => "SUMMARY",
        AssistantContextKind::SearchFailed => "SEARCH_FAILED",
    }
}

fn publish_assistant_message(ws: &WebSocketManager, request_id: &str, message: AssistantMessage) {
    // CLARIFY always blocks search, regardless of what the LLM actually said.
    let blocks_search = matches!(message.kind, AssistantContextKind::Clarify | AssistantContextKind::GateFail);
    let question = matches!(message.kind, AssistantContextKind::Clarify).then(|| message.text.clone());
    ws.publish(
        "assistant",
        request_id,
        json!({
            "type": "assistant",
            "payload": {
                "type": assistant_label(message.kind),
                "message": message.text,
                "question": question,
                "blocksSearch": blocks_search,
            }
        }),
    );
}

fn spawn_assistant_narration(
    ws: Arc<WebSocketManager>,
    assistant: Arc<AssistantService>,
    request_id: String,
    kind: AssistantContextKind,
    facts: serde_json::Value,
) {
    tokio::spawn(async move {
        match assistant.narrate(kind, facts).await {
            Ok(message) => publish_assistant_message(&ws, &request_id, message),
            Err(err) => {
                warn!(request_id = %request_id, error = %err, "assistant narration failed");
                ws.publish(
                    "assistant",
                    &request_id,
                    json!({"type": "assistant_error", "payload": {"errorCode": assistant_error_code(&err)}}),
                );
            }
        }
    });
}

/// Run the pipeline for one job, publishing progress/ready/error over WS
/// and firing the appropriate assistant narration. Returns the same
/// [`PipelineOutcome`] [`crate::jobs::runner::AsyncRunner`] expects so this
/// can be handed directly to `AsyncRunner::spawn`, or awaited inline for a
/// synchronous request.
pub async fn run_search_job(
    orchestrator: Arc<Route2Orchestrator>,
    context: Route2Context,
    request_id: String,
    ws: Arc<WebSocketManager>,
    assistant: Arc<AssistantService>,
) -> PipelineOutcome {
    let observer = WsStageObserver { ws: Arc::clone(&ws), request_id: request_id.clone() };
    let outcome = orchestrator.run(context, &observer).await;

    match &outcome {
        Ok(response) => {
            ws.publish(
                "search",
                &request_id,
                json!({
                    "type": "ready",
                    "stage": "done",
                    "resultUrl": result_url(&request_id),
                    "resultCount": response.results.len(),
                }),
            );

            let narration_kind = match response.meta.source.as_str() {
                "route2_gate_stop" | "route2_intent_stop" => Some(AssistantContextKind::GateFail),
                "route2_gate_clarify" | "route2_clarify" | "route2_nearme_no_location" => Some(AssistantContextKind::Clarify),
                "route2_no_results" => Some(AssistantContextKind::SearchFailed),
                _ if !response.results.is_empty() => Some(AssistantContextKind::Summary),
                _ => None,
            };

            if let Some(kind) = narration_kind {
                let facts = json!({
                    "resultCount": response.results.len(),
                    "source": response.meta.source,
                });
                spawn_assistant_narration(Arc::clone(&ws), assistant, request_id.clone(), kind, facts);
            }
        }
        Err((kind, message)) => {
            ws.publish(
                "search",
                &request_id,
                json!({"type": "error", "stage": "pipeline", "code": kind.to_string(), "message": message}),
            );
            let facts = json!({"errorCode": kind.to_string()});
            spawn_assistant_narration(ws, assistant, request_id.clone(), AssistantContextKind::SearchFailed, facts);
        }
    }

    outcome
}
