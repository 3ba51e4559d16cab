//! LLM provider seam.
//!
//! Every pipeline stage that calls out to a language model does so through
//! [`LlmClient`], never through a concrete provider type — the concrete
//! provider is an external collaborator out of scope here, so this is a
//! trait object seam rather than an enum closed over a fixed provider set.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

/// Which pipeline stage is calling the LLM — drives per-purpose model and
/// timeout resolution in config.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LlmPurpose {
    Gate,
    Intent,
    BaseFilters,
    PostConstraints,
    RouteMapper,
    Assistant,
}

impl LlmPurpose {
    pub fn config_prefix(self) -> &'static str {
        match self {
            Self::Gate => "GATE",
            Self::Intent => "INTENT",
            Self::BaseFilters => "BASE_FILTERS",
            Self::PostConstraints => "POST_CONSTRAINTS",
            Self::RouteMapper => "ROUTE_MAPPER",
            Self::Assistant => "ASSISTANT",
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("llm call timed out after {0:?}")]
    Timeout(Duration),
    #[error("llm response failed schema validation: {0}")]
    SchemaInvalid(String),
    #[error("llm call failed: {0}")]
    Failed(#[from] anyhow::Error),
}

/// A single structured LLM call: send a prompt, get back JSON validated
/// against `schema`. There is no streaming and no chat history — every
/// pipeline stage issues one self-contained request.
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete_json(
        &self,
        purpose: LlmPurpose,
        model: &str,
        prompt: &str,
        schema: &Value,
        timeout: Duration,
    ) -> Result<Value, LlmError>;
}

/// Default [`LlmClient`] speaking an OpenAI-compatible chat-completions
/// endpoint with JSON-schema-constrained output: default headers baked in
/// once at construction, a single timeout-bearing client reused across
/// calls.
pub struct HttpLlmClient {
    client: reqwest::Client,
    base_url: String,
}

impl HttpLlmClient {
    pub fn new(base_url: String, api_key: &str) -> anyhow::Result<Self> {
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            reqwest::header::AUTHORIZATION,
            reqwest::header::HeaderValue::from_str(&format!("Bearer {api_key}"))?,
        );
        let client = reqwest::Client::builder().default_headers(headers).build()?;
        Ok(Self { client, base_url: base_url.trim_end_matches('/').to_string() })
    }
}

#[async_trait]
impl LlmClient for HttpLlmClient {
    async fn complete_json(
        &self,
        purpose: LlmPurpose,
        model: &str,
        prompt: &str,
        schema: &Value,
        timeout: Duration,
    ) -> Result<Value, LlmError> {
        let url = format!("{}/v1/chat/completions", self.base_url);
        let body = serde_json::json!({
            "model": model,
            "messages": [{"role": "user", "content": prompt}],
            "response_format": {
                "type": "json_schema",
                "json_schema": {"name": purpose.config_prefix(), "schema": schema, "strict": true},
            },
        });

        let call = self.client.post(&url).json(&body).send();
        let response = tokio::time::timeout(timeout, call)
            .await
            .map_err(|_| LlmError::Timeout(timeout))?
            .map_err(anyhow::Error::from)?;

        let status = response.status();
        let text = response.text().await.map_err(anyhow::Error::from)?;
        if !status.is_success() {
            return Err(LlmError::Failed(anyhow::anyhow!("llm backend returned HTTP {status}: {text}")));
        }

        let envelope: Value = serde_json::from_str(&text).map_err(anyhow::Error::from)?;
        let content = envelope
            .pointer("/choices/0/message/content")
            .and_then(Value::as_str)
            .ok_or_else(|| LlmError::SchemaInvalid("missing choices[0].message.content".into()))?;

        serde_json::from_str(content).map_err(|e| LlmError::SchemaInvalid(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn purpose_config_prefix_matches_expected_names() {
        assert_eq!(LlmPurpose::BaseFilters.config_prefix(), "BASE_FILTERS");
        assert_eq!(LlmPurpose::RouteMapper.config_prefix(), "ROUTE_MAPPER");
    }

    #[tokio::test]
    async fn complete_json_parses_nested_json_content() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "choices": [{"message": {"content": "{\"intent\":\"search\"}"}}]
            })))
            .mount(&server)
            .await;

        let client = HttpLlmClient::new(server.uri(), "test-key").unwrap();
        let result = client
            .complete_json(
                LlmPurpose::Intent,
                "gpt-test",
                "classify this",
                &serde_json::json!({"type": "object"}),
                Duration::from_secs(5),
            )
            .await
            .unwrap();
        assert_eq!(result["intent"], "search");
    }

    #[tokio::test]
    async fn complete_json_surfaces_schema_invalid_on_malformed_content() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "choices": [{"message": {"content": "not json"}}]
            })))
            .mount(&server)
            .await;

        let client = HttpLlmClient::new(server.uri(), "test-key").unwrap();
        let err = client
            .complete_json(
                LlmPurpose::Gate,
                "gpt-test",
                "prompt",
                &serde_json::json!({}),
                Duration::from_secs(5),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, LlmError::SchemaInvalid(_)));
    }

    #[tokio::test]
    async fn complete_json_surfaces_non_2xx_as_failed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let client = HttpLlmClient::new(server.uri(), "test-key").unwrap();
        let err = client
            .complete_json(
                LlmPurpose::Gate,
                "gpt-test",
                "prompt",
                &serde_json::json!({}),
                Duration::from_secs(5),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, LlmError::Failed(_)));
    }
}
