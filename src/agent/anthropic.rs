//! Hosted-model client for the Anthropic Messages API.
//!
//! One request per completion, no streaming, no retries. The agent loop in
//! the parent module drives multi-turn tool use by re-submitting the
//! accumulated message history.

use crate::error::{ApiError, ApiResult};
use crate::tools::ToolSpec;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
const API_VERSION: &str = "2023-06-01";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);
const MAX_TOKENS: u32 = 1024;

/// Message role in a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// A content block inside a message, mirroring the wire format.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text {
        text: String,
    },
    ToolUse {
        id: String,
        name: String,
        input: Value,
    },
    ToolResult {
        tool_use_id: String,
        content: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        is_error: Option<bool>,
    },
}

/// A single conversation message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: Vec<ContentBlock>,
}

impl ChatMessage {
    pub fn user_text(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: vec![ContentBlock::Text { text: text.into() }],
        }
    }

    pub fn assistant(content: Vec<ContentBlock>) -> Self {
        Self {
            role: Role::Assistant,
            content,
        }
    }

    pub fn tool_results(results: Vec<ContentBlock>) -> Self {
        Self {
            role: Role::User,
            content: results,
        }
    }

    /// Concatenated text of all text blocks.
    pub fn text(&self) -> String {
        self.content
            .iter()
            .filter_map(|block| match block {
                ContentBlock::Text { text } => Some(text.as_str()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Why the model stopped generating.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    EndTurn,
    ToolUse,
    MaxTokens,
    StopSequence,
    #[serde(other)]
    Other,
}

/// One completion request to the hosted model.
#[derive(Debug, Clone)]
pub struct ModelRequest {
    pub system: String,
    pub messages: Vec<ChatMessage>,
    pub tools: Vec<ToolSpec>,
}

/// The model's reply.
#[derive(Debug, Clone)]
pub struct ModelResponse {
    pub content: Vec<ContentBlock>,
    pub stop_reason: StopReason,
}

impl ModelResponse {
    /// Tool-use blocks requested by the model, in order.
    pub fn tool_uses(&self) -> Vec<(&str, &str, &Value)> {
        self.content
            .iter()
            .filter_map(|block| match block {
                ContentBlock::ToolUse { id, name, input } => {
                    Some((id.as_str(), name.as_str(), input))
                }
                _ => None,
            })
            .collect()
    }

    /// Concatenated text of all text blocks.
    pub fn text(&self) -> String {
        self.content
            .iter()
            .filter_map(|block| match block {
                ContentBlock::Text { text } => Some(text.as_str()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Interface to the hosted model. The agent loop depends only on this trait,
/// which keeps the loop testable with a scripted client.
#[async_trait]
pub trait ModelClient: Send + Sync {
    async fn complete(&self, request: ModelRequest) -> ApiResult<ModelResponse>;
}

#[derive(Debug, Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    system: &'a str,
    messages: &'a [ChatMessage],
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<&'a ToolSpec>,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    content: Vec<ContentBlock>,
    stop_reason: Option<StopReason>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    #[serde(rename = "type")]
    kind: String,
    message: String,
}

/// Client for the Anthropic Messages API.
pub struct AnthropicClient {
    http: reqwest::Client,
    api_key: Option<String>,
    model: String,
    base_url: String,
}

impl AnthropicClient {
    pub fn new(api_key: Option<String>, model: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::builder()
                .timeout(REQUEST_TIMEOUT)
                .build()
                .unwrap_or_default(),
            api_key,
            model: model.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }

    /// Override the API endpoint (proxies, local test servers).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

#[async_trait]
impl ModelClient for AnthropicClient {
    async fn complete(&self, request: ModelRequest) -> ApiResult<ModelResponse> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| ApiError::model("model API key is not configured"))?;

        let body = MessagesRequest {
            model: &self.model,
            max_tokens: MAX_TOKENS,
            system: &request.system,
            messages: &request.messages,
            tools: request.tools.iter().collect(),
        };

        let response = self
            .http
            .post(format!("{}/v1/messages", self.base_url))
            .header("x-api-key", api_key)
            .header("anthropic-version", API_VERSION)
            .json(&body)
            .send()
            .await
            .map_err(ApiError::model)?;

        let status = response.status();
        if !status.is_success() {
            let detail = response
                .json::<ApiErrorBody>()
                .await
                .map(|b| format!("{}: {}", b.error.kind, b.error.message))
                .unwrap_or_else(|_| format!("HTTP {}", status));
            return Err(ApiError::model(format!("model request failed: {}", detail)));
        }

        let parsed: MessagesResponse = response.json().await.map_err(ApiError::model)?;

        Ok(ModelResponse {
            content: parsed.content,
            stop_reason: parsed.stop_reason.unwrap_or(StopReason::EndTurn),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn content_blocks_round_trip_wire_format() {
        let block: ContentBlock = serde_json::from_value(json!({
            "type": "tool_use",
            "id": "toolu_1",
            "name": "create_task",
            "input": { "title": "Buy milk" }
        }))
        .unwrap();

        match &block {
            ContentBlock::ToolUse { id, name, input } => {
                assert_eq!(id, "toolu_1");
                assert_eq!(name, "create_task");
                assert_eq!(input["title"], "Buy milk");
            }
            other => panic!("unexpected block: {:?}", other),
        }

        let value = serde_json::to_value(&block).unwrap();
        assert_eq!(value["type"], "tool_use");
    }

    #[test]
    fn stop_reason_tolerates_unknown_values() {
        let reason: StopReason = serde_json::from_value(json!("tool_use")).unwrap();
        assert_eq!(reason, StopReason::ToolUse);

        let reason: StopReason = serde_json::from_value(json!("pause_turn")).unwrap();
        assert_eq!(reason, StopReason::Other);
    }

    #[test]
    fn response_text_joins_blocks() {
        let response = ModelResponse {
            content: vec![
                ContentBlock::Text {
                    text: "Done.".to_string(),
                },
                ContentBlock::Text {
                    text: "Anything else?".to_string(),
                },
            ],
            stop_reason: StopReason::EndTurn,
        };
        assert_eq!(response.text(), "Done.\nAnything else?");
    }

    /// Serve one canned Messages API response on an ephemeral port.
    async fn spawn_stub(
        status: axum::http::StatusCode,
        body: serde_json::Value,
    ) -> std::net::SocketAddr {
        use axum::{Json, Router, routing::post};

        let app = Router::new().route(
            "/v1/messages",
            post(move |Json(request): Json<serde_json::Value>| {
                let body = body.clone();
                async move {
                    assert_eq!(request["model"], "test-model");
                    assert!(request["messages"].is_array());
                    (status, Json(body))
                }
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind stub");
        let addr = listener.local_addr().expect("stub addr");
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });
        addr
    }

    #[tokio::test]
    async fn complete_round_trips_against_a_local_endpoint() {
        let addr = spawn_stub(
            axum::http::StatusCode::OK,
            json!({
                "content": [
                    {"type": "text", "text": "Created the task."},
                    {"type": "tool_use", "id": "toolu_1", "name": "create_task",
                     "input": {"title": "Buy milk"}}
                ],
                "stop_reason": "tool_use"
            }),
        )
        .await;

        let client = AnthropicClient::new(Some("test-key".to_string()), "test-model")
            .with_base_url(format!("http://{}", addr));
        let response = client
            .complete(ModelRequest {
                system: "be brief".to_string(),
                messages: vec![ChatMessage::user_text("add buy milk")],
                tools: vec![],
            })
            .await
            .unwrap();

        assert_eq!(response.stop_reason, StopReason::ToolUse);
        assert_eq!(response.text(), "Created the task.");
        let uses = response.tool_uses();
        assert_eq!(uses.len(), 1);
        assert_eq!(uses[0].1, "create_task");
    }

    #[tokio::test]
    async fn upstream_failure_surfaces_as_model_error() {
        let addr = spawn_stub(
            axum::http::StatusCode::BAD_REQUEST,
            json!({
                "error": {"type": "invalid_request_error", "message": "max_tokens required"}
            }),
        )
        .await;

        let client = AnthropicClient::new(Some("test-key".to_string()), "test-model")
            .with_base_url(format!("http://{}", addr));
        let err = client
            .complete(ModelRequest {
                system: String::new(),
                messages: vec![ChatMessage::user_text("hi")],
                tools: vec![],
            })
            .await
            .unwrap_err();

        assert_eq!(err.code, crate::error::ErrorCode::ModelError);
        assert!(err.message.contains("invalid_request_error"));
    }

    #[tokio::test]
    async fn missing_api_key_is_a_model_error() {
        let client = AnthropicClient::new(None, "claude-3-5-haiku-latest");
        let err = client
            .complete(ModelRequest {
                system: String::new(),
                messages: vec![ChatMessage::user_text("hi")],
                tools: vec![],
            })
            .await
            .unwrap_err();
        assert_eq!(err.code, crate::error::ErrorCode::ModelError);
    }
}
