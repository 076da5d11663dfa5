//! Anthropic Messages API (`/v1/messages`) client.
//!
//! The wire format diverges from the OpenAI family enough (system prompt as
//! a top-level field, content blocks instead of a flat string, tool results
//! addressed by block type rather than role) that it isn't built on
//! [`super::common::send_chat_completion`]; it shares only the pooled HTTP
//! client.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::acp::llm::clients::common::get_shared_http_client;
use crate::acp::llm::{LlmClient, LlmRequestError, LlmResponse, ToolDefinition};
use crate::acp::resources::llm::GenerationParameters;
use crate::acp::resources::message::{FunctionCall, Message, Role, ToolCallRequest};

const DEFAULT_BASE_URL: &str = "https://api.anthropic.com/v1";
const ANTHROPIC_VERSION: &str = "2023-06-01";
const DEFAULT_MAX_TOKENS: u32 = 4096;

pub struct AnthropicClient {
    api_key: String,
    model: String,
    base_url: String,
    temperature: Option<f32>,
    max_tokens: u32,
}

impl AnthropicClient {
    pub fn new(api_key: impl Into<String>, parameters: &GenerationParameters) -> Self {
        Self {
            api_key: api_key.into(),
            model: parameters.model.clone(),
            base_url: parameters
                .base_url
                .clone()
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            temperature: parameters.temperature,
            max_tokens: parameters.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
        }
    }
}

#[derive(Debug, Serialize)]
struct AnthropicRequest {
    model: String,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    messages: Vec<AnthropicMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<AnthropicTool>,
}

#[derive(Debug, Serialize)]
struct AnthropicMessage {
    role: String,
    content: Vec<AnthropicContentBlock>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum AnthropicContentBlock {
    Text {
        text: String,
    },
    ToolUse {
        id: String,
        name: String,
        input: serde_json::Value,
    },
    ToolResult {
        tool_use_id: String,
        content: String,
    },
}

#[derive(Debug, Serialize)]
struct AnthropicTool {
    name: String,
    description: String,
    input_schema: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    #[serde(default)]
    content: Vec<AnthropicResponseBlock>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum AnthropicResponseBlock {
    Text { text: String },
    ToolUse { id: String, name: String, input: serde_json::Value },
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Deserialize)]
struct AnthropicErrorEnvelope {
    error: AnthropicErrorBody,
}

#[derive(Debug, Deserialize)]
struct AnthropicErrorBody {
    message: String,
}

fn build_request(
    model: &str,
    max_tokens: u32,
    temperature: Option<f32>,
    messages: &[Message],
    tools: &[ToolDefinition],
) -> AnthropicRequest {
    let system = messages
        .iter()
        .find(|m| m.role == Role::System)
        .map(|m| m.content.clone());

    let turns = messages
        .iter()
        .filter(|m| m.role != Role::System)
        .map(|m| match m.role {
            Role::Tool => AnthropicMessage {
                role: "user".to_string(),
                content: vec![AnthropicContentBlock::ToolResult {
                    tool_use_id: m.tool_call_id.clone().unwrap_or_default(),
                    content: m.content.clone(),
                }],
            },
            Role::Assistant if !m.tool_calls.is_empty() => AnthropicMessage {
                role: "assistant".to_string(),
                content: m
                    .tool_calls
                    .iter()
                    .map(|tc| {
                        let input = serde_json::from_str(&tc.function.arguments)
                            .unwrap_or(serde_json::Value::Null);
                        AnthropicContentBlock::ToolUse {
                            id: tc.id.clone(),
                            name: tc.function.name.clone(),
                            input,
                        }
                    })
                    .collect(),
            },
            _ => AnthropicMessage {
                role: m.role.as_str().to_string(),
                content: vec![AnthropicContentBlock::Text {
                    text: m.content.clone(),
                }],
            },
        })
        .collect();

    AnthropicRequest {
        model: model.to_string(),
        max_tokens,
        system,
        messages: turns,
        temperature,
        tools: tools
            .iter()
            .map(|t| AnthropicTool {
                name: t.name.clone(),
                description: t.description.clone(),
                input_schema: t.parameters_schema.clone(),
            })
            .collect(),
    }
}

#[async_trait]
impl LlmClient for AnthropicClient {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn send_request(
        &self,
        messages: &[Message],
        tools: &[ToolDefinition],
    ) -> Result<LlmResponse, LlmRequestError> {
        let request = build_request(&self.model, self.max_tokens, self.temperature, messages, tools);
        let url = format!("{}/messages", self.base_url.trim_end_matches('/'));

        let response = get_shared_http_client()
            .post(&url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&request)
            .send()
            .await
            .map_err(|e| LlmRequestError {
                status_code: e.status().map(|s| s.as_u16()),
                message: e.to_string(),
            })?;

        let status = response.status();
        let body = response.text().await.map_err(|e| LlmRequestError {
            status_code: None,
            message: format!("failed reading response body: {e}"),
        })?;

        if !status.is_success() {
            let message = serde_json::from_str::<AnthropicErrorEnvelope>(&body)
                .map(|e| e.error.message)
                .unwrap_or(body);
            return Err(LlmRequestError {
                status_code: Some(status.as_u16()),
                message,
            });
        }

        let parsed: AnthropicResponse = serde_json::from_str(&body).map_err(|e| LlmRequestError {
            status_code: Some(status.as_u16()),
            message: format!("failed decoding response: {e}"),
        })?;

        let mut content = String::new();
        let mut tool_calls = Vec::new();
        for block in parsed.content {
            match block {
                AnthropicResponseBlock::Text { text } => content.push_str(&text),
                AnthropicResponseBlock::ToolUse { id, name, input } => {
                    tool_calls.push(ToolCallRequest {
                        id,
                        call_type: "function".to_string(),
                        function: FunctionCall {
                            name,
                            arguments: input.to_string(),
                        },
                    });
                }
                AnthropicResponseBlock::Unknown => {}
            }
        }

        Ok(LlmResponse { content, tool_calls })
    }
}
