//! Shared HTTP plumbing for the OpenAI-compatible family of providers
//! (OpenAI, Mistral) plus small serde helpers reused by the others.

use lazy_static::lazy_static;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::acp::llm::{LlmRequestError, LlmResponse, ToolDefinition};
use crate::acp::resources::message::{FunctionCall, Message, ToolCallRequest};

lazy_static! {
    /// Shared client so TLS sessions and connection pools stay warm across
    /// every LLM call issued by this process, not just per-client.
    static ref SHARED_HTTP_CLIENT: reqwest::Client = reqwest::ClientBuilder::new()
        .pool_idle_timeout(Some(Duration::from_secs(90)))
        .pool_max_idle_per_host(10)
        .tcp_keepalive(Some(Duration::from_secs(60)))
        .timeout(Duration::from_secs(120))
        .connect_timeout(Duration::from_secs(30))
        .build()
        .expect("failed to build shared HTTP client");
}

pub fn get_shared_http_client() -> &'static reqwest::Client {
    &SHARED_HTTP_CLIENT
}

#[derive(Debug, Serialize)]
pub struct ChatCompletionRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<ChatTool>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

#[derive(Debug, Serialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ChatToolCall>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ChatToolCall {
    pub id: String,
    #[serde(rename = "type")]
    pub call_type: String,
    pub function: ChatFunctionCall,
}

#[derive(Debug, Serialize)]
pub struct ChatFunctionCall {
    pub name: String,
    pub arguments: String,
}

#[derive(Debug, Serialize)]
pub struct ChatTool {
    #[serde(rename = "type")]
    pub tool_type: String,
    pub function: ChatToolFunction,
}

#[derive(Debug, Serialize)]
pub struct ChatToolFunction {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

#[derive(Debug, Deserialize)]
pub struct ChatCompletionResponse {
    pub choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
pub struct ChatChoice {
    pub message: ChatResponseMessage,
}

#[derive(Debug, Deserialize, Default)]
pub struct ChatResponseMessage {
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub tool_calls: Vec<ResponseToolCall>,
}

#[derive(Debug, Deserialize)]
pub struct ResponseToolCall {
    pub id: String,
    pub function: ResponseFunctionCall,
}

#[derive(Debug, Deserialize)]
pub struct ResponseFunctionCall {
    pub name: String,
    pub arguments: String,
}

#[derive(Debug, Deserialize)]
pub struct ErrorEnvelope {
    pub error: ErrorBody,
}

#[derive(Debug, Deserialize)]
pub struct ErrorBody {
    pub message: String,
}

pub fn to_chat_messages(messages: &[Message]) -> Vec<ChatMessage> {
    messages
        .iter()
        .map(|m| ChatMessage {
            role: m.role.as_str().to_string(),
            content: m.content.clone(),
            tool_calls: m
                .tool_calls
                .iter()
                .map(|tc| ChatToolCall {
                    id: tc.id.clone(),
                    call_type: tc.call_type.clone(),
                    function: ChatFunctionCall {
                        name: tc.function.name.clone(),
                        arguments: tc.function.arguments.clone(),
                    },
                })
                .collect(),
            tool_call_id: m.tool_call_id.clone(),
        })
        .collect()
}

pub fn to_chat_tools(tools: &[ToolDefinition]) -> Option<Vec<ChatTool>> {
    if tools.is_empty() {
        return None;
    }
    Some(
        tools
            .iter()
            .map(|t| ChatTool {
                tool_type: "function".to_string(),
                function: ChatToolFunction {
                    name: t.name.clone(),
                    description: t.description.clone(),
                    parameters: t.parameters_schema.clone(),
                },
            })
            .collect(),
    )
}

/// POST an OpenAI-compatible `/chat/completions` body and translate the
/// result into our provider-agnostic [`LlmResponse`]. Shared by every
/// provider whose wire format is a drop-in for OpenAI's (OpenAI itself,
/// Mistral).
pub async fn send_chat_completion(
    url: &str,
    bearer_token: &str,
    request: &ChatCompletionRequest,
) -> Result<LlmResponse, LlmRequestError> {
    let response = get_shared_http_client()
        .post(url)
        .bearer_auth(bearer_token)
        .json(request)
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
        let message = serde_json::from_str::<ErrorEnvelope>(&body)
            .map(|e| e.error.message)
            .unwrap_or(body);
        return Err(LlmRequestError {
            status_code: Some(status.as_u16()),
            message,
        });
    }

    let parsed: ChatCompletionResponse = serde_json::from_str(&body).map_err(|e| LlmRequestError {
        status_code: Some(status.as_u16()),
        message: format!("failed decoding response: {e}"),
    })?;

    let choice = parsed.choices.into_iter().next().ok_or_else(|| LlmRequestError {
        status_code: Some(status.as_u16()),
        message: "response contained no choices".to_string(),
    })?;

    let tool_calls = choice
        .message
        .tool_calls
        .into_iter()
        .map(|tc| ToolCallRequest {
            id: tc.id,
            call_type: "function".to_string(),
            function: FunctionCall {
                name: tc.function.name,
                arguments: tc.function.arguments,
            },
        })
        .collect();

    Ok(LlmResponse {
        content: choice.message.content.unwrap_or_default(),
        tool_calls,
    })
}
