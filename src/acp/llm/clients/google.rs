//! Google Generative Language API (`models/<model>:generateContent`) client.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::acp::llm::clients::common::get_shared_http_client;
use crate::acp::llm::{LlmClient, LlmRequestError, LlmResponse, ToolDefinition};
use crate::acp::resources::llm::GenerationParameters;
use crate::acp::resources::message::{FunctionCall, Message, Role, ToolCallRequest};

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

pub struct GoogleClient {
    api_key: String,
    model: String,
    base_url: String,
    temperature: Option<f32>,
    max_tokens: Option<u32>,
}

impl GoogleClient {
    pub fn new(api_key: impl Into<String>, parameters: &GenerationParameters) -> Self {
        Self {
            api_key: api_key.into(),
            model: parameters.model.clone(),
            base_url: parameters
                .base_url
                .clone()
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            temperature: parameters.temperature,
            max_tokens: parameters.max_tokens,
        }
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/models/{}:generateContent",
            self.base_url.trim_end_matches('/'),
            self.model
        )
    }
}

#[derive(Debug, Serialize)]
pub(super) struct GenerateContentRequest {
    pub contents: Vec<GeminiContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_instruction: Option<GeminiContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub generation_config: Option<GeminiGenerationConfig>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<GeminiToolDecl>,
}

#[derive(Debug, Serialize)]
pub(super) struct GeminiContent {
    pub role: String,
    pub parts: Vec<GeminiPart>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct GeminiPart {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub function_call: Option<GeminiFunctionCall>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub function_response: Option<GeminiFunctionResponse>,
}

#[derive(Debug, Serialize)]
pub(super) struct GeminiFunctionCall {
    pub name: String,
    pub args: serde_json::Value,
}

#[derive(Debug, Serialize)]
pub(super) struct GeminiFunctionResponse {
    pub name: String,
    pub response: serde_json::Value,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct GeminiGenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_output_tokens: Option<u32>,
}

#[derive(Debug, Serialize)]
pub(super) struct GeminiToolDecl {
    pub function_declarations: Vec<GeminiFunctionDecl>,
}

#[derive(Debug, Serialize)]
pub(super) struct GeminiFunctionDecl {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
}

#[derive(Debug, Deserialize)]
struct GeminiCandidate {
    content: GeminiResponseContent,
}

#[derive(Debug, Deserialize, Default)]
struct GeminiResponseContent {
    #[serde(default)]
    parts: Vec<GeminiResponsePart>,
}

#[derive(Debug, Deserialize)]
struct GeminiResponsePart {
    #[serde(default)]
    text: Option<String>,
    #[serde(default, rename = "functionCall")]
    function_call: Option<GeminiResponseFunctionCall>,
}

#[derive(Debug, Deserialize)]
struct GeminiResponseFunctionCall {
    name: String,
    args: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct GeminiErrorEnvelope {
    error: GeminiErrorBody,
}

#[derive(Debug, Deserialize)]
struct GeminiErrorBody {
    message: String,
}

pub(super) fn build_request(
    model_temperature: Option<f32>,
    model_max_tokens: Option<u32>,
    messages: &[Message],
    tools: &[ToolDefinition],
) -> GenerateContentRequest {
    let system_instruction = messages.iter().find(|m| m.role == Role::System).map(|m| GeminiContent {
        role: "user".to_string(),
        parts: vec![GeminiPart {
            text: Some(m.content.clone()),
            function_call: None,
            function_response: None,
        }],
    });

    let contents = messages
        .iter()
        .filter(|m| m.role != Role::System)
        .map(|m| match m.role {
            Role::Tool => GeminiContent {
                role: "function".to_string(),
                parts: vec![GeminiPart {
                    text: None,
                    function_call: None,
                    function_response: Some(GeminiFunctionResponse {
                        name: m.tool_call_id.clone().unwrap_or_default(),
                        response: serde_json::json!({ "content": m.content }),
                    }),
                }],
            },
            Role::Assistant if !m.tool_calls.is_empty() => GeminiContent {
                role: "model".to_string(),
                parts: m
                    .tool_calls
                    .iter()
                    .map(|tc| GeminiPart {
                        text: None,
                        function_call: Some(GeminiFunctionCall {
                            name: tc.function.name.clone(),
                            args: serde_json::from_str(&tc.function.arguments)
                                .unwrap_or(serde_json::Value::Null),
                        }),
                        function_response: None,
                    })
                    .collect(),
            },
            Role::Assistant => GeminiContent {
                role: "model".to_string(),
                parts: vec![GeminiPart {
                    text: Some(m.content.clone()),
                    function_call: None,
                    function_response: None,
                }],
            },
            _ => GeminiContent {
                role: "user".to_string(),
                parts: vec![GeminiPart {
                    text: Some(m.content.clone()),
                    function_call: None,
                    function_response: None,
                }],
            },
        })
        .collect();

    GenerateContentRequest {
        contents,
        system_instruction,
        generation_config: Some(GeminiGenerationConfig {
            temperature: model_temperature,
            max_output_tokens: model_max_tokens,
        }),
        tools: if tools.is_empty() {
            Vec::new()
        } else {
            vec![GeminiToolDecl {
                function_declarations: tools
                    .iter()
                    .map(|t| GeminiFunctionDecl {
                        name: t.name.clone(),
                        description: t.description.clone(),
                        parameters: t.parameters_schema.clone(),
                    })
                    .collect(),
            }]
        },
    }
}

pub(super) fn parse_response(status: reqwest::StatusCode, body: &str) -> Result<LlmResponse, LlmRequestError> {
    if !status.is_success() {
        let message = serde_json::from_str::<GeminiErrorEnvelope>(body)
            .map(|e| e.error.message)
            .unwrap_or_else(|_| body.to_string());
        return Err(LlmRequestError {
            status_code: Some(status.as_u16()),
            message,
        });
    }

    let parsed: GenerateContentResponse = serde_json::from_str(body).map_err(|e| LlmRequestError {
        status_code: Some(status.as_u16()),
        message: format!("failed decoding response: {e}"),
    })?;

    let candidate = parsed.candidates.into_iter().next().ok_or_else(|| LlmRequestError {
        status_code: Some(status.as_u16()),
        message: "response contained no candidates".to_string(),
    })?;

    let mut content = String::new();
    let mut tool_calls = Vec::new();
    for (i, part) in candidate.content.parts.into_iter().enumerate() {
        if let Some(text) = part.text {
            content.push_str(&text);
        }
        if let Some(call) = part.function_call {
            tool_calls.push(ToolCallRequest {
                id: format!("call_{i}"),
                call_type: "function".to_string(),
                function: FunctionCall {
                    name: call.name,
                    arguments: call.args.to_string(),
                },
            });
        }
    }

    Ok(LlmResponse { content, tool_calls })
}

#[async_trait]
impl LlmClient for GoogleClient {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn send_request(
        &self,
        messages: &[Message],
        tools: &[ToolDefinition],
    ) -> Result<LlmResponse, LlmRequestError> {
        let request = build_request(self.temperature, self.max_tokens, messages, tools);
        let response = get_shared_http_client()
            .post(self.endpoint())
            .query(&[("key", self.api_key.as_str())])
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

        parse_response(status, &body)
    }
}
