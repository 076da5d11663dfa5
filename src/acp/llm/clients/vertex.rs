//! Vertex AI Gemini client.
//!
//! Same request/response JSON shape as the public Generative Language API
//! (§6 doesn't distinguish them beyond "provider enum {..., vertex}"), but
//! addressed by a fully-qualified Vertex endpoint and authenticated with a
//! bearer token (an OAuth2 access token, typically short-lived) instead of
//! an `?key=` query parameter.

use async_trait::async_trait;

use super::google::{build_request, parse_response};
use crate::acp::llm::{LlmClient, LlmRequestError, LlmResponse, ToolDefinition};
use crate::acp::resources::llm::GenerationParameters;
use crate::acp::resources::message::Message;

use crate::acp::llm::clients::common::get_shared_http_client;

pub struct VertexClient {
    access_token: String,
    model: String,
    /// Full `https://{location}-aiplatform.googleapis.com/v1/projects/{project}/locations/{location}/publishers/google/models`
    /// prefix; the model name and `:generateContent` suffix are appended.
    endpoint_base: String,
    temperature: Option<f32>,
    max_tokens: Option<u32>,
}

impl VertexClient {
    pub fn new(access_token: impl Into<String>, parameters: &GenerationParameters) -> Self {
        Self {
            access_token: access_token.into(),
            model: parameters.model.clone(),
            endpoint_base: parameters.base_url.clone().unwrap_or_default(),
            temperature: parameters.temperature,
            max_tokens: parameters.max_tokens,
        }
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/{}:generateContent",
            self.endpoint_base.trim_end_matches('/'),
            self.model
        )
    }
}

#[async_trait]
impl LlmClient for VertexClient {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn send_request(
        &self,
        messages: &[Message],
        tools: &[ToolDefinition],
    ) -> Result<LlmResponse, LlmRequestError> {
        if self.endpoint_base.is_empty() {
            return Err(LlmRequestError {
                status_code: None,
                message: "vertex provider requires parameters.baseUrl to carry the project/location endpoint"
                    .to_string(),
            });
        }

        let request = build_request(self.temperature, self.max_tokens, messages, tools);
        let response = get_shared_http_client()
            .post(self.endpoint())
            .bearer_auth(&self.access_token)
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
