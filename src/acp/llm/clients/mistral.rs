//! Mistral `/v1/chat/completions` client — wire-compatible with OpenAI's.

use async_trait::async_trait;

use crate::acp::llm::clients::common::{send_chat_completion, to_chat_messages, to_chat_tools, ChatCompletionRequest};
use crate::acp::llm::{LlmClient, LlmRequestError, LlmResponse, ToolDefinition};
use crate::acp::resources::llm::GenerationParameters;
use crate::acp::resources::message::Message;

const DEFAULT_BASE_URL: &str = "https://api.mistral.ai/v1";

pub struct MistralClient {
    api_key: String,
    model: String,
    base_url: String,
    temperature: Option<f32>,
    max_tokens: Option<u32>,
}

impl MistralClient {
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
}

#[async_trait]
impl LlmClient for MistralClient {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn send_request(
        &self,
        messages: &[Message],
        tools: &[ToolDefinition],
    ) -> Result<LlmResponse, LlmRequestError> {
        let request = ChatCompletionRequest {
            model: self.model.clone(),
            messages: to_chat_messages(messages),
            tools: to_chat_tools(tools),
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        };
        let url = format!("{}/chat/completions", self.base_url.trim_end_matches('/'));
        send_chat_completion(&url, &self.api_key, &request).await
    }
}
