//! Dispatch an [`LlmResource`] spec and a resolved API key into a concrete
//! [`LlmClient`] (§3 "LLM" resource, §6 provider abstraction).

use std::sync::Arc;

use crate::acp::error::{AcpError, Result};
use crate::acp::llm::clients::{anthropic::AnthropicClient, google::GoogleClient, mistral::MistralClient, openai::OpenAiClient, vertex::VertexClient};
use crate::acp::llm::LlmClient;
use crate::acp::resources::llm::{LlmResource, Provider};

/// Build the client for one `LLM` resource. `api_key` must already be the
/// resolved secret value (§4.2 step 3); an empty key is a terminal failure
/// there, not here.
pub fn build_client(resource: &LlmResource, api_key: &str) -> Result<Arc<dyn LlmClient>> {
    if api_key.is_empty() {
        return Err(AcpError::CredentialInvalid(format!(
            "LLM {} resolved an empty API key",
            resource.meta.name
        )));
    }

    let parameters = &resource.spec.parameters;
    let client: Arc<dyn LlmClient> = match resource.spec.provider {
        Provider::Openai => Arc::new(OpenAiClient::new(api_key, parameters)),
        Provider::Anthropic => Arc::new(AnthropicClient::new(api_key, parameters)),
        Provider::Mistral => Arc::new(MistralClient::new(api_key, parameters)),
        Provider::Google => Arc::new(GoogleClient::new(api_key, parameters)),
        Provider::Vertex => Arc::new(VertexClient::new(api_key, parameters)),
    };
    Ok(client)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::acp::resources::llm::GenerationParameters;
    use crate::acp::secrets::SecretKeyRef;
    use crate::acp::store::ObjectMeta;

    fn sample_resource(provider: Provider) -> LlmResource {
        LlmResource {
            meta: ObjectMeta::new("default", "my-llm"),
            spec: crate::acp::resources::llm::LlmSpec {
                provider,
                api_key_secret_ref: SecretKeyRef {
                    name: "creds".to_string(),
                    key: "apiKey".to_string(),
                },
                parameters: GenerationParameters {
                    model: "test-model".to_string(),
                    ..Default::default()
                },
            },
            status: Default::default(),
        }
    }

    #[test]
    fn builds_a_client_for_every_provider() {
        for provider in [
            Provider::Openai,
            Provider::Anthropic,
            Provider::Mistral,
            Provider::Google,
            Provider::Vertex,
        ] {
            let resource = sample_resource(provider);
            let client = build_client(&resource, "sk-test").unwrap();
            assert_eq!(client.model_name(), "test-model");
        }
    }

    #[test]
    fn empty_api_key_is_credential_invalid() {
        let resource = sample_resource(Provider::Openai);
        let err = build_client(&resource, "").unwrap_err();
        assert!(matches!(err, AcpError::CredentialInvalid(_)));
    }
}
