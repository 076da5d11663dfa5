//! `LLM`: a credential + parameter bundle for one provider (§3).

use serde::{Deserialize, Serialize};

use crate::acp::secrets::SecretKeyRef;
use crate::acp::store::{ObjectMeta, Resource};

/// Stable for the life of the resource (§3 invariant).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    Openai,
    Anthropic,
    Mistral,
    Google,
    Vertex,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GenerationParameters {
    pub model: String,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    pub base_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmSpec {
    pub provider: Provider,
    pub api_key_secret_ref: SecretKeyRef,
    pub parameters: GenerationParameters,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LlmStatus {
    pub ready: bool,
    pub status_detail: String,
}

#[derive(Debug, Clone)]
pub struct LlmResource {
    pub meta: ObjectMeta,
    pub spec: LlmSpec,
    pub status: LlmStatus,
}

impl Resource for LlmResource {
    const KIND: &'static str = "LLM";
    fn metadata(&self) -> &ObjectMeta {
        &self.meta
    }
    fn metadata_mut(&mut self) -> &mut ObjectMeta {
        &mut self.meta
    }
}
