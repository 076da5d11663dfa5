//! HumanLayer API client (§6): request/poll approvals and human-contact
//! replies. Every outbound call carries the ToolCall's `externalCallID` as
//! an idempotency key (§4.3 "Idempotency").

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::acp::error::{AcpError, Result};
use crate::acp::llm::clients::common::get_shared_http_client;

const DEFAULT_BASE_URL: &str = "https://api.humanlayer.dev/humanlayer/v1";
const RETRY_DELAYS_MS: [u64; 3] = [1000, 2000, 4000];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApprovalStatus {
    Pending,
    Approved,
    Rejected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContactStatus {
    Pending,
    Responded,
}

#[derive(Debug, Clone)]
pub struct FunctionCallStatus {
    pub status: ApprovalStatus,
    pub comment: Option<String>,
}

#[derive(Debug, Clone)]
pub struct HumanContactStatus {
    pub status: ContactStatus,
    pub response: Option<String>,
}

#[async_trait]
pub trait HumanLayerClient: Send + Sync {
    async fn request_approval(&self, call_id: &str, function_name: &str, arguments: &serde_json::Value) -> Result<()>;
    async fn request_human_contact(&self, call_id: &str, message: &str) -> Result<()>;
    async fn get_function_call_status(&self, call_id: &str) -> Result<FunctionCallStatus>;
    async fn get_human_contact_status(&self, call_id: &str) -> Result<HumanContactStatus>;
    /// Best-effort, retried result delivery for a Task's `contactChannelRef`
    /// (§4.2 "Final-answer branch"). Failures are logged, never propagated.
    async fn notify_final_answer(&self, channel: &str, task_name: &str, output: &str);
}

#[derive(Debug, Serialize)]
struct FunctionCallRequest<'a> {
    call_id: &'a str,
    spec: FunctionCallSpec<'a>,
}

#[derive(Debug, Serialize)]
struct FunctionCallSpec<'a> {
    fn_name: &'a str,
    kwargs: &'a serde_json::Value,
}

#[derive(Debug, Serialize)]
struct HumanContactRequest<'a> {
    call_id: &'a str,
    spec: HumanContactSpec<'a>,
}

#[derive(Debug, Serialize)]
struct HumanContactSpec<'a> {
    msg: &'a str,
}

#[derive(Debug, Deserialize)]
struct FunctionCallStatusResponse {
    status: RawApprovalStatus,
    #[serde(default)]
    comment: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawApprovalStatus {
    approved: Option<bool>,
}

#[derive(Debug, Deserialize)]
struct HumanContactStatusResponse {
    #[serde(default)]
    response: Option<String>,
}

/// Thin `reqwest`-backed client against the real HumanLayer HTTP API.
pub struct HttpHumanLayerClient {
    api_key: String,
    base_url: String,
}

impl HttpHumanLayerClient {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }

    async fn post(&self, path: &str, body: &impl Serialize) -> Result<reqwest::Response> {
        get_shared_http_client()
            .post(format!("{}/{path}", self.base_url.trim_end_matches('/')))
            .bearer_auth(&self.api_key)
            .json(body)
            .send()
            .await
            .map_err(|e| AcpError::Transport(format!("HumanLayer request failed: {e}")))
    }

    async fn get(&self, path: &str) -> Result<reqwest::Response> {
        get_shared_http_client()
            .get(format!("{}/{path}", self.base_url.trim_end_matches('/')))
            .bearer_auth(&self.api_key)
            .send()
            .await
            .map_err(|e| AcpError::Transport(format!("HumanLayer request failed: {e}")))
    }
}

#[async_trait]
impl HumanLayerClient for HttpHumanLayerClient {
    async fn request_approval(&self, call_id: &str, function_name: &str, arguments: &serde_json::Value) -> Result<()> {
        let request = FunctionCallRequest {
            call_id,
            spec: FunctionCallSpec {
                fn_name: function_name,
                kwargs: arguments,
            },
        };
        let response = self.post("function_calls", &request).await?;
        if !response.status().is_success() {
            return Err(AcpError::Transport(format!(
                "HumanLayer RequestApproval returned {}",
                response.status()
            )));
        }
        Ok(())
    }

    async fn request_human_contact(&self, call_id: &str, message: &str) -> Result<()> {
        let request = HumanContactRequest {
            call_id,
            spec: HumanContactSpec { msg: message },
        };
        let response = self.post("human_contacts", &request).await?;
        if !response.status().is_success() {
            return Err(AcpError::Transport(format!(
                "HumanLayer RequestHumanContact returned {}",
                response.status()
            )));
        }
        Ok(())
    }

    async fn get_function_call_status(&self, call_id: &str) -> Result<FunctionCallStatus> {
        let response = self.get(&format!("function_calls/{call_id}")).await?;
        let body: FunctionCallStatusResponse = response
            .json()
            .await
            .map_err(|e| AcpError::Transport(format!("failed decoding function call status: {e}")))?;

        let status = match body.status.approved {
            None => ApprovalStatus::Pending,
            Some(true) => ApprovalStatus::Approved,
            Some(false) => ApprovalStatus::Rejected,
        };
        Ok(FunctionCallStatus {
            status,
            comment: body.comment,
        })
    }

    async fn get_human_contact_status(&self, call_id: &str) -> Result<HumanContactStatus> {
        let response = self.get(&format!("human_contacts/{call_id}")).await?;
        let body: HumanContactStatusResponse = response
            .json()
            .await
            .map_err(|e| AcpError::Transport(format!("failed decoding human contact status: {e}")))?;

        Ok(match body.response {
            Some(response) => HumanContactStatus {
                status: ContactStatus::Responded,
                response: Some(response),
            },
            None => HumanContactStatus {
                status: ContactStatus::Pending,
                response: None,
            },
        })
    }

    async fn notify_final_answer(&self, channel: &str, task_name: &str, output: &str) {
        for (attempt, delay_ms) in RETRY_DELAYS_MS.iter().enumerate() {
            let result = self
                .post(
                    "agent/notify",
                    &serde_json::json!({ "channel": channel, "task": task_name, "output": output }),
                )
                .await;
            match result {
                Ok(response) if response.status().is_success() => return,
                Ok(response) => {
                    tracing::warn!(channel, task_name, status = %response.status(), attempt, "HumanLayer notify rejected");
                }
                Err(e) => {
                    tracing::warn!(channel, task_name, error = %e, attempt, "HumanLayer notify failed");
                }
            }
            tokio::time::sleep(Duration::from_millis(*delay_ms)).await;
        }
        tracing::error!(channel, task_name, "HumanLayer notify exhausted all retries");
    }
}
