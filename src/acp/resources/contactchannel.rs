//! `ContactChannel`: a conduit to a human approver (§3).

use serde::{Deserialize, Serialize};

use crate::acp::secrets::SecretKeyRef;
use crate::acp::store::{ObjectMeta, Resource};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContactChannelType {
    Slack,
    Email,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContactChannelSpec {
    pub channel_type: ContactChannelType,
    pub config: serde_json::Value,
    pub api_key_secret_ref: SecretKeyRef,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContactChannelStatus {
    pub ready: bool,
    pub status_detail: String,
}

#[derive(Debug, Clone)]
pub struct ContactChannel {
    pub meta: ObjectMeta,
    pub spec: ContactChannelSpec,
    pub status: ContactChannelStatus,
}

impl Resource for ContactChannel {
    const KIND: &'static str = "ContactChannel";
    fn metadata(&self) -> &ObjectMeta {
        &self.meta
    }
    fn metadata_mut(&mut self) -> &mut ObjectMeta {
        &mut self.meta
    }
}
