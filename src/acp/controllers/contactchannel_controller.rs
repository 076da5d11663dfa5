//! `ContactChannel` validation controller (§3 "ContactChannel").

use crate::acp::controllers::{READY_REQUEUE_SECS, TRANSIENT_REQUEUE_SECS};
use crate::acp::events::{EventRecorder, ResourceEvent};
use crate::acp::reconcile::ReconcileOutcome;
use crate::acp::resources::contactchannel::ContactChannel;
use crate::acp::secrets::{resolve_key, SecretStore};
use crate::acp::store::memory::retry_status_update;
use crate::acp::store::{Resource, ResourceStore};

pub async fn reconcile(
    store: &dyn ResourceStore<ContactChannel>,
    secrets: &dyn SecretStore,
    events: &dyn EventRecorder,
    namespace: &str,
    name: &str,
) -> ReconcileOutcome {
    let resource = match store.get(namespace, name).await {
        Ok(r) => r,
        Err(e) => return ReconcileOutcome::Error(e),
    };

    let resolution = resolve_key(secrets, namespace, &resource.spec.api_key_secret_ref).await;
    let (ready, detail) = match &resolution {
        Ok(key) if key.is_empty() => (false, "resolved API key is empty".to_string()),
        Ok(_) => (true, "credential resolved".to_string()),
        Err(e) => (false, e.to_string()),
    };

    if let Err(e) = retry_status_update(store, namespace, name, |r| {
        r.status.ready = ready;
        r.status.status_detail = detail.clone();
    })
    .await
    {
        return ReconcileOutcome::Error(e);
    }

    let reason = if ready { "ContactChannelReady" } else { "ContactChannelNotReady" };
    events
        .record(ResourceEvent::new(ContactChannel::KIND, namespace, name, reason, detail))
        .await;

    if ready {
        ReconcileOutcome::requeue_after_secs(READY_REQUEUE_SECS)
    } else {
        ReconcileOutcome::requeue_after_secs(TRANSIENT_REQUEUE_SECS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::acp::events::TracingEventRecorder;
    use crate::acp::resources::contactchannel::{ContactChannelSpec, ContactChannelStatus, ContactChannelType};
    use crate::acp::secrets::{InMemorySecretStore, SecretKeyRef};
    use crate::acp::store::memory::TypedStore;
    use crate::acp::store::ObjectMeta;
    use std::collections::HashMap;

    #[tokio::test]
    async fn becomes_ready_when_credential_resolves() {
        let store = TypedStore::<ContactChannel>::new();
        let mut secrets = InMemorySecretStore::new();
        let mut data = HashMap::new();
        data.insert("token".to_string(), b"xoxb-test".to_vec());
        secrets.insert("default", "slack-creds", data);

        store
            .create(ContactChannel {
                meta: ObjectMeta::new("default", "oncall"),
                spec: ContactChannelSpec {
                    channel_type: ContactChannelType::Slack,
                    config: serde_json::json!({"channel": "#oncall"}),
                    api_key_secret_ref: SecretKeyRef {
                        name: "slack-creds".to_string(),
                        key: "token".to_string(),
                    },
                },
                status: ContactChannelStatus::default(),
            })
            .await
            .unwrap();

        reconcile(&store, &secrets, &TracingEventRecorder, "default", "oncall").await;
        let updated = store.get("default", "oncall").await.unwrap();
        assert!(updated.status.ready);
    }
}
