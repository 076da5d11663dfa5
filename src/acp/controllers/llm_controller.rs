//! `LLM` validation controller (§3 "LLM", §2 component D).

use crate::acp::controllers::{READY_REQUEUE_SECS, TRANSIENT_REQUEUE_SECS};
use crate::acp::events::{EventRecorder, ResourceEvent};
use crate::acp::reconcile::ReconcileOutcome;
use crate::acp::resources::llm::LlmResource;
use crate::acp::secrets::{resolve_key, SecretStore};
use crate::acp::store::memory::retry_status_update;
use crate::acp::store::{Resource, ResourceStore};

pub async fn reconcile(
    store: &dyn ResourceStore<LlmResource>,
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

    let result = retry_status_update(store, namespace, name, |r| {
        r.status.ready = ready;
        r.status.status_detail = detail.clone();
    })
    .await;

    if let Err(e) = result {
        return ReconcileOutcome::Error(e);
    }

    if ready {
        events
            .record(ResourceEvent::new(
                LlmResource::KIND,
                namespace,
                name,
                "LLMReady",
                "credential resolved",
            ))
            .await;
        ReconcileOutcome::requeue_after_secs(READY_REQUEUE_SECS)
    } else {
        events
            .record(ResourceEvent::new(
                LlmResource::KIND,
                namespace,
                name,
                "LLMNotReady",
                detail,
            ))
            .await;
        ReconcileOutcome::requeue_after_secs(TRANSIENT_REQUEUE_SECS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::acp::events::TracingEventRecorder;
    use crate::acp::resources::llm::{GenerationParameters, LlmSpec, LlmStatus, Provider};
    use crate::acp::secrets::{InMemorySecretStore, SecretKeyRef};
    use crate::acp::store::memory::TypedStore;
    use std::collections::HashMap;

    async fn seed(store: &TypedStore<LlmResource>, secrets: &mut InMemorySecretStore, key_present: bool) {
        if key_present {
            let mut data = HashMap::new();
            data.insert("apiKey".to_string(), b"sk-test".to_vec());
            secrets.insert("default", "openai-creds", data);
        }
        store
            .create(LlmResource {
                meta: crate::acp::store::ObjectMeta::new("default", "my-llm"),
                spec: LlmSpec {
                    provider: Provider::Openai,
                    api_key_secret_ref: SecretKeyRef {
                        name: "openai-creds".to_string(),
                        key: "apiKey".to_string(),
                    },
                    parameters: GenerationParameters {
                        model: "gpt-4".to_string(),
                        ..Default::default()
                    },
                },
                status: LlmStatus::default(),
            })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn becomes_ready_when_credential_resolves() {
        let store = TypedStore::<LlmResource>::new();
        let mut secrets = InMemorySecretStore::new();
        seed(&store, &mut secrets, true).await;

        let outcome = reconcile(&store, &secrets, &TracingEventRecorder, "default", "my-llm").await;
        assert!(matches!(outcome, ReconcileOutcome::RequeueAfter(_)));
        let updated = store.get("default", "my-llm").await.unwrap();
        assert!(updated.status.ready);
    }

    #[tokio::test]
    async fn stays_not_ready_when_credential_missing() {
        let store = TypedStore::<LlmResource>::new();
        let mut secrets = InMemorySecretStore::new();
        seed(&store, &mut secrets, false).await;

        reconcile(&store, &secrets, &TracingEventRecorder, "default", "my-llm").await;
        let updated = store.get("default", "my-llm").await.unwrap();
        assert!(!updated.status.ready);
    }
}
