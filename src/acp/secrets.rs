//! Secret resolution: `(namespace, secretRef) -> map<string, bytes>`.
//!
//! The real backing store (Kubernetes Secrets, Vault, ...) is external; this
//! crate only needs the lookup contract from §6 plus the env-resolution rule
//! from §4.1 ("for each env entry: inline value, else secret ref, else skip").

use async_trait::async_trait;
use std::collections::HashMap;

use crate::acp::error::{AcpError, Result};

/// A reference to a key inside a namespaced secret.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct SecretKeyRef {
    pub name: String,
    pub key: String,
}

#[async_trait]
pub trait SecretStore: Send + Sync {
    /// Fetch every key/value pair stored under `name` in `namespace`.
    async fn get(&self, namespace: &str, name: &str) -> Result<HashMap<String, Vec<u8>>>;
}

/// Fetch a single named key out of a secret, surfacing the right error
/// variant for each failure mode the Task/MCP controllers distinguish.
pub async fn resolve_key(
    store: &dyn SecretStore,
    namespace: &str,
    secret_ref: &SecretKeyRef,
) -> Result<Vec<u8>> {
    let data = store.get(namespace, &secret_ref.name).await?;
    data.get(&secret_ref.key).cloned().ok_or_else(|| {
        AcpError::CredentialMissing(format!(
            "secret {}/{} has no key {}",
            namespace, secret_ref.name, secret_ref.key
        ))
    })
}

/// In-memory secret store used by tests and local/dev deployments.
pub struct InMemorySecretStore {
    secrets: HashMap<(String, String), HashMap<String, Vec<u8>>>,
}

impl InMemorySecretStore {
    pub fn new() -> Self {
        Self {
            secrets: HashMap::new(),
        }
    }

    pub fn insert(
        &mut self,
        namespace: impl Into<String>,
        name: impl Into<String>,
        data: HashMap<String, Vec<u8>>,
    ) {
        self.secrets.insert((namespace.into(), name.into()), data);
    }
}

impl Default for InMemorySecretStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SecretStore for InMemorySecretStore {
    async fn get(&self, namespace: &str, name: &str) -> Result<HashMap<String, Vec<u8>>> {
        self.secrets
            .get(&(namespace.to_string(), name.to_string()))
            .cloned()
            .ok_or_else(|| AcpError::CredentialMissing(format!("secret {namespace}/{name} not found")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn resolves_existing_key() {
        let mut store = InMemorySecretStore::new();
        let mut data = HashMap::new();
        data.insert("apiKey".to_string(), b"sk-test".to_vec());
        store.insert("default", "openai-creds", data);

        let value = resolve_key(
            &store,
            "default",
            &SecretKeyRef {
                name: "openai-creds".to_string(),
                key: "apiKey".to_string(),
            },
        )
        .await
        .unwrap();
        assert_eq!(value, b"sk-test");
    }

    #[tokio::test]
    async fn missing_secret_is_credential_missing() {
        let store = InMemorySecretStore::new();
        let err = resolve_key(
            &store,
            "default",
            &SecretKeyRef {
                name: "nope".to_string(),
                key: "apiKey".to_string(),
            },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AcpError::CredentialMissing(_)));
    }
}
