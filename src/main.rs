// src/main.rs

use std::sync::Arc;

use acp::acp::config::RuntimeConfig;
use acp::acp::humanlayer::HttpHumanLayerClient;
use acp::acp::runtime::Runtime;
use acp::acp::secrets::InMemorySecretStore;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let config = RuntimeConfig::from_env();
    tracing::info!(
        pod_namespace = %config.pod_namespace,
        pod_name = %config.pod_name,
        otel_endpoint = ?config.otel_exporter_otlp_endpoint,
        "starting acp-controller-manager"
    );

    // The real deployment wires a Kubernetes-Secret- or Vault-backed
    // SecretStore and a HumanLayer API key pulled from the environment; the
    // REST admission surface and secret-backend plumbing are out of scope
    // for this crate (§2), so the binary defaults to the in-memory
    // reference store for now.
    let secrets = Box::new(InMemorySecretStore::new());
    let human_layer_api_key = std::env::var("HUMANLAYER_API_KEY").unwrap_or_default();
    let human_layer = Arc::new(HttpHumanLayerClient::new(human_layer_api_key));

    let runtime = Arc::new(Runtime::new(config.pod_namespace.clone(), config.pod_name.clone(), secrets, human_layer));

    let shutdown = CancellationToken::new();
    let handles = runtime.spawn_controllers(shutdown.clone());

    tokio::signal::ctrl_c().await?;
    tracing::info!("shutdown signal received, draining controller loops");
    shutdown.cancel();

    for handle in handles {
        let _ = handle.await;
    }

    Ok(())
}
