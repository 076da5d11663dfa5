//! Process-wide configuration resolved from the environment.
//!
//! Kept intentionally minimal: the runtime reads a handful of env vars at
//! startup and otherwise takes all its configuration from resources in the
//! store. No config-file parsing is introduced here.

use crate::acp::ids::generate_pod_name_suffix;

/// Runtime identity and exporter configuration pulled from the environment.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// Namespace this controller instance operates in. Empty string if unset.
    pub pod_namespace: String,
    /// Identity used as the lease holder and in `acp-controller-manager-<id>`
    /// style fallback pod names.
    pub pod_name: String,
    /// OTLP collector endpoint, if tracing export is configured. Exporter
    /// wiring itself is out of scope for this crate; we only carry the value
    /// through so callers can wire it up.
    pub otel_exporter_otlp_endpoint: Option<String>,
}

impl RuntimeConfig {
    /// Build configuration from the process environment.
    ///
    /// `POD_NAME` falls back to `acp-controller-manager-<random8>` when unset,
    /// matching the lease-holder identity contract in the design.
    pub fn from_env() -> Self {
        let pod_namespace = std::env::var("POD_NAMESPACE").unwrap_or_default();
        let pod_name = std::env::var("POD_NAME")
            .unwrap_or_else(|_| format!("acp-controller-manager-{}", generate_pod_name_suffix()));
        let otel_exporter_otlp_endpoint = std::env::var("OTEL_EXPORTER_OTLP_ENDPOINT").ok();

        Self {
            pod_namespace,
            pod_name,
            otel_exporter_otlp_endpoint,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pod_name_falls_back_when_unset() {
        // SAFETY: test-only env mutation, no concurrent access to these keys
        // elsewhere in this process during the test run.
        unsafe {
            std::env::remove_var("POD_NAME");
        }
        let config = RuntimeConfig::from_env();
        assert!(config.pod_name.starts_with("acp-controller-manager-"));
    }
}
