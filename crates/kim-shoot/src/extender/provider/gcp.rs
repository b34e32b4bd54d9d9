//! GCP infrastructure configuration

use kim_common::crd::ProviderType;
use kim_common::{Error, Result};
use serde_json::{json, Value};

use super::ProviderEncoder;

const API_VERSION: &str = "gcp.provider.extensions.gardener.cloud/v1alpha1";

/// Single worker range; the control plane is pinned to the first zone
pub struct GcpEncoder;

impl ProviderEncoder for GcpEncoder {
    fn provider_type(&self) -> ProviderType {
        ProviderType::Gcp
    }

    fn infrastructure_config(&self, nodes: &str, _zones: &[String]) -> Result<Value> {
        Ok(json!({
            "apiVersion": API_VERSION,
            "kind": "InfrastructureConfig",
            "networks": { "workers": nodes },
        }))
    }

    fn control_plane_config(&self, zones: &[String]) -> Result<Value> {
        let zone = zones.first().ok_or_else(|| {
            Error::conversion(self.provider_type().as_str(), "at least one zone is required")
        })?;
        Ok(json!({
            "apiVersion": API_VERSION,
            "kind": "ControlPlaneConfig",
            "zone": zone,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn control_plane_uses_first_zone() {
        let zones = vec!["europe-west3-b".to_string(), "europe-west3-a".to_string()];
        let config = GcpEncoder.control_plane_config(&zones).unwrap();
        assert_eq!(config["zone"], "europe-west3-b");
        assert!(GcpEncoder.control_plane_config(&[]).is_err());
    }
}
