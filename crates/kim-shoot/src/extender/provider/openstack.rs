//! OpenStack infrastructure configuration

use kim_common::crd::ProviderType;
use kim_common::Result;
use serde_json::{json, Value};

use super::ProviderEncoder;

const API_VERSION: &str = "openstack.provider.extensions.gardener.cloud/v1alpha1";
const LOAD_BALANCER_PROVIDER: &str = "f5";

/// Single worker range behind a floating IP pool
pub struct OpenStackEncoder {
    floating_pool_name: String,
}

impl OpenStackEncoder {
    /// Create an encoder for the given floating IP pool
    pub fn new(floating_pool_name: String) -> Self {
        Self { floating_pool_name }
    }
}

impl ProviderEncoder for OpenStackEncoder {
    fn provider_type(&self) -> ProviderType {
        ProviderType::OpenStack
    }

    fn infrastructure_config(&self, nodes: &str, _zones: &[String]) -> Result<Value> {
        Ok(json!({
            "apiVersion": API_VERSION,
            "kind": "InfrastructureConfig",
            "floatingPoolName": self.floating_pool_name,
            "networks": { "workers": nodes },
        }))
    }

    fn control_plane_config(&self, _zones: &[String]) -> Result<Value> {
        Ok(json!({
            "apiVersion": API_VERSION,
            "kind": "ControlPlaneConfig",
            "loadBalancerProvider": LOAD_BALANCER_PROVIDER,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn floating_pool_and_f5() {
        let encoder = OpenStackEncoder::new("FloatingIP-external-kyma-01".to_string());
        let infra = encoder.infrastructure_config("10.250.0.0/16", &[]).unwrap();
        assert_eq!(infra["floatingPoolName"], "FloatingIP-external-kyma-01");
        let cp = encoder.control_plane_config(&[]).unwrap();
        assert_eq!(cp["loadBalancerProvider"], "f5");
    }
}
