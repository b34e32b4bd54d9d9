//! Alibaba Cloud infrastructure configuration

use kim_common::crd::ProviderType;
use kim_common::Result;
use serde_json::{json, Value};

use super::{subnets, zones_from, InfrastructureZone, ProviderEncoder};

const API_VERSION: &str = "alicloud.provider.extensions.gardener.cloud/v1alpha1";

/// Zoned VPC with one worker subnet per zone
pub struct AlicloudEncoder;

impl ProviderEncoder for AlicloudEncoder {
    fn provider_type(&self) -> ProviderType {
        ProviderType::Alicloud
    }

    fn infrastructure_config(&self, nodes: &str, zones: &[String]) -> Result<Value> {
        let plan = subnets::plan(self.provider_type().as_str(), nodes, zones.len())?;
        let zones: Vec<Value> = zones
            .iter()
            .zip(plan)
            .map(|(name, subnets)| json!({ "name": name, "workers": subnets.workers.to_string() }))
            .collect();
        Ok(json!({
            "apiVersion": API_VERSION,
            "kind": "InfrastructureConfig",
            "networks": {
                "vpc": { "cidr": nodes },
                "zones": zones,
            }
        }))
    }

    fn control_plane_config(&self, _zones: &[String]) -> Result<Value> {
        Ok(json!({
            "apiVersion": API_VERSION,
            "kind": "ControlPlaneConfig",
        }))
    }

    fn infrastructure_zones(&self, infrastructure_config: &Value) -> Option<Vec<InfrastructureZone>> {
        zones_from(infrastructure_config, "workers")
    }
}
