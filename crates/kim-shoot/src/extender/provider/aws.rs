//! AWS infrastructure and worker configuration

use kim_common::crd::ProviderType;
use kim_common::Result;
use serde_json::{json, Value};

use super::{subnets, zones_from, InfrastructureZone, ProviderEncoder};

const API_VERSION: &str = "aws.provider.extensions.gardener.cloud/v1alpha1";

/// Zoned VPC with worker, public and internal subnets per zone
pub struct AwsEncoder {
    enable_imds_v2: bool,
}

impl AwsEncoder {
    /// Create an encoder; `enable_imds_v2` requires session tokens on workers
    pub fn new(enable_imds_v2: bool) -> Self {
        Self { enable_imds_v2 }
    }
}

impl ProviderEncoder for AwsEncoder {
    fn provider_type(&self) -> ProviderType {
        ProviderType::Aws
    }

    fn infrastructure_config(&self, nodes: &str, zones: &[String]) -> Result<Value> {
        let plan = subnets::plan(self.provider_type().as_str(), nodes, zones.len())?;
        let zones: Vec<Value> = zones
            .iter()
            .zip(plan)
            .map(|(name, subnets)| {
                json!({
                    "name": name,
                    "workers": subnets.workers.to_string(),
                    "public": subnets.public.to_string(),
                    "internal": subnets.internal.to_string(),
                })
            })
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

    fn worker_config(&self) -> Option<Value> {
        self.enable_imds_v2.then(|| {
            json!({
                "apiVersion": API_VERSION,
                "kind": "WorkerConfig",
                "instanceMetadataOptions": {
                    "httpTokens": "required",
                    "httpPutResponseHopLimit": 2,
                }
            })
        })
    }

    fn infrastructure_zones(&self, infrastructure_config: &Value) -> Option<Vec<InfrastructureZone>> {
        zones_from(infrastructure_config, "workers")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn two_zone_layout() {
        let zones = vec!["eu-west-1a".to_string(), "eu-west-1b".to_string()];
        let config = AwsEncoder::new(false)
            .infrastructure_config("10.250.0.0/16", &zones)
            .unwrap();
        assert_eq!(config["networks"]["vpc"]["cidr"], "10.250.0.0/16");
        assert_eq!(
            config["networks"]["zones"][1],
            json!({
                "name": "eu-west-1b",
                "workers": "10.250.32.0/19",
                "public": "10.250.100.0/22",
                "internal": "10.250.116.0/22",
            })
        );
    }

    #[test]
    fn worker_config_only_with_imds_v2() {
        assert!(AwsEncoder::new(false).worker_config().is_none());
        let config = AwsEncoder::new(true).worker_config().unwrap();
        assert_eq!(config["instanceMetadataOptions"]["httpPutResponseHopLimit"], 2);
    }
}
