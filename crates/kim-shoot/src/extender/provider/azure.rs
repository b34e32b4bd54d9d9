//! Azure infrastructure configuration
//!
//! Runtimes with zones get a zoned VNet with one NAT gateway per zone. A
//! Runtime without zones gets the legacy single-subnet layout.

use kim_common::crd::ProviderType;
use kim_common::{Error, Result};
use serde_json::{json, Value};

use super::{subnets, zones_from, InfrastructureZone, ProviderEncoder};

const API_VERSION: &str = "azure.provider.extensions.gardener.cloud/v1alpha1";
const NAT_IDLE_TIMEOUT_MINUTES: u32 = 4;

/// Zoned VNet, or a single legacy worker subnet
pub struct AzureEncoder;

impl ProviderEncoder for AzureEncoder {
    fn provider_type(&self) -> ProviderType {
        ProviderType::Azure
    }

    fn infrastructure_config(&self, nodes: &str, zones: &[String]) -> Result<Value> {
        if zones.is_empty() {
            return Ok(json!({
                "apiVersion": API_VERSION,
                "kind": "InfrastructureConfig",
                "networks": {
                    "vnet": { "cidr": nodes },
                    "workers": nodes,
                },
                "zoned": false,
            }));
        }

        let provider = self.provider_type().as_str();
        let plan = subnets::plan(provider, nodes, zones.len())?;
        let zones = zones
            .iter()
            .zip(plan)
            .map(|(name, subnets)| {
                let number: u32 = name.parse().map_err(|_| {
                    Error::conversion(provider, format!("zone {name} is not a zone number"))
                })?;
                Ok(json!({
                    "name": number,
                    "cidr": subnets.workers.to_string(),
                    "natGateway": {
                        "enabled": true,
                        "idleConnectionTimeoutMinutes": NAT_IDLE_TIMEOUT_MINUTES,
                    }
                }))
            })
            .collect::<Result<Vec<Value>>>()?;

        Ok(json!({
            "apiVersion": API_VERSION,
            "kind": "InfrastructureConfig",
            "networks": {
                "vnet": { "cidr": nodes },
                "zones": zones,
            },
            "zoned": true,
        }))
    }

    fn control_plane_config(&self, _zones: &[String]) -> Result<Value> {
        Ok(json!({
            "apiVersion": API_VERSION,
            "kind": "ControlPlaneConfig",
        }))
    }

    fn infrastructure_zones(&self, infrastructure_config: &Value) -> Option<Vec<InfrastructureZone>> {
        zones_from(infrastructure_config, "cidr")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zoned_layout_uses_numeric_zone_names() {
        let zones = vec!["1".to_string(), "2".to_string(), "3".to_string()];
        let config = AzureEncoder
            .infrastructure_config("10.250.0.0/16", &zones)
            .unwrap();
        assert_eq!(config["zoned"], true);
        assert_eq!(config["networks"]["zones"][2]["name"], 3);
        assert_eq!(config["networks"]["zones"][2]["cidr"], "10.250.64.0/19");

        let parsed = AzureEncoder.infrastructure_zones(&config).unwrap();
        assert_eq!(parsed[0].name, "1");
    }

    #[test]
    fn no_zones_is_legacy_layout() {
        let config = AzureEncoder.infrastructure_config("10.250.0.0/22", &[]).unwrap();
        assert_eq!(config["zoned"], false);
        assert_eq!(config["networks"]["workers"], "10.250.0.0/22");
        assert!(AzureEncoder.infrastructure_zones(&config).is_none());
    }

    #[test]
    fn named_zone_is_rejected() {
        let zones = vec!["westeurope-1".to_string()];
        let err = AzureEncoder
            .infrastructure_config("10.250.0.0/16", &zones)
            .unwrap_err();
        assert!(err.to_string().contains("westeurope-1"));
    }
}
