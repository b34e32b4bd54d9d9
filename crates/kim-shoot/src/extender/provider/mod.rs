//! Provider specific infrastructure, control plane and worker configuration
//!
//! Each supported provider implements [`ProviderEncoder`]. The two provider
//! extenders share the worker defaulting and zone validation and differ in
//! where infrastructure config comes from: generated on create, carried over
//! from the observed Shoot on patch.
//!
//! # Supported Providers
//!
//! - [`AwsEncoder`] - zoned VPC with worker, public and internal subnets
//! - [`AzureEncoder`] - zoned VNet with NAT gateways, or a single legacy subnet
//! - [`GcpEncoder`] - single worker range
//! - [`OpenStackEncoder`] - floating pool and F5 load balancers
//! - [`AlicloudEncoder`] - zoned VPC with worker subnets

mod alicloud;
mod aws;
mod azure;
mod gcp;
mod openstack;
pub mod subnets;

pub use alicloud::AlicloudEncoder;
pub use aws::AwsEncoder;
pub use azure::AzureEncoder;
pub use gcp::GcpEncoder;
pub use openstack::OpenStackEncoder;

use kim_common::crd::{MachineImage, Provider, ProviderType, Runtime, Shoot, Worker};
use kim_common::{Error, Result};
use serde_json::Value;

use super::Extender;
use crate::config::{MachineImageConfig, ProviderConfig};

/// A zone as listed in an infrastructure config
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InfrastructureZone {
    /// Zone name
    pub name: String,
    /// Worker CIDR of the zone
    pub workers: String,
}

/// Encodes provider specific Shoot configuration
pub trait ProviderEncoder: Send + Sync {
    /// Provider this encoder is for
    fn provider_type(&self) -> ProviderType;

    /// Infrastructure config for the node range and zones
    fn infrastructure_config(&self, nodes: &str, zones: &[String]) -> Result<Value>;

    /// Control plane config for the zones
    fn control_plane_config(&self, zones: &[String]) -> Result<Value>;

    /// Provider config for workers that have none
    fn worker_config(&self) -> Option<Value> {
        None
    }

    /// Zones listed in an infrastructure config, for providers with zoned
    /// networks. `None` means the provider does not pin workers to subnets.
    fn infrastructure_zones(&self, _infrastructure_config: &Value) -> Option<Vec<InfrastructureZone>> {
        None
    }
}

/// Create the encoder for a provider
pub fn create_encoder(provider: ProviderType, config: &ProviderConfig) -> Box<dyn ProviderEncoder> {
    match provider {
        ProviderType::Aws => Box::new(AwsEncoder::new(config.aws.enable_imds_v2)),
        ProviderType::Azure => Box::new(AzureEncoder),
        ProviderType::Gcp => Box::new(GcpEncoder),
        ProviderType::OpenStack => Box::new(OpenStackEncoder::new(
            config.openstack.floating_pool_name.clone(),
        )),
        ProviderType::Alicloud => Box::new(AlicloudEncoder),
    }
}

/// Provider section for a new Shoot
pub fn new_provider_extender_for_create<'a>(
    config: &'a ProviderConfig,
    image: &'a MachineImageConfig,
) -> Extender<'a> {
    Box::new(move |runtime, shoot| {
        let requested = &runtime.spec.shoot.provider;
        let provider: ProviderType = requested.type_.parse()?;
        let encoder = create_encoder(provider, config);

        let workers = build_workers(runtime, image, encoder.as_ref(), &[]);
        let zones = zone_union(&workers);

        let infrastructure_config = match &requested.infrastructure_config {
            Some(explicit) => explicit.clone(),
            None => encoder.infrastructure_config(&runtime.spec.shoot.networking.nodes, &zones)?,
        };
        let control_plane_config = match &requested.control_plane_config {
            Some(explicit) => explicit.clone(),
            None => encoder.control_plane_config(&zones)?,
        };
        validate_worker_zones(encoder.as_ref(), &infrastructure_config, &workers)?;

        shoot.spec.provider = Provider {
            type_: provider.as_str().to_string(),
            control_plane_config: Some(control_plane_config),
            infrastructure_config: Some(infrastructure_config),
            workers,
        };
        Ok(())
    })
}

/// Provider section for an existing Shoot.
///
/// Infrastructure and control plane config are taken from the Runtime when
/// given explicitly and otherwise carried over from the observed Shoot, so
/// the zone order Gardener knows is preserved. Worker zones follow the
/// observed order as well.
pub fn new_provider_extender_for_patch<'a>(
    config: &'a ProviderConfig,
    image: &'a MachineImageConfig,
    observed: &'a Shoot,
) -> Extender<'a> {
    Box::new(move |runtime, shoot| {
        let requested = &runtime.spec.shoot.provider;
        let provider: ProviderType = requested.type_.parse()?;
        let encoder = create_encoder(provider, config);
        let current = &observed.spec.provider;

        let mut workers = build_workers(runtime, image, encoder.as_ref(), &current.workers);
        align_worker_zones(&mut workers, &current.workers);
        let zones = zone_union(&workers);

        let infrastructure_config = match (&requested.infrastructure_config, &current.infrastructure_config) {
            (Some(explicit), Some(existing)) => {
                validate_no_shrink(encoder.as_ref(), existing, explicit)?;
                explicit.clone()
            }
            (Some(explicit), None) => explicit.clone(),
            (None, Some(existing)) => existing.clone(),
            (None, None) => {
                encoder.infrastructure_config(&runtime.spec.shoot.networking.nodes, &zones)?
            }
        };
        let control_plane_config = match (&requested.control_plane_config, &current.control_plane_config) {
            (Some(explicit), _) => explicit.clone(),
            (None, Some(existing)) => existing.clone(),
            (None, None) => encoder.control_plane_config(&zones)?,
        };
        validate_worker_zones(encoder.as_ref(), &infrastructure_config, &workers)?;

        shoot.spec.provider = Provider {
            type_: provider.as_str().to_string(),
            control_plane_config: Some(control_plane_config),
            infrastructure_config: Some(infrastructure_config),
            workers,
        };
        Ok(())
    })
}

/// Runtime workers with machine image and provider config defaults applied.
///
/// A worker without an image keeps the image of the observed worker of the
/// same name, so a patch never silently changes a running image.
fn build_workers(
    runtime: &Runtime,
    image: &MachineImageConfig,
    encoder: &dyn ProviderEncoder,
    observed: &[Worker],
) -> Vec<Worker> {
    runtime
        .spec
        .shoot
        .provider
        .all_workers()
        .into_iter()
        .map(|mut worker| {
            if worker.machine.image.is_none() {
                worker.machine.image = observed
                    .iter()
                    .find(|w| w.name == worker.name)
                    .and_then(|w| w.machine.image.clone())
                    .or_else(|| default_image(image));
            }
            if worker.provider_config.is_none() {
                worker.provider_config = encoder.worker_config();
            }
            worker
        })
        .collect()
}

fn default_image(image: &MachineImageConfig) -> Option<MachineImage> {
    if image.default_name.is_empty() {
        return None;
    }
    Some(MachineImage {
        name: image.default_name.clone(),
        version: Some(image.default_version.clone()).filter(|v| !v.is_empty()),
    })
}

/// All zones used by any worker, in order of first appearance
pub fn zone_union(workers: &[Worker]) -> Vec<String> {
    let mut zones: Vec<String> = Vec::new();
    for zone in workers.iter().flat_map(|w| w.zones.iter()) {
        if !zones.contains(zone) {
            zones.push(zone.clone());
        }
    }
    zones
}

/// Reorder each worker's zones to follow the observed worker of the same
/// name; zones new to the worker keep their relative order at the end
fn align_worker_zones(workers: &mut [Worker], observed: &[Worker]) {
    for worker in workers.iter_mut() {
        let Some(existing) = observed.iter().find(|w| w.name == worker.name) else {
            continue;
        };
        let mut aligned: Vec<String> = existing
            .zones
            .iter()
            .filter(|z| worker.zones.contains(z))
            .cloned()
            .collect();
        for zone in &worker.zones {
            if !aligned.contains(zone) {
                aligned.push(zone.clone());
            }
        }
        worker.zones = aligned;
    }
}

fn validate_worker_zones(
    encoder: &dyn ProviderEncoder,
    infrastructure_config: &Value,
    workers: &[Worker],
) -> Result<()> {
    let Some(zones) = encoder.infrastructure_zones(infrastructure_config) else {
        return Ok(());
    };
    for worker in workers {
        for zone in &worker.zones {
            if !zones.iter().any(|z| &z.name == zone) {
                return Err(Error::conversion(
                    encoder.provider_type().as_str(),
                    format!(
                        "zone {zone} of worker {} is not present in the infrastructure config",
                        worker.name
                    ),
                ));
            }
        }
    }
    Ok(())
}

/// Reject infrastructure changes that would remove a zone or shrink a
/// zone's worker subnet, both of which would orphan running nodes
fn validate_no_shrink(
    encoder: &dyn ProviderEncoder,
    existing: &Value,
    requested: &Value,
) -> Result<()> {
    let provider = encoder.provider_type();
    let (Some(before), Some(after)) = (
        encoder.infrastructure_zones(existing),
        encoder.infrastructure_zones(requested),
    ) else {
        return Ok(());
    };
    for old in &before {
        let Some(new) = after.iter().find(|z| z.name == old.name) else {
            return Err(Error::conversion(
                provider.as_str(),
                format!("zone {} cannot be removed from the infrastructure config", old.name),
            ));
        };
        let old_net = subnets::parse_cidr(provider.as_str(), &old.workers)?;
        let new_net = subnets::parse_cidr(provider.as_str(), &new.workers)?;
        if !new_net.contains(&old_net) {
            return Err(Error::conversion(
                provider.as_str(),
                format!(
                    "worker subnet of zone {} cannot shrink from {old_net} to {new_net}",
                    old.name
                ),
            ));
        }
    }
    Ok(())
}

/// Read `networks.zones[]`, taking each zone's subnet from `cidr_key`
pub(crate) fn zones_from(
    infrastructure_config: &Value,
    cidr_key: &str,
) -> Option<Vec<InfrastructureZone>> {
    let zones = infrastructure_config.pointer("/networks/zones")?.as_array()?;
    Some(
        zones
            .iter()
            .filter_map(|zone| {
                let name = match zone.get("name")? {
                    Value::String(s) => s.clone(),
                    Value::Number(n) => n.to_string(),
                    _ => return None,
                };
                let workers = zone.get(cidr_key)?.as_str()?.to_string();
                Some(InfrastructureZone { name, workers })
            })
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extender::testing::runtime;
    use kim_common::crd::ShootSpec;
    use serde_json::json;

    fn image() -> MachineImageConfig {
        MachineImageConfig {
            default_name: "gardenlinux".to_string(),
            default_version: "1592.1.0".to_string(),
        }
    }

    fn aws_config() -> ProviderConfig {
        let mut config = ProviderConfig::default();
        config.aws.enable_imds_v2 = true;
        config
    }

    fn created_shoot(rt: &Runtime) -> Shoot {
        let config = aws_config();
        let image = image();
        let mut shoot = Shoot::new("", ShootSpec::default());
        new_provider_extender_for_create(&config, &image)(rt, &mut shoot).unwrap();
        shoot
    }

    mod create {
        use super::*;

        #[test]
        fn aws_workers_get_image_and_imds_defaults() {
            let shoot = created_shoot(&runtime("aws"));
            let worker = &shoot.spec.provider.workers[0];
            let image = worker.machine.image.as_ref().unwrap();
            assert_eq!(image.name, "gardenlinux");
            assert_eq!(image.version.as_deref(), Some("1592.1.0"));
            assert_eq!(
                worker.provider_config.as_ref().unwrap()["instanceMetadataOptions"]["httpTokens"],
                "required"
            );
        }

        #[test]
        fn aws_infrastructure_lists_every_zone() {
            let shoot = created_shoot(&runtime("aws"));
            let infra = shoot.spec.provider.infrastructure_config.unwrap();
            let zones = infra["networks"]["zones"].as_array().unwrap();
            assert_eq!(zones.len(), 3);
            assert_eq!(zones[1]["name"], "eu-central-1b");
            assert_eq!(zones[1]["workers"], "10.250.32.0/19");
        }

        #[test]
        fn explicit_infrastructure_must_cover_worker_zones() {
            let mut rt = runtime("aws");
            rt.spec.shoot.provider.infrastructure_config = Some(json!({
                "networks": {"zones": [{"name": "eu-central-1a", "workers": "10.250.0.0/19"}]}
            }));
            let config = aws_config();
            let image = image();
            let mut shoot = Shoot::new("", ShootSpec::default());
            let err = new_provider_extender_for_create(&config, &image)(&rt, &mut shoot)
                .unwrap_err();
            assert!(err.to_string().contains("eu-central-1b"));
        }
    }

    mod patch {
        use super::*;

        fn observed() -> Shoot {
            let mut rt = runtime("aws");
            // Gardener knows the zones in a different order than the runtime lists them
            rt.spec.shoot.provider.workers[0].zones = vec![
                "eu-central-1c".to_string(),
                "eu-central-1a".to_string(),
                "eu-central-1b".to_string(),
            ];
            created_shoot(&rt)
        }

        fn patched(rt: &Runtime, observed: &Shoot) -> Result<Shoot> {
            let config = aws_config();
            let image = image();
            let mut shoot = Shoot::new("", ShootSpec::default());
            new_provider_extender_for_patch(&config, &image, observed)(rt, &mut shoot)?;
            Ok(shoot)
        }

        #[test]
        fn keeps_observed_infrastructure_and_zone_order() {
            let observed = observed();
            let shoot = patched(&runtime("aws"), &observed).unwrap();
            assert_eq!(
                shoot.spec.provider.infrastructure_config,
                observed.spec.provider.infrastructure_config
            );
            assert_eq!(
                shoot.spec.provider.workers[0].zones,
                vec!["eu-central-1c", "eu-central-1a", "eu-central-1b"]
            );
        }

        #[test]
        fn worker_in_unknown_zone_fails() {
            let observed = observed();
            let mut rt = runtime("aws");
            rt.spec.shoot.provider.workers[0]
                .zones
                .push("eu-central-1d".to_string());
            let err = patched(&rt, &observed).unwrap_err();
            assert!(err.to_string().contains("eu-central-1d"));
        }

        #[test]
        fn shrinking_a_zone_subnet_fails() {
            let observed = observed();
            let mut rt = runtime("aws");
            let mut infra = observed.spec.provider.infrastructure_config.clone().unwrap();
            infra["networks"]["zones"][0]["workers"] = json!("10.250.0.0/20");
            rt.spec.shoot.provider.infrastructure_config = Some(infra);
            let err = patched(&rt, &observed).unwrap_err();
            assert!(err.to_string().contains("cannot shrink"));
        }

        #[test]
        fn observed_image_is_kept_for_existing_workers() {
            let mut observed = observed();
            observed.spec.provider.workers[0].machine.image = Some(MachineImage {
                name: "gardenlinux".to_string(),
                version: Some("1443.3.0".to_string()),
            });
            let shoot = patched(&runtime("aws"), &observed).unwrap();
            assert_eq!(
                shoot.spec.provider.workers[0]
                    .machine
                    .image
                    .as_ref()
                    .unwrap()
                    .version
                    .as_deref(),
                Some("1443.3.0")
            );
        }
    }

    #[test]
    fn zone_union_keeps_first_appearance_order() {
        let mut rt = runtime("aws");
        rt.spec.shoot.provider.additional_workers = Some(vec![Worker {
            name: "extra".to_string(),
            zones: vec!["eu-central-1b".to_string(), "eu-central-1d".to_string()],
            ..Default::default()
        }]);
        let zones = zone_union(&rt.spec.shoot.provider.all_workers());
        assert_eq!(
            zones,
            vec!["eu-central-1a", "eu-central-1b", "eu-central-1c", "eu-central-1d"]
        );
    }
}
