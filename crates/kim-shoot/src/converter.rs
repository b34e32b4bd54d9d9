//! Runtime to Shoot conversion
//!
//! Create and patch run the same extenders in the same order. They differ
//! in what patch additionally knows about the observed Shoot: its running
//! Kubernetes version, infrastructure config and zone order, workers,
//! extensions, resources, DNS and networking.

use kim_common::crd::{Runtime, Shoot, ShootSpec, Worker};
use kim_common::{Error, Result};
use tracing::debug;

use crate::config::{AuditLogData, ConverterConfig};
use crate::extender::audit_log::new_audit_log_extender;
use crate::extender::control_plane::new_control_plane_extender;
use crate::extender::dns::new_dns_extender;
use crate::extender::extensions::new_extensions_extender;
use crate::extender::kubernetes::new_kubernetes_extender;
use crate::extender::maintenance::new_maintenance_extender;
use crate::extender::metadata::{new_annotations_extender, new_metadata_extender};
use crate::extender::networking::new_networking_extender;
use crate::extender::oidc::new_oidc_extender;
use crate::extender::provider::{
    new_provider_extender_for_create, new_provider_extender_for_patch,
};
use crate::extender::registry_cache::new_registry_cache_extender;
use crate::extender::resources::new_resources_extender;
use crate::extender::seed::new_seed_extender;
use crate::extender::Extender;

/// Builds Shoot documents from Runtimes
#[derive(Clone, Debug)]
pub struct Converter {
    config: ConverterConfig,
}

impl Converter {
    /// Create a converter for the given configuration
    pub fn new(config: ConverterConfig) -> Self {
        Self { config }
    }

    /// Configuration the converter was built with
    pub fn config(&self) -> &ConverterConfig {
        &self.config
    }

    /// Shoot to create for a Runtime that has none yet
    pub fn to_shoot(&self, runtime: &Runtime, audit_log: Option<&AuditLogData>) -> Result<Shoot> {
        let config = &self.config;
        let mut extenders = vec![
            new_metadata_extender(&config.gardener.project_name, &config.features),
            new_annotations_extender(),
            new_kubernetes_extender(&config.kubernetes, None),
            new_oidc_extender(
                &config.kubernetes.default_operator_oidc,
                config.features.structured_auth,
            ),
            new_provider_extender_for_create(&config.provider, &config.machine_image),
            new_networking_extender(None),
            new_dns_extender(&config.dns, None),
            new_control_plane_extender(),
            new_maintenance_extender(&config.kubernetes, &config.maintenance_windows, None),
            new_seed_extender(&config.tolerations),
            new_extensions_extender(&config.dns, None),
            new_resources_extender(None),
            new_audit_log_extender(&config.audit_log.policy_config_map_name, audit_log),
        ];
        if config.features.registry_cache {
            extenders.push(new_registry_cache_extender(None));
        }
        self.run(runtime, extenders)
    }

    /// Shoot to apply over an existing one.
    ///
    /// The result only carries the fields this manager owns; applying it
    /// leaves fields owned by garden untouched.
    pub fn to_patched_shoot(
        &self,
        runtime: &Runtime,
        observed: &Shoot,
        audit_log: Option<&AuditLogData>,
    ) -> Result<Shoot> {
        let config = &self.config;
        let mut extenders = vec![
            new_metadata_extender(&config.gardener.project_name, &config.features),
            new_annotations_extender(),
            new_kubernetes_extender(
                &config.kubernetes,
                observed.spec.kubernetes.version.as_deref(),
            ),
            new_oidc_extender(
                &config.kubernetes.default_operator_oidc,
                config.features.structured_auth,
            ),
            new_provider_extender_for_patch(&config.provider, &config.machine_image, observed),
            new_networking_extender(Some(observed)),
            new_dns_extender(&config.dns, Some(observed)),
            new_control_plane_extender(),
            new_maintenance_extender(
                &config.kubernetes,
                &config.maintenance_windows,
                Some(observed),
            ),
            new_seed_extender(&config.tolerations),
            new_extensions_extender(&config.dns, Some(observed)),
            new_resources_extender(Some(observed)),
            new_audit_log_extender(&config.audit_log.policy_config_map_name, audit_log),
        ];
        if config.features.registry_cache {
            extenders.push(new_registry_cache_extender(Some(observed)));
        }
        self.run(runtime, extenders)
    }

    fn run(&self, runtime: &Runtime, extenders: Vec<Extender<'_>>) -> Result<Shoot> {
        let provider = runtime.spec.shoot.provider.type_.clone();
        let mut shoot = Shoot::new(&runtime.spec.shoot.name, ShootSpec::default());
        for extend in &extenders {
            extend(runtime, &mut shoot).map_err(|e| match e {
                Error::Conversion { .. } => e,
                other => Error::conversion(provider.as_str(), other.to_string()),
            })?;
        }
        debug!(
            shoot = %runtime.spec.shoot.name,
            provider = %provider,
            workers = shoot.spec.provider.workers.len(),
            "converted runtime to shoot"
        );
        Ok(shoot)
    }
}

/// Whether two worker lists differ structurally: different length or any
/// positional difference. Reordering counts as a difference.
pub fn workers_are_different(current: &[Worker], desired: &[Worker]) -> bool {
    current.len() != desired.len() || current.iter().zip(desired).any(|(a, b)| a != b)
}
