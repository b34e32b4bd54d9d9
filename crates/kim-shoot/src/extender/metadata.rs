//! Shoot identity: name, namespace, labels, annotations and the top-level
//! placement fields (region, purpose, cloud profile, credentials)

use std::collections::BTreeMap;

use kim_common::crd::ProviderType;
use kim_common::{garden_namespace, labels};

use super::Extender;
use crate::config::FeatureFlags;

/// Shoot label with the global account id
pub const ACCOUNT_LABEL: &str = "account";
/// Shoot label with the subaccount id
pub const SUBACCOUNT_LABEL: &str = "subaccount";

const CLEANUP_GRACE_PERIODS: &[(&str, &str)] = &[
    (
        "shoot.gardener.cloud/cleanup-extended-apis-finalize-grace-period-seconds",
        "120",
    ),
    (
        "shoot.gardener.cloud/cleanup-kubernetes-resources-finalize-grace-period-seconds",
        "120",
    ),
    (
        "shoot.gardener.cloud/cleanup-namespace-resources-finalize-grace-period-seconds",
        "60",
    ),
];

/// Name, namespace, account labels and placement fields
pub fn new_metadata_extender<'a>(project: &'a str, features: &'a FeatureFlags) -> Extender<'a> {
    Box::new(move |runtime, shoot| {
        let spec = &runtime.spec.shoot;
        let provider: ProviderType = spec.provider.type_.parse()?;

        shoot.metadata.name = Some(spec.name.clone());
        shoot.metadata.namespace = Some(garden_namespace(project));

        let mut shoot_labels = BTreeMap::new();
        if let Some(account) = runtime.label(labels::GLOBAL_ACCOUNT_ID) {
            shoot_labels.insert(ACCOUNT_LABEL.to_string(), account.to_string());
        }
        if let Some(subaccount) = runtime.label(labels::SUBACCOUNT_ID) {
            shoot_labels.insert(SUBACCOUNT_LABEL.to_string(), subaccount.to_string());
        }
        if !shoot_labels.is_empty() {
            shoot.metadata.labels = Some(shoot_labels);
        }

        shoot.spec.region = Some(spec.region.clone());
        shoot.spec.purpose = spec.purpose.clone();
        shoot.spec.cloud_profile_name = Some(provider.cloud_profile().to_string());
        shoot.spec.provider.type_ = provider.as_str().to_string();

        if features.credentials_binding {
            shoot.spec.credentials_binding_name = Some(spec.secret_binding_name.clone());
        } else {
            shoot.spec.secret_binding_name = Some(spec.secret_binding_name.clone());
        }
        Ok(())
    })
}

/// Runtime id, generation, licence type and cleanup grace periods
pub fn new_annotations_extender<'a>() -> Extender<'a> {
    Box::new(|runtime, shoot| {
        let mut annotations: BTreeMap<String, String> = CLEANUP_GRACE_PERIODS
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();

        annotations.insert(
            labels::SHOOT_RUNTIME_ID.to_string(),
            runtime.runtime_id()?.to_string(),
        );
        annotations.insert(
            labels::SHOOT_RUNTIME_GENERATION.to_string(),
            runtime.metadata.generation.unwrap_or_default().to_string(),
        );
        if let Some(licence) = &runtime.spec.shoot.licence_type {
            annotations.insert(labels::SHOOT_LICENCE_TYPE.to_string(), licence.clone());
        }

        shoot
            .metadata
            .annotations
            .get_or_insert_with(BTreeMap::new)
            .extend(annotations);
        Ok(())
    })
}
