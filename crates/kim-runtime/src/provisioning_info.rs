//! `kyma-provisioning-info` ConfigMap written to every SKR

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::ConfigMap;
use kube::api::ObjectMeta;
use serde::Serialize;
use serde_json::Value;

use kim_common::crd::{Runtime, Shoot, Worker};
use kim_common::{labels, Error, Result, KYMA_SYSTEM_NAMESPACE};

/// Name of the ConfigMap
pub const PROVISIONING_INFO_NAME: &str = "kyma-provisioning-info";
/// Key of the document within the ConfigMap
pub const PROVISIONING_INFO_KEY: &str = "details";

/// Zones a worker pool needs to count as highly available
const HA_ZONE_COUNT: usize = 3;

#[derive(Debug, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
struct ProvisioningInfo {
    #[serde(rename = "globalAccountID")]
    global_account_id: String,
    #[serde(rename = "subaccountID")]
    subaccount_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    infrastructure_config: Option<Value>,
    worker_pools: WorkerPools,
}

#[derive(Debug, Serialize, PartialEq)]
struct WorkerPools {
    #[serde(skip_serializing_if = "Option::is_none")]
    kyma: Option<WorkerSummary>,
    custom: Vec<WorkerSummary>,
}

#[derive(Debug, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
struct WorkerSummary {
    name: String,
    machine_type: String,
    auto_scaler_min: i32,
    auto_scaler_max: i32,
    ha_zones: bool,
}

impl From<&Worker> for WorkerSummary {
    fn from(worker: &Worker) -> Self {
        Self {
            name: worker.name.clone(),
            machine_type: worker.machine.type_.clone(),
            auto_scaler_min: worker.minimum,
            auto_scaler_max: worker.maximum,
            ha_zones: worker.zones.len() >= HA_ZONE_COUNT,
        }
    }
}

/// Render the provisioning info document
pub fn render(runtime: &Runtime, shoot: &Shoot) -> Result<String> {
    let provider = &runtime.spec.shoot.provider;
    let info = ProvisioningInfo {
        global_account_id: runtime
            .label(labels::GLOBAL_ACCOUNT_ID)
            .unwrap_or_default()
            .to_string(),
        subaccount_id: runtime
            .label(labels::SUBACCOUNT_ID)
            .unwrap_or_default()
            .to_string(),
        infrastructure_config: shoot.spec.provider.infrastructure_config.clone(),
        worker_pools: WorkerPools {
            kyma: provider.workers.first().map(WorkerSummary::from),
            custom: provider
                .additional_workers
                .iter()
                .flatten()
                .map(WorkerSummary::from)
                .collect(),
        },
    };
    serde_yaml::to_string(&info).map_err(|e| {
        Error::serialization_for_kind("ConfigMap", format!("provisioning info: {e}"))
    })
}

/// The ConfigMap applied to `kyma-system` on the SKR
pub fn build_config_map(runtime: &Runtime, shoot: &Shoot) -> Result<ConfigMap> {
    Ok(ConfigMap {
        metadata: ObjectMeta {
            name: Some(PROVISIONING_INFO_NAME.to_string()),
            namespace: Some(KYMA_SYSTEM_NAMESPACE.to_string()),
            labels: Some(BTreeMap::from([(
                labels::MANAGED_BY.to_string(),
                labels::MANAGED_BY_VALUE.to_string(),
            )])),
            ..Default::default()
        },
        data: Some(BTreeMap::from([(
            PROVISIONING_INFO_KEY.to_string(),
            render(runtime, shoot)?,
        )])),
        ..Default::default()
    })
}
