//! Gardener `Shoot` (core.gardener.cloud/v1beta1)
//!
//! Only the fields the infrastructure manager reads or owns are modelled.
//! Every optional field is skipped when unset so that a server-side apply
//! document claims exactly the fields that were populated.

use std::collections::BTreeMap;

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::types::IntOrString;

/// Shoot specification
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[kube(
    group = "core.gardener.cloud",
    version = "v1beta1",
    kind = "Shoot",
    plural = "shoots",
    namespaced,
    status = "ShootStatus",
    schema = "disabled"
)]
#[serde(rename_all = "camelCase")]
pub struct ShootSpec {
    /// Cloud profile name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cloud_profile_name: Option<String>,

    /// Region
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,

    /// Purpose (evaluation, production, ...)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub purpose: Option<String>,

    /// Legacy secret binding
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret_binding_name: Option<String>,

    /// Credentials binding, replacing the secret binding
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credentials_binding_name: Option<String>,

    /// Kubernetes settings
    #[serde(default)]
    pub kubernetes: Kubernetes,

    /// Networking
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub networking: Option<Networking>,

    /// Infrastructure provider
    #[serde(default)]
    pub provider: Provider,

    /// DNS settings
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dns: Option<Dns>,

    /// Shoot extensions
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extensions: Option<Vec<Extension>>,

    /// Maintenance settings
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub maintenance: Option<Maintenance>,

    /// Seed selector
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed_selector: Option<SeedSelector>,

    /// Tolerations against seed taints
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tolerations: Option<Vec<Toleration>>,

    /// Named resources referenced by extensions
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resources: Option<Vec<NamedResourceReference>>,

    /// Control plane settings
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub control_plane: Option<ControlPlane>,
}

/// Kubernetes settings of a Shoot
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Kubernetes {
    /// Kubernetes version
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    /// Whether a static token kubeconfig is generated
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enable_static_token_kubeconfig: Option<bool>,

    /// API server settings
    #[serde(
        default,
        rename = "kubeAPIServer",
        skip_serializing_if = "Option::is_none"
    )]
    pub kube_api_server: Option<KubeApiServerConfig>,

    /// Kubelet settings
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kubelet: Option<KubeletConfig>,
}

/// API server settings of a Shoot
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct KubeApiServerConfig {
    /// Legacy OIDC flags
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub oidc_config: Option<OidcConfig>,

    /// API group enablement
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub runtime_config: Option<BTreeMap<String, bool>>,

    /// Structured authentication configuration
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub structured_authentication: Option<StructuredAuthentication>,

    /// Audit policy
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audit_config: Option<AuditConfig>,
}

/// API server audit settings
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AuditConfig {
    /// Audit policy reference
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audit_policy: Option<AuditPolicy>,
}

/// Audit policy stored in a ConfigMap
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AuditPolicy {
    /// ConfigMap holding the policy
    #[serde(default, rename = "configMapRef", skip_serializing_if = "Option::is_none")]
    pub config_map_ref: Option<LocalObjectReference>,
}

/// Reference to an object in the same namespace
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LocalObjectReference {
    /// Object name
    pub name: String,
}

/// Reference to the ConfigMap holding an AuthenticationConfiguration
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StructuredAuthentication {
    /// ConfigMap name in the garden namespace
    pub config_map_name: String,
}

/// Kubelet settings of a Shoot
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct KubeletConfig {
    /// Feature gates
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feature_gates: Option<BTreeMap<String, bool>>,
}

/// OIDC settings in Gardener's shape, also used by the Runtime spec
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct OidcConfig {
    /// Client id (audience)
    #[serde(default, rename = "clientID", skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,

    /// Issuer URL
    #[serde(default, rename = "issuerURL", skip_serializing_if = "Option::is_none")]
    pub issuer_url: Option<String>,

    /// Claim holding the groups
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub groups_claim: Option<String>,

    /// Prefix added to group names
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub groups_prefix: Option<String>,

    /// Accepted signing algorithms
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signing_algs: Option<Vec<String>>,

    /// Claim holding the user name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username_claim: Option<String>,

    /// Prefix added to user names
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username_prefix: Option<String>,

    /// Claims that must be present with the given value
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub required_claims: Option<BTreeMap<String, String>>,
}

impl OidcConfig {
    /// True when both the client id and the issuer are set
    pub fn is_complete(&self) -> bool {
        self.client_id.as_deref().is_some_and(|s| !s.is_empty())
            && self.issuer_url.as_deref().is_some_and(|s| !s.is_empty())
    }
}

/// Networking of a Shoot
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Networking {
    /// Network plugin
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub type_: Option<String>,
    /// Pod CIDR
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pods: Option<String>,
    /// Node CIDR
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nodes: Option<String>,
    /// Service CIDR
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub services: Option<String>,
}

/// Infrastructure provider of a Shoot
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Provider {
    /// Provider type (aws, azure, ...)
    #[serde(rename = "type")]
    pub type_: String,

    /// Provider specific control plane config
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub control_plane_config: Option<Value>,

    /// Provider specific infrastructure config
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub infrastructure_config: Option<Value>,

    /// Worker pools
    #[serde(default)]
    pub workers: Vec<Worker>,
}

/// Worker pool, shared between the Runtime and the Shoot
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Worker {
    /// Pool name
    pub name: String,

    /// Machine settings
    pub machine: Machine,

    /// Minimum node count
    pub minimum: i32,

    /// Maximum node count
    pub maximum: i32,

    /// Surge during rollout
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_surge: Option<IntOrString>,

    /// Unavailability during rollout
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_unavailable: Option<IntOrString>,

    /// Availability zones
    #[serde(default)]
    pub zones: Vec<String>,

    /// Root volume
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volume: Option<Volume>,

    /// Provider specific worker config
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider_config: Option<Value>,
}

/// Machine settings of a worker pool
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Machine {
    /// Machine type
    #[serde(rename = "type")]
    pub type_: String,

    /// Machine image
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<MachineImage>,

    /// CPU architecture
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub architecture: Option<String>,
}

/// Machine image of a worker pool
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MachineImage {
    /// Image name
    pub name: String,
    /// Image version
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

/// Root volume of a worker pool
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Volume {
    /// Volume type
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub type_: Option<String>,
    /// Volume size, e.g. "50Gi"
    pub size: String,
}

/// DNS settings of a Shoot
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Dns {
    /// Shoot domain
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
    /// DNS providers
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub providers: Option<Vec<DnsProvider>>,
}

/// DNS provider of a Shoot
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DnsProvider {
    /// Whether this is the primary provider
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub primary: Option<bool>,
    /// Secret with provider credentials
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret_name: Option<String>,
    /// Provider type
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub type_: Option<String>,
}

/// Shoot extension
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Extension {
    /// Extension type
    #[serde(rename = "type")]
    pub type_: String,
    /// Extension specific config
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider_config: Option<Value>,
    /// Whether the extension is disabled
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disabled: Option<bool>,
}

/// Maintenance settings of a Shoot
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Maintenance {
    /// Automatic update flags
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auto_update: Option<MaintenanceAutoUpdate>,
    /// Maintenance window
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_window: Option<MaintenanceTimeWindow>,
}

/// Automatic update flags
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MaintenanceAutoUpdate {
    /// Patch version updates of Kubernetes
    pub kubernetes_version: bool,
    /// Machine image updates
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub machine_image_version: Option<bool>,
}

/// Maintenance window, in `HHMMSS+ZZZZ` notation
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct MaintenanceTimeWindow {
    /// Window start
    pub begin: String,
    /// Window end
    pub end: String,
}

/// Seed selector
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SeedSelector {
    /// Labels the seed must carry
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub match_labels: Option<BTreeMap<String, String>>,
}

/// Toleration of a seed taint
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Toleration {
    /// Taint key
    pub key: String,
    /// Taint value
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
}

/// Named reference to an object in the garden namespace
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NamedResourceReference {
    /// Reference name, used by extensions
    pub name: String,
    /// Referenced object
    pub resource_ref: CrossVersionObjectReference,
}

/// Reference to an object of any kind
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CrossVersionObjectReference {
    /// API version
    pub api_version: String,
    /// Kind
    pub kind: String,
    /// Name
    pub name: String,
}

/// Control plane settings
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ControlPlane {
    /// High availability settings
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub high_availability: Option<HighAvailability>,
}

/// High availability settings
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HighAvailability {
    /// Failure tolerance
    pub failure_tolerance: FailureTolerance,
}

/// Failure tolerance of the control plane
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FailureTolerance {
    /// "node" or "zone"
    #[serde(rename = "type")]
    pub type_: String,
}

/// Observed Shoot status
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ShootStatus {
    /// Last operation performed by Gardener
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_operation: Option<LastOperation>,

    /// Errors of the last operation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_errors: Option<Vec<LastError>>,

    /// Generation observed by Gardener
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,

    /// Technical id of the shoot in the seed
    #[serde(default, rename = "technicalID", skip_serializing_if = "Option::is_none")]
    pub technical_id: Option<String>,
}

/// Kind of a Gardener operation
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LastOperationType {
    /// Shoot creation
    Create,
    /// Shoot reconciliation (including updates)
    Reconcile,
    /// Shoot deletion
    Delete,
    /// Seed migration
    Migrate,
    /// Restore after migration
    Restore,
    /// Any value not known to this version
    Unknown,
}

/// State of a Gardener operation
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LastOperationState {
    /// Not yet started
    Pending,
    /// In progress
    Processing,
    /// Finished successfully
    Succeeded,
    /// Failed with a retryable error
    Error,
    /// Failed permanently
    Failed,
    /// Aborted
    Aborted,
    /// Any value not known to this version
    Unknown,
}

/// Last operation performed by Gardener on a Shoot
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LastOperation {
    /// Operation type, e.g. "Create"
    #[serde(rename = "type")]
    pub type_: String,
    /// Operation state, e.g. "Processing"
    pub state: String,
    /// Description
    #[serde(default)]
    pub description: String,
    /// Progress in percent
    #[serde(default)]
    pub progress: i32,
    /// Last update time
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_update_time: Option<String>,
}

impl LastOperation {
    /// Parsed operation type
    pub fn operation_type(&self) -> LastOperationType {
        match self.type_.as_str() {
            "Create" => LastOperationType::Create,
            "Reconcile" => LastOperationType::Reconcile,
            "Delete" => LastOperationType::Delete,
            "Migrate" => LastOperationType::Migrate,
            "Restore" => LastOperationType::Restore,
            _ => LastOperationType::Unknown,
        }
    }

    /// Parsed operation state
    pub fn operation_state(&self) -> LastOperationState {
        match self.state.as_str() {
            "Pending" => LastOperationState::Pending,
            "Processing" => LastOperationState::Processing,
            "Succeeded" => LastOperationState::Succeeded,
            "Error" => LastOperationState::Error,
            "Failed" => LastOperationState::Failed,
            "Aborted" => LastOperationState::Aborted,
            _ => LastOperationState::Unknown,
        }
    }
}

/// Error reported by Gardener for the last operation
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LastError {
    /// Description
    pub description: String,
    /// Error codes such as `ERR_INFRA_UNAUTHORIZED`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub codes: Option<Vec<String>>,
    /// Task that failed
    #[serde(default, rename = "taskID", skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,
    /// Last update time
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_update_time: Option<String>,
}

impl Shoot {
    /// Last operation, if Gardener has reported one
    pub fn last_operation(&self) -> Option<&LastOperation> {
        self.status.as_ref()?.last_operation.as_ref()
    }

    /// Errors of the last operation
    pub fn last_errors(&self) -> &[LastError] {
        self.status
            .as_ref()
            .and_then(|s| s.last_errors.as_deref())
            .unwrap_or_default()
    }

    /// Shoot domain, once Gardener has assigned one
    pub fn domain(&self) -> Option<&str> {
        self.spec
            .dns
            .as_ref()
            .and_then(|d| d.domain.as_deref())
            .filter(|d| !d.is_empty())
    }

    /// Whether an extension of the given type is present and not disabled
    pub fn extension_enabled(&self, type_: &str) -> bool {
        self.spec
            .extensions
            .iter()
            .flatten()
            .any(|e| e.type_ == type_ && !e.disabled.unwrap_or(false))
    }

    /// Value of an annotation
    pub fn annotation(&self, key: &str) -> Option<&str> {
        self.metadata
            .annotations
            .as_ref()
            .and_then(|a| a.get(key))
            .map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const OBSERVED: &str = r#"{
        "apiVersion": "core.gardener.cloud/v1beta1",
        "kind": "Shoot",
        "metadata": {"name": "c-12345", "namespace": "garden-kyma"},
        "spec": {
            "region": "eu-central-1",
            "dns": {"domain": "c-12345.kyma.example.com"},
            "provider": {"type": "aws", "workers": []},
            "extensions": [
                {"type": "shoot-oidc-service"},
                {"type": "shoot-networking-filter", "disabled": true}
            ],
            "someFutureField": {"a": 1}
        },
        "status": {
            "lastOperation": {"type": "Reconcile", "state": "Failed", "description": "boom", "progress": 40},
            "lastErrors": [{"description": "no creds", "codes": ["ERR_INFRA_UNAUTHORIZED"]}]
        }
    }"#;

    #[test]
    fn parses_observed_shoot() {
        let shoot: Shoot = serde_json::from_str(OBSERVED).unwrap();
        let op = shoot.last_operation().unwrap();
        assert_eq!(op.operation_type(), LastOperationType::Reconcile);
        assert_eq!(op.operation_state(), LastOperationState::Failed);
        assert_eq!(shoot.last_errors().len(), 1);
        assert_eq!(shoot.domain(), Some("c-12345.kyma.example.com"));
    }

    #[test]
    fn extension_enabled_respects_disabled_flag() {
        let shoot: Shoot = serde_json::from_str(OBSERVED).unwrap();
        assert!(shoot.extension_enabled("shoot-oidc-service"));
        assert!(!shoot.extension_enabled("shoot-networking-filter"));
        assert!(!shoot.extension_enabled("shoot-dns-service"));
    }

    #[test]
    fn unknown_operation_values_do_not_fail() {
        let op = LastOperation {
            type_: "Hibernate".to_string(),
            state: "Sleeping".to_string(),
            ..Default::default()
        };
        assert_eq!(op.operation_type(), LastOperationType::Unknown);
        assert_eq!(op.operation_state(), LastOperationState::Unknown);
    }

    #[test]
    fn unset_fields_are_not_serialized() {
        let shoot = Shoot::new("c-1", ShootSpec::default());
        let json = serde_json::to_value(&shoot).unwrap();
        let spec = json["spec"].as_object().unwrap();
        assert!(!spec.contains_key("region"));
        assert!(!spec.contains_key("extensions"));
        assert!(!spec.contains_key("maintenance"));
    }
}
