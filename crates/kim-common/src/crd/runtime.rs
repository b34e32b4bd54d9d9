//! Runtime CRD: the desired state of one Kyma runtime cluster
//!
//! A Runtime is created by the provisioning broker on the KCP. The
//! infrastructure manager turns it into a Gardener Shoot and reports
//! progress through `status.state` and `status.conditions`.

use std::collections::BTreeMap;

use kube::{CustomResource, ResourceExt};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::shoot::{ControlPlane, LastError, LastOperation, OidcConfig, Worker};
use super::types::{find_condition, is_false, set_condition, Condition, ConditionStatus};
use crate::labels;

/// Runtime specification
#[derive(CustomResource, Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "infrastructuremanager.kyma-project.io",
    version = "v1",
    kind = "Runtime",
    plural = "runtimes",
    namespaced,
    status = "RuntimeStatus",
    printcolumn = r#"{"name":"Shoot","type":"string","jsonPath":".spec.shoot.name"}"#,
    printcolumn = r#"{"name":"State","type":"string","jsonPath":".status.state"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct RuntimeSpec {
    /// Shoot to provision
    pub shoot: RuntimeShoot,

    /// Security settings applied to the SKR
    #[serde(default)]
    pub security: Security,

    /// Image registry caches configured for the SKR
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub caching: Option<Vec<ImageRegistryCache>>,
}

/// Shoot part of the Runtime spec
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RuntimeShoot {
    /// Shoot name
    pub name: String,

    /// Gardener purpose
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub purpose: Option<String>,

    /// Platform region of the broker
    #[serde(default)]
    pub platform_region: String,

    /// Cloud region
    pub region: String,

    /// Licence type, stamped on the Shoot
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub licence_type: Option<String>,

    /// Secret binding (or credentials binding) with cloud credentials
    pub secret_binding_name: String,

    /// Pin the seed to the shoot region
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enforce_seed_location: Option<bool>,

    /// Kubernetes settings
    #[serde(default)]
    pub kubernetes: RuntimeKubernetes,

    /// Infrastructure provider
    pub provider: RuntimeProvider,

    /// Networking
    #[serde(default)]
    pub networking: RuntimeNetworking,

    /// Control plane settings
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub control_plane: Option<ControlPlane>,
}

/// Kubernetes settings requested for the runtime
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RuntimeKubernetes {
    /// Requested version; the configured default is used when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    /// API server settings
    #[serde(default, rename = "kubeAPIServer")]
    pub kube_api_server: RuntimeApiServer,
}

/// API server settings requested for the runtime
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RuntimeApiServer {
    /// Primary OIDC issuer
    #[serde(default)]
    pub oidc_config: OidcConfig,

    /// Additional OIDC issuers; unset means "use the configured default"
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub additional_oidc_config: Option<Vec<OidcConfig>>,
}

/// Infrastructure provider requested for the runtime
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RuntimeProvider {
    /// Provider type (aws, azure, gcp, openstack, alicloud)
    #[serde(rename = "type")]
    pub type_: String,

    /// Main worker pool followed by any other pools
    #[serde(default)]
    pub workers: Vec<Worker>,

    /// Additional worker pools
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub additional_workers: Option<Vec<Worker>>,

    /// Explicit control plane config, overriding the generated one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub control_plane_config: Option<Value>,

    /// Explicit infrastructure config, overriding the generated one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub infrastructure_config: Option<Value>,
}

impl RuntimeProvider {
    /// All worker pools: main workers first, then additional ones
    pub fn all_workers(&self) -> Vec<Worker> {
        self.workers
            .iter()
            .chain(self.additional_workers.iter().flatten())
            .cloned()
            .collect()
    }
}

/// Network ranges requested for the runtime
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RuntimeNetworking {
    /// Network plugin; calico when unset
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub type_: Option<String>,
    /// Pod CIDR
    #[serde(default)]
    pub pods: String,
    /// Node CIDR
    #[serde(default)]
    pub nodes: String,
    /// Service CIDR
    #[serde(default)]
    pub services: String,
}

/// Security settings for the SKR
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Security {
    /// Users bound to cluster-admin
    #[serde(default)]
    pub administrators: Vec<String>,

    /// Network filtering
    #[serde(default)]
    pub networking: NetworkingSecurity,
}

/// Network filtering settings
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NetworkingSecurity {
    /// Egress and ingress filters
    #[serde(default)]
    pub filter: Filter,
}

/// Egress and ingress filters
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Filter {
    /// Egress filter
    #[serde(default)]
    pub egress: FilterToggle,
    /// Ingress filter
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ingress: Option<FilterToggle>,
}

/// On/off switch for a filter
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FilterToggle {
    /// Whether the filter is enabled
    #[serde(default)]
    pub enabled: bool,
}

/// Image registry cache entry
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ImageRegistryCache {
    /// Name of the in-cluster cache object
    pub name: String,
    /// Namespace of the in-cluster cache object
    pub namespace: String,
    /// Uid of the in-cluster cache object
    pub uid: String,
    /// Cache configuration
    pub config: RegistryCacheConfig,
}

/// Registry cache configuration
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RegistryCacheConfig {
    /// Upstream registry host
    pub upstream: String,
    /// Upstream URL, when it differs from `https://<upstream>`
    #[serde(default, rename = "remoteURL", skip_serializing_if = "Option::is_none")]
    pub remote_url: Option<String>,
    /// SKR secret with upstream credentials
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret_reference_name: Option<String>,
    /// Cache volume
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volume: Option<RegistryCacheVolume>,
    /// Garbage collection
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub garbage_collection: Option<RegistryCacheGarbageCollection>,
}

/// Registry cache volume
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RegistryCacheVolume {
    /// Volume size
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<String>,
    /// Storage class
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage_class_name: Option<String>,
}

/// Registry cache garbage collection
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RegistryCacheGarbageCollection {
    /// Time-to-live of cached blobs, e.g. "168h"
    pub ttl: String,
}

/// Lifecycle state of a Runtime
#[derive(Clone, Copy, Debug, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub enum RuntimeState {
    /// Provisioning or updating
    Pending,
    /// Fully provisioned and configured
    Ready,
    /// Stopped on a non-retryable error
    Failed,
    /// Being deprovisioned
    Terminating,
}

impl RuntimeState {
    /// State name as written to status
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "Pending",
            Self::Ready => "Ready",
            Self::Failed => "Failed",
            Self::Terminating => "Terminating",
        }
    }
}

impl std::fmt::Display for RuntimeState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Condition types written on a Runtime
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RuntimeConditionType {
    /// Shoot has been created or updated
    Provisioned,
    /// Kubeconfig is available through a GardenerCluster
    KubeconfigReady,
    /// OIDC resources are present on the SKR
    OidcConfigured,
    /// SKR is configured (administrators, bootstrapper)
    Configured,
    /// Runtime bootstrapper is installed
    BootstrapperConfigured,
    /// Shoot and kubeconfig have been removed
    Deprovisioned,
}

impl RuntimeConditionType {
    /// Condition type string
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Provisioned => "Provisioned",
            Self::KubeconfigReady => "KubeconfigReady",
            Self::OidcConfigured => "OidcConfigured",
            Self::Configured => "Configured",
            Self::BootstrapperConfigured => "BootstrapperConfigured",
            Self::Deprovisioned => "Deprovisioned",
        }
    }
}

/// Condition reasons written on a Runtime
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RuntimeConditionReason {
    /// Runtime was seen for the first time
    Initialized,
    /// Shoot create was submitted
    ShootCreationPending,
    /// Shoot create finished
    ShootCreationCompleted,
    /// Shoot patch was submitted or is being reconciled by Gardener
    ProcessingShootPatch,
    /// Gardener finished reconciling
    ProcessingCompleted,
    /// Runtime could not be converted to a Shoot
    ConversionError,
    /// Gardener rejected or failed the operation
    GardenerError,
    /// Kubernetes API call failed
    KubernetesApiErr,
    /// Audit log configuration is missing
    AuditLogError,
    /// Registry cache secrets could not be synchronised
    RegistryCacheError,
    /// GardenerCluster was created and waits for the kubeconfig
    GardenerCrCreated,
    /// GardenerCluster reports the kubeconfig as ready
    GardenerCrReady,
    /// OIDC resources were written
    OidcConfigured,
    /// SKR configuration failed
    ConfigurationErr,
    /// Administrators were bound
    AdministratorsConfigured,
    /// Bootstrapper installation is in progress
    BootstrapperInstalling,
    /// Bootstrapper is installed
    BootstrapperInstalled,
    /// Bootstrapper installation failed
    BootstrapperFailed,
    /// Deletion was requested
    DeletionStarted,
    /// GardenerCluster was deleted
    KubeconfigDeleted,
    /// Shoot delete was submitted
    ShootDeletionStarted,
    /// Shoot is gone
    Deleted,
}

impl RuntimeConditionReason {
    /// Condition reason string
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Initialized => "Initialized",
            Self::ShootCreationPending => "ShootCreationPending",
            Self::ShootCreationCompleted => "ShootCreationCompleted",
            Self::ProcessingShootPatch => "ProcessingShootPatch",
            Self::ProcessingCompleted => "ProcessingCompleted",
            Self::ConversionError => "ConversionError",
            Self::GardenerError => "GardenerErr",
            Self::KubernetesApiErr => "KubernetesAPIErr",
            Self::AuditLogError => "AuditLogError",
            Self::RegistryCacheError => "RegistryCacheError",
            Self::GardenerCrCreated => "GardenerClusterCRCreated",
            Self::GardenerCrReady => "GardenerClusterCRReady",
            Self::OidcConfigured => "OidcConfigured",
            Self::ConfigurationErr => "ConfigurationErr",
            Self::AdministratorsConfigured => "AdministratorsConfigured",
            Self::BootstrapperInstalling => "BootstrapperInstalling",
            Self::BootstrapperInstalled => "BootstrapperInstalled",
            Self::BootstrapperFailed => "BootstrapperFailed",
            Self::DeletionStarted => "DeletionStarted",
            Self::KubeconfigDeleted => "KubeconfigDeleted",
            Self::ShootDeletionStarted => "ShootDeletionStarted",
            Self::Deleted => "Deleted",
        }
    }
}

impl std::fmt::Display for RuntimeConditionReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Runtime status
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RuntimeStatus {
    /// Lifecycle state; unset until the first reconcile
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<RuntimeState>,

    /// Conditions
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,

    /// Set once the runtime reached Ready for the first time
    #[serde(default, skip_serializing_if = "is_false")]
    pub provisioning_completed: bool,

    /// Copy of the Shoot's last operation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shoot_last_operation: Option<LastOperation>,

    /// Copy of the Shoot's last errors
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub shoot_last_errors: Vec<LastError>,
}

impl RuntimeStatus {
    /// Set a condition, keeping its transition time if the status is unchanged
    pub fn set_condition(
        &mut self,
        type_: RuntimeConditionType,
        status: ConditionStatus,
        reason: RuntimeConditionReason,
        message: impl Into<String>,
    ) {
        set_condition(
            &mut self.conditions,
            Condition::new(type_.as_str(), status, reason.as_str(), message),
        );
    }

    /// Find a condition by type
    pub fn condition(&self, type_: RuntimeConditionType) -> Option<&Condition> {
        find_condition(&self.conditions, type_.as_str())
    }

    /// Move to Pending and record a condition
    pub fn update_state_pending(
        &mut self,
        type_: RuntimeConditionType,
        status: ConditionStatus,
        reason: RuntimeConditionReason,
        message: impl Into<String>,
    ) {
        self.state = Some(RuntimeState::Pending);
        self.set_condition(type_, status, reason, message);
    }

    /// Record a retryable problem without demoting a Ready runtime
    pub fn update_state_transient(
        &mut self,
        type_: RuntimeConditionType,
        reason: RuntimeConditionReason,
        message: impl Into<String>,
    ) {
        if self.state != Some(RuntimeState::Ready) {
            self.state = Some(RuntimeState::Pending);
        }
        self.set_condition(type_, ConditionStatus::Unknown, reason, message);
    }

    /// Move to Ready and record a successful condition
    pub fn update_state_ready(
        &mut self,
        type_: RuntimeConditionType,
        reason: RuntimeConditionReason,
        message: impl Into<String>,
    ) {
        self.state = Some(RuntimeState::Ready);
        self.provisioning_completed = true;
        self.set_condition(type_, ConditionStatus::True, reason, message);
    }

    /// Move to Failed and record a failed condition
    pub fn update_state_failed(
        &mut self,
        type_: RuntimeConditionType,
        reason: RuntimeConditionReason,
        message: impl Into<String>,
    ) {
        self.update_state_failed_with_reason(type_, reason.as_str(), message);
    }

    /// Move to Failed with a reason outside the fixed set, such as the
    /// error codes reported by Gardener
    pub fn update_state_failed_with_reason(
        &mut self,
        type_: RuntimeConditionType,
        reason: impl Into<String>,
        message: impl Into<String>,
    ) {
        self.state = Some(RuntimeState::Failed);
        set_condition(
            &mut self.conditions,
            Condition::new(type_.as_str(), ConditionStatus::False, reason, message),
        );
    }

    /// Move to Terminating and record a deletion condition
    pub fn update_state_deletion(
        &mut self,
        type_: RuntimeConditionType,
        status: ConditionStatus,
        reason: RuntimeConditionReason,
        message: impl Into<String>,
    ) {
        self.state = Some(RuntimeState::Terminating);
        self.set_condition(type_, status, reason, message);
    }
}

impl Runtime {
    /// Runtime id from the `kyma-project.io/runtime-id` label
    pub fn runtime_id(&self) -> crate::Result<&str> {
        self.label(labels::RUNTIME_ID).ok_or_else(|| {
            crate::Error::validation_for_field(
                self.name_any(),
                format!("metadata.labels[{}]", labels::RUNTIME_ID),
                "runtime id label is missing",
            )
        })
    }

    /// Value of a label
    pub fn label(&self, key: &str) -> Option<&str> {
        self.labels().get(key).map(String::as_str)
    }

    /// Value of an annotation
    pub fn annotation(&self, key: &str) -> Option<&str> {
        self.annotations().get(key).map(String::as_str)
    }

    /// True when the annotation is present and set to "true"
    pub fn annotation_is_true(&self, key: &str) -> bool {
        self.annotation(key) == Some("true")
    }

    /// Whether deletion has been requested
    pub fn is_deleting(&self) -> bool {
        self.metadata.deletion_timestamp.is_some()
    }

    /// Whether the object carries the given finalizer
    pub fn has_finalizer(&self, finalizer: &str) -> bool {
        self.finalizers().iter().any(|f| f == finalizer)
    }

    /// Current lifecycle state, if any
    pub fn state(&self) -> Option<RuntimeState> {
        self.status.as_ref().and_then(|s| s.state)
    }

    /// Image registry caches, empty when none are configured
    pub fn caches(&self) -> &[ImageRegistryCache] {
        self.spec.caching.as_deref().unwrap_or_default()
    }

    /// Labels copied onto objects derived from this Runtime
    pub fn propagated_labels(&self) -> BTreeMap<String, String> {
        [
            labels::RUNTIME_ID,
            labels::SHOOT_NAME,
            labels::KYMA_NAME,
            labels::BROKER_PLAN_NAME,
            labels::GLOBAL_ACCOUNT_ID,
            labels::SUBACCOUNT_ID,
            labels::PLATFORM_REGION,
            labels::REGION,
        ]
        .into_iter()
        .filter_map(|k| self.label(k).map(|v| (k.to_string(), v.to_string())))
        .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RUNTIME_YAML: &str = r#"
apiVersion: infrastructuremanager.kyma-project.io/v1
kind: Runtime
metadata:
  name: rt-1
  namespace: kcp-system
  generation: 3
  labels:
    kyma-project.io/runtime-id: rt-1
    kyma-project.io/global-account-id: ga-1
spec:
  shoot:
    name: c-12345
    region: eu-central-1
    secretBindingName: sb-aws
    provider:
      type: aws
      workers:
        - name: cpu-worker-0
          machine:
            type: m6i.large
          minimum: 3
          maximum: 20
          zones: [eu-central-1a, eu-central-1b, eu-central-1c]
      additionalWorkers:
        - name: gpu
          machine:
            type: g4dn.xlarge
          minimum: 0
          maximum: 2
          zones: [eu-central-1a]
    networking:
      pods: 100.64.0.0/12
      nodes: 10.250.0.0/16
      services: 100.104.0.0/13
  security:
    administrators: [admin@example.com]
"#;

    fn runtime() -> Runtime {
        serde_yaml::from_str(RUNTIME_YAML).unwrap()
    }

    #[test]
    fn parses_broker_runtime() {
        let rt = runtime();
        assert_eq!(rt.runtime_id().unwrap(), "rt-1");
        assert_eq!(rt.spec.shoot.provider.all_workers().len(), 2);
        assert_eq!(rt.spec.shoot.provider.all_workers()[1].name, "gpu");
        assert!(rt.caches().is_empty());
        assert_eq!(rt.state(), None);
    }

    #[test]
    fn missing_runtime_id_is_a_validation_error() {
        let mut rt = runtime();
        rt.metadata.labels = None;
        assert!(matches!(
            rt.runtime_id(),
            Err(crate::Error::Validation { .. })
        ));
    }

    #[test]
    fn propagated_labels_only_copy_known_keys() {
        let labels = runtime().propagated_labels();
        assert_eq!(labels.len(), 2);
        assert_eq!(labels.get("kyma-project.io/global-account-id").unwrap(), "ga-1");
    }

    #[test]
    fn transient_update_keeps_ready_state() {
        let mut status = RuntimeStatus {
            state: Some(RuntimeState::Ready),
            ..Default::default()
        };
        status.update_state_transient(
            RuntimeConditionType::Configured,
            RuntimeConditionReason::ConfigurationErr,
            "skr unreachable",
        );
        assert_eq!(status.state, Some(RuntimeState::Ready));

        let mut fresh = RuntimeStatus::default();
        fresh.update_state_transient(
            RuntimeConditionType::Configured,
            RuntimeConditionReason::ConfigurationErr,
            "skr unreachable",
        );
        assert_eq!(fresh.state, Some(RuntimeState::Pending));
    }

    #[test]
    fn ready_marks_provisioning_completed() {
        let mut status = RuntimeStatus::default();
        status.update_state_ready(
            RuntimeConditionType::Configured,
            RuntimeConditionReason::AdministratorsConfigured,
            "ok",
        );
        assert!(status.provisioning_completed);
        assert_eq!(
            status
                .condition(RuntimeConditionType::Configured)
                .unwrap()
                .status,
            ConditionStatus::True
        );
    }

    #[test]
    fn failed_sets_condition_false() {
        let mut status = RuntimeStatus::default();
        status.update_state_failed(
            RuntimeConditionType::Provisioned,
            RuntimeConditionReason::ConversionError,
            "bad zones",
        );
        assert_eq!(status.state, Some(RuntimeState::Failed));
        let cond = status.condition(RuntimeConditionType::Provisioned).unwrap();
        assert_eq!(cond.status, ConditionStatus::False);
        assert_eq!(cond.reason, "ConversionError");
    }

    #[test]
    fn failed_with_gardener_codes_keeps_codes_as_reason() {
        let mut status = RuntimeStatus::default();
        status.update_state_failed_with_reason(
            RuntimeConditionType::Provisioned,
            "ERR_INFRA_UNAUTHENTICATED",
            "1) credentials rejected",
        );
        assert_eq!(status.state, Some(RuntimeState::Failed));
        let cond = status.condition(RuntimeConditionType::Provisioned).unwrap();
        assert_eq!(cond.reason, "ERR_INFRA_UNAUTHENTICATED");
    }
}
