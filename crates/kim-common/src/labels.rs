//! Well-known label and annotation keys
//!
//! Keys on the Runtime are written by the provisioning broker; keys on the
//! Shoot and on SKR objects are written by the infrastructure manager.

/// Runtime id label on Runtime, GardenerCluster and registry-cache secrets
pub const RUNTIME_ID: &str = "kyma-project.io/runtime-id";
/// Shoot name label on Runtime and GardenerCluster
pub const SHOOT_NAME: &str = "kyma-project.io/shoot-name";
/// Kyma CR name label on Runtime
pub const KYMA_NAME: &str = "operator.kyma-project.io/kyma-name";
/// Broker plan label on Runtime
pub const BROKER_PLAN_NAME: &str = "kyma-project.io/broker-plan-name";
/// Global account label on Runtime
pub const GLOBAL_ACCOUNT_ID: &str = "kyma-project.io/global-account-id";
/// Subaccount label on Runtime
pub const SUBACCOUNT_ID: &str = "kyma-project.io/subaccount-id";
/// Platform region label on Runtime
pub const PLATFORM_REGION: &str = "kyma-project.io/platform-region";
/// Region label on Runtime
pub const REGION: &str = "kyma-project.io/region";

/// Shoot annotation carrying the runtime id
pub const SHOOT_RUNTIME_ID: &str = "infrastructuremanager.kyma-project.io/runtime-id";
/// Shoot annotation carrying the Runtime generation last applied
pub const SHOOT_RUNTIME_GENERATION: &str = "infrastructuremanager.kyma-project.io/runtime-generation";
/// Shoot annotation carrying the licence type
pub const SHOOT_LICENCE_TYPE: &str = "infrastructuremanager.kyma-project.io/licence-type";
/// Gardener annotation confirming Shoot deletion
pub const CONFIRM_DELETION: &str = "confirmation.gardener.cloud/deletion";

/// Runtime annotation forcing a Shoot patch on the next reconcile
pub const FORCE_PATCH_RECONCILIATION: &str = "operator.kyma-project.io/force-patch-reconciliation";
/// Runtime annotation suspending patch processing
pub const SUSPEND_PATCH_RECONCILIATION: &str = "operator.kyma-project.io/suspend-patch-reconciliation";
/// Runtime annotation stamped before the first Shoot create
pub const OPERATION_STARTED: &str = "infrastructuremanager.kyma-project.io/operation-started";

/// Kubeconfig secret annotation with the time of the last rotation
pub const KUBECONFIG_LAST_SYNC: &str = "operator.kyma-project.io/last-sync";

/// GardenerCluster annotation with the domain of the Shoot it serves
pub const SHOOT_DOMAIN: &str = "kyma-project.io/shoot-domain";

/// Managed-by label on administrator ClusterRoleBindings
pub const CRB_MANAGED_BY: &str = "reconciler.kyma-project.io/managed-by";
/// Managed-by label on OpenIDConnect resources and KIM-owned SKR objects
pub const MANAGED_BY: &str = "operator.kyma-project.io/managed-by";
/// Value of the managed-by labels
pub const MANAGED_BY_VALUE: &str = "infrastructure-manager";

/// Registry-cache secret annotation with the cache uid
pub const REGISTRY_CACHE_ID: &str = "kyma-project.io/registry-cache-id";
/// Registry-cache secret annotation with the cache name
pub const REGISTRY_CACHE_NAME: &str = "kyma-project.io/registry-cache-name";
/// Registry-cache secret annotation with the cache namespace
pub const REGISTRY_CACHE_NAMESPACE: &str = "kyma-project.io/registry-cache-namespace";

/// Version label compared by the runtime bootstrapper
pub const APP_VERSION: &str = "app.kubernetes.io/version";

/// Returns `key=value` for use as a label selector
pub fn selector(key: &str, value: &str) -> String {
    format!("{key}={value}")
}
