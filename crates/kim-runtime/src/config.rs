//! State machine configuration

use std::time::Duration;

use kim_common::kube_utils::DEFAULT_REQUEST_TIMEOUT;
use kim_shoot::{AuditLogTable, ConverterConfig};

/// Default wait between polls of a Shoot operation
pub const DEFAULT_GARDENER_REQUEUE: Duration = Duration::from_secs(15);
/// Default wait between polls of the kubeconfig and SKR configuration
pub const DEFAULT_CONTROL_PLANE_REQUEUE: Duration = Duration::from_secs(10);
/// Default wait between polls during deprovisioning
pub const DEFAULT_CONTROL_PLANE_DELETE_REQUEUE: Duration = Duration::from_secs(5);
/// Default lifetime of a rotated SKR kubeconfig
pub const DEFAULT_KUBECONFIG_ROTATION_PERIOD: Duration = Duration::from_secs(24 * 60 * 60);

/// Immutable configuration shared by every reconcile
#[derive(Clone, Debug)]
pub struct FsmConfig {
    /// Converter settings
    pub converter: ConverterConfig,
    /// Audit log tenants per provider and region
    pub audit_log_table: AuditLogTable,
    /// Wait between polls of a Shoot operation
    pub gardener_requeue: Duration,
    /// Wait between polls of the kubeconfig and SKR configuration
    pub control_plane_requeue: Duration,
    /// Wait between polls during deprovisioning
    pub control_plane_delete_requeue: Duration,
    /// Upper bound on a single API call
    pub request_timeout: Duration,
    /// Lifetime of a rotated SKR kubeconfig, for the expiration metric
    pub kubeconfig_rotation_period: Duration,
    /// Install the runtime bootstrapper after configuring administrators
    pub bootstrapper_enabled: bool,
}

impl FsmConfig {
    /// Configuration with default durations
    pub fn new(converter: ConverterConfig) -> Self {
        Self {
            converter,
            audit_log_table: AuditLogTable::default(),
            gardener_requeue: DEFAULT_GARDENER_REQUEUE,
            control_plane_requeue: DEFAULT_CONTROL_PLANE_REQUEUE,
            control_plane_delete_requeue: DEFAULT_CONTROL_PLANE_DELETE_REQUEUE,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            kubeconfig_rotation_period: DEFAULT_KUBECONFIG_ROTATION_PERIOD,
            bootstrapper_enabled: false,
        }
    }

    /// Namespace the Shoots live in
    pub fn shoot_namespace(&self) -> String {
        kim_common::garden_namespace(&self.converter.gardener.project_name)
    }

    /// Whether API server authentication uses a structured auth ConfigMap
    pub fn structured_auth(&self) -> bool {
        self.converter.features.structured_auth
    }

    /// Whether registry cache secrets are synchronised to the garden
    pub fn registry_cache(&self) -> bool {
        self.converter.features.registry_cache
    }
}
