//! Common types for the Kyma infrastructure manager: CRDs, errors, and utilities

#![deny(missing_docs)]

pub mod crd;
pub mod error;
pub mod kube_utils;
pub mod labels;
pub mod metrics;
pub mod telemetry;

pub use error::Error;

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Field manager for server-side apply of KIM-owned fields
pub const FIELD_MANAGER: &str = "kim";

/// Field manager used when installing the runtime bootstrapper
pub const BOOTSTRAPPER_FIELD_MANAGER: &str = "kim-bootstrapper";

/// Namespace holding Runtime and GardenerCluster objects on the KCP
pub const KCP_SYSTEM_NAMESPACE: &str = "kcp-system";

/// Namespace for Kyma system resources on the SKR
pub const KYMA_SYSTEM_NAMESPACE: &str = "kyma-system";

/// Finalizer guarding Shoot teardown on Runtime objects
pub const RUNTIME_FINALIZER: &str = "runtime-controller.infrastructure-manager.kyma-project.io/deletion-hook";

/// Name of the garden namespace for a Gardener project
pub fn garden_namespace(project: &str) -> String {
    format!("garden-{project}")
}
