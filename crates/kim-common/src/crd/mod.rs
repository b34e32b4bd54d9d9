//! Custom Resource Definitions used by the infrastructure manager
//!
//! `Runtime` and `GardenerCluster` are owned by the KCP; `Shoot` and
//! `OpenIDConnect` are Gardener types written to the garden cluster and the
//! SKR respectively.

mod gardener_cluster;
mod openid_connect;
mod runtime;
mod shoot;
mod types;

pub use gardener_cluster::{
    GardenerCluster, GardenerClusterSpec, GardenerClusterState, GardenerClusterStatus,
    KubeconfigSpec, SecretKeyRef, ShootRef,
};
pub use openid_connect::{OpenIDConnect, OpenIdConnectSpec};
pub use runtime::{
    Filter, FilterToggle, ImageRegistryCache, NetworkingSecurity, RegistryCacheConfig,
    RegistryCacheGarbageCollection, RegistryCacheVolume, Runtime, RuntimeApiServer,
    RuntimeConditionReason, RuntimeConditionType, RuntimeKubernetes, RuntimeNetworking,
    RuntimeProvider, RuntimeShoot, RuntimeSpec, RuntimeState, RuntimeStatus, Security,
};
pub use shoot::{
    AuditConfig, AuditPolicy, ControlPlane, CrossVersionObjectReference, Dns, DnsProvider,
    Extension, FailureTolerance, HighAvailability, KubeApiServerConfig, KubeletConfig, Kubernetes,
    LastError, LastOperation, LastOperationState, LastOperationType, LocalObjectReference,
    Machine, MachineImage, Maintenance, MaintenanceAutoUpdate, MaintenanceTimeWindow,
    NamedResourceReference, Networking, OidcConfig, Provider, SeedSelector, Shoot, ShootSpec,
    ShootStatus, StructuredAuthentication, Toleration, Volume, Worker,
};
pub use types::{
    find_condition, set_condition, Condition, ConditionStatus, IntOrString, ProviderType,
};
