//! GardenerCluster CRD: asks the kubeconfig controller for an SKR kubeconfig
//!
//! The infrastructure manager creates one per Runtime once the Shoot has a
//! domain; the kubeconfig controller writes the secret and flips the state.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::types::Condition;

/// GardenerCluster specification
#[derive(CustomResource, Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "infrastructuremanager.kyma-project.io",
    version = "v1",
    kind = "GardenerCluster",
    plural = "gardenerclusters",
    namespaced,
    status = "GardenerClusterStatus",
    printcolumn = r#"{"name":"State","type":"string","jsonPath":".status.state"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct GardenerClusterSpec {
    /// Where the kubeconfig is written
    pub kubeconfig: KubeconfigSpec,
    /// Shoot the kubeconfig is for
    pub shoot: ShootRef,
}

/// Kubeconfig target
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct KubeconfigSpec {
    /// Secret holding the kubeconfig
    pub secret: SecretKeyRef,
}

/// Secret and key
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SecretKeyRef {
    /// Secret name
    pub name: String,
    /// Secret namespace
    pub namespace: String,
    /// Data key
    pub key: String,
}

/// Shoot reference
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ShootRef {
    /// Shoot name
    pub name: String,
}

/// State reported by the kubeconfig controller
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub enum GardenerClusterState {
    /// Kubeconfig not yet written
    #[default]
    Pending,
    /// Kubeconfig secret is current
    Ready,
    /// Kubeconfig could not be written
    Error,
}

impl GardenerClusterState {
    /// State name
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "Pending",
            Self::Ready => "Ready",
            Self::Error => "Error",
        }
    }
}

/// GardenerCluster status
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GardenerClusterStatus {
    /// Current state
    #[serde(default)]
    pub state: GardenerClusterState,
    /// Conditions
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,
}

impl GardenerCluster {
    /// Current state; Pending until the controller reports one
    pub fn state(&self) -> GardenerClusterState {
        self.status.as_ref().map(|s| s.state).unwrap_or_default()
    }
}
