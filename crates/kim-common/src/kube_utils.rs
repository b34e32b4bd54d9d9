//! Shared Kubernetes utilities using kube-rs
//!
//! Client construction for the KCP, the garden cluster and SKRs, plus the
//! small helpers needed to apply untyped manifests.

use std::path::Path;
use std::time::Duration;

use k8s_openapi::api::core::v1::Namespace;
use kube::api::{Api, DynamicObject, Patch, PatchParams};
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::discovery::ApiResource;
use kube::{Client, Config};
use serde::Deserialize;
use tracing::debug;

use crate::Error;

/// Default connection timeout for kube clients
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
/// Upper bound on a single API call against KCP, garden or SKR
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(20);

const STATUS_TRUE: &str = "True";

/// Create a kube client from optional kubeconfig path with default timeouts
pub async fn create_client(kubeconfig: Option<&Path>) -> Result<Client, Error> {
    create_client_with_timeout(kubeconfig, DEFAULT_CONNECT_TIMEOUT, DEFAULT_REQUEST_TIMEOUT).await
}

/// Create a kube client from optional kubeconfig path with custom timeouts
///
/// Falls back to in-cluster / `KUBECONFIG` inference when no path is given.
pub async fn create_client_with_timeout(
    kubeconfig: Option<&Path>,
    connect_timeout: Duration,
    request_timeout: Duration,
) -> Result<Client, Error> {
    let mut config = match kubeconfig {
        Some(path) => {
            let kubeconfig = Kubeconfig::read_from(path).map_err(|e| {
                Error::internal_with_context(
                    "create_client",
                    format!("failed to read kubeconfig {}: {}", path.display(), e),
                )
            })?;
            Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
                .await
                .map_err(|e| {
                    Error::internal_with_context(
                        "create_client",
                        format!("failed to load kubeconfig: {}", e),
                    )
                })?
        }
        None => Config::infer().await.map_err(|e| {
            Error::internal_with_context("create_client", format!("failed to infer config: {}", e))
        })?,
    };
    apply_timeouts(&mut config, connect_timeout, request_timeout);
    Client::try_from(config).map_err(|e| {
        Error::internal_with_context("create_client", format!("failed to create client: {}", e))
    })
}

/// Create a client from kubeconfig bytes, as stored in an SKR kubeconfig secret
pub async fn client_from_kubeconfig_bytes(
    runtime_id: &str,
    bytes: &[u8],
    request_timeout: Duration,
) -> Result<Client, Error> {
    let yaml = std::str::from_utf8(bytes)
        .map_err(|e| Error::kubeconfig(runtime_id, format!("kubeconfig is not utf-8: {e}")))?;
    let kubeconfig = Kubeconfig::from_yaml(yaml)
        .map_err(|e| Error::kubeconfig(runtime_id, format!("failed to parse kubeconfig: {e}")))?;
    let mut config = Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
        .await
        .map_err(|e| Error::kubeconfig(runtime_id, format!("failed to load kubeconfig: {e}")))?;
    apply_timeouts(&mut config, DEFAULT_CONNECT_TIMEOUT, request_timeout);
    Client::try_from(config)
        .map_err(|e| Error::kubeconfig(runtime_id, format!("failed to create client: {e}")))
}

fn apply_timeouts(config: &mut Config, connect_timeout: Duration, request_timeout: Duration) {
    config.connect_timeout = Some(connect_timeout);
    config.read_timeout = Some(request_timeout);
    config.write_timeout = Some(request_timeout);
}

/// Check if a condition with the given type has status "True"
pub fn has_condition<T>(conditions: Option<&[T]>, condition_type: &str) -> bool
where
    T: HasConditionFields,
{
    conditions
        .map(|conds| {
            conds
                .iter()
                .any(|c| c.type_field() == condition_type && c.status_field() == STATUS_TRUE)
        })
        .unwrap_or(false)
}

/// Trait for types that have condition-like fields (type and status)
pub trait HasConditionFields {
    /// Get the condition type field value
    fn type_field(&self) -> &str;
    /// Get the condition status field value
    fn status_field(&self) -> &str;
}

impl HasConditionFields for k8s_openapi::api::apps::v1::DeploymentCondition {
    fn type_field(&self) -> &str {
        &self.type_
    }
    fn status_field(&self) -> &str {
        &self.status
    }
}

/// Ensure a namespace exists (idempotent).
///
/// Uses server-side apply so it never fails on "already exists".
pub async fn ensure_namespace(
    client: &Client,
    name: &str,
    field_manager: &str,
) -> Result<(), kube::Error> {
    let api: Api<Namespace> = Api::all(client.clone());
    let ns = serde_json::json!({
        "apiVersion": "v1",
        "kind": "Namespace",
        "metadata": { "name": name }
    });
    api.patch(name, &PatchParams::apply(field_manager), &Patch::Apply(&ns))
        .await?;
    debug!(namespace = name, "namespace ensured");
    Ok(())
}

/// Split an apiVersion into group and version (`v1` has an empty group)
pub fn parse_api_version(api_version: &str) -> (String, String) {
    match api_version.split_once('/') {
        Some((group, version)) => (group.to_string(), version.to_string()),
        None => (String::new(), api_version.to_string()),
    }
}

/// Build an ApiResource from an apiVersion and kind
pub fn build_api_resource(api_version: &str, kind: &str) -> ApiResource {
    let (group, version) = parse_api_version(api_version);
    ApiResource {
        group,
        version,
        kind: kind.to_string(),
        api_version: api_version.to_string(),
        plural: pluralize_kind(kind),
    }
}

/// Pluralize a Kubernetes resource kind
pub fn pluralize_kind(kind: &str) -> String {
    let lower = kind.to_lowercase();
    if lower.ends_with('s') || lower.ends_with("ch") || lower.ends_with("sh") {
        format!("{}es", lower)
    } else if lower.ends_with('y') && !lower.ends_with("ay") && !lower.ends_with("ey") {
        format!("{}ies", &lower[..lower.len() - 1])
    } else {
        format!("{}s", lower)
    }
}

/// Parse a multi-document YAML manifest into dynamic objects.
///
/// Empty documents are skipped. Every object must carry apiVersion and kind.
pub fn parse_manifests(manifests: &str) -> Result<Vec<DynamicObject>, Error> {
    let mut objects = Vec::new();
    for document in serde_yaml::Deserializer::from_str(manifests) {
        let value = serde_yaml::Value::deserialize(document)
            .map_err(|e| Error::serialization(format!("invalid manifest yaml: {e}")))?;
        if value.is_null() {
            continue;
        }
        let object: DynamicObject = serde_yaml::from_value(value)
            .map_err(|e| Error::serialization(format!("invalid manifest object: {e}")))?;
        if object.types.is_none() {
            return Err(Error::serialization(
                "manifest object is missing apiVersion or kind",
            ));
        }
        objects.push(object);
    }
    Ok(objects)
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::apps::v1::DeploymentCondition;

    fn condition(type_: &str, status: &str) -> DeploymentCondition {
        DeploymentCondition {
            type_: type_.to_string(),
            status: status.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn has_condition_checks_type_and_status() {
        let conds = vec![condition("Available", "True"), condition("Progressing", "False")];
        assert!(has_condition(Some(conds.as_slice()), "Available"));
        assert!(!has_condition(Some(conds.as_slice()), "Progressing"));
        assert!(!has_condition::<DeploymentCondition>(None, "Available"));
    }

    #[test]
    fn api_resource_for_core_and_grouped_kinds() {
        let ar = build_api_resource("v1", "ConfigMap");
        assert_eq!(ar.group, "");
        assert_eq!(ar.plural, "configmaps");

        let ar = build_api_resource("rbac.authorization.k8s.io/v1", "ClusterRoleBinding");
        assert_eq!(ar.group, "rbac.authorization.k8s.io");
        assert_eq!(ar.version, "v1");
        assert_eq!(ar.plural, "clusterrolebindings");
    }

    #[test]
    fn pluralize_edge_cases() {
        assert_eq!(pluralize_kind("Policy"), "policies");
        assert_eq!(pluralize_kind("Ingress"), "ingresses");
        assert_eq!(pluralize_kind("Gateway"), "gateways");
    }

    #[test]
    fn parse_manifests_skips_empty_documents() {
        let yaml = r#"
apiVersion: v1
kind: ServiceAccount
metadata:
  name: rt-bootstrapper
  namespace: kyma-system
---
---
apiVersion: apps/v1
kind: Deployment
metadata:
  name: rt-bootstrapper
  namespace: kyma-system
  labels:
    app.kubernetes.io/version: "1.2.0"
"#;
        let objects = parse_manifests(yaml).unwrap();
        assert_eq!(objects.len(), 2);
        assert_eq!(objects[1].types.as_ref().unwrap().kind, "Deployment");
    }

    #[test]
    fn parse_manifests_rejects_untyped_objects() {
        let err = parse_manifests("metadata:\n  name: x\n").unwrap_err();
        assert!(matches!(err, Error::Serialization { .. }));
    }
}
