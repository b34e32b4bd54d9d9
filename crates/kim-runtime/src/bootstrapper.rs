//! Runtime bootstrapper installation on the SKR
//!
//! The bootstrapper ships as a multi-document manifest. Its configuration
//! and optional image pull secret live on the KCP and are copied into
//! `kyma-system` under fixed names before the manifest is applied.

use std::sync::Arc;

use async_trait::async_trait;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{ConfigMap, Secret};
use kube::api::{DynamicObject, ObjectMeta};
use kube::ResourceExt;
use tracing::{debug, info};

#[cfg(test)]
use mockall::automock;

use kim_common::crd::Runtime;
use kim_common::kube_utils::{has_condition, parse_manifests};
use kim_common::{
    labels, Error, Result, BOOTSTRAPPER_FIELD_MANAGER, KCP_SYSTEM_NAMESPACE,
    KYMA_SYSTEM_NAMESPACE,
};

use crate::kcp::KcpClient;
use crate::skr::SkrClient;

/// KCP ConfigMap with the bootstrapper configuration
pub const KCP_CONFIG_NAME: &str = "rt-bootstrapper-kcp-config";
/// Name of the configuration on the SKR
pub const SKR_CONFIG_NAME: &str = "rt-bootstrapper-config";
/// Name of the pull secret on the SKR
pub const SKR_PULL_SECRET_NAME: &str = "registry-credentials";

const DEPLOYMENT_AVAILABLE: &str = "Available";
const DEPLOYMENT_PROGRESSING: &str = "Progressing";

/// Installation state of the bootstrapper on one SKR
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InstallationStatus {
    /// Deployment does not exist
    NotStarted,
    /// Deployment is rolling out
    InProgress,
    /// Deployment runs a different version than the manifest
    UpgradeNeeded,
    /// Deployment is available at the manifest version
    Ready,
    /// Deployment is neither available nor progressing
    Failed,
}

/// Installs the runtime bootstrapper and reports its state
#[cfg_attr(test, automock)]
#[async_trait]
pub trait BootstrapperInstaller: Send + Sync {
    /// Apply configuration, pull secret and manifest
    async fn install(&self, runtime: &Runtime, skr: Arc<dyn SkrClient>) -> Result<()>;

    /// Current installation state
    async fn status(&self, skr: Arc<dyn SkrClient>) -> Result<InstallationStatus>;
}

/// Settings for [`RuntimeBootstrapperInstaller`]
#[derive(Clone, Debug)]
pub struct BootstrapperConfig {
    /// Multi-document manifest with the bootstrapper resources
    pub manifests: String,
    /// Namespace of the bootstrapper Deployment
    pub deployment_namespace: String,
    /// Name of the bootstrapper Deployment
    pub deployment_name: String,
    /// KCP secret with image pull credentials, if the registry is private
    pub pull_secret_name: Option<String>,
}

/// [`BootstrapperInstaller`] applying a manifest read at startup
pub struct RuntimeBootstrapperInstaller {
    kcp: Arc<dyn KcpClient>,
    objects: Vec<DynamicObject>,
    deployment_namespace: String,
    deployment_name: String,
    version: Option<String>,
    pull_secret_name: Option<String>,
}

impl RuntimeBootstrapperInstaller {
    /// Parse the manifest and locate the bootstrapper Deployment in it
    pub fn new(kcp: Arc<dyn KcpClient>, config: BootstrapperConfig) -> Result<Self> {
        let objects = parse_manifests(&config.manifests)?;
        let deployment = objects
            .iter()
            .find(|o| {
                o.types.as_ref().is_some_and(|t| t.kind == "Deployment")
                    && o.name_any() == config.deployment_name
            })
            .ok_or_else(|| {
                Error::config(format!(
                    "bootstrapper manifest has no Deployment {}",
                    config.deployment_name
                ))
            })?;
        let version = deployment.labels().get(labels::APP_VERSION).cloned();

        Ok(Self {
            kcp,
            objects,
            deployment_namespace: config.deployment_namespace,
            deployment_name: config.deployment_name,
            version,
            pull_secret_name: config.pull_secret_name,
        })
    }

    async fn config_map(&self) -> Result<ConfigMap> {
        let source = self
            .kcp
            .get_config_map(KCP_SYSTEM_NAMESPACE, KCP_CONFIG_NAME)
            .await?
            .ok_or_else(|| Error::not_found("ConfigMap", KCP_CONFIG_NAME))?;
        Ok(ConfigMap {
            metadata: ObjectMeta {
                name: Some(SKR_CONFIG_NAME.to_string()),
                namespace: Some(KYMA_SYSTEM_NAMESPACE.to_string()),
                ..Default::default()
            },
            data: source.data,
            ..Default::default()
        })
    }

    async fn pull_secret(&self) -> Result<Option<Secret>> {
        let Some(name) = &self.pull_secret_name else {
            return Ok(None);
        };
        let source = self
            .kcp
            .get_secret(KCP_SYSTEM_NAMESPACE, name)
            .await?
            .ok_or_else(|| Error::not_found("Secret", name))?;
        Ok(Some(Secret {
            metadata: ObjectMeta {
                name: Some(SKR_PULL_SECRET_NAME.to_string()),
                namespace: Some(KYMA_SYSTEM_NAMESPACE.to_string()),
                ..Default::default()
            },
            data: source.data,
            type_: source.type_,
            ..Default::default()
        }))
    }

    fn status_of(&self, deployment: &Deployment) -> InstallationStatus {
        let desired = deployment
            .spec
            .as_ref()
            .and_then(|s| s.replicas)
            .unwrap_or(1);
        let status = deployment.status.as_ref();
        let ready = status.and_then(|s| s.ready_replicas).unwrap_or(0);
        let conditions = status.and_then(|s| s.conditions.as_deref());

        if ready >= desired && has_condition(conditions, DEPLOYMENT_AVAILABLE) {
            let running = deployment.labels().get(labels::APP_VERSION);
            if self.version.is_some() && running != self.version.as_ref() {
                return InstallationStatus::UpgradeNeeded;
            }
            return InstallationStatus::Ready;
        }
        if has_condition(conditions, DEPLOYMENT_PROGRESSING) {
            return InstallationStatus::InProgress;
        }
        InstallationStatus::Failed
    }
}

#[async_trait]
impl BootstrapperInstaller for RuntimeBootstrapperInstaller {
    async fn install(&self, runtime: &Runtime, skr: Arc<dyn SkrClient>) -> Result<()> {
        let runtime_id = runtime.runtime_id()?;
        info!(runtime_id, version = ?self.version, "installing runtime bootstrapper");

        skr.ensure_namespace(KYMA_SYSTEM_NAMESPACE).await?;
        skr.apply_config_map(&self.config_map().await?, BOOTSTRAPPER_FIELD_MANAGER)
            .await?;
        if let Some(secret) = self.pull_secret().await? {
            skr.apply_secret(&secret, BOOTSTRAPPER_FIELD_MANAGER).await?;
        }
        skr.apply_objects(&self.objects, BOOTSTRAPPER_FIELD_MANAGER)
            .await
    }

    async fn status(&self, skr: Arc<dyn SkrClient>) -> Result<InstallationStatus> {
        let status = match skr
            .get_deployment(&self.deployment_namespace, &self.deployment_name)
            .await?
        {
            None => InstallationStatus::NotStarted,
            Some(deployment) => self.status_of(&deployment),
        };
        debug!(?status, "runtime bootstrapper status");
        Ok(status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kcp::MockKcpClient;
    use crate::skr::MockSkrClient;
    use crate::test_fixtures::runtime;
    use k8s_openapi::api::apps::v1::{DeploymentCondition, DeploymentSpec, DeploymentStatus};
    use std::collections::BTreeMap;

    const MANIFEST: &str = r#"
apiVersion: v1
kind: ServiceAccount
metadata:
  name: rt-bootstrapper
  namespace: kyma-system
---
apiVersion: apps/v1
kind: Deployment
metadata:
  name: rt-bootstrapper
  namespace: kyma-system
  labels:
    app.kubernetes.io/version: "1.2.0"
"#;

    fn config(pull_secret: Option<&str>) -> BootstrapperConfig {
        BootstrapperConfig {
            manifests: MANIFEST.to_string(),
            deployment_namespace: KYMA_SYSTEM_NAMESPACE.to_string(),
            deployment_name: "rt-bootstrapper".to_string(),
            pull_secret_name: pull_secret.map(str::to_string),
        }
    }

    fn installer(kcp: MockKcpClient, pull_secret: Option<&str>) -> RuntimeBootstrapperInstaller {
        RuntimeBootstrapperInstaller::new(Arc::new(kcp), config(pull_secret)).unwrap()
    }

    fn deployment(version: &str, ready: i32, conditions: &[(&str, &str)]) -> Deployment {
        let mut d = Deployment {
            spec: Some(DeploymentSpec {
                replicas: Some(1),
                ..Default::default()
            }),
            status: Some(DeploymentStatus {
                ready_replicas: Some(ready),
                conditions: Some(
                    conditions
                        .iter()
                        .map(|(t, s)| DeploymentCondition {
                            type_: t.to_string(),
                            status: s.to_string(),
                            ..Default::default()
                        })
                        .collect(),
                ),
                ..Default::default()
            }),
            ..Default::default()
        };
        d.metadata.labels = Some(BTreeMap::from([(
            labels::APP_VERSION.to_string(),
            version.to_string(),
        )]));
        d
    }

    #[test]
    fn manifest_without_deployment_is_rejected() {
        let mut cfg = config(None);
        cfg.deployment_name = "other".to_string();
        let err = RuntimeBootstrapperInstaller::new(Arc::new(MockKcpClient::new()), cfg);
        assert!(matches!(err, Err(Error::Config { .. })));
    }

    #[test]
    fn deployment_states_map_to_installation_status() {
        let installer = installer(MockKcpClient::new(), None);

        let available = deployment("1.2.0", 1, &[("Available", "True")]);
        assert_eq!(installer.status_of(&available), InstallationStatus::Ready);

        let old = deployment("1.1.0", 1, &[("Available", "True")]);
        assert_eq!(installer.status_of(&old), InstallationStatus::UpgradeNeeded);

        let rolling = deployment("1.2.0", 0, &[("Progressing", "True")]);
        assert_eq!(installer.status_of(&rolling), InstallationStatus::InProgress);

        let broken = deployment("1.2.0", 0, &[("Progressing", "False")]);
        assert_eq!(installer.status_of(&broken), InstallationStatus::Failed);
    }

    #[tokio::test]
    async fn missing_deployment_is_not_started() {
        let installer = installer(MockKcpClient::new(), None);
        let mut skr = MockSkrClient::new();
        skr.expect_get_deployment().returning(|_, _| Ok(None));

        let status = installer.status(Arc::new(skr)).await.unwrap();
        assert_eq!(status, InstallationStatus::NotStarted);
    }

    #[tokio::test]
    async fn install_copies_config_and_pull_secret_then_applies_manifest() {
        let mut kcp = MockKcpClient::new();
        kcp.expect_get_config_map()
            .withf(|ns, name| ns == KCP_SYSTEM_NAMESPACE && name == KCP_CONFIG_NAME)
            .returning(|_, _| {
                Ok(Some(ConfigMap {
                    data: Some(BTreeMap::from([("k".to_string(), "v".to_string())])),
                    ..Default::default()
                }))
            });
        kcp.expect_get_secret()
            .withf(|_, name| name == "kcp-pull")
            .returning(|_, _| Ok(Some(Secret::default())));

        let mut skr = MockSkrClient::new();
        skr.expect_ensure_namespace().returning(|_| Ok(()));
        skr.expect_apply_config_map()
            .withf(|cm, fm| {
                cm.metadata.name.as_deref() == Some(SKR_CONFIG_NAME)
                    && fm == BOOTSTRAPPER_FIELD_MANAGER
            })
            .times(1)
            .returning(|_, _| Ok(()));
        skr.expect_apply_secret()
            .withf(|s, _| s.metadata.name.as_deref() == Some(SKR_PULL_SECRET_NAME))
            .times(1)
            .returning(|_, _| Ok(()));
        skr.expect_apply_objects()
            .withf(|objects, _| objects.len() == 2)
            .times(1)
            .returning(|_, _| Ok(()));

        installer(kcp, Some("kcp-pull"))
            .install(&runtime("rt-1"), Arc::new(skr))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn missing_kcp_config_fails_install() {
        let mut kcp = MockKcpClient::new();
        kcp.expect_get_config_map().returning(|_, _| Ok(None));
        let mut skr = MockSkrClient::new();
        skr.expect_ensure_namespace().returning(|_| Ok(()));

        let err = installer(kcp, None)
            .install(&runtime("rt-1"), Arc::new(skr))
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }
}
