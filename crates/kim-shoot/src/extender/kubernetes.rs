//! Kubernetes version, kubelet feature gates and API server runtime config

use kim_common::crd::{KubeApiServerConfig, KubeletConfig};
use kim_common::Result;

use super::Extender;
use crate::config::KubernetesConfig;
use crate::version::KubernetesVersion;

/// Resolve the version to write.
///
/// The Runtime's version wins over the configured default, but a version
/// already running on the Shoot is never downgraded.
pub fn resolve_version(
    requested: Option<&str>,
    default_version: &str,
    current: Option<&str>,
) -> Result<String> {
    let target: KubernetesVersion = requested.unwrap_or(default_version).parse()?;
    if let Some(current) = current {
        let current: KubernetesVersion = current.parse()?;
        if current > target {
            return Ok(current.as_str().to_string());
        }
    }
    Ok(target.as_str().to_string())
}

/// Version, static token kubeconfig, kubelet gates and runtime config
pub fn new_kubernetes_extender<'a>(
    config: &'a KubernetesConfig,
    current_version: Option<&'a str>,
) -> Extender<'a> {
    Box::new(move |runtime, shoot| {
        let version = resolve_version(
            runtime.spec.shoot.kubernetes.version.as_deref(),
            &config.default_version,
            current_version,
        )?;
        shoot.spec.kubernetes.version = Some(version);
        shoot.spec.kubernetes.enable_static_token_kubeconfig = Some(false);

        if !config.kubelet_feature_gates.is_empty() {
            shoot
                .spec
                .kubernetes
                .kubelet
                .get_or_insert_with(KubeletConfig::default)
                .feature_gates = Some(config.kubelet_feature_gates.clone());
        }

        if !config.api_server_runtime_config.is_empty() {
            shoot
                .spec
                .kubernetes
                .kube_api_server
                .get_or_insert_with(KubeApiServerConfig::default)
                .runtime_config = Some(config.api_server_runtime_config.clone());
        }
        Ok(())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extender::testing::runtime;
    use kim_common::crd::{Shoot, ShootSpec};

    #[test]
    fn default_version_applies_when_runtime_has_none() {
        assert_eq!(resolve_version(None, "1.31", None).unwrap(), "1.31");
        assert_eq!(resolve_version(Some("1.30"), "1.31", None).unwrap(), "1.30");
    }

    #[test]
    fn running_version_is_never_downgraded() {
        assert_eq!(
            resolve_version(Some("1.30"), "1.31", Some("1.31.2")).unwrap(),
            "1.31.2"
        );
        assert_eq!(
            resolve_version(Some("1.32"), "1.31", Some("1.31.2")).unwrap(),
            "1.32"
        );
    }

    #[test]
    fn invalid_version_fails() {
        assert!(resolve_version(Some("latest"), "1.31", None).is_err());
    }

    #[test]
    fn writes_gates_and_runtime_config_only_when_configured() {
        let rt = runtime("aws");
        let mut config = KubernetesConfig {
            default_version: "1.31".to_string(),
            ..Default::default()
        };
        let mut shoot = Shoot::new("", ShootSpec::default());
        new_kubernetes_extender(&config, None)(&rt, &mut shoot).unwrap();
        assert_eq!(shoot.spec.kubernetes.version.as_deref(), Some("1.31"));
        assert_eq!(shoot.spec.kubernetes.enable_static_token_kubeconfig, Some(false));
        assert!(shoot.spec.kubernetes.kubelet.is_none());
        assert!(shoot.spec.kubernetes.kube_api_server.is_none());

        config
            .kubelet_feature_gates
            .insert("ImageVolume".to_string(), true);
        config
            .api_server_runtime_config
            .insert("resource.k8s.io/v1beta1".to_string(), true);
        let mut shoot = Shoot::new("", ShootSpec::default());
        new_kubernetes_extender(&config, None)(&rt, &mut shoot).unwrap();
        let gates = shoot.spec.kubernetes.kubelet.unwrap().feature_gates.unwrap();
        assert_eq!(gates.get("ImageVolume"), Some(&true));
        assert!(shoot
            .spec
            .kubernetes
            .kube_api_server
            .unwrap()
            .runtime_config
            .is_some());
    }
}
