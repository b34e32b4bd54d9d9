//! Access to a runtime's own cluster (SKR) through its kubeconfig secret

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{ConfigMap, Secret};
use k8s_openapi::api::rbac::v1::ClusterRoleBinding;
use kube::api::{Api, DeleteParams, DynamicObject, ListParams, Patch, PatchParams, PostParams};
use kube::{Client, ResourceExt};
use tracing::debug;

#[cfg(test)]
use mockall::automock;

use kim_common::crd::{OpenIDConnect, Runtime};
use kim_common::kube_utils::{build_api_resource, client_from_kubeconfig_bytes, ensure_namespace};
use kim_common::{labels, Error, KCP_SYSTEM_NAMESPACE};

use crate::kcp::KcpClient;

/// Name of the KCP secret holding the kubeconfig of a runtime
pub fn kubeconfig_secret_name(runtime_id: &str) -> String {
    format!("kubeconfig-{runtime_id}")
}

/// Key of the kubeconfig within its secret
pub const KUBECONFIG_SECRET_KEY: &str = "config";

/// SKR operations used by the state machine
#[cfg_attr(test, automock)]
#[async_trait]
pub trait SkrClient: Send + Sync {
    /// Create a namespace if it does not exist
    async fn ensure_namespace(&self, name: &str) -> Result<(), Error>;

    /// Server-side apply a ConfigMap
    async fn apply_config_map(&self, config_map: &ConfigMap, field_manager: &str)
        -> Result<(), Error>;

    /// Server-side apply a Secret
    async fn apply_secret(&self, secret: &Secret, field_manager: &str) -> Result<(), Error>;

    /// Get a Secret
    async fn get_secret(&self, namespace: &str, name: &str) -> Result<Option<Secret>, Error>;

    /// Delete every OpenIDConnect carrying the managed-by label
    async fn delete_managed_oidcs(&self) -> Result<(), Error>;

    /// Create an OpenIDConnect
    async fn create_oidc(&self, oidc: &OpenIDConnect) -> Result<(), Error>;

    /// ClusterRoleBindings of the cluster
    async fn list_cluster_role_bindings(&self) -> Result<Vec<ClusterRoleBinding>, Error>;

    /// Create a ClusterRoleBinding
    async fn create_cluster_role_binding(&self, binding: &ClusterRoleBinding)
        -> Result<(), Error>;

    /// Delete a ClusterRoleBinding; absent objects are not an error
    async fn delete_cluster_role_binding(&self, name: &str) -> Result<(), Error>;

    /// Server-side apply untyped objects, in order
    async fn apply_objects(&self, objects: &[DynamicObject], field_manager: &str)
        -> Result<(), Error>;

    /// Get a Deployment
    async fn get_deployment(&self, namespace: &str, name: &str)
        -> Result<Option<Deployment>, Error>;
}

/// [`SkrClient`] backed by a kube client
pub struct SkrClientImpl {
    client: Client,
}

impl SkrClientImpl {
    /// Wrap an SKR client
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl SkrClient for SkrClientImpl {
    async fn ensure_namespace(&self, name: &str) -> Result<(), Error> {
        ensure_namespace(&self.client, name, kim_common::FIELD_MANAGER).await?;
        Ok(())
    }

    async fn apply_config_map(
        &self,
        config_map: &ConfigMap,
        field_manager: &str,
    ) -> Result<(), Error> {
        let namespace = config_map.namespace().unwrap_or_default();
        let api: Api<ConfigMap> = Api::namespaced(self.client.clone(), &namespace);
        api.patch(
            &config_map.name_any(),
            &PatchParams::apply(field_manager).force(),
            &Patch::Apply(config_map),
        )
        .await?;
        Ok(())
    }

    async fn apply_secret(&self, secret: &Secret, field_manager: &str) -> Result<(), Error> {
        let namespace = secret.namespace().unwrap_or_default();
        let api: Api<Secret> = Api::namespaced(self.client.clone(), &namespace);
        api.patch(
            &secret.name_any(),
            &PatchParams::apply(field_manager).force(),
            &Patch::Apply(secret),
        )
        .await?;
        Ok(())
    }

    async fn get_secret(&self, namespace: &str, name: &str) -> Result<Option<Secret>, Error> {
        let api: Api<Secret> = Api::namespaced(self.client.clone(), namespace);
        Ok(api.get_opt(name).await?)
    }

    async fn delete_managed_oidcs(&self) -> Result<(), Error> {
        let api: Api<OpenIDConnect> = Api::all(self.client.clone());
        let params = ListParams::default()
            .labels(&labels::selector(labels::MANAGED_BY, labels::MANAGED_BY_VALUE));
        api.delete_collection(&DeleteParams::default(), &params)
            .await?;
        Ok(())
    }

    async fn create_oidc(&self, oidc: &OpenIDConnect) -> Result<(), Error> {
        let api: Api<OpenIDConnect> = Api::all(self.client.clone());
        api.create(&PostParams::default(), oidc).await?;
        Ok(())
    }

    async fn list_cluster_role_bindings(&self) -> Result<Vec<ClusterRoleBinding>, Error> {
        let api: Api<ClusterRoleBinding> = Api::all(self.client.clone());
        Ok(api.list(&ListParams::default()).await?.items)
    }

    async fn create_cluster_role_binding(
        &self,
        binding: &ClusterRoleBinding,
    ) -> Result<(), Error> {
        let api: Api<ClusterRoleBinding> = Api::all(self.client.clone());
        api.create(&PostParams::default(), binding).await?;
        Ok(())
    }

    async fn delete_cluster_role_binding(&self, name: &str) -> Result<(), Error> {
        let api: Api<ClusterRoleBinding> = Api::all(self.client.clone());
        match api.delete(name, &DeleteParams::default()).await {
            Ok(_) => Ok(()),
            Err(kube::Error::Api(ae)) if ae.code == 404 => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn apply_objects(
        &self,
        objects: &[DynamicObject],
        field_manager: &str,
    ) -> Result<(), Error> {
        let params = PatchParams::apply(field_manager).force();
        for object in objects {
            let types = object.types.as_ref().ok_or_else(|| {
                Error::serialization("object is missing apiVersion or kind")
            })?;
            let resource = build_api_resource(&types.api_version, &types.kind);
            let api: Api<DynamicObject> = match object.namespace() {
                Some(namespace) => {
                    Api::namespaced_with(self.client.clone(), &namespace, &resource)
                }
                None => Api::all_with(self.client.clone(), &resource),
            };
            let name = object.name_any();
            debug!(kind = %types.kind, name = %name, "applying object");
            api.patch(&name, &params, &Patch::Apply(object)).await?;
        }
        Ok(())
    }

    async fn get_deployment(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<Deployment>, Error> {
        let api: Api<Deployment> = Api::namespaced(self.client.clone(), namespace);
        Ok(api.get_opt(name).await?)
    }
}

/// Produces an [`SkrClient`] for a runtime
#[cfg_attr(test, automock)]
#[async_trait]
pub trait SkrClientResolver: Send + Sync {
    /// Client for the runtime's cluster
    async fn resolve(&self, runtime: &Runtime) -> Result<Arc<dyn SkrClient>, Error>;
}

/// Builds SKR clients from the kubeconfig secret next to each Runtime,
/// written by the kubeconfig controller for its GardenerCluster
pub struct KubeconfigSecretResolver {
    kcp: Arc<dyn KcpClient>,
    request_timeout: Duration,
}

impl KubeconfigSecretResolver {
    /// Resolve kubeconfigs through the given KCP client
    pub fn new(kcp: Arc<dyn KcpClient>, request_timeout: Duration) -> Self {
        Self {
            kcp,
            request_timeout,
        }
    }

    /// Raw kubeconfig of a runtime
    async fn kubeconfig(&self, namespace: &str, runtime_id: &str) -> Result<Vec<u8>, Error> {
        let name = kubeconfig_secret_name(runtime_id);
        let secret = self
            .kcp
            .get_secret(namespace, &name)
            .await?
            .ok_or_else(|| Error::not_found("Secret", &name))?;
        secret
            .data
            .and_then(|mut data| data.remove(KUBECONFIG_SECRET_KEY))
            .map(|bytes| bytes.0)
            .ok_or_else(|| Error::not_found("Secret key", format!("{name}/{KUBECONFIG_SECRET_KEY}")))
    }
}

#[async_trait]
impl SkrClientResolver for KubeconfigSecretResolver {
    async fn resolve(&self, runtime: &Runtime) -> Result<Arc<dyn SkrClient>, Error> {
        let runtime_id = runtime.runtime_id()?;
        let namespace = runtime
            .namespace()
            .unwrap_or_else(|| KCP_SYSTEM_NAMESPACE.to_string());
        let bytes = self.kubeconfig(&namespace, runtime_id).await?;
        let client = client_from_kubeconfig_bytes(runtime_id, &bytes, self.request_timeout).await?;
        Ok(Arc::new(SkrClientImpl::new(client)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kcp::MockKcpClient;
    use k8s_openapi::ByteString;
    use std::collections::BTreeMap;

    #[tokio::test]
    async fn missing_secret_is_not_found() {
        let mut kcp = MockKcpClient::new();
        kcp.expect_get_secret().returning(|_, _| Ok(None));
        let resolver = KubeconfigSecretResolver::new(Arc::new(kcp), Duration::from_secs(1));

        let err = resolver
            .kubeconfig(KCP_SYSTEM_NAMESPACE, "rt-1")
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn missing_key_is_not_found() {
        let mut kcp = MockKcpClient::new();
        kcp.expect_get_secret()
            .withf(|ns, name| ns == KCP_SYSTEM_NAMESPACE && name == "kubeconfig-rt-1")
            .returning(|_, _| {
                Ok(Some(Secret {
                    data: Some(BTreeMap::from([(
                        "other".to_string(),
                        ByteString(b"x".to_vec()),
                    )])),
                    ..Default::default()
                }))
            });
        let resolver = KubeconfigSecretResolver::new(Arc::new(kcp), Duration::from_secs(1));

        let err = resolver
            .kubeconfig(KCP_SYSTEM_NAMESPACE, "rt-1")
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn kubeconfig_bytes_are_returned() {
        let mut kcp = MockKcpClient::new();
        kcp.expect_get_secret().returning(|_, _| {
            Ok(Some(Secret {
                data: Some(BTreeMap::from([(
                    KUBECONFIG_SECRET_KEY.to_string(),
                    ByteString(b"apiVersion: v1".to_vec()),
                )])),
                ..Default::default()
            }))
        });
        let resolver = KubeconfigSecretResolver::new(Arc::new(kcp), Duration::from_secs(1));

        let bytes = resolver
            .kubeconfig(KCP_SYSTEM_NAMESPACE, "rt-1")
            .await
            .unwrap();
        assert_eq!(bytes, b"apiVersion: v1");
    }
}
