//! Access to Runtime, GardenerCluster and supporting objects on the KCP

use async_trait::async_trait;
use k8s_openapi::api::core::v1::{ConfigMap, Secret};
use kube::api::{Api, DeleteParams, Patch, PatchParams, PostParams};
use kube::Client;
use serde_json::json;

#[cfg(test)]
use mockall::automock;

use kim_common::crd::{GardenerCluster, GardenerClusterSpec, Runtime, RuntimeStatus};
use kim_common::{Error, FIELD_MANAGER};

/// KCP operations used by the state machine
#[cfg_attr(test, automock)]
#[async_trait]
pub trait KcpClient: Send + Sync {
    /// Get a Runtime; `None` when it no longer exists
    async fn get_runtime(&self, namespace: &str, name: &str) -> Result<Option<Runtime>, Error>;

    /// Replace the status of a Runtime
    async fn patch_runtime_status(
        &self,
        namespace: &str,
        name: &str,
        status: &RuntimeStatus,
    ) -> Result<(), Error>;

    /// Add a finalizer to a Runtime
    async fn add_finalizer(&self, namespace: &str, name: &str, finalizer: &str)
        -> Result<(), Error>;

    /// Remove a finalizer from a Runtime
    async fn remove_finalizer(
        &self,
        namespace: &str,
        name: &str,
        finalizer: &str,
    ) -> Result<(), Error>;

    /// Set an annotation on a Runtime
    async fn set_runtime_annotation(
        &self,
        namespace: &str,
        name: &str,
        key: &str,
        value: &str,
    ) -> Result<(), Error>;

    /// Remove an annotation from a Runtime
    async fn remove_runtime_annotation(
        &self,
        namespace: &str,
        name: &str,
        key: &str,
    ) -> Result<(), Error>;

    /// Get a GardenerCluster
    async fn get_gardener_cluster(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<GardenerCluster>, Error>;

    /// Create a GardenerCluster
    async fn create_gardener_cluster(&self, cluster: &GardenerCluster) -> Result<(), Error>;

    /// Replace the spec of a GardenerCluster
    async fn update_gardener_cluster_spec(
        &self,
        namespace: &str,
        name: &str,
        spec: &GardenerClusterSpec,
    ) -> Result<(), Error>;

    /// Delete a GardenerCluster; absent objects are not an error
    async fn delete_gardener_cluster(&self, namespace: &str, name: &str) -> Result<(), Error>;

    /// Get a Secret
    async fn get_secret(&self, namespace: &str, name: &str) -> Result<Option<Secret>, Error>;

    /// Get a ConfigMap
    async fn get_config_map(&self, namespace: &str, name: &str)
        -> Result<Option<ConfigMap>, Error>;
}

/// [`KcpClient`] backed by a kube client
pub struct KcpClientImpl {
    client: Client,
}

impl KcpClientImpl {
    /// Wrap a KCP client
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn runtimes(&self, namespace: &str) -> Api<Runtime> {
        Api::namespaced(self.client.clone(), namespace)
    }

    fn gardener_clusters(&self, namespace: &str) -> Api<GardenerCluster> {
        Api::namespaced(self.client.clone(), namespace)
    }
}

#[async_trait]
impl KcpClient for KcpClientImpl {
    async fn get_runtime(&self, namespace: &str, name: &str) -> Result<Option<Runtime>, Error> {
        Ok(self.runtimes(namespace).get_opt(name).await?)
    }

    async fn patch_runtime_status(
        &self,
        namespace: &str,
        name: &str,
        status: &RuntimeStatus,
    ) -> Result<(), Error> {
        let patch = json!({ "status": status });
        self.runtimes(namespace)
            .patch_status(name, &PatchParams::default(), &Patch::Merge(&patch))
            .await?;
        Ok(())
    }

    async fn add_finalizer(
        &self,
        namespace: &str,
        name: &str,
        finalizer: &str,
    ) -> Result<(), Error> {
        let api = self.runtimes(namespace);
        let runtime = api.get(name).await?;
        let mut finalizers = runtime.metadata.finalizers.unwrap_or_default();
        if finalizers.iter().any(|f| f == finalizer) {
            return Ok(());
        }
        finalizers.push(finalizer.to_string());
        let patch = json!({ "metadata": { "finalizers": finalizers } });
        api.patch(name, &PatchParams::default(), &Patch::Merge(&patch))
            .await?;
        Ok(())
    }

    async fn remove_finalizer(
        &self,
        namespace: &str,
        name: &str,
        finalizer: &str,
    ) -> Result<(), Error> {
        let api = self.runtimes(namespace);
        let Some(runtime) = api.get_opt(name).await? else {
            return Ok(());
        };
        let finalizers: Vec<String> = runtime
            .metadata
            .finalizers
            .unwrap_or_default()
            .into_iter()
            .filter(|f| f != finalizer)
            .collect();
        let patch = json!({ "metadata": { "finalizers": finalizers } });
        api.patch(name, &PatchParams::default(), &Patch::Merge(&patch))
            .await?;
        Ok(())
    }

    async fn set_runtime_annotation(
        &self,
        namespace: &str,
        name: &str,
        key: &str,
        value: &str,
    ) -> Result<(), Error> {
        let patch = json!({ "metadata": { "annotations": { key: value } } });
        self.runtimes(namespace)
            .patch(name, &PatchParams::default(), &Patch::Merge(&patch))
            .await?;
        Ok(())
    }

    async fn remove_runtime_annotation(
        &self,
        namespace: &str,
        name: &str,
        key: &str,
    ) -> Result<(), Error> {
        // a null value deletes the key in a merge patch
        let patch = json!({ "metadata": { "annotations": { key: null } } });
        self.runtimes(namespace)
            .patch(name, &PatchParams::default(), &Patch::Merge(&patch))
            .await?;
        Ok(())
    }

    async fn get_gardener_cluster(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<GardenerCluster>, Error> {
        Ok(self.gardener_clusters(namespace).get_opt(name).await?)
    }

    async fn create_gardener_cluster(&self, cluster: &GardenerCluster) -> Result<(), Error> {
        let namespace = cluster.metadata.namespace.as_deref().ok_or_else(|| {
            Error::internal_with_context("create_gardener_cluster", "namespace is not set")
        })?;
        let params = PostParams {
            field_manager: Some(FIELD_MANAGER.to_string()),
            ..Default::default()
        };
        self.gardener_clusters(namespace)
            .create(&params, cluster)
            .await?;
        Ok(())
    }

    async fn update_gardener_cluster_spec(
        &self,
        namespace: &str,
        name: &str,
        spec: &GardenerClusterSpec,
    ) -> Result<(), Error> {
        let patch = json!({ "spec": spec });
        self.gardener_clusters(namespace)
            .patch(name, &PatchParams::default(), &Patch::Merge(&patch))
            .await?;
        Ok(())
    }

    async fn delete_gardener_cluster(&self, namespace: &str, name: &str) -> Result<(), Error> {
        match self
            .gardener_clusters(namespace)
            .delete(name, &DeleteParams::default())
            .await
        {
            Ok(_) => Ok(()),
            Err(kube::Error::Api(ae)) if ae.code == 404 => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn get_secret(&self, namespace: &str, name: &str) -> Result<Option<Secret>, Error> {
        let api: Api<Secret> = Api::namespaced(self.client.clone(), namespace);
        Ok(api.get_opt(name).await?)
    }

    async fn get_config_map(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<ConfigMap>, Error> {
        let api: Api<ConfigMap> = Api::namespaced(self.client.clone(), namespace);
        Ok(api.get_opt(name).await?)
    }
}
