//! Access to Shoots and supporting objects in the garden namespace

use async_trait::async_trait;
use k8s_openapi::api::core::v1::{ConfigMap, Secret};
use kube::api::{Api, DeleteParams, ListParams, Patch, PatchParams, PostParams};
use kube::{Client, ResourceExt};
use serde_json::json;

#[cfg(test)]
use mockall::automock;

use kim_common::crd::Shoot;
use kim_common::{labels, Error, FIELD_MANAGER};

/// Garden operations used by the state machine. All objects live in the
/// project namespace the client was created for.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait GardenClient: Send + Sync {
    /// Get a Shoot; `None` when it does not exist
    async fn get_shoot(&self, name: &str) -> Result<Option<Shoot>, Error>;

    /// Create a Shoot
    async fn create_shoot(&self, shoot: &Shoot) -> Result<Shoot, Error>;

    /// Replace a Shoot. The object must carry the resource version it was
    /// read with; a stale version fails with a conflict.
    async fn update_shoot(&self, shoot: &Shoot) -> Result<Shoot, Error>;

    /// Server-side apply the fields this manager owns
    async fn apply_shoot(&self, shoot: &Shoot) -> Result<(), Error>;

    /// Set the annotation Gardener requires before a Shoot can be deleted
    async fn confirm_shoot_deletion(&self, name: &str) -> Result<(), Error>;

    /// Delete a Shoot; absent Shoots are not an error
    async fn delete_shoot(&self, name: &str) -> Result<(), Error>;

    /// Server-side apply a ConfigMap
    async fn apply_config_map(&self, config_map: &ConfigMap) -> Result<(), Error>;

    /// Delete a ConfigMap; absent objects are not an error
    async fn delete_config_map(&self, name: &str) -> Result<(), Error>;

    /// Secrets labelled with a runtime id
    async fn list_runtime_secrets(&self, runtime_id: &str) -> Result<Vec<Secret>, Error>;

    /// Create a Secret
    async fn create_secret(&self, secret: &Secret) -> Result<(), Error>;

    /// Delete a Secret; absent objects are not an error
    async fn delete_secret(&self, name: &str) -> Result<(), Error>;
}

/// [`GardenClient`] backed by a kube client
pub struct GardenClientImpl {
    client: Client,
    namespace: String,
}

impl GardenClientImpl {
    /// Wrap a garden client for a project namespace
    pub fn new(client: Client, namespace: impl Into<String>) -> Self {
        Self {
            client,
            namespace: namespace.into(),
        }
    }

    fn api<K>(&self) -> Api<K>
    where
        K: kube::Resource<Scope = k8s_openapi::NamespaceResourceScope>,
        <K as kube::Resource>::DynamicType: Default,
    {
        Api::namespaced(self.client.clone(), &self.namespace)
    }
}

fn ignore_not_found(result: Result<(), kube::Error>) -> Result<(), Error> {
    match result {
        Err(kube::Error::Api(ae)) if ae.code == 404 => Ok(()),
        other => Ok(other?),
    }
}

fn apply_params() -> PatchParams {
    PatchParams::apply(FIELD_MANAGER).force()
}

#[async_trait]
impl GardenClient for GardenClientImpl {
    async fn get_shoot(&self, name: &str) -> Result<Option<Shoot>, Error> {
        Ok(self.api::<Shoot>().get_opt(name).await?)
    }

    async fn create_shoot(&self, shoot: &Shoot) -> Result<Shoot, Error> {
        let params = PostParams {
            field_manager: Some(FIELD_MANAGER.to_string()),
            ..Default::default()
        };
        Ok(self.api::<Shoot>().create(&params, shoot).await?)
    }

    async fn update_shoot(&self, shoot: &Shoot) -> Result<Shoot, Error> {
        let params = PostParams {
            field_manager: Some(FIELD_MANAGER.to_string()),
            ..Default::default()
        };
        Ok(self
            .api::<Shoot>()
            .replace(&shoot.name_any(), &params, shoot)
            .await?)
    }

    async fn apply_shoot(&self, shoot: &Shoot) -> Result<(), Error> {
        self.api::<Shoot>()
            .patch(&shoot.name_any(), &apply_params(), &Patch::Apply(shoot))
            .await?;
        Ok(())
    }

    async fn confirm_shoot_deletion(&self, name: &str) -> Result<(), Error> {
        let patch = json!({
            "apiVersion": "core.gardener.cloud/v1beta1",
            "kind": "Shoot",
            "metadata": {
                "name": name,
                "namespace": self.namespace,
                "annotations": { labels::CONFIRM_DELETION: "true" },
            }
        });
        self.api::<Shoot>()
            .patch(name, &apply_params(), &Patch::Apply(&patch))
            .await?;
        Ok(())
    }

    async fn delete_shoot(&self, name: &str) -> Result<(), Error> {
        ignore_not_found(
            self.api::<Shoot>()
                .delete(name, &DeleteParams::default())
                .await
                .map(|_| ()),
        )
    }

    async fn apply_config_map(&self, config_map: &ConfigMap) -> Result<(), Error> {
        self.api::<ConfigMap>()
            .patch(
                &config_map.name_any(),
                &apply_params(),
                &Patch::Apply(config_map),
            )
            .await?;
        Ok(())
    }

    async fn delete_config_map(&self, name: &str) -> Result<(), Error> {
        ignore_not_found(
            self.api::<ConfigMap>()
                .delete(name, &DeleteParams::default())
                .await
                .map(|_| ()),
        )
    }

    async fn list_runtime_secrets(&self, runtime_id: &str) -> Result<Vec<Secret>, Error> {
        let params = ListParams::default().labels(&labels::selector(labels::RUNTIME_ID, runtime_id));
        Ok(self.api::<Secret>().list(&params).await?.items)
    }

    async fn create_secret(&self, secret: &Secret) -> Result<(), Error> {
        let params = PostParams {
            field_manager: Some(FIELD_MANAGER.to_string()),
            ..Default::default()
        };
        self.api::<Secret>().create(&params, secret).await?;
        Ok(())
    }

    async fn delete_secret(&self, name: &str) -> Result<(), Error> {
        ignore_not_found(
            self.api::<Secret>()
                .delete(name, &DeleteParams::default())
                .await
                .map(|_| ()),
        )
    }
}
