//! Registry cache pull secrets copied from the SKR into the garden
//!
//! The registry-cache extension can only reference secrets in the garden
//! namespace, so the secret each cache names on the SKR is mirrored as
//! `reg-cache-<cache uid>`. Mirrored secrets are immutable; a changed
//! source is propagated by deleting and recreating the copy.

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::Secret;
use kube::api::ObjectMeta;
use kube::ResourceExt;
use tracing::{debug, info};

use kim_common::crd::{ImageRegistryCache, Runtime};
use kim_common::{labels, Error, Result};
use kim_shoot::extender::registry_cache::registry_cache_secret_name;

use crate::garden::GardenClient;
use crate::skr::SkrClient;

fn mirrored_secret(runtime_id: &str, cache: &ImageRegistryCache, source: &Secret) -> Secret {
    Secret {
        metadata: ObjectMeta {
            name: Some(registry_cache_secret_name(&cache.uid)),
            labels: Some(BTreeMap::from([(
                labels::RUNTIME_ID.to_string(),
                runtime_id.to_string(),
            )])),
            annotations: Some(BTreeMap::from([
                (labels::REGISTRY_CACHE_ID.to_string(), cache.uid.clone()),
                (labels::REGISTRY_CACHE_NAME.to_string(), cache.name.clone()),
                (
                    labels::REGISTRY_CACHE_NAMESPACE.to_string(),
                    cache.namespace.clone(),
                ),
            ])),
            ..Default::default()
        },
        data: source.data.clone(),
        immutable: Some(true),
        type_: source.type_.clone(),
        ..Default::default()
    }
}

/// Create or refresh the garden copy of every cache pull secret
pub async fn sync_registry_cache_secrets(
    runtime: &Runtime,
    garden: &dyn GardenClient,
    skr: &dyn SkrClient,
) -> Result<()> {
    let runtime_id = runtime.runtime_id()?;
    let existing: BTreeMap<String, Secret> = garden
        .list_runtime_secrets(runtime_id)
        .await?
        .into_iter()
        .map(|s| (s.name_any(), s))
        .collect();

    for cache in runtime.caches() {
        let Some(source_name) = cache
            .config
            .secret_reference_name
            .as_deref()
            .filter(|n| !n.is_empty())
        else {
            continue;
        };
        let source = skr
            .get_secret(&cache.namespace, source_name)
            .await?
            .ok_or_else(|| {
                Error::not_found("Secret", format!("{}/{}", cache.namespace, source_name))
            })?;
        let desired = mirrored_secret(runtime_id, cache, &source);
        let name = desired.name_any();

        match existing.get(&name) {
            Some(current) if current.data == desired.data => continue,
            Some(_) => {
                info!(runtime_id, secret = %name, "registry cache secret changed, recreating");
                garden.delete_secret(&name).await?;
            }
            None => debug!(runtime_id, secret = %name, "creating registry cache secret"),
        }
        garden.create_secret(&desired).await?;
    }
    Ok(())
}

/// Delete garden copies whose cache is no longer configured.
///
/// With `keep_current` unset every copy of the runtime is removed, as on
/// deprovisioning.
pub async fn prune_registry_cache_secrets(
    runtime: &Runtime,
    garden: &dyn GardenClient,
    keep_current: bool,
) -> Result<()> {
    let runtime_id = runtime.runtime_id()?;
    let configured: Vec<&str> = if keep_current {
        runtime
            .caches()
            .iter()
            .filter(|c| c.config.secret_reference_name.as_deref().is_some_and(|n| !n.is_empty()))
            .map(|c| c.uid.as_str())
            .collect()
    } else {
        Vec::new()
    };

    for secret in garden.list_runtime_secrets(runtime_id).await? {
        let cache_id = secret
            .annotations()
            .get(labels::REGISTRY_CACHE_ID)
            .map(String::as_str);
        if cache_id.is_some_and(|id| configured.contains(&id)) {
            continue;
        }
        let name = secret.name_any();
        info!(runtime_id, secret = %name, "deleting orphaned registry cache secret");
        garden.delete_secret(&name).await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::garden::MockGardenClient;
    use crate::skr::MockSkrClient;
    use crate::test_fixtures::{cache, runtime};
    use k8s_openapi::ByteString;
    use std::sync::{Arc, Mutex};

    fn secret_with(data: &[u8]) -> Secret {
        Secret {
            data: Some(BTreeMap::from([(
                ".dockerconfigjson".to_string(),
                ByteString(data.to_vec()),
            )])),
            ..Default::default()
        }
    }

    fn garden_copy(uid: &str, data: &[u8]) -> Secret {
        let mut rt = runtime("rt-1");
        rt.spec.caching = Some(vec![cache(uid, Some("pull"))]);
        mirrored_secret("rt-1", &rt.caches()[0], &secret_with(data))
    }

    #[tokio::test]
    async fn missing_copy_is_created_with_labels_and_annotations() {
        let mut rt = runtime("rt-1");
        rt.spec.caching = Some(vec![cache("uid-1", Some("pull")), cache("uid-2", None)]);

        let created = Arc::new(Mutex::new(Vec::new()));
        let created_clone = created.clone();
        let mut garden = MockGardenClient::new();
        garden.expect_list_runtime_secrets().returning(|_| Ok(vec![]));
        garden.expect_create_secret().returning(move |s| {
            created_clone.lock().unwrap().push(s.clone());
            Ok(())
        });
        let mut skr = MockSkrClient::new();
        skr.expect_get_secret()
            .withf(|ns, name| ns == "cache-ns" && name == "pull")
            .returning(|_, _| Ok(Some(secret_with(b"auth"))));

        sync_registry_cache_secrets(&rt, &garden, &skr).await.unwrap();

        let created = created.lock().unwrap();
        assert_eq!(created.len(), 1);
        let secret = &created[0];
        assert_eq!(secret.metadata.name.as_deref(), Some("reg-cache-uid-1"));
        assert_eq!(secret.immutable, Some(true));
        assert_eq!(secret.labels()[labels::RUNTIME_ID], "rt-1");
        assert_eq!(secret.annotations()[labels::REGISTRY_CACHE_ID], "uid-1");
        assert_eq!(secret.data, secret_with(b"auth").data);
    }

    #[tokio::test]
    async fn changed_source_recreates_copy() {
        let mut rt = runtime("rt-1");
        rt.spec.caching = Some(vec![cache("uid-1", Some("pull"))]);

        let mut garden = MockGardenClient::new();
        garden
            .expect_list_runtime_secrets()
            .returning(|_| Ok(vec![garden_copy("uid-1", b"old")]));
        garden
            .expect_delete_secret()
            .withf(|name| name == "reg-cache-uid-1")
            .times(1)
            .returning(|_| Ok(()));
        garden.expect_create_secret().times(1).returning(|_| Ok(()));
        let mut skr = MockSkrClient::new();
        skr.expect_get_secret()
            .returning(|_, _| Ok(Some(secret_with(b"new"))));

        sync_registry_cache_secrets(&rt, &garden, &skr).await.unwrap();
    }

    #[tokio::test]
    async fn unchanged_source_is_left_alone() {
        let mut rt = runtime("rt-1");
        rt.spec.caching = Some(vec![cache("uid-1", Some("pull"))]);

        let mut garden = MockGardenClient::new();
        garden
            .expect_list_runtime_secrets()
            .returning(|_| Ok(vec![garden_copy("uid-1", b"same")]));
        garden.expect_delete_secret().never();
        garden.expect_create_secret().never();
        let mut skr = MockSkrClient::new();
        skr.expect_get_secret()
            .returning(|_, _| Ok(Some(secret_with(b"same"))));

        sync_registry_cache_secrets(&rt, &garden, &skr).await.unwrap();
    }

    #[tokio::test]
    async fn missing_source_secret_fails_sync() {
        let mut rt = runtime("rt-1");
        rt.spec.caching = Some(vec![cache("uid-1", Some("pull"))]);

        let mut garden = MockGardenClient::new();
        garden.expect_list_runtime_secrets().returning(|_| Ok(vec![]));
        let mut skr = MockSkrClient::new();
        skr.expect_get_secret().returning(|_, _| Ok(None));

        let err = sync_registry_cache_secrets(&rt, &garden, &skr)
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn prune_keeps_configured_caches_only() {
        let mut rt = runtime("rt-1");
        rt.spec.caching = Some(vec![cache("uid-1", Some("pull"))]);

        let mut garden = MockGardenClient::new();
        garden.expect_list_runtime_secrets().returning(|_| {
            Ok(vec![garden_copy("uid-1", b"a"), garden_copy("uid-gone", b"b")])
        });
        garden
            .expect_delete_secret()
            .withf(|name| name == "reg-cache-uid-gone")
            .times(1)
            .returning(|_| Ok(()));

        prune_registry_cache_secrets(&rt, &garden, true).await.unwrap();
    }

    #[tokio::test]
    async fn prune_on_delete_removes_everything() {
        let mut rt = runtime("rt-1");
        rt.spec.caching = Some(vec![cache("uid-1", Some("pull"))]);

        let mut garden = MockGardenClient::new();
        garden
            .expect_list_runtime_secrets()
            .returning(|_| Ok(vec![garden_copy("uid-1", b"a")]));
        garden.expect_delete_secret().times(1).returning(|_| Ok(()));

        prune_registry_cache_secrets(&rt, &garden, false).await.unwrap();
    }
}
