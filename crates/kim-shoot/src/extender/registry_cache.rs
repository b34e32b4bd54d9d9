//! Registry cache extension and its pull secret references

use kim_common::crd::{
    CrossVersionObjectReference, Extension, ImageRegistryCache, NamedResourceReference, Shoot,
};
use serde_json::{json, Map, Value};

use super::extensions::REGISTRY_CACHE_EXTENSION;
use super::resources::REGISTRY_CACHE_RESOURCE_PREFIX;
use super::{upsert_extension, upsert_resource, Extender};

/// Garden secret (and Shoot resource) name for a cache's pull secret
pub fn registry_cache_secret_name(cache_uid: &str) -> String {
    format!("{REGISTRY_CACHE_RESOURCE_PREFIX}{cache_uid}")
}

/// Registry cache extension with one cache per caching entry. When the
/// Runtime no longer lists caches, a previously enabled extension is
/// switched off rather than dropped.
///
/// Pull secrets are mirrored into the garden only once the SKR exists, so a
/// Shoot being created carries its caches without secret references; the
/// first patch adds them.
pub fn new_registry_cache_extender<'a>(observed: Option<&'a Shoot>) -> Extender<'a> {
    Box::new(move |runtime, shoot| {
        let caches = runtime.caches();
        if caches.is_empty() {
            let existed = observed
                .and_then(|s| s.spec.extensions.as_ref())
                .is_some_and(|e| e.iter().any(|e| e.type_ == REGISTRY_CACHE_EXTENSION));
            if existed {
                upsert_extension(
                    shoot,
                    Extension {
                        type_: REGISTRY_CACHE_EXTENSION.to_string(),
                        provider_config: None,
                        disabled: Some(true),
                    },
                );
            }
            return Ok(());
        }

        let secrets_synced = observed.is_some();
        upsert_extension(
            shoot,
            Extension {
                type_: REGISTRY_CACHE_EXTENSION.to_string(),
                provider_config: Some(json!({
                    "apiVersion": "registry.extensions.gardener.cloud/v1alpha3",
                    "kind": "RegistryConfig",
                    "caches": caches
                        .iter()
                        .map(|c| cache_config(c, secrets_synced))
                        .collect::<Vec<_>>(),
                })),
                disabled: Some(false),
            },
        );
        if !secrets_synced {
            return Ok(());
        }

        for cache in caches.iter().filter(|c| has_secret(c)) {
            let name = registry_cache_secret_name(&cache.uid);
            upsert_resource(
                shoot,
                NamedResourceReference {
                    name: name.clone(),
                    resource_ref: CrossVersionObjectReference {
                        api_version: "v1".to_string(),
                        kind: "Secret".to_string(),
                        name,
                    },
                },
            );
        }
        Ok(())
    })
}

fn has_secret(cache: &ImageRegistryCache) -> bool {
    cache
        .config
        .secret_reference_name
        .as_deref()
        .is_some_and(|s| !s.is_empty())
}

fn cache_config(cache: &ImageRegistryCache, secrets_synced: bool) -> Value {
    let config = &cache.config;
    let mut entry = Map::new();
    entry.insert("upstream".to_string(), json!(config.upstream));
    if let Some(url) = &config.remote_url {
        entry.insert("remoteURL".to_string(), json!(url));
    }
    if let Some(volume) = &config.volume {
        let mut v = Map::new();
        if let Some(size) = &volume.size {
            v.insert("size".to_string(), json!(size));
        }
        if let Some(class) = &volume.storage_class_name {
            v.insert("storageClassName".to_string(), json!(class));
        }
        entry.insert("volume".to_string(), Value::Object(v));
    }
    if let Some(gc) = &config.garbage_collection {
        entry.insert("garbageCollection".to_string(), json!({ "ttl": gc.ttl }));
    }
    if secrets_synced && has_secret(cache) {
        entry.insert(
            "secretReferenceName".to_string(),
            json!(registry_cache_secret_name(&cache.uid)),
        );
    }
    Value::Object(entry)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extender::testing::runtime;
    use kim_common::crd::{RegistryCacheConfig, ShootSpec};

    fn cache(uid: &str, secret: Option<&str>) -> ImageRegistryCache {
        ImageRegistryCache {
            name: format!("cache-{uid}"),
            namespace: "default".to_string(),
            uid: uid.to_string(),
            config: RegistryCacheConfig {
                upstream: "docker.io".to_string(),
                secret_reference_name: secret.map(str::to_string),
                ..Default::default()
            },
        }
    }

    #[test]
    fn caches_with_secrets_get_resources() {
        let mut rt = runtime("aws");
        rt.spec.caching = Some(vec![cache("a1", Some("pull")), cache("b2", None)]);
        let observed = Shoot::new("c-12345", ShootSpec::default());
        let mut shoot = Shoot::new("", ShootSpec::default());
        new_registry_cache_extender(Some(&observed))(&rt, &mut shoot).unwrap();

        let extension = &shoot.spec.extensions.as_ref().unwrap()[0];
        let caches = &extension.provider_config.as_ref().unwrap()["caches"];
        assert_eq!(caches[0]["secretReferenceName"], "reg-cache-a1");
        assert!(caches[1].get("secretReferenceName").is_none());

        let resources = shoot.spec.resources.unwrap();
        assert_eq!(resources.len(), 1);
        assert_eq!(resources[0].name, "reg-cache-a1");
    }

    #[test]
    fn new_shoot_does_not_reference_unsynced_secrets() {
        let mut rt = runtime("aws");
        rt.spec.caching = Some(vec![cache("a1", Some("pull"))]);
        let mut shoot = Shoot::new("", ShootSpec::default());
        new_registry_cache_extender(None)(&rt, &mut shoot).unwrap();

        assert!(shoot.extension_enabled(REGISTRY_CACHE_EXTENSION));
        let extension = &shoot.spec.extensions.as_ref().unwrap()[0];
        let caches = &extension.provider_config.as_ref().unwrap()["caches"];
        assert_eq!(caches[0]["upstream"], "docker.io");
        assert!(caches[0].get("secretReferenceName").is_none());
        assert!(shoot.spec.resources.is_none());
    }

    #[test]
    fn removed_caches_disable_existing_extension() {
        let mut observed = Shoot::new("c-12345", ShootSpec::default());
        observed.spec.extensions = Some(vec![Extension {
            type_: REGISTRY_CACHE_EXTENSION.to_string(),
            provider_config: None,
            disabled: Some(false),
        }]);
        let mut shoot = Shoot::new("", ShootSpec::default());
        new_registry_cache_extender(Some(&observed))(&runtime("aws"), &mut shoot).unwrap();
        assert!(!shoot.extension_enabled(REGISTRY_CACHE_EXTENSION));

        let mut fresh = Shoot::new("", ShootSpec::default());
        new_registry_cache_extender(None)(&runtime("aws"), &mut fresh).unwrap();
        assert!(fresh.spec.extensions.is_none());
    }
}
