//! Shoot resource references carried over on patch

use kim_common::crd::Shoot;

use super::Extender;

/// Prefix of resource references owned by the registry cache extender
pub const REGISTRY_CACHE_RESOURCE_PREFIX: &str = "reg-cache-";

/// Start from the observed references minus registry cache secrets, which
/// are re-added from the current caching list
pub fn new_resources_extender<'a>(observed: Option<&'a Shoot>) -> Extender<'a> {
    Box::new(move |_runtime, shoot| {
        shoot.spec.resources = observed
            .and_then(|s| s.spec.resources.as_ref())
            .map(|resources| {
                resources
                    .iter()
                    .filter(|r| !r.name.starts_with(REGISTRY_CACHE_RESOURCE_PREFIX))
                    .cloned()
                    .collect::<Vec<_>>()
            })
            .filter(|resources| !resources.is_empty());
        Ok(())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extender::testing::runtime;
    use kim_common::crd::{CrossVersionObjectReference, NamedResourceReference, ShootSpec};

    fn reference(name: &str) -> NamedResourceReference {
        NamedResourceReference {
            name: name.to_string(),
            resource_ref: CrossVersionObjectReference {
                api_version: "v1".to_string(),
                kind: "Secret".to_string(),
                name: name.to_string(),
            },
        }
    }

    #[test]
    fn drops_registry_cache_references() {
        let mut observed = Shoot::new("c-12345", ShootSpec::default());
        observed.spec.resources = Some(vec![
            reference("auditlog-credentials"),
            reference("reg-cache-0f1e"),
        ]);
        let mut shoot = Shoot::new("", ShootSpec::default());
        new_resources_extender(Some(&observed))(&runtime("aws"), &mut shoot).unwrap();

        let names: Vec<_> = shoot
            .spec
            .resources
            .unwrap()
            .into_iter()
            .map(|r| r.name)
            .collect();
        assert_eq!(names, vec!["auditlog-credentials"]);
    }
}
