//! Seed placement and tolerations

use std::collections::BTreeMap;

use kim_common::crd::{SeedSelector, Toleration};

use super::Extender;

/// Seed label carrying the seed's region
pub const SEED_REGION_LABEL: &str = "seed.gardener.cloud/region";

/// Seed selector when the Runtime enforces seed location, plus the
/// tolerations configured for the Runtime's region
pub fn new_seed_extender<'a>(tolerations: &'a BTreeMap<String, Vec<Toleration>>) -> Extender<'a> {
    Box::new(move |runtime, shoot| {
        let spec = &runtime.spec.shoot;
        shoot.spec.seed_selector = (spec.enforce_seed_location.unwrap_or(false)
            && !spec.region.is_empty())
        .then(|| SeedSelector {
            match_labels: Some(BTreeMap::from([(
                SEED_REGION_LABEL.to_string(),
                spec.region.clone(),
            )])),
        });

        shoot.spec.tolerations = tolerations
            .get(&spec.region)
            .filter(|t| !t.is_empty())
            .cloned();
        Ok(())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extender::testing::runtime;
    use kim_common::crd::{Shoot, ShootSpec};

    #[test]
    fn enforced_location_selects_region() {
        let mut rt = runtime("aws");
        rt.spec.shoot.enforce_seed_location = Some(true);
        let tolerations = BTreeMap::new();
        let mut shoot = Shoot::new("", ShootSpec::default());
        new_seed_extender(&tolerations)(&rt, &mut shoot).unwrap();

        let labels = shoot.spec.seed_selector.unwrap().match_labels.unwrap();
        assert_eq!(labels.get(SEED_REGION_LABEL).unwrap(), "eu-central-1");
        assert!(shoot.spec.tolerations.is_none());
    }

    #[test]
    fn no_enforcement_no_selector() {
        let tolerations = BTreeMap::from([(
            "eu-central-1".to_string(),
            vec![Toleration {
                key: "ksa-assured-workload".to_string(),
                value: None,
            }],
        )]);
        let mut shoot = Shoot::new("", ShootSpec::default());
        new_seed_extender(&tolerations)(&runtime("aws"), &mut shoot).unwrap();
        assert!(shoot.spec.seed_selector.is_none());
        assert_eq!(shoot.spec.tolerations.unwrap()[0].key, "ksa-assured-workload");
    }
}
