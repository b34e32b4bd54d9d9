//! Maintenance auto-update flags and time window

use std::collections::BTreeMap;

use kim_common::crd::{Maintenance, MaintenanceAutoUpdate, MaintenanceTimeWindow, Shoot};

use super::Extender;
use crate::config::KubernetesConfig;

/// Auto-update flags from config; the window comes from the region table,
/// falling back to the window of the observed Shoot
pub fn new_maintenance_extender<'a>(
    config: &'a KubernetesConfig,
    windows: &'a BTreeMap<String, MaintenanceTimeWindow>,
    observed: Option<&'a Shoot>,
) -> Extender<'a> {
    Box::new(move |runtime, shoot| {
        let time_window = windows
            .get(&runtime.spec.shoot.region)
            .cloned()
            .or_else(|| {
                observed
                    .and_then(|s| s.spec.maintenance.as_ref())
                    .and_then(|m| m.time_window.clone())
            });

        shoot.spec.maintenance = Some(Maintenance {
            auto_update: Some(MaintenanceAutoUpdate {
                kubernetes_version: config.enable_kubernetes_version_auto_update,
                machine_image_version: Some(config.enable_machine_image_version_auto_update),
            }),
            time_window,
        });
        Ok(())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extender::testing::runtime;
    use kim_common::crd::ShootSpec;

    fn window(begin: &str, end: &str) -> MaintenanceTimeWindow {
        MaintenanceTimeWindow {
            begin: begin.to_string(),
            end: end.to_string(),
        }
    }

    #[test]
    fn region_table_sets_window() {
        let config = KubernetesConfig::default();
        let windows = BTreeMap::from([(
            "eu-central-1".to_string(),
            window("200000+0000", "000000+0000"),
        )]);
        let mut shoot = Shoot::new("", ShootSpec::default());
        new_maintenance_extender(&config, &windows, None)(&runtime("aws"), &mut shoot).unwrap();

        let maintenance = shoot.spec.maintenance.unwrap();
        assert_eq!(maintenance.time_window.unwrap().begin, "200000+0000");
        let auto_update = maintenance.auto_update.unwrap();
        assert!(!auto_update.kubernetes_version);
        assert_eq!(auto_update.machine_image_version, Some(false));
    }

    #[test]
    fn unknown_region_keeps_observed_window() {
        let config = KubernetesConfig::default();
        let windows = BTreeMap::new();
        let mut observed = Shoot::new("c-12345", ShootSpec::default());
        observed.spec.maintenance = Some(Maintenance {
            auto_update: None,
            time_window: Some(window("030000+0000", "040000+0000")),
        });

        let mut shoot = Shoot::new("", ShootSpec::default());
        new_maintenance_extender(&config, &windows, Some(&observed))(&runtime("aws"), &mut shoot)
            .unwrap();
        assert_eq!(
            shoot.spec.maintenance.unwrap().time_window,
            Some(window("030000+0000", "040000+0000"))
        );

        let mut fresh = Shoot::new("", ShootSpec::default());
        new_maintenance_extender(&config, &windows, None)(&runtime("aws"), &mut fresh).unwrap();
        assert!(fresh.spec.maintenance.unwrap().time_window.is_none());
    }
}
