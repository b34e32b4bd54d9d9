//! Shoot networking ranges

use kim_common::crd::{Networking, Shoot};

use super::Extender;

/// CNI used when the Runtime does not name one
pub const DEFAULT_NETWORKING_TYPE: &str = "calico";

/// Networking section; an existing Shoot keeps the ranges it was created
/// with since they cannot change after provisioning
pub fn new_networking_extender<'a>(observed: Option<&'a Shoot>) -> Extender<'a> {
    Box::new(move |runtime, shoot| {
        if let Some(networking) = observed.and_then(|s| s.spec.networking.clone()) {
            shoot.spec.networking = Some(networking);
            return Ok(());
        }
        let requested = &runtime.spec.shoot.networking;
        shoot.spec.networking = Some(Networking {
            type_: Some(
                requested
                    .type_
                    .clone()
                    .unwrap_or_else(|| DEFAULT_NETWORKING_TYPE.to_string()),
            ),
            pods: Some(requested.pods.clone()),
            nodes: Some(requested.nodes.clone()),
            services: Some(requested.services.clone()),
        });
        Ok(())
    })
}
