//! Control plane high availability

use super::Extender;

/// Copy the failure tolerance requested on the Runtime
pub fn new_control_plane_extender<'a>() -> Extender<'a> {
    Box::new(|runtime, shoot| {
        shoot.spec.control_plane = runtime
            .spec
            .shoot
            .control_plane
            .clone()
            .filter(|cp| cp.high_availability.is_some());
        Ok(())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extender::testing::runtime;
    use kim_common::crd::{
        ControlPlane, FailureTolerance, HighAvailability, Shoot, ShootSpec,
    };

    #[test]
    fn copies_failure_tolerance() {
        let mut rt = runtime("aws");
        rt.spec.shoot.control_plane = Some(ControlPlane {
            high_availability: Some(HighAvailability {
                failure_tolerance: FailureTolerance {
                    type_: "zone".to_string(),
                },
            }),
        });
        let mut shoot = Shoot::new("", ShootSpec::default());
        new_control_plane_extender()(&rt, &mut shoot).unwrap();
        assert_eq!(
            shoot
                .spec
                .control_plane
                .unwrap()
                .high_availability
                .unwrap()
                .failure_tolerance
                .type_,
            "zone"
        );
    }

    #[test]
    fn nothing_requested_leaves_unset() {
        let mut shoot = Shoot::new("", ShootSpec::default());
        new_control_plane_extender()(&runtime("aws"), &mut shoot).unwrap();
        assert!(shoot.spec.control_plane.is_none());
    }
}
