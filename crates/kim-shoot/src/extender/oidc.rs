//! API server authentication: legacy OIDC flags or structured authentication

use kim_common::crd::{KubeApiServerConfig, OidcConfig, Runtime, StructuredAuthentication};

use super::Extender;

/// Name of the garden ConfigMap holding the structured auth config of a shoot
pub fn structured_auth_config_map_name(shoot_name: &str) -> String {
    format!("structured-auth-config-{shoot_name}")
}

/// Primary OIDC issuer of a runtime, falling back to the configured default
pub fn primary_oidc(runtime: &Runtime, default: &OidcConfig) -> OidcConfig {
    let requested = &runtime.spec.shoot.kubernetes.kube_api_server.oidc_config;
    if requested.is_complete() {
        requested.clone()
    } else {
        default.clone()
    }
}

/// Additional OIDC issuers written to the SKR.
///
/// An unset or empty list falls back to the default tenant.
pub fn additional_oidcs(runtime: &Runtime, default: &OidcConfig) -> Vec<OidcConfig> {
    match &runtime
        .spec
        .shoot
        .kubernetes
        .kube_api_server
        .additional_oidc_config
    {
        Some(configs) if !configs.is_empty() => configs.clone(),
        _ => vec![default.clone()],
    }
}

/// Either the primary issuer as API server flags or a reference to the
/// structured authentication ConfigMap; Gardener rejects both at once
pub fn new_oidc_extender<'a>(default: &'a OidcConfig, structured_auth: bool) -> Extender<'a> {
    Box::new(move |runtime, shoot| {
        let api_server = shoot
            .spec
            .kubernetes
            .kube_api_server
            .get_or_insert_with(KubeApiServerConfig::default);

        if structured_auth {
            api_server.structured_authentication = Some(StructuredAuthentication {
                config_map_name: structured_auth_config_map_name(&runtime.spec.shoot.name),
            });
        } else {
            api_server.oidc_config = Some(primary_oidc(runtime, default));
        }
        Ok(())
    })
}
