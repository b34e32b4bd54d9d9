//! Gardener extensions managed for every Shoot
//!
//! On patch the observed extension list is the starting point, so extensions
//! added by other parties keep their position and content. Managed
//! extensions are replaced in place.

use kim_common::crd::{Extension, Shoot};
use serde_json::json;

use super::{upsert_extension, Extender};
use crate::config::DnsConfig;
use crate::extender::dns::shoot_domain;

/// DNS extension type
pub const DNS_EXTENSION: &str = "shoot-dns-service";
/// Certificate extension type
pub const CERT_EXTENSION: &str = "shoot-cert-service";
/// Egress filter extension type
pub const NETWORKING_FILTER_EXTENSION: &str = "shoot-networking-filter";
/// OIDC extension type
pub const OIDC_EXTENSION: &str = "shoot-oidc-service";
/// Audit log extension type
pub const AUDIT_LOG_EXTENSION: &str = "shoot-auditlog-service";
/// Registry cache extension type
pub const REGISTRY_CACHE_EXTENSION: &str = "registry-cache";

/// DNS, certificate, egress filter and OIDC extensions
pub fn new_extensions_extender<'a>(
    dns: &'a DnsConfig,
    observed: Option<&'a Shoot>,
) -> Extender<'a> {
    Box::new(move |runtime, shoot| {
        shoot.spec.extensions = observed.and_then(|s| s.spec.extensions.clone());

        let domain = observed
            .and_then(Shoot::domain)
            .map(str::to_string)
            .unwrap_or_else(|| shoot_domain(&runtime.spec.shoot.name, dns));
        upsert_extension(shoot, dns_extension(dns, &domain));
        upsert_extension(shoot, cert_extension());

        let filter = &runtime.spec.security.networking.filter;
        let blackholing = filter.ingress.as_ref().map(|i| i.enabled).unwrap_or(false);
        upsert_extension(
            shoot,
            Extension {
                type_: NETWORKING_FILTER_EXTENSION.to_string(),
                provider_config: Some(json!({
                    "apiVersion": "networking-filter.extensions.gardener.cloud/v1alpha1",
                    "kind": "Configuration",
                    "egressFilter": { "blackholingEnabled": blackholing },
                })),
                disabled: Some(!filter.egress.enabled),
            },
        );

        upsert_extension(
            shoot,
            Extension {
                type_: OIDC_EXTENSION.to_string(),
                provider_config: None,
                disabled: Some(false),
            },
        );
        Ok(())
    })
}

fn dns_extension(config: &DnsConfig, domain: &str) -> Extension {
    Extension {
        type_: DNS_EXTENSION.to_string(),
        provider_config: Some(json!({
            "apiVersion": "service.dns.extensions.gardener.cloud/v1alpha1",
            "kind": "DNSConfig",
            "dnsProviderReplication": { "enabled": true },
            "syncProvidersFromShootSpecDNS": true,
            "providers": [{
                "primary": true,
                "secretName": config.secret_name,
                "type": config.provider_type,
                "domains": { "include": [domain] },
            }],
        })),
        disabled: Some(false),
    }
}

fn cert_extension() -> Extension {
    Extension {
        type_: CERT_EXTENSION.to_string(),
        provider_config: Some(json!({
            "apiVersion": "service.cert.extensions.gardener.cloud/v1alpha1",
            "kind": "CertConfig",
            "shootIssuers": { "enabled": true },
        })),
        disabled: Some(false),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extender::testing::runtime;
    use kim_common::crd::{FilterToggle, ShootSpec};

    fn dns() -> DnsConfig {
        DnsConfig {
            secret_name: "dns-secret".to_string(),
            domain_prefix: "kyma.example.com".to_string(),
            provider_type: "aws-route53".to_string(),
        }
    }

    fn types(shoot: &Shoot) -> Vec<&str> {
        shoot
            .spec
            .extensions
            .as_ref()
            .unwrap()
            .iter()
            .map(|e| e.type_.as_str())
            .collect()
    }

    #[test]
    fn new_shoot_gets_managed_extensions() {
        let dns = dns();
        let mut shoot = Shoot::new("", ShootSpec::default());
        new_extensions_extender(&dns, None)(&runtime("aws"), &mut shoot).unwrap();

        assert_eq!(
            types(&shoot),
            vec![DNS_EXTENSION, CERT_EXTENSION, NETWORKING_FILTER_EXTENSION, OIDC_EXTENSION]
        );
        let dns_config = shoot.spec.extensions.as_ref().unwrap()[0]
            .provider_config
            .clone()
            .unwrap();
        assert_eq!(
            dns_config["providers"][0]["domains"]["include"][0],
            "c-12345.kyma.example.com"
        );
        assert!(shoot.extension_enabled(NETWORKING_FILTER_EXTENSION));
    }

    #[test]
    fn disabled_egress_disables_filter() {
        let mut rt = runtime("aws");
        rt.spec.security.networking.filter.egress = FilterToggle { enabled: false };
        let dns = dns();
        let mut shoot = Shoot::new("", ShootSpec::default());
        new_extensions_extender(&dns, None)(&rt, &mut shoot).unwrap();
        assert!(!shoot.extension_enabled(NETWORKING_FILTER_EXTENSION));
    }

    #[test]
    fn patch_keeps_unmanaged_extensions_in_place() {
        let mut observed = Shoot::new("c-12345", ShootSpec::default());
        observed.spec.extensions = Some(vec![
            Extension {
                type_: "shoot-lakom-service".to_string(),
                provider_config: None,
                disabled: Some(false),
            },
            Extension {
                type_: OIDC_EXTENSION.to_string(),
                provider_config: None,
                disabled: Some(true),
            },
        ]);
        let dns = dns();
        let mut shoot = Shoot::new("", ShootSpec::default());
        new_extensions_extender(&dns, Some(&observed))(&runtime("aws"), &mut shoot).unwrap();

        let listed = types(&shoot);
        assert_eq!(listed[0], "shoot-lakom-service");
        assert_eq!(listed[1], OIDC_EXTENSION);
        assert!(shoot.extension_enabled(OIDC_EXTENSION));
    }
}
