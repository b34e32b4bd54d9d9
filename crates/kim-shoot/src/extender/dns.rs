//! Shoot DNS domain and primary provider

use kim_common::crd::{Dns, DnsProvider, Shoot};

use super::Extender;
use crate::config::DnsConfig;

/// Domain a new Shoot gets: `<shoot-name>.<domain-prefix>`
pub fn shoot_domain(shoot_name: &str, config: &DnsConfig) -> String {
    format!("{shoot_name}.{}", config.domain_prefix)
}

/// DNS section; an existing Shoot keeps the DNS it was created with since
/// garden rejects domain changes
pub fn new_dns_extender<'a>(config: &'a DnsConfig, observed: Option<&'a Shoot>) -> Extender<'a> {
    Box::new(move |runtime, shoot| {
        if let Some(dns) = observed.and_then(|s| s.spec.dns.clone()) {
            shoot.spec.dns = Some(dns);
            return Ok(());
        }
        shoot.spec.dns = Some(Dns {
            domain: Some(shoot_domain(&runtime.spec.shoot.name, config)),
            providers: Some(vec![DnsProvider {
                primary: Some(true),
                secret_name: Some(config.secret_name.clone()),
                type_: Some(config.provider_type.clone()),
            }]),
        });
        Ok(())
    })
}
