//! Shoot extenders
//!
//! An extender fills in one concern of the Shoot from the Runtime. Extenders
//! are pure: the same Runtime (and observed Shoot) always yields the same
//! document, which keeps repeated server-side applies free of diffs.

pub mod audit_log;
pub mod control_plane;
pub mod dns;
pub mod extensions;
pub mod kubernetes;
pub mod maintenance;
pub mod metadata;
pub mod networking;
pub mod oidc;
pub mod provider;
pub mod registry_cache;
pub mod resources;
pub mod seed;

use kim_common::crd::{Extension, NamedResourceReference, Runtime, Shoot};
use kim_common::Result;

/// One step of the Runtime to Shoot conversion
pub type Extender<'a> = Box<dyn Fn(&Runtime, &mut Shoot) -> Result<()> + Send + Sync + 'a>;

/// Replace the extension of the same type, or append it
pub(crate) fn upsert_extension(shoot: &mut Shoot, extension: Extension) {
    let extensions = shoot.spec.extensions.get_or_insert_with(Vec::new);
    match extensions.iter_mut().find(|e| e.type_ == extension.type_) {
        Some(existing) => *existing = extension,
        None => extensions.push(extension),
    }
}

/// Replace the resource reference of the same name, or append it
pub(crate) fn upsert_resource(shoot: &mut Shoot, resource: NamedResourceReference) {
    let resources = shoot.spec.resources.get_or_insert_with(Vec::new);
    match resources.iter_mut().find(|r| r.name == resource.name) {
        Some(existing) => *existing = resource,
        None => resources.push(resource),
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use kim_common::crd::Runtime;

    /// A minimal broker-style Runtime for extender tests
    pub fn runtime(provider: &str) -> Runtime {
        let yaml = format!(
            r#"
apiVersion: infrastructuremanager.kyma-project.io/v1
kind: Runtime
metadata:
  name: rt-1
  namespace: kcp-system
  generation: 2
  labels:
    kyma-project.io/runtime-id: rt-1
    kyma-project.io/global-account-id: ga-1
    kyma-project.io/subaccount-id: sa-1
spec:
  shoot:
    name: c-12345
    purpose: production
    region: eu-central-1
    platformRegion: cf-eu10
    secretBindingName: sb-1
    kubernetes:
      kubeAPIServer:
        oidcConfig:
          clientID: client-1
          issuerURL: https://issuer.example.com
          groupsClaim: groups
          usernameClaim: sub
          usernamePrefix: "-"
          signingAlgs: [RS256]
    provider:
      type: {provider}
      workers:
        - name: cpu-worker-0
          machine:
            type: m6i.large
          minimum: 3
          maximum: 20
          zones: [eu-central-1a, eu-central-1b, eu-central-1c]
    networking:
      pods: 100.64.0.0/12
      nodes: 10.250.0.0/16
      services: 100.104.0.0/13
  security:
    administrators: [admin@example.com]
    networking:
      filter:
        egress:
          enabled: true
"#
        );
        serde_yaml::from_str(&yaml).expect("test runtime must parse")
    }
}
