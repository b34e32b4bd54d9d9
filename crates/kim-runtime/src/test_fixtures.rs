//! Objects shared by the unit tests of this crate

use std::collections::BTreeMap;

use kim_common::crd::{
    Dns, ImageRegistryCache, LastError, LastOperation, Machine, RegistryCacheConfig, Runtime,
    Shoot, ShootSpec, ShootStatus, Worker,
};
use kim_common::labels;
use kim_shoot::ConverterConfig;

/// A broker-style Runtime whose name and runtime id are `id`
pub fn runtime(id: &str) -> Runtime {
    let yaml = format!(
        r#"
apiVersion: infrastructuremanager.kyma-project.io/v1
kind: Runtime
metadata:
  name: {id}
  namespace: kcp-system
  generation: 1
  labels:
    kyma-project.io/runtime-id: {id}
    kyma-project.io/shoot-name: c-1
    kyma-project.io/global-account-id: ga-1
    kyma-project.io/subaccount-id: sa-1
spec:
  shoot:
    name: c-1
    region: eu-central-1
    platformRegion: cf-eu10
    secretBindingName: sb-1
    kubernetes: {{}}
    provider:
      type: aws
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
          enabled: false
"#
    );
    serde_yaml::from_str(&yaml).expect("test runtime must parse")
}

/// Converter configuration for a `kyma-dev` project
pub fn converter_config() -> ConverterConfig {
    ConverterConfig::from_json(
        r#"{
        "kubernetes": {
            "defaultVersion": "1.31",
            "defaultOperatorOidc": {"clientID": "op", "issuerURL": "https://op.example.com"},
            "defaultSharedIASTenant": {"clientID": "ias", "issuerURL": "https://ias.example.com"}
        },
        "dns": {"secretName": "dns-secret", "domainPrefix": "kyma.example.com", "providerType": "aws-route53"},
        "machineImage": {"defaultName": "gardenlinux", "defaultVersion": "1592.1.0"},
        "gardener": {"projectName": "kyma-dev"}
    }"#,
    )
    .expect("test converter config must parse")
}

/// A worker pool in the given zones
pub fn worker(name: &str, zones: &[&str]) -> Worker {
    Worker {
        name: name.to_string(),
        machine: Machine {
            type_: "m6i.large".to_string(),
            ..Default::default()
        },
        minimum: 1,
        maximum: 3,
        zones: zones.iter().map(|z| z.to_string()).collect(),
        ..Default::default()
    }
}

/// A registry cache in namespace `cache-ns`
pub fn cache(uid: &str, secret: Option<&str>) -> ImageRegistryCache {
    ImageRegistryCache {
        name: format!("cache-{uid}"),
        namespace: "cache-ns".to_string(),
        uid: uid.to_string(),
        config: RegistryCacheConfig {
            upstream: "docker.io".to_string(),
            secret_reference_name: secret.map(str::to_string),
            ..Default::default()
        },
    }
}

/// An existing Shoot with a domain and no status
pub fn shoot(name: &str) -> Shoot {
    let mut shoot = Shoot::new(
        name,
        ShootSpec {
            dns: Some(Dns {
                domain: Some(format!("{name}.kyma.example.com")),
                providers: None,
            }),
            ..Default::default()
        },
    );
    shoot.metadata.namespace = Some("garden-kyma-dev".to_string());
    shoot.metadata.annotations = Some(BTreeMap::from([(
        labels::SHOOT_RUNTIME_GENERATION.to_string(),
        "1".to_string(),
    )]));
    shoot
}

/// An existing Shoot reporting a last operation
pub fn shoot_with_operation(name: &str, type_: &str, state: &str) -> Shoot {
    let mut shoot = shoot(name);
    shoot.status = Some(ShootStatus {
        last_operation: Some(LastOperation {
            type_: type_.to_string(),
            state: state.to_string(),
            ..Default::default()
        }),
        ..Default::default()
    });
    shoot
}

/// A Gardener error with the given codes
pub fn last_error(description: &str, codes: &[&str]) -> LastError {
    LastError {
        description: description.to_string(),
        codes: Some(codes.iter().map(|c| c.to_string()).collect()),
        ..Default::default()
    }
}
