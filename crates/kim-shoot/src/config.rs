//! Converter configuration
//!
//! Loaded once at start-up from the JSON file passed with
//! `--converter-config-filepath`. The audit log tenant table is a separate
//! JSON file referenced from `auditLogging.tenantConfigPath`.

use std::collections::BTreeMap;
use std::path::Path;

use kim_common::crd::{MaintenanceTimeWindow, OidcConfig, Toleration};
use kim_common::{Error, Result};
use serde::{Deserialize, Serialize};

/// Everything the converter needs besides the Runtime itself
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ConverterConfig {
    /// Kubernetes defaults
    #[serde(default)]
    pub kubernetes: KubernetesConfig,
    /// Shoot DNS settings
    #[serde(default)]
    pub dns: DnsConfig,
    /// Provider specific settings
    #[serde(default)]
    pub provider: ProviderConfig,
    /// Default machine image
    #[serde(default)]
    pub machine_image: MachineImageConfig,
    /// Gardener project
    #[serde(default)]
    pub gardener: GardenerConfig,
    /// Audit log settings
    #[serde(default, rename = "auditLogging")]
    pub audit_log: AuditLogConfig,
    /// Maintenance windows per region
    #[serde(default)]
    pub maintenance_windows: BTreeMap<String, MaintenanceTimeWindow>,
    /// Seed tolerations per region
    #[serde(default)]
    pub tolerations: BTreeMap<String, Vec<Toleration>>,
    /// Feature switches
    #[serde(default)]
    pub features: FeatureFlags,
}

/// Kubernetes defaults
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct KubernetesConfig {
    /// Version used when the Runtime does not request one
    pub default_version: String,
    /// Let Gardener roll patch versions
    #[serde(default)]
    pub enable_kubernetes_version_auto_update: bool,
    /// Let Gardener roll machine images
    #[serde(default)]
    pub enable_machine_image_version_auto_update: bool,
    /// Primary OIDC issuer used when the Runtime has none
    #[serde(default, rename = "defaultOperatorOidc")]
    pub default_operator_oidc: OidcConfig,
    /// Additional OIDC issuer used when the Runtime lists none
    #[serde(default, rename = "defaultSharedIASTenant")]
    pub default_shared_ias_tenant: OidcConfig,
    /// Kubelet feature gates
    #[serde(default)]
    pub kubelet_feature_gates: BTreeMap<String, bool>,
    /// API server runtime config
    #[serde(default, rename = "kubeApiServerRuntimeConfig")]
    pub api_server_runtime_config: BTreeMap<String, bool>,
}

/// Shoot DNS settings
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DnsConfig {
    /// Secret with DNS provider credentials
    pub secret_name: String,
    /// Domain suffix; the shoot domain is `<shoot>.<prefix>`
    pub domain_prefix: String,
    /// DNS provider type
    pub provider_type: String,
}

/// Provider specific settings
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ProviderConfig {
    /// AWS settings
    #[serde(default)]
    pub aws: AwsConfig,
    /// OpenStack settings
    #[serde(default)]
    pub openstack: OpenStackConfig,
}

/// AWS settings
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AwsConfig {
    /// Require IMDSv2 on worker nodes
    #[serde(default, rename = "enableIMDSv2")]
    pub enable_imds_v2: bool,
}

/// OpenStack settings
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct OpenStackConfig {
    /// Floating IP pool for load balancers
    pub floating_pool_name: String,
}

impl Default for OpenStackConfig {
    fn default() -> Self {
        Self {
            floating_pool_name: "FloatingIP-external-kyma-01".to_string(),
        }
    }
}

/// Default machine image
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MachineImageConfig {
    /// Image name
    pub default_name: String,
    /// Image version
    #[serde(default)]
    pub default_version: String,
}

/// Gardener project
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GardenerConfig {
    /// Project name; shoots live in `garden-<project>`
    pub project_name: String,
}

/// Audit log settings
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AuditLogConfig {
    /// ConfigMap in the garden namespace with the audit policy
    #[serde(default)]
    pub policy_config_map_name: String,
    /// Path of the tenant table
    #[serde(default)]
    pub tenant_config_path: String,
    /// Fail provisioning when no tenant is configured for the region
    #[serde(default)]
    pub mandatory: bool,
}

/// Feature switches
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FeatureFlags {
    /// Use a structured authentication ConfigMap instead of OIDC flags
    #[serde(default)]
    pub structured_auth: bool,
    /// Write `credentialsBindingName` instead of `secretBindingName`
    #[serde(default)]
    pub credentials_binding: bool,
    /// Manage the registry-cache extension and its secrets
    #[serde(default)]
    pub registry_cache: bool,
}

impl ConverterConfig {
    /// Load from a file; `.yaml` and `.yml` are read as YAML, anything
    /// else as JSON
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| Error::config(format!("failed to read {}: {e}", path.display())))?;
        match path.extension().and_then(|e| e.to_str()) {
            Some("yaml" | "yml") => Self::from_yaml(&raw),
            _ => Self::from_json(&raw),
        }
    }

    /// Parse from YAML and check required values
    pub fn from_yaml(raw: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(raw)
            .map_err(|e| Error::config(format!("invalid converter config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Parse from JSON and check required values
    pub fn from_json(raw: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(raw)
            .map_err(|e| Error::config(format!("invalid converter config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.kubernetes.default_version.is_empty() {
            return Err(Error::config("kubernetes.defaultVersion must be set"));
        }
        if self.gardener.project_name.is_empty() {
            return Err(Error::config("gardener.projectName must be set"));
        }
        Ok(())
    }
}

/// Audit log tenant for one provider region
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
pub struct AuditLogData {
    /// Tenant id
    #[serde(rename = "tenantID")]
    pub tenant_id: String,
    /// Service URL
    #[serde(rename = "serviceURL")]
    pub service_url: String,
    /// Garden secret with credentials
    #[serde(rename = "secretName")]
    pub secret_name: String,
}

/// Audit log tenants keyed by provider type, then region
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[serde(transparent)]
pub struct AuditLogTable(BTreeMap<String, BTreeMap<String, AuditLogData>>);

impl AuditLogTable {
    /// Load from a JSON file
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| Error::config(format!("failed to read {}: {e}", path.display())))?;
        serde_json::from_str(&raw)
            .map_err(|e| Error::config(format!("invalid audit log tenant config: {e}")))
    }

    /// Tenant for a provider region
    pub fn get(&self, provider: &str, region: &str) -> Result<&AuditLogData> {
        let data = self
            .0
            .get(provider)
            .ok_or_else(|| {
                Error::config(format!("audit log config missing for provider {provider}"))
            })?
            .get(region)
            .ok_or_else(|| {
                Error::config(format!(
                    "audit log config missing for region {region} of provider {provider}"
                ))
            })?;
        if data.tenant_id.is_empty() || data.service_url.is_empty() || data.secret_name.is_empty()
        {
            return Err(Error::config(format!(
                "audit log config for {provider}/{region} is incomplete"
            )));
        }
        Ok(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CONFIG: &str = r#"{
        "kubernetes": {
            "defaultVersion": "1.31",
            "defaultOperatorOidc": {"clientID": "op", "issuerURL": "https://op.example.com"},
            "defaultSharedIASTenant": {"clientID": "ias", "issuerURL": "https://ias.example.com"}
        },
        "dns": {"secretName": "dns-secret", "domainPrefix": "kyma.example.com", "providerType": "aws-route53"},
        "provider": {"aws": {"enableIMDSv2": true}},
        "machineImage": {"defaultName": "gardenlinux", "defaultVersion": "1592.1.0"},
        "gardener": {"projectName": "kyma-dev"},
        "auditLogging": {"policyConfigMapName": "audit-policy", "tenantConfigPath": "/tmp/x", "mandatory": true},
        "maintenanceWindows": {"eu-central-1": {"begin": "010000+0000", "end": "050000+0000"}}
    }"#;

    #[test]
    fn parses_full_config() {
        let config = ConverterConfig::from_json(CONFIG).unwrap();
        assert!(config.provider.aws.enable_imds_v2);
        assert_eq!(
            config.provider.openstack.floating_pool_name,
            "FloatingIP-external-kyma-01"
        );
        assert!(config.audit_log.mandatory);
        assert!(!config.features.structured_auth);
        assert_eq!(config.maintenance_windows.len(), 1);
    }

    #[test]
    fn yaml_matches_json() {
        let yaml = r#"
kubernetes:
  defaultVersion: "1.31"
gardener:
  projectName: kyma-dev
tolerations:
  cn-north-1:
    - key: ksa-assured-workload
features:
  structuredAuth: true
"#;
        let config = ConverterConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.kubernetes.default_version, "1.31");
        assert!(config.features.structured_auth);
        assert_eq!(config.tolerations["cn-north-1"][0].key, "ksa-assured-workload");
    }

    #[test]
    fn rejects_missing_default_version() {
        let err = ConverterConfig::from_json(r#"{"gardener": {"projectName": "p"}}"#).unwrap_err();
        assert!(err.to_string().contains("defaultVersion"));
    }

    #[test]
    fn audit_log_lookup() {
        let table: AuditLogTable = serde_json::from_str(
            r#"{"aws": {"eu-central-1": {"tenantID": "t", "serviceURL": "https://a", "secretName": "s"}}}"#,
        )
        .unwrap();
        assert_eq!(table.get("aws", "eu-central-1").unwrap().tenant_id, "t");
        assert!(table.get("aws", "us-east-1").is_err());
        assert!(table.get("gcp", "eu-central-1").is_err());
    }

    #[test]
    fn incomplete_audit_log_entry_is_rejected() {
        let table: AuditLogTable = serde_json::from_str(
            r#"{"aws": {"eu-central-1": {"tenantID": "", "serviceURL": "https://a", "secretName": "s"}}}"#,
        )
        .unwrap();
        assert!(table.get("aws", "eu-central-1").is_err());
    }
}
