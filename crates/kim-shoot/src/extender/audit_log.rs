//! Audit log extension, credentials and policy

use kim_common::crd::{
    AuditConfig, AuditPolicy, CrossVersionObjectReference, Extension, KubeApiServerConfig,
    LocalObjectReference, NamedResourceReference,
};
use serde_json::json;

use super::extensions::AUDIT_LOG_EXTENSION;
use super::{upsert_extension, upsert_resource, Extender};
use crate::config::AuditLogData;

/// Shoot resource reference holding the audit log credentials
pub const AUDIT_LOG_CREDENTIALS: &str = "auditlog-credentials";

/// Audit log extension pointing at the tenant, its credentials and the
/// audit policy ConfigMap. Without tenant data the Shoot is left untouched.
pub fn new_audit_log_extender<'a>(
    policy_config_map_name: &'a str,
    data: Option<&'a AuditLogData>,
) -> Extender<'a> {
    Box::new(move |_runtime, shoot| {
        let Some(data) = data else {
            return Ok(());
        };

        upsert_extension(
            shoot,
            Extension {
                type_: AUDIT_LOG_EXTENSION.to_string(),
                provider_config: Some(json!({
                    "apiVersion": "service.auditlog.extensions.gardener.cloud/v1alpha1",
                    "kind": "AuditlogConfig",
                    "type": "standard",
                    "tenantID": data.tenant_id,
                    "serviceURL": data.service_url,
                    "secretReferenceName": AUDIT_LOG_CREDENTIALS,
                })),
                disabled: Some(false),
            },
        );

        upsert_resource(
            shoot,
            NamedResourceReference {
                name: AUDIT_LOG_CREDENTIALS.to_string(),
                resource_ref: CrossVersionObjectReference {
                    api_version: "v1".to_string(),
                    kind: "Secret".to_string(),
                    name: data.secret_name.clone(),
                },
            },
        );

        if !policy_config_map_name.is_empty() {
            shoot
                .spec
                .kubernetes
                .kube_api_server
                .get_or_insert_with(KubeApiServerConfig::default)
                .audit_config = Some(AuditConfig {
                audit_policy: Some(AuditPolicy {
                    config_map_ref: Some(LocalObjectReference {
                        name: policy_config_map_name.to_string(),
                    }),
                }),
            });
        }
        Ok(())
    })
}
