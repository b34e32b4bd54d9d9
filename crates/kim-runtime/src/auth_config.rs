//! Structured authentication configuration for the Shoot API server
//!
//! Gardener reads an `AuthenticationConfiguration` document from a ConfigMap
//! in the garden namespace and hands it to kube-apiserver. Each OIDC issuer
//! of the runtime becomes one JWT authenticator.

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::ConfigMap;
use kube::api::ObjectMeta;
use serde::{Deserialize, Serialize};

use kim_common::crd::OidcConfig;
use kim_common::{labels, Error, Result};

/// Key of the authentication document within the ConfigMap
pub const AUTH_CONFIG_KEY: &str = "config.yaml";

const API_VERSION: &str = "apiserver.config.k8s.io/v1beta1";
const KIND: &str = "AuthenticationConfiguration";

/// kube-apiserver `AuthenticationConfiguration`
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AuthenticationConfiguration {
    /// Always `apiserver.config.k8s.io/v1beta1`
    pub api_version: String,
    /// Always `AuthenticationConfiguration`
    pub kind: String,
    /// One entry per issuer
    #[serde(default)]
    pub jwt: Vec<JwtAuthenticator>,
}

/// A single JWT issuer
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct JwtAuthenticator {
    /// Issuer and accepted audiences
    pub issuer: Issuer,
    /// Claims mapped to user name and groups
    pub claim_mappings: ClaimMappings,
    /// Claims that must carry a fixed value
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub claim_validation_rules: Vec<ClaimValidationRule>,
}

/// Issuer of a JWT authenticator
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Issuer {
    /// Issuer URL
    pub url: String,
    /// Accepted audiences; the OIDC client id
    pub audiences: Vec<String>,
}

/// Username and groups mappings
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ClaimMappings {
    /// User name claim
    pub username: PrefixedClaim,
    /// Groups claim
    pub groups: PrefixedClaim,
}

/// Claim name with the prefix prepended to its value
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PrefixedClaim {
    /// Claim name
    pub claim: String,
    /// Prefix; kube-apiserver requires it to be set, possibly empty
    pub prefix: String,
}

/// A required claim
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ClaimValidationRule {
    /// Claim name
    pub claim: String,
    /// Value the claim must have
    pub required_value: String,
}

impl From<&OidcConfig> for JwtAuthenticator {
    fn from(oidc: &OidcConfig) -> Self {
        Self {
            issuer: Issuer {
                url: oidc.issuer_url.clone().unwrap_or_default(),
                audiences: oidc.client_id.iter().cloned().collect(),
            },
            claim_mappings: ClaimMappings {
                username: PrefixedClaim {
                    claim: oidc.username_claim.clone().unwrap_or_default(),
                    prefix: oidc.username_prefix.clone().unwrap_or_default(),
                },
                groups: PrefixedClaim {
                    claim: oidc.groups_claim.clone().unwrap_or_default(),
                    prefix: oidc.groups_prefix.clone().unwrap_or_default(),
                },
            },
            claim_validation_rules: oidc
                .required_claims
                .iter()
                .flatten()
                .map(|(claim, value)| ClaimValidationRule {
                    claim: claim.clone(),
                    required_value: value.clone(),
                })
                .collect(),
        }
    }
}

impl From<&JwtAuthenticator> for OidcConfig {
    fn from(jwt: &JwtAuthenticator) -> Self {
        let non_empty = |s: &str| (!s.is_empty()).then(|| s.to_string());
        let required: BTreeMap<String, String> = jwt
            .claim_validation_rules
            .iter()
            .map(|r| (r.claim.clone(), r.required_value.clone()))
            .collect();
        Self {
            client_id: jwt.issuer.audiences.first().cloned(),
            issuer_url: non_empty(&jwt.issuer.url),
            groups_claim: non_empty(&jwt.claim_mappings.groups.claim),
            groups_prefix: Some(jwt.claim_mappings.groups.prefix.clone()),
            signing_algs: None,
            username_claim: non_empty(&jwt.claim_mappings.username.claim),
            username_prefix: Some(jwt.claim_mappings.username.prefix.clone()),
            required_claims: (!required.is_empty()).then_some(required),
        }
    }
}

/// Render the authentication document for a set of issuers
pub fn render(oidcs: &[OidcConfig]) -> Result<String> {
    let document = AuthenticationConfiguration {
        api_version: API_VERSION.to_string(),
        kind: KIND.to_string(),
        jwt: oidcs.iter().map(JwtAuthenticator::from).collect(),
    };
    serde_yaml::to_string(&document).map_err(|e| {
        Error::serialization_for_kind(KIND, format!("failed to render: {e}"))
    })
}

/// Parse a rendered authentication document
pub fn parse(raw: &str) -> Result<AuthenticationConfiguration> {
    serde_yaml::from_str(raw)
        .map_err(|e| Error::serialization_for_kind(KIND, format!("failed to parse: {e}")))
}

/// ConfigMap holding the authentication document, for the garden namespace
pub fn build_config_map(
    name: &str,
    namespace: &str,
    runtime_id: &str,
    oidcs: &[OidcConfig],
) -> Result<ConfigMap> {
    Ok(ConfigMap {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(namespace.to_string()),
            labels: Some(BTreeMap::from([(
                labels::RUNTIME_ID.to_string(),
                runtime_id.to_string(),
            )])),
            ..Default::default()
        },
        data: Some(BTreeMap::from([(AUTH_CONFIG_KEY.to_string(), render(oidcs)?)])),
        ..Default::default()
    })
}
