//! Gardener OIDC webhook resource (authentication.gardener.cloud/v1alpha1)
//!
//! Cluster-scoped objects on the SKR, served by the shoot-oidc-service
//! extension. One is written per configured issuer.

use std::collections::BTreeMap;

use kube::CustomResource;
use serde::{Deserialize, Serialize};

use super::shoot::OidcConfig;

/// OpenIDConnect specification
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[kube(
    group = "authentication.gardener.cloud",
    version = "v1alpha1",
    kind = "OpenIDConnect",
    plural = "openidconnects",
    schema = "disabled"
)]
#[serde(rename_all = "camelCase")]
pub struct OpenIdConnectSpec {
    /// Issuer URL
    #[serde(rename = "issuerURL")]
    pub issuer_url: String,

    /// Client id
    #[serde(rename = "clientID")]
    pub client_id: String,

    /// Claim holding the user name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username_claim: Option<String>,

    /// Prefix added to user names
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username_prefix: Option<String>,

    /// Claim holding the groups
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub groups_claim: Option<String>,

    /// Prefix added to group names
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub groups_prefix: Option<String>,

    /// Accepted signing algorithms
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub supported_signing_algs: Option<Vec<String>>,

    /// Claims that must be present with the given value
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub required_claims: Option<BTreeMap<String, String>>,
}

impl From<&OidcConfig> for OpenIdConnectSpec {
    fn from(config: &OidcConfig) -> Self {
        Self {
            issuer_url: config.issuer_url.clone().unwrap_or_default(),
            client_id: config.client_id.clone().unwrap_or_default(),
            username_claim: config.username_claim.clone(),
            username_prefix: config.username_prefix.clone(),
            groups_claim: config.groups_claim.clone(),
            groups_prefix: config.groups_prefix.clone(),
            supported_signing_algs: config.signing_algs.clone(),
            required_claims: config.required_claims.clone(),
        }
    }
}
