//! Supporting types shared by the CRDs

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Supported infrastructure provider types
#[derive(Clone, Copy, Debug, Deserialize, Serialize, JsonSchema, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ProviderType {
    /// Amazon Web Services
    Aws,
    /// Microsoft Azure
    Azure,
    /// Google Cloud Platform
    Gcp,
    /// SAP Converged Cloud (OpenStack)
    OpenStack,
    /// Alibaba Cloud
    Alicloud,
}

impl ProviderType {
    /// Gardener cloud profile used for shoots on this provider
    pub fn cloud_profile(&self) -> &'static str {
        match self {
            Self::Aws => "aws",
            Self::Azure => "az",
            Self::Gcp => "gcp",
            Self::OpenStack => "converged-cloud-kyma",
            Self::Alicloud => "alicloud",
        }
    }

    /// Provider name as used in Shoot `spec.provider.type`
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Aws => "aws",
            Self::Azure => "azure",
            Self::Gcp => "gcp",
            Self::OpenStack => "openstack",
            Self::Alicloud => "alicloud",
        }
    }
}

impl std::str::FromStr for ProviderType {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "aws" => Ok(Self::Aws),
            "azure" => Ok(Self::Azure),
            "gcp" => Ok(Self::Gcp),
            "openstack" => Ok(Self::OpenStack),
            "alicloud" => Ok(Self::Alicloud),
            _ => Err(crate::Error::conversion(
                s,
                format!("provider {s} not supported, expected one of: aws, azure, gcp, openstack, alicloud"),
            )),
        }
    }
}

impl std::fmt::Display for ProviderType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Integer or percentage string, as used by worker rollout settings
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(untagged)]
pub enum IntOrString {
    /// Absolute count
    Int(i32),
    /// Percentage such as "25%"
    String(String),
}

/// Status of a condition
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub enum ConditionStatus {
    /// Condition is true
    True,
    /// Condition is false
    False,
    /// Condition status is unknown
    #[default]
    Unknown,
}

impl std::fmt::Display for ConditionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::True => write!(f, "True"),
            Self::False => write!(f, "False"),
            Self::Unknown => write!(f, "Unknown"),
        }
    }
}

/// Status condition for resources
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
pub struct Condition {
    /// Type of condition (e.g., Provisioned, KubeconfigReady)
    #[serde(rename = "type")]
    pub type_: String,

    /// Status of the condition (True, False, Unknown)
    pub status: ConditionStatus,

    /// Machine-readable reason for the condition
    pub reason: String,

    /// Human-readable message
    pub message: String,

    /// Last time the condition transitioned
    #[serde(rename = "lastTransitionTime")]
    pub last_transition_time: DateTime<Utc>,
}

impl Condition {
    /// Create a new condition with the current timestamp
    pub fn new(
        type_: impl Into<String>,
        status: ConditionStatus,
        reason: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            type_: type_.into(),
            status,
            reason: reason.into(),
            message: message.into(),
            last_transition_time: Utc::now(),
        }
    }
}

/// Insert or update a condition by type.
///
/// The transition time only moves when the status changes, so rewriting an
/// identical condition leaves the list byte-for-byte unchanged.
pub fn set_condition(conditions: &mut Vec<Condition>, condition: Condition) {
    match conditions.iter_mut().find(|c| c.type_ == condition.type_) {
        Some(existing) => {
            if existing.status != condition.status {
                existing.status = condition.status;
                existing.last_transition_time = condition.last_transition_time;
            }
            existing.reason = condition.reason;
            existing.message = condition.message;
        }
        None => conditions.push(condition),
    }
}

/// Find a condition by type
pub fn find_condition<'a>(conditions: &'a [Condition], type_: &str) -> Option<&'a Condition> {
    conditions.iter().find(|c| c.type_ == type_)
}

pub(crate) fn is_false(b: &bool) -> bool {
    !*b
}

#[cfg(test)]
mod tests {
    use super::*;

    mod provider_type {
        use super::*;

        #[test]
        fn test_from_str_valid() {
            assert_eq!("aws".parse::<ProviderType>().unwrap(), ProviderType::Aws);
            assert_eq!("Azure".parse::<ProviderType>().unwrap(), ProviderType::Azure);
            assert_eq!(
                "openstack".parse::<ProviderType>().unwrap(),
                ProviderType::OpenStack
            );
        }

        #[test]
        fn test_from_str_unsupported() {
            let err = "docker".parse::<ProviderType>().unwrap_err();
            assert!(err.to_string().contains("not supported"));
        }

        #[test]
        fn test_cloud_profiles() {
            assert_eq!(ProviderType::Aws.cloud_profile(), "aws");
            assert_eq!(ProviderType::Azure.cloud_profile(), "az");
            assert_eq!(ProviderType::Gcp.cloud_profile(), "gcp");
            assert_eq!(
                ProviderType::OpenStack.cloud_profile(),
                "converged-cloud-kyma"
            );
            assert_eq!(ProviderType::Alicloud.cloud_profile(), "alicloud");
        }
    }

    mod conditions {
        use super::*;
        use chrono::TimeZone;

        fn old(status: ConditionStatus) -> Condition {
            Condition {
                type_: "Provisioned".to_string(),
                status,
                reason: "ShootCreationPending".to_string(),
                message: "pending".to_string(),
                last_transition_time: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            }
        }

        #[test]
        fn same_status_keeps_transition_time() {
            let mut conditions = vec![old(ConditionStatus::Unknown)];
            set_condition(
                &mut conditions,
                Condition::new("Provisioned", ConditionStatus::Unknown, "Other", "msg"),
            );
            assert_eq!(conditions.len(), 1);
            assert_eq!(conditions[0].reason, "Other");
            assert_eq!(
                conditions[0].last_transition_time,
                old(ConditionStatus::Unknown).last_transition_time
            );
        }

        #[test]
        fn status_change_moves_transition_time() {
            let mut conditions = vec![old(ConditionStatus::Unknown)];
            set_condition(
                &mut conditions,
                Condition::new("Provisioned", ConditionStatus::True, "Done", "ok"),
            );
            assert_eq!(conditions[0].status, ConditionStatus::True);
            assert_ne!(
                conditions[0].last_transition_time,
                old(ConditionStatus::Unknown).last_transition_time
            );
        }

        #[test]
        fn new_type_is_appended() {
            let mut conditions = vec![old(ConditionStatus::True)];
            set_condition(
                &mut conditions,
                Condition::new("Configured", ConditionStatus::True, "Done", "ok"),
            );
            assert_eq!(conditions.len(), 2);
            assert!(find_condition(&conditions, "Configured").is_some());
        }
    }
}
