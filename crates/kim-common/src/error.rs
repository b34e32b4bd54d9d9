//! Error types for the infrastructure manager
//!
//! Variants carry the runtime they relate to where one is known, so that
//! log lines and status conditions can point at the failing object.

use thiserror::Error;

/// Default context value when no specific context is available
pub const UNKNOWN_CONTEXT: &str = "unknown";

/// Main error type for infrastructure manager operations
#[derive(Debug, Error)]
pub enum Error {
    /// Kubernetes API error (KCP, Garden or SKR)
    #[error("kubernetes error: {source}")]
    Kube {
        /// The underlying kube-rs error
        #[from]
        source: kube::Error,
    },

    /// A required object does not exist
    #[error("{kind} {name} not found")]
    NotFound {
        /// Kind of the missing object
        kind: String,
        /// Name of the missing object
        name: String,
    },

    /// Runtime spec does not satisfy a precondition
    #[error("validation error for {runtime}: {message}")]
    Validation {
        /// Name of the runtime with invalid configuration
        runtime: String,
        /// Description of what's invalid
        message: String,
        /// The invalid field path (e.g., "spec.shoot.provider.workers")
        field: Option<String>,
    },

    /// Runtime could not be converted into a Shoot
    #[error("conversion error [{provider}]: {message}")]
    Conversion {
        /// Provider type the conversion was attempted for
        provider: String,
        /// Description of what failed
        message: String,
    },

    /// Serialization/deserialization error
    #[error("serialization error: {message}")]
    Serialization {
        /// Description of what failed
        message: String,
        /// The resource kind being serialized (if known)
        kind: Option<String>,
    },

    /// SKR kubeconfig could not be read or turned into a client
    #[error("kubeconfig error for {runtime}: {message}")]
    Kubeconfig {
        /// Runtime id whose kubeconfig failed
        runtime: String,
        /// Description of what failed
        message: String,
    },

    /// Configuration file or flag error
    #[error("configuration error: {message}")]
    Config {
        /// Description of what's wrong
        message: String,
    },

    /// Internal/operational error
    #[error("internal error [{context}]: {message}")]
    Internal {
        /// Description of what failed
        message: String,
        /// Context where the error occurred (e.g., "fsm", "controller", "bootstrapper")
        context: String,
    },
}

impl Error {
    /// Create a not-found error for an object of the given kind
    pub fn not_found(kind: impl Into<String>, name: impl Into<String>) -> Self {
        Self::NotFound {
            kind: kind.into(),
            name: name.into(),
        }
    }

    /// Create a validation error with the given message
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            runtime: UNKNOWN_CONTEXT.to_string(),
            message: msg.into(),
            field: None,
        }
    }

    /// Create a validation error with runtime context
    pub fn validation_for(runtime: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Validation {
            runtime: runtime.into(),
            message: msg.into(),
            field: None,
        }
    }

    /// Create a validation error with runtime context and field path
    pub fn validation_for_field(
        runtime: impl Into<String>,
        field: impl Into<String>,
        msg: impl Into<String>,
    ) -> Self {
        Self::Validation {
            runtime: runtime.into(),
            message: msg.into(),
            field: Some(field.into()),
        }
    }

    /// Create a conversion error for a provider
    pub fn conversion(provider: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Conversion {
            provider: provider.into(),
            message: msg.into(),
        }
    }

    /// Create a serialization error with the given message
    pub fn serialization(msg: impl Into<String>) -> Self {
        Self::Serialization {
            message: msg.into(),
            kind: None,
        }
    }

    /// Create a serialization error with resource kind context
    pub fn serialization_for_kind(kind: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Serialization {
            message: msg.into(),
            kind: Some(kind.into()),
        }
    }

    /// Create a kubeconfig error for a runtime
    pub fn kubeconfig(runtime: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Kubeconfig {
            runtime: runtime.into(),
            message: msg.into(),
        }
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create an internal error with the given message
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal {
            message: msg.into(),
            context: UNKNOWN_CONTEXT.to_string(),
        }
    }

    /// Create an internal error with context
    pub fn internal_with_context(context: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Internal {
            message: msg.into(),
            context: context.into(),
        }
    }

    /// HTTP status code of the underlying API error, if any
    pub fn api_code(&self) -> Option<u16> {
        match self {
            Error::Kube {
                source: kube::Error::Api(ae),
            } => Some(ae.code),
            _ => None,
        }
    }

    /// True for a 404 from the API server or a missing required object
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound { .. }) || self.api_code() == Some(404)
    }

    /// True for a 409 whose reason is a write conflict
    pub fn is_conflict(&self) -> bool {
        matches!(
            self,
            Error::Kube { source: kube::Error::Api(ae) } if ae.code == 409 && ae.reason == "Conflict"
        )
    }

    /// True for a 409 caused by creating an object that already exists
    pub fn is_already_exists(&self) -> bool {
        matches!(
            self,
            Error::Kube { source: kube::Error::Api(ae) } if ae.code == 409 && ae.reason == "AlreadyExists"
        )
    }

    /// Check if this error is retryable
    ///
    /// Validation, conversion and config errors need a spec or config fix.
    /// Kubernetes errors retry on transport failures, 5xx, 409 and 429.
    /// A 403 is treated as transient: garden RBAC is propagated asynchronously.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Kube { source } => match source {
                kube::Error::Api(ae) => {
                    matches!(ae.code, 403 | 409 | 429) || !(400..500).contains(&ae.code)
                }
                _ => true,
            },
            Error::NotFound { .. } => true,
            Error::Validation { .. } => false,
            Error::Conversion { .. } => false,
            Error::Serialization { .. } => false,
            Error::Kubeconfig { .. } => true,
            Error::Config { .. } => false,
            Error::Internal { .. } => true,
        }
    }

    /// Get the runtime name if this error is associated with a specific runtime
    pub fn runtime(&self) -> Option<&str> {
        match self {
            Error::Validation { runtime, .. } => Some(runtime),
            Error::Kubeconfig { runtime, .. } => Some(runtime),
            _ => None,
        }
    }

    /// Get the context if this error has one
    pub fn context(&self) -> Option<&str> {
        match self {
            Error::Internal { context, .. } => Some(context),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn api_error(code: u16, reason: &str) -> Error {
        Error::from(kube::Error::Api(kube::core::ErrorResponse {
            status: "Failure".to_string(),
            message: format!("{reason} happened"),
            reason: reason.to_string(),
            code,
        }))
    }

    // ==========================================================================
    // Story Tests: Error Classification During Reconciliation
    // ==========================================================================
    //
    // The state machine decides between requeue and a terminal Failed state
    // purely from these accessors, so each API failure class is pinned here.

    /// Story: a Shoot that vanished between snapshot and write is not fatal
    #[test]
    fn story_missing_objects_are_detected() {
        assert!(api_error(404, "NotFound").is_not_found());
        assert!(Error::not_found("Secret", "kubeconfig-abc").is_not_found());
        assert!(!api_error(409, "Conflict").is_not_found());
    }

    /// Story: concurrent writers on the Shoot produce a conflict, not a failure
    #[test]
    fn story_conflicts_are_distinguished_from_already_exists() {
        let conflict = api_error(409, "Conflict");
        assert!(conflict.is_conflict());
        assert!(!conflict.is_already_exists());
        assert!(conflict.is_retryable());

        let exists = api_error(409, "AlreadyExists");
        assert!(exists.is_already_exists());
        assert!(!exists.is_conflict());
    }

    /// Story: garden RBAC is eventually consistent, so 403 keeps retrying
    #[test]
    fn story_forbidden_is_transient() {
        assert!(api_error(403, "Forbidden").is_retryable());
        assert!(api_error(429, "TooManyRequests").is_retryable());
        assert!(api_error(500, "InternalError").is_retryable());
        assert!(!api_error(422, "Invalid").is_retryable());
        assert!(!api_error(400, "BadRequest").is_retryable());
    }

    /// Story: spec problems are never retried without a change
    #[test]
    fn story_conversion_and_validation_are_permanent() {
        let err = Error::conversion("aws", "zone eu-central-1d is not in infrastructure config");
        assert!(!err.is_retryable());
        assert!(err.to_string().contains("[aws]"));

        let err = Error::validation_for_field("rt-1", "spec.shoot.name", "must not be empty");
        assert!(!err.is_retryable());
        assert_eq!(err.runtime(), Some("rt-1"));
    }

    #[test]
    fn test_api_code() {
        assert_eq!(api_error(409, "Conflict").api_code(), Some(409));
        assert_eq!(Error::internal("boom").api_code(), None);
    }

    #[test]
    fn test_internal_error_context() {
        let err = Error::internal_with_context("fsm", "unexpected state");
        assert_eq!(err.context(), Some("fsm"));
        assert_eq!(Error::internal("x").context(), Some(UNKNOWN_CONTEXT));
    }

    #[test]
    fn test_json_errors_become_serialization_errors() {
        let parse: std::result::Result<serde_json::Value, _> = serde_json::from_str("{");
        let err: Error = parse.unwrap_err().into();
        assert!(matches!(err, Error::Serialization { .. }));
        assert!(!err.is_retryable());
    }
}
