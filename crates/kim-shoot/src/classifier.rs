//! Classification of Gardener `lastErrors`
//!
//! Gardener reports failed operations as a list of errors, each with zero or
//! more machine-readable codes. A failure is worth retrying when at least one
//! code points at something other than the customer's cloud credentials.

use kim_common::crd::LastError;

/// Codes that make a failed operation non-retryable
const NON_RETRYABLE_CODES: &[&str] = &["ERR_INFRA_UNAUTHENTICATED", "ERR_INFRA_UNAUTHORIZED"];

/// Outcome of classifying a set of last errors
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ErrorClassification {
    /// Comma separated error codes, used as condition reason
    pub reason: String,
    /// Whether a retry can succeed
    pub retryable: bool,
}

/// Classify the last errors of a failed Shoot operation.
///
/// Without any codes the failure is non-retryable: Gardener gave up without
/// saying why.
pub fn classify_last_errors(errors: &[LastError]) -> ErrorClassification {
    let codes: Vec<&str> = errors
        .iter()
        .flat_map(|e| e.codes.iter().flatten())
        .map(String::as_str)
        .collect();

    let retryable = codes.iter().any(|c| !NON_RETRYABLE_CODES.contains(c));

    ErrorClassification {
        reason: codes.join(", "),
        retryable,
    }
}

/// Join error descriptions as `1) first 2) second`
pub fn combine_error_descriptions(errors: &[LastError]) -> String {
    errors
        .iter()
        .enumerate()
        .map(|(i, e)| format!("{}) {}", i + 1, e.description))
        .collect::<Vec<_>>()
        .join(" ")
}
