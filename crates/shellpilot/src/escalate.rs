//! Failure classification and the escalation decision.
//!
//! Deterministic, no completion calls: a failed execution's combined
//! output is scanned for permission signatures, and the decision table
//! says whether the same script gets one elevated re-execution. A
//! permission failure with no credential is terminal immediately, and
//! escalating an already-privileged process is meaningless.

use serde::{Deserialize, Serialize};

use crate::executor::ExecutionResult;

/// Output signatures that mark a failure as permission-related.
pub const PERMISSION_SIGNATURES: &[&str] =
    &["sudo", "permission denied", "operation not permitted"];

/// Classification of one execution result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Classification {
    Success,
    PermissionDenied,
    GenericFailure,
}

/// Classify an execution by exit code and output signatures.
pub fn classify(result: &ExecutionResult) -> Classification {
    if result.success() {
        return Classification::Success;
    }
    let combined = result.combined_lower();
    if PERMISSION_SIGNATURES.iter().any(|s| combined.contains(s)) {
        Classification::PermissionDenied
    } else {
        Classification::GenericFailure
    }
}

/// What to do about a classified failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EscalationDecision {
    /// Not a permission failure; escalation does not apply.
    NotApplicable,
    /// Re-execute the same script elevated, once.
    Retry,
    /// Permission failure but no credential configured. Terminal.
    Unavailable,
    /// Already running privileged; further escalation is meaningless.
    AlreadyPrivileged,
}

/// Decide whether an elevated retry is warranted.
pub fn decide(
    classification: Classification,
    is_privileged: bool,
    has_credential: bool,
) -> EscalationDecision {
    if classification != Classification::PermissionDenied {
        return EscalationDecision::NotApplicable;
    }
    if is_privileged {
        return EscalationDecision::AlreadyPrivileged;
    }
    if !has_credential {
        return EscalationDecision::Unavailable;
    }
    EscalationDecision::Retry
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(exit_code: i32, stdout: &str, stderr: &str) -> ExecutionResult {
        ExecutionResult {
            exit_code,
            stdout: stdout.into(),
            stderr: stderr.into(),
            attempt: 1,
            elevated: false,
        }
    }

    #[test]
    fn zero_exit_is_success_even_with_signatures() {
        let r = result(0, "sudo is great", "");
        assert_eq!(classify(&r), Classification::Success);
    }

    #[test]
    fn permission_signatures_are_detected_case_insensitively() {
        for text in ["Permission Denied", "OPERATION NOT PERMITTED", "try sudo"] {
            let r = result(1, "", text);
            assert_eq!(classify(&r), Classification::PermissionDenied, "{text}");
        }
    }

    #[test]
    fn signature_in_stdout_counts_too() {
        let r = result(2, "mkdir: permission denied", "");
        assert_eq!(classify(&r), Classification::PermissionDenied);
    }

    #[test]
    fn other_failures_are_generic() {
        let r = result(127, "", "command not found");
        assert_eq!(classify(&r), Classification::GenericFailure);
    }

    #[test]
    fn decision_table() {
        use Classification::*;
        use EscalationDecision::*;
        assert_eq!(decide(Success, false, true), NotApplicable);
        assert_eq!(decide(GenericFailure, false, true), NotApplicable);
        assert_eq!(decide(PermissionDenied, true, true), AlreadyPrivileged);
        assert_eq!(decide(PermissionDenied, false, false), Unavailable);
        assert_eq!(decide(PermissionDenied, false, true), Retry);
    }

    #[test]
    fn privilege_check_precedes_credential_check() {
        // Root with a configured password still must not retry.
        assert_eq!(
            decide(Classification::PermissionDenied, true, false),
            EscalationDecision::AlreadyPrivileged
        );
    }
}
