//! Detection verdicts returned by the criterion engine.

use std::fmt;

use serde::Serialize;

use crate::error::ProtocolError;

/// Outcome of one criterion test against one host.
///
/// `message` is never empty: even a skipped test carries a human-readable
/// explanation of why nothing was performed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CriterionTestResult {
    pub success: bool,
    pub result: Option<String>,
    pub message: String,
    pub exception: Option<ProtocolError>,
}

impl CriterionTestResult {
    /// A test that could not be performed at all (malformed criterion,
    /// missing configuration). Counts as a failure.
    pub fn empty() -> Self {
        Self {
            success: false,
            result: None,
            message: "No test performed.".to_string(),
            exception: None,
        }
    }

    pub fn success(criterion: &impl fmt::Display, result: impl Into<String>) -> Self {
        let result = result.into();
        Self {
            success: true,
            message: format!("Criterion test succeeded:\n{criterion}\nResult: {result}"),
            result: Some(result),
            exception: None,
        }
    }

    pub fn failure(criterion: &impl fmt::Display, result: impl Into<String>) -> Self {
        let result = result.into();
        Self {
            success: false,
            message: format!("Criterion test failed:\n{criterion}\nActual result:\n{result}"),
            result: Some(result),
            exception: None,
        }
    }

    pub fn error(criterion: &impl fmt::Display, error: ProtocolError) -> Self {
        Self {
            success: false,
            result: None,
            message: format!("Error detected on criterion:\n{criterion}\nError: {error}"),
            exception: Some(error),
        }
    }

    /// An error verdict with an explanatory message but no underlying
    /// protocol exception (for example a missing configuration).
    pub fn error_message(criterion: &impl fmt::Display, message: impl fmt::Display) -> Self {
        Self {
            success: false,
            result: None,
            message: format!("Error detected on criterion:\n{criterion}\nError: {message}"),
            exception: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_is_a_failure_with_a_message() {
        let r = CriterionTestResult::empty();
        assert!(!r.success);
        assert!(r.result.is_none());
        assert!(!r.message.is_empty());
    }

    #[test]
    fn success_echoes_the_criterion_and_result() {
        let r = CriterionTestResult::success(&"- OID: 1.3.6.1", "some value");
        assert!(r.success);
        assert_eq!(r.result.as_deref(), Some("some value"));
        assert!(r.message.contains("- OID: 1.3.6.1"));
        assert!(r.message.contains("some value"));
    }

    #[test]
    fn error_keeps_the_protocol_error() {
        let r = CriterionTestResult::error(&"criterion", ProtocolError::AccessDenied("no".into()));
        assert!(!r.success);
        assert_eq!(r.exception, Some(ProtocolError::AccessDenied("no".into())));
        assert!(r.message.contains("Access denied"));
    }
}
