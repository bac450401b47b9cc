//! Protocol-level error classification shared by every transport.

use serde::Serialize;

/// Failure reported by a protocol transport or executor.
///
/// Payloads are plain strings so an error can be cloned into a
/// [`CriterionTestResult`](crate::result::CriterionTestResult) and compared
/// in tests and diagnostics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, thiserror::Error)]
pub enum ProtocolError {
    /// Generic query or request failure.
    #[error("{0}")]
    Query(String),

    /// The requested namespace does not exist on the target.
    #[error("Invalid namespace: {0}")]
    InvalidNamespace(String),

    /// The queried class does not exist in the namespace.
    #[error("Invalid class: {0}")]
    InvalidClass(String),

    /// The requested object was not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// The query text was rejected by the server.
    #[error("Query syntax error: {0}")]
    QuerySyntax(String),

    /// Authentication or authorization failure.
    #[error("Access denied: {0}")]
    AccessDenied(String),

    /// No usable credentials are configured for the requested operation.
    #[error("{0}")]
    NoCredentials(String),

    /// A spawned command exited unsuccessfully.
    #[error("Command failed: {command}: {output}")]
    CommandFailed { command: String, output: String },

    /// The operation is not supported by the configured transport.
    #[error("{0}")]
    Unsupported(String),

    /// The operation did not complete within its deadline.
    #[error("Operation timed out after {seconds} seconds")]
    Timeout { seconds: u64 },
}

impl ProtocolError {
    /// Whether this error is expected while probing candidate namespaces.
    ///
    /// A missing namespace or class on one candidate only means the candidate
    /// is not the right one; anything else means the server will probably
    /// never answer, so probing should stop.
    pub fn is_acceptable_namespace_error(&self) -> bool {
        matches!(
            self,
            ProtocolError::InvalidNamespace(_)
                | ProtocolError::InvalidClass(_)
                | ProtocolError::NotFound(_)
                | ProtocolError::QuerySyntax(_)
        )
    }

    pub fn is_access_denied(&self) -> bool {
        matches!(self, ProtocolError::AccessDenied(_))
    }
}
