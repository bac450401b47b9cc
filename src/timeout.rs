//! Deadline enforcement for protocol calls.
//!
//! Client libraries do not always honor their own timeouts, so every external
//! call runs as a spawned task raced against a deadline. On expiry the task
//! is aborted; abandoned blocking work may keep running, its eventual result
//! is discarded.

use std::future::Future;
use std::time::Duration;

use crate::error::ProtocolError;

#[derive(Debug, thiserror::Error)]
pub enum GuardError {
    #[error("Operation timed out after {seconds} seconds")]
    TimedOut { seconds: u64 },
    #[error(transparent)]
    Execution(ProtocolError),
    #[error("Task aborted: {0}")]
    Aborted(String),
}

pub struct TimeoutGuard;

impl TimeoutGuard {
    /// Run `work` to completion or until `timeout` elapses, whichever comes
    /// first. The caller always regains control at the deadline.
    pub async fn run<T>(
        work: impl Future<Output = Result<T, ProtocolError>> + Send + 'static,
        timeout: Duration,
    ) -> Result<T, GuardError>
    where
        T: Send + 'static,
    {
        let mut handle = tokio::spawn(work);
        match tokio::time::timeout(timeout, &mut handle).await {
            Ok(Ok(Ok(value))) => Ok(value),
            Ok(Ok(Err(error))) => Err(GuardError::Execution(error)),
            Ok(Err(join_error)) => Err(GuardError::Aborted(join_error.to_string())),
            Err(_) => {
                handle.abort();
                Err(GuardError::TimedOut {
                    seconds: timeout.as_secs(),
                })
            }
        }
    }
}

impl From<GuardError> for ProtocolError {
    fn from(error: GuardError) -> Self {
        match error {
            GuardError::TimedOut { seconds } => ProtocolError::Timeout { seconds },
            GuardError::Execution(inner) => inner,
            GuardError::Aborted(reason) => ProtocolError::Query(reason),
        }
    }
}
