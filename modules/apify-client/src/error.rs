use std::time::Duration;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, ApifyError>;

#[derive(Debug, Error)]
pub enum ApifyError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Parse error: {0}")]
    Parse(String),
}

impl From<reqwest::Error> for ApifyError {
    fn from(err: reqwest::Error) -> Self {
        ApifyError::Network(err.to_string())
    }
}

impl From<serde_json::Error> for ApifyError {
    fn from(err: serde_json::Error) -> Self {
        ApifyError::Parse(err.to_string())
    }
}

/// Messages the platform returns once the account's usage allowance is gone.
/// Matched case-insensitively anywhere in the error text.
const HARD_LIMIT_SIGNATURES: &[&str] = &[
    "monthly usage hard limit",
    "platform-feature-disabled",
    "hard limit",
];

/// Returns true if `message` carries one of the platform's hard usage limit
/// signatures.
pub fn is_hard_limit_message(message: &str) -> bool {
    let lower = message.to_lowercase();
    HARD_LIMIT_SIGNATURES.iter().any(|sig| lower.contains(sig))
}

/// Outcome of a single task that did not produce a result set.
#[derive(Debug, Error)]
pub enum TaskError {
    #[error("Failed to start task: {0}")]
    Submit(ApifyError),

    #[error("Task ended with status: {status}")]
    RemoteFailure { status: String },

    #[error("Task timed out after {}s", .waited.as_secs())]
    Timeout { waited: Duration },

    #[error("Failed to fetch results: {0}")]
    Fetch(ApifyError),

    #[error("Task cancelled")]
    Cancelled,
}

/// Coarse classification used by callers to decide whether a failure is
/// task-local or ends the whole run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    SubmitFailure,
    RemoteFailure,
    Timeout,
    Cancelled,
    FatalQuota,
}

impl TaskError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, TaskError::Cancelled)
    }

    pub fn is_hard_limit(&self) -> bool {
        !self.is_cancelled() && is_hard_limit_message(&self.to_string())
    }

    pub fn kind(&self) -> ErrorKind {
        if self.is_hard_limit() {
            return ErrorKind::FatalQuota;
        }
        match self {
            TaskError::Submit(_) => ErrorKind::SubmitFailure,
            TaskError::RemoteFailure { .. } | TaskError::Fetch(_) => ErrorKind::RemoteFailure,
            TaskError::Timeout { .. } => ErrorKind::Timeout,
            TaskError::Cancelled => ErrorKind::Cancelled,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hard_limit_signatures_match_case_insensitively() {
        assert!(is_hard_limit_message(
            "By launching this job you will exceed the Monthly Usage Hard Limit"
        ));
        assert!(is_hard_limit_message("platform-feature-disabled: actors"));
        assert!(!is_hard_limit_message("rate limit exceeded, retry later"));
    }

    #[test]
    fn submit_failure_with_quota_body_is_fatal() {
        let err = TaskError::Submit(ApifyError::Api {
            status: 403,
            message: r#"{"error":{"type":"platform-feature-disabled"}}"#.to_string(),
        });
        assert!(err.is_hard_limit());
        assert_eq!(err.kind(), ErrorKind::FatalQuota);
    }

    #[test]
    fn ordinary_failures_keep_their_kind() {
        let submit = TaskError::Submit(ApifyError::Network("connection reset".into()));
        assert_eq!(submit.kind(), ErrorKind::SubmitFailure);

        let remote = TaskError::RemoteFailure {
            status: "ABORTED".into(),
        };
        assert_eq!(remote.kind(), ErrorKind::RemoteFailure);
        assert_eq!(remote.to_string(), "Task ended with status: ABORTED");

        let timeout = TaskError::Timeout {
            waited: Duration::from_secs(60),
        };
        assert_eq!(timeout.kind(), ErrorKind::Timeout);
        assert_eq!(timeout.to_string(), "Task timed out after 60s");

        assert_eq!(TaskError::Cancelled.kind(), ErrorKind::Cancelled);
    }
}
