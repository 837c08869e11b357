use thiserror::Error;

use crate::retry::FailureInfo;
use crate::schema::ValidationErrors;

/// Terminal outcome of a failed query, as seen by the caller.
#[derive(Debug, Clone, Error)]
pub enum QueryError {
    /// Malformed request before send, or malformed response after receipt.
    #[error(transparent)]
    Validation(#[from] ValidationErrors),
    /// No HTTP status could be obtained, even after retrying.
    #[error("network failure after {attempts} attempt(s): {reason}")]
    TransientNetwork { reason: String, attempts: u32 },
    #[error("server error {status} after {attempts} attempt(s)")]
    Server {
        status: u16,
        body: String,
        attempts: u32,
    },
    #[error("request rejected with status {status}")]
    Client { status: u16, body: String },
    /// The caller stopped waiting, or the cache was torn down.
    #[error("request cancelled")]
    Cancelled,
    /// The fetch itself panicked.
    #[error("fetch failed unexpectedly: {reason}")]
    Internal { reason: String },
}

impl QueryError {
    pub(crate) fn from_failure(failure: FailureInfo, attempts: u32) -> Self {
        match failure {
            FailureInfo::Network { reason } => QueryError::TransientNetwork { reason, attempts },
            FailureInfo::Http { status, body } if status >= 500 => QueryError::Server {
                status,
                body,
                attempts,
            },
            FailureInfo::Http { status, body } => QueryError::Client { status, body },
        }
    }

    /// Stable tag for the failure family.
    pub fn kind(&self) -> &'static str {
        match self {
            QueryError::Validation(_) => "validation",
            QueryError::TransientNetwork { .. } => "transient_network",
            QueryError::Server { .. } => "server",
            QueryError::Client { .. } => "client",
            QueryError::Cancelled => "cancelled",
            QueryError::Internal { .. } => "internal",
        }
    }

    /// True when trying again later may succeed.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            QueryError::TransientNetwork { .. } | QueryError::Server { .. }
        )
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            QueryError::Server { status, .. } | QueryError::Client { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn validation(&self) -> Option<&ValidationErrors> {
        match self {
            QueryError::Validation(errors) => Some(errors),
            _ => None,
        }
    }
}
