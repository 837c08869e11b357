//! When a failed fetch is worth another attempt, and how long to wait.

use std::fmt;
use std::time::Duration;

/// Why a single attempt failed, classified where the network call is made.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureInfo {
    /// No HTTP status was obtained: connection refused, DNS, timeout,
    /// body interrupted.
    Network { reason: String },
    /// The server answered with a non-success status.
    Http { status: u16, body: String },
}

impl FailureInfo {
    pub fn network(reason: impl Into<String>) -> Self {
        FailureInfo::Network {
            reason: reason.into(),
        }
    }

    pub fn http(status: u16, body: impl Into<String>) -> Self {
        FailureInfo::Http {
            status,
            body: body.into(),
        }
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            FailureInfo::Network { .. } => None,
            FailureInfo::Http { status, .. } => Some(*status),
        }
    }
}

impl fmt::Display for FailureInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureInfo::Network { reason } => write!(f, "network failure: {}", reason),
            FailureInfo::Http { status, .. } => write!(f, "HTTP {}", status),
        }
    }
}

pub const DEFAULT_MAX_RETRIES: u32 = 3;
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_secs(1);
pub const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries allowed after the first attempt.
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            max_retries: DEFAULT_MAX_RETRIES,
            base_delay: DEFAULT_BASE_DELAY,
            max_delay: DEFAULT_MAX_DELAY,
        }
    }
}

impl RetryPolicy {
    /// Single attempt only, for calls that must not be repeated.
    pub fn disabled() -> Self {
        RetryPolicy {
            max_retries: 0,
            ..Self::default()
        }
    }

    /// `attempt_index` is the number of attempts that already failed before
    /// this one, starting at 0. 4xx answers are final; 5xx and failures
    /// without a status are retried until the cap.
    pub fn should_retry(&self, attempt_index: u32, failure: &FailureInfo) -> bool {
        if attempt_index >= self.max_retries {
            return false;
        }
        match failure.status() {
            None => true,
            Some(status) => status >= 500,
        }
    }

    /// Delay before retry number `attempt_index` (0 for the first retry):
    /// `base_delay * 2^attempt_index`, capped at `max_delay`.
    pub fn backoff_delay(&self, attempt_index: u32) -> Duration {
        let factor = 2u32.checked_pow(attempt_index).unwrap_or(u32::MAX);
        self.base_delay
            .saturating_mul(factor)
            .min(self.max_delay)
    }

    /// Delays that a fetch failing every time would go through.
    pub fn schedule(&self) -> impl Iterator<Item = Duration> + '_ {
        (0..self.max_retries).map(|i| self.backoff_delay(i))
    }
}

/// [`RetryPolicy::should_retry`] with the default policy.
pub fn should_retry(attempt_index: u32, failure: &FailureInfo) -> bool {
    RetryPolicy::default().should_retry(attempt_index, failure)
}

/// [`RetryPolicy::backoff_delay`] with the default policy.
pub fn backoff_delay(attempt_index: u32) -> Duration {
    RetryPolicy::default().backoff_delay(attempt_index)
}
