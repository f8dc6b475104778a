//! Bounded retry policy and response status classification.

use std::time::Duration;

use crate::config::HttpConfig;

/// How the retry wrapper should treat a response status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusClass {
    /// Exactly the status the caller expects.
    Success,
    /// 429: wait for the rate-limit reset and reissue the same request.
    Throttled,
    /// 401: credentials rejected, abort the run.
    Unauthorized,
    /// Blocked, timed out or server-side failure: worth another attempt.
    Transient,
    /// Anything else: retrying will not help.
    Terminal,
}

/// Classifies `status` against the single status the caller treats as success.
///
/// # Examples
///
/// ```
/// use siphon_core::retry::{classify, StatusClass};
///
/// assert_eq!(classify(200, 200), StatusClass::Success);
/// assert_eq!(classify(204, 200), StatusClass::Terminal);
/// assert_eq!(classify(403, 200), StatusClass::Transient);
/// assert_eq!(classify(429, 200), StatusClass::Throttled);
/// ```
pub fn classify(status: u16, expected: u16) -> StatusClass {
    match status {
        s if s == expected => StatusClass::Success,
        429 => StatusClass::Throttled,
        401 => StatusClass::Unauthorized,
        403 | 408 => StatusClass::Transient,
        500..=599 => StatusClass::Transient,
        _ => StatusClass::Terminal,
    }
}

/// Bounded attempts with linear backoff.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(2),
        }
    }
}

impl From<&HttpConfig> for RetryPolicy {
    fn from(config: &HttpConfig) -> Self {
        Self {
            max_retries: config.max_retries.max(1),
            base_delay: config.retry_base_delay,
        }
    }
}

impl RetryPolicy {
    /// Backoff after the failed `attempt` (1-based): `base_delay * attempt`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay * attempt
    }

    /// Whether another attempt may follow the failed `attempt` (1-based).
    pub fn allows_another(&self, attempt: u32) -> bool {
        attempt < self.max_retries
    }
}
