//! Throttling wait computation.
//!
//! The HTTP layer does the sleeping; this module only decides how long.

use std::time::Duration;

use crate::config::RateLimitConfig;
use crate::error::HarvestError;

/// Response headers that carry the absolute reset time, in epoch seconds.
pub const RESET_HEADERS: [&str; 2] = ["x-rate-limit-reset", "x-ratelimit-reset"];

/// Ephemeral state captured at the moment of a throttling event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitState {
    /// Absolute reset time from the response, epoch seconds.
    pub reset_at: Option<i64>,
}

impl RateLimitState {
    /// Reads the reset hint from header name/value pairs.
    ///
    /// The first parseable value among [`RESET_HEADERS`] wins.
    pub fn from_headers<'a, I>(headers: I) -> Self
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let reset_at = headers.into_iter().find_map(|(name, value)| {
            RESET_HEADERS
                .iter()
                .any(|h| h.eq_ignore_ascii_case(name))
                .then(|| value.trim().parse::<i64>().ok())
                .flatten()
        });
        Self { reset_at }
    }

    /// How long to sleep before reissuing the throttled request.
    ///
    /// With a hint `T`, the wait is `max(0, T - now + buffer)`. Without one,
    /// it is the fixed fallback.
    ///
    /// # Errors
    ///
    /// Returns `HarvestError::RateLimited` when the wait exceeds the
    /// configured `max_wait`.
    pub fn wait(&self, now: i64, config: &RateLimitConfig) -> Result<Duration, HarvestError> {
        let wait = throttle_wait(self.reset_at, now, config);
        match config.max_wait {
            Some(ceiling) if wait > ceiling => Err(HarvestError::RateLimited { wait }),
            _ => Ok(wait),
        }
    }
}

/// Computes the throttling wait for a reset hint (epoch seconds) at `now`.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use siphon_core::config::RateLimitConfig;
/// use siphon_core::rate_limit::throttle_wait;
///
/// let config = RateLimitConfig::default();
/// assert_eq!(throttle_wait(Some(1_000), 990, &config), Duration::from_secs(15));
/// assert_eq!(throttle_wait(None, 990, &config), Duration::from_secs(60));
/// ```
pub fn throttle_wait(reset_at: Option<i64>, now: i64, config: &RateLimitConfig) -> Duration {
    match reset_at {
        Some(reset) => {
            let buffer = config.buffer.as_secs() as i64;
            let secs = (reset - now).saturating_add(buffer).max(0);
            Duration::from_secs(secs as u64)
        }
        None => config.fallback,
    }
}
