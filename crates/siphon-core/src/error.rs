use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Harvest-wide error types.
///
/// Every failure a harvest can run into maps onto one of these variants. The
/// variants fall into four groups that decide how far a failure spreads:
///
/// - authentication failures abort the whole run ([`HarvestError::is_fatal`])
/// - transient HTTP, network and timeout failures are retried and then the
///   single request is given up ([`HarvestError::is_retryable`])
/// - payload shape mismatches skip the affected unit
/// - file-system failures fail the unit being written
///
/// # Examples
///
/// ```
/// use siphon_core::error::HarvestError;
///
/// let err = HarvestError::PayloadShape("missing `data.videos`".to_string());
/// assert!(!err.is_fatal());
/// assert!(!err.is_retryable());
/// ```
#[derive(Error, Debug)]
pub enum HarvestError {
    /// Credentials were rejected or no token came back.
    ///
    /// Callers must not proceed to fetch after this error.
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// The server answered with a status that is neither the expected success
    /// status nor retryable.
    #[error("HTTP {status} from {url}")]
    Http { status: u16, url: String },

    /// Network or connection error.
    #[error("Network error: {0}")]
    Network(String),

    /// Request timeout.
    #[error("Request timed out after {0} seconds")]
    Timeout(u64),

    /// Every attempt of the retry wrapper failed.
    #[error("Gave up after {attempts} attempts: {last}")]
    RetriesExhausted { attempts: u32, last: String },

    /// The server throttled us and asked for a wait longer than the configured
    /// ceiling.
    #[error("Rate limited; server asked to wait {}s", .wait.as_secs())]
    RateLimited { wait: Duration },

    /// An expected key or element was absent from a response.
    #[error("Unexpected payload shape: {0}")]
    PayloadShape(String),

    /// Writing an output file failed.
    #[error("File system error at {}: {source}", .path.display())]
    FileSystem {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// JSON serialization or deserialization failed.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A URL could not be parsed or joined.
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// Configuration could not be loaded or is inconsistent.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Generic error for cases not covered by specific variants.
    #[error("Error: {0}")]
    Generic(String),
}

impl HarvestError {
    /// Wraps an I/O error with the path it happened on.
    pub fn fs(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        HarvestError::FileSystem {
            path: path.into(),
            source,
        }
    }

    /// Returns a user-friendly error message suitable for CLI output.
    pub fn user_message(&self) -> String {
        match self {
            HarvestError::Authentication(msg) => format!(
                "Authentication failed: {}\n   Check TIKTOK_CLIENT_KEY / TIKTOK_CLIENT_SECRET or X_BEARER_TOKEN.",
                msg
            ),
            HarvestError::Network(msg) => {
                format!("Network error: {}\n   Check your internet connection.", msg)
            }
            HarvestError::Timeout(secs) => format!(
                "Request timed out after {} seconds.\n   The server may be overloaded. Try again later.",
                secs
            ),
            HarvestError::RetriesExhausted { attempts, last } => format!(
                "Request failed {} times (last error: {}).\n   The item was skipped.",
                attempts, last
            ),
            HarvestError::RateLimited { wait } => format!(
                "Rate limit reset is {}s away, beyond the configured max wait.\n   Raise rate_limit.max_wait_secs or try later.",
                wait.as_secs()
            ),
            HarvestError::FileSystem { path, source } => format!(
                "Cannot write {}: {}\n   Check the output directory permissions.",
                path.display(),
                source
            ),
            HarvestError::Config(msg) => {
                format!("Configuration error: {}\n   Check your siphon.toml.", msg)
            }
            _ => self.to_string(),
        }
    }

    /// Returns true if retrying the same request may succeed.
    ///
    /// # Examples
    ///
    /// ```
    /// use siphon_core::error::HarvestError;
    ///
    /// assert!(HarvestError::Network("connection reset".to_string()).is_retryable());
    /// assert!(!HarvestError::PayloadShape("no data".to_string()).is_retryable());
    /// ```
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            HarvestError::Network(_) | HarvestError::Timeout(_) | HarvestError::RateLimited { .. }
        )
    }

    /// Returns true if the error must abort the whole run rather than a single unit.
    pub fn is_fatal(&self) -> bool {
        matches!(self, HarvestError::Authentication(_) | HarvestError::Config(_))
    }
}
