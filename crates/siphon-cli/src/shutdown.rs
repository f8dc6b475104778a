//! Interrupt handling for a harvest run.

use std::future::{pending, Future};
use std::io;

use tracing::warn;

/// Resolves once `signal` reports an interrupt.
///
/// When the listener cannot be installed the error is logged and the future
/// never resolves, so the run continues until it finishes on its own.
pub async fn interrupted<F>(signal: F)
where
    F: Future<Output = io::Result<()>>,
{
    if let Err(e) = signal.await {
        warn!(error = %e, "Cannot listen for Ctrl-C");
        pending::<()>().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::future::ready;
    use std::time::Duration;

    #[tokio::test]
    async fn test_interrupt_resolves() {
        let done = tokio::time::timeout(Duration::from_millis(100), interrupted(ready(Ok(())))).await;
        assert!(done.is_ok());
    }

    #[tokio::test]
    async fn test_failed_listener_never_interrupts() {
        let failed = ready(Err(io::Error::other("no signal driver")));
        let done = tokio::time::timeout(Duration::from_millis(50), interrupted(failed)).await;
        assert!(done.is_err());
    }
}
