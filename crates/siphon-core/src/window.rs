//! Splitting a date range into fixed-size sub-windows.
//!
//! Time-windowed APIs cap the span of a single query (30 days for the research
//! video endpoint). A harvest over a longer range walks consecutive windows in
//! chronological order.

use chrono::Duration;

use crate::error::HarvestError;
use crate::models::DateWindow;

/// Splits the inclusive range `[range.start, range.end]` into consecutive
/// windows of at most `days` days. The last window is truncated to `range.end`.
///
/// # Errors
///
/// Returns `HarvestError::Config` if `days` is zero or the range is inverted.
///
/// # Examples
///
/// ```
/// use chrono::NaiveDate;
/// use siphon_core::models::DateWindow;
/// use siphon_core::window::split_windows;
///
/// let range = DateWindow::new(
///     NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
///     NaiveDate::from_ymd_opt(2024, 3, 5).unwrap(), // 65 days
/// );
/// let windows = split_windows(range, 30).unwrap();
/// let sizes: Vec<i64> = windows.iter().map(|w| w.days()).collect();
/// assert_eq!(sizes, vec![30, 30, 5]);
/// ```
pub fn split_windows(range: DateWindow, days: u32) -> Result<Vec<DateWindow>, HarvestError> {
    if days == 0 {
        return Err(HarvestError::Config(
            "window size must be at least one day".to_string(),
        ));
    }
    if range.start > range.end {
        return Err(HarvestError::Config(format!(
            "window start {} is after end {}",
            range.start, range.end
        )));
    }

    let span = Duration::days(i64::from(days) - 1);
    let mut windows = Vec::new();
    let mut current = range.start;
    while current <= range.end {
        let end = std::cmp::min(current + span, range.end);
        windows.push(DateWindow::new(current, end));
        current = end + Duration::days(1);
    }
    Ok(windows)
}
