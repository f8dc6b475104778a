//! Run bookkeeping: per-unit outcomes and the end-of-run summary.
//!
//! A "unit" is one logical piece of work that ends in one output file: a
//! search query, a user's video list, a post's comment list, a crawled profile.

/// Outcome of processing a single unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitOutcome {
    /// Output file written
    Written,
    /// Nothing to write (empty result, already seen)
    Skipped,
    /// Fetching, parsing or writing failed
    Failed,
}

/// Counters for one harvest command.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct HarvestStats {
    pub written: usize,
    pub skipped: usize,
    pub failed: usize,
    pub records: usize,
}

impl HarvestStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records an outcome, incrementing the appropriate counter.
    pub fn record(&mut self, outcome: UnitOutcome) {
        match outcome {
            UnitOutcome::Written => self.written += 1,
            UnitOutcome::Skipped => self.skipped += 1,
            UnitOutcome::Failed => self.failed += 1,
        }
    }

    pub fn add_records(&mut self, n: usize) {
        self.records += n;
    }

    pub fn merge(&mut self, other: &HarvestStats) {
        self.written += other.written;
        self.skipped += other.skipped;
        self.failed += other.failed;
        self.records += other.records;
    }

    /// Total number of processed units.
    pub fn total(&self) -> usize {
        self.written + self.skipped + self.failed
    }

    pub fn successful(&self) -> usize {
        self.written + self.skipped
    }
}

/// Result of harvesting one target (a query, a username, a seed profile).
#[derive(Debug, Clone)]
pub struct UnitResult {
    pub target: String,
    pub stats: HarvestStats,
    /// Error message if the target failed as a whole.
    pub error: Option<String>,
}

impl UnitResult {
    pub fn success(target: impl Into<String>, stats: HarvestStats) -> Self {
        Self {
            target: target.into(),
            stats,
            error: None,
        }
    }

    pub fn failure(target: impl Into<String>, error: impl Into<String>) -> Self {
        let mut stats = HarvestStats::default();
        stats.record(UnitOutcome::Failed);
        Self {
            target: target.into(),
            stats,
            error: Some(error.into()),
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// Aggregated results of one command over all its targets.
#[derive(Debug, Clone, Default)]
pub struct BatchHarvestSummary {
    pub results: Vec<UnitResult>,
}

impl BatchHarvestSummary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, result: UnitResult) {
        self.results.push(result);
    }

    pub fn successful_count(&self) -> usize {
        self.results.iter().filter(|r| r.is_success()).count()
    }

    pub fn failed_count(&self) -> usize {
        self.results.iter().filter(|r| !r.is_success()).count()
    }

    /// Total records across all targets.
    pub fn total_records(&self) -> usize {
        self.results.iter().map(|r| r.stats.records).sum()
    }

    /// Unit counters summed over all targets.
    pub fn totals(&self) -> HarvestStats {
        let mut totals = HarvestStats::default();
        for r in &self.results {
            totals.merge(&r.stats);
        }
        totals
    }

    pub fn total_targets(&self) -> usize {
        self.results.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stats_record() {
        let mut stats = HarvestStats::new();
        stats.record(UnitOutcome::Written);
        stats.record(UnitOutcome::Written);
        stats.record(UnitOutcome::Skipped);
        stats.record(UnitOutcome::Failed);

        assert_eq!(stats.written, 2);
        assert_eq!(stats.total(), 4);
        assert_eq!(stats.successful(), 3);
    }

    #[test]
    fn test_stats_merge() {
        let mut a = HarvestStats {
            written: 1,
            skipped: 0,
            failed: 1,
            records: 10,
        };
        let b = HarvestStats {
            written: 2,
            skipped: 1,
            failed: 0,
            records: 5,
        };
        a.merge(&b);
        assert_eq!(a.total(), 5);
        assert_eq!(a.records, 15);
    }

    #[test]
    fn test_unit_result_failure_counts_one_failed_unit() {
        let result = UnitResult::failure("alice", "HTTP 404");
        assert!(!result.is_success());
        assert_eq!(result.stats.failed, 1);
        assert_eq!(result.error.as_deref(), Some("HTTP 404"));
    }

    #[test]
    fn test_summary_mixed_results() {
        let mut summary = BatchHarvestSummary::new();
        let mut stats = HarvestStats::new();
        stats.record(UnitOutcome::Written);
        stats.add_records(120);
        summary.add(UnitResult::success("q1", stats));
        summary.add(UnitResult::failure("q2", "auth"));

        assert_eq!(summary.total_targets(), 2);
        assert_eq!(summary.successful_count(), 1);
        assert_eq!(summary.failed_count(), 1);
        assert_eq!(summary.total_records(), 120);
        assert_eq!(summary.totals().total(), 2);
    }

    #[test]
    fn test_summary_empty() {
        let summary = BatchHarvestSummary::new();
        assert_eq!(summary.successful_count(), 0);
        assert_eq!(summary.total_records(), 0);
    }
}
