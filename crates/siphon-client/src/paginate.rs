//! Cursor-driven pagination over any [`PageSource`].
//!
//! The paginator owns the cursor. It asks the source for one page at a time
//! and stops when the server reports no continuation, when the request budget
//! is spent, or when the server hands back a cursor that was already
//! consumed. Throttling and retries happen below it, inside
//! [`crate::ApiClient::execute`], so a throttled request never advances the
//! cursor.

use std::collections::HashSet;

use async_trait::async_trait;
use futures::stream::{self, Stream};
use siphon_core::config::PaginationConfig;
use siphon_core::dedup::Deduplicator;
use siphon_core::error::HarvestError;
use siphon_core::models::{Accumulator, Cursor, DateWindow, Page, Query};
use tokio::time::sleep;
use tracing::{debug, info, warn};

/// Something that can serve one page of results for a query.
#[async_trait]
pub trait PageSource: Send + Sync {
    /// Fetches the page starting at `cursor`, or the first page if `None`.
    async fn fetch_page(&self, query: &Query, cursor: Option<&Cursor>)
        -> Result<Page, HarvestError>;
}

/// Why pagination ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopReason {
    /// The last page carried no continuation.
    Exhausted,
    /// `max_requests` pages were fetched.
    BudgetSpent,
    /// The server returned a cursor that had already been consumed.
    RepeatedCursor(Cursor),
    /// A non-fatal error ended this query; earlier pages are kept.
    Failed(String),
}

/// Lazy, finite sequence of pages for one query.
pub struct Paginator<'a, S: PageSource + ?Sized> {
    source: &'a S,
    query: Query,
    config: PaginationConfig,
    cursor: Option<Cursor>,
    consumed: HashSet<Cursor>,
    requests: usize,
    stop: Option<StopReason>,
}

impl<'a, S: PageSource + ?Sized> Paginator<'a, S> {
    pub fn new(source: &'a S, query: Query, config: PaginationConfig) -> Self {
        Self {
            source,
            query,
            config,
            cursor: None,
            consumed: HashSet::new(),
            requests: 0,
            stop: None,
        }
    }

    /// Fetches the next page, or returns `None` once pagination has ended.
    ///
    /// An error is yielded once and ends the sequence.
    pub async fn next_page(&mut self) -> Option<Result<Page, HarvestError>> {
        if self.stop.is_some() {
            return None;
        }
        if let Some(max) = self.config.max_requests {
            if self.requests >= max {
                debug!(requests = self.requests, "Request budget spent");
                self.stop = Some(StopReason::BudgetSpent);
                return None;
            }
        }
        if self.requests > 0 && !self.config.inter_page_delay.is_zero() {
            sleep(self.config.inter_page_delay).await;
        }

        match self.source.fetch_page(&self.query, self.cursor.as_ref()).await {
            Ok(page) => {
                self.requests += 1;
                if let Some(used) = self.cursor.take() {
                    self.consumed.insert(used);
                }
                match &page.next {
                    None => {
                        debug!(query = %self.query.expression, "No further pages available");
                        self.stop = Some(StopReason::Exhausted);
                    }
                    Some(next) if self.consumed.contains(next) => {
                        warn!(cursor = %next, "Server repeated a consumed cursor, stopping");
                        self.stop = Some(StopReason::RepeatedCursor(next.clone()));
                    }
                    Some(next) => self.cursor = Some(next.clone()),
                }
                Some(Ok(page))
            }
            Err(e) => {
                self.stop = Some(StopReason::Failed(e.to_string()));
                Some(Err(e))
            }
        }
    }

    /// Number of successful page requests so far.
    pub fn requests(&self) -> usize {
        self.requests
    }

    pub fn stop_reason(&self) -> Option<&StopReason> {
        self.stop.as_ref()
    }

    /// Turns the paginator into a `Stream` of pages.
    pub fn into_stream(self) -> impl Stream<Item = Result<Page, HarvestError>> + 'a {
        stream::unfold(self, |mut paginator| async move {
            paginator
                .next_page()
                .await
                .map(|item| (item, paginator))
        })
    }
}

/// Result of draining one query.
#[derive(Debug, Clone)]
pub struct Harvest {
    pub accumulator: Accumulator,
    pub pages: usize,
    /// Sum of per-page record counts as served, before deduplication.
    pub served: usize,
    pub stop: StopReason,
}

/// Drains every page of `query` into an accumulator.
///
/// # Errors
///
/// Only fatal errors (see [`HarvestError::is_fatal`]) are returned. Any other
/// error ends the query with [`StopReason::Failed`] and keeps the records
/// gathered so far.
pub async fn harvest<S: PageSource + ?Sized>(
    source: &S,
    query: Query,
    config: &PaginationConfig,
    dedup: &mut Deduplicator,
) -> Result<Harvest, HarvestError> {
    let mut paginator = Paginator::new(source, query, config.clone());
    let mut accumulator = Accumulator::new();
    let mut pages = 0;
    let mut served = 0;

    while let Some(item) = paginator.next_page().await {
        match item {
            Ok(page) => {
                pages += 1;
                served += page.records.len();
                let taken = accumulator.absorb_with(page, dedup);
                debug!(page = pages, taken, total = accumulator.len(), "Absorbed page");
            }
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => warn!(error = %e, pages, "Pagination failed, keeping partial results"),
        }
    }

    let stop = paginator
        .stop_reason()
        .cloned()
        .unwrap_or(StopReason::Exhausted);
    Ok(Harvest {
        accumulator,
        pages,
        served,
        stop,
    })
}

/// Per-window outcome of a windowed harvest.
#[derive(Debug, Clone)]
pub struct WindowReport {
    pub window: DateWindow,
    pub pages: usize,
    pub records: usize,
    pub stop: StopReason,
}

/// Result of a windowed harvest, windows in chronological order.
#[derive(Debug, Clone, Default)]
pub struct WindowedHarvest {
    pub accumulator: Accumulator,
    pub windows: Vec<WindowReport>,
}

impl WindowedHarvest {
    pub fn failed_windows(&self) -> usize {
        self.windows
            .iter()
            .filter(|w| matches!(w.stop, StopReason::Failed(_)))
            .count()
    }
}

/// Runs `base` once per window, paginating each window to completion before
/// moving on to the next.
///
/// # Errors
///
/// Only fatal errors are returned; a failing window is recorded and skipped.
pub async fn harvest_windows<S: PageSource + ?Sized>(
    source: &S,
    base: &Query,
    windows: &[DateWindow],
    config: &PaginationConfig,
    dedup: &mut Deduplicator,
) -> Result<WindowedHarvest, HarvestError> {
    let mut result = WindowedHarvest::default();

    for window in windows {
        info!(
            query = %base.expression,
            start = %window.start,
            end = %window.end,
            "Querying window"
        );
        let harvest = harvest(source, base.within(*window), config, dedup).await?;
        let records = harvest.accumulator.len();
        info!(
            start = %window.start,
            end = %window.end,
            pages = harvest.pages,
            records,
            stop = ?harvest.stop,
            "Window complete"
        );
        result.windows.push(WindowReport {
            window: *window,
            pages: harvest.pages,
            records,
            stop: harvest.stop,
        });
        result.accumulator.extend(harvest.accumulator);
    }

    Ok(result)
}
