//! Command implementations.
//!
//! Every command turns its targets into units of work, runs them with bounded
//! concurrency and reports one [`UnitResult`] per target. Fatal errors
//! (authentication, configuration) abort the command; anything else fails
//! only the unit it happened in.

pub mod crawl;
pub mod files;
pub mod search;
pub mod token;
pub mod videos;

use std::path::{Path, PathBuf};

use siphon_client::{ApiClient, ApiClientBuilder, MediaDownloader};
use siphon_core::config::HarvestFile;
use siphon_core::dedup::Deduplicator;
use siphon_core::error::HarvestError;
use siphon_core::stats::{BatchHarvestSummary, HarvestStats, UnitOutcome, UnitResult};
use siphon_store::{JsonSink, MediaSink, OutputLayout};
use tracing::{debug, warn};
use url::Url;

use crate::config::Command;

/// Fan-out used when neither the flag nor the harvest file sets one.
pub const DEFAULT_CONCURRENCY: usize = 4;

/// Everything a command needs besides its own arguments.
#[derive(Debug, Clone)]
pub struct HarvestContext {
    pub file: HarvestFile,
    pub layout: OutputLayout,
    pub json: JsonSink,
    pub media: MediaSink,
    concurrency: Option<usize>,
}

impl HarvestContext {
    /// `output` and `concurrency` are command-line overrides of the harvest file.
    pub fn new(file: HarvestFile, output: Option<PathBuf>, concurrency: Option<usize>) -> Self {
        let root = output.unwrap_or_else(|| file.output.dir.clone());
        Self {
            layout: OutputLayout::new(root),
            json: JsonSink::new(),
            media: MediaSink::new(),
            concurrency,
            file,
        }
    }

    /// Client builder carrying the configured timeouts, retries and rate limits.
    pub fn client(&self) -> ApiClientBuilder {
        ApiClient::builder(self.file.http.to_config()).rate_limit(self.file.rate_limit.to_config())
    }

    /// Fresh seen-set under the configured dedup policy.
    pub fn dedup(&self) -> Deduplicator {
        self.file.dedup.policy.deduplicator()
    }

    /// Concurrency override, or `default`.
    pub fn concurrency(&self, default: usize) -> usize {
        self.concurrency.unwrap_or(default).max(1)
    }
}

/// Runs `command` to completion.
///
/// # Errors
///
/// Returns the first fatal error. Non-fatal failures are reported in the
/// summary instead.
pub async fn run(ctx: &HarvestContext, command: Command) -> Result<BatchHarvestSummary, HarvestError> {
    match command {
        Command::Token { credentials } => token::run(ctx, &credentials).await,
        Command::Search {
            queries,
            request_limit,
            max_results,
            bearer_token,
        } => search::run(ctx, queries, request_limit, max_results, &bearer_token).await,
        Command::Videos {
            usernames,
            from,
            to,
            window_days,
            no_comments,
            credentials,
        } => {
            let job = videos::VideoJob {
                usernames,
                from,
                to,
                window_days,
                comments: !no_comments,
                credentials,
            };
            videos::run(ctx, job).await
        }
        Command::Crawl {
            seeds,
            max_depth,
            no_media,
            cookie,
        } => crawl::run(ctx, seeds, max_depth, !no_media, cookie).await,
        Command::Files {
            sites,
            limit,
            extensions,
        } => files::run(ctx, sites, limit, extensions).await,
    }
}

/// Turns the outcome of one unit into its result, passing fatal errors on.
pub(crate) fn settle(
    target: &str,
    result: Result<HarvestStats, HarvestError>,
) -> Result<UnitResult, HarvestError> {
    match result {
        Ok(stats) => Ok(UnitResult::success(target, stats)),
        Err(e) if e.is_fatal() => Err(e),
        Err(e) => {
            warn!(unit = target, error = %e, "Unit failed");
            Ok(UnitResult::failure(target, e.to_string()))
        }
    }
}

pub(crate) fn summarize(results: Vec<UnitResult>) -> BatchHarvestSummary {
    let mut summary = BatchHarvestSummary::new();
    for result in results {
        summary.add(result);
    }
    summary
}

/// Returns `explicit` unless it is empty, in which case `configured`.
///
/// # Errors
///
/// `HarvestError::Config` when both are empty.
pub(crate) fn targets(
    explicit: Vec<String>,
    configured: &[String],
    what: &str,
) -> Result<Vec<String>, HarvestError> {
    let targets = if explicit.is_empty() {
        configured.to_vec()
    } else {
        explicit
    };
    if targets.is_empty() {
        return Err(HarvestError::Config(format!(
            "no {} given on the command line or in the harvest file",
            what
        )));
    }
    Ok(targets)
}

/// Downloads `url` to `path`.
///
/// Failures are logged and reported as [`UnitOutcome::Failed`]; a URL that was
/// already fetched in this run is [`UnitOutcome::Skipped`].
pub(crate) async fn download(
    ctx: &HarvestContext,
    downloader: &MediaDownloader,
    url: &str,
    path: &Path,
) -> UnitOutcome {
    match fetch_to(ctx, downloader, url, path).await {
        Ok(Some(bytes)) => {
            debug!(url, path = %path.display(), bytes, "Downloaded");
            UnitOutcome::Written
        }
        Ok(None) => UnitOutcome::Skipped,
        Err(e) => {
            warn!(url, error = %e, "Download failed");
            UnitOutcome::Failed
        }
    }
}

async fn fetch_to(
    ctx: &HarvestContext,
    downloader: &MediaDownloader,
    url: &str,
    path: &Path,
) -> Result<Option<u64>, HarvestError> {
    let url = Url::parse(url).map_err(|e| HarvestError::InvalidUrl(format!("{}: {}", url, e)))?;
    match downloader.fetch(url).await? {
        Some(stream) => ctx.media.write_stream(path, stream).await.map(Some),
        None => Ok(None),
    }
}
