use futures::stream::{self, StreamExt, TryStreamExt};
use siphon_client::search::RECORDS_KEY;
use siphon_client::{harvest, RecentSearch, StopReason};
use siphon_core::config::PaginationConfig;
use siphon_core::error::HarvestError;
use siphon_core::models::Query;
use siphon_core::stats::{BatchHarvestSummary, HarvestStats, UnitOutcome};
use tracing::info;

use super::{settle, summarize, targets, HarvestContext, DEFAULT_CONCURRENCY};

/// Harvests every query into `search/<slug>.json`.
pub async fn run(
    ctx: &HarvestContext,
    queries: Vec<String>,
    request_limit: Option<usize>,
    max_results: Option<u32>,
    bearer_token: &str,
) -> Result<BatchHarvestSummary, HarvestError> {
    let section = &ctx.file.search;
    let queries = targets(queries, &section.queries, "search queries")?;

    let mut pagination = section.pagination();
    if let Some(limit) = request_limit {
        pagination.max_requests = Some(limit);
    }
    if let Some(n) = max_results {
        pagination.page_size = n.clamp(10, 100);
    }

    let client = ctx.client().bearer(bearer_token).build()?;
    let search = RecentSearch::new(client, &section.base_url)?;
    info!(queries = queries.len(), "Starting search harvest");

    let search = &search;
    let pagination = &pagination;
    let results = stream::iter(queries)
        .map(|query| async move {
            let result = harvest_query(ctx, search, &query, pagination).await;
            settle(&query, result)
        })
        .buffer_unordered(ctx.concurrency(DEFAULT_CONCURRENCY))
        .try_collect::<Vec<_>>()
        .await?;

    Ok(summarize(results))
}

async fn harvest_query(
    ctx: &HarvestContext,
    search: &RecentSearch,
    expression: &str,
    pagination: &PaginationConfig,
) -> Result<HarvestStats, HarvestError> {
    let mut dedup = ctx.dedup();
    let query = Query::new(expression, pagination.page_size);
    let result = harvest(search, query, pagination, &mut dedup).await?;

    if let StopReason::Failed(reason) = &result.stop {
        if result.accumulator.is_empty() {
            return Err(HarvestError::Generic(reason.clone()));
        }
    }

    let mut stats = HarvestStats::new();
    stats.add_records(result.accumulator.len());
    let path = ctx.layout.search(expression);
    ctx.json
        .write(&path, &result.accumulator.into_document(RECORDS_KEY))
        .await?;
    stats.record(UnitOutcome::Written);

    info!(
        query = expression,
        pages = result.pages,
        records = stats.records,
        stop = ?result.stop,
        path = %path.display(),
        "Search harvested"
    );
    Ok(stats)
}
