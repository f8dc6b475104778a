//! Research API harvest: user info, windowed videos, and per-video comments.

use chrono::{NaiveDate, Utc};
use futures::stream::{self, StreamExt, TryStreamExt};
use serde_json::Value;
use siphon_client::research::ResearchApi;
use siphon_client::{harvest, harvest_windows, StopReason};
use siphon_core::config::{PaginationConfig, ResearchSection};
use siphon_core::crawl::handle_from_url;
use siphon_core::error::HarvestError;
use siphon_core::models::{DateWindow, Query};
use siphon_core::stats::{BatchHarvestSummary, HarvestStats, UnitOutcome};
use siphon_core::window::split_windows;
use tracing::{info, warn};

use super::token::fetch_token;
use super::{settle, summarize, targets, HarvestContext, DEFAULT_CONCURRENCY};
use crate::config::ResearchCredentials;

/// Arguments of the `videos` command.
#[derive(Debug, Clone)]
pub struct VideoJob {
    pub usernames: Vec<String>,
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
    pub window_days: Option<u32>,
    pub comments: bool,
    pub credentials: ResearchCredentials,
}

/// Resolves the date range to harvest. The end defaults to today.
pub fn date_range(
    from: Option<NaiveDate>,
    to: Option<NaiveDate>,
    section: &ResearchSection,
    today: NaiveDate,
) -> Result<DateWindow, HarvestError> {
    let start = from.or(section.start).ok_or_else(|| {
        HarvestError::Config("no start date; pass --from or set research.start".to_string())
    })?;
    let end = to.or(section.end).unwrap_or(today);
    Ok(DateWindow::new(start, end))
}

fn video_id(video: &Value) -> Option<String> {
    match video.get("id")? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

pub async fn run(ctx: &HarvestContext, job: VideoJob) -> Result<BatchHarvestSummary, HarvestError> {
    let section = &ctx.file.research;
    let usernames: Vec<String> = targets(job.usernames, &section.usernames, "usernames")?
        .iter()
        .map(|u| handle_from_url(u).trim_start_matches('@').to_string())
        .collect();

    let range = date_range(job.from, job.to, section, Utc::now().date_naive())?;
    let windows = split_windows(range, job.window_days.unwrap_or(section.window_days))?;
    info!(
        users = usernames.len(),
        start = %range.start,
        end = %range.end,
        windows = windows.len(),
        "Starting video harvest"
    );

    let token = fetch_token(ctx, &job.credentials).await?;
    let client = ctx.client().bearer(&token.access_token).build()?;
    let api = ResearchApi::new(client, &section.base_url)?;

    let api = &api;
    let windows = windows.as_slice();
    let comments = job.comments;
    let results = stream::iter(usernames)
        .map(|user| async move {
            let result = harvest_user(ctx, api, &user, windows, comments).await;
            settle(&user, result)
        })
        .buffer_unordered(ctx.concurrency(DEFAULT_CONCURRENCY))
        .try_collect::<Vec<_>>()
        .await?;

    Ok(summarize(results))
}

async fn harvest_user(
    ctx: &HarvestContext,
    api: &ResearchApi,
    user: &str,
    windows: &[DateWindow],
    comments: bool,
) -> Result<HarvestStats, HarvestError> {
    let section = &ctx.file.research;
    let mut stats = HarvestStats::new();

    match api.user_info(user).await {
        Ok(info) => {
            ctx.json.write(&ctx.layout.user_info(user), &info).await?;
            stats.record(UnitOutcome::Written);
        }
        Err(e) if e.is_fatal() => return Err(e),
        Err(e) => {
            warn!(user, error = %e, "User info failed");
            stats.record(UnitOutcome::Failed);
        }
    }

    let pagination = PaginationConfig {
        page_size: section.max_count,
        ..PaginationConfig::default()
    };
    let mut dedup = ctx.dedup();
    let videos = harvest_windows(
        &api.videos(),
        &Query::new(user, section.max_count),
        windows,
        &pagination,
        &mut dedup,
    )
    .await?;

    if videos.accumulator.is_empty() && videos.failed_windows() == videos.windows.len() {
        let reason = videos
            .windows
            .iter()
            .rev()
            .find_map(|w| match &w.stop {
                StopReason::Failed(reason) => Some(reason.clone()),
                _ => None,
            })
            .unwrap_or_else(|| "no windows to query".to_string());
        return Err(HarvestError::Generic(format!(
            "every window failed for {}: {}",
            user, reason
        )));
    }
    if videos.failed_windows() > 0 {
        warn!(
            user,
            failed = videos.failed_windows(),
            "Some windows failed, keeping the rest"
        );
    }
    let ids: Vec<String> = videos
        .accumulator
        .records()
        .iter()
        .filter_map(video_id)
        .collect();
    stats.add_records(videos.accumulator.len());
    ctx.json.write(
        &ctx.layout.all_videos(user),
        &videos.accumulator.into_document("videos"),
    )
    .await?;
    stats.record(UnitOutcome::Written);
    info!(user, videos = ids.len(), "Videos harvested");

    if !comments || ids.is_empty() {
        return Ok(stats);
    }

    let page_size = section.comment_page_size;
    let outcomes: Vec<(String, Result<usize, HarvestError>)> = stream::iter(ids)
        .map(|id| async move {
            let result = harvest_comments(ctx, api, user, &id, page_size).await;
            (id, result)
        })
        .buffer_unordered(ctx.concurrency(DEFAULT_CONCURRENCY))
        .collect()
        .await;

    for (id, outcome) in outcomes {
        match outcome {
            Ok(n) => {
                stats.add_records(n);
                stats.record(UnitOutcome::Written);
            }
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => {
                warn!(user, video_id = %id, error = %e, "Comment harvest failed");
                stats.record(UnitOutcome::Failed);
            }
        }
    }
    Ok(stats)
}

async fn harvest_comments(
    ctx: &HarvestContext,
    api: &ResearchApi,
    user: &str,
    video_id: &str,
    page_size: u32,
) -> Result<usize, HarvestError> {
    let pagination = PaginationConfig {
        page_size,
        ..PaginationConfig::default()
    };
    let mut dedup = ctx.dedup();
    let result = harvest(
        &api.comments(),
        Query::new(video_id, page_size),
        &pagination,
        &mut dedup,
    )
    .await?;

    if let StopReason::Failed(reason) = &result.stop {
        if result.accumulator.is_empty() {
            return Err(HarvestError::Generic(reason.clone()));
        }
    }

    let count = result.accumulator.len();
    ctx.json.write(
        &ctx.layout.video_comments(user, video_id),
        &result.accumulator.into_document("comments"),
    )
    .await?;
    info!(user, video_id, comments = count, pages = result.pages, "Comments harvested");
    Ok(count)
}
