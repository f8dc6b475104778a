//! Bounded-depth crawl over public profiles.
//!
//! Seeds sit at depth 0. Every profile is scraped and saved; a profile below
//! the depth bound also has its follow lists, posts and post comments
//! harvested, and each commenter becomes a profile of the next level. Levels
//! run one after another, the profiles of a level concurrently.

use chrono::Utc;
use futures::stream::{self, StreamExt};
use siphon_client::{harvest, CommentSummary, ConnectionKind, MediaDownloader, WebClient};
use siphon_core::config::{CrawlConfig, PaginationConfig};
use siphon_core::crawl::{handle_from_url, CrawlFrontier, FrontierEntry};
use siphon_core::error::HarvestError;
use siphon_core::models::Query;
use siphon_core::stats::{BatchHarvestSummary, HarvestStats, UnitOutcome, UnitResult};
use tracing::{info, warn};

use super::{download, settle, targets, HarvestContext};
use crate::records::{profile_post_ids, PostRecord, ProfileRecord};

/// What visiting one profile produced.
#[derive(Debug, Default)]
struct Visit {
    stats: HarvestStats,
    commenters: Vec<String>,
}

struct Crawler<'a> {
    ctx: &'a HarvestContext,
    web: WebClient,
    downloader: Option<MediaDownloader>,
    config: CrawlConfig,
    comment_page_size: u32,
}

pub async fn run(
    ctx: &HarvestContext,
    seeds: Vec<String>,
    max_depth: Option<usize>,
    media: bool,
    cookie: Option<String>,
) -> Result<BatchHarvestSummary, HarvestError> {
    let section = &ctx.file.crawl;
    let seeds = targets(seeds, &section.seeds, "crawl seeds")?;

    let mut config = section.to_config();
    if let Some(depth) = max_depth {
        config.max_depth = depth;
    }
    config.concurrency = ctx.concurrency(config.concurrency);

    let mut builder = ctx
        .client()
        .header("Referer", section.base_url.clone())
        .header("Accept-Language", "en-US,en;q=0.9");
    if let Some(cookie) = cookie.or_else(|| section.cookie.clone()) {
        builder = builder.header("Cookie", cookie);
    }
    let http = builder.build()?;

    let crawler = Crawler {
        ctx,
        web: WebClient::new(http.clone(), &section.base_url, section.signing.clone())?,
        downloader: (media && section.download_media).then(|| MediaDownloader::new(http)),
        comment_page_size: section.comment_page_size.max(1),
        config,
    };

    let mut frontier = CrawlFrontier::new(crawler.config.max_depth);
    for seed in &seeds {
        frontier.push(handle_from_url(seed), 0);
    }

    let mut summary = BatchHarvestSummary::new();
    loop {
        let level = frontier.next_level(usize::MAX);
        let Some(depth) = level.first().map(|e| e.depth) else {
            break;
        };
        let expand = frontier.can_expand(depth);
        info!(depth, profiles = level.len(), expand, "Crawling level");

        let crawler = &crawler;
        let visits: Vec<(FrontierEntry, Result<Visit, HarvestError>)> = stream::iter(level)
            .map(|entry| async move {
                let result = crawler.visit(&entry, expand).await;
                (entry, result)
            })
            .buffer_unordered(crawler.config.concurrency)
            .collect()
            .await;

        for (entry, result) in visits {
            match result {
                Ok(visit) => {
                    let queued = visit
                        .commenters
                        .iter()
                        .filter(|handle| frontier.push(handle, entry.depth + 1))
                        .count();
                    info!(
                        handle = %entry.handle,
                        depth = entry.depth,
                        queued,
                        "Profile crawled"
                    );
                    summary.add(UnitResult::success(entry.handle, visit.stats));
                }
                Err(e) => summary.add(settle(&entry.handle, Err(e))?),
            }
        }
    }

    info!(visited = frontier.visited_count(), "Crawl finished");
    Ok(summary)
}

impl Crawler<'_> {
    async fn visit(&self, entry: &FrontierEntry, expand: bool) -> Result<Visit, HarvestError> {
        let info = self.web.profile(&entry.handle).await?;
        let mut record = ProfileRecord::from_user_info(&info, self.web.base_url(), Utc::now());
        if record.user_id.is_empty() {
            return Err(HarvestError::PayloadShape(format!(
                "profile {} carries no user id",
                entry.handle
            )));
        }
        let user_id = record.user_id.clone();
        if record.is_bot {
            info!(handle = %entry.handle, score = record.bot_score, "Profile looks automated");
        }

        let mut visit = Visit::default();
        if let Some(downloader) = &self.downloader {
            if !record.avatar_url.is_empty() {
                let path = self.ctx.layout.avatar(&user_id);
                let outcome = download(self.ctx, downloader, &record.avatar_url, &path).await;
                visit.stats.record(outcome);
            }
        }

        if expand {
            record.followers_user_ids = self.connections(&user_id, ConnectionKind::Followers).await?;
            record.following_user_ids = self.connections(&user_id, ConnectionKind::Following).await?;

            for post_id in profile_post_ids(&info, self.config.max_posts) {
                match self.visit_post(&entry.handle, &user_id, &post_id, &mut visit.stats).await {
                    Ok(commenters) => {
                        visit.stats.record(UnitOutcome::Written);
                        visit.commenters.extend(commenters);
                    }
                    Err(e) if e.is_fatal() => return Err(e),
                    Err(e) => {
                        warn!(post_id = %post_id, error = %e, "Post failed");
                        visit.stats.record(UnitOutcome::Failed);
                    }
                }
            }
        }

        self.ctx
            .json
            .write(&self.ctx.layout.profile(&user_id), &record)
            .await?;
        visit.stats.record(UnitOutcome::Written);
        visit.stats.add_records(1);
        Ok(visit)
    }

    /// Follow-graph ids; a failed listing leaves the list empty.
    async fn connections(&self, user_id: &str, kind: ConnectionKind) -> Result<Vec<String>, HarvestError> {
        match self
            .web
            .connections(user_id, kind, self.config.max_connections)
            .await
        {
            Ok(ids) => Ok(ids),
            Err(e) if e.is_fatal() => Err(e),
            Err(e) => {
                warn!(user_id, ?kind, error = %e, "Connection listing failed");
                Ok(Vec::new())
            }
        }
    }

    /// Saves one post with its comments; returns the commenter handles.
    async fn visit_post(
        &self,
        handle: &str,
        user_id: &str,
        post_id: &str,
        stats: &mut HarvestStats,
    ) -> Result<Vec<String>, HarvestError> {
        let item = self.web.post(handle, post_id).await?;

        let max_comments = self.config.max_comments;
        let page_size = self.comment_page_size;
        let pagination = PaginationConfig {
            page_size,
            max_requests: Some(max_comments.div_ceil(page_size as usize)),
            ..PaginationConfig::default()
        };
        let mut dedup = self.ctx.dedup();
        let result = harvest(
            &self.web.comments(),
            Query::new(post_id, page_size),
            &pagination,
            &mut dedup,
        )
        .await?;
        let comments: Vec<CommentSummary> = result
            .accumulator
            .records()
            .iter()
            .take(max_comments)
            .map(CommentSummary::from_raw)
            .collect();

        let record = PostRecord::from_item(&item, &comments, Utc::now());
        self.ctx
            .json
            .write(&self.ctx.layout.post(user_id, post_id), &record)
            .await?;
        stats.add_records(1 + comments.len());

        if let Some(downloader) = &self.downloader {
            if !record.video_url.is_empty() {
                let path = self.ctx.layout.post_video(user_id, post_id);
                stats.record(download(self.ctx, downloader, &record.video_url, &path).await);
            }
        }

        Ok(comments
            .into_iter()
            .map(|c| c.unique_id)
            .filter(|h| !h.is_empty())
            .collect())
    }
}
