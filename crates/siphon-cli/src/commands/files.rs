use siphon_client::links::extension_of;
use siphon_client::{find_file_links, ApiClient, MediaDownloader};
use siphon_core::error::HarvestError;
use siphon_core::stats::{BatchHarvestSummary, HarvestStats, UnitOutcome, UnitResult};
use tracing::{info, warn};
use url::Url;

use super::{download, targets, HarvestContext};

/// Scans each site for file links and downloads them, sites in order, until
/// `limit` files have been written in total.
///
/// Every failure, authentication included, fails only the site it happened on.
pub async fn run(
    ctx: &HarvestContext,
    sites: Vec<String>,
    limit: Option<usize>,
    extensions: Vec<String>,
) -> Result<BatchHarvestSummary, HarvestError> {
    let section = &ctx.file.files;
    let sites = targets(sites, &section.sites, "sites")?;
    let extensions = if extensions.is_empty() {
        section.extensions.clone()
    } else {
        extensions
    };
    let mut remaining = limit.unwrap_or(section.limit);

    let http = ctx.client().build()?;
    let downloader = MediaDownloader::new(http.clone());
    info!(sites = sites.len(), limit = remaining, ?extensions, "Starting file harvest");

    let mut summary = BatchHarvestSummary::new();
    for site in sites {
        if remaining == 0 {
            info!("File limit reached");
            break;
        }
        let result = harvest_site(ctx, &http, &downloader, &site, &extensions, &mut remaining).await;
        match result {
            Ok(stats) => summary.add(UnitResult::success(site, stats)),
            Err(e) => {
                warn!(site = %site, error = %e, "Site failed");
                summary.add(UnitResult::failure(site, e.to_string()));
            }
        }
    }
    Ok(summary)
}

async fn harvest_site(
    ctx: &HarvestContext,
    http: &ApiClient,
    downloader: &MediaDownloader,
    site: &str,
    extensions: &[String],
    remaining: &mut usize,
) -> Result<HarvestStats, HarvestError> {
    let base = Url::parse(site).map_err(|e| HarvestError::InvalidUrl(format!("{}: {}", site, e)))?;
    let html = http.get_text(base.clone()).await?;
    let links = find_file_links(&html, &base, extensions);
    info!(site, links = links.len(), "Found file links");

    let mut stats = HarvestStats::new();
    let mut n = 0;
    for link in links {
        if *remaining == 0 {
            break;
        }
        let ext = extension_of(&link).unwrap_or("bin").to_string();
        n += 1;
        let path = ctx.layout.file(site, n, &ext);
        let outcome = download(ctx, downloader, link.as_str(), &path).await;
        if outcome == UnitOutcome::Written {
            *remaining -= 1;
            stats.add_records(1);
        }
        stats.record(outcome);
    }
    Ok(stats)
}
