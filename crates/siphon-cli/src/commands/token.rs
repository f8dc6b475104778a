use siphon_client::{Credentials, TokenProvider};
use siphon_core::error::HarvestError;
use siphon_core::models::AccessToken;
use siphon_core::stats::{BatchHarvestSummary, HarvestStats, UnitOutcome, UnitResult};
use tracing::info;

use super::HarvestContext;
use crate::config::ResearchCredentials;

/// Exchanges the client credentials for a token and saves the response body
/// to `access_token.json`.
pub async fn fetch_token(
    ctx: &HarvestContext,
    credentials: &ResearchCredentials,
) -> Result<AccessToken, HarvestError> {
    let provider = TokenProvider::new(ctx.client().build()?, &ctx.file.research.base_url)?;
    let token = provider
        .fetch(&Credentials::new(
            &credentials.client_key,
            &credentials.client_secret,
        ))
        .await?;

    let path = ctx.layout.access_token();
    ctx.json.write(&path, &token.raw).await?;
    info!(path = %path.display(), "Saved access token");
    Ok(token)
}

pub async fn run(
    ctx: &HarvestContext,
    credentials: &ResearchCredentials,
) -> Result<BatchHarvestSummary, HarvestError> {
    let token = fetch_token(ctx, credentials).await?;

    let path = ctx.layout.access_token();
    match token.expires_in {
        Some(secs) => println!(
            "Access token saved to {} (expires in {}s)",
            path.display(),
            secs
        ),
        None => println!("Access token saved to {}", path.display()),
    }

    let mut stats = HarvestStats::new();
    stats.record(UnitOutcome::Written);
    let mut summary = BatchHarvestSummary::new();
    summary.add(UnitResult::success("token", stats));
    Ok(summary)
}
