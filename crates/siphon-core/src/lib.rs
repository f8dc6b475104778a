//! Siphon Core - Harvest entities, policies, error handling, and configuration.
//!
//! Nothing in this crate performs I/O beyond reading the harvest file; the
//! HTTP side lives in `siphon-client` and the file side in `siphon-store`.

pub mod bot;
pub mod config;
pub mod crawl;
pub mod dedup;
pub mod error;
pub mod extract;
pub mod models;
pub mod rate_limit;
pub mod retry;
pub mod stats;
pub mod window;

pub use bot::BotSignals;
pub use config::{
    default_config_path, load_harvest_file, CrawlConfig, HarvestFile, HttpConfig,
    PaginationConfig, RateLimitConfig,
};
pub use crawl::{CrawlFrontier, FrontierEntry};
pub use dedup::{DedupPolicy, Deduplicator};
pub use error::HarvestError;
pub use models::{AccessToken, Accumulator, Cursor, DateWindow, Page, Query};
pub use rate_limit::RateLimitState;
pub use retry::{RetryPolicy, StatusClass};
pub use stats::{BatchHarvestSummary, HarvestStats, UnitOutcome, UnitResult};
