//! Configuration types for Siphon components.
//!
//! Runtime settings are layered: built-in defaults, then the TOML harvest
//! file (`siphon.toml`), then CLI flags. Credentials never live in the file;
//! they come from the environment.

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::NaiveDate;
use serde::Deserialize;

use crate::dedup::DedupPolicy;
use crate::error::HarvestError;

/// HTTP client configuration for external API calls.
#[derive(Debug, Clone)]
pub struct HttpConfig {
    pub timeout: Duration,
    pub max_retries: u32,
    pub retry_base_delay: Duration,
    pub user_agent: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            max_retries: 3,
            retry_base_delay: Duration::from_secs(2),
            user_agent: "Siphon/0.1 (research-harvester)".to_string(),
        }
    }
}

/// How long to back off when a server throttles us.
#[derive(Debug, Clone, PartialEq)]
pub struct RateLimitConfig {
    /// Added on top of the server's reset hint.
    pub buffer: Duration,
    /// Used when the throttling response carries no reset hint.
    pub fallback: Duration,
    /// Ceiling on a single wait. `None` waits as long as the server asks.
    pub max_wait: Option<Duration>,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            buffer: Duration::from_secs(5),
            fallback: Duration::from_secs(60),
            max_wait: None,
        }
    }
}

/// Per-query pagination settings.
#[derive(Debug, Clone)]
pub struct PaginationConfig {
    pub page_size: u32,
    /// Maximum number of successful page requests. `None` pages until the
    /// server runs out.
    pub max_requests: Option<usize>,
    /// Pause between two successful pages.
    pub inter_page_delay: Duration,
}

impl Default for PaginationConfig {
    fn default() -> Self {
        Self {
            page_size: 100,
            max_requests: None,
            inter_page_delay: Duration::ZERO,
        }
    }
}

/// Bounds for the profile → post → comment → commenter walk.
#[derive(Debug, Clone)]
pub struct CrawlConfig {
    pub max_depth: usize,
    pub max_posts: usize,
    pub max_comments: usize,
    pub max_connections: usize,
    pub concurrency: usize,
}

impl Default for CrawlConfig {
    fn default() -> Self {
        Self {
            max_depth: 2,
            max_posts: 50,
            max_comments: 100,
            max_connections: 100,
            concurrency: 4,
        }
    }
}

// =============================================================================
// Harvest file (siphon.toml)
// =============================================================================

/// Root of the `siphon.toml` harvest file.
///
/// Every section is optional; missing sections fall back to defaults.
///
/// # Example
///
/// ```toml
/// [output]
/// dir = "scraped_data"
///
/// [search]
/// queries = ["rust lang"]
/// request_limit = 5
///
/// [research]
/// usernames = ["someone"]
/// start = "2024-01-01"
/// end = "2025-02-20"
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct HarvestFile {
    pub output: OutputSection,
    pub http: HttpSection,
    pub rate_limit: RateLimitSection,
    pub search: SearchSection,
    pub research: ResearchSection,
    pub crawl: CrawlSection,
    pub files: FilesSection,
    pub dedup: DedupSection,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OutputSection {
    pub dir: PathBuf,
}

impl Default for OutputSection {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("scraped_data"),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HttpSection {
    pub timeout_secs: u64,
    pub max_retries: u32,
    pub retry_base_delay_ms: u64,
    pub user_agent: Option<String>,
}

impl Default for HttpSection {
    fn default() -> Self {
        let http = HttpConfig::default();
        Self {
            timeout_secs: http.timeout.as_secs(),
            max_retries: http.max_retries,
            retry_base_delay_ms: http.retry_base_delay.as_millis() as u64,
            user_agent: None,
        }
    }
}

impl HttpSection {
    pub fn to_config(&self) -> HttpConfig {
        let defaults = HttpConfig::default();
        HttpConfig {
            timeout: Duration::from_secs(self.timeout_secs),
            max_retries: self.max_retries,
            retry_base_delay: Duration::from_millis(self.retry_base_delay_ms),
            user_agent: self.user_agent.clone().unwrap_or(defaults.user_agent),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RateLimitSection {
    pub buffer_secs: u64,
    pub fallback_secs: u64,
    pub max_wait_secs: Option<u64>,
}

impl Default for RateLimitSection {
    fn default() -> Self {
        Self {
            buffer_secs: 5,
            fallback_secs: 60,
            max_wait_secs: None,
        }
    }
}

impl RateLimitSection {
    pub fn to_config(&self) -> RateLimitConfig {
        RateLimitConfig {
            buffer: Duration::from_secs(self.buffer_secs),
            fallback: Duration::from_secs(self.fallback_secs),
            max_wait: self.max_wait_secs.map(Duration::from_secs),
        }
    }
}

/// Recent-search harvest settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SearchSection {
    pub base_url: String,
    pub queries: Vec<String>,
    /// Results per request, 10..=100.
    pub max_results: u32,
    pub request_limit: usize,
    pub inter_page_delay_ms: u64,
}

impl Default for SearchSection {
    fn default() -> Self {
        Self {
            base_url: "https://api.x.com".to_string(),
            queries: Vec::new(),
            max_results: 100,
            request_limit: 5,
            inter_page_delay_ms: 1000,
        }
    }
}

impl SearchSection {
    pub fn pagination(&self) -> PaginationConfig {
        PaginationConfig {
            page_size: self.max_results.clamp(10, 100),
            max_requests: Some(self.request_limit),
            inter_page_delay: Duration::from_millis(self.inter_page_delay_ms),
        }
    }
}

/// Research API harvest settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ResearchSection {
    pub base_url: String,
    pub usernames: Vec<String>,
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
    pub window_days: u32,
    pub max_count: u32,
    pub comments: bool,
    pub comment_page_size: u32,
}

impl Default for ResearchSection {
    fn default() -> Self {
        Self {
            base_url: "https://open.tiktokapis.com".to_string(),
            usernames: Vec::new(),
            start: None,
            end: None,
            window_days: 30,
            max_count: 100,
            comments: true,
            comment_page_size: 50,
        }
    }
}

/// Public web crawl settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CrawlSection {
    pub base_url: String,
    pub seeds: Vec<String>,
    pub max_depth: usize,
    pub max_posts: usize,
    pub max_comments: usize,
    pub max_connections: usize,
    pub concurrency: usize,
    pub comment_page_size: u32,
    pub download_media: bool,
    /// Cookie header sent with every web request.
    pub cookie: Option<String>,
    /// Extra query parameters (request signing) appended to web API calls.
    pub signing: std::collections::BTreeMap<String, String>,
}

impl Default for CrawlSection {
    fn default() -> Self {
        let crawl = CrawlConfig::default();
        Self {
            base_url: "https://www.tiktok.com".to_string(),
            seeds: Vec::new(),
            max_depth: crawl.max_depth,
            max_posts: crawl.max_posts,
            max_comments: crawl.max_comments,
            max_connections: crawl.max_connections,
            concurrency: crawl.concurrency,
            comment_page_size: 20,
            download_media: true,
            cookie: None,
            signing: Default::default(),
        }
    }
}

impl CrawlSection {
    pub fn to_config(&self) -> CrawlConfig {
        CrawlConfig {
            max_depth: self.max_depth,
            max_posts: self.max_posts,
            max_comments: self.max_comments,
            max_connections: self.max_connections,
            concurrency: self.concurrency.max(1),
        }
    }
}

/// File-hosting site harvest settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FilesSection {
    pub sites: Vec<String>,
    pub extensions: Vec<String>,
    pub limit: usize,
}

impl Default for FilesSection {
    fn default() -> Self {
        Self {
            sites: Vec::new(),
            extensions: vec!["pdf".to_string(), "txt".to_string()],
            limit: 100,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct DedupSection {
    pub policy: DedupPolicy,
}

/// Returns the default location of the harvest file:
/// `<config dir>/siphon/siphon.toml`.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("siphon").join("siphon.toml"))
}

/// Loads the harvest file at `path`.
///
/// A missing file is not an error: defaults are returned so that every
/// parameter can come from CLI flags instead.
///
/// # Errors
///
/// Returns `HarvestError::Config` if the file exists but cannot be read or
/// parsed, or if its date range is inverted.
pub fn load_harvest_file(path: &Path) -> Result<HarvestFile, HarvestError> {
    if !path.exists() {
        tracing::debug!(path = %path.display(), "Harvest file not found, using defaults");
        return Ok(HarvestFile::default());
    }

    let raw = std::fs::read_to_string(path)
        .map_err(|e| HarvestError::Config(format!("cannot read {}: {}", path.display(), e)))?;
    let file: HarvestFile = toml::from_str(&raw)
        .map_err(|e| HarvestError::Config(format!("invalid {}: {}", path.display(), e)))?;

    if let (Some(start), Some(end)) = (file.research.start, file.research.end) {
        if start > end {
            return Err(HarvestError::Config(format!(
                "research.start ({}) is after research.end ({})",
                start, end
            )));
        }
    }
    if file.research.window_days == 0 {
        return Err(HarvestError::Config(
            "research.window_days must be at least 1".to_string(),
        ));
    }

    Ok(file)
}
