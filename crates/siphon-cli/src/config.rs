use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// CLI configuration parsed from command line arguments and environment variables
#[derive(Parser, Debug)]
#[command(name = "siphon")]
#[command(
    author,
    version,
    about = "Paginated, rate-limited harvester for social and file-hosting APIs"
)]
#[command(after_help = "Examples:
  siphon token
  siphon search \"rust lang\" --request-limit 3
  siphon videos someone --from 2024-01-01 --to 2025-02-20
  siphon crawl https://www.tiktok.com/@someone --max-depth 1
  siphon files https://example.org/reports/ --limit 20")]
pub struct Config {
    /// Path to the siphon.toml harvest file
    #[arg(long, global = true, env = "SIPHON_CONFIG", value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Output directory (overrides [output].dir)
    #[arg(short, long, global = true, value_name = "DIR")]
    pub output: Option<PathBuf>,

    /// Maximum number of concurrent fetches
    #[arg(long, global = true, value_name = "N")]
    pub concurrency: Option<usize>,

    /// Log at debug level unless RUST_LOG says otherwise
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

/// Client credentials for the research API
#[derive(Args, Debug, Clone)]
pub struct ResearchCredentials {
    /// Research API client key
    #[arg(long, env = "TIKTOK_CLIENT_KEY", hide_env_values = true)]
    pub client_key: String,

    /// Research API client secret
    #[arg(long, env = "TIKTOK_CLIENT_SECRET", hide_env_values = true)]
    pub client_secret: String,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Fetch a research API access token and save it
    Token {
        #[command(flatten)]
        credentials: ResearchCredentials,
    },
    /// Harvest recent posts matching one or more search queries
    #[command(after_help = "Example: siphon search \"Donald J Trump\" --max-results 100")]
    Search {
        /// Search expressions (defaults to [search].queries)
        queries: Vec<String>,

        /// Maximum number of page requests per query
        #[arg(long, value_name = "N")]
        request_limit: Option<usize>,

        /// Results per page (10-100)
        #[arg(long, value_name = "N")]
        max_results: Option<u32>,

        /// Bearer token for the search API
        #[arg(long, env = "X_BEARER_TOKEN", hide_env_values = true)]
        bearer_token: String,
    },
    /// Harvest user info, videos and comments through the research API
    #[command(after_help = "Examples:
  siphon videos alice bob --from 2024-01-01 --to 2024-12-31
  siphon videos https://www.tiktok.com/@alice --no-comments")]
    Videos {
        /// Usernames or profile URLs (defaults to [research].usernames)
        usernames: Vec<String>,

        /// First day of the range (YYYY-MM-DD)
        #[arg(long, value_name = "DATE")]
        from: Option<NaiveDate>,

        /// Last day of the range, inclusive (YYYY-MM-DD)
        #[arg(long, value_name = "DATE")]
        to: Option<NaiveDate>,

        /// Days per query window
        #[arg(long, value_name = "DAYS")]
        window_days: Option<u32>,

        /// Skip per-video comment harvesting
        #[arg(long)]
        no_comments: bool,

        #[command(flatten)]
        credentials: ResearchCredentials,
    },
    /// Walk public profiles, posts and commenters up to a depth
    Crawl {
        /// Profile URLs or handles (defaults to [crawl].seeds)
        seeds: Vec<String>,

        /// Deepest level to expand; seeds are at depth 0
        #[arg(long, value_name = "N")]
        max_depth: Option<usize>,

        /// Do not download avatars and post videos
        #[arg(long)]
        no_media: bool,

        /// Cookie header for web requests (overrides [crawl].cookie)
        #[arg(long, env = "SIPHON_WEB_COOKIE", hide_env_values = true)]
        cookie: Option<String>,
    },
    /// Download linked files (pdf, txt, ...) from web pages
    Files {
        /// Page URLs to scan (defaults to [files].sites)
        sites: Vec<String>,

        /// Maximum number of files to download in total
        #[arg(long, value_name = "N")]
        limit: Option<usize>,

        /// File extension to collect; repeat for several
        #[arg(long = "ext", value_name = "EXT")]
        extensions: Vec<String>,
    },
}

impl Command {
    /// Subcommand name, used to label the run in logs.
    pub fn name(&self) -> &'static str {
        match self {
            Command::Token { .. } => "token",
            Command::Search { .. } => "search",
            Command::Videos { .. } => "videos",
            Command::Crawl { .. } => "crawl",
            Command::Files { .. } => "files",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_search() {
        let config = Config::try_parse_from([
            "siphon",
            "search",
            "rust",
            "tokio",
            "--request-limit",
            "3",
            "--bearer-token",
            "t",
        ])
        .unwrap();
        match config.command {
            Command::Search {
                queries,
                request_limit,
                max_results,
                bearer_token,
            } => {
                assert_eq!(queries, vec!["rust", "tokio"]);
                assert_eq!(request_limit, Some(3));
                assert_eq!(max_results, None);
                assert_eq!(bearer_token, "t");
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_parse_videos_with_dates_and_global_flags() {
        let config = Config::try_parse_from([
            "siphon",
            "videos",
            "alice",
            "--from",
            "2024-01-01",
            "--to",
            "2024-03-05",
            "--no-comments",
            "--client-key",
            "k",
            "--client-secret",
            "s",
            "--output",
            "/tmp/out",
            "-v",
        ])
        .unwrap();
        assert!(config.verbose);
        assert_eq!(config.output, Some(PathBuf::from("/tmp/out")));
        match config.command {
            Command::Videos {
                usernames,
                from,
                to,
                no_comments,
                credentials,
                ..
            } => {
                assert_eq!(usernames, vec!["alice"]);
                assert_eq!(from, NaiveDate::from_ymd_opt(2024, 1, 1));
                assert_eq!(to, NaiveDate::from_ymd_opt(2024, 3, 5));
                assert!(no_comments);
                assert_eq!(credentials.client_key, "k");
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_rejects_bad_date() {
        let result = Config::try_parse_from([
            "siphon",
            "videos",
            "--from",
            "01/01/2024",
            "--client-key",
            "k",
            "--client-secret",
            "s",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_parse_files_extensions() {
        let config = Config::try_parse_from([
            "siphon",
            "files",
            "https://example.org",
            "--ext",
            "pdf",
            "--ext",
            "csv",
            "--limit",
            "5",
        ])
        .unwrap();
        match config.command {
            Command::Files {
                sites,
                limit,
                extensions,
            } => {
                assert_eq!(sites, vec!["https://example.org"]);
                assert_eq!(limit, Some(5));
                assert_eq!(extensions, vec!["pdf", "csv"]);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_command_name() {
        let config = Config::try_parse_from(["siphon", "crawl", "alice"]).unwrap();
        assert_eq!(config.command.name(), "crawl");
    }

    #[test]
    fn test_verify_cli() {
        use clap::CommandFactory;
        Config::command().debug_assert();
    }
}
