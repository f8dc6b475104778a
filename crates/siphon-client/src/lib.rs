//! Siphon Client - HTTP clients for the harvested APIs
//!
//! This crate provides:
//!
//! - [`http`] - the shared client with rate-limit and retry handling
//! - [`paginate`] - cursor pagination over any [`PageSource`]
//! - [`token`] - client-credentials token exchange
//! - [`search`] - recent-search endpoint
//! - [`research`] - research API user, video and comment endpoints
//! - [`web`] - public profile/post pages and their list APIs
//! - [`links`] and [`download`] - file link discovery and streamed downloads
//!
//! # Overview
//!
//! Every endpoint goes through one [`ApiClient`], so throttling waits and
//! retries behave the same everywhere. Endpoints that return result pages
//! implement [`PageSource`] and are drained with [`harvest`] or
//! [`harvest_windows`].

pub mod download;
pub mod http;
pub mod links;
pub mod paginate;
pub mod research;
pub mod search;
pub mod token;
pub mod web;

pub use download::{ByteStream, MediaDownloader};
pub use http::{endpoint, ApiClient, ApiClientBuilder};
pub use links::find_file_links;
pub use paginate::{
    harvest, harvest_windows, Harvest, PageSource, Paginator, StopReason, WindowReport,
    WindowedHarvest,
};
pub use research::ResearchApi;
pub use search::RecentSearch;
pub use token::{Credentials, TokenProvider};
pub use web::{CommentSummary, ConnectionKind, WebClient};
