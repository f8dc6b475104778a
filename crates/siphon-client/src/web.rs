//! Public web pages and the internal list APIs behind them.
//!
//! Profile and post pages embed their state as JSON inside a script tag; the
//! comment and connection lists are served by cursor-paginated JSON APIs
//! that expect the request-signing parameters the browser would send.

use std::collections::BTreeMap;

use async_trait::async_trait;
use reqwest::Url;
use scraper::{Html, Selector};
use serde::Serialize;
use serde_json::Value;
use siphon_core::error::HarvestError;
use siphon_core::extract::{json_path, take_path};
use siphon_core::models::{Cursor, Page, Query};
use tracing::{debug, instrument};

use crate::http::{endpoint, ApiClient};
use crate::paginate::{PageSource, Paginator};
use siphon_core::config::PaginationConfig;

/// Id of the script tag holding a page's embedded state.
pub const REHYDRATION_SCRIPT_ID: &str = "__UNIVERSAL_DATA_FOR_REHYDRATION__";

const PROFILE_PATH: [&str; 3] = ["__DEFAULT_SCOPE__", "webapp.user-detail", "userInfo"];
const POST_PATH: [&str; 4] = [
    "__DEFAULT_SCOPE__",
    "webapp.video-detail",
    "itemInfo",
    "itemStruct",
];

/// Parses the JSON text of the `<script id="{id}">` element.
pub fn extract_script_json(html: &str, id: &str) -> Result<Value, HarvestError> {
    let selector = Selector::parse(&format!(r#"script[id="{}"]"#, id))
        .map_err(|e| HarvestError::Generic(format!("bad selector for {}: {}", id, e)))?;
    let document = Html::parse_document(html);
    let script = document
        .select(&selector)
        .next()
        .ok_or_else(|| HarvestError::PayloadShape(format!("no script with id {}", id)))?;
    let text: String = script.text().collect();
    serde_json::from_str(&text)
        .map_err(|e| HarvestError::PayloadShape(format!("script {} is not JSON: {}", id, e)))
}

/// Returns the `userInfo` object (`user`, `stats`, ...) of a profile page.
pub fn parse_profile_page(html: &str) -> Result<Value, HarvestError> {
    take_path(extract_script_json(html, REHYDRATION_SCRIPT_ID)?, &PROFILE_PATH)
}

/// Returns the `itemStruct` object of a post page.
pub fn parse_post_page(html: &str) -> Result<Value, HarvestError> {
    take_path(extract_script_json(html, REHYDRATION_SCRIPT_ID)?, &POST_PATH)
}

/// Which side of the follow graph to list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionKind {
    Followers,
    Following,
}

impl ConnectionKind {
    fn path(self) -> &'static str {
        match self {
            ConnectionKind::Followers => "api/user/follower/list/",
            ConnectionKind::Following => "api/user/following/list/",
        }
    }
}

/// Client for the public web surface.
#[derive(Clone, Debug)]
pub struct WebClient {
    http: ApiClient,
    base: Url,
    signing: BTreeMap<String, String>,
}

impl WebClient {
    /// `signing` holds extra query parameters appended to every list API call.
    pub fn new(
        http: ApiClient,
        base_url: &str,
        signing: BTreeMap<String, String>,
    ) -> Result<Self, HarvestError> {
        Ok(Self {
            http,
            base: endpoint(base_url, "/")?,
            signing,
        })
    }

    pub fn base_url(&self) -> &str {
        self.base.as_str()
    }

    pub fn profile_url(&self, handle: &str) -> Result<Url, HarvestError> {
        self.join(&format!("@{}", handle))
    }

    pub fn post_url(&self, handle: &str, post_id: &str) -> Result<Url, HarvestError> {
        self.join(&format!("@{}/video/{}", handle, post_id))
    }

    fn join(&self, path: &str) -> Result<Url, HarvestError> {
        self.base
            .join(path)
            .map_err(|e| HarvestError::InvalidUrl(format!("{}{}: {}", self.base, path, e)))
    }

    fn api_url(&self, path: &str, params: &[(&str, String)]) -> Result<Url, HarvestError> {
        let mut url = self.join(path)?;
        {
            let mut pairs = url.query_pairs_mut();
            for (key, value) in params {
                pairs.append_pair(key, value);
            }
            for (key, value) in &self.signing {
                pairs.append_pair(key, value);
            }
        }
        Ok(url)
    }

    /// Fetches a profile page and returns its embedded `userInfo`.
    #[instrument(skip(self))]
    pub async fn profile(&self, handle: &str) -> Result<Value, HarvestError> {
        let html = self.http.get_text(self.profile_url(handle)?).await?;
        parse_profile_page(&html)
    }

    /// Fetches a post page and returns its embedded `itemStruct`.
    #[instrument(skip(self))]
    pub async fn post(&self, handle: &str, post_id: &str) -> Result<Value, HarvestError> {
        let html = self.http.get_text(self.post_url(handle, post_id)?).await?;
        parse_post_page(&html)
    }

    /// Page source for a post's comments. The query expression is the post id.
    pub fn comments(&self) -> WebComments<'_> {
        WebComments { web: self }
    }

    /// Lists up to `max` user ids on one side of `user_id`'s follow graph.
    #[instrument(skip(self))]
    pub async fn connections(
        &self,
        user_id: &str,
        kind: ConnectionKind,
        max: usize,
    ) -> Result<Vec<String>, HarvestError> {
        let source = ConnectionList { web: self, kind };
        let mut paginator = Paginator::new(
            &source,
            Query::new(user_id, 20),
            PaginationConfig::default(),
        );
        let mut ids = Vec::new();
        while ids.len() < max {
            match paginator.next_page().await {
                Some(page) => ids.extend(
                    page?
                        .records
                        .into_iter()
                        .filter_map(|v| v.as_str().map(str::to_string)),
                ),
                None => break,
            }
        }
        ids.truncate(max);
        debug!(user_id, ?kind, count = ids.len(), "Listed connections");
        Ok(ids)
    }
}

/// `has_more` arrives as a bool from some endpoints and 0/1 from others.
fn truthy(value: Option<&Value>) -> bool {
    match value {
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => n.as_i64().is_some_and(|n| n != 0),
        _ => false,
    }
}

fn offset(cursor: Option<&Cursor>) -> u64 {
    match cursor {
        Some(Cursor::Offset(n)) => *n,
        Some(Cursor::Search { cursor, .. }) => *cursor,
        _ => 0,
    }
}

fn next_offset(body: &Value) -> Option<Cursor> {
    if !truthy(body.get("has_more")) {
        return None;
    }
    body.get("cursor").and_then(Value::as_u64).map(Cursor::Offset)
}

/// Reads one comment list response.
///
/// A non-zero `status_code` means the API refused the request.
pub fn parse_web_comment_page(body: &Value) -> Result<Page, HarvestError> {
    let status = json_path(body, &["status_code"])?.as_i64().unwrap_or(-1);
    if status != 0 {
        let message = body
            .get("status_msg")
            .and_then(Value::as_str)
            .unwrap_or("unknown error");
        return Err(HarvestError::PayloadShape(format!(
            "comment API status {}: {}",
            status, message
        )));
    }
    let comments = body
        .get("comments")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();
    let next = if comments.is_empty() {
        None
    } else {
        next_offset(body)
    };
    Ok(Page::new(comments).with_next(next))
}

/// Reads one follower/following list response into a page of uid strings.
pub fn parse_connection_page(body: &Value) -> Result<Page, HarvestError> {
    let users = body
        .get("user_list")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();
    if users.is_empty() {
        return Ok(Page::default());
    }
    let ids = users
        .iter()
        .map(|u| json_path(u, &["user_info", "uid"]).cloned())
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Page::new(ids).with_next(next_offset(body)))
}

/// Offset-paginated comment list for one post.
#[derive(Clone, Copy, Debug)]
pub struct WebComments<'a> {
    web: &'a WebClient,
}

#[async_trait]
impl PageSource for WebComments<'_> {
    async fn fetch_page(
        &self,
        query: &Query,
        cursor: Option<&Cursor>,
    ) -> Result<Page, HarvestError> {
        let url = self.web.api_url(
            "api/comment/list/",
            &[
                ("aweme_id", query.expression.clone()),
                ("count", query.page_size.to_string()),
                ("cursor", offset(cursor).to_string()),
            ],
        )?;
        let body = self.web.http.get_json(url).await?;
        parse_web_comment_page(&body)
    }
}

struct ConnectionList<'a> {
    web: &'a WebClient,
    kind: ConnectionKind,
}

#[async_trait]
impl PageSource for ConnectionList<'_> {
    async fn fetch_page(
        &self,
        query: &Query,
        cursor: Option<&Cursor>,
    ) -> Result<Page, HarvestError> {
        let url = self.web.api_url(
            self.kind.path(),
            &[
                ("user_id", query.expression.clone()),
                ("count", query.page_size.to_string()),
                ("cursor", offset(cursor).to_string()),
            ],
        )?;
        let body = self.web.http.get_json(url).await?;
        parse_connection_page(&body)
    }
}

/// The fields kept from a raw web comment.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CommentSummary {
    pub cid: String,
    pub aweme_id: String,
    pub text: String,
    pub comment_language: String,
    pub digg_count: u64,
    pub reply_comment_total: u64,
    pub author_pin: bool,
    pub create_time: Option<i64>,
    pub nickname: String,
    pub unique_id: String,
}

impl CommentSummary {
    pub fn from_raw(raw: &Value) -> Self {
        let text = |v: Option<&Value>| match v {
            Some(Value::String(s)) => s.clone(),
            Some(Value::Number(n)) => n.to_string(),
            _ => String::new(),
        };
        let user = raw.get("user");
        Self {
            cid: text(raw.get("cid")),
            aweme_id: text(raw.get("aweme_id")),
            text: text(raw.get("text")),
            comment_language: text(raw.get("comment_language")),
            digg_count: raw.get("digg_count").and_then(Value::as_u64).unwrap_or(0),
            reply_comment_total: raw
                .get("reply_comment_total")
                .and_then(Value::as_u64)
                .unwrap_or(0),
            author_pin: raw.get("author_pin").and_then(Value::as_bool).unwrap_or(false),
            create_time: raw.get("create_time").and_then(Value::as_i64),
            nickname: text(user.and_then(|u| u.get("nickname"))),
            unique_id: text(user.and_then(|u| u.get("unique_id"))),
        }
    }
}
