//! Research API endpoints: user info, windowed video query and comment list.
//!
//! Every call is a JSON POST authenticated with the bearer token obtained by
//! [`crate::TokenProvider`]. The response fields to return are chosen through
//! the `fields` query parameter.

use async_trait::async_trait;
use reqwest::Url;
use serde_json::{json, Value};
use siphon_core::error::HarvestError;
use siphon_core::extract::{array_at, json_path};
use siphon_core::models::{Cursor, DateWindow, Page, Query};
use tracing::{debug, instrument};

use crate::http::{endpoint, ApiClient};
use crate::paginate::PageSource;

pub const USER_INFO_FIELDS: &str = "display_name,bio_description,avatar_url,is_verified,\
follower_count,following_count,likes_count,video_count";

pub const VIDEO_FIELDS: &str = "id,like_count,comment_count,share_count";

pub const COMMENT_FIELDS: &str = "id,text,like_count,reply_count,parent_comment_id,create_time";

/// Entry point to the research endpoints.
///
/// # Examples
///
/// ```no_run
/// use siphon_client::{ApiClient, ResearchApi};
/// use siphon_core::HttpConfig;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let http = ApiClient::builder(HttpConfig::default())
///     .bearer("clt.token")
///     .build()?;
/// let api = ResearchApi::new(http, "https://open.tiktokapis.com")?;
/// let info = api.user_info("someone").await?;
/// println!("{}", info["data"]["display_name"]);
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Debug)]
pub struct ResearchApi {
    http: ApiClient,
    user_info_url: Url,
    video_url: Url,
    comment_url: Url,
}

fn with_fields(mut url: Url, fields: &str) -> Url {
    url.query_pairs_mut().append_pair("fields", fields);
    url
}

impl ResearchApi {
    pub fn new(http: ApiClient, base_url: &str) -> Result<Self, HarvestError> {
        Ok(Self {
            http,
            user_info_url: with_fields(
                endpoint(base_url, "v2/research/user/info/")?,
                USER_INFO_FIELDS,
            ),
            video_url: with_fields(
                endpoint(base_url, "v2/research/video/query/")?,
                VIDEO_FIELDS,
            ),
            comment_url: with_fields(
                endpoint(base_url, "v2/research/video/comment/list/")?,
                COMMENT_FIELDS,
            ),
        })
    }

    /// Fetches the profile of `username`. The response body is returned as is.
    #[instrument(skip(self))]
    pub async fn user_info(&self, username: &str) -> Result<Value, HarvestError> {
        self.http
            .post_json(self.user_info_url.clone(), &json!({ "username": username }))
            .await
    }

    /// Page source for a user's videos. The query expression is the username
    /// and every query must carry a date window.
    pub fn videos(&self) -> VideoQuery<'_> {
        VideoQuery { api: self }
    }

    /// Page source for a video's comments. The query expression is the video id.
    pub fn comments(&self) -> CommentQuery<'_> {
        CommentQuery { api: self }
    }
}

/// Builds the video query body for one window and continuation.
pub fn video_request_body(
    username: &str,
    window: &DateWindow,
    max_count: u32,
    cursor: Option<&Cursor>,
) -> Value {
    let mut body = json!({
        "query": {
            "and": [
                { "operation": "EQ", "field_name": "username", "field_values": [username] }
            ]
        },
        "start_date": DateWindow::compact(window.start),
        "end_date": DateWindow::compact(window.end),
        "max_count": max_count,
    });
    match cursor {
        Some(Cursor::Search { cursor, search_id }) => {
            body["cursor"] = json!(cursor);
            body["search_id"] = json!(search_id);
        }
        Some(Cursor::Offset(offset)) => body["cursor"] = json!(offset),
        Some(Cursor::Token(token)) => body["cursor"] = json!(token),
        None => {}
    }
    body
}

/// Builds the comment list body. Numeric ids are sent as numbers.
pub fn comment_request_body(video_id: &str, max_count: u32, cursor: Option<&Cursor>) -> Value {
    let id = video_id
        .parse::<u64>()
        .map(Value::from)
        .unwrap_or_else(|_| Value::from(video_id));
    let offset = match cursor {
        Some(Cursor::Offset(offset)) => *offset,
        Some(Cursor::Search { cursor, .. }) => *cursor,
        Some(Cursor::Token(_)) | None => 0,
    };
    json!({ "video_id": id, "max_count": max_count, "cursor": offset })
}

/// Reads `data.videos` plus its continuation.
pub fn parse_video_page(body: &Value) -> Result<Page, HarvestError> {
    let data = json_path(body, &["data"])?;
    let videos = array_at(data, &["videos"])?;
    Ok(Page::new(videos).with_next(next_cursor(data)))
}

/// Reads `data.comments` plus its continuation.
pub fn parse_comment_page(body: &Value) -> Result<Page, HarvestError> {
    let data = json_path(body, &["data"])?;
    let comments = array_at(data, &["comments"])?;
    Ok(Page::new(comments).with_next(next_cursor(data)))
}

/// `has_more` gates the continuation; a `search_id` scopes it to a session.
fn next_cursor(data: &Value) -> Option<Cursor> {
    let has_more = data.get("has_more").and_then(Value::as_bool).unwrap_or(false);
    if !has_more {
        return None;
    }
    let cursor = data.get("cursor").and_then(Value::as_u64)?;
    match data.get("search_id").and_then(Value::as_str) {
        Some(search_id) if !search_id.is_empty() => Some(Cursor::Search {
            cursor,
            search_id: search_id.to_string(),
        }),
        _ => Some(Cursor::Offset(cursor)),
    }
}

/// Windowed, cursor-paginated video query for one username.
#[derive(Clone, Copy, Debug)]
pub struct VideoQuery<'a> {
    api: &'a ResearchApi,
}

#[async_trait]
impl PageSource for VideoQuery<'_> {
    async fn fetch_page(
        &self,
        query: &Query,
        cursor: Option<&Cursor>,
    ) -> Result<Page, HarvestError> {
        let window = query.window.as_ref().ok_or_else(|| {
            HarvestError::Config(format!(
                "video query for {} needs a date window",
                query.expression
            ))
        })?;
        let body = video_request_body(&query.expression, window, query.page_size, cursor);
        let response = self
            .api
            .http
            .post_json(self.api.video_url.clone(), &body)
            .await?;
        let page = parse_video_page(&response)?;
        debug!(
            username = %query.expression,
            start = %window.start,
            videos = page.records.len(),
            has_more = page.next.is_some(),
            "Fetched video page"
        );
        Ok(page)
    }
}

/// Cursor-paginated comment list for one video.
#[derive(Clone, Copy, Debug)]
pub struct CommentQuery<'a> {
    api: &'a ResearchApi,
}

#[async_trait]
impl PageSource for CommentQuery<'_> {
    async fn fetch_page(
        &self,
        query: &Query,
        cursor: Option<&Cursor>,
    ) -> Result<Page, HarvestError> {
        let body = comment_request_body(&query.expression, query.page_size, cursor);
        let response = self
            .api
            .http
            .post_json(self.api.comment_url.clone(), &body)
            .await?;
        let page = parse_comment_page(&response)?;
        debug!(
            video_id = %query.expression,
            comments = page.records.len(),
            has_more = page.next.is_some(),
            "Fetched comment page"
        );
        Ok(page)
    }
}
