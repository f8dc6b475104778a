//! Recent-search endpoint (`GET /2/tweets/search/recent`).

use async_trait::async_trait;
use reqwest::Url;
use serde_json::{Map, Value};
use siphon_core::error::HarvestError;
use siphon_core::models::{Cursor, Page, Query};
use tracing::debug;

use crate::http::{endpoint, ApiClient};
use crate::paginate::PageSource;

pub const TWEET_FIELDS: &str = "id,text,author_id,created_at,public_metrics,lang,conversation_id,\
attachments,card_uri,community_id,context_annotations,display_text_range,edit_controls,\
edit_history_tweet_ids,entities,geo,in_reply_to_user_id,media_metadata,non_public_metrics,\
note_tweet,organic_metrics,possibly_sensitive,promoted_metrics,referenced_tweets,reply_settings,\
scopes,source,withheld";

pub const EXPANSIONS: &str = "article.cover_media,article.media_entities,attachments.media_keys,\
attachments.media_source_tweet,attachments.poll_ids,author_id,edit_history_tweet_ids,\
entities.mentions.username,geo.place_id,in_reply_to_user_id,entities.note.mentions.username,\
referenced_tweets.id,referenced_tweets.id.author_id";

pub const MEDIA_FIELDS: &str = "alt_text,duration_ms,height,media_key,non_public_metrics,\
organic_metrics,preview_image_url,promoted_metrics,public_metrics,type,url,variants,width";

pub const POLL_FIELDS: &str = "duration_minutes,end_datetime,id,options,voting_status";

pub const USER_FIELDS: &str = "affiliation,connection_status,created_at,description,entities,id,\
is_identity_verified,location,most_recent_tweet_id,name,parody,pinned_tweet_id,\
profile_banner_url,profile_image_url,protected,public_metrics,receives_your_dm,subscription,\
subscription_type,url,username,verified,verified_followers_count,verified_type,withheld";

pub const PLACE_FIELDS: &str =
    "contained_within,country,country_code,full_name,geo,id,name,place_type";

/// Key under which harvested posts are written.
pub const RECORDS_KEY: &str = "tweets";

/// Page source for the recent-search endpoint.
///
/// The client must carry the bearer token. Records come from `data`,
/// side-tables from `includes`, and the cursor from `meta.next_token`.
#[derive(Clone, Debug)]
pub struct RecentSearch {
    http: ApiClient,
    url: Url,
}

impl RecentSearch {
    pub fn new(http: ApiClient, base_url: &str) -> Result<Self, HarvestError> {
        Ok(Self {
            http,
            url: endpoint(base_url, "2/tweets/search/recent")?,
        })
    }

    /// Builds the request URL for one page.
    pub fn page_url(&self, query: &Query, cursor: Option<&Cursor>) -> Result<Url, HarvestError> {
        let mut url = self.url.clone();
        {
            let mut pairs = url.query_pairs_mut();
            pairs
                .append_pair("query", &query.expression)
                .append_pair("max_results", &query.page_size.clamp(10, 100).to_string())
                .append_pair("sort_order", "recency")
                .append_pair("tweet.fields", TWEET_FIELDS)
                .append_pair("expansions", EXPANSIONS)
                .append_pair("media.fields", MEDIA_FIELDS)
                .append_pair("poll.fields", POLL_FIELDS)
                .append_pair("user.fields", USER_FIELDS)
                .append_pair("place.fields", PLACE_FIELDS);

            if let Some(window) = query.window {
                pairs
                    .append_pair("start_time", &format!("{}T00:00:00Z", window.start))
                    .append_pair("end_time", &format!("{}T23:59:59Z", window.end));
            }

            match cursor {
                None => {}
                Some(Cursor::Token(token)) => {
                    pairs.append_pair("next_token", token);
                }
                Some(other) => {
                    return Err(HarvestError::Generic(format!(
                        "recent search cannot resume from {}",
                        other
                    )))
                }
            }
        }
        Ok(url)
    }
}

#[async_trait]
impl PageSource for RecentSearch {
    async fn fetch_page(
        &self,
        query: &Query,
        cursor: Option<&Cursor>,
    ) -> Result<Page, HarvestError> {
        let url = self.page_url(query, cursor)?;
        let body = self.http.get_json(url).await?;
        let page = parse_search_page(body)?;
        debug!(
            query = %query.expression,
            records = page.records.len(),
            has_next = page.next.is_some(),
            "Fetched search page"
        );
        Ok(page)
    }
}

/// Splits a search response into records, side-tables and the next cursor.
///
/// A response without `data` is an empty page (the endpoint omits it when
/// nothing matched).
pub fn parse_search_page(body: Value) -> Result<Page, HarvestError> {
    let Value::Object(mut body) = body else {
        return Err(HarvestError::PayloadShape(
            "search response is not an object".to_string(),
        ));
    };

    let records = match body.remove("data") {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Array(items)) => items,
        Some(_) => {
            return Err(HarvestError::PayloadShape(
                "`data` is not an array".to_string(),
            ))
        }
    };
    let side_tables = match body.remove("includes") {
        Some(Value::Object(map)) => map,
        _ => Map::new(),
    };
    let next = body
        .get("meta")
        .and_then(|m| m.get("next_token"))
        .and_then(Value::as_str)
        .filter(|t| !t.is_empty())
        .map(|t| Cursor::Token(t.to_string()));

    Ok(Page::new(records)
        .with_side_tables(side_tables)
        .with_next(next))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use siphon_core::HttpConfig;

    fn source() -> RecentSearch {
        let http = ApiClient::builder(HttpConfig::default()).build().unwrap();
        RecentSearch::new(http, "https://api.x.com").unwrap()
    }

    #[test]
    fn test_parse_search_page() {
        let page = parse_search_page(json!({
            "data": [{"id": "1", "text": "a"}, {"id": "2", "text": "b"}],
            "includes": {"users": [{"id": "u1"}]},
            "meta": {"result_count": 2, "next_token": "tok2"}
        }))
        .unwrap();
        assert_eq!(page.records.len(), 2);
        assert_eq!(page.side_tables["users"][0]["id"], "u1");
        assert_eq!(page.next, Some(Cursor::Token("tok2".to_string())));
    }

    #[test]
    fn test_parse_last_page_without_data() {
        let page = parse_search_page(json!({ "meta": {"result_count": 0} })).unwrap();
        assert!(page.records.is_empty());
        assert!(page.side_tables.is_empty());
        assert!(page.next.is_none());
    }

    #[test]
    fn test_parse_rejects_non_array_data() {
        assert!(matches!(
            parse_search_page(json!({ "data": {"id": "1"} })),
            Err(HarvestError::PayloadShape(_))
        ));
    }

    #[test]
    fn test_page_url_params() {
        let url = source()
            .page_url(
                &Query::new("rust lang", 500),
                Some(&Cursor::Token("abc".into())),
            )
            .unwrap();
        let params: std::collections::HashMap<_, _> = url.query_pairs().into_owned().collect();
        assert_eq!(url.path(), "/2/tweets/search/recent");
        assert_eq!(params["query"], "rust lang");
        assert_eq!(params["max_results"], "100");
        assert_eq!(params["sort_order"], "recency");
        assert_eq!(params["next_token"], "abc");
        assert_eq!(params["poll.fields"], POLL_FIELDS);
        assert!(!params.contains_key("start_time"));
    }

    #[test]
    fn test_page_url_rejects_offset_cursor() {
        assert!(source()
            .page_url(&Query::new("q", 10), Some(&Cursor::Offset(3)))
            .is_err());
    }
}
