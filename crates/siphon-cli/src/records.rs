//! Output documents written by the crawl command.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use siphon_client::CommentSummary;
use siphon_core::BotSignals;

fn text(value: &Value, key: &str) -> String {
    match value.get(key) {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        _ => String::new(),
    }
}

fn count(value: Option<&Value>, key: &str) -> u64 {
    value
        .and_then(|v| v.get(key))
        .and_then(|v| match v {
            Value::String(s) => s.parse().ok(),
            other => other.as_u64(),
        })
        .unwrap_or(0)
}

fn flag(value: &Value, key: &str) -> bool {
    value.get(key).and_then(Value::as_bool).unwrap_or(false)
}

fn timestamp(value: Option<&Value>) -> Option<DateTime<Utc>> {
    let secs = match value? {
        Value::String(s) => s.parse().ok()?,
        other => other.as_i64()?,
    };
    DateTime::from_timestamp(secs, 0)
}

/// A crawled profile, as written to `<user_id>/<user_id>.json`.
#[derive(Debug, Clone, Serialize)]
pub struct ProfileRecord {
    pub platform: &'static str,
    pub user_id: String,
    pub unique_id: String,
    pub nickname: String,
    pub bio: String,
    pub bio_links: Vec<String>,
    pub homepage: String,
    pub avatar_url: String,
    pub followers: u64,
    pub following: u64,
    pub video_count: u64,
    pub is_private: bool,
    pub is_verified: bool,
    pub region: String,
    pub created_at: Option<DateTime<Utc>>,
    pub followers_user_ids: Vec<String>,
    pub following_user_ids: Vec<String>,
    pub is_bot: bool,
    pub bot_score: u8,
    pub scraped_at: DateTime<Utc>,
}

impl ProfileRecord {
    /// Shapes the embedded `userInfo` object (`user` plus `stats`).
    pub fn from_user_info(info: &Value, base_url: &str, scraped_at: DateTime<Utc>) -> Self {
        let empty = Value::Null;
        let user = info.get("user").unwrap_or(&empty);
        let stats = info.get("stats");
        let signals = BotSignals::from_profile(user, stats);
        let unique_id = text(user, "uniqueId");

        Self {
            platform: "TikTok",
            user_id: text(user, "id"),
            homepage: format!("{}/@{}", base_url.trim_end_matches('/'), unique_id),
            unique_id,
            nickname: text(user, "nickname"),
            bio: text(user, "signature"),
            bio_links: user
                .get("bioLink")
                .and_then(|l| l.get("link"))
                .and_then(Value::as_str)
                .map(|l| l.split_whitespace().map(str::to_string).collect())
                .unwrap_or_default(),
            avatar_url: text(user, "avatarLarger"),
            followers: signals.follower_count,
            following: signals.following_count,
            video_count: signals.video_count,
            is_private: flag(user, "privateAccount"),
            is_verified: flag(user, "verified"),
            region: text(user, "region"),
            created_at: timestamp(user.get("createTime")),
            followers_user_ids: Vec::new(),
            following_user_ids: Vec::new(),
            is_bot: signals.is_bot(),
            bot_score: signals.score(),
            scraped_at,
        }
    }
}

/// A comment as embedded in a post record.
#[derive(Debug, Clone, Serialize)]
pub struct CommentRecord {
    pub user_name: String,
    pub unique_id: String,
    pub text: String,
    pub time: Option<DateTime<Utc>>,
    pub reaction_count: u64,
}

impl From<&CommentSummary> for CommentRecord {
    fn from(c: &CommentSummary) -> Self {
        Self {
            user_name: c.nickname.clone(),
            unique_id: c.unique_id.clone(),
            text: c.text.clone(),
            time: c.create_time.and_then(|t| DateTime::from_timestamp(t, 0)),
            reaction_count: c.digg_count,
        }
    }
}

/// A crawled post, as written to `<user_id>/<post_id>/<post_id>.json`.
#[derive(Debug, Clone, Serialize)]
pub struct PostRecord {
    pub platform: &'static str,
    pub post_id: String,
    pub user_id: String,
    pub user_name: String,
    pub profile_pic_url: String,
    pub is_verified: bool,
    pub caption: String,
    pub cover_url: String,
    pub video_url: String,
    pub video_duration: u64,
    pub likes: u64,
    pub shares: u64,
    pub comments_count: u64,
    pub views: u64,
    pub post_date: Option<DateTime<Utc>>,
    pub location_created: String,
    pub diversification_labels: Vec<Value>,
    pub hashtags: Vec<String>,
    pub comments: Vec<CommentRecord>,
    pub scraped_at: DateTime<Utc>,
}

impl PostRecord {
    /// Shapes the embedded `itemStruct` object plus its harvested comments.
    pub fn from_item(item: &Value, comments: &[CommentSummary], scraped_at: DateTime<Utc>) -> Self {
        let empty = Value::Null;
        let author = item.get("author").unwrap_or(&empty);
        let video = item.get("video").unwrap_or(&empty);
        let stats = item.get("stats");

        let hashtags = item
            .get("contents")
            .and_then(Value::as_array)
            .into_iter()
            .flatten()
            .filter_map(|c| c.get("textExtra").and_then(Value::as_array))
            .flatten()
            .filter_map(|t| t.get("hashtagName").and_then(Value::as_str))
            .filter(|h| !h.is_empty())
            .map(str::to_string)
            .collect();

        Self {
            platform: "TikTok",
            post_id: text(item, "id"),
            user_id: text(author, "id"),
            user_name: text(author, "uniqueId"),
            profile_pic_url: text(author, "avatarLarger"),
            is_verified: flag(author, "verified"),
            caption: text(item, "desc"),
            cover_url: text(video, "cover"),
            video_url: text(video, "downloadAddr"),
            video_duration: count(Some(video), "duration"),
            likes: count(stats, "diggCount"),
            shares: count(stats, "shareCount"),
            comments_count: count(stats, "commentCount"),
            views: count(stats, "playCount"),
            post_date: timestamp(item.get("createTime")),
            location_created: text(item, "locationCreated"),
            diversification_labels: item
                .get("diversificationLabels")
                .and_then(Value::as_array)
                .cloned()
                .unwrap_or_default(),
            hashtags,
            comments: comments.iter().map(CommentRecord::from).collect(),
            scraped_at,
        }
    }
}

/// Ids of the posts listed on a profile page, first `max` only.
pub fn profile_post_ids(info: &Value, max: usize) -> Vec<String> {
    info.get("items")
        .or_else(|| info.get("itemList"))
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(|item| match item {
            Value::String(id) => Some(id.clone()),
            Value::Number(n) => Some(n.to_string()),
            Value::Object(_) => Some(text(item, "id")).filter(|id| !id.is_empty()),
            _ => None,
        })
        .take(max)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn now() -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000, 0).unwrap()
    }

    #[test]
    fn test_profile_record() {
        let info = json!({
            "user": {
                "id": "42",
                "uniqueId": "alice",
                "nickname": "Alice 🌸",
                "signature": "hello",
                "avatarLarger": "https://cdn/a.jpg",
                "verified": true,
                "createTime": 1600000000,
                "bioLink": {"link": "https://a.example https://b.example"}
            },
            "stats": {"followerCount": 1200, "followingCount": 30, "videoCount": 8}
        });
        let record = ProfileRecord::from_user_info(&info, "https://www.tiktok.com/", now());
        assert_eq!(record.user_id, "42");
        assert_eq!(record.homepage, "https://www.tiktok.com/@alice");
        assert_eq!(record.followers, 1200);
        assert_eq!(record.bio_links.len(), 2);
        assert!(record.is_verified);
        assert!(!record.is_bot);
        assert_eq!(
            record.created_at.map(|t| t.timestamp()),
            Some(1_600_000_000)
        );
    }

    #[test]
    fn test_profile_record_flags_bot() {
        let info = json!({
            "user": {"uniqueId": "1234567890", "signature": "beep bot"},
            "stats": {"followerCount": 0}
        });
        let record = ProfileRecord::from_user_info(&info, "https://www.tiktok.com", now());
        assert!(record.is_bot);
        assert_eq!(record.bot_score, 2);
    }

    #[test]
    fn test_post_record() {
        let item = json!({
            "id": "p1",
            "desc": "caption",
            "createTime": "1700000000",
            "author": {"id": "42", "uniqueId": "alice", "verified": false},
            "video": {"cover": "c.jpg", "downloadAddr": "https://cdn/v.mp4", "duration": 15},
            "stats": {"diggCount": 10, "shareCount": 2, "commentCount": 3, "playCount": 100},
            "contents": [{"textExtra": [{"hashtagName": "rust"}, {"hashtagName": ""}]}]
        });
        let comments = vec![CommentSummary {
            nickname: "Bob".into(),
            text: "nice".into(),
            create_time: Some(1_700_000_100),
            digg_count: 4,
            ..Default::default()
        }];
        let record = PostRecord::from_item(&item, &comments, now());
        assert_eq!(record.post_id, "p1");
        assert_eq!(record.video_url, "https://cdn/v.mp4");
        assert_eq!(record.views, 100);
        assert_eq!(record.hashtags, vec!["rust"]);
        assert_eq!(record.post_date, Some(now()));
        assert_eq!(record.comments[0].reaction_count, 4);
        assert_eq!(record.comments[0].user_name, "Bob");
    }

    #[test]
    fn test_profile_post_ids() {
        let info = json!({ "items": ["1", 2, {"id": "3"}, null] });
        assert_eq!(profile_post_ids(&info, 10), vec!["1", "2", "3"]);
        assert_eq!(profile_post_ids(&info, 1), vec!["1"]);
        assert!(profile_post_ids(&json!({}), 5).is_empty());
    }
}
