//! Heuristic bot scoring for scraped profiles.
//!
//! Five independent rules, one point each. This is a placeholder scorer with
//! no statistical calibration behind the thresholds.

use serde_json::Value;

/// Score at which a profile is classified as a bot.
pub const BOT_THRESHOLD: u8 = 2;

/// The profile fields the rules look at.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BotSignals {
    pub follower_count: u64,
    pub following_count: u64,
    pub video_count: u64,
    pub handle: String,
    pub bio: String,
    pub avatar_url: String,
}

impl BotSignals {
    /// Reads signals from a profile `user` object, plus its `stats` object
    /// when counts live there instead.
    ///
    /// Missing fields read as zero or empty.
    pub fn from_profile(user: &Value, stats: Option<&Value>) -> Self {
        let count = |key: &str| {
            stats
                .and_then(|s| s.get(key))
                .or_else(|| user.get(key))
                .and_then(Value::as_u64)
                .unwrap_or(0)
        };
        let text = |key: &str| {
            user.get(key)
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string()
        };

        Self {
            follower_count: count("followerCount"),
            following_count: count("followingCount"),
            video_count: count("videoCount"),
            handle: text("uniqueId"),
            bio: text("signature"),
            avatar_url: text("avatarLarger"),
        }
    }

    fn is_blank(&self) -> bool {
        *self == BotSignals::default()
    }

    /// Number of rules that fire, 0..=5.
    pub fn score(&self) -> u8 {
        let handle = self.handle.replace('@', "");
        let rules = [
            self.follower_count < 10 && self.following_count > 1000,
            self.video_count > 10_000 && self.follower_count < 100,
            (!handle.is_empty() && handle.chars().all(|c| c.is_ascii_digit()))
                || self.handle.chars().count() > 16,
            self.bio.to_lowercase().contains("bot"),
            self.avatar_url.to_lowercase().contains("default"),
        ];
        rules.iter().filter(|fired| **fired).count() as u8
    }

    /// True when the score reaches [`BOT_THRESHOLD`]. An empty profile is never a bot.
    pub fn is_bot(&self) -> bool {
        !self.is_blank() && self.score() >= BOT_THRESHOLD
    }
}
