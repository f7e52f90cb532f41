//! Data models for the alt-text bot.
//!
//! These structures capture exactly the fields the core logic needs from the
//! remote API, decoupling it from any transport library's schema.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Maximum number of photos a single tweet can carry.
pub const MAX_IMAGES_PER_TWEET: usize = 4;

/// An account, as mirrored locally. Identity key is `user_id`;
/// `screen_name` is mutable metadata and may be stale between
/// reconciliations.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct Account {
    pub screen_name: String,
    pub user_id: i64,
}

impl Account {
    pub fn new(screen_name: impl Into<String>, user_id: i64) -> Self {
        Self {
            screen_name: screen_name.into(),
            user_id,
        }
    }
}

/// A photo attached to a tweet, with the author-supplied alt text if any.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaEntity {
    pub url: String,
    pub alt_text: Option<String>,
}

/// The tweet a mention replies to, when it replies to one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplyTarget {
    pub tweet_id: String,
    pub user_id: i64,
    pub screen_name: String,
}

/// A tweet as seen by the bot, with extended media entities resolved.
///
/// `media` is `None` when the tweet carries no extended entities at all;
/// an empty vector means entities were present but held no photos, which
/// the evaluator treats identically.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteTweet {
    pub id: String,
    pub author: Account,
    pub text: String,
    pub in_reply_to: Option<ReplyTarget>,
    pub user_mentions: Vec<Account>,
    pub media: Option<Vec<MediaEntity>>,
    pub retweet_count: i64,
}

impl RemoteTweet {
    /// Numeric form of the tweet id, used for mention-cursor arithmetic.
    #[must_use]
    pub fn numeric_id(&self) -> i64 {
        self.id.parse().unwrap_or(0)
    }
}

/// The bot's own profile, read via credential verification. The counters
/// are the authoritative signals the refresh policy compares against.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BotProfile {
    pub account: Account,
    pub followers_count: i64,
    pub friends_count: i64,
}

/// Persistent record of a processed tweet that carried at least one photo.
///
/// Append-only: the only permitted mutation is the bot-caption back-fill.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AltTextRecord {
    pub tweet_id: String,
    pub screen_name: String,
    pub user_id: i64,
    pub n_images: i64,
    pub alt_score: f64,
    pub processed_at: DateTime<Utc>,
    pub is_friend: bool,
    pub is_follower: bool,
    /// Author-supplied alt text per image, up to 4 slots.
    pub user_alt_texts: Vec<Option<String>>,
    /// Bot-generated caption suggestions per image, up to 4 slots.
    pub bot_captions: Vec<Option<String>>,
}

/// Aggregate alt-text usage for one account.
///
/// `percentage` is -1.0 and `n_images` is -1 when the account has no
/// recorded image history at all.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UsageStats {
    pub percentage: f64,
    pub n_images: i64,
}

impl UsageStats {
    pub const NO_DATA: Self = Self {
        percentage: -1.0,
        n_images: -1,
    };

    #[must_use]
    pub fn has_data(&self) -> bool {
        self.n_images >= 0
    }
}

/// One row of the top-users ranking.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopUser {
    pub screen_name: String,
    pub user_id: i64,
    pub images_with_alt: i64,
    pub total_images: i64,
}

/// Top-users ranking plus the aggregates behind it.
#[derive(Debug, Clone)]
pub struct TopUsersReport {
    pub ranking: Vec<TopUser>,
    pub total_accounts: i64,
    pub accounts_with_alt_text: i64,
}

/// Compliance classification for one tweet.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Classification {
    /// No photo attachments: skip, mark processed, no reply by default.
    NoMedia,
    /// Every image carries alt text: reward with a favorite.
    FullCompliance,
    /// Some or all images lack alt text; carries the score in [0, 1).
    PartialCompliance(f64),
}

impl std::fmt::Display for Classification {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NoMedia => write!(f, "no-media"),
            Self::FullCompliance => write!(f, "full-compliance"),
            Self::PartialCompliance(score) => write!(f, "partial-compliance({score})"),
        }
    }
}

/// Outcome of a direct-message attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DmOutcome {
    /// Delivered (or logged, in dry-run mode).
    Sent,
    /// The recipient cannot be DMed: not following, blocked, or DMs closed.
    /// Expected, callers branch on it to fall back to a public reply.
    Refused,
    /// Unexpected API failure.
    Failed,
}

/// Public URL for a tweet.
#[must_use]
pub fn tweet_url(screen_name: &str, tweet_id: &str) -> String {
    format!("https://twitter.com/{screen_name}/status/{tweet_id}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn usage_stats_sentinel() {
        assert!(!UsageStats::NO_DATA.has_data());
        let stats = UsageStats {
            percentage: 50.0,
            n_images: 4,
        };
        assert!(stats.has_data());
    }

    #[test]
    fn tweet_url_format() {
        assert_eq!(
            tweet_url("alice", "123"),
            "https://twitter.com/alice/status/123"
        );
    }

    #[test]
    fn numeric_id_parses_or_zero() {
        let mut tweet = RemoteTweet {
            id: "1234".to_string(),
            author: Account::new("bob", 7),
            text: String::new(),
            in_reply_to: None,
            user_mentions: vec![],
            media: None,
            retweet_count: 0,
        };
        assert_eq!(tweet.numeric_id(), 1234);
        tweet.id = "not-a-number".to_string();
        assert_eq!(tweet.numeric_id(), 0);
    }
}
