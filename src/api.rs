//! Remote social-graph access.
//!
//! [`SocialApi`] is the capability set the bot consumes; the real transport
//! lives behind it, and tests substitute an in-memory fake. [`GraphReader`]
//! drains the paginated endpoints into full snapshots while throttling
//! between pages to stay under rate ceilings.

use std::collections::HashSet;
use std::time::{Duration, Instant};

use tracing::{debug, info};

use crate::error::Result;
use crate::model::{Account, BotProfile, RemoteTweet};

/// One page from a cursored endpoint.
#[derive(Debug, Clone)]
pub struct Page<T> {
    pub items: Vec<T>,
    /// Cursor for the next page, `None` on the last one.
    pub next_cursor: Option<String>,
}

impl<T> Page<T> {
    /// A single page holding everything, for endpoints and fakes that do
    /// not actually paginate.
    pub fn last(items: Vec<T>) -> Self {
        Self {
            items,
            next_cursor: None,
        }
    }
}

/// The remote API capability set the bot depends on.
///
/// Errors surface as [`crate::BotError`]: `Transport` when the API is
/// unreachable, `NotAccessible` for protected/blocking/deleted subjects,
/// `DmRefused` when a recipient cannot be messaged, `Api` otherwise.
pub trait SocialApi {
    /// Verify credentials and return the bot's own profile.
    fn verify_credentials(&self) -> Result<BotProfile>;

    /// One page of accounts following `screen_name`.
    fn followers_page(&self, screen_name: &str, cursor: Option<&str>) -> Result<Page<Account>>;

    /// One page of accounts `screen_name` follows.
    fn friends_page(&self, screen_name: &str, cursor: Option<&str>) -> Result<Page<Account>>;

    /// One page of user ids that retweeted `tweet_id`.
    fn retweeters_page(&self, tweet_id: &str, cursor: Option<&str>) -> Result<Page<i64>>;

    /// Ids of the most recent tweets on an account's timeline.
    fn user_timeline(
        &self,
        screen_name: &str,
        count: usize,
        include_retweets: bool,
    ) -> Result<Vec<String>>;

    /// A single tweet with extended media entities and alt text resolved.
    fn get_tweet(&self, tweet_id: &str) -> Result<RemoteTweet>;

    /// Tweets mentioning the bot with ids greater than `since_id`.
    fn mentions_since(&self, since_id: i64) -> Result<Vec<RemoteTweet>>;

    /// Like a tweet.
    fn favorite(&self, tweet_id: &str) -> Result<()>;

    /// Post `text` in reply to a tweet, returning the new tweet's id.
    fn post_reply(&self, text: &str, in_reply_to: &str) -> Result<String>;

    /// Send a direct message. Fails with `DmRefused` when the recipient
    /// does not accept DMs from the bot.
    fn send_direct_message(&self, user_id: i64, text: &str) -> Result<()>;

    /// Follow an account.
    fn follow(&self, screen_name: &str) -> Result<()>;
}

/// Placeholder transport: every call fails with a `Transport` error.
///
/// The binary wires this in until a real client is configured; the whole
/// pipeline runs against any other [`SocialApi`] implementation unchanged.
pub struct OfflineApi;

impl OfflineApi {
    fn unavailable<T>(&self) -> Result<T> {
        Err(crate::error::BotError::transport(
            "no API transport configured",
        ))
    }
}

impl SocialApi for OfflineApi {
    fn verify_credentials(&self) -> Result<BotProfile> {
        self.unavailable()
    }

    fn followers_page(&self, _screen_name: &str, _cursor: Option<&str>) -> Result<Page<Account>> {
        self.unavailable()
    }

    fn friends_page(&self, _screen_name: &str, _cursor: Option<&str>) -> Result<Page<Account>> {
        self.unavailable()
    }

    fn retweeters_page(&self, _tweet_id: &str, _cursor: Option<&str>) -> Result<Page<i64>> {
        self.unavailable()
    }

    fn user_timeline(
        &self,
        _screen_name: &str,
        _count: usize,
        _include_retweets: bool,
    ) -> Result<Vec<String>> {
        self.unavailable()
    }

    fn get_tweet(&self, _tweet_id: &str) -> Result<RemoteTweet> {
        self.unavailable()
    }

    fn mentions_since(&self, _since_id: i64) -> Result<Vec<RemoteTweet>> {
        self.unavailable()
    }

    fn favorite(&self, _tweet_id: &str) -> Result<()> {
        self.unavailable()
    }

    fn post_reply(&self, _text: &str, _in_reply_to: &str) -> Result<String> {
        self.unavailable()
    }

    fn send_direct_message(&self, _user_id: i64, _text: &str) -> Result<()> {
        self.unavailable()
    }

    fn follow(&self, _screen_name: &str) -> Result<()> {
        self.unavailable()
    }
}

/// Time still owed to the throttle after a page took `elapsed` to process.
#[must_use]
pub fn kindly_delay(interval: Duration, elapsed: Duration) -> Duration {
    interval.saturating_sub(elapsed)
}

/// Drains paginated endpoints into full snapshots.
///
/// Sleeps `kindly_delay(throttle, elapsed)` after each page; the throttle is
/// a deliberate rate-limit courtesy, not a correctness requirement, so tests
/// construct readers with a zero throttle.
pub struct GraphReader<'a, A: SocialApi + ?Sized> {
    api: &'a A,
    throttle: Duration,
}

impl<'a, A: SocialApi + ?Sized> GraphReader<'a, A> {
    pub fn new(api: &'a A, throttle: Duration) -> Self {
        Self { api, throttle }
    }

    /// Full follower snapshot for `screen_name`.
    ///
    /// # Errors
    ///
    /// Propagates any page-fetch failure; a partial snapshot is never
    /// returned.
    pub fn followers(&self, screen_name: &str) -> Result<HashSet<Account>> {
        self.drain(|cursor| self.api.followers_page(screen_name, cursor))
    }

    /// Full friend snapshot for `screen_name`.
    ///
    /// # Errors
    ///
    /// Propagates any page-fetch failure.
    pub fn friends(&self, screen_name: &str) -> Result<HashSet<Account>> {
        self.drain(|cursor| self.api.friends_page(screen_name, cursor))
    }

    /// All user ids that retweeted the marker tweet.
    ///
    /// # Errors
    ///
    /// Propagates any page-fetch failure.
    pub fn retweeters(&self, tweet_id: &str) -> Result<HashSet<i64>> {
        info!("Reading users who retweeted tweet {tweet_id}");
        let result = self.drain(|cursor| self.api.retweeters_page(tweet_id, cursor))?;
        info!("{} users retweeted tweet {tweet_id}", result.len());
        Ok(result)
    }

    fn drain<T, F>(&self, mut fetch: F) -> Result<HashSet<T>>
    where
        T: std::hash::Hash + Eq,
        F: FnMut(Option<&str>) -> Result<Page<T>>,
    {
        let mut result = HashSet::new();
        let mut cursor: Option<String> = None;
        let mut pages = 0usize;

        loop {
            let begin = Instant::now();
            let page = fetch(cursor.as_deref())?;
            result.extend(page.items);
            pages += 1;

            match page.next_cursor {
                Some(next) => {
                    cursor = Some(next);
                    let pause = kindly_delay(self.throttle, begin.elapsed());
                    if !pause.is_zero() {
                        debug!("Sleeping {pause:?} before next page");
                        std::thread::sleep(pause);
                    }
                }
                None => break,
            }
        }

        debug!("Drained {} items over {pages} pages", result.len());
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BotError;
    use std::cell::RefCell;

    #[test]
    fn kindly_delay_accounts_for_elapsed_time() {
        let interval = Duration::from_secs(60);
        assert_eq!(
            kindly_delay(interval, Duration::from_secs(10)),
            Duration::from_secs(50)
        );
        // processing took longer than the interval: no sleep, never negative
        assert_eq!(
            kindly_delay(interval, Duration::from_secs(90)),
            Duration::ZERO
        );
    }

    /// Fake that serves accounts in two pages and records requested cursors.
    struct TwoPageApi {
        cursors_seen: RefCell<Vec<Option<String>>>,
    }

    impl TwoPageApi {
        fn new() -> Self {
            Self {
                cursors_seen: RefCell::new(Vec::new()),
            }
        }
    }

    impl SocialApi for TwoPageApi {
        fn verify_credentials(&self) -> Result<BotProfile> {
            unimplemented!()
        }

        fn followers_page(&self, _name: &str, cursor: Option<&str>) -> Result<Page<Account>> {
            self.cursors_seen
                .borrow_mut()
                .push(cursor.map(str::to_string));
            match cursor {
                None => Ok(Page {
                    items: vec![Account::new("alice", 1), Account::new("bob", 2)],
                    next_cursor: Some("p2".to_string()),
                }),
                Some("p2") => Ok(Page::last(vec![Account::new("carol", 3)])),
                Some(other) => Err(BotError::Api(format!("bad cursor {other}"))),
            }
        }

        fn friends_page(&self, _name: &str, _cursor: Option<&str>) -> Result<Page<Account>> {
            Err(BotError::transport("down"))
        }

        fn retweeters_page(&self, _id: &str, _cursor: Option<&str>) -> Result<Page<i64>> {
            unimplemented!()
        }

        fn user_timeline(&self, _n: &str, _c: usize, _rt: bool) -> Result<Vec<String>> {
            unimplemented!()
        }

        fn get_tweet(&self, _id: &str) -> Result<RemoteTweet> {
            unimplemented!()
        }

        fn mentions_since(&self, _id: i64) -> Result<Vec<RemoteTweet>> {
            unimplemented!()
        }

        fn favorite(&self, _id: &str) -> Result<()> {
            unimplemented!()
        }

        fn post_reply(&self, _t: &str, _r: &str) -> Result<String> {
            unimplemented!()
        }

        fn send_direct_message(&self, _u: i64, _t: &str) -> Result<()> {
            unimplemented!()
        }

        fn follow(&self, _n: &str) -> Result<()> {
            unimplemented!()
        }
    }

    #[test]
    fn drains_all_pages_into_one_set() {
        let api = TwoPageApi::new();
        let reader = GraphReader::new(&api, Duration::ZERO);

        let followers = reader.followers("AltBotUY").unwrap();
        assert_eq!(followers.len(), 3);
        assert!(followers.contains(&Account::new("carol", 3)));
        assert_eq!(
            *api.cursors_seen.borrow(),
            vec![None, Some("p2".to_string())]
        );
    }

    #[test]
    fn fetch_error_aborts_the_whole_snapshot() {
        let api = TwoPageApi::new();
        let reader = GraphReader::new(&api, Duration::ZERO);

        let err = reader.friends("AltBotUY").unwrap_err();
        assert!(err.is_fatal());
    }
}
