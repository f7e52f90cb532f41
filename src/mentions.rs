//! Mention processing.
//!
//! Incoming mentions are routed by shape: a mention that replies to another
//! tweet and contains nothing but the bot's handle asks "does that tweet
//! have alt text?", while a top-level mention listing other handles asks
//! for a usage report on those accounts. Anything else is noise and only
//! gets marked processed. The cursor in `bot_settings` advances to the
//! highest mention id observed, so a crash mid-batch re-reads at most one
//! batch.

use chrono::Utc;
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, error, info};

use crate::api::SocialApi;
use crate::config::{Config, NoMediaPolicy};
use crate::dispatch::{split_for_thread, Dispatcher};
use crate::error::Result;
use crate::evaluate::Evaluator;
use crate::messages;
use crate::model::{tweet_url, Account, Classification, DmOutcome, RemoteTweet};
use crate::store::Store;
use crate::watch::{persist_evaluation, process_account, AccountContext};

static MENTION_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)@[a-z\d_]{1,15}").unwrap_or_else(|e| panic!("invalid mention pattern: {e}"))
});

static FILLER_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"[\s.:,;!?-]+").unwrap_or_else(|e| panic!("invalid filler pattern: {e}"))
});

/// True when `text` contains nothing besides @mentions and punctuation
/// filler, i.e. it names accounts without saying anything.
#[must_use]
pub fn is_only_mentions(text: &str) -> bool {
    let without_mentions = MENTION_RE.replace_all(text, "");
    FILLER_RE.replace_all(&without_mentions, "").is_empty()
}

/// True when `text` is nothing but mentions and one of them is the bot.
#[must_use]
pub fn is_only_bot_mention(text: &str, bot_screen_name: &str) -> bool {
    if !is_only_mentions(text) {
        return false;
    }
    let needle = format!("@{}", bot_screen_name.to_lowercase());
    MENTION_RE
        .find_iter(text)
        .any(|m| m.as_str().to_lowercase() == needle)
}

/// How a single mention was handled, mostly for logging and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MentionOutcome {
    /// The mention replied to a tweet and asked about its alt text.
    RepliedQuery,
    /// The mention named accounts and got a usage report.
    SentReport,
    /// Authored by the bot itself, or not a recognizable request.
    Skipped,
}

/// Drains mentions newer than the stored cursor and handles each one.
pub struct MentionProcessor<'a, A: SocialApi + ?Sized> {
    api: &'a A,
    dispatcher: &'a Dispatcher<'a, A>,
    evaluator: &'a Evaluator<'a, A>,
    config: &'a Config,
}

impl<'a, A: SocialApi + ?Sized> MentionProcessor<'a, A> {
    pub fn new(
        api: &'a A,
        dispatcher: &'a Dispatcher<'a, A>,
        evaluator: &'a Evaluator<'a, A>,
        config: &'a Config,
    ) -> Self {
        Self {
            api,
            dispatcher,
            evaluator,
            config,
        }
    }

    /// Fetch and handle every mention newer than the cursor, then advance
    /// the cursor to the highest id seen. Per-mention failures are logged
    /// and do not abort the batch.
    ///
    /// # Errors
    ///
    /// Returns an error if the mentions cannot be fetched at all, or on a
    /// fatal (transport/config) failure mid-batch. The cursor still covers
    /// every mention observed before the failure.
    pub fn run(&self, store: &mut Store) -> Result<usize> {
        let cursor = store.last_mention_cursor(self.config.bot.mention_cursor_seed)?;
        let mentions = self.api.mentions_since(cursor)?;
        info!("{} mentions since id {cursor}", mentions.len());

        let mut max_id = cursor;
        let mut handled = 0usize;

        for mention in &mentions {
            max_id = max_id.max(mention.numeric_id());
            match self.handle_mention(store, mention) {
                Ok(outcome) => {
                    debug!("Mention {}: {outcome:?}", mention.id);
                    if outcome != MentionOutcome::Skipped {
                        handled += 1;
                    }
                }
                Err(e) if e.is_fatal() => {
                    store.set_last_mention_cursor(max_id)?;
                    return Err(e);
                }
                Err(e) => {
                    error!(
                        "Error while processing mention {}: {e}",
                        tweet_url(&mention.author.screen_name, &mention.id)
                    );
                }
            }
        }

        store.set_last_mention_cursor(max_id)?;
        Ok(handled)
    }

    fn handle_mention(&self, store: &mut Store, mention: &RemoteTweet) -> Result<MentionOutcome> {
        let bot = &self.config.bot.screen_name;
        if mention.author.screen_name.eq_ignore_ascii_case(bot) {
            return Ok(MentionOutcome::Skipped);
        }
        if store.is_processed(&mention.id)? {
            return Ok(MentionOutcome::Skipped);
        }

        let outcome = if let Some(target) = &mention.in_reply_to {
            if is_only_bot_mention(&mention.text, bot) {
                let target = target.clone();
                self.answer_query(store, mention, &target)?
            } else {
                MentionOutcome::Skipped
            }
        } else if is_only_mentions(&mention.text) {
            self.send_report(store, mention)?
        } else {
            MentionOutcome::Skipped
        };

        store.mark_processed(&mention.id, true)?;
        Ok(outcome)
    }

    /// Answer "does the tweet above have alt text?" for the tweet the
    /// mention replies to.
    fn answer_query(
        &self,
        store: &mut Store,
        mention: &RemoteTweet,
        target: &crate::model::ReplyTarget,
    ) -> Result<MentionOutcome> {
        let asker = &mention.author.screen_name;

        if store.is_processed(&target.tweet_id)? {
            // already evaluated on some earlier pass, answer from the record
            let message = match store.alt_score_for_tweet(&target.tweet_id)? {
                None => messages::reply_no_images_found(&target.screen_name),
                Some(score) if score < 1.0 => {
                    messages::reply_query_missing_alt_text(&target.screen_name)
                }
                Some(_) => messages::reply_query_full_alt_text(&target.screen_name),
            };
            self.dispatcher.reply(asker, &message, &mention.id);
            return Ok(MentionOutcome::RepliedQuery);
        }

        let evaluation = self.evaluator.evaluate(&target.tweet_id)?;
        match evaluation.classification {
            Classification::NoMedia => {
                if self.config.processing.no_media_in_mentions == NoMediaPolicy::Reply {
                    self.dispatcher.reply(
                        asker,
                        &messages::reply_no_images_found(&target.screen_name),
                        &mention.id,
                    );
                }
                store.mark_processed(&target.tweet_id, true)?;
            }
            Classification::FullCompliance => {
                self.dispatcher.favorite(&target.tweet_id);
                self.dispatcher.reply(
                    asker,
                    &messages::reply_query_full_alt_text(&target.screen_name),
                    &mention.id,
                );
                persist_evaluation(store, &evaluation, true)?;
            }
            Classification::PartialCompliance(_) => {
                self.dispatcher.reply(
                    asker,
                    &messages::reply_query_missing_alt_text(&target.screen_name),
                    &mention.id,
                );
                // the original author gets the usual DM nudge when reachable
                if store.is_follower(target.user_id)? && store.is_allowed_to_dm(target.user_id)? {
                    let url = tweet_url(&target.screen_name, &target.tweet_id);
                    let dm = self.dispatcher.direct_message(
                        &target.screen_name,
                        target.user_id,
                        &messages::dm_missing_alt_text(&url),
                    );
                    if dm != DmOutcome::Sent {
                        debug!("Could not DM @{} about {url}", target.screen_name);
                    }
                }
                persist_evaluation(store, &evaluation, true)?;
            }
        }

        Ok(MentionOutcome::RepliedQuery)
    }

    /// Build and send a usage report for the accounts the mention names.
    fn send_report(&self, store: &mut Store, mention: &RemoteTweet) -> Result<MentionOutcome> {
        let bot = &self.config.bot.screen_name;
        let subjects: Vec<&Account> = mention
            .user_mentions
            .iter()
            .filter(|a| !a.screen_name.eq_ignore_ascii_case(bot))
            .take(self.config.processing.max_mentions_to_process)
            .collect();

        if subjects.is_empty() {
            return Ok(MentionOutcome::Skipped);
        }

        let mut lines = vec![messages::report_header()];
        for subject in &subjects {
            self.refresh_if_stale(store, subject)?;
            let usage = store.usage_percentage(subject.user_id)?;
            lines.push(if usage.has_data() {
                messages::report_line(&subject.screen_name, usage.percentage, usage.n_images)
            } else {
                messages::report_line_no_images(&subject.screen_name)
            });
        }
        lines.push(messages::report_footer());

        let segments = split_for_thread(&lines.join("\n"), self.config.processing.max_tweet_chars);
        self.dispatcher
            .reply_thread(&mention.author.screen_name, &segments, &mention.id);

        Ok(MentionOutcome::SentReport)
    }

    /// Run the account pipeline for a report subject whose history is
    /// missing or older than the freshness window.
    fn refresh_if_stale(&self, store: &mut Store, subject: &Account) -> Result<()> {
        let window = chrono::Duration::days(self.config.processing.refresh_window_days);
        let stale = match store.last_alt_record_date(subject.user_id)? {
            Some(date) => Utc::now() - date > window,
            None => true,
        };
        if !stale {
            return Ok(());
        }

        debug!("Refreshing history for @{}", subject.screen_name);
        let ctx = AccountContext {
            screen_name: subject.screen_name.clone(),
            user_id: subject.user_id,
            is_follower: store.is_follower(subject.user_id)?,
            allowed_to_dm: store.is_allowed_to_dm(subject.user_id)?,
        };
        process_account(
            self.api,
            store,
            self.dispatcher,
            self.evaluator,
            &ctx,
            &self.config.processing,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::Page;
    use crate::error::BotError;
    use crate::model::{BotProfile, MediaEntity, ReplyTarget};
    use std::cell::RefCell;
    use std::collections::HashMap;

    #[test]
    fn only_mentions_detection() {
        assert!(is_only_mentions("@AltBotUY"));
        assert!(is_only_mentions("@alice @bob, @carol"));
        assert!(is_only_mentions("  @alice .. @bob!  "));
        assert!(!is_only_mentions("@alice hola"));
        assert!(!is_only_mentions("hola"));
    }

    #[test]
    fn bot_mention_detection_is_case_insensitive() {
        assert!(is_only_bot_mention("@altbotuy", "AltBotUY"));
        assert!(is_only_bot_mention("@alice @AltBotUY", "AltBotUY"));
        assert!(!is_only_bot_mention("@alice @bob", "AltBotUY"));
        assert!(!is_only_bot_mention("@AltBotUY mira esto", "AltBotUY"));
    }

    /// Scripted remote for mention scenarios.
    #[derive(Default)]
    struct FakeRemote {
        mentions: Vec<RemoteTweet>,
        tweets: HashMap<String, RemoteTweet>,
        timelines: HashMap<String, Vec<String>>,
        favorites: RefCell<Vec<String>>,
        replies: RefCell<Vec<(String, String)>>,
        dms: RefCell<Vec<(i64, String)>>,
    }

    impl SocialApi for FakeRemote {
        fn verify_credentials(&self) -> Result<BotProfile> {
            unimplemented!()
        }
        fn followers_page(&self, _n: &str, _c: Option<&str>) -> Result<Page<Account>> {
            unimplemented!()
        }
        fn friends_page(&self, _n: &str, _c: Option<&str>) -> Result<Page<Account>> {
            unimplemented!()
        }
        fn retweeters_page(&self, _i: &str, _c: Option<&str>) -> Result<Page<i64>> {
            unimplemented!()
        }

        fn user_timeline(
            &self,
            screen_name: &str,
            count: usize,
            _include_retweets: bool,
        ) -> Result<Vec<String>> {
            Ok(self
                .timelines
                .get(screen_name)
                .cloned()
                .unwrap_or_default()
                .into_iter()
                .take(count)
                .collect())
        }

        fn get_tweet(&self, tweet_id: &str) -> Result<RemoteTweet> {
            self.tweets
                .get(tweet_id)
                .cloned()
                .ok_or_else(|| BotError::not_accessible(format!("tweet {tweet_id}"), "deleted"))
        }

        fn mentions_since(&self, since_id: i64) -> Result<Vec<RemoteTweet>> {
            Ok(self
                .mentions
                .iter()
                .filter(|m| m.numeric_id() > since_id)
                .cloned()
                .collect())
        }

        fn favorite(&self, tweet_id: &str) -> Result<()> {
            self.favorites.borrow_mut().push(tweet_id.to_string());
            Ok(())
        }

        fn post_reply(&self, text: &str, in_reply_to: &str) -> Result<String> {
            self.replies
                .borrow_mut()
                .push((text.to_string(), in_reply_to.to_string()));
            Ok(format!("r{}", self.replies.borrow().len()))
        }

        fn send_direct_message(&self, user_id: i64, text: &str) -> Result<()> {
            self.dms.borrow_mut().push((user_id, text.to_string()));
            Ok(())
        }

        fn follow(&self, _screen_name: &str) -> Result<()> {
            Ok(())
        }
    }

    const SEED: i64 = 1_000;

    fn test_config() -> Config {
        let mut config = Config::default();
        config.bot.mention_cursor_seed = SEED;
        config
    }

    fn mention(id: i64, author: &Account, text: &str) -> RemoteTweet {
        RemoteTweet {
            id: id.to_string(),
            author: author.clone(),
            text: text.to_string(),
            in_reply_to: None,
            user_mentions: vec![],
            media: None,
            retweet_count: 0,
        }
    }

    fn query_mention(id: i64, author: &Account, target: &RemoteTweet) -> RemoteTweet {
        let mut m = mention(id, author, "@AltBotUY");
        m.in_reply_to = Some(ReplyTarget {
            tweet_id: target.id.clone(),
            user_id: target.author.user_id,
            screen_name: target.author.screen_name.clone(),
        });
        m
    }

    fn photo(alt: Option<&str>) -> MediaEntity {
        MediaEntity {
            url: "https://pbs.twimg.com/q.jpg".to_string(),
            alt_text: alt.map(str::to_string),
        }
    }

    fn run(remote: &FakeRemote, store: &mut Store, config: &Config) -> usize {
        let dispatcher = Dispatcher::new(remote, true);
        let evaluator = Evaluator::new(remote, None);
        MentionProcessor::new(remote, &dispatcher, &evaluator, config)
            .run(store)
            .unwrap()
    }

    #[test]
    fn cursor_advances_to_max_mention_id() {
        let asker = Account::new("asker", 7);
        let mut remote = FakeRemote::default();
        remote.mentions = vec![
            mention(SEED + 1, &asker, "hola"),
            mention(SEED + 5, &asker, "que tal"),
            mention(SEED + 3, &asker, "buenas"),
        ];

        let mut store = Store::open_memory().unwrap();
        let config = test_config();
        run(&remote, &mut store, &config);

        assert_eq!(store.last_mention_cursor(SEED).unwrap(), SEED + 5);
    }

    #[test]
    fn query_about_compliant_tweet_gets_celebration_reply() {
        let alice = Account::new("alice", 1);
        let asker = Account::new("asker", 7);

        let mut remote = FakeRemote::default();
        let mut target = mention(500, &alice, "mira mi foto");
        target.media = Some(vec![photo(Some("un gato"))]);
        remote.tweets.insert(target.id.clone(), target.clone());
        remote.mentions = vec![query_mention(SEED + 1, &asker, &target)];

        let mut store = Store::open_memory().unwrap();
        let config = test_config();
        let handled = run(&remote, &mut store, &config);

        assert_eq!(handled, 1);
        assert_eq!(*remote.favorites.borrow(), vec!["500".to_string()]);
        let replies = remote.replies.borrow();
        assert_eq!(replies.len(), 1);
        assert!(replies[0].0.contains("@asker"));
        assert!(replies[0].0.contains("🎉"));
        // the queried tweet is now evaluated and recorded
        assert_eq!(store.alt_score_for_tweet("500").unwrap(), Some(1.0));
    }

    #[test]
    fn query_about_partial_tweet_dms_the_original_author_when_optedin() {
        let alice = Account::new("alice", 1);
        let asker = Account::new("asker", 7);

        let mut remote = FakeRemote::default();
        let mut target = mention(501, &alice, "fotos");
        target.media = Some(vec![photo(Some("a")), photo(None)]);
        remote.tweets.insert(target.id.clone(), target.clone());
        remote.mentions = vec![query_mention(SEED + 1, &asker, &target)];

        let mut store = Store::open_memory().unwrap();
        let followers: std::collections::HashSet<_> = [alice.clone()].into_iter().collect();
        store.apply_follower_delta(&followers, &Default::default()).unwrap();
        store
            .apply_allowed_to_dm_delta(&[1].into_iter().collect(), &Default::default())
            .unwrap();

        let config = test_config();
        run(&remote, &mut store, &config);

        let dms = remote.dms.borrow();
        assert_eq!(dms.len(), 1);
        assert_eq!(dms[0].0, 1);
        assert!(dms[0].1.contains("alice/status/501"));
    }

    #[test]
    fn query_about_recorded_tweet_answers_from_the_store() {
        let alice = Account::new("alice", 1);
        let asker = Account::new("asker", 7);

        let mut remote = FakeRemote::default();
        // the target is not fetchable, the answer must come from the record
        let mut target = mention(502, &alice, "fotos");
        target.media = Some(vec![photo(None)]);
        remote.mentions = vec![query_mention(SEED + 1, &asker, &target)];

        let mut store = Store::open_memory().unwrap();
        store
            .record_alt_text_info(&crate::model::AltTextRecord {
                tweet_id: "502".to_string(),
                screen_name: "alice".to_string(),
                user_id: 1,
                n_images: 1,
                alt_score: 0.0,
                processed_at: Utc::now(),
                is_friend: false,
                is_follower: false,
                user_alt_texts: vec![None],
                bot_captions: vec![None],
            })
            .unwrap();

        let config = test_config();
        run(&remote, &mut store, &config);

        let replies = remote.replies.borrow();
        assert_eq!(replies.len(), 1);
        assert!(replies[0].0.contains("sin texto alternativo"));
    }

    #[test]
    fn query_about_tweet_without_images_replies_none_found() {
        let alice = Account::new("alice", 1);
        let asker = Account::new("asker", 7);

        let mut remote = FakeRemote::default();
        let target = mention(503, &alice, "solo texto");
        remote.tweets.insert(target.id.clone(), target.clone());
        remote.mentions = vec![query_mention(SEED + 1, &asker, &target)];

        let mut store = Store::open_memory().unwrap();
        let config = test_config();
        run(&remote, &mut store, &config);

        let replies = remote.replies.borrow();
        assert_eq!(replies.len(), 1);
        assert!(replies[0].0.contains("No encontré imágenes"));
        assert!(store.is_processed("503").unwrap());
    }

    #[test]
    fn report_mention_threads_usage_lines() {
        let alice = Account::new("alice", 1);
        let asker = Account::new("asker", 7);

        let mut remote = FakeRemote::default();
        // alice has one fully described photo on her timeline
        let mut t = mention(600, &alice, "foto");
        t.media = Some(vec![photo(Some("un perro"))]);
        remote.tweets.insert(t.id.clone(), t);
        remote.timelines.insert("alice".to_string(), vec!["600".to_string()]);

        let mut m = mention(SEED + 2, &asker, "@AltBotUY @alice");
        m.user_mentions = vec![Account::new("AltBotUY", 99), alice.clone()];
        remote.mentions = vec![m];

        let mut store = Store::open_memory().unwrap();
        let config = test_config();
        let handled = run(&remote, &mut store, &config);

        assert_eq!(handled, 1);
        let replies = remote.replies.borrow();
        let all_text: String = replies.iter().map(|(t, _)| t.as_str()).collect();
        assert!(all_text.contains("Reporte de uso"));
        assert!(all_text.contains("@alice: 100% de 1 imágenes"));
        assert!(all_text.contains(messages::ALT_TEXT_TUTORIAL_URL));
        assert!(store.is_processed(&(SEED + 2).to_string()).unwrap());
    }

    #[test]
    fn report_subject_without_images_gets_the_no_images_line() {
        let bob = Account::new("bob", 2);
        let asker = Account::new("asker", 7);

        let mut remote = FakeRemote::default();
        let mut m = mention(SEED + 3, &asker, "@AltBotUY @bob");
        m.user_mentions = vec![Account::new("AltBotUY", 99), bob];
        remote.mentions = vec![m];

        let mut store = Store::open_memory().unwrap();
        let config = test_config();
        run(&remote, &mut store, &config);

        let replies = remote.replies.borrow();
        let all_text: String = replies.iter().map(|(t, _)| t.as_str()).collect();
        assert!(all_text.contains("@bob: no encontré imágenes recientes"));
    }

    #[test]
    fn bot_authored_and_conversational_mentions_are_skipped() {
        let bot = Account::new("AltBotUY", 99);
        let asker = Account::new("asker", 7);

        let mut remote = FakeRemote::default();
        remote.mentions = vec![
            mention(SEED + 1, &bot, "@alice hola"),
            mention(SEED + 2, &asker, "@AltBotUY me encanta tu trabajo"),
        ];

        let mut store = Store::open_memory().unwrap();
        let config = test_config();
        let handled = run(&remote, &mut store, &config);

        assert_eq!(handled, 0);
        assert!(remote.replies.borrow().is_empty());
        // conversational mention still marked, bot's own never is
        assert!(store.is_processed(&(SEED + 2).to_string()).unwrap());
        assert!(!store.is_processed(&(SEED + 1).to_string()).unwrap());
    }

    #[test]
    fn report_subjects_are_capped() {
        let asker = Account::new("asker", 7);

        let mut remote = FakeRemote::default();
        let mut m = mention(SEED + 4, &asker, "@AltBotUY @u1 @u2 @u3 @u4 @u5 @u6 @u7");
        m.user_mentions = (1..=7)
            .map(|i| Account::new(&format!("u{i}"), i))
            .collect();
        remote.mentions = vec![m];

        let mut store = Store::open_memory().unwrap();
        let config = test_config();
        run(&remote, &mut store, &config);

        let replies = remote.replies.borrow();
        let all_text: String = replies.iter().map(|(t, _)| t.as_str()).collect();
        assert!(all_text.contains("@u5"));
        assert!(!all_text.contains("@u6"));
    }
}
